//! # Constants and type definitions for patrec
//!
//! This module centralizes the **dimension constants** and **common type
//! definitions** used throughout the `patrec` library.
//!
//! ## Overview
//!
//! - Seed and helix dimensions
//! - Core type aliases used across the crate
//! - Container types for hit bookkeeping
//!
//! These definitions are used by all main modules, including seeding,
//! candidate extension, and arbitration.

use nalgebra::{Matrix5, Vector5};
use smallvec::SmallVec;

use crate::hits::HitId;

// -------------------------------------------------------------------------------------------------
// Dimensions
// -------------------------------------------------------------------------------------------------

/// Number of layers (and hits) in a seed: 3 stereo + 2 axial
pub const SEED_LAYERS: usize = 5;

/// Number of parameters describing a linearized helix
pub const HELIX_DIM: usize = 5;

// -------------------------------------------------------------------------------------------------
// Core type aliases
// -------------------------------------------------------------------------------------------------

/// 5-parameter helix vector: (drho, phi0, curvature, dz, tan-lambda)
pub type HelixVec = Vector5<f64>;

/// Covariance of a 5-parameter helix vector
pub type HelixCov = Matrix5<f64>;

// -------------------------------------------------------------------------------------------------
// Container types
// -------------------------------------------------------------------------------------------------

/// The hit ids forming one seed, ordered by strategy layer
pub type SeedHitIds = SmallVec<[HitId; SEED_LAYERS]>;

/// The hit ids claimed by one candidate or track
pub type TrackHits = SmallVec<[HitId; 14]>;
