pub mod arbitration;
pub mod candidates;
pub mod config;
pub mod constants;
pub mod engine;
pub mod hits;
pub mod kalman;
pub mod patrec_errors;
pub mod seeding;
pub mod tracker;
pub mod tracks;

#[cfg(test)]
pub(crate) mod test_model;
