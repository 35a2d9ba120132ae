//! Heart-disease risk from a health-survey form: the answers are one-hot
//! encoded and standard-scaled against a reference dataset, then scored by a
//! pre-trained tree ensemble.

pub mod dataset;
pub mod encoder;
pub mod error;
pub mod model;
pub mod predictor;
pub mod records;
pub mod server;
pub mod survey;

#[cfg(test)]
mod testing;

pub use error::{HeartRiskError, Result};
