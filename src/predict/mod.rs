pub mod features;
pub mod model;
pub mod service;

pub use features::FeatureVector;
pub use model::{Prediction, ScoringEngine};
