//! Client-side mirror of the simulation

pub mod predictor;

pub use predictor::ClientPredictor;
