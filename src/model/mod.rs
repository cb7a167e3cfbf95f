pub mod network;
pub mod persist;
pub mod predictor;
pub mod trainer;
