//! HTTP surface of the capacity predictor

mod errors;
pub mod handlers;
pub mod server;

pub use errors::ApiError;
pub use server::PredictorServer;
