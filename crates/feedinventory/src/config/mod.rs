pub mod cli;
pub mod connection;
pub mod controller;
pub mod predictor;

pub use cli::*;
pub use connection::*;
pub use controller::*;
pub use predictor::*;
