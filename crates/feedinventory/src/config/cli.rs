use clap::Parser;
use clap::Subcommand;
use utils::version;

use crate::config::controller::ControllerArgs;
use crate::config::predictor::PredictorArgs;

#[derive(Parser)]
#[command(about, long_about, version = &**version::VERSION)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the FeedInventory controller
    Controller(ControllerArgs),
    /// Run the replica capacity predictor HTTP server
    Predictor(PredictorArgs),
}
