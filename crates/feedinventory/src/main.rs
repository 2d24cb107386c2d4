use anyhow::Result;
use clap::Parser;
use feedinventory::app;
use feedinventory::config::Cli;
use feedinventory::config::Commands;
use utils::logging;
use utils::version;

/// Sets up global panic hooks.
fn setup_global_hooks() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        default_hook(panic_info);
        tracing::error!("Thread panicked: {}", panic_info);
    }));
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_global_hooks();

    let cli = Cli::parse();

    match cli.command {
        Commands::Controller(args) => {
            let _guard = logging::init("feedinventory-controller");
            tracing::info!("Starting FeedInventory controller {}", &**version::VERSION);
            app::controller::run(args).await
        }
        Commands::Predictor(args) => {
            let _guard = logging::init("feedinventory-predictor");
            tracing::info!("Starting capacity predictor {}", &**version::VERSION);
            app::predictor::run(args).await
        }
    }
}
