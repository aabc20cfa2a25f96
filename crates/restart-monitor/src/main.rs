use anyhow::Result;
use clap::Parser;
use restart_monitor::app::ApplicationBuilder;
use restart_monitor::config::Cli;
use restart_monitor::logging;
use restart_monitor::version;

#[tokio::main]
async fn main() -> Result<()> {
    logging::install_panic_hook();

    let cli = Cli::parse();
    logging::init();

    tracing::info!("Starting restart monitor {}", &**version::VERSION);

    let app = ApplicationBuilder::new(cli).build().await?;
    app.run().await
}
