use clap::Parser;
use color_eyre::eyre::{Result, WrapErr};
use dumpsrv::config::{Cli, Config};
use dumpsrv::{DumpServer, logging};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize error handling
    color_eyre::install()?;

    // Environment first, flags override; a malformed value is fatal before
    // any listener is opened
    let cli = Cli::parse();
    let config = Config::resolve(&cli).wrap_err("failed to resolve configuration")?;

    // Logging destination is fixed here for the life of the process
    logging::init(config.use_structured_logs);

    let server = DumpServer::new(config);
    server.run().await.wrap_err("failed to run dump server")?;

    Ok(())
}
