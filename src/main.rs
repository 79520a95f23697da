use clap::Parser;
use linkprobe::{install_metrics, load_options, run_check, setup_logging, validate_options, Cli, Commands};
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    setup_logging(args.verbose)?;
    install_metrics(args.metrics_addr);

    info!("Starting linkprobe v{}", env!("CARGO_PKG_VERSION"));

    match args.command {
        Commands::Check { overrides, output } => {
            let options = load_options(&overrides).await?;
            let passed = run_check(options, args.chrome_path, output.as_deref()).await?;
            if !passed {
                error!("Link check failed");
                std::process::exit(1);
            }
            info!("Link check passed");
        }
        Commands::Validate { overrides } => {
            let options = load_options(&overrides).await?;
            validate_options(options)?;
        }
    }

    Ok(())
}
