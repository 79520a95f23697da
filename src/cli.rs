use crate::config::{CaptureCondition, CheckerOptions, ChromeConfig, LinkOrder};
use crate::gcp::{GcpEnvironment, GcsClient, MetadataServer, TokenSource};
use crate::{ChromiumLauncher, Environment, LinkChecker, RunOutput};
use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "linkprobe")]
#[command(about = "Synthetic broken-link checker")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(long, global = true, help = "Chrome executable path")]
    pub chrome_path: Option<String>,

    #[arg(long, global = true, help = "Serve Prometheus metrics on this address")]
    pub metrics_addr: Option<SocketAddr>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check every link on an origin page
    Check {
        #[command(flatten)]
        overrides: OptionOverrides,

        #[arg(short, long, help = "Write the JSON result here instead of stdout")]
        output: Option<PathBuf>,
    },

    /// Validate checker options without running a check
    Validate {
        #[command(flatten)]
        overrides: OptionOverrides,
    },
}

/// Options file plus per-field overrides; flags win over the file.
#[derive(Args, Debug, Clone, Default)]
pub struct OptionOverrides {
    #[arg(long, help = "JSON file with checker options")]
    pub options: Option<PathBuf>,

    #[arg(short, long, help = "Origin URL")]
    pub url: Option<String>,

    #[arg(long, help = "Maximum number of followed links")]
    pub link_limit: Option<usize>,

    #[arg(long, value_parser = parse_link_order, help = "Link order (first-n, random)")]
    pub link_order: Option<LinkOrder>,

    #[arg(short, long, help = "Links checked at the same time")]
    pub concurrency: Option<usize>,

    #[arg(long, help = "Per-link timeout in milliseconds")]
    pub timeout_millis: Option<u64>,

    #[arg(long, help = "Retries after a transient navigation failure")]
    pub max_retries: Option<usize>,

    #[arg(long, help = "Longest accepted redirect chain")]
    pub max_redirects: Option<usize>,

    #[arg(long, help = "Selector awaited on the origin before scraping")]
    pub wait_for_selector: Option<String>,

    #[arg(long, value_parser = parse_capture_condition, help = "Screenshot capture (always, failing, none)")]
    pub capture: Option<CaptureCondition>,

    #[arg(long, help = "Screenshot location as <bucket>[/<folder>]")]
    pub storage_location: Option<String>,
}

fn parse_link_order(value: &str) -> Result<LinkOrder, String> {
    match value.to_ascii_lowercase().replace('_', "-").as_str() {
        "first-n" => Ok(LinkOrder::FirstN),
        "random" => Ok(LinkOrder::Random),
        other => Err(format!("unknown link order: {other}")),
    }
}

fn parse_capture_condition(value: &str) -> Result<CaptureCondition, String> {
    match value.to_ascii_lowercase().as_str() {
        "always" => Ok(CaptureCondition::Always),
        "failing" => Ok(CaptureCondition::Failing),
        "none" => Ok(CaptureCondition::None),
        other => Err(format!("unknown capture condition: {other}")),
    }
}

impl OptionOverrides {
    pub fn apply(&self, options: &mut CheckerOptions) {
        if let Some(url) = &self.url {
            options.origin_url = url.clone();
        }
        if let Some(link_limit) = self.link_limit {
            options.link_limit = link_limit;
        }
        if let Some(link_order) = self.link_order {
            options.link_order = link_order;
        }
        if let Some(concurrency) = self.concurrency {
            options.concurrency = concurrency;
        }
        if let Some(timeout_millis) = self.timeout_millis {
            options.link_timeout_millis = timeout_millis;
        }
        if let Some(max_retries) = self.max_retries {
            options.max_retries = max_retries;
        }
        if let Some(max_redirects) = self.max_redirects {
            options.max_redirects = max_redirects;
        }
        if let Some(selector) = &self.wait_for_selector {
            options.wait_for_selector = Some(selector.clone());
        }
        if let Some(capture) = self.capture {
            options.screenshot_options.capture_condition = capture;
        }
        if let Some(location) = &self.storage_location {
            options.screenshot_options.storage_location = location.clone();
        }
    }
}

/// Reads the options file (if any) and applies the overrides. Validation is
/// left to the run so invalid options still produce a result.
pub async fn load_options(overrides: &OptionOverrides) -> anyhow::Result<CheckerOptions> {
    let mut options = match &overrides.options {
        Some(path) => {
            let content = fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read options file {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse options file {}", path.display()))?
        }
        None => CheckerOptions::default(),
    };

    overrides.apply(&mut options);
    Ok(options)
}

/// Runs one check and writes its JSON result. Returns whether it passed.
pub async fn run_check(
    options: CheckerOptions,
    chrome_path: Option<String>,
    output: Option<&Path>,
) -> anyhow::Result<bool> {
    let chrome = ChromeConfig {
        chrome_path,
        ..Default::default()
    }
    .covering(&options);
    let environment: Arc<dyn Environment> = Arc::new(GcpEnvironment::from_env());

    let mut checker = LinkChecker::new(Arc::new(ChromiumLauncher::new(chrome)), environment.clone());
    if options.screenshots_enabled() {
        let tokens = match std::env::var("GOOGLE_OAUTH_ACCESS_TOKEN") {
            Ok(token) if !token.trim().is_empty() => TokenSource::Static(token.trim().to_string()),
            _ => TokenSource::Metadata(MetadataServer::new()),
        };
        checker = checker.with_storage(Arc::new(GcsClient::new(tokens, environment)));
    }

    let result = checker.run(options).await;
    write_output(&result, output).await?;
    Ok(result.passed())
}

async fn write_output(result: &RunOutput, output: Option<&Path>) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(result)?;
    match output {
        Some(path) => {
            fs::write(path, json)
                .await
                .with_context(|| format!("Failed to write result to {}", path.display()))?;
            info!("Result written to {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

/// Prints a summary of the effective options, or fails when they are invalid.
pub fn validate_options(options: CheckerOptions) -> anyhow::Result<()> {
    let options = options.validate()?;

    println!("Options are valid:");
    println!("  Origin: {}", options.origin_url);
    println!("  Link limit: {} ({:?})", options.link_limit, options.link_order);
    println!("  Concurrency: {}", options.concurrency);
    println!("  Link timeout: {}ms", options.link_timeout_millis);
    println!(
        "  Retries: {}, max redirects: {}",
        options.max_retries, options.max_redirects
    );
    println!(
        "  Screenshots: {:?} to {}",
        options.screenshot_options.capture_condition,
        display_location(&options.screenshot_options.storage_location)
    );
    if !options.per_link_options.is_empty() {
        println!("  Per-link overrides: {}", options.per_link_options.len());
    }

    Ok(())
}

fn display_location(location: &str) -> &str {
    if location.is_empty() {
        "default bucket"
    } else {
        location
    }
}

pub fn install_metrics(addr: Option<SocketAddr>) {
    if let Some(addr) = addr {
        if let Err(e) = crate::metrics::install_prometheus_exporter(addr) {
            warn!("Failed to start metrics exporter on {}: {}", addr, e);
        }
    }
}

pub fn setup_logging(verbose: bool) -> anyhow::Result<()> {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}
