mod batch;

use anyhow::{Context, Result};
use clap::Parser;
use knowthis_core::AnalysisConfig;
use knowthis_pipeline::Analyzer;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "knowthis", about = "Score audio clips for signs of AI voice synthesis")]
struct Cli {
    /// Path to the configuration file (built-in defaults when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print one JSON object per file instead of text
    #[arg(long)]
    json: bool,

    /// Include the clip fingerprint in JSON output
    #[arg(long)]
    fingerprint: bool,

    /// Audio files to analyse
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AnalysisConfig::load_from_file(path)
            .with_context(|| format!("failed to load config from {:?}", path))?,
        None => AnalysisConfig::default(),
    };

    let env_filter = EnvFilter::try_new(&config.general.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = tracing_subscriber::Registry::default().with(env_filter).with(
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(false),
    );

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    let analyzer = Analyzer::new(config).context("failed to build analyzer")?;
    tracing::info!(
        detector = analyzer.detector_name(),
        files = cli.files.len(),
        "knowthis starting"
    );

    let reports = batch::analyze_files(Arc::new(analyzer), cli.files, cli.fingerprint).await;

    let mut failures = 0usize;
    for report in &reports {
        if report.is_failure() {
            failures += 1;
        }
        if cli.json {
            println!(
                "{}",
                serde_json::to_string(report).context("failed to serialize report")?
            );
        } else {
            println!("{}", report.render_text());
        }
    }

    if failures > 0 {
        anyhow::bail!("{failures} of {} file(s) failed", reports.len());
    }
    Ok(())
}
