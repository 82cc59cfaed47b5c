use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tokio::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};
use votescraper::{
    config::{Config, DEFAULT_CONFIG_PATH},
    output::{self, OutputFormat},
    pipeline,
};

/// Scrape per-county presidential results for every configured jurisdiction
/// and write them under canonical region identifiers.
#[derive(Parser, Debug)]
struct Args {
    /// Output file; `.csv` or `.json` picks the format unless --format is given
    output: PathBuf,

    /// Jurisdiction configuration
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[arg(long, value_enum)]
    format: Option<OutputFormat>,

    /// Only run these jurisdictions (code or name), comma separated
    #[arg(long, value_delimiter = ',')]
    only: Vec<String>,

    /// Fail on any region name the authority table cannot match
    #[arg(long)]
    strict: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,votescraper=info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();
    info!("startup");

    let args = Args::parse();
    let start = Instant::now();

    // ─── 2) load configuration ───────────────────────────────────────
    let format = match args.format {
        Some(f) => f,
        None => OutputFormat::from_path(&args.output).with_context(|| {
            format!(
                "cannot tell the output format of {}; pass --format",
                args.output.display()
            )
        })?,
    };
    let mut config = Config::load_from_file(&args.config)?;
    config.retain_jurisdictions(&args.only);
    if args.strict {
        config.resolve.strict = true;
    }
    if config.jurisdictions.is_empty() {
        warn!(only = ?args.only, "no jurisdictions selected; nothing to do");
        return Ok(());
    }
    info!(
        config = %args.config.display(),
        jurisdictions = config.jurisdictions.len(),
        ?format,
        "configuration loaded"
    );

    // ─── 3) scrape, resolve, aggregate ───────────────────────────────
    let dataset = pipeline::run(&config).await?;

    // ─── 4) write results ────────────────────────────────────────────
    output::write(&dataset, &args.output, format)?;

    info!(elapsed = ?start.elapsed(), "all done");
    Ok(())
}
