//! Collects static files into the served directory, compressing them on the
//! way, then invalidates the changed paths on the CDN.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tsu_common::assets::{Autocompressor, CompressingStorage};
use tsu_common::collect::collect;
use tsu_common::config::Settings;

#[derive(Parser, Debug)]
#[command(name = "tsu-collect")]
#[command(about = "Collect, compress and invalidate static files", long_about = None)]
struct Args {
    /// Directory holding the application's static files
    #[arg(short, long)]
    source: PathBuf,

    /// Directory the web server serves static files from
    #[arg(short, long)]
    target: PathBuf,

    /// Settings file (TOML, YAML or JSON); TSU_* variables override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Only collect, leave the CDN untouched
    #[arg(long)]
    no_invalidate: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> tsu_common::Result<()> {
    let settings = Settings::load(args.config.as_deref())?;
    let invalidate = !args.no_invalidate;
    if invalidate {
        // Fail before touching any file when the CDN cannot be reached.
        settings.cdn.require()?;
    }

    let storage =
        CompressingStorage::new(&args.target, Autocompressor::from_settings(&settings.assets)?);
    let report = collect(&args.source, &storage).await?;

    if invalidate {
        invalidate_changed(&settings, &report.copied).await?;
    }
    Ok(())
}

#[cfg(feature = "cloudfront")]
async fn invalidate_changed(settings: &Settings, changed: &[String]) -> tsu_common::Result<()> {
    use tsu_common::cdn::{CloudFrontClient, invalidate};

    let client = CloudFrontClient::from_settings(&settings.cdn).await?;
    invalidate(&client, &settings.cdn, changed).await?;
    Ok(())
}

#[cfg(not(feature = "cloudfront"))]
async fn invalidate_changed(_settings: &Settings, changed: &[String]) -> tsu_common::Result<()> {
    tracing::warn!(
        changed = changed.len(),
        "built without the `cloudfront` feature, skipping invalidation"
    );
    Ok(())
}
