use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use storyreel::args::{Args, Command};
use storyreel::config::Config;
use storyreel::pipeline;
use storyreel::tagdb::TagDb;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    info!("Starting reddit video generation pipeline");

    let config = Config::load(&args.config_dir).with_context(|| {
        format!("failed to load configuration from {}", args.config_dir.display())
    })?;

    if let Command::Tag { filename, tags } = &args.command {
        let db = TagDb::create(&config.tag_database)
            .with_context(|| format!("failed to open {}", config.tag_database.display()))?;
        if !tags.is_empty() {
            db.add_image(filename, tags)?;
            info!("Tagged {} with {:?}", filename, tags);
        }
        println!("{}: {}", filename, db.image_tags(filename)?.join(", "));
        return Ok(());
    }

    let Some(options) = args.command.run_options(config.tolerated_duration_offset) else {
        return Ok(());
    };
    match pipeline::run(&config, &options).await {
        Ok(out_dir) => {
            info!("Video written to {}", out_dir.display());
            Ok(())
        }
        Err(e) => {
            error!("Video generation failed ({:?}): {}", e.kind(), e);
            Err(e).context("video generation failed")
        }
    }
}
