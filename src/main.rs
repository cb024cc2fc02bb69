use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use effectgen::{load_config, save_config_atomic, LogObserver, MediaFile, MediaKind, Pipeline, PipelineConfig};

const DEFAULT_CONFIG_PATH: &str = "effectgen.json";

#[derive(Parser)]
#[command(name = "effectgen", about = "Apply a generation effect to an image or video")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a file, run the effect and wait for the result
    Generate {
        /// Image or video to upload
        file: PathBuf,
        /// Backend to use: image or video
        #[arg(long)]
        kind: Option<MediaKind>,
        /// Effect identifier, overrides the config file
        #[arg(long)]
        effect: Option<String>,
        /// Save the result into this directory
        #[arg(long)]
        download_dir: Option<PathBuf>,
        /// Config file (JSON, camelCase keys)
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },
    /// Fetch a result URL through the proxy, falling back to a direct request
    Download {
        url: String,
        /// Target directory
        #[arg(long, default_value = ".")]
        dir: PathBuf,
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },
    /// Write the default configuration to PATH
    InitConfig { path: PathBuf },
}

fn pipeline_for(config: PipelineConfig) -> anyhow::Result<Pipeline> {
    Pipeline::new(config, Arc::new(LogObserver)).context("Failed to build pipeline")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Generate {
            file,
            kind,
            effect,
            download_dir,
            config,
        } => {
            let mut cfg = load_config(&config)
                .with_context(|| format!("Failed to load {}", config.display()))?;
            if let Some(kind) = kind {
                cfg.media_kind = kind;
            }
            if let Some(effect) = effect {
                cfg.effect_id = effect;
            }

            let media = MediaFile::from_path(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let mut pipeline = pipeline_for(cfg)?;

            let cancel = pipeline.cancel_handle();
            let url = tokio::select! {
                res = pipeline.run(&media) => res?,
                _ = tokio::signal::ctrl_c() => {
                    cancel.cancel();
                    anyhow::bail!("Interrupted");
                }
            };
            println!("{}", url);

            if let Some(dir) = download_dir {
                let report = pipeline.download(&dir).await?;
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
        }
        Commands::Download { url, dir, config } => {
            let cfg = load_config(&config)
                .with_context(|| format!("Failed to load {}", config.display()))?;
            let mut pipeline = pipeline_for(cfg)?;
            let report = pipeline.download_url(&url, &dir).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::InitConfig { path } => {
            save_config_atomic(&path, &PipelineConfig::default())
                .with_context(|| format!("Failed to write {}", path.display()))?;
            log::info!("Wrote default configuration to {}", path.display());
        }
    }

    Ok(())
}
