use std::path::PathBuf;

use anyhow::Context;
use atelier_app_server::config::{CONFIG_ENV, load_env_file};
use atelier_app_server::{AppConfig, GenerationInput, GenerationPipeline, serve};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Generate images from a text concept with Ollama and ComfyUI.
#[derive(Debug, Parser)]
#[command(name = "atelier", version)]
struct Cli {
    /// TOML configuration file.
    #[arg(long, global = true, env = CONFIG_ENV)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP server.
    Serve {
        #[arg(long)]
        host: Option<String>,

        #[arg(long)]
        port: Option<u16>,
    },

    /// Generate one image from the terminal.
    Generate {
        /// Concept to expand; read from stdin when omitted.
        concept: Option<String>,

        /// Stylistic hint passed to the language model.
        #[arg(long)]
        style: Option<String>,

        #[arg(long)]
        negative: Option<String>,

        #[arg(long)]
        seed: Option<u64>,

        /// Send the concept to ComfyUI as-is, skipping expansion.
        #[arg(long)]
        raw: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // `.env` has to be loaded before clap reads ATELIER_CONFIG.
    load_env_file(None)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = AppConfig::load(cli.config.as_deref()).context("failed to load config")?;

    match cli.command {
        Command::Serve { host, port } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            serve(config).await
        }
        Command::Generate {
            concept,
            style,
            negative,
            seed,
            raw,
        } => {
            let text = match concept {
                Some(concept) => concept,
                None => read_concept().await?,
            };
            let mut input = GenerationInput {
                style,
                negative_prompt: negative,
                seed,
                ..Default::default()
            };
            if raw {
                input.prompt = Some(text);
            } else {
                input.concept = Some(text);
            }
            generate_once(&config, input).await
        }
    }
}

async fn read_concept() -> anyhow::Result<String> {
    eprint!("Enter your concept: ");
    let mut line = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await
        .context("failed to read concept from stdin")?;
    Ok(line.trim().to_string())
}

async fn generate_once(config: &AppConfig, mut input: GenerationInput) -> anyhow::Result<()> {
    let pipeline = GenerationPipeline::from_config(config).await?;

    if input.prompt.is_none() {
        eprintln!("Generating detailed prompt using Ollama...");
        let prompt = pipeline.resolve_prompt(&input).await?;
        println!("Prompt:\n{prompt}\n");
        input.prompt = Some(prompt);
    }

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_ctrl_c.cancel();
        }
    });

    eprintln!("Sending prompt to ComfyUI for image generation...");
    let outcome = pipeline.generate(&input, &cancel).await?;
    println!("{}", outcome.image_path.display());
    Ok(())
}
