use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use hearth::config::Config;
use hearth::notify::VoiceCache;
use hearth::voice::{AzureTts, Synthesizer};
use hearth::Daemon;

/// Hearth - voice assistant daemon for the Raspberry Pi
#[derive(Parser)]
#[command(name = "hearth", version, about)]
struct Cli {
    /// Port for the dashboard server
    #[arg(long, env = "HEARTH_PORT")]
    port: Option<u16>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Pre-generate cached phrase audio (hourly chimes, prompts)
    CacheVoices,
    /// Synthesize and print the size of a test phrase
    TestTts {
        /// Text to synthesize
        #[arg(default_value = "你好，我是你的语音助手。")]
        text: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info,hearth=info",
        1 => "info,hearth=debug",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load()?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    if let Some(command) = cli.command {
        return match command {
            Command::CacheVoices => {
                let synthesizer: Arc<dyn Synthesizer> = Arc::new(AzureTts::new(&config.azure)?);
                let cache = VoiceCache::new(config.sound_dir.clone(), synthesizer);
                let generated = cache.warm().await?;
                tracing::info!(generated, "voice cache ready");
                Ok(())
            }
            Command::TestTts { text } => {
                let synthesizer = AzureTts::new(&config.azure)?;
                let audio = synthesizer.synthesize(&text).await?;
                tracing::info!(bytes = audio.len(), "synthesis succeeded");
                Ok(())
            }
        };
    }

    Daemon::new(config).run().await?;
    Ok(())
}
