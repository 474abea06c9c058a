use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use tracing::{info, Level};

use tts_failover::{
    errors::constants::DEFAULT_CONFIG_PATH,
    trace::init_tracing_subscriber,
    tts::{orchestrator::ConversionRequest, provider::SynthesisParams},
    Config, ConversionOrchestrator, ProviderId,
};

#[derive(Parser)]
#[command(name = "tts-failover", version)]
#[command(about = "Text-to-speech with provider fallback", long_about = None)]
struct Cli {
    /// Config file; `TTS_*` environment variables are used when it is missing
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a text file to audio
    Convert {
        /// Text file to read
        input: PathBuf,

        /// Audio file to write (defaults to the input with an .mp3 extension)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Voice id (defaults to the first voice for the configured locale)
        #[arg(long)]
        voice: Option<String>,

        /// Speaking rate offset in percent
        #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
        rate: i32,

        /// Pitch offset in percent
        #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
        pitch: i32,

        /// Volume offset in percent
        #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
        volume: i32,

        /// Provider to try first (cloud or local)
        #[arg(short, long)]
        provider: Option<ProviderId>,
    },
    /// List available voices
    Voices {
        /// Locale or language filter, e.g. en-US or en
        #[arg(short, long)]
        locale: Option<String>,

        #[arg(short, long)]
        provider: Option<ProviderId>,
    },
    /// Show provider availability and circuit breaker state
    Status,
}

fn log_level(verbose: u8) -> Level {
    match verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(&cli.config)
        .with_context(|| format!("Cannot load config from {}", cli.config.display()))?;
    let _guard = init_tracing_subscriber(&config.otel_http_url, log_level(cli.verbose))
        .context("Cannot initialise tracing")?;

    let orchestrator =
        ConversionOrchestrator::from_config(&config).context("Cannot set up providers")?;

    match cli.command {
        Commands::Convert {
            input,
            output,
            voice,
            rate,
            pitch,
            volume,
            provider,
        } => {
            let voice_id = match voice {
                Some(voice) => voice,
                None => orchestrator
                    .default_voice(provider)
                    .await
                    .map(|voice| voice.id)
                    .with_context(|| {
                        format!("No voice available for {}", config.conversion.default_locale)
                    })?,
            };
            let text = tokio::fs::read_to_string(&input)
                .await
                .with_context(|| format!("Cannot read {}", input.display()))?;
            let request = ConversionRequest {
                text,
                voice_id,
                params: SynthesisParams::new(rate, pitch, volume),
                output: output.unwrap_or_else(|| input.with_extension("mp3")),
                provider,
            };

            let cancel = orchestrator.cancellation_token();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Interrupted, finishing the current call");
                    cancel.cancel();
                }
            });

            let result = orchestrator
                .convert(&request)
                .await
                .context("Conversion failed")?;

            println!(
                "{} ({} chunk(s), provider: {})",
                result.path.display(),
                result.chunks,
                result
                    .providers
                    .iter()
                    .map(|p| p.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }
        Commands::Voices { locale, provider } => {
            for voice in orchestrator
                .get_available_voices(locale.as_deref(), provider)
                .await
            {
                println!(
                    "{}\t{}\t{:?}\t{:?}\t{}",
                    voice.id, voice.locale, voice.gender, voice.quality, voice.provider
                );
            }
        }
        Commands::Status => {
            let statuses = orchestrator.provider_statuses().await;
            println!("{}", serde_json::to_string_pretty(&statuses)?);
        }
    }

    Ok(())
}
