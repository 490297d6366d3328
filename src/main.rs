use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tubescribe::config::Config;
use tubescribe::llm::SummarizationClient;
use tubescribe::processing::HealthReport;
use tubescribe::tools::ToolLocator;
use tubescribe::transcription::WhisperCliLoader;
use tubescribe::{AudioCache, ModelTier, PipelineCoordinator, ProcessRequest};

#[derive(Parser)]
#[command(name = "tubescribe")]
#[command(version, about = "Transcribe and summarize online videos with local models")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Download, transcribe and optionally summarize a video
    Process {
        url: String,
        /// Spoken language hint, e.g. "en"; detected when omitted
        #[arg(short, long)]
        language: Option<String>,
        /// Speech model tier: tiny, base, small, medium or large
        #[arg(short, long)]
        tier: Option<ModelTier>,
        /// Also summarize the transcript
        #[arg(short, long)]
        summary: bool,
        /// Word limit for the summary
        #[arg(long)]
        max_words: Option<u32>,
        /// Write .txt/.srt/.json files here
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check tools, models, cache and inference server
    Doctor {
        #[arg(long)]
        json: bool,
    },
    /// List speech model tiers on disk and models on the inference server
    Models,
    /// Manage the audio cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// List cached audio files
    List,
    /// Remove files older than the configured age
    Sweep,
    /// Remove all cached audio
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    let filter = if cli.verbose {
        EnvFilter::new("tubescribe=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.output.log_level))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = config.validate() {
        warn!("Configuration problem: {}", e);
    }
    if cli.verbose {
        info!("{}", config.summary());
    }

    match cli.command {
        Commands::Process {
            url,
            language,
            tier,
            summary,
            max_words,
            output_dir,
            json,
        } => {
            let mut config = config;
            if output_dir.is_some() {
                config.output.output_dir = output_dir;
            }
            let coordinator = PipelineCoordinator::new(&config)?;

            let request = ProcessRequest {
                url,
                language,
                model_tier: tier,
                want_summary: summary,
                max_words,
            };

            match coordinator.process(request).await {
                Ok(result) => {
                    if json {
                        println!("{}", serde_json::to_string_pretty(&result)?);
                    } else {
                        println!("{}", result.transcript.text);
                        if let Some(summary) = &result.summary {
                            println!("\n--- Summary ---\n{}", summary.summary_text);
                        }
                        for path in &result.outputs {
                            info!("📄 {}", path.display());
                        }
                    }
                }
                Err(failure) => {
                    if json {
                        println!("{}", serde_json::to_string_pretty(&failure)?);
                    }
                    return Err(failure.into());
                }
            }
        }

        Commands::Doctor { json } => {
            let coordinator = PipelineCoordinator::new(&config)?;
            let report = coordinator.diagnostics().await;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
        }

        Commands::Models => {
            let tools = ToolLocator::new(&config.tools).resolve();
            let loader = WhisperCliLoader::new(&config.transcription, tools);
            println!("Speech models in {}:", config.transcription.models_dir.display());
            for tier in ModelTier::ALL {
                let state = if loader.model_path(tier).is_file() { "installed" } else { "missing" };
                println!("  {:<8} {}", tier, state);
            }

            let client = SummarizationClient::from_config(&config.llm);
            println!("Inference server {}:", client.endpoint());
            match client.list_models().await {
                Ok(models) if models.is_empty() => println!("  (no models installed)"),
                Ok(models) => {
                    let preferred = client.preferred_model().await;
                    for model in models {
                        let marker = if model == preferred { "*" } else { " " };
                        println!(" {} {}", marker, model);
                    }
                }
                Err(e) => println!("  unavailable: {}", e),
            }
        }

        Commands::Cache { action } => {
            let cache = AudioCache::from_days(config.cache.cache_dir.clone(), config.cache.max_age_days)?;
            match action {
                CacheAction::List => {
                    let entries = cache.entries();
                    if entries.is_empty() {
                        info!("📭 No cached audio in {}", cache.cache_dir().display());
                    }
                    for entry in entries {
                        println!(
                            "{}  {:.1} MB  {}h old",
                            entry.path.display(),
                            entry.size_bytes as f64 / 1_000_000.0,
                            entry.age_hours
                        );
                    }
                }
                CacheAction::Sweep => {
                    let count = cache.sweep();
                    info!("🗑️ Cleaned up {} expired cache files", count);
                }
                CacheAction::Clear => {
                    let count = cache.clear();
                    info!("🧹 Cleared {} cache files", count);
                }
            }
        }
    }

    Ok(())
}

fn print_report(report: &HealthReport) {
    let status = |ok: bool| if ok { "✅" } else { "❌" };

    println!(
        "{} ffmpeg tools: {} ({:?})",
        status(report.missing_executables.is_empty()),
        report.tools.dir.display(),
        report.tools.source
    );
    if !report.missing_executables.is_empty() {
        println!("   missing: {}", report.missing_executables.join(", "));
    }

    println!(
        "📦 cache: {} ({} files)",
        report.cache_dir.display(),
        report.cached_files
    );

    if let Some(backend) = &report.speech_backend {
        let tiers: Vec<String> = backend.installed_tiers.iter().map(|t| t.to_string()).collect();
        println!(
            "{} speech backend, installed tiers: {}",
            status(backend.binary_available && !tiers.is_empty()),
            if tiers.is_empty() { "none".to_string() } else { tiers.join(", ") }
        );
    }
    if let Some((tier, device)) = &report.loaded_model {
        println!("   loaded: {} on {}", tier, device);
    }

    println!(
        "{} inference server: {} (preferred model: {})",
        status(report.inference_reachable),
        report.inference_url,
        report.preferred_model
    );
    match &report.inference_error {
        Some(e) => println!("   {}", e),
        None => println!("   models: {}", report.available_models.join(", ")),
    }
}
