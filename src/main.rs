//! Attune command line
//!
//! Runs the personalization components against ad-hoc input and prints
//! JSON, for inspecting behaviour without a conversation host.

use anyhow::Context;
use attune_core::{AcousticFeatures, AttuneConfig, Experiment, PersonalizationEngine};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "attune")]
#[command(about = "Adaptive personalization and feedback learning engine", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML), layered under ATTUNE__* environment variables
    #[arg(short, long, global = true, env = "ATTUNE_CONFIG")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Fuse text and optional acoustic features into an emotion estimate
    Fuse {
        text: String,

        #[arg(long)]
        pitch_variance: Option<f32>,

        #[arg(long)]
        speaking_rate: Option<f32>,

        #[arg(long)]
        volume: Option<f32>,

        #[arg(long)]
        tremor: Option<f32>,

        #[arg(long, default_value = "cli")]
        user: String,
    },

    /// Split text into sentences with per-sentence prosody
    Prosody {
        text: String,

        #[arg(long, default_value = "cli")]
        user: String,
    },

    /// Assign a user to a variant of an experiment defined in TOML
    Assign {
        #[arg(short, long)]
        user: String,

        #[arg(short, long)]
        experiment_file: PathBuf,
    },
}

#[derive(Serialize)]
struct AssignmentOutput {
    experiment_id: String,
    user_id: String,
    variant_id: Option<String>,
    config: Option<serde_json::Value>,
}

fn init_tracing(verbose: bool) {
    let default_directive = if verbose {
        "attune=debug,attune_core=debug"
    } else {
        "attune=info,attune_core=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn acoustic_features(
    pitch_variance: Option<f32>,
    speaking_rate: Option<f32>,
    volume: Option<f32>,
    tremor: Option<f32>,
) -> Option<AcousticFeatures> {
    if pitch_variance.is_none() && speaking_rate.is_none() && volume.is_none() && tremor.is_none() {
        return None;
    }
    let defaults = AcousticFeatures::default();
    Some(AcousticFeatures {
        pitch_variance: pitch_variance.unwrap_or(defaults.pitch_variance),
        speaking_rate: speaking_rate.unwrap_or(defaults.speaking_rate),
        volume: volume.unwrap_or(defaults.volume),
        tremor: tremor.unwrap_or(defaults.tremor),
        ..defaults
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    debug!("Attune v{} starting", env!("CARGO_PKG_VERSION"));

    let config = AttuneConfig::load(cli.config.as_deref()).context("loading configuration")?;
    let engine = PersonalizationEngine::new(config);

    match cli.command {
        Commands::Fuse {
            text,
            pitch_variance,
            speaking_rate,
            volume,
            tremor,
            user,
        } => {
            let acoustic = acoustic_features(pitch_variance, speaking_rate, volume, tremor);
            let result = engine.fuse_emotion(&text, acoustic.as_ref(), &user);
            print_json(&result)?;
        }
        Commands::Prosody { text, user } => {
            let segments = engine.adapt_prosody(&text, &user);
            print_json(&segments)?;
        }
        Commands::Assign {
            user,
            experiment_file,
        } => {
            let definition = std::fs::read_to_string(&experiment_file)
                .with_context(|| format!("reading {}", experiment_file.display()))?;
            let experiment = Experiment::from_toml(&definition)?;
            let experiment_id = experiment.id.clone();

            let experiments = engine.experiments();
            experiments.create_experiment(experiment)?;
            experiments.start(&experiment_id)?;

            let variant = experiments.assign_variant(&user, &experiment_id);
            print_json(&AssignmentOutput {
                experiment_id,
                user_id: user,
                variant_id: variant.as_ref().map(|v| v.id.clone()),
                config: variant.map(|v| v.config),
            })?;
        }
    }

    Ok(())
}
