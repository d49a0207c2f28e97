use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use mastering_engine::cloud::{MasteringOptions, MasteringProfile};
use mastering_engine::config::{CloudMode, EngineConfig};
use mastering_engine::engine::{AudioEngine, EngineEvent};
use mastering_engine::processing::{
    ModuleKind, ProcessOptions, ProcessingMode, ProcessingModule, ProcessingResult,
};
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(
    name = "engine_cli",
    about = "Load, inspect and process audio through the mastering engine"
)]
struct Cli {
    /// Engine configuration JSON (defaults to assets/engine_config.json)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Use the live cloud API from the configuration instead of the mock
    #[arg(long)]
    live: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load a source and print playback info
    Info {
        #[arg(long)]
        source: String,
    },
    /// Process a source and print the result with the emitted events
    Process {
        #[arg(long)]
        source: String,
        #[arg(long, value_enum, default_value_t = ModeArg::Local)]
        mode: ModeArg,
        /// Gain stage for local mode, in dB
        #[arg(long, allow_negative_numbers = true)]
        gain_db: Option<f64>,
        /// Mastering profile for cloud-mastering mode
        #[arg(long, default_value = "balanced")]
        profile: String,
        #[arg(long, default_value = "cli-user")]
        user_id: String,
        /// Write a locally rendered WAV here
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Run cloud analysis of a source
    Analyze {
        #[arg(long)]
        source: String,
        #[arg(long, default_value = "cli-user")]
        user_id: String,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ModeArg {
    Local,
    CloudMastering,
    CloudEnhancement,
}

impl From<ModeArg> for ProcessingMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Local => ProcessingMode::Local,
            ModeArg::CloudMastering => ProcessingMode::CloudMastering,
            ModeArg::CloudEnhancement => ProcessingMode::CloudEnhancement,
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(1)
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => EngineConfig::load_from_file(path),
        None => EngineConfig::load(),
    };
    if !cli.live {
        config.cloud.mode = CloudMode::Mock;
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?;
    let engine = AudioEngine::new(config);
    engine.initialize();

    let code = runtime.block_on(async {
        let outcome = match cli.command {
            Commands::Info { source } => run_info(&engine, &source).await,
            Commands::Process {
                source,
                mode,
                gain_db,
                profile,
                user_id,
                output,
            } => {
                let request = ProcessRequest {
                    mode: mode.into(),
                    gain_db,
                    profile: parse_profile(&profile)?,
                    user_id,
                    output,
                };
                run_process(&engine, &source, request).await
            }
            Commands::Analyze { source, user_id } => run_analyze(&engine, &source, &user_id).await,
        };
        engine.dispose().await;
        outcome
    })?;

    Ok(code)
}

async fn run_info(engine: &AudioEngine, source: &str) -> Result<ExitCode> {
    engine
        .load_audio(source)
        .await
        .with_context(|| format!("loading {}", source))?;
    let snapshot = engine.playback_snapshot();
    let report = InfoReport {
        uri: source,
        duration: snapshot.duration,
        backend: snapshot.backend.map(|kind| kind.to_string()),
        state: snapshot.state,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(ExitCode::from(0))
}

struct ProcessRequest {
    mode: ProcessingMode,
    gain_db: Option<f64>,
    profile: MasteringProfile,
    user_id: String,
    output: Option<PathBuf>,
}

async fn run_process(engine: &AudioEngine, source: &str, request: ProcessRequest) -> Result<ExitCode> {
    engine
        .load_audio(source)
        .await
        .with_context(|| format!("loading {}", source))?;

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    engine.add_global_listener(move |event: &EngineEvent| {
        if let Ok(mut recorded) = sink.lock() {
            recorded.push(event.clone());
        }
    });

    engine.set_processing_mode(request.mode);
    if let Some(gain_db) = request.gain_db {
        engine.add_processing_module(
            ProcessingModule::new(ModuleKind::Gain).with_param("gain_db", gain_db),
        );
    }

    let options = ProcessOptions {
        mastering: MasteringOptions {
            profile: request.profile,
            ..Default::default()
        },
        ..Default::default()
    };
    let outcome = engine.process_audio(&request.user_id, options).await;
    let recorded = events.lock().map(|events| events.clone()).unwrap_or_default();

    match outcome {
        Ok(result) => {
            if let (ProcessingResult::Local(local), Some(path)) = (&result, &request.output) {
                let bytes = engine
                    .blob(&local.output_uri)
                    .ok_or_else(|| anyhow!("rendered blob {} missing", local.output_uri))?;
                fs::write(path, bytes.as_slice())
                    .with_context(|| format!("writing {}", path.display()))?;
            }
            let report = ProcessReport {
                mode: request.mode,
                result: &result,
                events: &recorded,
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(ExitCode::from(0))
        }
        Err(err) => {
            eprintln!("{}", serde_json::to_string_pretty(&err)?);
            Ok(ExitCode::from(2))
        }
    }
}

async fn run_analyze(engine: &AudioEngine, source: &str, user_id: &str) -> Result<ExitCode> {
    engine
        .load_audio(source)
        .await
        .with_context(|| format!("loading {}", source))?;
    match engine.analyze_audio(user_id).await {
        Ok(result) => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(ExitCode::from(0))
        }
        Err(err) => {
            eprintln!("{}", serde_json::to_string_pretty(&err)?);
            Ok(ExitCode::from(2))
        }
    }
}

fn parse_profile(name: &str) -> Result<MasteringProfile> {
    serde_json::from_value(serde_json::Value::String(name.to_string()))
        .map_err(|_| anyhow!("unknown mastering profile '{}'", name))
}

#[derive(Serialize)]
struct InfoReport<'a> {
    uri: &'a str,
    duration: f64,
    backend: Option<String>,
    state: mastering_engine::engine::PlaybackState,
}

#[derive(Serialize)]
struct ProcessReport<'a> {
    mode: ProcessingMode,
    result: &'a ProcessingResult,
    events: &'a [EngineEvent],
}
