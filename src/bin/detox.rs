//! Detox CLI - Command-line interface for the detox engine
//!
//! Commands:
//! - replay: Drive an engine with a recorded event log and print the issued commands
//! - schedule: Evaluate schedule rules at a given local date-time
//! - doctor: Diagnose configuration and preference files

use chrono::NaiveDateTime;
use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use detox_engine::{
    Capability, DetoxEngine, DeviceCommand, EngineConfig, EngineError, EngineEvent, EngineState,
    Feature, ManualClock, MemoryStore, PauseOutcome, Permission, RecordingController,
    ScheduleRule, ENGINE_VERSION,
};

/// Detox - On-device feature engine for digital-detox interventions
#[derive(Parser)]
#[command(name = "detox")]
#[command(author = "DetoxDroid contributors")]
#[command(version = ENGINE_VERSION)]
#[command(about = "Replay and inspect detox engine behavior", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a timestamped event log against a simulated device
    Replay {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,

        /// Engine configuration file (JSON)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Load feature preferences from file
        #[arg(long)]
        prefs: Option<PathBuf>,

        /// Save feature preferences to file after the replay
        #[arg(long)]
        save_prefs: Option<PathBuf>,
    },

    /// Evaluate schedule rules such as "1|2|3|4|5,09:00,17:00"
    Schedule {
        /// Local date-time to evaluate at, e.g. 2024-01-15T09:30:00
        #[arg(long)]
        at: NaiveDateTime,

        /// Rules to evaluate; no rules means always scheduled
        rules: Vec<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Diagnose configuration and preference files
    Doctor {
        /// Engine configuration file (JSON)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Feature preferences file (JSON)
        #[arg(long)]
        prefs: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Newline-delimited JSON (one record per event)
    Ndjson,
    /// JSON array of records
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), DetoxCliError> {
    match cli.command {
        Commands::Replay {
            input,
            output,
            output_format,
            config,
            prefs,
            save_prefs,
        } => cmd_replay(
            &input,
            &output,
            output_format,
            config.as_deref(),
            prefs.as_deref(),
            save_prefs.as_deref(),
        ),

        Commands::Schedule { at, rules, json } => cmd_schedule(at, &rules, json),

        Commands::Doctor { config, prefs, json } => {
            cmd_doctor(config.as_deref(), prefs.as_deref(), json)
        }
    }
}

/// One line of a replay log
#[derive(Deserialize)]
struct TimedEvent {
    at: NaiveDateTime,
    event: EngineEvent,
}

/// What the engine did in response to one event
#[derive(Serialize)]
struct ReplayRecord {
    line: usize,
    at: NaiveDateTime,
    event: EngineEvent,
    #[serde(skip_serializing_if = "Option::is_none")]
    outcome: Option<PauseOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    commands: Vec<DeviceCommand>,
    state: EngineState,
}

fn cmd_replay(
    input: &Path,
    output: &Path,
    output_format: OutputFormat,
    config: Option<&Path>,
    prefs: Option<&Path>,
    save_prefs: Option<&Path>,
) -> Result<(), DetoxCliError> {
    let config = load_config(config)?;
    let store = Arc::new(load_prefs(prefs)?);

    let input_data = read_input(input)?;
    let mut events = Vec::new();
    for (index, line) in input_data.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let event: TimedEvent = serde_json::from_str(trimmed).map_err(|e| {
            DetoxCliError::ParseError(format!("Failed to parse line {}: {}", index + 1, e))
        })?;
        events.push((index + 1, event));
    }

    let Some((_, first)) = events.first() else {
        return Err(DetoxCliError::NoEvents);
    };

    let clock = ManualClock::new(first.at);
    let device = Arc::new(RecordingController::new());
    let engine = DetoxEngine::new(config, store.clone(), device.clone(), Arc::new(clock.clone()))?;

    let mut records = Vec::with_capacity(events.len());
    for (line, timed) in events {
        clock.set(timed.at);
        let (outcome, error) = match &timed.event {
            EngineEvent::TogglePause => (Some(engine.toggle_pause()), None),
            event => (None, engine.dispatch(event).err().map(|e| e.to_string())),
        };
        records.push(ReplayRecord {
            line,
            at: timed.at,
            event: timed.event,
            outcome,
            error,
            commands: device.take_commands(),
            state: engine.state(),
        });
    }

    if let Some(path) = save_prefs {
        fs::write(path, store.to_json()?)?;
    }

    let output_data = format_output(&records, &output_format)?;
    if output.to_string_lossy() == "-" {
        print!("{}", output_data);
    } else {
        fs::write(output, output_data)?;
    }

    Ok(())
}

#[derive(Serialize)]
struct ScheduleReport {
    at: NaiveDateTime,
    scheduled: bool,
    rules: Vec<RuleResult>,
}

#[derive(Serialize)]
struct RuleResult {
    rule: String,
    active: bool,
}

fn cmd_schedule(at: NaiveDateTime, rules: &[String], json: bool) -> Result<(), DetoxCliError> {
    let parsed = rules
        .iter()
        .map(|r| r.parse::<ScheduleRule>())
        .collect::<Result<Vec<_>, _>>()?;

    let report = ScheduleReport {
        at,
        scheduled: detox_engine::schedule::is_scheduled(&parsed, at),
        rules: parsed
            .iter()
            .map(|rule| RuleResult {
                rule: rule.to_string(),
                active: rule.is_active(at),
            })
            .collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Schedule at {}", report.at);
        for rule in &report.rules {
            let status = if rule.active { "[ACTIVE]" } else { "[ ]" };
            println!("  {} {}", status, rule.rule);
        }
        println!("Scheduled: {}", if report.scheduled { "yes" } else { "no" });
    }

    Ok(())
}

fn cmd_doctor(config: Option<&Path>, prefs: Option<&Path>, json: bool) -> Result<(), DetoxCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "engine_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Detox engine version {}", ENGINE_VERSION),
    });

    let effective_config = match config {
        Some(path) => match load_config(Some(path)) {
            Ok(config) => {
                checks.push(DoctorCheck {
                    name: "config".to_string(),
                    status: CheckStatus::Ok,
                    message: format!("Config file valid ({})", path.display()),
                });
                Some(config)
            }
            Err(e) => {
                checks.push(DoctorCheck {
                    name: "config".to_string(),
                    status: CheckStatus::Error,
                    message: CliError::from(e).message,
                });
                None
            }
        },
        None => {
            checks.push(DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Ok,
                message: "No config file, using defaults".to_string(),
            });
            Some(EngineConfig::default())
        }
    };

    let store = match prefs {
        Some(path) if !path.exists() => {
            checks.push(DoctorCheck {
                name: "prefs".to_string(),
                status: CheckStatus::Warning,
                message: "Preferences file does not exist".to_string(),
            });
            None
        }
        Some(path) => match load_prefs(Some(path)) {
            Ok(store) => {
                checks.push(DoctorCheck {
                    name: "prefs".to_string(),
                    status: CheckStatus::Ok,
                    message: format!("Preferences file valid ({} entries)", store.len()),
                });
                Some(store)
            }
            Err(e) => {
                checks.push(DoctorCheck {
                    name: "prefs".to_string(),
                    status: CheckStatus::Error,
                    message: CliError::from(e).message,
                });
                None
            }
        },
        None => Some(MemoryStore::new()),
    };

    // Check stdin is available (for replaying from a pipe)
    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a TTY (interactive mode)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a pipe (replay ready)".to_string(),
        }
    };
    checks.push(stdin_check);

    let mut features = Vec::new();
    if let (Some(config), Some(store)) = (effective_config.clone(), store) {
        let engine = DetoxEngine::new(
            config,
            Arc::new(store),
            Arc::new(RecordingController::new()),
            Arc::new(detox_engine::SystemClock::new()),
        )?;
        for feature in engine.registry().features() {
            features.push(FeatureSummary {
                id: feature.id().to_string(),
                activated: feature.is_activated(),
                active_now: feature.is_active(),
                capabilities: feature.capabilities().to_vec(),
                permission: feature.required_permission(),
            });
        }
    }

    let report = DoctorReport {
        version: ENGINE_VERSION.to_string(),
        checks,
        config: effective_config,
        features,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Detox Doctor Report");
        println!("===================");
        println!("Version:  {}", report.version);
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }

        if !report.features.is_empty() {
            println!("\nFeatures:");
            for feature in &report.features {
                let status = match (feature.activated, feature.active_now) {
                    (true, true) => "active",
                    (true, false) => "activated, outside schedule",
                    (false, _) => "off",
                };
                println!("  - {}: {}", feature.id, status);
            }
        }
    }

    let has_errors = report
        .checks
        .iter()
        .any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(DetoxCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

// Helper functions

fn read_input(input: &Path) -> Result<String, DetoxCliError> {
    if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig, DetoxCliError> {
    match path {
        Some(path) => Ok(EngineConfig::from_json(&fs::read_to_string(path)?)?),
        None => Ok(EngineConfig::default()),
    }
}

fn load_prefs(path: Option<&Path>) -> Result<MemoryStore, DetoxCliError> {
    match path {
        Some(path) => Ok(MemoryStore::from_json(&fs::read_to_string(path)?)?),
        None => Ok(MemoryStore::new()),
    }
}

fn format_output(records: &[ReplayRecord], format: &OutputFormat) -> Result<String, DetoxCliError> {
    match format {
        OutputFormat::Ndjson => {
            let mut lines: Vec<String> = Vec::new();
            for record in records {
                lines.push(serde_json::to_string(record)?);
            }
            Ok(lines.join("\n") + "\n")
        }
        OutputFormat::Json => Ok(serde_json::to_string(records)?),
        OutputFormat::JsonPretty => Ok(serde_json::to_string_pretty(records)?),
    }
}

// Error types

#[derive(Debug)]
enum DetoxCliError {
    Io(io::Error),
    Engine(EngineError),
    Json(serde_json::Error),
    NoEvents,
    DoctorFailed,
    ParseError(String),
}

impl From<io::Error> for DetoxCliError {
    fn from(e: io::Error) -> Self {
        DetoxCliError::Io(e)
    }
}

impl From<EngineError> for DetoxCliError {
    fn from(e: EngineError) -> Self {
        DetoxCliError::Engine(e)
    }
}

impl From<serde_json::Error> for DetoxCliError {
    fn from(e: serde_json::Error) -> Self {
        DetoxCliError::Json(e)
    }
}

#[derive(Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<DetoxCliError> for CliError {
    fn from(e: DetoxCliError) -> Self {
        match e {
            DetoxCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            DetoxCliError::Engine(e @ EngineError::InvalidConfig(_)) => CliError {
                code: "CONFIG_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Intervals must be positive and host_package set".to_string()),
            },
            DetoxCliError::Engine(e @ EngineError::InvalidScheduleRule(_)) => CliError {
                code: "SCHEDULE_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Rules look like \"1|2|3|4|5,09:00,17:00\" (Monday = 1)".to_string()),
            },
            DetoxCliError::Engine(e) => CliError {
                code: "ENGINE_ERROR".to_string(),
                message: e.to_string(),
                hint: None,
            },
            DetoxCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            DetoxCliError::NoEvents => CliError {
                code: "NO_EVENTS".to_string(),
                message: "No events found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            DetoxCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
            DetoxCliError::ParseError(msg) => CliError {
                code: "PARSE_ERROR".to_string(),
                message: msg,
                hint: Some(
                    "Each line must be {\"at\": \"<local date-time>\", \"event\": {\"type\": ...}}"
                        .to_string(),
                ),
            },
        }
    }
}

// Report types

#[derive(Serialize)]
struct DoctorReport {
    version: String,
    checks: Vec<DoctorCheck>,
    config: Option<EngineConfig>,
    features: Vec<FeatureSummary>,
}

#[derive(Serialize)]
struct FeatureSummary {
    id: String,
    activated: bool,
    active_now: bool,
    capabilities: Vec<Capability>,
    permission: Option<Permission>,
}

#[derive(Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
