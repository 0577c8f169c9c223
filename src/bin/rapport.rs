//! Rapport CLI - Command-line interface for Rapport Flux
//!
//! Commands:
//! - replay: Feed recorded session events through a pipeline and emit score payloads
//! - validate: Validate session event schema
//! - canonicalize: Map one upstream analysis result to the canonical score vector
//! - calibration: Print the default calibration or resolve a personal record
//! - doctor: Diagnose configuration and calibration files

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use log::{debug, info, warn};
use rapport_flux::calibration::{Calibration, CalibrationRecord, CalibrationReport};
use rapport_flux::canonical::{Canonicalizer, ResolutionTrace, UpstreamResult};
use rapport_flux::config::{PipelineConfig, CONFIG_ENV_VAR};
use rapport_flux::encoder::{ScorePayload, SnapshotEncoder, PAYLOAD_SCHEMA_VERSION};
use rapport_flux::pipeline::SessionPipeline;
use rapport_flux::schema::{SessionEvent, SessionEventAdapter, SCHEMA_VERSION};
use rapport_flux::types::CanonicalScoreVector;
use rapport_flux::{PRODUCER_NAME, RAPPORT_VERSION};

/// Rapport - On-device scoring engine for conversational coaching sessions
#[derive(Parser)]
#[command(name = "rapport")]
#[command(author = "Synheart AI Inc")]
#[command(version = RAPPORT_VERSION)]
#[command(about = "Turn recorded session events into rapport scores", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay session events through a scoring pipeline
    Replay {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,

        /// Emit a payload after every event or only once at the end
        #[arg(long, default_value = "final")]
        emit: EmitMode,

        /// Pipeline configuration file
        #[arg(long, env = CONFIG_ENV_VAR)]
        config: Option<PathBuf>,

        /// Personal calibration record to activate before replaying
        #[arg(long)]
        calibration: Option<PathBuf>,
    },

    /// Validate session event schema
    Validate {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Canonicalize one upstream analysis result
    Canonicalize {
        /// Input file path (use - for stdin)
        #[arg(short, long, default_value = "-")]
        input: PathBuf,

        /// Pipeline configuration file (posture tolerances)
        #[arg(long, env = CONFIG_ENV_VAR)]
        config: Option<PathBuf>,

        /// Include which field resolved each score
        #[arg(long)]
        trace: bool,
    },

    /// Print the default calibration or resolve a personal record
    Calibration {
        /// Calibration record to resolve
        #[arg(short, long)]
        record: Option<PathBuf>,
    },

    /// Diagnose configuration and calibration files
    Doctor {
        /// Check a pipeline configuration file
        #[arg(long, env = CONFIG_ENV_VAR)]
        config: Option<PathBuf>,

        /// Check a calibration record file
        #[arg(long)]
        calibration: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// Newline-delimited JSON (one event per line)
    Ndjson,
    /// JSON array of events
    Json,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Newline-delimited JSON (one payload per line)
    Ndjson,
    /// JSON array of payloads
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

#[derive(Clone, PartialEq, ValueEnum)]
enum EmitMode {
    /// One payload per applied event
    Every,
    /// One payload after the last event
    Final,
}

fn main() -> ExitCode {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Warn)
        .parse_default_env()
        .init();

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

fn run(cli: Cli) -> Result<(), RapportCliError> {
    match cli.command {
        Commands::Replay {
            input,
            output,
            input_format,
            output_format,
            emit,
            config,
            calibration,
        } => cmd_replay(
            &input,
            &output,
            input_format,
            output_format,
            emit,
            config.as_deref(),
            calibration.as_deref(),
        ),

        Commands::Validate {
            input,
            input_format,
            json,
        } => cmd_validate(&input, input_format, json),

        Commands::Canonicalize { input, config, trace } => {
            cmd_canonicalize(&input, config.as_deref(), trace)
        }

        Commands::Calibration { record } => cmd_calibration(record.as_deref()),

        Commands::Doctor {
            config,
            calibration,
            json,
        } => cmd_doctor(config.as_deref(), calibration.as_deref(), json),
    }
}

fn read_input(input: &Path) -> Result<String, RapportCliError> {
    if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn read_events(input: &Path, input_format: InputFormat) -> Result<Vec<SessionEvent>, RapportCliError> {
    let input_data = read_input(input)?;
    let events = match input_format {
        InputFormat::Ndjson => SessionEventAdapter::parse_ndjson(&input_data)?,
        InputFormat::Json => SessionEventAdapter::parse_array(&input_data)?,
    };
    Ok(events)
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig, RapportCliError> {
    match path {
        Some(path) => {
            info!("loading pipeline configuration from {}", path.display());
            Ok(PipelineConfig::from_json(&fs::read_to_string(path)?)?)
        }
        None => Ok(PipelineConfig::default()),
    }
}

fn cmd_replay(
    input: &Path,
    output: &Path,
    input_format: InputFormat,
    output_format: OutputFormat,
    emit: EmitMode,
    config: Option<&Path>,
    calibration: Option<&Path>,
) -> Result<(), RapportCliError> {
    let events = read_events(input, input_format)?;
    let Some(last_at) = events.last().map(|e| e.timestamp) else {
        return Err(RapportCliError::NoEvents);
    };

    let mut pipeline = SessionPipeline::with_config(load_config(config)?)?;

    if let Some(path) = calibration {
        let report = pipeline.load_calibration_json(&fs::read_to_string(path)?)?;
        if !report.is_valid {
            warn!(
                "calibration record {} rejected (missing {:?})",
                path.display(),
                report.missing_fields
            );
        }
    }

    let encoder = SnapshotEncoder::new();
    let mut payloads: Vec<ScorePayload> = Vec::new();

    for (index, event) in events.iter().enumerate() {
        let outcome = pipeline.apply(event).map_err(|e| RapportCliError::Event {
            index,
            message: e.to_string(),
        })?;
        debug!("event {} ({}) applied: {:?}", index, event.payload.type_name(), outcome);

        if emit == EmitMode::Every {
            payloads.push(encoder.encode(&pipeline.snapshot(event.timestamp)));
        }
    }

    if emit == EmitMode::Final {
        payloads.push(encoder.encode(&pipeline.snapshot(last_at)));
    }

    info!("replayed {} events into {} payloads", events.len(), payloads.len());

    let output_data = format_output(&payloads, &output_format)?;
    if output.to_string_lossy() == "-" {
        print!("{}", output_data);
    } else {
        fs::write(output, output_data)?;
    }

    Ok(())
}

fn cmd_validate(input: &Path, input_format: InputFormat, json: bool) -> Result<(), RapportCliError> {
    let events = read_events(input, input_format)?;
    let results = SessionEventAdapter::validate_events(&events);

    let report = ValidationReport {
        total_events: events.len(),
        valid_events: events.len() - results.len(),
        invalid_events: results.len(),
        errors: results
            .iter()
            .map(|r| ValidationErrorDetail {
                index: r.index,
                event_id: r.event_id.clone(),
                event_type: r.event_type.to_string(),
                error: r.error.to_string(),
            })
            .collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Total events:   {}", report.total_events);
        println!("Valid events:   {}", report.valid_events);
        println!("Invalid events: {}", report.invalid_events);

        if !report.errors.is_empty() {
            println!("\nErrors:");
            for err in &report.errors {
                println!(
                    "  - Event {} ({}, index {}): {}",
                    err.event_id.as_deref().unwrap_or("unknown"),
                    err.event_type,
                    err.index,
                    err.error
                );
            }
        }
    }

    if report.invalid_events > 0 {
        Err(RapportCliError::ValidationFailed(report.invalid_events))
    } else {
        Ok(())
    }
}

fn cmd_canonicalize(input: &Path, config: Option<&Path>, trace: bool) -> Result<(), RapportCliError> {
    let config = load_config(config)?;
    let result = UpstreamResult::from_json(&read_input(input)?)?;
    let canonicalizer = Canonicalizer::new(config.posture);

    if trace {
        let (vector, trace) = canonicalizer.canonicalize_traced(&result);
        let output = TracedVector { vector, trace };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("{}", serde_json::to_string_pretty(&canonicalizer.canonicalize(&result))?);
    }

    Ok(())
}

fn cmd_calibration(record: Option<&Path>) -> Result<(), RapportCliError> {
    match record {
        None => println!("{}", serde_json::to_string_pretty(&Calibration::default())?),
        Some(path) => {
            let record = CalibrationRecord::from_json(&fs::read_to_string(path)?)?;
            let (calibration, report) = record.resolve();
            let resolution = CalibrationResolution {
                active: if report.is_valid {
                    calibration
                } else {
                    Calibration::default()
                },
                report,
            };
            println!("{}", serde_json::to_string_pretty(&resolution)?);
        }
    }
    Ok(())
}

fn check_file(name: &str, path: &Path, check: impl FnOnce(&str) -> Result<String, String>) -> DoctorCheck {
    if !path.exists() {
        return DoctorCheck {
            name: name.to_string(),
            status: CheckStatus::Warning,
            message: format!("{} does not exist", path.display()),
        };
    }
    match fs::read_to_string(path) {
        Ok(content) => match check(&content) {
            Ok(message) => DoctorCheck {
                name: name.to_string(),
                status: CheckStatus::Ok,
                message,
            },
            Err(message) => DoctorCheck {
                name: name.to_string(),
                status: CheckStatus::Error,
                message,
            },
        },
        Err(e) => DoctorCheck {
            name: name.to_string(),
            status: CheckStatus::Error,
            message: format!("Cannot read {}: {}", path.display(), e),
        },
    }
}

fn cmd_doctor(config: Option<&Path>, calibration: Option<&Path>, json: bool) -> Result<(), RapportCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "rapport_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Rapport version {}", RAPPORT_VERSION),
    });

    checks.push(DoctorCheck {
        name: "schema_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Input schema: {}, output schema: {}", SCHEMA_VERSION, PAYLOAD_SCHEMA_VERSION),
    });

    if let Some(path) = config {
        checks.push(check_file("config", path, |content| {
            PipelineConfig::from_json(content)
                .map(|_| "Configuration valid".to_string())
                .map_err(|e| e.to_string())
        }));
    }

    if let Some(path) = calibration {
        let check = check_file("calibration", path, |content| {
            let report = CalibrationRecord::from_json(content)
                .map_err(|e| e.to_string())?
                .validate();
            if report.is_valid {
                Ok(format!("Calibration record valid (quality {:.2})", report.quality_score))
            } else {
                Err(format!(
                    "Calibration record would fall back to defaults (missing {})",
                    report.missing_fields.join(", ")
                ))
            }
        });
        checks.push(check);
    }

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

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: RAPPORT_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Rapport Doctor Report");
        println!("=====================");
        println!("Producer: {}", report.producer);
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
    }

    let has_errors = report.checks.iter().any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(RapportCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

fn format_output(payloads: &[ScorePayload], format: &OutputFormat) -> Result<String, RapportCliError> {
    match format {
        OutputFormat::Ndjson => {
            let mut lines: Vec<String> = Vec::new();
            for payload in payloads {
                lines.push(serde_json::to_string(payload)?);
            }
            Ok(lines.join("\n") + "\n")
        }
        OutputFormat::Json => Ok(serde_json::to_string(payloads)?),
        OutputFormat::JsonPretty => Ok(serde_json::to_string_pretty(payloads)?),
    }
}

#[derive(Debug)]
enum RapportCliError {
    Io(io::Error),
    Compute(rapport_flux::ComputeError),
    Json(serde_json::Error),
    Event { index: usize, message: String },
    NoEvents,
    ValidationFailed(usize),
    DoctorFailed,
}

impl From<io::Error> for RapportCliError {
    fn from(e: io::Error) -> Self {
        RapportCliError::Io(e)
    }
}

impl From<rapport_flux::ComputeError> for RapportCliError {
    fn from(e: rapport_flux::ComputeError) -> Self {
        RapportCliError::Compute(e)
    }
}

impl From<serde_json::Error> for RapportCliError {
    fn from(e: serde_json::Error) -> Self {
        RapportCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<RapportCliError> for CliError {
    fn from(e: RapportCliError) -> Self {
        match e {
            RapportCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            RapportCliError::Compute(e) => CliError {
                code: "PARSE_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Ensure input matches the session.event.v1 schema".to_string()),
            },
            RapportCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            RapportCliError::Event { index, message } => CliError {
                code: "EVENT_REJECTED".to_string(),
                message: format!("Event {} rejected: {}", index, message),
                hint: Some("Run 'rapport validate' for details".to_string()),
            },
            RapportCliError::NoEvents => CliError {
                code: "NO_EVENTS".to_string(),
                message: "No events found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            RapportCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} events failed validation", count),
                hint: Some("Fix validation errors and retry".to_string()),
            },
            RapportCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct ValidationReport {
    total_events: usize,
    valid_events: usize,
    invalid_events: usize,
    errors: Vec<ValidationErrorDetail>,
}

#[derive(serde::Serialize)]
struct ValidationErrorDetail {
    index: usize,
    event_id: Option<String>,
    event_type: String,
    error: String,
}

#[derive(serde::Serialize)]
struct TracedVector {
    vector: CanonicalScoreVector,
    trace: ResolutionTrace,
}

#[derive(serde::Serialize)]
struct CalibrationResolution {
    active: Calibration,
    report: CalibrationReport,
}

#[derive(serde::Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(serde::Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
