//! Gluco CLI - Command-line interface for Gluco Flux
//!
//! Commands:
//! - analyze: Analyze a request document or NDJSON readings (batch mode)
//! - validate: Validate readings against glucose.reading.v1
//! - doctor: Diagnose version, configuration and input mode
//! - schema: Print input and output schema information

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use gluco_flux::encoder::REPORT_VERSION;
use gluco_flux::schema::{AnalysisRequest, GlucoseUnit, Reading, ReadingAdapter, TargetRange};
use gluco_flux::{AnalysisConfig, GlucoseAnalyzer, GLUCO_VERSION, PRODUCER_NAME, SCHEMA_VERSION};

/// Gluco - deterministic analytics for blood-glucose readings
#[derive(Parser)]
#[command(name = "gluco")]
#[command(version = GLUCO_VERSION)]
#[command(about = "Turn glucose readings into a structured analysis report", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze readings and print the report
    Analyze {
        /// Input file path (use - for stdin)
        #[arg(short, long, default_value = "-")]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Input format
        #[arg(long, value_enum, default_value = "request")]
        input_format: InputFormat,

        /// Output format
        #[arg(long, value_enum, default_value = "json-pretty")]
        output_format: OutputFormat,

        /// Lower bound of the target range (NDJSON input only)
        #[arg(long)]
        target_min: Option<f64>,

        /// Upper bound of the target range (NDJSON input only)
        #[arg(long)]
        target_max: Option<f64>,

        /// Unit of the readings (NDJSON input only)
        #[arg(long, value_enum, default_value = "mg-dl")]
        unit: UnitArg,

        /// Analysis configuration JSON file
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Validate readings against the input schema
    Validate {
        /// Input file path (use - for stdin)
        #[arg(short, long, default_value = "-")]
        input: PathBuf,

        /// Input format
        #[arg(long, value_enum, default_value = "request")]
        input_format: InputFormat,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check the installation and configuration
    Doctor {
        /// Check an analysis configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print schema information
    Schema {
        /// Schema to print (input or output)
        #[arg(value_enum)]
        schema_type: SchemaType,

        /// Output as JSON schema
        #[arg(long)]
        json_schema: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// A full glucose.reading.v1 request document
    Request,
    /// Newline-delimited JSON (one reading per line)
    Ndjson,
    /// JSON array of readings
    Json,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Compact JSON on a single line
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

#[derive(Clone, Copy, ValueEnum)]
enum UnitArg {
    /// Milligrams per deciliter
    MgDl,
    /// Millimoles per liter
    MmolL,
}

impl From<UnitArg> for GlucoseUnit {
    fn from(unit: UnitArg) -> Self {
        match unit {
            UnitArg::MgDl => GlucoseUnit::MgDl,
            UnitArg::MmolL => GlucoseUnit::MmolL,
        }
    }
}

#[derive(Clone, ValueEnum)]
enum SchemaType {
    /// Input schema (glucose.reading.v1)
    Input,
    /// Output schema (analysis report)
    Output,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), GlucoCliError> {
    match cli.command {
        Commands::Analyze {
            input,
            output,
            input_format,
            output_format,
            target_min,
            target_max,
            unit,
            config,
        } => cmd_analyze(
            &input,
            &output,
            input_format,
            output_format,
            target_min,
            target_max,
            unit.into(),
            config.as_deref(),
        ),

        Commands::Validate {
            input,
            input_format,
            json,
        } => cmd_validate(&input, input_format, json),

        Commands::Doctor { config, json } => cmd_doctor(config.as_deref(), json),

        Commands::Schema {
            schema_type,
            json_schema,
        } => cmd_schema(schema_type, json_schema),
    }
}

#[allow(clippy::too_many_arguments)]
fn cmd_analyze(
    input: &Path,
    output: &Path,
    input_format: InputFormat,
    output_format: OutputFormat,
    target_min: Option<f64>,
    target_max: Option<f64>,
    unit: GlucoseUnit,
    config_path: Option<&Path>,
) -> Result<(), GlucoCliError> {
    let input_data = read_input(input)?;

    let request = match input_format {
        InputFormat::Request => {
            if target_min.is_some() || target_max.is_some() {
                return Err(GlucoCliError::Usage(
                    "--target-min/--target-max apply to reading lists, not request documents"
                        .to_string(),
                ));
            }
            ReadingAdapter::parse_request(&input_data)?
        }
        InputFormat::Ndjson | InputFormat::Json => {
            let readings = parse_readings(&input_data, &input_format)?;
            let defaults = TargetRange::default();
            let mut request = AnalysisRequest::new(
                TargetRange::new(
                    target_min.unwrap_or(defaults.min),
                    target_max.unwrap_or(defaults.max),
                ),
                readings,
            );
            request.unit = unit;
            request
        }
    };

    let config = match config_path {
        Some(path) => AnalysisConfig::from_json(&fs::read_to_string(path)?)?,
        None => AnalysisConfig::for_unit(request.unit).with_environment_overrides()?,
    };
    debug!(unit = config.unit.as_str(), "configuration loaded");

    let reading_count = request.readings.len();
    let report = GlucoseAnalyzer::new(config).analyze_request(request)?;
    info!(
        readings = reading_count,
        analyzed = report.reading_count,
        "analysis report ready"
    );

    let output_data = match output_format {
        OutputFormat::Json => serde_json::to_string(&report)?,
        OutputFormat::JsonPretty => serde_json::to_string_pretty(&report)?,
    };

    if output.to_string_lossy() == "-" {
        println!("{}", output_data);
    } else {
        fs::write(output, output_data + "\n")?;
    }

    Ok(())
}

fn cmd_validate(input: &Path, input_format: InputFormat, json: bool) -> Result<(), GlucoCliError> {
    let input_data = read_input(input)?;

    let (readings, request_error) = match input_format {
        InputFormat::Request => {
            let request = ReadingAdapter::parse_request(&input_data)?;
            let request_error = request.validate().err().map(|e| e.to_string());
            (request.readings, request_error)
        }
        InputFormat::Ndjson | InputFormat::Json => {
            (parse_readings(&input_data, &input_format)?, None)
        }
    };

    let results = ReadingAdapter::validate_readings(&readings);

    let report = ValidationReport {
        total_readings: readings.len(),
        valid_readings: readings.len() - results.len(),
        invalid_readings: results.len(),
        request_error,
        errors: results
            .iter()
            .map(|r| ValidationErrorDetail {
                index: r.index,
                timestamp: r.timestamp.clone(),
                error: r.result.as_ref().map(|e| e.to_string()).unwrap_or_default(),
            })
            .collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Total readings:   {}", report.total_readings);
        println!("Valid readings:   {}", report.valid_readings);
        println!("Invalid readings: {}", report.invalid_readings);

        if let Some(err) = &report.request_error {
            println!("\nRequest error: {}", err);
        }

        if !report.errors.is_empty() {
            println!("\nErrors:");
            for err in &report.errors {
                println!(
                    "  - Reading at {} (index {}): {}",
                    err.timestamp, err.index, err.error
                );
            }
        }
    }

    if report.request_error.is_some() {
        Err(GlucoCliError::RequestInvalid)
    } else if report.invalid_readings > 0 {
        Err(GlucoCliError::ValidationFailed(report.invalid_readings))
    } else {
        Ok(())
    }
}

fn cmd_doctor(config_path: Option<&Path>, json: bool) -> Result<(), GlucoCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "gluco_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Gluco Flux version {}", GLUCO_VERSION),
    });

    checks.push(DoctorCheck {
        name: "schema_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Input schema: {}", SCHEMA_VERSION),
    });

    checks.push(match AnalysisConfig::from_environment() {
        Ok(config) => DoctorCheck {
            name: "environment".to_string(),
            status: CheckStatus::Ok,
            message: format!(
                "Environment configuration valid (min_readings {}, max_readings {})",
                config.sample.min_readings, config.sample.max_readings
            ),
        },
        Err(e) => DoctorCheck {
            name: "environment".to_string(),
            status: CheckStatus::Error,
            message: format!("Invalid GLUCO_* override: {}", e),
        },
    });

    if let Some(path) = config_path {
        let check = if !path.exists() {
            DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Warning,
                message: "Configuration file does not exist".to_string(),
            }
        } else {
            match fs::read_to_string(path) {
                Ok(content) => match AnalysisConfig::from_json(&content) {
                    Ok(config) => DoctorCheck {
                        name: "config".to_string(),
                        status: CheckStatus::Ok,
                        message: format!(
                            "Configuration file valid (unit {})",
                            config.unit.as_str()
                        ),
                    },
                    Err(e) => DoctorCheck {
                        name: "config".to_string(),
                        status: CheckStatus::Error,
                        message: format!("Invalid configuration: {}", e),
                    },
                },
                Err(e) => DoctorCheck {
                    name: "config".to_string(),
                    status: CheckStatus::Error,
                    message: format!("Cannot read configuration file: {}", e),
                },
            }
        };
        checks.push(check);
    }

    // Piped stdin means `gluco analyze` can read from it directly
    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a TTY (pass --input to analyze a file)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a pipe (ready to analyze piped input)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: GLUCO_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Gluco Doctor Report");
        println!("===================");
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

    let has_errors = report
        .checks
        .iter()
        .any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(GlucoCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

fn cmd_schema(schema_type: SchemaType, json_schema: bool) -> Result<(), GlucoCliError> {
    match schema_type {
        SchemaType::Input => {
            if json_schema {
                println!("{}", get_input_json_schema());
            } else {
                println!("Input Schema: {}", SCHEMA_VERSION);
                println!();
                println!("A request document contains:");
                println!();
                println!("- schema_version: {} (optional)", SCHEMA_VERSION);
                println!("- unit: mg/dL or mmol/L (default mg/dL)");
                println!("- target_range: {{ min, max }} (default 80-180 mg/dL)");
                println!("- readings: Array of readings, each with:");
                println!("  - value, timestamp (required)");
                println!("  - unit, reading_context, meal_context");
                println!("  - carbs_grams, exercise_minutes, medication_taken, insulin_units");
                println!("  - stress_level (1-10), sleep_hours (0-24), illness");
                println!();
                println!("reading_context: fasting, before_meal, after_meal, bedtime, random");
                println!("meal_context: breakfast, lunch, dinner, snack, other");
            }
        }
        SchemaType::Output => {
            if json_schema {
                println!("{}", get_output_json_schema());
            } else {
                println!("Output Schema: analysis report {}", REPORT_VERSION);
                println!();
                println!("- report_version, producer {{ name, version, instance_id }}");
                println!("- computed_at_utc, reading_count");
                println!("- window: {{ first_reading_utc, last_reading_utc }}");
                println!("- analysis: {{ status, message, ... }} containing:");
                println!("  - overview: averages, variability and time in range");
                println!("  - trends: least-squares trend and short-term forecast");
                println!("  - patterns: hourly/daily averages and behavioral clusters");
                println!("  - anomaly_detection: statistical and isolation-forest flags");
                println!("  - risk_assessment: weighted risk score and factors");
                println!("  - time_analysis, meal_correlation, exercise_impact");
                println!("  - medication_effectiveness");
                println!("  - recommendations: prioritized list of actions");
            }
        }
    }
    Ok(())
}

// Helper functions

fn read_input(input: &Path) -> Result<String, GlucoCliError> {
    if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn parse_readings(input_data: &str, format: &InputFormat) -> Result<Vec<Reading>, GlucoCliError> {
    let readings = match format {
        InputFormat::Json => ReadingAdapter::parse_array(input_data)?,
        _ => ReadingAdapter::parse_ndjson(input_data)?,
    };
    if readings.is_empty() {
        return Err(GlucoCliError::NoReadings);
    }
    Ok(readings)
}

fn get_input_json_schema() -> String {
    serde_json::json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": SCHEMA_VERSION,
        "description": "Glucose analysis request",
        "type": "object",
        "required": ["readings"],
        "properties": {
            "schema_version": { "type": "string", "const": SCHEMA_VERSION },
            "unit": { "type": "string", "enum": ["mg/dL", "mmol/L"] },
            "target_range": {
                "type": "object",
                "required": ["min", "max"],
                "properties": {
                    "min": { "type": "number" },
                    "max": { "type": "number" }
                }
            },
            "readings": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["value", "timestamp"],
                    "properties": {
                        "value": { "type": "number", "exclusiveMinimum": 0 },
                        "unit": { "type": "string", "enum": ["mg/dL", "mmol/L"] },
                        "timestamp": { "type": "string", "format": "date-time" },
                        "reading_context": {
                            "type": "string",
                            "enum": ["fasting", "before_meal", "after_meal", "bedtime", "random"]
                        },
                        "meal_context": {
                            "type": "string",
                            "enum": ["breakfast", "lunch", "dinner", "snack", "other"]
                        },
                        "carbs_grams": { "type": "integer", "minimum": 0 },
                        "exercise_minutes": { "type": "integer", "minimum": 0 },
                        "medication_taken": { "type": "boolean" },
                        "insulin_units": { "type": "number", "minimum": 0 },
                        "stress_level": { "type": "integer", "minimum": 1, "maximum": 10 },
                        "sleep_hours": { "type": "number", "minimum": 0, "maximum": 24 },
                        "illness": { "type": "boolean" }
                    }
                }
            }
        }
    })
    .to_string()
}

fn get_output_json_schema() -> String {
    let section = serde_json::json!({
        "type": "object",
        "required": ["status"],
        "properties": {
            "status": { "type": "string", "enum": ["available", "insufficient_data", "unavailable"] }
        }
    });
    serde_json::json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": "glucose analysis report",
        "type": "object",
        "required": ["report_version", "producer", "computed_at_utc", "reading_count", "window", "analysis"],
        "properties": {
            "report_version": { "type": "string", "const": REPORT_VERSION },
            "producer": {
                "type": "object",
                "properties": {
                    "name": { "type": "string" },
                    "version": { "type": "string" },
                    "instance_id": { "type": "string" }
                }
            },
            "computed_at_utc": { "type": "string", "format": "date-time" },
            "reading_count": { "type": "integer" },
            "window": {
                "type": "object",
                "properties": {
                    "first_reading_utc": { "type": ["string", "null"] },
                    "last_reading_utc": { "type": ["string", "null"] }
                }
            },
            "analysis": {
                "type": "object",
                "required": ["status", "overview", "trends", "patterns", "recommendations"],
                "properties": {
                    "status": { "type": "string", "enum": ["complete", "insufficient_data", "error"] },
                    "message": { "type": "string" },
                    "overview": { "type": "object" },
                    "trends": { "type": "object" },
                    "patterns": { "type": "object" },
                    "anomaly_detection": section,
                    "risk_assessment": section,
                    "time_analysis": section,
                    "meal_correlation": section,
                    "exercise_impact": section,
                    "medication_effectiveness": section,
                    "recommendations": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "required": ["type", "priority", "title", "message", "action"]
                        }
                    }
                }
            }
        }
    })
    .to_string()
}

// Report types

#[derive(serde::Serialize)]
struct ValidationReport {
    total_readings: usize,
    valid_readings: usize,
    invalid_readings: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_error: Option<String>,
    errors: Vec<ValidationErrorDetail>,
}

#[derive(serde::Serialize)]
struct ValidationErrorDetail {
    index: usize,
    timestamp: String,
    error: String,
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
#[serde(rename_all = "lowercase")]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}

// Error types

#[derive(Debug)]
enum GlucoCliError {
    Io(io::Error),
    Compute(gluco_flux::ComputeError),
    Config(gluco_flux::ConfigError),
    Json(serde_json::Error),
    Usage(String),
    NoReadings,
    RequestInvalid,
    ValidationFailed(usize),
    DoctorFailed,
}

impl From<io::Error> for GlucoCliError {
    fn from(e: io::Error) -> Self {
        GlucoCliError::Io(e)
    }
}

impl From<gluco_flux::ComputeError> for GlucoCliError {
    fn from(e: gluco_flux::ComputeError) -> Self {
        GlucoCliError::Compute(e)
    }
}

impl From<gluco_flux::ConfigError> for GlucoCliError {
    fn from(e: gluco_flux::ConfigError) -> Self {
        GlucoCliError::Config(e)
    }
}

impl From<serde_json::Error> for GlucoCliError {
    fn from(e: serde_json::Error) -> Self {
        GlucoCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<GlucoCliError> for CliError {
    fn from(e: GlucoCliError) -> Self {
        match e {
            GlucoCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            GlucoCliError::Compute(e) => CliError {
                code: "ANALYSIS_ERROR".to_string(),
                message: e.to_string(),
                hint: Some(format!(
                    "Ensure input matches the {} schema; run 'gluco validate' for details",
                    SCHEMA_VERSION
                )),
            },
            GlucoCliError::Config(e) => CliError {
                code: "CONFIG_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Run 'gluco doctor' to check configuration".to_string()),
            },
            GlucoCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            GlucoCliError::Usage(msg) => CliError {
                code: "USAGE_ERROR".to_string(),
                message: msg,
                hint: Some("Run 'gluco analyze --help'".to_string()),
            },
            GlucoCliError::NoReadings => CliError {
                code: "NO_READINGS".to_string(),
                message: "No readings found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            GlucoCliError::RequestInvalid => CliError {
                code: "REQUEST_INVALID".to_string(),
                message: "Request document failed validation".to_string(),
                hint: Some("Check schema_version and target_range".to_string()),
            },
            GlucoCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} readings failed validation", count),
                hint: Some("Fix validation errors and retry".to_string()),
            },
            GlucoCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}
