//! cogtrend CLI - Command-line interface for cogtrend
//!
//! Commands:
//! - generate: Simulate subjects and write their session rows
//! - assemble: Build a feature dataset from session rows
//! - synth: Simulate subjects and write the feature dataset directly
//! - config: Print the effective configuration

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use cogtrend::schema::{SessionRow, SessionRowAdapter};
use cogtrend::{BatchSummary, DatasetAssembler, GeneratorConfig, SlopePolicy, SynthError, VERSION};

/// cogtrend - Synthetic cognitive-assessment sessions and trend feature windows
#[derive(Parser)]
#[command(name = "cogtrend")]
#[command(version = VERSION)]
#[command(about = "Generate cognitive-assessment sessions and trend feature windows", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Settings shared by every command that builds an assembler
#[derive(clap::Args)]
struct RunArgs {
    /// Configuration file (JSON); flags override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of synthetic subjects
    #[arg(long)]
    subjects: Option<usize>,

    /// Base random seed
    #[arg(long)]
    seed: Option<u64>,

    /// Trailing sessions per window
    #[arg(long)]
    window: Option<usize>,

    /// Sequence the slope gradient is computed over
    #[arg(long)]
    slope_policy: Option<SlopeArg>,

    /// Process subjects on one thread
    #[arg(long)]
    sequential: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Simulate subjects and write one row per session
    Generate {
        #[command(flatten)]
        run: RunArgs,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: RowFormat,

        /// Keep full precision instead of rounding metrics
        #[arg(long)]
        full_precision: bool,
    },

    /// Build a feature dataset from session rows
    Assemble {
        #[command(flatten)]
        run: RunArgs,

        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: RowFormat,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,
    },

    /// Simulate subjects and write the feature dataset
    Synth {
        #[command(flatten)]
        run: RunArgs,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,
    },

    /// Print the effective configuration as JSON
    Config {
        #[command(flatten)]
        run: RunArgs,
    },
}

#[derive(Clone, ValueEnum)]
enum RowFormat {
    /// Newline-delimited JSON (one row per line)
    Ndjson,
    /// JSON array of rows
    Json,
    /// Pretty-printed JSON array
    JsonPretty,
    /// Comma-separated values with a header line
    Csv,
}

#[derive(Clone, ValueEnum)]
enum SlopeArg {
    /// Gradient over every session, then truncated
    Full,
    /// Gradient over the retained window only
    Window,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
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

fn run(cli: Cli) -> Result<(), CogtrendCliError> {
    match cli.command {
        Commands::Generate {
            run,
            output,
            output_format,
            full_precision,
        } => cmd_generate(&run, &output, output_format, full_precision),

        Commands::Assemble {
            run,
            input,
            input_format,
            output,
        } => cmd_assemble(&run, &input, input_format, &output),

        Commands::Synth { run, output } => cmd_synth(&run, &output),

        Commands::Config { run } => {
            let config = build_config(&run)?;
            println!("{}", config.to_json_pretty()?);
            Ok(())
        }
    }
}

fn cmd_generate(
    run: &RunArgs,
    output: &Path,
    output_format: RowFormat,
    full_precision: bool,
) -> Result<(), CogtrendCliError> {
    let assembler = DatasetAssembler::new(build_config(run)?)?;
    let (subjects, failed) = assembler.simulate_subjects()?;
    let rows = SessionRowAdapter::to_rows(&subjects, !full_precision);

    write_output(output, &format_rows(&rows, &output_format)?)?;
    eprintln!(
        "Generated {} rows for {} subjects ({} failed)",
        rows.len(),
        subjects.len(),
        failed.values().sum::<usize>()
    );
    Ok(())
}

fn cmd_assemble(
    run: &RunArgs,
    input: &Path,
    input_format: RowFormat,
    output: &Path,
) -> Result<(), CogtrendCliError> {
    let input_data = read_input(input)?;
    let rows = match input_format {
        RowFormat::Ndjson => SessionRowAdapter::parse_ndjson(&input_data)?,
        RowFormat::Json | RowFormat::JsonPretty => SessionRowAdapter::parse_array(&input_data)?,
        RowFormat::Csv => SessionRowAdapter::parse_csv(&input_data)?,
    };
    if rows.is_empty() {
        return Err(CogtrendCliError::NoRows);
    }

    let assembler = DatasetAssembler::new(build_config(run)?)?;
    let dataset = assembler.assemble(SessionRowAdapter::group(rows))?;

    write_output(output, &dataset.to_json()?)?;
    print_summary(&dataset.summary);
    Ok(())
}

fn cmd_synth(run: &RunArgs, output: &Path) -> Result<(), CogtrendCliError> {
    let assembler = DatasetAssembler::new(build_config(run)?)?;
    let batch = assembler.generate()?;

    write_output(output, &batch.dataset.to_json()?)?;
    print_summary(&batch.dataset.summary);
    Ok(())
}

// Helper functions

fn build_config(run: &RunArgs) -> Result<GeneratorConfig, CogtrendCliError> {
    let mut config = match &run.config {
        Some(path) => GeneratorConfig::load(path)?,
        None => GeneratorConfig::default(),
    };

    if let Some(subjects) = run.subjects {
        config.subjects = subjects;
    }
    if let Some(seed) = run.seed {
        config.seed = seed;
    }
    if let Some(window) = run.window {
        config.window_size = window;
    }
    if let Some(slope) = &run.slope_policy {
        config.slope_policy = match slope {
            SlopeArg::Full => SlopePolicy::FullSequence,
            SlopeArg::Window => SlopePolicy::RetainedWindow,
        };
    }
    if run.sequential {
        config.parallel = false;
    }

    config.validate()?;
    Ok(config)
}

fn read_input(input: &Path) -> Result<String, CogtrendCliError> {
    if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn write_output(output: &Path, data: &str) -> Result<(), CogtrendCliError> {
    if output.to_string_lossy() == "-" {
        println!("{}", data.trim_end());
    } else {
        fs::write(output, data)?;
    }
    Ok(())
}

fn format_rows(rows: &[SessionRow], format: &RowFormat) -> Result<String, CogtrendCliError> {
    match format {
        RowFormat::Ndjson => Ok(SessionRowAdapter::to_ndjson(rows)?),
        RowFormat::Json => Ok(serde_json::to_string(rows)?),
        RowFormat::JsonPretty => Ok(serde_json::to_string_pretty(rows)?),
        RowFormat::Csv => Ok(SessionRowAdapter::to_csv(rows)?),
    }
}

fn print_summary(summary: &BatchSummary) {
    eprintln!("Batch Summary");
    eprintln!("=============");
    eprintln!("Subjects:  {}", summary.subjects_total);
    eprintln!("Windowed:  {}", summary.subjects_windowed);
    eprintln!("Excluded:  {}", summary.subjects_excluded);
    eprintln!("Failed:    {}", summary.subjects_failed);
    for (pattern, count) in &summary.pattern_counts {
        eprintln!("  {pattern}: {count}");
    }
    for (label, count) in &summary.label_counts {
        eprintln!("  label {label}: {count}");
    }
}

// Error types

#[derive(Debug)]
enum CogtrendCliError {
    Io(io::Error),
    Synth(SynthError),
    Json(serde_json::Error),
    NoRows,
}

impl From<io::Error> for CogtrendCliError {
    fn from(e: io::Error) -> Self {
        CogtrendCliError::Io(e)
    }
}

impl From<SynthError> for CogtrendCliError {
    fn from(e: SynthError) -> Self {
        CogtrendCliError::Synth(e)
    }
}

impl From<serde_json::Error> for CogtrendCliError {
    fn from(e: serde_json::Error) -> Self {
        CogtrendCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<CogtrendCliError> for CliError {
    fn from(e: CogtrendCliError) -> Self {
        match e {
            CogtrendCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            CogtrendCliError::Synth(e @ SynthError::Io(_)) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check the configuration file path".to_string()),
            },
            CogtrendCliError::Synth(e @ SynthError::Configuration(_)) => CliError {
                code: "CONFIG_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Run `cogtrend config` to see the effective settings".to_string()),
            },
            CogtrendCliError::Synth(e) => CliError {
                code: "PARSE_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Ensure rows carry subject_id, session_id, date, the four metrics and pattern_type".to_string()),
            },
            CogtrendCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            CogtrendCliError::NoRows => CliError {
                code: "NO_ROWS".to_string(),
                message: "No session rows found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
        }
    }
}
