use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use is_terminal::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use fudge::pattern_extraction::list_presets;
use fudge::{
    resolve_sources, CancellationToken, ConfigError, ErrorStrategy, FilterCommand, FormatSpec,
    OutputSink, PipelineConfig, ProcessingError, ProcessingStats, Settings, StreamPipeline,
};

#[derive(Parser)]
#[command(name = "fudge")]
#[command(about = "Parse web server access logs into JSON Lines")]
#[command(version)]
struct Args {
    /// Input files or glob patterns (default: stdin)
    #[arg(value_name = "PATTERN")]
    inputs: Vec<String>,

    /// Preset name, custom format name, or regex with named groups [default: combined]
    #[arg(short = 'f', long = "format", value_name = "FORMAT")]
    format: Option<String>,

    /// nginx log_format template, e.g. '$remote_addr [$time_local] "$request"'
    #[arg(
        short = 't',
        long = "template",
        value_name = "LOG_FORMAT",
        conflicts_with = "format"
    )]
    template: Option<String>,

    /// Decompress gzip input on the fly
    #[arg(short = 'g', long)]
    gzip: bool,

    /// Pipe output through this executable
    #[arg(short = 'p', long = "filter", value_name = "PATH")]
    filter: Option<PathBuf>,

    /// Argument passed to the filter (repeatable)
    #[arg(
        long = "filter-arg",
        value_name = "ARG",
        action = ArgAction::Append,
        allow_hyphen_values = true
    )]
    filter_args: Vec<String>,

    /// YAML settings file
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Stop at the first unparsable line instead of skipping it
    #[arg(long)]
    fail_fast: bool,

    /// Maximum line length in bytes [default: 1048576]
    #[arg(long, value_name = "N")]
    max_line_length: Option<usize>,

    /// Read buffer size
    #[arg(long, default_value = "65536")] // 64KB
    buffer_size: usize,

    /// List the built-in formats and exit
    #[arg(long)]
    list_formats: bool,

    /// More diagnostics (-v: info, -vv: debug)
    #[arg(short = 'v', long, action = ArgAction::Count)]
    verbose: u8,

    /// Print a summary to stderr when done
    #[arg(long)]
    stats: bool,
}

impl Args {
    /// Command line first, then the settings file, then the built-in default
    fn format_spec(&self, settings: &Settings) -> Result<FormatSpec, ConfigError> {
        if let Some(template) = &self.template {
            return Ok(FormatSpec::Template(template.clone()));
        }
        if let Some(selector) = &self.format {
            return FormatSpec::from_selector(selector, &settings.formats);
        }
        if let Some(template) = &settings.template {
            return Ok(FormatSpec::Template(template.clone()));
        }
        if let Some(selector) = &settings.format {
            return FormatSpec::from_selector(selector, &settings.formats);
        }
        Ok(FormatSpec::default())
    }

    fn filter_command(&self, settings: &Settings) -> Option<FilterCommand> {
        let program = self.filter.clone().or_else(|| settings.filter.clone())?;
        let args = if self.filter.is_some() || !self.filter_args.is_empty() {
            self.filter_args.clone()
        } else {
            settings.filter_args.clone()
        };
        Some(FilterCommand::new(program).with_args(args))
    }

    fn pipeline_config(&self, settings: &Settings) -> Result<PipelineConfig, ConfigError> {
        let defaults = PipelineConfig::default();
        Ok(PipelineConfig {
            format: self.format_spec(settings)?,
            decompress: self.gzip || settings.gzip.unwrap_or(false),
            filter: self.filter_command(settings),
            error_strategy: if self.fail_fast {
                ErrorStrategy::FailFast
            } else {
                ErrorStrategy::Skip
            },
            max_line_length: self
                .max_line_length
                .or(settings.max_line_length)
                .unwrap_or(defaults.max_line_length),
            buffer_size: self.buffer_size,
        })
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.verbose);

    match run(args) {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .without_time()
        .with_target(false)
        .init();
}

fn install_signal_handler(token: CancellationToken) -> Result<()> {
    ctrlc::set_handler(move || {
        // A second Ctrl-C while blocked on input gives up immediately
        if token.is_cancelled() {
            std::process::exit(130);
        }
        token.cancel();
    })
    .context("failed to install Ctrl-C handler")
}

fn run(args: Args) -> Result<ExitCode> {
    if args.list_formats {
        for (name, description) in list_presets() {
            println!("{:<10} {}", name, description);
        }
        return Ok(ExitCode::SUCCESS);
    }

    let settings = match &args.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    let config = args.pipeline_config(&settings)?;
    let decompress = config.decompress;
    let filter = config.filter.clone();

    let mut pipeline = StreamPipeline::from_config(config)?;
    install_signal_handler(pipeline.cancellation_token())?;

    if args.inputs.is_empty() && std::io::stdin().is_terminal() {
        info!("reading from terminal, press Ctrl-D to finish");
    }
    let resolution = resolve_sources(&args.inputs, decompress);

    let mut sink = match &filter {
        Some(filter) => OutputSink::spawn(filter)?,
        None => OutputSink::direct(),
    };

    let result = pipeline.run(resolution.sources, &mut sink);
    let finished = sink.finish();

    let stats = pipeline.get_stats().clone();
    if args.stats {
        print_stats(&stats, resolution.failures.len());
    }

    match result {
        Ok(_) => {}
        Err(ProcessingError::Interrupted) => {
            warn!("interrupted");
            return Ok(ExitCode::from(130));
        }
        // Whoever was reading our output is gone; nothing left to do
        Err(e) if e.is_broken_pipe() => return Ok(ExitCode::SUCCESS),
        Err(e) => return Err(e.into()),
    }
    finished?;

    if resolution.failures.is_empty() && stats.sources_failed == 0 {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

fn print_stats(stats: &ProcessingStats, unopened: usize) {
    let elapsed = Duration::from_millis(stats.processing_time.as_millis() as u64);
    eprintln!("Final statistics:");
    eprintln!("  Sources processed: {}", stats.sources_processed);
    eprintln!("  Sources failed: {}", stats.sources_failed + unopened);
    eprintln!("  Lines read: {}", stats.lines_read);
    eprintln!("  Records output: {}", stats.records_output);
    eprintln!("  Unparsable lines: {}", stats.parse_failures);
    eprintln!("  Processing time: {}", humantime::format_duration(elapsed));
}
