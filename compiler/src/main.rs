use std::io::Write;
use std::path::{Path, PathBuf};

use clap::Parser;
use tracing_subscriber::EnvFilter;

use tlc::liveness::AnalysisStatus;
use tlc::pass::PassId;
use tlc::pipeline::{compute_provenance, run_pipeline, PipelineError, PipelineOptions};
use tlc::report;

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum EmitStage {
    /// Live sets per binding, sharing classes and diagnostics
    Liveness,
    /// The same result as JSON
    Json,
    /// Identity set of every binder (stops after the forward pass)
    Identities,
    /// The resolved IR of the entry function
    Ir,
    /// Source hash and result fingerprint
    BuildInfo,
}

impl EmitStage {
    fn terminal(self) -> PassId {
        match self {
            EmitStage::Liveness | EmitStage::Json | EmitStage::BuildInfo => PassId::MergeValidate,
            EmitStage::Identities => PassId::Forward,
            EmitStage::Ir => PassId::FormCheck,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "tlc",
    version,
    about = "Tensor liveness checker: buffer liveness and mandatory sharing validation for ANF tensor programs"
)]
struct Cli {
    /// Input source file
    source: PathBuf,

    /// Function to analyze
    #[arg(long, default_value = "main")]
    entry: String,

    /// Output stage
    #[arg(long, value_enum, default_value_t = EmitStage::Liveness)]
    emit: EmitStage,

    /// Output file path (stdout if omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Log pass progress and timing to stderr
    #[arg(long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn write_output(path: Option<&Path>, text: &str) -> std::io::Result<()> {
    match path {
        Some(path) => std::fs::write(path, text),
        None => {
            let mut out = std::io::stdout().lock();
            out.write_all(text.as_bytes())?;
            out.flush()
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    tracing::debug!(source = %cli.source.display(), emit = ?cli.emit, entry = %cli.entry, "starting");

    // ── Read source ──
    let source = match std::fs::read_to_string(&cli.source) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("tlc: error: {}: {}", cli.source.display(), e);
            std::process::exit(2);
        }
    };

    // ── Analyze ──
    let options = PipelineOptions {
        entry: cli.entry.clone(),
        terminal: cli.emit.terminal(),
    };
    let analysis = match run_pipeline(&source, &options) {
        Ok(analysis) => analysis,
        Err(PipelineError::Parse(errors)) => {
            for err in &errors {
                eprintln!("tlc: parse error: {}", err);
            }
            if errors.is_empty() {
                eprintln!("tlc: parse failed with no output");
            }
            std::process::exit(1);
        }
        Err(PipelineError::Resolve(diags)) => {
            for diag in &diags {
                eprintln!("tlc: {}", diag);
            }
            std::process::exit(1);
        }
        Err(PipelineError::Invariant(e)) => {
            eprintln!("tlc: internal error: {}", e);
            std::process::exit(2);
        }
    };
    for diag in &analysis.warnings {
        eprintln!("tlc: {}", diag);
    }

    let Some(func) = analysis.function() else {
        eprintln!("tlc: entry function '@{}' disappeared", analysis.entry);
        std::process::exit(2);
    };
    let vars = &analysis.program.vars;
    let result = &analysis.result;

    // ── Emit ──
    let text = match cli.emit {
        EmitStage::Liveness => report::render_text(&analysis.entry, func, vars, result),
        EmitStage::Identities => report::render_identities(&analysis.entry, vars, result),
        EmitStage::Ir => match analysis.program.display_function(&analysis.entry) {
            Some(display) => display.to_string(),
            None => String::new(),
        },
        EmitStage::Json => {
            let json = report::json_report(&analysis.entry, func, vars, result);
            match serde_json::to_string_pretty(&json) {
                Ok(s) => s + "\n",
                Err(e) => {
                    eprintln!("tlc: error: {}", e);
                    std::process::exit(2);
                }
            }
        }
        EmitStage::BuildInfo => match compute_provenance(&source, &analysis) {
            Ok(provenance) => provenance.to_json(),
            Err(e) => {
                eprintln!("tlc: error: {}", e);
                std::process::exit(2);
            }
        },
    };

    if !matches!(cli.emit, EmitStage::Liveness) {
        for diag in &result.diagnostics {
            eprintln!("tlc: {}", diag);
        }
    }

    if let Err(e) = write_output(cli.output.as_deref(), &text) {
        let target = cli
            .output
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "stdout".to_string());
        eprintln!("tlc: error: {}: {}", target, e);
        std::process::exit(2);
    }

    if matches!(cli.emit, EmitStage::Ir) {
        return;
    }
    match result.status() {
        AnalysisStatus::Valid | AnalysisStatus::Partial => {}
        AnalysisStatus::UnsupportedForm | AnalysisStatus::AliasingConflict => {
            std::process::exit(1);
        }
    }
}
