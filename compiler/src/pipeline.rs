// pipeline.rs — Source text to liveness result
//
// Parses, resolves, selects the entry function and runs the analysis up to
// the requested terminal pass. Also computes build provenance.
//
// Preconditions: none.
// Postconditions: `Ok` carries the resolved program and the analysis result;
//   front-end errors stop the pipeline before analysis.
// Failure modes: parse errors, resolve errors (including E0004 for a missing
//   entry), and invariant violations inside the analysis.
// Side effects: `tracing` events only.

use std::time::Instant;

use chumsky::error::Rich;
use chumsky::span::SimpleSpan;
use tracing::debug;

use crate::ast::Span;
use crate::diag::{codes, has_errors, Diagnostic};
use crate::ir::{Function, IrProgram};
use crate::lexer::Token;
use crate::liveness::{analyze_with, AnalysisOptions, InvariantError, LivenessResult};
use crate::pass::PassId;
use crate::report::json_report;

// ── Options ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Function to analyze.
    pub entry: String,
    /// Last analysis pass to run.
    pub terminal: PassId,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            entry: "main".to_string(),
            terminal: PassId::MergeValidate,
        }
    }
}

// ── Error type ──────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("{} parse error(s)", .0.len())]
    Parse(Vec<Rich<'static, Token, SimpleSpan>>),

    #[error("{} error(s) during name resolution", .0.iter().filter(|d| d.is_error()).count())]
    Resolve(Vec<Diagnostic>),

    #[error(transparent)]
    Invariant(#[from] InvariantError),
}

// ── Output ──────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct Analysis {
    pub program: IrProgram,
    pub entry: String,
    pub result: LivenessResult,
    /// Warning-level diagnostics from the front end.
    pub warnings: Vec<Diagnostic>,
}

impl Analysis {
    pub fn function(&self) -> Option<&Function> {
        self.program.function(&self.entry)
    }
}

/// Parse `source` and resolve it, without analyzing.
pub fn load_program(source: &str) -> Result<(IrProgram, Vec<Diagnostic>), PipelineError> {
    let parsed = crate::parser::parse(source);
    if !parsed.errors.is_empty() {
        return Err(PipelineError::Parse(parsed.errors));
    }
    let Some(module) = parsed.module else {
        return Err(PipelineError::Parse(Vec::new()));
    };
    debug!(functions = module.functions.len(), "parsed");

    let resolved = crate::resolve::resolve(&module);
    if has_errors(&resolved.diagnostics) {
        return Err(PipelineError::Resolve(resolved.diagnostics));
    }
    debug!(binders = resolved.program.vars.len(), "resolved");
    Ok((resolved.program, resolved.diagnostics))
}

/// Run the whole pipeline on `source`.
pub fn run_pipeline(source: &str, options: &PipelineOptions) -> Result<Analysis, PipelineError> {
    let started = Instant::now();
    let (program, warnings) = load_program(source)?;

    let Some(func) = program.function(&options.entry) else {
        let end = source.len();
        let span: Span = (end..end).into();
        let known: Vec<String> = program
            .functions
            .iter()
            .map(|(name, _)| format!("@{}", name))
            .collect();
        let mut diag = Diagnostic::error(
            codes::E0004,
            span,
            format!("entry function '@{}' not found", options.entry),
        );
        if !known.is_empty() {
            diag = diag.with_hint(format!("available functions: {}", known.join(", ")));
        }
        return Err(PipelineError::Resolve(vec![diag]));
    };

    let result = analyze_with(
        func,
        &program.vars,
        AnalysisOptions {
            terminal: options.terminal,
        },
    )?;
    debug!(
        entry = %options.entry,
        status = %result.status(),
        elapsed_us = started.elapsed().as_micros() as u64,
        "pipeline complete"
    );

    Ok(Analysis {
        program,
        entry: options.entry.clone(),
        result,
        warnings,
    })
}

// ── Provenance ──────────────────────────────────────────────────────────────

/// Provenance metadata for reproducibility checks.
///
/// `source_hash`: SHA-256 of the raw source text.
/// `result_fingerprint`: SHA-256 of the compact JSON report of the analysis.
/// `tool_version`: crate version from `Cargo.toml`.
#[derive(Debug, Clone)]
pub struct Provenance {
    pub source_hash: [u8; 32],
    pub result_fingerprint: [u8; 32],
    pub tool_version: &'static str,
}

impl Provenance {
    /// Hex string of the source hash (64 characters).
    pub fn source_hash_hex(&self) -> String {
        bytes_to_hex(&self.source_hash)
    }

    /// Hex string of the result fingerprint (64 characters).
    pub fn result_fingerprint_hex(&self) -> String {
        bytes_to_hex(&self.result_fingerprint)
    }

    /// Serialize provenance as a JSON string for `--emit build-info`.
    pub fn to_json(&self) -> String {
        format!(
            "{{\n  \"source_hash\": \"{}\",\n  \"result_fingerprint\": \"{}\",\n  \"report_schema_version\": 1,\n  \"tool_version\": \"{}\"\n}}\n",
            self.source_hash_hex(),
            self.result_fingerprint_hex(),
            self.tool_version,
        )
    }
}

fn bytes_to_hex(bytes: &[u8; 32]) -> String {
    let mut s = String::with_capacity(64);
    for b in bytes {
        use std::fmt::Write;
        let _ = write!(s, "{:02x}", b);
    }
    s
}

fn sha256(bytes: &[u8]) -> [u8; 32] {
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let result = hasher.finalize();
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&result);
    hash
}

/// Compute provenance from source text and an analysis.
///
/// The fingerprint hashes the compact JSON report, which is independent of
/// text formatting.
pub fn compute_provenance(source: &str, analysis: &Analysis) -> Result<Provenance, serde_json::Error> {
    let canonical = match analysis.function() {
        Some(func) => {
            let report = json_report(&analysis.entry, func, &analysis.program.vars, &analysis.result);
            serde_json::to_string(&report)?
        }
        None => String::new(),
    };
    Ok(Provenance {
        source_hash: sha256(source.as_bytes()),
        result_fingerprint: sha256(canonical.as_bytes()),
        tool_version: env!("CARGO_PKG_VERSION"),
    })
}

// ── Tests ───────────────────────────────────────────────────────────────────
