//! negato - rule-based negation annotation CLI
//!
//! Reads a corpus of sentences (one per line), runs the deterministic
//! cue/scope pipeline against a rules directory, and writes one JSON object
//! per sentence.
//!
//! # Usage
//!
//! ```bash
//! negato --rules rules/ --input corpus.txt --output annotations.jsonl
//! negato --rules rules/ --input corpus.txt --output out.jsonl --log debug
//! ```
//!
//! Per-line failures are logged and skipped; the run itself only fails when
//! the input file cannot be read or the output file cannot be written.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::{error, info, warn};

use negato::Annotator;

/// Rule-based negation cue/scope annotator.
#[derive(Parser)]
#[command(name = "negato")]
#[command(
    author,
    version,
    about = "Rule-based negation cue/scope annotator for French clinical text",
    long_about = r#"
negato - deterministic negation annotation

Detects negation markers (cues) in free-text clinical sentences and resolves
the span each marker negates (scope), from a library of declarative YAML
pattern rules. No models, no parsing: edit the rules, rerun, diff.

RULES DIRECTORY LAYOUT:
  rules/
    00_registry.yaml   group -> ordered strategy ids (optional)
    10_markers/*.yaml  marker rules, one list per file
    20_scopes/*.yaml   scope strategies

EXAMPLES:
  negato --rules rules/ --input corpus.txt --output annotations.jsonl
"#
)]
struct Cli {
    /// Rules directory (10_markers/, 20_scopes/, optional 00_registry.yaml)
    #[arg(long, value_name = "DIR")]
    rules: PathBuf,

    /// Input corpus, one sentence per line
    #[arg(long, value_name = "FILE")]
    input: PathBuf,

    /// Output path, one JSON object per sentence
    #[arg(long, value_name = "FILE")]
    output: PathBuf,

    /// Log verbosity (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", value_name = "LEVEL")]
    log: String,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .parse_filters(&cli.log)
        .format_timestamp(None)
        .init();

    let annotator = Annotator::from_rules_dir(&cli.rules);
    if annotator.rules().is_empty() {
        warn!(
            "no executable rules found under {}; output will carry no cues",
            cli.rules.display()
        );
    }

    let input = match File::open(&cli.input) {
        Ok(f) => BufReader::new(f),
        Err(e) => {
            error!("cannot read input {}: {}", cli.input.display(), e);
            return ExitCode::FAILURE;
        }
    };
    let mut output = match File::create(&cli.output) {
        Ok(f) => BufWriter::new(f),
        Err(e) => {
            error!("cannot create output {}: {}", cli.output.display(), e);
            return ExitCode::FAILURE;
        }
    };

    let mut sid: u64 = 0;
    for line in input.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!("unreadable input line skipped: {}", e);
                continue;
            }
        };
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        sid += 1;
        let annotation = annotator.annotate(text, sid);
        let json = match serde_json::to_string(&annotation) {
            Ok(json) => json,
            Err(e) => {
                warn!("sentence {} not serializable, skipped: {}", sid, e);
                continue;
            }
        };
        if let Err(e) = writeln!(output, "{}", json) {
            error!("write failed at sentence {}: {}", sid, e);
            return ExitCode::FAILURE;
        }
    }
    if let Err(e) = output.flush() {
        error!("flush failed: {}", e);
        return ExitCode::FAILURE;
    }

    info!("done: {} sentences -> {}", sid, cli.output.display());
    ExitCode::SUCCESS
}
