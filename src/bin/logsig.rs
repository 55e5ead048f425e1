use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::Level;

use logsig::config::{Config, StoreKind};
use logsig::dedup::{FileRegistry, MemoryRegistry, SignatureRegistry};
use logsig::embedding::HttpEmbedder;
use logsig::ingest::KnowledgeBaseWriter;
use logsig::knowledge;
use logsig::matcher::{format_matches, MatchEngine};
use logsig::multiline::RecordAggregator;
use logsig::store::{AzureSearchStore, MemoryStore, SimilarityStore};
use logsig::{masking, parser, signature};

#[derive(Parser, Debug)]
#[command(name = "logsig", version, about = "Match instrument log errors against a knowledge base of known signatures")]
struct Cli {
    /// TOML configuration file
    #[arg(long = "config", short = 'c', global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short = 'v', action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Catalogue Error/Warning signatures from log files into the knowledge base
    Ingest {
        /// Instrument the logs were collected from
        #[arg(long = "instrument")]
        instrument: String,
        /// Solution text attached to every uploaded signature
        #[arg(long = "solution", default_value = "")]
        solution: String,
        /// Input files (`-` for stdin)
        #[arg(required = true)]
        input: Vec<String>,
    },
    /// Show the most similar known signatures for log lines
    Match {
        /// Number of matches per line
        #[arg(long = "top", short = 'k')]
        top: Option<usize>,
        /// Emit JSON instead of text
        #[arg(long = "json", default_value_t = false)]
        json: bool,
        /// Log line; stdin is read when omitted
        line: Option<String>,
    },
    /// Print the parsed record and signature for a line without any service call
    Inspect {
        #[arg(long = "instrument", default_value = "unknown")]
        instrument: String,
        line: Option<String>,
    },
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .init();
}

fn read_records(paths: &[String]) -> io::Result<Vec<String>> {
    let mut out = Vec::new();
    let mut agg = RecordAggregator::default();
    for p in paths {
        let reader: Box<dyn BufRead> = if p == "-" {
            Box::new(BufReader::new(io::stdin()))
        } else {
            Box::new(BufReader::new(File::open(p)?))
        };
        for line in reader.lines() {
            if let Some(rec) = agg.push(&line?) {
                out.push(rec);
            }
        }
        if let Some(rec) = agg.finish() {
            out.push(rec);
        }
    }
    Ok(out)
}

fn line_or_stdin(line: Option<String>) -> anyhow::Result<Vec<String>> {
    match line {
        Some(l) => Ok(vec![l]),
        None if atty::is(atty::Stream::Stdin) => bail!("pass a log line or pipe lines on stdin"),
        None => Ok(read_records(&["-".to_string()])?),
    }
}

fn open_store(cfg: &Config) -> anyhow::Result<Box<dyn SimilarityStore>> {
    Ok(match cfg.store.kind {
        StoreKind::Memory => match &cfg.store.path {
            Some(path) => Box::new(MemoryStore::open(path, cfg.store.dims)?),
            None => {
                tracing::warn!("memory store without store.path; documents are lost on exit");
                Box::new(MemoryStore::new(cfg.store.dims))
            }
        },
        StoreKind::AzureSearch => Box::new(AzureSearchStore::new(&cfg.store)?),
    })
}

fn open_registry(cfg: &Config) -> anyhow::Result<Box<dyn SignatureRegistry>> {
    Ok(match &cfg.ingest.registry_path {
        Some(path) => {
            let registry = FileRegistry::open(path)?;
            tracing::info!(path = %registry.path().display(), signatures = registry.len(), "loaded signature registry");
            Box::new(registry)
        }
        None => Box::new(MemoryRegistry::new()),
    })
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let _ = dotenv::dotenv();

    let default_path = PathBuf::from("logsig.toml");
    let config_path = cli.config.clone().or_else(|| default_path.exists().then_some(default_path));
    let cfg = Config::load(config_path.as_deref()).context("loading configuration")?;

    match cli.command {
        Command::Ingest { instrument, solution, input } => {
            let lines = read_records(&input)?;
            let records: Vec<_> = lines.iter().filter_map(|l| parser::parse_line(l)).collect();
            tracing::info!(lines = lines.len(), records = records.len(), "parsed input");

            let embedder = HttpEmbedder::new(&cfg.embedding)?;
            let store = open_store(&cfg)?;
            let mut registry = open_registry(&cfg)?;
            let writer = KnowledgeBaseWriter::new(&embedder, &store, &cfg.ingest).with_solution(solution);
            let report = writer.ingest(&records, &instrument, registry.as_mut())?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Match { top, json, line } => {
            let lines = line_or_stdin(line)?;
            let embedder = HttpEmbedder::new(&cfg.embedding)?;
            let store = open_store(&cfg)?;
            let engine = MatchEngine::new(&embedder, &store, &cfg.ingest, &cfg.lookup);
            let top_k = top.unwrap_or(cfg.lookup.top_k);
            for l in lines.iter().filter(|l| !l.trim().is_empty()) {
                let matches = engine.find_matches(l, top_k)?;
                if json {
                    println!("{}", serde_json::json!({ "line": l, "matches": matches }));
                } else {
                    print!("{}", format_matches(l, &matches));
                }
            }
        }
        Command::Inspect { instrument, line } => {
            for l in line_or_stdin(line)? {
                let out = match parser::parse_line(&l) {
                    Some(rec) => {
                        let signature_text = signature::build_signature_text_with_limit(&rec, cfg.ingest.max_message_chars);
                        serde_json::json!({
                            "parsed": true,
                            "normalized_message": masking::normalize_with_limit(&rec.message, cfg.ingest.max_message_chars),
                            "document_id": knowledge::document_id(&instrument, &rec.message_id, &rec.timestamp, &signature_text),
                            "qualifies_for_ingest": cfg.ingest.qualifies(&rec.severity),
                            "signature_text": signature_text,
                            "record": rec,
                        })
                    }
                    None => serde_json::json!({ "parsed": false, "line": l }),
                };
                println!("{}", serde_json::to_string_pretty(&out)?);
            }
        }
    }
    Ok(())
}
