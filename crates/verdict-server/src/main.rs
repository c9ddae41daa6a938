//! Verdict CLI
//!
//! Unified command-line interface for:
//! - Serving the HTTP verification API (`serve`)
//! - Validating ontology documents (`check`)
//! - Listing the ontology directory (`list`)
//! - One-shot verification from the terminal (`verify`)

use std::io::Read;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::EnvFilter;
use verdict_engine::{backend_for, CancelToken, SolverChoice, Verifier};
use verdict_ontology::{validate_document, OntologyRegistry};

mod http;

#[derive(Parser)]
#[command(name = "verdict")]
#[command(
    author,
    version,
    about = "Declarative constraint verification for LLM output"
)]
struct Cli {
    /// Log at debug level (overridden by RUST_LOG).
    #[arg(long, global = true, env = "DEBUG")]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP verification service.
    Serve(ServeArgs),

    /// Validate one ontology document and summarize it.
    Check {
        /// Path to an ontology JSON file.
        path: PathBuf,
    },

    /// List the ontologies in the ontology directory.
    List {
        #[arg(long, env = "ONTOLOGY_DIR", default_value = "./ontologies")]
        ontology_dir: PathBuf,
    },

    /// Verify a text against an ontology and print the JSON report.
    Verify(VerifyArgs),
}

#[derive(Args)]
struct ServeArgs {
    #[arg(long, env = "PORT", default_value_t = 8080)]
    port: u16,

    #[arg(long, env = "ONTOLOGY_DIR", default_value = "./ontologies")]
    ontology_dir: PathBuf,

    /// Comma-separated CORS allow-list; `*` allows any origin.
    #[arg(
        long,
        env = "CORS_ORIGINS",
        value_delimiter = ',',
        default_value = "http://localhost:8000,http://localhost:3000"
    )]
    cors_origins: Vec<String>,

    #[command(flatten)]
    solver: SolverArgs,
}

#[derive(Args)]
struct VerifyArgs {
    /// Ontology name (resolved in the ontology directory).
    #[arg(long)]
    ontology: String,

    #[arg(long, env = "ONTOLOGY_DIR", default_value = "./ontologies")]
    ontology_dir: PathBuf,

    /// Text to verify; reads stdin when neither --text nor --file is given.
    #[arg(long, conflicts_with = "file")]
    text: Option<String>,

    /// File containing the text to verify.
    #[arg(long)]
    file: Option<PathBuf>,

    #[command(flatten)]
    solver: SolverArgs,
}

#[derive(Args)]
struct SolverArgs {
    /// Solver backend: auto, ground, z3, or cvc5.
    #[arg(long, env = "SOLVER", default_value = "auto")]
    solver: SolverChoice,

    /// Per-constraint solver timeout in milliseconds.
    #[arg(long, env = "SOLVER_TIMEOUT_MS", default_value_t = 5000)]
    solver_timeout_ms: u64,
}

impl SolverArgs {
    fn verifier(&self) -> Verifier {
        let timeout = Duration::from_millis(self.solver_timeout_ms);
        Verifier::new(backend_for(self.solver, timeout))
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Serve(args) => serve(args),
        Commands::Check { path } => check(&path),
        Commands::List { ontology_dir } => list(&ontology_dir),
        Commands::Verify(args) => verify(args),
    }
}

fn serve(args: ServeArgs) -> Result<()> {
    let registry = OntologyRegistry::new(&args.ontology_dir);
    let loaded = registry.reload();
    if loaded.is_empty() {
        tracing::warn!(
            dir = %args.ontology_dir.display(),
            "no loadable ontologies found at startup"
        );
    }
    for meta in &loaded {
        tracing::info!(
            ontology = %meta.name,
            version = %meta.version,
            constraints = meta.constraints,
            "ontology available"
        );
    }

    let state = Arc::new(http::AppState {
        registry,
        verifier: args.solver.verifier(),
        cors_origins: args.cors_origins,
    });
    let listen: SocketAddr = ([0, 0, 0, 0], args.port).into();

    tokio::runtime::Runtime::new()
        .context("failed to start async runtime")?
        .block_on(http::serve(state, listen))
}

fn check(path: &PathBuf) -> Result<()> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read {}", path.display()))?;
    let document: serde_json::Value =
        serde_json::from_str(&raw).with_context(|| format!("invalid JSON in {}", path.display()))?;

    match validate_document(document) {
        Ok(ontology) => {
            println!(
                "{} {} v{} ({} constraints, {} extractors)",
                "ok".green().bold(),
                ontology.name.bold(),
                ontology.version,
                ontology.constraints.len(),
                ontology.extractors.len()
            );
            for constraint in &ontology.constraints {
                println!(
                    "  {:<28} {}",
                    constraint.id.cyan(),
                    constraint.formula_readable
                );
            }
            Ok(())
        }
        Err(issues) => {
            println!("{} {}", "invalid".red().bold(), path.display());
            for issue in &issues {
                println!("  - {}", issue);
            }
            bail!("{} validation issue(s)", issues.len());
        }
    }
}

fn list(ontology_dir: &PathBuf) -> Result<()> {
    let registry = OntologyRegistry::new(ontology_dir);
    let ontologies = registry.list();
    if ontologies.is_empty() {
        println!("no loadable ontologies in {}", ontology_dir.display());
        return Ok(());
    }
    for meta in ontologies {
        println!(
            "{:<28} v{:<8} {:>3} constraints  {}",
            meta.name.bold(),
            meta.version,
            meta.constraints,
            meta.description.dimmed()
        );
    }
    Ok(())
}

fn verify(args: VerifyArgs) -> Result<()> {
    let text = match (&args.text, &args.file) {
        (Some(text), _) => text.clone(),
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("cannot read {}", path.display()))?,
        (None, None) => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read stdin")?;
            buf
        }
    };
    if text.trim().is_empty() {
        bail!("nothing to verify: provide --text, --file, or stdin input");
    }

    let registry = OntologyRegistry::new(&args.ontology_dir);
    let ontology = registry.get(&args.ontology)?;
    let verifier = args.solver.verifier();
    let report = verifier.verify(&ontology, &text, &CancelToken::new())?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    if report.verified {
        eprintln!("{}", "verified".green().bold());
        Ok(())
    } else {
        eprintln!(
            "{} ({} violation(s))",
            "not verified".red().bold(),
            report.violations.len()
        );
        std::process::exit(1)
    }
}
