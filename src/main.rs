//! Stepwise - drive a multi-step coding agent from your terminal.
//!
//! Requests a plan from the backend, lets you refine and confirm it, then
//! follows the run live while mediating the agent's file access.

#![allow(clippy::single_match_else)]

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use crossterm::style::Stylize;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use stepwise::backend::{AddDocumentRequest, AskEvent, AskRequest, Collection};
use stepwise::render::{render_plan, TerminalSink};
use stepwise::{cancel_channel, Config, HttpBackend, RunStatus, Session};

/// Drive a multi-step coding agent from your terminal
#[derive(Parser)]
#[command(name = "stepwise")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Backend URL (overrides configuration)
    #[arg(long, global = true, value_name = "URL")]
    backend: Option<String>,

    /// Project root (overrides configuration; defaults to the current directory)
    #[arg(long, global = true, value_name = "DIR")]
    root: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Request a plan for a task and print it
    Plan {
        /// Task description
        task: String,
    },

    /// Plan, confirm and execute a task with live progress
    Run {
        /// Task description
        task: String,

        /// Don't ask before executing the plan
        #[arg(short = 'y', long)]
        yes: bool,

        /// Refine the plan before confirming (repeatable)
        #[arg(short, long, value_name = "INSTRUCTION")]
        refine: Vec<String>,
    },

    /// Ask a question and stream the answer
    Ask {
        /// Question
        query: String,

        /// Knowledge base to search
        #[arg(short, long)]
        knowledge: Option<String>,

        /// Model to answer with
        #[arg(short, long)]
        model: Option<String>,
    },

    /// Check that the backend is reachable
    Health,

    /// Manage the backend knowledge base
    Knowledge {
        #[command(subcommand)]
        action: KnowledgeCommand,
    },

    /// Show configuration
    Config {
        /// Show config file path
        #[arg(long)]
        path: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum KnowledgeCommand {
    /// Add a file to the knowledge base
    Add {
        /// File to add
        file: PathBuf,

        /// Collection to file it under
        #[arg(short, long, value_enum, default_value_t = Collection::Code)]
        collection: Collection,
    },
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Setup logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(io::stderr))
        .with(filter)
        .init();

    match cli.command {
        Commands::Plan { task } => cmd_plan(&load_config(&cli.backend, &cli.root)?, &task),
        Commands::Run { task, yes, refine } => {
            cmd_run(&load_config(&cli.backend, &cli.root)?, &task, yes, &refine)
        }
        Commands::Ask { query, knowledge, model } => {
            cmd_ask(&load_config(&cli.backend, &cli.root)?, query, knowledge, model)
        }
        Commands::Health => cmd_health(&load_config(&cli.backend, &cli.root)?),
        Commands::Knowledge { action: KnowledgeCommand::Add { file, collection } } => {
            cmd_knowledge_add(&load_config(&cli.backend, &cli.root)?, &file, collection)
        }
        Commands::Config { path } => cmd_config(path, &cli.backend, &cli.root),
        Commands::Completions { shell } => {
            cmd_completions(shell);
            Ok(())
        }
    }
}

/// Load configuration and apply command-line overrides.
fn load_config(backend: &Option<String>, root: &Option<PathBuf>) -> Result<Config> {
    let mut config = Config::load().context("Failed to load configuration")?;
    if let Some(url) = backend {
        config.backend.url = Some(url.clone());
    }
    if let Some(root) = root {
        config.workspace.root = Some(root.display().to_string());
    }
    Ok(config)
}

/// Single-threaded runtime; all run handling happens on one thread.
fn runtime() -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_current_thread().enable_all().build()?)
}

fn new_session(config: &Config) -> Result<Session> {
    let backend = HttpBackend::from_config(&config.backend)?;
    Ok(Session::new(Arc::new(backend), config.workspace_root(), config.mirror.clone()))
}

/// Request and print a plan.
fn cmd_plan(config: &Config, task: &str) -> Result<()> {
    let mut session = new_session(config)?;
    let rt = runtime()?;

    rt.block_on(async {
        let workflow = session.plan(task).await?;
        print!("{}", render_plan(workflow));
        Ok::<_, anyhow::Error>(())
    })
}

/// Plan, optionally refine, confirm and execute.
fn cmd_run(config: &Config, task: &str, skip_confirm: bool, refinements: &[String]) -> Result<()> {
    let mut session = new_session(config)?;
    let rt = runtime()?;

    let status = rt.block_on(async {
        session.plan(task).await?;
        for instruction in refinements {
            session.refine(instruction).await?;
        }
        if let Some(workflow) = session.workflow() {
            print!("{}", render_plan(workflow));
        }

        if !skip_confirm {
            print!("\nConfirm and run this plan? [y/N] ");
            io::stdout().flush()?;

            let mut input = String::new();
            io::stdin().read_line(&mut input)?;

            if !input.trim().eq_ignore_ascii_case("y") {
                println!("Cancelled");
                return Ok(None);
            }
        }

        let (handle, signal) = cancel_channel();
        ctrlc::set_handler(move || {
            let _ = handle.cancel();
        })?;
        println!("{}", "Press Ctrl+C to stop.".dark_grey());

        let mut sink = TerminalSink::stdout();
        let report = session.confirm_and_execute(&mut sink, signal).await?;
        Ok::<_, anyhow::Error>(Some(report.status))
    })?;

    match status {
        Some(RunStatus::Failed(message)) => anyhow::bail!("Run failed: {message}"),
        Some(RunStatus::EndedWithoutOutput) => anyhow::bail!("Run ended without output"),
        _ => Ok(()),
    }
}

/// Stream an answer to a question.
fn cmd_ask(
    config: &Config,
    query: String,
    knowledge: Option<String>,
    model: Option<String>,
) -> Result<()> {
    let backend = HttpBackend::from_config(&config.backend)?;
    let request = AskRequest { query, knowledge_type: knowledge, model };
    let rt = runtime()?;

    rt.block_on(async {
        let mut sources = None;
        let answer = backend
            .ask_stream(&request, |event| match event {
                AskEvent::Content(text) => {
                    print!("{text}");
                    let _ = io::stdout().flush();
                }
                AskEvent::Status(status) => {
                    eprintln!("{}", status.as_str().dark_grey());
                }
                AskEvent::Sources(value) => sources = Some(value.clone()),
                AskEvent::Other { kind, .. } => tracing::debug!(kind = %kind, "Ignoring ask event"),
            })
            .await?;

        if !answer.ends_with('\n') {
            println!();
        }
        if let Some(sources) = sources {
            println!("\n{} {}", "Sources:".bold(), sources);
        }
        Ok::<_, anyhow::Error>(())
    })
}

/// Check backend reachability.
fn cmd_health(config: &Config) -> Result<()> {
    let backend = HttpBackend::from_config(&config.backend)?;
    let rt = runtime()?;

    if rt.block_on(backend.health_check()) {
        println!("{} {}", "✓".green(), backend.base_url());
        Ok(())
    } else {
        anyhow::bail!("Backend at {} is not reachable", backend.base_url())
    }
}

/// Validate a file and add it to the knowledge base.
fn cmd_knowledge_add(config: &Config, file: &Path, collection: Collection) -> Result<()> {
    let path = std::env::current_dir()?.join(file);
    let root = config.workspace_root();
    let rt = runtime()?;

    let request = rt.block_on(AddDocumentRequest::load(&path, root.as_deref(), collection))?;
    let backend = HttpBackend::from_config(&config.backend)?;
    rt.block_on(backend.add_document(&request))?;

    println!("{} Added {} to {}", "✓".green(), request.metadata.source, collection);
    Ok(())
}

/// Show configuration.
fn cmd_config(show_path: bool, backend: &Option<String>, root: &Option<PathBuf>) -> Result<()> {
    if show_path {
        if let Some(path) = Config::config_path() {
            println!("{}", path.display());
        }
        return Ok(());
    }

    let config = load_config(backend, root)?;
    let toml = toml::to_string_pretty(&config)?;
    println!("{toml}");

    Ok(())
}

/// Generate shell completions.
fn cmd_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "stepwise", &mut io::stdout());
}
