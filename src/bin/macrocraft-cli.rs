//! Macrocraft CLI - Command-line interface for the macro engine
//!
//! Provides subcommands for managing a macro directory, checking and
//! rewriting macro text, and running macros against a simulated host.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use macrocraft::interpreter::{parse_macro, rewrite_craft_loop};
use macrocraft::runtime::simulate::DryRun;
use macrocraft::runtime::storage::{self, DirectoryRegistry};
use macrocraft::runtime::{
    ControlCommand, EngineConfig, EngineState, EngineStatus, MacroDefinition, MacroEngine,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser)]
#[command(name = "macrocraft")]
#[command(about = "Crafting macro language and interpreter", long_about = None)]
struct Cli {
    /// Root directory for macros and configuration
    #[arg(short, long, default_value = ".macrocraft")]
    root: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a macro directory
    Init,

    /// List stored macros
    List,

    /// Parse a macro file and print its commands
    Check {
        /// Macro source file
        file: PathBuf,
    },

    /// Print a macro file with craft-loop scaffolding applied
    Rewrite {
        /// Macro source file
        file: PathBuf,

        /// Repeat count (-1 repeats forever)
        #[arg(short, long, default_value = "1", allow_hyphen_values = true)]
        count: i32,
    },

    /// Store a macro file under a name
    Import {
        /// Macro name
        name: String,

        /// Macro source file
        file: PathBuf,

        /// Enable craft looping with this repeat count
        #[arg(long, allow_hyphen_values = true)]
        craft_loop: Option<i32>,
    },

    /// Run a stored macro against the simulated host
    Run {
        /// Macro name
        name: String,

        /// Loop count override
        #[arg(short, long, allow_hyphen_values = true)]
        loops: Option<i32>,

        /// Read control commands (pause, resume, stop, step, status) from stdin
        #[arg(short, long)]
        interactive: bool,
    },
}

fn read_source(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read macro: {:?}", path))
}

fn load_config_or_default(root: &Path) -> Result<EngineConfig> {
    if storage::Storage::new(root.to_path_buf()).config_path().exists() {
        storage::load_config(root)
    } else {
        Ok(EngineConfig::default())
    }
}

fn print_status(status: &EngineStatus) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(status).context("Failed to serialize status")?
    );
    Ok(())
}

async fn run_interactive(engine: &MacroEngine) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match ControlCommand::parse(&line) {
                    Ok(command) => match command.dispatch(engine) {
                        Ok(Some(status)) => print_status(&status)?,
                        Ok(None) => {}
                        Err(err) => eprintln!("error: {}", err),
                    },
                    Err(err) => eprintln!("error: {}", err),
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    Ok(())
}

async fn run_to_completion(engine: &MacroEngine, retired_before: u64) -> EngineStatus {
    tokio::select! {
        status = engine.wait_for_status(|s| {
            (s.frames.is_empty() && s.retired > retired_before)
                || matches!(s.state, EngineState::Paused | EngineState::Stopped | EngineState::NotReady)
        }) => status,
        _ = tokio::signal::ctrl_c() => engine.status(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init => {
            storage::init_storage(&cli.root)?;
            println!("Initialized macro directory at {:?}", cli.root);
        }

        Commands::List => {
            let macros = storage::load_macros(&cli.root)?;
            println!("Macros:");
            for def in macros {
                let looping = if def.craft_loop {
                    format!(" (craft loop x{})", def.craft_count)
                } else {
                    String::new()
                };
                println!("  {}{}", def.name, looping);
            }
        }

        Commands::Check { file } => {
            let source = read_source(&file)?;
            let commands = parse_macro(&source)?;
            println!("{} command(s)", commands.len());
            for (index, command) in commands.iter().enumerate() {
                println!("{:>4}  {:<18} {}", index + 1, command.kind.label(), command.text);
            }
        }

        Commands::Rewrite { file, count } => {
            let source = read_source(&file)?;
            let config = load_config_or_default(&cli.root)?;
            let rewritten = rewrite_craft_loop(&source, true, count, &config.craft_loop)?;
            parse_macro(&rewritten).context("Rewritten macro does not parse")?;
            println!("{}", rewritten);
        }

        Commands::Import {
            name,
            file,
            craft_loop,
        } => {
            let source = read_source(&file)?;
            parse_macro(&source)?;
            let mut definition = MacroDefinition::new(name.clone(), source);
            if let Some(count) = craft_loop {
                definition = definition.with_craft_loop(count);
            }
            storage::save_macro(&cli.root, &definition)?;
            println!("Stored macro: {}", name);
        }

        Commands::Run {
            name,
            loops,
            interactive,
        } => {
            let config = load_config_or_default(&cli.root)?;
            let sim = Arc::new(DryRun::new(true));
            let host = sim.host(Arc::new(DirectoryRegistry::new(cli.root.clone())));
            let engine = MacroEngine::spawn(host, config);

            let retired_before = engine.status().retired;
            engine.run_by_name(&name, loops)?;

            if interactive {
                run_interactive(&engine).await?;
            } else {
                let status = run_to_completion(&engine, retired_before).await;
                if status.state == EngineState::Paused {
                    println!("Macro paused:");
                    print_status(&status)?;
                }
            }

            engine.shutdown().await;
        }
    }

    Ok(())
}
