//! Maze Agents CLI
//!
//! Trains, tests and inspects a Q-learning agent in the built-in maze
//! simulator.
//!
//! ## Usage
//!
//! ```bash
//! # Train in fast mode
//! maze-agents train --fast --episodes 200
//!
//! # Episode count from the environment
//! MAZE_EPISODES=50 maze-agents train
//! ```

use clap::{Parser, Subcommand};
use log::{error, info};
use maze_agents::{simulated_trainer, Config, Error, ExecutionMode, Result};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::Ordering;

/// Q-learning maze navigation for a differential-drive robot
#[derive(Parser, Debug)]
#[command(name = "maze-agents")]
#[command(version)]
#[command(about = "Train and test a Q-learning robot in a simulated maze", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Model file (overrides the configuration)
    #[arg(short, long, global = true)]
    model: Option<PathBuf>,

    /// Maze layout file (built-in maze when omitted)
    #[arg(long, global = true)]
    maze: Option<PathBuf>,

    /// Snap-to-target moves
    #[arg(long, global = true, conflicts_with = "physics")]
    fast: bool,

    /// Closed-loop physics moves
    #[arg(long, global = true)]
    physics: bool,

    /// Seed for reproducible runs
    #[arg(long, global = true)]
    seed: Option<u64>,

    /// Verbosity level
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Train the agent, continuing from a saved model if one exists
    Train {
        /// Number of episodes
        #[arg(short, long)]
        episodes: Option<u32>,
    },
    /// Run greedy episodes with a saved model
    Test {
        /// Number of episodes
        #[arg(short, long)]
        episodes: Option<u32>,
    },
    /// Continue training a saved model
    Continue {
        /// Number of episodes
        #[arg(short, long)]
        episodes: Option<u32>,
    },
    /// Show statistics of a saved model
    Stats,
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    config.apply_env();

    if cli.fast {
        config.motion.mode = ExecutionMode::Fast;
    }
    if cli.physics {
        config.motion.mode = ExecutionMode::Physics;
    }
    if let Some(path) = &cli.model {
        config.training.model_path = path.clone();
    }
    if let Some(path) = &cli.maze {
        config.maze.layout_path = Some(path.clone());
    }
    if let Some(seed) = cli.seed {
        config.agent.seed = Some(seed);
    }
    Ok(config)
}

fn print_config(config: &Config) {
    println!("Configuration:");
    println!("  Mode: {:?}", config.motion.mode);
    println!("  Model: {}", config.training.model_path.display());
    match &config.maze.layout_path {
        Some(path) => println!("  Maze: {}", path.display()),
        None => println!("  Maze: built-in"),
    }
    println!("  Strategy: {}", config.strategy.build().name());
    println!();
}

fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    print_config(&config);

    let mut trainer = simulated_trainer(&config)?;
    let interrupt = trainer.interrupt_handle();
    if let Err(e) = ctrlc::set_handler(move || {
        println!("\nStopping after the current step...");
        interrupt.store(true, Ordering::SeqCst);
    }) {
        error!("Could not install Ctrl-C handler: {}", e);
    }

    match cli.command {
        Commands::Train { episodes } => {
            let report = trainer.train(episodes.unwrap_or(config.training.episodes))?;
            println!(
                "Trained {} episodes, {} reached the goal{}",
                report.episodes,
                report.successes,
                if report.interrupted { " (interrupted)" } else { "" }
            );
        }
        Commands::Continue { episodes } => {
            let report = trainer.resume(episodes.unwrap_or(config.training.episodes))?;
            println!(
                "Trained {} more episodes, {} reached the goal{}",
                report.episodes,
                report.successes,
                if report.interrupted { " (interrupted)" } else { "" }
            );
        }
        Commands::Test { episodes } => {
            let report = trainer.test(episodes.unwrap_or(config.training.test_episodes))?;
            println!(
                "Success rate: {}/{} ({:.1}%), average steps {:.1}",
                report.successes,
                report.episodes,
                report.success_rate() * 100.0,
                report.avg_steps()
            );
        }
        Commands::Stats => match trainer.show_stats()? {
            Some(stats) => {
                println!("Episodes: {}", stats.episodes);
                println!("States explored: {}", stats.states_explored);
                println!(
                    "Last {} episodes: average reward {:.2}, success rate {:.1}%",
                    stats.recent.episodes,
                    stats.recent.avg_reward,
                    stats.recent.success_rate * 100.0
                );
                println!(
                    "All episodes: average reward {:.2}, success rate {:.1}%",
                    stats.avg_reward,
                    stats.success_rate * 100.0
                );
            }
            None => println!("Model has no recorded episodes"),
        },
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp_millis()
        .init();

    info!("maze-agents {}", maze_agents::VERSION);
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(Error::ModelNotFound(path)) => {
            println!("No trained model found at {}. Run `maze-agents train` first.", path);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
