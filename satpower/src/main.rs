// src/main.rs
//
// CLI entrypoint: train, evaluate and serve the power-control agent.
//
//   satpower train    [--config cfg.yaml] [--seed N] [--episodes N] [--resume ckpt]
//   satpower evaluate --checkpoint ckpt [--episodes N]
//   satpower infer    --checkpoint ckpt [--deadline-ms D]   (JSON lines on stdin)
//
// Config precedence: CLI flag > SATPOWER_* env > YAML file > defaults.
// Failures exit with status 2 and a one-line diagnostic.

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};

use satpower::config::Config;
use satpower::rl::Checkpoint;
use satpower::serve::{FrozenQNetwork, InferenceRequest, InferenceService};
use satpower::sim_eval::{print_console_summary, write_reports, Evaluator};
use satpower::Trainer;

#[derive(Debug, Parser)]
#[command(
    name = "satpower",
    about = "DQN transmit-power control for LEO satellite downlinks",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// YAML configuration file (optional).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output directory (overrides config).
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,

    /// Verbosity: -v, -vv
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Train an agent, then compare it with the baseline on held-out passes.
    Train {
        /// Deterministic seed.
        #[arg(long)]
        seed: Option<u64>,
        /// Number of training episodes.
        #[arg(long)]
        episodes: Option<usize>,
        /// Continue from a checkpoint.
        #[arg(long)]
        resume: Option<PathBuf>,
    },
    /// Compare a checkpointed agent with the baseline controller.
    Evaluate {
        #[arg(long)]
        checkpoint: PathBuf,
        /// Held-out episodes (defaults to eval_episodes).
        #[arg(long)]
        episodes: Option<usize>,
    },
    /// Serve decisions for JSON requests read line by line from stdin.
    Infer {
        #[arg(long)]
        checkpoint: PathBuf,
        /// Default per-request deadline (ms).
        #[arg(long)]
        deadline_ms: Option<u64>,
    },
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut cfg = match &cli.config {
        Some(path) => Config::from_yaml_file(path)?,
        None => Config::from_env()?,
    };
    if let Some(dir) = &cli.output_dir {
        cfg.output_dir = dir.clone();
    }
    if cli.verbose > 0 {
        cfg.verbosity = cli.verbose;
    }
    Ok(cfg)
}

fn train(mut cfg: Config, seed: Option<u64>, episodes: Option<usize>, resume: Option<&Path>) -> Result<()> {
    if let Some(seed) = seed {
        cfg.seed = seed;
    }
    if let Some(episodes) = episodes {
        cfg.episodes = episodes;
    }
    let cfg = cfg.validated()?;

    println!(
        "satpower | cfg_hash={} | episodes={} | seed={} | out={}",
        cfg.fingerprint(),
        cfg.episodes,
        cfg.seed,
        cfg.output_dir.display()
    );

    let mut trainer = match resume {
        Some(path) => Trainer::resume(cfg.clone(), path)?,
        None => Trainer::new(cfg.clone())?,
    };
    let summary = trainer.run()?;
    println!(
        "satpower | trained episodes {}..={} | train_steps={} | epsilon={:.4} | stopped_early={}",
        summary.first_episode,
        summary.last_episode,
        summary.train_steps,
        summary.final_epsilon,
        summary.stopped_early
    );

    let mut evaluator = Evaluator::new(&cfg)?;
    let report = evaluator.compare(&trainer.agent().greedy_policy(), cfg.eval_episodes)?;
    write_reports(&report, &cfg.output_dir)?;
    print_console_summary(&report);
    Ok(())
}

fn evaluate(mut cfg: Config, checkpoint: &Path, episodes: Option<usize>) -> Result<()> {
    let ckpt = Checkpoint::load(checkpoint)
        .with_context(|| format!("Failed to load checkpoint {}", checkpoint.display()))?;
    // Evaluate under the link model the agent was trained on.
    cfg.channel = ckpt.header.channel.clone();
    cfg.target_rsrp = ckpt.header.target_rsrp;
    cfg.rsrp_violation_threshold = ckpt.header.rsrp_violation_threshold;
    cfg.baseline = ckpt.header.baseline.clone();
    let cfg = cfg.validated()?;

    let policy = FrozenQNetwork::from_checkpoint(&ckpt)?;
    let mut evaluator = Evaluator::new(&cfg)?;
    let report = evaluator.compare(&policy, episodes.unwrap_or(cfg.eval_episodes))?;
    let (json, md) = write_reports(&report, &cfg.output_dir)?;
    print_console_summary(&report);
    eprintln!("[evaluate] Wrote {} and {}", json.display(), md.display());
    Ok(())
}

async fn infer(mut cfg: Config, checkpoint: &Path, deadline_ms: Option<u64>) -> Result<()> {
    if let Some(ms) = deadline_ms {
        cfg.inference.default_deadline_ms = ms;
    }
    let cfg = cfg.validated()?;
    let service = InferenceService::load(checkpoint, &cfg.inference)
        .with_context(|| format!("Failed to start inference from {}", checkpoint.display()))?;
    eprintln!(
        "[inference] Serving {} (deadline={}ms, reserve={}ms)",
        checkpoint.display(),
        cfg.inference.default_deadline_ms,
        cfg.inference.fallback_reserve_ms
    );

    let stdin = io::stdin();
    let mut stdout = io::stdout().lock();
    for (n, line) in stdin.lock().lines().enumerate() {
        let line = line.context("Failed to read stdin")?;
        if line.trim().is_empty() {
            continue;
        }
        let request: InferenceRequest = match serde_json::from_str(&line) {
            Ok(r) => r,
            Err(e) => {
                eprintln!("[inference] WARN: skipping line {}: {}", n + 1, e);
                continue;
            }
        };
        let response = service.infer(request).await;
        serde_json::to_writer(&mut stdout, &response)?;
        stdout.write_all(b"\n")?;
        stdout.flush()?;
    }

    let stats = service.stats();
    eprintln!(
        "[inference] requests={} network={} fallbacks={} (timeouts={} non_finite={} errors={}) fallback_rate={:.4}",
        stats.requests,
        stats.network,
        stats.fallbacks,
        stats.timeouts,
        stats.non_finite,
        stats.errors,
        stats.fallback_rate()
    );
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let cfg = load_config(&cli)?;
    match cli.command {
        Command::Train {
            seed,
            episodes,
            resume,
        } => train(cfg, seed, episodes, resume.as_deref()),
        Command::Evaluate {
            checkpoint,
            episodes,
        } => evaluate(cfg, &checkpoint, episodes),
        Command::Infer {
            checkpoint,
            deadline_ms,
        } => infer(cfg, &checkpoint, deadline_ms).await,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        eprintln!("satpower | error={:#}", err);
        std::process::exit(2);
    }
}
