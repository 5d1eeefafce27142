//! Headless reverie runner.
//!
//! Loads a world and a set of agents, runs a number of ticks against a
//! file-exchange front-end or on its own, and saves the result.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use reverie_core::{
    Agent, CognitionEngine, CognitionOracle, EmbeddingProvider, HashingEmbeddingProvider, PersistenceEngine,
    ReverieConfig, StubOracle, WorldBootstrap,
};
use reverie_llm::{LlmEmbeddingProvider, LlmOracle};
use reverie_sim::orchestrator::load_dir;
use reverie_sim::{FileMover, Mover, PathFollower, SimError, Simulation};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Run a generative-agent town simulation.
#[derive(Parser, Debug)]
#[command(name = "reverie")]
#[command(about = "Run a generative-agent town simulation")]
struct Args {
    /// TOML configuration file
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// World bootstrap JSON
    #[arg(long)]
    world: PathBuf,

    /// Directory of agent folders, or a saved simulation (with meta.json)
    #[arg(long)]
    agents: PathBuf,

    /// Number of ticks to run
    #[arg(long, default_value_t = 360)]
    steps: u64,

    /// Move agents along their own paths instead of waiting for a front-end
    #[arg(long)]
    headless: bool,

    /// Use the deterministic stub instead of the configured LLM
    #[arg(long)]
    stub: bool,

    /// Random seed for deterministic runs
    #[arg(long)]
    seed: Option<u64>,

    /// Skip the SQLite store
    #[arg(long)]
    no_db: bool,

    /// Emit JSON log lines
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ReverieConfig::from_file(path).with_context(|| format!("loading {}", path.display()))?,
        None => ReverieConfig::default(),
    };
    if args.seed.is_some() {
        config.simulation.seed = args.seed;
    }
    init_tracing(&config.logging.level, args.json_logs || config.logging.json);

    let world = WorldBootstrap::from_file(&args.world)
        .and_then(|b| b.build())
        .with_context(|| format!("loading world {}", args.world.display()))?;

    let oracle = build_oracle(&config, args.stub)?;
    let embedder = build_embedder(&config, args.stub)?;
    let engine = CognitionEngine::new(oracle, embedder, &config);

    let resuming = args.agents.join("meta.json").exists();
    let mut sim = if resuming {
        let (meta, agents) = load_dir(&args.agents)?;
        let sim_code = args
            .agents
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Simulation::resume(config.clone(), world, agents, engine, meta)?.forked_from(sim_code)
    } else {
        let agents = load_agents(&args.agents)?;
        Simulation::new(config.clone(), world, agents, engine)?
    };

    if !args.no_db {
        let store = PersistenceEngine::open(&config.persistence.db_path, &config.persistence)
            .with_context(|| format!("opening {}", config.persistence.db_path))?;
        if !store.integrity_check()? {
            warn!(db = %config.persistence.db_path, "Database failed its integrity check");
        }
        // The world file only has idle objects; bring back the last saved step.
        if resuming
            && let Some(step) = sim.step().checked_sub(1)
            && let Some(snapshot) = store.load_tile_events(step)?
        {
            sim.restore_tile_events(&snapshot);
            info!(step, tiles = snapshot.len(), "Tile events restored");
        }
        sim = sim.with_store(store);
    }

    let (abort_tx, abort_rx) = watch::channel(false);
    sim = sim.with_abort(abort_rx);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; stopping after the current step");
            let _ = abort_tx.send(true);
        }
    });

    let storage = Path::new(&config.simulation.storage_dir).join(&config.simulation.sim_code);
    let mut mover: Box<dyn Mover> = if args.headless {
        Box::new(PathFollower::from_agents(sim.agents(), sim.world())?.starting_at(sim.step()))
    } else {
        Box::new(FileMover::new(&storage)?)
    };

    let outcome = sim.run(mover.as_mut(), args.steps).await;
    match &outcome {
        Ok(steps) => info!(steps, "Run finished"),
        Err(SimError::Aborted { step }) => info!(step, "Run aborted"),
        Err(e) => warn!(error = %e, "Run failed; saving progress"),
    }

    sim.save()?;
    sim.save_dir(&storage)?;

    match outcome {
        Ok(_) | Err(SimError::Aborted { .. }) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn build_oracle(config: &ReverieConfig, stub: bool) -> Result<Arc<dyn CognitionOracle>> {
    if stub || config.llm.provider == "none" {
        info!("Using the deterministic stub oracle");
        return Ok(Arc::new(StubOracle::new()));
    }
    let oracle = LlmOracle::from_config(config).context("configuring the LLM oracle")?;
    info!(provider = %config.llm.provider, model = %config.llm.model, "Using the LLM oracle");
    Ok(Arc::new(oracle))
}

fn build_embedder(config: &ReverieConfig, stub: bool) -> Result<Arc<dyn EmbeddingProvider>> {
    if stub || config.llm.provider == "none" {
        info!("Using hashed bag-of-words embeddings");
        return Ok(Arc::new(HashingEmbeddingProvider::default()));
    }
    let embedder = LlmEmbeddingProvider::from_config(config).context("configuring LLM embeddings")?;
    info!(provider = %config.llm.provider, model = %config.llm.embedding_model, "Using LLM embeddings");
    Ok(Arc::new(embedder))
}

/// Every subdirectory holding a `scratch.json` is an agent.
fn load_agents(dir: &Path) -> Result<Vec<Agent>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("reading {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.join("scratch.json").exists())
        .collect();
    paths.sort();

    let agents = paths
        .iter()
        .map(|p| Agent::load_dir(p).with_context(|| format!("loading agent {}", p.display())))
        .collect::<Result<Vec<_>>>()?;
    if agents.is_empty() {
        bail!("no agents found under {}", dir.display());
    }
    Ok(agents)
}
