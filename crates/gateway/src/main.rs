use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use hearth_domain::config::Config;
use hearth_gateway::api;
use hearth_gateway::auth::hash_token;
use hearth_gateway::cli::{load_config, Cli, Command};
use hearth_gateway::runtime::agenda::AgendaStore;
use hearth_gateway::runtime::connections::ConnectionRegistry;
use hearth_gateway::runtime::delivery::{run_agent_turn_worker, PayloadDelivery};
use hearth_gateway::runtime::dispatcher::Dispatcher;
use hearth_gateway::runtime::executor::Executor;
use hearth_gateway::runtime::job_runner::Scheduler;
use hearth_gateway::runtime::jobs::JobEngine;
use hearth_gateway::runtime::metrics::Metrics;
use hearth_gateway::runtime::planner::Planner;
use hearth_gateway::runtime::proactive::ProactiveService;
use hearth_gateway::runtime::task_store::TaskStore;
use hearth_gateway::runtime::validator::Validator;
use hearth_gateway::runtime::TurnRuntime;
use hearth_gateway::state::AppState;
use hearth_providers::{ModelClient, OpenAiCompatClient};
use hearth_sessions::{HistoryStore, MetaStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        None | Some(Command::Serve) => {
            init_tracing();
            let config = load_config(&cli.config)?;
            run_server(Arc::new(config)).await
        }
        Some(Command::ConfigCheck) => {
            let config = load_config(&cli.config)?;
            println!(
                "config ok: data_dir={}, bind={}",
                config.server.data_dir.display(),
                config.server.bind_addr
            );
            Ok(())
        }
        Some(Command::Version) => {
            println!("hearthd {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

async fn run_server(config: Arc<Config>) -> anyhow::Result<()> {
    let data_dir = &config.server.data_dir;
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("creating data dir {}", data_dir.display()))?;

    // ── Stores ───────────────────────────────────────────────────────
    let meta = Arc::new(MetaStore::new(data_dir)?);
    let history = Arc::new(HistoryStore::new(&data_dir.join("history"))?);
    let agenda = Arc::new(AgendaStore::open(data_dir)?);
    let tasks = Arc::new(TaskStore::open(
        data_dir,
        config.agent.max_turns,
        config.agent.max_tool_attempts,
    )?);
    let connections = Arc::new(ConnectionRegistry::new());
    let metrics = Arc::new(Metrics::new());

    // ── Job engine + delivery ────────────────────────────────────────
    let (agent_turn_tx, agent_turn_rx) = tokio::sync::mpsc::unbounded_channel();
    let delivery = Arc::new(PayloadDelivery::new(
        history.clone(),
        connections.clone(),
        agent_turn_tx,
    ));
    let jobs = Arc::new(JobEngine::open(
        data_dir,
        config.scheduler.clone(),
        delivery,
        &meta,
    )?);

    // ── Model client ─────────────────────────────────────────────────
    let api_key = std::env::var(&config.model.api_key_env).ok();
    let model: Arc<dyn ModelClient> = Arc::new(OpenAiCompatClient::new(
        config.model.base_url.clone(),
        api_key,
        config.model.model.clone(),
    ));

    // ── Turn runtime ─────────────────────────────────────────────────
    let dispatcher = Arc::new(Dispatcher::new(
        jobs.clone(),
        agenda.clone(),
        hearth_tools::web::http_client().map_err(|e| anyhow::anyhow!(e))?,
        config.workspace.root.clone(),
    ));
    let runtime = Arc::new(TurnRuntime {
        config: config.clone(),
        model: Some(model),
        dispatcher: dispatcher.clone(),
        planner: Planner::new(dispatcher.clone()),
        executor: Executor::new(dispatcher.clone()),
        validator: Validator::new(config.agent.check_pii),
        tasks: tasks.clone(),
        metrics: metrics.clone(),
    });

    // ── Background loops ─────────────────────────────────────────────
    tokio::spawn(Scheduler::new(jobs.clone(), config.scheduler.tick_seconds).run());
    tokio::spawn(
        ProactiveService::new(agenda.clone(), connections.clone(), config.proactive.clone())
            .run(),
    );
    tokio::spawn(run_agent_turn_worker(
        runtime.clone(),
        history.clone(),
        connections.clone(),
        agent_turn_rx,
    ));

    // ── HTTP surface ─────────────────────────────────────────────────
    let api_token_hash = std::env::var(&config.server.token_env)
        .ok()
        .filter(|t| !t.is_empty())
        .map(|t| hash_token(&t));
    if api_token_hash.is_none() {
        tracing::warn!("no API token configured; running open (dev mode)");
    }

    let state = AppState {
        config: config.clone(),
        meta,
        history,
        jobs,
        agenda,
        connections,
        runtime,
        metrics,
        api_token_hash,
    };

    let app = api::router(state);
    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.server.bind_addr))?;
    tracing::info!(addr = %config.server.bind_addr, "hearthd listening");
    axum::serve(listener, app).await.context("serving")?;
    Ok(())
}
