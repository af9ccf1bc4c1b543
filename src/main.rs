//! Binary entry point for persag.
//!
//! Wires the Config Registry, identity store, memory backends, graph
//! client, Docker controller, tool registry, and LLM provider into the
//! CLI surface and the interactive REPL.
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
#![allow(clippy::print_stdout, clippy::print_stderr)]

use clap::Parser;
use persag::cli::{self, Cli, Commands, ConfigAction, DockerAction, MemoryAction};
use persag::clearing::{ClearingOptions, MemoryClearingService};
use persag::coordinator::MemoryCoordinator;
use persag::docker::DockerController;
use persag::graph::GraphClient;
use persag::knowledge::{KnowledgeCoordinator, QueryMode};
use persag::llm::{self, ChatMessage, Role};
use persag::memory::{MemoryStore, SqliteMemoryStore, DEFAULT_SEARCH_THRESHOLD};
use persag::tools::{KnowledgeTool, MemoryTool, ToolRegistry};
use persag::agent::{AgentConfig, AgentRuntime};
use persag::config::AgentMode;
use persag::observability::{self, LoggingConfig};
use persag::team::{Intent, Specialist, TeamCoordinator};
use persag::ConfigRegistry;
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    let registry = ConfigRegistry::global();

    let logging = LoggingConfig::from_debug_mode(cli.debug || registry.runtime().debug_mode);
    if let Err(e) = observability::init(&logging) {
        eprintln!("[fatal] failed to initialize logging: {e}");
        return std::process::ExitCode::FAILURE;
    }

    if let Ok(Some(level)) = cli::parse_instruction_level_override(&cli.instruction_level) {
        registry.set_instruction_level(level);
    }

    match run(cli.command, registry).await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::ExitCode::FAILURE
        }
    }
}

async fn run(command: Commands, registry: &'static ConfigRegistry) -> persag::Result<()> {
    match command {
        Commands::Config { action } => run_config(action, registry),
        Commands::Memory { action } => run_memory(action, registry).await,
        Commands::Docker { action } => run_docker(action, registry).await,
        Commands::Team { remote: _, single, recreate: _, query } => {
            if single {
                registry.set_agent_mode(persag::config::AgentMode::Single);
            }
            run_team(registry, query).await
        }
        Commands::Serve => run_serve(registry).await,
    }
}

fn run_config(action: ConfigAction, registry: &ConfigRegistry) -> persag::Result<()> {
    match action {
        ConfigAction::Show => {
            let snapshot = registry.snapshot();
            println!("user_id: {}", snapshot.user_id);
            println!("provider: {}", snapshot.provider.as_str());
            println!("model: {}", snapshot.model);
            println!("debug_mode: {}", snapshot.debug_mode);
            println!("use_mcp: {}", snapshot.use_mcp);
            println!("enable_memory: {}", snapshot.enable_memory);
            let mut keys: Vec<_> = snapshot.paths.keys().collect();
            keys.sort();
            for key in keys {
                println!("{key}: {}", snapshot.paths[key]);
            }
            Ok(())
        }
        ConfigAction::Set { field, value } => cli::apply_config_set(registry, &field, &value),
    }
}

fn open_store(registry: &ConfigRegistry) -> persag::Result<Arc<dyn MemoryStore>> {
    let snapshot = registry.snapshot();
    let db_path = Path::new(&snapshot.paths["USER_DATA_DIR"]).join("agent_memory.db");
    Ok(Arc::new(SqliteMemoryStore::open(db_path)?))
}

fn graph_client(registry: &ConfigRegistry) -> GraphClient {
    GraphClient::new(registry.runtime().lightrag_memory_url.clone())
}

async fn run_memory(action: MemoryAction, registry: &ConfigRegistry) -> persag::Result<()> {
    let user_id = registry.user_id();
    let store = open_store(registry)?;
    let graph = graph_client(registry);
    let coordinator = MemoryCoordinator::new(store.clone(), graph.clone());

    match action {
        MemoryAction::Store { text, topics } => {
            let topics = topics.map(|t| t.split(',').map(|s| s.trim().to_string()).collect());
            let (add_outcome, leg) = coordinator.store_user_memory(&user_id, &text, topics).await?;
            println!(
                "id={} accepted={} local_ok={} graph_ok={:?} detail={}",
                add_outcome.id, add_outcome.accepted, leg.local_ok, leg.graph_ok, leg.detail
            );
            Ok(())
        }
        MemoryAction::Search { query, limit } => {
            let results = store.search_memories(&user_id, &query, limit, DEFAULT_SEARCH_THRESHOLD, true, 0.1)?;
            for (record, score) in results {
                println!("[{score:.2}] {}  ({})", record.text, record.topics.join(", "));
            }
            Ok(())
        }
        MemoryAction::Stats => {
            let stats = store.get_memory_stats(&user_id)?;
            println!("total_memories: {}", stats.total_memories);
            println!("recent_24h: {}", stats.recent_24h);
            println!("most_common_topic: {:?}", stats.most_common_topic);
            Ok(())
        }
        MemoryAction::Clear { dry_run, semantic_only } => {
            let snapshot = registry.snapshot();
            let clearing = MemoryClearingService::new(
                user_id,
                store,
                graph,
                snapshot.paths["LIGHTRAG_MEMORY_INPUTS_DIR"].clone(),
                vec![
                    Path::new(&snapshot.paths["LIGHTRAG_MEMORY_STORAGE_DIR"]).to_path_buf(),
                    Path::new(&snapshot.paths["LIGHTRAG_STORAGE_DIR"]).to_path_buf(),
                ],
            );
            let options = ClearingOptions { dry_run, semantic_only, ..Default::default() };
            let outcome = clearing.clear_all(&options).await;
            println!("{}", outcome.summary);
            Ok(())
        }
    }
}

async fn run_docker(action: DockerAction, registry: &ConfigRegistry) -> persag::Result<()> {
    let user_id = registry.user_id();
    let controller = DockerController::new(Path::new(&registry.runtime().persag_root), false);
    match action {
        DockerAction::Check => {
            let consistency = controller.check_consistency(&user_id).await;
            for (service, entry) in consistency {
                println!("{service}: user_id={:?} consistent={} running={}", entry.docker_user_id, entry.consistent, entry.running);
            }
            Ok(())
        }
        DockerAction::Sync { force_restart } => {
            let outcome = controller.sync_user_ids(&user_id, force_restart).await;
            for line in &outcome.log {
                println!("{:?}: {}", line.tag, line.message);
            }
            Ok(())
        }
    }
}

fn build_tool_registry(registry: &ConfigRegistry, store: Arc<dyn MemoryStore>, graph: GraphClient) -> ToolRegistry {
    let user_id = registry.user_id();
    let coordinator = Arc::new(MemoryCoordinator::new(store.clone(), graph.clone()));
    let knowledge = Arc::new(KnowledgeCoordinator::new(store, graph));

    let mut tools = ToolRegistry::new();
    let _ = tools.register(MemoryTool::new(coordinator, user_id.clone()));
    let _ = tools.register(KnowledgeTool::new(knowledge, user_id));
    tools
}

fn build_agent(registry: &ConfigRegistry, provider: Arc<dyn llm::LlmProvider>, tools: Arc<ToolRegistry>) -> AgentRuntime {
    let snapshot = registry.snapshot();
    let mut config = AgentConfig::new(snapshot.model, snapshot.provider);
    config.agent_mode = snapshot.agent_mode;
    config.instruction_level = snapshot.instruction_level;
    config.memory_enabled = snapshot.enable_memory;
    AgentRuntime::new(provider, tools, config)
}

const SYSTEM_PROMPT: &str = "You are a helpful personal agent. Use the `remember` tool to store durable facts the user shares and `recall` to look up past context before answering.";

/// One system prompt per [`Intent`], used to build the team coordinator's
/// specialists. Every specialist shares the same tool registry; what
/// distinguishes them is the role framing the coordinator routes into.
fn specialist_prompt(intent: Intent) -> &'static str {
    match intent {
        Intent::Memory => "You are the memory specialist. Recall and store durable facts about the user; prefer the `remember` and `recall` tools over guessing.",
        Intent::Web => "You are the web research specialist. Answer using current, externally sourced information where possible.",
        Intent::Finance => "You are the finance specialist. Answer questions about prices, portfolios, and markets precisely, noting when data may be stale.",
        Intent::Calculator => "You are the calculator specialist. Work out the arithmetic or statistic requested and show the result plainly.",
        Intent::Image => "You are the image-generation specialist. Describe the image that would be generated for this request.",
        Intent::Python => "You are the code-execution specialist. Reason through what the given code or script would do.",
        Intent::File => "You are the file I/O specialist. Reason about reading, writing, or saving the requested file content.",
        Intent::System => "You are the system-commands specialist. Reason about what the requested shell command would do.",
        Intent::Medical => "You are the medical-information specialist. Answer cautiously and recommend consulting a doctor for diagnosis or dosage decisions.",
    }
}

fn build_team_coordinator(registry: &ConfigRegistry, provider: Arc<dyn llm::LlmProvider>, tools: Arc<ToolRegistry>) -> TeamCoordinator {
    const INTENTS: [Intent; 9] = [
        Intent::Memory,
        Intent::Web,
        Intent::Finance,
        Intent::Calculator,
        Intent::Image,
        Intent::Python,
        Intent::File,
        Intent::System,
        Intent::Medical,
    ];
    let members = INTENTS
        .into_iter()
        .map(|intent| Specialist {
            intent,
            runtime: build_agent(registry, provider.clone(), tools.clone()),
            system_prompt: specialist_prompt(intent).to_string(),
        })
        .collect();
    TeamCoordinator::new(members)
}

async fn run_team(registry: &ConfigRegistry, one_shot_query: Option<String>) -> persag::Result<()> {
    let store = open_store(registry)?;
    let graph = graph_client(registry);
    let tools = Arc::new(build_tool_registry(registry, store, graph));
    let provider = llm::build_provider(registry.provider());
    let team = (registry.agent_mode() == AgentMode::Team)
        .then(|| build_team_coordinator(registry, provider.clone(), tools.clone()));
    let runtime = build_agent(registry, provider, tools);
    let mut history: Vec<ChatMessage> = Vec::new();

    if let Some(query) = one_shot_query {
        let content = run_one_turn(&runtime, team.as_ref(), &history, &query).await?;
        println!("{content}");
        return Ok(());
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    loop {
        print!("> ");
        stdout.flush().ok();
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "quit" {
            break;
        }
        if let Some(result) = handle_repl_command(line, registry).await? {
            println!("{result}");
            continue;
        }

        history.push(ChatMessage { role: Role::User, content: line.to_string() });
        let content = run_one_turn(&runtime, team.as_ref(), &history[..history.len() - 1], line).await?;
        println!("{content}");
        history.push(ChatMessage { role: Role::Assistant, content });
    }

    Ok(())
}

/// Runs one turn: delegates through the team coordinator when team mode
/// is active, otherwise drives the single-agent runtime directly.
async fn run_one_turn(
    runtime: &AgentRuntime,
    team: Option<&TeamCoordinator>,
    history: &[ChatMessage],
    query: &str,
) -> persag::Result<String> {
    if let Some(team) = team {
        let result = team.delegate(history, query, CancellationToken::new()).await?;
        Ok(result.content)
    } else {
        let result = runtime.run(SYSTEM_PROMPT, history, query, CancellationToken::new()).await?;
        Ok(result.final_content)
    }
}

/// Handles the in-session REPL verbs (`memories`, `analysis`, `stats`,
/// `clear`, `delete memory <id>`, `delete topic <topic>`, `! <text>`,
/// `? <topic>`). Returns `Ok(None)` when `line` is an ordinary query
/// that should be routed to the agent loop instead.
async fn handle_repl_command(line: &str, registry: &ConfigRegistry) -> persag::Result<Option<String>> {
    let user_id = registry.user_id();

    if let Some(text) = line.strip_prefix('!') {
        let store = open_store(registry)?;
        let graph = graph_client(registry);
        let coordinator = MemoryCoordinator::new(store, graph);
        let (add_outcome, leg) = coordinator.store_user_memory(&user_id, text.trim(), None).await?;
        return Ok(Some(format!("stored id={} (local_ok={})", add_outcome.id, leg.local_ok)));
    }

    if let Some(topic) = line.strip_prefix('?') {
        let store = open_store(registry)?;
        let graph = graph_client(registry);
        let knowledge = KnowledgeCoordinator::new(store, graph);
        let answer = knowledge.query(&user_id, topic.trim(), QueryMode::Auto, 5).await?;
        return Ok(Some(answer));
    }

    if line == "memories" {
        let store = open_store(registry)?;
        let records = store.get_all_memories(&user_id)?;
        let text = records.iter().map(|r| format!("- {} ({})", r.text, r.topics.join(", "))).collect::<Vec<_>>().join("\n");
        return Ok(Some(text));
    }

    if line == "stats" {
        let store = open_store(registry)?;
        let stats = store.get_memory_stats(&user_id)?;
        return Ok(Some(format!("{} memories, {} in the last 24h", stats.total_memories, stats.recent_24h)));
    }

    if line == "clear" {
        let store = open_store(registry)?;
        let graph = graph_client(registry);
        let snapshot = registry.snapshot();
        let clearing = MemoryClearingService::new(
            user_id,
            store,
            graph,
            snapshot.paths["LIGHTRAG_MEMORY_INPUTS_DIR"].clone(),
            vec![
                Path::new(&snapshot.paths["LIGHTRAG_MEMORY_STORAGE_DIR"]).to_path_buf(),
                Path::new(&snapshot.paths["LIGHTRAG_STORAGE_DIR"]).to_path_buf(),
            ],
        );
        let outcome = clearing.clear_all(&ClearingOptions::default()).await;
        return Ok(Some(outcome.summary));
    }

    if let Some(id) = line.strip_prefix("delete memory ") {
        let store = open_store(registry)?;
        let graph = graph_client(registry);
        let coordinator = MemoryCoordinator::new(store, graph);
        let result = coordinator.delete_memory(id.trim(), &user_id).await?;
        return Ok(Some(format!("local_ok={} graph_ok={:?}", result.local_ok, result.graph_ok)));
    }

    if let Some(topic) = line.strip_prefix("delete topic ") {
        let store = open_store(registry)?;
        let graph = graph_client(registry);
        let coordinator = MemoryCoordinator::new(store, graph);
        let results = coordinator.delete_by_topic(&user_id, &[topic.trim().to_string()]).await?;
        return Ok(Some(format!("deleted {} memories under topic", results.len())));
    }

    if line == "analysis" {
        return Ok(Some("analysis is provided by the agent loop; ask a question instead".to_string()));
    }

    Ok(None)
}

async fn run_serve(registry: &ConfigRegistry) -> persag::Result<()> {
    let user_id = registry.user_id();
    let controller = DockerController::new(Path::new(&registry.runtime().persag_root), false);
    controller.ensure_consistency(&user_id, true, false).await;

    let store = open_store(registry)?;
    let graph = graph_client(registry);
    let tools = Arc::new(build_tool_registry(registry, store, graph));
    let provider = llm::build_provider(registry.provider());
    let _runtime = build_agent(registry, provider, tools);

    println!("persag serve: listening (agent loop ready for a front-end to drive it)");
    tokio::signal::ctrl_c().await.map_err(|e| persag::Error::Fatal(format!("signal handler failed: {e}")))?;
    Ok(())
}
