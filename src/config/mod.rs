//! Process-wide configuration registry.
//!
//! [`ConfigRegistry`] is the single authority for mutable runtime settings:
//! the active LLM provider/model, service URLs, agent mode, and the
//! instruction sophistication level. It is a process singleton (mirroring
//! the `ServiceContainer` pattern used elsewhere in this codebase) rather
//! than a value threaded through every call, because many independent
//! subsystems (the agent loop, the Docker consistency controller, the CLI)
//! need to observe the same live state and react to changes to it.
//!
//! Mutations fire registered callbacks *after* the change has been
//! committed, in registration order. [`ConfigRegistry::set_provider`]
//! notifies once for the provider change and, when `auto_set_model` is
//! set, a second time for the resulting model change — two distinct
//! events, not one.

mod registry;

pub use registry::{ConfigCallback, ConfigRegistry};

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::OnceLock;

/// LLM provider selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provider {
    /// Local Ollama server.
    Ollama,
    /// LM Studio local server.
    LmStudio,
    /// Hosted OpenAI API.
    OpenAi,
}

impl Provider {
    /// Parses a provider name, accepting the same spellings the
    /// environment-variable surface uses.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "ollama" => Ok(Self::Ollama),
            "lm-studio" | "lmstudio" => Ok(Self::LmStudio),
            "openai" => Ok(Self::OpenAi),
            other => Err(Error::InvalidInput(format!(
                "invalid provider: {other}. Must be one of ollama, lm-studio, openai"
            ))),
        }
    }

    /// The provider's default model, used when switching providers with
    /// `auto_set_model` enabled.
    #[must_use]
    pub const fn default_model(self) -> &'static str {
        match self {
            Self::Ollama => "hf.co/unsloth/Qwen3-4B-Instruct-2507-GGUF:Q6_K",
            Self::LmStudio => "qwen3-4b-instruct-2507-mlx",
            Self::OpenAi => "gpt-4o",
        }
    }

    /// Canonical lowercase, hyphenated name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
            Self::LmStudio => "lm-studio",
            Self::OpenAi => "openai",
        }
    }
}

/// Multi-agent mode selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentMode {
    /// A single agent handles every query.
    Single,
    /// Queries are routed through the [`crate::team`] coordinator.
    Team,
}

impl AgentMode {
    fn parse(s: &str) -> Result<Self> {
        match s {
            "single" => Ok(Self::Single),
            "team" => Ok(Self::Team),
            other => Err(Error::InvalidInput(format!(
                "invalid agent mode: {other}. Must be one of single, team"
            ))),
        }
    }
}

/// How much of the system prompt's instruction detail is included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InstructionLevel {
    /// Bare-minimum instructions.
    Minimal,
    /// The default: terse but complete.
    Concise,
    /// Full instruction set, including edge-case guidance.
    Standard,
    /// Standard plus explicit worked examples.
    Explicit,
    /// Unreleased/experimental instruction variants under evaluation.
    Experimental,
}

impl InstructionLevel {
    fn parse(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "MINIMAL" => Ok(Self::Minimal),
            "CONCISE" => Ok(Self::Concise),
            "STANDARD" => Ok(Self::Standard),
            "EXPLICIT" => Ok(Self::Explicit),
            "EXPERIMENTAL" => Ok(Self::Experimental),
            other => Err(Error::InvalidInput(format!(
                "invalid instruction level: {other}"
            ))),
        }
    }
}

/// Service URLs and other values sourced once from the environment at
/// process start. These are not mutated through the registry's callback
/// machinery; only the fields exposed by [`ConfigRegistry`]'s setters are.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Local Ollama endpoint.
    pub ollama_url: String,
    /// Tailscale/remote Ollama endpoint, used when `use_remote` is set.
    pub remote_ollama_url: String,
    /// Local LM Studio endpoint.
    pub lmstudio_url: String,
    /// Remote LM Studio endpoint.
    pub remote_lmstudio_url: String,
    /// OpenAI API base URL.
    pub openai_url: String,
    /// Graph (knowledge) service base URL.
    pub lightrag_url: String,
    /// Graph (memory) service base URL.
    pub lightrag_memory_url: String,
    /// Port the knowledge graph service listens on.
    pub lightrag_port: u16,
    /// Port the memory graph service listens on.
    pub lightrag_memory_port: u16,
    /// Root directory under which all per-user storage is rooted.
    pub persag_root: String,
    /// Per-host directory holding the persisted user id and seeded templates.
    pub persag_home: String,
    /// Storage backend namespace segment (`"agno"` by default).
    pub storage_backend: String,
    /// Whether MCP-style subprocess tools are available.
    pub use_mcp: bool,
    /// Whether the memory subsystem (C3/C4/C5) is enabled at all.
    pub enable_memory: bool,
    /// Whether remote (rather than local) provider URLs are preferred.
    pub use_remote: bool,
    /// Verbose/debug logging toggle.
    pub debug_mode: bool,
    /// Deterministic sampling seed, if any.
    pub seed: Option<u64>,
}

impl RuntimeConfig {
    /// Loads `.env` (if present, without overriding real environment
    /// variables) and then reads every field from the process
    /// environment, falling back to the documented defaults.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        let home = std::env::var("PERSAG_HOME").unwrap_or_else(|_| {
            directories::BaseDirs::new().map_or_else(
                || ".persag".to_string(),
                |b| b.home_dir().join(".persag").to_string_lossy().to_string(),
            )
        });

        Self {
            ollama_url: env_or("OLLAMA_URL", "http://localhost:11434"),
            remote_ollama_url: env_or("REMOTE_OLLAMA_URL", "http://100.100.248.61:11434"),
            lmstudio_url: env_or("LMSTUDIO_BASE_URL", "http://localhost:1234"),
            remote_lmstudio_url: env_or("REMOTE_LMSTUDIO_URL", "http://100.100.248.61:1234"),
            openai_url: "https://api.openai.com/v1".to_string(),
            lightrag_url: env_or("LIGHTRAG_URL", "http://localhost:9621"),
            lightrag_memory_url: env_or("LIGHTRAG_MEMORY_URL", "http://localhost:9622"),
            lightrag_port: env_or("LIGHTRAG_PORT", "9621").parse().unwrap_or(9621),
            lightrag_memory_port: env_or("LIGHTRAG_MEMORY_PORT", "9622")
                .parse()
                .unwrap_or(9622),
            persag_root: env_or("PERSAG_ROOT", "/Users/Shared/personal_agent_data"),
            persag_home: home,
            storage_backend: env_or("STORAGE_BACKEND", "agno"),
            use_mcp: env_bool("USE_MCP", true),
            enable_memory: env_bool("ENABLE_MEMORY", true),
            use_remote: env_bool("USE_REMOTE", false),
            debug_mode: env_bool("DEBUG", false),
            seed: std::env::var("LLM_SEED").ok().and_then(|v| v.parse().ok()),
        }
    }
}

fn env_or(key: &str, fallback: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| fallback.to_string())
}

fn env_bool(key: &str, fallback: bool) -> bool {
    std::env::var(key).map_or(fallback, |v| {
        matches!(v.to_lowercase().as_str(), "true" | "1" | "yes" | "on")
    })
}

/// Immutable point-in-time copy of every configuration field, including
/// the derived per-user storage paths. Callers that need a consistent
/// view across several reads should take one snapshot rather than calling
/// individual getters.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigSnapshot {
    /// Active user id.
    pub user_id: String,
    /// Active provider.
    pub provider: Provider,
    /// Active model name.
    pub model: String,
    /// Active agent mode.
    pub agent_mode: AgentMode,
    /// Active instruction level.
    pub instruction_level: InstructionLevel,
    /// Debug logging toggle.
    pub debug_mode: bool,
    /// Whether MCP-style tools are available.
    pub use_mcp: bool,
    /// Whether the memory subsystem is enabled.
    pub enable_memory: bool,
    /// Derived per-user storage paths.
    pub paths: HashMap<String, String>,
}

static RUNTIME: OnceLock<RuntimeConfig> = OnceLock::new();

/// Returns the process-wide [`RuntimeConfig`], loading it from the
/// environment on first access.
pub fn runtime() -> &'static RuntimeConfig {
    RUNTIME.get_or_init(RuntimeConfig::from_env)
}
