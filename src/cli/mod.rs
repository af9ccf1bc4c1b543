//! `clap`-derived CLI surface: one-shot subcommands plus the `team`
//! interactive REPL entry point.

use crate::config::{AgentMode, InstructionLevel, Provider};
use clap::{Parser, Subcommand};

/// A durable, multi-user personal agent runtime.
#[derive(Parser)]
#[command(name = "persag", version, about)]
pub struct Cli {
    /// Enables debug-level logging for this invocation.
    #[arg(long, global = true)]
    pub debug: bool,

    /// Overrides the active instruction level for this invocation.
    #[arg(long, global = true)]
    pub instruction_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands.
#[derive(Subcommand)]
pub enum Commands {
    /// Enters the interactive REPL.
    Team {
        /// Prefer remote provider endpoints over local ones.
        #[arg(long)]
        remote: bool,
        /// Force single-agent mode for this session.
        #[arg(long)]
        single: bool,
        /// Rebuild specialist agents even if cached.
        #[arg(long)]
        recreate: bool,
        /// Run one query non-interactively and exit.
        #[arg(short, long)]
        query: Option<String>,
    },
    /// Prints or mutates the Config Registry snapshot.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// One-shot memory operations.
    Memory {
        #[command(subcommand)]
        action: MemoryAction,
    },
    /// One-shot Docker Consistency Controller operations.
    Docker {
        #[command(subcommand)]
        action: DockerAction,
    },
    /// Runs the long-lived process hosting the agent loop for a
    /// non-interactive caller.
    Serve,
}

/// `persag config` subcommands.
#[derive(Subcommand)]
pub enum ConfigAction {
    /// Prints the current configuration snapshot.
    Show,
    /// Mutates one configuration field.
    Set {
        /// Field to set: `provider`, `model`, `agent-mode`, `instruction-level`, `user-id`.
        field: String,
        /// New value.
        value: String,
    },
}

/// `persag memory` subcommands.
#[derive(Subcommand)]
pub enum MemoryAction {
    /// Stores a new memory for the active user.
    Store {
        /// Memory text.
        text: String,
        /// Comma-separated topic tags.
        #[arg(short, long)]
        topics: Option<String>,
    },
    /// Searches memories for the active user.
    Search {
        /// Query text.
        query: String,
        /// Maximum results.
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },
    /// Prints memory statistics for the active user.
    Stats,
    /// Clears memory for the active user across all backends.
    Clear {
        /// Simulate without deleting anything.
        #[arg(long)]
        dry_run: bool,
        /// Only clear the local semantic store.
        #[arg(long)]
        semantic_only: bool,
    },
}

/// `persag docker` subcommands.
#[derive(Subcommand)]
pub enum DockerAction {
    /// Reports whether managed services agree with the active user.
    Check,
    /// Syncs managed services to the active user.
    Sync {
        /// Restart services even if their `USER_ID` already matches.
        #[arg(long)]
        force_restart: bool,
    },
}

/// Resolves the `--instruction-level` override, if given, against the
/// same parser the Config Registry uses.
pub fn parse_instruction_level_override(raw: &Option<String>) -> crate::Result<Option<InstructionLevel>> {
    raw.as_deref().map(parse_instruction_level).transpose()
}

fn parse_instruction_level(s: &str) -> crate::Result<InstructionLevel> {
    match s.to_uppercase().as_str() {
        "MINIMAL" => Ok(InstructionLevel::Minimal),
        "CONCISE" => Ok(InstructionLevel::Concise),
        "STANDARD" => Ok(InstructionLevel::Standard),
        "EXPLICIT" => Ok(InstructionLevel::Explicit),
        "EXPERIMENTAL" => Ok(InstructionLevel::Experimental),
        other => Err(crate::Error::InvalidInput(format!("invalid instruction level: {other}"))),
    }
}

/// Parses a provider/model/agent-mode field name and value pair for
/// `persag config set`.
pub fn apply_config_set(registry: &crate::ConfigRegistry, field: &str, value: &str) -> crate::Result<()> {
    match field {
        "provider" => {
            let provider = Provider::parse(value)?;
            registry.set_provider(provider, true);
            Ok(())
        }
        "model" => {
            registry.set_model(value);
            Ok(())
        }
        "agent-mode" => {
            let mode = match value {
                "single" => AgentMode::Single,
                "team" => AgentMode::Team,
                other => return Err(crate::Error::InvalidInput(format!("invalid agent mode: {other}"))),
            };
            registry.set_agent_mode(mode);
            Ok(())
        }
        "instruction-level" => {
            registry.set_instruction_level(parse_instruction_level(value)?);
            Ok(())
        }
        "user-id" => registry.set_user_id(value, true),
        other => Err(crate::Error::InvalidInput(format!("unknown config field: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_instruction_level_override() {
        let result = parse_instruction_level_override(&Some("standard".to_string())).unwrap();
        assert_eq!(result, Some(InstructionLevel::Standard));
    }

    #[test]
    fn missing_override_is_none() {
        let result = parse_instruction_level_override(&None).unwrap();
        assert_eq!(result, None);
    }

    #[test]
    fn rejects_unknown_instruction_level() {
        assert!(parse_instruction_level_override(&Some("bogus".to_string())).is_err());
    }
}
