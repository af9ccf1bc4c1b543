//! The [`ConfigRegistry`] singleton: mutable fields layered on top of the
//! env-sourced [`super::RuntimeConfig`], with change callbacks.

use super::{AgentMode, ConfigSnapshot, InstructionLevel, Provider, RuntimeConfig};
use crate::identity::{UserIdentityStore, derive_storage_paths};
use crate::{Error, Result};
use std::sync::{Mutex, OnceLock, RwLock};

/// A registered change-notification callback: `fn(key, old, new)`.
pub type ConfigCallback = Box<dyn Fn(&str, &str, &str) + Send + Sync>;

struct MutableState {
    user_id: String,
    provider: Provider,
    model: String,
    agent_mode: AgentMode,
    instruction_level: InstructionLevel,
}

/// Process-wide configuration singleton.
///
/// All mutation goes through `&self` methods that take the `state` lock
/// just long enough to commit the change, release it, and only then call
/// [`Self::notify`], which holds the separate `callbacks` lock for the
/// duration of the call. A callback may therefore safely read `state`
/// again (e.g. via [`Self::snapshot`]) without deadlocking, since `state`
/// is already free by the time callbacks run.
pub struct ConfigRegistry {
    runtime: RuntimeConfig,
    identity: UserIdentityStore,
    state: RwLock<MutableState>,
    callbacks: Mutex<Vec<(String, ConfigCallback)>>,
}

static INSTANCE: OnceLock<ConfigRegistry> = OnceLock::new();

impl ConfigRegistry {
    fn new() -> Result<Self> {
        let runtime = RuntimeConfig::from_env();
        let identity = UserIdentityStore::new(runtime.persag_home.clone())?;
        let user_id = identity.get_user_id();
        let provider = Provider::parse(&std::env::var("PROVIDER").unwrap_or_else(|_| "ollama".to_string()))
            .unwrap_or(Provider::Ollama);
        let model = std::env::var("LLM_MODEL").unwrap_or_else(|_| provider.default_model().to_string());
        let agent_mode = std::env::var("AGENT_MODE")
            .ok()
            .and_then(|v| AgentMode::parse(&v).ok())
            .unwrap_or(AgentMode::Team);
        let instruction_level = std::env::var("INSTRUCTION_LEVEL")
            .ok()
            .and_then(|v| InstructionLevel::parse(&v).ok())
            .unwrap_or(InstructionLevel::Concise);

        Ok(Self {
            runtime,
            identity,
            state: RwLock::new(MutableState {
                user_id,
                provider,
                model,
                agent_mode,
                instruction_level,
            }),
            callbacks: Mutex::new(Vec::new()),
        })
    }

    /// Returns the process-wide instance, initializing it from the
    /// environment on first access.
    pub fn global() -> &'static Self {
        INSTANCE.get_or_init(|| Self::new().unwrap_or_else(|e| panic!("config init failed: {e}")))
    }

    /// Registers a callback, invoked (`key`, `old`, `new`) after every
    /// committed mutation, in registration order. Returns a token that can
    /// later be passed to [`Self::unregister_callback`].
    pub fn register_callback(&self, callback: ConfigCallback) -> usize {
        let mut callbacks = self.callbacks.lock().unwrap_or_else(|e| e.into_inner());
        let id = callbacks.len();
        callbacks.push((id.to_string(), callback));
        id
    }

    fn notify(&self, key: &str, old: &str, new: &str) {
        let callbacks = self.callbacks.lock().unwrap_or_else(|e| e.into_inner());
        for (_, cb) in callbacks.iter() {
            cb(key, old, new);
        }
    }

    /// The active user id.
    #[must_use]
    pub fn user_id(&self) -> String {
        self.state.read().unwrap_or_else(|e| e.into_inner()).user_id.clone()
    }

    /// Sets the active user id.
    ///
    /// Order of effects: persist to the identity store (if `persist`),
    /// commit the in-memory value, then fire the `user_id` callback last
    /// — by the time subscribers observe the change, derived paths from
    /// [`Self::snapshot`] already reflect the new user.
    pub fn set_user_id(&self, user_id: &str, persist: bool) -> Result<()> {
        if user_id.trim().is_empty() {
            return Err(Error::InvalidInput("user id must not be empty".into()));
        }
        if persist {
            self.identity.set_user_id(user_id)?;
        }
        let old = {
            let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
            let old = state.user_id.clone();
            state.user_id = user_id.to_string();
            old
        };
        self.notify("user_id", &old, user_id);
        Ok(())
    }

    /// The active provider.
    #[must_use]
    pub fn provider(&self) -> Provider {
        self.state.read().unwrap_or_else(|e| e.into_inner()).provider
    }

    /// Sets the active provider. Rejects unknown providers without
    /// touching any state. When `auto_set_model` is set, immediately
    /// triggers [`Self::set_model`] with the provider's default model as
    /// a second, distinct notification.
    pub fn set_provider(&self, provider: Provider, auto_set_model: bool) {
        let old = {
            let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
            let old = state.provider;
            state.provider = provider;
            old
        };
        self.notify("provider", old.as_str(), provider.as_str());
        if auto_set_model {
            self.set_model(provider.default_model());
        }
    }

    /// The active model name.
    #[must_use]
    pub fn model(&self) -> String {
        self.state.read().unwrap_or_else(|e| e.into_inner()).model.clone()
    }

    /// Sets the active model name.
    pub fn set_model(&self, model: &str) {
        let old = {
            let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
            let old = state.model.clone();
            state.model = model.to_string();
            old
        };
        self.notify("model", &old, model);
    }

    /// The active agent mode.
    #[must_use]
    pub fn agent_mode(&self) -> AgentMode {
        self.state.read().unwrap_or_else(|e| e.into_inner()).agent_mode
    }

    /// Sets the active agent mode.
    pub fn set_agent_mode(&self, mode: AgentMode) {
        let old = {
            let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
            let old = state.agent_mode;
            state.agent_mode = mode;
            old
        };
        let old_s = if matches!(old, AgentMode::Single) { "single" } else { "team" };
        let new_s = if matches!(mode, AgentMode::Single) { "single" } else { "team" };
        self.notify("agent_mode", old_s, new_s);
    }

    /// The active instruction level.
    #[must_use]
    pub fn instruction_level(&self) -> InstructionLevel {
        self.state.read().unwrap_or_else(|e| e.into_inner()).instruction_level
    }

    /// Sets the active instruction level.
    pub fn set_instruction_level(&self, level: InstructionLevel) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.instruction_level = level;
    }

    /// The underlying env-sourced runtime configuration.
    #[must_use]
    pub const fn runtime(&self) -> &RuntimeConfig {
        &self.runtime
    }

    /// Takes an atomic snapshot of every field, including freshly derived
    /// per-user storage paths.
    #[must_use]
    pub fn snapshot(&self) -> ConfigSnapshot {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        let paths = derive_storage_paths(
            &self.runtime.persag_root,
            &self.runtime.storage_backend,
            &state.user_id,
        );
        ConfigSnapshot {
            user_id: state.user_id.clone(),
            provider: state.provider,
            model: state.model.clone(),
            agent_mode: state.agent_mode,
            instruction_level: state.instruction_level,
            debug_mode: self.runtime.debug_mode,
            use_mcp: self.runtime.use_mcp,
            enable_memory: self.runtime.enable_memory,
            paths: paths.as_map(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn fresh_registry() -> ConfigRegistry {
        // Bypasses the process singleton so tests don't interfere with
        // each other or require a shared PERSAG_HOME.
        let dir = tempfile::tempdir().unwrap();
        unsafe {
            std::env::set_var("PERSAG_HOME", dir.path());
        }
        ConfigRegistry::new().unwrap()
    }

    #[test]
    fn set_provider_with_auto_set_model_fires_two_events() {
        let registry = fresh_registry();
        let events = Arc::new(AtomicUsize::new(0));
        let events2 = events.clone();
        registry.register_callback(Box::new(move |key, _, _| {
            if key == "provider" || key == "model" {
                events2.fetch_add(1, Ordering::SeqCst);
            }
        }));
        registry.set_provider(Provider::OpenAi, true);
        assert_eq!(events.load(Ordering::SeqCst), 2);
        assert_eq!(registry.model(), Provider::OpenAi.default_model());
    }

    #[test]
    fn set_user_id_fires_callback_last_with_consistent_paths() {
        let registry = fresh_registry();
        let seen_path = Arc::new(Mutex::new(String::new()));
        let seen_path2 = seen_path.clone();
        registry.register_callback(Box::new(move |key, _, new| {
            if key == "user_id" {
                *seen_path2.lock().unwrap() = new.to_string();
            }
        }));
        registry.set_user_id("alice", true).unwrap();
        assert_eq!(*seen_path.lock().unwrap(), "alice");
        let snapshot = registry.snapshot();
        assert_eq!(snapshot.user_id, "alice");
        assert!(snapshot.paths["USER_DATA_DIR"].contains("alice"));
    }

    #[test]
    fn snapshot_paths_always_contain_current_user() {
        let registry = fresh_registry();
        registry.set_user_id("bob", true).unwrap();
        let snapshot = registry.snapshot();
        for value in snapshot.paths.values() {
            assert!(value.contains("bob"));
        }
    }

    #[test]
    fn callbacks_fire_in_registration_order() {
        let registry = fresh_registry();
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let order = order.clone();
            registry.register_callback(Box::new(move |_, _, _| {
                order.lock().unwrap().push(i);
            }));
        }
        registry.set_model("some-model");
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }
}
