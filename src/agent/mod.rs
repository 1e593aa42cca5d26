//! Agent records and the built-in agent registry.
//!
//! An agent is data only: a role name, a description, capabilities, and an
//! embedded prompt template. Which CLI actually runs it is decided by the
//! executor bindings (`crate::config`), not by the agent itself.

pub mod claude;
pub mod executor;

use rust_embed::RustEmbed;
use std::collections::BTreeMap;

pub use executor::{Coordinator, Executor, ExecutorError, ExecutorRegistry, WorkerOutcome};

#[derive(RustEmbed)]
#[folder = "src/prompts"]
struct Prompts;

/// A worker agent role.
#[derive(Debug, Clone, PartialEq)]
pub struct Agent {
    pub name: String,
    pub description: String,
    pub capabilities: Vec<String>,
    /// Path of the embedded prompt template, relative to `src/prompts`.
    pub prompt_template_path: String,
}

impl Agent {
    fn new(name: &str, description: &str, capabilities: &[&str], template: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            capabilities: capabilities.iter().map(|c| c.to_string()).collect(),
            prompt_template_path: template.to_string(),
        }
    }

    /// The embedded prompt template; empty when the template is missing.
    pub fn load_template(&self) -> String {
        match Prompts::get(&self.prompt_template_path) {
            Some(file) => String::from_utf8_lossy(&file.data).into_owned(),
            None => {
                tracing::warn!(
                    agent = %self.name,
                    template = %self.prompt_template_path,
                    "missing embedded prompt template"
                );
                String::new()
            }
        }
    }
}

/// Registry of the built-in agents, populated at startup.
pub struct AgentRegistry {
    agents: BTreeMap<String, Agent>,
}

impl AgentRegistry {
    pub fn builtin() -> Self {
        let mut agents = BTreeMap::new();
        for agent in [
            Agent::new(
                "implementer",
                "implements one task end to end",
                &["edit", "run", "test"],
                "implementer.md",
            ),
            Agent::new(
                "reviewer",
                "reviews implementation output and records a verdict",
                &["read", "run"],
                "reviewer.md",
            ),
            Agent::new(
                "planner",
                "turns a project description into a task list",
                &["read"],
                "planner.md",
            ),
            Agent::new(
                "finalizer",
                "runs closing checks and writes the final report",
                &["read", "run"],
                "finalizer.md",
            ),
        ] {
            agents.insert(agent.name.clone(), agent);
        }
        Self { agents }
    }

    pub fn get(&self, name: &str) -> Option<&Agent> {
        self.agents.get(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.agents.keys().cloned().collect()
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_agents_are_registered() {
        let registry = AgentRegistry::builtin();
        assert!(registry.get("implementer").is_some());
        assert!(registry.get("reviewer").is_some());
        assert!(registry.get("planner").is_some());
        assert!(registry.get("finalizer").is_some());
        assert!(registry.get("nonexistent").is_none());
    }

    #[test]
    fn templates_are_embedded() {
        let registry = AgentRegistry::builtin();
        for name in registry.names() {
            let template = registry.get(&name).unwrap().load_template();
            assert!(!template.is_empty(), "template for {name} should be embedded");
        }
    }

    #[test]
    fn implementer_template_describes_status_protocol() {
        let registry = AgentRegistry::builtin();
        let template = registry.get("implementer").unwrap().load_template();
        assert!(template.contains("needs_review"));
        assert!(template.contains("paused"));
    }
}
