//! Static agent directory.
//!
//! The relay core only ever reads from the catalog; a real deployment
//! would load this from configuration or a database.

use std::collections::HashMap;

use parley_core::frames::AgentInfo;
use parley_core::ids::AgentId;

/// Read-only lookup table of available agents.
pub struct AgentCatalog {
    agents: Vec<AgentInfo>,
    by_id: HashMap<AgentId, usize>,
}

impl AgentCatalog {
    /// Build a catalog from a fixed set of agents.
    #[must_use]
    pub fn new(agents: Vec<AgentInfo>) -> Self {
        let by_id = agents
            .iter()
            .enumerate()
            .map(|(i, a)| (a.id.clone(), i))
            .collect();
        Self { agents, by_id }
    }

    /// The built-in placeholder catalog.
    #[must_use]
    pub fn builtin() -> Self {
        Self::new(vec![
            AgentInfo {
                id: AgentId::from("agent_001"),
                name: "EchoBot".into(),
                description: "Echoes whatever you say back at you.".into(),
            },
            AgentInfo {
                id: AgentId::from("agent_002"),
                name: "TaskMaster".into(),
                description: "Runs background tasks for each message.".into(),
            },
            AgentInfo {
                id: AgentId::from("agent_003"),
                name: "HelperAI".into(),
                description: "General-purpose assistant.".into(),
            },
        ])
    }

    /// All agents, in catalog order.
    #[must_use]
    pub fn list(&self) -> &[AgentInfo] {
        &self.agents
    }

    /// Look up one agent by ID.
    #[must_use]
    pub fn get(&self, agent_id: &AgentId) -> Option<&AgentInfo> {
        self.by_id.get(agent_id).map(|&i| &self.agents[i])
    }

    /// Whether the catalog knows this agent.
    #[must_use]
    pub fn contains(&self, agent_id: &AgentId) -> bool {
        self.by_id.contains_key(agent_id)
    }

    /// The default agent (first catalog entry), if the catalog is
    /// non-empty.
    #[must_use]
    pub fn default_agent(&self) -> Option<&AgentInfo> {
        self.agents.first()
    }
}

impl Default for AgentCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}
