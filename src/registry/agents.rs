//! Named sub-agent graphs available to `agent.call`.

use crate::graph::Graph;
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum AgentError {
    #[error("agent already registered: {0}")]
    #[diagnostic(code(agentgraph::agents::duplicate))]
    AlreadyRegistered(String),

    #[error("unknown agent: {0}")]
    #[diagnostic(code(agentgraph::agents::unknown))]
    Unknown(String),
}

/// Registration table mapping agent ids to their graphs.
#[derive(Clone, Debug, Default)]
pub struct AgentTable {
    agents: FxHashMap<String, Graph>,
}

impl AgentTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, agent_id: impl Into<String>, graph: Graph) -> Result<(), AgentError> {
        let agent_id = agent_id.into();
        if self.agents.contains_key(&agent_id) {
            return Err(AgentError::AlreadyRegistered(agent_id));
        }
        self.agents.insert(agent_id, graph);
        Ok(())
    }

    pub fn resolve(&self, agent_id: &str) -> Result<&Graph, AgentError> {
        self.agents
            .get(agent_id)
            .ok_or_else(|| AgentError::Unknown(agent_id.to_string()))
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut table = AgentTable::new();
        table.register("helper", Graph::default()).unwrap();
        let err = table.register("helper", Graph::default());
        assert!(matches!(err, Err(AgentError::AlreadyRegistered(id)) if id == "helper"));
    }

    #[test]
    fn unknown_agent_errors() {
        let table = AgentTable::new();
        assert!(matches!(
            table.resolve("ghost"),
            Err(AgentError::Unknown(id)) if id == "ghost"
        ));
    }
}
