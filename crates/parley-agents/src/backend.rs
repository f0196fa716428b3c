//! Reply generation seam.
//!
//! The pipeline talks to agents through [`ReplyBackend`] only. The
//! shipped implementation is a deterministic stand-in; a real model
//! backend slots in behind the same trait.

use anyhow::Result;
use async_trait::async_trait;
use parley_core::frames::AgentInfo;

/// Produces the full text of an agent's reply to one user message.
#[async_trait]
pub trait ReplyBackend: Send + Sync {
    /// Generate the complete reply text for `prompt`.
    ///
    /// The caller owns chunking and streaming; implementations return
    /// the whole reply in one piece.
    async fn generate(&self, agent: &AgentInfo, prompt: &str) -> Result<String>;
}

/// Deterministic stand-in backend: acknowledges the prompt and names the
/// agent that "handled" it.
pub struct SimulatedBackend;

#[async_trait]
impl ReplyBackend for SimulatedBackend {
    async fn generate(&self, agent: &AgentInfo, prompt: &str) -> Result<String> {
        Ok(format!(
            "Okay, I received: '{prompt}' (from {})",
            agent.name
        ))
    }
}
