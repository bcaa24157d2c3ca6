//! Knowledge retrieval boundary.
//!
//! The embedding/vector pipeline is an external collaborator. Tools that
//! need it are constructed with an `Arc<dyn KnowledgeSource>`.

use async_trait::async_trait;

use crate::error::KnowledgeError;

#[async_trait]
pub trait KnowledgeSource: Send + Sync {
    /// Retrieve the `top_k` most relevant passages for `text`, formatted as
    /// a single context string ready to hand to the model.
    async fn query(&self, text: &str, top_k: usize) -> Result<String, KnowledgeError>;
}
