use async_trait::async_trait;
use utilities::result::Result;

#[async_trait]
pub trait DatanodeSelectionPolicy {
    /// Picks the datanode that should receive a newly distributed block.
    /// Errs when no live datanode is available.
    async fn pick_datanode_to_store(&self) -> Result<String>;
}
