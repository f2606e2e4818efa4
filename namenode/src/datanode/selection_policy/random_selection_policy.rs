use super::selection_policy::DatanodeSelectionPolicy;
use crate::namenode_state::datanode_details::DatanodeDetail;
use async_trait::async_trait;
use rand::seq::IteratorRandom;
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::sync::Mutex;
use utilities::result::Result;

/// Uniform random load balancing over the datanodes that are still
/// heartbeating.
pub struct RandomDatanodeSelectionPolicy {
    datanodes: Arc<Mutex<HashMap<String, DatanodeDetail>>>,
    liveness_timeout: Duration,
}

impl RandomDatanodeSelectionPolicy {
    pub fn new(
        datanodes: Arc<Mutex<HashMap<String, DatanodeDetail>>>,
        liveness_timeout: Duration,
    ) -> Self {
        Self {
            datanodes,
            liveness_timeout,
        }
    }
}

#[async_trait]
impl DatanodeSelectionPolicy for RandomDatanodeSelectionPolicy {
    async fn pick_datanode_to_store(&self) -> Result<String> {
        let datanodes = self.datanodes.lock().await;
        datanodes
            .values()
            .filter(|detail| detail.is_active(self.liveness_timeout))
            .choose(&mut rand::thread_rng())
            .map(|detail| detail.id.clone())
            .ok_or_else(|| "no active datanodes".into())
    }
}
