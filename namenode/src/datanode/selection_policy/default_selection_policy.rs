use super::selection_policy::DatanodeSelectionPolicy;
use crate::namenode_state::datanode_details::DatanodeDetail;
use async_trait::async_trait;
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::sync::Mutex;
use utilities::result::Result;

/// Least loaded first: of the datanodes that are still heartbeating, pick
/// the one holding the fewest bytes. Ties break on id so the choice is
/// stable.
pub struct DefaultDatanodeSelectionPolicy {
    datanodes: Arc<Mutex<HashMap<String, DatanodeDetail>>>,
    liveness_timeout: Duration,
}

impl DefaultDatanodeSelectionPolicy {
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
impl DatanodeSelectionPolicy for DefaultDatanodeSelectionPolicy {
    async fn pick_datanode_to_store(&self) -> Result<String> {
        let datanodes = self.datanodes.lock().await;
        datanodes
            .values()
            .filter(|detail| detail.is_active(self.liveness_timeout))
            .min_by(|a, b| a.size.cmp(&b.size).then_with(|| a.id.cmp(&b.id)))
            .map(|detail| detail.id.clone())
            .ok_or_else(|| "no active datanodes".into())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn detail(id: &str, size: u64) -> DatanodeDetail {
        let mut detail = DatanodeDetail::new(id.to_owned());
        detail.size = size;
        detail
    }

    fn policy(details: Vec<DatanodeDetail>) -> DefaultDatanodeSelectionPolicy {
        let datanodes = details
            .into_iter()
            .map(|detail| (detail.id.clone(), detail))
            .collect::<HashMap<_, _>>();
        DefaultDatanodeSelectionPolicy::new(
            Arc::new(Mutex::new(datanodes)),
            Duration::from_secs(15),
        )
    }

    #[tokio::test]
    async fn picks_the_least_loaded_datanode() {
        let policy = policy(vec![detail("D1", 1500), detail("D2", 500), detail("D3", 2000)]);
        assert_eq!(policy.pick_datanode_to_store().await.unwrap(), "D2");
    }

    #[tokio::test]
    async fn breaks_ties_on_id() {
        let policy = policy(vec![detail("D2", 500), detail("D1", 500)]);
        assert_eq!(policy.pick_datanode_to_store().await.unwrap(), "D1");
    }

    #[tokio::test]
    async fn errs_without_datanodes() {
        let policy = policy(vec![]);
        assert!(policy.pick_datanode_to_store().await.is_err());
    }
}
