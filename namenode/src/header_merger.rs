use crate::namenode_state::NamenodeState;
use crate::namenode_state::datanode_details::DatanodeDetail;
use proto::packet::BlockHeader;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::{Mutex, mpsc};
use utilities::logger::{trace, warn};
use utilities::result::Result;

/// Funnels every observed placement through the namespace. A single consumer
/// keeps the tree and filemap free of concurrent mutation and keeps
/// heartbeat driven listing floods off the dispatch path.
pub struct HeaderMerger {
    state: Arc<Mutex<NamenodeState>>,
    datanodes: Arc<Mutex<HashMap<String, DatanodeDetail>>>,
}

impl HeaderMerger {
    pub fn new(
        state: Arc<Mutex<NamenodeState>>,
        datanodes: Arc<Mutex<HashMap<String, DatanodeDetail>>>,
    ) -> Self {
        Self { state, datanodes }
    }

    pub fn start(self, mut receiver: mpsc::Receiver<BlockHeader>) {
        tokio::spawn(async move {
            while let Some(header) = receiver.recv().await {
                match self.merge(&header).await {
                    Ok(_) => {
                        trace!(filename=%header.filename, block_num=header.block_num, "Merged block header");
                    }
                    Err(e) => {
                        warn!(error=%e, filename=%header.filename, "Discarding block header");
                    }
                }
            }
        });
    }

    /// Lock order: datanode map before namespace. The datanode's cumulative
    /// size grows only when the header was newly added, so duplicates never
    /// double count.
    pub async fn merge(&self, header: &BlockHeader) -> Result<()> {
        let mut datanodes = self.datanodes.lock().await;
        let Some(detail) = datanodes.get_mut(&header.datanode_id) else {
            return Err(format!("unknown datanode {}", header.datanode_id).into());
        };
        let mut state = self.state.lock().await;
        if state.merge_header(header)? {
            detail.record_placement(header.size);
        }
        Ok(())
    }
}
