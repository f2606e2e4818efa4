use crate::namenode_state::datanode_details::DatanodeDetail;
use proto::packet::{BlockHeader, CLIENT_ID, Command, Packet};
use std::{collections::HashMap, sync::Arc};
use tokio::sync::{Mutex, mpsc};
use utilities::logger::{debug, info, trace, warn};
use utilities::result::Result;

/// Handles every packet arriving from a datanode peer: heartbeats, directory
/// listings, block acknowledgements and block payloads on their way back to
/// a client.
pub struct DatanodeHandler {
    own_id: String,
    datanodes: Arc<Mutex<HashMap<String, DatanodeDetail>>>,
    client_pending: Arc<Mutex<HashMap<BlockHeader, String>>>,
    header_tx: mpsc::Sender<BlockHeader>,
}

impl DatanodeHandler {
    pub fn new(
        own_id: String,
        datanodes: Arc<Mutex<HashMap<String, DatanodeDetail>>>,
        client_pending: Arc<Mutex<HashMap<BlockHeader, String>>>,
        header_tx: mpsc::Sender<BlockHeader>,
    ) -> Self {
        Self {
            own_id,
            datanodes,
            client_pending,
            header_tx,
        }
    }

    /// Maps one datanode packet to at most one reply. Namespace effects go
    /// through the header channel, never directly.
    pub async fn handle(&self, p: Packet) -> Result<Option<Packet>> {
        let mut reply = Packet::reply_to(&p, &self.own_id);
        let listed = {
            let mut datanodes = self.datanodes.lock().await;
            let Some(detail) = datanodes.get_mut(&p.src) else {
                return Err(format!("packet from unregistered datanode {}", p.src).into());
            };
            detail.mark_heartbeat();
            detail.listed
        };
        match p.cmd {
            Command::Hb => {
                // an unlisted datanode owes us its directory contents first
                if !listed {
                    reply.cmd = Command::List;
                }
            }
            Command::List => {
                info!(datanode_id=%p.src, header_count=p.headers.len(), "Merging directory listing");
                for header in p.headers {
                    self.header_tx.send(header).await?;
                }
                let mut datanodes = self.datanodes.lock().await;
                if let Some(detail) = datanodes.get_mut(&p.src) {
                    detail.mark_listed();
                }
            }
            Command::BlockAck => {
                // the single header check gates the log as well as the enqueue
                if p.headers.len() == 1 {
                    debug!(datanode_id=%p.src, header=?p.headers[0], "Received block ack");
                    self.header_tx.send(p.headers[0].clone()).await?;
                }
            }
            Command::Block => {
                let dst = {
                    let client_pending = self.client_pending.lock().await;
                    client_pending
                        .get(&p.data.header)
                        .cloned()
                        .unwrap_or_else(|| CLIENT_ID.to_owned())
                };
                info!(client_id=%dst, header=?p.data.header, "Routing block payload back to client");
                reply.dst = dst;
                reply.cmd = Command::Block;
                reply.data = p.data;
            }
            Command::Ack => {
                trace!(datanode_id=%p.src, "Datanode acknowledged");
                return Ok(None);
            }
            Command::Error => {
                warn!(datanode_id=%p.src, err=%p.err, "Datanode reported an error");
                return Ok(None);
            }
            Command::RetrieveBlock | Command::Distribute | Command::GetHeaders => {
                warn!(datanode_id=%p.src, cmd=?p.cmd, "Unexpected command from datanode, dropping");
                return Ok(None);
            }
        }
        Ok(Some(reply))
    }
}
