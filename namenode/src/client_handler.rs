use crate::datanode::selection_policy::selection_policy::DatanodeSelectionPolicy;
use crate::namenode_state::NamenodeState;
use proto::packet::{Block, BlockHeader, Command, Packet};
use std::{collections::HashMap, sync::Arc};
use tokio::sync::{Mutex, mpsc};
use utilities::logger::{info, warn};
use utilities::result::Result;

/// Handles every packet arriving from the client peer. Reads of the
/// namespace happen under its lock; all writes stay with the header merger.
pub struct ClientHandler {
    own_id: String,
    state: Arc<Mutex<NamenodeState>>,
    client_pending: Arc<Mutex<HashMap<BlockHeader, String>>>,
    datanode_selector: Box<dyn DatanodeSelectionPolicy + Send + Sync>,
    send_tx: mpsc::Sender<Packet>,
}

impl ClientHandler {
    pub fn new(
        own_id: String,
        state: Arc<Mutex<NamenodeState>>,
        client_pending: Arc<Mutex<HashMap<BlockHeader, String>>>,
        datanode_selector: Box<dyn DatanodeSelectionPolicy + Send + Sync>,
        send_tx: mpsc::Sender<Packet>,
    ) -> Self {
        Self {
            own_id,
            state,
            client_pending,
            datanode_selector,
            send_tx,
        }
    }

    /// Maps one client packet to at most one reply.
    pub async fn handle(&self, p: Packet) -> Result<Option<Packet>> {
        let mut reply = Packet::reply_to(&p, &self.own_id);
        match p.cmd {
            Command::Hb => {
                info!(client_id=%p.src, "Client connection alive");
                return Ok(None);
            }
            Command::Distribute => {
                // acknowledged as soon as the block is queued for a datanode
                self.distribute_block(p.data).await?;
            }
            Command::RetrieveBlock => {
                if p.headers.len() != 1 {
                    warn!(header_count = p.headers.len(), "Invalid RETRIEVEBLOCK packet");
                    reply.cmd = Command::Error;
                    reply.err = "Invalid Header received".to_owned();
                } else {
                    let header = p.headers[0].clone();
                    info!(datanode_id=%header.datanode_id, filename=%header.filename, "Forwarding block retrieval");
                    let mut client_pending = self.client_pending.lock().await;
                    client_pending.insert(header.clone(), p.src.clone());
                    drop(client_pending);
                    reply.dst = header.datanode_id;
                    reply.cmd = Command::RetrieveBlock;
                    reply.headers = p.headers;
                }
            }
            Command::GetHeaders => {
                if p.headers.len() != 1 {
                    warn!(header_count = p.headers.len(), "Invalid GETHEADERS packet");
                    reply.cmd = Command::Error;
                    reply.err = "Invalid Header received".to_owned();
                } else {
                    let fname = &p.headers[0].filename;
                    let state = self.state.lock().await;
                    match state.headers_for_file(fname) {
                        Ok(headers) => {
                            reply.cmd = Command::GetHeaders;
                            reply.headers = headers;
                        }
                        Err(e) => {
                            warn!(filename=%fname, error=%e, "Cannot serve headers");
                            reply.cmd = Command::Error;
                            reply.err = e.to_string();
                        }
                    }
                }
            }
            Command::List
            | Command::Ack
            | Command::Block
            | Command::BlockAck
            | Command::Error => {
                warn!(cmd=?p.cmd, "Unexpected command from client, dropping");
                return Ok(None);
            }
        }
        Ok(Some(reply))
    }

    /// Fire and forget placement: pick a datanode and queue the block for
    /// it. With no datanode available the block is dropped and the client
    /// still gets its acknowledgement.
    async fn distribute_block(&self, mut block: Block) -> Result<()> {
        let target = match self.datanode_selector.pick_datanode_to_store().await {
            Ok(target) => target,
            Err(e) => {
                warn!(error=%e, filename=%block.header.filename, "Cannot place block, dropping");
                return Ok(());
            }
        };
        info!(datanode_id=%target, filename=%block.header.filename, block_num=block.header.block_num, "Distributing block");
        block.header.datanode_id = target.clone();
        let packet = Packet {
            src: self.own_id.clone(),
            dst: target,
            cmd: Command::Block,
            data: block,
            ..Packet::default()
        };
        self.send_tx.send(packet).await?;
        Ok(())
    }
}
