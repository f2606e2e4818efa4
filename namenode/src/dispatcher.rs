use crate::client_handler::ClientHandler;
use crate::datanode::handler::DatanodeHandler;
use proto::packet::{CLIENT_ID, Command, Packet};
use tokio::sync::mpsc::{self, error::TrySendError};
use utilities::logger::{error, warn};

/// The switch from (peer class, command) to state effects and the outbound
/// reply. Holds no state of its own.
pub struct PacketDispatcher {
    client_handler: ClientHandler,
    datanode_handler: DatanodeHandler,
    send_tx: mpsc::Sender<Packet>,
}

impl PacketDispatcher {
    pub fn new(
        client_handler: ClientHandler,
        datanode_handler: DatanodeHandler,
        send_tx: mpsc::Sender<Packet>,
    ) -> Self {
        Self {
            client_handler,
            datanode_handler,
            send_tx,
        }
    }

    /// Routes one decoded packet and queues its reply, if any. A fault
    /// inside a handler is logged here and poisons nothing.
    pub async fn dispatch(&self, p: Packet) {
        if p.src.is_empty() {
            warn!("Dropping packet without a source id");
            return;
        }
        let result = if p.src == CLIENT_ID {
            self.client_handler.handle(p).await
        } else {
            self.datanode_handler.handle(p).await
        };
        match result {
            Ok(Some(reply)) => self.enqueue(reply).await,
            Ok(None) => {}
            Err(e) => error!(error=%e, "Error while handling packet"),
        }
    }

    /// Plain acknowledgements are droppable when the send queue is full;
    /// anything a peer is waiting on blocks for queue space instead.
    async fn enqueue(&self, packet: Packet) {
        if packet.cmd == Command::Ack {
            match self.send_tx.try_send(packet) {
                Ok(()) => {}
                Err(TrySendError::Full(dropped)) => {
                    warn!(dst=%dropped.dst, "Send queue full, dropping acknowledgement");
                }
                Err(TrySendError::Closed(_)) => error!("Send queue closed"),
            }
        } else if let Err(e) = self.send_tx.send(packet).await {
            error!(error=%e, "Send queue closed, dropping packet");
        }
    }
}
