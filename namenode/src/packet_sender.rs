use proto::packet::Packet;
use std::{collections::HashMap, sync::Arc};
use tokio::{
    io::AsyncWriteExt,
    net::tcp::OwnedWriteHalf,
    sync::{Mutex, mpsc},
};
use utilities::logger::{error, info, warn};

/// Fan-out from the send queue to the per-peer connection writers. One drain
/// task plus one lock keeps each packet's transmission atomic from the
/// peer's point of view, no matter how many receivers reply concurrently.
#[derive(Clone, Default)]
pub struct PacketSender {
    send_map: Arc<Mutex<HashMap<String, OwnedWriteHalf>>>,
}

impl PacketSender {
    pub fn new() -> Self {
        Self {
            send_map: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Registers the writer for a peer, replacing any prior one on
    /// reconnect. The replaced writer is dropped, closing its half of the
    /// stale connection.
    pub async fn register(&self, peer_id: &str, writer: OwnedWriteHalf) {
        let mut send_map = self.send_map.lock().await;
        if send_map.insert(peer_id.to_owned(), writer).is_some() {
            info!(peer_id, "Replaced connection writer for peer");
        }
    }

    /// Drains the send queue. A missing destination or a failed write drops
    /// that packet and nothing else.
    pub fn start(self, mut receiver: mpsc::Receiver<Packet>) {
        tokio::spawn(async move {
            while let Some(packet) = receiver.recv().await {
                let mut send_map = self.send_map.lock().await;
                let Some(writer) = send_map.get_mut(&packet.dst) else {
                    warn!(dst=%packet.dst, "Could not find connection for destination, dropping packet");
                    continue;
                };
                let buf = match packet.encode() {
                    Ok(buf) => buf,
                    Err(e) => {
                        error!(error=%e, dst=%packet.dst, "Error encoding packet");
                        continue;
                    }
                };
                if let Err(e) = writer.write_all(&buf).await {
                    error!(error=%e, dst=%packet.dst, "Error sending packet");
                }
            }
        });
    }
}
