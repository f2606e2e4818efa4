use crate::dispatcher::PacketDispatcher;
use crate::namenode_state::datanode_details::DatanodeDetail;
use crate::packet_sender::PacketSender;
use proto::packet::{CLIENT_ID, Packet};
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::{
    net::{TcpListener, TcpStream, tcp::OwnedReadHalf},
    sync::Mutex,
    time::timeout,
};
use utilities::logger::{Instrument, Span, error, info};
use utilities::result::Result;

/// Accepts every peer type on a single listener and drives an isolated
/// receive pipeline per connection. The first packet of a connection
/// identifies the peer and registers its writer with the send pipeline.
pub struct TCPService {
    listener: TcpListener,
    sender: PacketSender,
    datanodes: Arc<Mutex<HashMap<String, DatanodeDetail>>>,
    dispatcher: Arc<PacketDispatcher>,
    idle_read_timeout: Duration,
}

impl TCPService {
    pub async fn new(
        address: String,
        sender: PacketSender,
        datanodes: Arc<Mutex<HashMap<String, DatanodeDetail>>>,
        dispatcher: Arc<PacketDispatcher>,
        idle_read_timeout: Duration,
    ) -> Result<Self> {
        let listener = TcpListener::bind(address).await?;
        Ok(TCPService {
            listener,
            sender,
            datanodes,
            dispatcher,
            idle_read_timeout,
        })
    }

    pub fn local_addr(&self) -> Result<std::net::SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub async fn start_and_accept(&self) -> Result<()> {
        loop {
            let (tcp_stream, peer_addr) = self.listener.accept().await?;
            let sender = self.sender.clone();
            let datanodes = self.datanodes.clone();
            let dispatcher = self.dispatcher.clone();
            let idle_read_timeout = self.idle_read_timeout;
            let span = Span::current();
            tokio::spawn(
                async move {
                    if let Err(e) = Self::handle_connection(
                        tcp_stream,
                        sender,
                        datanodes,
                        dispatcher,
                        idle_read_timeout,
                    )
                    .await
                    {
                        error!(error=%e, peer_addr=%peer_addr, "Closing connection");
                    }
                }
                .instrument(span),
            );
        }
    }

    async fn handle_connection(
        tcp_stream: TcpStream,
        sender: PacketSender,
        datanodes: Arc<Mutex<HashMap<String, DatanodeDetail>>>,
        dispatcher: Arc<PacketDispatcher>,
        idle_read_timeout: Duration,
    ) -> Result<()> {
        let peer_addr = tcp_stream.peer_addr()?;
        let (mut read_half, write_half) = tcp_stream.into_split();

        // the first packet identifies the peer
        let first = Self::read_packet(&mut read_half, idle_read_timeout).await?;
        if first.src.is_empty() {
            return Err("first packet carries no source id".into());
        }
        if first.src == CLIENT_ID {
            info!(peer_addr=%peer_addr, "Client connected");
        } else {
            let mut datanodes = datanodes.lock().await;
            if datanodes.contains_key(&first.src) {
                info!(datanode_id=%first.src, "Datanode reconnected");
            } else {
                info!(datanode_id=%first.src, "Adding new datanode");
                datanodes.insert(first.src.clone(), DatanodeDetail::new(first.src.clone()));
            }
        }
        sender.register(&first.src, write_half).await;
        dispatcher.dispatch(first).await;

        loop {
            let packet = Self::read_packet(&mut read_half, idle_read_timeout).await?;
            dispatcher.dispatch(packet).await;
        }
    }

    async fn read_packet(
        read_half: &mut OwnedReadHalf,
        idle_read_timeout: Duration,
    ) -> Result<Packet> {
        match timeout(idle_read_timeout, Packet::decode(read_half)).await {
            Ok(result) => result,
            Err(_) => Err("connection idle past the read deadline".into()),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::client_handler::ClientHandler;
    use crate::datanode::handler::DatanodeHandler;
    use crate::datanode::selection_policy::default_selection_policy::DefaultDatanodeSelectionPolicy;
    use crate::header_merger::HeaderMerger;
    use crate::namenode_state::NamenodeState;
    use proto::packet::{BlockHeader, Command};
    use std::net::SocketAddr;
    use tokio::io::AsyncWriteExt;
    use tokio::sync::mpsc;

    async fn spawn_namenode() -> SocketAddr {
        let state = Arc::new(Mutex::new(NamenodeState::new()));
        let datanodes = Arc::new(Mutex::new(HashMap::new()));
        let client_pending = Arc::new(Mutex::new(HashMap::new()));
        let (header_tx, header_rx) = mpsc::channel(64);
        let (send_tx, send_rx) = mpsc::channel(64);

        let sender = PacketSender::new();
        sender.clone().start(send_rx);
        HeaderMerger::new(state.clone(), datanodes.clone()).start(header_rx);

        let client_handler = ClientHandler::new(
            "NN".to_owned(),
            state.clone(),
            client_pending.clone(),
            Box::new(DefaultDatanodeSelectionPolicy::new(
                datanodes.clone(),
                Duration::from_secs(15),
            )),
            send_tx.clone(),
        );
        let datanode_handler = DatanodeHandler::new(
            "NN".to_owned(),
            datanodes.clone(),
            client_pending.clone(),
            header_tx.clone(),
        );
        let dispatcher = Arc::new(PacketDispatcher::new(
            client_handler,
            datanode_handler,
            send_tx.clone(),
        ));

        let service = TCPService::new(
            "127.0.0.1:0".to_owned(),
            sender,
            datanodes,
            dispatcher,
            Duration::from_secs(5),
        )
        .await
        .unwrap();
        let addr = service.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = service.start_and_accept().await;
        });
        addr
    }

    fn header(block_num: usize) -> BlockHeader {
        BlockHeader {
            datanode_id: "D1".to_owned(),
            filename: "/a/b".to_owned(),
            size: 500,
            block_num,
            num_blocks: 2,
        }
    }

    async fn send(stream: &mut TcpStream, packet: &Packet) {
        stream.write_all(&packet.encode().unwrap()).await.unwrap();
    }

    #[tokio::test]
    async fn fresh_datanode_listing_and_client_requests() {
        let addr = spawn_namenode().await;

        // a fresh datanode heartbeats and is asked for its listing
        let mut dn = TcpStream::connect(addr).await.unwrap();
        send(
            &mut dn,
            &Packet {
                src: "D1".to_owned(),
                dst: "NN".to_owned(),
                cmd: Command::Hb,
                ..Packet::default()
            },
        )
        .await;
        let reply = Packet::decode(&mut dn).await.unwrap();
        assert_eq!(reply.cmd, Command::List);
        assert_eq!(reply.src, "NN");
        assert_eq!(reply.dst, "D1");

        send(
            &mut dn,
            &Packet {
                src: "D1".to_owned(),
                dst: "NN".to_owned(),
                cmd: Command::List,
                headers: vec![header(0), header(1)],
                ..Packet::default()
            },
        )
        .await;
        let reply = Packet::decode(&mut dn).await.unwrap();
        assert_eq!(reply.cmd, Command::Ack);

        // once listed, heartbeats are acknowledged
        send(
            &mut dn,
            &Packet {
                src: "D1".to_owned(),
                dst: "NN".to_owned(),
                cmd: Command::Hb,
                ..Packet::default()
            },
        )
        .await;
        let reply = Packet::decode(&mut dn).await.unwrap();
        assert_eq!(reply.cmd, Command::Ack);

        // the client retrieves the headers once the merger catches up
        let mut client = TcpStream::connect(addr).await.unwrap();
        let mut headers = Vec::new();
        for _ in 0..50 {
            send(
                &mut client,
                &Packet {
                    src: "C".to_owned(),
                    dst: "NN".to_owned(),
                    cmd: Command::GetHeaders,
                    headers: vec![header(0)],
                    ..Packet::default()
                },
            )
            .await;
            let reply = Packet::decode(&mut client).await.unwrap();
            if reply.cmd == Command::GetHeaders {
                headers = reply.headers;
                break;
            }
            assert_eq!(reply.cmd, Command::Error);
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(headers, vec![header(0), header(1)]);

        // block retrieval is forwarded to the datanode that owns it
        send(
            &mut client,
            &Packet {
                src: "C".to_owned(),
                dst: "NN".to_owned(),
                cmd: Command::RetrieveBlock,
                headers: vec![header(0)],
                ..Packet::default()
            },
        )
        .await;
        let forwarded = Packet::decode(&mut dn).await.unwrap();
        assert_eq!(forwarded.cmd, Command::RetrieveBlock);
        assert_eq!(forwarded.src, "NN");
        assert_eq!(forwarded.dst, "D1");
        assert_eq!(forwarded.headers, vec![header(0)]);

        // the datanode answers with the block and it reaches the client
        send(
            &mut dn,
            &Packet {
                src: "D1".to_owned(),
                dst: "NN".to_owned(),
                cmd: Command::Block,
                data: proto::packet::Block {
                    header: header(0),
                    data: vec![9; 500],
                },
                ..Packet::default()
            },
        )
        .await;
        let block = Packet::decode(&mut client).await.unwrap();
        assert_eq!(block.cmd, Command::Block);
        assert_eq!(block.data.header, header(0));
        assert_eq!(block.data.data.len(), 500);
    }

    #[tokio::test]
    async fn getheaders_for_unknown_path_reports_the_miss() {
        let addr = spawn_namenode().await;
        let mut client = TcpStream::connect(addr).await.unwrap();
        let mut wanted = header(0);
        wanted.filename = "/nope".to_owned();
        send(
            &mut client,
            &Packet {
                src: "C".to_owned(),
                dst: "NN".to_owned(),
                cmd: Command::GetHeaders,
                headers: vec![wanted],
                ..Packet::default()
            },
        )
        .await;
        let reply = Packet::decode(&mut client).await.unwrap();
        assert_eq!(reply.cmd, Command::Error);
        assert_eq!(reply.err, "File not found /nope");
    }

    #[tokio::test]
    async fn distribute_without_datanodes_still_acknowledges() {
        let addr = spawn_namenode().await;
        let mut client = TcpStream::connect(addr).await.unwrap();
        send(
            &mut client,
            &Packet {
                src: "C".to_owned(),
                dst: "NN".to_owned(),
                cmd: Command::Distribute,
                data: proto::packet::Block {
                    header: header(0),
                    data: vec![1; 500],
                },
                ..Packet::default()
            },
        )
        .await;
        let reply = Packet::decode(&mut client).await.unwrap();
        assert_eq!(reply.cmd, Command::Ack);
    }
}
