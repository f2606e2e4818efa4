mod client_handler;
mod config;
mod datanode;
mod dispatcher;
mod header_merger;
mod namenode_state;
mod packet_sender;
mod tcp_service;

use client_handler::ClientHandler;
use config::CONFIG;
use datanode::handler::DatanodeHandler;
use datanode::selection_policy::{
    default_selection_policy::DefaultDatanodeSelectionPolicy,
    random_selection_policy::RandomDatanodeSelectionPolicy,
    selection_policy::DatanodeSelectionPolicy,
};
use dispatcher::PacketDispatcher;
use header_merger::HeaderMerger;
use namenode_state::NamenodeState;
use packet_sender::PacketSender;
use std::{collections::HashMap, error::Error, sync::Arc, time::Duration};
use tcp_service::TCPService;
use tokio::sync::{Mutex, mpsc};
use utilities::logger::{info, init_logger};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let _gaurd = init_logger("Namenode", &CONFIG.id, &CONFIG.log_level, &CONFIG.log_base);
    info!(listen_addrs=%CONFIG.listen_addrs, "Starting the namenode");

    let state = Arc::new(Mutex::new(NamenodeState::new()));
    let datanodes = Arc::new(Mutex::new(HashMap::new()));
    let client_pending = Arc::new(Mutex::new(HashMap::new()));
    let (header_tx, header_rx) = mpsc::channel(CONFIG.header_queue_capacity);
    let (send_tx, send_rx) = mpsc::channel(CONFIG.send_queue_capacity);

    let sender = PacketSender::new();
    sender.clone().start(send_rx);
    HeaderMerger::new(state.clone(), datanodes.clone()).start(header_rx);

    let liveness_timeout = Duration::from_secs(CONFIG.datanode_liveness_timeout_secs);
    let datanode_selector: Box<dyn DatanodeSelectionPolicy + Send + Sync> =
        match CONFIG.placement_policy.as_str() {
            "random" => Box::new(RandomDatanodeSelectionPolicy::new(
                datanodes.clone(),
                liveness_timeout,
            )),
            _ => Box::new(DefaultDatanodeSelectionPolicy::new(
                datanodes.clone(),
                liveness_timeout,
            )),
        };
    let client_handler = ClientHandler::new(
        CONFIG.id.clone(),
        state.clone(),
        client_pending.clone(),
        datanode_selector,
        send_tx.clone(),
    );
    let datanode_handler = DatanodeHandler::new(
        CONFIG.id.clone(),
        datanodes.clone(),
        client_pending.clone(),
        header_tx.clone(),
    );
    let dispatcher = Arc::new(PacketDispatcher::new(
        client_handler,
        datanode_handler,
        send_tx.clone(),
    ));

    // only a failure to bind is fatal
    let service = TCPService::new(
        CONFIG.listen_addrs.clone(),
        sender,
        datanodes,
        dispatcher,
        Duration::from_secs(CONFIG.idle_read_timeout_secs),
    )
    .await?;
    service.start_and_accept().await?;
    Ok(())
}
