use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt};
use utilities::result::Result;

/// Peer id the namenode announces itself under.
pub const NAMENODE_ID: &str = "NN";
/// Reserved peer id for the client in this generation of the protocol.
pub const CLIENT_ID: &str = "C";
/// Logical size in bytes peers chunk files into. The namenode does not
/// enforce it.
pub const BLOCK_SIZE: usize = 1000;

/// Commands for node communication. The numeric codes are part of the wire
/// contract and must stay stable for cross-language peers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Command {
    /// heartbeat
    #[default]
    Hb = 0,
    /// directory listing, carries headers
    List = 1,
    /// acknowledgement
    Ack = 2,
    /// carries a block payload
    Block = 3,
    /// datanode confirms a block is durable on disk
    BlockAck = 4,
    /// client wants the bytes for a specific placement
    RetrieveBlock = 5,
    /// client submits a new block for placement
    Distribute = 6,
    /// client requests the header list for a path
    GetHeaders = 7,
    /// failed request, explanation in `err`
    Error = 8,
}

impl From<Command> for u8 {
    fn from(cmd: Command) -> u8 {
        cmd as u8
    }
}

impl TryFrom<u8> for Command {
    type Error = String;

    fn try_from(code: u8) -> std::result::Result<Self, String> {
        match code {
            0 => Ok(Command::Hb),
            1 => Ok(Command::List),
            2 => Ok(Command::Ack),
            3 => Ok(Command::Block),
            4 => Ok(Command::BlockAck),
            5 => Ok(Command::RetrieveBlock),
            6 => Ok(Command::Distribute),
            7 => Ok(Command::GetHeaders),
            8 => Ok(Command::Error),
            other => Err(format!("unknown command code {other}")),
        }
    }
}

/// Identifies one placement of one block. Full value equality: two headers
/// with identical fields denote the same placement observation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockHeader {
    /// id of the datanode which holds the block
    #[serde(rename = "DatanodeID", default)]
    pub datanode_id: String,
    /// absolute remote path of the file, e.g. "/test/0"
    #[serde(rename = "Filename", default)]
    pub filename: String,
    /// size of the block in bytes
    #[serde(rename = "Size", default)]
    pub size: u64,
    /// 0 indexed position of the block within the file
    #[serde(rename = "BlockNum", default)]
    pub block_num: usize,
    /// total number of blocks in the file
    #[serde(rename = "NumBlocks", default)]
    pub num_blocks: usize,
}

/// A file is composed of one or more blocks.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Block {
    #[serde(rename = "Header", default)]
    pub header: BlockHeader,
    #[serde(rename = "Data", default)]
    pub data: Vec<u8>,
}

/// The wire unit exchanged between peers. Field names are part of the wire
/// contract; absent fields decode to their defaults.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Packet {
    #[serde(rename = "SRC", default)]
    pub src: String,
    #[serde(rename = "DST", default)]
    pub dst: String,
    #[serde(rename = "CMD", default)]
    pub cmd: Command,
    #[serde(rename = "Err", default)]
    pub err: String,
    #[serde(rename = "Data", default)]
    pub data: Block,
    #[serde(rename = "Headers", default)]
    pub headers: Vec<BlockHeader>,
}

// regarding the stream encoding and decoding
impl Packet {
    /// The outbound reply template: ACK addressed back at the sender.
    pub fn reply_to(incoming: &Packet, own_id: &str) -> Self {
        Packet {
            src: own_id.to_owned(),
            dst: incoming.src.clone(),
            cmd: Command::Ack,
            ..Packet::default()
        }
    }

    /// Reads one length-prefixed frame off the stream and parses it.
    pub async fn decode(stream: &mut (impl AsyncRead + Unpin)) -> Result<Self> {
        let frame_size = stream.read_u32_le().await?;
        if frame_size == 0 {
            return Err("empty packet frame".into());
        }
        let mut frame_raw = vec![0u8; frame_size as usize];
        stream.read_exact(&mut frame_raw).await?;
        let packet = serde_json::from_slice(&frame_raw)?;
        Ok(packet)
    }

    /// Produces the framed bytes for this packet, ready for transmission.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let body = serde_json::to_vec(self)?;
        let mut buf = Vec::with_capacity(body.len() + 4);
        buf.extend_from_slice(&(body.len() as u32).to_le_bytes());
        buf.extend_from_slice(&body);
        Ok(buf)
    }
}
