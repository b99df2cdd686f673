//! Wire framing: `command(12 bytes, ASCII, 0x00-padded) || len(4 bytes, big
//! endian) || payload(canonical binary, `len` bytes)`. One frame per TCP
//! connection — each peer dials, writes exactly one message, and
//! half-closes; the receiver reads exactly `len` payload bytes rather than
//! trusting EOF, so a slow or stalled peer can't hold a handler open
//! indefinitely (every read and dial below is wrapped in [`IO_TIMEOUT`]).

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::timeout;

use rill_core::codec;
use rill_core::hash::Hash256;

use crate::error::NetworkError;

pub const COMMAND_LENGTH: usize = 12;
const LENGTH_PREFIX_LEN: usize = 4;

/// Every blocking network operation (dial, read, write) is bounded by this
/// timeout, so a stalled or malicious peer can't hold a connection handler
/// open forever.
pub const IO_TIMEOUT: Duration = Duration::from_secs(10);

fn timed_out() -> NetworkError {
    NetworkError::Io(std::io::Error::new(std::io::ErrorKind::TimedOut, "I/O timed out"))
}

fn command_bytes(name: &str) -> [u8; COMMAND_LENGTH] {
    let mut buf = [0u8; COMMAND_LENGTH];
    let bytes = name.as_bytes();
    buf[..bytes.len()].copy_from_slice(bytes);
    buf
}

fn command_str(bytes: &[u8; COMMAND_LENGTH]) -> &str {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(COMMAND_LENGTH);
    std::str::from_utf8(&bytes[..end]).unwrap_or("")
}

/// Which kind of inventory an `inv`/`getdata` message refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize, bincode::Encode, bincode::Decode)]
pub enum InvKind {
    Block,
    Tx,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize, bincode::Encode, bincode::Decode)]
pub struct VersionPayload {
    pub from_addr: String,
    pub version: u32,
    pub best_height: u64,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize, bincode::Encode, bincode::Decode)]
pub struct AddrPayload {
    pub addr_list: Vec<String>,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize, bincode::Encode, bincode::Decode)]
pub struct GetBlocksPayload {
    pub from_addr: String,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize, bincode::Encode, bincode::Decode)]
pub struct InvPayload {
    pub from_addr: String,
    pub kind: InvKind,
    pub items: Vec<Hash256>,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize, bincode::Encode, bincode::Decode)]
pub struct GetDataPayload {
    pub from_addr: String,
    pub kind: InvKind,
    pub id: Hash256,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize, bincode::Encode, bincode::Decode)]
pub struct BlockPayload {
    pub from_addr: String,
    pub block_bytes: Vec<u8>,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize, bincode::Encode, bincode::Decode)]
pub struct TxPayload {
    pub from_addr: String,
    pub tx_bytes: Vec<u8>,
}

/// Protocol version advertised in every `version` message.
pub const PROTOCOL_VERSION: u32 = 1;

/// A fully decoded wire message, tagged by the command it arrived under.
#[derive(Clone, Debug)]
pub enum Message {
    Version(VersionPayload),
    Addr(AddrPayload),
    GetBlocks(GetBlocksPayload),
    Inv(InvPayload),
    GetData(GetDataPayload),
    Block(BlockPayload),
    Tx(TxPayload),
}

impl Message {
    fn command(&self) -> &'static str {
        match self {
            Message::Version(_) => "version",
            Message::Addr(_) => "addr",
            Message::GetBlocks(_) => "getblocks",
            Message::Inv(_) => "inv",
            Message::GetData(_) => "getdata",
            Message::Block(_) => "block",
            Message::Tx(_) => "tx",
        }
    }

    fn encode_payload(&self) -> Result<Vec<u8>, NetworkError> {
        let bytes = match self {
            Message::Version(p) => codec::encode(p)?,
            Message::Addr(p) => codec::encode(p)?,
            Message::GetBlocks(p) => codec::encode(p)?,
            Message::Inv(p) => codec::encode(p)?,
            Message::GetData(p) => codec::encode(p)?,
            Message::Block(p) => codec::encode(p)?,
            Message::Tx(p) => codec::encode(p)?,
        };
        Ok(bytes)
    }

    /// `command(12) || len(4, big endian) || payload`.
    pub fn encode(&self) -> Result<Vec<u8>, NetworkError> {
        let payload = self.encode_payload()?;
        let mut buf = command_bytes(self.command()).to_vec();
        buf.extend((payload.len() as u32).to_be_bytes());
        buf.extend(payload);
        Ok(buf)
    }

    fn decode(command: &str, payload: &[u8]) -> Result<Self, NetworkError> {
        Ok(match command {
            "version" => Message::Version(codec::decode(payload)?),
            "addr" => Message::Addr(codec::decode(payload)?),
            "getblocks" => Message::GetBlocks(codec::decode(payload)?),
            "inv" => Message::Inv(codec::decode(payload)?),
            "getdata" => Message::GetData(codec::decode(payload)?),
            "block" => Message::Block(codec::decode(payload)?),
            "tx" => Message::Tx(codec::decode(payload)?),
            other => return Err(NetworkError::Codec(format!("unknown command {other:?}"))),
        })
    }
}

/// Write one message (`command || len || payload`) and half-close the write
/// side, signalling EOF once the frame is fully sent.
pub async fn write_message(
    stream: &mut tokio::net::TcpStream,
    message: &Message,
) -> Result<(), NetworkError> {
    let frame = message.encode()?;
    timeout(IO_TIMEOUT, stream.write_all(&frame)).await.map_err(|_| timed_out())??;
    timeout(IO_TIMEOUT, stream.shutdown()).await.map_err(|_| timed_out())??;
    Ok(())
}

/// Read exactly one `command || len || payload` frame, bounded by
/// [`IO_TIMEOUT`] — never trusts EOF for framing.
pub async fn read_message(stream: &mut tokio::net::TcpStream) -> Result<Message, NetworkError> {
    let mut header = [0u8; COMMAND_LENGTH + LENGTH_PREFIX_LEN];
    timeout(IO_TIMEOUT, stream.read_exact(&mut header))
        .await
        .map_err(|_| timed_out())??;

    let mut command_buf = [0u8; COMMAND_LENGTH];
    command_buf.copy_from_slice(&header[..COMMAND_LENGTH]);
    let command = command_str(&command_buf).to_string();

    let len_bytes: [u8; LENGTH_PREFIX_LEN] = header[COMMAND_LENGTH..].try_into().unwrap();
    let len = u32::from_be_bytes(len_bytes) as usize;

    let mut payload = vec![0u8; len];
    timeout(IO_TIMEOUT, stream.read_exact(&mut payload))
        .await
        .map_err(|_| timed_out())??;

    Message::decode(&command, &payload)
}
