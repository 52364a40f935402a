//! Transport: a Unix domain socket, one task per connection, framed as a
//! 4-byte big-endian length prefix followed by a `serde_json` payload
//! (spec §6.4).
//!
//! Every connection keeps its own reader and writer running concurrently,
//! since a `SetRegistryNotification`'s fired event can arrive on the wire
//! well after its `Pending` reply, interleaved with replies to later
//! requests on the same connection.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use crate::command::{Command, Reply};
use crate::dispatcher::{Envelope, Message};

/// Refuses to allocate a read buffer for a frame larger than this.
const MAX_FRAME_LEN: u32 = 16 * 1024 * 1024;

/// One outbound message: either the reply to a request, or a notification
/// firing asynchronously on a handle the connection armed earlier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ServerMessage {
    Reply(Reply),
    Notification { hkey: u64 },
}

/// Binds `socket_path` and accepts connections forever, handing each one
/// to its own `spawn_local` task. Must run inside a `tokio::task::LocalSet`,
/// since connection tasks and the engine task they talk to both hold `Rc` state.
pub async fn serve(socket_path: &Path, tx: mpsc::UnboundedSender<Message>) -> std::io::Result<()> {
    let _ = std::fs::remove_file(socket_path);
    if let Some(parent) = socket_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let listener = UnixListener::bind(socket_path)?;
    info!(path = %socket_path.display(), "listening");

    loop {
        let (stream, _addr) = listener.accept().await?;
        let tx = tx.clone();
        tokio::task::spawn_local(async move {
            if let Err(err) = handle_connection(stream, tx).await {
                warn!(%err, "connection closed with error");
            }
        });
    }
}

async fn handle_connection(stream: UnixStream, tx: mpsc::UnboundedSender<Message>) -> std::io::Result<()> {
    let (mut read_half, mut write_half) = stream.into_split();
    let (writer_tx, mut writer_rx) = mpsc::unbounded_channel::<Vec<u8>>();

    tokio::task::spawn_local(async move {
        while let Some(bytes) = writer_rx.recv().await {
            if write_half.write_all(&bytes).await.is_err() {
                break;
            }
        }
    });

    loop {
        let bytes = match read_frame(&mut read_half).await? {
            Some(bytes) => bytes,
            None => return Ok(()),
        };
        let command: Command = match serde_json::from_slice(&bytes) {
            Ok(command) => command,
            Err(err) => {
                warn!(%err, "dropping unparsable frame");
                continue;
            }
        };
        let notification_hkey = match &command {
            Command::SetRegistryNotification { hkey, .. } => Some(*hkey),
            _ => None,
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        if tx.send(Message::Command(Envelope { command, reply_tx })).is_err() {
            return Ok(());
        }
        let Ok((reply, event)) = reply_rx.await else {
            return Ok(());
        };

        if send_message(&writer_tx, &ServerMessage::Reply(reply)).is_err() {
            return Ok(());
        }

        if let (Some(hkey), Some(event)) = (notification_hkey, event) {
            let writer_tx = writer_tx.clone();
            tokio::task::spawn_local(async move {
                if event.await.is_ok() {
                    let _ = send_message(&writer_tx, &ServerMessage::Notification { hkey });
                }
            });
        }
    }
}

fn send_message(writer_tx: &mpsc::UnboundedSender<Vec<u8>>, message: &ServerMessage) -> Result<(), ()> {
    let bytes = serde_json::to_vec(message).map_err(|_| ())?;
    writer_tx.send(frame(bytes)).map_err(|_| ())
}

async fn read_frame(stream: &mut (impl AsyncReadExt + Unpin)) -> std::io::Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    if let Err(err) = stream.read_exact(&mut len_buf).await {
        return if err.kind() == std::io::ErrorKind::UnexpectedEof { Ok(None) } else { Err(err) };
    }
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_FRAME_LEN {
        return Err(std::io::Error::new(std::io::ErrorKind::InvalidData, "frame exceeds maximum length"));
    }
    let mut buf = vec![0u8; len as usize];
    stream.read_exact(&mut buf).await?;
    Ok(Some(buf))
}

fn frame(bytes: Vec<u8>) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + bytes.len());
    out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    out.extend_from_slice(&bytes);
    out
}
