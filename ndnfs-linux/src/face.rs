//! Transport face: a duplex channel of packets. The pipeline only sees the
//! two channel ends; how frames reach the forwarder is up to the face.

use std::io;

use ndnfs_core::wire::{decode_payload, encode_frame, frame_len, LEN_SIZE};
use ndnfs_core::Packet;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Queue depth of each face direction.
pub const DEFAULT_FACE_QUEUE: usize = 1024;

pub struct Face {
    /// Outbound packets.
    pub tx: mpsc::Sender<Packet>,
    /// Inbound packets. Closed when the underlying transport goes away.
    pub rx: mpsc::Receiver<Packet>,
}

impl Face {
    /// Two faces wired back to back: what one side sends, the other receives.
    pub fn pair(capacity: usize) -> (Face, Face) {
        let (a_tx, b_rx) = mpsc::channel(capacity);
        let (b_tx, a_rx) = mpsc::channel(capacity);
        (
            Face { tx: a_tx, rx: a_rx },
            Face { tx: b_tx, rx: b_rx },
        )
    }
}

/// Open a face over TCP to a forwarder speaking length-prefixed frames.
pub async fn connect<A: ToSocketAddrs + std::fmt::Debug>(addr: A) -> io::Result<Face> {
    let stream = TcpStream::connect(&addr).await?;
    stream.set_nodelay(true)?;
    info!(?addr, "opened TCP face to forwarder");
    Ok(run_stream(stream, DEFAULT_FACE_QUEUE))
}

/// Spawn the reader and writer tasks for `stream` and return the local face end.
pub fn run_stream(stream: TcpStream, capacity: usize) -> Face {
    let (local, remote) = Face::pair(capacity);
    let Face {
        tx: inbound,
        rx: mut outbound,
    } = remote;
    let (mut reader, mut writer) = stream.into_split();

    tokio::spawn(async move {
        while let Some(packet) = outbound.recv().await {
            let frame = match encode_frame(&packet) {
                Ok(f) => f,
                Err(e) => {
                    warn!(error = %e, "dropping packet that cannot be framed");
                    continue;
                }
            };
            if let Err(e) = writer.write_all(&frame).await {
                warn!(error = %e, "face write failed");
                break;
            }
        }
        let _ = writer.shutdown().await;
        debug!("face writer stopped");
    });

    tokio::spawn(async move {
        let mut header = [0u8; LEN_SIZE];
        loop {
            if reader.read_exact(&mut header).await.is_err() {
                break;
            }
            let len = match frame_len(&header) {
                Ok(len) => len,
                Err(e) => {
                    warn!(error = %e, "bad frame header, closing face");
                    break;
                }
            };
            let mut payload = vec![0u8; len];
            if reader.read_exact(&mut payload).await.is_err() {
                break;
            }
            match decode_payload(&payload) {
                Ok(packet) => {
                    if inbound.send(packet).await.is_err() {
                        break;
                    }
                }
                Err(e) => warn!(error = %e, "dropping undecodable frame"),
            }
        }
        debug!("face reader stopped");
    });

    local
}
