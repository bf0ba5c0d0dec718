//! Length-prefixed frames over a tokio TCP stream.
//!
//! Each frame on the socket is `[len: u32 LE][frame bytes]`. One connection
//! task owns the stream and multiplexes three inputs:
//!
//! ```text
//!            ┌──────────────── connection_task ────────────────┐
//! send() ───►│ outbound rx ──► write_all([len][frame])          │
//!            │ socket read ──► read_buffer ──► events.message() │
//! disconnect │ outbound closed ──► flush, shutdown, exit        │
//!            └──────────────────────────────────────────────────┘
//! ```
//!
//! A read of zero bytes reports `closed`; any I/O failure or oversized frame
//! reports `errored`. Either way the task exits and the connection is gone.

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::{Transport, TransportError, TransportEvents};
use crate::envelope::DEFAULT_MAX_FRAME_SIZE;

/// Size of the length prefix in front of every frame.
const LENGTH_PREFIX: usize = 4;

/// Configuration for [`TcpTransport`].
#[derive(Clone, Debug)]
pub struct TcpConfig {
    /// Timeout for connection attempts
    pub connect_timeout: Duration,

    /// Largest frame accepted in either direction
    pub max_frame_size: usize,

    /// Disable Nagle's algorithm on the socket
    pub nodelay: bool,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            nodelay: true,
        }
    }
}

impl TcpConfig {
    /// Create a configuration for low-latency local networking.
    pub fn local_network() -> Self {
        Self {
            connect_timeout: Duration::from_millis(500),
            ..Self::default()
        }
    }

    /// Create a configuration for high-latency WAN networking.
    pub fn wan_network() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            ..Self::default()
        }
    }

    /// Override the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Override the frame size limit.
    pub fn with_max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }
}

struct TcpConnection {
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    task: JoinHandle<()>,
}

/// A [`Transport`] over a real TCP socket.
pub struct TcpTransport {
    config: TcpConfig,
    connection: Mutex<Option<TcpConnection>>,
}

impl TcpTransport {
    /// Create a transport with the given configuration.
    pub fn new(config: TcpConfig) -> Self {
        Self {
            config,
            connection: Mutex::new(None),
        }
    }

    /// The configuration in use.
    pub fn config(&self) -> &TcpConfig {
        &self.config
    }

    async fn open_stream(&self, endpoint: &str) -> Result<TcpStream, TransportError> {
        let stream = match tokio::time::timeout(
            self.config.connect_timeout,
            TcpStream::connect(endpoint),
        )
        .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(err)) if err.kind() == std::io::ErrorKind::ConnectionRefused => {
                return Err(TransportError::Refused {
                    endpoint: endpoint.to_string(),
                });
            }
            Ok(Err(err)) => return Err(err.into()),
            Err(_) => return Err(TransportError::ConnectTimeout(self.config.connect_timeout)),
        };
        stream.set_nodelay(self.config.nodelay)?;
        Ok(stream)
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new(TcpConfig::default())
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn connect(&self, endpoint: &str, events: TransportEvents) -> Result<(), TransportError> {
        if self.connection.lock().as_ref().is_some_and(|c| !c.task.is_finished()) {
            return Err(TransportError::AlreadyConnected);
        }

        tracing::debug!(endpoint, "tcp: connecting");
        let stream = self.open_stream(endpoint).await?;

        let mut connection = self.connection.lock();
        if connection.as_ref().is_some_and(|c| !c.task.is_finished()) {
            return Err(TransportError::AlreadyConnected);
        }

        // Opened goes out before the task can emit any message.
        events.opened();
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(connection_task(
            stream,
            outbound_rx,
            events,
            self.config.max_frame_size,
        ));
        *connection = Some(TcpConnection { outbound, task });
        tracing::debug!(endpoint, "tcp: connected");
        Ok(())
    }

    async fn disconnect(&self) {
        let Some(connection) = self.connection.lock().take() else {
            return;
        };
        // Closing the outbound channel lets the task flush queued frames first.
        drop(connection.outbound);
        if let Err(err) = connection.task.await {
            tracing::debug!(error = %err, "tcp: connection task ended abnormally");
        }
        tracing::debug!("tcp: disconnected");
    }

    fn send(&self, frame: Vec<u8>) -> Result<(), TransportError> {
        if frame.len() > self.config.max_frame_size {
            return Err(TransportError::FrameTooLarge {
                size: frame.len(),
                max: self.config.max_frame_size,
            });
        }
        match self.connection.lock().as_ref() {
            Some(connection) => connection
                .outbound
                .send(frame)
                .map_err(|_| TransportError::NotConnected),
            None => Err(TransportError::NotConnected),
        }
    }
}

async fn connection_task(
    stream: TcpStream,
    mut outbound: mpsc::UnboundedReceiver<Vec<u8>>,
    events: TransportEvents,
    max_frame_size: usize,
) {
    let (mut reader, mut writer) = stream.into_split();
    let mut read_buffer: Vec<u8> = Vec::with_capacity(4096);
    let mut chunk = vec![0u8; 4096];

    loop {
        tokio::select! {
            frame = outbound.recv() => {
                let Some(frame) = frame else {
                    let _ = writer.shutdown().await;
                    break;
                };
                let mut packet = Vec::with_capacity(LENGTH_PREFIX + frame.len());
                packet.extend_from_slice(&(frame.len() as u32).to_le_bytes());
                packet.extend_from_slice(&frame);
                if let Err(err) = writer.write_all(&packet).await {
                    tracing::debug!(error = %err, "tcp: write failed");
                    events.errored(err.into());
                    break;
                }
            }

            read = reader.read(&mut chunk) => {
                match read {
                    Ok(0) => {
                        tracing::debug!("tcp: peer closed the connection");
                        events.closed("connection closed by peer");
                        break;
                    }
                    Ok(n) => {
                        read_buffer.extend_from_slice(&chunk[..n]);
                        if let Err(err) = drain_frames(&mut read_buffer, max_frame_size, &events) {
                            tracing::warn!(error = %err, "tcp: tearing down connection");
                            events.errored(err);
                            break;
                        }
                    }
                    Err(err) => {
                        tracing::debug!(error = %err, "tcp: read failed");
                        events.errored(err.into());
                        break;
                    }
                }
            }
        }
    }
}

/// Emit every complete frame in `buffer` and keep the partial tail.
fn drain_frames(
    buffer: &mut Vec<u8>,
    max_frame_size: usize,
    events: &TransportEvents,
) -> Result<(), TransportError> {
    let mut offset = 0;
    while buffer.len() - offset >= LENGTH_PREFIX {
        let len = u32::from_le_bytes([
            buffer[offset],
            buffer[offset + 1],
            buffer[offset + 2],
            buffer[offset + 3],
        ]) as usize;
        if len > max_frame_size {
            return Err(TransportError::FrameTooLarge {
                size: len,
                max: max_frame_size,
            });
        }

        let start = offset + LENGTH_PREFIX;
        if buffer.len() - start < len {
            break;
        }
        events.message(buffer[start..start + len].to_vec());
        offset = start + len;
    }
    buffer.drain(..offset);
    Ok(())
}
