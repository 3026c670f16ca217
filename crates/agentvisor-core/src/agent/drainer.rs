//! Agent output draining

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

const CHUNK_SIZE: usize = 1024;

/// Which output stream a chunk came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdout => f.write_str("stdout"),
            Self::Stderr => f.write_str("stderr"),
        }
    }
}

/// Tag attached to every forwarded chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamLabel {
    pub agent_id: String,
    pub stream: StreamKind,
}

impl StreamLabel {
    pub fn new(agent_id: impl Into<String>, stream: StreamKind) -> Self {
        Self {
            agent_id: agent_id.into(),
            stream,
        }
    }
}

impl fmt::Display for StreamLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[agent {} - {}]", self.agent_id, self.stream)
    }
}

/// Destination for agent output
#[async_trait]
pub trait OutputSink: Send + Sync {
    /// Receive one non-empty chunk read from an agent stream
    async fn write_chunk(&self, label: &StreamLabel, chunk: &[u8]);
}

/// Forwards agent output to the tracing subscriber
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

#[async_trait]
impl OutputSink for TracingSink {
    async fn write_chunk(&self, label: &StreamLabel, chunk: &[u8]) {
        let text = String::from_utf8_lossy(chunk);
        info!(
            agent_id = %label.agent_id,
            stream = %label.stream,
            "{} {}",
            label,
            text.trim_end()
        );
    }
}

/// Read `reader` to the end, forwarding each chunk to `sink`.
///
/// Returns the number of bytes forwarded. A read error ends the drain and is
/// logged, never propagated.
pub async fn drain<R>(mut reader: R, label: StreamLabel, sink: Arc<dyn OutputSink>) -> u64
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; CHUNK_SIZE];
    let mut total = 0u64;

    loop {
        match reader.read(&mut buf).await {
            Ok(0) => {
                debug!("{} closed after {} bytes", label, total);
                break;
            }
            Ok(n) => {
                total += n as u64;
                sink.write_chunk(&label, &buf[..n]).await;
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                error!("Error reading {}: {}", label, e);
                break;
            }
        }
    }

    total
}

/// Run [`drain`] as an independent task
pub fn spawn_drainer<R>(reader: R, label: StreamLabel, sink: Arc<dyn OutputSink>) -> JoinHandle<u64>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(drain(reader, label, sink))
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use tokio::sync::Mutex;

    /// Sink that keeps everything it receives
    #[derive(Default)]
    pub struct CollectingSink {
        chunks: Mutex<Vec<(StreamLabel, Vec<u8>)>>,
    }

    impl CollectingSink {
        /// Concatenated output of one agent stream
        pub async fn output(&self, agent_id: &str, stream: StreamKind) -> String {
            let chunks = self.chunks.lock().await;
            let bytes: Vec<u8> = chunks
                .iter()
                .filter(|(label, _)| label.agent_id == agent_id && label.stream == stream)
                .flat_map(|(_, chunk)| chunk.iter().copied())
                .collect();
            String::from_utf8_lossy(&bytes).to_string()
        }

        pub async fn chunk_count(&self) -> usize {
            self.chunks.lock().await.len()
        }
    }

    #[async_trait]
    impl OutputSink for CollectingSink {
        async fn write_chunk(&self, label: &StreamLabel, chunk: &[u8]) {
            self.chunks.lock().await.push((label.clone(), chunk.to_vec()));
        }
    }
}
