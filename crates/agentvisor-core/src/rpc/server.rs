//! Line-delimited JSON-RPC over a byte stream pair

use super::dispatcher::ToolDispatcher;
use crate::error::Result;
use crate::types::JsonRpcResponse;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace};

const RESPONSE_BUFFER: usize = 100;

/// Serves tool requests read from one stream and answers on another
pub struct RpcServer {
    dispatcher: ToolDispatcher,
}

impl RpcServer {
    pub fn new(dispatcher: ToolDispatcher) -> Self {
        Self { dispatcher }
    }

    /// Serve until `reader` reaches EOF and every in-flight request has been
    /// answered.
    ///
    /// Each request runs in its own task; a single writer task owns `writer`
    /// and serializes the responses.
    pub async fn serve<R, W>(&self, reader: R, writer: W) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (response_tx, response_rx) = mpsc::channel::<JsonRpcResponse>(RESPONSE_BUFFER);
        let writer_task = tokio::spawn(Self::write_responses_task(writer, response_rx));

        let mut lines = BufReader::new(reader).lines();
        while let Some(line) = lines.next_line().await? {
            let line = line.trim().to_string();
            if line.is_empty() {
                continue;
            }
            trace!("Received: {}", line);

            let dispatcher = self.dispatcher.clone();
            let response_tx = response_tx.clone();
            tokio::spawn(async move {
                if let Some(response) = dispatcher.handle_line(&line).await {
                    if response_tx.send(response).await.is_err() {
                        error!("Response writer is gone, dropping response");
                    }
                }
            });
        }

        info!("Input closed, waiting for in-flight requests");
        drop(response_tx);
        if let Err(e) = writer_task.await {
            error!("Response writer task failed: {}", e);
        }
        Ok(())
    }

    /// Background task to write responses, one JSON object per line
    async fn write_responses_task<W>(mut writer: W, mut rx: mpsc::Receiver<JsonRpcResponse>)
    where
        W: AsyncWrite + Unpin,
    {
        while let Some(response) = rx.recv().await {
            let json = match serde_json::to_string(&response) {
                Ok(json) => json,
                Err(e) => {
                    error!("Failed to serialize response: {}", e);
                    continue;
                }
            };
            trace!("Sending: {}", json);

            if let Err(e) = writer.write_all(json.as_bytes()).await {
                error!("Failed to write response: {}", e);
                break;
            }
            if let Err(e) = writer.write_all(b"\n").await {
                error!("Failed to write newline: {}", e);
                break;
            }
            if let Err(e) = writer.flush().await {
                error!("Failed to flush output: {}", e);
                break;
            }
        }
        debug!("Response writer task ended");
    }
}
