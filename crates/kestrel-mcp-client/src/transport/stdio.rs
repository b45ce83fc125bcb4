//! STDIO transport: a child server process with newline-delimited JSON
//! over its stdin/stdout pipes.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{Mutex, mpsc};
use tokio_util::codec::{FramedRead, LinesCodec};
use tracing::{debug, warn};

use kestrel_mcp_json_rpc::{JsonRpcFrame, decode, encode, encode_batch};

use crate::error::TransportError;
use crate::transport::{Transport, TransportEvent};

/// Spawns the server as a subprocess and frames messages by line.
pub struct StdioTransport {
    command: String,
    args: Vec<String>,
    state: Mutex<StdioState>,
}

#[derive(Default)]
struct StdioState {
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    shut_down: bool,
}

impl StdioTransport {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            state: Mutex::new(StdioState::default()),
        }
    }

    async fn write_line(&self, line: String, timeout: Duration) -> Result<(), TransportError> {
        let mut state = self.state.lock().await;
        let stdin = state
            .stdin
            .as_mut()
            .ok_or(TransportError::Closed)?;

        let write = async {
            stdin.write_all(line.as_bytes()).await?;
            stdin.write_all(b"\n").await?;
            stdin.flush().await
        };
        tokio::time::timeout(timeout, write)
            .await
            .map_err(|_| TransportError::Timeout)?
            .map_err(TransportError::from)
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn start(&self) -> Result<mpsc::Receiver<TransportEvent>, TransportError> {
        let mut child = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| {
                TransportError::ConnectionFailed(format!(
                    "failed to spawn '{}': {}",
                    self.command, e
                ))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| TransportError::ConnectionFailed("no stdin pipe".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TransportError::ConnectionFailed("no stdout pipe".to_string()))?;

        {
            let mut state = self.state.lock().await;
            state.stdin = Some(stdin);
            state.child = Some(child);
        }

        let (events_tx, events_rx) = mpsc::channel(256);
        tokio::spawn(async move {
            let mut lines = FramedRead::new(stdout, LinesCodec::new());
            while let Some(line) = lines.next().await {
                let line = match line {
                    Ok(line) => line,
                    Err(err) => {
                        warn!(error = %err, "stdio read failed");
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                match decode(&line) {
                    Ok(frames) => {
                        for frame in frames {
                            if events_tx.send(TransportEvent::Frame(frame)).await.is_err() {
                                return;
                            }
                        }
                    }
                    Err(err) => {
                        warn!(error = %err, "undecodable stdio line dropped");
                    }
                }
            }
            debug!("stdio stream ended");
            let _ = events_tx.send(TransportEvent::Closed).await;
        });

        Ok(events_rx)
    }

    async fn send(&self, frame: &JsonRpcFrame, timeout: Duration) -> Result<(), TransportError> {
        let line = encode(frame).map_err(|e| TransportError::SendFailed(e.to_string()))?;
        self.write_line(line, timeout).await
    }

    async fn send_batch(
        &self,
        frames: &[JsonRpcFrame],
        timeout: Duration,
    ) -> Result<(), TransportError> {
        let line = encode_batch(frames).map_err(|e| TransportError::SendFailed(e.to_string()))?;
        self.write_line(line, timeout).await
    }

    async fn shutdown(&self) -> Result<(), TransportError> {
        let mut state = self.state.lock().await;
        if state.shut_down {
            return Ok(());
        }
        state.shut_down = true;

        // Dropping stdin signals EOF; give the child a moment to exit
        // before killing it.
        state.stdin.take();
        if let Some(mut child) = state.child.take() {
            match tokio::time::timeout(Duration::from_secs(2), child.wait()).await {
                Ok(Ok(status)) => debug!(%status, "stdio child exited"),
                _ => {
                    warn!("stdio child did not exit; killing");
                    let _ = child.kill().await;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_spawn_failure_is_connection_error() {
        let transport = StdioTransport::new("/nonexistent/binary", vec![]);
        let result = transport.start().await;
        assert!(matches!(result, Err(TransportError::ConnectionFailed(_))));
    }

    #[tokio::test]
    async fn test_send_before_start_fails_closed() {
        let transport = StdioTransport::new("cat", vec![]);
        let frame = kestrel_mcp_json_rpc::JsonRpcRequest::new(
            kestrel_mcp_json_rpc::RequestId::Number(1),
            "ping",
            None,
        )
        .into();
        let result = transport.send(&frame, Duration::from_millis(100)).await;
        assert!(matches!(result, Err(TransportError::Closed)));
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let transport = StdioTransport::new("cat", vec![]);
        let _events = transport.start().await.unwrap();
        assert!(transport.shutdown().await.is_ok());
        assert!(transport.shutdown().await.is_ok());
    }

    #[tokio::test]
    async fn test_echo_round_trip_through_cat() {
        // `cat` echoes stdin to stdout, so any frame we send comes back.
        let transport = StdioTransport::new("cat", vec![]);
        let mut events = transport.start().await.unwrap();

        let frame: JsonRpcFrame = kestrel_mcp_json_rpc::JsonRpcRequest::new(
            kestrel_mcp_json_rpc::RequestId::Number(7),
            "ping",
            None,
        )
        .into();
        transport.send(&frame, Duration::from_secs(1)).await.unwrap();

        match tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .unwrap()
            .unwrap()
        {
            TransportEvent::Frame(received) => {
                assert_eq!(received.method(), Some("ping"));
            }
            other => panic!("expected frame, got {:?}", other),
        }

        transport.shutdown().await.unwrap();
    }
}
