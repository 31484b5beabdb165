//! Newline-delimited JSON bridge to an external chat-platform adapter.
//!
//! Each input line is one event:
//!
//! ```text
//! {"type":"message","channel_id":"123","text":"Hello","author":{"name":"yuki"}}
//! {"type":"correction","original":"こんにちわ","corrected":"こんにちは"}
//! ```
//!
//! Replies are written to the output as one JSON object per line.

use async_trait::async_trait;
use polyglot_core::{
    error::PolyglotError,
    message::{IncomingEvent, OutgoingMessage},
    traits::Channel,
};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

type Input = Box<dyn AsyncBufRead + Send + Unpin>;
type Output = Box<dyn AsyncWrite + Send + Unpin>;

/// JSON-lines event source.
pub struct LineBridge {
    input: Mutex<Option<Input>>,
    output: Mutex<Output>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl LineBridge {
    pub fn new(
        input: impl AsyncBufRead + Send + Unpin + 'static,
        output: impl AsyncWrite + Send + Unpin + 'static,
    ) -> Self {
        Self {
            input: Mutex::new(Some(Box::new(input))),
            output: Mutex::new(Box::new(output)),
            reader: Mutex::new(None),
        }
    }

    /// Bridge over the process's stdin/stdout.
    pub fn stdio() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }
}

/// Parse one input line.
pub fn parse_event(line: &str) -> Result<IncomingEvent, PolyglotError> {
    let event: IncomingEvent = serde_json::from_str(line)?;
    if let IncomingEvent::Message(ref m) = event {
        if m.channel_id.trim().is_empty() {
            return Err(PolyglotError::Channel("message without channel_id".into()));
        }
    }
    Ok(event)
}

#[async_trait]
impl Channel for LineBridge {
    fn name(&self) -> &str {
        "bridge"
    }

    async fn start(&self) -> Result<mpsc::Receiver<IncomingEvent>, PolyglotError> {
        let input = self
            .input
            .lock()
            .await
            .take()
            .ok_or_else(|| PolyglotError::Channel("bridge already started".into()))?;

        let (tx, rx) = mpsc::channel(64);
        let handle = tokio::spawn(async move {
            let mut lines = input.lines();
            let mut n = 0usize;
            loop {
                let line = match lines.next_line().await {
                    Ok(Some(line)) => line,
                    Ok(None) => {
                        info!("bridge: input closed");
                        break;
                    }
                    Err(e) => {
                        warn!("bridge: read failed: {e}");
                        break;
                    }
                };
                n += 1;
                if line.trim().is_empty() {
                    continue;
                }
                match parse_event(&line) {
                    Ok(event) => {
                        if tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("bridge: skipping line {n}: {e}"),
                }
            }
        });
        *self.reader.lock().await = Some(handle);
        Ok(rx)
    }

    async fn send(&self, message: OutgoingMessage) -> Result<(), PolyglotError> {
        let mut line = serde_json::to_string(&message)?;
        line.push('\n');
        let mut out = self.output.lock().await;
        out.write_all(line.as_bytes()).await?;
        out.flush().await?;
        Ok(())
    }

    async fn stop(&self) -> Result<(), PolyglotError> {
        if let Some(handle) = self.reader.lock().await.take() {
            handle.abort();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_flow_and_bad_lines_are_skipped() {
        let input = concat!(
            r#"{"type":"message","channel_id":"c1","text":"Hello","author":{"name":"yuki"}}"#,
            "\n",
            "garbage\n",
            "\n",
            r#"{"type":"message","channel_id":"","text":"orphan"}"#,
            "\n",
            r#"{"type":"correction","original":"a","corrected":"b"}"#,
            "\n",
        );
        let bridge = LineBridge::new(BufReader::new(input.as_bytes()), tokio::io::sink());
        let mut rx = bridge.start().await.unwrap();

        match rx.recv().await.unwrap() {
            IncomingEvent::Message(m) => {
                assert_eq!(m.channel_id, "c1");
                assert_eq!(m.text, "Hello");
                assert_eq!(m.author.unwrap().name, "yuki");
                assert!(!m.from_bot);
            }
            other => panic!("expected message, got {other:?}"),
        }
        match rx.recv().await.unwrap() {
            IncomingEvent::Correction(c) => {
                assert_eq!(c.original, "a");
                assert_eq!(c.corrected, "b");
            }
            other => panic!("expected correction, got {other:?}"),
        }
        assert!(rx.recv().await.is_none());
        assert!(bridge.start().await.is_err(), "second start is refused");
    }

    #[tokio::test]
    async fn test_send_writes_json_line() {
        let (client, mut server) = tokio::io::duplex(1024);
        let bridge = LineBridge::new(BufReader::new(&b""[..]), client);
        bridge
            .send(OutgoingMessage {
                text: "updated".into(),
                reply_to: None,
            })
            .await
            .unwrap();
        drop(bridge);

        let mut buf = String::new();
        tokio::io::AsyncReadExt::read_to_string(&mut server, &mut buf)
            .await
            .unwrap();
        assert!(buf.ends_with('\n'));
        let v: serde_json::Value = serde_json::from_str(buf.trim()).unwrap();
        assert_eq!(v["text"], "updated");
    }
}
