//! Chat transport seam and the console implementation used by the binary.

use std::future::Future;
use std::sync::atomic::{AtomicI64, Ordering};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncWriteExt, Stdout};
use tokio::sync::Mutex;

/// Chat user. Private chats share the user's id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub i64);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub i64);

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A message the bot sent, kept so it can be edited later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageRef {
    pub chat: UserId,
    pub id: MessageId,
}

/// A text message received from a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub user: UserId,
    pub id: MessageId,
    pub text: String,
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("message {0} cannot be edited")]
    NotEditable(MessageId),

    #[error("transport rejected the request: {0}")]
    Rejected(String),
}

/// Outbound side of a chat platform.
pub trait ChatTransport: Send + Sync + 'static {
    fn send_text(
        &self,
        chat: UserId,
        text: &str,
    ) -> impl Future<Output = Result<MessageRef, TransportError>> + Send;

    fn edit_text(
        &self,
        message: MessageRef,
        text: &str,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    fn send_photo(
        &self,
        chat: UserId,
        png: Bytes,
        caption: &str,
    ) -> impl Future<Output = Result<MessageRef, TransportError>> + Send;
}

/// Talks to a single local user over stdin/stdout.
///
/// Outgoing messages are numbered; edits are printed as new lines that
/// reference the original number.
pub struct ConsoleTransport {
    stdout: Mutex<Stdout>,
    next_id: AtomicI64,
}

impl ConsoleTransport {
    pub fn new() -> Self {
        Self {
            stdout: Mutex::new(tokio::io::stdout()),
            next_id: AtomicI64::new(1),
        }
    }

    /// Allocate an id for an incoming or outgoing message.
    pub fn next_message_id(&self) -> MessageId {
        MessageId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    async fn print(&self, line: String) -> Result<(), TransportError> {
        let mut stdout = self.stdout.lock().await;
        stdout.write_all(line.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
        Ok(())
    }
}

impl Default for ConsoleTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatTransport for ConsoleTransport {
    async fn send_text(&self, chat: UserId, text: &str) -> Result<MessageRef, TransportError> {
        let id = self.next_message_id();
        self.print(format!("[#{id}] {text}")).await?;
        Ok(MessageRef { chat, id })
    }

    async fn edit_text(&self, message: MessageRef, text: &str) -> Result<(), TransportError> {
        self.print(format!("[#{} edited] {text}", message.id)).await
    }

    async fn send_photo(
        &self,
        chat: UserId,
        png: Bytes,
        caption: &str,
    ) -> Result<MessageRef, TransportError> {
        let id = self.next_message_id();
        self.print(format!("[#{id}] <image, {} bytes>\n{caption}", png.len()))
            .await?;
        Ok(MessageRef { chat, id })
    }
}
