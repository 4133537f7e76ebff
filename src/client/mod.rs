//! Chat client seam
//!
//! The orchestrator talks to the remote bot only through [`ChatClient`].
//! Messages, buttons and inline results cross the seam as plain data so the
//! flows never depend on a particular protocol library.

/// Conversions from `teloxide` message types.
pub mod telegram;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Telegram message identifier within a chat.
pub type MessageId = i32;

/// Errors reported by a chat client implementation
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// The peer asked us to slow down (`FLOOD_WAIT`)
    #[error("Rate limited by peer (wait: {wait_secs}s)")]
    RateLimited {
        /// Seconds the peer asked us to wait
        wait_secs: u64,
    },
    /// The user session is not authorized
    #[error("Session is not authorized")]
    Unauthorized,
    /// A handle could not be resolved to a chat
    #[error("Peer not found: {0}")]
    PeerNotFound(String),
    /// Transport-level failure, usually transient
    #[error("Network error: {0}")]
    Network(String),
    /// The peer rejected the request
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl ClientError {
    /// Seconds to back off if this is a peer rate limit.
    #[must_use]
    pub const fn rate_limit_wait(&self) -> Option<u64> {
        match self {
            Self::RateLimited { wait_secs } => Some(*wait_secs),
            _ => None,
        }
    }

    /// Whether retrying the same request may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

/// A resolved chat (the bot we are driving)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    /// Numeric chat id; also the author id of messages the bot sends
    pub id: i64,
    /// Handle the peer was resolved from
    pub handle: String,
}

/// What an inline button does when pressed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ButtonKind {
    /// Sends callback data back to the bot
    Callback(String),
    /// Opens a link
    Url(String),
    /// Anything else (switch-inline, web app, login, ...)
    Other,
}

/// A single inline keyboard button
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Button {
    /// Visible label
    pub label: String,
    /// Button behaviour
    pub kind: ButtonKind,
}

impl Button {
    /// Create a callback button
    #[must_use]
    pub fn callback(label: &str, data: &str) -> Self {
        Self {
            label: label.to_string(),
            kind: ButtonKind::Callback(data.to_string()),
        }
    }

    /// Create a URL button
    #[must_use]
    pub fn url(label: &str, url: &str) -> Self {
        Self {
            label: label.to_string(),
            kind: ButtonKind::Url(url.to_string()),
        }
    }
}

/// A message as seen by the flows
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BotMessage {
    /// Message id
    pub id: MessageId,
    /// Sender id (user or chat)
    pub author_id: i64,
    /// Carries a video or document
    pub has_media: bool,
    /// Inline keyboard, row-major
    pub buttons: Vec<Vec<Button>>,
    /// Text or caption
    pub text: String,
}

impl BotMessage {
    /// Whether the message was sent by the given peer
    #[must_use]
    pub const fn is_from(&self, peer: &Peer) -> bool {
        self.author_id == peer.id
    }

    /// Whether the message carries at least one button
    #[must_use]
    pub fn has_buttons(&self) -> bool {
        self.buttons.iter().any(|row| !row.is_empty())
    }
}

/// One result of an inline query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineResult {
    /// Query id the result belongs to
    pub query_id: String,
    /// Result id used to pick it
    pub result_id: String,
    /// Result title
    pub title: Option<String>,
    /// Result description
    pub description: Option<String>,
}

impl InlineResult {
    /// Display text: title, else description, else empty
    #[must_use]
    pub fn display_text(&self) -> String {
        self.title
            .as_deref()
            .filter(|t| !t.is_empty())
            .or(self.description.as_deref())
            .unwrap_or_default()
            .to_string()
    }
}

/// How media reaches the destination chat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForwardMode {
    /// Re-send the media without the "forwarded from" header
    #[default]
    Copy,
    /// Native forward
    Forward,
}

/// Interface to the user-session chat protocol client
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Open the connection
    async fn connect(&self) -> Result<(), ClientError>;
    /// Close the connection
    async fn disconnect(&self) -> Result<(), ClientError>;
    /// Whether the stored session is authorized
    async fn is_authorized(&self) -> Result<bool, ClientError>;
    /// Resolve a handle such as `@some_bot`
    async fn resolve_peer(&self, handle: &str) -> Result<Peer, ClientError>;
    /// Send a text message, returning the sent message
    async fn send_text(&self, peer: &Peer, text: &str) -> Result<BotMessage, ClientError>;
    /// Most recent messages of the chat, newest first
    async fn recent_messages(
        &self,
        peer: &Peer,
        limit: usize,
    ) -> Result<Vec<BotMessage>, ClientError>;
    /// Fetch one message by id
    async fn message_by_id(
        &self,
        peer: &Peer,
        id: MessageId,
    ) -> Result<Option<BotMessage>, ClientError>;
    /// Press the inline button at `row`/`col` of a message
    async fn click(
        &self,
        peer: &Peer,
        message_id: MessageId,
        row: usize,
        col: usize,
    ) -> Result<(), ClientError>;
    /// Deliver a message to the destination chat
    async fn forward(
        &self,
        peer: &Peer,
        message_id: MessageId,
        destination: &str,
        mode: ForwardMode,
    ) -> Result<(), ClientError>;
    /// Run an inline query against the bot
    async fn inline_query(
        &self,
        peer: &Peer,
        query: &str,
    ) -> Result<Vec<InlineResult>, ClientError>;
    /// Pick an inline result, sending it into the chat
    async fn pick_inline_result(
        &self,
        peer: &Peer,
        result: &InlineResult,
    ) -> Result<(), ClientError>;
}
