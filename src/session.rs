use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{EnumIter, IntoStaticStr};
use uuid::Uuid;

/// Opaque identifier of a remote participant.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerId(pub Uuid);

impl PeerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PeerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Opaque handle to a live audio/video media source. The UI layer passes
/// these around and binds them to render targets, nothing more.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct StreamHandle(pub Uuid);

impl StreamHandle {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for StreamHandle {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, IntoStaticStr)]
#[serde(rename_all = "snake_case")]
pub enum MessageSender {
    Local,
    Remote,
}

/// A single chat line. Immutable once created, retained only in the active
/// session's message list.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChatMessage {
    pub id: Uuid,
    pub sender: MessageSender,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(sender: MessageSender, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Connection state as reported by the peer session service.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, IntoStaticStr, EnumIter)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl ConnectionState {
    /// Any of these means the pairing is gone and local session state must
    /// be dropped.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ConnectionState::Disconnected | ConnectionState::Failed | ConnectionState::Closed
        )
    }
}

/// Controller lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoStaticStr)]
pub enum SessionPhase {
    Idle,
    AcquiringMedia,
    /// Local media acquisition failed. Terminal, no auto-retry.
    MediaFailed,
    SeekingPeer,
    Connecting,
    Connected,
    /// The remote side went away. Re-matching requires an explicit skip.
    Disconnected,
    Ended,
}

/// The logical pairing between the local user and one remote participant.
/// At most one exists at a time, owned by the controller.
#[derive(Debug, Clone)]
pub struct Session {
    pub peer: PeerId,
    pub remote_stream: Option<StreamHandle>,
    pub messages: Vec<ChatMessage>,
}

impl Session {
    pub fn new(peer: PeerId) -> Self {
        Self {
            peer,
            remote_stream: None,
            messages: Vec::new(),
        }
    }
}
