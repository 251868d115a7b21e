mod loopback;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strum_macros::{EnumDiscriminants, IntoStaticStr};
use thiserror::Error;
use tokio::sync::mpsc::Receiver;

use crate::session::{ConnectionState, PeerId, StreamHandle};

/// Errors the peer session service can surface to the controller. Media
/// access failures are terminal for the session attempt; matchmaking and
/// signaling failures are recovered by the controller's retry loop.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("media access denied: {0}")]
    MediaAccess(String),
    #[error("no peer available")]
    NoPeerAvailable,
    #[error("signaling failure: {0}")]
    Signaling(String),
    #[error("service is shut down")]
    Closed,
}

/// The contract of the external Peer Session Service: it owns the peer
/// connections, signaling and media transport. This layer only consumes it.
#[async_trait]
pub trait PeerService: Send + Sync + 'static {
    /// Acquire the local camera/microphone stream.
    async fn acquire_local_media(&self) -> Result<StreamHandle, ServiceError>;
    /// Ask the matchmaker for a remote participant. Resolves once a peer is
    /// found; not cancellable mid-flight.
    async fn request_peer(&self) -> Result<PeerId, ServiceError>;
    /// The peer's media stream, if it has been attached already.
    async fn remote_stream(&self, peer: PeerId) -> Option<StreamHandle>;
    /// Send a chat payload to the peer.
    async fn send_message(&self, peer: PeerId, text: &str) -> Result<(), ServiceError>;
    /// Tear down the connection to one peer.
    async fn disconnect(&self, peer: PeerId);
    async fn set_audio_enabled(&self, enabled: bool);
    async fn set_video_enabled(&self, enabled: bool);
    /// Take ownership of the inbound event channel. Yields once; later calls
    /// return None.
    fn take_events(&mut self) -> Option<Receiver<ServiceEvent>>;
    /// Release all resources. Idempotent.
    async fn teardown(&self);
}

/// Events emitted by the service, each scoped to a peer identifier. The
/// controller discards events for peers other than the active session's.
#[derive(Debug, Serialize, Deserialize, Clone, IntoStaticStr, EnumDiscriminants)]
#[strum_discriminants(derive(IntoStaticStr))]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServiceEvent {
    Message { peer: PeerId, text: String },
    StreamAttached { peer: PeerId, stream: StreamHandle },
    StateChanged { peer: PeerId, state: ConnectionState },
}

impl ServiceEvent {
    pub fn peer(&self) -> PeerId {
        match self {
            ServiceEvent::Message { peer, .. } => *peer,
            ServiceEvent::StreamAttached { peer, .. } => *peer,
            ServiceEvent::StateChanged { peer, .. } => *peer,
        }
    }
}

pub use loopback::{LoopbackHub, LoopbackService};
