use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::sync::{oneshot, Mutex};

use crate::service::{PeerService, ServiceError, ServiceEvent};
use crate::session::{ConnectionState, PeerId, StreamHandle};

const EVENT_BUFFER: usize = 32;

/// In-process matchmaker pairing endpoints of the same process. Fills the
/// `PeerService` seam for the demo binary and tests; there is no signaling
/// transport behind it.
pub struct LoopbackHub {
    inner: Arc<Mutex<HubInner>>,
    match_timeout: Duration,
}

struct HubInner {
    waiting: Option<Waiter>,
    endpoints: HashMap<PeerId, Endpoint>,
    links: HashMap<PeerId, PeerId>,
    inject_failures: u32,
    deny_media: bool,
}

struct Waiter {
    id: PeerId,
    reply: oneshot::Sender<PeerId>,
}

struct Endpoint {
    events: Sender<ServiceEvent>,
    stream: Option<StreamHandle>,
}

impl LoopbackHub {
    pub fn new(match_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HubInner {
                waiting: None,
                endpoints: HashMap::new(),
                links: HashMap::new(),
                inject_failures: 0,
                deny_media: false,
            })),
            match_timeout,
        }
    }

    /// Register a new endpoint with the hub.
    pub async fn endpoint(&self) -> LoopbackService {
        let id = PeerId::new();
        let (events_tx, events_rx) = mpsc::channel::<ServiceEvent>(EVENT_BUFFER);
        self.inner.lock().await.endpoints.insert(
            id,
            Endpoint {
                events: events_tx,
                stream: None,
            },
        );
        debug!("loopback endpoint {} registered", id);
        LoopbackService {
            id,
            hub: self.inner.clone(),
            match_timeout: self.match_timeout,
            events_rx: Some(events_rx),
            torn_down: AtomicBool::new(false),
            audio_enabled: AtomicBool::new(true),
            video_enabled: AtomicBool::new(true),
        }
    }

    /// Make the next `n` `request_peer` calls fail with a signaling error.
    pub async fn inject_request_failures(&self, n: u32) {
        self.inner.lock().await.inject_failures = n;
    }

    /// Make `acquire_local_media` fail, simulating denied permissions.
    pub async fn deny_media(&self, deny: bool) {
        self.inner.lock().await.deny_media = deny;
    }
}

impl HubInner {
    fn notify(&self, target: PeerId, event: ServiceEvent) {
        if let Some(endpoint) = self.endpoints.get(&target) {
            if let Err(e) = endpoint.events.try_send(event) {
                warn!("loopback event to {} dropped: {}", target, e);
            }
        }
    }

    fn pair(&mut self, a: PeerId, b: PeerId) {
        self.links.insert(a, b);
        self.links.insert(b, a);
        for (me, other) in [(a, b), (b, a)] {
            if let Some(stream) = self.endpoints.get(&other).and_then(|e| e.stream) {
                self.notify(
                    me,
                    ServiceEvent::StreamAttached {
                        peer: other,
                        stream,
                    },
                );
            }
            self.notify(
                me,
                ServiceEvent::StateChanged {
                    peer: other,
                    state: ConnectionState::Connected,
                },
            );
        }
        info!("loopback paired {} <-> {}", a, b);
    }

    fn unlink(&mut self, from: PeerId) {
        if let Some(other) = self.links.remove(&from) {
            self.links.remove(&other);
            self.notify(
                other,
                ServiceEvent::StateChanged {
                    peer: from,
                    state: ConnectionState::Closed,
                },
            );
        }
    }
}

/// One client's view of the hub.
pub struct LoopbackService {
    id: PeerId,
    hub: Arc<Mutex<HubInner>>,
    match_timeout: Duration,
    events_rx: Option<Receiver<ServiceEvent>>,
    torn_down: AtomicBool,
    audio_enabled: AtomicBool,
    video_enabled: AtomicBool,
}

impl LoopbackService {
    pub fn id(&self) -> PeerId {
        self.id
    }
}

#[async_trait]
impl PeerService for LoopbackService {
    async fn acquire_local_media(&self) -> Result<StreamHandle, ServiceError> {
        let mut inner = self.hub.lock().await;
        if inner.deny_media {
            return Err(ServiceError::MediaAccess("permission denied".into()));
        }
        let stream = StreamHandle::new();
        match inner.endpoints.get_mut(&self.id) {
            Some(endpoint) => endpoint.stream = Some(stream),
            None => return Err(ServiceError::Closed),
        }
        trace!("endpoint {} acquired local stream {:?}", self.id, stream);
        Ok(stream)
    }

    async fn request_peer(&self) -> Result<PeerId, ServiceError> {
        if self.torn_down.load(Ordering::SeqCst) {
            return Err(ServiceError::Closed);
        }
        let reply = {
            let mut inner = self.hub.lock().await;
            if inner.inject_failures > 0 {
                inner.inject_failures -= 1;
                return Err(ServiceError::Signaling("injected failure".into()));
            }
            match inner.waiting.take() {
                Some(waiter) if waiter.id != self.id => {
                    let other = waiter.id;
                    inner.pair(other, self.id);
                    let _ = waiter.reply.send(self.id);
                    return Ok(other);
                }
                // nobody else waiting, register ourselves
                _ => {
                    let (tx, rx) = oneshot::channel();
                    inner.waiting = Some(Waiter {
                        id: self.id,
                        reply: tx,
                    });
                    rx
                }
            }
        };
        match tokio::time::timeout(self.match_timeout, reply).await {
            Ok(Ok(peer)) => Ok(peer),
            Ok(Err(_)) => Err(ServiceError::Signaling("hub went away".into())),
            Err(_) => {
                let mut inner = self.hub.lock().await;
                if inner.waiting.as_ref().map(|w| w.id) == Some(self.id) {
                    inner.waiting = None;
                }
                Err(ServiceError::NoPeerAvailable)
            }
        }
    }

    async fn remote_stream(&self, peer: PeerId) -> Option<StreamHandle> {
        let inner = self.hub.lock().await;
        if inner.links.get(&self.id) != Some(&peer) {
            return None;
        }
        inner.endpoints.get(&peer).and_then(|e| e.stream)
    }

    async fn send_message(&self, peer: PeerId, text: &str) -> Result<(), ServiceError> {
        let inner = self.hub.lock().await;
        if inner.links.get(&self.id) != Some(&peer) {
            return Err(ServiceError::Signaling(format!("not linked to {}", peer)));
        }
        inner.notify(
            peer,
            ServiceEvent::Message {
                peer: self.id,
                text: text.to_string(),
            },
        );
        Ok(())
    }

    async fn disconnect(&self, peer: PeerId) {
        let mut inner = self.hub.lock().await;
        if inner.links.get(&self.id) == Some(&peer) {
            inner.unlink(self.id);
        }
    }

    async fn set_audio_enabled(&self, enabled: bool) {
        self.audio_enabled.store(enabled, Ordering::SeqCst);
        debug!("endpoint {} audio enabled: {}", self.id, enabled);
    }

    async fn set_video_enabled(&self, enabled: bool) {
        self.video_enabled.store(enabled, Ordering::SeqCst);
        debug!("endpoint {} video enabled: {}", self.id, enabled);
    }

    fn take_events(&mut self) -> Option<Receiver<ServiceEvent>> {
        self.events_rx.take()
    }

    async fn teardown(&self) {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut inner = self.hub.lock().await;
        inner.unlink(self.id);
        if inner.waiting.as_ref().map(|w| w.id) == Some(self.id) {
            inner.waiting = None;
        }
        inner.endpoints.remove(&self.id);
        info!("loopback endpoint {} torn down", self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pairs_two_endpoints() {
        let hub = LoopbackHub::new(Duration::from_secs(1));
        let a = hub.endpoint().await;
        let b = hub.endpoint().await;
        a.acquire_local_media().await.unwrap();
        b.acquire_local_media().await.unwrap();

        let (ra, rb) = tokio::join!(a.request_peer(), b.request_peer());
        assert_eq!(ra.unwrap(), b.id());
        assert_eq!(rb.unwrap(), a.id());
        assert!(a.remote_stream(b.id()).await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn lone_endpoint_times_out() {
        let hub = LoopbackHub::new(Duration::from_millis(100));
        let a = hub.endpoint().await;
        assert_eq!(a.request_peer().await, Err(ServiceError::NoPeerAvailable));
    }

    #[tokio::test]
    async fn routes_messages_to_linked_peer() {
        let hub = LoopbackHub::new(Duration::from_secs(1));
        let a = hub.endpoint().await;
        let mut b = hub.endpoint().await;
        let mut b_events = b.take_events().unwrap();
        let (ra, _rb) = tokio::join!(a.request_peer(), b.request_peer());
        let peer = ra.unwrap();

        a.send_message(peer, "hi").await.unwrap();
        loop {
            match b_events.recv().await.unwrap() {
                ServiceEvent::Message { peer, text } => {
                    assert_eq!(peer, a.id());
                    assert_eq!(text, "hi");
                    break;
                }
                _ => continue,
            }
        }
    }

    #[tokio::test]
    async fn disconnect_notifies_other_side() {
        let hub = LoopbackHub::new(Duration::from_secs(1));
        let a = hub.endpoint().await;
        let mut b = hub.endpoint().await;
        let mut b_events = b.take_events().unwrap();
        let (ra, _rb) = tokio::join!(a.request_peer(), b.request_peer());

        a.disconnect(ra.unwrap()).await;
        loop {
            match b_events.recv().await.unwrap() {
                ServiceEvent::StateChanged { peer, state } => {
                    assert_eq!(peer, a.id());
                    if state.is_terminal() {
                        break;
                    }
                }
                _ => continue,
            }
        }
    }

    #[tokio::test]
    async fn teardown_is_idempotent() {
        let hub = LoopbackHub::new(Duration::from_secs(1));
        let a = hub.endpoint().await;
        a.teardown().await;
        a.teardown().await;
        assert_eq!(a.request_peer().await, Err(ServiceError::Closed));
    }
}
