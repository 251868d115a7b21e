use std::sync::Arc;
use std::time::Duration;

use strum_macros::IntoStaticStr;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::service::{PeerService, ServiceError, ServiceEvent};
use crate::session::{ChatMessage, ConnectionState, MessageSender, PeerId, SessionPhase, StreamHandle};

const COMMAND_BUFFER: usize = 16;
const NOTICE_BUFFER: usize = 16;
const MATCH_BUFFER: usize = 4;
/// Log a warning every this many consecutive matchmaking failures, so a
/// sustained signaling outage shows up in logs.
const FAILURE_WARN_EVERY: u32 = 20;

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Fixed delay between matchmaking retries. No backoff growth, no
    /// attempt cap.
    pub retry_delay: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            retry_delay: Duration::from_secs(3),
        }
    }
}

/// Everything the UI needs to render the chat page. Published through a
/// watch channel after every state change.
#[derive(Debug, Clone)]
pub struct ChatSnapshot {
    pub phase: SessionPhase,
    pub peer: Option<PeerId>,
    pub local_stream: Option<StreamHandle>,
    pub remote_stream: Option<StreamHandle>,
    pub messages: Vec<ChatMessage>,
    pub audio_enabled: bool,
    pub video_enabled: bool,
}

impl Default for ChatSnapshot {
    fn default() -> Self {
        Self {
            phase: SessionPhase::Idle,
            peer: None,
            local_stream: None,
            remote_stream: None,
            messages: Vec::new(),
            audio_enabled: true,
            video_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoStaticStr)]
pub enum NoticeLevel {
    Info,
    Warn,
    Error,
}

/// A user-visible notification. Rendering is up to the UI shell.
#[derive(Debug, Clone)]
pub struct Notice {
    pub level: NoticeLevel,
    pub text: String,
}

#[derive(Debug)]
enum ChatCommand {
    SendMessage(String),
    ToggleAudio,
    ToggleVideo,
    Skip,
    End,
}

struct MatchOutcome {
    epoch: u64,
    result: Result<PeerId, ServiceError>,
}

/// Handle to a running chat session controller.
pub struct ChatHandle {
    commands: Sender<ChatCommand>,
    pub snapshot: watch::Receiver<ChatSnapshot>,
    pub notices: Receiver<Notice>,
    task: JoinHandle<()>,
}

impl ChatHandle {
    /// Start a controller over the given service and drive it on a spawned
    /// task. The controller immediately begins acquiring local media and
    /// seeking a peer.
    pub fn spawn(mut service: Box<dyn PeerService>, config: &ControllerConfig) -> ChatHandle {
        let events = match service.take_events() {
            Some(rx) => rx,
            None => {
                warn!("service event channel was already taken, controller will see no events");
                let (tx, rx) = mpsc::channel(1);
                drop(tx);
                rx
            }
        };
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_BUFFER);
        let (notices_tx, notices_rx) = mpsc::channel(NOTICE_BUFFER);
        let (matches_tx, matches_rx) = mpsc::channel(MATCH_BUFFER);
        let (snapshot_tx, snapshot_rx) = watch::channel(ChatSnapshot::default());

        let controller = ChatController {
            service: Arc::from(service),
            events,
            commands: commands_rx,
            matches: matches_rx,
            matches_tx,
            snapshot_tx,
            notices_tx,
            retry_delay: config.retry_delay,
            epoch: 0,
            failures: 0,
            state: ChatSnapshot::default(),
        };
        let task = tokio::spawn(controller.run());

        ChatHandle {
            commands: commands_tx,
            snapshot: snapshot_rx,
            notices: notices_rx,
            task,
        }
    }

    pub fn current(&self) -> ChatSnapshot {
        self.snapshot.borrow().clone()
    }

    pub async fn send_message(&self, text: impl Into<String>) {
        let _ = self
            .commands
            .send(ChatCommand::SendMessage(text.into()))
            .await;
    }

    pub async fn toggle_audio(&self) {
        let _ = self.commands.send(ChatCommand::ToggleAudio).await;
    }

    pub async fn toggle_video(&self) {
        let _ = self.commands.send(ChatCommand::ToggleVideo).await;
    }

    /// Drop the current partner and look for a new one.
    pub async fn skip(&self) {
        let _ = self.commands.send(ChatCommand::Skip).await;
    }

    /// Leave the chat entirely and tear the service down.
    pub async fn end(&self) {
        let _ = self.commands.send(ChatCommand::End).await;
    }

    /// Wait for the controller task to finish.
    pub async fn join(self) -> crate::Result<()> {
        self.task.await?;
        Ok(())
    }
}

struct ChatController {
    service: Arc<dyn PeerService>,
    events: Receiver<ServiceEvent>,
    commands: Receiver<ChatCommand>,
    matches: Receiver<MatchOutcome>,
    matches_tx: Sender<MatchOutcome>,
    snapshot_tx: watch::Sender<ChatSnapshot>,
    notices_tx: Sender<Notice>,
    retry_delay: Duration,
    /// Matchmaking epoch. Bumped on every entry into SeekingPeer so that
    /// responses to abandoned requests are discarded.
    epoch: u64,
    failures: u32,
    state: ChatSnapshot,
}

impl ChatController {
    async fn run(mut self) {
        self.set_phase(SessionPhase::AcquiringMedia);
        match self.service.acquire_local_media().await {
            Ok(stream) => {
                debug!("local media acquired: {:?}", stream);
                self.state.local_stream = Some(stream);
                self.publish();
            }
            Err(e) => {
                error!("local media acquisition failed: {}", e);
                self.notify(
                    NoticeLevel::Error,
                    format!("camera/microphone unavailable: {}", e),
                );
                self.set_phase(SessionPhase::MediaFailed);
                self.idle_until_end().await;
                return;
            }
        }

        self.enter_seeking();
        let mut events_open = true;
        loop {
            tokio::select! {
                cmd = self.commands.recv() => match cmd {
                    Some(cmd) => {
                        if self.handle_command(cmd).await {
                            break;
                        }
                    }
                    None => {
                        debug!("all controller handles dropped, shutting down");
                        self.shutdown().await;
                        break;
                    }
                },
                outcome = self.matches.recv() => {
                    if let Some(outcome) = outcome {
                        self.handle_match(outcome).await;
                    }
                },
                event = self.events.recv(), if events_open => match event {
                    Some(event) => self.handle_event(event).await,
                    None => {
                        warn!("service event channel closed");
                        events_open = false;
                    }
                },
            }
        }
    }

    /// Permission errors are terminal for the session attempt; keep
    /// answering commands so the user can still leave.
    async fn idle_until_end(&mut self) {
        while let Some(cmd) = self.commands.recv().await {
            match cmd {
                ChatCommand::End => break,
                other => debug!("ignoring {:?}, no local media", other),
            }
        }
        self.shutdown().await;
    }

    /// Returns true when the controller should exit.
    async fn handle_command(&mut self, cmd: ChatCommand) -> bool {
        match cmd {
            ChatCommand::SendMessage(text) => match (self.state.peer, self.state.phase) {
                (Some(peer), SessionPhase::Connected) => {
                    match self.service.send_message(peer, &text).await {
                        Ok(()) => {
                            self.state
                                .messages
                                .push(ChatMessage::new(MessageSender::Local, text));
                            self.publish();
                        }
                        Err(e) => {
                            warn!("message to {} not delivered: {}", peer, e);
                            self.notify(NoticeLevel::Warn, "message could not be delivered");
                        }
                    }
                }
                _ => debug!("send ignored, no active partner"),
            },
            ChatCommand::ToggleAudio => {
                let enabled = !self.state.audio_enabled;
                self.service.set_audio_enabled(enabled).await;
                self.state.audio_enabled = enabled;
                self.publish();
            }
            ChatCommand::ToggleVideo => {
                let enabled = !self.state.video_enabled;
                self.service.set_video_enabled(enabled).await;
                self.state.video_enabled = enabled;
                self.publish();
            }
            ChatCommand::Skip => {
                if let Some(peer) = self.state.peer.take() {
                    info!("skipping peer {}", peer);
                    self.service.disconnect(peer).await;
                }
                self.notify(NoticeLevel::Info, "searching for a new partner");
                self.enter_seeking();
            }
            ChatCommand::End => {
                self.shutdown().await;
                return true;
            }
        }
        false
    }

    async fn handle_match(&mut self, outcome: MatchOutcome) {
        if outcome.epoch != self.epoch {
            debug!("discarding stale matchmaking response");
            return;
        }
        if self.state.phase != SessionPhase::SeekingPeer {
            debug!("matchmaking response in {:?}, ignoring", self.state.phase);
            return;
        }
        match outcome.result {
            Ok(peer) => {
                info!("matched with peer {}", peer);
                self.failures = 0;
                self.state.peer = Some(peer);
                // the remote stream may have been attached while the match
                // response was in flight
                match self.service.remote_stream(peer).await {
                    Some(stream) => {
                        self.state.remote_stream = Some(stream);
                        self.set_phase(SessionPhase::Connected);
                        self.notify(NoticeLevel::Info, "connected to a new partner");
                    }
                    None => self.set_phase(SessionPhase::Connecting),
                }
            }
            Err(e @ (ServiceError::NoPeerAvailable | ServiceError::Signaling(_))) => {
                self.failures += 1;
                if self.failures % FAILURE_WARN_EVERY == 0 {
                    warn!("matchmaking has failed {} times in a row: {}", self.failures, e);
                } else {
                    debug!("matchmaking attempt failed: {}, retrying", e);
                }
                self.begin_request(self.retry_delay);
            }
            Err(e) => {
                error!("matchmaking failed: {}", e);
                self.notify(NoticeLevel::Error, format!("matchmaking failed: {}", e));
                self.set_phase(SessionPhase::Disconnected);
            }
        }
    }

    async fn handle_event(&mut self, event: ServiceEvent) {
        let Some(active) = self.state.peer else {
            trace!("no active session, discarding {:?}", event);
            return;
        };
        if event.peer() != active {
            debug!("discarding event for non-active peer {}", event.peer());
            return;
        }
        match event {
            ServiceEvent::Message { text, .. } => {
                if self.state.phase == SessionPhase::Connected {
                    self.state
                        .messages
                        .push(ChatMessage::new(MessageSender::Remote, text));
                    self.publish();
                } else {
                    debug!("chat message outside connected phase, dropping");
                }
            }
            ServiceEvent::StreamAttached { stream, .. } => {
                self.state.remote_stream = Some(stream);
                if self.state.phase == SessionPhase::Connecting {
                    self.set_phase(SessionPhase::Connected);
                    self.notify(NoticeLevel::Info, "connected to a new partner");
                } else {
                    self.publish();
                }
            }
            ServiceEvent::StateChanged { state, .. } => {
                if state.is_terminal() {
                    info!("connection to {} is {}", active, <&str>::from(state));
                    self.clear_session();
                    // re-matching is an explicit user action, not automatic
                    self.set_phase(SessionPhase::Disconnected);
                    self.notify(NoticeLevel::Warn, "your partner disconnected");
                } else if state == ConnectionState::Connected
                    && self.state.phase == SessionPhase::Connecting
                {
                    self.set_phase(SessionPhase::Connected);
                    self.notify(NoticeLevel::Info, "connected to a new partner");
                }
            }
        }
    }

    fn enter_seeking(&mut self) {
        self.epoch += 1;
        self.clear_session();
        self.set_phase(SessionPhase::SeekingPeer);
        self.begin_request(Duration::ZERO);
    }

    /// Issue a matchmaking request off the event loop so commands stay
    /// responsive while it is in flight.
    fn begin_request(&self, delay: Duration) {
        let service = self.service.clone();
        let tx = self.matches_tx.clone();
        let epoch = self.epoch;
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let result = service.request_peer().await;
            let _ = tx.send(MatchOutcome { epoch, result }).await;
        });
    }

    async fn shutdown(&mut self) {
        if let Some(peer) = self.state.peer.take() {
            self.service.disconnect(peer).await;
        }
        self.clear_session();
        self.service.teardown().await;
        // anything still in flight is stale now
        self.epoch += 1;
        self.set_phase(SessionPhase::Ended);
        info!("chat session ended");
    }

    fn clear_session(&mut self) {
        self.state.peer = None;
        self.state.remote_stream = None;
        self.state.messages.clear();
    }

    fn set_phase(&mut self, phase: SessionPhase) {
        trace!("phase {:?} -> {:?}", self.state.phase, phase);
        self.state.phase = phase;
        self.publish();
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(self.state.clone());
    }

    fn notify(&self, level: NoticeLevel, text: impl Into<String>) {
        let notice = Notice {
            level,
            text: text.into(),
        };
        if let Err(e) = self.notices_tx.try_send(notice) {
            debug!("notice dropped: {}", e);
        }
    }
}
