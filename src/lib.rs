#[macro_use]
extern crate log;

pub mod config;
pub mod controller;
pub mod logger;
pub mod service;
pub mod session;
pub mod storage;
pub mod video;
pub mod visitors;

pub use anyhow::Result;

pub use controller::{ChatHandle, ChatSnapshot, ControllerConfig, Notice, NoticeLevel};
pub use service::{PeerService, ServiceError, ServiceEvent};
pub use session::{ChatMessage, ConnectionState, MessageSender, PeerId, SessionPhase, StreamHandle};
