//! Capability seam over the platform's peer-connection and media APIs.
//!
//! The orchestrator only ever talks to these traits, so its negotiation
//! logic is testable without network or capture hardware.

use std::sync::Arc;

use async_trait::async_trait;
use cove_call_core::{CallResult, UserId};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Coarse connection health reported by a peer connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

/// An SDP description as exchanged through the mailbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: String,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: "offer".into(),
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: "answer".into(),
            sdp: sdp.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    pub candidate: String,
    pub sdp_mid: Option<String>,
    pub sdp_mline_index: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IceServer {
    pub urls: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl IceServer {
    pub fn stun(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            username: None,
            credential: None,
        }
    }

    pub fn turn(
        url: impl Into<String>,
        username: impl Into<String>,
        credential: impl Into<String>,
    ) -> Self {
        Self {
            urls: vec![url.into()],
            username: Some(username.into()),
            credential: Some(credential.into()),
        }
    }
}

/// NAT traversal is handled entirely by externally configured servers;
/// this list is passed through to the platform untouched.
#[derive(Debug, Clone)]
pub struct RtcConfig {
    pub ice_servers: Vec<IceServer>,
}

impl Default for RtcConfig {
    fn default() -> Self {
        Self {
            ice_servers: vec![
                IceServer::stun("stun:stun.l.google.com:19302"),
                IceServer::stun("stun:stun1.l.google.com:19302"),
                IceServer::stun("stun:stun2.l.google.com:19302"),
                IceServer::stun("stun:openrelay.metered.ca:80"),
                IceServer::turn(
                    "turn:openrelay.metered.ca:80",
                    "openrelayproject",
                    "openrelayproject",
                ),
                IceServer::turn(
                    "turn:openrelay.metered.ca:443",
                    "openrelayproject",
                    "openrelayproject",
                ),
                IceServer::turn(
                    "turn:openrelay.metered.ca:443?transport=tcp",
                    "openrelayproject",
                    "openrelayproject",
                ),
            ],
        }
    }
}

/// Capture constraints used when a call carries video.
pub const VIDEO_IDEAL_WIDTH: u32 = 1280;
pub const VIDEO_MAX_WIDTH: u32 = 1920;
pub const VIDEO_IDEAL_HEIGHT: u32 = 720;
pub const VIDEO_MAX_HEIGHT: u32 = 1080;
pub const VIDEO_FRAME_RATE: u32 = 30;

/// Events a live peer connection pushes back at the orchestrator.
#[derive(Clone)]
pub enum PeerEvent {
    /// A locally gathered candidate that must be relayed to the peer.
    IceCandidate(IceCandidate),
    /// The peer's media stream arrived (the platform's track event).
    RemoteTrack(Arc<dyn RemoteMedia>),
    StateChanged(ConnectionState),
}

/// One platform peer connection.
///
/// `create_offer`/`create_answer` also install the local description;
/// `restart_ice` renegotiates the network path without dropping the
/// logical connection.
#[async_trait]
pub trait PeerConnectionApi: Send + Sync {
    async fn create_offer(&self) -> CallResult<SessionDescription>;
    async fn create_answer(&self) -> CallResult<SessionDescription>;
    async fn set_remote_description(&self, description: SessionDescription) -> CallResult<()>;
    async fn add_ice_candidate(&self, candidate: IceCandidate) -> CallResult<()>;
    async fn restart_ice(&self) -> CallResult<()>;
    async fn add_local_tracks(&self, media: Arc<dyn LocalMedia>) -> CallResult<()>;
    fn connection_state(&self) -> ConnectionState;
    async fn close(&self);
}

/// Creates peer connections wired to push their events into the
/// orchestrator's event channel, tagged with the remote user id.
pub trait PeerConnectionFactory: Send + Sync {
    fn create(
        &self,
        peer_id: UserId,
        events: mpsc::UnboundedSender<(UserId, PeerEvent)>,
    ) -> Arc<dyn PeerConnectionApi>;
}

/// The local capture stream, shared by reference across every peer
/// link of one call. Enable/disable flags act on the underlying tracks
/// and therefore affect all links at once.
pub trait LocalMedia: Send + Sync {
    fn has_video(&self) -> bool;
    fn audio_enabled(&self) -> bool;
    fn video_enabled(&self) -> bool;
    fn set_audio_enabled(&self, enabled: bool);
    fn set_video_enabled(&self, enabled: bool);
    /// Stop all tracks and release the devices. Idempotent.
    fn stop(&self);
}

/// A peer's incoming media stream as handed over by the platform.
/// Opaque to the negotiation logic; the UI attaches it for playback.
pub trait RemoteMedia: Send + Sync {
    fn stream_id(&self) -> &str;
}

/// Access to capture devices. Denied permission and absent hardware
/// must stay distinguishable for the UI.
#[async_trait]
pub trait MediaDevices: Send + Sync {
    async fn acquire(&self, video: bool) -> CallResult<Arc<dyn LocalMedia>>;
}
