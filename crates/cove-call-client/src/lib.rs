//! Client-resident call machinery: the signaling RPC client, the
//! per-peer negotiation orchestrator and the call coordinator.
//!
//! Nothing here touches real media or network hardware directly; peer
//! connections and capture devices sit behind the capability traits in
//! [`rtc`], so the negotiation logic runs the same against fakes in
//! tests and a real WebRTC stack in the app.

pub mod coordinator;
pub mod orchestrator;
pub mod rpc;
pub mod rtc;

pub use coordinator::{ActiveCallState, CallCoordinator, CallPrompt, CallState};
pub use orchestrator::{CallOrchestrator, NegotiationState};
pub use rpc::{HttpSignalingApi, SignalingApi};
pub use rtc::{
    ConnectionState, IceCandidate, IceServer, LocalMedia, MediaDevices, PeerConnectionApi,
    PeerConnectionFactory, PeerEvent, RemoteMedia, RtcConfig, SessionDescription,
};
