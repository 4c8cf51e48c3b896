//! Shared domain and wire types for the cove call subsystem.
//!
//! The switchboard server and the client-resident call machinery both
//! speak in these types; signal payloads stay opaque JSON end to end.

pub mod call;
pub mod error;
pub mod ids;
pub mod signal;
pub mod wire;

pub use call::{now_ms, Call, CallStatus, CallType, CallView, UserProfile};
pub use error::{CallError, CallResult};
pub use ids::{CallId, ConversationId, SignalId, UserId};
pub use signal::{Signal, SignalKind, SIGNAL_TTL_MS};
