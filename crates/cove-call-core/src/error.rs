use thiserror::Error;

pub type CallResult<T> = Result<T, CallError>;

/// Error taxonomy shared by the switchboard and the client machinery.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
    #[error("a call is already in progress for this conversation")]
    CallInProgress,
    #[error("call not found")]
    CallNotFound,
    #[error("call has ended")]
    CallEnded,
    #[error("conversation not found")]
    ConversationNotFound,
    #[error("media access denied: {0}")]
    MediaAccessDenied(String),
    #[error("media device not found: {0}")]
    MediaDeviceNotFound(String),
    #[error("negotiation failed: {0}")]
    NegotiationFailed(String),
    #[error("malformed signal payload: {0}")]
    SignalDecodeError(String),
    #[error("transport error: {0}")]
    Transport(String),
}

impl CallError {
    /// Stable wire code carried in HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            CallError::CallInProgress => "call_in_progress",
            CallError::CallNotFound => "call_not_found",
            CallError::CallEnded => "call_ended",
            CallError::ConversationNotFound => "conversation_not_found",
            CallError::MediaAccessDenied(_) => "media_access_denied",
            CallError::MediaDeviceNotFound(_) => "media_device_not_found",
            CallError::NegotiationFailed(_) => "negotiation_failed",
            CallError::SignalDecodeError(_) => "signal_decode_error",
            CallError::Transport(_) => "transport",
        }
    }

    /// Rebuild an error from a wire code; unknown codes degrade to
    /// `Transport` so callers still see the message.
    pub fn from_code(code: &str, message: String) -> Self {
        match code {
            "call_in_progress" => CallError::CallInProgress,
            "call_not_found" => CallError::CallNotFound,
            "call_ended" => CallError::CallEnded,
            "conversation_not_found" => CallError::ConversationNotFound,
            "media_access_denied" => CallError::MediaAccessDenied(message),
            "media_device_not_found" => CallError::MediaDeviceNotFound(message),
            "negotiation_failed" => CallError::NegotiationFailed(message),
            "signal_decode_error" => CallError::SignalDecodeError(message),
            _ => CallError::Transport(message),
        }
    }
}
