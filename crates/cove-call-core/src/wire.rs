//! Request/response bodies exchanged between the switchboard HTTP
//! surface and its clients.

use serde::{Deserialize, Serialize};

use crate::error::CallError;
use crate::ids::{CallId, ConversationId, UserId};
use crate::signal::SignalKind;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitiateCallRequest {
    pub conversation_id: ConversationId,
    pub initiator_id: UserId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitiateCallResponse {
    pub call_id: CallId,
}

/// Body for join/leave/decline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallActionRequest {
    pub user_id: UserId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendSignalRequest {
    pub from_user_id: UserId,
    pub to_user_id: UserId,
    pub kind: SignalKind,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignalQuery {
    pub user_id: UserId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepResponse {
    pub expired_signals: usize,
    pub stale_calls: usize,
}

/// Error body carried alongside a non-2xx status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl ErrorBody {
    pub fn new(err: &CallError) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }

    pub fn into_error(self) -> CallError {
        CallError::from_code(&self.code, self.message)
    }
}
