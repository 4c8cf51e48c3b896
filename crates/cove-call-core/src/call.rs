use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::ids::{CallId, ConversationId, UserId};

/// Current millisecond timestamp; all call/signal times use this clock.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    Ringing,
    Active,
    Ended,
}

/// Fixed at creation from the conversation's group-ness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallType {
    Direct,
    Group,
}

/// Authoritative server-side record of one call attempt or session.
///
/// `participants` keeps insertion order (= join order) and never holds
/// duplicates. Status only ever moves forward: ringing -> active ->
/// ended, or ringing -> ended on decline/timeout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Call {
    pub id: CallId,
    pub conversation_id: ConversationId,
    pub initiator_id: UserId,
    pub participants: Vec<UserId>,
    pub status: CallStatus,
    pub call_type: CallType,
    pub started_at_ms: i64,
    pub ended_at_ms: Option<i64>,
}

impl Call {
    pub fn new(conversation_id: ConversationId, initiator_id: UserId, call_type: CallType) -> Self {
        Self {
            id: CallId::generate(),
            conversation_id,
            initiator_id,
            participants: vec![initiator_id],
            status: CallStatus::Ringing,
            call_type,
            started_at_ms: now_ms(),
            ended_at_ms: None,
        }
    }

    pub fn is_participant(&self, user_id: UserId) -> bool {
        self.participants.contains(&user_id)
    }

    pub fn is_ended(&self) -> bool {
        self.status == CallStatus::Ended
    }
}

/// Display data for one user, resolved through the user directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub display_name: String,
    pub avatar_color: String,
}

/// A call enriched with participant/initiator display data. Users the
/// directory cannot resolve are dropped from the projection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallView {
    #[serde(flatten)]
    pub call: Call,
    pub participants: Vec<UserProfile>,
    pub initiator: Option<UserProfile>,
}
