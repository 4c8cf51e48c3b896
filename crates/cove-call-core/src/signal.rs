use serde::{Deserialize, Serialize};

use crate::call::now_ms;
use crate::ids::{CallId, SignalId, UserId};

/// Mailbox lifetime of a signal: 5 minutes.
pub const SIGNAL_TTL_MS: i64 = 5 * 60 * 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignalKind {
    Offer,
    Answer,
    IceCandidate,
}

/// One unit of peer-negotiation data relayed through the mailbox.
///
/// The payload is opaque to the server; only the addressed recipient
/// interprets it. A signal past `expires_at_ms` is treated as
/// non-existent by readers even before the reaper removes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub id: SignalId,
    pub call_id: CallId,
    pub from_user_id: UserId,
    pub to_user_id: UserId,
    pub kind: SignalKind,
    pub payload: serde_json::Value,
    pub created_at_ms: i64,
    pub expires_at_ms: i64,
}

impl Signal {
    pub fn new(
        call_id: CallId,
        from_user_id: UserId,
        to_user_id: UserId,
        kind: SignalKind,
        payload: serde_json::Value,
    ) -> Self {
        let created_at_ms = now_ms();
        Self {
            id: SignalId::generate(),
            call_id,
            from_user_id,
            to_user_id,
            kind,
            payload,
            created_at_ms,
            expires_at_ms: created_at_ms + SIGNAL_TTL_MS,
        }
    }

    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.expires_at_ms < now_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn kind_uses_kebab_case_on_the_wire() {
        assert_eq!(
            serde_json::to_string(&SignalKind::IceCandidate).unwrap(),
            "\"ice-candidate\""
        );
        let kind: SignalKind = serde_json::from_str("\"offer\"").unwrap();
        assert_eq!(kind, SignalKind::Offer);
    }

    #[test]
    fn fresh_signal_expires_one_ttl_after_creation() {
        let signal = Signal::new(
            CallId::generate(),
            UserId::generate(),
            UserId::generate(),
            SignalKind::Offer,
            json!({"sdp": "v=0"}),
        );
        assert_eq!(signal.expires_at_ms, signal.created_at_ms + SIGNAL_TTL_MS);
        assert!(!signal.is_expired(signal.created_at_ms));
        assert!(signal.is_expired(signal.expires_at_ms + 1));
    }
}
