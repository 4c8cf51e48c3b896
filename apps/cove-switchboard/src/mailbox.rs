use std::sync::Arc;

use cove_call_core::{now_ms, CallId, Signal, SignalId, SignalKind, UserId};
use dashmap::DashMap;
use tracing::{debug, trace};

/// Store-and-forward mailbox for opaque negotiation signals.
///
/// No deduplication and no ordering guarantee beyond creation time;
/// several signals for the same negotiation step are legal. Readers
/// never see an expired signal even while it still sits in the map.
#[derive(Clone)]
pub struct SignalMailbox {
    signals: Arc<DashMap<SignalId, Signal>>,
}

impl SignalMailbox {
    pub fn new() -> Self {
        Self {
            signals: Arc::new(DashMap::new()),
        }
    }

    pub fn send(
        &self,
        call_id: CallId,
        from_user_id: UserId,
        to_user_id: UserId,
        kind: SignalKind,
        payload: serde_json::Value,
    ) -> Signal {
        let signal = Signal::new(call_id, from_user_id, to_user_id, kind, payload);
        trace!(
            signal = %signal.id,
            call = %call_id,
            from = %from_user_id,
            to = %to_user_id,
            ?kind,
            "signal enqueued"
        );
        self.signals.insert(signal.id, signal.clone());
        signal
    }

    /// Non-expired signals addressed to the user for the call, oldest
    /// first. Creation order is a convenience, not a contract.
    pub fn signals_for(&self, call_id: CallId, user_id: UserId) -> Vec<Signal> {
        let now = now_ms();
        let mut pending: Vec<Signal> = self
            .signals
            .iter()
            .filter(|entry| {
                entry.call_id == call_id && entry.to_user_id == user_id && !entry.is_expired(now)
            })
            .map(|entry| entry.clone())
            .collect();
        pending.sort_by_key(|signal| signal.created_at_ms);
        pending
    }

    /// Consumption acknowledgment; absent ids are ignored.
    pub fn delete(&self, signal_id: SignalId) {
        self.signals.remove(&signal_id);
    }

    /// Physically remove expired signals. Idempotent; returns the
    /// number removed.
    pub fn sweep_expired(&self) -> usize {
        let now = now_ms();
        let before = self.signals.len();
        self.signals.retain(|_, signal| !signal.is_expired(now));
        let removed = before - self.signals.len();
        if removed > 0 {
            debug!(removed, "expired signals reaped");
        }
        removed
    }
}

impl Default for SignalMailbox {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn signal_is_delivered_then_deleted_on_ack() {
        let mailbox = SignalMailbox::new();
        let call = CallId::generate();
        let a = UserId::generate();
        let b = UserId::generate();

        let sent = mailbox.send(call, a, b, SignalKind::Offer, json!({"sdp": "v=0"}));

        let pending = mailbox.signals_for(call, b);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, sent.id);
        assert_eq!(pending[0].payload, json!({"sdp": "v=0"}));

        mailbox.delete(sent.id);
        assert!(mailbox.signals_for(call, b).is_empty());
    }

    #[test]
    fn signals_are_scoped_to_recipient_and_call() {
        let mailbox = SignalMailbox::new();
        let call = CallId::generate();
        let other_call = CallId::generate();
        let a = UserId::generate();
        let b = UserId::generate();

        mailbox.send(call, a, b, SignalKind::Offer, json!({}));
        mailbox.send(other_call, a, b, SignalKind::Offer, json!({}));

        assert!(mailbox.signals_for(call, a).is_empty());
        assert_eq!(mailbox.signals_for(call, b).len(), 1);
        assert_eq!(mailbox.signals_for(other_call, b).len(), 1);
    }

    #[test]
    fn expired_signals_are_invisible_before_the_sweep() {
        let mailbox = SignalMailbox::new();
        let call = CallId::generate();
        let a = UserId::generate();
        let b = UserId::generate();

        let sent = mailbox.send(call, a, b, SignalKind::IceCandidate, json!({}));
        mailbox.signals.get_mut(&sent.id).unwrap().expires_at_ms = now_ms() - 1;

        assert!(mailbox.signals_for(call, b).is_empty());

        assert_eq!(mailbox.sweep_expired(), 1);
        assert_eq!(mailbox.sweep_expired(), 0);
    }

    #[test]
    fn duplicate_steps_are_all_kept_in_creation_order() {
        let mailbox = SignalMailbox::new();
        let call = CallId::generate();
        let a = UserId::generate();
        let b = UserId::generate();

        let first = mailbox.send(call, a, b, SignalKind::IceCandidate, json!({"n": 1}));
        let second = mailbox.send(call, a, b, SignalKind::IceCandidate, json!({"n": 2}));
        // Force distinct timestamps in case both landed in one tick.
        mailbox.signals.get_mut(&second.id).unwrap().created_at_ms = first.created_at_ms + 1;

        let pending = mailbox.signals_for(call, b);
        assert_eq!(pending.len(), 2);
        assert!(pending[0].created_at_ms <= pending[1].created_at_ms);
    }
}
