use std::sync::Arc;

use cove_call_core::{now_ms, Call, CallError, CallId, CallStatus, CallType, ConversationId, UserId};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, info};

/// How long a call may ring before the reaper force-ends it.
pub const DEFAULT_RING_TIMEOUT_MS: i64 = 60 * 1000;

/// Authoritative record of who is in which call, in what state.
///
/// The `by_conversation` index is the single point of admission for new
/// calls: the entry is taken atomically, so two clients racing to start
/// a call in the same conversation get exactly one winner and one
/// `CallInProgress`. Ended calls stay in `calls` for later lookup but
/// release their conversation slot immediately.
#[derive(Clone)]
pub struct CallStore {
    calls: Arc<DashMap<CallId, Call>>,
    by_conversation: Arc<DashMap<ConversationId, CallId>>,
    ring_timeout_ms: i64,
}

impl CallStore {
    pub fn new(ring_timeout_ms: i64) -> Self {
        Self {
            calls: Arc::new(DashMap::new()),
            by_conversation: Arc::new(DashMap::new()),
            ring_timeout_ms,
        }
    }

    /// Create a new ringing call for the conversation. Fails with
    /// `CallInProgress` while any non-ended call occupies the slot.
    pub fn initiate(
        &self,
        conversation_id: ConversationId,
        initiator_id: UserId,
        call_type: CallType,
    ) -> Result<Call, CallError> {
        match self.by_conversation.entry(conversation_id) {
            Entry::Occupied(mut slot) => {
                // The index can lag behind a call the reaper or a leave
                // already ended; only a live call blocks admission.
                let live = self
                    .calls
                    .get(slot.get())
                    .map(|call| !call.is_ended())
                    .unwrap_or(false);
                if live {
                    return Err(CallError::CallInProgress);
                }
                let call = Call::new(conversation_id, initiator_id, call_type);
                self.calls.insert(call.id, call.clone());
                slot.insert(call.id);
                info!(call = %call.id, conversation = %conversation_id, "call initiated");
                Ok(call)
            }
            Entry::Vacant(slot) => {
                let call = Call::new(conversation_id, initiator_id, call_type);
                self.calls.insert(call.id, call.clone());
                slot.insert(call.id);
                info!(call = %call.id, conversation = %conversation_id, "call initiated");
                Ok(call)
            }
        }
    }

    /// Append the user and activate the call. Re-joining is a no-op,
    /// not an error; a direct call never takes a third participant.
    pub fn join(&self, call_id: CallId, user_id: UserId) -> Result<Call, CallError> {
        let mut call = self.calls.get_mut(&call_id).ok_or(CallError::CallNotFound)?;
        if call.is_ended() {
            return Err(CallError::CallEnded);
        }
        if call.is_participant(user_id) {
            return Ok(call.clone());
        }
        if call.call_type == CallType::Direct && call.participants.len() >= 2 {
            return Err(CallError::CallInProgress);
        }
        call.participants.push(user_id);
        call.status = CallStatus::Active;
        info!(call = %call_id, user = %user_id, "participant joined");
        Ok(call.clone())
    }

    /// Remove the user. An empty participant set, or any leave on a
    /// direct call, ends the call. No-op when the call is absent or
    /// already ended.
    pub fn leave(&self, call_id: CallId, user_id: UserId) {
        let released = {
            let Some(mut call) = self.calls.get_mut(&call_id) else {
                return;
            };
            if call.is_ended() {
                return;
            }
            call.participants.retain(|id| *id != user_id);
            if call.participants.is_empty() || call.call_type == CallType::Direct {
                call.status = CallStatus::Ended;
                call.ended_at_ms = Some(now_ms());
                info!(call = %call_id, user = %user_id, "participant left, call ended");
                Some(call.conversation_id)
            } else {
                debug!(
                    call = %call_id,
                    user = %user_id,
                    remaining = call.participants.len(),
                    "participant left"
                );
                None
            }
        };
        if let Some(conversation_id) = released {
            self.release_slot(conversation_id, call_id);
        }
    }

    /// Refusing a direct call ends it for the caller too. For group
    /// calls a decline is a pure no-op: nothing is recorded, so the
    /// decliner keeps seeing the ring until the call ends or they join.
    pub fn decline(&self, call_id: CallId, user_id: UserId) {
        let released = {
            let Some(mut call) = self.calls.get_mut(&call_id) else {
                return;
            };
            if call.is_ended() || call.call_type == CallType::Group {
                return;
            }
            call.status = CallStatus::Ended;
            call.ended_at_ms = Some(now_ms());
            info!(call = %call_id, user = %user_id, "call declined");
            Some(call.conversation_id)
        };
        if let Some(conversation_id) = released {
            self.release_slot(conversation_id, call_id);
        }
    }

    /// The non-ended call occupying the conversation slot, if any.
    pub fn active_call(&self, conversation_id: ConversationId) -> Option<Call> {
        let call_id = *self.by_conversation.get(&conversation_id)?;
        self.calls
            .get(&call_id)
            .filter(|call| !call.is_ended())
            .map(|call| call.clone())
    }

    pub fn call(&self, call_id: CallId) -> Option<Call> {
        self.calls.get(&call_id).map(|call| call.clone())
    }

    /// Ringing calls within the given conversations that the user has
    /// not yet joined. This is how callees discover a ring; there is no
    /// push path.
    pub fn incoming_calls(&self, conversations: &[ConversationId], user_id: UserId) -> Vec<Call> {
        conversations
            .iter()
            .filter_map(|conversation_id| self.active_call(*conversation_id))
            .filter(|call| call.status == CallStatus::Ringing && !call.is_participant(user_id))
            .collect()
    }

    /// Force-end calls that have been ringing past the timeout. Safe to
    /// run concurrently and repeatedly; active and ended calls are
    /// never touched. Returns the number of calls ended.
    pub fn sweep_stale_calls(&self) -> usize {
        self.sweep_stale_calls_at(now_ms())
    }

    fn sweep_stale_calls_at(&self, now: i64) -> usize {
        // Collect first so no map guard is held while mutating.
        let stale: Vec<(CallId, ConversationId)> = self
            .calls
            .iter()
            .filter(|entry| {
                entry.status == CallStatus::Ringing && now - entry.started_at_ms > self.ring_timeout_ms
            })
            .map(|entry| (entry.id, entry.conversation_id))
            .collect();

        let mut ended = 0;
        for (call_id, conversation_id) in stale {
            let Some(mut call) = self.calls.get_mut(&call_id) else {
                continue;
            };
            // Re-check under the guard: a join may have raced the sweep.
            if call.status != CallStatus::Ringing {
                continue;
            }
            call.status = CallStatus::Ended;
            call.ended_at_ms = Some(now);
            drop(call);
            self.release_slot(conversation_id, call_id);
            info!(call = %call_id, "stale ringing call force-ended");
            ended += 1;
        }
        ended
    }

    fn release_slot(&self, conversation_id: ConversationId, call_id: CallId) {
        self.by_conversation
            .remove_if(&conversation_id, |_, occupant| *occupant == call_id);
    }
}
