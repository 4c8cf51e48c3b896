use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use cove_call_core::wire::{
    CallActionRequest, ErrorBody, InitiateCallRequest, InitiateCallResponse, SendSignalRequest,
    SignalQuery, SweepResponse,
};
use cove_call_core::{
    Call, CallError, CallId, CallView, ConversationId, Signal, SignalId, UserId,
};
use serde_json::json;
use tracing::debug;

use crate::directory::Directory;
use crate::lifecycle::CallStore;
use crate::mailbox::SignalMailbox;

#[derive(Clone)]
pub struct AppState {
    pub calls: CallStore,
    pub mailbox: SignalMailbox,
    pub directory: Arc<dyn Directory>,
}

/// Domain error carried out of a handler; body holds the stable code so
/// clients can rebuild the typed error.
pub struct ApiError(pub CallError);

impl ApiError {
    fn status(&self) -> StatusCode {
        match self.0 {
            CallError::CallInProgress => StatusCode::CONFLICT,
            CallError::CallNotFound | CallError::ConversationNotFound => StatusCode::NOT_FOUND,
            CallError::CallEnded => StatusCode::GONE,
            CallError::SignalDecodeError(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<CallError> for ApiError {
    fn from(err: CallError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(ErrorBody::new(&self.0))).into_response()
    }
}

/// GET /health
pub async fn health_check() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// POST /calls
pub async fn initiate_call(
    State(state): State<AppState>,
    Json(payload): Json<InitiateCallRequest>,
) -> Result<Json<InitiateCallResponse>, ApiError> {
    let conversation = state
        .directory
        .conversation(payload.conversation_id)
        .await
        .ok_or(CallError::ConversationNotFound)?;

    let call_type = if conversation.is_group {
        cove_call_core::CallType::Group
    } else {
        cove_call_core::CallType::Direct
    };

    let call = state
        .calls
        .initiate(payload.conversation_id, payload.initiator_id, call_type)?;
    Ok(Json(InitiateCallResponse { call_id: call.id }))
}

/// POST /calls/{id}/join
pub async fn join_call(
    State(state): State<AppState>,
    Path(call_id): Path<CallId>,
    Json(payload): Json<CallActionRequest>,
) -> Result<StatusCode, ApiError> {
    state.calls.join(call_id, payload.user_id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /calls/{id}/leave
pub async fn leave_call(
    State(state): State<AppState>,
    Path(call_id): Path<CallId>,
    Json(payload): Json<CallActionRequest>,
) -> StatusCode {
    state.calls.leave(call_id, payload.user_id);
    StatusCode::NO_CONTENT
}

/// POST /calls/{id}/decline
pub async fn decline_call(
    State(state): State<AppState>,
    Path(call_id): Path<CallId>,
    Json(payload): Json<CallActionRequest>,
) -> StatusCode {
    state.calls.decline(call_id, payload.user_id);
    StatusCode::NO_CONTENT
}

/// POST /calls/{id}/signals
pub async fn send_signal(
    State(state): State<AppState>,
    Path(call_id): Path<CallId>,
    Json(payload): Json<SendSignalRequest>,
) -> Result<StatusCode, ApiError> {
    if state.calls.call(call_id).is_none() {
        return Err(CallError::CallNotFound.into());
    }
    let signal = state.mailbox.send(
        call_id,
        payload.from_user_id,
        payload.to_user_id,
        payload.kind,
        payload.payload,
    );
    debug!(signal = %signal.id, call = %call_id, "signal stored");
    Ok(StatusCode::NO_CONTENT)
}

/// GET /calls/{id}/signals?user_id=
pub async fn get_signals(
    State(state): State<AppState>,
    Path(call_id): Path<CallId>,
    Query(params): Query<SignalQuery>,
) -> Json<Vec<Signal>> {
    Json(state.mailbox.signals_for(call_id, params.user_id))
}

/// DELETE /signals/{id}
pub async fn delete_signal(
    State(state): State<AppState>,
    Path(signal_id): Path<SignalId>,
) -> StatusCode {
    state.mailbox.delete(signal_id);
    StatusCode::NO_CONTENT
}

/// GET /conversations/{id}/call
pub async fn get_active_call(
    State(state): State<AppState>,
    Path(conversation_id): Path<ConversationId>,
) -> Json<Option<CallView>> {
    match state.calls.active_call(conversation_id) {
        Some(call) => Json(Some(enrich(state.directory.as_ref(), call).await)),
        None => Json(None),
    }
}

/// GET /calls/{id}
pub async fn get_call_by_id(
    State(state): State<AppState>,
    Path(call_id): Path<CallId>,
) -> Json<Option<CallView>> {
    match state.calls.call(call_id) {
        Some(call) => Json(Some(enrich(state.directory.as_ref(), call).await)),
        None => Json(None),
    }
}

/// GET /users/{id}/incoming-calls
pub async fn get_incoming_calls(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
) -> Json<Vec<CallView>> {
    let conversations: Vec<ConversationId> = state
        .directory
        .conversations_for(user_id)
        .await
        .into_iter()
        .map(|conversation| conversation.id)
        .collect();

    let mut views = Vec::new();
    for call in state.calls.incoming_calls(&conversations, user_id) {
        views.push(enrich(state.directory.as_ref(), call).await);
    }
    Json(views)
}

/// POST /maintenance/sweep
pub async fn run_sweep(State(state): State<AppState>) -> Json<SweepResponse> {
    Json(SweepResponse {
        expired_signals: state.mailbox.sweep_expired(),
        stale_calls: state.calls.sweep_stale_calls(),
    })
}

/// Attach display data to a call; users the directory cannot resolve
/// are dropped from the projection rather than failing the read.
async fn enrich(directory: &dyn Directory, call: Call) -> CallView {
    let mut participants = Vec::with_capacity(call.participants.len());
    for user_id in &call.participants {
        if let Some(profile) = directory.user_profile(*user_id).await {
            participants.push(profile);
        }
    }
    let initiator = directory.user_profile(call.initiator_id).await;
    CallView {
        call,
        participants,
        initiator,
    }
}
