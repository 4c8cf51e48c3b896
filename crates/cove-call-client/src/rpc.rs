//! RPC client for the switchboard's signaling operations.

use async_trait::async_trait;
use cove_call_core::wire::{
    CallActionRequest, ErrorBody, InitiateCallRequest, InitiateCallResponse, SendSignalRequest,
};
use cove_call_core::{
    CallError, CallId, CallResult, CallView, ConversationId, Signal, SignalId, SignalKind, UserId,
};

/// The switchboard operations as seen from a client. Delivery is
/// at-least-once and unordered; callers poll and acknowledge.
#[async_trait]
pub trait SignalingApi: Send + Sync {
    async fn initiate_call(
        &self,
        conversation_id: ConversationId,
        initiator_id: UserId,
    ) -> CallResult<CallId>;
    async fn join_call(&self, call_id: CallId, user_id: UserId) -> CallResult<()>;
    async fn leave_call(&self, call_id: CallId, user_id: UserId) -> CallResult<()>;
    async fn decline_call(&self, call_id: CallId, user_id: UserId) -> CallResult<()>;
    async fn send_signal(
        &self,
        call_id: CallId,
        from_user_id: UserId,
        to_user_id: UserId,
        kind: SignalKind,
        payload: serde_json::Value,
    ) -> CallResult<()>;
    async fn signals(&self, call_id: CallId, user_id: UserId) -> CallResult<Vec<Signal>>;
    async fn delete_signal(&self, signal_id: SignalId) -> CallResult<()>;
    async fn active_call(&self, conversation_id: ConversationId) -> CallResult<Option<CallView>>;
    async fn call_by_id(&self, call_id: CallId) -> CallResult<Option<CallView>>;
    async fn incoming_calls(&self, user_id: UserId) -> CallResult<Vec<CallView>>;
}

/// HTTP implementation polling the switchboard.
pub struct HttpSignalingApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSignalingApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Turn a non-2xx response into the typed error its body carries.
    async fn check(response: reqwest::Response) -> CallResult<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        match response.json::<ErrorBody>().await {
            Ok(body) => Err(body.into_error()),
            Err(_) => Err(CallError::Transport(format!(
                "switchboard returned {status}"
            ))),
        }
    }

    async fn post_json<B: serde::Serialize>(&self, path: &str, body: &B) -> CallResult<()> {
        let response = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(|err| CallError::Transport(err.to_string()))?;
        Self::check(response).await?;
        Ok(())
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> CallResult<T> {
        let response = self
            .client
            .get(self.url(path))
            .send()
            .await
            .map_err(|err| CallError::Transport(err.to_string()))?;
        Self::check(response)
            .await?
            .json()
            .await
            .map_err(|err| CallError::Transport(err.to_string()))
    }
}

#[async_trait]
impl SignalingApi for HttpSignalingApi {
    async fn initiate_call(
        &self,
        conversation_id: ConversationId,
        initiator_id: UserId,
    ) -> CallResult<CallId> {
        let response = self
            .client
            .post(self.url("/calls"))
            .json(&InitiateCallRequest {
                conversation_id,
                initiator_id,
            })
            .send()
            .await
            .map_err(|err| CallError::Transport(err.to_string()))?;
        let body: InitiateCallResponse = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|err| CallError::Transport(err.to_string()))?;
        Ok(body.call_id)
    }

    async fn join_call(&self, call_id: CallId, user_id: UserId) -> CallResult<()> {
        self.post_json(&format!("/calls/{call_id}/join"), &CallActionRequest { user_id })
            .await
    }

    async fn leave_call(&self, call_id: CallId, user_id: UserId) -> CallResult<()> {
        self.post_json(&format!("/calls/{call_id}/leave"), &CallActionRequest { user_id })
            .await
    }

    async fn decline_call(&self, call_id: CallId, user_id: UserId) -> CallResult<()> {
        self.post_json(
            &format!("/calls/{call_id}/decline"),
            &CallActionRequest { user_id },
        )
        .await
    }

    async fn send_signal(
        &self,
        call_id: CallId,
        from_user_id: UserId,
        to_user_id: UserId,
        kind: SignalKind,
        payload: serde_json::Value,
    ) -> CallResult<()> {
        self.post_json(
            &format!("/calls/{call_id}/signals"),
            &SendSignalRequest {
                from_user_id,
                to_user_id,
                kind,
                payload,
            },
        )
        .await
    }

    async fn signals(&self, call_id: CallId, user_id: UserId) -> CallResult<Vec<Signal>> {
        self.get_json(&format!("/calls/{call_id}/signals?user_id={user_id}"))
            .await
    }

    async fn delete_signal(&self, signal_id: SignalId) -> CallResult<()> {
        let response = self
            .client
            .delete(self.url(&format!("/signals/{signal_id}")))
            .send()
            .await
            .map_err(|err| CallError::Transport(err.to_string()))?;
        Self::check(response).await?;
        Ok(())
    }

    async fn active_call(&self, conversation_id: ConversationId) -> CallResult<Option<CallView>> {
        self.get_json(&format!("/conversations/{conversation_id}/call"))
            .await
    }

    async fn call_by_id(&self, call_id: CallId) -> CallResult<Option<CallView>> {
        self.get_json(&format!("/calls/{call_id}")).await
    }

    async fn incoming_calls(&self, user_id: UserId) -> CallResult<Vec<CallView>> {
        self.get_json(&format!("/users/{user_id}/incoming-calls"))
            .await
    }
}
