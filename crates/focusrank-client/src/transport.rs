//! How the client reaches the server.

use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::StatusCode;

use focusrank_shared::protocol::{ErrorBody, SendMessageRequest, StoredMessage};
use focusrank_shared::types::SquadId;

use crate::error::ClientError;

pub trait ChatTransport: Send + Sync {
    fn post_message<'a>(
        &'a self,
        squad_id: SquadId,
        request: &'a SendMessageRequest,
    ) -> BoxFuture<'a, Result<StoredMessage, ClientError>>;

    fn history(&self, squad_id: SquadId, limit: u32) -> BoxFuture<'_, Result<Vec<StoredMessage>, ClientError>>;
}

/// Talks to the focusrank HTTP API.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn messages_url(&self, squad_id: SquadId) -> String {
        format!("{}/squads/{}/messages", self.base_url, squad_id)
    }

    async fn send(&self, squad_id: SquadId, request: &SendMessageRequest) -> Result<StoredMessage, ClientError> {
        let response = self
            .client
            .post(self.messages_url(squad_id))
            .json(request)
            .send()
            .await?;
        Ok(decode(response).await?.json().await?)
    }

    async fn fetch_history(&self, squad_id: SquadId, limit: u32) -> Result<Vec<StoredMessage>, ClientError> {
        let response = self
            .client
            .get(self.messages_url(squad_id))
            .query(&[("limit", limit)])
            .send()
            .await?;
        Ok(decode(response).await?.json().await?)
    }
}

impl ChatTransport for HttpTransport {
    fn post_message<'a>(
        &'a self,
        squad_id: SquadId,
        request: &'a SendMessageRequest,
    ) -> BoxFuture<'a, Result<StoredMessage, ClientError>> {
        self.send(squad_id, request).boxed()
    }

    fn history(&self, squad_id: SquadId, limit: u32) -> BoxFuture<'_, Result<Vec<StoredMessage>, ClientError>> {
        self.fetch_history(squad_id, limit).boxed()
    }
}

/// Pass successful responses through; turn error responses into
/// [`ClientError`].
async fn decode(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(ClientError::RateLimited);
    }

    let body = response.json::<ErrorBody>().await.ok();
    Err(ClientError::Server {
        status: status.as_u16(),
        error: body
            .as_ref()
            .map(|b| b.error.clone())
            .unwrap_or_else(|| status.to_string()),
        reason: body.and_then(|b| b.reason),
    })
}
