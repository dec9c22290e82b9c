//! HTTP gateway for the Chatify REST API.
//!
//! Each method is a single request. Authenticated calls send
//! `Authorization: Bearer <token>`. Mutating calls also send
//! `X-CSRF-Token: <ticket>`. Response bodies are decoded into the
//! schemas in [`chatify_types::wire`] and validated before they leave
//! this module.

use super::{Gateway, LoginGrant, Registration};
use crate::config::ClientConfig;
use async_trait::async_trait;
use chatify_types::wire::{
    CsrfResponse, ErrorBody, LoginRequest, LoginResponse, MessageRecord, ProfileRecord,
    RegisterRequest, SendMessageRequest,
};
use chatify_types::{
    AuthFailure, BearerToken, ConversationId, CsrfTicket, GatewayError, Message, MessageId, Profile,
    UserId, UserSummary,
};
use reqwest::{RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Header carrying the anti-forgery ticket.
pub const CSRF_HEADER: &str = "X-CSRF-Token";

/// Gateway backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpGateway {
    base_url: Url,
    http: reqwest::Client,
}

impl HttpGateway {
    /// Create a gateway for `base_url` with a per-request timeout.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, GatewayError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| GatewayError::Validation(format!("invalid base url {}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(GatewayError::Validation(format!(
                "base url cannot carry paths: {}",
                base_url
            )));
        }
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Network(e.to_string()))?;
        Ok(Self { base_url, http })
    }

    /// Create a gateway from client configuration.
    pub fn from_config(config: &ClientConfig) -> Result<Self, GatewayError> {
        Self::new(&config.base_url, config.request_timeout())
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Build the URL for a path below the base.
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url, GatewayError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| GatewayError::Validation("base url cannot carry paths".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn dispatch(
        &self,
        request: RequestBuilder,
        carries_ticket: bool,
    ) -> Result<Response, GatewayError> {
        let response = request
            .send()
            .await
            .map_err(|e| GatewayError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let detail = response
            .json::<ErrorBody>()
            .await
            .ok()
            .and_then(ErrorBody::describe);
        let error = map_status(status, carries_ticket, detail);
        tracing::debug!("request rejected with {}: {}", status, error);
        Err(error)
    }
}

/// Map a non-success status to the error taxonomy.
pub fn map_status(status: StatusCode, carries_ticket: bool, detail: Option<String>) -> GatewayError {
    let detail = detail.unwrap_or_else(|| status.to_string());
    match status {
        StatusCode::UNAUTHORIZED => GatewayError::Auth(AuthFailure::CredentialRejected),
        StatusCode::FORBIDDEN if carries_ticket => GatewayError::Auth(AuthFailure::StaleTicket),
        StatusCode::FORBIDDEN => GatewayError::Auth(AuthFailure::CredentialRejected),
        StatusCode::NOT_FOUND => GatewayError::NotFound(detail),
        s if s.is_server_error() => GatewayError::Network(detail),
        s if s.is_client_error() => GatewayError::Validation(detail),
        _ => GatewayError::Network(format!("unexpected status {}", status)),
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, GatewayError> {
    response
        .json::<T>()
        .await
        .map_err(|e| GatewayError::Validation(format!("malformed response: {}", e)))
}

fn ticket_from(response: CsrfResponse) -> Result<CsrfTicket, GatewayError> {
    Ok(CsrfTicket::new(response.into_value()?, crate::unix_millis()))
}

#[async_trait]
impl Gateway for HttpGateway {
    async fn acquire_anonymous_ticket(&self) -> Result<CsrfTicket, GatewayError> {
        let url = self.endpoint(&["csrf"])?;
        let response = self.dispatch(self.http.patch(url), false).await?;
        ticket_from(decode(response).await?)
    }

    async fn acquire_session_ticket(
        &self,
        token: &BearerToken,
    ) -> Result<CsrfTicket, GatewayError> {
        let url = self.endpoint(&["csrf-token"])?;
        let request = self.http.get(url).bearer_auth(token.expose());
        let response = self.dispatch(request, false).await?;
        ticket_from(decode(response).await?)
    }

    async fn login(
        &self,
        ticket: &CsrfTicket,
        username: &str,
        password: &str,
    ) -> Result<LoginGrant, GatewayError> {
        let url = self.endpoint(&["auth", "token"])?;
        let request = self
            .http
            .post(url)
            .header(CSRF_HEADER, ticket.value())
            .json(&LoginRequest { username, password });
        let response = self.dispatch(request, true).await?;
        let (token, profile) = decode::<LoginResponse>(response).await?.into_parts()?;
        Ok(LoginGrant {
            token: BearerToken::new(token),
            profile,
        })
    }

    async fn register(
        &self,
        ticket: &CsrfTicket,
        registration: &Registration,
    ) -> Result<(), GatewayError> {
        let url = self.endpoint(&["auth", "register"])?;
        let request = self
            .http
            .post(url)
            .header(CSRF_HEADER, ticket.value())
            .json(&RegisterRequest {
                username: &registration.username,
                email: &registration.email,
                password: &registration.password,
                avatar: registration.avatar.as_deref(),
            });
        self.dispatch(request, true).await?;
        Ok(())
    }

    async fn fetch_messages(
        &self,
        token: &BearerToken,
        conversation_id: &ConversationId,
    ) -> Result<Vec<Message>, GatewayError> {
        let url = self.endpoint(&["messages", conversation_id.as_str()])?;
        let request = self.http.get(url).bearer_auth(token.expose());
        let response = self.dispatch(request, false).await?;
        let records: Vec<MessageRecord> = decode(response).await?;

        let received_at = crate::unix_millis();
        let messages = records
            .into_iter()
            .map(|record| record.into_message(conversation_id, received_at))
            .collect::<Result<Vec<_>, _>>()?;
        tracing::debug!(
            "fetched {} messages for {}",
            messages.len(),
            conversation_id
        );
        Ok(messages)
    }

    async fn send_message(
        &self,
        token: &BearerToken,
        ticket: &CsrfTicket,
        content: &str,
        conversation_id: &ConversationId,
    ) -> Result<Message, GatewayError> {
        let url = self.endpoint(&["messages"])?;
        let request = self
            .http
            .post(url)
            .bearer_auth(token.expose())
            .header(CSRF_HEADER, ticket.value())
            .json(&SendMessageRequest {
                text: content,
                conversation_id: conversation_id.as_str(),
            });
        let response = self.dispatch(request, true).await?;
        let record: MessageRecord = decode(response).await?;
        Ok(record.into_message(conversation_id, crate::unix_millis())?)
    }

    async fn delete_message(
        &self,
        token: &BearerToken,
        ticket: &CsrfTicket,
        id: &MessageId,
    ) -> Result<(), GatewayError> {
        let url = self.endpoint(&["messages", id.as_str()])?;
        let request = self
            .http
            .delete(url)
            .bearer_auth(token.expose())
            .header(CSRF_HEADER, ticket.value());
        self.dispatch(request, true).await?;
        Ok(())
    }

    async fn fetch_user_profile(
        &self,
        token: &BearerToken,
        user_id: Option<&UserId>,
    ) -> Result<Profile, GatewayError> {
        let target = user_id.map(UserId::as_str).unwrap_or("me");
        let url = self.endpoint(&["users", target])?;
        let request = self.http.get(url).bearer_auth(token.expose());
        let response = self.dispatch(request, false).await?;
        let record: ProfileRecord = decode(response).await?;
        Ok(record.into_profile(user_id)?)
    }

    async fn list_users(&self, token: &BearerToken) -> Result<Vec<UserSummary>, GatewayError> {
        let url = self.endpoint(&["users"])?;
        let request = self.http.get(url).bearer_auth(token.expose());
        let response = self.dispatch(request, false).await?;
        let records: Vec<ProfileRecord> = decode(response).await?;
        let users = records
            .into_iter()
            .map(ProfileRecord::into_summary)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(users)
    }

    async fn delete_account(
        &self,
        token: &BearerToken,
        ticket: &CsrfTicket,
    ) -> Result<(), GatewayError> {
        let url = self.endpoint(&["users", "me"])?;
        let request = self
            .http
            .delete(url)
            .bearer_auth(token.expose())
            .header(CSRF_HEADER, ticket.value());
        self.dispatch(request, true).await?;
        Ok(())
    }
}
