//! JSON request and response schemas for the remote API.
//!
//! Every response field is optional at the serde level so that a missing
//! field surfaces as a [`SchemaError`] naming the field instead of an opaque
//! decode failure. The `into_*` methods validate and convert into domain
//! types; nothing past this module sees an unvalidated shape.

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{
    ConversationId, DeliveryState, Message, MessageId, Profile, SchemaError, UserId, UserSummary,
};

/// An id the server may send as either a string or a number.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireId {
    /// Numeric id.
    Number(i64),
    /// Textual id.
    Text(String),
}

impl WireId {
    /// Textual form of the id.
    pub fn to_text(&self) -> String {
        match self {
            WireId::Number(n) => n.to_string(),
            WireId::Text(s) => s.clone(),
        }
    }

    fn into_text(self, field: &'static str) -> Result<String, SchemaError> {
        let text = match self {
            WireId::Number(n) => n.to_string(),
            WireId::Text(s) => s,
        };
        if text.trim().is_empty() {
            return Err(SchemaError::MissingField(field));
        }
        Ok(text)
    }
}

impl fmt::Debug for WireId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireId::Number(n) => write!(f, "WireId({})", n),
            WireId::Text(s) => write!(f, "WireId({})", s),
        }
    }
}

/// A creation time the server may send as unix milliseconds or as text.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum WireTimestamp {
    /// Unix milliseconds.
    Millis(u64),
    /// RFC 3339 date-time, or unix milliseconds as a string.
    Text(String),
}

impl WireTimestamp {
    /// Unix milliseconds, or `None` if the value cannot be read as a time.
    pub fn to_millis(&self) -> Option<u64> {
        match self {
            WireTimestamp::Millis(ms) => Some(*ms),
            WireTimestamp::Text(text) => {
                let text = text.trim();
                text.parse::<u64>().ok().or_else(|| {
                    DateTime::parse_from_rfc3339(text)
                        .ok()
                        .and_then(|t| u64::try_from(t.timestamp_millis()).ok())
                })
            }
        }
    }
}

fn required(value: Option<String>, field: &'static str) -> Result<String, SchemaError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(SchemaError::MissingField(field)),
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Response of both CSRF issuing endpoints.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CsrfResponse {
    /// The issued ticket.
    pub csrf_token: Option<String>,
}

impl CsrfResponse {
    /// Validate and return the ticket value.
    pub fn into_value(self) -> Result<String, SchemaError> {
        required(self.csrf_token, "csrfToken")
    }
}

/// Body of the login call.
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest<'a> {
    /// Username.
    pub username: &'a str,
    /// Password.
    pub password: &'a str,
}

/// Body of the registration call.
#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest<'a> {
    /// Username.
    pub username: &'a str,
    /// Email address.
    pub email: &'a str,
    /// Password.
    pub password: &'a str,
    /// Optional avatar reference.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<&'a str>,
}

/// Response of the login call.
///
/// Only `token` is guaranteed; identity fields may instead live in the
/// token's claims.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    /// Issued bearer token.
    pub token: Option<String>,
    /// Account id.
    #[serde(alias = "id")]
    pub user_id: Option<WireId>,
    /// Username.
    pub username: Option<String>,
    /// Email address.
    pub email: Option<String>,
    /// Avatar reference.
    pub avatar: Option<String>,
}

/// Identity fields gathered from a login response, possibly incomplete.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartialProfile {
    /// Account id.
    pub user_id: Option<String>,
    /// Username.
    pub username: Option<String>,
    /// Email address.
    pub email: Option<String>,
    /// Avatar reference.
    pub avatar: Option<String>,
}

impl PartialProfile {
    /// Fill missing fields from `other`.
    pub fn or(self, other: PartialProfile) -> PartialProfile {
        PartialProfile {
            user_id: self.user_id.or(other.user_id),
            username: self.username.or(other.username),
            email: self.email.or(other.email),
            avatar: self.avatar.or(other.avatar),
        }
    }

    /// Validate into a full profile; id and username are required.
    pub fn into_profile(self) -> Result<Profile, SchemaError> {
        Ok(Profile {
            user_id: UserId::new(required(self.user_id, "userId")?),
            username: required(self.username, "username")?,
            email: non_blank(self.email),
            avatar: non_blank(self.avatar),
        })
    }
}

impl LoginResponse {
    /// Validate the token and collect whatever identity fields were sent.
    pub fn into_parts(self) -> Result<(String, PartialProfile), SchemaError> {
        let token = required(self.token, "token")?;
        let user_id = match self.user_id {
            Some(id) => Some(id.into_text("userId")?),
            None => None,
        };
        Ok((
            token,
            PartialProfile {
                user_id,
                username: non_blank(self.username),
                email: non_blank(self.email),
                avatar: non_blank(self.avatar),
            },
        ))
    }
}

/// Body of the send-message call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest<'a> {
    /// Message body.
    pub text: &'a str,
    /// Target conversation.
    pub conversation_id: &'a str,
}

/// A message as returned by the server.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    /// Server id.
    pub id: Option<WireId>,
    /// Message body.
    #[serde(alias = "content")]
    pub text: Option<String>,
    /// Conversation id.
    pub conversation_id: Option<String>,
    /// Author id.
    #[serde(alias = "senderId")]
    pub user_id: Option<WireId>,
    /// Author display name.
    #[serde(alias = "sender")]
    pub username: Option<String>,
    /// Creation time.
    pub created_at: Option<WireTimestamp>,
}

impl MessageRecord {
    /// Validate into a Confirmed message.
    ///
    /// `scope` is the conversation the request was issued for and is used
    /// when the record omits its own conversation id. `received_at` stands
    /// in for a missing or unreadable creation time.
    pub fn into_message(
        self,
        scope: &ConversationId,
        received_at: u64,
    ) -> Result<Message, SchemaError> {
        let id = self
            .id
            .ok_or(SchemaError::MissingField("id"))?
            .into_text("id")?;
        let content = self.text.ok_or(SchemaError::MissingField("text"))?;
        let sender = self
            .user_id
            .ok_or(SchemaError::MissingField("userId"))?
            .into_text("userId")?;
        let conversation_id = match non_blank(self.conversation_id) {
            Some(c) => ConversationId::new(c),
            None => scope.clone(),
        };
        let sender_display_name = non_blank(self.username).unwrap_or_else(|| sender.clone());

        Ok(Message {
            id: Some(MessageId::new(id)),
            conversation_id,
            sender_id: UserId::new(sender),
            sender_display_name,
            content,
            created_at: self
                .created_at
                .as_ref()
                .and_then(WireTimestamp::to_millis)
                .unwrap_or(received_at),
            delivery_state: DeliveryState::Confirmed,
        })
    }
}

/// A user profile as returned by the server.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileRecord {
    /// Account id.
    #[serde(alias = "userId")]
    pub id: Option<WireId>,
    /// Username.
    pub username: Option<String>,
    /// Email address.
    pub email: Option<String>,
    /// Avatar reference.
    #[serde(alias = "avatarUrl")]
    pub avatar: Option<String>,
}

impl ProfileRecord {
    /// Validate into a profile. `requested` fills a missing id.
    pub fn into_profile(self, requested: Option<&UserId>) -> Result<Profile, SchemaError> {
        let user_id = match (self.id, requested) {
            (Some(id), _) => UserId::new(id.into_text("id")?),
            (None, Some(requested)) => requested.clone(),
            (None, None) => return Err(SchemaError::MissingField("id")),
        };
        Ok(Profile {
            user_id,
            username: required(self.username, "username")?,
            email: non_blank(self.email),
            avatar: non_blank(self.avatar),
        })
    }

    /// Validate into a directory entry.
    pub fn into_summary(self) -> Result<UserSummary, SchemaError> {
        let user_id = self
            .id
            .ok_or(SchemaError::MissingField("id"))?
            .into_text("id")?;
        Ok(UserSummary {
            user_id: UserId::new(user_id),
            username: required(self.username, "username")?,
            avatar: non_blank(self.avatar),
        })
    }
}

/// Error body the server attaches to rejected requests.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    /// Human-readable message.
    pub message: Option<String>,
    /// Alternative message key.
    pub error: Option<String>,
}

impl ErrorBody {
    /// Best available description.
    pub fn describe(self) -> Option<String> {
        non_blank(self.message).or_else(|| non_blank(self.error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csrf_response_requires_token() {
        let ok: CsrfResponse = serde_json::from_str(r#"{"csrfToken":"abc"}"#).unwrap();
        assert_eq!(ok.into_value().unwrap(), "abc");

        let missing: CsrfResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(
            missing.into_value(),
            Err(SchemaError::MissingField("csrfToken"))
        );
    }

    #[test]
    fn message_record_accepts_numeric_ids() {
        let record: MessageRecord = serde_json::from_str(
            r#"{"id":12,"text":"hi","conversationId":"c1","userId":7,"createdAt":1000}"#,
        )
        .unwrap();
        let msg = record
            .into_message(&ConversationId::new("c1"), 5)
            .unwrap();

        assert_eq!(msg.id, Some(MessageId::new("12")));
        assert_eq!(msg.sender_id, UserId::new("7"));
        assert_eq!(msg.sender_display_name, "7");
        assert_eq!(msg.created_at, 1000);
        assert_eq!(msg.delivery_state, DeliveryState::Confirmed);
    }

    #[test]
    fn message_record_content_alias_and_scope_fallback() {
        let record: MessageRecord =
            serde_json::from_str(r#"{"id":"m1","content":"yo","userId":"u1","username":"bob"}"#)
                .unwrap();
        let msg = record
            .into_message(&ConversationId::new("scope"), 77)
            .unwrap();

        assert_eq!(msg.content, "yo");
        assert_eq!(msg.conversation_id, ConversationId::new("scope"));
        assert_eq!(msg.sender_display_name, "bob");
        assert_eq!(msg.created_at, 77);
    }

    #[test]
    fn message_record_accepts_textual_timestamps() {
        let list: Vec<MessageRecord> = serde_json::from_str(
            r#"[
                {"id":1,"text":"a","userId":"u1","createdAt":"2024-09-11T10:00:00.000Z"},
                {"id":2,"text":"b","userId":"u1","createdAt":"1726048800000"},
                {"id":3,"text":"c","userId":"u1","createdAt":"yesterday"}
            ]"#,
        )
        .unwrap();
        let times: Vec<u64> = list
            .into_iter()
            .map(|r| r.into_message(&ConversationId::new("c1"), 42).unwrap().created_at)
            .collect();

        assert_eq!(times, vec![1_726_048_800_000, 1_726_048_800_000, 42]);
    }

    #[test]
    fn message_record_without_id_is_rejected() {
        let record: MessageRecord =
            serde_json::from_str(r#"{"text":"hi","userId":"u1"}"#).unwrap();
        let err = record
            .into_message(&ConversationId::new("c1"), 0)
            .unwrap_err();
        assert_eq!(err, SchemaError::MissingField("id"));
    }

    #[test]
    fn login_response_collects_partial_identity() {
        let resp: LoginResponse =
            serde_json::from_str(r#"{"token":"t1","userId":3,"username":"amy","email":""}"#)
                .unwrap();
        let (token, partial) = resp.into_parts().unwrap();

        assert_eq!(token, "t1");
        assert_eq!(partial.user_id.as_deref(), Some("3"));
        assert_eq!(partial.username.as_deref(), Some("amy"));
        assert!(partial.email.is_none());
    }

    #[test]
    fn login_response_without_token_is_rejected() {
        let resp: LoginResponse = serde_json::from_str(r#"{"username":"amy"}"#).unwrap();
        assert_eq!(
            resp.into_parts().unwrap_err(),
            SchemaError::MissingField("token")
        );
    }

    #[test]
    fn partial_profile_merges_and_validates() {
        let from_response = PartialProfile {
            username: Some("amy".into()),
            ..Default::default()
        };
        let from_claims = PartialProfile {
            user_id: Some("9".into()),
            username: Some("ignored".into()),
            ..Default::default()
        };
        let profile = from_response.or(from_claims).into_profile().unwrap();
        assert_eq!(profile.user_id, UserId::new("9"));
        assert_eq!(profile.username, "amy");

        let err = PartialProfile::default().into_profile().unwrap_err();
        assert_eq!(err, SchemaError::MissingField("userId"));
    }

    #[test]
    fn profile_record_uses_requested_id() {
        let record: ProfileRecord =
            serde_json::from_str(r#"{"username":"zed","avatarUrl":"http://a/1.png"}"#).unwrap();
        let profile = record.into_profile(Some(&UserId::new("5"))).unwrap();
        assert_eq!(profile.user_id, UserId::new("5"));
        assert_eq!(profile.avatar.as_deref(), Some("http://a/1.png"));
    }

    #[test]
    fn send_request_uses_api_field_names() {
        let body = serde_json::to_value(SendMessageRequest {
            text: "hi",
            conversation_id: "c1",
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({"text": "hi", "conversationId": "c1"}));
    }

    #[test]
    fn error_body_prefers_message() {
        let body: ErrorBody =
            serde_json::from_str(r#"{"message":"Username or email already exists"}"#).unwrap();
        assert_eq!(
            body.describe().as_deref(),
            Some("Username or email already exists")
        );
    }
}
