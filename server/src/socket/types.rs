use std::fmt;

use serde::Serialize;
use serde_json::Value as JsonValue;
use socketioxide::extract::AckSender;
use tracing::warn;
use uuid::Uuid;

use crate::{
    error::{AppError, UserFriendlyPayload},
    types::{AuthenticatedRestSession, SessionUser},
};

#[derive(Clone)]
pub struct SocketUserContext {
    pub user: SessionUser,
    pub user_id: String,
}

impl SocketUserContext {
    pub fn new(auth: &AuthenticatedRestSession) -> Self {
        Self {
            user: SessionUser::from(&auth.user),
            user_id: auth.user.id.clone(),
        }
    }
}

#[derive(Clone)]
pub struct SocketRequestContext {
    pub request_id: String,
}

impl SocketRequestContext {
    pub fn new(request_id: Option<&str>) -> Self {
        let id = request_id
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
            .map(|value| value.to_string())
            .unwrap_or_else(|| format!("ws-{}", Uuid::new_v4().simple()));

        Self { request_id: id }
    }
}

#[derive(Serialize)]
#[serde(untagged)]
pub enum SocketAck<T> {
    Data { data: T },
    Error { error: SocketAckError },
}

impl<T> SocketAck<T> {
    pub fn ok(data: T) -> Self {
        SocketAck::Data { data }
    }

    pub fn refused(error: AppError, request_id: Option<&str>) -> Self {
        SocketAck::Error {
            error: SocketAckError::from_app_error(error, request_id),
        }
    }
}

impl<T: Serialize> SocketAck<T> {
    /// Deliver the ack. Failures mean the client already went away, which is
    /// not worth propagating into the handler.
    pub fn send(self, ack: AckSender) {
        if let Err(err) = ack.send(&self) {
            warn!(?err, "failed to deliver socket ack");
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SocketAckError {
    pub status: u16,
    pub code: String,
    #[serde(rename = "type")]
    pub error_type: String,
    pub name: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<JsonValue>,
    #[serde(rename = "requestId", skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl SocketAckError {
    pub fn from_app_error(error: AppError, request_id: Option<&str>) -> Self {
        let (status, payload) = error.into_payload();
        Self::from_payload(payload, status.as_u16(), request_id)
    }

    fn from_payload(payload: UserFriendlyPayload, status: u16, request_id: Option<&str>) -> Self {
        Self {
            status,
            code: payload.code,
            error_type: payload.error_type,
            name: payload.name,
            message: payload.message,
            data: payload.data,
            request_id: request_id.map(|id| id.to_string()),
        }
    }
}

impl fmt::Display for SocketAckError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}
