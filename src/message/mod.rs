use std::fmt::Display;
use std::sync::Arc;

use axum::Router;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{post, put};
use log::error;
use mongodb::bson::serde_helpers::hex_string_as_object_id;
use repository::MessageRepository;
use serde::{Deserialize, Serialize};
use service::MessageService;

use crate::{api, conversation, directory, state::AppState};

mod handler;
pub mod model;
pub mod repository;
pub mod service;

pub(crate) type Result<T> = std::result::Result<T, Error>;
pub type Repository = Arc<dyn MessageRepository + Send + Sync>;
pub type Service = Arc<dyn MessageService + Send + Sync>;

#[derive(Clone, Debug, Deserialize, Serialize, Eq, PartialEq, Hash)]
pub struct Id(#[serde(with = "hex_string_as_object_id")] pub String);

impl Id {
    pub fn random() -> Self {
        Self(mongodb::bson::oid::ObjectId::new().to_hex())
    }
}

impl Display for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub fn api<S>(s: AppState) -> Router<S> {
    Router::new()
        .route("/messages", post(handler::send))
        .route("/messages/{id}", put(handler::edit))
        .with_state(s)
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Sent,
    Delivered,
    Read,
    Failed,
}

/// Derived from content at creation time; see `model::classify`.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Text,
    Image,
    Document,
    Announcement,
    System,
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("message not found: {0:?}")]
    NotFound(Id),
    #[error("message needs text or at least one attachment")]
    EmptyMessage,
    #[error("only the sender may edit a message")]
    NotSender,
    #[error("too many attachments: {0}, at most {max} allowed", max = model::MAX_ATTACHMENTS)]
    TooManyAttachments(usize),
    #[error("attachment too large: {0}")]
    AttachmentTooLarge(String),
    #[error("unsupported attachment type: {0}")]
    UnsupportedMime(String),
    #[error("attachments are disabled for this conversation")]
    AttachmentsDisabled,
    #[error("reply target is not part of this conversation: {0:?}")]
    BadReplyTo(Id),
    #[error("attachment storage is not configured")]
    StorageUnavailable,

    #[error(transparent)]
    _Conversation(#[from] conversation::Error),
    #[error(transparent)]
    _Directory(#[from] directory::Error),
    #[error(transparent)]
    _MongoDb(#[from] mongodb::error::Error),
}

impl From<&Error> for StatusCode {
    fn from(e: &Error) -> Self {
        match e {
            Error::NotFound(_) | Error::BadReplyTo(_) => StatusCode::NOT_FOUND,
            Error::EmptyMessage
            | Error::TooManyAttachments(_)
            | Error::AttachmentTooLarge(_)
            | Error::UnsupportedMime(_)
            | Error::AttachmentsDisabled
            | Error::StorageUnavailable => StatusCode::BAD_REQUEST,
            Error::NotSender => StatusCode::FORBIDDEN,
            Error::_Conversation(e) => e.into(),
            Error::_Directory(e) => e.into(),
            Error::_MongoDb(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = StatusCode::from(&self);
        if status.is_server_error() {
            error!("message error: {self:?}");
            return api::failure(status, "Something went wrong");
        }
        api::failure(status, &self.to_string())
    }
}

impl From<Id> for mongodb::bson::Bson {
    fn from(id: Id) -> Self {
        let oid = mongodb::bson::oid::ObjectId::parse_str(&id.0).expect("id is a valid object id");
        mongodb::bson::Bson::ObjectId(oid)
    }
}
