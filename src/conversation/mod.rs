use std::fmt::Display;
use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, put};
use axum::Router;
use log::error;
use mongodb::bson::serde_helpers::hex_string_as_object_id;
use repository::ConversationRepository;
use serde::{Deserialize, Serialize};
use service::ConversationService;

use crate::{api, directory, state::AppState};

mod handler;
pub mod model;
pub mod repository;
pub mod service;

type Result<T> = std::result::Result<T, Error>;
pub type Repository = Arc<dyn ConversationRepository + Send + Sync>;
pub type Service = Arc<dyn ConversationService + Send + Sync>;

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
        .route("/conversations", get(handler::find_all))
        .route("/conversations/stats", get(handler::stats))
        .route("/conversations/{id}", get(handler::find_one))
        .route("/conversations/{id}", delete(handler::delete))
        .route("/conversations/{id}/read", put(handler::mark_read))
        .route("/conversations/{id}/delivered", put(handler::mark_delivered))
        .route("/conversations/{id}/archive", put(handler::archive))
        .route("/conversations/{id}/unarchive", put(handler::unarchive))
        .with_state(s)
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Group,
    Individual,
    Broadcast,
}

impl Kind {
    pub const fn as_str(&self) -> &str {
        match self {
            Self::Group => "group",
            Self::Individual => "individual",
            Self::Broadcast => "broadcast",
        }
    }
}

/// Who a broadcast goes to. Part of the broadcast dedup key, payload included.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "target", rename_all = "camelCase")]
pub enum BroadcastTarget {
    AllStudents,
    AllEmployees,
    SpecificClass { class_id: String },
    SpecificStudent { student_id: String },
    SpecificEmployee { employee_id: String },
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("conversation not found: {0:?}")]
    NotFound(Option<Id>),
    #[error("actor is not a participant of the conversation")]
    NotParticipant,
    #[error("only the creator may do this")]
    NotCreator,
    #[error("conversation target is missing or incomplete")]
    MissingTarget,
    #[error("could not create conversation")]
    NotCreated,
    #[error("actor id is not usable as a counter key: {0}")]
    InvalidCounterKey(String),

    #[error(transparent)]
    _Directory(#[from] directory::Error),
    #[error(transparent)]
    _MongoDb(#[from] mongodb::error::Error),
    #[error(transparent)]
    _Bson(#[from] mongodb::bson::ser::Error),
}

impl From<&Error> for StatusCode {
    fn from(e: &Error) -> Self {
        match e {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::NotParticipant | Error::NotCreator => StatusCode::FORBIDDEN,
            Error::MissingTarget | Error::InvalidCounterKey(_) => StatusCode::BAD_REQUEST,
            Error::_Directory(e) => e.into(),
            Error::NotCreated | Error::_MongoDb(_) | Error::_Bson(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = StatusCode::from(&self);
        if status.is_server_error() {
            error!("conversation error: {self:?}");
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
