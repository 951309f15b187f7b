use std::sync::Arc;

use axum::Router;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use log::error;
use repository::{ActorDirectory, RosterSource};

use crate::actor::ActorRef;
use crate::{api, state::AppState};

mod handler;
pub mod model;
pub mod repository;

pub(crate) type Result<T> = std::result::Result<T, Error>;
pub type Directory = Arc<dyn ActorDirectory + Send + Sync>;
pub type Roster = Arc<dyn RosterSource + Send + Sync>;

/// Recipient and class pickers are capped; the UI is a type-ahead, not a browser.
pub const SEARCH_CAP: usize = 20;

pub fn api<S>(s: AppState) -> Router<S> {
    Router::new()
        .route("/recipients", get(handler::recipients))
        .route("/classes", get(handler::classes))
        .with_state(s)
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("actor not found: {0:?}")]
    ActorNotFound(ActorRef),
    #[error("class not found: {0}")]
    ClassNotFound(String),

    #[error(transparent)]
    _MongoDb(#[from] mongodb::error::Error),
}

impl From<&Error> for StatusCode {
    fn from(e: &Error) -> Self {
        match e {
            Error::ActorNotFound(_) | Error::ClassNotFound(_) => StatusCode::NOT_FOUND,
            Error::_MongoDb(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = StatusCode::from(&self);
        if status.is_server_error() {
            error!("directory error: {self:?}");
            return api::failure(status, "Something went wrong");
        }
        api::failure(status, &self.to_string())
    }
}
