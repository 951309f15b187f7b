use axum::response::Response;
use axum::{Extension, Json, extract::Path, extract::State};

use crate::actor::Caller;
use crate::{api, state::AppState};

use super::Id;
use super::model::{EditRequest, SendRequest};

pub async fn send(
    Extension(caller): Extension<Caller>,
    State(s): State<AppState>,
    Json(req): Json<SendRequest>,
) -> super::Result<Response> {
    let dto = s.message_service.send(&caller, req).await?;
    Ok(api::created("Message sent", dto))
}

pub async fn edit(
    Extension(caller): Extension<Caller>,
    State(s): State<AppState>,
    Path(id): Path<Id>,
    Json(req): Json<EditRequest>,
) -> super::Result<Response> {
    let dto = s.message_service.edit(&caller, &id, &req.text).await?;
    Ok(api::ok("Message updated", dto))
}
