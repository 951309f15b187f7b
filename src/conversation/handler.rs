use axum::response::Response;
use axum::{Extension, extract::Path, extract::Query, extract::State};

use crate::actor::Caller;
use crate::message::model::Page;
use crate::{api, message, state::AppState};

use super::Id;
use super::service::ListFilter;

pub async fn find_all(
    Extension(caller): Extension<Caller>,
    State(s): State<AppState>,
    Query(filter): Query<ListFilter>,
) -> super::Result<Response> {
    let conversations = s
        .conversation_service
        .find_all(&caller.actor, &filter)
        .await?;
    Ok(api::ok("Conversations fetched", conversations))
}

pub async fn stats(
    Extension(caller): Extension<Caller>,
    State(s): State<AppState>,
) -> super::Result<Response> {
    let stats = s.conversation_service.stats_for(&caller.actor).await?;
    Ok(api::ok("Stats fetched", stats))
}

/// Opening a conversation is also the read acknowledgement: the returned page
/// comes back with the caller's counter already reset.
pub async fn find_one(
    Extension(caller): Extension<Caller>,
    State(s): State<AppState>,
    Path(id): Path<Id>,
    Query(page): Query<Page>,
) -> message::Result<Response> {
    let page = s.message_service.open_conversation(&caller, &id, page).await?;
    Ok(api::ok("Conversation fetched", page))
}

pub async fn delete(
    Extension(caller): Extension<Caller>,
    State(s): State<AppState>,
    Path(id): Path<Id>,
) -> super::Result<Response> {
    s.conversation_service.delete(&id, &caller.actor).await?;
    Ok(api::ok("Conversation deleted", ()))
}

pub async fn mark_read(
    Extension(caller): Extension<Caller>,
    State(s): State<AppState>,
    Path(id): Path<Id>,
) -> message::Result<Response> {
    let marked = s.message_service.mark_all_read(&caller, &id).await?;
    Ok(api::ok("Messages marked as read", marked))
}

pub async fn mark_delivered(
    Extension(caller): Extension<Caller>,
    State(s): State<AppState>,
    Path(id): Path<Id>,
) -> message::Result<Response> {
    let marked = s.message_service.mark_all_delivered(&caller, &id).await?;
    Ok(api::ok("Messages marked as delivered", marked))
}

pub async fn archive(
    Extension(caller): Extension<Caller>,
    State(s): State<AppState>,
    Path(id): Path<Id>,
) -> super::Result<Response> {
    s.conversation_service
        .set_archived(&id, &caller.actor, true)
        .await?;
    Ok(api::ok("Conversation archived", ()))
}

pub async fn unarchive(
    Extension(caller): Extension<Caller>,
    State(s): State<AppState>,
    Path(id): Path<Id>,
) -> super::Result<Response> {
    s.conversation_service
        .set_archived(&id, &caller.actor, false)
        .await?;
    Ok(api::ok("Conversation unarchived", ()))
}
