use axum::response::Response;
use axum::{Extension, extract::Query, extract::State};
use serde::Deserialize;

use crate::actor::{Caller, Kind};
use crate::{api, state::AppState};

use super::SEARCH_CAP;
use super::model::{ClassDto, RecipientDto};

#[derive(Deserialize)]
pub struct RecipientParams {
    q: Option<String>,
    kind: Option<Kind>,
}

pub async fn recipients(
    Extension(_caller): Extension<Caller>,
    State(s): State<AppState>,
    Query(params): Query<RecipientParams>,
) -> super::Result<Response> {
    let query = params.q.as_deref();

    let mut found = Vec::with_capacity(SEARCH_CAP);
    let kinds = match params.kind {
        Some(k) => vec![k],
        None => vec![Kind::Student, Kind::Employee],
    };

    for kind in kinds {
        let remaining = SEARCH_CAP - found.len();
        if remaining == 0 {
            break;
        }
        found.extend(s.roster.search_recipients(kind, query, remaining).await?);
    }

    let dtos: Vec<RecipientDto> = found.into_iter().map(Into::into).collect();
    Ok(api::ok("Recipients fetched", dtos))
}

pub async fn classes(
    Extension(caller): Extension<Caller>,
    State(s): State<AppState>,
) -> super::Result<Response> {
    let classes = s.roster.classes_for(&caller.actor, SEARCH_CAP).await?;

    let dtos: Vec<ClassDto> = classes.into_iter().map(Into::into).collect();
    Ok(api::ok("Classes fetched", dtos))
}
