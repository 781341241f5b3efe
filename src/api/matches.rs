use crate::api::error::{ServiceResponse, ServiceResult};
use crate::api::{blocking, AppState};
use crate::snapshot::MatchSnapshot;
use crate::types::{CommentaryEvent, CommentaryInput, Match, MatchId, MatchStatus, NewMatch, Sequence};
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct MatchResponse {
    #[serde(rename = "match")]
    pub match_info: Match,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MatchesResponse {
    pub matches: Vec<Match>,
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct CommentaryQuery {
    pub after: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentaryResponse {
    pub match_id: MatchId,
    pub commentary: Vec<CommentaryEvent>,
}

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

pub async fn create_match(
    State(state): State<AppState>,
    payload: std::result::Result<Json<NewMatch>, JsonRejection>,
) -> ServiceResult<(StatusCode, Json<MatchResponse>)> {
    let Json(request) = payload?;
    let created = blocking(&state, move |store| store.create_match(request)).await?;
    Ok((
        StatusCode::CREATED,
        Json(MatchResponse {
            match_info: created,
        }),
    ))
}

pub async fn list_matches(State(state): State<AppState>) -> ServiceResponse<MatchesResponse> {
    let matches = blocking(&state, |store| Ok(store.list_matches())).await?;
    Ok(Json(MatchesResponse { matches }))
}

pub async fn get_match(
    State(state): State<AppState>,
    path: std::result::Result<Path<MatchId>, PathRejection>,
) -> ServiceResponse<MatchSnapshot> {
    let Path(match_id) = path?;
    let snapshot = blocking(&state, move |store| store.snapshot(match_id)).await?;
    Ok(Json(snapshot))
}

pub async fn update_status(
    State(state): State<AppState>,
    path: std::result::Result<Path<MatchId>, PathRejection>,
    payload: std::result::Result<Json<StatusUpdate>, JsonRejection>,
) -> ServiceResponse<MatchResponse> {
    let Path(match_id) = path?;
    let Json(update) = payload?;
    let status: MatchStatus = update.status.parse()?;
    let updated = blocking(&state, move |store| store.update_status(match_id, status)).await?;
    Ok(Json(MatchResponse {
        match_info: updated,
    }))
}

pub async fn list_commentary(
    State(state): State<AppState>,
    path: std::result::Result<Path<MatchId>, PathRejection>,
    query: std::result::Result<Query<CommentaryQuery>, QueryRejection>,
) -> ServiceResponse<CommentaryResponse> {
    let Path(match_id) = path?;
    let Query(query) = query?;
    let after = query.after.map(Sequence);
    let commentary =
        blocking(&state, move |store| store.commentary_after(match_id, after)).await?;
    Ok(Json(CommentaryResponse {
        match_id,
        commentary,
    }))
}

pub async fn add_commentary(
    State(state): State<AppState>,
    path: std::result::Result<Path<MatchId>, PathRejection>,
    payload: std::result::Result<Json<CommentaryInput>, JsonRejection>,
) -> ServiceResult<(StatusCode, Json<CommentaryEvent>)> {
    let Path(match_id) = path?;
    let Json(input) = payload?;
    let stored = blocking(&state, move |store| store.submit(match_id, input)).await?;
    Ok((StatusCode::CREATED, Json(stored)))
}
