//! User handlers.

use super::{ApiJson, AppState, request_context};
use crate::Result;
use crate::models::{User, UserName, UserPatch};
use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;

/// `POST /user/userId`: a fresh id as a JSON string.
pub async fn create_id(State(state): State<AppState>) -> (StatusCode, Json<String>) {
    (StatusCode::CREATED, Json(state.users.generate_id()))
}

/// `GET /user/userId`: the id of the user named in the body.
pub async fn id_by_username(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<UserName>,
) -> Result<Json<String>> {
    let id = state
        .users
        .id_by_username(&request_context(), &body.username)
        .await?;
    Ok(Json(id))
}

/// `POST /user/{id}`.
pub async fn create(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(user): ApiJson<User>,
) -> Result<(StatusCode, Json<User>)> {
    let user = state.users.create(&request_context(), &id, user).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// `PUT /user/{id}`.
pub async fn replace(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(user): ApiJson<User>,
) -> Result<Json<User>> {
    Ok(Json(
        state.users.replace(&request_context(), &id, user).await?,
    ))
}

/// `PATCH /user/{id}`.
pub async fn patch(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(patch): ApiJson<UserPatch>,
) -> Result<Json<User>> {
    Ok(Json(state.users.patch(&request_context(), &id, patch).await?))
}

/// `GET /user/{id}`.
pub async fn get(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<User>> {
    Ok(Json(state.users.get(&request_context(), &id).await?))
}

/// `DELETE /user/{id}`.
pub async fn delete(State(state): State<AppState>, Path(id): Path<String>) -> Result<StatusCode> {
    state.users.delete(&request_context(), &id).await?;
    Ok(StatusCode::NO_CONTENT)
}
