//! Question handlers.
//!
//! `{kind}` selects the record type; each handler decodes the body into that
//! type and hands it to the generic service call.

use super::{ApiJson, AppState, request_context};
use crate::models::{
    QuestionEssay, QuestionJudgement, QuestionKind, QuestionMultipleChoice, QuestionRecord,
    QuestionSingleChoice,
};
use crate::{Error, Result};
use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Runs a generic handler body for the record type of `kind`.
macro_rules! by_kind {
    ($kind:expr, $handler:ident($($arg:expr),*)) => {
        match $kind {
            QuestionKind::SingleChoice => $handler::<QuestionSingleChoice>($($arg),*).await,
            QuestionKind::MultipleChoice => $handler::<QuestionMultipleChoice>($($arg),*).await,
            QuestionKind::Judgement => $handler::<QuestionJudgement>($($arg),*).await,
            QuestionKind::Essay => $handler::<QuestionEssay>($($arg),*).await,
        }
    };
}

fn parse_kind(kind: &str) -> Result<QuestionKind> {
    kind.parse()
        .map_err(|_| Error::NotFound(format!("no question kind {kind}")))
}

fn decode<Q: QuestionRecord>(body: serde_json::Value) -> Result<Q> {
    serde_json::from_value(body)
        .map_err(|e| Error::InvalidInput(format!("invalid {} question: {e}", Q::KIND)))
}

/// `POST /question/questionId`: a fresh id as a JSON string.
pub async fn create_id(State(state): State<AppState>) -> (StatusCode, Json<String>) {
    (StatusCode::CREATED, Json(state.questions.generate_id()))
}

async fn create_as<Q: QuestionRecord>(
    state: &AppState,
    id: &str,
    body: serde_json::Value,
) -> Result<Response> {
    let question = state
        .questions
        .create(&request_context(), id, decode::<Q>(body)?)
        .await?;
    Ok((StatusCode::CREATED, Json(question)).into_response())
}

async fn replace_as<Q: QuestionRecord>(
    state: &AppState,
    id: &str,
    body: serde_json::Value,
) -> Result<Response> {
    let question = state
        .questions
        .replace(&request_context(), id, decode::<Q>(body)?)
        .await?;
    Ok(Json(question).into_response())
}

async fn patch_as<Q: QuestionRecord>(
    state: &AppState,
    id: &str,
    body: serde_json::Value,
) -> Result<Response> {
    let question: Q = state.questions.patch(&request_context(), id, body).await?;
    Ok(Json(question).into_response())
}

async fn get_as<Q: QuestionRecord>(state: &AppState, id: &str) -> Result<Response> {
    let question: Q = state.questions.get(&request_context(), id).await?;
    Ok(Json(question).into_response())
}

async fn delete_as<Q: QuestionRecord>(state: &AppState, id: &str) -> Result<Response> {
    state.questions.delete::<Q>(&request_context(), id).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// `POST /question/{kind}/{id}`.
pub async fn create(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, String)>,
    ApiJson(body): ApiJson<serde_json::Value>,
) -> Result<Response> {
    by_kind!(parse_kind(&kind)?, create_as(&state, &id, body))
}

/// `PUT /question/{kind}/{id}`.
pub async fn replace(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, String)>,
    ApiJson(body): ApiJson<serde_json::Value>,
) -> Result<Response> {
    by_kind!(parse_kind(&kind)?, replace_as(&state, &id, body))
}

/// `PATCH /question/{kind}/{id}`.
pub async fn patch(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, String)>,
    ApiJson(body): ApiJson<serde_json::Value>,
) -> Result<Response> {
    by_kind!(parse_kind(&kind)?, patch_as(&state, &id, body))
}

/// `GET /question/{kind}/{id}`.
pub async fn get(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, String)>,
) -> Result<Response> {
    by_kind!(parse_kind(&kind)?, get_as(&state, &id))
}

/// `DELETE /question/{kind}/{id}`.
pub async fn delete(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, String)>,
) -> Result<Response> {
    by_kind!(parse_kind(&kind)?, delete_as(&state, &id))
}
