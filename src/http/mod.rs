//! HTTP surface under `/nova/v1`.
//!
//! | Route | Methods |
//! |-------|---------|
//! | `/test` | GET |
//! | `/user/userId` | POST (new id), GET (id by username) |
//! | `/user/{id}` | POST, PUT, PATCH, GET, DELETE |
//! | `/question/questionId` | POST (new id) |
//! | `/question/{kind}/{id}` | POST, PUT, PATCH, GET, DELETE |
//!
//! Errors are answered with `application/problem+json` bodies.

mod error;
mod questions;
mod users;

pub use error::{ApiJson, problem};

use crate::cache::DataCache;
use crate::services::{QuestionService, UserService};
use crate::storage::sqlite::{Context, Database};
use crate::{Error, Result};
use axum::Router;
use axum::http::StatusCode;
use axum::response::Response;
use axum::routing::{get, post};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;

/// Route prefix.
pub const API_PREFIX: &str = "/nova/v1";

/// Upper bound on the database work done for one request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared handler state.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The database adapter.
    pub db: Arc<Database>,
    /// User operations.
    pub users: UserService,
    /// Question operations.
    pub questions: QuestionService,
}

impl AppState {
    /// Builds the services over `db` and `cache`.
    #[must_use]
    pub fn new(db: Arc<Database>, cache: DataCache) -> Self {
        Self {
            users: UserService::new(Arc::clone(&db), cache.clone()),
            questions: QuestionService::new(Arc::clone(&db), cache),
            db,
        }
    }

    /// Fills the cache from the database.
    ///
    /// # Errors
    ///
    /// Returns the first query or cache error.
    pub async fn warm_cache(&self, ctx: &Context) -> Result<()> {
        let users = self.users.warm_cache(ctx).await?;
        let questions = self.questions.warm_cache(ctx).await?;
        tracing::info!(users, questions, "Cache warmed");
        Ok(())
    }
}

/// Per-request database context.
pub(crate) fn request_context() -> Context {
    Context::with_timeout(REQUEST_TIMEOUT)
}

async fn hello() -> &'static str {
    "hello Nova"
}

async fn fallback() -> Response {
    problem(StatusCode::NOT_FOUND, "no such route")
}

/// Builds the application router.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/test", get(hello))
        .route(
            "/user/userId",
            post(users::create_id).get(users::id_by_username),
        )
        .route(
            "/user/{id}",
            post(users::create)
                .put(users::replace)
                .patch(users::patch)
                .get(users::get)
                .delete(users::delete),
        )
        .route("/question/questionId", post(questions::create_id))
        .route(
            "/question/{kind}/{id}",
            post(questions::create)
                .put(questions::replace)
                .patch(questions::patch)
                .get(questions::get)
                .delete(questions::delete),
        );

    Router::new()
        .nest(API_PREFIX, api)
        .fallback(fallback)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serves `app` on `listener` until `shutdown` resolves.
///
/// # Errors
///
/// Returns an error if the server fails.
pub async fn serve<F>(listener: tokio::net::TcpListener, app: Router, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "HTTP server listening");
    }
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| Error::OperationFailed {
            operation: "serve".to_string(),
            cause: e.to_string(),
        })
}
