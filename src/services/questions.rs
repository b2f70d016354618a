//! Question service, generic over the four question kinds.

use super::{
    READ_RETRIES, WRITE_RETRIES, build_update, check_path_id, conflict_on_constraint, new_id,
};
use crate::cache::DataCache;
use crate::models::{
    QuestionEssay, QuestionJudgement, QuestionMultipleChoice, QuestionRecord,
    QuestionSingleChoice, validate_id,
};
use crate::storage::sqlite::{Context, Database, Value};
use crate::{Error, Result};
use std::sync::Arc;

fn select_sql<Q: QuestionRecord>() -> String {
    format!(
        "SELECT {} FROM {}",
        Q::COLUMNS.join(", "),
        Q::KIND.table()
    )
}

fn not_found<Q: QuestionRecord>(id: &str) -> Error {
    Error::NotFound(format!("{} question {id} not found", Q::KIND))
}

/// Overlays the non-null members of `patch` onto `base`.
fn merge_json(base: &mut serde_json::Value, patch: serde_json::Value) -> Result<()> {
    let serde_json::Value::Object(patch) = patch else {
        return Err(Error::InvalidInput(
            "patch body must be a JSON object".to_string(),
        ));
    };
    let serde_json::Value::Object(base) = base else {
        return Err(Error::InvalidInput("stored record is not an object".to_string()));
    };
    for (key, value) in patch {
        if !value.is_null() {
            base.insert(key, value);
        }
    }
    Ok(())
}

/// Questions over the database with a read-through cache.
#[derive(Debug, Clone)]
pub struct QuestionService {
    db: Arc<Database>,
    cache: DataCache,
}

impl QuestionService {
    /// Creates a service over `db` and `cache`.
    #[must_use]
    pub const fn new(db: Arc<Database>, cache: DataCache) -> Self {
        Self { db, cache }
    }

    /// Generates an id for a new question.
    #[must_use]
    pub fn generate_id(&self) -> String {
        new_id()
    }

    /// Stores a new question under `path_id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] or [`Error::ExpectationFailed`] for an
    /// invalid question, or [`Error::Conflict`] if the id is taken.
    pub async fn create<Q: QuestionRecord>(
        &self,
        ctx: &Context,
        path_id: &str,
        question: Q,
    ) -> Result<Q> {
        check_path_id(path_id, question.id())?;
        question.validate()?;
        let question = question.normalized();

        self.db
            .insert_struct_with_retry(ctx, WRITE_RETRIES, Q::KIND.table(), &question)
            .await
            .map_err(|e| conflict_on_constraint(e, &format!("{} question", Q::KIND)))?;
        self.cache.put_question(&question)?;
        tracing::info!(kind = %Q::KIND, id = question.id(), "Created question");
        Ok(question)
    }

    /// Returns the question with `id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for a malformed id or
    /// [`Error::NotFound`] if there is no such question.
    pub async fn get<Q: QuestionRecord>(&self, ctx: &Context, id: &str) -> Result<Q> {
        validate_id(id)?;
        let id = id.to_lowercase();
        if let Some(question) = self.cache.question::<Q>(&id)? {
            return Ok(question);
        }

        let question = self
            .db
            .query_with_retry(
                ctx,
                READ_RETRIES,
                format!("{} WHERE id = ?", select_sql::<Q>()),
                vec![Value::Text(id.clone())],
                Q::from_row,
            )
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| not_found::<Q>(&id))?;
        self.cache.put_question(&question)?;
        Ok(question)
    }

    /// Replaces the stored question.
    ///
    /// # Errors
    ///
    /// Returns a validation error or [`Error::NotFound`].
    pub async fn replace<Q: QuestionRecord>(
        &self,
        ctx: &Context,
        path_id: &str,
        question: Q,
    ) -> Result<Q> {
        check_path_id(path_id, question.id())?;
        question.validate()?;
        let question = question.normalized();
        self.write(ctx, question).await
    }

    /// Overlays the members of `patch` onto the stored question.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for a mismatched id or a body that
    /// does not yield a valid question, or [`Error::NotFound`].
    pub async fn patch<Q: QuestionRecord>(
        &self,
        ctx: &Context,
        path_id: &str,
        patch: serde_json::Value,
    ) -> Result<Q> {
        if let Some(body_id) = patch.get("id").and_then(serde_json::Value::as_str) {
            check_path_id(path_id, body_id)?;
        }
        let stored: Q = self.get(ctx, path_id).await?;
        let mut merged = serde_json::to_value(&stored)?;
        merge_json(&mut merged, patch)?;
        let question: Q = serde_json::from_value(merged)
            .map_err(|e| Error::InvalidInput(format!("invalid patch: {e}")))?;
        check_path_id(stored.id(), question.id())?;
        question.validate()?;
        self.write(ctx, question.normalized()).await
    }

    async fn write<Q: QuestionRecord>(&self, ctx: &Context, question: Q) -> Result<Q> {
        let (sql, params) = build_update(Q::KIND.table(), &question)?;
        let result = self
            .db
            .exec_with_retry(ctx, WRITE_RETRIES, sql, params)
            .await?;
        if result.rows_affected == 0 {
            return Err(not_found::<Q>(question.id()));
        }
        self.cache.put_question(&question)?;
        tracing::info!(kind = %Q::KIND, id = question.id(), "Updated question");
        Ok(question)
    }

    /// Deletes the question with `id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for a malformed id or
    /// [`Error::NotFound`] if there is no such question.
    pub async fn delete<Q: QuestionRecord>(&self, ctx: &Context, id: &str) -> Result<()> {
        validate_id(id)?;
        let id = id.to_lowercase();
        let result = self
            .db
            .exec_with_retry(
                ctx,
                WRITE_RETRIES,
                format!("DELETE FROM {} WHERE id = ?", Q::KIND.table()),
                vec![Value::Text(id.clone())],
            )
            .await?;
        self.cache.remove_question::<Q>(&id)?;
        if result.rows_affected == 0 {
            return Err(not_found::<Q>(&id));
        }
        tracing::info!(kind = %Q::KIND, id = %id, "Deleted question");
        Ok(())
    }

    async fn warm<Q: QuestionRecord>(&self, ctx: &Context) -> Result<usize> {
        let questions = self
            .db
            .query(ctx, select_sql::<Q>(), Vec::new(), Q::from_row)
            .await?;
        for question in &questions {
            self.cache.put_question(question)?;
        }
        Ok(questions.len())
    }

    /// Loads every question of every kind into the cache and returns how
    /// many were loaded.
    ///
    /// # Errors
    ///
    /// Returns the query or cache error.
    pub async fn warm_cache(&self, ctx: &Context) -> Result<usize> {
        Ok(self.warm::<QuestionSingleChoice>(ctx).await?
            + self.warm::<QuestionMultipleChoice>(ctx).await?
            + self.warm::<QuestionJudgement>(ctx).await?
            + self.warm::<QuestionEssay>(ctx).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::QuestionAnswer;
    use crate::storage::schema;
    use crate::storage::sqlite::DatabaseConfig;
    use serde_json::json;
    use tempfile::TempDir;

    async fn service() -> (TempDir, QuestionService) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("questions.db");
        let db = Database::open(path.to_str().unwrap(), DatabaseConfig::default()).unwrap();
        schema::migrate(&db, &Context::background()).await.unwrap();
        (dir, QuestionService::new(Arc::new(db), DataCache::default()))
    }

    fn answer(mark: &str, text: &str) -> QuestionAnswer {
        QuestionAnswer {
            answer_mark: mark.to_string(),
            answer_text: text.to_string(),
        }
    }

    fn single(id: &str) -> QuestionSingleChoice {
        QuestionSingleChoice {
            id: id.to_string(),
            title: "2 + 2?".to_string(),
            answers: vec![answer("A", "3"), answer("B", "4")],
            standard_answer: answer("B", "4"),
        }
    }

    #[tokio::test]
    async fn test_single_choice_round_trip_through_table() {
        let (_dir, questions) = service().await;
        let ctx = Context::background();
        let id = questions.generate_id();
        let created = questions.create(&ctx, &id, single(&id)).await.unwrap();

        // Bypass the cache to read the JSON columns back.
        let fresh = QuestionService::new(Arc::clone(&questions.db), DataCache::default());
        let loaded: QuestionSingleChoice = fresh.get(&ctx, &id).await.unwrap();
        assert_eq!(loaded, created);
    }

    #[tokio::test]
    async fn test_unoffered_standard_answer_fails_expectation() {
        let (_dir, questions) = service().await;
        let ctx = Context::background();
        let id = questions.generate_id();
        let mut question = single(&id);
        question.standard_answer = answer("C", "5");
        assert!(matches!(
            questions.create(&ctx, &id, question).await,
            Err(Error::ExpectationFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_kinds_are_separate_tables() {
        let (_dir, questions) = service().await;
        let ctx = Context::background();
        let id = questions.generate_id();
        questions.create(&ctx, &id, single(&id)).await.unwrap();

        let missing = questions.get::<QuestionEssay>(&ctx, &id).await;
        assert!(matches!(missing, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_patch_judgement() {
        let (_dir, questions) = service().await;
        let ctx = Context::background();
        let id = questions.generate_id();
        let judgement = QuestionJudgement {
            id: id.clone(),
            title: "The sky is blue".to_string(),
            answer: false,
            standard_answer: true,
        };
        questions.create(&ctx, &id, judgement).await.unwrap();

        let patched: QuestionJudgement = questions
            .patch(&ctx, &id, json!({"answer": true, "title": null}))
            .await
            .unwrap();
        assert!(patched.answer);
        assert_eq!(patched.title, "The sky is blue");
    }

    #[tokio::test]
    async fn test_delete_then_missing() {
        let (_dir, questions) = service().await;
        let ctx = Context::background();
        let id = questions.generate_id();
        questions.create(&ctx, &id, single(&id)).await.unwrap();

        questions
            .delete::<QuestionSingleChoice>(&ctx, &id)
            .await
            .unwrap();
        assert!(matches!(
            questions.delete::<QuestionSingleChoice>(&ctx, &id).await,
            Err(Error::NotFound(_))
        ));
        assert_eq!(questions.warm_cache(&ctx).await.unwrap(), 0);
    }

    #[test]
    fn test_merge_json_rejects_non_objects() {
        let mut base = json!({"a": 1});
        assert!(merge_json(&mut base, json!([1])).is_err());
        merge_json(&mut base, json!({"b": 2, "a": null})).unwrap();
        assert_eq!(base, json!({"a": 1, "b": 2}));
    }
}
