//! PostgreSQL adapter for the submission ledger.
//!
//! This adapter is the durable source-of-truth backend. `append_scored` takes
//! a transaction-scoped advisory lock keyed by the submission scope, so the
//! history read, the insert and the aggregate increment of one scope are
//! serialized across every process sharing the database.

use crate::model::{AppendDecision, ScoredAppend};
use crate::traits::{ensure_in_scope, validate_record, AggregateStore, SubmissionLedger};
use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use ctf_types::{
    ChallengeId, EventId, EventScope, QuestionId, ScopeKey, Submission, SubmissionAppend,
    SubmissionId, UserAggregate, UserId,
};
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use std::collections::BTreeSet;
use uuid::Uuid;

const SUBMISSION_COLUMNS: &str = "id, challenge_id, user_id, event_id, flag, is_correct, \
     submitted_at, points_awarded, question_index, question_id, question_points";

/// PostgreSQL-backed ledger.
#[derive(Clone)]
pub struct PostgresLedger {
    pool: PgPool,
}

impl PostgresLedger {
    /// Connect to PostgreSQL and initialize required schema.
    pub async fn connect(database_url: &str) -> StorageResult<Self> {
        Self::connect_with_options(database_url, 10, 5).await
    }

    /// Connect with explicit pool parameters.
    pub async fn connect_with_options(
        database_url: &str,
        max_connections: u32,
        connect_timeout_secs: u64,
    ) -> StorageResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(std::time::Duration::from_secs(connect_timeout_secs))
            .connect(database_url)
            .await
            .map_err(|e| StorageError::Backend(format!("failed to connect postgres: {e}")))?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Create adapter from an existing pool.
    pub async fn from_pool(pool: PgPool) -> StorageResult<Self> {
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn init_schema(&self) -> StorageResult<()> {
        let ddl = [
            r#"
            CREATE TABLE IF NOT EXISTS ctf_submissions (
                id UUID PRIMARY KEY,
                challenge_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                event_id TEXT,
                flag TEXT NOT NULL,
                is_correct BOOLEAN NOT NULL,
                submitted_at TIMESTAMPTZ NOT NULL,
                points_awarded INTEGER NOT NULL CHECK (points_awarded >= 0),
                question_index INTEGER,
                question_id TEXT,
                question_points INTEGER NOT NULL CHECK (question_points >= 0)
            )
            "#,
            r#"
            CREATE INDEX IF NOT EXISTS ctf_submissions_scope_idx
                ON ctf_submissions (challenge_id, user_id, event_id)
            "#,
            r#"
            CREATE INDEX IF NOT EXISTS ctf_submissions_event_idx
                ON ctf_submissions (challenge_id, event_id)
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS ctf_user_aggregates (
                user_id TEXT PRIMARY KEY,
                total_points BIGINT NOT NULL DEFAULT 0
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS ctf_user_solved (
                user_id TEXT NOT NULL,
                challenge_id TEXT NOT NULL,
                PRIMARY KEY (user_id, challenge_id)
            )
            "#,
        ];

        for stmt in ddl {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::Backend(format!("schema init failed: {e}")))?;
        }
        Ok(())
    }
}

#[async_trait]
impl SubmissionLedger for PostgresLedger {
    async fn append(&self, record: SubmissionAppend) -> StorageResult<Submission> {
        validate_record(&record)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let submission = insert_submission(&mut *tx, record).await?;
        apply_award(&mut *tx, &submission).await?;

        tx.commit()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(submission)
    }

    async fn append_scored(
        &self,
        scope: &ScopeKey,
        decide: AppendDecision<'_>,
    ) -> StorageResult<ScoredAppend> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(scope.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::Backend(format!("scope lock failed: {e}")))?;

        let history = select_scope(&mut *tx, scope).await?;

        // Dropping `tx` on any early return rolls the transaction back.
        let record = decide(&history)?;
        ensure_in_scope(scope, &record)?;
        validate_record(&record)?;

        let submission = insert_submission(&mut *tx, record).await?;
        apply_award(&mut *tx, &submission).await?;
        let aggregate = select_aggregate(&mut *tx, &submission.user_id).await?;

        tx.commit()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(ScoredAppend {
            submission,
            aggregate,
        })
    }

    async fn query(&self, scope: &ScopeKey) -> StorageResult<Vec<Submission>> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        select_scope(&mut *conn, scope).await
    }

    async fn query_event(
        &self,
        challenge_id: &ChallengeId,
        event: &EventScope,
    ) -> StorageResult<Vec<Submission>> {
        let rows = sqlx::query(&format!(
            "SELECT {SUBMISSION_COLUMNS} FROM ctf_submissions \
             WHERE challenge_id = $1 AND event_id IS NOT DISTINCT FROM $2"
        ))
        .bind(challenge_id.as_str())
        .bind(event.event_id().map(|id| id.as_str().to_string()))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        rows.into_iter().map(submission_row_to_record).collect()
    }

    async fn get(&self, id: &SubmissionId) -> StorageResult<Option<Submission>> {
        let row = sqlx::query(&format!(
            "SELECT {SUBMISSION_COLUMNS} FROM ctf_submissions WHERE id = $1"
        ))
        .bind(*id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        row.map(submission_row_to_record).transpose()
    }
}

#[async_trait]
impl AggregateStore for PostgresLedger {
    async fn user_aggregate(&self, user_id: &UserId) -> StorageResult<UserAggregate> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        select_aggregate(&mut *conn, user_id).await
    }
}

async fn select_scope(conn: &mut PgConnection, scope: &ScopeKey) -> StorageResult<Vec<Submission>> {
    let rows = sqlx::query(&format!(
        "SELECT {SUBMISSION_COLUMNS} FROM ctf_submissions \
         WHERE challenge_id = $1 AND user_id = $2 AND event_id IS NOT DISTINCT FROM $3"
    ))
    .bind(scope.challenge_id.as_str())
    .bind(scope.user_id.as_str())
    .bind(scope.event.event_id().map(|id| id.as_str().to_string()))
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| StorageError::Backend(e.to_string()))?;

    rows.into_iter().map(submission_row_to_record).collect()
}

async fn insert_submission(
    conn: &mut PgConnection,
    record: SubmissionAppend,
) -> StorageResult<Submission> {
    let question_index = record.question_index.map(to_i32).transpose()?;
    let points_awarded = to_i32(record.points_awarded as usize)?;
    let question_points = to_i32(record.question_points as usize)?;
    let submission = record.into_submission(SubmissionId::generate());

    sqlx::query(
        r#"
        INSERT INTO ctf_submissions
            (id, challenge_id, user_id, event_id, flag, is_correct, submitted_at,
             points_awarded, question_index, question_id, question_points)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        "#,
    )
    .bind(*submission.id.as_uuid())
    .bind(submission.challenge_id.as_str())
    .bind(submission.user_id.as_str())
    .bind(submission.event.event_id().map(|id| id.as_str().to_string()))
    .bind(submission.flag.clone())
    .bind(submission.is_correct)
    .bind(submission.submitted_at)
    .bind(points_awarded)
    .bind(question_index)
    .bind(submission.question_id.as_ref().map(|id| id.as_str().to_string()))
    .bind(question_points)
    .execute(&mut *conn)
    .await
    .map_err(map_sqlx_conflict)?;

    Ok(submission)
}

async fn apply_award(conn: &mut PgConnection, submission: &Submission) -> StorageResult<()> {
    if !submission.is_awarding() {
        return Ok(());
    }

    sqlx::query(
        r#"
        INSERT INTO ctf_user_aggregates (user_id, total_points)
        VALUES ($1, $2)
        ON CONFLICT (user_id)
        DO UPDATE SET total_points = ctf_user_aggregates.total_points + EXCLUDED.total_points
        "#,
    )
    .bind(submission.user_id.as_str())
    .bind(i64::from(submission.points_awarded))
    .execute(&mut *conn)
    .await
    .map_err(|e| StorageError::Backend(e.to_string()))?;

    sqlx::query(
        r#"
        INSERT INTO ctf_user_solved (user_id, challenge_id)
        VALUES ($1, $2)
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(submission.user_id.as_str())
    .bind(submission.challenge_id.as_str())
    .execute(&mut *conn)
    .await
    .map_err(|e| StorageError::Backend(e.to_string()))?;

    Ok(())
}

async fn select_aggregate(conn: &mut PgConnection, user_id: &UserId) -> StorageResult<UserAggregate> {
    let total: Option<i64> =
        sqlx::query_scalar("SELECT total_points FROM ctf_user_aggregates WHERE user_id = $1")
            .bind(user_id.as_str())
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

    let solved: Vec<String> = sqlx::query_scalar(
        "SELECT challenge_id FROM ctf_user_solved WHERE user_id = $1 ORDER BY challenge_id",
    )
    .bind(user_id.as_str())
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| StorageError::Backend(e.to_string()))?;

    let total_points = u64::try_from(total.unwrap_or(0)).map_err(|_| {
        StorageError::InvariantViolation(format!("negative point total for user {user_id}"))
    })?;

    Ok(UserAggregate {
        user_id: user_id.clone(),
        total_points,
        solved_challenge_ids: solved.into_iter().map(ChallengeId::new).collect::<BTreeSet<_>>(),
    })
}

fn submission_row_to_record(row: PgRow) -> StorageResult<Submission> {
    let event_id: Option<String> = row
        .try_get("event_id")
        .map_err(|e| StorageError::Backend(e.to_string()))?;
    let question_index: Option<i32> = row
        .try_get("question_index")
        .map_err(|e| StorageError::Backend(e.to_string()))?;
    let question_id: Option<String> = row
        .try_get("question_id")
        .map_err(|e| StorageError::Backend(e.to_string()))?;

    Ok(Submission {
        id: SubmissionId::from_uuid(
            row.try_get::<Uuid, _>("id")
                .map_err(|e| StorageError::Backend(e.to_string()))?,
        ),
        challenge_id: ChallengeId::new(
            row.try_get::<String, _>("challenge_id")
                .map_err(|e| StorageError::Backend(e.to_string()))?,
        ),
        user_id: UserId::new(
            row.try_get::<String, _>("user_id")
                .map_err(|e| StorageError::Backend(e.to_string()))?,
        ),
        event: EventScope::from(event_id.map(EventId::new)),
        flag: row
            .try_get("flag")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        is_correct: row
            .try_get("is_correct")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        submitted_at: row
            .try_get("submitted_at")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        points_awarded: from_i32(
            row.try_get("points_awarded")
                .map_err(|e| StorageError::Backend(e.to_string()))?,
        )?,
        question_index: question_index
            .map(|v| usize::try_from(v).map_err(|_| negative("question_index")))
            .transpose()?,
        question_id: question_id.map(QuestionId::new),
        question_points: from_i32(
            row.try_get("question_points")
                .map_err(|e| StorageError::Backend(e.to_string()))?,
        )?,
    })
}

fn map_sqlx_conflict(err: sqlx::Error) -> StorageError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some("23505") {
            return StorageError::Conflict(db_err.message().to_string());
        }
    }
    StorageError::Backend(err.to_string())
}

fn to_i32(value: usize) -> StorageResult<i32> {
    i32::try_from(value)
        .map_err(|_| StorageError::InvalidInput("integer value too large".to_string()))
}

fn from_i32(value: i32) -> StorageResult<u32> {
    u32::try_from(value).map_err(|_| negative("points"))
}

fn negative(column: &str) -> StorageError {
    StorageError::Serialization(format!("negative value in column {column}"))
}
