//! SQLite-backed append-only feedback store
//!
//! One immutable row per generation attempt, plus per-sentence scores
//! and human corrections keyed to attempts. Aggregate queries over this
//! history feed the learning advisors. Attempt rows are never updated
//! in place; corrections arrive later from human review and reference
//! attempts without mutating them.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::types::{EnrichmentParams, FailureType, GenParams, PersonaParams};

/// Input for a new attempt row.
#[derive(Debug, Clone)]
pub struct NewAttempt {
    pub topic: String,
    pub topic_category: String,
    pub component_type: String,
    pub params: GenParams,
    pub attempt_number: u32,
    pub generated_text: String,
    pub ai_score: f64,
    pub human_score: f64,
    pub readability_score: Option<f64>,
    pub success: bool,
    pub failure_type: Option<FailureType>,
}

/// A stored attempt row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub id: String,
    pub topic: String,
    pub topic_category: String,
    pub component_type: String,
    pub temperature: f64,
    pub persona_params: PersonaParams,
    pub enrichment_params: EnrichmentParams,
    pub attempt_number: u32,
    pub generated_text: String,
    pub ai_score: f64,
    pub human_score: f64,
    pub readability_score: Option<f64>,
    pub success: bool,
    pub failure_type: Option<FailureType>,
    pub created_at: DateTime<Utc>,
}

/// One per-sentence human-likeness score attached to an attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentenceScoreRow {
    pub attempt_id: String,
    pub idx: u32,
    pub sentence: String,
    pub score: f64,
}

/// A human correction referencing a stored attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrectionRecord {
    pub id: String,
    pub attempt_id: String,
    pub corrected_text: String,
    pub correction_type: String,
    pub approved: bool,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Filters for attempt queries. Empty filters match everything.
#[derive(Debug, Clone, Default)]
pub struct AttemptFilter {
    pub topic: Option<String>,
    pub topic_category: Option<String>,
    pub component_type: Option<String>,
    pub limit: Option<u32>,
}

/// One temperature bucket aggregated over historical attempts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemperatureBucket {
    /// Bucket representative temperature (rounded to the bucket step)
    pub temperature: f64,
    pub total: u32,
    pub successes: u32,
    pub mean_human_score: f64,
}

impl TemperatureBucket {
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.successes as f64 / self.total as f64
        }
    }
}

/// Append-only feedback store.
pub struct FeedbackStore {
    conn: Arc<Mutex<Connection>>,
}

impl FeedbackStore {
    /// Open (or create) the store at the given path.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create feedback store directory")?;
        }

        let conn = Connection::open(&path)
            .with_context(|| format!("Failed to open feedback store at {}", path.display()))?;
        Self::configure(&conn)?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory store, used by tests and the audit dry-run path.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::configure(&conn)?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn configure(conn: &Connection) -> Result<()> {
        // WAL for concurrent readers; busy_timeout makes write contention
        // from parallel requests transient rather than fatal.
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;
             PRAGMA busy_timeout=5000;
             PRAGMA foreign_keys=ON;",
        )?;
        Ok(())
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS attempts (
                id TEXT PRIMARY KEY,
                topic TEXT NOT NULL,
                topic_category TEXT NOT NULL,
                component_type TEXT NOT NULL,
                temperature REAL NOT NULL,
                persona_params TEXT NOT NULL,
                enrichment_params TEXT NOT NULL,
                attempt_number INTEGER NOT NULL,
                generated_text TEXT NOT NULL,
                ai_score REAL NOT NULL,
                human_score REAL NOT NULL,
                readability_score REAL,
                success INTEGER NOT NULL,
                failure_type TEXT NOT NULL DEFAULT 'none',
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS sentence_scores (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                attempt_id TEXT NOT NULL,
                idx INTEGER NOT NULL,
                sentence TEXT NOT NULL,
                score REAL NOT NULL,
                FOREIGN KEY (attempt_id) REFERENCES attempts(id)
            );

            CREATE TABLE IF NOT EXISTS corrections (
                id TEXT PRIMARY KEY,
                attempt_id TEXT NOT NULL,
                corrected_text TEXT NOT NULL,
                correction_type TEXT NOT NULL,
                approved INTEGER NOT NULL DEFAULT 0,
                notes TEXT,
                created_at TEXT NOT NULL,
                FOREIGN KEY (attempt_id) REFERENCES attempts(id)
            );

            CREATE INDEX IF NOT EXISTS idx_attempts_created ON attempts(created_at DESC);
            CREATE INDEX IF NOT EXISTS idx_attempts_bucket
                ON attempts(topic_category, component_type);
            CREATE INDEX IF NOT EXISTS idx_sentence_scores_attempt
                ON sentence_scores(attempt_id);
            CREATE INDEX IF NOT EXISTS idx_corrections_attempt
                ON corrections(attempt_id);
            "#,
        )?;
        Ok(())
    }

    /// Append one attempt row. Returns the new attempt id.
    pub async fn append_attempt(&self, attempt: &NewAttempt) -> Result<String> {
        let conn = self.conn.lock().await;
        let id = Uuid::new_v4().to_string();

        let persona_json = serde_json::to_string(&attempt.params.persona)?;
        let enrichment_json = serde_json::to_string(&attempt.params.enrichment)?;
        let failure = attempt
            .failure_type
            .map(|f| f.to_string())
            .unwrap_or_else(|| "none".to_string());

        conn.execute(
            r#"INSERT INTO attempts
               (id, topic, topic_category, component_type, temperature,
                persona_params, enrichment_params, attempt_number, generated_text,
                ai_score, human_score, readability_score, success, failure_type, created_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)"#,
            params![
                id,
                attempt.topic,
                attempt.topic_category,
                attempt.component_type,
                attempt.params.temperature,
                persona_json,
                enrichment_json,
                attempt.attempt_number,
                attempt.generated_text,
                attempt.ai_score,
                attempt.human_score,
                attempt.readability_score,
                attempt.success as i32,
                failure,
                Utc::now().to_rfc3339(),
            ],
        )?;

        Ok(id)
    }

    /// Append the per-sentence scores for an attempt.
    pub async fn append_sentence_scores(
        &self,
        attempt_id: &str,
        scores: &[(String, f64)],
    ) -> Result<()> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "INSERT INTO sentence_scores (attempt_id, idx, sentence, score)
             VALUES (?1, ?2, ?3, ?4)",
        )?;
        for (idx, (sentence, score)) in scores.iter().enumerate() {
            stmt.execute(params![attempt_id, idx as i64, sentence, score])?;
        }
        Ok(())
    }

    /// Append a human correction for an existing attempt.
    pub async fn append_correction(
        &self,
        attempt_id: &str,
        corrected_text: &str,
        correction_type: &str,
        approved: bool,
        notes: Option<&str>,
    ) -> Result<String> {
        let conn = self.conn.lock().await;

        let exists: Option<String> = conn
            .query_row(
                "SELECT id FROM attempts WHERE id = ?1",
                params![attempt_id],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_none() {
            anyhow::bail!("attempt {} not found", attempt_id);
        }

        let id = Uuid::new_v4().to_string();
        conn.execute(
            r#"INSERT INTO corrections
               (id, attempt_id, corrected_text, correction_type, approved, notes, created_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"#,
            params![
                id,
                attempt_id,
                corrected_text,
                correction_type,
                approved as i32,
                notes,
                Utc::now().to_rfc3339(),
            ],
        )?;

        Ok(id)
    }

    /// Fetch a single attempt by id.
    pub async fn get_attempt(&self, id: &str) -> Result<Option<AttemptRecord>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {} FROM attempts WHERE id = ?1",
            ATTEMPT_COLUMNS
        ))?;
        let record = stmt
            .query_row(params![id], row_to_attempt)
            .optional()?;
        Ok(record)
    }

    /// Query attempts, newest first.
    pub async fn query_attempts(&self, filter: &AttemptFilter) -> Result<Vec<AttemptRecord>> {
        let conn = self.conn.lock().await;

        let mut sql = format!("SELECT {} FROM attempts WHERE 1=1", ATTEMPT_COLUMNS);
        let mut values: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(topic) = &filter.topic {
            sql.push_str(&format!(" AND topic = ?{}", values.len() + 1));
            values.push(Box::new(topic.clone()));
        }
        if let Some(category) = &filter.topic_category {
            sql.push_str(&format!(" AND topic_category = ?{}", values.len() + 1));
            values.push(Box::new(category.clone()));
        }
        if let Some(component) = &filter.component_type {
            sql.push_str(&format!(" AND component_type = ?{}", values.len() + 1));
            values.push(Box::new(component.clone()));
        }
        sql.push_str(" ORDER BY created_at DESC, attempt_number DESC");
        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(
            rusqlite::params_from_iter(values.iter().map(|v| v.as_ref())),
            row_to_attempt,
        )?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    /// Per-sentence scores for an attempt, in order.
    pub async fn sentence_scores(&self, attempt_id: &str) -> Result<Vec<SentenceScoreRow>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT attempt_id, idx, sentence, score FROM sentence_scores
             WHERE attempt_id = ?1 ORDER BY idx",
        )?;
        let rows = stmt.query_map(params![attempt_id], |row| {
            Ok(SentenceScoreRow {
                attempt_id: row.get(0)?,
                idx: row.get::<_, i64>(1)? as u32,
                sentence: row.get(2)?,
                score: row.get(3)?,
            })
        })?;
        let mut scores = Vec::new();
        for row in rows {
            scores.push(row?);
        }
        Ok(scores)
    }

    /// Corrections for an attempt.
    pub async fn corrections(&self, attempt_id: &str) -> Result<Vec<CorrectionRecord>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT id, attempt_id, corrected_text, correction_type, approved, notes, created_at
             FROM corrections WHERE attempt_id = ?1 ORDER BY created_at",
        )?;
        let rows = stmt.query_map(params![attempt_id], |row| {
            let created_at_str: String = row.get(6)?;
            Ok(CorrectionRecord {
                id: row.get(0)?,
                attempt_id: row.get(1)?,
                corrected_text: row.get(2)?,
                correction_type: row.get(3)?,
                approved: row.get::<_, i32>(4)? != 0,
                notes: row.get(5)?,
                created_at: parse_timestamp(&created_at_str),
            })
        })?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    /// Rolling success rate over the trailing `window` attempts for a
    /// (topic-category, component) bucket. None when there is no history.
    ///
    /// Always computed on demand from the append-only rows; there is no
    /// cached counter to drift.
    pub async fn rolling_success_rate(
        &self,
        topic_category: &str,
        component_type: &str,
        window: u32,
    ) -> Result<Option<f64>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT success FROM attempts
             WHERE topic_category = ?1 AND component_type = ?2
             ORDER BY created_at DESC LIMIT ?3",
        )?;
        let rows = stmt.query_map(params![topic_category, component_type, window], |row| {
            row.get::<_, i32>(0)
        })?;

        let mut total = 0u32;
        let mut successes = 0u32;
        for row in rows {
            total += 1;
            if row? != 0 {
                successes += 1;
            }
        }

        if total == 0 {
            Ok(None)
        } else {
            Ok(Some(successes as f64 / total as f64))
        }
    }

    /// Temperature-bucket aggregates for the advisors. Buckets are
    /// `round(temperature / step) * step`.
    pub async fn query_aggregates(
        &self,
        topic_category: Option<&str>,
        component_type: Option<&str>,
        bucket_step: f64,
    ) -> Result<Vec<TemperatureBucket>> {
        // Bucketing happens in Rust; float bucket arithmetic in SQLite
        // rounds differently across versions.
        let conn = self.conn.lock().await;
        let mut sql = String::from(
            "SELECT temperature, success, human_score FROM attempts WHERE 1=1",
        );
        let mut values: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        if let Some(category) = topic_category {
            sql.push_str(&format!(" AND topic_category = ?{}", values.len() + 1));
            values.push(Box::new(category.to_string()));
        }
        if let Some(component) = component_type {
            sql.push_str(&format!(" AND component_type = ?{}", values.len() + 1));
            values.push(Box::new(component.to_string()));
        }

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(
            rusqlite::params_from_iter(values.iter().map(|v| v.as_ref())),
            |row| {
                Ok((
                    row.get::<_, f64>(0)?,
                    row.get::<_, i32>(1)?,
                    row.get::<_, f64>(2)?,
                ))
            },
        )?;

        use std::collections::BTreeMap;
        // Keyed by integer bucket index so float noise cannot split buckets.
        let mut buckets: BTreeMap<i64, (u32, u32, f64)> = BTreeMap::new();
        for row in rows {
            let (temperature, success, human_score) = row?;
            let key = (temperature / bucket_step).round() as i64;
            let entry = buckets.entry(key).or_insert((0, 0, 0.0));
            entry.0 += 1;
            if success != 0 {
                entry.1 += 1;
            }
            entry.2 += human_score;
        }

        Ok(buckets
            .into_iter()
            .map(|(key, (total, successes, human_sum))| TemperatureBucket {
                temperature: key as f64 * bucket_step,
                total,
                successes,
                mean_human_score: human_sum / total as f64,
            })
            .collect())
    }

    /// Total attempt count, used by reports.
    pub async fn attempt_count(&self) -> Result<u32> {
        let conn = self.conn.lock().await;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM attempts", [], |row| row.get(0))?;
        Ok(count as u32)
    }
}

const ATTEMPT_COLUMNS: &str = "id, topic, topic_category, component_type, temperature, \
     persona_params, enrichment_params, attempt_number, generated_text, \
     ai_score, human_score, readability_score, success, failure_type, created_at";

fn row_to_attempt(row: &rusqlite::Row<'_>) -> rusqlite::Result<AttemptRecord> {
    let persona_json: String = row.get(5)?;
    let enrichment_json: String = row.get(6)?;
    let failure_str: String = row.get(13)?;
    let created_at_str: String = row.get(14)?;

    Ok(AttemptRecord {
        id: row.get(0)?,
        topic: row.get(1)?,
        topic_category: row.get(2)?,
        component_type: row.get(3)?,
        temperature: row.get(4)?,
        persona_params: serde_json::from_str(&persona_json).unwrap_or_default(),
        enrichment_params: serde_json::from_str(&enrichment_json).unwrap_or_default(),
        attempt_number: row.get::<_, i64>(7)? as u32,
        generated_text: row.get(8)?,
        ai_score: row.get(9)?,
        human_score: row.get(10)?,
        readability_score: row.get(11)?,
        success: row.get::<_, i32>(12)? != 0,
        failure_type: FailureType::parse(&failure_str),
        created_at: parse_timestamp(&created_at_str),
    })
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GenParams;

    fn sample_attempt(success: bool, temperature: f64) -> NewAttempt {
        NewAttempt {
            topic: "Aluminum".to_string(),
            topic_category: "metals".to_string(),
            component_type: "caption".to_string(),
            params: GenParams::with_temperature(temperature),
            attempt_number: 1,
            generated_text: "Light but strong. We bend it all day.".to_string(),
            ai_score: if success { 0.25 } else { 0.85 },
            human_score: if success { 0.75 } else { 0.15 },
            readability_score: Some(72.5),
            success,
            failure_type: if success { None } else { Some(FailureType::Uniform) },
        }
    }

    #[tokio::test]
    async fn test_append_then_query_round_trips_exactly() {
        let store = FeedbackStore::in_memory().unwrap();
        let mut attempt = sample_attempt(true, 0.65);
        attempt.params.persona.irregularity = 0.45;
        attempt.params.enrichment.fact_density = 0.8;

        let id = store.append_attempt(&attempt).await.unwrap();
        let loaded = store.get_attempt(&id).await.unwrap().unwrap();

        assert_eq!(loaded.temperature, 0.65);
        assert_eq!(loaded.ai_score, 0.25);
        assert_eq!(loaded.human_score, 0.75);
        assert_eq!(loaded.readability_score, Some(72.5));
        assert!(loaded.success);
        assert_eq!(loaded.failure_type, None);
        assert_eq!(loaded.persona_params.irregularity, 0.45);
        assert_eq!(loaded.enrichment_params.fact_density, 0.8);
        assert_eq!(loaded.generated_text, attempt.generated_text);
    }

    #[tokio::test]
    async fn test_sentence_scores_reference_attempt() {
        let store = FeedbackStore::in_memory().unwrap();
        let id = store.append_attempt(&sample_attempt(false, 0.6)).await.unwrap();

        store
            .append_sentence_scores(
                &id,
                &[
                    ("Light but strong.".to_string(), 0.9),
                    ("We bend it all day.".to_string(), 0.92),
                ],
            )
            .await
            .unwrap();

        let scores = store.sentence_scores(&id).await.unwrap();
        assert_eq!(scores.len(), 2);
        assert_eq!(scores[0].idx, 0);
        assert_eq!(scores[1].score, 0.92);
    }

    #[tokio::test]
    async fn test_correction_requires_existing_attempt() {
        let store = FeedbackStore::in_memory().unwrap();
        let err = store
            .append_correction("no-such-id", "better text", "style", true, None)
            .await;
        assert!(err.is_err());

        let id = store.append_attempt(&sample_attempt(false, 0.6)).await.unwrap();
        store
            .append_correction(&id, "better text", "style", true, Some("tightened"))
            .await
            .unwrap();
        let corrections = store.corrections(&id).await.unwrap();
        assert_eq!(corrections.len(), 1);
        assert!(corrections[0].approved);
    }

    #[tokio::test]
    async fn test_rolling_success_rate() {
        let store = FeedbackStore::in_memory().unwrap();
        assert_eq!(
            store.rolling_success_rate("metals", "caption", 50).await.unwrap(),
            None
        );

        for success in [true, true, false, true] {
            store.append_attempt(&sample_attempt(success, 0.7)).await.unwrap();
        }

        let rate = store
            .rolling_success_rate("metals", "caption", 50)
            .await
            .unwrap()
            .unwrap();
        assert!((rate - 0.75).abs() < 1e-9);

        // Other buckets are unaffected.
        assert_eq!(
            store.rolling_success_rate("metals", "faq", 50).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_query_aggregates_buckets_by_step() {
        let store = FeedbackStore::in_memory().unwrap();
        // 0.64 and 0.66 land in the 0.65 bucket at step 0.05
        for temp in [0.64, 0.66, 0.65] {
            store.append_attempt(&sample_attempt(true, temp)).await.unwrap();
        }
        store.append_attempt(&sample_attempt(false, 0.75)).await.unwrap();

        let buckets = store
            .query_aggregates(Some("metals"), Some("caption"), 0.05)
            .await
            .unwrap();
        assert_eq!(buckets.len(), 2);

        let low = buckets.iter().find(|b| (b.temperature - 0.65).abs() < 1e-9).unwrap();
        assert_eq!(low.total, 3);
        assert_eq!(low.successes, 3);

        let high = buckets.iter().find(|b| (b.temperature - 0.75).abs() < 1e-9).unwrap();
        assert_eq!(high.total, 1);
        assert_eq!(high.successes, 0);
    }
}
