use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use std::path::Path;
use uuid::Uuid;

use crate::models::{
    LactateProtocol, LactateTest, Metrics, NewTest, StagePoint, StagePointInput,
    DEFAULT_TEST_TITLE,
};

/// Database error types
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(rusqlite::Error),
    #[error("Database is busy: {0}")]
    Busy(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Lactate test not found: {0}")]
    TestNotFound(String),
    #[error("Invalid stage point: {0}")]
    InvalidPoint(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(code, message)
                if matches!(code.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) =>
            {
                StoreError::Busy(message.unwrap_or_else(|| code.to_string()))
            }
            other => StoreError::Sqlite(other),
        }
    }
}

/// Keyed store for lactate tests and their stage points.
///
/// Every operation acts on behalf of the store's owner; tests belonging to
/// someone else are reported as not found. Points are upserted by
/// `(test, stage_index)` and each upsert replaces the whole record.
pub trait PointStore {
    /// Id of the user the store acts for
    fn owner_id(&self) -> &str;

    fn create_test(&mut self, new_test: NewTest) -> Result<LactateTest, StoreError>;

    fn get_test(&self, test_id: &str) -> Result<LactateTest, StoreError>;

    /// Tests of the owner, newest first
    fn list_tests(&self) -> Result<Vec<LactateTest>, StoreError>;

    fn complete_test(&mut self, test_id: &str) -> Result<LactateTest, StoreError>;

    fn update_notes(&mut self, test_id: &str, notes: &str) -> Result<(), StoreError>;

    /// Insert or replace the point at `input.stage_index`
    fn upsert_point(
        &mut self,
        test_id: &str,
        input: StagePointInput,
    ) -> Result<StagePoint, StoreError>;

    /// Upsert a batch of points atomically
    fn import_points(
        &mut self,
        test_id: &str,
        rows: Vec<StagePointInput>,
    ) -> Result<Vec<StagePoint>, StoreError>;

    /// Points of a test ordered by stage index
    fn points_for_test(&self, test_id: &str) -> Result<Vec<StagePoint>, StoreError>;
}

/// SQLite-backed [`PointStore`]
pub struct SqliteStore {
    conn: Connection,
    owner_id: String,
}

impl SqliteStore {
    /// Create or open a database at the specified path
    pub fn open<P: AsRef<Path>>(db_path: P, owner_id: impl Into<String>) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(db_path.as_ref())?;
        tracing::debug!(path = %db_path.as_ref().display(), "Opened lactate database");
        Self::with_connection(conn, owner_id)
    }

    /// In-memory database, mostly for tests and one-off analysis
    pub fn open_in_memory(owner_id: impl Into<String>) -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?, owner_id)
    }

    fn with_connection(conn: Connection, owner_id: impl Into<String>) -> Result<Self, StoreError> {
        let store = Self {
            conn,
            owner_id: owner_id.into(),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Initialize database schema with tables and indexes
    fn init_schema(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS lactate_tests (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                title TEXT NOT NULL,
                sport TEXT NOT NULL DEFAULT 'running',
                protocol TEXT NOT NULL,
                started_at TEXT,
                completed_at TEXT,
                notes TEXT,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS lactate_points (
                id TEXT PRIMARY KEY,
                test_id TEXT NOT NULL,
                owner_id TEXT NOT NULL,
                stage_index INTEGER NOT NULL CHECK (stage_index >= 0),
                pace_seconds_per_km REAL NOT NULL,
                speed_kmh REAL,
                lactate_mmol REAL NOT NULL,
                hr_bpm INTEGER,
                rpe INTEGER,
                comments TEXT,
                metrics TEXT NOT NULL DEFAULT '{}',
                measured_at TEXT NOT NULL,
                created_at TEXT NOT NULL,

                UNIQUE (test_id, stage_index),
                FOREIGN KEY (test_id) REFERENCES lactate_tests (id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_tests_owner_created
                ON lactate_tests (owner_id, created_at);
            "#,
        )?;
        Ok(())
    }

    fn require_test(conn: &Connection, owner_id: &str, test_id: &str) -> Result<LactateTest, StoreError> {
        conn.query_row(
            "SELECT id, owner_id, title, sport, protocol, started_at, completed_at, notes, created_at
             FROM lactate_tests WHERE id = ?1 AND owner_id = ?2",
            params![test_id, owner_id],
            Self::row_to_test,
        )
        .optional()?
        .ok_or_else(|| StoreError::TestNotFound(test_id.to_string()))
    }

    fn write_point(
        conn: &Connection,
        owner_id: &str,
        test_id: &str,
        input: StagePointInput,
    ) -> Result<StagePoint, StoreError> {
        if !input.lactate_mmol.is_finite() || !input.pace_seconds_per_km.is_finite() {
            return Err(StoreError::InvalidPoint(format!(
                "stage {} needs a finite pace and lactate value",
                input.stage_index
            )));
        }

        let now = Utc::now();
        let point = input.into_point(now);
        let metrics = serde_json::to_string(&point.metrics)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        conn.execute(
            r#"
            INSERT INTO lactate_points (
                id, test_id, owner_id, stage_index, pace_seconds_per_km, speed_kmh,
                lactate_mmol, hr_bpm, rpe, comments, metrics, measured_at, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            ON CONFLICT (test_id, stage_index) DO UPDATE SET
                pace_seconds_per_km = excluded.pace_seconds_per_km,
                speed_kmh = excluded.speed_kmh,
                lactate_mmol = excluded.lactate_mmol,
                hr_bpm = excluded.hr_bpm,
                rpe = excluded.rpe,
                comments = excluded.comments,
                metrics = excluded.metrics,
                measured_at = excluded.measured_at
            "#,
            params![
                Uuid::new_v4().to_string(),
                test_id,
                owner_id,
                point.stage_index,
                point.pace_seconds_per_km,
                point.speed_kmh,
                point.lactate_mmol,
                point.hr_bpm,
                point.rpe,
                point.comments,
                metrics,
                point.measured_at,
                now,
            ],
        )?;

        Ok(point)
    }

    fn row_to_test(row: &Row) -> rusqlite::Result<LactateTest> {
        let protocol_json: String = row.get(4)?;
        let protocol: LactateProtocol = serde_json::from_str(&protocol_json)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?;

        Ok(LactateTest {
            id: row.get(0)?,
            owner_id: row.get(1)?,
            title: row.get(2)?,
            sport: row.get(3)?,
            protocol,
            started_at: row.get::<_, Option<DateTime<Utc>>>(5)?,
            completed_at: row.get::<_, Option<DateTime<Utc>>>(6)?,
            notes: row.get(7)?,
            created_at: row.get(8)?,
        })
    }

    fn row_to_point(row: &Row) -> rusqlite::Result<StagePoint> {
        let metrics_json: String = row.get(7)?;
        let metrics: Metrics = serde_json::from_str(&metrics_json)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(7, Type::Text, Box::new(e)))?;

        Ok(StagePoint {
            stage_index: row.get(0)?,
            pace_seconds_per_km: row.get(1)?,
            speed_kmh: row.get(2)?,
            lactate_mmol: row.get(3)?,
            hr_bpm: row.get(4)?,
            rpe: row.get(5)?,
            comments: row.get(6)?,
            metrics,
            measured_at: row.get(8)?,
        })
    }
}

impl PointStore for SqliteStore {
    fn owner_id(&self) -> &str {
        &self.owner_id
    }

    fn create_test(&mut self, new_test: NewTest) -> Result<LactateTest, StoreError> {
        let now = Utc::now();
        let title = new_test
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(DEFAULT_TEST_TITLE)
            .to_string();

        let test = LactateTest {
            id: Uuid::new_v4().to_string(),
            owner_id: self.owner_id.clone(),
            title,
            sport: "running".to_string(),
            protocol: new_test.protocol.unwrap_or_default(),
            started_at: Some(now),
            completed_at: None,
            notes: new_test.notes,
            created_at: now,
        };
        let protocol = serde_json::to_string(&test.protocol)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        self.conn.execute(
            "INSERT INTO lactate_tests (id, owner_id, title, sport, protocol, started_at, completed_at, notes, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                test.id,
                test.owner_id,
                test.title,
                test.sport,
                protocol,
                test.started_at,
                test.completed_at,
                test.notes,
                test.created_at,
            ],
        )?;

        tracing::info!(test_id = %test.id, title = %test.title, "Created lactate test");
        Ok(test)
    }

    fn get_test(&self, test_id: &str) -> Result<LactateTest, StoreError> {
        Self::require_test(&self.conn, &self.owner_id, test_id)
    }

    fn list_tests(&self) -> Result<Vec<LactateTest>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, owner_id, title, sport, protocol, started_at, completed_at, notes, created_at
             FROM lactate_tests WHERE owner_id = ?1 ORDER BY created_at DESC",
        )?;
        let tests = stmt
            .query_map(params![self.owner_id], Self::row_to_test)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tests)
    }

    fn complete_test(&mut self, test_id: &str) -> Result<LactateTest, StoreError> {
        let updated = self.conn.execute(
            "UPDATE lactate_tests SET completed_at = ?1 WHERE id = ?2 AND owner_id = ?3",
            params![Utc::now(), test_id, self.owner_id],
        )?;
        if updated == 0 {
            return Err(StoreError::TestNotFound(test_id.to_string()));
        }
        tracing::info!(test_id, "Completed lactate test");
        self.get_test(test_id)
    }

    fn update_notes(&mut self, test_id: &str, notes: &str) -> Result<(), StoreError> {
        let updated = self.conn.execute(
            "UPDATE lactate_tests SET notes = ?1 WHERE id = ?2 AND owner_id = ?3",
            params![notes, test_id, self.owner_id],
        )?;
        if updated == 0 {
            return Err(StoreError::TestNotFound(test_id.to_string()));
        }
        Ok(())
    }

    fn upsert_point(
        &mut self,
        test_id: &str,
        input: StagePointInput,
    ) -> Result<StagePoint, StoreError> {
        Self::require_test(&self.conn, &self.owner_id, test_id)?;
        let point = Self::write_point(&self.conn, &self.owner_id, test_id, input)?;
        tracing::info!(test_id, stage = point.stage_index, "Saved stage point");
        Ok(point)
    }

    fn import_points(
        &mut self,
        test_id: &str,
        rows: Vec<StagePointInput>,
    ) -> Result<Vec<StagePoint>, StoreError> {
        let tx = self.conn.transaction()?;
        Self::require_test(&tx, &self.owner_id, test_id)?;

        let mut saved = Vec::with_capacity(rows.len());
        for row in rows {
            saved.push(Self::write_point(&tx, &self.owner_id, test_id, row)?);
        }
        tx.commit()?;

        tracing::info!(test_id, points = saved.len(), "Imported stage points");
        Ok(saved)
    }

    fn points_for_test(&self, test_id: &str) -> Result<Vec<StagePoint>, StoreError> {
        Self::require_test(&self.conn, &self.owner_id, test_id)?;

        let mut stmt = self.conn.prepare(
            "SELECT stage_index, pace_seconds_per_km, speed_kmh, lactate_mmol, hr_bpm, rpe,
                    comments, metrics, measured_at
             FROM lactate_points WHERE test_id = ?1 AND owner_id = ?2
             ORDER BY stage_index ASC",
        )?;
        let points = stmt
            .query_map(params![test_id, self.owner_id], Self::row_to_point)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(points)
    }
}
