//! SQLite metadata index
//!
//! Mirrors the metadata extracted from archived documents into a small
//! relational index. Every write is an insert-or-replace keyed by the
//! entity id, so re-running over the same archive leaves one row per entity.

use crate::output::records::{CourseRecord, EntityRecord, SemesterRecord, UserRecord};
use crate::output::stats::RunSummary;
use crate::output::traits::{MetadataSink, OutputError, OutputResult};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// SQL schema for the index
pub const INDEX_SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT,
    artifacts_written INTEGER,
    artifacts_reused INTEGER,
    tasks_completed INTEGER,
    tasks_failed INTEGER
);

CREATE TABLE IF NOT EXISTS semesters (
    category_id TEXT PRIMARY KEY,
    semester TEXT NOT NULL,
    faculty TEXT NOT NULL,
    major TEXT NOT NULL,
    label TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS courses (
    course_id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    teachers TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS users (
    user_id TEXT PRIMARY KEY,
    display_name TEXT NOT NULL,
    role TEXT NOT NULL,
    profile_fields TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS user_courses (
    user_id TEXT NOT NULL,
    course_id TEXT NOT NULL,
    PRIMARY KEY (user_id, course_id)
);

CREATE INDEX IF NOT EXISTS idx_user_courses_course ON user_courses(course_id);
"#;

const COUNTED_TABLES: [&str; 4] = ["semesters", "courses", "users", "user_courses"];

/// SQLite-backed [`MetadataSink`]
pub struct SqliteIndex {
    conn: Mutex<Connection>,
    run_id: Mutex<Option<i64>>,
}

impl SqliteIndex {
    /// Opens or creates the index at `path`
    pub fn open(path: &Path) -> OutputResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| OutputError::Unavailable(format!("{}: {}", parent.display(), e)))?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
        ",
        )?;
        Self::with_connection(conn)
    }

    /// Creates an in-memory index (for testing)
    #[cfg(test)]
    pub fn open_in_memory() -> OutputResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> OutputResult<Self> {
        conn.execute_batch(INDEX_SCHEMA_SQL)?;
        Ok(Self {
            conn: Mutex::new(conn),
            run_id: Mutex::new(None),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Opens a run row; [`MetadataSink::finalize`] closes it
    pub fn begin_run(&self, config_hash: Option<&str>) -> OutputResult<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO runs (started_at, config_hash) VALUES (?1, ?2)",
            params![Utc::now().to_rfc3339(), config_hash],
        )?;
        let id = conn.last_insert_rowid();
        *self.run_id.lock().unwrap_or_else(|p| p.into_inner()) = Some(id);
        Ok(id)
    }

    /// Row count per table
    pub fn table_counts(&self) -> OutputResult<BTreeMap<&'static str, u64>> {
        let conn = self.conn();
        let mut counts = BTreeMap::new();
        for table in COUNTED_TABLES {
            let count: i64 =
                conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                    row.get(0)
                })?;
            counts.insert(table, count as u64);
        }
        Ok(counts)
    }

    /// Start time of the most recent run, if any
    pub fn last_run(&self) -> OutputResult<Option<String>> {
        let conn = self.conn();
        let started = conn
            .query_row(
                "SELECT started_at FROM runs ORDER BY id DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(started)
    }

    /// Course ids recorded for a user
    pub fn courses_of(&self, user_id: &str) -> OutputResult<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT course_id FROM user_courses WHERE user_id = ?1 ORDER BY course_id",
        )?;
        let rows = stmt.query_map(params![user_id], |row| row.get(0))?;
        let mut ids = Vec::new();
        for id in rows {
            ids.push(id?);
        }
        Ok(ids)
    }

    fn insert_semester(conn: &Connection, record: &SemesterRecord) -> OutputResult<()> {
        conn.execute(
            "INSERT OR REPLACE INTO semesters
                (category_id, semester, faculty, major, label, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.category_id,
                record.semester,
                record.faculty,
                record.major,
                record.label,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    fn insert_course(conn: &Connection, record: &CourseRecord) -> OutputResult<()> {
        conn.execute(
            "INSERT OR REPLACE INTO courses (course_id, name, teachers, updated_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                record.course_id,
                record.name,
                record.teachers_text,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    fn insert_user(conn: &mut Connection, record: &UserRecord) -> OutputResult<()> {
        let fields = serde_json::to_string(&record.fields)?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT OR REPLACE INTO users
                (user_id, display_name, role, profile_fields, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.user_id,
                record.display_name,
                record.role,
                fields,
                Utc::now().to_rfc3339()
            ],
        )?;
        tx.execute(
            "DELETE FROM user_courses WHERE user_id = ?1",
            params![record.user_id],
        )?;
        for course_id in &record.course_ids {
            tx.execute(
                "INSERT OR IGNORE INTO user_courses (user_id, course_id) VALUES (?1, ?2)",
                params![record.user_id, course_id],
            )?;
        }
        tx.commit()?;
        Ok(())
    }
}

impl MetadataSink for SqliteIndex {
    fn record(&self, record: &EntityRecord) -> OutputResult<()> {
        let mut conn = self.conn();
        match record {
            EntityRecord::Semester(semester) => Self::insert_semester(&conn, semester),
            EntityRecord::Course(course) => Self::insert_course(&conn, course),
            EntityRecord::User(user) => Self::insert_user(&mut conn, user),
        }
    }

    fn finalize(&self, summary: &RunSummary) -> OutputResult<()> {
        let run_id = *self.run_id.lock().unwrap_or_else(|p| p.into_inner());
        let Some(run_id) = run_id else {
            return Ok(());
        };

        self.conn().execute(
            "UPDATE runs SET finished_at = ?1, artifacts_written = ?2, artifacts_reused = ?3,
                tasks_completed = ?4, tasks_failed = ?5
             WHERE id = ?6",
            params![
                Utc::now().to_rfc3339(),
                summary.artifacts_written as i64,
                summary.artifacts_reused as i64,
                summary.tasks_completed as i64,
                summary.tasks_failed as i64,
                run_id
            ],
        )?;
        Ok(())
    }
}
