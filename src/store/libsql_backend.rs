//! libSQL backend: async `RecordStore` implementation.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::reflection::model::{
    Achievement, GoalHistoryEntry, Student, Tone, parse_date_lenient,
};
use crate::store::migrations;
use crate::store::traits::RecordStore;

const DATE_FORMAT: &str = "%Y-%m-%d";

const STUDENT_COLUMNS: &str = "student_id, nickname, pronoun_code, tone, current_goal, \
     current_success_measures, current_goal_set_date, goal_range, background_info";

const HISTORY_COLUMNS: &str = "student_id, goal_text, goal_set_date, success_measure, \
     outcome_reflection, achievement, interpretation, background_info";

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db)?;
        backend.run_migrations().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests and dry runs).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let backend = Self::from_database(db)?;
        backend.run_migrations().await?;
        Ok(backend)
    }

    fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Convert `Option<&str>` to libsql Value.
fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

fn opt_date(date: Option<NaiveDate>) -> libsql::Value {
    match date {
        Some(d) => libsql::Value::Text(format_date(d)),
        None => libsql::Value::Null,
    }
}

/// Text column that may be NULL or hold a non-text value in old rows.
fn text_or_empty(row: &libsql::Row, idx: i32) -> String {
    row.get::<String>(idx).unwrap_or_default()
}

fn row_to_student(row: &libsql::Row) -> Result<Student, libsql::Error> {
    let set_date: Option<String> = row.get(6).ok();
    let goal_range: Option<String> = row.get(7).ok();

    Ok(Student {
        student_id: row.get(0)?,
        nickname: text_or_empty(row, 1),
        pronoun_code: text_or_empty(row, 2),
        tone: Tone::parse_lenient(&text_or_empty(row, 3)),
        current_goal: text_or_empty(row, 4),
        current_success_measures: text_or_empty(row, 5),
        current_goal_set_date: set_date.as_deref().and_then(parse_date_lenient),
        goal_range: goal_range.filter(|g| !g.trim().is_empty()),
        background_info: text_or_empty(row, 8),
    })
}

fn row_to_history(row: &libsql::Row) -> Result<GoalHistoryEntry, libsql::Error> {
    let set_date: Option<String> = row.get(2).ok();

    Ok(GoalHistoryEntry {
        student_id: row.get(0)?,
        goal_text: text_or_empty(row, 1),
        goal_set_date: set_date.as_deref().and_then(parse_date_lenient),
        success_measure: text_or_empty(row, 3),
        outcome_reflection: text_or_empty(row, 4),
        achievement: Achievement::parse_lenient(&text_or_empty(row, 5)),
        interpretation: text_or_empty(row, 6),
        background_info: text_or_empty(row, 7),
    })
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl RecordStore for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Students ────────────────────────────────────────────────────

    async fn get_student(&self, student_id: &str) -> Result<Option<Student>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {STUDENT_COLUMNS} FROM students WHERE student_id = ?1"),
                params![student_id.trim()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_student: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let student = row_to_student(&row)
                    .map_err(|e| DatabaseError::Query(format!("get_student row parse: {e}")))?;
                Ok(Some(student))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_student: {e}"))),
        }
    }

    async fn create_student(&self, student: &Student) -> Result<bool, DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let inserted = self
            .conn()
            .execute(
                "INSERT OR IGNORE INTO students (
                    student_id, nickname, pronoun_code, tone, current_goal,
                    current_success_measures, current_goal_set_date, goal_range,
                    background_info, created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
                params![
                    student.student_id.as_str(),
                    student.nickname.as_str(),
                    student.pronoun_code.as_str(),
                    student.tone.as_str(),
                    student.current_goal.as_str(),
                    student.current_success_measures.as_str(),
                    opt_date(student.current_goal_set_date),
                    opt_text(student.goal_range.as_deref()),
                    student.background_info.as_str(),
                    now
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("create_student: {e}")))?;

        let created = inserted == 1;
        if created {
            info!(student_id = %student.student_id, "Student registered");
        } else {
            debug!(student_id = %student.student_id, "Student ID already taken");
        }
        Ok(created)
    }

    async fn update_current_goal(
        &self,
        student_id: &str,
        goal: &str,
        success_measures: &str,
        set_date: NaiveDate,
        goal_range: Option<&str>,
        background_info: Option<&str>,
    ) -> Result<bool, DatabaseError> {
        let updated = self
            .conn()
            .execute(
                "UPDATE students SET
                    current_goal = ?2,
                    current_success_measures = ?3,
                    current_goal_set_date = ?4,
                    goal_range = COALESCE(?5, goal_range),
                    background_info = COALESCE(?6, background_info),
                    updated_at = ?7
                 WHERE student_id = ?1",
                params![
                    student_id,
                    goal,
                    success_measures,
                    format_date(set_date),
                    opt_text(goal_range),
                    opt_text(background_info),
                    Utc::now().to_rfc3339()
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("update_current_goal: {e}")))?;

        debug!(student_id, set_date = %set_date, updated, "Current goal updated");
        Ok(updated > 0)
    }

    async fn update_background_info(
        &self,
        student_id: &str,
        background_info: &str,
    ) -> Result<bool, DatabaseError> {
        let updated = self
            .conn()
            .execute(
                "UPDATE students SET background_info = ?2, updated_at = ?3 WHERE student_id = ?1",
                params![student_id, background_info, Utc::now().to_rfc3339()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("update_background_info: {e}")))?;
        Ok(updated > 0)
    }

    // ── Goal history ────────────────────────────────────────────────

    async fn append_history_entry(&self, entry: &GoalHistoryEntry) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                &format!(
                    "INSERT INTO goal_history (id, {HISTORY_COLUMNS}, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
                ),
                params![
                    Uuid::new_v4().to_string(),
                    entry.student_id.as_str(),
                    entry.goal_text.as_str(),
                    opt_date(entry.goal_set_date),
                    entry.success_measure.as_str(),
                    entry.outcome_reflection.as_str(),
                    entry.achievement.to_stored(),
                    entry.interpretation.as_str(),
                    entry.background_info.as_str(),
                    Utc::now().to_rfc3339()
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("append_history_entry: {e}")))?;

        debug!(
            student_id = %entry.student_id,
            achievement = %entry.achievement.to_stored(),
            "History entry appended"
        );
        Ok(())
    }

    async fn get_history_for_student(
        &self,
        student_id: &str,
    ) -> Result<Vec<GoalHistoryEntry>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {HISTORY_COLUMNS} FROM goal_history
                     WHERE student_id = ?1 ORDER BY rowid ASC"
                ),
                params![student_id.trim()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_history_for_student: {e}")))?;

        let mut entries = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("get_history_for_student: {e}")))?
        {
            entries.push(row_to_history(&row).map_err(|e| {
                DatabaseError::Query(format!("get_history_for_student row parse: {e}"))
            })?);
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_db() -> LibSqlBackend {
        LibSqlBackend::new_memory().await.unwrap()
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, DATE_FORMAT).unwrap()
    }

    fn entry(student_id: &str, goal: &str, achievement: Achievement) -> GoalHistoryEntry {
        GoalHistoryEntry {
            student_id: student_id.into(),
            goal_text: goal.into(),
            goal_set_date: Some(date("2026-03-01")),
            success_measure: "once per class".into(),
            outcome_reflection: format!("reflection for {goal}"),
            achievement,
            interpretation: "Met goal".into(),
            background_info: "likes art".into(),
        }
    }

    // ── Student tests ───────────────────────────────────────────────

    #[tokio::test]
    async fn create_and_get_student() {
        let db = test_db().await;
        let student = Student::new("100", "Sam", "he/him", Tone::Challenger);

        assert!(db.create_student(&student).await.unwrap());

        let fetched = db.get_student("100").await.unwrap().unwrap();
        assert_eq!(fetched, student);
    }

    #[tokio::test]
    async fn get_student_not_found() {
        let db = test_db().await;
        assert!(db.get_student("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_student_not_created() {
        let db = test_db().await;
        let first = Student::new("100", "Sam", "", Tone::Coach);
        let second = Student::new("100", "Other", "", Tone::Reflective);

        assert!(db.create_student(&first).await.unwrap());
        assert!(!db.create_student(&second).await.unwrap());

        let fetched = db.get_student("100").await.unwrap().unwrap();
        assert_eq!(fetched.nickname, "Sam");
    }

    #[tokio::test]
    async fn update_goal_keeps_optional_fields() {
        let db = test_db().await;
        let mut student = Student::new("100", "Sam", "", Tone::Coach);
        student.background_info = "plays guitar".into();
        db.create_student(&student).await.unwrap();

        let updated = db
            .update_current_goal("100", "Goal 3", "twice", date("2026-03-09"), Some("stretch"), None)
            .await
            .unwrap();
        assert!(updated);

        let fetched = db.get_student("100").await.unwrap().unwrap();
        assert_eq!(fetched.current_goal, "Goal 3");
        assert_eq!(fetched.current_success_measures, "twice");
        assert_eq!(fetched.current_goal_set_date, Some(date("2026-03-09")));
        assert_eq!(fetched.goal_range.as_deref(), Some("stretch"));
        assert_eq!(fetched.background_info, "plays guitar");

        db.update_current_goal("100", "Goal 4", "", date("2026-03-10"), None, Some("new info"))
            .await
            .unwrap();
        let fetched = db.get_student("100").await.unwrap().unwrap();
        assert_eq!(fetched.goal_range.as_deref(), Some("stretch"));
        assert_eq!(fetched.background_info, "new info");
    }

    #[tokio::test]
    async fn updates_report_missing_student() {
        let db = test_db().await;
        assert!(
            !db.update_current_goal("ghost", "g", "m", date("2026-03-10"), None, None)
                .await
                .unwrap()
        );
        assert!(!db.update_background_info("ghost", "x").await.unwrap());
    }

    #[tokio::test]
    async fn update_background_info() {
        let db = test_db().await;
        db.create_student(&Student::new("100", "", "", Tone::Reflective))
            .await
            .unwrap();
        assert!(db.update_background_info("100", "Feeling: calm").await.unwrap());
        let fetched = db.get_student("100").await.unwrap().unwrap();
        assert_eq!(fetched.background_info, "Feeling: calm");
    }

    #[tokio::test]
    async fn lenient_student_fields() {
        let db = test_db().await;
        db.conn()
            .execute(
                "INSERT INTO students (student_id, tone, current_goal_set_date, goal_range)
                 VALUES ('7', 'LOUD', '3/5/2026', '')",
                (),
            )
            .await
            .unwrap();

        let fetched = db.get_student("7").await.unwrap().unwrap();
        assert_eq!(fetched.tone, Tone::Reflective);
        assert_eq!(fetched.current_goal_set_date, Some(date("2026-03-05")));
        assert_eq!(fetched.goal_range, None);
    }

    // ── History tests ───────────────────────────────────────────────

    #[tokio::test]
    async fn history_in_insertion_order() {
        let db = test_db().await;
        db.append_history_entry(&entry("100", "Goal 1", Achievement::NoPriorGoal))
            .await
            .unwrap();
        db.append_history_entry(&entry("100", "Goal 2", Achievement::Score(3)))
            .await
            .unwrap();
        db.append_history_entry(&entry("200", "Goal 9", Achievement::Score(0)))
            .await
            .unwrap();
        db.append_history_entry(&entry("100", "Goal 3", Achievement::Score(1)))
            .await
            .unwrap();

        let history = db.get_history_for_student("100").await.unwrap();
        let goals: Vec<&str> = history.iter().map(|e| e.goal_text.as_str()).collect();
        assert_eq!(goals, ["Goal 1", "Goal 2", "Goal 3"]);
        assert_eq!(history[0].achievement, Achievement::NoPriorGoal);
        assert_eq!(history[1], entry("100", "Goal 2", Achievement::Score(3)));
    }

    #[tokio::test]
    async fn history_empty_for_unknown_student() {
        let db = test_db().await;
        assert!(db.get_history_for_student("100").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_history_values_are_tolerated() {
        let db = test_db().await;
        db.conn()
            .execute(
                "INSERT INTO goal_history (id, student_id, goal_set_date, achievement)
                 VALUES ('a', '100', 'someday', 'kind of')",
                (),
            )
            .await
            .unwrap();

        let history = db.get_history_for_student("100").await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].goal_set_date, None);
        assert_eq!(history[0].achievement, Achievement::Unrated("kind of".into()));
    }

    #[tokio::test]
    async fn local_file_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("goal-reflect.db");

        {
            let db = LibSqlBackend::new_local(&path).await.unwrap();
            db.create_student(&Student::new("300", "Ari", "", Tone::Coach))
                .await
                .unwrap();
        }

        let db = LibSqlBackend::new_local(&path).await.unwrap();
        assert_eq!(db.get_student("300").await.unwrap().unwrap().nickname, "Ari");
    }
}
