//! `RecordStore` trait: the async interface to student and history records.

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::DatabaseError;
use crate::reflection::model::{GoalHistoryEntry, Student};

/// Backend-agnostic persistence for students and their goal history.
///
/// Writes are individual statements; there are no multi-record
/// transactions and concurrent writers race with last-writer-wins.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    // ── Students ────────────────────────────────────────────────────

    /// Look up a student by ID.
    async fn get_student(&self, student_id: &str) -> Result<Option<Student>, DatabaseError>;

    /// Insert a new student. Returns `false` if the ID is already taken.
    async fn create_student(&self, student: &Student) -> Result<bool, DatabaseError>;

    /// Set the student's current goal. `goal_range` and `background_info`
    /// are left unchanged when `None`. Returns `false` if the student does
    /// not exist.
    async fn update_current_goal(
        &self,
        student_id: &str,
        goal: &str,
        success_measures: &str,
        set_date: NaiveDate,
        goal_range: Option<&str>,
        background_info: Option<&str>,
    ) -> Result<bool, DatabaseError>;

    /// Replace the student's background info. Returns `false` if the
    /// student does not exist.
    async fn update_background_info(
        &self,
        student_id: &str,
        background_info: &str,
    ) -> Result<bool, DatabaseError>;

    // ── Goal history ────────────────────────────────────────────────

    /// Append one entry. Entries are never updated afterwards.
    async fn append_history_entry(&self, entry: &GoalHistoryEntry) -> Result<(), DatabaseError>;

    /// All entries for a student in insertion order (oldest first).
    async fn get_history_for_student(
        &self,
        student_id: &str,
    ) -> Result<Vec<GoalHistoryEntry>, DatabaseError>;
}
