//! SQLite-based storage for alarms, questions and dismissal statistics.
//!
//! Provides persistent storage for:
//! - Alarm definitions (the `days` column holds the `, `-joined weekday list)
//! - Multiple-choice questions
//! - One row per finished dismissal session
//! - Key-value store for application state

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::alarm::{validate_time, AlarmDefinition, Recurrence};
use crate::challenge::{starter_questions, AnswerLabel, Question};
use crate::error::{DatabaseError, Result};
use crate::session::{DismissalOutcome, OutcomeReason};

use super::data_dir;
use super::traits::{AlarmStore, ChallengeStore, StatsStore};

/// Aggregate counters over every recorded dismissal.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct StatsSummary {
    pub total: u64,
    pub solved: u64,
    pub exhausted: u64,
    pub cancelled: u64,
    pub average_seconds: f64,
    pub average_attempts: f64,
}

/// SQLite database holding every persistent record.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Get a reference to the underlying SQLite connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Open the database at `~/.config/wakebot/wakebot.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self> {
        Self::open_at(&data_dir()?.join("wakebot.db"))
    }

    /// Open (or create) the database at an explicit path.
    pub fn open_at(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database (for tests and the `ring --simulate` flow).
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> std::result::Result<(), rusqlite::Error> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS alarms (
                id      INTEGER PRIMARY KEY AUTOINCREMENT,
                hour    INTEGER NOT NULL,
                minute  INTEGER NOT NULL,
                active  INTEGER NOT NULL DEFAULT 1,
                days    TEXT NOT NULL DEFAULT ''
            );

            CREATE TABLE IF NOT EXISTS questions (
                id        INTEGER PRIMARY KEY AUTOINCREMENT,
                prompt    TEXT NOT NULL,
                option_a  TEXT NOT NULL,
                option_b  TEXT NOT NULL,
                option_c  TEXT NOT NULL,
                option_d  TEXT NOT NULL,
                correct   TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS stats (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                recorded_at TEXT NOT NULL,
                seconds     INTEGER NOT NULL,
                attempts    INTEGER NOT NULL,
                reason      TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS kv (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_alarms_time ON alarms(hour, minute);
            CREATE INDEX IF NOT EXISTS idx_stats_recorded_at ON stats(recorded_at);",
        )?;
        Ok(())
    }

    /// Insert the starter question set when the question table is empty.
    /// Returns the number of questions inserted.
    pub fn seed_questions(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM questions", [], |row| row.get(0))?;
        if count > 0 {
            return Ok(0);
        }
        let questions = starter_questions();
        for question in &questions {
            self.insert_question(question)?;
        }
        Ok(questions.len())
    }

    pub fn list_questions(&self) -> Result<Vec<Question>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, prompt, option_a, option_b, option_c, option_d, correct
             FROM questions ORDER BY id",
        )?;
        let rows = stmt.query_map([], question_columns)?;
        let mut questions = Vec::new();
        for row in rows {
            questions.push(question_from_columns(row?)?);
        }
        Ok(questions)
    }

    pub fn delete_question(&self, id: i64) -> Result<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM questions WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    pub fn stats_summary(&self) -> Result<StatsSummary> {
        let mut stmt = self.conn.prepare(
            "SELECT reason, COUNT(*), COALESCE(SUM(seconds), 0), COALESCE(SUM(attempts), 0)
             FROM stats
             GROUP BY reason",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, u64>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })?;

        let mut summary = StatsSummary::default();
        let mut seconds = 0i64;
        let mut attempts = 0i64;
        for row in rows {
            let (reason, count, reason_seconds, reason_attempts) = row?;
            summary.total += count;
            seconds += reason_seconds;
            attempts += reason_attempts;
            match OutcomeReason::parse(&reason) {
                Some(OutcomeReason::Solved) => summary.solved += count,
                Some(OutcomeReason::Exhausted) => summary.exhausted += count,
                Some(OutcomeReason::OperatorCancelled) => summary.cancelled += count,
                None => {}
            }
        }
        if summary.total > 0 {
            summary.average_seconds = seconds as f64 / summary.total as f64;
            summary.average_attempts = attempts as f64 / summary.total as f64;
        }
        Ok(summary)
    }

    /// Get a value from the kv store.
    pub fn kv_get(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get::<_, String>(0)
            })
            .optional()?;
        Ok(value)
    }

    /// Set a value in the kv store.
    pub fn kv_set(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }
}

type AlarmColumns = (i64, u32, u32, bool, String);
type QuestionColumns = (i64, String, String, String, String, String, String);

fn alarm_columns(row: &rusqlite::Row<'_>) -> rusqlite::Result<AlarmColumns> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn alarm_from_columns((id, hour, minute, active, days): AlarmColumns) -> Result<AlarmDefinition> {
    validate_time(hour, minute).map_err(|e| DatabaseError::CorruptRow {
        table: "alarms".into(),
        message: e.to_string(),
    })?;
    Ok(AlarmDefinition {
        id,
        hour,
        minute,
        active,
        recurrence: Recurrence::parse_lossy(&days),
    })
}

fn question_columns(row: &rusqlite::Row<'_>) -> rusqlite::Result<QuestionColumns> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
    ))
}

fn question_from_columns(
    (id, prompt, a, b, c, d, correct): QuestionColumns,
) -> Result<Question> {
    let correct = AnswerLabel::parse(&correct).ok_or_else(|| DatabaseError::CorruptRow {
        table: "questions".into(),
        message: format!("question {id} has answer label '{correct}'"),
    })?;
    Ok(Question {
        id,
        prompt,
        options: [a, b, c, d],
        correct,
    })
}

impl AlarmStore for Database {
    fn list_alarms(&self) -> Result<Vec<AlarmDefinition>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, hour, minute, active, days FROM alarms ORDER BY hour, minute, id",
        )?;
        let rows = stmt.query_map([], alarm_columns)?;
        let mut alarms = Vec::new();
        for row in rows {
            alarms.push(alarm_from_columns(row?)?);
        }
        Ok(alarms)
    }

    fn get_alarm(&self, id: i64) -> Result<Option<AlarmDefinition>> {
        let columns = self
            .conn
            .query_row(
                "SELECT id, hour, minute, active, days FROM alarms WHERE id = ?1",
                params![id],
                alarm_columns,
            )
            .optional()?;
        columns.map(alarm_from_columns).transpose()
    }

    fn insert_alarm(&self, alarm: &AlarmDefinition) -> Result<i64> {
        validate_time(alarm.hour, alarm.minute)?;
        self.conn.execute(
            "INSERT INTO alarms (hour, minute, active, days) VALUES (?1, ?2, ?3, ?4)",
            params![
                alarm.hour,
                alarm.minute,
                alarm.active,
                alarm.recurrence.to_stored()
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn update_alarm(&self, alarm: &AlarmDefinition) -> Result<bool> {
        validate_time(alarm.hour, alarm.minute)?;
        let changed = self.conn.execute(
            "UPDATE alarms SET hour = ?1, minute = ?2, active = ?3, days = ?4 WHERE id = ?5",
            params![
                alarm.hour,
                alarm.minute,
                alarm.active,
                alarm.recurrence.to_stored(),
                alarm.id
            ],
        )?;
        Ok(changed > 0)
    }

    fn delete_alarm(&self, id: i64) -> Result<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM alarms WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }
}

impl ChallengeStore for Database {
    fn insert_question(&self, question: &Question) -> Result<i64> {
        question.validate()?;
        let [a, b, c, d] = &question.options;
        self.conn.execute(
            "INSERT INTO questions (prompt, option_a, option_b, option_c, option_d, correct)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![question.prompt, a, b, c, d, question.correct.as_str()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn random_question(&self, exclude: Option<i64>) -> Result<Option<Question>> {
        let columns = self
            .conn
            .query_row(
                "SELECT id, prompt, option_a, option_b, option_c, option_d, correct
                 FROM questions
                 WHERE ?1 IS NULL OR id != ?1
                 ORDER BY RANDOM() LIMIT 1",
                params![exclude],
                question_columns,
            )
            .optional()?;
        columns.map(question_from_columns).transpose()
    }
}

impl StatsStore for Database {
    fn record_outcome(&self, outcome: &DismissalOutcome) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO stats (recorded_at, seconds, attempts, reason) VALUES (?1, ?2, ?3, ?4)",
            params![
                outcome.recorded_at.to_rfc3339(),
                outcome.seconds,
                outcome.attempts,
                outcome.reason.as_str()
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn recent_outcomes(&self, limit: usize) -> Result<Vec<DismissalOutcome>> {
        let mut stmt = self.conn.prepare(
            "SELECT recorded_at, seconds, attempts, reason
             FROM stats ORDER BY recorded_at DESC, id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, u32>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut outcomes = Vec::new();
        for row in rows {
            let (recorded_at, seconds, attempts, reason) = row?;
            let corrupt = |message: String| DatabaseError::CorruptRow {
                table: "stats".into(),
                message,
            };
            let recorded_at = DateTime::parse_from_rfc3339(&recorded_at)
                .map_err(|e| corrupt(e.to_string()))?
                .with_timezone(&Utc);
            let reason = OutcomeReason::parse(&reason)
                .ok_or_else(|| corrupt(format!("unknown reason '{reason}'")))?;
            outcomes.push(DismissalOutcome {
                seconds,
                attempts,
                reason,
                recorded_at,
            });
        }
        Ok(outcomes)
    }
}
