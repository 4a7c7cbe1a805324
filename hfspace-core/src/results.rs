//! # Results Manager
//!
//! Local library of generated outputs, kept in a single SQLite table
//! (`content_library`). Each row records which Space produced the output,
//! a free-form task description, an output type tag, the output itself (text
//! or a path), the call parameters as JSON and optional notes.
//!
//! Listings are newest first. Timestamps are written as RFC 3339 in UTC;
//! rows written by older tools in `YYYY-MM-DD HH:MM:SS[.ffffff]` form are
//! read as UTC as well.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

const TABLE_NAME: &str = "content_library";

const COLUMNS: &str =
    "id, space_id, task_description, timestamp, output_type, output_data, parameters, notes";

#[derive(Debug, thiserror::Error)]
pub enum ResultsError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Failed to encode parameters: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Database connection lock poisoned")]
    LockPoisoned,
}

pub type ResultsResult<T> = std::result::Result<T, ResultsError>;

/// Kind of output a row holds.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    strum::EnumString,
    strum::Display,
    strum::AsRefStr,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OutputType {
    #[default]
    Text,
    ImagePath,
    AudioPath,
    VideoPath,
    JsonData,
    File,
    Other,
}

/// A row to insert.
#[derive(Debug, Clone, Default)]
pub struct NewResult {
    pub space_id: String,
    pub task_description: String,
    pub output_type: OutputType,
    pub output_data: String,
    pub parameters: Value,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredResult {
    pub id: i64,
    pub space_id: String,
    pub task_description: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub output_type: Option<String>,
    pub output_data: String,
    pub parameters: Option<Value>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ResultFilter {
    pub output_type: Option<OutputType>,
    pub space_id: Option<String>,
    pub task_keyword: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: u32,
    pub offset: u32,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            limit: 20,
            offset: 0,
        }
    }
}

pub struct ResultsStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl ResultsStore {
    /// Opens (creating if needed) the database at `path` and ensures the schema.
    pub fn open(path: impl AsRef<Path>) -> ResultsResult<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        Self::init(conn, Some(path.to_path_buf()))
    }

    pub fn open_in_memory() -> ResultsResult<Self> {
        Self::init(Connection::open_in_memory()?, None)
    }

    /// Store at `generated_content.db` inside `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> ResultsResult<Self> {
        Self::open(dir.as_ref().join(crate::config::RESULTS_DB))
    }

    fn init(conn: Connection, path: Option<PathBuf>) -> ResultsResult<Self> {
        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {TABLE_NAME} (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    space_id TEXT NOT NULL,
                    task_description TEXT,
                    timestamp DATETIME DEFAULT CURRENT_TIMESTAMP,
                    output_type TEXT,
                    output_data TEXT NOT NULL,
                    parameters TEXT,
                    notes TEXT
                )"
            ),
            [],
        )?;
        debug!("Results table '{}' ensured", TABLE_NAME);
        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    /// Backing file, `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn conn(&self) -> ResultsResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| ResultsError::LockPoisoned)
    }

    /// Inserts a row stamped with the current time and returns its id.
    pub fn add_content(&self, result: &NewResult) -> ResultsResult<i64> {
        let parameters = serde_json::to_string(&result.parameters)?;
        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
        let conn = self.conn()?;
        conn.execute(
            &format!(
                "INSERT INTO {TABLE_NAME}
                 (space_id, task_description, output_type, output_data, parameters, notes, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
            ),
            params![
                result.space_id,
                result.task_description,
                result.output_type.as_ref(),
                result.output_data,
                parameters,
                result.notes,
                timestamp,
            ],
        )?;
        let id = conn.last_insert_rowid();
        debug!("Stored result {} for {}", id, result.space_id);
        Ok(id)
    }

    pub fn get_content_by_id(&self, id: i64) -> ResultsResult<Option<StoredResult>> {
        let conn = self.conn()?;
        let record = conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM {TABLE_NAME} WHERE id = ?1"),
                params![id],
                stored_result_from_row,
            )
            .optional()?;
        Ok(record)
    }

    pub fn get_all_content(&self, page: Page) -> ResultsResult<Vec<StoredResult>> {
        self.filter_content(&ResultFilter::default(), page)
    }

    /// Exact match on type and Space, substring match on the task keyword.
    /// Unset criteria match everything.
    pub fn filter_content(
        &self,
        filter: &ResultFilter,
        page: Page,
    ) -> ResultsResult<Vec<StoredResult>> {
        let mut query = format!("SELECT {COLUMNS} FROM {TABLE_NAME} WHERE 1=1");
        let mut values: Vec<rusqlite::types::Value> = Vec::new();

        if let Some(output_type) = filter.output_type {
            query.push_str(" AND output_type = ?");
            values.push(output_type.to_string().into());
        }
        if let Some(space_id) = filter.space_id.as_deref().filter(|s| !s.is_empty()) {
            query.push_str(" AND space_id = ?");
            values.push(space_id.to_string().into());
        }
        if let Some(keyword) = filter.task_keyword.as_deref().filter(|s| !s.is_empty()) {
            query.push_str(" AND task_description LIKE ?");
            values.push(format!("%{}%", keyword).into());
        }
        query.push_str(" ORDER BY timestamp DESC, id DESC LIMIT ? OFFSET ?");
        values.push(i64::from(page.limit).into());
        values.push(i64::from(page.offset).into());

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&query)?;
        let rows = stmt
            .query_map(params_from_iter(values), stored_result_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Returns `false` when no row has `id`.
    pub fn update_content_notes(&self, id: i64, notes: &str) -> ResultsResult<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            &format!("UPDATE {TABLE_NAME} SET notes = ?1 WHERE id = ?2"),
            params![notes, id],
        )?;
        Ok(changed > 0)
    }

    /// Returns `false` when no row has `id`.
    pub fn delete_content(&self, id: i64) -> ResultsResult<bool> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            &format!("DELETE FROM {TABLE_NAME} WHERE id = ?1"),
            params![id],
        )?;
        Ok(deleted > 0)
    }
}

fn stored_result_from_row(row: &Row<'_>) -> rusqlite::Result<StoredResult> {
    let id: i64 = row.get(0)?;
    let raw_timestamp: String = row.get(3)?;
    let timestamp = parse_timestamp(&raw_timestamp).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            Type::Text,
            format!("unrecognized timestamp '{}'", raw_timestamp).into(),
        )
    })?;

    let parameters = row
        .get::<_, Option<String>>(6)?
        .filter(|raw| !raw.is_empty())
        .and_then(|raw| match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Could not decode JSON parameters for row {}: {}", id, e);
                None
            }
        });

    Ok(StoredResult {
        id,
        space_id: row.get(1)?,
        task_description: row.get(2)?,
        timestamp,
        output_type: row.get(4)?,
        output_data: row.get(5)?,
        parameters,
        notes: row.get(7)?,
    })
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
                .ok()
                .map(|t| t.and_utc())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::TempDir;

    fn sample(space_id: &str, task: &str, output_type: OutputType) -> NewResult {
        NewResult {
            space_id: space_id.to_string(),
            task_description: task.to_string(),
            output_type,
            output_data: format!("output of {}", task),
            parameters: json!({"prompt": task, "steps": 20}),
            notes: None,
        }
    }

    fn seeded() -> ResultsStore {
        let store = ResultsStore::open_in_memory().unwrap();
        store
            .add_content(&sample("user/image-gen", "a red cat", OutputType::ImagePath))
            .unwrap();
        store
            .add_content(&sample("user/chat", "summarize the news", OutputType::Text))
            .unwrap();
        store
            .add_content(&sample("user/image-gen", "a blue dog", OutputType::ImagePath))
            .unwrap();
        store
    }

    #[test]
    fn test_add_and_get_round_trip() {
        let store = ResultsStore::open_in_memory().unwrap();
        let mut new = sample("user/space", "test task", OutputType::Text);
        new.notes = Some("first".to_string());
        let id = store.add_content(&new).unwrap();

        let stored = store.get_content_by_id(id).unwrap().unwrap();
        assert_eq!(stored.id, id);
        assert_eq!(stored.space_id, "user/space");
        assert_eq!(stored.task_description.as_deref(), Some("test task"));
        assert_eq!(stored.output_type.as_deref(), Some("text"));
        assert_eq!(stored.parameters, Some(json!({"prompt": "test task", "steps": 20})));
        assert_eq!(stored.notes.as_deref(), Some("first"));
        assert!(Utc::now() - stored.timestamp < chrono::Duration::minutes(1));

        assert!(store.get_content_by_id(id + 100).unwrap().is_none());
    }

    #[test]
    fn test_list_newest_first_with_paging() {
        let store = seeded();
        let all = store.get_all_content(Page::default()).unwrap();
        let tasks: Vec<_> = all
            .iter()
            .map(|r| r.task_description.clone().unwrap())
            .collect();
        assert_eq!(tasks, vec!["a blue dog", "summarize the news", "a red cat"]);

        let second = store
            .get_all_content(Page {
                limit: 1,
                offset: 1,
            })
            .unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].id, all[1].id);
    }

    #[test]
    fn test_filter_content() {
        let store = seeded();

        let images = store
            .filter_content(
                &ResultFilter {
                    output_type: Some(OutputType::ImagePath),
                    ..Default::default()
                },
                Page::default(),
            )
            .unwrap();
        assert_eq!(images.len(), 2);

        let chat = store
            .filter_content(
                &ResultFilter {
                    space_id: Some("user/chat".to_string()),
                    ..Default::default()
                },
                Page::default(),
            )
            .unwrap();
        assert_eq!(chat.len(), 1);

        let dogs = store
            .filter_content(
                &ResultFilter {
                    output_type: Some(OutputType::ImagePath),
                    task_keyword: Some("dog".to_string()),
                    ..Default::default()
                },
                Page::default(),
            )
            .unwrap();
        assert_eq!(dogs.len(), 1);
        assert_eq!(dogs[0].task_description.as_deref(), Some("a blue dog"));

        let none = store
            .filter_content(
                &ResultFilter {
                    output_type: Some(OutputType::AudioPath),
                    ..Default::default()
                },
                Page::default(),
            )
            .unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn test_update_and_delete_report_existence() {
        let store = seeded();
        let id = store.get_all_content(Page::default()).unwrap()[0].id;

        assert!(store.update_content_notes(id, "keep this one").unwrap());
        assert_eq!(
            store.get_content_by_id(id).unwrap().unwrap().notes.as_deref(),
            Some("keep this one")
        );
        assert!(!store.update_content_notes(9999, "nope").unwrap());

        assert!(store.delete_content(id).unwrap());
        assert!(!store.delete_content(id).unwrap());
        assert!(store.get_content_by_id(id).unwrap().is_none());
    }

    #[test]
    fn test_undecodable_parameters_read_as_none() {
        let store = ResultsStore::open_in_memory().unwrap();
        {
            let conn = store.conn().unwrap();
            conn.execute(
                "INSERT INTO content_library (space_id, output_data, parameters, timestamp)
                 VALUES ('a/b', 'out', '{not json', '2024-05-01 10:20:30.123456')",
                [],
            )
            .unwrap();
        }
        let all = store.get_all_content(Page::default()).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].parameters, None);
        assert_eq!(
            all[0].timestamp.to_rfc3339_opts(SecondsFormat::Micros, true),
            "2024-05-01T10:20:30.123456Z"
        );
    }

    #[test]
    fn test_open_file_is_persistent_and_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let id = {
            let store = ResultsStore::in_dir(temp_dir.path()).unwrap();
            store
                .add_content(&sample("a/b", "persist me", OutputType::Other))
                .unwrap()
        };
        let store = ResultsStore::in_dir(temp_dir.path()).unwrap();
        assert_eq!(
            store.path(),
            Some(temp_dir.path().join("generated_content.db").as_path())
        );
        assert!(store.get_content_by_id(id).unwrap().is_some());
    }

    #[test]
    fn test_output_type_names() {
        assert_eq!(OutputType::ImagePath.to_string(), "image_path");
        assert_eq!("json_data".parse::<OutputType>().unwrap(), OutputType::JsonData);
        assert!("picture".parse::<OutputType>().is_err());
    }
}
