//! Terminal rendering for command results.

use clap::ValueEnum;
use hfspace_core::{
    Error, InternalResult,
    hub::SpaceInfo,
    results::StoredResult,
    runner::{Job, JobStatus},
};
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

pub fn to_json<T: Serialize>(data: &T, pretty: bool) -> InternalResult<String> {
    if pretty {
        serde_json::to_string_pretty(data)
    } else {
        serde_json::to_string(data)
    }
    .map_err(|e| Error::Internal(format!("JSON serialization error: {}", e)))
}

pub fn output_json<T: Serialize>(data: &T, pretty: bool) -> InternalResult<()> {
    println!("{}", to_json(data, pretty)?);
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}

pub fn render_spaces(spaces: &[SpaceInfo]) -> String {
    if spaces.is_empty() {
        return "No Spaces found.".to_string();
    }
    let width = spaces.iter().map(|s| s.id.len()).max().unwrap_or(2).max(2);
    let mut out = format!(
        "{:<width$}  {:<16}  {:>6}  {:<8}  {:<12}  {}\n",
        "ID", "AUTHOR", "LIKES", "SDK", "UPDATED", "TAGS"
    );
    for space in spaces {
        let updated = space
            .last_modified
            .map(|t| t.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "-".to_string());
        out.push_str(&format!(
            "{:<width$}  {:<16}  {:>6}  {:<8}  {:<12}  {}\n",
            space.id,
            truncate(space.owner(), 16),
            space.likes,
            space.sdk.as_deref().unwrap_or("-"),
            updated,
            truncate(&space.tags.join(","), 40)
        ));
    }
    out.trim_end().to_string()
}

pub fn render_favorites(favorites: &[String]) -> String {
    if favorites.is_empty() {
        return "No favorite Spaces yet.".to_string();
    }
    favorites
        .iter()
        .map(|id| format!("- {}", id))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render_results(results: &[StoredResult]) -> String {
    if results.is_empty() {
        return "No results found.".to_string();
    }
    let mut out = format!(
        "{:>5}  {:<20}  {:<30}  {:<12}  {}\n",
        "ID", "TIMESTAMP", "SPACE", "TYPE", "TASK"
    );
    for result in results {
        out.push_str(&format!(
            "{:>5}  {:<20}  {:<30}  {:<12}  {}\n",
            result.id,
            result.timestamp.format("%Y-%m-%d %H:%M:%S"),
            truncate(&result.space_id, 30),
            result.output_type.as_deref().unwrap_or("-"),
            truncate(result.task_description.as_deref().unwrap_or(""), 50)
        ));
    }
    out.trim_end().to_string()
}

pub fn render_result_detail(result: &StoredResult) -> String {
    let parameters = result
        .parameters
        .as_ref()
        .map(|p| serde_json::to_string_pretty(p).unwrap_or_else(|_| p.to_string()))
        .unwrap_or_else(|| "-".to_string());
    format!(
        "ID:          {}\nSpace:       {}\nTask:        {}\nTimestamp:   {}\nOutput type: {}\nOutput:      {}\nParameters:  {}\nNotes:       {}",
        result.id,
        result.space_id,
        result.task_description.as_deref().unwrap_or("-"),
        result.timestamp.to_rfc3339(),
        result.output_type.as_deref().unwrap_or("-"),
        result.output_data,
        parameters,
        result.notes.as_deref().unwrap_or("-"),
    )
}

/// Prediction output as stored in the results library: strings verbatim,
/// anything else as compact JSON.
pub fn output_data_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub fn render_prediction(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

pub fn render_job(job: &Job, status: JobStatus) -> String {
    format!(
        "Job {} submitted to {} ({}) as event {}: {}",
        job.id(),
        job.space_id(),
        job.api_name(),
        job.event_id(),
        status
    )
}
