//! Friend and club membership lists.
//!
//! Call signs come from flat files and from a SQLite query, and are merged
//! into the single friend set the filter chain and renderer use.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing::info;

/// Default query for an SKCC Logger membership database.
pub const DEFAULT_MEMBER_QUERY: &str = "SELECT Mbr_Call FROM SKCCData_DB";

/// Parse a membership list into call signs.
///
/// File format:
/// - One callsign per line, optionally followed by notes
/// - Lines starting with # are comments
/// - Empty lines are ignored
///
/// Call signs are kept exactly as written.
pub fn parse_callsign_list(content: &str) -> Vec<String> {
    content
        .lines()
        .filter_map(|line| {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                return None;
            }
            trimmed.split_whitespace().next().map(str::to_string)
        })
        .collect()
}

/// Read a membership list file.
pub fn load_callsign_file(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read membership list: {}", path.display()))?;
    let calls = parse_callsign_list(&content);
    info!("Loaded {} call signs from {}", calls.len(), path.display());
    Ok(calls)
}

/// Run a single-column query against a SQLite membership database.
pub async fn load_sqlite_callsigns(path: &Path, query: &str) -> Result<Vec<String>> {
    let options = SqliteConnectOptions::new().filename(path).read_only(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to open membership database: {}", path.display()))?;

    let rows: Vec<Option<String>> = sqlx::query_scalar(query)
        .fetch_all(&pool)
        .await
        .with_context(|| format!("Membership query failed on {}", path.display()))?;
    pool.close().await;

    let calls: Vec<String> = rows
        .into_iter()
        .flatten()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect();
    info!("Loaded {} call signs from {}", calls.len(), path.display());
    Ok(calls)
}

/// Merge every configured source into one friend set.
pub async fn load_friends(files: &[impl AsRef<Path>], database: Option<(&Path, &str)>) -> Result<HashSet<String>> {
    let mut friends = HashSet::new();
    for file in files {
        friends.extend(load_callsign_file(file.as_ref())?);
    }
    if let Some((path, query)) = database {
        friends.extend(load_sqlite_callsigns(path, query).await?);
    }
    Ok(friends)
}
