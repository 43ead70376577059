//! One export run: fetch, normalize, project, write.

use std::path::PathBuf;

use thiserror::Error;
use tracing::{debug, info};

use crate::config::Config;
use crate::constants::{RESERVED_SLIM_FILE, USED_SLIM_FILE};
use crate::document::{Document, DocumentError};
use crate::fetch::{fetch_document, FetchError};
use crate::normalize::{PostIndex, UserIndex};
use crate::slim::{
    build_reserved_slim, build_used_slim, SlimReservedRecord, SlimTable, SlimUsedRecord,
};
use crate::writer::{stage_slim_file, unix_timestamp, WriteError};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("unexpected listing shape: {0}")]
    Document(#[from] DocumentError),
    #[error(transparent)]
    Write(#[from] WriteError),
}

/// Both projected tables for one listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlimTables {
    pub reserved: SlimTable<SlimReservedRecord>,
    pub used: SlimTable<SlimUsedRecord>,
    /// Entries dropped while decoding because they were not objects.
    pub malformed: usize,
}

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub reserved: usize,
    pub used: usize,
    pub skipped: usize,
    pub reserved_path: PathBuf,
    pub used_path: PathBuf,
}

/// Normalize a decoded listing and project it into both slim tables.
#[must_use]
pub fn build_tables(document: &Document, config: &Config) -> SlimTables {
    let posts = PostIndex::build(&document.posts);
    let users = UserIndex::build(&document.users);
    debug!(posts = posts.len(), users = users.len(), "Built indexes");

    let reserved = build_reserved_slim(&document.reserved, &users, config.pv_id_range);
    let used = build_used_slim(&document.uploaded, &posts, config.pv_id_range);

    SlimTables {
        reserved,
        used,
        malformed: document.malformed,
    }
}

/// Run a full export.
///
/// Nothing is written unless the listing was fetched and decoded.
///
/// # Errors
///
/// Returns an error if the fetch fails, the listing is not a JSON object, or
/// an output file cannot be written.
pub async fn run(config: &Config, client: &reqwest::Client) -> Result<RunSummary, PipelineError> {
    let raw = fetch_document(client, &config.url).await?;
    let document = Document::from_value(raw)?;

    info!(
        posts = document.posts.len(),
        users = document.users.len(),
        reserved = document.reserved.len(),
        uploaded = document.uploaded.len(),
        "Decoded listing"
    );

    let tables = build_tables(&document, config);
    let skipped = tables.malformed + tables.reserved.skipped + tables.used.skipped;
    if skipped > 0 {
        info!(skipped, "Dropped malformed entries");
    }

    let timestamp = config.write_timestamp.then(unix_timestamp);

    // Stage both tables before renaming either into place.
    let staged_reserved = stage_slim_file(
        &config.output_dir,
        RESERVED_SLIM_FILE,
        &tables.reserved.records,
        timestamp.as_deref(),
    )
    .await?;
    let staged_used = match stage_slim_file(
        &config.output_dir,
        USED_SLIM_FILE,
        &tables.used.records,
        timestamp.as_deref(),
    )
    .await
    {
        Ok(staged) => staged,
        Err(e) => {
            staged_reserved.discard().await;
            return Err(e.into());
        }
    };

    let reserved_path = staged_reserved.commit().await?;
    let used_path = staged_used.commit().await?;

    info!(
        reserved = tables.reserved.len(),
        used = tables.used.len(),
        output_dir = %config.output_dir.display(),
        "Slim tables written"
    );

    Ok(RunSummary {
        reserved: tables.reserved.len(),
        used: tables.used.len(),
        skipped,
        reserved_path,
        used_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_build_tables_end_to_end() {
        let document = Document::from_value(json!({
            "posts": {"1": {"id": 1, "authors": [{"display_name": "A"}, {"name": "B"}]}},
            "users": {"7": {"display_name": "Alice"}},
            "reserved_pvs": {"42": {"id": 42, "user": 7}, "43": "bad"},
            "uploaded_pvs": [{"id": 99, "name": "Song", "post": 1}],
        }))
        .unwrap();

        let tables = build_tables(&document, &Config::default());

        assert_eq!(tables.reserved.records[&42].username, "Alice");
        assert_eq!(tables.reserved.len(), 1);
        assert_eq!(tables.used.records[&99].username, "A, B");
        assert_eq!(tables.used.records[&99].title, "Song");
        assert_eq!(tables.malformed, 1);
    }
}
