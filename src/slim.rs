//! Projection of the reserved and uploaded collections into slim tables.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, trace};

use crate::config::PvIdRange;
use crate::constants::{UNKNOWN_AUTHOR, UNKNOWN_USER};
use crate::document::{Keyed, ReservedEntry, Uploaded, UploadedEntry};
use crate::normalize::{PostIndex, UserIndex};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlimReservedRecord {
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlimUsedRecord {
    pub title: String,
    pub title_en: String,
    pub username: String,
}

/// Projected records keyed by PV id, plus the number of input entries that
/// were dropped for lacking a usable id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlimTable<T> {
    pub records: BTreeMap<i64, T>,
    pub skipped: usize,
}

impl<T> Default for SlimTable<T> {
    fn default() -> Self {
        Self {
            records: BTreeMap::new(),
            skipped: 0,
        }
    }
}

impl<T> SlimTable<T> {
    fn insert_or_skip(&mut self, pv_id: Option<i64>, record: impl FnOnce() -> T) -> bool {
        match pv_id {
            Some(id) => {
                self.records.insert(id, record());
                true
            }
            None => {
                self.skipped += 1;
                false
            }
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Which candidate wins when an entry has both an outer key and an inner id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdPreference {
    Key,
    Inner,
}

/// Resolve the canonical PV id of an entry.
///
/// The preferred candidate is used unless it is missing or zero, in which
/// case the other one is. The result must fall inside `range`.
#[must_use]
pub fn resolve_pv_id(
    key: Option<i64>,
    inner: Option<i64>,
    prefer: IdPreference,
    range: PvIdRange,
) -> Option<i64> {
    let (first, second) = match prefer {
        IdPreference::Key => (key, inner),
        IdPreference::Inner => (inner, key),
    };
    let id = first.filter(|&id| id != 0).or(second)?;
    range.contains(id).then_some(id)
}

/// Take a resolved value or the documented fallback for it.
#[must_use]
pub fn resolve_or(resolved: Option<String>, fallback: &str) -> String {
    resolved.unwrap_or_else(|| fallback.to_string())
}

/// First non-empty of a `display_name` / `name` pair. Whitespace-only names
/// are kept as given.
fn display_name<'a>(display_name: Option<&'a str>, name: Option<&'a str>) -> Option<&'a str> {
    [display_name, name]
        .into_iter()
        .flatten()
        .find(|s| !s.is_empty())
}

fn reserved_username(users: &UserIndex<'_>, user_id: Option<i64>) -> Option<String> {
    let Some(user) = user_id.and_then(|id| users.get(id)) else {
        trace!(?user_id, "Reserved entry references an unknown user");
        return None;
    };
    display_name(user.display_name.as_deref(), user.name.as_deref()).map(str::to_string)
}

/// Comma-joined author names of a post, if it has any.
fn post_authors(posts: &PostIndex<'_>, post_id: Option<i64>) -> Option<String> {
    let Some(post) = post_id.and_then(|id| posts.get(id)) else {
        trace!(?post_id, "Uploaded entry references an unknown post");
        return None;
    };
    let names: Vec<&str> = post
        .authors
        .as_deref()?
        .iter()
        .filter_map(|a| display_name(a.display_name.as_deref(), a.name.as_deref()))
        .collect();
    (!names.is_empty()).then(|| names.join(", "))
}

/// Project the reserved collection.
///
/// The inner `id` is preferred over the outer key. An unknown user, or one
/// without a name, yields an empty username.
#[must_use]
pub fn build_reserved_slim(
    reserved: &[Keyed<ReservedEntry>],
    users: &UserIndex<'_>,
    range: PvIdRange,
) -> SlimTable<SlimReservedRecord> {
    let mut table = SlimTable::default();

    for entry in reserved {
        let pv_id = resolve_pv_id(entry.key_id(), entry.record.id, IdPreference::Inner, range);
        let inserted = table.insert_or_skip(pv_id, || SlimReservedRecord {
            username: resolve_or(reserved_username(users, entry.record.user), UNKNOWN_USER),
        });
        if !inserted {
            debug!(
                key = %entry.key,
                id = ?entry.record.id,
                "Skipping reserved entry without a valid PV id"
            );
        }
    }

    table
}

/// Project the uploaded collection.
///
/// For the keyed shape the outer key is preferred over the inner `id`; the
/// list shape only has the inner `id`. Entries whose post has no resolvable
/// authors are credited to `MM+`.
#[must_use]
pub fn build_used_slim(
    uploaded: &Uploaded,
    posts: &PostIndex<'_>,
    range: PvIdRange,
) -> SlimTable<SlimUsedRecord> {
    let mut table = SlimTable::default();

    let candidates: Vec<(Option<i64>, &UploadedEntry)> = match uploaded {
        Uploaded::ByKey(entries) => entries
            .iter()
            .map(|entry| {
                let id = resolve_pv_id(entry.key_id(), entry.record.id, IdPreference::Key, range);
                (id, &entry.record)
            })
            .collect(),
        Uploaded::List(entries) => entries
            .iter()
            .map(|entry| {
                let id = resolve_pv_id(None, entry.id, IdPreference::Inner, range);
                (id, entry)
            })
            .collect(),
    };

    for (pv_id, entry) in candidates {
        let inserted = table.insert_or_skip(pv_id, || SlimUsedRecord {
            title: resolve_or(entry.name.clone(), ""),
            title_en: resolve_or(entry.name_en.clone(), ""),
            username: resolve_or(post_authors(posts, entry.post), UNKNOWN_AUTHOR),
        });
        if !inserted {
            debug!(id = ?entry.id, "Skipping uploaded entry without a valid PV id");
        }
    }

    table
}
