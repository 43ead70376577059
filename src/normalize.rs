//! Integer-keyed indexes over the raw post and user collections.

use std::collections::HashMap;

use crate::document::{Keyed, RawPost, RawUser};

/// Posts indexed by id, borrowing from the decoded document.
///
/// Built in two passes: every post carrying an inner `id` is indexed under
/// it first (later duplicates overwrite earlier ones), then any post whose
/// numeric outer key is still unclaimed is indexed under that key.
#[derive(Debug)]
pub struct PostIndex<'a> {
    raw: &'a [Keyed<RawPost>],
    by_id: HashMap<i64, &'a RawPost>,
}

impl<'a> PostIndex<'a> {
    #[must_use]
    pub fn build(raw: &'a [Keyed<RawPost>]) -> Self {
        let mut by_id = HashMap::with_capacity(raw.len());

        for entry in raw {
            if let Some(id) = entry.record.id {
                by_id.insert(id, &entry.record);
            }
        }

        for entry in raw {
            if let Some(key) = entry.key_id() {
                by_id.entry(key).or_insert(&entry.record);
            }
        }

        Self { raw, by_id }
    }

    /// Look up a post by id.
    ///
    /// Falls back to a scan of the raw collection, matching either the inner
    /// id or the outer key, when the index has no entry.
    #[must_use]
    pub fn get(&self, id: i64) -> Option<&'a RawPost> {
        if let Some(post) = self.by_id.get(&id) {
            return Some(*post);
        }

        self.raw
            .iter()
            .find(|entry| entry.record.id == Some(id) || entry.key_id() == Some(id))
            .map(|entry| &entry.record)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

/// Users indexed by id in a single pass.
///
/// A user without an inner `id` is always indexed under its numeric outer
/// key, even when that key is some other user's inner id; whichever comes
/// later in the document wins.
#[derive(Debug)]
pub struct UserIndex<'a> {
    by_id: HashMap<i64, &'a RawUser>,
}

impl<'a> UserIndex<'a> {
    #[must_use]
    pub fn build(raw: &'a [Keyed<RawUser>]) -> Self {
        let mut by_id = HashMap::with_capacity(raw.len());

        for entry in raw {
            if let Some(id) = entry.record.id.or_else(|| entry.key_id()) {
                by_id.insert(id, &entry.record);
            }
        }

        Self { by_id }
    }

    #[must_use]
    pub fn get(&self, id: i64) -> Option<&'a RawUser> {
        self.by_id.get(&id).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}
