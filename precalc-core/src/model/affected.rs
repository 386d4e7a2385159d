//! Affected Map
//!
//! Mapping of bot id to the set of tag names on that bot whose computed
//! value must be refreshed. Both levels keep insertion order so the engine
//! processes affected pairs deterministically.

use indexmap::map::Entry;
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

/// Bot id → tag names that need recomputation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AffectedMap(IndexMap<String, IndexSet<String>>);

impl AffectedMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flag a single tag on a bot.
    ///
    /// Returns true if the pair was not flagged before.
    pub fn insert(&mut self, bot_id: &str, tag: &str) -> bool {
        match self.0.get_mut(bot_id) {
            Some(tags) => tags.insert(tag.to_owned()),
            None => {
                let mut tags = IndexSet::new();
                tags.insert(tag.to_owned());
                self.0.insert(bot_id.to_owned(), tags);
                true
            }
        }
    }

    /// Flag every tag in `tags` on a bot.
    ///
    /// The bot gets an entry even when `tags` is empty.
    pub fn extend<'a, I>(&mut self, bot_id: &str, tags: I)
    where
        I: IntoIterator<Item = &'a String>,
    {
        let entry = match self.0.entry(bot_id.to_owned()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(IndexSet::new()),
        };
        entry.extend(tags.into_iter().cloned());
    }

    /// Set-merge another map into this one.
    pub fn merge(&mut self, other: &AffectedMap) {
        for (bot_id, tags) in &other.0 {
            self.extend(bot_id, tags);
        }
    }

    /// Drop every flag for a bot.
    pub fn remove_bot(&mut self, bot_id: &str) -> Option<IndexSet<String>> {
        self.0.shift_remove(bot_id)
    }

    pub fn get(&self, bot_id: &str) -> Option<&IndexSet<String>> {
        self.0.get(bot_id)
    }

    pub fn contains_bot(&self, bot_id: &str) -> bool {
        self.0.contains_key(bot_id)
    }

    pub fn contains(&self, bot_id: &str, tag: &str) -> bool {
        self.0.get(bot_id).is_some_and(|tags| tags.contains(tag))
    }

    /// Bot ids in insertion order.
    pub fn bot_ids(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Every tag name mentioned anywhere in the map, deduplicated.
    pub fn tag_names(&self) -> IndexSet<&str> {
        self.0
            .values()
            .flat_map(|tags| tags.iter().map(String::as_str))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &IndexSet<String>)> {
        self.0.iter()
    }

    /// Number of bots with at least one entry.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'a> IntoIterator for &'a AffectedMap {
    type Item = (&'a String, &'a IndexSet<String>);
    type IntoIter = indexmap::map::Iter<'a, String, IndexSet<String>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl<B, T> FromIterator<(B, T)> for AffectedMap
where
    B: AsRef<str>,
    T: AsRef<str>,
{
    fn from_iter<I: IntoIterator<Item = (B, T)>>(iter: I) -> Self {
        let mut map = AffectedMap::new();
        for (bot_id, tag) in iter {
            map.insert(bot_id.as_ref(), tag.as_ref());
        }
        map
    }
}
