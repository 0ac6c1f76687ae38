//! # Whiteboard
//!
//! The shared key/value store artifacts communicate through. Values are
//! arbitrary JSON. Writes replace whole values (last writer wins); nested
//! structures are never merged.

use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// A flat JSON object of whiteboard entries
pub type WhiteboardMap = Map<String, Value>;

/// Owned whiteboard with a narrow read/write surface.
///
/// The backing map is never handed out mutably; callers go through
/// [`project`](Self::project), [`merge`](Self::merge),
/// [`snapshot`](Self::snapshot) and [`restore`](Self::restore).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WhiteboardStore {
    entries: WhiteboardMap,
}

impl WhiteboardStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries whose key is in `keys`. Absent keys are skipped.
    pub fn project<'a, I>(&self, keys: I) -> WhiteboardMap
    where
        I: IntoIterator<Item = &'a String>,
    {
        keys.into_iter()
            .filter_map(|key| {
                self.entries
                    .get(key)
                    .map(|value| (key.clone(), value.clone()))
            })
            .collect()
    }

    /// Requested keys that are not on the whiteboard, in request order
    pub fn missing<'a, I>(&self, keys: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a String>,
    {
        keys.into_iter()
            .filter(|key| !self.entries.contains_key(key.as_str()))
            .cloned()
            .collect()
    }

    /// Overwrite each key with the supplied value. Returns the keys written.
    pub fn merge(&mut self, updates: &WhiteboardMap) -> BTreeSet<String> {
        for (key, value) in updates {
            self.entries.insert(key.clone(), value.clone());
        }
        updates.keys().cloned().collect()
    }

    /// Deep copy of the current state
    pub fn snapshot(&self) -> WhiteboardMap {
        self.entries.clone()
    }

    /// Replace the current state with a copy of `snapshot`
    pub fn restore(&mut self, snapshot: &WhiteboardMap) {
        self.entries = snapshot.clone();
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<WhiteboardMap> for WhiteboardStore {
    fn from(entries: WhiteboardMap) -> Self {
        Self { entries }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> WhiteboardMap {
        value.as_object().cloned().unwrap()
    }

    fn keys(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_project_returns_only_requested_present_keys() {
        let mut board = WhiteboardStore::new();
        board.merge(&map(json!({"a": 1, "b": [1, 2], "c": {"x": true}})));

        let requested = keys(&["a", "c", "missing"]);
        let projected = board.project(&requested);

        assert_eq!(projected.len(), 2);
        assert_eq!(projected["a"], json!(1));
        assert_eq!(projected["c"], json!({"x": true}));
        assert!(projected.keys().all(|k| requested.contains(k)));
        assert_eq!(board.missing(&requested), vec!["missing".to_string()]);
    }

    #[test]
    fn test_project_on_empty_board_is_empty() {
        let board = WhiteboardStore::new();
        assert!(board.project(&keys(&["a"])).is_empty());
    }

    #[test]
    fn test_merge_replaces_nested_values_instead_of_deep_merging() {
        let mut board = WhiteboardStore::new();
        board.merge(&map(json!({"ids": {"header": "#top", "footer": "#bottom"}})));
        board.merge(&map(json!({"ids": {"header": "#main"}})));

        assert_eq!(board.get("ids"), Some(&json!({"header": "#main"})));
    }

    #[test]
    fn test_merge_is_idempotent() {
        let update = map(json!({"routes": ["/api/a"], "port": 8080}));

        let mut once = WhiteboardStore::new();
        once.merge(&update);

        let mut twice = WhiteboardStore::new();
        twice.merge(&update);
        twice.merge(&update);

        assert_eq!(once, twice);
    }

    #[test]
    fn test_merge_reports_written_keys() {
        let mut board = WhiteboardStore::new();
        let written = board.merge(&map(json!({"b": 1, "a": 2})));
        assert_eq!(written.into_iter().collect::<Vec<_>>(), keys(&["a", "b"]));
    }

    #[test]
    fn test_snapshot_restore_round_trip() {
        let mut board = WhiteboardStore::new();
        board.merge(&map(json!({"a": 1, "nested": {"list": [1, 2, 3]}})));

        let snapshot = board.snapshot();
        let mut restored = WhiteboardStore::new();
        restored.restore(&snapshot);

        assert_eq!(restored, board);
    }

    #[test]
    fn test_snapshot_is_detached_from_live_state() {
        let mut board = WhiteboardStore::new();
        board.merge(&map(json!({"a": 1})));

        let mut snapshot = board.snapshot();
        snapshot.insert("a".to_string(), json!(999));
        snapshot.insert("b".to_string(), json!(2));

        assert_eq!(board.get("a"), Some(&json!(1)));
        assert!(!board.contains("b"));

        board.restore(&snapshot);
        snapshot.insert("c".to_string(), json!(3));
        assert!(!board.contains("c"));
    }
}
