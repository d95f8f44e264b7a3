//! SQLite-backed preference store.
//!
//! # Responsibility
//! - Keep an in-memory view of every node for cheap reads.
//! - Buffer writes per node and push them in one transaction on `flush`.
//!
//! # Invariants
//! - A node is rewritten as a whole on flush (delete rows, insert view).
//! - Removals are applied before writes in the same flush, so a node that was
//!   removed and then written again survives.
//! - Unflushed writes stay pending after a failed flush.

use super::{is_in_subtree, validate_node_path, PrefError, PrefResult, PrefValue, PreferenceStore};
use crate::db::{open_db, open_db_in_memory};
use log::{debug, error, info};
use rusqlite::{params, Connection, Row};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

type NodeEntries = BTreeMap<String, PrefValue>;

/// Preference store persisting into the `preference_entries` tables.
pub struct SqlitePreferenceStore {
    conn: Option<Connection>,
    view: BTreeMap<String, NodeEntries>,
    dirty: BTreeSet<String>,
    removed: BTreeSet<String>,
}

impl SqlitePreferenceStore {
    /// Opens a file-backed store and loads its current contents.
    pub fn open(path: impl AsRef<Path>) -> PrefResult<Self> {
        Self::from_connection(open_db(path)?)
    }

    /// Opens an in-memory store; contents vanish on drop.
    pub fn open_in_memory() -> PrefResult<Self> {
        Self::from_connection(open_db_in_memory()?)
    }

    /// Wraps a migrated connection.
    pub fn from_connection(conn: Connection) -> PrefResult<Self> {
        let view = load_view(&conn)?;
        info!(
            "event=prefs_open module=prefs status=ok node_count={}",
            view.len()
        );
        Ok(Self {
            conn: Some(conn),
            view,
            dirty: BTreeSet::new(),
            removed: BTreeSet::new(),
        })
    }

    /// Returns true when writes are waiting for a flush.
    pub fn has_pending_writes(&self) -> bool {
        !self.dirty.is_empty() || !self.removed.is_empty()
    }

    /// Lists direct child segment names of `node` present in the view.
    pub fn child_names(&self, node: &str) -> PrefResult<Vec<String>> {
        self.ensure_running()?;
        validate_node_path(node)?;
        let names: BTreeSet<String> = self
            .view
            .keys()
            .filter(|path| path.as_str() != node && is_in_subtree(path, node))
            .filter_map(|path| {
                let rest = if node.is_empty() {
                    path.as_str()
                } else {
                    &path[node.len() + 1..]
                };
                rest.split('/').next().map(str::to_string)
            })
            .collect();
        Ok(names.into_iter().collect())
    }

    fn ensure_running(&self) -> PrefResult<()> {
        if self.conn.is_none() {
            return Err(PrefError::Stopped);
        }
        Ok(())
    }

    fn flush_subtree(&mut self, root: &str) -> PrefResult<usize> {
        let conn = self.conn.as_mut().ok_or(PrefError::Stopped)?;

        let removed: Vec<String> = self
            .removed
            .iter()
            .filter(|node| is_in_subtree(node, root))
            .cloned()
            .collect();
        let dirty: Vec<String> = self
            .dirty
            .iter()
            .filter(|node| is_in_subtree(node, root))
            .cloned()
            .collect();
        if removed.is_empty() && dirty.is_empty() {
            return Ok(0);
        }

        let tx = conn
            .transaction()
            .map_err(|err| PrefError::unavailable("flush", err))?;
        for node in &removed {
            tx.execute(
                "DELETE FROM preference_entries
                 WHERE node_path = ?1
                    OR substr(node_path, 1, length(?1) + 1) = ?1 || '/';",
                params![node],
            )
            .map_err(|err| PrefError::unavailable("flush", err))?;
        }
        for node in &dirty {
            let entries = self.view.get(node.as_str());
            write_node(&tx, node, entries).map_err(|err| PrefError::unavailable("flush", err))?;
        }
        tx.commit()
            .map_err(|err| PrefError::unavailable("flush", err))?;

        for node in &removed {
            self.removed.remove(node);
        }
        for node in &dirty {
            self.dirty.remove(node);
        }
        Ok(removed.len() + dirty.len())
    }
}

impl PreferenceStore for SqlitePreferenceStore {
    fn get(&self, node: &str, key: &str) -> PrefResult<Option<PrefValue>> {
        self.ensure_running()?;
        validate_node_path(node)?;
        Ok(self
            .view
            .get(node)
            .and_then(|entries| entries.get(key))
            .cloned())
    }

    fn put(&mut self, node: &str, key: &str, value: PrefValue) -> PrefResult<()> {
        self.ensure_running()?;
        validate_node_path(node)?;
        self.view
            .entry(node.to_string())
            .or_default()
            .insert(key.to_string(), value);
        self.dirty.insert(node.to_string());
        Ok(())
    }

    fn remove_node(&mut self, node: &str) -> PrefResult<()> {
        self.ensure_running()?;
        validate_node_path(node)?;
        if node.is_empty() {
            return Err(PrefError::InvalidPath(node.to_string()));
        }
        self.view.retain(|path, _| !is_in_subtree(path, node));
        self.dirty.retain(|path| !is_in_subtree(path, node));
        self.removed.retain(|path| !is_in_subtree(path, node));
        self.removed.insert(node.to_string());
        Ok(())
    }

    fn flush(&mut self, node: &str) -> PrefResult<()> {
        validate_node_path(node)?;
        match self.flush_subtree(node) {
            Ok(count) => {
                debug!("event=prefs_flush module=prefs status=ok node={node} nodes_written={count}");
                Ok(())
            }
            Err(err) => {
                error!("event=prefs_flush module=prefs status=error node={node} error={err}");
                Err(err)
            }
        }
    }

    fn discard(&mut self, node: &str) -> PrefResult<()> {
        validate_node_path(node)?;
        let conn = self.conn.as_ref().ok_or(PrefError::Stopped)?;
        let stored = load_view(conn)?;
        self.dirty.retain(|path| !is_in_subtree(path, node));
        self.removed.retain(|path| !is_in_subtree(path, node));
        self.view.retain(|path, _| !is_in_subtree(path, node));
        self.view.extend(
            stored
                .into_iter()
                .filter(|(path, _)| is_in_subtree(path, node)),
        );
        debug!("event=prefs_discard module=prefs status=ok node={node}");
        Ok(())
    }

    fn sync(&mut self) -> PrefResult<()> {
        self.flush_subtree("")?;
        let conn = self.conn.as_ref().ok_or(PrefError::Stopped)?;
        self.view = load_view(conn)?;
        debug!(
            "event=prefs_sync module=prefs status=ok node_count={}",
            self.view.len()
        );
        Ok(())
    }

    fn stop(&mut self) -> PrefResult<()> {
        if self.conn.is_none() {
            return Ok(());
        }
        let flushed = self.flush_subtree("");
        self.conn = None;
        self.view.clear();
        match flushed {
            Ok(_) => {
                info!("event=prefs_stop module=prefs status=ok");
                Ok(())
            }
            Err(err) => {
                error!("event=prefs_stop module=prefs status=error pending_lost=true error={err}");
                self.dirty.clear();
                self.removed.clear();
                Err(err)
            }
        }
    }
}

fn write_node(
    tx: &rusqlite::Transaction<'_>,
    node: &str,
    entries: Option<&NodeEntries>,
) -> rusqlite::Result<()> {
    tx.execute(
        "DELETE FROM preference_entries WHERE node_path = ?1;",
        params![node],
    )?;
    let Some(entries) = entries else {
        return Ok(());
    };

    for (key, value) in entries {
        let (text_value, real_value, int_value): (Option<&str>, Option<f64>, Option<i64>) =
            match value {
                PrefValue::String(v) => (Some(v.as_str()), None, None),
                PrefValue::Double(v) => (None, Some(*v), None),
                PrefValue::Boolean(v) => (None, None, Some(i64::from(*v))),
                PrefValue::Long(v) => (None, None, Some(*v)),
                PrefValue::List(_) => (None, None, None),
            };
        tx.execute(
            "INSERT INTO preference_entries (
                node_path,
                pref_key,
                value_kind,
                text_value,
                real_value,
                int_value
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![node, key, value.kind(), text_value, real_value, int_value],
        )?;

        if let PrefValue::List(items) = value {
            for (position, item) in items.iter().enumerate() {
                tx.execute(
                    "INSERT INTO preference_list_items (node_path, pref_key, position, item)
                     VALUES (?1, ?2, ?3, ?4);",
                    params![node, key, position as i64, item],
                )?;
            }
        }
    }
    Ok(())
}

fn load_view(conn: &Connection) -> PrefResult<BTreeMap<String, NodeEntries>> {
    let mut view: BTreeMap<String, NodeEntries> = BTreeMap::new();

    let mut stmt = conn
        .prepare(
            "SELECT node_path, pref_key, value_kind, text_value, real_value, int_value
             FROM preference_entries
             ORDER BY node_path, pref_key;",
        )
        .map_err(|err| PrefError::unavailable("sync", err))?;
    let mut rows = stmt
        .query([])
        .map_err(|err| PrefError::unavailable("sync", err))?;
    while let Some(row) = rows
        .next()
        .map_err(|err| PrefError::unavailable("sync", err))?
    {
        let (node, key, value) = parse_entry_row(row)?;
        view.entry(node).or_default().insert(key, value);
    }

    let mut stmt = conn
        .prepare(
            "SELECT node_path, pref_key, item
             FROM preference_list_items
             ORDER BY node_path, pref_key, position;",
        )
        .map_err(|err| PrefError::unavailable("sync", err))?;
    let mut rows = stmt
        .query([])
        .map_err(|err| PrefError::unavailable("sync", err))?;
    while let Some(row) = rows
        .next()
        .map_err(|err| PrefError::unavailable("sync", err))?
    {
        let node: String = row.get(0).map_err(|err| PrefError::unavailable("sync", err))?;
        let key: String = row.get(1).map_err(|err| PrefError::unavailable("sync", err))?;
        let item: String = row.get(2).map_err(|err| PrefError::unavailable("sync", err))?;
        if let Some(PrefValue::List(items)) = view
            .get_mut(node.as_str())
            .and_then(|entries| entries.get_mut(key.as_str()))
        {
            items.push(item);
        }
    }

    Ok(view)
}

fn parse_entry_row(row: &Row<'_>) -> PrefResult<(String, String, PrefValue)> {
    let node: String = row.get(0).map_err(|err| PrefError::unavailable("sync", err))?;
    let key: String = row.get(1).map_err(|err| PrefError::unavailable("sync", err))?;
    let kind: String = row.get(2).map_err(|err| PrefError::unavailable("sync", err))?;
    let text_value: Option<String> =
        row.get(3).map_err(|err| PrefError::unavailable("sync", err))?;
    let real_value: Option<f64> = row.get(4).map_err(|err| PrefError::unavailable("sync", err))?;
    let int_value: Option<i64> = row.get(5).map_err(|err| PrefError::unavailable("sync", err))?;

    let corrupt = |message: &str| PrefError::CorruptEntry {
        node: node.clone(),
        key: key.clone(),
        message: message.to_string(),
    };
    let value = match kind.as_str() {
        "string" => PrefValue::String(text_value.ok_or_else(|| corrupt("missing text value"))?),
        "double" => PrefValue::Double(real_value.ok_or_else(|| corrupt("missing real value"))?),
        "boolean" => {
            PrefValue::Boolean(int_value.ok_or_else(|| corrupt("missing integer value"))? != 0)
        }
        "long" => PrefValue::Long(int_value.ok_or_else(|| corrupt("missing integer value"))?),
        "list" => PrefValue::List(Vec::new()),
        other => return Err(corrupt(&format!("unknown value kind `{other}`"))),
    };
    Ok((node, key, value))
}

#[cfg(test)]
mod tests {
    use super::SqlitePreferenceStore;
    use crate::prefs::{PrefError, PrefValue, PreferenceStore};

    #[test]
    fn writes_are_pending_until_flush() {
        let mut store = SqlitePreferenceStore::open_in_memory().unwrap();
        store.put_str("journal-window/Demo", "journal_title", "Demo").unwrap();
        assert!(store.has_pending_writes());

        store.flush("journal-window").unwrap();
        assert!(!store.has_pending_writes());
    }

    #[test]
    fn flush_of_sibling_node_leaves_other_writes_pending() {
        let mut store = SqlitePreferenceStore::open_in_memory().unwrap();
        store.put_bool("journal-window/A", "can_delete", true).unwrap();
        store.put_bool("journal-window/B", "can_delete", false).unwrap();

        store.flush("journal-window/A").unwrap();
        assert!(store.has_pending_writes());
        store.flush("").unwrap();
        assert!(!store.has_pending_writes());
    }

    #[test]
    fn sync_reloads_flushed_values_including_lists() {
        let mut store = SqlitePreferenceStore::open_in_memory().unwrap();
        let names = vec!["B".to_string(), "A".to_string()];
        store.put_list("journal-window", "journal_names", &names).unwrap();
        store.put_f64("journal-window/A", "journal_xpos", 12.5).unwrap();
        store.sync().unwrap();

        assert_eq!(store.get_list("journal-window", "journal_names").unwrap(), names);
        assert_eq!(
            store.get_f64("journal-window/A", "journal_xpos").unwrap(),
            Some(12.5)
        );
    }

    #[test]
    fn typed_getter_reports_mismatch() {
        let mut store = SqlitePreferenceStore::open_in_memory().unwrap();
        store
            .put("journal-window/A", "journal_width", PrefValue::String("wide".into()))
            .unwrap();
        let err = store.get_f64("journal-window/A", "journal_width").unwrap_err();
        assert!(matches!(
            err,
            PrefError::TypeMismatch {
                expected: "double",
                found: "string",
                ..
            }
        ));
    }

    #[test]
    fn remove_node_drops_subtree_and_root_is_protected() {
        let mut store = SqlitePreferenceStore::open_in_memory().unwrap();
        store.put_str("journal-window/A", "journal_title", "A").unwrap();
        store.put_str("journal-window/A/tabs", "kind", "x").unwrap();
        store.put_str("journal-window/AB", "journal_title", "AB").unwrap();
        store.sync().unwrap();

        store.remove_node("journal-window/A").unwrap();
        store.sync().unwrap();

        assert!(store.get("journal-window/A", "journal_title").unwrap().is_none());
        assert!(store.get("journal-window/A/tabs", "kind").unwrap().is_none());
        assert_eq!(
            store.get_str("journal-window/AB", "journal_title").unwrap(),
            Some("AB".to_string())
        );
        assert!(matches!(store.remove_node(""), Err(PrefError::InvalidPath(_))));
    }

    #[test]
    fn child_names_lists_direct_children_once() {
        let mut store = SqlitePreferenceStore::open_in_memory().unwrap();
        store.put_str("journal-window/A", "k", "v").unwrap();
        store.put_str("journal-window/A/tabs", "k", "v").unwrap();
        store.put_str("journal-window/B", "k", "v").unwrap();

        assert_eq!(
            store.child_names("journal-window").unwrap(),
            vec!["A".to_string(), "B".to_string()]
        );
    }

    #[test]
    fn operations_after_stop_fail() {
        let mut store = SqlitePreferenceStore::open_in_memory().unwrap();
        store.stop().unwrap();
        store.stop().unwrap();
        assert!(matches!(store.get("", "app_initialized"), Err(PrefError::Stopped)));
        assert!(matches!(
            store.put_bool("", "app_initialized", true),
            Err(PrefError::Stopped)
        ));
        assert!(matches!(store.flush(""), Err(PrefError::Stopped)));
    }

    #[test]
    fn discard_restores_last_flushed_values() {
        let mut store = SqlitePreferenceStore::open_in_memory().unwrap();
        store.put_str("journal-window/A", "journal_title", "A").unwrap();
        store.flush("").unwrap();

        store.put_str("journal-window/A", "journal_title", "changed").unwrap();
        store.put_str("journal-window/B", "journal_title", "B").unwrap();
        store.discard("journal-window/A").unwrap();

        assert_eq!(
            store.get_str("journal-window/A", "journal_title").unwrap(),
            Some("A".to_string())
        );
        assert_eq!(
            store.get_str("journal-window/B", "journal_title").unwrap(),
            Some("B".to_string())
        );
        assert!(store.has_pending_writes());
        store.discard("journal-window/B").unwrap();
        assert!(!store.has_pending_writes());
        assert_eq!(store.get_str("journal-window/B", "journal_title").unwrap(), None);
    }
}
