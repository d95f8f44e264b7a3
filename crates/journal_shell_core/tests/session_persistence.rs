use journal_shell_core::session::persister::{
    JOURNAL_NAMES_KEY, JOURNAL_WINDOW_NODE, JOURNAL_WIDTH, JOURNAL_XPOS, JOURNAL_YPOS,
};
use journal_shell_core::{
    PrefError, PrefResult, PrefValue, PreferenceStore, Session, SessionSettings,
    SqlitePreferenceStore, WindowGeometry, WindowLayout, WindowPreferencePersister,
};

/// Wraps the SQLite store and fails selected operations.
struct FlakyStore {
    inner: SqlitePreferenceStore,
    fail_flush_node: Option<String>,
    fail_index_read: bool,
}

impl FlakyStore {
    fn new() -> Self {
        Self::over(SqlitePreferenceStore::open_in_memory().unwrap())
    }

    fn over(inner: SqlitePreferenceStore) -> Self {
        Self {
            inner,
            fail_flush_node: None,
            fail_index_read: false,
        }
    }
}

impl PreferenceStore for FlakyStore {
    fn get(&self, node: &str, key: &str) -> PrefResult<Option<PrefValue>> {
        if self.fail_index_read && node == JOURNAL_WINDOW_NODE && key == JOURNAL_NAMES_KEY {
            return Err(PrefError::unavailable("read", "disk offline"));
        }
        self.inner.get(node, key)
    }

    fn put(&mut self, node: &str, key: &str, value: PrefValue) -> PrefResult<()> {
        self.inner.put(node, key, value)
    }

    fn remove_node(&mut self, node: &str) -> PrefResult<()> {
        self.inner.remove_node(node)
    }

    fn flush(&mut self, node: &str) -> PrefResult<()> {
        if self.fail_flush_node.as_deref() == Some(node) {
            return Err(PrefError::unavailable("flush", "disk full"));
        }
        self.inner.flush(node)
    }

    fn discard(&mut self, node: &str) -> PrefResult<()> {
        self.inner.discard(node)
    }

    fn sync(&mut self) -> PrefResult<()> {
        self.inner.sync()
    }

    fn stop(&mut self) -> PrefResult<()> {
        self.inner.stop()
    }
}

fn session(title: &str) -> Session {
    Session::from_settings(&SessionSettings::new(title), "Tester").unwrap()
}

#[test]
fn save_unions_written_folders_into_existing_index() {
    let mut persister =
        WindowPreferencePersister::new(SqlitePreferenceStore::open_in_memory().unwrap());
    let first = persister.save(&[session("A"), session("B")]);
    assert!(first.is_clean());

    let second = persister.save(&[session("B"), session("C")]);
    assert!(second.is_clean());
    assert_eq!(second.index, vec!["A", "B", "C"]);
    assert_eq!(persister.known_folders().unwrap(), vec!["A", "B", "C"]);
}

#[test]
fn saved_geometry_restores_exactly_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("prefs.db");
    let geometry = WindowGeometry::new(12.5, 40.0, 1200.0, 800.0);

    {
        let mut persister =
            WindowPreferencePersister::new(SqlitePreferenceStore::open(&path).unwrap());
        let settings = SessionSettings::new("Demo").with_geometry(geometry);
        let demo = Session::from_settings(&settings, "Tester").unwrap();
        assert!(persister.save(&[demo]).is_clean());
        persister.store_mut().stop().unwrap();
    }

    let persister = WindowPreferencePersister::new(SqlitePreferenceStore::open(&path).unwrap());
    let restored = persister.restore("Demo").unwrap();
    assert_eq!(restored.title, "Demo");
    assert_eq!(restored.geometry, Some(geometry));
    assert_eq!(restored.layout(), WindowLayout::Restored(geometry));
    assert_eq!(restored.author_label.as_deref(), Some("Tester"));
    assert!(!restored.can_delete);
}

#[test]
fn partial_or_mistyped_geometry_falls_back_to_maximized() {
    let mut store = SqlitePreferenceStore::open_in_memory().unwrap();
    store.put_f64("journal-window/Half", JOURNAL_XPOS, 1.0).unwrap();
    store.put_f64("journal-window/Half", JOURNAL_YPOS, 2.0).unwrap();
    store.put_str("journal-window/Typo", JOURNAL_WIDTH, "wide").unwrap();
    store.flush("").unwrap();
    let persister = WindowPreferencePersister::new(store);

    let half = persister.restore("Half").unwrap();
    assert_eq!(half.title, "Half");
    assert_eq!(half.layout(), WindowLayout::Maximized);

    let typo = persister.restore("Typo").unwrap();
    assert_eq!(typo.geometry, None);
}

#[test]
fn one_failing_session_does_not_block_the_others() {
    let mut store = FlakyStore::new();
    store.fail_flush_node = Some("journal-window/Broken".to_string());
    let mut persister = WindowPreferencePersister::new(store);

    let report = persister.save(&[session("Broken"), session("Fine")]);
    assert!(!report.is_clean());
    assert_eq!(report.written, vec!["Fine"]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].folder, "Broken");
    assert!(report.failed[0].error.is_backing_store_failure());
    assert!(report.index_error.is_none());
    assert_eq!(persister.known_folders().unwrap(), vec!["Fine"]);
}

#[test]
fn failed_session_write_is_not_persisted_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("prefs.db");

    {
        let mut store = FlakyStore::over(SqlitePreferenceStore::open(&path).unwrap());
        store.fail_flush_node = Some("journal-window/Broken".to_string());
        let mut persister = WindowPreferencePersister::new(store);

        let report = persister.save(&[session("Broken"), session("Fine")]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.written, vec!["Fine"]);
        persister.store_mut().stop().unwrap();
    }

    let reopened = SqlitePreferenceStore::open(&path).unwrap();
    assert_eq!(
        reopened
            .get_str("journal-window/Broken", "journal_title")
            .unwrap(),
        None
    );
    assert_eq!(
        reopened
            .get_str("journal-window/Fine", "journal_title")
            .unwrap(),
        Some("Fine".to_string())
    );
    assert_eq!(
        reopened.get_list(JOURNAL_WINDOW_NODE, JOURNAL_NAMES_KEY).unwrap(),
        vec!["Fine".to_string()]
    );
}

#[test]
fn unreadable_index_is_left_untouched() {
    let mut persister = WindowPreferencePersister::new(FlakyStore::new());
    assert!(persister.save(&[session("A")]).is_clean());

    persister.store_mut().fail_index_read = true;
    let report = persister.save(&[session("B")]);
    assert_eq!(report.written, vec!["B"]);
    assert!(report.index_error.is_some());

    persister.store_mut().fail_index_read = false;
    assert_eq!(persister.known_folders().unwrap(), vec!["A"]);
    assert_eq!(
        persister.restore("B").unwrap().title,
        "B",
        "session record is still written"
    );
}

#[test]
fn delete_folder_shrinks_index_and_removes_record() {
    let mut persister =
        WindowPreferencePersister::new(SqlitePreferenceStore::open_in_memory().unwrap());
    persister.save(&[session("A"), session("B")]);

    assert!(persister.delete_folder("A").unwrap());
    assert!(!persister.delete_folder("A").unwrap());
    assert_eq!(persister.known_folders().unwrap(), vec!["B"]);
    assert_eq!(
        persister
            .store()
            .get_str("journal-window/A", "journal_title")
            .unwrap(),
        None
    );
}
