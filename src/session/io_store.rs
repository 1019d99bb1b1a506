// The resumable store: string values under fixed keys, written after every change.

use crate::session::*;

use std::collections::{BTreeMap, HashMap};
use tempfile::NamedTempFile;

pub const STATE_KEY: &str = "mbi_state";
pub const COMPLETED_KEY: &str = "mbi_completed";
pub const RESPONSES_KEY: &str = "mbi_responses";

pub trait ResumableStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: String) -> SessionResult<()>;
    fn remove(&mut self, key: &str) -> SessionResult<()>;
}

/// A store that only lives as long as the process.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    values: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }
}

impl ResumableStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: String) -> SessionResult<()> {
        self.values.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&mut self, key: &str) -> SessionResult<()> {
        self.values.remove(key);
        Ok(())
    }
}

/// A store kept as a JSON object in a file. Every change writes a new file next to the old one
/// and renames it over, so the file on disk is always a complete snapshot.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl FileStore {
    /// Opens the store. A missing or unreadable file is an empty store.
    pub fn open(path: &Path) -> FileStore {
        let values = match fs::read_to_string(path) {
            Ok(s) => match serde_json::from_str::<BTreeMap<String, String>>(&s) {
                Ok(v) => v,
                Err(e) => {
                    warn!(
                        "FileStore::open: ignoring corrupt store {}: {}",
                        path.display(),
                        e
                    );
                    BTreeMap::new()
                }
            },
            Err(e) => {
                debug!("FileStore::open: no store at {}: {}", path.display(), e);
                BTreeMap::new()
            }
        };
        FileStore {
            path: path.to_path_buf(),
            values,
        }
    }

    fn flush(&self) -> SessionResult<()> {
        let js = serde_json::to_string_pretty(&self.values).context(WritingJsonSnafu {})?;
        let path = self.path.display().to_string();
        let dir = match self.path.parent() {
            Some(d) if !d.as_os_str().is_empty() => d,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(dir).context(StoreIoSnafu { path: &path })?;
        tmp.write_all(js.as_bytes())
            .context(StoreIoSnafu { path: &path })?;
        tmp.as_file()
            .sync_all()
            .context(StoreIoSnafu { path: &path })?;
        tmp.persist(&self.path)
            .map_err(|e| e.error)
            .context(StoreIoSnafu { path })?;
        Ok(())
    }
}

impl ResumableStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: String) -> SessionResult<()> {
        self.values.insert(key.to_string(), value);
        self.flush()
    }

    fn remove(&mut self, key: &str) -> SessionResult<()> {
        if self.values.remove(key).is_some() {
            self.flush()?;
        }
        Ok(())
    }
}

pub fn save_progress<S: ResumableStore>(store: &mut S, state: &SurveyState) -> SessionResult<()> {
    let snapshot = state.to_snapshot().context(SurveySnafu {})?;
    store.set(STATE_KEY, snapshot)
}

/// The saved session, if there is one that can be trusted.
pub fn load_progress<S: ResumableStore>(store: &S) -> Option<Survey> {
    let snapshot = store.get(STATE_KEY)?;
    match SurveyState::from_snapshot(&snapshot).and_then(Survey::resume) {
        Ok(survey) => Some(survey),
        Err(e) => {
            warn!("load_progress: ignoring saved session: {}", e);
            None
        }
    }
}

/// Replaces the saved session with the completion record.
pub fn save_completion<S: ResumableStore>(
    store: &mut S,
    completed: &CompletedSurvey,
) -> SessionResult<()> {
    let snapshot = completed.to_snapshot().context(SurveySnafu {})?;
    store.set(RESPONSES_KEY, snapshot)?;
    store.set(COMPLETED_KEY, "true".to_string())?;
    store.remove(STATE_KEY)
}

pub fn load_completion<S: ResumableStore>(store: &S) -> Option<CompletedSurvey> {
    if store.get(COMPLETED_KEY).as_deref() != Some("true") {
        return None;
    }
    let snapshot = store.get(RESPONSES_KEY)?;
    match CompletedSurvey::from_snapshot(&snapshot) {
        Ok(c) => Some(c),
        Err(e) => {
            warn!("load_completion: ignoring completion record: {}", e);
            None
        }
    }
}

pub fn clear<S: ResumableStore>(store: &mut S) -> SessionResult<()> {
    store.remove(STATE_KEY)?;
    store.remove(RESPONSES_KEY)?;
    store.remove(COMPLETED_KEY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn started(seed: u64) -> Survey {
        let config = SurveyConfig::default();
        let mut b = CatalogBuilder::new(&config);
        b.add_outlet_simple("tg1", "TG1", MediaType::Tg);
        b.add_outlet_simple("tg2", "TG2", MediaType::Tg);
        b.add_outlet_simple("radio1", "Radio 1", MediaType::Radio);
        let catalog = b.build().unwrap();
        let mut survey = Survey::new();
        survey
            .start(true, &catalog, &config, &mut StdRng::seed_from_u64(seed))
            .unwrap();
        survey
    }

    #[test]
    fn progress_round_trip_in_memory() {
        let mut store = MemoryStore::new();
        assert_eq!(load_progress(&store), None);
        let mut survey = started(1);
        survey.select_current(Choice::DontKnow).unwrap();
        survey.advance().unwrap();
        save_progress(&mut store, survey.state().unwrap()).unwrap();
        assert_eq!(load_progress(&store), Some(survey));
    }

    #[test]
    fn corrupt_snapshot_is_no_session() {
        let mut store = MemoryStore::new();
        store.set(STATE_KEY, "{\"pairs\": []".to_string()).unwrap();
        assert_eq!(load_progress(&store), None);
    }

    #[test]
    fn file_store_persists_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let survey = started(2);
        {
            let mut store = FileStore::open(&path);
            save_progress(&mut store, survey.state().unwrap()).unwrap();
        }
        let store = FileStore::open(&path);
        assert_eq!(load_progress(&store), Some(survey));
    }

    #[test]
    fn interrupted_write_keeps_the_last_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let mut survey = started(4);
        let mut store = FileStore::open(&path);
        survey.select_current(Choice::DontKnow).unwrap();
        save_progress(&mut store, survey.state().unwrap()).unwrap();
        let saved = survey.clone();

        // A write cut short leaves a partial sibling file behind, never a partial store.
        let left = survey.state().unwrap().current_pair().unwrap().left.codename.clone();
        survey.select_current(Choice::Outlet(left)).unwrap();
        let next = survey.state().unwrap().to_snapshot().unwrap();
        let mut partial = NamedTempFile::new_in(dir.path()).unwrap();
        partial
            .write_all(&next.as_bytes()[..next.len() / 2])
            .unwrap();
        partial.keep().unwrap();

        let reopened = FileStore::open(&path);
        assert_eq!(load_progress(&reopened), Some(saved));
    }

    #[test]
    fn writes_leave_only_the_store_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let mut store = FileStore::open(&path);
        store.set(STATE_KEY, "a".to_string()).unwrap();
        store.set(COMPLETED_KEY, "true".to_string()).unwrap();
        store.remove(STATE_KEY).unwrap();
        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["session.json".to_string()]);
        assert_eq!(FileStore::open(&path).get(COMPLETED_KEY).as_deref(), Some("true"));
    }

    #[test]
    fn corrupt_file_is_an_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        fs::write(&path, "not json").unwrap();
        let store = FileStore::open(&path);
        assert_eq!(store.get(STATE_KEY), None);
    }

    #[test]
    fn completion_replaces_progress_and_clears() {
        let mut store = MemoryStore::new();
        let mut survey = started(3);
        save_progress(&mut store, survey.state().unwrap()).unwrap();
        survey.select_current(Choice::DontKnow).unwrap();
        while survey.advance().unwrap() != Step::Completed {}
        let completed = survey.completed().unwrap().clone();

        save_completion(&mut store, &completed).unwrap();
        assert_eq!(store.get(STATE_KEY), None);
        assert_eq!(load_completion(&store), Some(completed));

        clear(&mut store).unwrap();
        assert_eq!(load_completion(&store), None);
        assert_eq!(store.get(RESPONSES_KEY), None);
    }

    #[test]
    fn completion_needs_the_flag() {
        let mut store = MemoryStore::new();
        store.set(RESPONSES_KEY, "{}".to_string()).unwrap();
        assert_eq!(load_completion(&store), None);
    }
}
