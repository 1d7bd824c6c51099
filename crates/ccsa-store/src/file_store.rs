//! The on-disk artifact repository.
//!
//! Layout under a store root `R`:
//! ```text
//! R/objects/<ref>          raw bytes
//! R/meta/<ref>.json        artifact metadata
//! R/names.json             {version, updatedAt, names: {name -> ref}}
//! ```
//!
//! All operations are serialized by a single per-store mutex, trading
//! throughput for linearizable semantics — an acceptable cost for a local
//! single-writer store.

use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::atomic::write_atomic;
use crate::error::{StoreError, StoreResult};
use crate::model::{AliasIndex, Artifact, ArtifactKind, Selector};

pub struct FileStore {
    root: PathBuf,
    guard: Mutex<()>,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            guard: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn index_path(&self) -> PathBuf {
        self.root.join("names.json")
    }

    fn object_path(&self, r: &str) -> PathBuf {
        self.root.join("objects").join(r)
    }

    fn meta_path(&self, r: &str) -> PathBuf {
        self.root.join("meta").join(format!("{r}.json"))
    }

    fn load_index(&self) -> StoreResult<AliasIndex> {
        match fs::read(self.index_path()) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AliasIndex::default()),
            Err(e) => Err(e.into()),
        }
    }

    fn save_index(&self, index: &mut AliasIndex) -> StoreResult<()> {
        index.updated_at = Utc::now();
        let bytes = serde_json::to_vec_pretty(index)?;
        write_atomic(&self.index_path(), &bytes, 0o644)
    }

    fn read_meta(&self, r: &str) -> StoreResult<Artifact> {
        let bytes = fs::read(self.meta_path(r))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Persist `artifact` with `payload`, honoring the optional CAS guard.
    pub fn save(
        &self,
        mut artifact: Artifact,
        payload: &[u8],
        expected_prev_ref: Option<String>,
    ) -> StoreResult<Artifact> {
        let _guard = self.guard.lock().unwrap();
        let mut index = self.load_index()?;
        let existing = index.names.get(&artifact.name).cloned();

        if let Some(expected) = &expected_prev_ref {
            if existing.as_ref() != Some(expected) {
                return Err(StoreError::Conflict(format!(
                    "expected prev ref {expected}, found {}",
                    existing.as_deref().unwrap_or("<none>")
                )));
            }
        }

        if let Some(e) = &existing {
            if *e != artifact.ref_ && artifact.prev_ref.is_none() {
                artifact.prev_ref = Some(e.clone());
            }
        }

        write_atomic(&self.object_path(&artifact.ref_), payload, 0o644)?;
        let meta_bytes = serde_json::to_vec_pretty(&artifact)?;
        write_atomic(&self.meta_path(&artifact.ref_), &meta_bytes, 0o644)?;

        index.names.insert(artifact.name.clone(), artifact.ref_.clone());
        self.save_index(&mut index)?;
        Ok(artifact)
    }

    pub fn resolve(&self, name: &str) -> StoreResult<String> {
        let _guard = self.guard.lock().unwrap();
        let mut index = self.load_index()?;
        let r = index.names.get(name).cloned().ok_or(StoreError::NotFound)?;
        if !self.meta_path(&r).exists() || !self.object_path(&r).exists() {
            index.names.remove(name);
            self.save_index(&mut index)?;
            return Err(StoreError::NotFound);
        }
        Ok(r)
    }

    pub fn get(&self, selector: &Selector) -> StoreResult<(Artifact, Vec<u8>)> {
        let _guard = self.guard.lock().unwrap();
        let r = match selector {
            Selector::Name(n) => {
                let mut index = self.load_index()?;
                let r = index.names.get(n).cloned().ok_or(StoreError::NotFound)?;
                if !self.meta_path(&r).exists() || !self.object_path(&r).exists() {
                    index.names.remove(n);
                    self.save_index(&mut index)?;
                    return Err(StoreError::NotFound);
                }
                r
            }
            Selector::Ref(r) => r.clone(),
        };
        let artifact = self.read_meta(&r).map_err(|_| StoreError::NotFound)?;
        let payload = fs::read(self.object_path(&r)).map_err(|_| StoreError::NotFound)?;
        Ok((artifact, payload))
    }

    pub fn list(&self, prefix: &str, limit: usize) -> StoreResult<Vec<Artifact>> {
        let _guard = self.guard.lock().unwrap();
        let mut index = self.load_index()?;
        let mut names: Vec<String> = index
            .names
            .keys()
            .filter(|n| n.starts_with(prefix))
            .cloned()
            .collect();
        names.sort();
        names.truncate(limit);

        let mut out = Vec::with_capacity(names.len());
        let mut changed = false;
        for name in names {
            let r = match index.names.get(&name) {
                Some(r) => r.clone(),
                None => continue,
            };
            match self.read_meta(&r) {
                Ok(mut artifact) => {
                    if artifact.name.is_empty() {
                        artifact.name = name;
                    }
                    out.push(artifact);
                }
                Err(_) => {
                    index.names.remove(&name);
                    changed = true;
                }
            }
        }
        if changed {
            self.save_index(&mut index)?;
        }
        Ok(out)
    }

    pub fn delete(&self, selector: &Selector) -> StoreResult<Artifact> {
        let _guard = self.guard.lock().unwrap();
        let mut index = self.load_index()?;

        let (target_ref, names_to_remove): (Option<String>, Vec<String>) = match selector {
            Selector::Name(n) => (index.names.get(n).cloned(), vec![n.clone()]),
            Selector::Ref(r) => {
                let names: Vec<String> = index
                    .names
                    .iter()
                    .filter(|(_, v)| *v == r)
                    .map(|(k, _)| k.clone())
                    .collect();
                (Some(r.clone()), names)
            }
        };

        let mut removed_something = false;
        let mut surviving_meta = None;

        if let Some(r) = &target_ref {
            surviving_meta = self.read_meta(r).ok();
            removed_something |= remove_if_present(&self.meta_path(r))?;
            removed_something |= remove_if_present(&self.object_path(r))?;
        }

        for n in &names_to_remove {
            if index.names.remove(n).is_some() {
                removed_something = true;
            }
        }

        if !removed_something {
            return Err(StoreError::NotFound);
        }
        self.save_index(&mut index)?;

        Ok(surviving_meta.unwrap_or_else(|| Artifact {
            ref_: target_ref.unwrap_or_default(),
            name: names_to_remove.first().cloned().unwrap_or_default(),
            kind: ArtifactKind::File,
            mime_type: String::new(),
            filename: None,
            size_bytes: 0,
            sha256: String::new(),
            created_at: Utc::now(),
            prev_ref: None,
        }))
    }
}

fn remove_if_present(path: &Path) -> StoreResult<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ArtifactKind;
    use tempfile::tempdir;

    fn artifact(name: &str, r: &str) -> Artifact {
        Artifact {
            ref_: r.to_string(),
            name: name.to_string(),
            kind: ArtifactKind::Text,
            mime_type: "text/plain; charset=utf-8".to_string(),
            filename: None,
            size_bytes: 5,
            sha256: "deadbeef".to_string(),
            created_at: Utc::now(),
            prev_ref: None,
        }
    }

    #[test]
    fn save_then_resolve_then_get() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path());
        let saved = store
            .save(artifact("plan/a", "20260216T101019Z-aaaaaaaaaaaaaaaa"), b"first", None)
            .unwrap();
        assert_eq!(store.resolve("plan/a").unwrap(), saved.ref_);
        let (meta, bytes) = store.get(&Selector::Name("plan/a".to_string())).unwrap();
        assert_eq!(bytes, b"first");
        assert_eq!(meta.ref_, saved.ref_);
    }

    #[test]
    fn second_save_links_prev_ref() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path());
        let a1 = store
            .save(artifact("plan/a", "20260216T101019Z-aaaaaaaaaaaaaaaa"), b"first", None)
            .unwrap();
        let a2 = store
            .save(artifact("plan/a", "20260216T101020Z-bbbbbbbbbbbbbbbb"), b"second", None)
            .unwrap();
        assert_eq!(a2.prev_ref.as_deref(), Some(a1.ref_.as_str()));
        assert_eq!(store.resolve("plan/a").unwrap(), a2.ref_);
        let (old_meta, old_bytes) = store
            .get(&Selector::Ref(a1.ref_.clone()))
            .unwrap();
        assert_eq!(old_bytes, b"first");
        assert_eq!(old_meta.ref_, a1.ref_);
    }

    #[test]
    fn cas_conflict_on_stale_expected_prev_ref() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path());
        let a1 = store
            .save(artifact("plan/a", "20260216T101019Z-aaaaaaaaaaaaaaaa"), b"first", None)
            .unwrap();
        let err = store
            .save(
                artifact("plan/a", "20260216T101020Z-bbbbbbbbbbbbbbbb"),
                b"second",
                Some("20260216T101019Z-cccccccccccccccc".to_string()),
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(store.resolve("plan/a").unwrap(), a1.ref_);
    }

    #[test]
    fn cas_success_with_matching_expected_prev_ref() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path());
        let a1 = store
            .save(artifact("plan/a", "20260216T101019Z-aaaaaaaaaaaaaaaa"), b"first", None)
            .unwrap();
        let a2 = store
            .save(
                artifact("plan/a", "20260216T101020Z-bbbbbbbbbbbbbbbb"),
                b"second",
                Some(a1.ref_.clone()),
            )
            .unwrap();
        assert_eq!(a2.prev_ref.as_deref(), Some(a1.ref_.as_str()));
    }

    #[test]
    fn delete_by_name_is_idempotent_not_found_after() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path());
        let a1 = store
            .save(artifact("plan/a", "20260216T101019Z-aaaaaaaaaaaaaaaa"), b"first", None)
            .unwrap();
        store.delete(&Selector::Name("plan/a".to_string())).unwrap();
        assert!(matches!(
            store.resolve("plan/a").unwrap_err(),
            StoreError::NotFound
        ));
        assert!(matches!(
            store.get(&Selector::Ref(a1.ref_)).unwrap_err(),
            StoreError::NotFound
        ));
        assert!(matches!(
            store.delete(&Selector::Name("plan/a".to_string())).unwrap_err(),
            StoreError::NotFound
        ));
    }

    #[test]
    fn self_heals_dangling_alias() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path());
        let a1 = store
            .save(artifact("plan/a", "20260216T101019Z-aaaaaaaaaaaaaaaa"), b"first", None)
            .unwrap();
        fs::remove_file(dir.path().join("objects").join(&a1.ref_)).unwrap();
        fs::remove_file(dir.path().join("meta").join(format!("{}.json", a1.ref_))).unwrap();
        assert!(matches!(
            store.resolve("plan/a").unwrap_err(),
            StoreError::NotFound
        ));
        let index: AliasIndex =
            serde_json::from_slice(&fs::read(dir.path().join("names.json")).unwrap()).unwrap();
        assert!(!index.names.contains_key("plan/a"));
    }

    #[test]
    fn concurrent_cas_saves_exactly_one_winner() {
        use std::sync::Arc;
        use std::thread;

        let dir = tempdir().unwrap();
        let store = Arc::new(FileStore::new(dir.path()));
        let a1 = store
            .save(artifact("plan/a", "20260216T101019Z-aaaaaaaaaaaaaaaa"), b"first", None)
            .unwrap();

        let refs = [
            "20260216T101020Z-1111111111111111",
            "20260216T101020Z-2222222222222222",
        ];
        let handles: Vec<_> = refs
            .iter()
            .map(|r| {
                let store = Arc::clone(&store);
                let prev = a1.ref_.clone();
                let r = r.to_string();
                thread::spawn(move || {
                    store.save(artifact("plan/a", &r), b"racer", Some(prev))
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let ok_count = results.iter().filter(|r| r.is_ok()).count();
        let err_count = results
            .iter()
            .filter(|r| matches!(r, Err(StoreError::Conflict(_))))
            .count();
        assert_eq!(ok_count, 1, "exactly one racer should win the CAS");
        assert_eq!(err_count, 1, "exactly one racer should see Conflict");

        let winner = results.into_iter().find(|r| r.is_ok()).unwrap().unwrap();
        assert_eq!(winner.prev_ref.as_deref(), Some(a1.ref_.as_str()));
        assert_eq!(store.resolve("plan/a").unwrap(), winner.ref_);
    }

    #[test]
    fn list_filters_by_prefix_and_sorts() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path());
        store
            .save(artifact("plan/b", "20260216T101019Z-aaaaaaaaaaaaaaaa"), b"x", None)
            .unwrap();
        store
            .save(artifact("plan/a", "20260216T101020Z-bbbbbbbbbbbbbbbb"), b"y", None)
            .unwrap();
        store
            .save(artifact("other/a", "20260216T101021Z-cccccccccccccccc"), b"z", None)
            .unwrap();
        let results = store.list("plan/", 200).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].name, "plan/a");
        assert_eq!(results[1].name, "plan/b");
    }
}
