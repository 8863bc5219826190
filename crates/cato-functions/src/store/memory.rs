use crate::error::{StoreError, StoreResult};
use crate::kv::{KvStore, Namespace};
use crate::project::{new_public_id, ProjectId, ProjectRecord, ProjectStore};
use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Default)]
struct State {
    next_id: i64,
    projects: BTreeMap<ProjectId, ProjectRecord>,
    files: HashMap<(ProjectId, String), Vec<u8>>,
    entries: HashMap<ProjectId, BTreeMap<String, String>>,
}

/// In-process backend
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, State>> {
        self.state.read().map_err(|_| StoreError::Poisoned)
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, State>> {
        self.state.write().map_err(|_| StoreError::Poisoned)
    }
}

impl ProjectStore for MemoryStore {
    fn create_project(&self, name: &str) -> StoreResult<ProjectRecord> {
        let mut state = self.write()?;
        state.next_id += 1;
        let record = ProjectRecord::new(ProjectId::new(state.next_id), new_public_id(), name);
        state.projects.insert(record.id(), record.clone());
        Ok(record)
    }

    fn resolve(&self, public_id: &str) -> StoreResult<Option<ProjectRecord>> {
        let state = self.read()?;
        Ok(state
            .projects
            .values()
            .find(|project| project.public_id() == public_id)
            .cloned())
    }

    fn list_projects(&self) -> StoreResult<Vec<ProjectRecord>> {
        Ok(self.read()?.projects.values().cloned().collect())
    }

    fn put_file(&self, project: &ProjectRecord, path: &str, content: &[u8]) -> StoreResult<()> {
        self.write()?
            .files
            .insert((project.id(), path.to_string()), content.to_vec());
        Ok(())
    }

    fn get_file(&self, project: &ProjectRecord, path: &str) -> StoreResult<Option<Vec<u8>>> {
        let state = self.read()?;
        Ok(state.files.get(&(project.id(), path.to_string())).cloned())
    }

    fn delete_project(&self, project: &ProjectRecord) -> StoreResult<bool> {
        let mut state = self.write()?;
        let id = project.id();
        let existed = state.projects.remove(&id).is_some();
        state.files.retain(|(owner, _), _| *owner != id);
        state.entries.remove(&id);
        Ok(existed)
    }
}

impl KvStore for MemoryStore {
    fn get(&self, ns: Namespace, key: &str) -> StoreResult<Option<String>> {
        let state = self.read()?;
        Ok(state
            .entries
            .get(&ns.project_id())
            .and_then(|entries| entries.get(key))
            .cloned())
    }

    fn set(&self, ns: Namespace, key: &str, value: &str) -> StoreResult<()> {
        self.write()?
            .entries
            .entry(ns.project_id())
            .or_default()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, ns: Namespace, key: &str) -> StoreResult<bool> {
        let mut state = self.write()?;
        Ok(state
            .entries
            .get_mut(&ns.project_id())
            .is_some_and(|entries| entries.remove(key).is_some()))
    }

    fn list(&self, ns: Namespace) -> StoreResult<Vec<(String, String)>> {
        let state = self.read()?;
        Ok(state
            .entries
            .get(&ns.project_id())
            .map(|entries| {
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    fn clear(&self, ns: Namespace) -> StoreResult<usize> {
        let mut state = self.write()?;
        Ok(state
            .entries
            .remove(&ns.project_id())
            .map_or(0, |entries| entries.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_delete_project_cascades() {
        let store = MemoryStore::new();
        let project = store.create_project("demo").unwrap();
        let ns = Namespace::from(&project);
        store.put_file(&project, "server.py", b"response = 1").unwrap();
        store.set(ns, "k", "v").unwrap();

        assert!(store.delete_project(&project).unwrap());
        assert!(!store.delete_project(&project).unwrap());
        assert_eq!(store.resolve(project.public_id()).unwrap(), None);
        assert_eq!(store.get_file(&project, "server.py").unwrap(), None);
        assert_eq!(store.list(ns).unwrap(), vec![]);
    }

    #[test]
    fn test_ids_are_sequential() {
        let store = MemoryStore::new();
        let first = store.create_project("a").unwrap();
        let second = store.create_project("b").unwrap();
        assert_eq!(first.id().get() + 1, second.id().get());
        assert_ne!(first.public_id(), second.public_id());
    }
}
