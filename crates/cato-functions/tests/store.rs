mod common;

use cato_functions::{
    Dispatcher, DispatcherConfig, KvStore, MemoryStore, Namespace, ProjectStore, SqliteStore,
};
use common::{assert_eq, deploy};
use rstest::rstest;
use serde_json::json;
use std::sync::Arc;

trait Backend: ProjectStore + KvStore {}
impl<T: ProjectStore + KvStore> Backend for T {}

fn memory() -> Box<dyn Backend> {
    Box::new(MemoryStore::new())
}

fn sqlite() -> Box<dyn Backend> {
    Box::new(SqliteStore::open_in_memory().unwrap())
}

#[rstest]
#[case::memory(memory())]
#[case::sqlite(sqlite())]
fn test_kv_operations(#[case] store: Box<dyn Backend>) {
    let project = store.create_project("kv").unwrap();
    let ns = Namespace::from(&project);

    assert_eq!(store.get(ns, "missing").unwrap(), None);
    store.set(ns, "b", "2").unwrap();
    store.set(ns, "a", "1").unwrap();
    store.set(ns, "a", "one").unwrap();

    assert_eq!(
        store.list(ns).unwrap(),
        vec![
            ("a".to_string(), "one".to_string()),
            ("b".to_string(), "2".to_string()),
        ]
    );
    assert!(store.delete(ns, "b").unwrap());
    assert!(!store.delete(ns, "b").unwrap());
    assert_eq!(store.clear(ns).unwrap(), 1);
    assert_eq!(store.list(ns).unwrap(), vec![]);
}

#[rstest]
#[case::memory(memory())]
#[case::sqlite(sqlite())]
fn test_namespaces_do_not_share_keys(#[case] store: Box<dyn Backend>) {
    let a = store.create_project("a").unwrap();
    let b = store.create_project("b").unwrap();

    store.set(Namespace::from(&a), "token", "A").unwrap();
    store.set(Namespace::from(&b), "token", "B").unwrap();
    store.clear(Namespace::from(&b)).unwrap();

    assert_eq!(
        store.get(Namespace::from(&a), "token").unwrap(),
        Some("A".to_string())
    );
    assert_eq!(store.get(Namespace::from(&b), "token").unwrap(), None);
}

#[rstest]
#[case::memory(memory())]
#[case::sqlite(sqlite())]
fn test_projects(#[case] store: Box<dyn Backend>) {
    let first = store.create_project("first").unwrap();
    let second = store.create_project("second").unwrap();

    assert_eq!(store.resolve(first.public_id()).unwrap(), Some(first.clone()));
    assert_eq!(store.resolve("nope").unwrap(), None);
    assert_eq!(
        store
            .list_projects()
            .unwrap()
            .iter()
            .map(|p| p.name().to_string())
            .collect::<Vec<_>>(),
        vec!["first", "second"]
    );

    store.put_file(&second, "server.py", b"v1").unwrap();
    store.put_file(&second, "server.py", b"v2").unwrap();
    assert_eq!(
        store.get_file(&second, "server.py").unwrap(),
        Some(b"v2".to_vec())
    );
    assert_eq!(store.get_file(&first, "server.py").unwrap(), None);
}

#[rstest]
#[case::memory(memory())]
#[case::sqlite(sqlite())]
fn test_delete_project_cascades(#[case] store: Box<dyn Backend>) {
    let doomed = store.create_project("doomed").unwrap();
    let kept = store.create_project("kept").unwrap();
    store.put_file(&doomed, "server.py", b"response = 1").unwrap();
    store.set(Namespace::from(&doomed), "k", "v").unwrap();
    store.set(Namespace::from(&kept), "k", "v").unwrap();

    assert!(store.delete_project(&doomed).unwrap());

    assert_eq!(store.resolve(doomed.public_id()).unwrap(), None);
    assert_eq!(store.get_file(&doomed, "server.py").unwrap(), None);
    assert_eq!(store.list(Namespace::from(&doomed)).unwrap(), vec![]);
    assert_eq!(
        store.get(Namespace::from(&kept), "k").unwrap(),
        Some("v".to_string())
    );
}

#[test]
fn test_sqlite_state_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cato.db");

    let public_id = {
        let store = Arc::new(SqliteStore::open(&path).unwrap());
        let project = deploy(
            &*store,
            "n = int(db.get('n') or 0) + 1\ndb.set('n', str(n))\nresponse = n",
        );
        let dispatcher = Dispatcher::with_store(store, DispatcherConfig::default());
        let invocation = dispatcher.invoke_blocking(project.public_id(), None).unwrap();
        assert_eq!(invocation.result, Some(json!(1)));
        project.public_id().to_string()
    };

    let store = Arc::new(SqliteStore::open(&path).unwrap());
    let dispatcher = Dispatcher::with_store(store, DispatcherConfig::default());
    let invocation = dispatcher.invoke_blocking(&public_id, None).unwrap();
    assert_eq!(invocation.result, Some(json!(2)));
}

#[test]
fn test_sqlite_concurrent_writers_lose_no_keys() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let project = store.create_project("busy").unwrap();
    let ns = Namespace::from(&project);

    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let store = store.clone();
            std::thread::spawn(move || {
                for i in 0..25 {
                    store
                        .set(ns, &format!("w{}-{}", worker, i), "x")
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(store.list(ns).unwrap().len(), 100);
}
