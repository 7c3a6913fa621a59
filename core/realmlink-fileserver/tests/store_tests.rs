use pretty_assertions::assert_eq;
use proptest::prelude::*;
use realmlink_fileserver::{
    ContentType, HtmlInjection, PERSISTENCE_PREFIX, VirtualResourceStore,
};
use realmlink_storage::{KvStore, MemoryKvStore};
use std::collections::BTreeMap;
use std::sync::Arc;

// ── Basic operations ────────────────────────────────────────────

#[test]
fn upload_and_get_infers_content_type() {
    let store = VirtualResourceStore::new();
    store.upload("/file/index.html", b"<h1>hi</h1>".to_vec(), None).unwrap();
    store.upload("/file/app.mjs", b"export {}".to_vec(), None).unwrap();

    let page = store.get("/file/index.html").unwrap();
    assert_eq!(page.body, b"<h1>hi</h1>".to_vec());
    assert_eq!(page.content_type, ContentType::Html);
    assert_eq!(store.get("/file/app.mjs").unwrap().content_type, ContentType::JavaScript);
    assert!(store.get("/file/missing").is_none());
}

#[test]
fn last_write_wins() {
    let store = VirtualResourceStore::new();
    store.upload("/file/a.txt", b"1".to_vec(), None).unwrap();
    store.upload("/file/a.txt", b"2".to_vec(), None).unwrap();
    assert_eq!(store.len(), 1);
    assert_eq!(store.get("/file/a.txt").unwrap().body, b"2".to_vec());
}

#[test]
fn upload_applies_transform() {
    let store = VirtualResourceStore::new();
    let injection = HtmlInjection::new("<script></script>");
    store
        .upload("/file/index.html", b"<head></head>".to_vec(), Some(&injection))
        .unwrap();
    assert_eq!(
        store.get("/file/index.html").unwrap().body,
        b"<head><script></script></head>".to_vec()
    );
}

#[test]
fn clear_removes_prefixed_paths_only() {
    let store = VirtualResourceStore::new();
    for path in ["/file/a", "/file/sub/b", "/files/c", "/other"] {
        store.upload(path, Vec::new(), None).unwrap();
    }
    assert_eq!(store.clear("/file/").unwrap(), 2);
    assert_eq!(store.paths(), vec!["/files/c".to_string(), "/other".to_string()]);
    assert_eq!(store.clear("/file/").unwrap(), 0);
}

#[test]
fn replace_scope_swaps_the_whole_set() {
    let store = VirtualResourceStore::new();
    store.upload("/file/old.txt", b"old".to_vec(), None).unwrap();
    store.upload("/keep.txt", b"keep".to_vec(), None).unwrap();

    let count = store
        .replace_scope(
            "/file/",
            vec![
                ("/file/new.txt".to_string(), b"new".to_vec()),
                ("/file/index.html".to_string(), b"<p>".to_vec()),
            ],
            None,
        )
        .unwrap();

    assert_eq!(count, 2);
    assert_eq!(
        store.paths(),
        vec![
            "/file/index.html".to_string(),
            "/file/new.txt".to_string(),
            "/keep.txt".to_string()
        ]
    );
}

// ── Persistence ─────────────────────────────────────────────────

#[test]
fn writes_go_through_to_kv() {
    let kv = Arc::new(MemoryKvStore::new());
    let store = VirtualResourceStore::with_persistence(kv.clone());
    store.upload("/file/a.txt", b"hi".to_vec(), None).unwrap();
    store.upload("/file/b.txt", b"yo".to_vec(), None).unwrap();
    store.clear("/file/b").unwrap();

    assert_eq!(
        kv.keys_with_prefix(PERSISTENCE_PREFIX).unwrap(),
        vec!["storage.files./file/a.txt".to_string()]
    );
    assert_eq!(
        kv.get("storage.files./file/a.txt").unwrap().as_deref(),
        Some("[104,105]")
    );
}

#[test]
fn restore_reloads_resources() {
    let kv = Arc::new(MemoryKvStore::new());
    {
        let store = VirtualResourceStore::with_persistence(kv.clone());
        store.upload("/file/index.html", b"<p>".to_vec(), None).unwrap();
    }
    kv.set("unrelated", "x").unwrap();

    let restored = VirtualResourceStore::restore(kv).unwrap();
    assert_eq!(restored.paths(), vec!["/file/index.html".to_string()]);
    assert_eq!(restored.get("/file/index.html").unwrap().content_type, ContentType::Html);
}

#[test]
fn restore_rejects_corrupt_bodies() {
    let kv = Arc::new(MemoryKvStore::new());
    kv.set("storage.files./file/a.txt", "not json").unwrap();
    assert!(VirtualResourceStore::restore(kv).is_err());
}

// ── Properties ──────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Op {
    Upload(String, u8),
    Clear(String),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    let path = prop::sample::select(vec!["/file/a", "/file/b", "/file/sub/c", "/other/d", "/f"]);
    let prefix = prop::sample::select(vec!["/file/", "/file/sub/", "/", "/other", "/x"]);
    prop_oneof![
        (path, any::<u8>()).prop_map(|(p, b)| Op::Upload(p.to_string(), b)),
        prefix.prop_map(|p| Op::Clear(p.to_string())),
    ]
}

proptest! {
    #[test]
    fn store_matches_last_write_wins_model(ops in prop::collection::vec(op_strategy(), 0..40)) {
        let store = VirtualResourceStore::new();
        let mut model: BTreeMap<String, u8> = BTreeMap::new();

        for op in ops {
            match op {
                Op::Upload(path, byte) => {
                    store.upload(&path, vec![byte], None).unwrap();
                    model.insert(path, byte);
                }
                Op::Clear(prefix) => {
                    let before = model.len();
                    model.retain(|path, _| !path.starts_with(&prefix));
                    prop_assert_eq!(store.clear(&prefix).unwrap(), before - model.len());
                    prop_assert!(store.paths().iter().all(|p| !p.starts_with(&prefix)));
                }
            }
        }

        prop_assert_eq!(store.paths(), model.keys().cloned().collect::<Vec<_>>());
        for (path, byte) in &model {
            prop_assert_eq!(store.get(path).unwrap().body, vec![*byte]);
        }
    }
}
