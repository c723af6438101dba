//! Tests for blob stores
//!
//! These tests verify:
//! - LocalBlobStore put/get/list against a temp directory
//! - MemoryBlobStore failure injection and call counters
//! - Endpoint dispatch and connection parameter validation

use std::io::Read;

use bytes::Bytes;
use floe::store::{self, BlobStore, LocalBlobStore, MemoryBlobStore};
use floe::{FloeError, StoreConfig};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn read_all(store: &dyn BlobStore, path: &str) -> Vec<u8> {
    let mut out = Vec::new();
    store.get(path).unwrap().read_to_end(&mut out).unwrap();
    out
}

fn setup_local_store() -> (TempDir, LocalBlobStore) {
    let temp_dir = TempDir::new().unwrap();
    let store = LocalBlobStore::new(temp_dir.path().join("acct").join("container"));
    store.ensure_container_exists().unwrap();
    (temp_dir, store)
}

fn store_config(endpoint: &str) -> StoreConfig {
    StoreConfig {
        endpoint: endpoint.to_string(),
        account: "acct".to_string(),
        access_key: "secret".to_string(),
        container: "blocks".to_string(),
    }
}

// =============================================================================
// LocalBlobStore Tests
// =============================================================================

#[test]
fn test_local_put_get() {
    let (_temp, store) = setup_local_store();

    store.put("u1/ts/block-a", Bytes::from_static(b"hello")).unwrap();

    assert_eq!(read_all(&store, "u1/ts/block-a"), b"hello".to_vec());
}

#[test]
fn test_local_put_overwrites() {
    let (_temp, store) = setup_local_store();

    store.put("p/k/f", Bytes::from_static(b"one")).unwrap();
    store.put("p/k/f", Bytes::from_static(b"two")).unwrap();

    assert_eq!(read_all(&store, "p/k/f"), b"two".to_vec());
}

#[test]
fn test_local_get_missing_is_not_found() {
    let (_temp, store) = setup_local_store();

    assert!(matches!(store.get("u1/ts/nothing"), Err(FloeError::NotFound(_))));
}

#[test]
fn test_local_list_by_prefix() {
    let (_temp, store) = setup_local_store();
    for path in ["u1/ts/b", "u1/ts/a", "u2/ts/c", "u10/ts/d"] {
        store.put(path, Bytes::from_static(b"x")).unwrap();
    }

    assert_eq!(store.list("u1/").unwrap(), vec!["u1/ts/a".to_string(), "u1/ts/b".to_string()]);
    assert_eq!(store.list("").unwrap().len(), 4);
    assert!(store.list("u3/").unwrap().is_empty());
}

#[test]
fn test_local_put_leaves_no_temp_files() {
    let (_temp, store) = setup_local_store();

    store.put("u1/ts/f", Bytes::from_static(b"data")).unwrap();

    let entries: Vec<String> = std::fs::read_dir(store.root().join("u1").join("ts"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(entries, vec!["f".to_string()]);
}

#[test]
fn test_local_put_before_container_exists_fails() {
    let temp_dir = TempDir::new().unwrap();
    let store = LocalBlobStore::new(temp_dir.path().join("missing"));

    assert!(store.put("p/k/f", Bytes::from_static(b"x")).is_err());

    store.ensure_container_exists().unwrap();
    assert!(store.put("p/k/f", Bytes::from_static(b"x")).is_ok());
}

#[test]
fn test_local_rejects_path_traversal() {
    let (_temp, store) = setup_local_store();

    assert!(store.put("../escape", Bytes::from_static(b"x")).is_err());
    assert!(store.put("p//f", Bytes::from_static(b"x")).is_err());
    assert!(store.get("../../etc/passwd").is_err());
}

#[test]
fn test_local_ensure_container_is_idempotent() {
    let (_temp, store) = setup_local_store();
    store.put("p/k/f", Bytes::from_static(b"x")).unwrap();

    store.ensure_container_exists().unwrap();

    assert_eq!(read_all(&store, "p/k/f"), b"x".to_vec());
}

// =============================================================================
// MemoryBlobStore Tests
// =============================================================================

#[test]
fn test_memory_requires_container() {
    let store = MemoryBlobStore::new();

    assert!(store.put("p/k/f", Bytes::from_static(b"x")).is_err());

    store.ensure_container_exists().unwrap();
    store.put("p/k/f", Bytes::from_static(b"x")).unwrap();
    assert!(store.contains("p/k/f"));
}

#[test]
fn test_memory_injected_put_failures() {
    let store = MemoryBlobStore::new();
    store.ensure_container_exists().unwrap();
    store.fail_next_puts(2);

    assert!(store.put("a", Bytes::from_static(b"1")).is_err());
    assert!(store.put("a", Bytes::from_static(b"1")).is_err());
    assert!(store.put("a", Bytes::from_static(b"1")).is_ok());

    assert_eq!(store.put_count(), 3);
    assert_eq!(store.blob_count(), 1);
}

#[test]
fn test_memory_injected_get_and_list_failures() {
    let store = MemoryBlobStore::new();
    store.ensure_container_exists().unwrap();
    store.put("p/k/f", Bytes::from_static(b"x")).unwrap();

    store.set_fail_gets(true);
    store.set_fail_lists(true);
    assert!(store.get("p/k/f").is_err());
    assert!(store.list("p/").is_err());

    store.set_fail_gets(false);
    store.set_fail_lists(false);
    assert_eq!(read_all(&store, "p/k/f"), b"x".to_vec());
    assert_eq!(store.list("p/").unwrap(), vec!["p/k/f".to_string()]);

    assert_eq!(store.get_count(), 2);
    assert_eq!(store.list_count(), 2);
}

// =============================================================================
// Connect Tests
// =============================================================================

#[test]
fn test_connect_memory_endpoint() {
    let store = store::connect(&store_config("memory://test")).unwrap();
    store.ensure_container_exists().unwrap();

    store.put("p/k/f", Bytes::from_static(b"x")).unwrap();

    assert_eq!(store.list("p/").unwrap(), vec!["p/k/f".to_string()]);
}

#[test]
fn test_connect_file_endpoint_nests_account_and_container() {
    let temp_dir = TempDir::new().unwrap();
    let endpoint = format!("file://{}", temp_dir.path().display());

    let store = store::connect(&store_config(&endpoint)).unwrap();
    store.ensure_container_exists().unwrap();
    store.put("p/k/f", Bytes::from_static(b"x")).unwrap();

    assert!(temp_dir.path().join("acct").join("blocks").join("p").join("k").join("f").exists());
}

#[test]
fn test_connect_bare_path_endpoint() {
    let temp_dir = TempDir::new().unwrap();
    let endpoint = temp_dir.path().display().to_string();

    let store = store::connect(&store_config(&endpoint)).unwrap();
    store.ensure_container_exists().unwrap();

    assert!(temp_dir.path().join("acct").join("blocks").is_dir());
}

#[test]
fn test_connect_unknown_scheme_rejected() {
    let result = store::connect(&store_config("s3://bucket"));

    assert!(matches!(result, Err(FloeError::Config(_))));
}

#[test]
fn test_connect_rejects_blank_parameters() {
    let blank_endpoint = StoreConfig { endpoint: " ".to_string(), ..store_config("memory://") };
    let blank_account = StoreConfig { account: String::new(), ..store_config("memory://") };
    let blank_key = StoreConfig { access_key: String::new(), ..store_config("memory://") };
    let blank_container = StoreConfig { container: String::new(), ..store_config("memory://") };

    for (config, field) in [
        (blank_endpoint, "endpoint"),
        (blank_account, "account"),
        (blank_key, "access_key"),
        (blank_container, "container"),
    ] {
        match store::connect(&config) {
            Err(FloeError::Config(msg)) => assert!(msg.contains(field), "{}", msg),
            Err(other) => panic!("expected config error for {}, got {}", field, other),
            Ok(_) => panic!("expected config error for {}", field),
        }
    }
}
