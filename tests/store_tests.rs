use std::cell::Cell;
use std::path::PathBuf;
use std::sync::Mutex;

use mail_dispenser::DispenserError;
use mail_dispenser::domain::email::{
    ExpirationPolicy, Message, MessageId, MessageSummary, Remaining, TimeUnit,
};
use mail_dispenser::mail::api::MailboxApi;
use mail_dispenser::store::lifecycle::{EmailStore, device_id, entries_key, time_remaining};
use mail_dispenser::store::repo::LocalStorage;
use mail_dispenser::store::sqlite::SqliteStorage;

const T0: i64 = 1_700_000_000;
const HOUR: i64 = 3600;

#[derive(Default)]
struct FakeApi {
    generated: Mutex<Vec<mail_dispenser::Result<String>>>,
}

impl FakeApi {
    fn returning(results: Vec<mail_dispenser::Result<String>>) -> Self {
        Self {
            generated: Mutex::new(results),
        }
    }
}

impl MailboxApi for FakeApi {
    fn gen_random_mailbox(&self) -> mail_dispenser::Result<String> {
        self.generated
            .lock()
            .map_err(|_| DispenserError::Api("poisoned".into()))?
            .pop()
            .unwrap_or_else(|| Err(DispenserError::Api("exhausted".into())))
    }

    fn get_messages(&self, _address: &str) -> mail_dispenser::Result<Vec<MessageSummary>> {
        Ok(vec![])
    }

    fn read_message(&self, _address: &str, _id: MessageId) -> mail_dispenser::Result<Message> {
        Err(DispenserError::Api("not found".into()))
    }

    fn download_url(
        &self,
        _address: &str,
        _id: MessageId,
        _file: &str,
    ) -> mail_dispenser::Result<url::Url> {
        Err(DispenserError::Api("unsupported".into()))
    }

    fn download(&self, _address: &str, _id: MessageId, _file: &str) -> mail_dispenser::Result<Vec<u8>> {
        Err(DispenserError::Api("unsupported".into()))
    }
}

fn new_store() -> EmailStore<SqliteStorage> {
    EmailStore::restore(SqliteStorage::open_memory().expect("open memory db")).expect("restore")
}

fn persisted(store: &EmailStore<SqliteStorage>) -> Option<String> {
    let key = entries_key(&device_id(store.storage()).expect("device id"));
    store.storage().get_item(&key).expect("get")
}

#[test]
fn test_generate_sets_provisional_selection_without_persisting() {
    let mut store = new_store();
    let api = FakeApi::returning(vec![Ok("abc@1secmail.com".into())]);

    let address = store.generate(&api).expect("generate");
    assert_eq!(address, "abc@1secmail.com");
    assert_eq!(store.current(), Some("abc@1secmail.com"));
    assert_eq!(store.selected(), Some("abc@1secmail.com"));
    assert!(store.is_empty());
    assert_eq!(persisted(&store), None);
}

#[test]
fn test_generate_failure_leaves_state_untouched() {
    let mut store = new_store();
    store
        .commit("keep@1secmail.com", ExpirationPolicy::Never, T0)
        .expect("commit");
    store.select(Some("keep@1secmail.com".into()));

    let api = FakeApi::returning(vec![Err(DispenserError::Api("503".into()))]);
    let err = store.generate(&api).expect_err("should fail");
    assert_eq!(err.code(), "DISP001");
    assert_eq!(store.selected(), Some("keep@1secmail.com"));
    assert_eq!(store.current(), None);
    assert_eq!(store.len(), 1);
}

#[test]
fn test_commit_appends_in_order_and_persists() {
    let mut store = new_store();
    let api = FakeApi::returning(vec![Ok("a@x.com".into())]);
    let address = store.generate(&api).expect("generate");

    let id = store
        .commit(&address, ExpirationPolicy::Hours(2.0), T0)
        .expect("commit");
    store
        .commit("b@x.com", ExpirationPolicy::Never, T0 + 1)
        .expect("commit");

    assert_eq!(id, "a@x.com");
    assert_eq!(store.current(), None);
    let addrs: Vec<_> = store.entries().iter().map(|e| e.address.as_str()).collect();
    assert_eq!(addrs, ["a@x.com", "b@x.com"]);
    assert_eq!(store.entries()[0].expires_at, Some(T0 + 2 * HOUR));
    assert_eq!(store.entries()[1].expires_at, None);

    // survives a restart on the same storage
    let reopened = EmailStore::restore(SqliteStorageHandle(store)).expect("restore");
    assert_eq!(reopened.len(), 2);
}

// Moves a store's storage into a fresh store, as a restart would.
struct SqliteStorageHandle(EmailStore<SqliteStorage>);

impl LocalStorage for SqliteStorageHandle {
    fn get_item(&self, key: &str) -> mail_dispenser::Result<Option<String>> {
        self.0.storage().get_item(key)
    }
    fn set_item(&self, key: &str, value: &str) -> mail_dispenser::Result<()> {
        self.0.storage().set_item(key, value)
    }
    fn remove_item(&self, key: &str) -> mail_dispenser::Result<()> {
        self.0.storage().remove_item(key)
    }
}

#[test]
fn test_custom_policy_converts_units() {
    let mut store = new_store();
    store
        .commit(
            "a@x.com",
            ExpirationPolicy::Custom {
                magnitude: 3.0,
                unit: TimeUnit::Days,
            },
            T0,
        )
        .expect("commit");
    store
        .commit(
            "b@x.com",
            ExpirationPolicy::Custom {
                magnitude: 90.0,
                unit: TimeUnit::Minutes,
            },
            T0,
        )
        .expect("commit");

    assert_eq!(store.entries()[0].expires_at, Some(T0 + 72 * HOUR));
    assert_eq!(store.entries()[1].expires_at, Some(T0 + 90 * 60));
}

#[test]
fn test_commit_rejects_non_positive_custom_duration() {
    let mut store = new_store();
    store
        .commit("keep@x.com", ExpirationPolicy::Never, T0)
        .expect("commit");
    let before = persisted(&store);

    for magnitude in [0.0, -5.0, f64::NAN] {
        let err = store
            .commit(
                "bad@x.com",
                ExpirationPolicy::Custom {
                    magnitude,
                    unit: TimeUnit::Hours,
                },
                T0,
            )
            .expect_err("invalid policy");
        assert!(matches!(err, DispenserError::InvalidPolicy(_)));
    }
    assert!(matches!(
        store.commit("bad@x.com", ExpirationPolicy::Hours(0.0), T0),
        Err(DispenserError::InvalidPolicy(_))
    ));

    assert_eq!(store.len(), 1);
    assert_eq!(persisted(&store), before);
}

#[test]
fn test_custom_policy_parsing_rejects_non_numeric_input() {
    assert!(matches!(
        ExpirationPolicy::custom("soon", TimeUnit::Hours),
        Err(DispenserError::InvalidPolicy(_))
    ));
    assert!(matches!(
        ExpirationPolicy::custom("-5", TimeUnit::Hours),
        Err(DispenserError::InvalidPolicy(_))
    ));
    assert_eq!(
        ExpirationPolicy::custom(" 2.5 ", TimeUnit::Weeks).expect("valid"),
        ExpirationPolicy::Custom {
            magnitude: 2.5,
            unit: TimeUnit::Weeks
        }
    );
}

#[test]
fn test_commit_rejects_duplicate_address() {
    let mut store = new_store();
    store
        .commit("a@x.com", ExpirationPolicy::Never, T0)
        .expect("commit");
    let err = store
        .commit("a@x.com", ExpirationPolicy::Hours(1.0), T0)
        .expect_err("duplicate");
    assert_eq!(err.code(), "DISP005");
    assert_eq!(store.len(), 1);
}

#[test]
fn test_record_message_count_updates_live_entry() {
    let mut store = new_store();
    store
        .commit("a@x.com", ExpirationPolicy::Never, T0)
        .expect("commit");
    store.record_message_count("a@x.com", 3).expect("record");
    assert_eq!(store.get("a@x.com").map(|e| e.message_count), Some(3));
    assert!(persisted(&store).unwrap_or_default().contains("\"message_count\":3"));
}

#[test]
fn test_record_message_count_on_missing_address_is_noop() {
    let mut store = new_store();
    store
        .commit("a@x.com", ExpirationPolicy::Never, T0)
        .expect("commit");
    store.delete("a@x.com").expect("delete");
    let before = persisted(&store);

    store
        .record_message_count("a@x.com", 7)
        .expect("no error for missing address");
    assert_eq!(persisted(&store), before);
    assert!(store.is_empty());
}

#[test]
fn test_sweep_removes_expired_and_is_idempotent() {
    let mut store = new_store();
    store
        .commit("short@x.com", ExpirationPolicy::Hours(2.0), T0)
        .expect("commit");
    store
        .commit("long@x.com", ExpirationPolicy::Hours(48.0), T0)
        .expect("commit");
    store
        .commit("never@x.com", ExpirationPolicy::Never, T0)
        .expect("commit");
    store.select(Some("short@x.com".into()));

    let now = T0 + 2 * HOUR + 1;
    let pre_sweep = time_remaining(store.get("short@x.com").expect("entry"), now);
    assert!(pre_sweep.is_expired());
    assert_eq!(
        mail_dispenser::format::format_remaining(pre_sweep),
        "Expired"
    );

    let removed = store.sweep_expired(now).expect("sweep");
    assert_eq!(removed.into_iter().collect::<Vec<_>>(), ["short@x.com"]);
    assert_eq!(store.selected(), None);
    assert_eq!(store.len(), 2);

    assert!(store.sweep_expired(now).expect("sweep").is_empty());
    assert!(store.sweep_expired(now + 60).expect("sweep").is_empty());
    assert_eq!(store.len(), 2);
}

#[test]
fn test_sweep_treats_expiry_instant_as_expired() {
    let mut store = new_store();
    store
        .commit("a@x.com", ExpirationPolicy::Hours(1.0), T0)
        .expect("commit");
    assert!(store.sweep_expired(T0 + HOUR - 1).expect("sweep").is_empty());
    assert_eq!(store.sweep_expired(T0 + HOUR).expect("sweep").len(), 1);
}

#[test]
fn test_entry_count_tracks_commits_minus_removals() {
    let mut store = new_store();
    for i in 0..5 {
        let policy = if i % 2 == 0 {
            ExpirationPolicy::Hours(1.0)
        } else {
            ExpirationPolicy::Never
        };
        store
            .commit(&format!("u{i}@x.com"), policy, T0)
            .expect("commit");
    }
    store.delete("u1@x.com").expect("delete");
    store.delete("missing@x.com").expect("delete absent");
    let swept = store.sweep_expired(T0 + HOUR).expect("sweep");

    assert_eq!(swept.len(), 3);
    assert_eq!(store.len(), 5 - 1 - swept.len());
}

#[test]
fn test_clear_writes_empty_collection() {
    let mut store = new_store();
    store
        .commit("a@x.com", ExpirationPolicy::Never, T0)
        .expect("commit");
    store.clear().expect("clear");
    assert!(store.is_empty());
    assert_eq!(persisted(&store).as_deref(), Some("[]"));
}

#[test]
fn test_time_remaining_is_infinite_for_never() {
    let mut store = new_store();
    store
        .commit("a@x.com", ExpirationPolicy::Never, T0)
        .expect("commit");
    let entry = store.get("a@x.com").expect("entry");
    for now in [0, T0, T0 + 10 * 365 * 24 * HOUR, i64::MAX] {
        assert_eq!(time_remaining(entry, now), Remaining::Infinite);
    }
}

#[test]
fn test_time_remaining_may_go_negative() {
    let mut store = new_store();
    store
        .commit("a@x.com", ExpirationPolicy::Hours(1.0), T0)
        .expect("commit");
    let entry = store.get("a@x.com").expect("entry");
    assert_eq!(time_remaining(entry, T0), Remaining::Seconds(HOUR));
    assert_eq!(time_remaining(entry, T0 + HOUR + 5), Remaining::Seconds(-5));
}

#[test]
fn test_restore_resets_corrupt_state() {
    let storage = SqliteStorage::open_memory().expect("open memory db");
    let key = entries_key(&device_id(&storage).expect("device id"));
    storage.set_item(&key, "{not json").expect("set");

    let store = EmailStore::restore(storage).expect("restore never fails on corrupt data");
    assert!(store.is_empty());
}

#[test]
fn test_device_id_is_stable() {
    let storage = SqliteStorage::open_memory().expect("open memory db");
    let first = device_id(&storage).expect("device id");
    let second = device_id(&storage).expect("device id");
    assert_eq!(first, second);
    assert_eq!(first.len(), 32);
}

/// Storage whose entry reads or writes can be switched off mid-test.
struct FlakyStorage {
    inner: SqliteStorage,
    fail_writes: Cell<bool>,
    fail_entry_reads: Cell<bool>,
}

impl FlakyStorage {
    fn new() -> Self {
        Self {
            inner: SqliteStorage::open_memory().expect("open memory db"),
            fail_writes: Cell::new(false),
            fail_entry_reads: Cell::new(false),
        }
    }
}

impl LocalStorage for FlakyStorage {
    fn get_item(&self, key: &str) -> mail_dispenser::Result<Option<String>> {
        if self.fail_entry_reads.get() && key.starts_with("dispenser.emails.") {
            return Err(DispenserError::Storage("disk I/O error".into()));
        }
        self.inner.get_item(key)
    }

    fn set_item(&self, key: &str, value: &str) -> mail_dispenser::Result<()> {
        if self.fail_writes.get() {
            return Err(DispenserError::Storage("database is locked".into()));
        }
        self.inner.set_item(key, value)
    }

    fn remove_item(&self, key: &str) -> mail_dispenser::Result<()> {
        self.inner.remove_item(key)
    }
}

fn flaky_store_with(addresses: &[&str]) -> EmailStore<FlakyStorage> {
    let mut store = EmailStore::restore(FlakyStorage::new()).expect("restore");
    for a in addresses {
        store
            .commit(a, ExpirationPolicy::Hours(1.0), T0)
            .expect("commit");
    }
    store
}

fn flaky_persisted(store: &EmailStore<FlakyStorage>) -> Option<String> {
    let inner = &store.storage().inner;
    let key = entries_key(&device_id(inner).expect("device id"));
    inner.get_item(&key).expect("get")
}

#[test]
fn test_commit_rolls_back_when_write_fails() {
    let mut store = flaky_store_with(&["a@x.com"]);
    let before = flaky_persisted(&store);

    store.storage().fail_writes.set(true);
    let err = store
        .commit("b@x.com", ExpirationPolicy::Never, T0)
        .expect_err("write fails");
    assert_eq!(err.code(), "DISP004");
    assert_eq!(store.len(), 1);
    assert!(!store.contains("b@x.com"));
    assert_eq!(flaky_persisted(&store), before);

    store.storage().fail_writes.set(false);
    store
        .commit("b@x.com", ExpirationPolicy::Never, T0)
        .expect("commit after recovery");
    assert_eq!(store.len(), 2);
}

#[test]
fn test_failed_sweep_keeps_entries_and_selection() {
    let mut store = flaky_store_with(&["a@x.com", "b@x.com"]);
    store.select(Some("a@x.com".into()));

    store.storage().fail_writes.set(true);
    assert!(store.sweep_expired(T0 + HOUR).is_err());
    assert_eq!(store.len(), 2);
    assert_eq!(store.selected(), Some("a@x.com"));

    store.storage().fail_writes.set(false);
    assert_eq!(store.sweep_expired(T0 + HOUR).expect("sweep").len(), 2);
    assert!(store.is_empty());
}

#[test]
fn test_failed_delete_keeps_entry_and_selection() {
    let mut store = flaky_store_with(&["a@x.com", "b@x.com"]);
    store.select(Some("a@x.com".into()));

    store.storage().fail_writes.set(true);
    assert!(store.delete("a@x.com").is_err());
    assert!(store.contains("a@x.com"));
    assert_eq!(store.selected(), Some("a@x.com"));
    assert_eq!(store.len(), 2);
}

#[test]
fn test_failed_clear_keeps_entries() {
    let mut store = flaky_store_with(&["a@x.com", "b@x.com"]);
    store.select(Some("b@x.com".into()));
    let before = flaky_persisted(&store);

    store.storage().fail_writes.set(true);
    assert!(store.clear().is_err());
    assert_eq!(store.len(), 2);
    assert_eq!(store.selected(), Some("b@x.com"));
    assert_eq!(flaky_persisted(&store), before);
}

#[test]
fn test_failed_count_write_keeps_old_count() {
    let mut store = flaky_store_with(&["a@x.com"]);
    store.storage().fail_writes.set(true);
    assert!(store.record_message_count("a@x.com", 4).is_err());
    assert_eq!(store.get("a@x.com").map(|e| e.message_count), Some(0));
}

#[test]
fn test_restore_fails_open_when_entries_unreadable() {
    let storage = FlakyStorage::new();
    let key = entries_key(&device_id(&storage.inner).expect("device id"));
    storage
        .inner
        .set_item(
            &key,
            r#"[{"address":"a@x.com","created_at":1700000000,"expires_at":null}]"#,
        )
        .expect("seed");
    storage.fail_entry_reads.set(true);

    let mut store = EmailStore::restore(storage).expect("restore is fail-open");
    assert!(store.is_empty());

    // writes refuse to run on top of an unreadable list
    let err = store
        .commit("b@x.com", ExpirationPolicy::Never, T0)
        .expect_err("read fails");
    assert_eq!(err.code(), "DISP004");
    assert!(store.is_empty());

    store.storage().fail_entry_reads.set(false);
    store.reload();
    assert_eq!(store.len(), 1);
    assert_eq!(store.get("a@x.com").map(|e| e.message_count), Some(0));
}

fn temp_db() -> PathBuf {
    std::env::temp_dir().join(format!(
        "mail_dispenser-{}.db",
        uuid::Uuid::new_v4().simple()
    ))
}

fn remove_db(path: &PathBuf) {
    for suffix in ["", "-wal", "-shm"] {
        let mut p = path.clone().into_os_string();
        p.push(suffix);
        let _ = std::fs::remove_file(p);
    }
}

#[test]
fn test_processes_sharing_a_database_keep_each_others_writes() {
    let path = temp_db();
    let open = || EmailStore::restore(SqliteStorage::open(&path).expect("open")).expect("restore");

    let mut daemon = open();
    daemon
        .commit("old@x.com", ExpirationPolicy::Never, T0)
        .expect("commit");

    let mut cli = open();
    cli.commit("new@x.com", ExpirationPolicy::Hours(1.0), T0 + 1)
        .expect("commit");
    assert_eq!(daemon.len(), 1, "daemon still holds its earlier snapshot");

    daemon
        .record_message_count("old@x.com", 3)
        .expect("record");
    assert_eq!(daemon.len(), 2);

    cli.delete("old@x.com").expect("delete");
    daemon.sweep_expired(T0 + 10).expect("sweep");
    assert!(!daemon.contains("old@x.com"));

    let fresh = open();
    let addrs: Vec<_> = fresh.entries().iter().map(|e| e.address.as_str()).collect();
    assert_eq!(addrs, ["new@x.com"]);

    drop((daemon, cli, fresh));
    remove_db(&path);
}
