//! End-to-end recovery scenarios against real files.

use duokv_core::{Config, Engine};
use duokv_storage::{FileVfs, Vfs};
use std::path::PathBuf;
use tempfile::TempDir;

fn wal_paths(dir: &TempDir) -> (PathBuf, PathBuf) {
    (
        dir.path().join("intent.wal"),
        dir.path().join("completion.wal"),
    )
}

#[test]
fn clean_reopen_restores_the_mapping() {
    let dir = TempDir::new().unwrap();
    let (intent, completion) = wal_paths(&dir);
    let vfs = FileVfs::new();

    {
        let (mut engine, corruption) = Engine::open(&vfs, &intent, &completion).unwrap();
        assert_eq!(corruption, 0);
        engine.set(b"k1", b"v1").unwrap();
        engine.set(b"k2", b"v2").unwrap();
        engine.flush().unwrap();
        engine.close().unwrap();
    }

    let (engine, corruption) = Engine::open(&vfs, &intent, &completion).unwrap();
    assert_eq!(corruption, 0);
    assert_eq!(engine.get(b"k1"), Some(&b"v1"[..]));
    assert_eq!(engine.get(b"k2"), Some(&b"v2"[..]));
    assert!(engine.verify_integrity());
}

#[test]
fn unflushed_delete_lands_on_either_side_of_the_durability_boundary() {
    let dir = TempDir::new().unwrap();
    let (intent, completion) = wal_paths(&dir);
    let vfs = FileVfs::new();

    {
        let (mut engine, _) = Engine::open(&vfs, &intent, &completion).unwrap();
        engine.set(b"k1", b"v1").unwrap();
        engine.set(b"k2", b"v2").unwrap();
        engine.flush().unwrap();
        engine.delete(b"k1").unwrap();
        // Dropped without a final flush: the delete may or may not have
        // reached the logs.
    }

    let (engine, _) = Engine::open(&vfs, &intent, &completion).unwrap();
    let observed = engine.get(b"k1");
    assert!(
        observed.is_none() || observed == Some(&b"v1"[..]),
        "only the old value or absence is acceptable, got {observed:?}"
    );
    assert_eq!(engine.get(b"k2"), Some(&b"v2"[..]));
}

#[test]
fn single_bit_flip_is_counted_and_never_invents_values() {
    let dir = TempDir::new().unwrap();
    let (intent, completion) = wal_paths(&dir);
    let vfs = FileVfs::new();

    {
        let (mut engine, _) = Engine::open(&vfs, &intent, &completion).unwrap();
        engine.set(b"a", b"1").unwrap();
        engine.set(b"a", b"2").unwrap();
        engine.flush().unwrap();
        engine.close().unwrap();
    }

    // Flip one bit at byte 10 of the intent file (inside the first
    // record's header).
    let mut bytes = std::fs::read(&intent).unwrap();
    bytes[10] ^= 0x01;
    std::fs::write(&intent, &bytes).unwrap();

    let (engine, corruption) = Engine::open(&vfs, &intent, &completion).unwrap();
    assert!(corruption >= 1);

    let observed = engine.get(b"a");
    assert!(
        observed.is_none() || observed == Some(&b"1"[..]) || observed == Some(&b"2"[..]),
        "recovery must never fabricate a value, got {observed:?}"
    );
}

#[test]
fn truncated_intent_log_replays_the_valid_prefix() {
    let dir = TempDir::new().unwrap();
    let (intent, completion) = wal_paths(&dir);
    let vfs = FileVfs::new();

    {
        let (mut engine, _) = Engine::open(&vfs, &intent, &completion).unwrap();
        engine.set(b"k1", b"v1").unwrap();
        engine.set(b"k2", b"v2").unwrap();
        engine.set(b"k3", b"v3").unwrap();
        engine.flush().unwrap();
        engine.close().unwrap();
    }

    // Tear the intent log mid-record. Each record is 16 + 2 + 2 = 20
    // bytes, so byte 50 falls inside the third.
    let file = std::fs::OpenOptions::new()
        .write(true)
        .open(&intent)
        .unwrap();
    file.set_len(50).unwrap();
    drop(file);

    let (mut engine, corruption) = Engine::open(&vfs, &intent, &completion).unwrap();
    assert!(corruption >= 1);
    assert_eq!(engine.get(b"k1"), Some(&b"v1"[..]));
    assert_eq!(engine.get(b"k2"), Some(&b"v2"[..]));
    assert_eq!(engine.get(b"k3"), None);

    // The engine stays fully usable after a torn open.
    engine.set(b"k4", b"v4").unwrap();
    assert_eq!(engine.get(b"k4"), Some(&b"v4"[..]));
    engine.flush().unwrap();
}

#[test]
fn corruption_counts_are_nondecreasing_across_reopens() {
    let dir = TempDir::new().unwrap();
    let (intent, completion) = wal_paths(&dir);
    let vfs = FileVfs::new();

    {
        let (mut engine, _) = Engine::open(&vfs, &intent, &completion).unwrap();
        for i in 0..10u8 {
            engine.set(&[b'k', i], b"value").unwrap();
        }
        engine.flush().unwrap();
        engine.close().unwrap();
    }

    let mut bytes = std::fs::read(&intent).unwrap();
    let len = bytes.len();
    bytes[len / 2] ^= 0xFF;
    std::fs::write(&intent, &bytes).unwrap();

    let mut last = 0u64;
    for _ in 0..3 {
        let (engine, corruption) = Engine::open(&vfs, &intent, &completion).unwrap();
        assert!(corruption >= last, "corruption count regressed");
        last = corruption;
        engine.close().unwrap();
    }
    assert!(last >= 1);
}

#[test]
fn wrap_around_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let (intent, completion) = wal_paths(&dir);
    let vfs = FileVfs::new();
    // Small buffers so a few hundred records cycle each staging ring many
    // times over.
    let config = Config::new().buffer_size(512);

    {
        let (mut engine, _) =
            Engine::open_with_config(&vfs, &intent, &completion, config.clone()).unwrap();
        for i in 0..200u32 {
            engine
                .set(format!("key{i:04}").as_bytes(), format!("value{i}").as_bytes())
                .unwrap();
        }
        engine.flush().unwrap();
        engine.close().unwrap();
    }

    let (engine, corruption) =
        Engine::open_with_config(&vfs, &intent, &completion, config).unwrap();
    assert_eq!(corruption, 0);
    for i in 0..200u32 {
        assert_eq!(
            engine.get(format!("key{i:04}").as_bytes()),
            Some(format!("value{i}").as_bytes()),
            "key{i:04} lost across wrap-around"
        );
    }
}
