// Integration tests for the conversation log and its JSON file store

use anyhow::Result;
use loqa_converse::history::{ConversationLog, HistoryStore, JsonFileStore, Role, Turn};
use tempfile::TempDir;

#[test]
fn test_missing_file_loads_empty() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let store = JsonFileStore::new(temp_dir.path().join("none.json"));

    assert!(store.load()?.is_empty());

    let log = ConversationLog::persistent(Box::new(store));
    assert!(log.is_empty());

    Ok(())
}

#[test]
fn test_append_writes_full_snapshot() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("nested").join("history.json");

    let mut log = ConversationLog::persistent(Box::new(JsonFileStore::new(&path)));
    log.append(Turn::new(Role::User, "first"));
    log.append(Turn::new(Role::Assistant, "second"));

    assert!(path.exists(), "parent directories should be created");

    let persisted: Vec<Turn> = serde_json::from_slice(&std::fs::read(&path)?)?;
    assert_eq!(persisted, log.snapshot());

    // Plain array of {role, content}
    let raw: serde_json::Value = serde_json::from_slice(&std::fs::read(&path)?)?;
    assert_eq!(raw[0]["role"], "user");
    assert_eq!(raw[1]["content"], "second");

    Ok(())
}

#[test]
fn test_persisted_log_is_restored() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("history.json");

    {
        let mut log = ConversationLog::persistent(Box::new(JsonFileStore::new(&path)));
        log.append(Turn::new(Role::User, "how far is the moon"));
        log.append(Turn::new(Role::Assistant, "about 384,000 km"));
    }

    let log = ConversationLog::persistent(Box::new(JsonFileStore::new(&path)));
    assert_eq!(log.len(), 2);
    assert_eq!(log.turns()[0], Turn::new(Role::User, "how far is the moon"));
    assert_eq!(log.latest(), Some(&Turn::new(Role::Assistant, "about 384,000 km")));

    Ok(())
}

#[test]
fn test_corrupt_file_starts_empty() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("history.json");
    std::fs::write(&path, b"[{\"role\":")?;

    let store = JsonFileStore::new(&path);
    assert!(store.load().is_err());

    let mut log = ConversationLog::persistent(Box::new(store));
    assert!(log.is_empty());

    // The next append overwrites the corrupt snapshot
    log.append(Turn::new(Role::User, "fresh start"));
    let reloaded = JsonFileStore::new(&path).load()?;
    assert_eq!(reloaded, vec![Turn::new(Role::User, "fresh start")]);

    Ok(())
}

#[test]
fn test_persist_failure_keeps_turn_in_memory() -> Result<()> {
    let temp_dir = TempDir::new()?;
    // A directory where the file should be makes every save fail
    let path = temp_dir.path().join("history.json");
    std::fs::create_dir_all(path.with_extension("json.tmp"))?;

    let mut log = ConversationLog::persistent(Box::new(JsonFileStore::new(&path)));
    log.append(Turn::new(Role::Assistant, "not lost"));

    assert_eq!(log.len(), 1);
    assert!(!path.exists());

    Ok(())
}
