use ark_crypto::{generate_random_key, KeyEncryptor};
use ark_storage::{Bucket, Database};
use ark_vault::{VaultError, VaultFormat, VaultManager};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use tempfile::TempDir;

fn open_vault() -> (TempDir, VaultManager) {
    let dir = TempDir::new().unwrap();
    let db = Database::open(
        dir.path().join("ark.db"),
        Arc::new(KeyEncryptor::new(generate_random_key())),
    )
    .unwrap();
    (dir, VaultManager::new(db))
}

fn tags(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

// ── Scenario ─────────────────────────────────────────────────────

#[test]
fn set_get_search_delete() {
    let (_dir, vault) = open_vault();

    vault.set("db-pass", "s3cr3t", "text", "", &[]).unwrap();

    let entry = vault.get("db-pass").unwrap();
    assert_eq!(entry.value, "s3cr3t");
    assert_eq!(entry.format, VaultFormat::Text);
    assert_eq!(entry.format.to_string(), "text");

    let found: Vec<_> = vault.search("db").unwrap().into_iter().map(|e| e.key).collect();
    assert_eq!(found, vec!["db-pass"]);

    vault.delete("db-pass").unwrap();
    assert!(matches!(vault.get("db-pass"), Err(VaultError::NotFound(k)) if k == "db-pass"));
}

// ── Set / update ─────────────────────────────────────────────────

#[test]
fn set_rejects_unknown_format() {
    let (_dir, vault) = open_vault();
    let err = vault.set("k", "v", "xml", "", &[]).unwrap_err();
    assert!(matches!(err, VaultError::InvalidFormat(_)));
    assert!(!vault.exists("k").unwrap());
}

#[test]
fn set_accepts_format_in_any_case() {
    let (_dir, vault) = open_vault();
    let entry = vault.set("cfg", "a: 1", "YAML", "", &[]).unwrap();
    assert_eq!(entry.format, VaultFormat::Yaml);
}

#[test]
fn set_rejects_empty_key() {
    let (_dir, vault) = open_vault();
    assert!(matches!(vault.set("", "v", "text", "", &[]), Err(VaultError::EmptyKey)));
}

#[test]
fn set_again_keeps_creation_time() {
    let (_dir, vault) = open_vault();
    let first = vault.set("k", "v1", "text", "", &[]).unwrap();
    let second = vault.set("k", "v2", "text", "", &[]).unwrap();

    assert_eq!(second.created_at, first.created_at);
    assert_eq!(vault.get("k").unwrap().value, "v2");
}

#[test]
fn update_replaces_fields_and_keeps_metadata() {
    let (_dir, vault) = open_vault();
    vault.set("svc", "old", "text", "old desc", &tags(&["a"])).unwrap();
    vault.set_metadata("svc", "owner", serde_json::json!("ops")).unwrap();

    let updated = vault
        .update("svc", r#"{"token":"t"}"#, "json", "new desc", &tags(&["b", "c"]))
        .unwrap();

    assert_eq!(updated.format, VaultFormat::Json);
    assert_eq!(updated.description, "new desc");
    assert_eq!(updated.tags.iter().cloned().collect::<Vec<_>>(), tags(&["b", "c"]));
    assert_eq!(vault.get_metadata("svc", "owner").unwrap(), Some(serde_json::json!("ops")));
}

#[test]
fn update_missing_entry_is_not_found() {
    let (_dir, vault) = open_vault();
    let err = vault.update("ghost", "v", "text", "", &[]).unwrap_err();
    assert!(matches!(err, VaultError::NotFound(_)));
}

#[test]
fn delete_missing_entry_is_not_found() {
    let (_dir, vault) = open_vault();
    assert!(matches!(vault.delete("ghost"), Err(VaultError::NotFound(_))));
}

// ── Reads and timestamps ─────────────────────────────────────────

#[test]
fn get_does_not_modify_entry() {
    let (_dir, vault) = open_vault();
    let stored = vault.set("k", "v", "text", "", &[]).unwrap();

    let read = vault.get("k").unwrap();
    assert_eq!(read.updated_at, stored.updated_at);
    assert_eq!(vault.get("k").unwrap(), read);
}

#[test]
fn touch_bumps_updated_at() {
    let (_dir, vault) = open_vault();
    let stored = vault.set("k", "v", "text", "", &[]).unwrap();
    std::thread::sleep(std::time::Duration::from_millis(5));

    let touched = vault.touch("k").unwrap();
    assert!(touched.updated_at > stored.updated_at);
    assert_eq!(vault.get("k").unwrap().updated_at, touched.updated_at);
}

// ── Listing and filtering ────────────────────────────────────────

#[test]
fn list_is_ordered_by_key() {
    let (_dir, vault) = open_vault();
    for k in ["b", "c", "a"] {
        vault.set(k, "v", "text", "", &[]).unwrap();
    }
    let keys: Vec<_> = vault.list().unwrap().into_iter().map(|e| e.key).collect();
    assert_eq!(keys, vec!["a", "b", "c"]);
}

#[test]
fn list_skips_undecodable_entries() {
    let dir = TempDir::new().unwrap();
    let db = Database::open(
        dir.path().join("ark.db"),
        Arc::new(KeyEncryptor::new(generate_random_key())),
    )
    .unwrap();
    db.set(Bucket::Vault, "broken", &42).unwrap();

    let vault = VaultManager::new(db);
    vault.set("good", "v", "text", "", &[]).unwrap();

    let keys: Vec<_> = vault.list().unwrap().into_iter().map(|e| e.key).collect();
    assert_eq!(keys, vec!["good"]);
}

#[test]
fn search_narrows_by_key_substring() {
    let (_dir, vault) = open_vault();
    vault.set("db-staging", "hunter2", "text", "", &[]).unwrap();
    vault.set("db-prod", "x", "text", "", &[]).unwrap();
    vault.set("api", "x", "text", "staging database", &tags(&["db-staging"])).unwrap();

    let keys = |q: &str| -> Vec<String> {
        vault.search(q).unwrap().into_iter().map(|e| e.key).collect()
    };
    assert_eq!(keys("db-"), vec!["db-prod", "db-staging"]);
    assert_eq!(keys("staging"), vec!["db-staging"]);
    assert!(keys("STAGING").is_empty());
    assert!(keys("hunter2").is_empty());
    assert!(keys("nothing-here").is_empty());
}

#[test]
fn filter_by_tag_and_format() {
    let (_dir, vault) = open_vault();
    vault.set("a", "{}", "json", "", &tags(&["prod"])).unwrap();
    vault.set("b", "x: 1", "yaml", "", &tags(&["prod", "db"])).unwrap();
    vault.set("c", "plain", "text", "", &tags(&["dev"])).unwrap();

    let tagged: Vec<_> = vault.by_tag("prod").unwrap().into_iter().map(|e| e.key).collect();
    assert_eq!(tagged, vec!["a", "b"]);

    let yaml: Vec<_> = vault.by_format("yaml").unwrap().into_iter().map(|e| e.key).collect();
    assert_eq!(yaml, vec!["b"]);

    assert!(matches!(vault.by_format("toml"), Err(VaultError::InvalidFormat(_))));
}

// ── Tags and metadata ────────────────────────────────────────────

#[test]
fn add_and_remove_tags_persist() {
    let (_dir, vault) = open_vault();
    vault.set("k", "v", "text", "", &[]).unwrap();

    vault.add_tag("k", "infra").unwrap();
    vault.add_tag("k", "infra").unwrap();
    assert_eq!(vault.get("k").unwrap().tags.len(), 1);

    vault.remove_tag("k", "infra").unwrap();
    assert!(vault.get("k").unwrap().tags.is_empty());

    assert!(matches!(vault.add_tag("ghost", "x"), Err(VaultError::NotFound(_))));
}

#[test]
fn metadata_round_trips_json_values() {
    let (_dir, vault) = open_vault();
    vault.set("k", "v", "text", "", &[]).unwrap();
    vault
        .set_metadata("k", "rotation", serde_json::json!({"days": 90, "auto": true}))
        .unwrap();

    assert_eq!(
        vault.get_metadata("k", "rotation").unwrap(),
        Some(serde_json::json!({"days": 90, "auto": true}))
    );
    assert_eq!(vault.get_metadata("k", "missing").unwrap(), None);
}

#[test]
fn clear_removes_everything() {
    let (_dir, vault) = open_vault();
    for k in ["a", "b", "c"] {
        vault.set(k, "v", "text", "", &[]).unwrap();
    }
    assert_eq!(vault.clear().unwrap(), 3);
    assert!(vault.list().unwrap().is_empty());
    assert_eq!(vault.clear().unwrap(), 0);
}
