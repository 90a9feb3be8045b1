mod support;

use ark_crypto::KdfParams;
use ark_keys::{ArkConfig, KeyError, MasterKeyManager, CACHE_FILE_NAME};
use pretty_assertions::assert_eq;
use std::path::Path;
use std::sync::Arc;
use support::ScriptedPrompt;

const PASSWORD: &str = "correct horse battery";

fn manager(dir: &Path, prompt: Arc<ScriptedPrompt>) -> MasterKeyManager {
    let config = ArkConfig::load(dir).unwrap();
    MasterKeyManager::new(config, prompt).with_kdf_params(KdfParams::insecure_fast())
}

fn initialized(dir: &Path) -> MasterKeyManager {
    let mut m = MasterKeyManager::new(ArkConfig::new(dir), Arc::new(ScriptedPrompt::new(&[])))
        .with_kdf_params(KdfParams::insecure_fast());
    m.initialize(PASSWORD).unwrap();
    m
}

fn cache_path(dir: &Path) -> std::path::PathBuf {
    dir.join("data").join(CACHE_FILE_NAME)
}

// ── Initialization ──────────────────────────────────────────────

#[test]
fn initialize_holds_key_in_memory() {
    let dir = tempfile::tempdir().unwrap();
    let m = initialized(dir.path());
    assert!(m.master_key_silent().is_some());
    assert!(m.config().is_initialized());
    assert!(m.config().backup_key.is_some());
    assert!(dir.path().join("config.yaml").exists());
}

#[test]
fn initialize_twice_fails() {
    let dir = tempfile::tempdir().unwrap();
    initialized(dir.path());

    let mut again = MasterKeyManager::new(
        ArkConfig::new(dir.path()),
        Arc::new(ScriptedPrompt::new(&[])),
    )
    .with_kdf_params(KdfParams::insecure_fast());
    assert!(matches!(
        again.initialize(PASSWORD),
        Err(KeyError::AlreadyInitialized(_))
    ));
}

#[test]
fn initialize_rejects_short_password() {
    let dir = tempfile::tempdir().unwrap();
    let mut m = MasterKeyManager::new(ArkConfig::new(dir.path()), Arc::new(ScriptedPrompt::new(&[])))
        .with_kdf_params(KdfParams::insecure_fast());
    assert!(matches!(m.initialize("short"), Err(KeyError::WeakPassword(_))));
}

#[test]
fn load_without_config_is_not_initialized() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        ArkConfig::load(dir.path()),
        Err(KeyError::NotInitialized)
    ));
}

#[test]
fn uninitialized_config_fails_without_prompting() {
    let dir = tempfile::tempdir().unwrap();
    let prompt = Arc::new(ScriptedPrompt::new(&[PASSWORD]));
    let m = MasterKeyManager::new(ArkConfig::new(dir.path()), prompt.clone());
    assert!(matches!(m.get_master_key(), Err(KeyError::NotInitialized)));
    assert_eq!(prompt.calls(), 0);
}

// ── Prompt + cache ──────────────────────────────────────────────

#[test]
fn fresh_process_prompts_once_then_uses_cache() {
    let dir = tempfile::tempdir().unwrap();
    let original = initialized(dir.path()).master_key_silent().unwrap();

    let prompt = Arc::new(ScriptedPrompt::new(&[PASSWORD]));
    let first = manager(dir.path(), prompt.clone());
    let key = first.get_master_key().unwrap();
    assert_eq!(key, original);
    assert_eq!(prompt.calls(), 1);
    assert!(cache_path(dir.path()).exists());

    // Same process: memory hit
    first.get_master_key().unwrap();
    assert_eq!(prompt.calls(), 1);

    // Next process: disk cache hit
    let quiet = Arc::new(ScriptedPrompt::new(&[]));
    let second = manager(dir.path(), quiet.clone());
    assert_eq!(second.get_master_key().unwrap(), original);
    assert_eq!(quiet.calls(), 0);
}

#[test]
fn corrupted_cache_prompts_again() {
    let dir = tempfile::tempdir().unwrap();
    initialized(dir.path());

    manager(dir.path(), Arc::new(ScriptedPrompt::new(&[PASSWORD])))
        .get_master_key()
        .unwrap();
    std::fs::write(cache_path(dir.path()), b"\x00garbage\xff").unwrap();

    let prompt = Arc::new(ScriptedPrompt::new(&[PASSWORD]));
    manager(dir.path(), prompt.clone()).get_master_key().unwrap();
    assert_eq!(prompt.calls(), 1);
}

#[test]
fn zero_timeout_disables_cache() {
    let dir = tempfile::tempdir().unwrap();
    let mut m = initialized(dir.path());
    m.set_cache_timeout(0).unwrap();

    let prompt = Arc::new(ScriptedPrompt::new(&[PASSWORD, PASSWORD]));
    manager(dir.path(), prompt.clone()).get_master_key().unwrap();
    assert!(!cache_path(dir.path()).exists());

    manager(dir.path(), prompt.clone()).get_master_key().unwrap();
    assert_eq!(prompt.calls(), 2);
}

#[test]
fn empty_password_is_prompt_failure() {
    let dir = tempfile::tempdir().unwrap();
    initialized(dir.path());
    let m = manager(dir.path(), Arc::new(ScriptedPrompt::new(&[""])));
    assert!(matches!(m.get_master_key(), Err(KeyError::PromptFailed(_))));
}

#[test]
fn exhausted_prompt_propagates() {
    let dir = tempfile::tempdir().unwrap();
    initialized(dir.path());
    let m = manager(dir.path(), Arc::new(ScriptedPrompt::new(&[])));
    assert!(matches!(m.get_master_key(), Err(KeyError::PromptFailed(_))));
}

#[cfg(unix)]
#[test]
fn unwritable_cache_does_not_block_key() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    initialized(dir.path());
    let data = dir.path().join("data");
    std::fs::set_permissions(&data, std::fs::Permissions::from_mode(0o500)).unwrap();

    let m = manager(dir.path(), Arc::new(ScriptedPrompt::new(&[PASSWORD])));
    let result = m.get_master_key();

    std::fs::set_permissions(&data, std::fs::Permissions::from_mode(0o700)).unwrap();
    assert!(result.is_ok());
}

// ── Password change ─────────────────────────────────────────────

#[test]
fn change_password_rotates_salt_and_wipes_cache() {
    let dir = tempfile::tempdir().unwrap();
    initialized(dir.path());

    let mut m = manager(dir.path(), Arc::new(ScriptedPrompt::new(&[PASSWORD])));
    let old_key = m.get_master_key().unwrap();
    let old_salt = m.config().salt.clone().unwrap();
    assert!(cache_path(dir.path()).exists());

    m.change_master_password("a brand new password").unwrap();
    assert!(!cache_path(dir.path()).exists());
    assert_ne!(m.config().salt.clone().unwrap(), old_salt);
    assert_ne!(m.master_key_silent().unwrap(), old_key);

    // Reloaded config derives the new key from the new password
    let reloaded = manager(
        dir.path(),
        Arc::new(ScriptedPrompt::new(&["a brand new password"])),
    );
    assert_eq!(reloaded.get_master_key().unwrap(), m.master_key_silent().unwrap());
}

// ── Config persistence ──────────────────────────────────────────

#[test]
fn config_roundtrips_through_yaml() {
    let dir = tempfile::tempdir().unwrap();
    let m = initialized(dir.path());

    let loaded = ArkConfig::load(dir.path()).unwrap();
    assert_eq!(loaded.salt, m.config().salt);
    assert_eq!(loaded.security, m.config().security);
    assert_eq!(loaded.database_path, dir.path().join("data").join("ark.db"));
    assert!(loaded.backup_key.is_none(), "backup key is never persisted");
    loaded.validate().unwrap();
}

#[cfg(unix)]
#[test]
fn config_file_is_owner_only() {
    use std::os::unix::fs::PermissionsExt;
    let dir = tempfile::tempdir().unwrap();
    initialized(dir.path());
    let mode = std::fs::metadata(dir.path().join("config.yaml"))
        .unwrap()
        .permissions()
        .mode();
    assert_eq!(mode & 0o777, 0o600);
}
