use std::sync::Arc;

use openo_connect::config::ConnectConfig;
use openo_connect::oauth::TokenPair;
use openo_connect::store::{MasterKey, SecretKey, SecretStore, Secrets, UserCredentials};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

fn config_for(dir: &TempDir, key: &MasterKey) -> ConnectConfig {
    ConnectConfig::builder()
        .data_dir(dir.path().to_path_buf())
        .master_key(key.to_base64())
        .build()
}

#[test]
fn configured_master_key_opens_existing_store() {
    let dir = TempDir::new().unwrap();
    let key = MasterKey::generate();

    let store = config_for(&dir, &key).open_secret_store().unwrap();
    store.save(SecretKey::ClientKey, "ck-1").unwrap();
    drop(store);

    let reopened = config_for(&dir, &key).open_secret_store().unwrap();
    assert_eq!(reopened.load(SecretKey::ClientKey).unwrap().as_deref(), Some("ck-1"));
    assert!(!dir.path().join("master.key").exists());
}

#[test]
fn generated_master_key_is_reused_between_runs() {
    let dir = TempDir::new().unwrap();
    let config = ConnectConfig::builder().data_dir(dir.path().to_path_buf()).build();

    let secrets = Secrets::new(Arc::new(config.open_secret_store().unwrap()));
    secrets.save_user_credentials(&UserCredentials::new("doc", "pw", "1234"));

    let secrets = Secrets::new(Arc::new(config.open_secret_store().unwrap()));
    assert_eq!(
        secrets.user_credentials(),
        Some(UserCredentials::new("doc", "pw", "1234"))
    );
}

#[test]
fn wrong_master_key_reads_as_absent_through_secrets() {
    let dir = TempDir::new().unwrap();
    let secrets = Secrets::new(Arc::new(
        config_for(&dir, &MasterKey::generate()).open_secret_store().unwrap(),
    ));
    secrets.save_access_token(&TokenPair::new("AT1", "ATS1"));

    let intruder = Secrets::new(Arc::new(
        config_for(&dir, &MasterKey::generate()).open_secret_store().unwrap(),
    ));
    assert!(!intruder.has_access_token());
    assert_eq!(intruder.get(SecretKey::AccessToken), None);
}

#[test]
fn deleting_either_token_half_clears_access_flag() {
    let dir = TempDir::new().unwrap();
    let key = MasterKey::generate();
    let secrets = Secrets::new(Arc::new(config_for(&dir, &key).open_secret_store().unwrap()));

    for half in [SecretKey::AccessToken, SecretKey::AccessTokenSecret] {
        secrets.save_access_token(&TokenPair::new("AT1", "ATS1"));
        assert!(secrets.has_access_token());
        secrets.delete(half);
        assert!(!secrets.has_access_token(), "{half} removed");
    }
}

#[test]
fn malformed_master_key_is_a_configuration_problem() {
    let dir = TempDir::new().unwrap();
    let config = ConnectConfig::builder()
        .data_dir(dir.path().to_path_buf())
        .master_key("not base64!")
        .build();
    assert!(config.open_secret_store().is_err());
}
