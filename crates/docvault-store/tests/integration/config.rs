//! Configuration wiring tests.

use super::common::*;
use base64::Engine;
use docvault_store::{
    AggregatingStoreConfig, ContentStore, DocVaultConfig, EncryptionConfig, KeyAlgorithm,
    StorageError, StoreRegistry, WriterContext,
};
use std::io::Write;
use std::sync::Arc;

fn registry() -> (StoreRegistry, Arc<docvault_store::InMemoryContentStore>) {
    let archive = memory("store");
    archive.put("store://2024/a.bin", b"archived").unwrap();

    let mut registry = StoreRegistry::new();
    registry.register("local", shared(&memory("store")));
    registry.register("archive", shared(&archive));
    (registry, archive)
}

/// A file-configured aggregate resolves reads through its secondaries.
#[test]
fn test_configured_aggregate() {
    init_tracing();
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(
        file,
        r#"
[aggregate]
primary = "local"
secondaries = ["archive"]
"#
    )
    .unwrap();

    let config = DocVaultConfig::load_from(file.path()).unwrap();
    assert!(config.aggregate.delete_from_secondaries);

    let (registry, archive) = registry();
    let store = config.build(&registry).unwrap();
    assert_eq!(read_content(store.as_ref(), "store://2024/a.bin"), b"archived");

    assert!(store.delete("store://2024/a.bin").unwrap());
    assert!(archive.is_empty());
}

/// An encryption section wraps the aggregate.
#[test]
fn test_configured_encryption() {
    let config = DocVaultConfig {
        aggregate: AggregatingStoreConfig {
            primary: Some("local".to_string()),
            secondaries: Some(vec![]),
            delete_from_secondaries: false,
        },
        encryption: Some(EncryptionConfig {
            algorithm: KeyAlgorithm::ChaCha20,
            key: Some(base64::engine::general_purpose::STANDARD.encode([9u8; 32])),
        }),
    };

    let (registry, _) = registry();
    let local = registry.get("local").unwrap();
    let store = config.build(&registry).unwrap();

    let url = write_content(store.as_ref(), &WriterContext::new(), b"configured");
    assert_ne!(read_content(local.as_ref(), &url), b"configured");
    assert_eq!(read_content(store.as_ref(), &url), b"configured");
}

/// Misconfiguration fails at build time, not at first use.
#[test]
fn test_misconfiguration_fails_fast() {
    let (registry, _) = registry();
    let cases = [
        DocVaultConfig::default(),
        DocVaultConfig {
            aggregate: AggregatingStoreConfig {
                primary: Some("local".to_string()),
                secondaries: Some(vec!["missing".to_string()]),
                delete_from_secondaries: true,
            },
            encryption: None,
        },
        DocVaultConfig {
            aggregate: AggregatingStoreConfig {
                primary: Some("local".to_string()),
                secondaries: Some(vec![]),
                delete_from_secondaries: true,
            },
            encryption: Some(EncryptionConfig::default()),
        },
    ];

    for config in cases {
        assert!(
            matches!(config.build(&registry), Err(StorageError::Configuration(_))),
            "{config:?}"
        );
    }
}
