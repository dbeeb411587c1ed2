//! Backend integration tests: memory and filesystem stores composed.

use super::common::*;
use docvault_store::{
    AggregatingContentStore, ContentAccessor, ContentReader, ContentStore, ContentWriter,
    EncryptingContentStore, FileContentStore, KeyAlgorithm, StorageError, SymmetricKey,
    WriterContext,
};
use std::sync::Arc;
use tempfile::TempDir;

fn file_store(dir: &TempDir) -> Arc<FileContentStore> {
    Arc::new(FileContentStore::new(dir.path()).unwrap())
}

/// A memory primary in front of a read-only filesystem archive.
#[test]
fn test_memory_primary_over_filesystem_archive() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    {
        let seeding = file_store(&dir);
        write_content(
            seeding.as_ref(),
            &WriterContext::for_url("store://2024/a.bin").with_mimetype("text/plain"),
            b"on disk",
        );
    }

    let archive = Arc::new(FileContentStore::new(dir.path()).unwrap().read_only(true));
    let primary = memory("store");
    let store = AggregatingContentStore::new(shared(&primary), vec![shared(&archive)]);

    let mut reader = store.get_reader("store://2024/a.bin").unwrap().unwrap();
    assert_eq!(reader.mimetype().unwrap().as_deref(), Some("text/plain"));
    assert_eq!(reader.size().unwrap(), 7);
    assert_eq!(reader.content_as_bytes().unwrap(), b"on disk");

    // The read-only archive keeps its copy; the delete still succeeds.
    assert!(store.delete("store://2024/a.bin").unwrap());
    assert!(store.exists("store://2024/a.bin").unwrap());
}

/// Filesystem content written through the aggregate stays in the primary.
#[test]
fn test_filesystem_primary_with_memory_secondary() {
    let dir = TempDir::new().unwrap();
    let primary = file_store(&dir);
    let secondary = memory("store");
    let store = AggregatingContentStore::new(shared(&primary), vec![shared(&secondary)]);

    let url = write_content(&store, &WriterContext::new(), b"fresh");
    assert!(url.starts_with("store://"));
    assert!(primary.exists(&url).unwrap());
    assert!(secondary.is_empty());
    assert_eq!(read_content(&store, &url), b"fresh");
    assert_eq!(store.root_location(), dir.path().display().to_string());
}

/// Encrypted content on disk is unreadable without the wrapper.
#[test]
fn test_encrypted_filesystem_round_trip() {
    let dir = TempDir::new().unwrap();
    let disk = file_store(&dir);
    let store = EncryptingContentStore::new(
        shared(&disk),
        SymmetricKey::generate(KeyAlgorithm::Aes128),
    )
    .unwrap();

    let plaintext = payload(40_000);
    let url = write_content(&store, &WriterContext::new(), &plaintext);

    let raw = read_content(disk.as_ref(), &url);
    assert_eq!(raw.len(), 40_000 + 16 - 40_000 % 16);
    assert_ne!(raw[..16], plaintext[..16]);

    assert_eq!(read_content(&store, &url), plaintext);
    assert_eq!(store.get_reader(&url).unwrap().unwrap().size().unwrap(), 40_000);
}

/// A reader stays bound to the snapshot it was created from.
#[test]
fn test_memory_reader_is_a_snapshot() {
    let store = memory("store");
    store.put("store://snap.bin", b"before").unwrap();

    let mut reader = store.get_reader("store://snap.bin").unwrap().unwrap();
    store.delete("store://snap.bin").unwrap();

    assert!(reader.exists().unwrap());
    assert_eq!(reader.content_as_bytes().unwrap(), b"before");
    assert!(!reader.reopen().unwrap().exists().unwrap());
}

/// Writers refuse URLs that already hold content.
#[test]
fn test_existing_url_refused_everywhere() {
    let dir = TempDir::new().unwrap();
    let disk = file_store(&dir);
    let mem = memory("store");
    for store in [shared(&disk), shared(&mem)] {
        let url = write_content(store.as_ref(), &WriterContext::new(), b"one");
        assert!(matches!(
            store.get_writer(&WriterContext::for_url(url)),
            Err(StorageError::AlreadyExists(_))
        ));
    }
}

/// Writer state tracks the channel lifecycle.
#[test]
fn test_writer_lifecycle_flags() {
    let dir = TempDir::new().unwrap();
    let disk = file_store(&dir);
    let mut writer = disk.get_writer(&WriterContext::new()).unwrap();

    assert!(!writer.is_channel_open().unwrap());
    assert!(!writer.is_closed().unwrap());

    let mut channel = writer.channel().unwrap();
    assert!(writer.is_channel_open().unwrap());
    assert!(channel.is_open());

    std::io::Write::write_all(&mut channel, b"abc").unwrap();
    channel.close().unwrap();

    assert!(!writer.is_channel_open().unwrap());
    assert!(writer.is_closed().unwrap());
    assert_eq!(writer.size().unwrap(), 3);
    assert_eq!(writer.get_reader().unwrap().content_as_bytes().unwrap(), b"abc");
}
