//! Encrypting writer, decrypting reader and encrypting store tests.

use super::common::*;
use docvault_store::{
    AggregatingContentStore, ContentAccessor, ContentReader, ContentReaderFacade, ContentStore,
    ContentWriter, DecryptingContentReader, EncryptingContentStore, EncryptingContentWriter,
    EncryptionListener, InMemoryContentStore, KeyAlgorithm, StorageError, StorageResult, SymmetricKey, WriterContext,
};
use docvault_crypto::CBC_BLOCK_SIZE;
use parking_lot::Mutex;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Default)]
struct DeltaLog {
    deltas: Mutex<Vec<(u64, u64)>>,
}

impl EncryptionListener for DeltaLog {
    fn on_encrypted(&self, plain_bytes: u64, cipher_bytes: u64) {
        self.deltas.lock().push((plain_bytes, cipher_bytes));
    }
}

fn expected_stored_len(algorithm: KeyAlgorithm, plain: usize) -> usize {
    if algorithm.is_stream() {
        plain
    } else {
        (plain / CBC_BLOCK_SIZE + 1) * CBC_BLOCK_SIZE
    }
}

/// Every algorithm round-trips every length, and the decrypting reader
/// reports the plaintext size.
#[test]
fn test_round_trip_all_algorithms_and_lengths() {
    init_tracing();
    for algorithm in ALGORITHMS {
        for len in LENGTHS {
            let raw = memory("store");
            let key = shared_key(algorithm);
            let plaintext = payload(len);

            let delegate = raw.get_writer(&WriterContext::new()).unwrap();
            let mut writer = EncryptingContentWriter::new(delegate, key.clone()).unwrap();
            let mut channel = writer.channel().unwrap();
            for chunk in plaintext.chunks(1000) {
                channel.write_all(chunk).unwrap();
            }
            channel.close().unwrap();

            assert_eq!(writer.size().unwrap(), len as u64, "{algorithm} {len}");
            let url = writer.content_url().to_string();
            let stored = raw.raw_content(&url).unwrap();
            assert_eq!(stored.len(), expected_stored_len(algorithm, len), "{algorithm} {len}");
            assert_eq!(writer.ciphertext_size(), stored.len() as u64);

            let inner = raw.get_reader(&url).unwrap().unwrap();
            let mut reader = DecryptingContentReader::new(inner, key, len as u64).unwrap();
            assert_eq!(reader.size().unwrap(), len as u64);
            assert_eq!(reader.stored_size().unwrap(), stored.len() as u64);
            assert_eq!(reader.content_as_bytes().unwrap(), plaintext, "{algorithm} {len}");
        }
    }
}

/// Empty input under a block cipher produces exactly one block that
/// decrypts to nothing.
#[test]
fn test_empty_input_single_block() {
    let raw = memory("store");
    let key = shared_key(KeyAlgorithm::Aes128);

    let delegate = raw.get_writer(&WriterContext::new()).unwrap();
    let mut writer = EncryptingContentWriter::new(delegate, key.clone()).unwrap();
    writer.put_content(&[]).unwrap();

    let url = writer.content_url().to_string();
    assert_eq!(raw.raw_content(&url).unwrap().len(), CBC_BLOCK_SIZE);

    let mut reader = writer.get_reader().unwrap();
    assert_eq!(reader.size().unwrap(), 0);
    assert!(reader.content_as_bytes().unwrap().is_empty());
}

/// Cipher deltas reported to listeners sum to what reached the target.
#[test]
fn test_listener_cipher_sum_matches_target() {
    for algorithm in ALGORITHMS {
        let raw = memory("store");
        let log = Arc::new(DeltaLog::default());

        let delegate = raw.get_writer(&WriterContext::new()).unwrap();
        let mut writer = EncryptingContentWriter::new(delegate, shared_key(algorithm)).unwrap();
        writer.add_encryption_listener(log.clone());
        writer.put_content(&payload(5000)).unwrap();

        let deltas = log.deltas.lock().clone();
        let plain: u64 = deltas.iter().map(|d| d.0).sum();
        let cipher: u64 = deltas.iter().map(|d| d.1).sum();
        let stored = raw.raw_content(writer.content_url()).unwrap().len() as u64;

        assert_eq!(plain, 5000, "{algorithm}");
        assert_eq!(cipher, stored, "{algorithm}");
        assert_eq!(deltas.last().map(|d| d.0), Some(0), "finalize reports no plaintext");
    }
}

/// Closing twice is a no-op: no extra bytes, no second notification.
#[test]
fn test_double_close_is_noop() {
    let raw = memory("store");
    let closes = Arc::new(AtomicUsize::new(0));
    let counter = closes.clone();

    let delegate = raw.get_writer(&WriterContext::new()).unwrap();
    let mut writer = EncryptingContentWriter::new(delegate, shared_key(KeyAlgorithm::Aes256)).unwrap();
    writer
        .add_listener(Arc::new(move |_: &str| -> StorageResult<()> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }))
        .unwrap();

    let mut channel = writer.channel().unwrap();
    channel.write_all(b"once").unwrap();
    channel.close().unwrap();
    channel.close().unwrap();
    drop(channel);

    assert_eq!(closes.load(Ordering::SeqCst), 1);
    assert_eq!(raw.raw_content(writer.content_url()).unwrap().len(), CBC_BLOCK_SIZE);
    assert!(writer.is_closed().unwrap());
}

/// A second channel request on the same writer is refused.
#[test]
fn test_channel_is_single_use() {
    let raw = memory("store");
    let delegate = raw.get_writer(&WriterContext::new()).unwrap();
    let mut writer = EncryptingContentWriter::new(delegate, shared_key(KeyAlgorithm::ChaCha20)).unwrap();
    writer.put_content(b"x").unwrap();

    assert!(matches!(
        writer.channel(),
        Err(StorageError::ChannelAlreadyOpened(_))
    ));
}

/// A wrong key does not silently yield the plaintext.
#[test]
fn test_wrong_key_fails_or_differs() {
    let raw = memory("store");
    let delegate = raw.get_writer(&WriterContext::new()).unwrap();
    let mut writer = EncryptingContentWriter::new(delegate, shared_key(KeyAlgorithm::Aes256)).unwrap();
    writer.put_content(b"secret material").unwrap();

    let inner = raw.get_reader(writer.content_url()).unwrap().unwrap();
    let mut reader = DecryptingContentReader::new(inner, shared_key(KeyAlgorithm::Aes256), 15).unwrap();
    let mut channel = reader.channel().unwrap();
    let mut out = Vec::new();
    match channel.read_to_end(&mut out) {
        Ok(_) => assert_ne!(out, b"secret material"),
        Err(e) => assert_eq!(e.kind(), std::io::ErrorKind::InvalidData),
    }
}

/// Reopening a decrypting reader yields a fresh, equally sized reader.
#[test]
fn test_decrypting_reopen() {
    let raw = memory("store");
    let key = shared_key(KeyAlgorithm::Aes128);
    let delegate = raw.get_writer(&WriterContext::new()).unwrap();
    let mut writer = EncryptingContentWriter::new(delegate, key).unwrap();
    writer.put_content(&payload(100)).unwrap();

    let mut reader = writer.get_reader().unwrap();
    assert_eq!(reader.content_as_bytes().unwrap(), payload(100));

    let mut again = reader.reopen().unwrap();
    assert_eq!(again.size().unwrap(), 100);
    assert_eq!(again.content_as_bytes().unwrap(), payload(100));
}

/// A deferred facade builds its reader once, on first use.
#[test]
fn test_deferred_facade_resolves_once() {
    let raw = memory("store");
    raw.put("store://lazy.bin", b"lazy").unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let source = shared(&raw);
    let mut facade = ContentReaderFacade::deferred("store://lazy.bin", move || {
        counter.fetch_add(1, Ordering::SeqCst);
        source
            .get_reader("store://lazy.bin")?
            .ok_or_else(|| StorageError::NotFound("store://lazy.bin".to_string()))
    });

    assert_eq!(facade.content_url(), "store://lazy.bin");
    assert!(!facade.is_resolved());
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    assert!(facade.exists().unwrap());
    assert_eq!(facade.size().unwrap(), 4);
    assert_eq!(facade.content_as_bytes().unwrap(), b"lazy");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

/// Encrypted content kept in an archive is found through the aggregate and
/// decrypted with the imported size record.
#[test]
fn test_encrypting_store_over_aggregate() {
    init_tracing();
    let key = SymmetricKey::generate(KeyAlgorithm::Aes256);
    let primary = memory("store");
    let archive = memory("store");

    // Encrypt into the archive through its own wrapper.
    let archive_writer = EncryptingContentStore::new(shared(&archive), key.clone()).unwrap();
    let url = write_content(
        &archive_writer,
        &WriterContext::for_url("store://2024/a.bin"),
        b"archived secret",
    );
    let size = archive_writer.plaintext_size(&url).unwrap();

    let aggregate = AggregatingContentStore::new(shared(&primary), vec![shared(&archive)]);
    let store = EncryptingContentStore::new(Arc::new(aggregate), key).unwrap();
    store.record_plaintext_size(url.clone(), size);

    let mut reader = store.get_reader(&url).unwrap().unwrap();
    assert_eq!(reader.size().unwrap(), 15);
    assert_eq!(reader.content_as_bytes().unwrap(), b"archived secret");

    // New writes land encrypted in the primary.
    let fresh = write_content(&store, &WriterContext::new(), b"fresh");
    assert!(primary.raw_content(&fresh).is_some());
    assert!(archive.raw_content(&fresh).is_none());
    assert_eq!(read_content(&store, &fresh), b"fresh");

    // Delete clears both copies and the size record.
    assert!(store.delete(&url).unwrap());
    assert!(store.plaintext_size(&url).is_none());
    assert!(archive.raw_content(&url).is_none());
}

/// Metadata set on the encrypting writer reaches the stored content.
#[test]
fn test_metadata_passes_through() {
    let raw = memory("store");
    let store = EncryptingContentStore::new(
        shared(&raw),
        SymmetricKey::generate(KeyAlgorithm::ChaCha20),
    )
    .unwrap();

    let mut writer = store.get_writer(&WriterContext::new()).unwrap();
    writer.set_mimetype("application/pdf").unwrap();
    writer.set_locale("en_GB").unwrap();
    writer.put_content(b"%PDF").unwrap();

    let reader = store.get_reader(writer.content_url()).unwrap().unwrap();
    let data = reader.content_data().unwrap();
    assert_eq!(data.size, 4);
    assert_eq!(data.mimetype.as_deref(), Some("application/pdf"));
    assert_eq!(data.locale.as_deref(), Some("en_GB"));
}

/// A write the store refuses leaves no plaintext size behind.
#[test]
fn test_refused_write_records_no_size() {
    let raw = Arc::new(InMemoryContentStore::new().with_max_size(8));
    let store = EncryptingContentStore::new(
        shared(&raw),
        SymmetricKey::generate(KeyAlgorithm::Aes128),
    )
    .unwrap();

    let mut writer = store
        .get_writer(&WriterContext::for_url("store://big.bin"))
        .unwrap();
    assert!(writer.put_content(b"too large").is_err());

    assert!(store.plaintext_size("store://big.bin").is_none());
    assert!(raw.raw_content("store://big.bin").is_none());
    assert!(!store.exists("store://big.bin").unwrap());
}
