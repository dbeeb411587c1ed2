//! Test helper functions.

use docvault_store::{
    ContentAccessor, ContentReader, ContentStore, ContentWriter, InMemoryContentStore,
    KeyAlgorithm, SymmetricKey, WriterContext,
};
use std::sync::{Arc, Once};

static TRACING: Once = Once::new();

/// Installs a test-writer tracing subscriber once per process.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// Every supported algorithm.
pub const ALGORITHMS: [KeyAlgorithm; 3] = [
    KeyAlgorithm::Aes128,
    KeyAlgorithm::Aes256,
    KeyAlgorithm::ChaCha20,
];

/// Plaintext lengths around block and buffer boundaries.
pub const LENGTHS: [usize; 8] = [0, 1, 15, 16, 17, 1000, 8192, 8192 * 3 + 5];

/// Deterministic payload of `len` bytes.
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Generates a shared key.
pub fn shared_key(algorithm: KeyAlgorithm) -> Arc<SymmetricKey> {
    Arc::new(SymmetricKey::generate(algorithm))
}

/// An in-memory store claiming `protocol`, kept concrete for inspection.
pub fn memory(protocol: &str) -> Arc<InMemoryContentStore> {
    Arc::new(InMemoryContentStore::with_protocol(protocol))
}

/// Upcasts a concrete store for composition.
pub fn shared<S: ContentStore + 'static>(store: &Arc<S>) -> Arc<dyn ContentStore> {
    store.clone()
}

/// Writes `data` through a fresh writer and returns the content URL.
pub fn write_content(store: &dyn ContentStore, context: &WriterContext, data: &[u8]) -> String {
    let mut writer = store.get_writer(context).unwrap();
    writer.put_content(data).unwrap();
    writer.content_url().to_string()
}

/// Reads everything behind `url`, panicking if no store holds it.
pub fn read_content(store: &dyn ContentStore, url: &str) -> Vec<u8> {
    let mut reader = store.get_reader(url).unwrap().expect("no reader");
    assert!(reader.exists().unwrap(), "{url} does not exist");
    reader.content_as_bytes().unwrap()
}
