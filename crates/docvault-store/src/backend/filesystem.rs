//! Filesystem content store.
//!
//! Content lives at `<root>/<url path>`; descriptive properties sit in a
//! `<file>.meta.json` sidecar. Writers stage into a `.tmp` file and rename it
//! into place when their channel closes.

use super::memory::DEFAULT_PROTOCOL;
use super::StorageStats;
use crate::accessor::{
    ChannelState, ContentAccessor, ContentProperties, ContentReader, ContentWriter, ReadChannel,
    TrackedReadChannel, WriteChannel,
};
use crate::error::storage_io_error;
use crate::listener::StreamListener;
use crate::store::{ContentStore, WriterContext};
use crate::url::ContentUrl;
use crate::{StorageError, StorageResult};
use parking_lot::Mutex;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

const META_SUFFIX: &str = ".meta.json";
const TEMP_SUFFIX: &str = ".tmp";

/// Filesystem content store.
#[derive(Debug)]
pub struct FileContentStore {
    root: PathBuf,
    protocol: String,
    read_only: bool,
}

impl FileContentStore {
    /// Creates a store rooted at `root`, creating the directory if needed.
    pub fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.exists() {
            fs::create_dir_all(&root)?;
        }
        Ok(Self {
            root,
            protocol: DEFAULT_PROTOCOL.to_string(),
            read_only: false,
        })
    }

    /// Sets the protocol this store claims.
    #[must_use]
    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = protocol.into();
        self
    }

    /// Makes the store refuse writers and deletes.
    #[must_use]
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Returns the root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves a content URL to a file path under the root.
    fn url_to_path(&self, content_url: &str) -> StorageResult<PathBuf> {
        let url = ContentUrl::parse(content_url)?;
        if url.protocol != self.protocol {
            return Err(StorageError::UnsupportedContentUrl {
                store: self.root_location(),
                url: content_url.to_string(),
            });
        }

        let mut path = self.root.clone();
        for segment in url.path.split('/').filter(|s| !s.is_empty() && *s != ".") {
            path.push(segment);
        }
        if path == self.root {
            return Err(StorageError::InvalidUrl(content_url.to_string()));
        }
        Ok(path)
    }

    fn check_writable(&self, operation: &str) -> StorageResult<()> {
        if self.read_only {
            return Err(StorageError::UnsupportedOperation(format!(
                "{operation} on read-only store {}",
                self.root_location()
            )));
        }
        Ok(())
    }

    /// Walks the root, counting content files and their bytes.
    pub fn stats(&self) -> StorageResult<StorageStats> {
        let mut stats = StorageStats::default();
        let mut stack = vec![self.root.clone()];
        while let Some(current) = stack.pop() {
            for entry in fs::read_dir(&current)? {
                let entry_path = entry?.path();
                if entry_path.is_dir() {
                    stack.push(entry_path);
                } else if !is_auxiliary(&entry_path) {
                    stats.object_count += 1;
                    stats.total_size += fs::metadata(&entry_path)?.len();
                }
            }
        }
        Ok(stats)
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

fn is_auxiliary(path: &Path) -> bool {
    let name = path.to_string_lossy();
    name.ends_with(META_SUFFIX) || name.ends_with(TEMP_SUFFIX)
}

fn read_properties(path: &Path) -> ContentProperties {
    let meta_path = with_suffix(path, META_SUFFIX);
    fs::read_to_string(meta_path)
        .ok()
        .and_then(|content| serde_json::from_str(&content).ok())
        .unwrap_or_default()
}

fn write_properties(path: &Path, properties: &ContentProperties) -> StorageResult<()> {
    let content = serde_json::to_string(properties)
        .map_err(|e| StorageError::Serialization(e.to_string()))?;
    fs::write(with_suffix(path, META_SUFFIX), content)?;
    Ok(())
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

impl ContentStore for FileContentStore {
    fn is_write_supported(&self) -> bool {
        !self.read_only
    }

    fn is_content_url_supported(&self, content_url: &str) -> bool {
        ContentUrl::has_protocol(content_url, &self.protocol)
    }

    fn get_reader(&self, content_url: &str) -> StorageResult<Option<Box<dyn ContentReader>>> {
        let path = self.url_to_path(content_url)?;
        Ok(Some(Box::new(FileContentReader::new(content_url, path))))
    }

    fn get_writer(&self, context: &WriterContext) -> StorageResult<Box<dyn ContentWriter>> {
        self.check_writable("write")?;
        let content_url = match &context.content_url {
            Some(url) => url.clone(),
            None => ContentUrl::generate(&self.protocol).to_string(),
        };
        let path = self.url_to_path(&content_url)?;
        if path.exists() {
            return Err(StorageError::AlreadyExists(content_url));
        }

        let properties = ContentProperties {
            mimetype: context.mimetype.clone(),
            encoding: context.encoding.clone(),
            locale: context.locale.clone(),
        };
        Ok(Box::new(FileContentWriter::new(content_url, path, properties)))
    }

    fn delete(&self, content_url: &str) -> StorageResult<bool> {
        self.check_writable("delete")?;
        let path = self.url_to_path(content_url)?;
        remove_if_present(&path)?;
        if let Err(e) = remove_if_present(&with_suffix(&path, META_SUFFIX)) {
            tracing::warn!(url = content_url, error = %e, "Removing properties sidecar failed");
        }
        Ok(!path.exists())
    }

    fn root_location(&self) -> String {
        self.root.display().to_string()
    }
}

/// Reader over one content file.
pub struct FileContentReader {
    content_url: String,
    path: PathBuf,
    properties: ContentProperties,
    state: ChannelState,
}

impl FileContentReader {
    fn new(content_url: &str, path: PathBuf) -> Self {
        Self {
            content_url: content_url.to_string(),
            properties: read_properties(&path),
            path,
            state: ChannelState::new(content_url),
        }
    }
}

impl ContentAccessor for FileContentReader {
    fn content_url(&self) -> &str {
        &self.content_url
    }

    fn size(&self) -> StorageResult<u64> {
        match fs::metadata(&self.path) {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn mimetype(&self) -> StorageResult<Option<String>> {
        Ok(self.properties.mimetype.clone())
    }

    fn set_mimetype(&mut self, mimetype: &str) -> StorageResult<()> {
        self.properties.mimetype = Some(mimetype.to_string());
        Ok(())
    }

    fn encoding(&self) -> StorageResult<Option<String>> {
        Ok(self.properties.encoding.clone())
    }

    fn set_encoding(&mut self, encoding: &str) -> StorageResult<()> {
        self.properties.encoding = Some(encoding.to_string());
        Ok(())
    }

    fn locale(&self) -> StorageResult<Option<String>> {
        Ok(self.properties.locale.clone())
    }

    fn set_locale(&mut self, locale: &str) -> StorageResult<()> {
        self.properties.locale = Some(locale.to_string());
        Ok(())
    }

    fn is_channel_open(&self) -> StorageResult<bool> {
        Ok(self.state.is_open())
    }

    fn add_listener(&mut self, listener: Arc<dyn StreamListener>) -> StorageResult<()> {
        self.state.add_listener(listener);
        Ok(())
    }
}

impl ContentReader for FileContentReader {
    fn exists(&self) -> StorageResult<bool> {
        Ok(self.path.is_file())
    }

    fn channel(&mut self) -> StorageResult<ReadChannel> {
        let file = match fs::File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(self.content_url.clone()))
            }
            Err(e) => return Err(e.into()),
        };
        self.state.mark_opened()?;
        Ok(Box::new(TrackedReadChannel::new(
            io::BufReader::new(file),
            self.state.clone(),
        )))
    }

    fn reopen(&self) -> StorageResult<Box<dyn ContentReader>> {
        Ok(Box::new(Self::new(&self.content_url, self.path.clone())))
    }
}

/// Writer staging content into a temporary file.
pub struct FileContentWriter {
    content_url: String,
    path: PathBuf,
    properties: Arc<Mutex<ContentProperties>>,
    written: Arc<AtomicU64>,
    state: ChannelState,
}

impl FileContentWriter {
    fn new(content_url: String, path: PathBuf, properties: ContentProperties) -> Self {
        Self {
            state: ChannelState::new(content_url.clone()),
            content_url,
            path,
            properties: Arc::new(Mutex::new(properties)),
            written: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl ContentAccessor for FileContentWriter {
    fn content_url(&self) -> &str {
        &self.content_url
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.written.load(Ordering::SeqCst))
    }

    fn mimetype(&self) -> StorageResult<Option<String>> {
        Ok(self.properties.lock().mimetype.clone())
    }

    fn set_mimetype(&mut self, mimetype: &str) -> StorageResult<()> {
        self.properties.lock().mimetype = Some(mimetype.to_string());
        Ok(())
    }

    fn encoding(&self) -> StorageResult<Option<String>> {
        Ok(self.properties.lock().encoding.clone())
    }

    fn set_encoding(&mut self, encoding: &str) -> StorageResult<()> {
        self.properties.lock().encoding = Some(encoding.to_string());
        Ok(())
    }

    fn locale(&self) -> StorageResult<Option<String>> {
        Ok(self.properties.lock().locale.clone())
    }

    fn set_locale(&mut self, locale: &str) -> StorageResult<()> {
        self.properties.lock().locale = Some(locale.to_string());
        Ok(())
    }

    fn is_channel_open(&self) -> StorageResult<bool> {
        Ok(self.state.is_open())
    }

    fn add_listener(&mut self, listener: Arc<dyn StreamListener>) -> StorageResult<()> {
        self.state.add_listener(listener);
        Ok(())
    }
}

impl ContentWriter for FileContentWriter {
    fn channel(&mut self) -> StorageResult<Box<dyn WriteChannel>> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let temp_path = with_suffix(&self.path, TEMP_SUFFIX);
        self.state.mark_opened()?;
        let file = fs::File::create(&temp_path)?;

        Ok(Box::new(FileWriteChannel {
            file: Some(BufWriter::new(file)),
            temp_path,
            path: self.path.clone(),
            properties: self.properties.clone(),
            written: self.written.clone(),
            state: self.state.clone(),
        }))
    }

    fn is_closed(&self) -> StorageResult<bool> {
        Ok(self.state.is_closed())
    }

    fn get_reader(&self) -> StorageResult<Box<dyn ContentReader>> {
        Ok(Box::new(FileContentReader::new(
            &self.content_url,
            self.path.clone(),
        )))
    }
}

struct FileWriteChannel {
    file: Option<BufWriter<fs::File>>,
    temp_path: PathBuf,
    path: PathBuf,
    properties: Arc<Mutex<ContentProperties>>,
    written: Arc<AtomicU64>,
    state: ChannelState,
}

impl FileWriteChannel {
    fn commit(&mut self, file: BufWriter<fs::File>) -> StorageResult<()> {
        let file = file.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        drop(file);

        fs::rename(&self.temp_path, &self.path)?;
        let properties = self.properties.lock().clone();
        write_properties(&self.path, &properties)
    }
}

impl Write for FileWriteChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "channel is closed"))?;
        let n = file.write(buf)?;
        self.written.fetch_add(n as u64, Ordering::SeqCst);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

impl WriteChannel for FileWriteChannel {
    fn close(&mut self) -> io::Result<()> {
        let Some(file) = self.file.take() else {
            return Ok(());
        };

        if let Err(committed) = self.commit(file) {
            if let Err(e) = remove_if_present(&self.temp_path) {
                tracing::warn!(path = %self.temp_path.display(), error = %e, "Removing staged file failed");
            }
            self.state.mark_abandoned();
            return Err(storage_io_error(committed));
        }
        self.state.mark_closed().map_err(storage_io_error)
    }

    fn is_open(&self) -> bool {
        self.file.is_some()
    }
}

impl Drop for FileWriteChannel {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(path = %self.path.display(), error = %e, "Closing file channel on drop failed");
        }
    }
}
