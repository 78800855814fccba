// MIT License - Copyright (c) 2026 The codeless-dsps developers
// CodeLess / DSPS protocol engine

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::debug;

/// Destination of a received file.
pub trait Sink: Send {
    fn append(&mut self, data: &[u8]) -> io::Result<()>;
}

/// Creates sinks by name.
pub trait SinkProvider: Send {
    fn create(&mut self, name: &str) -> io::Result<Box<dyn Sink>>;
}

/// Writes received files into a directory.
#[derive(Debug, Clone)]
pub struct FsSinkProvider {
    dir: PathBuf,
}

impl FsSinkProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

struct FileSink(File);

impl Sink for FileSink {
    fn append(&mut self, data: &[u8]) -> io::Result<()> {
        self.0.write_all(data)
    }
}

impl SinkProvider for FsSinkProvider {
    fn create(&mut self, name: &str) -> io::Result<Box<dyn Sink>> {
        // Never leave the target directory.
        let file_name = Path::new(name)
            .file_name()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, format!("bad file name {name:?}")))?;
        let path = self.dir.join(file_name);
        debug!("Creating {}", path.display());
        Ok(Box::new(FileSink(File::create(path)?)))
    }
}

type Files = Arc<Mutex<HashMap<String, Vec<u8>>>>;

/// Keeps received files in memory. Clones share the same storage.
#[derive(Debug, Clone, Default)]
pub struct MemorySinkProvider {
    files: Files,
}

struct MemorySink {
    files: Files,
    name: String,
}

fn poisoned() -> io::Error {
    io::Error::new(io::ErrorKind::Other, "memory sink lock poisoned")
}

impl Sink for MemorySink {
    fn append(&mut self, data: &[u8]) -> io::Result<()> {
        let mut files = self.files.lock().map_err(|_| poisoned())?;
        files.entry(self.name.clone()).or_default().extend_from_slice(data);
        Ok(())
    }
}

impl SinkProvider for MemorySinkProvider {
    fn create(&mut self, name: &str) -> io::Result<Box<dyn Sink>> {
        self.files
            .lock()
            .map_err(|_| poisoned())?
            .insert(name.to_string(), Vec::new());
        Ok(Box::new(MemorySink {
            files: self.files.clone(),
            name: name.to_string(),
        }))
    }
}

impl MemorySinkProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Contents of a received file.
    pub fn file(&self, name: &str) -> Option<Vec<u8>> {
        self.files.lock().ok()?.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.files
            .lock()
            .map(|f| f.keys().cloned().collect())
            .unwrap_or_default()
    }
}
