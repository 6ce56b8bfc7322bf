//! Transient resources owned by one exchange
//!
//! A `ResourceScope` holds the buffers and spool files created while sending
//! one message. Everything it holds is released when the scope is dropped, on
//! success, failure or unwinding alike. A shared `ResourceTracker` counts
//! acquisitions and releases so leaks are observable.

use bytes::Bytes;
use std::io::{self, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tracing::{debug, trace, warn};

/// Default size above which retained data is spooled to a temporary file
pub const DEFAULT_SPOOL_THRESHOLD: usize = 1024 * 1024;

#[derive(Debug, Default)]
struct TrackerCounters {
    acquired: AtomicU64,
    released: AtomicU64,
    spooled: AtomicU64,
    spool_removed: AtomicU64,
}

/// Append-only acquisition/release counters shared across scopes
#[derive(Debug, Clone, Default)]
pub struct ResourceTracker {
    counters: Arc<TrackerCounters>,
}

impl ResourceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquired(&self) -> u64 {
        self.counters.acquired.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> u64 {
        self.counters.released.load(Ordering::SeqCst)
    }

    /// Resources acquired and not yet released
    pub fn outstanding(&self) -> u64 {
        self.acquired().saturating_sub(self.released())
    }

    /// Acquisitions that went to a temporary file instead of memory
    pub fn spooled(&self) -> u64 {
        self.counters.spooled.load(Ordering::SeqCst)
    }

    /// Spool files created and not yet removed
    pub fn outstanding_spooled(&self) -> u64 {
        self.spooled()
            .saturating_sub(self.counters.spool_removed.load(Ordering::SeqCst))
    }

    fn record_acquire(&self, spooled: bool) {
        self.counters.acquired.fetch_add(1, Ordering::SeqCst);
        if spooled {
            self.counters.spooled.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn record_release(&self, spooled: bool) {
        self.counters.released.fetch_add(1, Ordering::SeqCst);
        if spooled {
            self.counters.spool_removed.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Reference to a resource held by a scope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceHandle(usize);

#[derive(Debug)]
enum Storage {
    Memory(Bytes),
    Spooled(NamedTempFile),
}

#[derive(Debug)]
struct ScopedResource {
    storage: Storage,
    tracker: ResourceTracker,
}

impl Drop for ScopedResource {
    fn drop(&mut self) {
        let spooled = match std::mem::replace(&mut self.storage, Storage::Memory(Bytes::new())) {
            Storage::Spooled(file) => {
                let path = file.path().to_path_buf();
                if let Err(e) = file.close() {
                    warn!(path = %path.display(), error = %e, "Failed to remove spool file");
                } else {
                    trace!(path = %path.display(), "Removed spool file");
                }
                true
            }
            Storage::Memory(_) => false,
        };
        self.tracker.record_release(spooled);
    }
}

#[derive(Debug)]
pub struct ResourceScope {
    tracker: ResourceTracker,
    spool_threshold: usize,
    resources: Vec<ScopedResource>,
}

impl ResourceScope {
    pub fn new(tracker: ResourceTracker, spool_threshold: usize) -> Self {
        Self {
            tracker,
            spool_threshold,
            resources: Vec::new(),
        }
    }

    /// Keep `data` alive for the rest of the exchange; large data is spooled to disk
    pub fn retain(&mut self, data: Bytes) -> io::Result<ResourceHandle> {
        let storage = if data.len() > self.spool_threshold {
            let mut file = NamedTempFile::new()?;
            file.write_all(&data)?;
            file.flush()?;
            debug!(
                bytes = data.len(),
                path = %file.path().display(),
                "Spooled exchange data to temporary file"
            );
            Storage::Spooled(file)
        } else {
            Storage::Memory(data)
        };

        self.tracker.record_acquire(matches!(storage, Storage::Spooled(_)));
        self.resources.push(ScopedResource {
            storage,
            tracker: self.tracker.clone(),
        });
        Ok(ResourceHandle(self.resources.len() - 1))
    }

    pub fn read(&self, handle: ResourceHandle) -> io::Result<Bytes> {
        match &self.resource(handle)?.storage {
            Storage::Memory(data) => Ok(data.clone()),
            Storage::Spooled(file) => std::fs::read(file.path()).map(Bytes::from),
        }
    }

    /// Path of a spooled resource
    pub fn path(&self, handle: ResourceHandle) -> Option<&Path> {
        match &self.resources.get(handle.0)?.storage {
            Storage::Spooled(file) => Some(file.path()),
            Storage::Memory(_) => None,
        }
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    fn resource(&self, handle: ResourceHandle) -> io::Result<&ScopedResource> {
        self.resources.get(handle.0).ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "resource handle from another scope")
        })
    }
}

impl Drop for ResourceScope {
    fn drop(&mut self) {
        if !self.resources.is_empty() {
            debug!(resources = self.resources.len(), "Releasing exchange resources");
        }
    }
}
