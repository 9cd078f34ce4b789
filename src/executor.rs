//! Host thread provider
//!
//! Processor loops run to completion on dedicated OS threads. The executor
//! names and tracks the threads it launches so a process dump shows which
//! stage a thread belongs to, and `join` gives tests and shutdown paths a
//! single place to wait on.

use std::sync::atomic::{ AtomicUsize, Ordering };
use std::thread::JoinHandle;
use std::thread;

use parking_lot::Mutex;

use crate::error::Result;

pub struct ThreadExecutor {
    name_prefix: String,
    handles: Mutex<Vec<JoinHandle<()>>>,
    launched: AtomicUsize,
}

impl ThreadExecutor {
    /// Create an executor whose threads are named `<prefix>-<n>`
    pub fn new(name_prefix: &str) -> Self {
        Self {
            name_prefix: name_prefix.to_string(),
            handles: Mutex::new(Vec::new()),
            launched: AtomicUsize::new(0),
        }
    }

    /// Launch `task` on a fresh named thread
    pub fn execute<F>(&self, task: F) -> Result<()> where F: FnOnce() + Send + 'static {
        let id = self.launched.fetch_add(1, Ordering::Relaxed);
        let name = format!("{}-{}", self.name_prefix, id);
        tracing::debug!(thread = %name, "launching processor thread");

        let handle = thread::Builder::new().name(name).spawn(task)?;
        self.handles.lock().push(handle);
        Ok(())
    }

    /// Number of threads launched so far
    pub fn thread_count(&self) -> usize {
        self.launched.load(Ordering::Relaxed)
    }

    /// Wait for every launched thread to finish
    pub fn join(&self) {
        let handles: Vec<JoinHandle<()>> = self.handles.lock().drain(..).collect();
        for handle in handles {
            let name = handle.thread().name().unwrap_or("<unnamed>").to_string();
            if handle.join().is_err() {
                tracing::error!(thread = %name, "processor thread panicked");
            } else {
                tracing::debug!(thread = %name, "processor thread finished");
            }
        }
    }
}

impl Default for ThreadExecutor {
    fn default() -> Self {
        Self::new("surge")
    }
}
