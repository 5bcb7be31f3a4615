//! Shared test utilities.
//!
//! All tests that manipulate environment variables must use the shared
//! `env_lock()` to prevent race conditions.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::{Mutex, OnceLock};

use crate::transport::{Transport, TransportError, join_remote};

/// Global lock for tests that modify environment variables.
pub fn env_lock() -> std::sync::MutexGuard<'static, ()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|e| e.into_inner())
}

/// RAII guard for temporarily setting an environment variable.
pub struct EnvGuard {
    key: String,
    old: Option<String>,
}

impl EnvGuard {
    pub fn set(key: &str, value: &str) -> Self {
        let old = std::env::var(key).ok();
        unsafe {
            std::env::set_var(key, value);
        }
        Self {
            key: key.to_string(),
            old,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        if let Some(val) = &self.old {
            unsafe {
                std::env::set_var(&self.key, val);
            }
        } else {
            unsafe {
                std::env::remove_var(&self.key);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Cd(String),
    Mkdir(String),
    Put(PathBuf, String),
    Close,
}

#[derive(Debug, Default)]
struct RemoteState {
    dirs: BTreeSet<String>,
    cwd: String,
    calls: Vec<Call>,
    denied: Vec<String>,
    failing_uploads: Vec<String>,
}

/// Handle onto a [`RecordingTransport`]'s state that outlives `close`.
#[derive(Clone)]
pub struct TransportLog(Rc<RefCell<RemoteState>>);

impl TransportLog {
    pub fn calls(&self) -> Vec<Call> {
        self.0.borrow().calls.clone()
    }

    pub fn cwd(&self) -> String {
        self.0.borrow().cwd.clone()
    }

    pub fn has_dir(&self, path: &str) -> bool {
        self.0.borrow().dirs.contains(path)
    }

    pub fn close_count(&self) -> usize {
        self.0
            .borrow()
            .calls
            .iter()
            .filter(|c| **c == Call::Close)
            .count()
    }

    /// Entering a directory with this name fails with a non-recoverable error.
    pub fn deny_directory(&self, name: &str) {
        self.0.borrow_mut().denied.push(name.to_string());
    }

    pub fn fail_upload_of(&self, remote_name: &str) {
        self.0
            .borrow_mut()
            .failing_uploads
            .push(remote_name.to_string());
    }
}

/// In-memory remote tree that records every call made against it.
pub struct RecordingTransport(Rc<RefCell<RemoteState>>);

impl RecordingTransport {
    pub fn new(existing_dirs: &[&str]) -> (Self, TransportLog) {
        let state = RemoteState {
            dirs: existing_dirs.iter().map(|d| d.to_string()).collect(),
            cwd: "/".to_string(),
            ..RemoteState::default()
        };
        let shared = Rc::new(RefCell::new(state));
        (Self(shared.clone()), TransportLog(shared))
    }
}

impl Transport for RecordingTransport {
    fn change_directory(&mut self, name: &str) -> Result<(), TransportError> {
        let mut state = self.0.borrow_mut();
        state.calls.push(Call::Cd(name.to_string()));
        if state.denied.iter().any(|d| d == name) {
            return Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                format!("{name}: permission denied"),
            )));
        }
        let target = join_remote(&state.cwd, name);
        if state.dirs.contains(&target) {
            state.cwd = target;
            Ok(())
        } else {
            Err(TransportError::DirectoryNotFound(target))
        }
    }

    fn create_directory(&mut self, name: &str) -> Result<(), TransportError> {
        let mut state = self.0.borrow_mut();
        state.calls.push(Call::Mkdir(name.to_string()));
        let target = join_remote(&state.cwd, name);
        state.dirs.insert(target);
        Ok(())
    }

    fn upload_file(&mut self, local: &Path, remote_name: &str) -> Result<(), TransportError> {
        let mut state = self.0.borrow_mut();
        state
            .calls
            .push(Call::Put(local.to_path_buf(), remote_name.to_string()));
        if state.failing_uploads.iter().any(|f| f == remote_name) {
            return Err(TransportError::Io(std::io::Error::other(format!(
                "552 storage exceeded for {remote_name}"
            ))));
        }
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<(), TransportError> {
        self.0.borrow_mut().calls.push(Call::Close);
        Ok(())
    }
}
