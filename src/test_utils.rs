//! Shared test fakes and arbitrary generators for property-based testing.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io;
use std::sync::Mutex;

use proptest::prelude::*;
use serde_json::json;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::notice::{Notice, NotificationSink};
use crate::source::{BatchStream, Notification, Receipt, RemoteSource, SourceError};
use crate::types::{Batch, BufferEntry, Identity, NewlinePolicy};
use crate::vault::{EntryKind, Vault, parent_path};

/// A buffer entry holding a note event for `path`.
pub fn note(key: &str, data: &str, path: &str) -> BufferEntry {
    BufferEntry::new(key, json!({"data": data, "path": path}))
}

pub fn arb_newline_policy() -> impl Strategy<Value = NewlinePolicy> {
    prop_oneof![
        Just(NewlinePolicy::None),
        Just(NewlinePolicy::Unix),
        Just(NewlinePolicy::Windows),
    ]
}

/// Note paths at the vault root or one folder down. Folder names never end
/// in `.md`, so a generated file never collides with a generated folder.
pub fn arb_note_path() -> impl Strategy<Value = String> {
    prop_oneof!["[a-z]{1,8}\\.md", "[a-z]{1,5}/[a-z]{1,8}\\.md"]
}

/// Well-formed batches with increasing keys.
pub fn arb_note_batch() -> impl Strategy<Value = Batch> {
    prop::collection::vec(("[a-zA-Z0-9 ]{0,20}", arb_note_path()), 0..10).prop_map(|notes| {
        notes
            .iter()
            .enumerate()
            .map(|(i, (data, path))| note(&format!("k{i:03}"), data, path))
            .collect()
    })
}

// ─── MemoryVault ───

#[derive(Debug, Default)]
struct VaultState {
    files: BTreeMap<String, String>,
    dirs: BTreeSet<String>,
    fail_mkdir: BTreeSet<String>,
    fail_writes: BTreeSet<String>,
    writes: Vec<(String, String)>,
}

/// An in-memory [`Vault`] that records every write.
#[derive(Debug, Default)]
pub struct MemoryVault {
    state: Mutex<VaultState>,
}

impl MemoryVault {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a file, creating its parent folders.
    pub fn with_file(self, path: &str, content: &str) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            add_dir_with_ancestors(&mut state.dirs, &parent_path(path));
            state.files.insert(path.to_string(), content.to_string());
        }
        self
    }

    /// Seeds a folder and its ancestors.
    pub fn with_dir(self, path: &str) -> Self {
        add_dir_with_ancestors(&mut self.state.lock().unwrap().dirs, path);
        self
    }

    /// Makes creating `path` fail.
    pub fn fail_mkdir(self, path: &str) -> Self {
        self.state.lock().unwrap().fail_mkdir.insert(path.to_string());
        self
    }

    /// Makes writing `path` fail.
    pub fn fail_writes_to(self, path: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .fail_writes
            .insert(path.to_string());
        self
    }

    pub fn file(&self, path: &str) -> Option<String> {
        self.state.lock().unwrap().files.get(path).cloned()
    }

    pub fn is_dir(&self, path: &str) -> bool {
        self.state.lock().unwrap().dirs.contains(path)
    }

    /// Every successful write, in order, as `(path, full content)`.
    pub fn writes(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().writes.clone()
    }
}

fn add_dir_with_ancestors(dirs: &mut BTreeSet<String>, path: &str) {
    let mut current = path.to_string();
    while !current.is_empty() {
        dirs.insert(current.clone());
        current = parent_path(&current);
    }
}

impl Vault for MemoryVault {
    async fn exists(&self, path: &str) -> io::Result<bool> {
        let state = self.state.lock().unwrap();
        Ok(state.files.contains_key(path) || state.dirs.contains(path))
    }

    async fn mkdir(&self, path: &str) -> io::Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_mkdir.contains(path) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "mkdir refused",
            ));
        }
        if state.files.contains_key(path) {
            return Err(io::ErrorKind::AlreadyExists.into());
        }
        add_dir_with_ancestors(&mut state.dirs, path);
        Ok(())
    }

    async fn read(&self, path: &str) -> io::Result<String> {
        self.state
            .lock()
            .unwrap()
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| io::ErrorKind::NotFound.into())
    }

    async fn write(&self, path: &str, content: &str) -> io::Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_writes.contains(path) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "write refused",
            ));
        }
        if state.dirs.contains(path) {
            return Err(io::Error::other("is a directory"));
        }
        let parent = parent_path(path);
        if !parent.is_empty() && !state.dirs.contains(&parent) {
            return Err(io::ErrorKind::NotFound.into());
        }
        state.files.insert(path.to_string(), content.to_string());
        state.writes.push((path.to_string(), content.to_string()));
        Ok(())
    }

    async fn stat(&self, path: &str) -> io::Result<EntryKind> {
        let state = self.state.lock().unwrap();
        if state.dirs.contains(path) {
            Ok(EntryKind::Directory)
        } else if state.files.contains_key(path) {
            Ok(EntryKind::File)
        } else {
            Err(io::ErrorKind::NotFound.into())
        }
    }
}

// ─── RecordingSink ───

/// A [`NotificationSink`] that keeps every notice.
#[derive(Debug, Default)]
pub struct RecordingSink {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().unwrap().clone()
    }
}

impl NotificationSink for RecordingSink {
    fn notify(&self, notice: Notice) {
        self.notices.lock().unwrap().push(notice);
    }
}

// ─── ScriptedSource ───

/// A [`RemoteSource`] whose notifications are pushed by the test.
#[derive(Debug, Default)]
pub struct ScriptedSource {
    senders: Mutex<HashMap<Identity, mpsc::Sender<Notification>>>,
    subscriptions: Mutex<Vec<(Identity, CancellationToken)>>,
    drains: Mutex<Vec<(Identity, BufferEntry)>>,
    fail_drains: bool,
    fail_subscribe: bool,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every drain call fail.
    pub fn failing_drains(mut self) -> Self {
        self.fail_drains = true;
        self
    }

    /// Makes every subscribe call fail.
    pub fn failing_subscribe(mut self) -> Self {
        self.fail_subscribe = true;
        self
    }

    /// Delivers `batch` to the current subscriber of `identity`.
    ///
    /// The returned receiver resolves once the batch has been handled.
    pub async fn push(&self, identity: &Identity, batch: Batch) -> oneshot::Receiver<()> {
        let sender = self
            .senders
            .lock()
            .unwrap()
            .get(identity)
            .cloned()
            .expect("identity is subscribed");
        let (receipt, settled) = Receipt::pair();
        sender
            .send(Notification { batch, receipt })
            .await
            .expect("subscriber is listening");
        settled
    }

    /// Every subscription made so far, oldest first.
    pub fn subscriptions(&self) -> Vec<(Identity, CancellationToken)> {
        self.subscriptions.lock().unwrap().clone()
    }

    /// Every successful drain, in order.
    pub fn drains(&self) -> Vec<(Identity, BufferEntry)> {
        self.drains.lock().unwrap().clone()
    }
}

impl RemoteSource for ScriptedSource {
    fn subscribe(&self, identity: &Identity) -> Result<BatchStream, SourceError> {
        if self.fail_subscribe {
            return Err(SourceError::Subscribe {
                identity: identity.clone(),
                reason: "offline".to_string(),
            });
        }

        let (tx, rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        self.senders.lock().unwrap().insert(identity.clone(), tx);
        self.subscriptions
            .lock()
            .unwrap()
            .push((identity.clone(), cancel.clone()));

        Ok(BatchStream {
            notifications: rx,
            cancel,
        })
    }

    async fn drain(&self, identity: &Identity, last: &BufferEntry) -> Result<(), SourceError> {
        if self.fail_drains {
            return Err(SourceError::DrainFailed {
                identity: identity.clone(),
                reason: "permission denied".to_string(),
            });
        }
        self.drains
            .lock()
            .unwrap()
            .push((identity.clone(), last.clone()));
        Ok(())
    }
}
