//! Host collaborator seams.
//!
//! The engine never touches host state directly. It reads attributes through
//! a [`DataAccessor`], hands chat lines to an [`Announcer`] and leaves writes
//! to an [`UpdateSink`]. In-memory implementations are provided for hosts
//! that keep their documents as JSON and for tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Mutex;
use thiserror::Error;

// ============================================================================
// Identity
// ============================================================================

/// Identifier of a token/actor in the host.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TargetId(pub String);

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TargetId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for TargetId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Identifier of a host user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub String);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// The user applying damage or healing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActingUser {
    pub id: UserId,
    /// Game masters own every target.
    pub is_gm: bool,
}

impl ActingUser {
    pub fn gm(id: impl Into<UserId>) -> Self {
        Self {
            id: id.into(),
            is_gm: true,
        }
    }

    pub fn player(id: impl Into<UserId>) -> Self {
        Self {
            id: id.into(),
            is_gm: false,
        }
    }
}

/// A token the user selected or targeted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub id: TargetId,
    pub name: String,
    pub owners: BTreeSet<UserId>,
    /// Opaque actor data, read through a [`DataAccessor`].
    pub data: Value,
}

impl Target {
    pub fn new(id: impl Into<TargetId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            owners: BTreeSet::new(),
            data: Value::Object(Default::default()),
        }
    }

    pub fn with_owner(mut self, owner: impl Into<UserId>) -> Self {
        self.owners.insert(owner.into());
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    /// Set a value at a dotted path, creating intermediate objects.
    pub fn with_attribute(mut self, path: &str, value: impl Into<Value>) -> Self {
        set_path(&mut self.data, path, value.into());
        self
    }

    /// Write committed attribute values back into the target's data.
    pub fn apply_updates(&mut self, updates: &AttributeUpdates) {
        for (path, value) in updates {
            set_path(&mut self.data, path, Value::from(*value));
        }
    }

    pub fn is_owned_by(&self, user: &ActingUser) -> bool {
        user.is_gm || self.owners.contains(&user.id)
    }
}

// ============================================================================
// Data access
// ============================================================================

/// Dotted-path attribute reads.
pub trait DataAccessor: Send + Sync {
    /// Numeric value at `path`, or `None` when the path is absent or not a number.
    fn read(&self, target: &Target, path: &str) -> Option<f64>;
}

/// Reads from the target's JSON data. Numeric strings are accepted.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonDataAccessor;

impl DataAccessor for JsonDataAccessor {
    fn read(&self, target: &Target, path: &str) -> Option<f64> {
        match lookup_path(&target.data, path)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
        .filter(|v| v.is_finite())
    }
}

/// Look up a dotted path (`attributes.hp.value`) in a JSON value.
pub fn lookup_path<'v>(value: &'v Value, path: &str) -> Option<&'v Value> {
    let path = path.trim();
    if path.is_empty() {
        return None;
    }
    path.split('.')
        .try_fold(value, |node, segment| node.as_object()?.get(segment))
}

fn set_path(root: &mut Value, path: &str, value: Value) {
    let mut node = root;
    let mut segments = path.split('.').peekable();
    while let Some(segment) = segments.next() {
        if !node.is_object() {
            *node = Value::Object(Default::default());
        }
        let Value::Object(map) = node else {
            return;
        };
        if segments.peek().is_none() {
            map.insert(segment.to_string(), value);
            return;
        }
        node = map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Default::default()));
    }
}

// ============================================================================
// Chat
// ============================================================================

/// Audience of a chat line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Whisper {
    Everyone,
    Gm,
}

/// Shared chat log. Fire-and-forget: failures stay inside the implementation.
pub trait Announcer: Send + Sync {
    fn announce(&self, message: &str, target: &TargetId, whisper: Whisper);
}

/// A recorded chat line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatEntry {
    pub target: TargetId,
    pub message: String,
    pub whisper: Whisper,
}

/// In-memory announcer.
#[derive(Debug, Default)]
pub struct ChatLog {
    entries: Mutex<Vec<ChatEntry>>,
}

impl ChatLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<ChatEntry> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    pub fn messages_for(&self, target: &TargetId) -> Vec<ChatEntry> {
        self.entries()
            .into_iter()
            .filter(|e| &e.target == target)
            .collect()
    }
}

impl Announcer for ChatLog {
    fn announce(&self, message: &str, target: &TargetId, whisper: Whisper) {
        match self.entries.lock() {
            Ok(mut entries) => entries.push(ChatEntry {
                target: target.clone(),
                message: message.to_string(),
                whisper,
            }),
            Err(_) => tracing::warn!(target_id = %target, "chat log poisoned, dropping message"),
        }
    }
}

// ============================================================================
// Persistence
// ============================================================================

/// Attribute path to new value.
pub type AttributeUpdates = BTreeMap<String, f64>;

/// Errors from the host's update sink.
#[derive(Debug, Clone, Error)]
pub enum PersistenceFailure {
    #[error("Update rejected for {target}: {reason}")]
    Rejected { target: TargetId, reason: String },

    #[error("Permission denied writing {0}")]
    PermissionDenied(TargetId),
}

/// Applies attribute writes to host documents.
#[async_trait]
pub trait UpdateSink: Send + Sync {
    async fn commit(
        &self,
        target: &TargetId,
        updates: &AttributeUpdates,
    ) -> Result<(), PersistenceFailure>;
}

/// Records commits in memory.
#[derive(Debug, Default)]
pub struct MemoryUpdateSink {
    commits: tokio::sync::Mutex<Vec<(TargetId, AttributeUpdates)>>,
}

impl MemoryUpdateSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn commits(&self) -> Vec<(TargetId, AttributeUpdates)> {
        self.commits.lock().await.clone()
    }

    /// The most recent value written to `path` on `target`.
    pub async fn latest(&self, target: &TargetId, path: &str) -> Option<f64> {
        self.commits
            .lock()
            .await
            .iter()
            .rev()
            .filter(|(id, _)| id == target)
            .find_map(|(_, updates)| updates.get(path).copied())
    }
}

#[async_trait]
impl UpdateSink for MemoryUpdateSink {
    async fn commit(
        &self,
        target: &TargetId,
        updates: &AttributeUpdates,
    ) -> Result<(), PersistenceFailure> {
        self.commits
            .lock()
            .await
            .push((target.clone(), updates.clone()));
        Ok(())
    }
}
