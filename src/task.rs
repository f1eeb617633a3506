//! Units of work and the diagnostics attached to them.
//!
//! Every submission carries a [`TaskInfo`]: an explicit label naming the
//! operation plus an ordered list of [`KeyValue`] pairs. Neither is interpreted
//! by the run loop; both are handed unchanged to the watchdog's timeout report
//! and to panic logs.
//!
//! ```ignore
//! use runloop::{RunLoop, TaskInfo};
//!
//! let rl = RunLoop::new();
//! rl.spawn(TaskInfo::new("flush").with("shard", "3"), || flush_shard(3));
//! rl.spawn("tick", || tick());
//! ```

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use crossbeam::channel::Sender;

/// A diagnostic key/value pair.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
}

impl KeyValue {
    /// Creates a pair from anything convertible into strings.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

impl<K: Into<String>, V: Into<String>> From<(K, V)> for KeyValue {
    fn from((key, value): (K, V)) -> Self {
        Self::new(key, value)
    }
}

/// Label and diagnostics describing a submitted operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskInfo {
    label: Cow<'static, str>,
    pairs: Vec<KeyValue>,
}

impl TaskInfo {
    /// Creates info for an operation named `label`, with no pairs.
    pub fn new(label: impl Into<Cow<'static, str>>) -> Self {
        Self {
            label: label.into(),
            pairs: Vec::new(),
        }
    }

    /// Appends a diagnostic pair. Order is preserved.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.pairs.push(KeyValue::new(key, value));
        self
    }

    /// Appends every pair of `pairs`, in order.
    pub fn with_pairs<I>(mut self, pairs: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<KeyValue>,
    {
        self.pairs.extend(pairs.into_iter().map(Into::into));
        self
    }

    /// Name of the operation, as reported on timeout or panic.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Diagnostic pairs, in the order they were added.
    pub fn pairs(&self) -> &[KeyValue] {
        &self.pairs
    }
}

impl fmt::Display for TaskInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)?;
        for pair in &self.pairs {
            write!(f, " {pair}")?;
        }
        Ok(())
    }
}

impl From<&'static str> for TaskInfo {
    fn from(label: &'static str) -> Self {
        Self::new(label)
    }
}

impl From<String> for TaskInfo {
    fn from(label: String) -> Self {
        Self::new(label)
    }
}

/// A queued unit of work.
///
/// Owned by its queue until dequeued, then by the consumer thread for the
/// duration of its execution; dropped afterwards.
pub(crate) struct Task {
    pub(crate) op: Box<dyn FnOnce() + Send + 'static>,
    pub(crate) info: Arc<TaskInfo>,
    /// Released once the loop has finished all bookkeeping for the task.
    /// Dropping it unsent tells a synchronous caller the task never completed.
    pub(crate) completion: Option<Sender<()>>,
}

impl Task {
    pub(crate) fn new<F>(info: TaskInfo, op: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            op: Box::new(op),
            info: Arc::new(info),
            completion: None,
        }
    }

    pub(crate) fn with_completion(mut self, completion: Sender<()>) -> Self {
        self.completion = Some(completion);
        self
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("info", &self.info)
            .field("sync", &self.completion.is_some())
            .finish_non_exhaustive()
    }
}
