//! Incremental state reporting.
//!
//! Strategies report progress through an optional callback taking a state name
//! and a metadata mapping. Callbacks run on the extraction thread and must be
//! cheap.

use crate::types::Metadata;
use serde_json::json;
use std::sync::Arc;

pub const PROGRESS: &str = "PROGRESS";
pub const SUCCESS: &str = "SUCCESS";
pub const FAILURE: &str = "FAILURE";

/// Callback receiving `(state, meta)`.
pub type StateCallback = Arc<dyn Fn(&str, &Metadata) + Send + Sync>;

/// Owned copy of one state report.
#[derive(Debug, Clone, PartialEq)]
pub struct StateUpdate {
    pub state: String,
    pub meta: Metadata,
}

impl StateUpdate {
    pub fn is_terminal(&self) -> bool {
        self.state == SUCCESS || self.state == FAILURE
    }
}

/// Wrap a closure as a [`StateCallback`].
pub fn state_callback<F>(f: F) -> StateCallback
where
    F: Fn(&str, &Metadata) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Standard progress payload: a status line plus `current`/`total` counters.
pub fn progress_meta(status: impl Into<String>, current: usize, total: usize) -> Metadata {
    let mut meta = Metadata::new();
    meta.insert("status".to_string(), json!(status.into()));
    meta.insert("current".to_string(), json!(current));
    meta.insert("total".to_string(), json!(total));
    meta
}

/// Callback that forwards every report into a tokio channel.
///
/// Sends never block; reports made after the receiver is dropped are discarded.
#[cfg(feature = "tokio-runtime")]
pub fn channel() -> (StateCallback, tokio::sync::mpsc::UnboundedReceiver<StateUpdate>) {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let callback = state_callback(move |state, meta| {
        let _ = tx.send(StateUpdate {
            state: state.to_string(),
            meta: meta.clone(),
        });
    });
    (callback, rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_progress_meta() {
        let meta = progress_meta("Processing page 1", 1, 3);
        assert_eq!(meta["status"], json!("Processing page 1"));
        assert_eq!(meta["current"], json!(1));
        assert_eq!(meta["total"], json!(3));
    }

    #[test]
    fn test_state_callback_collects() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback = state_callback(move |state, _meta| sink.lock().push(state.to_string()));

        callback(PROGRESS, &Metadata::new());
        callback(SUCCESS, &Metadata::new());

        assert_eq!(*seen.lock(), vec![PROGRESS.to_string(), SUCCESS.to_string()]);
    }

    #[cfg(feature = "tokio-runtime")]
    #[test]
    fn test_channel_forwards_updates() {
        let (callback, mut rx) = channel();
        callback(PROGRESS, &progress_meta("step", 1, 2));
        callback(FAILURE, &Metadata::new());

        let first = rx.try_recv().unwrap();
        assert_eq!(first.state, PROGRESS);
        assert!(!first.is_terminal());
        assert!(rx.try_recv().unwrap().is_terminal());
        assert!(rx.try_recv().is_err());
    }

    #[cfg(feature = "tokio-runtime")]
    #[test]
    fn test_channel_survives_dropped_receiver() {
        let (callback, rx) = channel();
        drop(rx);
        callback(PROGRESS, &Metadata::new());
    }
}
