//! Watch session events.
//!
//! Every session reports progress as a stream of [`WatchEvent`]s. A
//! `bundleStart`/`bundleEnd` pair brackets each rebuild; `error` reports a
//! failed pass without ending the session.
//!
//! Events serialize to one JSON object per line, tagged by `event`:
//!
//! ```json
//! {"event":"fileChanged","path":"source/index.ts","kind":"updated"}
//! ```

use std::path::PathBuf;

use serde::Serialize;

/// Kind of a source change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

impl ChangeKind {
    /// Past-tense verb for log lines.
    pub fn verb(&self) -> &'static str {
        match self {
            ChangeKind::Created => "added",
            ChangeKind::Updated => "changed",
            ChangeKind::Deleted => "removed",
        }
    }
}

/// An event of one watch session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum WatchEvent {
    /// The session is up.
    Started,

    /// A watched source file changed.
    FileChanged { path: PathBuf, kind: ChangeKind },

    /// A bundle pass began.
    BundleStart,

    /// A bundle pass finished and its output is written.
    #[serde(rename_all = "camelCase")]
    BundleEnd { duration_ms: u64 },

    /// A bundle pass failed. The session keeps watching.
    Error { cause: String },
}

impl WatchEvent {
    pub fn file_changed(path: impl Into<PathBuf>, kind: ChangeKind) -> Self {
        WatchEvent::FileChanged {
            path: path.into(),
            kind,
        }
    }

    pub fn error(cause: impl Into<String>) -> Self {
        WatchEvent::Error {
            cause: cause.into(),
        }
    }

    pub fn is_bundle_end(&self) -> bool {
        matches!(self, WatchEvent::BundleEnd { .. })
    }

    /// Serialize this event to a JSON string.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// A watch event tagged with the label of the target that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetEvent {
    pub target: String,
    #[serde(flatten)]
    pub event: WatchEvent,
}

impl TargetEvent {
    pub fn new(target: impl Into<String>, event: WatchEvent) -> Self {
        TargetEvent {
            target: target.into(),
            event,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_json() {
        assert_eq!(WatchEvent::Started.to_json(), r#"{"event":"started"}"#);
        assert_eq!(
            WatchEvent::BundleEnd { duration_ms: 12 }.to_json(),
            r#"{"event":"bundleEnd","durationMs":12}"#
        );
        assert_eq!(
            WatchEvent::file_changed("source/a.ts", ChangeKind::Deleted).to_json(),
            r#"{"event":"fileChanged","path":"source/a.ts","kind":"deleted"}"#
        );
    }

    #[test]
    fn test_target_event_json() {
        let event = TargetEvent::new("ui:main", WatchEvent::error("boom"));
        assert_eq!(
            serde_json::to_string(&event).unwrap(),
            r#"{"target":"ui:main","event":"error","cause":"boom"}"#
        );
    }
}
