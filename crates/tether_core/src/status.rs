//! Connection/sync status of an open file.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The connection and synchronization state of a [`FileEntity`].
///
/// Lifecycle: `Closed → Loading → {Ready | LoadError}`. From `Ready` the
/// link can drop (`Disconnected → Reconnecting`) and either recover cleanly
/// back to `Ready` or diverge into `LostSync → Repairing → {Ready |
/// SyncError}`. Any state may move to `Closing`, and `Closed` after a close
/// completes is terminal.
///
/// [`FileEntity`]: crate::file::FileEntity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    /// No content; not yet opened, or fully closed.
    Closed,
    /// Open requested, waiting for the transport to deliver content.
    Loading,
    /// The transport could not retrieve content. Inert until closed.
    LoadError,
    /// Content loaded and in sync with the remote as of the last ack.
    Ready,
    /// The link dropped. Buffered changes are retained untouched.
    Disconnected,
    /// The link is back and the reconnect handshake is in progress.
    Reconnecting,
    /// Handshake revealed divergence; delta replay can no longer be trusted.
    LostSync,
    /// A full-content reconciliation is in progress.
    Repairing,
    /// Reconciliation failed. Inert pending an explicit user decision.
    SyncError,
    /// Close requested; no further edits are accepted.
    Closing,
}

impl FileStatus {
    /// Human-readable label for display in a file list or status bar.
    pub fn description(&self) -> &'static str {
        match self {
            FileStatus::Closed => "Closed",
            FileStatus::Loading => "Loading...",
            FileStatus::LoadError => "Error while loading",
            FileStatus::Ready => "Ready",
            FileStatus::Disconnected => "Disconnected",
            FileStatus::Reconnecting => "Reconnecting...",
            FileStatus::LostSync => "Lost synchronization",
            FileStatus::Repairing => "Lost synchronization; repairing",
            FileStatus::SyncError => "Synchronization error",
            FileStatus::Closing => "Closing...",
        }
    }

    /// Whether local edits are accepted in this state.
    ///
    /// Edits are buffered while disconnected or reconnecting — that is the
    /// core guarantee — but refused once the content can no longer be
    /// trusted (lost sync, repair) or the file is going away.
    pub fn accepts_edits(&self) -> bool {
        matches!(
            self,
            FileStatus::Ready | FileStatus::Disconnected | FileStatus::Reconnecting
        )
    }

    /// Whether this is the terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, FileStatus::Closed)
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}
