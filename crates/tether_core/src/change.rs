//! Revisioned edit deltas and the change log.
//!
//! Every accepted local edit becomes a [`Change`] tagged with the revision
//! it produced. The [`ChangeLog`] buffers exactly the suffix of changes the
//! remote has not yet durably acknowledged, so a reconnect only needs to
//! replay what the remote is missing instead of retransmitting the whole
//! document.

use serde::{Deserialize, Serialize};

/// A single recorded edit delta.
///
/// `position` is a byte offset into the content as it existed immediately
/// before the edit. The inserted text is stored in canonical form (see
/// [`canonicalize`]), so replaying a log is stable across editing surfaces.
///
/// Immutable once created; owned by the entity's change log until pruned.
///
/// [`canonicalize`]: crate::document::canonicalize
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    /// The revision this edit produced.
    pub revision: u64,
    /// Byte offset of the edit at apply time.
    pub position: usize,
    /// Number of bytes removed.
    pub remove_count: usize,
    /// Canonicalized inserted text.
    pub inserted: String,
}

/// The buffered, prunable sequence of unacknowledged changes.
///
/// Invariant: changes are held in ascending revision order with no gaps,
/// and the log contains exactly the changes with revision greater than the
/// owning entity's last acknowledged revision.
#[derive(Debug, Default)]
pub struct ChangeLog {
    changes: Vec<Change>,
    /// Running total of buffered inserted bytes, cached so backpressure
    /// checks don't rescan the log.
    size_bytes: usize,
}

impl ChangeLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a change for `revision`.
    ///
    /// Panics if `revision` does not extend the logged sequence — a gap
    /// here means revision numbering has already gone wrong.
    pub fn record(
        &mut self,
        revision: u64,
        position: usize,
        remove_count: usize,
        inserted: String,
    ) -> &Change {
        if let Some(last) = self.changes.last() {
            assert_eq!(
                revision,
                last.revision + 1,
                "change log gap: recording revision {} after {}",
                revision,
                last.revision
            );
        }

        self.size_bytes += inserted.len();
        self.changes.push(Change {
            revision,
            position,
            remove_count,
            inserted,
        });
        self.changes.last().unwrap()
    }

    /// Drop every change with `revision <= acked_revision`.
    ///
    /// Called only when the remote has durably confirmed up to that
    /// revision. Idempotent: pruning the same revision twice is a no-op and
    /// the byte counter never goes negative.
    pub fn prune_up_to(&mut self, acked_revision: u64) {
        let keep_from = self
            .changes
            .iter()
            .position(|c| c.revision > acked_revision)
            .unwrap_or(self.changes.len());

        for change in self.changes.drain(..keep_from) {
            self.size_bytes = self.size_bytes.saturating_sub(change.inserted.len());
        }

        if keep_from > 0 {
            log::debug!(
                "Pruned change log up to revision {} ({} changes remain, {} bytes buffered)",
                acked_revision,
                self.changes.len(),
                self.size_bytes
            );
        }
    }

    /// Discard every buffered change.
    ///
    /// Only valid on a confirmed sync repair or an explicit force-close;
    /// anywhere else this is the data-loss path the rest of the crate
    /// exists to prevent.
    pub fn clear(&mut self) {
        self.changes.clear();
        self.size_bytes = 0;
    }

    /// Current buffered payload size in bytes.
    ///
    /// Advisory only: consumers use this to flag an oversized backlog (for
    /// example, warning that a resync will be expensive). No hard cap is
    /// enforced here.
    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }

    /// The buffered changes, ascending by revision.
    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    /// Lowest buffered revision, if any.
    pub fn first_revision(&self) -> Option<u64> {
        self.changes.first().map(|c| c.revision)
    }

    /// Highest buffered revision, if any.
    pub fn last_revision(&self) -> Option<u64> {
        self.changes.last().map(|c| c.revision)
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Number of buffered changes.
    pub fn len(&self) -> usize {
        self.changes.len()
    }
}
