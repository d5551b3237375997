//! The file entity: one open document and its synchronization state.
//!
//! A [`FileEntity`] owns the document content, the change log of
//! unacknowledged edits, and the connection/sync state machine. It is
//! strictly single-writer: every mutation runs on the mutation thread the
//! entity was created on, and transport completions reach it only through
//! the [`DeliveryGate`](crate::dispatch::DeliveryGate).

use std::rc::Rc;
use std::thread::{self, ThreadId};

use crate::change::{Change, ChangeLog};
use crate::document::{canonicalize, Document};
use crate::error::{Result, TetherError};
use crate::location::Location;
use crate::status::FileStatus;
use crate::transport::{FileTransport, SavePayload, SaveRequest, TransportEvent};
use crate::views::{FileView, ViewAttachments};

/// A save handed to the transport and not yet acknowledged.
#[derive(Debug, Clone)]
struct PendingSave {
    revision: u64,
    expected_checksum: String,
}

/// One in-memory representative of a remote document.
///
/// Created by the [`OpenFileRegistry`](crate::registry::OpenFileRegistry),
/// which guarantees at most one entity per normalized location. Destroyed
/// only after the status reaches [`FileStatus::Closed`] and the registry
/// deregisters it.
pub struct FileEntity {
    location: Location,
    document: Document,
    change_log: ChangeLog,
    views: ViewAttachments,
    transport: Box<dyn FileTransport>,

    status: FileStatus,
    error: Option<String>,
    loading_percent: u8,

    /// Monotonic counter, incremented once per accepted tracked edit.
    revision: u64,
    /// Highest revision the remote has durably confirmed.
    last_acked_revision: u64,
    /// Checksum of the content at the last acknowledged boundary; what the
    /// reconnect handshake compares the remote's report against.
    last_acked_checksum: String,
    /// Whether the remote holds an acknowledged baseline deltas can be
    /// applied against. False until the first load (or repair) completes.
    has_baseline: bool,

    pending_save: Option<PendingSave>,
    owner_thread: ThreadId,
}

impl FileEntity {
    /// Create an entity for `location`, bound to the calling thread as its
    /// mutation thread.
    pub fn new(location: Location, transport: Box<dyn FileTransport>) -> Self {
        Self {
            location,
            document: Document::new(),
            change_log: ChangeLog::new(),
            views: ViewAttachments::new(),
            transport,
            status: FileStatus::Closed,
            error: None,
            loading_percent: 0,
            revision: 0,
            last_acked_revision: 0,
            last_acked_checksum: String::new(),
            has_baseline: false,
            pending_save: None,
            owner_thread: thread::current().id(),
        }
    }

    fn assert_mutation_thread(&self) {
        assert_eq!(
            thread::current().id(),
            self.owner_thread,
            "FileEntity for {} touched off the mutation thread",
            self.location
        );
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// The immutable identity of this file.
    pub fn location(&self) -> &Location {
        &self.location
    }

    /// Current connection/sync status.
    pub fn status(&self) -> FileStatus {
        self.status
    }

    /// Message for the most recent failure, if any.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// The current content (normalized line endings).
    pub fn content(&self) -> &str {
        self.document.content()
    }

    /// Whether the content differs from the last acknowledged save.
    pub fn is_dirty(&self) -> bool {
        self.document.is_dirty()
    }

    /// Current local revision.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Highest remotely confirmed revision.
    pub fn last_acked_revision(&self) -> u64 {
        self.last_acked_revision
    }

    /// The buffered, unacknowledged change suffix.
    pub fn change_log(&self) -> &ChangeLog {
        &self.change_log
    }

    /// Checksum of the full current content, hex lower-cased.
    pub fn checksum(&self) -> String {
        self.document.checksum()
    }

    /// Loading progress, 0–100. Meaningful while [`FileStatus::Loading`].
    pub fn loading_percent(&self) -> u8 {
        self.loading_percent
    }

    // =========================================================================
    // View attachment
    // =========================================================================

    /// Attach a view. Call only from the view's own construction.
    pub fn attach_view(&mut self, view: &Rc<dyn FileView>) {
        self.assert_mutation_thread();
        self.views.attach(view);
    }

    /// Detach a view. Call only from the view's own teardown.
    pub fn detach_view(&mut self, view: &Rc<dyn FileView>) {
        self.assert_mutation_thread();
        self.views.detach(view);
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Request the transport to retrieve content. `Closed → Loading`.
    pub fn open(&mut self) -> Result<()> {
        self.assert_mutation_thread();
        if self.status != FileStatus::Closed {
            return Err(TetherError::AlreadyOpen {
                status: self.status,
            });
        }

        self.set_status(FileStatus::Loading);
        self.transport.request_open(&self.location);
        Ok(())
    }

    /// Begin an empty document that does not yet exist on the remote.
    ///
    /// `Closed → Ready` with no acknowledged baseline, so the first save
    /// hands the transport the full content rather than a delta suffix.
    pub fn open_new(&mut self) -> Result<()> {
        self.assert_mutation_thread();
        if self.status != FileStatus::Closed {
            return Err(TetherError::AlreadyOpen {
                status: self.status,
            });
        }

        self.revision = 0;
        self.last_acked_revision = 0;
        self.last_acked_checksum.clear();
        self.change_log.clear();
        self.pending_save = None;
        self.has_baseline = false;
        self.set_status(FileStatus::Ready);
        Ok(())
    }

    /// Apply a local edit: the single entry point for any content mutation
    /// regardless of origin (keystroke, undo/redo, programmatic
    /// replacement).
    ///
    /// The inserted text is canonicalized before the splice and before
    /// recording, so the change log holds the same bytes for every editing
    /// surface. While tracking is suppressed the splice still happens but
    /// no revision is allocated and no change is recorded.
    pub fn apply_local_edit(
        &mut self,
        position: usize,
        remove_count: usize,
        surface_text: &str,
    ) -> Result<()> {
        self.assert_mutation_thread();
        if !self.status.accepts_edits() {
            return Err(TetherError::EditRejected {
                status: self.status,
            });
        }

        let inserted = canonicalize(surface_text);
        self.document.splice(position, remove_count, &inserted);

        if self.document.tracking_suppressed() {
            return Ok(());
        }

        self.revision += 1;
        let change = self
            .change_log
            .record(self.revision, position, remove_count, inserted)
            .clone();
        self.views.notify(|v| v.content_changed(&change));
        Ok(())
    }

    /// Hand the transport everything needed to persist the current state.
    ///
    /// Valid only from `Ready`. Sends the full content when the remote
    /// holds no acknowledged baseline, otherwise the buffered change suffix
    /// since the last acknowledged revision. Returns immediately;
    /// completion arrives as [`TransportEvent::SaveAcked`] or
    /// [`TransportEvent::SaveFailed`].
    pub fn save(&mut self) -> Result<()> {
        self.assert_mutation_thread();
        if self.status != FileStatus::Ready {
            return Err(TetherError::NotReady {
                status: self.status,
            });
        }

        if self.has_baseline && self.revision == self.last_acked_revision {
            log::debug!("Nothing to save for {}", self.location);
            return Ok(());
        }

        if self.has_baseline {
            self.dispatch_delta_save();
        } else {
            self.dispatch_full_save();
        }
        Ok(())
    }

    /// Request closure. Any state → `Closing`.
    ///
    /// With a save in flight and `force == false`, teardown is deferred
    /// until that save's acknowledgement (or failure) has been processed,
    /// so the change log can still be pruned correctly. `force == true`
    /// abandons the wait and discards the unacknowledged buffer — a
    /// deliberate data-loss path, never taken silently.
    pub fn close(&mut self, force: bool) {
        self.assert_mutation_thread();
        if matches!(self.status, FileStatus::Closing | FileStatus::Closed) {
            return;
        }

        self.set_status(FileStatus::Closing);

        if force {
            if !self.change_log.is_empty() {
                log::warn!(
                    "Force-closing {} discards {} unacknowledged changes ({} bytes)",
                    self.location,
                    self.change_log.len(),
                    self.change_log.size_bytes()
                );
            }
            self.change_log.clear();
            self.pending_save = None;
            self.transport.request_close();
        } else if self.pending_save.is_some() {
            log::debug!(
                "Deferring close of {} until the in-flight save completes",
                self.location
            );
        } else {
            self.transport.request_close();
        }
    }

    /// Begin full-content reconciliation after divergence.
    /// `LostSync → Repairing`. The reconciliation itself is the
    /// transport/merge policy's job; completion arrives as
    /// [`TransportEvent::RepairComplete`] or
    /// [`TransportEvent::RepairFailed`].
    pub fn begin_repair(&mut self) {
        self.assert_mutation_thread();
        if self.status != FileStatus::LostSync {
            log::warn!(
                "Ignoring repair request for {} in status {}",
                self.location,
                self.status
            );
            return;
        }
        self.set_status(FileStatus::Repairing);
    }

    // =========================================================================
    // Transport event delivery
    // =========================================================================

    /// Handle one transport event. Called by the delivery gate's pump; may
    /// also be called directly, but only ever on the mutation thread.
    pub fn deliver(&mut self, event: TransportEvent) {
        self.assert_mutation_thread();
        match event {
            TransportEvent::ContentLoaded(raw) => self.on_content_loaded(&raw),
            TransportEvent::LoadFailed(message) => self.on_load_failed(message),
            TransportEvent::OpenProgress(percent) => self.on_open_progress(percent),
            TransportEvent::ConnectionLost => self.on_connection_lost(),
            TransportEvent::ConnectionRestored => self.on_connection_restored(),
            TransportEvent::HandshakeResult { revision, checksum } => {
                self.on_handshake_result(revision, &checksum)
            }
            TransportEvent::SaveAcked { revision, checksum } => {
                self.on_save_acked(revision, &checksum)
            }
            TransportEvent::SaveFailed(message) => self.on_save_failed(message),
            TransportEvent::RepairComplete(raw) => self.on_repair_complete(&raw),
            TransportEvent::RepairFailed(message) => self.on_repair_failed(message),
            TransportEvent::CloseCompleted => self.on_close_completed(),
        }
    }

    fn on_content_loaded(&mut self, raw: &[u8]) {
        if self.status != FileStatus::Loading {
            log::warn!(
                "Ignoring content delivery for {} in status {}",
                self.location,
                self.status
            );
            return;
        }

        if let Err(e) = self.document.load(raw) {
            self.error = Some(e.to_string());
            self.set_status(FileStatus::LoadError);
            return;
        }

        self.reset_revisions_to_loaded_content();
        log::info!(
            "Loaded {} ({} bytes)",
            self.location,
            self.document.content().len()
        );
        self.set_status(FileStatus::Ready);
    }

    fn on_load_failed(&mut self, message: String) {
        if self.status != FileStatus::Loading {
            log::warn!(
                "Ignoring load failure for {} in status {}",
                self.location,
                self.status
            );
            return;
        }
        log::warn!("Failed to load {}: {}", self.location, message);
        self.error = Some(message);
        self.set_status(FileStatus::LoadError);
    }

    fn on_open_progress(&mut self, percent: u8) {
        self.loading_percent = percent;
        self.views.notify(|v| v.open_progress(percent));
    }

    fn on_connection_lost(&mut self) {
        if !matches!(
            self.status,
            FileStatus::Ready | FileStatus::Reconnecting
        ) {
            return;
        }
        // Buffered changes stay untouched: a disconnect never drops edits.
        log::info!(
            "Connection lost for {} ({} changes buffered)",
            self.location,
            self.change_log.len()
        );
        self.set_status(FileStatus::Disconnected);
    }

    fn on_connection_restored(&mut self) {
        if self.status != FileStatus::Disconnected {
            return;
        }
        self.set_status(FileStatus::Reconnecting);
    }

    fn on_handshake_result(&mut self, remote_revision: u64, remote_checksum: &str) {
        if self.status != FileStatus::Reconnecting {
            log::warn!(
                "Ignoring handshake result for {} in status {}",
                self.location,
                self.status
            );
            return;
        }

        if remote_revision == self.last_acked_revision
            && remote_checksum == self.last_acked_checksum
        {
            self.set_status(FileStatus::Ready);
            if !self.change_log.is_empty() {
                log::info!(
                    "Reconnected {}; replaying {} buffered changes",
                    self.location,
                    self.change_log.len()
                );
                self.dispatch_delta_save();
            }
        } else {
            log::warn!(
                "Handshake divergence for {}: remote at revision {}, local ack at {}",
                self.location,
                remote_revision,
                self.last_acked_revision
            );
            self.set_status(FileStatus::LostSync);
        }
    }

    fn on_save_acked(&mut self, revision: u64, checksum: &str) {
        // An ack answering the in-flight save is never stale, even at
        // revision 0 (the full-content save of an unedited new file).
        let covers_pending =
            matches!(&self.pending_save, Some(p) if p.revision == revision);
        if !covers_pending && revision <= self.last_acked_revision {
            // Duplicate or reordered ack; applying it would regress.
            log::debug!(
                "Ignoring stale save ack for {} at revision {} (already at {})",
                self.location,
                revision,
                self.last_acked_revision
            );
            return;
        }

        let verified = match &self.pending_save {
            Some(pending) if pending.revision == revision => {
                checksum == pending.expected_checksum
            }
            // No matching in-flight record: verifiable only against the
            // current content, and only if the ack covers it entirely.
            _ => revision == self.revision && checksum == self.document.checksum(),
        };

        if !verified {
            log::warn!(
                "Checksum mismatch on save ack for {} at revision {}; treating as lost sync",
                self.location,
                revision
            );
            self.pending_save = None;
            if self.status == FileStatus::Closing {
                // Closing anyway; nothing left to reconcile against.
                self.transport.request_close();
            } else {
                self.set_status(FileStatus::LostSync);
            }
            return;
        }

        self.last_acked_revision = revision;
        self.last_acked_checksum = checksum.to_string();
        self.has_baseline = true;
        self.change_log.prune_up_to(revision);
        self.pending_save = None;
        if revision == self.revision {
            self.document.set_dirty(false);
        }
        log::info!(
            "Finished saving {} at revision {}",
            self.location.label(),
            revision
        );

        if self.status == FileStatus::Closing {
            self.transport.request_close();
        }
    }

    fn on_save_failed(&mut self, message: String) {
        // Recoverable: buffered changes are retained untouched for retry.
        log::warn!("Failed to save {}: {}", self.location, message);
        self.error = Some(message);
        self.pending_save = None;

        if self.status == FileStatus::Closing {
            self.transport.request_close();
        }
    }

    fn on_repair_complete(&mut self, raw: &[u8]) {
        if !matches!(self.status, FileStatus::LostSync | FileStatus::Repairing) {
            log::warn!(
                "Ignoring repair completion for {} in status {}",
                self.location,
                self.status
            );
            return;
        }

        if let Err(e) = self.document.load(raw) {
            self.error = Some(e.to_string());
            self.set_status(FileStatus::SyncError);
            return;
        }

        // Both sides agree on this content; restart delta replay from it.
        self.reset_revisions_to_loaded_content();
        log::info!("Repaired {} to an agreed baseline", self.location);
        self.set_status(FileStatus::Ready);
    }

    fn on_repair_failed(&mut self, message: String) {
        if !matches!(self.status, FileStatus::LostSync | FileStatus::Repairing) {
            return;
        }
        log::warn!("Repair failed for {}: {}", self.location, message);
        self.error = Some(message);
        self.set_status(FileStatus::SyncError);
    }

    fn on_close_completed(&mut self) {
        if self.status != FileStatus::Closing {
            log::warn!(
                "Close completed for {} in status {}",
                self.location,
                self.status
            );
        }
        self.set_status(FileStatus::Closed);
        // Views hear about closure exactly once, before the registry
        // deregisters the entity and drops it.
        self.views.notify(|v| v.file_closed());
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn set_status(&mut self, status: FileStatus) {
        if self.status == status {
            return;
        }
        log::debug!("{} status: {} -> {}", self.location, self.status, status);
        self.status = status;
        self.views.notify(|v| v.status_changed(status));
    }

    /// Establish a fresh acknowledged baseline from just-loaded content.
    fn reset_revisions_to_loaded_content(&mut self) {
        self.revision = 0;
        self.last_acked_revision = 0;
        self.last_acked_checksum = self.document.checksum();
        self.change_log.clear();
        self.pending_save = None;
        self.has_baseline = true;
        self.loading_percent = 100;
    }

    fn dispatch_full_save(&mut self) {
        let expected_checksum = self.document.checksum();
        self.pending_save = Some(PendingSave {
            revision: self.revision,
            expected_checksum: expected_checksum.clone(),
        });
        self.transport.request_save(SaveRequest {
            revision: self.revision,
            expected_checksum,
            payload: SavePayload::Full {
                content: self.document.content().to_string(),
            },
        });
    }

    fn dispatch_delta_save(&mut self) {
        let expected_checksum = self.document.checksum();
        self.pending_save = Some(PendingSave {
            revision: self.revision,
            expected_checksum: expected_checksum.clone(),
        });
        self.transport.request_save(SaveRequest {
            revision: self.revision,
            expected_checksum,
            payload: SavePayload::Deltas {
                base_revision: self.last_acked_revision,
                changes: self.change_log.changes().to_vec(),
            },
        });
    }
}
