//! Test utilities for tether_core
//!
//! Shared testing infrastructure: a mock transport that records the
//! requests the core hands it, and a recording view that captures
//! notification fan-out. Both are cloneable handles over shared interior
//! state so a test can keep an inspection handle after boxing.

use std::cell::RefCell;
use std::rc::Rc;

use sha2::{Digest, Sha256};

use crate::change::Change;
use crate::location::Location;
use crate::status::FileStatus;
use crate::transport::{FileTransport, SaveRequest, TransportEvent};
use crate::views::FileView;

/// SHA-256 hex digest helper for expected-checksum assertions.
pub fn sha256_hex(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}

/// A request the core issued to its transport.
#[derive(Debug, Clone)]
pub enum TransportRequest {
    /// `request_open` for a location.
    Open(Location),
    /// `request_save` with the full request.
    Save(SaveRequest),
    /// `request_close`.
    Close,
}

/// A transport double that records every request.
///
/// Tests drive completions themselves, either by calling
/// `FileEntity::deliver` directly or by posting [`TransportEvent`]s through
/// a gate handle.
#[derive(Clone, Default)]
pub struct MockTransport {
    requests: Rc<RefCell<Vec<TransportRequest>>>,
}

impl MockTransport {
    /// Create an idle mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// A boxed clone sharing this mock's request record.
    pub fn boxed(&self) -> Box<dyn FileTransport> {
        Box::new(self.clone())
    }

    /// Every request issued so far, in order.
    pub fn requests(&self) -> Vec<TransportRequest> {
        self.requests.borrow().clone()
    }

    /// The most recent save request, if any.
    pub fn last_save(&self) -> Option<SaveRequest> {
        self.requests
            .borrow()
            .iter()
            .rev()
            .find_map(|r| match r {
                TransportRequest::Save(req) => Some(req.clone()),
                _ => None,
            })
    }

    /// Whether `request_close` has been issued.
    pub fn close_requested(&self) -> bool {
        self.requests
            .borrow()
            .iter()
            .any(|r| matches!(r, TransportRequest::Close))
    }
}

impl FileTransport for MockTransport {
    fn request_open(&self, location: &Location) {
        self.requests
            .borrow_mut()
            .push(TransportRequest::Open(location.clone()));
    }

    fn request_save(&self, request: SaveRequest) {
        self.requests
            .borrow_mut()
            .push(TransportRequest::Save(request));
    }

    fn request_close(&self) {
        self.requests.borrow_mut().push(TransportRequest::Close);
    }
}

/// A view double that records everything it is told.
#[derive(Default)]
pub struct RecordingView {
    statuses: RefCell<Vec<FileStatus>>,
    changes: RefCell<Vec<Change>>,
    progress: RefCell<Vec<u8>>,
    closed: RefCell<u32>,
}

impl RecordingView {
    /// Create a recording view behind an `Rc` so it can be attached.
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Statuses seen, in order.
    pub fn statuses(&self) -> Vec<FileStatus> {
        self.statuses.borrow().clone()
    }

    /// Content changes seen, in order.
    pub fn changes(&self) -> Vec<Change> {
        self.changes.borrow().clone()
    }

    /// Progress percentages seen, in order.
    pub fn progress(&self) -> Vec<u8> {
        self.progress.borrow().clone()
    }

    /// How many times `file_closed` was delivered.
    pub fn closed_count(&self) -> u32 {
        *self.closed.borrow()
    }
}

impl FileView for RecordingView {
    fn status_changed(&self, status: FileStatus) {
        self.statuses.borrow_mut().push(status);
    }

    fn content_changed(&self, change: &Change) {
        self.changes.borrow_mut().push(change.clone());
    }

    fn open_progress(&self, percent: u8) {
        self.progress.borrow_mut().push(percent);
    }

    fn file_closed(&self) {
        *self.closed.borrow_mut() += 1;
    }
}
