//! The process-wide index of open files.
//!
//! Exactly one [`FileEntity`] may exist per normalized location; the
//! registry is what enforces that. It is an explicit value — created by the
//! host on the mutation thread before any entity, passed by reference to
//! whatever needs it, and torn down only after every entity has reached
//! `Closed`.

use std::cell::RefCell;
use std::rc::Rc;
use std::thread::{self, ThreadId};

use indexmap::IndexMap;

use crate::error::Result;
use crate::file::FileEntity;
use crate::location::Location;
use crate::status::FileStatus;
use crate::transport::FileTransport;

/// A shared handle to an open file entity.
pub type FileHandle = Rc<RefCell<FileEntity>>;

/// Outcome of a bulk close request.
#[derive(Debug, PartialEq, Eq)]
pub enum CloseOutcome {
    /// Every requested file is now `Closing`; completion arrives through
    /// the delivery gate as each transport finishes.
    Closing,
    /// Unforced close refused: these locations have unsaved changes and the
    /// caller must surface a confirmation decision before retrying with
    /// `force` or after saving.
    ConfirmationRequired(Vec<Location>),
}

/// Index from normalized location to its single in-memory entity.
///
/// Thread-confined: every method asserts it runs on the mutation thread the
/// registry was created on, since entity creation/destruction and registry
/// bookkeeping are not otherwise synchronized.
pub struct OpenFileRegistry {
    entries: RefCell<IndexMap<Location, FileHandle>>,
    owner_thread: ThreadId,
}

impl Default for OpenFileRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl OpenFileRegistry {
    /// Create an empty registry bound to the calling thread.
    pub fn new() -> Self {
        Self {
            entries: RefCell::new(IndexMap::new()),
            owner_thread: thread::current().id(),
        }
    }

    fn assert_mutation_thread(&self) {
        assert_eq!(
            thread::current().id(),
            self.owner_thread,
            "OpenFileRegistry touched off the mutation thread"
        );
    }

    /// Return the already-open entity for `location`, if any.
    ///
    /// Must be consulted before constructing a new entity, or the
    /// at-most-one-representative invariant is lost.
    pub fn resolve(&self, location: &Location) -> Option<FileHandle> {
        self.assert_mutation_thread();
        self.entries.borrow().get(location).cloned()
    }

    /// Resolve `location`, or create, register and open a new entity with
    /// the given transport.
    pub fn open(&self, location: Location, transport: Box<dyn FileTransport>) -> Result<FileHandle> {
        if let Some(existing) = self.resolve(&location) {
            return Ok(existing);
        }

        let entity = Rc::new(RefCell::new(FileEntity::new(location, transport)));
        self.register(entity.clone());
        entity.borrow_mut().open()?;
        Ok(entity)
    }

    /// Insert an entity under its normalized location key.
    ///
    /// Panics if the key is already present — a duplicate registration
    /// means two representatives of the same document exist, which is a
    /// programming error, not a recoverable condition.
    pub fn register(&self, entity: FileHandle) {
        self.assert_mutation_thread();
        let location = entity.borrow().location().clone();
        let previous = self.entries.borrow_mut().insert(location.clone(), entity);
        assert!(
            previous.is_none(),
            "duplicate registration for {}",
            location
        );
        log::debug!("Registered {} ({} files open)", location, self.len());
    }

    /// Remove an entity. Only valid once it has reached `Closed`.
    pub fn deregister(&self, entity: &FileHandle) {
        self.assert_mutation_thread();
        let entity_ref = entity.borrow();
        assert_eq!(
            entity_ref.status(),
            FileStatus::Closed,
            "deregistering {} before it closed",
            entity_ref.location()
        );
        self.entries.borrow_mut().shift_remove(entity_ref.location());
        log::debug!(
            "Deregistered {} ({} files open)",
            entity_ref.location(),
            self.len()
        );
    }

    /// All currently open files, in opening order.
    pub fn open_files(&self) -> Vec<FileHandle> {
        self.assert_mutation_thread();
        self.entries.borrow().values().cloned().collect()
    }

    /// Files whose content differs from the last acknowledged save.
    pub fn unsaved_files(&self) -> Vec<FileHandle> {
        self.assert_mutation_thread();
        self.entries
            .borrow()
            .values()
            .filter(|e| e.borrow().is_dirty())
            .cloned()
            .collect()
    }

    /// Whether any open file has unsaved changes.
    pub fn has_unsaved_changes(&self) -> bool {
        !self.unsaved_files().is_empty()
    }

    /// Close the given files.
    ///
    /// When `force` is false and any of them is dirty, nothing is closed
    /// and the dirty locations are returned for an external confirmation
    /// decision. Otherwise `close(force)` is issued on each; callers
    /// observe completion by pumping the delivery gate until the entities
    /// deregister.
    pub fn close_many(&self, files: &[FileHandle], force: bool) -> CloseOutcome {
        self.assert_mutation_thread();

        if !force {
            let dirty: Vec<Location> = files
                .iter()
                .filter(|e| e.borrow().is_dirty())
                .map(|e| e.borrow().location().clone())
                .collect();
            if !dirty.is_empty() {
                return CloseOutcome::ConfirmationRequired(dirty);
            }
        }

        for file in files {
            file.borrow_mut().close(force);
        }
        CloseOutcome::Closing
    }

    /// Close every open file.
    pub fn close_all(&self, force: bool) -> CloseOutcome {
        self.close_many(&self.open_files(), force)
    }

    /// Number of open files.
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    /// Whether no files are open.
    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}
