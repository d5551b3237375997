//! Attached editor views and notification fan-out.
//!
//! A file entity never owns its views. Views attach themselves on
//! construction and detach on teardown; the entity holds weak handles and
//! tolerates a view disappearing between attach and the next fan-out.

use std::rc::{Rc, Weak};

use crate::change::Change;
use crate::status::FileStatus;

/// A consumer of file events — typically an on-screen editor view.
///
/// Callbacks run synchronously on the mutation thread, in attachment
/// order. They receive values rather than entity references and must not
/// call back into the owning entity from inside a callback; re-query state
/// afterwards instead.
pub trait FileView {
    /// The entity's connection/sync status changed.
    fn status_changed(&self, status: FileStatus);

    /// A tracked edit was applied to the content.
    fn content_changed(&self, change: &Change);

    /// Loading progressed to `percent`.
    fn open_progress(&self, percent: u8) {
        let _ = percent;
    }

    /// The file closed. Delivered exactly once, before the entity is
    /// deregistered and destroyed, so no view is left holding a dangling
    /// reference.
    fn file_closed(&self);
}

/// The per-entity set of attached views.
#[derive(Default)]
pub struct ViewAttachments {
    views: Vec<Weak<dyn FileView>>,
}

impl ViewAttachments {
    /// Create an empty attachment list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a view. Call only from the view's own construction.
    pub fn attach(&mut self, view: &Rc<dyn FileView>) {
        self.views.push(Rc::downgrade(view));
    }

    /// Remove a view. Call only from the view's own teardown.
    pub fn detach(&mut self, view: &Rc<dyn FileView>) {
        let target = Rc::downgrade(view);
        self.views.retain(|w| !Weak::ptr_eq(w, &target));
    }

    /// Number of currently live attached views.
    pub fn len(&self) -> usize {
        self.views.iter().filter(|w| w.strong_count() > 0).count()
    }

    /// Whether no live views are attached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Notify every live view, in attachment order.
    ///
    /// Snapshots the list before iterating so a view detaching during the
    /// fan-out cannot invalidate the traversal; dead handles are dropped
    /// afterwards.
    pub fn notify(&mut self, mut f: impl FnMut(&dyn FileView)) {
        let snapshot: Vec<Weak<dyn FileView>> = self.views.clone();
        for weak in snapshot {
            if let Some(view) = weak.upgrade() {
                f(view.as_ref());
            }
        }
        self.views.retain(|w| w.strong_count() > 0);
    }
}
