//! The in-memory text buffer behind an open file.
//!
//! Content is always stored with Unix line endings; the native convention
//! detected at load time is remembered and re-applied only at the
//! save/export boundary. Checksums are therefore always taken over the
//! normalized form, on both sides of the link.

use sha2::{Digest, Sha256};

use crate::error::{Result, TetherError};

/// Canonicalize text arriving from an editing surface.
///
/// Surfaces represent paragraph and line separators with dedicated Unicode
/// characters and spaces sometimes arrive non-breaking; the change log must
/// store a single canonical form so replays are stable across surfaces.
pub fn canonicalize(surface: &str) -> String {
    surface
        .chars()
        .map(|c| match c {
            '\u{2028}' | '\u{2029}' => '\n',
            '\u{00a0}' => ' ',
            c => c,
        })
        .collect()
}

/// The authoritative content of one open document.
#[derive(Debug, Default)]
pub struct Document {
    content: String,
    uses_crlf: bool,
    dirty: bool,
    suppress_tracking: bool,
}

impl Document {
    /// Create an empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// The current content, normalized line endings.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Whether the content differs from the last acknowledged save.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Mark the content as matching (or diverging from) the last save.
    pub fn set_dirty(&mut self, dirty: bool) {
        self.dirty = dirty;
    }

    /// Whether the source used Windows-style line endings at load time.
    pub fn uses_crlf(&self) -> bool {
        self.uses_crlf
    }

    /// Whether mutations are currently excluded from change tracking.
    pub fn tracking_suppressed(&self) -> bool {
        self.suppress_tracking
    }

    /// Run `f` with change tracking suppressed.
    ///
    /// The flag is restored on every exit path, including unwinding, so a
    /// failed programmatic replacement can never leak suppression into a
    /// later unrelated edit.
    pub fn suppressed<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        struct Restore<'a> {
            doc: &'a mut Document,
            previous: bool,
        }
        impl Drop for Restore<'_> {
            fn drop(&mut self) {
                self.doc.suppress_tracking = self.previous;
            }
        }

        let previous = self.suppress_tracking;
        self.suppress_tracking = true;
        let mut guard = Restore {
            doc: self,
            previous,
        };
        f(&mut *guard.doc)
    }

    /// Splice `inserted` over `remove_count` bytes at `position`.
    ///
    /// The single mutation primitive for all content updates. `position`
    /// and `remove_count` must land on character boundaries of the current
    /// content; anything else is a caller bug and panics.
    pub fn splice(&mut self, position: usize, remove_count: usize, inserted: &str) {
        self.content
            .replace_range(position..position + remove_count, inserted);
        self.dirty = true;
    }

    /// Replace the whole content from raw bytes delivered by the transport.
    ///
    /// Detects the line-ending convention (a single `\r\n` anywhere signals
    /// Windows-style), normalizes to `\n`, and clears the dirty flag. The
    /// replacement runs with tracking suppressed so a load is never itself
    /// recorded as an editable change.
    pub fn load(&mut self, raw: &[u8]) -> Result<()> {
        let text = std::str::from_utf8(raw).map_err(|_| TetherError::InvalidEncoding)?;

        let uses_crlf = text.contains("\r\n");
        let normalized = if uses_crlf {
            text.replace("\r\n", "\n")
        } else {
            text.to_string()
        };

        self.suppressed(|doc| {
            let len = doc.content.len();
            doc.splice(0, len, &normalized);
        });

        self.uses_crlf = uses_crlf;
        self.dirty = false;
        Ok(())
    }

    /// The content with the source's native line endings re-applied.
    pub fn export(&self) -> Vec<u8> {
        if self.uses_crlf {
            self.content.replace('\n', "\r\n").into_bytes()
        } else {
            self.content.clone().into_bytes()
        }
    }

    /// SHA-256 of the normalized content, hex lower-cased.
    ///
    /// Recomputed over the full content each call. Not incremental:
    /// checksums are only taken at save and handshake boundaries, never per
    /// keystroke.
    pub fn checksum(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.content.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}
