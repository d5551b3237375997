#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

/// Revisioned edit deltas and the change log
pub mod change;

/// Cross-thread delivery gate
pub mod dispatch;

/// The in-memory document buffer
pub mod document;

/// Error (common error types)
pub mod error;

/// The file entity and its sync state machine
pub mod file;

/// Logical document identity
pub mod location;

/// Open-file registry
pub mod registry;

/// Connection/sync status
pub mod status;

/// Transport collaborator interface
pub mod transport;

/// Attached editor views
pub mod views;

pub use change::{Change, ChangeLog};
pub use dispatch::{DeliveryGate, FileEvent, GateHandle};
pub use document::Document;
pub use error::{Result, TetherError};
pub use file::FileEntity;
pub use location::{Location, Protocol};
pub use registry::{CloseOutcome, FileHandle, OpenFileRegistry};
pub use status::FileStatus;
pub use transport::{FileTransport, SavePayload, SaveRequest, TransportEvent};
pub use views::{FileView, ViewAttachments};

#[cfg(test)]
pub mod test_utils;
