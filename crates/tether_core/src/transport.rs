//! The narrow seam between the sync core and the transport.
//!
//! The core never knows how bytes reach or leave the remote host. It hands
//! the transport fire-and-forget requests through [`FileTransport`] and the
//! transport reports back — from whatever thread its I/O runs on — by
//! posting [`TransportEvent`]s through the delivery gate.

use serde::{Deserialize, Serialize};

use crate::change::Change;
use crate::location::Location;

/// What a save hands the transport to persist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SavePayload {
    /// The full normalized content. Used when the remote holds no
    /// acknowledged baseline to apply deltas against.
    Full {
        /// Normalized document content.
        content: String,
    },
    /// The buffered change suffix since the last acknowledged revision.
    Deltas {
        /// The revision the remote must be at before applying `changes`.
        base_revision: u64,
        /// Changes in ascending revision order, gap-free from
        /// `base_revision + 1`.
        changes: Vec<Change>,
    },
}

/// A save request dispatched to the transport.
///
/// The transport (or the remote side) is expected to apply the payload,
/// checksum the result, and report back with [`TransportEvent::SaveAcked`]
/// carrying `revision` and the checksum it computed. The core compares that
/// against `expected_checksum` before trusting the round trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveRequest {
    /// The revision the payload brings the remote up to.
    pub revision: u64,
    /// Checksum of the local content at `revision`, hex lower-cased.
    pub expected_checksum: String,
    /// Content or delta suffix.
    pub payload: SavePayload,
}

/// Requests the core issues to its transport collaborator.
///
/// All methods are fire-and-forget: they must not block on I/O, and
/// completion arrives asynchronously as [`TransportEvent`]s posted through
/// the [`DeliveryGate`](crate::dispatch::DeliveryGate).
pub trait FileTransport {
    /// Begin retrieving content for `location`. Delivery:
    /// [`TransportEvent::ContentLoaded`] or [`TransportEvent::LoadFailed`],
    /// with optional [`TransportEvent::OpenProgress`] along the way.
    fn request_open(&self, location: &Location);

    /// Persist `request` on the remote. Delivery:
    /// [`TransportEvent::SaveAcked`] or [`TransportEvent::SaveFailed`].
    fn request_save(&self, request: SaveRequest);

    /// Release remote resources. Delivery:
    /// [`TransportEvent::CloseCompleted`].
    fn request_close(&self);
}

/// Events the transport delivers back to a file entity.
///
/// Producers may emit these from any thread; the delivery gate re-queues
/// them onto the mutation thread before any handler runs.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// Raw content retrieved, delivered once per successful open.
    ContentLoaded(Vec<u8>),
    /// The open could not be completed.
    LoadFailed(String),
    /// Percentage progress while loading.
    OpenProgress(u8),
    /// The link to the remote dropped.
    ConnectionLost,
    /// The link is restored and the handshake has begun.
    ConnectionRestored,
    /// Handshake result: the remote's last known revision and checksum.
    HandshakeResult {
        /// The highest revision the remote reports having persisted.
        revision: u64,
        /// Checksum of the remote content at that revision.
        checksum: String,
    },
    /// The remote durably persisted a save up to `revision`.
    SaveAcked {
        /// The revision the remote is now at.
        revision: u64,
        /// Checksum the remote computed after applying the save.
        checksum: String,
    },
    /// The transport could not persist a save. Buffered changes are
    /// retained for retry.
    SaveFailed(String),
    /// A full-content reconciliation finished; both sides agree on this
    /// content.
    RepairComplete(Vec<u8>),
    /// Full-content reconciliation failed.
    RepairFailed(String),
    /// Close finished on the transport side; the entity can reach
    /// `Closed`.
    CloseCompleted,
}
