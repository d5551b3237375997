//! The cross-thread delivery gate.
//!
//! Transport I/O runs on worker threads the core does not control, but all
//! content-affecting handlers must execute on the single mutation thread.
//! The gate is the only permitted crossing: producers hold a [`GateHandle`]
//! and enqueue events; the mutation thread's event loop drains the queue
//! with [`DeliveryGate::pump`] and routes each event to the owning entity.
//! The content and change-log structures themselves are thread-confined and
//! never protected by locks.

use std::thread::{self, ThreadId};

use crossbeam_channel::{Receiver, Sender, TryRecvError};

use crate::location::Location;
use crate::registry::OpenFileRegistry;
use crate::transport::TransportEvent;

/// A transport event addressed to the entity at a location.
#[derive(Debug)]
pub struct FileEvent {
    /// The document the event belongs to.
    pub location: Location,
    /// What the transport reports.
    pub event: TransportEvent,
}

/// Producer side of the gate. Cheap to clone; hand one to every transport
/// worker.
#[derive(Clone)]
pub struct GateHandle {
    tx: Sender<FileEvent>,
}

impl GateHandle {
    /// Enqueue an event from any thread. Never blocks and never touches
    /// entity state.
    pub fn post(&self, location: Location, event: TransportEvent) {
        if self.tx.send(FileEvent { location, event }).is_err() {
            // The gate (and with it the whole core) is gone; there is
            // nobody left to deliver to.
            log::debug!("Delivery gate closed; dropping transport event");
        }
    }
}

/// Consumer side: a single-consumer queue drained exclusively by the
/// mutation thread's event loop.
pub struct DeliveryGate {
    tx: Sender<FileEvent>,
    rx: Receiver<FileEvent>,
    owner_thread: ThreadId,
}

impl Default for DeliveryGate {
    fn default() -> Self {
        Self::new()
    }
}

impl DeliveryGate {
    /// Create a gate bound to the calling thread as its mutation thread.
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self {
            tx,
            rx,
            owner_thread: thread::current().id(),
        }
    }

    fn assert_mutation_thread(&self) {
        assert_eq!(
            thread::current().id(),
            self.owner_thread,
            "DeliveryGate pumped off the mutation thread"
        );
    }

    /// A producer handle for transport workers.
    pub fn handle(&self) -> GateHandle {
        GateHandle {
            tx: self.tx.clone(),
        }
    }

    /// Drain every queued event, routing each to its entity through the
    /// registry. Returns the number of events delivered.
    ///
    /// An entity whose delivery completes its close (status reaches
    /// `Closed`) is deregistered here, after its views have been notified.
    pub fn pump(&self, registry: &OpenFileRegistry) -> usize {
        self.assert_mutation_thread();
        let mut delivered = 0;
        loop {
            match self.rx.try_recv() {
                Ok(message) => {
                    self.route(registry, message);
                    delivered += 1;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        delivered
    }

    /// Deliver at most one queued event. Returns whether one was delivered.
    pub fn pump_one(&self, registry: &OpenFileRegistry) -> bool {
        self.assert_mutation_thread();
        match self.rx.try_recv() {
            Ok(message) => {
                self.route(registry, message);
                true
            }
            Err(_) => false,
        }
    }

    /// Whether events are waiting.
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    fn route(&self, registry: &OpenFileRegistry, message: FileEvent) {
        match registry.resolve(&message.location) {
            Some(entity) => {
                let closed = {
                    let mut entity_ref = entity.borrow_mut();
                    entity_ref.deliver(message.event);
                    entity_ref.status().is_terminal()
                };
                if closed {
                    registry.deregister(&entity);
                }
            }
            None => {
                // Late delivery for a file already torn down; nothing to do.
                log::warn!(
                    "Dropping transport event for unopened location {}",
                    message.location
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::Protocol;
    use crate::status::FileStatus;
    use crate::test_utils::MockTransport;

    fn loc(path: &str) -> Location {
        Location::new(Protocol::Ssh, path)
    }

    #[test]
    fn test_events_posted_off_thread_apply_on_mutation_thread() {
        let registry = OpenFileRegistry::new();
        let gate = DeliveryGate::new();
        let entity = registry
            .open(loc("/srv/doc.txt"), MockTransport::new().boxed())
            .unwrap();

        let handle = gate.handle();
        let worker = thread::spawn(move || {
            handle.post(
                loc("/srv/doc.txt"),
                TransportEvent::ContentLoaded(b"remote content".to_vec()),
            );
        });
        worker.join().unwrap();

        // Nothing has been applied yet: the event is only queued.
        assert_eq!(entity.borrow().status(), FileStatus::Loading);

        assert_eq!(gate.pump(&registry), 1);
        assert_eq!(entity.borrow().status(), FileStatus::Ready);
        assert_eq!(entity.borrow().content(), "remote content");
    }

    #[test]
    fn test_pump_preserves_post_order() {
        let registry = OpenFileRegistry::new();
        let gate = DeliveryGate::new();
        let entity = registry
            .open(loc("/srv/a.txt"), MockTransport::new().boxed())
            .unwrap();

        let handle = gate.handle();
        handle.post(loc("/srv/a.txt"), TransportEvent::OpenProgress(10));
        handle.post(loc("/srv/a.txt"), TransportEvent::OpenProgress(90));
        handle.post(
            loc("/srv/a.txt"),
            TransportEvent::ContentLoaded(b"x".to_vec()),
        );

        assert_eq!(gate.pump(&registry), 3);
        assert_eq!(entity.borrow().status(), FileStatus::Ready);
    }

    #[test]
    fn test_close_completion_deregisters_entity() {
        let registry = OpenFileRegistry::new();
        let gate = DeliveryGate::new();
        let entity = registry
            .open(loc("/srv/b.txt"), MockTransport::new().boxed())
            .unwrap();
        entity
            .borrow_mut()
            .deliver(TransportEvent::ContentLoaded(b"x".to_vec()));

        entity.borrow_mut().close(false);
        gate.handle()
            .post(loc("/srv/b.txt"), TransportEvent::CloseCompleted);
        gate.pump(&registry);

        assert!(registry.is_empty());
        assert_eq!(entity.borrow().status(), FileStatus::Closed);
    }

    #[test]
    fn test_event_for_unknown_location_is_dropped() {
        let registry = OpenFileRegistry::new();
        let gate = DeliveryGate::new();

        gate.handle()
            .post(loc("/nowhere"), TransportEvent::ConnectionLost);
        assert_eq!(gate.pump(&registry), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_pump_off_mutation_thread_panics() {
        // Build the gate on a worker thread, then pump from this one.
        let gate = thread::spawn(DeliveryGate::new).join().unwrap();
        let registry = OpenFileRegistry::new();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            gate.pump(&registry);
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_post_after_gate_dropped_is_silent() {
        let gate = DeliveryGate::new();
        let handle = gate.handle();
        drop(gate);
        handle.post(loc("/srv/c.txt"), TransportEvent::ConnectionLost);
    }
}
