mod availability;
mod conflict;
mod error;
mod mutations;
mod pricing;
mod queries;
mod slots;

pub use availability::availability;
pub use error::EngineError;
pub use pricing::{billable_hours, compute_price};
pub use slots::{default_slot_width, generate_slots, SlotGrid};

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use ulid::Ulid;

use crate::clock::Clock;
use crate::model::*;
use crate::wal::Wal;

pub type SharedResourceState = Arc<RwLock<ResourceState>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond to all senders with the shared result.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];
                let mut deferred = None;

                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            deferred = Some(other);
                            break;
                        }
                        Err(_) => break,
                    }
                }

                metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE)
                    .record(batch.len() as f64);
                let flush_start = std::time::Instant::now();
                let result = flush_batch(&mut wal, &batch);
                metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
                    .record(flush_start.elapsed().as_secs_f64());
                respond_batch(batch, &result);

                // Compaction must see every append that was queued ahead of it.
                if let Some(other) = deferred {
                    handle_non_append(&mut wal, other);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn flush_batch(wal: &mut Wal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Flush even on append error so partially buffered bytes don't leak into the next batch.
    let flush_err = wal.flush_sync().err();
    match (append_err, flush_err) {
        (Some(e), _) | (None, Some(e)) => Err(e),
        (None, None) => Ok(()),
    }
}

fn respond_batch(batch: Vec<(Event, oneshot::Sender<io::Result<()>>)>, result: &io::Result<()>) {
    for (_, tx) in batch {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            if let Err(ref e) = result {
                tracing::error!("WAL compaction failed: {e}");
            }
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { event, response } => {
            let result = wal.append(&event);
            let _ = response.send(result);
        }
    }
}

/// One venue's courts, customers and reservations.
///
/// Every court sits behind its own `RwLock`. Writers validate and persist while
/// holding the court's write lock, so two overlapping bookings on the same court
/// can never both pass the conflict check.
pub struct Engine {
    pub state: DashMap<Ulid, SharedResourceState>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub(super) clock: Arc<dyn Clock>,
    /// Reverse lookup: reservation id → court id
    pub(super) entity_to_resource: DashMap<Ulid, Ulid>,
    pub(super) customers: DashMap<Ulid, Customer>,
    /// Normalized email → customer id
    pub(super) customer_emails: DashMap<String, Ulid>,
    /// Serializes find-or-create so two requests for one email can't mint two ids.
    pub(super) customer_lock: Mutex<()>,
    /// Held shared by every mutation from WAL append to in-memory apply, and
    /// exclusively by compaction while it snapshots state and swaps the WAL.
    pub(super) write_gate: RwLock<()>,
}

/// Apply an event directly to a ResourceState. The caller holds the court's lock.
fn apply_to_resource(rs: &mut ResourceState, event: &Event, entity_map: &DashMap<Ulid, Ulid>) {
    match event {
        Event::ResourceUpdated {
            name,
            hourly_rate,
            status,
            ..
        } => {
            rs.name = name.clone();
            rs.hourly_rate = *hourly_rate;
            rs.status = *status;
        }
        Event::OperatingHoursSet { hours, .. } => rs.set_hours(*hours),
        Event::ReservationCreated { reservation } => {
            entity_map.insert(reservation.id, reservation.resource_id);
            rs.insert_reservation(reservation.clone());
        }
        Event::ReservationUpdated { reservation, .. } => {
            rs.remove_reservation(reservation.id);
            if rs.id == reservation.resource_id {
                entity_map.insert(reservation.id, reservation.resource_id);
                rs.insert_reservation(reservation.clone());
            }
        }
        Event::ReservationDeleted { id, .. } => {
            rs.remove_reservation(*id);
            entity_map.remove(id);
        }
        // Created/Deleted live at the DashMap level, customers outside any court.
        Event::ResourceCreated { .. } | Event::ResourceDeleted { .. } | Event::CustomerUpserted { .. } => {}
    }
}

impl Engine {
    pub fn new(wal_path: PathBuf, clock: Arc<dyn Clock>) -> io::Result<Self> {
        let (wal, events) = Wal::recover(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            state: DashMap::new(),
            wal_tx,
            clock,
            entity_to_resource: DashMap::new(),
            customers: DashMap::new(),
            customer_emails: DashMap::new(),
            customer_lock: Mutex::new(()),
            write_gate: RwLock::new(()),
        };

        // Replay into plain values first; locks are only needed once the engine is shared.
        let mut courts: HashMap<Ulid, ResourceState> = HashMap::new();
        for event in &events {
            match event {
                Event::ResourceCreated {
                    id,
                    name,
                    hourly_rate,
                    status,
                } => {
                    courts.insert(*id, ResourceState::new(*id, name.clone(), *hourly_rate, *status));
                }
                Event::ResourceDeleted { id } => {
                    engine.entity_to_resource.retain(|_, rid| rid != id);
                    courts.remove(id);
                }
                Event::CustomerUpserted { customer } => engine.apply_customer(customer),
                other => {
                    for resource_id in event_resource_ids(other).into_iter().flatten() {
                        if let Some(rs) = courts.get_mut(&resource_id) {
                            apply_to_resource(rs, other, &engine.entity_to_resource);
                        }
                    }
                }
            }
        }
        for (id, rs) in courts {
            engine.state.insert(id, Arc::new(RwLock::new(rs)));
        }

        tracing::debug!(
            "replayed {} events: {} courts, {} customers",
            events.len(),
            engine.state.len(),
            engine.customers.len()
        );
        Ok(engine)
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub fn get_resource(&self, id: &Ulid) -> Option<SharedResourceState> {
        self.state.get(id).map(|e| e.value().clone())
    }

    pub fn get_resource_for_entity(&self, entity_id: &Ulid) -> Option<Ulid> {
        self.entity_to_resource.get(entity_id).map(|e| *e.value())
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// WAL-append then apply, with the court's write lock already held.
    pub(super) async fn persist_and_apply(
        &self,
        rs: &mut ResourceState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_resource(rs, event, &self.entity_to_resource);
        Ok(())
    }

    /// Lookup reservation → court, acquire the court's write lock.
    ///
    /// Re-checks the mapping after the lock is held: a concurrent move to another
    /// court may have landed while we waited.
    pub(super) async fn resolve_entity_write(
        &self,
        entity_id: &Ulid,
    ) -> Result<(Ulid, tokio::sync::OwnedRwLockWriteGuard<ResourceState>), EngineError> {
        loop {
            let resource_id = self
                .get_resource_for_entity(entity_id)
                .ok_or(EngineError::NotFound(*entity_id))?;
            let rs = self
                .get_resource(&resource_id)
                .ok_or(EngineError::NotFound(resource_id))?;
            let guard = rs.write_owned().await;
            if guard.get_reservation(*entity_id).is_some() {
                return Ok((resource_id, guard));
            }
            if self.get_resource_for_entity(entity_id) == Some(resource_id) {
                return Err(EngineError::NotFound(*entity_id));
            }
        }
    }

    pub(super) fn apply_customer(&self, customer: &Customer) {
        if let Some(previous) = self.customers.get(&customer.id)
            && previous.email != customer.email
        {
            self.customer_emails.remove(&previous.email);
        }
        self.customer_emails.insert(customer.email.clone(), customer.id);
        self.customers.insert(customer.id, customer.clone());
    }
}

/// Courts touched by a per-court event. A moved reservation touches two.
fn event_resource_ids(event: &Event) -> [Option<Ulid>; 2] {
    match event {
        Event::ResourceUpdated { id, .. } => [Some(*id), None],
        Event::OperatingHoursSet { resource_id, .. } | Event::ReservationDeleted { resource_id, .. } => {
            [Some(*resource_id), None]
        }
        Event::ReservationCreated { reservation } => [Some(reservation.resource_id), None],
        Event::ReservationUpdated {
            previous_resource_id,
            reservation,
        } => {
            if *previous_resource_id == reservation.resource_id {
                [Some(reservation.resource_id), None]
            } else {
                [Some(*previous_resource_id), Some(reservation.resource_id)]
            }
        }
        Event::ResourceCreated { .. } | Event::ResourceDeleted { .. } | Event::CustomerUpserted { .. } => {
            [None, None]
        }
    }
}
