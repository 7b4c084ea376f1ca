use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use rust_decimal::Decimal;
use tokio::sync::{oneshot, OwnedRwLockWriteGuard, RwLock};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability::RESERVATIONS_TOTAL;

use super::conflict::*;
use super::pricing::compute_price;
use super::{apply_to_resource, Engine, EngineError, SharedResourceState, WalCommand};

fn record_outcome<T>(op: &'static str, result: &Result<T, EngineError>) {
    let outcome = match result {
        Ok(_) => "ok",
        Err(e) => e.kind(),
    };
    metrics::counter!(RESERVATIONS_TOTAL, "op" => op, "outcome" => outcome).increment(1);
    match result {
        Err(EngineError::WalError(e)) => tracing::error!("reservation {op} failed: {e}"),
        Err(e) => tracing::debug!("reservation {op} rejected: {e}"),
        Ok(_) => {}
    }
}

impl Engine {
    /// `rs` is still the live entry for `id` (not deleted, not replaced) after waiting for its lock.
    fn is_current(&self, id: &Ulid, rs: &SharedResourceState) -> bool {
        self.state
            .get(id)
            .is_some_and(|entry| Arc::ptr_eq(entry.value(), rs))
    }

    // ── Courts ───────────────────────────────────────────

    pub async fn create_resource(
        &self,
        id: Ulid,
        name: String,
        hourly_rate: Decimal,
        status: ResourceStatus,
    ) -> Result<ResourceInfo, EngineError> {
        if self.state.len() >= MAX_RESOURCES_PER_TENANT {
            return Err(EngineError::LimitExceeded("too many resources"));
        }
        check_name(&name)?;
        if hourly_rate.is_sign_negative() {
            return Err(EngineError::Validation("hourly_rate must not be negative".into()));
        }

        let _gate = self.write_gate.read().await;
        let event = Event::ResourceCreated {
            id,
            name: name.clone(),
            hourly_rate,
            status,
        };
        let rs = Arc::new(RwLock::new(ResourceState::new(id, name, hourly_rate, status)));
        // Claimed while locked: anyone who finds the entry waits for the WAL outcome.
        let guard = rs.clone().write_owned().await;
        match self.state.entry(id) {
            Entry::Occupied(_) => return Err(EngineError::AlreadyExists(id)),
            Entry::Vacant(slot) => {
                slot.insert(rs.clone());
            }
        }
        if let Err(e) = self.wal_append(&event).await {
            self.state.remove_if(&id, |_, entry| Arc::ptr_eq(entry, &rs));
            return Err(e);
        }
        tracing::debug!("created court {id}");
        Ok(guard.info())
    }

    /// Replace a court's name, rate and status. Existing reservation prices are left alone.
    pub async fn update_resource(
        &self,
        id: Ulid,
        name: String,
        hourly_rate: Decimal,
        status: ResourceStatus,
    ) -> Result<ResourceInfo, EngineError> {
        let changes = ResourceChanges {
            name: Some(name),
            hourly_rate: Some(hourly_rate),
            status: Some(status),
        };
        self.patch_resource(id, changes).await
    }

    /// Update only the given fields. Omitted ones are read under the court's write lock.
    pub async fn patch_resource(
        &self,
        id: Ulid,
        changes: ResourceChanges,
    ) -> Result<ResourceInfo, EngineError> {
        let rs = self.get_resource(&id).ok_or(EngineError::NotFound(id))?;
        let _gate = self.write_gate.read().await;
        let mut guard = rs.write().await;
        if !self.is_current(&id, &rs) {
            return Err(EngineError::NotFound(id));
        }

        let name = changes.name.unwrap_or_else(|| guard.name.clone());
        let hourly_rate = changes.hourly_rate.unwrap_or(guard.hourly_rate);
        let status = changes.status.unwrap_or(guard.status);
        check_name(&name)?;
        if hourly_rate.is_sign_negative() {
            return Err(EngineError::Validation("hourly_rate must not be negative".into()));
        }
        let event = Event::ResourceUpdated {
            id,
            name,
            hourly_rate,
            status,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        Ok(guard.info())
    }

    pub async fn delete_resource(&self, id: Ulid) -> Result<(), EngineError> {
        let rs = self.get_resource(&id).ok_or(EngineError::NotFound(id))?;
        let _gate = self.write_gate.read().await;
        let guard = rs.write().await;
        if !self.is_current(&id, &rs) {
            return Err(EngineError::NotFound(id));
        }
        if !guard.reservations.is_empty() {
            return Err(EngineError::HasReservations(id));
        }

        let event = Event::ResourceDeleted { id };
        self.wal_append(&event).await?;
        self.state.remove(&id);
        tracing::debug!("deleted court {id}");
        Ok(())
    }

    /// Replace one weekday's opening window.
    pub async fn set_operating_hours(
        &self,
        resource_id: Ulid,
        hours: OperatingHour,
    ) -> Result<(), EngineError> {
        validate_operating_hour(&hours)?;
        let rs = self
            .get_resource(&resource_id)
            .ok_or(EngineError::NotFound(resource_id))?;
        let _gate = self.write_gate.read().await;
        let mut guard = rs.write().await;
        if !self.is_current(&resource_id, &rs) {
            return Err(EngineError::NotFound(resource_id));
        }

        let event = Event::OperatingHoursSet { resource_id, hours };
        self.persist_and_apply(&mut guard, &event).await
    }

    // ── Customers ────────────────────────────────────────

    /// Idempotent upsert keyed by email. An existing customer keeps its id; the
    /// name is overwritten and the phone only when one is given.
    pub async fn find_or_create_customer(
        &self,
        email: &str,
        name: &str,
        phone: Option<String>,
    ) -> Result<Customer, EngineError> {
        let email = normalize_email(email)?;
        check_name(name)?;
        let name = name.trim().to_string();
        let phone = phone
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty());
        if phone.as_ref().is_some_and(|p| p.len() > MAX_PHONE_LEN) {
            return Err(EngineError::LimitExceeded("phone too long"));
        }

        let _gate = self.write_gate.read().await;
        let _lock = self.customer_lock.lock().await;
        let existing = self
            .customer_emails
            .get(&email)
            .map(|id| *id.value())
            .and_then(|id| self.customers.get(&id).map(|c| c.value().clone()));

        let customer = match existing {
            Some(current) => {
                let updated = Customer {
                    id: current.id,
                    email,
                    name,
                    phone: phone.or_else(|| current.phone.clone()),
                };
                if updated == current {
                    return Ok(current);
                }
                updated
            }
            None => {
                if self.customers.len() >= MAX_CUSTOMERS_PER_TENANT {
                    return Err(EngineError::LimitExceeded("too many customers"));
                }
                Customer {
                    id: Ulid::new(),
                    email,
                    name,
                    phone,
                }
            }
        };

        let event = Event::CustomerUpserted {
            customer: customer.clone(),
        };
        self.wal_append(&event).await?;
        self.apply_customer(&customer);
        Ok(customer)
    }

    // ── Reservations ─────────────────────────────────────

    /// Book `span` on a court. Validation, conflict check and the WAL append all
    /// happen under the court's write lock.
    pub async fn create_reservation(
        &self,
        id: Ulid,
        resource_id: Ulid,
        customer_id: Ulid,
        span: Span,
        notes: Option<String>,
    ) -> Result<Reservation, EngineError> {
        let result = self
            .try_create_reservation(id, resource_id, customer_id, span, notes)
            .await;
        record_outcome("create", &result);
        result
    }

    async fn try_create_reservation(
        &self,
        id: Ulid,
        resource_id: Ulid,
        customer_id: Ulid,
        span: Span,
        notes: Option<String>,
    ) -> Result<Reservation, EngineError> {
        validate_span(&span)?;
        check_notes(&notes)?;
        if !self.customers.contains_key(&customer_id) {
            return Err(EngineError::NotFound(customer_id));
        }
        if self.entity_to_resource.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }
        let rs = self
            .get_resource(&resource_id)
            .ok_or(EngineError::NotFound(resource_id))?;

        let _gate = self.write_gate.read().await;
        let mut guard = rs.write().await;
        if !self.is_current(&resource_id, &rs) {
            return Err(EngineError::NotFound(resource_id));
        }
        // The id is claimed before the WAL await so a create on another court can't reuse it.
        match self.entity_to_resource.entry(id) {
            Entry::Occupied(_) => return Err(EngineError::AlreadyExists(id)),
            Entry::Vacant(slot) => {
                slot.insert(resource_id);
            }
        }
        let result = self
            .book_claimed(&mut guard, id, customer_id, span, notes)
            .await;
        if result.is_err() {
            self.entity_to_resource.remove_if(&id, |_, rid| *rid == resource_id);
        }
        result
    }

    /// Validate and persist a new reservation whose id is already mapped to this court.
    async fn book_claimed(
        &self,
        guard: &mut ResourceState,
        id: Ulid,
        customer_id: Ulid,
        span: Span,
        notes: Option<String>,
    ) -> Result<Reservation, EngineError> {
        if guard.reservations.len() >= MAX_RESERVATIONS_PER_RESOURCE {
            return Err(EngineError::LimitExceeded("too many reservations on resource"));
        }

        check_bookable(guard)?;
        check_open(guard, &span)?;
        check_no_conflict(guard, &span, None)?;

        let reservation = Reservation {
            id,
            resource_id: guard.id,
            customer_id,
            span,
            status: ReservationStatus::Confirmed,
            total_price: compute_price(&span, guard.hourly_rate),
            notes,
            created_at: self.clock.now(),
        };
        let event = Event::ReservationCreated {
            reservation: reservation.clone(),
        };
        self.persist_and_apply(guard, &event).await?;
        Ok(reservation)
    }

    /// Rewrite a reservation's court, span, status and notes.
    ///
    /// When the new status is active the reservation is re-validated against the
    /// target court, ignoring itself. The price is recomputed from the target
    /// court's current rate.
    pub async fn update_reservation(
        &self,
        id: Ulid,
        resource_id: Ulid,
        span: Span,
        status: ReservationStatus,
        notes: Option<String>,
    ) -> Result<Reservation, EngineError> {
        let changes = ReservationChanges {
            resource_id: Some(resource_id),
            start: Some(span.start),
            end: Some(span.end),
            status: Some(status),
            notes: Some(notes),
        };
        self.patch_reservation(id, changes).await
    }

    /// Update only the given fields. Omitted ones are taken from the stored
    /// reservation after its court is write-locked, so concurrent partial
    /// updates never write back a stale value.
    pub async fn patch_reservation(
        &self,
        id: Ulid,
        changes: ReservationChanges,
    ) -> Result<Reservation, EngineError> {
        let result = self.try_patch_reservation(id, changes).await;
        record_outcome("update", &result);
        result
    }

    async fn try_patch_reservation(
        &self,
        id: Ulid,
        changes: ReservationChanges,
    ) -> Result<Reservation, EngineError> {
        if let Some(notes) = &changes.notes {
            check_notes(notes)?;
        }

        let _gate = self.write_gate.read().await;
        let (previous_resource_id, mut source, mut target) = match changes.resource_id {
            Some(resource_id) => self.lock_for_move(id, resource_id).await?,
            None => {
                let (rid, guard) = self.resolve_entity_write(&id).await?;
                (rid, guard, None)
            }
        };
        let current = source
            .get_reservation(id)
            .cloned()
            .ok_or(EngineError::NotFound(id))?;
        let moved = target.is_some();

        let resource_id = changes.resource_id.unwrap_or(previous_resource_id);
        let span = Span {
            start: changes.start.unwrap_or(current.span.start),
            end: changes.end.unwrap_or(current.span.end),
        };
        let status = changes.status.unwrap_or(current.status);
        let notes = changes.notes.unwrap_or(current.notes);
        validate_span(&span)?;

        let dest: &ResourceState = target.as_deref().unwrap_or(&source);
        if moved {
            check_bookable(dest)?;
            if dest.reservations.len() >= MAX_RESERVATIONS_PER_RESOURCE {
                return Err(EngineError::LimitExceeded("too many reservations on resource"));
            }
        }
        if status.is_active() {
            if moved || span != current.span {
                check_open(dest, &span)?;
            }
            check_no_conflict(dest, &span, Some(id))?;
        }

        let reservation = Reservation {
            id,
            resource_id,
            customer_id: current.customer_id,
            span,
            status,
            total_price: compute_price(&span, dest.hourly_rate),
            notes,
            created_at: current.created_at,
        };
        let event = Event::ReservationUpdated {
            previous_resource_id,
            reservation: reservation.clone(),
        };
        self.wal_append(&event).await?;
        apply_to_resource(&mut source, &event, &self.entity_to_resource);
        if let Some(target) = target.as_mut() {
            apply_to_resource(target, &event, &self.entity_to_resource);
        }
        Ok(reservation)
    }

    /// Write-lock the court currently holding `id` and, when different, the
    /// destination court. Locks are taken in ascending id order.
    async fn lock_for_move(
        &self,
        id: Ulid,
        resource_id: Ulid,
    ) -> Result<
        (
            Ulid,
            OwnedRwLockWriteGuard<ResourceState>,
            Option<OwnedRwLockWriteGuard<ResourceState>>,
        ),
        EngineError,
    > {
        loop {
            let previous_id = self
                .get_resource_for_entity(&id)
                .ok_or(EngineError::NotFound(id))?;
            if previous_id == resource_id {
                let (rid, guard) = self.resolve_entity_write(&id).await?;
                if rid == resource_id {
                    return Ok((rid, guard, None));
                }
                continue;
            }

            let source_rs = self
                .get_resource(&previous_id)
                .ok_or(EngineError::NotFound(previous_id))?;
            let target_rs = self
                .get_resource(&resource_id)
                .ok_or(EngineError::NotFound(resource_id))?;
            let (source, target) = if previous_id < resource_id {
                let s = source_rs.clone().write_owned().await;
                let t = target_rs.clone().write_owned().await;
                (s, t)
            } else {
                let t = target_rs.clone().write_owned().await;
                let s = source_rs.clone().write_owned().await;
                (s, t)
            };

            if !self.is_current(&resource_id, &target_rs) {
                return Err(EngineError::NotFound(resource_id));
            }
            if source.get_reservation(id).is_some() {
                return Ok((previous_id, source, Some(target)));
            }
            // Moved or deleted while we waited for the locks.
            if self.get_resource_for_entity(&id).is_none() {
                return Err(EngineError::NotFound(id));
            }
        }
    }

    /// Hard delete. Returns the removed reservation.
    pub async fn delete_reservation(&self, id: Ulid) -> Result<Reservation, EngineError> {
        let _gate = self.write_gate.read().await;
        let (resource_id, mut guard) = self.resolve_entity_write(&id).await?;
        let removed = guard
            .get_reservation(id)
            .cloned()
            .ok_or(EngineError::NotFound(id))?;
        let event = Event::ReservationDeleted { id, resource_id };
        self.persist_and_apply(&mut guard, &event).await?;
        metrics::counter!(RESERVATIONS_TOTAL, "op" => "delete", "outcome" => "ok").increment(1);
        Ok(removed)
    }

    // ── Compaction ───────────────────────────────────────

    /// Compact the WAL by rewriting it with only the events needed to recreate the current state.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let _gate = self.write_gate.write().await;
        let mut events: Vec<Event> = self
            .customers
            .iter()
            .map(|c| Event::CustomerUpserted {
                customer: c.value().clone(),
            })
            .collect();

        let courts: Vec<SharedResourceState> = self.state.iter().map(|e| e.value().clone()).collect();
        for rs in courts {
            let guard = rs.read().await;
            events.push(Event::ResourceCreated {
                id: guard.id,
                name: guard.name.clone(),
                hourly_rate: guard.hourly_rate,
                status: guard.status,
            });
            for hours in &guard.hours {
                events.push(Event::OperatingHoursSet {
                    resource_id: guard.id,
                    hours: *hours,
                });
            }
            for reservation in &guard.reservations {
                events.push(Event::ReservationCreated {
                    reservation: reservation.clone(),
                });
            }
        }

        let count = events.len();
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))?;
        tracing::debug!("compacted WAL to {count} events");
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
