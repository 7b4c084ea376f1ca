use chrono::{Datelike, NaiveDate};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::availability::availability;
use super::conflict::{check_no_conflict, normalize_email, validate_span};
use super::slots::default_slot_width;
use super::{Engine, EngineError};

impl Engine {
    /// Slot grid for one court on one date, with "now" taken from the engine's clock.
    pub async fn compute_availability(
        &self,
        resource_id: Ulid,
        date: NaiveDate,
    ) -> Result<AvailabilityGrid, EngineError> {
        if !(MIN_VALID_YEAR..=MAX_VALID_YEAR).contains(&date.year()) {
            return Err(EngineError::LimitExceeded("date out of range"));
        }
        let rs = self
            .get_resource(&resource_id)
            .ok_or(EngineError::NotFound(resource_id))?;
        let guard = rs.read().await;
        Ok(availability(&guard, date, default_slot_width(), self.clock.now()))
    }

    /// Check `span` against every active reservation on the court except `exclude`.
    /// Read-only: the authoritative check is repeated under the write lock on create/update.
    pub async fn validate_reservation(
        &self,
        resource_id: Ulid,
        span: Span,
        exclude: Option<Ulid>,
    ) -> Result<(), EngineError> {
        validate_span(&span)?;
        let rs = self
            .get_resource(&resource_id)
            .ok_or(EngineError::NotFound(resource_id))?;
        let guard = rs.read().await;
        check_no_conflict(&guard, &span, exclude)
    }

    pub async fn list_resources(&self) -> Vec<ResourceInfo> {
        let courts: Vec<_> = self.state.iter().map(|e| e.value().clone()).collect();
        let mut out = Vec::with_capacity(courts.len());
        for rs in courts {
            out.push(rs.read().await.info());
        }
        out.sort_by_key(|r| r.id);
        out
    }

    pub async fn get_resource_info(&self, id: Ulid) -> Result<ResourceInfo, EngineError> {
        let rs = self.get_resource(&id).ok_or(EngineError::NotFound(id))?;
        let guard = rs.read().await;
        Ok(guard.info())
    }

    /// All seven weekday records, Sunday first.
    pub async fn get_operating_hours(&self, resource_id: Ulid) -> Result<Vec<OperatingHour>, EngineError> {
        let rs = self
            .get_resource(&resource_id)
            .ok_or(EngineError::NotFound(resource_id))?;
        let guard = rs.read().await;
        Ok(guard.hours.to_vec())
    }

    /// Reservations on a court in start order, optionally only those touching `date`.
    pub async fn get_reservations(
        &self,
        resource_id: Ulid,
        date: Option<NaiveDate>,
    ) -> Result<Vec<Reservation>, EngineError> {
        let rs = self
            .get_resource(&resource_id)
            .ok_or(EngineError::NotFound(resource_id))?;
        let guard = rs.read().await;
        Ok(match date {
            Some(d) => guard.overlapping(&Span::day(d)).cloned().collect(),
            None => guard.reservations.clone(),
        })
    }

    pub async fn get_reservation(&self, id: Ulid) -> Result<Reservation, EngineError> {
        let resource_id = self
            .get_resource_for_entity(&id)
            .ok_or(EngineError::NotFound(id))?;
        let rs = self
            .get_resource(&resource_id)
            .ok_or(EngineError::NotFound(id))?;
        let guard = rs.read().await;
        guard
            .get_reservation(id)
            .cloned()
            .ok_or(EngineError::NotFound(id))
    }

    pub fn get_customer(&self, id: Ulid) -> Option<Customer> {
        self.customers.get(&id).map(|c| c.value().clone())
    }

    pub fn get_customer_by_email(&self, email: &str) -> Option<Customer> {
        let email = normalize_email(email).ok()?;
        let id = *self.customer_emails.get(&email)?.value();
        self.get_customer(id)
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }
}
