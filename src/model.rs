use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Venue-local wall-clock instant. No time zone is attached anywhere.
pub type Timestamp = NaiveDateTime;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl Span {
    pub fn new(start: Timestamp, end: Timestamp) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    /// The whole calendar day `[date 00:00, date+1 00:00)`.
    pub fn day(date: NaiveDate) -> Self {
        let start = date.and_time(NaiveTime::MIN);
        Self::new(start, start + TimeDelta::days(1))
    }

    pub fn duration(&self) -> TimeDelta {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        overlaps(self.start, self.end, other.start, other.end)
    }
}

/// Two half-open ranges intersect iff each starts before the other ends.
/// A range ending exactly when the other begins does not overlap.
pub fn overlaps(
    existing_start: Timestamp,
    existing_end: Timestamp,
    candidate_start: Timestamp,
    candidate_end: Timestamp,
) -> bool {
    existing_start < candidate_end && candidate_start < existing_end
}

/// Weekday index used by operating hours: 0 = Sunday .. 6 = Saturday.
pub fn weekday_index(date: NaiveDate) -> u8 {
    date.weekday().num_days_from_sunday() as u8
}

// ── Courts ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceStatus {
    Active,
    Maintenance,
    Closed,
}

impl ResourceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceStatus::Active => "active",
            ResourceStatus::Maintenance => "maintenance",
            ResourceStatus::Closed => "closed",
        }
    }
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "active" => Ok(ResourceStatus::Active),
            "maintenance" => Ok(ResourceStatus::Maintenance),
            "closed" => Ok(ResourceStatus::Closed),
            other => Err(format!("unknown resource status: {other}")),
        }
    }
}

/// Opening window of a court on one weekday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatingHour {
    pub day_of_week: u8,
    pub open_time: NaiveTime,
    /// `00:00` together with a later `open_time` means midnight at the end of the day.
    pub close_time: NaiveTime,
    pub is_closed: bool,
}

impl OperatingHour {
    pub fn open(day_of_week: u8, open_time: NaiveTime, close_time: NaiveTime) -> Self {
        Self {
            day_of_week,
            open_time,
            close_time,
            is_closed: false,
        }
    }

    pub fn closed(day_of_week: u8) -> Self {
        Self {
            day_of_week,
            open_time: NaiveTime::MIN,
            close_time: NaiveTime::MIN,
            is_closed: true,
        }
    }

    /// Concrete opening window on `date`, or `None` when the court does not open.
    pub fn window(&self, date: NaiveDate) -> Option<Span> {
        if self.is_closed {
            return None;
        }
        let start = date.and_time(self.open_time);
        let end = if self.close_time == NaiveTime::MIN {
            date.and_time(NaiveTime::MIN) + TimeDelta::days(1)
        } else {
            date.and_time(self.close_time)
        };
        (start < end).then(|| Span::new(start, end))
    }
}

/// Schedule given to a freshly created court: 08:00-22:00 every day.
pub fn default_week() -> [OperatingHour; 7] {
    let open = NaiveTime::from_hms_opt(8, 0, 0).unwrap_or_default();
    let close = NaiveTime::from_hms_opt(22, 0, 0).unwrap_or_default();
    std::array::from_fn(|day| OperatingHour::open(day as u8, open, close))
}

// ── Reservations ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    Paid,
    Cancelled,
    Completed,
    NoShow,
}

impl ReservationStatus {
    /// Active reservations block their interval on the court.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            ReservationStatus::Pending | ReservationStatus::Confirmed | ReservationStatus::Paid
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Pending => "pending",
            ReservationStatus::Confirmed => "confirmed",
            ReservationStatus::Paid => "paid",
            ReservationStatus::Cancelled => "cancelled",
            ReservationStatus::Completed => "completed",
            ReservationStatus::NoShow => "no_show",
        }
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReservationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(ReservationStatus::Pending),
            "confirmed" => Ok(ReservationStatus::Confirmed),
            "paid" => Ok(ReservationStatus::Paid),
            "cancelled" | "canceled" => Ok(ReservationStatus::Cancelled),
            "completed" => Ok(ReservationStatus::Completed),
            "no_show" => Ok(ReservationStatus::NoShow),
            other => Err(format!("unknown reservation status: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Ulid,
    pub resource_id: Ulid,
    pub customer_id: Ulid,
    pub span: Span,
    pub status: ReservationStatus,
    #[serde(with = "rust_decimal::serde::str")]
    pub total_price: Decimal,
    pub notes: Option<String>,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: Ulid,
    pub email: String,
    pub name: String,
    pub phone: Option<String>,
}

/// Partial court update. `None` keeps the current value.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ResourceChanges {
    pub name: Option<String>,
    pub hourly_rate: Option<Decimal>,
    pub status: Option<ResourceStatus>,
}

/// Partial reservation update. `None` keeps the current value.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ReservationChanges {
    pub resource_id: Option<Ulid>,
    pub start: Option<Timestamp>,
    pub end: Option<Timestamp>,
    pub status: Option<ReservationStatus>,
    /// `Some(None)` clears the notes.
    pub notes: Option<Option<String>>,
}

// ── Per-court state ──────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ResourceState {
    pub id: Ulid,
    pub name: String,
    pub hourly_rate: Decimal,
    pub status: ResourceStatus,
    /// Indexed by weekday, 0 = Sunday.
    pub hours: [OperatingHour; 7],
    /// Every reservation on this court regardless of status, sorted by `span.start`.
    pub reservations: Vec<Reservation>,
}

impl ResourceState {
    pub fn new(id: Ulid, name: String, hourly_rate: Decimal, status: ResourceStatus) -> Self {
        Self {
            id,
            name,
            hourly_rate,
            status,
            hours: default_week(),
            reservations: Vec::new(),
        }
    }

    pub fn hours_for(&self, date: NaiveDate) -> &OperatingHour {
        &self.hours[weekday_index(date) as usize]
    }

    pub fn set_hours(&mut self, hours: OperatingHour) {
        self.hours[hours.day_of_week as usize % 7] = hours;
    }

    /// Insert reservation maintaining sort order by span.start.
    pub fn insert_reservation(&mut self, reservation: Reservation) {
        let pos = self
            .reservations
            .binary_search_by_key(&reservation.span.start, |r| r.span.start)
            .unwrap_or_else(|e| e);
        self.reservations.insert(pos, reservation);
    }

    pub fn remove_reservation(&mut self, id: Ulid) -> Option<Reservation> {
        let pos = self.reservations.iter().position(|r| r.id == id)?;
        Some(self.reservations.remove(pos))
    }

    pub fn get_reservation(&self, id: Ulid) -> Option<&Reservation> {
        self.reservations.iter().find(|r| r.id == id)
    }

    /// Return only reservations whose span overlaps the query window.
    /// Uses binary search to skip reservations starting at or after `query.end`.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &Reservation> {
        let right_bound = self
            .reservations
            .partition_point(|r| r.span.start < query.end);
        self.reservations[..right_bound]
            .iter()
            .filter(move |r| r.span.end > query.start)
    }

    /// Like [`overlapping`](Self::overlapping) but skips reservations that no longer hold the court.
    pub fn active_overlapping(&self, query: &Span) -> impl Iterator<Item = &Reservation> {
        self.overlapping(query).filter(|r| r.status.is_active())
    }

    pub fn info(&self) -> ResourceInfo {
        ResourceInfo {
            id: self.id,
            name: self.name.clone(),
            hourly_rate: self.hourly_rate,
            status: self.status,
        }
    }
}

/// WAL record format. Flat: no nesting beyond value types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    ResourceCreated {
        id: Ulid,
        name: String,
        #[serde(with = "rust_decimal::serde::str")]
        hourly_rate: Decimal,
        status: ResourceStatus,
    },
    ResourceUpdated {
        id: Ulid,
        name: String,
        #[serde(with = "rust_decimal::serde::str")]
        hourly_rate: Decimal,
        status: ResourceStatus,
    },
    ResourceDeleted {
        id: Ulid,
    },
    OperatingHoursSet {
        resource_id: Ulid,
        hours: OperatingHour,
    },
    CustomerUpserted {
        customer: Customer,
    },
    ReservationCreated {
        reservation: Reservation,
    },
    /// `previous_resource_id` differs from `reservation.resource_id` when the booking moved courts.
    ReservationUpdated {
        previous_resource_id: Ulid,
        reservation: Reservation,
    },
    ReservationDeleted {
        id: Ulid,
        resource_id: Ulid,
    },
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceInfo {
    pub id: Ulid,
    pub name: String,
    pub hourly_rate: Decimal,
    pub status: ResourceStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotAvailability {
    pub span: Span,
    pub available: bool,
}

/// Per-day slot grid for one court.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailabilityGrid {
    pub resource_id: Ulid,
    pub date: NaiveDate,
    /// `None` when the court does not open that day.
    pub operating_hours: Option<(NaiveTime, NaiveTime)>,
    pub slots: Vec<SlotAvailability>,
}

impl AvailabilityGrid {
    pub fn closed(resource_id: Ulid, date: NaiveDate) -> Self {
        Self {
            resource_id,
            date,
            operating_hours: None,
            slots: Vec::new(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.operating_hours.is_none()
    }
}
