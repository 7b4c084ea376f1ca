use chrono::{NaiveDate, TimeDelta};

use crate::model::*;

use super::slots::{generate_slots, SlotGrid};

// ── Availability Algorithm ────────────────────────────────────────

/// Build the slot grid for `resource` on `date`.
///
/// A court that is not `active`, or that does not open on the date's weekday,
/// yields a closed grid. Otherwise each generated slot is available unless an
/// active reservation overlaps it or it starts before `now`.
pub fn availability(
    resource: &ResourceState,
    date: NaiveDate,
    slot_width: TimeDelta,
    now: Timestamp,
) -> AvailabilityGrid {
    if resource.status != ResourceStatus::Active {
        return AvailabilityGrid::closed(resource.id, date);
    }

    let hours = resource.hours_for(date);
    let slots = match generate_slots(Some(hours), date, slot_width) {
        SlotGrid::Closed => return AvailabilityGrid::closed(resource.id, date),
        SlotGrid::Open { slots, .. } => slots,
    };

    let day = Span::day(date);
    let booked: Vec<Span> = resource.active_overlapping(&day).map(|r| r.span).collect();

    let slots = slots
        .into_iter()
        .map(|slot| SlotAvailability {
            span: slot,
            available: slot.start >= now && !booked.iter().any(|b| b.overlaps(&slot)),
        })
        .collect();

    AvailabilityGrid {
        resource_id: resource.id,
        date,
        operating_hours: Some((hours.open_time, hours.close_time)),
        slots,
    }
}
