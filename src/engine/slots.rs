use chrono::{NaiveDate, TimeDelta};

use crate::model::*;

/// Width of a display slot on the availability grid.
pub fn default_slot_width() -> TimeDelta {
    TimeDelta::hours(1)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotGrid {
    /// No operating-hour record for the weekday, or the day is marked closed.
    Closed,
    Open { window: Span, slots: Vec<Span> },
}

impl SlotGrid {
    pub fn slots(&self) -> &[Span] {
        match self {
            SlotGrid::Closed => &[],
            SlotGrid::Open { slots, .. } => slots,
        }
    }
}

/// Cut the day's opening window into consecutive `slot_width` slots.
///
/// Slots start at `open_time`; a trailing remainder shorter than `slot_width`
/// is dropped rather than emitted as a short slot.
pub fn generate_slots(
    hours: Option<&OperatingHour>,
    date: NaiveDate,
    slot_width: TimeDelta,
) -> SlotGrid {
    let Some(window) = hours.and_then(|h| h.window(date)) else {
        return SlotGrid::Closed;
    };

    let mut slots = Vec::new();
    if slot_width > TimeDelta::zero() {
        let mut cursor = window.start;
        while cursor + slot_width <= window.end {
            slots.push(Span::new(cursor, cursor + slot_width));
            cursor += slot_width;
        }
    }
    SlotGrid::Open { window, slots }
}
