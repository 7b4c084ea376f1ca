use chrono::Datelike;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::EngineError;

pub(crate) fn validate_span(span: &Span) -> Result<(), EngineError> {
    if span.start >= span.end {
        return Err(EngineError::Validation("end must be after start".into()));
    }
    let years = MIN_VALID_YEAR..=MAX_VALID_YEAR;
    if !years.contains(&span.start.year()) || !years.contains(&span.end.year()) {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    if span.duration().num_seconds() > MAX_RESERVATION_SECS {
        return Err(EngineError::LimitExceeded("reservation too long"));
    }
    Ok(())
}

pub(crate) fn validate_operating_hour(hours: &OperatingHour) -> Result<(), EngineError> {
    if hours.day_of_week > 6 {
        return Err(EngineError::Validation(format!(
            "day_of_week must be 0-6, got {}",
            hours.day_of_week
        )));
    }
    if !hours.is_closed {
        // Any date works: the window only depends on the clock times.
        let sample_day = chrono::NaiveDate::from_ymd_opt(2000, 1, 2).unwrap_or_default();
        if hours.window(sample_day).is_none() {
            return Err(EngineError::Validation(format!(
                "open_time {} must be before close_time {}",
                hours.open_time.format("%H:%M"),
                hours.close_time.format("%H:%M")
            )));
        }
    }
    Ok(())
}

/// First active reservation on `rs` overlapping `span`, ignoring `exclude`.
pub(crate) fn find_conflict<'a>(
    rs: &'a ResourceState,
    span: &Span,
    exclude: Option<Ulid>,
) -> Option<&'a Reservation> {
    rs.active_overlapping(span)
        .find(|r| Some(r.id) != exclude)
}

pub(crate) fn check_no_conflict(
    rs: &ResourceState,
    span: &Span,
    exclude: Option<Ulid>,
) -> Result<(), EngineError> {
    match find_conflict(rs, span, exclude) {
        Some(existing) => Err(EngineError::Conflict(existing.id)),
        None => Ok(()),
    }
}

/// The court must open on the weekday the reservation starts.
pub(crate) fn check_open(rs: &ResourceState, span: &Span) -> Result<(), EngineError> {
    let date = span.start.date();
    if rs.hours_for(date).window(date).is_none() {
        return Err(EngineError::Closed {
            resource_id: rs.id,
            date,
        });
    }
    Ok(())
}

pub(crate) fn check_bookable(rs: &ResourceState) -> Result<(), EngineError> {
    if rs.status != ResourceStatus::Active {
        return Err(EngineError::ResourceUnavailable {
            id: rs.id,
            status: rs.status,
        });
    }
    Ok(())
}

pub(crate) fn check_notes(notes: &Option<String>) -> Result<(), EngineError> {
    if let Some(n) = notes
        && n.len() > MAX_NOTES_LEN {
            return Err(EngineError::LimitExceeded("notes too long"));
        }
    Ok(())
}

/// Customers are keyed by trimmed, lowercased email.
pub(crate) fn normalize_email(raw: &str) -> Result<String, EngineError> {
    let email = raw.trim().to_lowercase();
    if email.len() > MAX_EMAIL_LEN {
        return Err(EngineError::LimitExceeded("email too long"));
    }
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(email),
        _ => Err(EngineError::Validation(format!("invalid email: {raw:?}"))),
    }
}

pub(crate) fn check_name(name: &str) -> Result<(), EngineError> {
    if name.trim().is_empty() {
        return Err(EngineError::Validation("name must not be empty".into()));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(EngineError::LimitExceeded("name too long"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};
    use rust_decimal::Decimal;

    fn at(day: u32, h: u32, m: u32) -> Timestamp {
        NaiveDate::from_ymd_opt(2025, 1, day)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn court_with(reservations: Vec<(Ulid, Span, ReservationStatus)>) -> ResourceState {
        let mut rs = ResourceState::new(Ulid::new(), "A".into(), Decimal::from(100), ResourceStatus::Active);
        for (id, span, status) in reservations {
            rs.insert_reservation(Reservation {
                id,
                resource_id: rs.id,
                customer_id: Ulid::new(),
                span,
                status,
                total_price: Decimal::ZERO,
                notes: None,
                created_at: at(1, 0, 0),
            });
        }
        rs
    }

    #[test]
    fn conflict_reports_existing_id() {
        let existing = Ulid::new();
        let rs = court_with(vec![(
            existing,
            Span::new(at(6, 10, 0), at(6, 12, 0)),
            ReservationStatus::Confirmed,
        )]);
        let err = check_no_conflict(&rs, &Span::new(at(6, 11, 0), at(6, 13, 0)), None).unwrap_err();
        assert!(matches!(err, EngineError::Conflict(id) if id == existing));
    }

    #[test]
    fn back_to_back_is_not_a_conflict() {
        let rs = court_with(vec![(
            Ulid::new(),
            Span::new(at(6, 10, 0), at(6, 12, 0)),
            ReservationStatus::Confirmed,
        )]);
        assert!(check_no_conflict(&rs, &Span::new(at(6, 12, 0), at(6, 13, 0)), None).is_ok());
        assert!(check_no_conflict(&rs, &Span::new(at(6, 9, 0), at(6, 10, 0)), None).is_ok());
    }

    #[test]
    fn excluded_reservation_is_ignored() {
        let own = Ulid::new();
        let rs = court_with(vec![(
            own,
            Span::new(at(6, 10, 0), at(6, 12, 0)),
            ReservationStatus::Paid,
        )]);
        let span = Span::new(at(6, 10, 0), at(6, 12, 0));
        assert!(check_no_conflict(&rs, &span, Some(own)).is_ok());
        assert!(check_no_conflict(&rs, &span, Some(Ulid::new())).is_err());
    }

    #[test]
    fn inactive_reservations_never_conflict() {
        let rs = court_with(vec![
            (Ulid::new(), Span::new(at(6, 10, 0), at(6, 12, 0)), ReservationStatus::Cancelled),
            (Ulid::new(), Span::new(at(6, 10, 0), at(6, 12, 0)), ReservationStatus::Completed),
            (Ulid::new(), Span::new(at(6, 10, 0), at(6, 12, 0)), ReservationStatus::NoShow),
        ]);
        assert!(check_no_conflict(&rs, &Span::new(at(6, 10, 0), at(6, 12, 0)), None).is_ok());
    }

    #[test]
    fn validate_span_rejects_inverted_and_empty() {
        let inverted = Span { start: at(6, 12, 0), end: at(6, 10, 0) };
        let empty = Span { start: at(6, 12, 0), end: at(6, 12, 0) };
        assert!(matches!(validate_span(&inverted), Err(EngineError::Validation(_))));
        assert!(matches!(validate_span(&empty), Err(EngineError::Validation(_))));
        assert!(validate_span(&Span::new(at(6, 12, 0), at(6, 12, 1))).is_ok());
    }

    #[test]
    fn validate_span_rejects_overlong() {
        let span = Span::new(at(1, 0, 0), at(9, 0, 0));
        assert!(matches!(validate_span(&span), Err(EngineError::LimitExceeded(_))));
    }

    #[test]
    fn closed_weekday_is_reported() {
        let mut rs = court_with(vec![]);
        // 2025-01-07 is a Tuesday
        rs.set_hours(OperatingHour::closed(2));
        let err = check_open(&rs, &Span::new(at(7, 10, 0), at(7, 11, 0))).unwrap_err();
        let tuesday = NaiveDate::from_ymd_opt(2025, 1, 7).unwrap();
        assert!(matches!(err, EngineError::Closed { date, .. } if date == tuesday));
        assert!(check_open(&rs, &Span::new(at(6, 10, 0), at(6, 11, 0))).is_ok());
    }

    #[test]
    fn operating_hour_validation() {
        let t = |h| NaiveTime::from_hms_opt(h, 0, 0).unwrap();
        assert!(validate_operating_hour(&OperatingHour::open(0, t(8), t(22))).is_ok());
        assert!(validate_operating_hour(&OperatingHour::open(0, t(22), t(8))).is_err());
        assert!(validate_operating_hour(&OperatingHour::open(7, t(8), t(22))).is_err());
        assert!(validate_operating_hour(&OperatingHour::closed(4)).is_ok());
        assert!(validate_operating_hour(&OperatingHour::open(5, t(18), NaiveTime::MIN)).is_ok());
    }

    #[test]
    fn email_normalization() {
        assert_eq!(normalize_email("  Ana@Example.COM ").unwrap(), "ana@example.com");
        assert!(matches!(normalize_email("no-at-sign"), Err(EngineError::Validation(_))));
        assert!(matches!(normalize_email("@example.com"), Err(EngineError::Validation(_))));
        assert!(matches!(normalize_email("ana@"), Err(EngineError::Validation(_))));
        let long = format!("{}@example.com", "a".repeat(MAX_EMAIL_LEN));
        assert!(matches!(normalize_email(&long), Err(EngineError::LimitExceeded(_))));
    }

    #[test]
    fn names_must_be_present_and_bounded() {
        assert!(check_name("Court 1").is_ok());
        assert!(matches!(check_name("   "), Err(EngineError::Validation(_))));
        assert!(matches!(check_name(&"x".repeat(MAX_NAME_LEN + 1)), Err(EngineError::LimitExceeded(_))));
    }

    #[test]
    fn maintenance_court_is_not_bookable() {
        let mut rs = court_with(vec![]);
        assert!(check_bookable(&rs).is_ok());
        rs.status = ResourceStatus::Maintenance;
        assert!(matches!(
            check_bookable(&rs),
            Err(EngineError::ResourceUnavailable { status: ResourceStatus::Maintenance, .. })
        ));
    }
}
