use rust_decimal::Decimal;

use crate::model::Span;

const MINUTES_PER_HOUR: i64 = 60;

/// Billable hours for a span: any started hour is charged in full.
///
/// Counted in whole minutes, so stray seconds never start a new hour.
pub fn billable_hours(span: &Span) -> i64 {
    let minutes = span.duration().num_minutes().max(0);
    (minutes + MINUTES_PER_HOUR - 1) / MINUTES_PER_HOUR
}

/// `ceil(duration in hours) * hourly_rate`. No proration, no minimum.
pub fn compute_price(span: &Span, hourly_rate: Decimal) -> Decimal {
    Decimal::from(billable_hours(span)) * hourly_rate
}
