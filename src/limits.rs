//! Hard caps that keep a single tenant from exhausting memory or the WAL.

pub const MAX_TENANTS: usize = 1_024;
pub const MAX_TENANT_NAME_LEN: usize = 128;

pub const MAX_RESOURCES_PER_TENANT: usize = 1_000;
pub const MAX_RESERVATIONS_PER_RESOURCE: usize = 200_000;
pub const MAX_CUSTOMERS_PER_TENANT: usize = 1_000_000;

pub const MAX_NAME_LEN: usize = 255;
pub const MAX_NOTES_LEN: usize = 2_000;
pub const MAX_EMAIL_LEN: usize = 254;
pub const MAX_PHONE_LEN: usize = 32;

/// Longest reservation accepted: one week.
pub const MAX_RESERVATION_SECS: i64 = 7 * 24 * 3_600;

/// Timestamps outside `[MIN_VALID_YEAR, MAX_VALID_YEAR]` are rejected.
pub const MIN_VALID_YEAR: i32 = 2000;
pub const MAX_VALID_YEAR: i32 = 2200;

/// Rows per multi-row INSERT.
pub const MAX_BATCH_SIZE: usize = 1_000;
