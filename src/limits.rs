use crate::model::Ms;

pub const MAX_SITES_PER_TENANT: usize = 100_000;
pub const MAX_ACCESS_POINTS_PER_SITE: usize = 10_000;
pub const MAX_RESERVATIONS_PER_SITE: usize = 1_000_000;
pub const MAX_ACCESS_POINTS_PER_BOOKING: usize = 1_000;
pub const MAX_SCHEDULES_PER_BOOKING: usize = 1_000;
pub const MAX_REQUESTERS_PER_BOOKING: usize = 1_000;

pub const MAX_NAME_LEN: usize = 100;
pub const MAX_REQUESTER_LEN: usize = 320;

/// 1970-01-01 .. 2200-01-01
pub const MIN_VALID_TIMESTAMP_MS: Ms = 0;
pub const MAX_VALID_TIMESTAMP_MS: Ms = 7_258_118_400_000;
/// A single schedule entry may not exceed ~1 year.
pub const MAX_SPAN_DURATION_MS: Ms = 366 * 24 * 3_600_000;
/// Free-slot and history windows may not exceed ~1 year.
pub const MAX_QUERY_WINDOW_MS: Ms = 366 * 24 * 3_600_000;

pub const MAX_TENANTS: usize = 1_000;
pub const MAX_TENANT_NAME_LEN: usize = 64;
