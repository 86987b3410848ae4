use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds. Every timestamp and duration uses it.
pub type Ms = i64;

pub const MINUTE_MS: Ms = 60_000;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    /// Construct a span the caller already knows to be non-empty.
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    /// Checked constructor for untrusted input.
    pub fn try_new(start: Ms, end: Ms) -> Result<Self, SpanError> {
        if start >= end {
            return Err(SpanError::Invalid { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    /// Length in whole minutes, truncated.
    pub fn whole_minutes(&self) -> i64 {
        self.duration_ms() / MINUTE_MS
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_instant(&self, t: Ms) -> bool {
        self.start <= t && t < self.end
    }

    /// Restrict `self` to `bounds`. Fails when nothing is left.
    pub fn clip(&self, bounds: &Span) -> Result<Span, SpanError> {
        let start = self.start.max(bounds.start);
        let end = self.end.min(bounds.end);
        if start >= end {
            return Err(SpanError::Empty);
        }
        Ok(Span { start, end })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpanError {
    Invalid { start: Ms, end: Ms },
    Empty,
}

impl std::fmt::Display for SpanError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SpanError::Invalid { start, end } => {
                write!(f, "invalid interval: start {start} must be before end {end}")
            }
            SpanError::Empty => write!(f, "interval is empty"),
        }
    }
}

impl std::error::Error for SpanError {}

/// Which reservations a check looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictScope {
    /// Every reservation at the site, regardless of access point.
    #[default]
    Site,
    /// Only reservations on the same access point.
    AccessPoint,
}

impl std::str::FromStr for ConflictScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "site" => Ok(ConflictScope::Site),
            "access_point" | "accesspoint" => Ok(ConflictScope::AccessPoint),
            other => Err(format!("unknown scope: {other}")),
        }
    }
}

/// One booked span on one access point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub resource_id: Ulid,
    pub booking_id: Ulid,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPointInfo {
    pub id: Ulid,
    pub site_id: Ulid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingInfo {
    pub id: Ulid,
    pub site_id: Ulid,
    pub name: String,
    /// Requester e-mail addresses allowed to use the booking.
    pub requesters: Vec<String>,
    pub access_points: Vec<Ulid>,
    pub spans: Vec<Span>,
    pub created_by: Option<String>,
}

impl BookingInfo {
    /// N access points × M spans.
    pub fn reservations(&self) -> impl Iterator<Item = Reservation> + '_ {
        self.access_points.iter().flat_map(move |&resource_id| {
            self.spans.iter().map(move |&span| Reservation {
                resource_id,
                booking_id: self.id,
                span,
            })
        })
    }

    pub fn authorizes(&self, requester: &str) -> bool {
        self.requesters.iter().any(|r| r.eq_ignore_ascii_case(requester))
    }
}

#[derive(Debug, Clone)]
pub struct SiteState {
    pub id: Ulid,
    pub name: String,
    pub access_points: HashMap<Ulid, AccessPointInfo>,
    pub bookings: HashMap<Ulid, BookingInfo>,
    /// Reservations of every booking at the site, sorted by `span.start`.
    pub reservations: Vec<Reservation>,
}

impl SiteState {
    pub fn new(id: Ulid, name: String) -> Self {
        Self {
            id,
            name,
            access_points: HashMap::new(),
            bookings: HashMap::new(),
            reservations: Vec::new(),
        }
    }

    /// Insert reservation maintaining sort order by span.start.
    pub fn insert_reservation(&mut self, reservation: Reservation) {
        let pos = self
            .reservations
            .binary_search_by_key(&reservation.span.start, |r| r.span.start)
            .unwrap_or_else(|e| e);
        self.reservations.insert(pos, reservation);
    }

    /// Register a booking and its N×M reservations.
    pub fn insert_booking(&mut self, booking: BookingInfo) {
        for reservation in booking.reservations() {
            self.insert_reservation(reservation);
        }
        self.bookings.insert(booking.id, booking);
    }

    /// Remove a booking together with its reservations.
    pub fn remove_booking(&mut self, booking_id: Ulid) -> Option<BookingInfo> {
        let booking = self.bookings.remove(&booking_id)?;
        self.reservations.retain(|r| r.booking_id != booking_id);
        Some(booking)
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

    pub fn reservations_for(&self, resource_id: Ulid) -> impl Iterator<Item = &Reservation> {
        self.reservations
            .iter()
            .filter(move |r| r.resource_id == resource_id)
    }

    pub fn access_point_in_use(&self, access_point_id: &Ulid) -> bool {
        self.bookings
            .values()
            .any(|b| b.access_points.contains(access_point_id))
    }
}

// ── Access decisions ─────────────────────────────────────────────

/// Audit status of an access attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessStatus {
    Successful,
    NotSuccessful,
    Attempted,
}

impl AccessStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessStatus::Successful => "Successful",
            AccessStatus::NotSuccessful => "NotSuccessful",
            AccessStatus::Attempted => "Attempted",
        }
    }
}

/// Terminal state of the access decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessReason {
    ResourceNotFound,
    NoValidBooking,
    Granted,
}

impl AccessReason {
    pub fn message(&self) -> &'static str {
        match self {
            AccessReason::ResourceNotFound => "resource not found or does not belong to site",
            AccessReason::NoValidBooking => "no valid booking for this user at this time",
            AccessReason::Granted => "access granted",
        }
    }

    pub fn status(&self) -> AccessStatus {
        match self {
            AccessReason::ResourceNotFound => AccessStatus::Attempted,
            AccessReason::NoValidBooking => AccessStatus::NotSuccessful,
            AccessReason::Granted => AccessStatus::Successful,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessAttempt {
    pub access_point_id: Ulid,
    pub site_id: Ulid,
    pub requester: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessDecision {
    pub granted: bool,
    pub reason: AccessReason,
    pub timestamp: Ms,
    pub resource_id: Ulid,
    pub site_id: Ulid,
    pub requester: String,
}

impl AccessDecision {
    pub fn new(attempt: &AccessAttempt, reason: AccessReason, timestamp: Ms) -> Self {
        Self {
            granted: reason == AccessReason::Granted,
            reason,
            timestamp,
            resource_id: attempt.access_point_id,
            site_id: attempt.site_id,
            requester: attempt.requester.clone(),
        }
    }
}

/// Append-only access history entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: Ulid,
    pub access_point_id: Ulid,
    pub site_id: Ulid,
    pub requester: String,
    pub timestamp: Ms,
    pub status: AccessStatus,
    pub reason: String,
}

impl AuditRecord {
    pub fn from_decision(decision: &AccessDecision) -> Self {
        Self {
            id: Ulid::new(),
            access_point_id: decision.resource_id,
            site_id: decision.site_id,
            requester: decision.requester.clone(),
            timestamp: decision.timestamp,
            status: decision.reason.status(),
            reason: decision.reason.message().to_string(),
        }
    }
}

/// WAL record format. One variant per state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    SiteCreated {
        id: Ulid,
        name: String,
    },
    SiteUpdated {
        id: Ulid,
        name: String,
    },
    SiteDeleted {
        id: Ulid,
    },
    AccessPointCreated {
        id: Ulid,
        site_id: Ulid,
        name: String,
    },
    AccessPointUpdated {
        id: Ulid,
        site_id: Ulid,
        name: String,
    },
    AccessPointDeleted {
        id: Ulid,
        site_id: Ulid,
    },
    BookingCreated {
        booking: BookingInfo,
    },
    BookingRenamed {
        id: Ulid,
        site_id: Ulid,
        name: String,
    },
    BookingDeleted {
        id: Ulid,
        site_id: Ulid,
    },
    AccessAttempted {
        record: AuditRecord,
    },
}

// ── Query types ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteInfo {
    pub id: Ulid,
    pub name: String,
    pub access_points: usize,
    pub bookings: usize,
}

/// A free sub-interval of a query window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreeSlot {
    pub start: Ms,
    pub end: Ms,
}

impl From<Span> for FreeSlot {
    fn from(span: Span) -> Self {
        Self {
            start: span.start,
            end: span.end,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HistorySortKey {
    /// Access point name.
    #[default]
    Name,
    SiteName,
    Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HistorySort {
    pub key: HistorySortKey,
    pub descending: bool,
}

/// Access history row joined with the current names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub record: AuditRecord,
    pub access_point_name: Option<String>,
    pub site_name: Option<String>,
}
