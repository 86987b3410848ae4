use std::collections::HashSet;

use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::EngineError;

/// A booking as submitted, before any checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingRequest {
    pub id: Ulid,
    pub site_id: Ulid,
    pub name: String,
    pub requesters: Vec<String>,
    pub access_points: Vec<Ulid>,
    pub spans: Vec<Span>,
}

/// Structural checks only. Every failing rule contributes one message.
pub fn validate_booking(request: &BookingRequest) -> Result<(), EngineError> {
    let mut errors = Vec::new();

    if request.site_id.is_nil() {
        errors.push("Site ID is required.".to_string());
    }

    if request.name.trim().is_empty() {
        errors.push("Name is required.".to_string());
    } else if request.name.chars().count() > MAX_NAME_LEN {
        errors.push(format!("Name must not exceed {MAX_NAME_LEN} characters."));
    }

    if request.requesters.is_empty() {
        errors.push("At least one user email is required.".to_string());
    } else {
        let mut seen = HashSet::new();
        for requester in &request.requesters {
            if !is_well_formed_email(requester) {
                errors.push(format!("'{requester}' is not a valid email address."));
            }
            if !seen.insert(requester.to_lowercase()) {
                errors.push(format!("User email '{requester}' is duplicated."));
            }
        }
        if request.requesters.len() > MAX_REQUESTERS_PER_BOOKING {
            errors.push("Too many user emails.".to_string());
        }
    }

    if request.access_points.is_empty() {
        errors.push("At least one access point is required.".to_string());
    } else {
        if request.access_points.iter().any(Ulid::is_nil) {
            errors.push("Access point must not be empty.".to_string());
        }
        if request.access_points.len() > MAX_ACCESS_POINTS_PER_BOOKING {
            errors.push("Too many access points.".to_string());
        }
    }

    if request.spans.is_empty() {
        errors.push("At least one schedule is required.".to_string());
    } else {
        for (i, span) in request.spans.iter().enumerate() {
            if span.start >= span.end {
                errors.push(format!("Schedule {i}: end time must be after the start time."));
            }
        }
        if request.spans.len() > MAX_SCHEDULES_PER_BOOKING {
            errors.push("Too many schedules.".to_string());
        }
    }

    into_result(errors)
}

pub fn validate_free_slot_query(
    access_point_id: Ulid,
    window_start: Ms,
    window_end: Ms,
    min_minutes: i64,
) -> Result<Span, EngineError> {
    let mut errors = Vec::new();
    if access_point_id.is_nil() {
        errors.push("Access Point ID is required.".to_string());
    }
    if min_minutes <= 0 {
        errors.push("Duration must be greater than zero.".to_string());
    }
    match Span::try_new(window_start, window_end) {
        Ok(window) => into_result(errors).map(|()| window),
        Err(e) => {
            errors.push(e.to_string());
            Err(EngineError::Validation(errors))
        }
    }
}

pub fn validate_access_attempt(attempt: &AccessAttempt) -> Result<(), EngineError> {
    let mut errors = Vec::new();
    if attempt.site_id.is_nil() {
        errors.push("Site ID is required.".to_string());
    }
    if attempt.access_point_id.is_nil() {
        errors.push("Access Point ID is required.".to_string());
    }
    if attempt.requester.trim().is_empty() {
        errors.push("Requester is required.".to_string());
    } else if attempt.requester.len() > MAX_REQUESTER_LEN {
        errors.push("Requester is too long.".to_string());
    }
    into_result(errors)
}

pub(crate) fn validate_name(name: &str) -> Result<(), EngineError> {
    if name.trim().is_empty() {
        return Err(EngineError::Validation(vec!["Name is required.".into()]));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(EngineError::LimitExceeded("name too long"));
    }
    Ok(())
}

fn into_result(errors: Vec<String>) -> Result<(), EngineError> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(EngineError::Validation(errors))
    }
}

/// `local@domain.tld`, no whitespace, one `@`.
fn is_well_formed_email(s: &str) -> bool {
    if s.len() > MAX_REQUESTER_LEN || s.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = s.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && domain.split('.').all(|label| !label.is_empty())
}
