use ulid::Ulid;

use crate::model::*;

use super::EngineError;

/// Wall clock in Unix milliseconds.
pub fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as Ms)
        .unwrap_or(0)
}

pub(crate) fn validate_span(span: &Span) -> Result<(), EngineError> {
    use crate::limits::*;
    if span.start < MIN_VALID_TIMESTAMP_MS || span.end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    if span.duration_ms() > MAX_SPAN_DURATION_MS {
        return Err(EngineError::LimitExceeded("span too wide"));
    }
    Ok(())
}

/// First span in `existing` (in order) that overlaps any candidate.
///
/// Touching endpoints do not conflict. A conflict is a normal outcome, not an error.
pub fn detect_conflict<'a, I>(candidates: &[Span], existing: I) -> Option<Span>
where
    I: IntoIterator<Item = &'a Span>,
{
    if candidates.is_empty() {
        return None;
    }
    // Candidates outside this hull can't overlap anything.
    let hull_start = candidates.iter().map(|c| c.start).min()?;
    let hull_end = candidates.iter().map(|c| c.end).max()?;

    existing
        .into_iter()
        .filter(|e| e.start < hull_end && hull_start < e.end)
        .find(|e| candidates.iter().any(|c| c.overlaps(e)))
        .copied()
}

/// Spans the conflict check must consider for a booking on `access_points`,
/// narrowed to the hull of `candidates`.
pub(crate) fn scoped_spans(
    site: &SiteState,
    scope: ConflictScope,
    access_points: &[Ulid],
    candidates: &[Span],
) -> Vec<Span> {
    let (Some(start), Some(end)) = (
        candidates.iter().map(|c| c.start).min(),
        candidates.iter().map(|c| c.end).max(),
    ) else {
        return Vec::new();
    };
    site.overlapping(&Span { start, end })
        .filter(|r| scope == ConflictScope::Site || access_points.contains(&r.resource_id))
        .map(|r| r.span)
        .collect()
}

/// Reject the candidate spans if they collide with reservations in scope.
pub(crate) fn check_no_conflict(
    site: &SiteState,
    scope: ConflictScope,
    access_points: &[Ulid],
    candidates: &[Span],
) -> Result<(), EngineError> {
    let existing = scoped_spans(site, scope, access_points, candidates);
    match detect_conflict(candidates, &existing) {
        Some(span) => Err(EngineError::ScheduleConflict(span)),
        None => Ok(()),
    }
}
