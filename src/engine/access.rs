use tracing::{error, info};

use crate::model::*;
use crate::observability::{ACCESS_DECISIONS_TOTAL, AUDIT_FAILURES_TOTAL};

use super::store::ReservationStore;
use super::EngineError;

/// Result of one access attempt.
///
/// `audit_error` is set when the decision could not be written to the audit
/// log; the decision itself stands either way.
#[derive(Debug)]
pub struct AccessOutcome {
    pub decision: AccessDecision,
    pub audit_error: Option<EngineError>,
}

/// Evaluate an access attempt at `now` and record exactly one audit entry.
///
/// Store failures during lookup are returned as `Err`; denials are not errors.
pub async fn open_access_point<S>(
    store: &S,
    attempt: &AccessAttempt,
    now: Ms,
) -> Result<AccessOutcome, EngineError>
where
    S: ReservationStore + ?Sized,
{
    let reason = evaluate(store, attempt, now).await?;
    let decision = AccessDecision::new(attempt, reason, now);

    let status = reason.status().as_str();
    metrics::counter!(ACCESS_DECISIONS_TOTAL, "status" => status).increment(1);
    info!(
        "access {status} on {} at site {} by {}: {}",
        attempt.access_point_id,
        attempt.site_id,
        attempt.requester,
        reason.message()
    );

    let audit_error = match store
        .append_audit_record(AuditRecord::from_decision(&decision))
        .await
    {
        Ok(()) => None,
        Err(e) => {
            metrics::counter!(AUDIT_FAILURES_TOTAL).increment(1);
            error!("failed to record access attempt on {}: {e}", attempt.access_point_id);
            Some(e)
        }
    };

    Ok(AccessOutcome {
        decision,
        audit_error,
    })
}

/// ResourceLookup → ReservationLookup → terminal reason.
async fn evaluate<S>(store: &S, attempt: &AccessAttempt, now: Ms) -> Result<AccessReason, EngineError>
where
    S: ReservationStore + ?Sized,
{
    let access_point = match store.find_access_point(attempt.access_point_id).await? {
        Some(ap) if ap.site_id == attempt.site_id => ap,
        _ => return Ok(AccessReason::ResourceNotFound),
    };

    let reservations = store.reservations_for_resource(access_point.id).await?;
    for reservation in reservations.iter().filter(|r| r.span.contains_instant(now)) {
        if store
            .is_authorized(reservation.booking_id, &attempt.requester)
            .await?
        {
            return Ok(AccessReason::Granted);
        }
    }
    Ok(AccessReason::NoValidBooking)
}
