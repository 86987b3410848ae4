use async_trait::async_trait;
use ulid::Ulid;

use crate::model::*;

use super::{Engine, EngineError};

/// Narrow view of the reservation store that the decision flows depend on.
///
/// Read-only apart from the audit append. Reservations are inserted by
/// [`Engine::create_booking`] under the site write lock.
#[async_trait]
pub trait ReservationStore: Send + Sync {
    async fn find_access_point(
        &self,
        access_point_id: Ulid,
    ) -> Result<Option<AccessPointInfo>, EngineError>;

    async fn reservations_for_resource(
        &self,
        resource_id: Ulid,
    ) -> Result<Vec<Reservation>, EngineError>;

    async fn reservations_for_site(&self, site_id: Ulid) -> Result<Vec<Reservation>, EngineError>;

    /// Whether `requester` is on the booking's requester list.
    async fn is_authorized(&self, booking_id: Ulid, requester: &str) -> Result<bool, EngineError>;

    async fn append_audit_record(&self, record: AuditRecord) -> Result<(), EngineError>;
}

#[async_trait]
impl ReservationStore for Engine {
    async fn find_access_point(
        &self,
        access_point_id: Ulid,
    ) -> Result<Option<AccessPointInfo>, EngineError> {
        let Some(site_id) = self.site_for_access_point(&access_point_id) else {
            return Ok(None);
        };
        let Some(site) = self.get_site(&site_id) else {
            return Ok(None);
        };
        let guard = site.read().await;
        Ok(guard.access_points.get(&access_point_id).cloned())
    }

    async fn reservations_for_resource(
        &self,
        resource_id: Ulid,
    ) -> Result<Vec<Reservation>, EngineError> {
        let Some(site_id) = self.site_for_access_point(&resource_id) else {
            return Ok(Vec::new());
        };
        let Some(site) = self.get_site(&site_id) else {
            return Ok(Vec::new());
        };
        let guard = site.read().await;
        Ok(guard.reservations_for(resource_id).copied().collect())
    }

    async fn reservations_for_site(&self, site_id: Ulid) -> Result<Vec<Reservation>, EngineError> {
        let Some(site) = self.get_site(&site_id) else {
            return Ok(Vec::new());
        };
        let guard = site.read().await;
        Ok(guard.reservations.clone())
    }

    async fn is_authorized(&self, booking_id: Ulid, requester: &str) -> Result<bool, EngineError> {
        let Some(site_id) = self.booking_to_site.get(&booking_id).map(|e| *e.value()) else {
            return Ok(false);
        };
        let Some(site) = self.get_site(&site_id) else {
            return Ok(false);
        };
        let guard = site.read().await;
        Ok(guard
            .bookings
            .get(&booking_id)
            .is_some_and(|b| b.authorizes(requester)))
    }

    async fn append_audit_record(&self, record: AuditRecord) -> Result<(), EngineError> {
        let event = Event::AccessAttempted { record };
        self.wal_append(&event).await?;
        if let Event::AccessAttempted { record } = event {
            self.audit.entry(record.site_id).or_default().push(record);
        }
        Ok(())
    }
}
