use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::{oneshot, RwLock};
use tracing::{info, warn};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability::{BOOKINGS_CREATED_TOTAL, BOOKING_CONFLICTS_TOTAL};

use super::conflict::{check_no_conflict, validate_span};
use super::validate::{validate_booking, validate_name, BookingRequest};
use super::{Engine, EngineError, WalCommand};

impl Engine {
    // ── Sites ────────────────────────────────────────────────

    pub async fn create_site(&self, id: Ulid, name: String) -> Result<(), EngineError> {
        validate_name(&name)?;
        if self.state.len() >= MAX_SITES_PER_TENANT {
            return Err(EngineError::LimitExceeded("too many sites"));
        }
        if self.state.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }

        let event = Event::SiteCreated {
            id,
            name: name.clone(),
        };
        self.wal_append(&event).await?;
        self.state
            .insert(id, Arc::new(RwLock::new(SiteState::new(id, name))));
        info!("site {id} created");
        Ok(())
    }

    pub async fn update_site(&self, id: Ulid, name: String) -> Result<(), EngineError> {
        validate_name(&name)?;
        let mut guard = self.site_write(&id).await?;
        let event = Event::SiteUpdated { id, name };
        self.persist_and_apply(&mut guard, &event).await
    }

    pub async fn delete_site(&self, id: Ulid) -> Result<(), EngineError> {
        let guard = self.site_write(&id).await?;
        if !guard.access_points.is_empty() {
            return Err(EngineError::HasAccessPoints(id));
        }

        self.wal_append(&Event::SiteDeleted { id }).await?;
        self.forget_site(&id);
        drop(guard);
        info!("site {id} deleted");
        Ok(())
    }

    // ── Access points ────────────────────────────────────────

    pub async fn create_access_point(
        &self,
        id: Ulid,
        site_id: Ulid,
        name: String,
    ) -> Result<(), EngineError> {
        validate_name(&name)?;
        if self.access_point_to_site.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }
        let mut guard = self.site_write(&site_id).await?;
        if guard.access_points.len() >= MAX_ACCESS_POINTS_PER_SITE {
            return Err(EngineError::LimitExceeded("too many access points on site"));
        }

        let event = Event::AccessPointCreated { id, site_id, name };
        self.persist_and_apply(&mut guard, &event).await
    }

    pub async fn update_access_point(&self, id: Ulid, name: String) -> Result<Ulid, EngineError> {
        validate_name(&name)?;
        let mut guard = self
            .resolve_child_write(&self.access_point_to_site, &id)
            .await?;
        let site_id = guard.id;
        let event = Event::AccessPointUpdated { id, site_id, name };
        self.persist_and_apply(&mut guard, &event).await?;
        Ok(site_id)
    }

    /// Refused while any booking still references the access point.
    pub async fn delete_access_point(&self, id: Ulid) -> Result<Ulid, EngineError> {
        let mut guard = self
            .resolve_child_write(&self.access_point_to_site, &id)
            .await?;
        if guard.access_point_in_use(&id) {
            return Err(EngineError::InUse(id));
        }
        let site_id = guard.id;
        let event = Event::AccessPointDeleted { id, site_id };
        self.persist_and_apply(&mut guard, &event).await?;
        Ok(site_id)
    }

    // ── Bookings ─────────────────────────────────────────────

    /// Validate, conflict-check and store a booking with its reservations.
    ///
    /// The check and the insert happen under the site's write lock, so two
    /// overlapping bookings racing on the same site cannot both succeed.
    pub async fn create_booking(
        &self,
        request: BookingRequest,
        created_by: Option<String>,
    ) -> Result<BookingInfo, EngineError> {
        if let Err(e) = validate_booking(&request) {
            warn!("booking {} rejected: {e}", request.id);
            return Err(e);
        }
        for span in &request.spans {
            validate_span(span)?;
        }

        let mut access_points = request.access_points;
        let mut seen = HashSet::new();
        access_points.retain(|ap| seen.insert(*ap));

        let mut guard = self.site_write(&request.site_id).await?;
        if self.booking_to_site.contains_key(&request.id) {
            return Err(EngineError::AlreadyExists(request.id));
        }
        for ap in &access_points {
            if guard.access_points.contains_key(ap) {
                continue;
            }
            return Err(match self.site_for_access_point(ap) {
                Some(_) => EngineError::WrongSite {
                    access_point_id: *ap,
                    site_id: request.site_id,
                },
                None => EngineError::NotFound(*ap),
            });
        }
        let added = access_points.len() * request.spans.len();
        if guard.reservations.len() + added > MAX_RESERVATIONS_PER_SITE {
            return Err(EngineError::LimitExceeded("too many reservations on site"));
        }

        if let Err(e) = check_no_conflict(
            &guard,
            self.config.conflict_scope,
            &access_points,
            &request.spans,
        ) {
            metrics::counter!(BOOKING_CONFLICTS_TOTAL).increment(1);
            warn!("booking {} rejected: {e}", request.id);
            return Err(e);
        }

        let booking = BookingInfo {
            id: request.id,
            site_id: request.site_id,
            name: request.name,
            requesters: request.requesters,
            access_points,
            spans: request.spans,
            created_by,
        };
        let event = Event::BookingCreated {
            booking: booking.clone(),
        };
        self.persist_and_apply(&mut guard, &event).await?;

        metrics::counter!(BOOKINGS_CREATED_TOTAL).increment(1);
        info!(
            "booking {} created on site {} with {added} reservations",
            booking.id, booking.site_id
        );
        Ok(booking)
    }

    pub async fn rename_booking(&self, id: Ulid, name: String) -> Result<Ulid, EngineError> {
        validate_name(&name)?;
        let mut guard = self.resolve_child_write(&self.booking_to_site, &id).await?;
        let site_id = guard.id;
        let event = Event::BookingRenamed { id, site_id, name };
        self.persist_and_apply(&mut guard, &event).await?;
        Ok(site_id)
    }

    pub async fn delete_booking(&self, id: Ulid) -> Result<Ulid, EngineError> {
        let mut guard = self.resolve_child_write(&self.booking_to_site, &id).await?;
        let site_id = guard.id;
        let event = Event::BookingDeleted { id, site_id };
        self.persist_and_apply(&mut guard, &event).await?;
        info!("booking {id} deleted from site {site_id}");
        Ok(site_id)
    }

    // ── WAL maintenance ──────────────────────────────────────

    /// Rewrite the WAL with only the events needed to rebuild the current state.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let mut events = Vec::new();

        let sites: Vec<_> = self.state.iter().map(|e| e.value().clone()).collect();
        for site in sites {
            let guard = site.read().await;
            events.push(Event::SiteCreated {
                id: guard.id,
                name: guard.name.clone(),
            });
            for ap in guard.access_points.values() {
                events.push(Event::AccessPointCreated {
                    id: ap.id,
                    site_id: ap.site_id,
                    name: ap.name.clone(),
                });
            }
            for booking in guard.bookings.values() {
                events.push(Event::BookingCreated {
                    booking: booking.clone(),
                });
            }
        }

        for entry in self.audit.iter() {
            events.extend(
                entry
                    .value()
                    .iter()
                    .map(|record| Event::AccessAttempted {
                        record: record.clone(),
                    }),
            );
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
