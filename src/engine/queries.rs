use std::cmp::Ordering;
use std::collections::BTreeMap;

use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::access::{open_access_point, AccessOutcome};
use super::availability::{free_slots, merge_overlapping};
use super::store::ReservationStore;
use super::validate::{validate_access_attempt, validate_free_slot_query};
use super::{Engine, EngineError};

impl Engine {
    pub async fn list_sites(&self) -> Vec<SiteInfo> {
        let sites: Vec<_> = self.state.iter().map(|e| e.value().clone()).collect();
        let mut out = Vec::with_capacity(sites.len());
        for site in sites {
            let guard = site.read().await;
            out.push(SiteInfo {
                id: guard.id,
                name: guard.name.clone(),
                access_points: guard.access_points.len(),
                bookings: guard.bookings.len(),
            });
        }
        out
    }

    pub async fn list_access_points(&self, site_id: Ulid) -> Result<Vec<AccessPointInfo>, EngineError> {
        let site = self.get_site(&site_id).ok_or(EngineError::NotFound(site_id))?;
        let guard = site.read().await;
        let mut aps: Vec<_> = guard.access_points.values().cloned().collect();
        aps.sort_by_key(|ap| ap.id);
        Ok(aps)
    }

    pub async fn list_bookings(&self, site_id: Ulid) -> Result<Vec<BookingInfo>, EngineError> {
        let site = self.get_site(&site_id).ok_or(EngineError::NotFound(site_id))?;
        let guard = site.read().await;
        let mut bookings: Vec<_> = guard.bookings.values().cloned().collect();
        bookings.sort_by_key(|b| b.id);
        Ok(bookings)
    }

    /// Reservations of one access point, ordered by start.
    pub async fn list_reservations(&self, access_point_id: Ulid) -> Result<Vec<Reservation>, EngineError> {
        if self.site_for_access_point(&access_point_id).is_none() {
            return Err(EngineError::NotFound(access_point_id));
        }
        self.reservations_for_resource(access_point_id).await
    }

    /// Free sub-intervals of `[from, to)` on an access point that last at
    /// least `min_minutes`. Whether bookings on sibling access points count
    /// is decided by `free_slot_scope`.
    pub async fn free_slots(
        &self,
        access_point_id: Ulid,
        from: Ms,
        to: Ms,
        min_minutes: i64,
    ) -> Result<Vec<FreeSlot>, EngineError> {
        let window = validate_free_slot_query(access_point_id, from, to, min_minutes)?;
        if window.duration_ms() > MAX_QUERY_WINDOW_MS {
            return Err(EngineError::LimitExceeded("query window too wide"));
        }
        let access_point = self
            .find_access_point(access_point_id)
            .await?
            .ok_or(EngineError::NotFound(access_point_id))?;

        let reservations = match self.config.free_slot_scope {
            ConflictScope::AccessPoint => self.reservations_for_resource(access_point.id).await?,
            ConflictScope::Site => self.reservations_for_site(access_point.site_id).await?,
        };

        let mut booked: Vec<Span> = reservations
            .iter()
            .map(|r| r.span)
            .filter(|span| span.overlaps(&window))
            .collect();
        booked.sort_by_key(|s| s.start);

        Ok(free_slots(&window, min_minutes, &merge_overlapping(&booked)))
    }

    /// Distinct requesters across the site's bookings, compared without case
    /// and ordered by address. The first spelling seen is kept.
    pub async fn site_users(&self, site_id: Ulid) -> Result<Vec<String>, EngineError> {
        let site = self.get_site(&site_id).ok_or(EngineError::NotFound(site_id))?;
        let guard = site.read().await;
        let mut bookings: Vec<_> = guard.bookings.values().collect();
        bookings.sort_by_key(|b| b.id);

        let mut users: BTreeMap<String, String> = BTreeMap::new();
        for requester in bookings.iter().flat_map(|b| &b.requesters) {
            users
                .entry(requester.to_ascii_lowercase())
                .or_insert_with(|| requester.clone());
        }
        Ok(users.into_values().collect())
    }

    /// Validate, decide and audit one access attempt at `now`.
    pub async fn open_access_point(
        &self,
        attempt: &AccessAttempt,
        now: Ms,
    ) -> Result<AccessOutcome, EngineError> {
        validate_access_attempt(attempt)?;
        open_access_point(self, attempt, now).await
    }

    /// Audit records claimed for `site_id` with `from <= timestamp <= to`,
    /// joined with the current site and access point names.
    pub async fn access_history(
        &self,
        site_id: Ulid,
        from: Ms,
        to: Ms,
        sort: HistorySort,
    ) -> Result<Vec<HistoryEntry>, EngineError> {
        if from > to {
            return Err(EngineError::Validation(vec![
                "Start must not be after End.".into(),
            ]));
        }
        let records: Vec<AuditRecord> = self
            .audit
            .get(&site_id)
            .map(|log| {
                log.iter()
                    .filter(|r| r.timestamp >= from && r.timestamp <= to)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        let mut entries = Vec::with_capacity(records.len());
        match self.get_site(&site_id) {
            Some(site) => {
                let guard = site.read().await;
                for record in records {
                    let access_point_name = guard
                        .access_points
                        .get(&record.access_point_id)
                        .map(|ap| ap.name.clone());
                    entries.push(HistoryEntry {
                        record,
                        access_point_name,
                        site_name: Some(guard.name.clone()),
                    });
                }
            }
            None => entries.extend(records.into_iter().map(|record| HistoryEntry {
                record,
                access_point_name: None,
                site_name: None,
            })),
        }

        entries.sort_by(|a, b| {
            let ord = compare_history(a, b, sort.key);
            if sort.descending { ord.reverse() } else { ord }
        });
        Ok(entries)
    }
}

fn compare_history(a: &HistoryEntry, b: &HistoryEntry, key: HistorySortKey) -> Ordering {
    let by_time = a.record.timestamp.cmp(&b.record.timestamp);
    match key {
        HistorySortKey::Name => a.access_point_name.cmp(&b.access_point_name).then(by_time),
        HistorySortKey::SiteName => a.site_name.cmp(&b.site_name).then(by_time),
        HistorySortKey::Timestamp => by_time,
    }
}
