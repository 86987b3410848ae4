mod access;
mod availability;
mod conflict;
mod error;
mod mutations;
mod queries;
mod store;
#[cfg(test)]
mod tests;
mod validate;

pub use access::{open_access_point, AccessOutcome};
pub use availability::{free_slots, merge_overlapping};
pub use conflict::{detect_conflict, now_ms};
pub use error::EngineError;
pub use store::ReservationStore;
pub use validate::{validate_access_attempt, validate_booking, validate_free_slot_query, BookingRequest};

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, OwnedRwLockWriteGuard, RwLock};
use ulid::Ulid;

use crate::model::*;
use crate::observability::{WAL_FLUSH_BATCH_SIZE, WAL_FLUSH_DURATION_SECONDS};
use crate::wal::Wal;

pub type SharedSiteState = Arc<RwLock<SiteState>>;

/// Which reservations the booking conflict check and the free-slot query look at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    pub conflict_scope: ConflictScope,
    pub free_slot_scope: ConflictScope,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            conflict_scope: ConflictScope::Site,
            free_slot_scope: ConflictScope::AccessPoint,
        }
    }
}

// ── Group-commit WAL channel ─────────────────────────────

type Ack = oneshot::Sender<io::Result<()>>;

pub(super) enum WalCommand {
    Append { event: Event, response: Ack },
    Compact { events: Vec<Event>, response: Ack },
    AppendsSinceCompact { response: oneshot::Sender<u64> },
}

/// Owns the WAL. Appends that queue up while a flush is pending are
/// written together and share one fsync.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let (event, response) = match cmd {
            WalCommand::Append { event, response } => (event, response),
            other => {
                handle_non_append(&mut wal, other);
                continue;
            }
        };

        let mut batch = vec![(event, response)];
        let mut deferred = None;
        while let Ok(next) = rx.try_recv() {
            match next {
                WalCommand::Append { event, response } => batch.push((event, response)),
                other => {
                    deferred = Some(other);
                    break;
                }
            }
        }

        commit_batch(&mut wal, batch);
        if let Some(other) = deferred {
            handle_non_append(&mut wal, other);
        }
    }
}

fn commit_batch(wal: &mut Wal, batch: Vec<(Event, Ack)>) {
    metrics::histogram!(WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let started = std::time::Instant::now();

    let appended = batch
        .iter()
        .try_for_each(|(event, _)| wal.append_buffered(event));
    // Flush even after a failed append so no half-written batch leaks into the next one.
    let flushed = wal.flush_sync();
    let result = appended.and(flushed);

    metrics::histogram!(WAL_FLUSH_DURATION_SECONDS).record(started.elapsed().as_secs_f64());

    for (_, tx) in batch {
        let reply = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(reply);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { event, response } => commit_batch(wal, vec![(event, response)]),
    }
}

/// In-memory state of one tenant, rebuilt from its WAL on startup.
pub struct Engine {
    pub state: DashMap<Ulid, SharedSiteState>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub config: EngineConfig,
    pub(super) access_point_to_site: DashMap<Ulid, Ulid>,
    pub(super) booking_to_site: DashMap<Ulid, Ulid>,
    /// Access history keyed by the site id the attempt claimed.
    pub(super) audit: DashMap<Ulid, Vec<AuditRecord>>,
}

/// Reverse indexes touched when a site-level event is applied.
pub(super) struct Indexes<'a> {
    access_points: &'a DashMap<Ulid, Ulid>,
    bookings: &'a DashMap<Ulid, Ulid>,
}

/// Apply an event to a site. The caller holds the write lock.
fn apply_to_site(site: &mut SiteState, event: &Event, idx: &Indexes<'_>) {
    match event {
        Event::SiteUpdated { name, .. } => site.name = name.clone(),
        Event::AccessPointCreated { id, site_id, name }
        | Event::AccessPointUpdated { id, site_id, name } => {
            site.access_points.insert(
                *id,
                AccessPointInfo {
                    id: *id,
                    site_id: *site_id,
                    name: name.clone(),
                },
            );
            idx.access_points.insert(*id, *site_id);
        }
        Event::AccessPointDeleted { id, .. } => {
            site.access_points.remove(id);
            idx.access_points.remove(id);
        }
        Event::BookingCreated { booking } => {
            idx.bookings.insert(booking.id, booking.site_id);
            site.insert_booking(booking.clone());
        }
        Event::BookingRenamed { id, name, .. } => {
            if let Some(b) = site.bookings.get_mut(id) {
                b.name = name.clone();
            }
        }
        Event::BookingDeleted { id, .. } => {
            site.remove_booking(*id);
            idx.bookings.remove(id);
        }
        // Site create/delete live at the DashMap level, audit entries in their own map.
        Event::SiteCreated { .. } | Event::SiteDeleted { .. } | Event::AccessAttempted { .. } => {}
    }
}

/// Site an event applies to, for events handled by [`apply_to_site`].
fn event_site_id(event: &Event) -> Option<Ulid> {
    match event {
        Event::SiteUpdated { id, .. } => Some(*id),
        Event::AccessPointCreated { site_id, .. }
        | Event::AccessPointUpdated { site_id, .. }
        | Event::AccessPointDeleted { site_id, .. }
        | Event::BookingRenamed { site_id, .. }
        | Event::BookingDeleted { site_id, .. } => Some(*site_id),
        Event::BookingCreated { booking } => Some(booking.site_id),
        Event::SiteCreated { .. } | Event::SiteDeleted { .. } | Event::AccessAttempted { .. } => None,
    }
}

impl Engine {
    pub fn new(wal_path: PathBuf, config: EngineConfig) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            state: DashMap::new(),
            wal_tx,
            config,
            access_point_to_site: DashMap::new(),
            booking_to_site: DashMap::new(),
            audit: DashMap::new(),
        };

        for event in &events {
            engine.replay_event(event)?;
        }
        tracing::debug!("replayed {} events from {}", events.len(), wal_path.display());

        Ok(engine)
    }

    /// We are the only owner of the site Arcs during replay, so `try_write`
    /// cannot contend. Blocking lock calls are off limits here because lazy
    /// tenant creation runs inside the runtime.
    fn replay_event(&self, event: &Event) -> io::Result<()> {
        match event {
            Event::SiteCreated { id, name } => {
                self.state
                    .insert(*id, Arc::new(RwLock::new(SiteState::new(*id, name.clone()))));
            }
            Event::SiteDeleted { id } => self.forget_site(id),
            Event::AccessAttempted { record } => {
                self.audit.entry(record.site_id).or_default().push(record.clone());
            }
            other => {
                let Some(site) = event_site_id(other).and_then(|id| self.get_site(&id)) else {
                    return Ok(());
                };
                let mut guard = site
                    .try_write()
                    .map_err(|_| io::Error::other("site locked during replay"))?;
                apply_to_site(&mut guard, other, &self.indexes());
            }
        }
        Ok(())
    }

    fn indexes(&self) -> Indexes<'_> {
        Indexes {
            access_points: &self.access_point_to_site,
            bookings: &self.booking_to_site,
        }
    }

    /// Drop a site and every reverse index entry pointing at it.
    pub(super) fn forget_site(&self, id: &Ulid) {
        self.state.remove(id);
        self.access_point_to_site.retain(|_, site| site != id);
        self.booking_to_site.retain(|_, site| site != id);
    }

    /// Write event to WAL via the background group-commit writer.
    pub(super) async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub fn get_site(&self, id: &Ulid) -> Option<SharedSiteState> {
        self.state.get(id).map(|e| e.value().clone())
    }

    pub fn site_for_access_point(&self, access_point_id: &Ulid) -> Option<Ulid> {
        self.access_point_to_site.get(access_point_id).map(|e| *e.value())
    }

    pub fn site_for_booking(&self, booking_id: &Ulid) -> Option<Ulid> {
        self.booking_to_site.get(booking_id).map(|e| *e.value())
    }

    /// WAL-append, then apply to the locked site.
    pub(super) async fn persist_and_apply(
        &self,
        site: &mut SiteState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_site(site, event, &self.indexes());
        Ok(())
    }

    /// Write-lock a site that must exist.
    ///
    /// A delete may win the lock first and unlink the state, so the site is
    /// looked up again once the lock is held.
    pub(super) async fn site_write(
        &self,
        site_id: &Ulid,
    ) -> Result<OwnedRwLockWriteGuard<SiteState>, EngineError> {
        let site = self.get_site(site_id).ok_or(EngineError::NotFound(*site_id))?;
        let guard = site.clone().write_owned().await;
        match self.get_site(site_id) {
            Some(current) if Arc::ptr_eq(&current, &site) => Ok(guard),
            _ => Err(EngineError::NotFound(*site_id)),
        }
    }

    /// Look up the owning site of a child entity and write-lock it.
    pub(super) async fn resolve_child_write(
        &self,
        index: &DashMap<Ulid, Ulid>,
        child_id: &Ulid,
    ) -> Result<OwnedRwLockWriteGuard<SiteState>, EngineError> {
        let site_id = index
            .get(child_id)
            .map(|e| *e.value())
            .ok_or(EngineError::NotFound(*child_id))?;
        self.site_write(&site_id).await
    }
}
