use super::*;
use super::conflict::validate_span;
use crate::limits::*;

const H: Ms = 3_600_000; // 1 hour in ms
const M: Ms = 60_000; // 1 minute in ms
const DAY: Ms = 1_767_225_600_000; // 2026-01-01T00:00:00Z

fn at(hours: Ms, minutes: Ms) -> Ms {
    DAY + hours * H + minutes * M
}

fn test_wal_path(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("sitegate_test_engine");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    let _ = std::fs::remove_file(&path);
    path
}

fn new_engine(name: &str) -> Engine {
    Engine::new(test_wal_path(name), EngineConfig::default()).unwrap()
}

/// Site with two doors.
async fn seed(engine: &Engine) -> (Ulid, Ulid, Ulid) {
    let site = Ulid::new();
    let front = Ulid::new();
    let back = Ulid::new();
    engine.create_site(site, "HQ".into()).await.unwrap();
    engine.create_access_point(front, site, "Front door".into()).await.unwrap();
    engine.create_access_point(back, site, "Back door".into()).await.unwrap();
    (site, front, back)
}

fn request(site: Ulid, access_points: Vec<Ulid>, spans: Vec<Span>) -> BookingRequest {
    BookingRequest {
        id: Ulid::new(),
        site_id: site,
        name: "Quarterly review".into(),
        requesters: vec!["r@example.com".into()],
        access_points,
        spans,
    }
}

fn attempt(site: Ulid, door: Ulid, requester: &str) -> AccessAttempt {
    AccessAttempt {
        access_point_id: door,
        site_id: site,
        requester: requester.into(),
    }
}

// ── Sites and access points ─────────────────────────────

#[tokio::test]
async fn create_and_list_sites() {
    let engine = new_engine("create_sites.wal");
    let (site, _, _) = seed(&engine).await;

    let sites = engine.list_sites().await;
    assert_eq!(sites.len(), 1);
    assert_eq!(sites[0].id, site);
    assert_eq!(sites[0].name, "HQ");
    assert_eq!(sites[0].access_points, 2);

    let dup = engine.create_site(site, "Again".into()).await;
    assert!(matches!(dup, Err(EngineError::AlreadyExists(id)) if id == site));
}

#[tokio::test]
async fn site_with_access_points_cannot_be_deleted() {
    let engine = new_engine("delete_site.wal");
    let (site, front, back) = seed(&engine).await;

    assert!(matches!(
        engine.delete_site(site).await,
        Err(EngineError::HasAccessPoints(_))
    ));

    engine.delete_access_point(front).await.unwrap();
    engine.delete_access_point(back).await.unwrap();
    engine.delete_site(site).await.unwrap();
    assert!(engine.get_site(&site).is_none());
    assert!(engine.list_sites().await.is_empty());
}

#[tokio::test]
async fn writer_queued_behind_site_delete_sees_not_found() {
    let engine = Arc::new(new_engine("delete_site_race.wal"));
    let site = Ulid::new();
    engine.create_site(site, "HQ".into()).await.unwrap();

    // Park both writers on the site lock, delete first.
    let held = engine.get_site(&site).unwrap().write_owned().await;
    let delete = tokio::spawn({
        let engine = engine.clone();
        async move { engine.delete_site(site).await }
    });
    tokio::task::yield_now().await;
    let door = Ulid::new();
    let create = tokio::spawn({
        let engine = engine.clone();
        async move { engine.create_access_point(door, site, "Front door".into()).await }
    });
    tokio::task::yield_now().await;
    let rename = tokio::spawn({
        let engine = engine.clone();
        async move { engine.update_site(site, "Renamed".into()).await }
    });
    tokio::task::yield_now().await;
    drop(held);

    delete.await.unwrap().unwrap();
    assert!(matches!(create.await.unwrap(), Err(EngineError::NotFound(id)) if id == site));
    assert!(matches!(rename.await.unwrap(), Err(EngineError::NotFound(id)) if id == site));
    assert!(engine.site_for_access_point(&door).is_none());
    assert!(engine.get_site(&site).is_none());

    // The id is free again and the new site starts empty.
    engine.create_site(site, "HQ again".into()).await.unwrap();
    assert!(engine.list_access_points(site).await.unwrap().is_empty());
}

#[tokio::test]
async fn access_point_in_use_cannot_be_deleted() {
    let engine = new_engine("delete_ap_in_use.wal");
    let (site, front, _) = seed(&engine).await;
    let booking = engine
        .create_booking(request(site, vec![front], vec![Span::new(at(10, 0), at(11, 0))]), None)
        .await
        .unwrap();

    assert!(matches!(
        engine.delete_access_point(front).await,
        Err(EngineError::InUse(_))
    ));

    engine.delete_booking(booking.id).await.unwrap();
    engine.delete_access_point(front).await.unwrap();
    assert_eq!(engine.list_access_points(site).await.unwrap().len(), 1);
}

#[tokio::test]
async fn rename_site_and_access_point() {
    let engine = new_engine("rename.wal");
    let (site, front, _) = seed(&engine).await;

    engine.update_site(site, "Head office".into()).await.unwrap();
    engine.update_access_point(front, "Main entrance".into()).await.unwrap();

    let sites = engine.list_sites().await;
    assert_eq!(sites[0].name, "Head office");
    let aps = engine.list_access_points(site).await.unwrap();
    assert!(aps.iter().any(|ap| ap.id == front && ap.name == "Main entrance"));
}

#[tokio::test]
async fn blank_names_rejected() {
    let engine = new_engine("blank_names.wal");
    assert!(matches!(
        engine.create_site(Ulid::new(), "  ".into()).await,
        Err(EngineError::Validation(_))
    ));
}

// ── Bookings ────────────────────────────────────────────

#[tokio::test]
async fn booking_expands_to_reservations() {
    let engine = new_engine("booking_expand.wal");
    let (site, front, back) = seed(&engine).await;

    let booking = engine
        .create_booking(
            request(
                site,
                vec![front, back],
                vec![Span::new(at(9, 0), at(10, 0)), Span::new(at(14, 0), at(15, 0))],
            ),
            Some("admin".into()),
        )
        .await
        .unwrap();
    assert_eq!(booking.created_by.as_deref(), Some("admin"));

    let rs = engine.get_site(&site).unwrap();
    let guard = rs.read().await;
    assert_eq!(guard.reservations.len(), 4);
    assert!(guard.reservations.windows(2).all(|w| w[0].span.start <= w[1].span.start));
    drop(guard);

    assert_eq!(engine.list_reservations(front).await.unwrap().len(), 2);
    assert_eq!(engine.list_reservations(back).await.unwrap().len(), 2);
}

#[tokio::test]
async fn duplicate_access_points_collapse() {
    let engine = new_engine("booking_dup_aps.wal");
    let (site, front, _) = seed(&engine).await;
    let booking = engine
        .create_booking(request(site, vec![front, front], vec![Span::new(at(9, 0), at(10, 0))]), None)
        .await
        .unwrap();
    assert_eq!(booking.access_points, vec![front]);
    assert_eq!(engine.list_reservations(front).await.unwrap().len(), 1);
}

#[tokio::test]
async fn overlapping_booking_on_same_site_rejected() {
    let engine = new_engine("booking_conflict.wal");
    let (site, front, back) = seed(&engine).await;
    engine
        .create_booking(request(site, vec![front], vec![Span::new(at(10, 0), at(11, 0))]), None)
        .await
        .unwrap();

    // Site scope: a different door still conflicts.
    let err = engine
        .create_booking(request(site, vec![back], vec![Span::new(at(10, 30), at(12, 0))]), None)
        .await
        .unwrap_err();
    assert!(err.is_conflict());
    assert_eq!(
        err.to_string(),
        format!(
            "Schedule already exists for booking: Start - {} and End - {}",
            at(10, 0),
            at(11, 0)
        )
    );

    // Nothing was stored for the rejected booking.
    assert!(engine.list_reservations(back).await.unwrap().is_empty());
}

#[tokio::test]
async fn touching_bookings_accepted() {
    let engine = new_engine("booking_touching.wal");
    let (site, front, _) = seed(&engine).await;
    engine
        .create_booking(request(site, vec![front], vec![Span::new(at(10, 0), at(11, 0))]), None)
        .await
        .unwrap();
    engine
        .create_booking(request(site, vec![front], vec![Span::new(at(11, 0), at(12, 0))]), None)
        .await
        .unwrap();
    engine
        .create_booking(request(site, vec![front], vec![Span::new(at(9, 0), at(10, 0))]), None)
        .await
        .unwrap();
    assert_eq!(engine.list_bookings(site).await.unwrap().len(), 3);
}

#[tokio::test]
async fn access_point_scope_allows_parallel_doors() {
    let config = EngineConfig {
        conflict_scope: ConflictScope::AccessPoint,
        ..EngineConfig::default()
    };
    let engine = Engine::new(test_wal_path("booking_ap_scope.wal"), config).unwrap();
    let (site, front, back) = seed(&engine).await;
    let span = Span::new(at(10, 0), at(11, 0));

    engine.create_booking(request(site, vec![front], vec![span]), None).await.unwrap();
    engine.create_booking(request(site, vec![back], vec![span]), None).await.unwrap();
    let again = engine.create_booking(request(site, vec![front], vec![span]), None).await;
    assert!(matches!(again, Err(EngineError::ScheduleConflict(_))));
}

#[tokio::test]
async fn booking_on_foreign_access_point_rejected() {
    let engine = new_engine("booking_foreign_ap.wal");
    let (site, _, _) = seed(&engine).await;
    let (_, other_door, _) = seed(&engine).await;

    let result = engine
        .create_booking(request(site, vec![other_door], vec![Span::new(at(9, 0), at(10, 0))]), None)
        .await;
    assert!(matches!(result, Err(EngineError::WrongSite { .. })));

    let result = engine
        .create_booking(request(site, vec![Ulid::new()], vec![Span::new(at(9, 0), at(10, 0))]), None)
        .await;
    assert!(matches!(result, Err(EngineError::NotFound(_))));
}

#[tokio::test]
async fn invalid_booking_collects_messages() {
    let engine = new_engine("booking_invalid.wal");
    let (site, front, _) = seed(&engine).await;
    let mut r = request(site, vec![front], vec![Span { start: at(11, 0), end: at(10, 0) }]);
    r.name = String::new();
    r.requesters = vec!["nope".into()];

    match engine.create_booking(r, None).await {
        Err(EngineError::Validation(errors)) => assert_eq!(errors.len(), 3),
        other => panic!("expected validation errors, got {other:?}"),
    }
    assert!(engine.list_bookings(site).await.unwrap().is_empty());
}

#[tokio::test]
async fn booking_for_unknown_site_rejected() {
    let engine = new_engine("booking_unknown_site.wal");
    let result = engine
        .create_booking(request(Ulid::new(), vec![Ulid::new()], vec![Span::new(at(9, 0), at(10, 0))]), None)
        .await;
    assert!(matches!(result, Err(EngineError::NotFound(_))));
}

#[tokio::test]
async fn rename_and_delete_booking() {
    let engine = new_engine("booking_rename_delete.wal");
    let (site, front, _) = seed(&engine).await;
    let booking = engine
        .create_booking(request(site, vec![front], vec![Span::new(at(10, 0), at(11, 0))]), None)
        .await
        .unwrap();

    engine.rename_booking(booking.id, "Renamed".into()).await.unwrap();
    assert_eq!(engine.list_bookings(site).await.unwrap()[0].name, "Renamed");

    assert_eq!(engine.delete_booking(booking.id).await.unwrap(), site);
    assert!(engine.list_reservations(front).await.unwrap().is_empty());
    assert!(matches!(
        engine.delete_booking(booking.id).await,
        Err(EngineError::NotFound(_))
    ));

    // The freed slot can be booked again.
    engine
        .create_booking(request(site, vec![front], vec![Span::new(at(10, 0), at(11, 0))]), None)
        .await
        .unwrap();
}

#[tokio::test]
async fn concurrent_overlapping_bookings_serialize() {
    let engine = Arc::new(new_engine("booking_race.wal"));
    let (site, front, back) = seed(&engine).await;
    let span = Span::new(at(10, 0), at(11, 0));

    let mut handles = Vec::new();
    for i in 0..16 {
        let engine = engine.clone();
        let door = if i % 2 == 0 { front } else { back };
        handles.push(tokio::spawn(async move {
            engine.create_booking(request(site, vec![door], vec![span]), None).await
        }));
    }

    let mut ok = 0;
    for h in handles {
        match h.await.unwrap() {
            Ok(_) => ok += 1,
            Err(e) => assert!(e.is_conflict(), "unexpected error: {e}"),
        }
    }
    assert_eq!(ok, 1);
    assert_eq!(engine.list_bookings(site).await.unwrap().len(), 1);
}

#[tokio::test]
async fn span_limits_enforced() {
    let engine = new_engine("booking_limits.wal");
    let (site, front, _) = seed(&engine).await;
    let too_wide = Span::new(DAY, DAY + MAX_SPAN_DURATION_MS + 1);
    assert!(validate_span(&too_wide).is_err());
    let result = engine
        .create_booking(request(site, vec![front], vec![too_wide]), None)
        .await;
    assert!(matches!(result, Err(EngineError::LimitExceeded(_))));
}

// ── Free slots ──────────────────────────────────────────

#[tokio::test]
async fn free_slots_around_booking() {
    let engine = new_engine("free_slots.wal");
    let (site, front, _) = seed(&engine).await;
    engine
        .create_booking(request(site, vec![front], vec![Span::new(at(10, 0), at(10, 30))]), None)
        .await
        .unwrap();

    let slots = engine.free_slots(front, at(9, 0), at(12, 0), 15).await.unwrap();
    assert_eq!(
        slots,
        vec![
            FreeSlot { start: at(9, 0), end: at(10, 0) },
            FreeSlot { start: at(10, 30), end: at(12, 0) },
        ]
    );
}

#[tokio::test]
async fn free_slots_empty_access_point_returns_window() {
    let engine = new_engine("free_slots_empty.wal");
    let (_, front, _) = seed(&engine).await;
    let slots = engine.free_slots(front, at(9, 0), at(9, 10), 60).await.unwrap();
    assert_eq!(slots, vec![FreeSlot { start: at(9, 0), end: at(9, 10) }]);
}

#[tokio::test]
async fn free_slots_scope() {
    let engine = new_engine("free_slots_scope.wal");
    let (site, front, back) = seed(&engine).await;
    engine
        .create_booking(request(site, vec![back], vec![Span::new(at(10, 0), at(11, 0))]), None)
        .await
        .unwrap();

    // Default free-slot scope is per access point: the back door booking is invisible.
    let slots = engine.free_slots(front, at(9, 0), at(12, 0), 15).await.unwrap();
    assert_eq!(slots, vec![FreeSlot { start: at(9, 0), end: at(12, 0) }]);

    let site_wide = Engine::new(
        test_wal_path("free_slots_scope_site.wal"),
        EngineConfig {
            free_slot_scope: ConflictScope::Site,
            ..EngineConfig::default()
        },
    )
    .unwrap();
    let (site, front, back) = seed(&site_wide).await;
    site_wide
        .create_booking(request(site, vec![back], vec![Span::new(at(10, 0), at(11, 0))]), None)
        .await
        .unwrap();
    let slots = site_wide.free_slots(front, at(9, 0), at(12, 0), 15).await.unwrap();
    assert_eq!(
        slots,
        vec![
            FreeSlot { start: at(9, 0), end: at(10, 0) },
            FreeSlot { start: at(11, 0), end: at(12, 0) },
        ]
    );
}

#[tokio::test]
async fn free_slots_rejects_bad_queries() {
    let engine = new_engine("free_slots_bad.wal");
    let (_, front, _) = seed(&engine).await;

    assert!(matches!(
        engine.free_slots(front, at(12, 0), at(9, 0), 15).await,
        Err(EngineError::Validation(_))
    ));
    assert!(matches!(
        engine.free_slots(front, at(9, 0), at(12, 0), 0).await,
        Err(EngineError::Validation(_))
    ));
    assert!(matches!(
        engine.free_slots(Ulid::new(), at(9, 0), at(12, 0), 15).await,
        Err(EngineError::NotFound(_))
    ));
    assert!(matches!(
        engine.free_slots(front, DAY, DAY + MAX_QUERY_WINDOW_MS + 1, 15).await,
        Err(EngineError::LimitExceeded(_))
    ));
}

// ── Access decisions ────────────────────────────────────

#[tokio::test]
async fn access_decisions_follow_reservations() {
    let engine = new_engine("access_decisions.wal");
    let (site, front, _) = seed(&engine).await;
    engine
        .create_booking(request(site, vec![front], vec![Span::new(at(10, 0), at(11, 0))]), None)
        .await
        .unwrap();

    let granted = engine
        .open_access_point(&attempt(site, front, "r@example.com"), at(10, 30))
        .await
        .unwrap();
    assert!(granted.decision.granted);
    assert!(granted.audit_error.is_none());

    let stranger = engine
        .open_access_point(&attempt(site, front, "x@example.com"), at(10, 30))
        .await
        .unwrap();
    assert_eq!(stranger.decision.reason, AccessReason::NoValidBooking);

    let late = engine
        .open_access_point(&attempt(site, front, "r@example.com"), at(11, 0))
        .await
        .unwrap();
    assert!(!late.decision.granted);

    let history = engine
        .access_history(site, at(0, 0), at(23, 59), HistorySort { key: HistorySortKey::Timestamp, descending: false })
        .await
        .unwrap();
    let statuses: Vec<_> = history.iter().map(|e| e.record.status).collect();
    assert_eq!(
        statuses,
        vec![AccessStatus::Successful, AccessStatus::NotSuccessful, AccessStatus::NotSuccessful]
    );
    assert!(history.iter().all(|e| e.access_point_name.as_deref() == Some("Front door")));
    assert!(history.iter().all(|e| e.site_name.as_deref() == Some("HQ")));
}

#[tokio::test]
async fn requester_match_ignores_case() {
    let engine = new_engine("access_case.wal");
    let (site, front, _) = seed(&engine).await;
    engine
        .create_booking(request(site, vec![front], vec![Span::new(at(10, 0), at(11, 0))]), None)
        .await
        .unwrap();
    let out = engine
        .open_access_point(&attempt(site, front, "R@Example.com"), at(10, 0))
        .await
        .unwrap();
    assert!(out.decision.granted);
}

#[tokio::test]
async fn site_users_are_distinct_requesters() {
    let engine = new_engine("site_users.wal");
    let (site, front, back) = seed(&engine).await;
    assert!(engine.site_users(site).await.unwrap().is_empty());

    let mut first = request(site, vec![front], vec![Span::new(at(9, 0), at(10, 0))]);
    first.requesters = vec!["zoe@example.com".into(), "Ana@example.com".into()];
    let mut second = request(site, vec![back], vec![Span::new(at(11, 0), at(12, 0))]);
    second.requesters = vec!["ana@EXAMPLE.com".into(), "bo@example.com".into()];
    engine.create_booking(first, None).await.unwrap();
    engine.create_booking(second, None).await.unwrap();

    let users = engine.site_users(site).await.unwrap();
    assert_eq!(users.len(), 3);
    assert!(users[0].eq_ignore_ascii_case("ana@example.com"));
    assert_eq!(&users[1..], ["bo@example.com", "zoe@example.com"]);

    let other = Ulid::new();
    assert!(matches!(engine.site_users(other).await, Err(EngineError::NotFound(id)) if id == other));
}

#[tokio::test]
async fn access_point_of_other_site_recorded_as_attempt() {
    let engine = new_engine("access_other_site.wal");
    let (site, _, _) = seed(&engine).await;
    let (_, foreign_door, _) = seed(&engine).await;

    let out = engine
        .open_access_point(&attempt(site, foreign_door, "r@example.com"), at(10, 0))
        .await
        .unwrap();
    assert_eq!(out.decision.reason, AccessReason::ResourceNotFound);

    let history = engine
        .access_history(site, DAY, at(23, 0), HistorySort::default())
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].record.status, AccessStatus::Attempted);
    assert_eq!(history[0].record.reason, "resource not found or does not belong to site");
    // The door belongs to a different site, so it has no name here.
    assert_eq!(history[0].access_point_name, None);
}

#[tokio::test]
async fn malformed_attempt_rejected_without_audit() {
    let engine = new_engine("access_malformed.wal");
    let (site, front, _) = seed(&engine).await;
    let result = engine.open_access_point(&attempt(site, front, ""), at(10, 0)).await;
    assert!(matches!(result, Err(EngineError::Validation(_))));
    let history = engine
        .access_history(site, 0, MAX_VALID_TIMESTAMP_MS, HistorySort::default())
        .await
        .unwrap();
    assert!(history.is_empty());
}

#[tokio::test]
async fn access_history_range_and_sort() {
    let engine = new_engine("access_history_sort.wal");
    let (site, front, back) = seed(&engine).await;
    for (door, t) in [(front, at(9, 0)), (back, at(10, 0)), (front, at(11, 0))] {
        engine
            .open_access_point(&attempt(site, door, "r@example.com"), t)
            .await
            .unwrap();
    }

    // Range is inclusive on both ends.
    let in_range = engine
        .access_history(site, at(10, 0), at(11, 0), HistorySort { key: HistorySortKey::Timestamp, descending: true })
        .await
        .unwrap();
    let times: Vec<_> = in_range.iter().map(|e| e.record.timestamp).collect();
    assert_eq!(times, vec![at(11, 0), at(10, 0)]);

    let by_name = engine
        .access_history(site, DAY, at(23, 0), HistorySort::default())
        .await
        .unwrap();
    let names: Vec<_> = by_name.iter().map(|e| e.access_point_name.clone().unwrap()).collect();
    assert_eq!(names, vec!["Back door", "Front door", "Front door"]);

    assert!(matches!(
        engine.access_history(site, at(11, 0), at(10, 0), HistorySort::default()).await,
        Err(EngineError::Validation(_))
    ));
}

// ── WAL replay and compaction ───────────────────────────

#[tokio::test]
async fn wal_replay_restores_state() {
    let path = test_wal_path("replay.wal");
    let (site, front, booking_id);
    {
        let engine = Engine::new(path.clone(), EngineConfig::default()).unwrap();
        let seeded = seed(&engine).await;
        site = seeded.0;
        front = seeded.1;
        let booking = engine
            .create_booking(request(site, vec![front], vec![Span::new(at(10, 0), at(11, 0))]), None)
            .await
            .unwrap();
        booking_id = booking.id;
        engine.rename_booking(booking_id, "Renamed".into()).await.unwrap();
        engine.delete_access_point(seeded.2).await.unwrap();
        engine
            .open_access_point(&attempt(site, front, "r@example.com"), at(10, 15))
            .await
            .unwrap();
    }

    let engine = Engine::new(path, EngineConfig::default()).unwrap();
    assert_eq!(engine.site_for_booking(&booking_id), Some(site));
    assert_eq!(engine.list_access_points(site).await.unwrap().len(), 1);
    assert_eq!(engine.list_bookings(site).await.unwrap()[0].name, "Renamed");
    assert_eq!(engine.list_reservations(front).await.unwrap().len(), 1);

    let history = engine
        .access_history(site, DAY, at(23, 0), HistorySort::default())
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].record.status, AccessStatus::Successful);

    // Replayed reservations still participate in conflict checks.
    let again = engine
        .create_booking(request(site, vec![front], vec![Span::new(at(10, 30), at(10, 45))]), None)
        .await;
    assert!(matches!(again, Err(EngineError::ScheduleConflict(_))));
}

#[tokio::test]
async fn compact_wal_preserves_state() {
    let path = test_wal_path("compact.wal");
    let site;
    {
        let engine = Engine::new(path.clone(), EngineConfig::default()).unwrap();
        let (s, front, back) = seed(&engine).await;
        site = s;
        for i in 0..10 {
            let b = engine
                .create_booking(
                    request(site, vec![front], vec![Span::new(at(i, 0), at(i, 30))]),
                    None,
                )
                .await
                .unwrap();
            if i % 2 == 0 {
                engine.delete_booking(b.id).await.unwrap();
            }
        }
        engine.delete_access_point(back).await.unwrap();
        engine
            .open_access_point(&attempt(site, front, "r@example.com"), at(1, 10))
            .await
            .unwrap();

        let size_before = std::fs::metadata(&path).unwrap().len();
        assert!(engine.wal_appends_since_compact().await > 0);
        engine.compact_wal().await.unwrap();
        let size_after = std::fs::metadata(&path).unwrap().len();
        assert!(size_after < size_before, "compacted WAL ({size_after}) should be smaller than {size_before}");
        assert_eq!(engine.wal_appends_since_compact().await, 0);
    }

    let engine = Engine::new(path, EngineConfig::default()).unwrap();
    assert_eq!(engine.list_bookings(site).await.unwrap().len(), 5);
    assert_eq!(engine.list_access_points(site).await.unwrap().len(), 1);
    let history = engine
        .access_history(site, DAY, at(23, 0), HistorySort::default())
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert!(history[0].record.status == AccessStatus::Successful);
}
