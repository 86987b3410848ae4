use crate::model::*;

// ── Free-slot Algorithm ───────────────────────────────────────────

/// Compute the free sub-intervals of `window` not covered by `booked`.
///
/// With no bookings at all the whole window comes back unconditionally, without
/// the duration filter. Otherwise every gap shorter than `min_minutes` whole
/// minutes is dropped. `booked` may be unsorted, overlapping, or reach outside
/// the window.
pub fn free_slots(window: &Span, min_minutes: i64, booked: &[Span]) -> Vec<FreeSlot> {
    if booked.is_empty() {
        return vec![FreeSlot::from(*window)];
    }

    let mut clipped: Vec<Span> = booked.iter().filter_map(|b| b.clip(window).ok()).collect();
    clipped.sort_by_key(|s| s.start);

    let mut slots = Vec::new();
    let mut cursor = window.start;

    for b in &clipped {
        if b.start > cursor {
            push_if_long_enough(&mut slots, Span::new(cursor, b.start), min_minutes);
        }
        cursor = cursor.max(b.end);
    }

    if cursor < window.end {
        push_if_long_enough(&mut slots, Span::new(cursor, window.end), min_minutes);
    }

    slots
}

fn push_if_long_enough(slots: &mut Vec<FreeSlot>, gap: Span, min_minutes: i64) {
    if gap.whole_minutes() >= min_minutes {
        slots.push(FreeSlot::from(gap));
    }
}

/// Merge sorted overlapping/adjacent intervals into disjoint intervals.
pub fn merge_overlapping(sorted: &[Span]) -> Vec<Span> {
    let mut merged: Vec<Span> = Vec::new();
    for &span in sorted {
        if let Some(last) = merged.last_mut()
            && span.start <= last.end {
                last.end = last.end.max(span.end);
                continue;
            }
        merged.push(span);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    const H: Ms = 3_600_000;
    const M: Ms = 60_000;

    fn slot(start: Ms, end: Ms) -> FreeSlot {
        FreeSlot { start, end }
    }

    #[test]
    fn no_bookings_returns_whole_window() {
        let window = Span::new(9 * H, 17 * H);
        assert_eq!(free_slots(&window, 15, &[]), vec![slot(9 * H, 17 * H)]);
    }

    #[test]
    fn no_bookings_ignores_min_duration() {
        // 30-minute window, 60-minute minimum: still returned as-is.
        let window = Span::new(9 * H, 9 * H + 30 * M);
        assert_eq!(free_slots(&window, 60, &[]), vec![slot(9 * H, 9 * H + 30 * M)]);
    }

    #[test]
    fn single_booking_splits_window() {
        let window = Span::new(9 * H, 12 * H);
        let booked = [Span::new(10 * H, 10 * H + 30 * M)];
        assert_eq!(
            free_slots(&window, 15, &booked),
            vec![slot(9 * H, 10 * H), slot(10 * H + 30 * M, 12 * H)]
        );
    }

    #[test]
    fn gap_below_minimum_dropped() {
        let window = Span::new(9 * H, 10 * H);
        let booked = [Span::new(9 * H + 30 * M, 10 * H)];
        assert!(free_slots(&window, 60, &booked).is_empty());
    }

    #[test]
    fn minimum_is_inclusive() {
        let window = Span::new(9 * H, 10 * H);
        let booked = [Span::new(9 * H + 30 * M, 10 * H)];
        assert_eq!(free_slots(&window, 30, &booked), vec![slot(9 * H, 9 * H + 30 * M)]);
    }

    #[test]
    fn duration_truncates_to_whole_minutes() {
        // 29m59s gap does not satisfy a 30-minute minimum.
        let window = Span::new(0, H);
        let booked = [Span::new(30 * M - 1000, H)];
        assert!(free_slots(&window, 30, &booked).is_empty());
    }

    #[test]
    fn unsorted_and_overlapping_bookings() {
        let window = Span::new(8 * H, 18 * H);
        let booked = [
            Span::new(13 * H, 15 * H),
            Span::new(9 * H, 11 * H),
            Span::new(10 * H, 12 * H),
            Span::new(14 * H, 14 * H + 30 * M),
        ];
        assert_eq!(
            free_slots(&window, 1, &booked),
            vec![slot(8 * H, 9 * H), slot(12 * H, 13 * H), slot(15 * H, 18 * H)]
        );
    }

    #[test]
    fn bookings_reaching_outside_window_are_clipped() {
        let window = Span::new(9 * H, 17 * H);
        let booked = [Span::new(6 * H, 10 * H), Span::new(16 * H, 20 * H)];
        assert_eq!(free_slots(&window, 0, &booked), vec![slot(10 * H, 16 * H)]);
    }

    #[test]
    fn bookings_entirely_outside_window_leave_it_free() {
        // Non-empty input, nothing intersects: the duration filter still applies.
        let window = Span::new(9 * H, 9 * H + 10 * M);
        let booked = [Span::new(H, 2 * H)];
        assert_eq!(free_slots(&window, 5, &booked), vec![slot(9 * H, 9 * H + 10 * M)]);
        assert!(free_slots(&window, 15, &booked).is_empty());
    }

    #[test]
    fn fully_booked_window() {
        let window = Span::new(9 * H, 10 * H);
        let booked = [Span::new(8 * H, 11 * H)];
        assert!(free_slots(&window, 0, &booked).is_empty());
    }

    #[test]
    fn back_to_back_bookings_leave_no_gap() {
        let window = Span::new(9 * H, 12 * H);
        let booked = [Span::new(9 * H, 10 * H), Span::new(10 * H, 11 * H)];
        assert_eq!(free_slots(&window, 0, &booked), vec![slot(11 * H, 12 * H)]);
    }

    #[test]
    fn slots_and_bookings_tile_the_window() {
        let window = Span::new(0, 24 * H);
        let booked = [
            Span::new(H, 3 * H),
            Span::new(2 * H, 5 * H),
            Span::new(7 * H, 8 * H),
            Span::new(23 * H, 30 * H),
        ];
        let slots = free_slots(&window, 0, &booked);

        let mut pieces: Vec<Span> = slots.iter().map(|s| Span::new(s.start, s.end)).collect();
        pieces.extend(booked.iter().filter_map(|b| b.clip(&window).ok()));
        pieces.sort_by_key(|s| s.start);
        assert_eq!(merge_overlapping(&pieces), vec![window]);

        for s in &slots {
            let s = Span::new(s.start, s.end);
            assert!(booked.iter().all(|b| !b.overlaps(&s)));
        }
        assert!(slots.windows(2).all(|w| w[0].end <= w[1].start));
    }

    #[test]
    fn merge_overlapping_basic() {
        let spans = vec![Span::new(100, 300), Span::new(200, 400), Span::new(500, 600)];
        assert_eq!(
            merge_overlapping(&spans),
            vec![Span::new(100, 400), Span::new(500, 600)]
        );
    }

    #[test]
    fn merge_overlapping_adjacent() {
        let spans = vec![Span::new(100, 200), Span::new(200, 300)];
        assert_eq!(merge_overlapping(&spans), vec![Span::new(100, 300)]);
    }
}
