use chrono::NaiveDate;

use crate::model::*;

// ── Availability index ────────────────────────────────────────────

/// Read-only view of the nights a listing has given away.
///
/// Built from a reservation set; only active reservations (pending or
/// confirmed) are kept, so admission, the calendar, and search all agree on
/// what blocks. Every collision test goes through [`DateRange::overlaps`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AvailabilityIndex {
    /// Active ranges sorted by check-in.
    booked: Vec<DateRange>,
}

impl AvailabilityIndex {
    pub fn from_reservations<'a>(reservations: impl IntoIterator<Item = &'a Reservation>) -> Self {
        let mut booked: Vec<DateRange> = reservations
            .into_iter()
            .filter(|r| r.is_active())
            .map(|r| r.range)
            .collect();
        booked.sort_by_key(|r| r.start());
        Self { booked }
    }

    pub fn for_listing(listing: &impl HasReservations) -> Self {
        Self::from_reservations(listing.reservations())
    }

    pub fn booked(&self) -> &[DateRange] {
        &self.booked
    }

    pub fn is_empty(&self) -> bool {
        self.booked.is_empty()
    }

    pub fn is_range_free(&self, range: &DateRange) -> bool {
        self.overlapping(range).next().is_none()
    }

    /// The active ranges that collide with `range`, in check-in order.
    pub fn conflicts(&self, range: &DateRange) -> Vec<DateRange> {
        self.overlapping(range).copied().collect()
    }

    /// Every blocked night, ascending, each day once.
    pub fn blocked_days(&self) -> BlockedDays<'_> {
        BlockedDays::new(&self.booked, None)
    }

    /// Blocked nights that fall inside `window`.
    pub fn blocked_days_within(&self, window: &DateRange) -> BlockedDays<'_> {
        BlockedDays::new(&self.booked, Some(*window))
    }

    /// Maximal free stretches inside `window`.
    pub fn free_ranges(&self, window: &DateRange) -> Vec<DateRange> {
        let clamped: Vec<DateRange> = self
            .overlapping(window)
            .filter_map(|b| b.intersection(window))
            .collect();
        let merged = merge_overlapping(&clamped);
        subtract_ranges(&[*window], &merged)
    }

    fn overlapping(&self, range: &DateRange) -> impl Iterator<Item = &DateRange> {
        // Anything checking in on or after range.end can't overlap.
        let right_bound = self.booked.partition_point(|b| b.start() < range.end());
        let range = *range;
        self.booked[..right_bound]
            .iter()
            .filter(move |b| b.overlaps(&range))
    }
}

/// Lazy walk over the union of booked nights.
///
/// Holds no state beyond a cursor into the index; ask the index again for a
/// fresh walk.
#[derive(Debug, Clone)]
pub struct BlockedDays<'a> {
    ranges: &'a [DateRange],
    window: Option<DateRange>,
    idx: usize,
    day: Option<NaiveDate>,
    day_end: NaiveDate,
    /// First day not yet covered by an emitted range.
    high_water: Option<NaiveDate>,
}

impl<'a> BlockedDays<'a> {
    fn new(ranges: &'a [DateRange], window: Option<DateRange>) -> Self {
        let ranges = match window {
            Some(w) => &ranges[..ranges.partition_point(|r| r.start() < w.end())],
            None => ranges,
        };
        Self {
            ranges,
            window,
            idx: 0,
            day: None,
            day_end: NaiveDate::MIN,
            high_water: None,
        }
    }
}

impl Iterator for BlockedDays<'_> {
    type Item = NaiveDate;

    fn next(&mut self) -> Option<NaiveDate> {
        loop {
            if let Some(day) = self.day {
                if day < self.day_end {
                    self.day = day.succ_opt();
                    return Some(day);
                }
                self.day = None;
            }

            let range = *self.ranges.get(self.idx)?;
            self.idx += 1;
            let range = match self.window {
                Some(w) => match range.intersection(&w) {
                    Some(r) => r,
                    None => continue,
                },
                None => range,
            };

            let start = self
                .high_water
                .map_or(range.start(), |hw| hw.max(range.start()));
            if start < range.end() {
                self.day = Some(start);
                self.day_end = range.end();
                self.high_water = Some(range.end());
            }
        }
    }
}

/// Merge sorted overlapping/adjacent ranges into disjoint ranges.
pub fn merge_overlapping(sorted: &[DateRange]) -> Vec<DateRange> {
    let mut merged: Vec<DateRange> = Vec::new();
    for &range in sorted {
        if let Some(last) = merged.last_mut()
            && range.start() <= last.end()
        {
            *last = DateRange::from_ordered(last.start(), last.end().max(range.end()));
            continue;
        }
        merged.push(range);
    }
    merged
}

/// `base` minus `to_remove`. Both sorted by start, `to_remove` disjoint.
pub fn subtract_ranges(base: &[DateRange], to_remove: &[DateRange]) -> Vec<DateRange> {
    let mut result = Vec::new();
    let mut ri = 0;

    for &b in base {
        let mut current_start = b.start();
        let current_end = b.end();

        while ri < to_remove.len() && to_remove[ri].end() <= current_start {
            ri += 1;
        }

        let mut j = ri;
        while j < to_remove.len() && to_remove[j].start() < current_end {
            let r = &to_remove[j];
            if r.start() > current_start {
                result.push(DateRange::from_ordered(current_start, r.start()));
            }
            current_start = current_start.max(r.end());
            j += 1;
        }

        if current_start < current_end {
            result.push(DateRange::from_ordered(current_start, current_end));
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ulid::Ulid;

    fn d(s: &str) -> NaiveDate {
        parse_date(s).unwrap()
    }

    fn range(a: &str, b: &str) -> DateRange {
        DateRange::parse(a, b).unwrap()
    }

    fn res(a: &str, b: &str, status: ReservationStatus) -> Reservation {
        Reservation {
            id: Ulid::new(),
            listing_id: Ulid::nil(),
            guest_id: Ulid::new(),
            range: range(a, b),
            status,
            total_price: 0,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn empty_index_is_always_free() {
        let idx = AvailabilityIndex::from_reservations(&Vec::<Reservation>::new());
        assert!(idx.is_empty());
        assert!(idx.is_range_free(&range("2024-01-01", "2024-01-02")));
        assert!(idx.is_range_free(&range("1999-01-01", "2099-01-01")));
        assert_eq!(idx.blocked_days().count(), 0);
    }

    #[test]
    fn pending_blocks_like_confirmed() {
        let rs = vec![res("2024-03-01", "2024-03-05", ReservationStatus::Pending)];
        let idx = AvailabilityIndex::for_listing(&rs);
        assert!(!idx.is_range_free(&range("2024-03-02", "2024-03-04")));
        assert!(idx.is_range_free(&range("2024-03-05", "2024-03-10")));
        assert!(idx.is_range_free(&range("2024-02-25", "2024-03-01")));
    }

    #[test]
    fn cancelled_never_blocks() {
        let rs = vec![res("2024-03-01", "2024-03-05", ReservationStatus::Cancelled)];
        let idx = AvailabilityIndex::for_listing(&rs);
        assert!(idx.is_empty());
        assert!(idx.is_range_free(&range("2024-03-01", "2024-03-05")));
        assert_eq!(idx.blocked_days().count(), 0);
    }

    #[test]
    fn conflicts_reports_every_blocker() {
        let rs = vec![
            res("2024-03-10", "2024-03-12", ReservationStatus::Confirmed),
            res("2024-03-01", "2024-03-03", ReservationStatus::Pending),
            res("2024-03-20", "2024-03-25", ReservationStatus::Pending),
        ];
        let idx = AvailabilityIndex::for_listing(&rs);
        let hits = idx.conflicts(&range("2024-03-02", "2024-03-11"));
        assert_eq!(
            hits,
            vec![range("2024-03-01", "2024-03-03"), range("2024-03-10", "2024-03-12")]
        );
    }

    #[test]
    fn blocked_days_excludes_checkout() {
        let rs = vec![res("2024-03-01", "2024-03-03", ReservationStatus::Pending)];
        let idx = AvailabilityIndex::for_listing(&rs);
        let days: Vec<_> = idx.blocked_days().collect();
        assert_eq!(days, vec![d("2024-03-01"), d("2024-03-02")]);
    }

    #[test]
    fn blocked_days_union_is_sorted_and_deduplicated() {
        // Overlapping input is a data-integrity problem, but the union must
        // still list each day once.
        let rs = vec![
            res("2024-03-01", "2024-03-04", ReservationStatus::Confirmed),
            res("2024-03-02", "2024-03-06", ReservationStatus::Pending),
            res("2024-03-06", "2024-03-07", ReservationStatus::Pending),
            res("2024-03-03", "2024-03-04", ReservationStatus::Pending),
        ];
        let idx = AvailabilityIndex::for_listing(&rs);
        let days: Vec<_> = idx.blocked_days().collect();
        let expected: Vec<_> = range("2024-03-01", "2024-03-07").days().collect();
        assert_eq!(days, expected);
    }

    #[test]
    fn blocked_days_is_restartable() {
        let rs = vec![
            res("2024-03-01", "2024-03-03", ReservationStatus::Pending),
            res("2024-04-01", "2024-04-02", ReservationStatus::Confirmed),
        ];
        let idx = AvailabilityIndex::for_listing(&rs);
        let first: Vec<_> = idx.blocked_days().collect();
        let second: Vec<_> = idx.blocked_days().collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
        // Lazy: taking a prefix doesn't need the rest.
        assert_eq!(idx.blocked_days().next(), Some(d("2024-03-01")));
    }

    #[test]
    fn blocked_days_within_clamps_to_window() {
        let rs = vec![
            res("2024-05-28", "2024-06-03", ReservationStatus::Confirmed),
            res("2024-06-10", "2024-06-12", ReservationStatus::Pending),
            res("2024-07-01", "2024-07-05", ReservationStatus::Pending),
        ];
        let idx = AvailabilityIndex::for_listing(&rs);
        let june = range("2024-06-01", "2024-07-01");
        let days: Vec<_> = idx.blocked_days_within(&june).collect();
        assert_eq!(
            days,
            vec![d("2024-06-01"), d("2024-06-02"), d("2024-06-10"), d("2024-06-11")]
        );
    }

    #[test]
    fn free_ranges_fill_the_gaps() {
        let rs = vec![
            res("2024-06-03", "2024-06-05", ReservationStatus::Confirmed),
            res("2024-06-05", "2024-06-07", ReservationStatus::Pending),
            res("2024-06-12", "2024-06-20", ReservationStatus::Pending),
        ];
        let idx = AvailabilityIndex::for_listing(&rs);
        let free = idx.free_ranges(&range("2024-06-01", "2024-06-15"));
        assert_eq!(
            free,
            vec![range("2024-06-01", "2024-06-03"), range("2024-06-07", "2024-06-12")]
        );
    }

    #[test]
    fn free_ranges_fully_booked_window() {
        let rs = vec![res("2024-06-01", "2024-06-30", ReservationStatus::Confirmed)];
        let idx = AvailabilityIndex::for_listing(&rs);
        assert!(idx.free_ranges(&range("2024-06-05", "2024-06-10")).is_empty());
    }

    #[test]
    fn merge_empty() {
        assert!(merge_overlapping(&[]).is_empty());
    }

    #[test]
    fn merge_adjacent_ranges() {
        let merged = merge_overlapping(&[
            range("2024-01-01", "2024-01-03"),
            range("2024-01-03", "2024-01-05"),
            range("2024-01-08", "2024-01-09"),
        ]);
        assert_eq!(
            merged,
            vec![range("2024-01-01", "2024-01-05"), range("2024-01-08", "2024-01-09")]
        );
    }

    #[test]
    fn subtract_empty_removals() {
        let base = [range("2024-01-01", "2024-01-10")];
        assert_eq!(subtract_ranges(&base, &[]), base.to_vec());
    }
}
