use crate::model::*;

// ── Free-window algebra ───────────────────────────────────────────
//
// The display side asks "what can still be booked on this date". The answer
// is the merged available windows for that day of week, minus the slots held
// by pending/confirmed bookings on that date.

/// Free sub-ranges of `date` on one pitch.
pub fn free_ranges(ps: &PitchState, date: chrono::NaiveDate) -> Vec<TimeRange> {
    let day = day_of_week(date);

    let mut open: Vec<TimeRange> = ps.open_windows_on(day).map(|s| s.window).collect();
    open.sort_by_key(|r| r.start);
    let open = merge_overlapping(&open);

    let mut held: Vec<TimeRange> = ps
        .bookings_on(date)
        .iter()
        .filter(|b| b.is_active())
        .map(|b| b.slot)
        .collect();
    held.sort_by_key(|r| r.start);

    if held.is_empty() {
        open
    } else {
        subtract_ranges(&open, &held)
    }
}

/// Merge sorted overlapping/adjacent ranges into disjoint ranges.
pub fn merge_overlapping(sorted: &[TimeRange]) -> Vec<TimeRange> {
    let mut merged: Vec<TimeRange> = Vec::new();
    for &range in sorted {
        if let Some(last) = merged.last_mut()
            && range.start <= last.end
        {
            last.end = last.end.max(range.end);
            continue;
        }
        merged.push(range);
    }
    merged
}

/// Subtract sorted `to_remove` from sorted disjoint `base`.
pub fn subtract_ranges(base: &[TimeRange], to_remove: &[TimeRange]) -> Vec<TimeRange> {
    let mut result = Vec::new();
    let mut ri = 0;

    for &b in base {
        let mut current_start = b.start;
        let current_end = b.end;

        while ri < to_remove.len() && to_remove[ri].end <= current_start {
            ri += 1;
        }

        let mut j = ri;
        while j < to_remove.len() && to_remove[j].start < current_end {
            let r = &to_remove[j];
            if r.start > current_start {
                result.push(TimeRange::new(current_start, r.start));
            }
            current_start = current_start.max(r.end);
            j += 1;
        }

        if current_start < current_end {
            result.push(TimeRange::new(current_start, current_end));
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(start: Minute, end: Minute) -> TimeRange {
        TimeRange::new(start, end)
    }

    #[test]
    fn merge_disjoint_stays_disjoint() {
        let spans = [r(60, 120), r(180, 240)];
        assert_eq!(merge_overlapping(&spans), vec![r(60, 120), r(180, 240)]);
    }

    #[test]
    fn merge_overlapping_and_adjacent() {
        let spans = [r(60, 120), r(100, 180), r(180, 240)];
        assert_eq!(merge_overlapping(&spans), vec![r(60, 240)]);
    }

    #[test]
    fn subtract_middle_splits() {
        let base = [r(600, 1200)];
        let remove = [r(720, 780)];
        assert_eq!(subtract_ranges(&base, &remove), vec![r(600, 720), r(780, 1200)]);
    }

    #[test]
    fn subtract_covering_removes_all() {
        let base = [r(600, 720)];
        let remove = [r(540, 780)];
        assert!(subtract_ranges(&base, &remove).is_empty());
    }

    #[test]
    fn subtract_edges() {
        let base = [r(600, 720)];
        let remove = [r(600, 630), r(690, 720)];
        assert_eq!(subtract_ranges(&base, &remove), vec![r(630, 690)]);
    }

    #[test]
    fn subtract_nothing() {
        let base = [r(600, 720)];
        assert_eq!(subtract_ranges(&base, &[]), vec![r(600, 720)]);
    }
}
