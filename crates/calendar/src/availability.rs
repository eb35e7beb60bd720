use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Half-open `[start, end)` range during which no event may be placed.
/// Intervals arrive unordered from the provider and may overlap.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusyInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// A bookable range of exactly the requested duration, entirely outside
/// every busy interval. Only the availability walk constructs these.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreeSlot {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl FreeSlot {
    pub(crate) fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }
}

/// Packs `duration_minutes`-sized slots into the gaps between busy
/// intervals, walking a cursor forward from `range_start`. The cursor only
/// ever advances, which makes overlapping and out-of-order busy input safe.
pub fn find_free_slots(
    range_start: DateTime<Utc>,
    range_end: DateTime<Utc>,
    busy: &[BusyInterval],
    duration_minutes: u32,
) -> Vec<FreeSlot> {
    if duration_minutes == 0 {
        return Vec::new();
    }
    let duration = Duration::minutes(i64::from(duration_minutes));

    let mut ordered = busy.to_vec();
    ordered.sort_by_key(|interval| interval.start);

    let mut slots = Vec::new();
    let mut cursor = range_start;

    for interval in &ordered {
        let gap_end = interval.start.min(range_end);
        while cursor + duration <= gap_end {
            slots.push(FreeSlot::new(cursor, cursor + duration));
            cursor += duration;
        }
        cursor = cursor.max(interval.end);
    }

    while cursor + duration <= range_end {
        slots.push(FreeSlot::new(cursor, cursor + duration));
        cursor += duration;
    }

    slots
}
