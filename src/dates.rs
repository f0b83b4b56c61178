// Date window generation: the ordered sequence of departure dates to probe.

use chrono::{Duration, NaiveDate, Utc};

use crate::model::{MAX_HORIZON_MONTHS, MIN_HORIZON_MONTHS};

// Sampling policy: one candidate date per week across the horizon. Probing
// every single day over six months would mean thousands of provider calls;
// weekly sampling keeps the window at `4 * months` dates, capped at 24.
pub const SAMPLE_INTERVAL_DAYS: i64 = 7;
pub const SAMPLES_PER_MONTH: u32 = 4;
pub const MAX_WINDOW_DATES: usize = (MAX_HORIZON_MONTHS * SAMPLES_PER_MONTH) as usize;

// Pure generator: same inputs, same window. `start` is advanced to `today`
// when it lies in the past.
pub fn date_window(start: NaiveDate, today: NaiveDate, months: u32) -> Vec<NaiveDate> {
    let months = months.clamp(MIN_HORIZON_MONTHS, MAX_HORIZON_MONTHS);
    let first = start.max(today);

    (0..months * SAMPLES_PER_MONTH)
        .map(|i| first + Duration::days(i as i64 * SAMPLE_INTERVAL_DAYS))
        .collect()
}

pub fn date_window_from_today(months: u32) -> Vec<NaiveDate> {
    let today = Utc::now().date_naive();
    date_window(today, today, months)
}
