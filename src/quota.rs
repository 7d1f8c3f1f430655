use chrono::{DateTime, NaiveTime, Utc};

/// Per-run cap applied when a feed has no daily limit configured.
pub const UNLIMITED_RUN_CAP: i64 = 100;

/// Compute the number of articles one run may ingest so that a feed's
/// daily budget is spread evenly across the runs remaining before UTC
/// midnight.
///
/// `limit` is the configured `daily_post_limit`: -1 unlimited, 0 disabled,
/// n > 0 daily target. `posts_today` counts articles inserted since UTC
/// midnight; `last_post_today` is the newest insertion today, if any.
pub fn dynamic_daily_limit(
    limit: i64,
    posts_today: i64,
    now: DateTime<Utc>,
    last_post_today: Option<DateTime<Utc>>,
    force_refresh: bool,
) -> i64 {
    if limit == -1 {
        return UNLIMITED_RUN_CAP;
    }
    if limit == 0 {
        return 0;
    }
    if force_refresh {
        return limit;
    }

    let remaining_quota = limit - posts_today;
    if remaining_quota <= 0 {
        return 0;
    }

    let midnight = now.date_naive().and_time(NaiveTime::MIN).and_utc();
    let next_midnight = midnight + chrono::Duration::days(1);
    let seconds_until_midnight = (next_midnight - now).num_seconds().max(1);

    let seconds_since_last_post = match last_post_today {
        Some(last) => (now - last).num_seconds().max(1),
        // No posts yet today: assume the cadence observed since midnight.
        None => (now - midnight).num_seconds().max(1),
    };

    let remaining_runs = div_ceil(seconds_until_midnight, seconds_since_last_post).max(1);
    div_ceil(remaining_quota, remaining_runs).max(1)
}

fn div_ceil(a: i64, b: i64) -> i64 {
    (a + b - 1) / b
}
