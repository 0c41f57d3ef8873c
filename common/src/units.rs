const MS_PER_SECOND: u64 = 1_000;
const SECONDS_PER_MINUTE: u64 = 60;
const SECONDS_PER_HOUR: u64 = 60 * SECONDS_PER_MINUTE;
const SECONDS_PER_DAY: u64 = 24 * SECONDS_PER_HOUR;

pub fn c_to_f(temp_c: f32) -> f32 {
    temp_c * 9.0 / 5.0 + 32.0
}

/// Days, hours and minutes of `total_seconds`, most significant first. Once a
/// unit is printed every smaller unit is zero padded. Returns the prefix and
/// the leftover seconds.
fn dhm_prefix(total_seconds: u64) -> (String, u64) {
    let days = total_seconds / SECONDS_PER_DAY;
    let hours = total_seconds % SECONDS_PER_DAY / SECONDS_PER_HOUR;
    let minutes = total_seconds % SECONDS_PER_HOUR / SECONDS_PER_MINUTE;
    let seconds = total_seconds % SECONDS_PER_MINUTE;

    let prefix = if days > 0 {
        format!("{days}d{hours:02}h{minutes:02}m")
    } else if hours > 0 {
        format!("{hours}h{minutes:02}m")
    } else if minutes > 0 {
        format!("{minutes}m")
    } else {
        String::new()
    };
    (prefix, seconds)
}

/// Uptime rounded to the nearest second, e.g. `1h02m03s`.
pub fn seconds_human_readable(ms: u64) -> String {
    let (prefix, seconds) = dhm_prefix(ms.saturating_add(MS_PER_SECOND / 2) / MS_PER_SECOND);
    if prefix.is_empty() {
        format!("{seconds}s")
    } else {
        format!("{prefix}{seconds:02}s")
    }
}

/// Uptime with millisecond precision, e.g. `1h02m03.456s`.
pub fn millis_human_readable(ms: u64) -> String {
    let (prefix, seconds) = dhm_prefix(ms / MS_PER_SECOND);
    let millis = ms % MS_PER_SECOND;
    if prefix.is_empty() {
        format!("{seconds}.{millis:03}s")
    } else {
        format!("{prefix}{seconds:02}.{millis:03}s")
    }
}
