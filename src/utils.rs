use std::time::{Duration, UNIX_EPOCH};

/// Formats an epoch-milliseconds timestamp as HH:MM:SS.mmm (UTC).
pub fn format_timestamp(timestamp_ms: i64) -> String {
    if timestamp_ms < 0 {
        return format!("Invalid timestamp: {}", timestamp_ms);
    }
    let duration = Duration::from_millis(timestamp_ms as u64);

    match UNIX_EPOCH.checked_add(duration) {
        Some(system_time) => match system_time.duration_since(UNIX_EPOCH) {
            Ok(d) => {
                let total_ms = d.as_millis();
                let seconds = total_ms / 1000;
                let ms = total_ms % 1000;

                let hours = (seconds / 3600) % 24;
                let minutes = (seconds / 60) % 60;
                let secs = seconds % 60;

                format!("{:02}:{:02}:{:02}.{:03}", hours, minutes, secs, ms)
            }
            Err(_) => format!("Invalid timestamp: {}", timestamp_ms),
        },
        None => format!("Invalid timestamp: {}", timestamp_ms),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_time_of_day() {
        // 1970-01-01 01:02:03.456 UTC
        assert_eq!(format_timestamp(3_723_456), "01:02:03.456");
    }

    #[test]
    fn rejects_negative_timestamps() {
        assert!(format_timestamp(-1).starts_with("Invalid timestamp"));
    }
}
