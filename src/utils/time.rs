use chrono::{DateTime, Utc};

/// Coarse relative age for report listings: minutes under an hour, hours under a
/// day, days beyond that. Future timestamps read as "0 min ago".
pub fn format_time_ago(created_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let minutes = (now - created_at).num_minutes().max(0);
    let hours = minutes / 60;
    let days = hours / 24;

    if minutes < 60 {
        format!("{minutes} min ago")
    } else if hours < 24 {
        format!("{hours} h ago")
    } else {
        format!("{days} d ago")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn picks_the_coarsest_fitting_unit() {
        let now = Utc::now();

        assert_eq!(format_time_ago(now, now), "0 min ago");
        assert_eq!(format_time_ago(now - Duration::minutes(59), now), "59 min ago");
        assert_eq!(format_time_ago(now - Duration::minutes(60), now), "1 h ago");
        assert_eq!(format_time_ago(now - Duration::hours(23), now), "23 h ago");
        assert_eq!(format_time_ago(now - Duration::hours(49), now), "2 d ago");
    }

    #[test]
    fn future_timestamps_do_not_go_negative() {
        let now = Utc::now();
        assert_eq!(format_time_ago(now + Duration::minutes(5), now), "0 min ago");
    }
}
