//! Rendering grouped sources into a context block for answer generation.

use chrono::{DateTime, Utc};

use crate::diversity::SourceGroup;

/// Render source groups as labelled text blocks.
///
/// Each block reads:
/// ```text
/// [1] React Hooks Guide (https://react.dev/learn)
/// Visited 4 times, last visit 2 days ago, 5m 20s on page
///
/// <passage text>
/// ```
/// Blocks are separated by a blank line. `now` anchors the relative
/// last-visit delta.
pub fn render_context(groups: &[SourceGroup], now: DateTime<Utc>) -> String {
    let mut out = String::new();
    for (i, group) in groups.iter().enumerate() {
        if i > 0 {
            out.push_str("\n\n");
        }
        out.push_str(&format!("[{}] {} ({})\n", group.ordinal, group.title, group.url));
        out.push_str(&visit_line(group, now));
        for passage in &group.passages {
            out.push_str("\n\n");
            out.push_str(&passage.text);
        }
    }
    out
}

fn visit_line(group: &SourceGroup, now: DateTime<Utc>) -> String {
    let visits = match group.visit_count {
        1 => "Visited 1 time".to_string(),
        n => format!("Visited {n} times"),
    };
    let last = match group.last_visited_at {
        Some(at) => format!("last visit {}", humanize_since(at, now)),
        None => "last visit unknown".to_string(),
    };
    format!(
        "{visits}, {last}, {} on page",
        humanize_duration(group.dwell_time_secs)
    )
}

/// Relative time such as `3 hours ago`. Future instants read `just now`.
pub fn humanize_since(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - at).num_seconds();
    let plural = |n: i64, unit: &str| {
        if n == 1 {
            format!("1 {unit} ago")
        } else {
            format!("{n} {unit}s ago")
        }
    };
    match secs {
        s if s < 60 => "just now".to_string(),
        s if s < 3_600 => plural(s / 60, "minute"),
        s if s < 86_400 => plural(s / 3_600, "hour"),
        s if s < 86_400 * 30 => plural(s / 86_400, "day"),
        s if s < 86_400 * 365 => plural(s / (86_400 * 30), "month"),
        s => plural(s / (86_400 * 365), "year"),
    }
}

/// Compact duration such as `5m 20s` or `1h 2m`.
pub fn humanize_duration(secs: u64) -> String {
    let (h, m, s) = (secs / 3_600, (secs % 3_600) / 60, secs % 60);
    if h > 0 {
        format!("{h}h {m}m")
    } else if m > 0 {
        format!("{m}m {s}s")
    } else {
        format!("{s}s")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use recall_core::Passage;
    use uuid::Uuid;

    fn group(ordinal: usize, last: Option<DateTime<Utc>>) -> SourceGroup {
        SourceGroup {
            ordinal,
            document_id: Uuid::new_v4(),
            url: format!("https://site{ordinal}.dev/page"),
            title: format!("Source {ordinal}"),
            visit_count: 4,
            last_visited_at: last,
            dwell_time_secs: 320,
            passages: vec![
                Passage::new("First passage.", 0, 0.5),
                Passage::new("Second passage.", 1, 0.5),
            ],
        }
    }

    #[test]
    fn test_render_blocks() {
        let now = Utc.with_ymd_and_hms(2026, 5, 10, 12, 0, 0).unwrap();
        let groups = vec![group(1, Some(now - Duration::days(2))), group(2, None)];
        let rendered = render_context(&groups, now);

        let expected = "[1] Source 1 (https://site1.dev/page)\n\
                        Visited 4 times, last visit 2 days ago, 5m 20s on page\n\n\
                        First passage.\n\nSecond passage.\n\n\
                        [2] Source 2 (https://site2.dev/page)\n\
                        Visited 4 times, last visit unknown, 5m 20s on page\n\n\
                        First passage.\n\nSecond passage.";
        assert_eq!(rendered, expected);
    }

    #[test]
    fn test_render_empty() {
        assert_eq!(render_context(&[], Utc::now()), "");
    }

    #[test]
    fn test_humanize_since() {
        let now = Utc.with_ymd_and_hms(2026, 5, 10, 12, 0, 0).unwrap();
        assert_eq!(humanize_since(now - Duration::seconds(30), now), "just now");
        assert_eq!(humanize_since(now + Duration::hours(1), now), "just now");
        assert_eq!(humanize_since(now - Duration::minutes(1), now), "1 minute ago");
        assert_eq!(humanize_since(now - Duration::hours(5), now), "5 hours ago");
        assert_eq!(humanize_since(now - Duration::days(1), now), "1 day ago");
        assert_eq!(humanize_since(now - Duration::days(90), now), "3 months ago");
        assert_eq!(humanize_since(now - Duration::days(800), now), "2 years ago");
    }

    #[test]
    fn test_humanize_duration() {
        assert_eq!(humanize_duration(0), "0s");
        assert_eq!(humanize_duration(45), "45s");
        assert_eq!(humanize_duration(320), "5m 20s");
        assert_eq!(humanize_duration(3_720), "1h 2m");
    }
}
