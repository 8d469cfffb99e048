/// Compact human duration between two epoch-millisecond stamps.
pub fn format_duration(start_ms: u64, end_ms: u64) -> String {
    let sec = end_ms.saturating_sub(start_ms) / 1000;
    if sec < 60 {
        return format!("{}s", sec);
    }
    let min = sec / 60;
    if min < 60 {
        return format!("{}m {}s", min, sec % 60);
    }
    format!("{}h {}m", min / 60, min % 60)
}

pub fn pad_right(s: &str, width: usize) -> String {
    let len = s.chars().count();
    if len >= width {
        s.chars().take(width).collect()
    } else {
        format!("{s}{}", " ".repeat(width - len))
    }
}

pub fn pad_left(s: &str, width: usize) -> String {
    let len = s.chars().count();
    if len >= width {
        s.chars().take(width).collect()
    } else {
        format!("{}{s}", " ".repeat(width - len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_seconds() {
        assert_eq!(format_duration(0, 45_000), "45s");
    }

    #[test]
    fn formats_minutes_and_seconds() {
        assert_eq!(format_duration(0, 125_000), "2m 5s");
    }

    #[test]
    fn formats_hours_and_minutes() {
        assert_eq!(format_duration(0, 3_661_000), "1h 1m");
    }

    #[test]
    fn zero_duration() {
        assert_eq!(format_duration(1000, 1000), "0s");
    }

    #[test]
    fn padding_and_truncation() {
        assert_eq!(pad_right("hi", 5), "hi   ");
        assert_eq!(pad_right("hello world", 5), "hello");
        assert_eq!(pad_left("42", 5), "   42");
        assert_eq!(pad_left("hello world", 5), "hello");
    }
}
