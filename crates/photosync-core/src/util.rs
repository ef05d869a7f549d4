//! Small text and time helpers.

const COMPACT_TEXT_LIMIT: usize = 180;

/// Trimmed text, or `None` when missing or blank.
pub fn normalize_text_option(value: Option<String>) -> Option<String> {
    value
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

/// Whether `value` has an `http` or `https` scheme.
pub fn is_http_url(value: &str) -> bool {
    ["http://", "https://"]
        .iter()
        .any(|scheme| value.starts_with(scheme))
}

/// Server text shortened for error messages.
pub fn compact_text(value: &str) -> String {
    value.trim().chars().take(COMPACT_TEXT_LIMIT).collect()
}

pub fn unix_millis_now() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_text_normalizes_to_none() {
        assert_eq!(normalize_text_option(None), None);
        assert_eq!(normalize_text_option(Some(" \t\n".to_string())), None);
        assert_eq!(
            normalize_text_option(Some("  uploads/a.jpg ".to_string())),
            Some("uploads/a.jpg".to_string())
        );
    }

    #[test]
    fn only_http_schemes_are_urls() {
        assert!(is_http_url("http://192.168.1.20:5000"));
        assert!(is_http_url("https://photos.example.com/api"));
        assert!(!is_http_url("ws://photos.example.com"));
        assert!(!is_http_url("photos.example.com"));
    }

    #[test]
    fn compact_text_trims_and_caps_length() {
        let body = format!("  {}  ", "e".repeat(400));
        assert_eq!(compact_text(&body).len(), COMPACT_TEXT_LIMIT);
        assert_eq!(compact_text("  bad token \n"), "bad token");
    }

    #[test]
    fn clock_reports_milliseconds() {
        assert!(unix_millis_now() > 1_600_000_000_000);
    }
}
