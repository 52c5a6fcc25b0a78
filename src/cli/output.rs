//! Output helpers shared by CLI commands.

use std::str::FromStr;

/// Output format for CLI commands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text (default).
    #[default]
    Text,
    /// Machine-readable JSON.
    Json,
}

impl FromStr for OutputFormat {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Text,
        })
    }
}

/// Formats a Unix timestamp for display, falling back to the raw number
/// when it does not fit a calendar date.
#[must_use]
pub fn format_timestamp(timestamp: u64) -> String {
    i64::try_from(timestamp)
        .ok()
        .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0))
        .map_or_else(
            || timestamp.to_string(),
            |dt| dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        )
}

/// Truncates text to `max` characters for single-line display.
#[must_use]
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max).collect();
        format!("{cut}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_format_from_str() {
        assert_eq!(OutputFormat::from_str("json").unwrap(), OutputFormat::Json);
        assert_eq!(OutputFormat::from_str("JSON").unwrap(), OutputFormat::Json);
        assert_eq!(OutputFormat::from_str("text").unwrap(), OutputFormat::Text);
        assert_eq!(OutputFormat::from_str("invalid").unwrap(), OutputFormat::Text);
    }

    #[test]
    fn test_format_timestamp() {
        let formatted = format_timestamp(1_700_000_000);
        assert!(formatted.starts_with("2023-11-14"));
    }

    #[test]
    fn test_truncate_preserves_short_text() {
        assert_eq!(truncate("short", 10), "short");
    }

    #[test]
    fn test_truncate_is_char_safe() {
        let truncated = truncate("héllo wörld", 5);
        assert_eq!(truncated, "héllo...");
    }
}
