//! Record listing output for the recall and context commands.

use super::output::{format_timestamp, truncate};
use crate::models::ConversationRecord;
use std::io::{self, Write};

/// Width records are clipped to in the listing.
const CONTENT_PREVIEW: usize = 100;

/// Writes records as a compact listing, one block per record.
///
/// # Errors
///
/// Returns an error if writing fails.
pub fn write_records<W: Write>(writer: &mut W, records: &[ConversationRecord]) -> io::Result<()> {
    for record in records {
        let sync_marker = if record.synced { "" } else { " *" };
        writeln!(
            writer,
            "  [{}] {} ({}){}",
            format_timestamp(record.timestamp),
            record.id.as_str(),
            record.role,
            sync_marker
        )?;
        writeln!(writer, "       {}", truncate(&record.content, CONTENT_PREVIEW))?;
        if !record.keywords.is_empty() {
            writeln!(writer, "       keywords: {}", record.keywords.join(", "))?;
        }
        writeln!(writer)?;
    }
    Ok(())
}

/// Writes records as JSON.
///
/// # Errors
///
/// Returns an error if serialization or writing fails.
pub fn write_records_json<W: Write>(
    writer: &mut W,
    records: &[ConversationRecord],
) -> Result<(), Box<dyn std::error::Error>> {
    let json = serde_json::to_string_pretty(records)?;
    writeln!(writer, "{json}")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;

    #[test]
    fn test_write_records_marks_unsynced() {
        let records = vec![
            ConversationRecord::new(Role::User, "what is borrowing?")
                .with_keywords(vec!["borrowing".to_string()]),
        ];

        let mut buffer = Vec::new();
        write_records(&mut buffer, &records).unwrap();
        let output = String::from_utf8(buffer).unwrap();

        assert!(output.contains("(user) *"));
        assert!(output.contains("what is borrowing?"));
        assert!(output.contains("keywords: borrowing"));
    }

    #[test]
    fn test_write_records_truncates_long_content() {
        let records = vec![ConversationRecord::new(Role::Assistant, "x".repeat(300))];

        let mut buffer = Vec::new();
        write_records(&mut buffer, &records).unwrap();
        let output = String::from_utf8(buffer).unwrap();

        assert!(output.contains("..."));
        assert!(!output.contains(&"x".repeat(150)));
    }

    #[test]
    fn test_write_records_json() {
        let records = vec![ConversationRecord::new(Role::User, "hello")];

        let mut buffer = Vec::new();
        write_records_json(&mut buffer, &records).unwrap();
        let output = String::from_utf8(buffer).unwrap();

        assert!(output.contains("\"role\": \"user\""));
        assert!(output.contains("\"content\": \"hello\""));
    }
}
