//! Routing inspection output.

use crate::models::RoutingDecision;
use std::io::{self, Write};

/// Writes a routing decision as aligned text rows.
///
/// # Errors
///
/// Returns an error if writing fails.
pub fn write_decision<W: Write>(writer: &mut W, decision: &RoutingDecision) -> io::Result<()> {
    writeln!(writer, "Tier:        {}", decision.tier)?;
    writeln!(writer, "Effort:      {}", decision.effort)?;
    writeln!(writer, "Complexity:  {}", decision.complexity)?;
    writeln!(writer, "Confidence:  {:.2}", decision.confidence)?;
    writeln!(
        writer,
        "Deep pass:   {}",
        if decision.parallel_deep { "yes" } else { "no" }
    )?;
    if let Some(capability) = &decision.capability {
        writeln!(writer, "Capability:  {capability}")?;
    }
    if let Some(method) = decision.method {
        writeln!(writer, "Method:      {method}")?;
    }
    Ok(())
}

/// Writes a routing decision as JSON.
///
/// # Errors
///
/// Returns an error if serialization or writing fails.
pub fn write_decision_json<W: Write>(
    writer: &mut W,
    decision: &RoutingDecision,
) -> Result<(), Box<dyn std::error::Error>> {
    let json = serde_json::to_string_pretty(decision)?;
    writeln!(writer, "{json}")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Complexity, EffortLevel, ModelTier, RoutingDecision};

    fn sample_decision() -> RoutingDecision {
        RoutingDecision::for_tier(
            ModelTier::Lite,
            EffortLevel::Low,
            Complexity::Complex,
            true,
            0.75,
        )
    }

    #[test]
    fn test_write_decision_text() {
        let mut buffer = Vec::new();
        write_decision(&mut buffer, &sample_decision()).unwrap();
        let output = String::from_utf8(buffer).unwrap();

        assert!(output.contains("Tier:        lite"));
        assert!(output.contains("Deep pass:   yes"));
        assert!(output.contains("Confidence:  0.75"));
        assert!(!output.contains("Capability:"));
    }

    #[test]
    fn test_write_decision_json() {
        let mut buffer = Vec::new();
        write_decision_json(&mut buffer, &sample_decision()).unwrap();
        let output = String::from_utf8(buffer).unwrap();

        assert!(output.contains("\"tier\""));
        assert!(output.contains("\"parallel_deep\": true"));
    }
}
