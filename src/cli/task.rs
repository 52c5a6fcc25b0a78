//! Task listing and detail output.

use super::output::{format_timestamp, truncate};
use crate::models::Task;
use std::io::{self, Write};

/// Width task descriptions are clipped to in the table.
const DESCRIPTION_PREVIEW: usize = 48;

/// Writes tasks as an aligned table.
///
/// # Errors
///
/// Returns an error if writing fails.
pub fn write_task_table<W: Write>(writer: &mut W, tasks: &[Task]) -> io::Result<()> {
    writeln!(
        writer,
        "{:<42}{:<11}{:<9}{:>5}  {}",
        "ID", "STATUS", "PRIORITY", "PROG", "DESCRIPTION"
    )?;
    for task in tasks {
        writeln!(
            writer,
            "{:<42}{:<11}{:<9}{:>4.0}%  {}",
            task.id.as_str(),
            task.status,
            task.priority,
            task.progress * 100.0,
            truncate(&task.description, DESCRIPTION_PREVIEW)
        )?;
    }
    Ok(())
}

/// Writes one task in full, including timestamps and its log.
///
/// # Errors
///
/// Returns an error if writing fails.
pub fn write_task_detail<W: Write>(writer: &mut W, task: &Task) -> io::Result<()> {
    writeln!(writer, "ID:          {}", task.id)?;
    writeln!(writer, "Description: {}", task.description)?;
    writeln!(writer, "Kind:        {}", task.kind)?;
    writeln!(writer, "Priority:    {}", task.priority)?;
    writeln!(writer, "Status:      {}", task.status)?;
    writeln!(writer, "Progress:    {:.0}%", task.progress * 100.0)?;
    writeln!(writer, "Created:     {}", format_timestamp(task.created_at))?;
    if let Some(started_at) = task.started_at {
        writeln!(writer, "Started:     {}", format_timestamp(started_at))?;
    }
    if let Some(completed_at) = task.completed_at {
        writeln!(writer, "Finished:    {}", format_timestamp(completed_at))?;
    }
    if let Some(result) = &task.result {
        writeln!(writer, "Result:      {result}")?;
    }
    if let Some(error) = &task.error {
        writeln!(writer, "Error:       {error}")?;
    }
    if !task.log.is_empty() {
        writeln!(writer)?;
        writeln!(writer, "Log:")?;
        for entry in &task.log {
            writeln!(
                writer,
                "  [{}] {}",
                format_timestamp(entry.timestamp),
                entry.message
            )?;
        }
    }
    Ok(())
}

/// Writes tasks as JSON.
///
/// # Errors
///
/// Returns an error if serialization or writing fails.
pub fn write_tasks_json<W: Write>(
    writer: &mut W,
    tasks: &[Task],
) -> Result<(), Box<dyn std::error::Error>> {
    let json = serde_json::to_string_pretty(tasks)?;
    writeln!(writer, "{json}")?;
    Ok(())
}

/// Writes one task as JSON.
///
/// # Errors
///
/// Returns an error if serialization or writing fails.
pub fn write_task_json<W: Write>(
    writer: &mut W,
    task: &Task,
) -> Result<(), Box<dyn std::error::Error>> {
    let json = serde_json::to_string_pretty(task)?;
    writeln!(writer, "{json}")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TaskPriority;

    fn sample_task() -> Task {
        let mut task = Task::new("summarize the conversation", "deep-pass", TaskPriority::Low);
        task.push_log("created");
        task
    }

    #[test]
    fn test_write_task_table() {
        let tasks = vec![sample_task()];
        let mut buffer = Vec::new();
        write_task_table(&mut buffer, &tasks).unwrap();
        let output = String::from_utf8(buffer).unwrap();

        assert!(output.contains("ID"));
        assert!(output.contains("STATUS"));
        assert!(output.contains("pending"));
        assert!(output.contains("summarize the conversation"));
    }

    #[test]
    fn test_write_task_detail_includes_log() {
        let task = sample_task();
        let mut buffer = Vec::new();
        write_task_detail(&mut buffer, &task).unwrap();
        let output = String::from_utf8(buffer).unwrap();

        assert!(output.contains("Kind:        deep-pass"));
        assert!(output.contains("Progress:    0%"));
        assert!(output.contains("created"));
        assert!(!output.contains("Result:"));
    }

    #[test]
    fn test_write_task_json() {
        let task = sample_task();
        let mut buffer = Vec::new();
        write_task_json(&mut buffer, &task).unwrap();
        let output = String::from_utf8(buffer).unwrap();

        assert!(output.contains("\"status\": \"pending\""));
        assert!(output.contains("\"kind\": \"deep-pass\""));
    }
}
