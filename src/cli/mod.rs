//! CLI output implementations.
//!
//! This module provides the rendering half of the command-line interface.
//! Each submodule writes one command's output to a generic writer; argument
//! parsing and wiring live in the binary.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `route` | Plan the routing for a request without answering it |
//! | `store` | Store a record outside the turn flow |
//! | `recall` | Search stored records by keyword |
//! | `context` | Show the rolling context window |
//! | `sync` | Push unsynced records to the durable fact log |
//! | `status` | Show store, synchronizer, and task statistics |
//! | `task` | Create, drive, and inspect background tasks |
//! | `feedback` | Record feedback that tunes keyword weights |
//! | `config` | Configuration management |
//!
//! # Example Usage
//!
//! ```bash
//! # See where a request would be routed
//! synapt route "compare these two storage designs"
//!
//! # Store a knowledge record
//! synapt store "staging deploys happen from the release branch"
//!
//! # Search memory
//! synapt recall "storage designs"
//!
//! # Push the sync queue and watch the worker
//! synapt sync --watch
//! ```

mod output;
mod recall;
mod route;
mod status;
mod sync;
mod task;

pub use output::{OutputFormat, format_timestamp, truncate};
pub use recall::{write_records, write_records_json};
pub use route::{write_decision, write_decision_json};
pub use status::{write_status, write_status_json};
pub use sync::run_watch;
pub use task::{write_task_detail, write_task_json, write_task_table, write_tasks_json};
