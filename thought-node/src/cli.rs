//! Operator commands that only read the local mirror.

use clap::Subcommand;

use crate::store::{Mirror, SqliteStore, StoreError};

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the agent (default)
    Run,

    /// Show the cursor and number of mirrored records
    Status,

    /// List the most recent mirrored records
    History {
        /// Number of records to show
        #[arg(short, long, default_value = "6", value_parser = clap::value_parser!(u64).range(1..))]
        count: u64,
    },
}

/// Execute a read-only command and return its output.
pub fn execute_command(store: &SqliteStore, command: &Commands) -> Result<String, StoreError> {
    let mirror = Mirror::new(store);

    match command {
        Commands::Run => Ok(String::new()),

        Commands::Status => {
            let cursor = match mirror.cursor()? {
                Some(cursor) => cursor.to_string(),
                None => "uninitialized".to_string(),
            };
            Ok(format!(
                "cursor: {}\nrecords: {}",
                cursor,
                store.record_count()?
            ))
        }

        Commands::History { count: 0 } => Ok(String::new()),

        Commands::History { count } => {
            let Some(cursor) = mirror.cursor()? else {
                return Ok("No records".to_string());
            };
            let first = cursor.saturating_sub(count.saturating_sub(1));
            let mut lines = Vec::new();
            for index in first..=cursor {
                match mirror.record(index)? {
                    Some(tokens) => lines.push(format!(
                        "#{} ({} tokens): {:?}",
                        index,
                        tokens.len(),
                        tokens
                    )),
                    None => lines.push(format!("#{} missing", index)),
                }
            }
            Ok(lines.join("\n"))
        }
    }
}
