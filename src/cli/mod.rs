use clap::{Parser, Subcommand};
use tracing::info;

use crate::buffer::{BufferResult, SharedBuffer};

/// Road Vision hub - batched persistence and real-time fan-out of road telemetry
#[derive(Parser)]
#[command(name = "roadvision-hub")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the server (default)
    Serve,

    /// Show pending and dead-lettered buffer lengths
    Buffer,

    /// Move dead-lettered entries back to the tail of the buffer
    Requeue {
        /// Maximum number of entries to move
        #[arg(short, long, default_value = "1000")]
        limit: usize,
    },
}

/// Move up to `limit` dead letters back into the buffer, oldest first.
/// Returns how many were moved.
pub async fn requeue_dead_letters(buffer: &dyn SharedBuffer, limit: usize) -> BufferResult<usize> {
    let moved = buffer.requeue_dead_letters(limit).await?;
    info!("Requeued {} dead-lettered entries", moved);
    Ok(moved)
}
