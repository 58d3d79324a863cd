mod controller;
mod types;

pub use controller::FlushController;
pub use types::{FlushConfig, FlushOutcome, FlushStats, FlushStatsSnapshot};
