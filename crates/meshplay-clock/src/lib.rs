//! Time handling for Meshplay.
//!
//! Two concerns live here:
//!
//! - **Start dates** ([`format_start_date`], [`parse_start_date`],
//!   [`deadline_instant`]): the coordinator picks a wall-clock instant a
//!   few seconds ahead and every peer arms a one-shot timer for it, so all
//!   replicas begin playing at (nearly) the same moment.
//! - **World stepping** ([`StepScheduler`]): once playing, each peer moves
//!   its own elements at a fixed rate.

mod date;
mod step;

pub use date::{deadline_instant, format_start_date, parse_start_date, start_date_after};
pub use step::{StepConfig, StepInfo, StepPolicy, StepScheduler};

/// Errors from parsing shared time values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClockError {
    #[error("invalid start date {0:?}")]
    InvalidStartDate(String),
}
