//! Command batches fanned out across many devices
//!
//! # Architecture
//!
//! ```text
//! show_commands / config_commands tool
//!            ↓
//!     DeviceDispatcher.dispatch(CommandBatch)
//!            ↓
//!   ┌────────┼────────┐
//!   ↓        ↓        ↓
//! task r1  task r2  task r3   (SessionExecutor, one per device)
//!   └────────┼────────┘
//!            ↓
//!       BatchReport
//! ```

pub mod batch;
pub mod fanout;

pub use batch::{BatchReport, CommandBatch, DeviceOutcome, ExecutionMode, OutcomeStatus};
pub use fanout::{DeviceDispatcher, DispatchError, UnmatchedDevicePolicy};
