//! Expression events: run-length reduction of classifications and per-label totals.

pub mod reducer;
pub mod totals;
pub mod types;

pub use reducer::{ExpressionReducer, PendingExpression};
pub use totals::ExpressionTotals;
pub use types::{DetectionInterval, DurationUnit, ExpressionEvent};
