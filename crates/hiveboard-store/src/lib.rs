mod error;
mod filter;
mod persist;
mod pricing;
mod queries;
mod retention;
mod store;

pub use error::{Error, Result};
pub use filter::{filter_events, paginate, visible_to, EventFilter, Page};
pub use pricing::{effective_cost, estimate_cost, price_for, ModelPrice};
pub use queries::*;
pub use retention::PruneReport;
pub use store::{BatchOutcome, Store};
