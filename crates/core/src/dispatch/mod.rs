//! Worker pool dispatch of approved changes

mod dispatcher;
mod queue;

pub use dispatcher::Dispatcher;
pub use queue::{Pop, TaskQueue};
