//! Analysis modules.
//!
//! The aggregation engine lives in [`aggregator`]; it only sees typed
//! deals and stages and returns flat row sets.

pub mod aggregator;

pub use aggregator::*;
