//! EUR-anchored currency conversion.
//!
//! The rate table only holds EUR→X rows. Every other pair is derived from
//! them (inverse or cross rate), looked up at the valuta date first and the
//! booking date second, with an optional on-demand fetch from an external
//! source when both miss.

pub mod resolver;
pub mod source;
pub mod store;

pub use resolver::{apply_rate, derive_rate, DerivedRate, FxConfig, FxError, FxResolver, Pair};
pub use source::{fetch_window, EcbRateSource, RateSource, RateSourceError, ECB_SOURCE};
pub use store::{MemoryRateStore, RateStore, RateStoreError};
