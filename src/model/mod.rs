// File: ./src/model/mod.rs
pub mod event;
pub mod filter;
pub mod spec;

pub use event::{DateType, EventRecord, EventStyle};
pub use filter::{Filter, FilterChain, FilterValue, compile};
pub use spec::ViewSpec;
