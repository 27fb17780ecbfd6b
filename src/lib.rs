// Crate root library declaration and module exports.
pub mod cache;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod extractor;
pub mod graph;
pub mod logging;
pub mod model;
pub mod resolver;
pub mod scheduler;
pub mod sink;
pub mod store;
pub mod system;
pub mod view;

pub use engine::{Engine, EngineSettings};
pub use error::{BlockParseError, EngineError, ResolutionError};
pub use model::{EventRecord, ViewSpec};
pub use view::ViewHandle;
