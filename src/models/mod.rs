//! Data model shared across storage, scoring, probing, and the API surface.

pub mod api;
pub mod checkpoint;
pub mod lease;
pub mod probe;
pub mod proxy;

pub use api::*;
pub use checkpoint::*;
pub use lease::*;
pub use probe::*;
pub use proxy::*;
