//! The durable Store (component A, spec §4.1).

mod proxy_store;

pub use proxy_store::ProxyStore;
