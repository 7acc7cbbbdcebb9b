//! Shared application state handed to every handler (spec §4.7).

use crate::config::Config;
use crate::lease::LeaseManager;
use crate::signal::SignalBus;
use crate::storage::ProxyStore;
use std::sync::Arc;

#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<ProxyStore>,
    pub leases: Arc<LeaseManager>,
    pub signal: SignalBus,
    pub config: Arc<Config>,
}

impl ApiState {
    pub fn now(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}
