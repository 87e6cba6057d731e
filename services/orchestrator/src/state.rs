//! Application state shared across request handlers.

use std::sync::Arc;

use qorch_connectivity::ConnectivityProbe;
use qorch_quota::{AllocationLedger, RecommendationScorer};
use tokio::sync::Mutex;

use crate::config::Config;
use crate::engine::Engine;

/// Shared application state.
///
/// The ledger is the only mutable component and sits behind a single lock;
/// every quota mutation is serialized through it.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    ledger: Mutex<AllocationLedger>,
    scorer: RecommendationScorer,
    probe: Arc<ConnectivityProbe>,
    config: Config,
}

impl AppState {
    pub fn new(engine: Engine) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                ledger: Mutex::new(engine.ledger),
                scorer: engine.scorer,
                probe: engine.probe,
                config: engine.config,
            }),
        }
    }

    pub fn ledger(&self) -> &Mutex<AllocationLedger> {
        &self.inner.ledger
    }

    pub fn scorer(&self) -> &RecommendationScorer {
        &self.inner.scorer
    }

    pub fn probe(&self) -> &ConnectivityProbe {
        &self.inner.probe
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }
}
