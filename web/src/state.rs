//! Application state for Axum handlers.

use crate::config::Config;
use metrics_exporter_prometheus::PrometheusHandle;
use rifa_core::environment::RaffleEnvironment;
use rifa_core::orchestrator::{PurchaseLimits, PurchaseOrchestrator};
use rifa_core::raffles::RaffleService;
use rifa_core::reconciler::{FallbackPolicy, PaymentReconciler, ProviderRegistry};
use rifa_core::store::RaffleStore;
use std::sync::Arc;

/// Services shared across all HTTP handlers.
///
/// Every field is cheap to clone; handlers receive a clone per request.
#[derive(Clone)]
pub struct AppState {
    /// Buyer-facing purchase flow
    pub orchestrator: PurchaseOrchestrator,
    /// Webhook and manual payment transitions
    pub reconciler: PaymentReconciler,
    /// Raffle read path
    pub raffles: RaffleService,
    /// Store, for readiness checks
    pub store: Arc<dyn RaffleStore>,
    /// Prometheus renderer, when a recorder is installed
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Wires the services over one environment.
    #[must_use]
    pub fn new(env: &RaffleEnvironment, limits: PurchaseLimits, fallback: FallbackPolicy) -> Self {
        Self {
            orchestrator: PurchaseOrchestrator::new(env.clone(), limits),
            reconciler: PaymentReconciler::new(env.clone(), ProviderRegistry::builtin(), fallback),
            raffles: RaffleService::new(env.clone()),
            store: Arc::clone(&env.store),
            metrics: None,
        }
    }

    /// Wires the services with the limits and fallback from `config`.
    #[must_use]
    pub fn from_config(env: &RaffleEnvironment, config: &Config) -> Self {
        Self::new(env, config.limits(), config.fallback)
    }

    /// Serves `GET /metrics` from `handle`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}
