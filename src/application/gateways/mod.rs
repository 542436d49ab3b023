//! Payment rails behind the [`PaymentGateway`] port.
//!
//! Each rail owns its request shaping; the orchestrator only picks the
//! gateway that [`handles`](PaymentGateway::handles) the provider code.

pub mod card;
pub mod mobile_money;
pub mod phone;

use crate::domain::ports::{GatewayRef, PaymentGateway};
use crate::domain::unlock::ProviderCode;

/// Ordered set of registered rails.
#[derive(Clone, Default)]
pub struct GatewayRegistry {
    gateways: Vec<GatewayRef>,
}

impl GatewayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, gateway: GatewayRef) -> Self {
        self.gateways.push(gateway);
        self
    }

    pub fn resolve(&self, provider: &ProviderCode) -> Option<&dyn PaymentGateway> {
        self.gateways
            .iter()
            .find(|g| g.handles(provider))
            .map(|g| g.as_ref())
    }
}
