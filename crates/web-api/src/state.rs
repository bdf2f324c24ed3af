use std::sync::Arc;

use application::{Clock, MessageService, PresenceService};
use domain::FingerprintHasher;

use crate::auth::JwtService;
use crate::connections::HubConnections;

#[derive(Clone)]
pub struct AppState {
    pub presence_service: Arc<PresenceService>,
    pub message_service: Arc<MessageService>,
    pub connections: Arc<HubConnections>,
    pub jwt_service: Arc<JwtService>,
    pub fingerprint: Arc<FingerprintHasher>,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    pub fn new(
        presence_service: Arc<PresenceService>,
        message_service: Arc<MessageService>,
        connections: Arc<HubConnections>,
        jwt_service: Arc<JwtService>,
        fingerprint: Arc<FingerprintHasher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            presence_service,
            message_service,
            connections,
            jwt_service,
            fingerprint,
            clock,
        }
    }
}
