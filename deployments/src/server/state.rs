//! Server state

use std::sync::Arc;

use crate::webhooks::Webhooks;

/// Server state shared across handlers
pub struct ServerState {
    pub webhooks: Arc<Webhooks>,
}

impl ServerState {
    pub fn new(webhooks: Arc<Webhooks>) -> Self {
        Self { webhooks }
    }
}
