use std::sync::Arc;

use crate::gateway::FarmGateway;

/// Shared handler state: the injected gateway and the default page size.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<dyn FarmGateway>,
    pub page_size: u32,
}

impl AppState {
    pub fn new(gateway: Arc<dyn FarmGateway>, page_size: u32) -> Self {
        AppState { gateway, page_size }
    }
}
