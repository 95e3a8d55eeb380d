use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// "Is the device online" signal checked once at the start of a run.
#[async_trait]
pub trait Connectivity: Send + Sync {
    async fn is_online(&self) -> bool;
}

/// Assumes the network is always reachable.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysOnline;

#[async_trait]
impl Connectivity for AlwaysOnline {
    async fn is_online(&self) -> bool {
        true
    }
}

/// A shared switch flipped by whatever watches the network.
#[derive(Debug, Clone)]
pub struct ConnectivityFlag(Arc<AtomicBool>);

impl ConnectivityFlag {
    pub fn new(online: bool) -> Self {
        Self(Arc::new(AtomicBool::new(online)))
    }

    pub fn set_online(&self, online: bool) {
        self.0.store(online, Ordering::Release);
    }
}

#[async_trait]
impl Connectivity for ConnectivityFlag {
    async fn is_online(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}
