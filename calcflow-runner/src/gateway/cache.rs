//! Per-profile gateway handle cache

use calcflow_core::CoreError;
use calcflow_core::domain::Profile;
use calcflow_core::ids::ProfileId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tracing::{info, warn};

use super::{Gateway, GatewayFactory};

type HandleCell = Arc<OnceCell<Arc<dyn Gateway>>>;

/// Hands out one shared gateway handle per profile
///
/// A handle is built on first request and reused afterwards. A failed
/// construction is never cached: the next request tries again.
pub struct ConnectionCache {
    factory: Arc<dyn GatewayFactory>,
    handles: Mutex<HashMap<ProfileId, HandleCell>>,
}

impl ConnectionCache {
    pub fn new(factory: Arc<dyn GatewayFactory>) -> Self {
        Self {
            factory,
            handles: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the cached handle for `profile`, connecting if needed
    ///
    /// Concurrent first requests for a profile wait for a single connection
    /// attempt instead of racing. The map lock is only held to find the
    /// profile's cell, so a slow connection never delays other profiles.
    ///
    /// # Returns
    /// `ConnectionError` when the factory fails
    pub async fn get(&self, profile: &Profile) -> Result<Arc<dyn Gateway>, CoreError> {
        let cell = {
            let mut handles = self.handles.lock().await;
            Arc::clone(handles.entry(profile.id).or_default())
        };

        let handle = cell
            .get_or_try_init(|| async {
                match self.factory.connect(profile).await {
                    Ok(handle) => {
                        info!(
                            "Connected to gateway {} for profile {}",
                            profile.gateway_url, profile.label
                        );
                        Ok(handle)
                    }
                    Err(e) => {
                        warn!("Failed to connect profile {}: {:#}", profile.label, e);
                        Err(CoreError::Connection(format!("{:#}", e)))
                    }
                }
            })
            .await?;
        Ok(Arc::clone(handle))
    }

    /// Drops the handle of a profile, e.g. after the profile was deleted
    pub async fn evict(&self, profile_id: ProfileId) -> bool {
        self.handles
            .lock()
            .await
            .remove(&profile_id)
            .is_some_and(|cell| cell.initialized())
    }

    /// Number of profiles holding a connected handle
    pub async fn len(&self) -> usize {
        self.handles
            .lock()
            .await
            .values()
            .filter(|cell| cell.initialized())
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
