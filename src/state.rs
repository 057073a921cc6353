// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Application context shared by the HTTP layer and the dispatcher.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use crate::blockchain::ChainProvider;
use crate::controller::{
    provision, Controller, ControllerSettings, DevicePublicKey, ProvisionRequest, SigningLock,
};
use crate::error::ControllerResult;
use crate::storage::{MemoryStore, Store};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub provider: Arc<dyn ChainProvider>,
    pub settings: ControllerSettings,
    /// Origins allowed to reach the dispatcher; any origin when `None`.
    pub allowed_origins: Option<Arc<Vec<String>>>,
    /// Active controllers keyed by origin.
    controllers: Arc<RwLock<HashMap<String, Controller>>>,
    /// Serializes loading, migration and provisioning.
    setup_lock: SigningLock,
}

impl AppState {
    pub fn new(
        store: Arc<dyn Store>,
        provider: Arc<dyn ChainProvider>,
        settings: ControllerSettings,
    ) -> Self {
        Self {
            store,
            provider,
            settings,
            allowed_origins: None,
            controllers: Arc::default(),
            setup_lock: SigningLock::new(),
        }
    }

    /// State backed by a fresh [`MemoryStore`].
    pub fn in_memory(provider: Arc<dyn ChainProvider>) -> Self {
        Self::new(
            Arc::new(MemoryStore::new()),
            provider,
            ControllerSettings::default(),
        )
    }

    pub fn with_allowed_origins(mut self, origins: Vec<String>) -> Self {
        self.allowed_origins = Some(Arc::new(origins));
        self
    }

    pub fn origin_allowed(&self, origin: &str) -> bool {
        match &self.allowed_origins {
            None => true,
            Some(list) => list.iter().any(|allowed| allowed == origin),
        }
    }

    /// Controller of `origin`, loaded from the store on first use.
    /// Retired entries are never handed out.
    pub async fn controller(&self, origin: &str) -> ControllerResult<Controller> {
        if let Some(controller) = self.cached(origin).await {
            return Ok(controller);
        }

        let _token = self.setup_lock.acquire(false).await?;
        if let Some(controller) = self.cached(origin).await {
            return Ok(controller);
        }

        let controller = Controller::from_store(
            origin,
            self.store.clone(),
            self.provider.clone(),
            self.settings.clone(),
        )?;
        debug!(origin, address = %controller.address(), "controller loaded");
        self.controllers
            .write()
            .await
            .insert(origin.to_string(), controller.clone());
        Ok(controller)
    }

    /// Provision `origin` and publish the new controller.
    ///
    /// A previously active controller for the origin finishes its in-flight
    /// gated operations before it is replaced.
    pub async fn provision(
        &self,
        origin: &str,
        request: ProvisionRequest,
    ) -> ControllerResult<DevicePublicKey> {
        let _token = self.setup_lock.acquire(false).await?;

        let previous = self.controllers.read().await.get(origin).cloned();
        let _previous_token = match &previous {
            Some(controller) => Some(controller.quiesce().await?),
            None => None,
        };

        let (controller, public) = provision(
            origin,
            request,
            self.store.clone(),
            self.provider.clone(),
            self.settings.clone(),
        )?;
        if let Some(previous) = &previous {
            previous.retire();
        }
        self.controllers
            .write()
            .await
            .insert(controller.origin().to_string(), controller);
        Ok(public)
    }

    /// Log out the controller of `target` on behalf of `requesting_origin`
    /// and drop it from the cache. Other origins are not affected.
    pub async fn logout(&self, requesting_origin: &str, target: &str) -> ControllerResult<()> {
        let controller = self.controller(target).await?;
        controller.logout(requesting_origin).await?;

        let mut controllers = self.controllers.write().await;
        // A concurrent re-provision may already have published a new binding
        if controllers.get(target).is_some_and(Controller::is_retired) {
            controllers.remove(target);
        }
        Ok(())
    }

    async fn cached(&self, origin: &str) -> Option<Controller> {
        self.controllers
            .read()
            .await
            .get(origin)
            .filter(|controller| !controller.is_retired())
            .cloned()
    }

    pub async fn active_controllers(&self) -> usize {
        self.controllers.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::provider::mock::MockProvider;
    use crate::error::ControllerError;

    const ORIGIN: &str = "https://app.example";

    fn request() -> ProvisionRequest {
        ProvisionRequest {
            address: "0xABC".to_string(),
            credential_id: "cred-1".to_string(),
            username: None,
        }
    }

    #[tokio::test]
    async fn unknown_origin_is_not_provisioned() {
        let state = AppState::in_memory(Arc::new(MockProvider::default()));
        assert!(matches!(
            state.controller(ORIGIN).await,
            Err(ControllerError::NotProvisioned)
        ));
        assert_eq!(state.active_controllers().await, 0);
    }

    #[tokio::test]
    async fn provisioned_controller_is_cached() {
        let state = AppState::in_memory(Arc::new(MockProvider::default()));
        let public = state.provision(ORIGIN, request()).await.unwrap();

        let a = state.controller(ORIGIN).await.unwrap();
        let b = state.controller(ORIGIN).await.unwrap();
        assert_eq!(a.device_address(), public.device_address);
        assert_eq!(b.device_address(), public.device_address);
        assert_eq!(state.active_controllers().await, 1);
    }

    #[tokio::test]
    async fn controller_loads_from_shared_store() {
        let provider: Arc<dyn ChainProvider> = Arc::new(MockProvider::default());
        let first = AppState::in_memory(provider.clone());
        let public = first.provision(ORIGIN, request()).await.unwrap();

        // A second process view over the same store
        let second = AppState::new(
            first.store.clone(),
            provider,
            ControllerSettings::default(),
        );
        let controller = second.controller(ORIGIN).await.unwrap();
        assert_eq!(controller.device_address(), public.device_address);
    }

    #[tokio::test]
    async fn logout_drops_only_target_origin() {
        let state = AppState::in_memory(Arc::new(MockProvider::default()));
        state.provision(ORIGIN, request()).await.unwrap();
        let other = "https://b.example";
        state
            .provision(
                other,
                ProvisionRequest {
                    address: "0xbbb".to_string(),
                    credential_id: "cred-b".to_string(),
                    username: None,
                },
            )
            .await
            .unwrap();
        let stale = state.controller(ORIGIN).await.unwrap();

        state.logout(ORIGIN, ORIGIN).await.unwrap();
        assert!(stale.is_retired());
        assert_eq!(state.active_controllers().await, 1);
        assert!(matches!(
            state.controller(ORIGIN).await,
            Err(ControllerError::NotProvisioned)
        ));
        assert_eq!(state.controller(other).await.unwrap().credential_id(), "cred-b");
    }

    #[tokio::test]
    async fn reprovisioning_retires_previous_controller() {
        let state = AppState::in_memory(Arc::new(MockProvider::default()));
        state.provision(ORIGIN, request()).await.unwrap();
        let old = state.controller(ORIGIN).await.unwrap();

        let public = state.provision(ORIGIN, request()).await.unwrap();
        assert!(old.is_retired());

        // The stale handle can no longer write over the new binding
        let err = old
            .deploy_contract(crate::blockchain::DeployRequest {
                bytecode: alloy::primitives::Bytes::from(vec![0x60]),
                value: alloy::primitives::U256::ZERO,
                gas_limit: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ControllerError::NotProvisioned));

        let current = state.controller(ORIGIN).await.unwrap();
        assert_eq!(current.device_address(), public.device_address);
    }

    #[test]
    fn origin_whitelist() {
        let state = AppState::in_memory(Arc::new(MockProvider::default()));
        assert!(state.origin_allowed("https://anything.example"));

        let state = state.with_allowed_origins(vec![ORIGIN.to_string()]);
        assert!(state.origin_allowed(ORIGIN));
        assert!(!state.origin_allowed("https://evil.example"));
    }
}
