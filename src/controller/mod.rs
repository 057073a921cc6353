// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Controller
//!
//! The controller owns the device key of one account on one origin and is
//! the only component that signs with it.
//!
//! ## Operation classes
//!
//! | Class      | Lock   | Examples                                        |
//! |------------|--------|-------------------------------------------------|
//! | Read-only  | bypass | `get_nonce`, `estimate_fee`                     |
//! | Pure       | none   | `hash_message`, `verify_message_hash`           |
//! | Gated      | FIFO   | `sign_message`, `deploy_contract`, `add_owner`, |
//! |            |        | `register_session`, `logout`                    |
//!
//! Gated operations build the next state, persist it, and only then swap it
//! into memory. A failed write leaves memory and store as they were.
//!
//! A [`Controller`] value can only be obtained through [`provision`] or
//! [`Controller::from_store`], so every operation runs on a provisioned
//! instance.

pub mod account;
pub mod lock;
pub mod provision;
pub mod record;
pub mod session;
pub mod signature;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use alloy::{
    dyn_abi::TypedData,
    primitives::{Address, B256},
    signers::{local::PrivateKeySigner, SignerSync},
    sol_types::SolStruct,
};
use chrono::{DateTime, TimeDelta, Utc};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::blockchain::signing::{device_address, public_key_hex, signer_from_pem, signer_to_pem};
use crate::blockchain::{Call, ChainProvider, DeployRequest, FeeDetails, FeeEstimate};
use crate::error::{ControllerError, ControllerResult};
use crate::storage::Store;

pub use account::{
    AccountAddress, AddressError, CredentialDescriptor, CredentialKind, Deployment, Owner,
};
pub use lock::{LockError, ReleaseToken, SigningLock};
pub use provision::{provision, DevicePublicKey, ProvisionRequest};
pub use record::ControllerRecord;
pub use session::{Policy, RegisterSessionRequest, Session};
pub use signature::{ControllerSignature, ControllerVersion, SignatureError};

use session::{authorization_domain, OwnerGrant};
use signature::{hash_typed_data, recovers_to};

/// Default session lifetime (7 days).
pub const DEFAULT_SESSION_DURATION: TimeDelta = TimeDelta::days(7);

/// Chain id used for EIP-712 domains when none is configured (Fuji).
pub const DEFAULT_CHAIN_ID: u64 = crate::blockchain::DEFAULT_CHAIN_ID;

/// Tunables shared by every controller of a process.
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub chain_id: u64,
    pub session_duration: TimeDelta,
    /// Bound on waiting for the signing lock; unbounded when `None`.
    pub lock_timeout: Option<Duration>,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            chain_id: DEFAULT_CHAIN_ID,
            session_duration: DEFAULT_SESSION_DURATION,
            lock_timeout: None,
        }
    }
}

impl ControllerSettings {
    fn signing_lock(&self) -> SigningLock {
        match self.lock_timeout {
            Some(timeout) => SigningLock::with_timeout(timeout),
            None => SigningLock::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct MutableState {
    owners: Vec<Owner>,
    sessions: Vec<Session>,
    deployment: Option<Deployment>,
}

struct Inner {
    origin: String,
    address: AccountAddress,
    credential_id: String,
    username: Option<String>,
    version: ControllerVersion,
    created_at: DateTime<Utc>,
    signer: PrivateKeySigner,
    state: RwLock<MutableState>,
    lock: SigningLock,
    store: Arc<dyn Store>,
    provider: Arc<dyn ChainProvider>,
    settings: ControllerSettings,
    /// Set once the binding was replaced or the store cleared.
    retired: AtomicBool,
}

/// Handle to a provisioned controller. Clones share state and lock.
#[derive(Clone)]
pub struct Controller {
    inner: Arc<Inner>,
}

impl fmt::Debug for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controller")
            .field("origin", &self.inner.origin)
            .field("address", &self.inner.address)
            .field("credential_id", &self.inner.credential_id)
            .field("version", &self.inner.version)
            .field("device_address", &self.device_address())
            .finish_non_exhaustive()
    }
}

impl Controller {
    fn from_record(
        origin: &str,
        record: ControllerRecord,
        store: Arc<dyn Store>,
        provider: Arc<dyn ChainProvider>,
        settings: ControllerSettings,
    ) -> ControllerResult<Self> {
        let signer = signer_from_pem(&record.device_key)?;
        let lock = settings.signing_lock();
        Ok(Self {
            inner: Arc::new(Inner {
                origin: origin.to_string(),
                address: record.address,
                credential_id: record.credential_id,
                username: record.username,
                version: record.version,
                created_at: record.created_at,
                signer,
                state: RwLock::new(MutableState {
                    owners: record.owners,
                    sessions: record.sessions,
                    deployment: record.deployment,
                }),
                lock,
                store,
                provider,
                settings,
                retired: AtomicBool::new(false),
            }),
        })
    }

    /// Read the controller of `origin` back from `store`.
    ///
    /// Missing or corrupt data yields [`ControllerError::NotProvisioned`];
    /// an unknown schema marker yields [`ControllerError::UnsupportedSchema`].
    pub fn from_store(
        origin: &str,
        store: Arc<dyn Store>,
        provider: Arc<dyn ChainProvider>,
        settings: ControllerSettings,
    ) -> ControllerResult<Self> {
        let record = record::load_record(store.as_ref(), origin)?;
        Self::from_record(origin, record, store, provider, settings).map_err(|e| {
            warn!(origin, error = %e, "stored device key is unreadable");
            ControllerError::NotProvisioned
        })
    }

    /// Persist the full controller state under its origin key.
    pub async fn store(&self) -> ControllerResult<()> {
        let _token = self.gate().await?;
        let state = self.inner.state.read().await;
        self.persist(&state)
    }

    // ---------------------------------------------------------------------
    // Accessors
    // ---------------------------------------------------------------------

    pub fn address(&self) -> &AccountAddress {
        &self.inner.address
    }

    /// Display name, falling back to the credential id.
    pub fn username(&self) -> &str {
        self.inner
            .username
            .as_deref()
            .unwrap_or(&self.inner.credential_id)
    }

    pub fn credential_id(&self) -> &str {
        &self.inner.credential_id
    }

    pub fn origin(&self) -> &str {
        &self.inner.origin
    }

    pub fn version(&self) -> ControllerVersion {
        self.inner.version
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.inner.created_at
    }

    pub fn device_address(&self) -> Address {
        device_address(&self.inner.signer)
    }

    /// Uncompressed device public key, 0x-prefixed hex.
    pub fn device_public_key(&self) -> String {
        public_key_hex(&self.inner.signer)
    }

    pub async fn sessions(&self) -> Vec<Session> {
        self.inner.state.read().await.sessions.clone()
    }

    pub async fn owners(&self) -> Vec<Owner> {
        self.inner.state.read().await.owners.clone()
    }

    pub async fn deployment(&self) -> Option<Deployment> {
        self.inner.state.read().await.deployment.clone()
    }

    pub fn settings(&self) -> &ControllerSettings {
        &self.inner.settings
    }

    /// Stop this handle from writing. Later gated operations fail with
    /// [`ControllerError::NotProvisioned`].
    pub fn retire(&self) {
        self.inner.retired.store(true, Ordering::Release);
    }

    pub fn is_retired(&self) -> bool {
        self.inner.retired.load(Ordering::Acquire)
    }

    /// Wait for in-flight gated operations and hold off new ones.
    pub async fn quiesce(&self) -> ControllerResult<ReleaseToken> {
        Ok(self.inner.lock.acquire(false).await?)
    }

    // ---------------------------------------------------------------------
    // Chain queries
    // ---------------------------------------------------------------------

    /// Next account nonce, straight from the provider.
    pub async fn get_nonce(&self) -> ControllerResult<u64> {
        let _token = self.inner.lock.acquire(true).await?;
        Ok(self.inner.provider.get_nonce(&self.inner.address).await?)
    }

    pub async fn estimate_fee(
        &self,
        calls: &[Call],
        details: &FeeDetails,
    ) -> ControllerResult<FeeEstimate> {
        if calls.is_empty() {
            return Err(ControllerError::malformed("at least one call is required"));
        }
        let _token = self.inner.lock.acquire(true).await?;
        Ok(self
            .inner
            .provider
            .estimate_fee(&self.inner.address, calls, details)
            .await?)
    }

    // ---------------------------------------------------------------------
    // Messages
    // ---------------------------------------------------------------------

    /// EIP-712 signing hash of `typed_data`.
    pub fn hash_message(&self, typed_data: &TypedData) -> ControllerResult<B256> {
        hash_typed_data(typed_data).map_err(|e| ControllerError::malformed(e.to_string()))
    }

    /// Sign `typed_data` with the device key.
    pub async fn sign_message(&self, typed_data: &TypedData) -> ControllerResult<ControllerSignature> {
        let _token = self.gate().await?;
        let hash = self.hash_message(typed_data)?;
        let signature = self.inner.signer.sign_hash_sync(&hash)?;
        debug!(address = %self.inner.address, %hash, "signed message");
        Ok(ControllerSignature::owner(self.inner.version, signature))
    }

    /// Check `signature` over `hash`.
    ///
    /// Owner signatures must recover to the device key or a registered
    /// owner. Session signatures must recover to the key of a registered,
    /// unexpired session. A class hash other than this controller's
    /// version is never valid.
    pub async fn verify_message_hash(
        &self,
        hash: &B256,
        signature: &ControllerSignature,
    ) -> ControllerResult<bool> {
        if ControllerVersion::from_class_hash(signature.class_hash()) != Some(self.inner.version) {
            return Ok(false);
        }
        let state = self.inner.state.read().await;
        let valid = match signature {
            ControllerSignature::Owner { signature, .. } => {
                recovers_to(signature, hash, self.device_address())
                    || state
                        .owners
                        .iter()
                        .any(|owner| recovers_to(signature, hash, owner.signer))
            }
            ControllerSignature::Session {
                session_key,
                signature,
                ..
            } => {
                let now = Utc::now();
                state
                    .sessions
                    .iter()
                    .any(|s| s.session_key == *session_key && !s.is_expired(now))
                    && recovers_to(signature, hash, *session_key)
            }
        };
        Ok(valid)
    }

    // ---------------------------------------------------------------------
    // State-altering operations
    // ---------------------------------------------------------------------

    /// Deploy the account contract, signed by the device key.
    pub async fn deploy_contract(&self, request: DeployRequest) -> ControllerResult<Deployment> {
        if request.bytecode.is_empty() {
            return Err(ControllerError::malformed("bytecode must not be empty"));
        }
        let _token = self.gate().await?;
        let mut next = self.inner.state.read().await.clone();
        if next.deployment.is_some() {
            return Err(ControllerError::malformed("account is already deployed"));
        }

        let result = self.inner.provider.deploy(&self.inner.signer, &request).await?;
        let deployment = Deployment {
            transaction_hash: result.transaction_hash,
            deployed_at: Utc::now(),
        };
        next.deployment = Some(deployment.clone());
        self.commit(next).await?;

        info!(
            address = %self.inner.address,
            tx_hash = %deployment.transaction_hash,
            "account contract deployment submitted"
        );
        Ok(deployment)
    }

    /// Register an additional owner and sign the authorization for it.
    pub async fn add_owner(
        &self,
        signer: Address,
        credential: CredentialDescriptor,
    ) -> ControllerResult<(Owner, ControllerSignature)> {
        if signer == Address::ZERO {
            return Err(ControllerError::malformed("owner signer must not be zero"));
        }
        if credential.id.trim().is_empty() {
            return Err(ControllerError::malformed("credential id must not be empty"));
        }
        if signer == self.device_address() {
            return Err(ControllerError::malformed("device key is already an owner"));
        }

        let _token = self.gate().await?;
        let mut next = self.inner.state.read().await.clone();
        if next.owners.iter().any(|owner| owner.signer == signer) {
            return Err(ControllerError::malformed("signer is already an owner"));
        }

        let grant = OwnerGrant {
            controller: *self.inner.address.as_word(),
            signer,
            credentialHash: B256::from_slice(&Sha256::digest(credential.id.as_bytes())),
        };
        let authorization = self.sign_struct(&grant)?;

        let owner = Owner {
            signer,
            credential,
            added_at: Utc::now(),
        };
        next.owners.push(owner.clone());
        self.commit(next).await?;

        info!(address = %self.inner.address, %signer, "owner added");
        Ok((owner, authorization))
    }

    /// Register a session grant and sign the authorization for it.
    pub async fn register_session(
        &self,
        request: RegisterSessionRequest,
    ) -> ControllerResult<(Session, ControllerSignature)> {
        let session = request.into_session(Utc::now(), self.inner.settings.session_duration)?;

        let _token = self.gate().await?;
        let authorization = self.sign_struct(&session.grant())?;

        let mut next = self.inner.state.read().await.clone();
        // Drop grants that can no longer be used while we are writing anyway
        let now = Utc::now();
        next.sessions.retain(|s| !s.is_expired(now));
        next.sessions.push(session.clone());
        self.commit(next).await?;

        info!(
            address = %self.inner.address,
            session_id = %session.id,
            session_key = %session.session_key,
            expires_at = %session.expires_at,
            "session registered"
        );
        Ok((session, authorization))
    }

    /// Remove the session grant `id`.
    pub async fn revoke_session(&self, id: Uuid) -> ControllerResult<Session> {
        let _token = self.gate().await?;
        let mut next = self.inner.state.read().await.clone();
        let position = next
            .sessions
            .iter()
            .position(|s| s.id == id)
            .ok_or_else(|| ControllerError::malformed(format!("unknown session {id}")))?;
        let removed = next.sessions.remove(position);
        self.commit(next).await?;

        info!(address = %self.inner.address, session_id = %id, "session revoked");
        Ok(removed)
    }

    /// First active session whose policies cover every call.
    pub async fn session_for(&self, calls: &[Call]) -> Option<Session> {
        let now = Utc::now();
        self.inner
            .state
            .read()
            .await
            .sessions
            .iter()
            .find(|s| !s.is_expired(now) && s.permits(calls))
            .cloned()
    }

    // ---------------------------------------------------------------------
    // Admin grants
    // ---------------------------------------------------------------------

    /// Whether `origin` holds an admin grant over this account.
    pub fn is_admin(&self, origin: &str) -> ControllerResult<bool> {
        record::has_admin_grant(self.inner.store.as_ref(), &self.inner.address, origin)
    }

    /// Give `target_origin` an admin grant over this account. This
    /// controller's origin must already hold one. A granted origin may log
    /// this controller out.
    pub async fn grant_admin(&self, target_origin: &str) -> ControllerResult<()> {
        let target_origin = target_origin.trim();
        if target_origin.is_empty() {
            return Err(ControllerError::malformed("origin must not be empty"));
        }
        let _token = self.gate().await?;
        self.require_admin(&self.inner.origin)?;
        record::write_admin_grant(self.inner.store.as_ref(), &self.inner.address, target_origin)?;
        info!(address = %self.inner.address, target_origin, "admin grant issued");
        Ok(())
    }

    /// Remove this controller's binding on behalf of `requesting_origin`,
    /// which must hold an admin grant over the account. Without one the
    /// store is left untouched.
    ///
    /// Only this origin's record and the admin grants over this account go.
    /// The handle is retired before the lock is released, so operations
    /// queued behind the logout fail instead of writing the record back.
    pub async fn logout(&self, requesting_origin: &str) -> ControllerResult<()> {
        let _token = self.gate().await?;
        self.require_admin(requesting_origin)?;
        let grants =
            record::remove_binding(self.inner.store.as_ref(), &self.inner.origin, &self.inner.address)?;
        self.retire();
        info!(
            address = %self.inner.address,
            origin = %self.inner.origin,
            requesting_origin,
            admin_grants = grants,
            "logged out"
        );
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Internals
    // ---------------------------------------------------------------------

    /// Enter the critical section of a gated operation.
    async fn gate(&self) -> ControllerResult<ReleaseToken> {
        let token = self.inner.lock.acquire(false).await?;
        if self.is_retired() {
            return Err(ControllerError::NotProvisioned);
        }
        Ok(token)
    }

    fn require_admin(&self, origin: &str) -> ControllerResult<()> {
        if self.is_admin(origin)? {
            Ok(())
        } else {
            warn!(address = %self.inner.address, origin, "origin has no admin grant");
            Err(ControllerError::unauthorized(format!(
                "origin {origin} has no admin grant"
            )))
        }
    }

    fn sign_struct<T: SolStruct>(&self, value: &T) -> ControllerResult<ControllerSignature> {
        let domain = authorization_domain(self.inner.settings.chain_id, &self.inner.address);
        let hash = value.eip712_signing_hash(&domain);
        let signature = self.inner.signer.sign_hash_sync(&hash)?;
        Ok(ControllerSignature::owner(self.inner.version, signature))
    }

    fn to_record(&self, state: &MutableState) -> ControllerResult<ControllerRecord> {
        Ok(ControllerRecord {
            address: self.inner.address,
            credential_id: self.inner.credential_id.clone(),
            username: self.inner.username.clone(),
            version: self.inner.version,
            device_key: signer_to_pem(&self.inner.signer)?,
            owners: state.owners.clone(),
            sessions: state.sessions.clone(),
            deployment: state.deployment.clone(),
            created_at: self.inner.created_at,
        })
    }

    fn persist(&self, state: &MutableState) -> ControllerResult<()> {
        let record = self.to_record(state)?;
        record::persist_record(self.inner.store.as_ref(), &self.inner.origin, &record)
    }

    /// Persist `next`, then make it the in-memory state. Callers hold the
    /// signing lock.
    async fn commit(&self, next: MutableState) -> ControllerResult<()> {
        self.persist(&next)?;
        *self.inner.state.write().await = next;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::blockchain::provider::mock::MockProvider;
    use crate::blockchain::signing::generate_device_signer;
    use crate::blockchain::ProviderError;
    use crate::storage::{MemoryStore, SchemaVersion};
    use alloy::primitives::{address, Bytes, U256};
    use std::sync::Mutex as StdMutex;

    pub(crate) const ORIGIN: &str = "https://app.example";

    pub(crate) fn typed_data() -> TypedData {
        serde_json::from_value(signature::tests::mail_typed_data()).unwrap()
    }

    pub(crate) fn setup() -> (Controller, Arc<MemoryStore>) {
        setup_with(MockProvider::with_nonce(7), ControllerSettings::default())
    }

    pub(crate) fn setup_with(
        provider: MockProvider,
        settings: ControllerSettings,
    ) -> (Controller, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let request = ProvisionRequest {
            address: "0xABC".to_string(),
            credential_id: "cred-1".to_string(),
            username: None,
        };
        let (controller, _) =
            provision(ORIGIN, request, store.clone(), Arc::new(provider), settings).unwrap();
        (controller, store)
    }

    fn reload(controller: &Controller, store: &Arc<MemoryStore>) -> Controller {
        Controller::from_store(
            controller.origin(),
            store.clone(),
            Arc::new(MockProvider::default()),
            ControllerSettings::default(),
        )
        .unwrap()
    }

    fn session_request(key: Address) -> RegisterSessionRequest {
        RegisterSessionRequest {
            session_key: key,
            policies: vec![Policy::new(
                address!("0x1111111111111111111111111111111111111111"),
                "transfer(address,uint256)",
            )],
            expires_at: None,
        }
    }

    #[tokio::test]
    async fn username_falls_back_to_credential_id() {
        let (controller, _) = setup();
        assert_eq!(controller.username(), "cred-1");
        assert_eq!(
            controller.address().to_string(),
            "0x0000000000000000000000000000000000000000000000000000000000000abc"
        );
        assert_eq!(controller.version(), ControllerVersion::LATEST);
    }

    #[tokio::test]
    async fn store_round_trip_preserves_state() {
        let (controller, store) = setup();
        let session_key = generate_device_signer().address();
        controller
            .register_session(session_request(session_key))
            .await
            .unwrap();
        controller.store().await.unwrap();

        let restored = reload(&controller, &store);
        assert_eq!(restored.address(), controller.address());
        assert_eq!(restored.credential_id(), controller.credential_id());
        assert_eq!(restored.device_address(), controller.device_address());
        assert_eq!(restored.sessions().await, controller.sessions().await);
    }

    #[tokio::test]
    async fn sign_then_verify() {
        let (controller, _) = setup();
        let typed = typed_data();
        let hash = controller.hash_message(&typed).unwrap();
        let signature = controller.sign_message(&typed).await.unwrap();

        assert_eq!(*signature.class_hash(), ControllerVersion::V2.class_hash());
        assert!(controller.verify_message_hash(&hash, &signature).await.unwrap());
    }

    #[tokio::test]
    async fn single_bit_mutations_invalidate() {
        let (controller, _) = setup();
        let typed = typed_data();
        let hash = controller.hash_message(&typed).unwrap();
        let signature = controller.sign_message(&typed).await.unwrap();

        let mut bad_hash = hash;
        bad_hash.0[31] ^= 1;
        assert!(!controller.verify_message_hash(&bad_hash, &signature).await.unwrap());

        let mut words = signature.to_words();
        words[1].0[31] ^= 1;
        let bad_r = ControllerSignature::from_words(&words).unwrap();
        assert!(!controller.verify_message_hash(&hash, &bad_r).await.unwrap());

        let mut words = signature.to_words();
        words[0].0[31] ^= 1;
        let bad_class = ControllerSignature::from_words(&words).unwrap();
        assert!(!controller.verify_message_hash(&hash, &bad_class).await.unwrap());
    }

    #[tokio::test]
    async fn foreign_key_does_not_verify() {
        let (controller, _) = setup();
        let hash = controller.hash_message(&typed_data()).unwrap();
        let foreign = generate_device_signer().sign_hash_sync(&hash).unwrap();
        let signature = ControllerSignature::owner(controller.version(), foreign);
        assert!(!controller.verify_message_hash(&hash, &signature).await.unwrap());
    }

    #[tokio::test]
    async fn session_signatures_need_registered_key() {
        let (controller, _) = setup();
        let session_signer = generate_device_signer();
        let hash = B256::repeat_byte(0x33);
        let raw = session_signer.sign_hash_sync(&hash).unwrap();
        let signature =
            ControllerSignature::session(controller.version(), session_signer.address(), raw);

        assert!(!controller.verify_message_hash(&hash, &signature).await.unwrap());

        let (session, _) = controller
            .register_session(session_request(session_signer.address()))
            .await
            .unwrap();
        assert!(controller.verify_message_hash(&hash, &signature).await.unwrap());

        controller.revoke_session(session.id).await.unwrap();
        assert!(!controller.verify_message_hash(&hash, &signature).await.unwrap());
    }

    #[tokio::test]
    async fn session_authorization_is_device_signed() {
        let (controller, _) = setup();
        let (session, authorization) = controller
            .register_session(session_request(address!(
                "0x2222222222222222222222222222222222222222"
            )))
            .await
            .unwrap();

        let domain = authorization_domain(DEFAULT_CHAIN_ID, controller.address());
        let hash = session.grant().eip712_signing_hash(&domain);
        assert!(recovers_to(authorization.inner(), &hash, controller.device_address()));
        assert_eq!(
            session.expires_at - session.issued_at,
            DEFAULT_SESSION_DURATION
        );
    }

    #[tokio::test]
    async fn session_for_matches_policies() {
        let (controller, _) = setup();
        let token = address!("0x1111111111111111111111111111111111111111");
        controller
            .register_session(session_request(generate_device_signer().address()))
            .await
            .unwrap();

        let transfer = Call {
            to: token,
            data: Bytes::from(vec![0xa9, 0x05, 0x9c, 0xbb]),
            value: U256::ZERO,
        };
        let approve = Call {
            to: token,
            data: Bytes::from(vec![0x09, 0x5e, 0xa7, 0xb3]),
            value: U256::ZERO,
        };
        assert!(controller.session_for(&[transfer]).await.is_some());
        assert!(controller.session_for(&[approve]).await.is_none());
    }

    #[tokio::test]
    async fn revoke_unknown_session_is_malformed() {
        let (controller, _) = setup();
        let err = controller.revoke_session(Uuid::new_v4()).await.unwrap_err();
        assert_eq!(err.error_code(), "malformed_input");
    }

    #[tokio::test]
    async fn add_owner_persists_and_verifies() {
        let (controller, store) = setup();
        let owner_signer = generate_device_signer();
        let credential = CredentialDescriptor {
            id: "passkey-2".to_string(),
            kind: CredentialKind::Webauthn,
            public_key: None,
        };
        let (owner, authorization) = controller
            .add_owner(owner_signer.address(), credential.clone())
            .await
            .unwrap();
        assert_eq!(owner.signer, owner_signer.address());
        assert!(!authorization.is_session());

        // Duplicate is rejected
        let err = controller
            .add_owner(owner_signer.address(), credential)
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "malformed_input");

        // Persisted before returning
        let restored = reload(&controller, &store);
        assert_eq!(restored.owners().await.len(), 1);

        // Owner signatures now verify
        let hash = B256::repeat_byte(0x44);
        let raw = owner_signer.sign_hash_sync(&hash).unwrap();
        let signature = ControllerSignature::owner(controller.version(), raw);
        assert!(controller.verify_message_hash(&hash, &signature).await.unwrap());
    }

    #[tokio::test]
    async fn deploy_records_deployment_once() {
        let (controller, store) = setup();
        let request = DeployRequest {
            bytecode: Bytes::from(vec![0x60, 0x80]),
            value: U256::ZERO,
            gas_limit: None,
        };
        let deployment = controller.deploy_contract(request.clone()).await.unwrap();
        assert_eq!(deployment.transaction_hash, B256::with_last_byte(1));

        let restored = reload(&controller, &store);
        assert_eq!(restored.deployment().await, Some(deployment));

        let err = controller.deploy_contract(request).await.unwrap_err();
        assert_eq!(err.error_code(), "malformed_input");
    }

    #[tokio::test]
    async fn failed_deploy_leaves_state_untouched() {
        let (controller, store) = setup_with(
            MockProvider::failing(ProviderError::TransactionFailed("reverted".into())),
            ControllerSettings::default(),
        );
        let before = store.snapshot();
        let err = controller
            .deploy_contract(DeployRequest {
                bytecode: Bytes::from(vec![0x60]),
                value: U256::ZERO,
                gas_limit: None,
            })
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "external");
        assert_eq!(controller.deployment().await, None);
        assert_eq!(store.snapshot(), before);
    }

    #[tokio::test]
    async fn nonce_comes_from_provider() {
        let (controller, _) = setup();
        assert_eq!(controller.get_nonce().await.unwrap(), 7);

        // Not blocked by a held signing lock
        let _held = controller.quiesce().await.unwrap();
        let nonce = tokio::time::timeout(Duration::from_millis(50), controller.get_nonce())
            .await
            .expect("nonce must bypass the lock")
            .unwrap();
        assert_eq!(nonce, 7);
    }

    #[tokio::test]
    async fn estimate_fee_requires_calls() {
        let (controller, _) = setup();
        let err = controller
            .estimate_fee(&[], &FeeDetails::default())
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "malformed_input");

        let call = Call {
            to: Address::ZERO,
            data: Bytes::new(),
            value: U256::ZERO,
        };
        let fee = controller
            .estimate_fee(&[call.clone(), call], &FeeDetails::default())
            .await
            .unwrap();
        assert_eq!(fee.gas_limit, 42_000);
    }

    #[tokio::test]
    async fn logout_requires_admin_grant() {
        let (controller, store) = setup();
        let admin_key = SchemaVersion::CURRENT
            .selectors()
            .admin(&controller.address().to_string(), ORIGIN);
        store.remove(&admin_key).unwrap();
        let before = store.snapshot();

        let err = controller.logout(ORIGIN).await.unwrap_err();
        assert_eq!(err.error_code(), "unauthorized");
        assert_eq!(store.snapshot(), before);
    }

    #[tokio::test]
    async fn logout_removes_binding() {
        let (controller, store) = setup();
        assert!(controller.is_admin(ORIGIN).unwrap());
        controller.logout(ORIGIN).await.unwrap();

        assert!(controller.is_retired());
        assert_eq!(store.keys().unwrap(), vec!["version".to_string()]);
        assert!(matches!(
            Controller::from_store(
                ORIGIN,
                store.clone(),
                Arc::new(MockProvider::default()),
                ControllerSettings::default()
            ),
            Err(ControllerError::NotProvisioned)
        ));
    }

    #[tokio::test]
    async fn logout_leaves_other_origins_alone() {
        let (controller, store) = setup();
        let request = ProvisionRequest {
            address: "0xbbb".to_string(),
            credential_id: "cred-b".to_string(),
            username: None,
        };
        let (other, _) = provision(
            "https://b.example",
            request,
            store.clone(),
            Arc::new(MockProvider::default()),
            ControllerSettings::default(),
        )
        .unwrap();

        controller.logout(ORIGIN).await.unwrap();

        let restored = reload(&other, &store);
        assert_eq!(restored.credential_id(), "cred-b");
        assert!(other.is_admin("https://b.example").unwrap());
        assert!(!other.is_retired());
    }

    #[tokio::test]
    async fn queued_writes_after_logout_fail() {
        let (controller, store) = setup();
        let held = controller.quiesce().await.unwrap();

        let logout = tokio::spawn({
            let controller = controller.clone();
            async move { controller.logout(ORIGIN).await }
        });
        while controller.inner.lock.queue_len() < 1 {
            tokio::task::yield_now().await;
        }
        let register = tokio::spawn({
            let controller = controller.clone();
            let key = generate_device_signer().address();
            async move { controller.register_session(session_request(key)).await }
        });
        while controller.inner.lock.queue_len() < 2 {
            tokio::task::yield_now().await;
        }

        drop(held);
        logout.await.unwrap().unwrap();
        let err = register.await.unwrap().unwrap_err();
        assert!(matches!(err, ControllerError::NotProvisioned));
        assert_eq!(store.keys().unwrap(), vec!["version".to_string()]);
    }

    #[tokio::test]
    async fn granted_origin_can_log_out() {
        let (controller, store) = setup();
        let partner = "https://partner.example";

        let err = controller.logout(partner).await.unwrap_err();
        assert_eq!(err.error_code(), "unauthorized");

        controller.grant_admin(partner).await.unwrap();
        controller.logout(partner).await.unwrap();
        assert!(!record::record_exists(store.as_ref(), ORIGIN).unwrap());
        assert!(!controller.is_admin(partner).unwrap());
    }

    #[tokio::test]
    async fn grant_admin_requires_admin() {
        let (controller, store) = setup();
        controller.grant_admin("https://partner.example").await.unwrap();
        assert!(controller.is_admin("https://partner.example").unwrap());

        let admin_key = SchemaVersion::CURRENT
            .selectors()
            .admin(&controller.address().to_string(), ORIGIN);
        store.remove(&admin_key).unwrap();
        let err = controller.grant_admin("https://evil.example").await.unwrap_err();
        assert_eq!(err.error_code(), "unauthorized");
        assert!(!controller.is_admin("https://evil.example").unwrap());
    }

    #[tokio::test]
    async fn overlapping_signs_complete_in_call_order() {
        let (controller, _) = setup();
        let order = Arc::new(StdMutex::new(Vec::new()));
        let held = controller.quiesce().await.unwrap();

        let mut handles = Vec::new();
        for i in 0..5 {
            let signer = controller.clone();
            let order = order.clone();
            handles.push(tokio::spawn(async move {
                signer.sign_message(&typed_data()).await.unwrap();
                order.lock().unwrap().push(i);
            }));
            while controller.inner.lock.queue_len() < i + 1 {
                tokio::task::yield_now().await;
            }
        }

        drop(held);
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn lock_timeout_surfaces_as_error() {
        let settings = ControllerSettings {
            lock_timeout: Some(Duration::from_millis(10)),
            ..ControllerSettings::default()
        };
        let (controller, _) = setup_with(MockProvider::default(), settings);
        let _held = controller.quiesce().await.unwrap();

        let err = controller.sign_message(&typed_data()).await.unwrap_err();
        assert_eq!(err.error_code(), "lock_timeout");
    }

    #[test]
    fn debug_output_has_no_key_material() {
        let (controller, _) = setup();
        let debug = format!("{controller:?}");
        assert!(debug.contains("cred-1"));
        assert!(!debug.contains("PRIVATE"));
        assert!(!debug.contains("signer"));
    }
}
