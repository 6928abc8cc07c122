use crate::account::*;
use crate::authorization::AcmeAuthorization;
use crate::directory::AcmeDirectory;
use crate::error::*;
use crate::helpers::*;
use crate::order::*;
use async_trait::async_trait;
use std::collections::HashMap;

/// Outcome of registering a CRL with the crypto provider.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct CrlRegistration {
  /// Whether the CRL changed the verification state of any local credential.
  pub dirty: bool,
  /// When the CRL must be fetched again, in seconds since the unix epoch.
  pub expiration: Option<u64>,
}

/// The crypto client owning keys, credentials, secure groups and the cached
/// identities derived from them.
#[async_trait]
pub trait IdentityCryptoProvider: Send + Sync {
  async fn register_trust_anchors(&self, pem: &str) -> Result<(), Error>;

  async fn register_intermediate_cas(
    &self,
    pems: &[String],
  ) -> Result<(), Error>;

  async fn register_crl(
    &self,
    url: &str,
    der: &[u8],
  ) -> Result<CrlRegistration, Error>;

  /// Generate and activate the new credential and re-key every active
  /// secure group. Either every group is migrated or none is.
  async fn rotate_keys_and_migrate_conversations(
    &self,
    finalize_response: &AcmeResponse,
  ) -> Result<(), Error>;

  /// Drop all ephemeral enrollment material.
  async fn nuke_e2ei_client(&self) -> Result<(), Error>;

  async fn get_client_identity(
    &self,
    client_id: &ClientId,
  ) -> Result<Option<IdentityRecord>, Error>;

  async fn get_user_identities(
    &self,
    user_id: &UserId,
  ) -> Result<Vec<IdentityRecord>, Error>;

  async fn get_members_identities(
    &self,
    conversation_id: &ConversationId,
  ) -> Result<HashMap<UserId, Vec<IdentityRecord>>, Error>;
}

/// The enrollment object of the crypto client: it signs every ACME request
/// body and parses every ACME response, keeping the order state between
/// calls. Request builders consume the nonce they sign.
#[async_trait]
pub trait EnrollmentClient: Send + Sync {
  async fn directory_response(
    &self,
    directory: &[u8],
  ) -> Result<AcmeDirectory, Error>;

  async fn new_account_request(&self, nonce: Nonce) -> Result<Vec<u8>, Error>;

  async fn new_account_response(&self, account: &[u8]) -> Result<(), Error>;

  async fn new_order_request(&self, nonce: Nonce) -> Result<Vec<u8>, Error>;

  async fn new_order_response(&self, order: &[u8]) -> Result<AcmeOrder, Error>;

  async fn new_authz_request(
    &self,
    url: &str,
    nonce: Nonce,
  ) -> Result<Vec<u8>, Error>;

  async fn new_authz_response(
    &self,
    authz: &[u8],
  ) -> Result<AcmeAuthorization, Error>;

  async fn create_dpop_token(
    &self,
    expiry_secs: u32,
    backend_nonce: Nonce,
  ) -> Result<String, Error>;

  async fn new_dpop_challenge_request(
    &self,
    access_token: &str,
    nonce: Nonce,
  ) -> Result<Vec<u8>, Error>;

  async fn new_dpop_challenge_response(
    &self,
    challenge: &[u8],
  ) -> Result<(), Error>;

  async fn new_oidc_challenge_request(
    &self,
    id_token: &str,
    refresh_token: &str,
    nonce: Nonce,
  ) -> Result<Vec<u8>, Error>;

  async fn new_oidc_challenge_response(
    &self,
    challenge: &[u8],
  ) -> Result<(), Error>;

  async fn check_order_request(
    &self,
    order_url: &str,
    nonce: Nonce,
  ) -> Result<Vec<u8>, Error>;

  /// Returns the finalize URL.
  async fn check_order_response(&self, order: &[u8]) -> Result<String, Error>;

  async fn finalize_request(&self, nonce: Nonce) -> Result<Vec<u8>, Error>;

  /// Returns the certificate URL.
  async fn finalize_response(&self, finalize: &[u8]) -> Result<String, Error>;

  async fn certificate_request(&self, nonce: Nonce) -> Result<Vec<u8>, Error>;
}
