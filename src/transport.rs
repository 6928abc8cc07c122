use crate::authorization::*;
use crate::directory::AcmeDirectory;
use crate::error::*;
use crate::helpers::*;
use crate::order::*;
use async_trait::async_trait;
use serde::Deserialize;

/// A DPoP proof signed by the device key over the backend nonce.
///
/// Lives for a single enrollment attempt and is never persisted.
pub struct DpopToken(String);

impl DpopToken {
  pub fn new(value: impl Into<String>) -> Self {
    DpopToken(value.into())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl std::fmt::Debug for DpopToken {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str("DpopToken(..)")
  }
}

/// The access token the backend hands out in exchange for a [`DpopToken`].
#[derive(Deserialize)]
pub struct WireAccessToken {
  pub token: String,
  #[serde(rename = "type")]
  pub token_type: String,
  pub expires_in: u64,
}

impl std::fmt::Debug for WireAccessToken {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("WireAccessToken")
      .field("token_type", &self.token_type)
      .field("expires_in", &self.expires_in)
      .finish_non_exhaustive()
  }
}

/// The ACME, OIDC and backend calls an enrollment is made of.
///
/// Every call that talks to the ACME server takes the current [`Nonce`] by
/// value and returns the fresh one, so the nonce chain is threaded through
/// the caller and can never be reused.
#[async_trait]
pub trait AcmeTransport: Send + Sync {
  /// Load the CA roots into the crypto store.
  async fn fetch_trust_anchors(&self) -> Result<(), Error>;

  async fn load_acme_directories(&self) -> Result<AcmeDirectory, Error>;

  async fn get_acme_nonce(&self, url: &str) -> Result<Nonce, Error>;

  async fn create_new_account(
    &self,
    url: &str,
    nonce: Nonce,
  ) -> Result<Nonce, Error>;

  /// Returns the order, the fresh nonce and the order location.
  async fn create_new_order(
    &self,
    url: &str,
    nonce: Nonce,
  ) -> Result<(AcmeOrder, Nonce, String), Error>;

  /// Returns the authorization, the fresh nonce and the authorization
  /// location.
  async fn create_authz(
    &self,
    url: &str,
    nonce: Nonce,
  ) -> Result<(AcmeAuthorization, Nonce, String), Error>;

  /// A nonce issued by the backend, independent from the ACME nonce chain.
  async fn get_wire_nonce(&self) -> Result<Nonce, Error>;

  async fn get_dpop_token(&self, wire_nonce: Nonce) -> Result<DpopToken, Error>;

  async fn get_wire_access_token(
    &self,
    dpop_token: &DpopToken,
  ) -> Result<WireAccessToken, Error>;

  async fn validate_dpop_challenge(
    &self,
    access_token: &WireAccessToken,
    nonce: Nonce,
    challenge: &AcmeChallenge,
  ) -> Result<ChallengeResponse, Error>;

  async fn validate_oidc_challenge(
    &self,
    id_token: &str,
    refresh_token: &str,
    nonce: Nonce,
    challenge: &AcmeChallenge,
  ) -> Result<ChallengeResponse, Error>;

  /// Fails with [`Error::OrderNotReady`] when the order cannot be finalized
  /// yet. Returns the order response and the finalize URL.
  async fn check_order_request(
    &self,
    order_location: &str,
    nonce: Nonce,
  ) -> Result<(AcmeResponse, String), Error>;

  /// Submits the CSR. Returns the finalize response and the certificate URL.
  async fn finalize(
    &self,
    finalize_url: &str,
    nonce: Nonce,
  ) -> Result<(AcmeResponse, String), Error>;

  async fn certificate_request(
    &self,
    certificate_url: &str,
    nonce: Nonce,
  ) -> Result<AcmeResponse, Error>;

  /// Refresh the trust anchors of federated domains.
  async fn fetch_federation_certificates(&self) -> Result<(), Error>;
}
