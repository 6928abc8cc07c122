use crate::account::ClientId;
use crate::api::AcmeApi;
use crate::authorization::*;
use crate::config::E2eiConfig;
use crate::crypto::*;
use crate::directory::AcmeDirectory;
use crate::error::*;
use crate::helpers::*;
use crate::order::*;
use crate::transport::*;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;
use tracing::field;
use tracing::instrument;
use tracing::Level;
use tracing::Span;

/// [`AcmeTransport`] built from the crypto client's enrollment object (which
/// signs requests and parses responses) and an [`AcmeApi`] (which carries
/// them over HTTP).
pub struct E2eiRepository {
  enrollment: Arc<dyn EnrollmentClient>,
  api: Arc<dyn AcmeApi>,
  crypto: Arc<dyn IdentityCryptoProvider>,
  client_id: ClientId,
  dpop_token_expiry_secs: u32,
}

impl E2eiRepository {
  pub fn new(
    enrollment: Arc<dyn EnrollmentClient>,
    api: Arc<dyn AcmeApi>,
    crypto: Arc<dyn IdentityCryptoProvider>,
    config: &E2eiConfig,
  ) -> Self {
    E2eiRepository {
      enrollment,
      api,
      crypto,
      client_id: config.client_id.clone(),
      dpop_token_expiry_secs: config.dpop_token_expiry_secs,
    }
  }
}

#[async_trait]
impl AcmeTransport for E2eiRepository {
  #[instrument(level = Level::DEBUG, name = "e2ei::E2eiRepository::fetch_trust_anchors", err, skip(self))]
  async fn fetch_trust_anchors(&self) -> Result<(), Error> {
    let pem = self.api.get_trust_anchors().await?;
    self.crypto.register_trust_anchors(&pem).await
  }

  async fn load_acme_directories(&self) -> Result<AcmeDirectory, Error> {
    let raw = self.api.get_directory().await?;
    self.enrollment.directory_response(&raw).await
  }

  async fn get_acme_nonce(&self, url: &str) -> Result<Nonce, Error> {
    self.api.get_nonce(url).await
  }

  async fn create_new_account(
    &self,
    url: &str,
    nonce: Nonce,
  ) -> Result<Nonce, Error> {
    let body = self.enrollment.new_account_request(nonce).await?;
    let res = self.api.send_acme_request(url, body).await?;
    self.enrollment.new_account_response(&res.response).await?;
    Ok(res.nonce)
  }

  #[instrument(level = Level::DEBUG, name = "e2ei::E2eiRepository::create_new_order", err, skip(self, nonce), fields(order = field::Empty))]
  async fn create_new_order(
    &self,
    url: &str,
    nonce: Nonce,
  ) -> Result<(AcmeOrder, Nonce, String), Error> {
    let body = self.enrollment.new_order_request(nonce).await?;
    let res = self.api.send_acme_request(url, body).await?;
    let order = self.enrollment.new_order_response(&res.response).await?;
    Span::current().record("order", &field::display(&res.location));
    Ok((order, res.nonce, res.location))
  }

  async fn create_authz(
    &self,
    url: &str,
    nonce: Nonce,
  ) -> Result<(AcmeAuthorization, Nonce, String), Error> {
    let body = self.enrollment.new_authz_request(url, nonce).await?;
    let res = self.api.send_acme_request(url, body).await?;
    let authz = self.enrollment.new_authz_response(&res.response).await?;
    Ok((authz, res.nonce, res.location))
  }

  async fn get_wire_nonce(&self) -> Result<Nonce, Error> {
    self.api.get_wire_nonce(&self.client_id).await
  }

  async fn get_dpop_token(&self, wire_nonce: Nonce) -> Result<DpopToken, Error> {
    let token = self
      .enrollment
      .create_dpop_token(self.dpop_token_expiry_secs, wire_nonce)
      .await?;
    Ok(DpopToken::new(token))
  }

  async fn get_wire_access_token(
    &self,
    dpop_token: &DpopToken,
  ) -> Result<WireAccessToken, Error> {
    self
      .api
      .get_access_token(&self.client_id, dpop_token.as_str())
      .await
  }

  #[instrument(level = Level::DEBUG, name = "e2ei::E2eiRepository::validate_dpop_challenge", err, skip_all, fields(url = %challenge.url))]
  async fn validate_dpop_challenge(
    &self,
    access_token: &WireAccessToken,
    nonce: Nonce,
    challenge: &AcmeChallenge,
  ) -> Result<ChallengeResponse, Error> {
    let body = self
      .enrollment
      .new_dpop_challenge_request(&access_token.token, nonce)
      .await?;
    let res = self.api.send_acme_request(&challenge.url, body).await?;
    let raw = res.response.clone();
    let response = ChallengeResponse::from_acme("dpop", res)?;
    self.enrollment.new_dpop_challenge_response(&raw).await?;
    Ok(response)
  }

  #[instrument(level = Level::DEBUG, name = "e2ei::E2eiRepository::validate_oidc_challenge", err, skip_all, fields(url = %challenge.url))]
  async fn validate_oidc_challenge(
    &self,
    id_token: &str,
    refresh_token: &str,
    nonce: Nonce,
    challenge: &AcmeChallenge,
  ) -> Result<ChallengeResponse, Error> {
    let body = self
      .enrollment
      .new_oidc_challenge_request(id_token, refresh_token, nonce)
      .await?;
    let res = self.api.send_acme_request(&challenge.url, body).await?;
    let raw = res.response.clone();
    let response = ChallengeResponse::from_acme("oidc", res)?;
    self.enrollment.new_oidc_challenge_response(&raw).await?;
    Ok(response)
  }

  async fn check_order_request(
    &self,
    order_location: &str,
    nonce: Nonce,
  ) -> Result<(AcmeResponse, String), Error> {
    let body = self
      .enrollment
      .check_order_request(order_location, nonce)
      .await?;
    let res = self.api.send_acme_request(order_location, body).await?;
    let status = res.ensure_order_ready()?;
    debug!(?status, "Order is ready to be finalized");
    let finalize_url = self.enrollment.check_order_response(&res.response).await?;
    Ok((res, finalize_url))
  }

  async fn finalize(
    &self,
    finalize_url: &str,
    nonce: Nonce,
  ) -> Result<(AcmeResponse, String), Error> {
    let body = self.enrollment.finalize_request(nonce).await?;
    let res = self.api.send_acme_request(finalize_url, body).await?;
    let certificate_url =
      self.enrollment.finalize_response(&res.response).await?;
    Ok((res, certificate_url))
  }

  async fn certificate_request(
    &self,
    certificate_url: &str,
    nonce: Nonce,
  ) -> Result<AcmeResponse, Error> {
    let body = self.enrollment.certificate_request(nonce).await?;
    self.api.send_acme_request(certificate_url, body).await
  }

  #[instrument(level = Level::DEBUG, name = "e2ei::E2eiRepository::fetch_federation_certificates", err, skip(self))]
  async fn fetch_federation_certificates(&self) -> Result<(), Error> {
    let certificates = self.api.get_federation_certificates().await?;
    self.crypto.register_intermediate_cas(&certificates).await
  }
}
