use crate::authorization::AcmeAuthorization;
use crate::config::E2eiConfig;
use crate::crypto::IdentityCryptoProvider;
use crate::error::*;
use crate::helpers::*;
use crate::order::*;
use crate::transport::AcmeTransport;
use serde::Deserialize;
use serde::Serialize;
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::error;
use tracing::field;
use tracing::info;
use tracing::instrument;
use tracing::warn;
use tracing::Level;
use tracing::Span;

/// Everything phase one hands over to phase two.
///
/// The user completes an OIDC login in between, which may take arbitrarily
/// long or outlive the process, so the checkpoint is a plain serializable
/// value. It is consumed by [`EnrollmentCoordinator::finalize_enrollment`].
#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentCheckpoint {
  /// The identity provider the user has to authenticate against.
  pub target: String,
  /// Correlation token of the OAuth flow, supplied by the caller.
  pub o_auth_state: String,
  pub authz: AcmeAuthorization,
  /// Claims to request from the identity provider.
  pub o_auth_claims: serde_json::Value,
  pub last_nonce: Nonce,
  pub order_location: String,
}

impl EnrollmentCheckpoint {
  pub fn to_json(&self) -> Result<String, Error> {
    serde_json::to_string(self)
      .map_err(|_| Error::Validation("the enrollment checkpoint cannot be serialized"))
  }

  pub fn from_json(raw: &str) -> Result<EnrollmentCheckpoint, Error> {
    serde_json::from_str(raw)
      .map_err(|_| Error::Validation("the enrollment checkpoint is malformed"))
  }
}

/// The `claims` request parameter asking the identity provider to bind the
/// id token to this ACME challenge.
pub(crate) fn o_auth_claims(key_auth: &str, acme_aud: &str) -> serde_json::Value {
  json!({
    "id_token": {
      "keyauth": { "essential": true, "value": key_auth },
      "acme_aud": { "essential": true, "value": acme_aud },
    }
  })
}

/// Drives the two enrollment phases over an [`AcmeTransport`] and the
/// crypto provider.
///
/// Steps run strictly in sequence and the first failure is returned as is.
/// Nothing is retried here: a consumed nonce cannot be replayed, so retrying
/// means running a whole phase again.
pub struct EnrollmentCoordinator {
  transport: Arc<dyn AcmeTransport>,
  crypto: Arc<dyn IdentityCryptoProvider>,
  step_timeout: Option<Duration>,
}

impl EnrollmentCoordinator {
  pub fn new(
    transport: Arc<dyn AcmeTransport>,
    crypto: Arc<dyn IdentityCryptoProvider>,
  ) -> Self {
    EnrollmentCoordinator {
      transport,
      crypto,
      step_timeout: None,
    }
  }

  pub fn from_config(
    transport: Arc<dyn AcmeTransport>,
    crypto: Arc<dyn IdentityCryptoProvider>,
    config: &E2eiConfig,
  ) -> Self {
    EnrollmentCoordinator::new(transport, crypto)
      .with_step_timeout(config.step_timeout())
  }

  pub fn with_step_timeout(mut self, step_timeout: Option<Duration>) -> Self {
    self.step_timeout = step_timeout;
    self
  }

  async fn step<T, F>(&self, name: &'static str, fut: F) -> Result<T, Error>
  where
    F: Future<Output = Result<T, Error>>,
  {
    let res = match self.step_timeout {
      Some(limit) => match tokio::time::timeout(limit, fut).await {
        Ok(res) => res,
        Err(_) => Err(Error::Timeout(name)),
      },
      None => fut.await,
    };
    if let Err(err) = &res {
      warn!(step = name, kind = ?err.kind(), error = %err, "E2EI enrollment step failed");
    }
    res
  }

  /// Phase one: set up the ACME account, order and authorization.
  ///
  /// Mutates no long-lived state and may be called again after any failure.
  #[instrument(level = Level::INFO, name = "e2ei::EnrollmentCoordinator::initial_enrollment", err, skip_all, fields(order_location = field::Empty))]
  pub async fn initial_enrollment(
    &self,
    o_auth_state: impl Into<String>,
  ) -> Result<EnrollmentCheckpoint, Error> {
    info!("Starting E2EI enrollment");

    self
      .step("fetch_trust_anchors", self.transport.fetch_trust_anchors())
      .await?;

    let directory = self
      .step("load_acme_directories", self.transport.load_acme_directories())
      .await?;

    let nonce = self
      .step(
        "get_acme_nonce",
        self.transport.get_acme_nonce(&directory.new_nonce),
      )
      .await?;

    let nonce = self
      .step(
        "create_new_account",
        self
          .transport
          .create_new_account(&directory.new_account, nonce),
      )
      .await?;

    let (order, nonce, order_location) = self
      .step(
        "create_new_order",
        self.transport.create_new_order(&directory.new_order, nonce),
      )
      .await?;
    Span::current().record("order_location", &field::display(&order_location));

    let authz_url = order
      .authorizations
      .first()
      .ok_or(Error::Validation("the order carries no authorization"))?;

    let (authz, nonce, _authz_location) = self
      .step("create_authz", self.transport.create_authz(authz_url, nonce))
      .await?;

    let o_auth_claims = o_auth_claims(
      authz.key_auth.as_deref().unwrap_or_default(),
      &authz.oidc_challenge.url,
    );

    Ok(EnrollmentCheckpoint {
      target: authz.oidc_challenge.target.clone(),
      o_auth_state: o_auth_state.into(),
      authz,
      o_auth_claims,
      last_nonce: nonce,
      order_location,
    })
  }

  /// Phase two: answer both challenges, finalize the order, rotate the
  /// device credential and fetch the signed certificate.
  ///
  /// Failures before key rotation leave nothing behind. From key rotation
  /// on, the ephemeral enrollment material is wiped whatever the outcome.
  #[instrument(level = Level::INFO, name = "e2ei::EnrollmentCoordinator::finalize_enrollment", err, skip_all, fields(order_location = %checkpoint.order_location, thumbprint = field::Empty))]
  pub async fn finalize_enrollment(
    &self,
    id_token: &str,
    refresh_token: &str,
    checkpoint: EnrollmentCheckpoint,
  ) -> Result<IssuedCertificate, Error> {
    let EnrollmentCheckpoint {
      authz,
      last_nonce,
      order_location,
      ..
    } = checkpoint;

    let wire_nonce = self
      .step("get_wire_nonce", self.transport.get_wire_nonce())
      .await?;

    let dpop_token = self
      .step("get_dpop_token", self.transport.get_dpop_token(wire_nonce))
      .await?;

    let access_token = self
      .step(
        "get_wire_access_token",
        self.transport.get_wire_access_token(&dpop_token),
      )
      .await?;

    let dpop_response = self
      .step(
        "validate_dpop_challenge",
        self.transport.validate_dpop_challenge(
          &access_token,
          last_nonce,
          &authz.dpop_challenge,
        ),
      )
      .await?;

    let oidc_response = self
      .step(
        "validate_oidc_challenge",
        self.transport.validate_oidc_challenge(
          id_token,
          refresh_token,
          dpop_response.nonce,
          &authz.oidc_challenge,
        ),
      )
      .await?;

    let (order_response, finalize_url) = self
      .step(
        "check_order_request",
        self
          .transport
          .check_order_request(&order_location, oidc_response.nonce),
      )
      .await?;

    let (finalize_response, certificate_url) = self
      .step(
        "finalize",
        self.transport.finalize(&finalize_url, order_response.nonce),
      )
      .await?;

    let res = self
      .rotate_and_fetch_certificate(finalize_response, &certificate_url)
      .await;

    if let Err(err) = self.crypto.nuke_e2ei_client().await {
      error!(error = %err, "Failed to clean up E2EI enrollment material");
    }

    let certificate = res?;
    Span::current().record("thumbprint", &field::display(&certificate.thumbprint));
    info!("E2EI enrollment finalized");
    Ok(certificate)
  }

  async fn rotate_and_fetch_certificate(
    &self,
    finalize_response: AcmeResponse,
    certificate_url: &str,
  ) -> Result<IssuedCertificate, Error> {
    self
      .step(
        "rotate_keys_and_migrate_conversations",
        self
          .crypto
          .rotate_keys_and_migrate_conversations(&finalize_response),
      )
      .await?;

    let certificate = self
      .step(
        "certificate_request",
        self
          .transport
          .certificate_request(certificate_url, finalize_response.nonce),
      )
      .await?;

    IssuedCertificate::from_chain(&certificate.response)
  }
}
