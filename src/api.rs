use crate::account::ClientId;
use crate::config::E2eiConfig;
use crate::error::*;
use crate::helpers::*;
use crate::order::AcmeResponse;
use crate::transport::WireAccessToken;
use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use tracing::debug;
use tracing::instrument;
use tracing::Level;

const JOSE_JSON: &str = "application/jose+json";

/// Raw HTTP access to the ACME server and the backend. Bodies of ACME
/// requests are built and signed elsewhere; this layer only moves bytes and
/// picks nonces and locations out of the response headers.
#[async_trait]
pub trait AcmeApi: Send + Sync {
  async fn get_directory(&self) -> Result<Vec<u8>, Error>;

  async fn get_nonce(&self, url: &str) -> Result<Nonce, Error>;

  async fn send_acme_request(
    &self,
    url: &str,
    body: Vec<u8>,
  ) -> Result<AcmeResponse, Error>;

  /// PEM bundle of the ACME CA roots.
  async fn get_trust_anchors(&self) -> Result<String, Error>;

  /// PEM certificates of the federated domains' intermediates.
  async fn get_federation_certificates(&self) -> Result<Vec<String>, Error>;

  async fn get_wire_nonce(&self, client_id: &ClientId) -> Result<Nonce, Error>;

  async fn get_access_token(
    &self,
    client_id: &ClientId,
    dpop_token: &str,
  ) -> Result<WireAccessToken, Error>;

  /// DER encoded CRL served at `url`.
  async fn get_crl(&self, url: &str) -> Result<Vec<u8>, Error>;
}

#[derive(Deserialize)]
struct FederationResponse {
  crts: Vec<String>,
}

/// [`AcmeApi`] over a `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpAcmeApi {
  http_client: reqwest::Client,
  discovery_url: Url,
  backend_url: Url,
}

pub struct HttpAcmeApiBuilder {
  discovery_url: String,
  backend_url: String,
  http_client: Option<reqwest::Client>,
}

impl HttpAcmeApiBuilder {
  pub fn new(discovery_url: String, backend_url: String) -> Self {
    HttpAcmeApiBuilder {
      discovery_url,
      backend_url,
      http_client: None,
    }
  }

  pub fn from_config(config: &E2eiConfig) -> Self {
    HttpAcmeApiBuilder::new(
      config.acme_discovery_url.clone(),
      config.backend_url.clone(),
    )
  }

  pub fn http_client(&mut self, http_client: reqwest::Client) -> &mut Self {
    self.http_client = Some(http_client);
    self
  }

  pub fn build(&mut self) -> Result<HttpAcmeApi, Error> {
    let http_client = self
      .http_client
      .clone()
      .unwrap_or_else(reqwest::Client::new);

    let discovery_url = Url::parse(&self.discovery_url)
      .map_err(|_| Error::Validation("the ACME discovery URL is invalid"))?;
    let backend_url = Url::parse(&self.backend_url)
      .map_err(|_| Error::Validation("the backend URL is invalid"))?;

    Ok(HttpAcmeApi {
      http_client,
      discovery_url,
      backend_url,
    })
  }
}

impl HttpAcmeApi {
  fn acme_url(&self, path: &str) -> Result<Url, Error> {
    self
      .discovery_url
      .join(path)
      .map_err(|_| Error::Validation("cannot build ACME server URL"))
  }

  fn client_url(&self, client_id: &ClientId, leaf: &str) -> Result<Url, Error> {
    let mut url = self.backend_url.clone();
    url
      .path_segments_mut()
      .map_err(|_| Error::Validation("the backend URL cannot be a base"))?
      .pop_if_empty()
      .extend(["clients", client_id.as_str(), leaf]);
    Ok(url)
  }

  async fn read_server_error(resp: reqwest::Response) -> Error {
    let status = resp.status().as_u16();
    match resp.json::<ServerError>().await {
      Ok(mut err) => {
        err.status.get_or_insert(status);
        err.into()
      }
      Err(_) => ServerError {
        r#type: None,
        title: None,
        status: Some(status),
        detail: None,
      }
      .into(),
    }
  }
}

#[async_trait]
impl AcmeApi for HttpAcmeApi {
  #[instrument(level = Level::DEBUG, name = "e2ei::HttpAcmeApi::get_directory", err, skip(self), fields(url = %self.discovery_url))]
  async fn get_directory(&self) -> Result<Vec<u8>, Error> {
    let resp = self
      .http_client
      .get(self.discovery_url.clone())
      .send()
      .await?;
    if !resp.status().is_success() {
      return Err(Self::read_server_error(resp).await);
    }
    Ok(resp.bytes().await?.to_vec())
  }

  #[instrument(level = Level::DEBUG, name = "e2ei::HttpAcmeApi::get_nonce", err, skip(self))]
  async fn get_nonce(&self, url: &str) -> Result<Nonce, Error> {
    let resp = self.http_client.head(url).send().await?;
    if !resp.status().is_success() {
      return Err(Self::read_server_error(resp).await);
    }
    require_nonce(resp.headers())
  }

  #[instrument(level = Level::DEBUG, name = "e2ei::HttpAcmeApi::send_acme_request", err, skip(self, body), fields(status = tracing::field::Empty))]
  async fn send_acme_request(
    &self,
    url: &str,
    body: Vec<u8>,
  ) -> Result<AcmeResponse, Error> {
    let resp = self
      .http_client
      .post(url)
      .header(reqwest::header::CONTENT_TYPE, JOSE_JSON)
      .body(body)
      .send()
      .await?;
    tracing::Span::current().record("status", resp.status().as_u16());

    if !resp.status().is_success() {
      return Err(Self::read_server_error(resp).await);
    }

    let nonce = require_nonce(resp.headers())?;
    let location =
      extract_location(resp.headers())?.unwrap_or_else(|| url.to_string());
    let response = resp.bytes().await?.to_vec();

    Ok(AcmeResponse {
      nonce,
      location,
      response,
    })
  }

  async fn get_trust_anchors(&self) -> Result<String, Error> {
    let url = self.acme_url("/roots.pem")?;
    let resp = self.http_client.get(url).send().await?;
    if !resp.status().is_success() {
      return Err(Self::read_server_error(resp).await);
    }
    Ok(resp.text().await?)
  }

  async fn get_federation_certificates(&self) -> Result<Vec<String>, Error> {
    let url = self.acme_url("/federation")?;
    let resp = self.http_client.get(url).send().await?;
    if !resp.status().is_success() {
      return Err(Self::read_server_error(resp).await);
    }
    let federation: FederationResponse = resp.json().await?;
    debug!(count = federation.crts.len(), "Fetched federation certificates");
    Ok(federation.crts)
  }

  async fn get_wire_nonce(&self, client_id: &ClientId) -> Result<Nonce, Error> {
    let url = self.client_url(client_id, "nonce")?;
    let resp = self.http_client.head(url).send().await?;
    if !resp.status().is_success() {
      return Err(Self::read_server_error(resp).await);
    }
    require_nonce(resp.headers())
  }

  async fn get_access_token(
    &self,
    client_id: &ClientId,
    dpop_token: &str,
  ) -> Result<WireAccessToken, Error> {
    let url = self.client_url(client_id, "access-token")?;
    let resp = self
      .http_client
      .post(url)
      .header("DPoP", dpop_token)
      .send()
      .await?;
    if !resp.status().is_success() {
      return Err(Self::read_server_error(resp).await);
    }
    Ok(resp.json().await?)
  }

  #[instrument(level = Level::DEBUG, name = "e2ei::HttpAcmeApi::get_crl", err, skip(self))]
  async fn get_crl(&self, url: &str) -> Result<Vec<u8>, Error> {
    let resp = self.http_client.get(url).send().await?;
    if !resp.status().is_success() {
      return Err(Self::read_server_error(resp).await);
    }
    Ok(resp.bytes().await?.to_vec())
  }
}
