#![allow(dead_code)]

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use e2ei_lifecycle::*;
use openssl::asn1::Asn1Time;
use openssl::bn::BigNum;
use openssl::ec::EcGroup;
use openssl::ec::EcKey;
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::PKey;
use openssl::x509::X509Name;
use openssl::x509::X509;
use std::collections::HashMap;
use std::collections::HashSet;
use std::io;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

pub const ORDER_LOCATION: &str = "https://acme.wire.example/acme/wire/order/6SDQFoXfk1UT75qRfzurqxWCMEatapiL";
pub const AUTHZ_URL: &str = "https://acme.wire.example/acme/wire/authz/6SDQFoXfk1UT75qRfzurqxWCMEatapiL";
pub const FINALIZE_URL: &str = "https://acme.wire.example/acme/wire/order/6SDQFoXfk1UT75qRfzurqxWCMEatapiL/finalize";
pub const CERTIFICATE_URL: &str = "https://acme.wire.example/acme/wire/certificate/seBl";
pub const OIDC_TARGET: &str = "https://idp.wire.example/realms/wire";

/// Ordered record of every collaborator call, shared between fakes.
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
  pub fn push(&self, call: impl Into<String>) {
    self.0.lock().unwrap().push(call.into());
  }

  pub fn calls(&self) -> Vec<String> {
    self.0.lock().unwrap().clone()
  }

  pub fn count(&self, call: &str) -> usize {
    self.calls().iter().filter(|c| c.as_str() == call).count()
  }

  pub fn position(&self, call: &str) -> Option<usize> {
    self.calls().iter().position(|c| c.as_str() == call)
  }
}

pub fn config() -> E2eiConfig {
  E2eiConfig::new(
    "https://acme.wire.example/acme/wire/directory".to_string(),
    "https://backend.wire.example".to_string(),
    ClientId::new("alice@wire.example:cafe"),
  )
}

/// Wall clock that moves with tokio's clock, so paused-time tests see
/// persisted instants age.
pub struct TokioClock {
  wall: DateTime<Utc>,
  start: tokio::time::Instant,
}

impl TokioClock {
  pub fn new() -> Self {
    TokioClock {
      wall: Utc::now(),
      start: tokio::time::Instant::now(),
    }
  }
}

impl Clock for TokioClock {
  fn now(&self) -> DateTime<Utc> {
    self.wall + chrono::Duration::from_std(self.start.elapsed()).unwrap()
  }
}

pub fn injected() -> Error {
  transport_err("injected failure")
}

pub fn self_signed_pem(cn: &str) -> Vec<u8> {
  let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
  let key = PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap();

  let mut name = X509Name::builder().unwrap();
  name.append_entry_by_text("CN", cn).unwrap();
  let name = name.build();

  let mut builder = X509::builder().unwrap();
  builder.set_version(2).unwrap();
  let serial = BigNum::from_u32(42).unwrap().to_asn1_integer().unwrap();
  builder.set_serial_number(&serial).unwrap();
  builder.set_subject_name(&name).unwrap();
  builder.set_issuer_name(&name).unwrap();
  builder.set_pubkey(&key).unwrap();
  builder
    .set_not_before(&Asn1Time::days_from_now(0).unwrap())
    .unwrap();
  builder
    .set_not_after(&Asn1Time::days_from_now(90).unwrap())
    .unwrap();
  builder.sign(&key, MessageDigest::sha256()).unwrap();
  builder.build().to_pem().unwrap()
}

pub fn certificate_chain() -> Vec<u8> {
  let mut chain = self_signed_pem("alice device");
  chain.extend(self_signed_pem("wire intermediate"));
  chain
}

pub fn challenge(url: &str, target: &str) -> AcmeChallenge {
  AcmeChallenge {
    delegate: br#"{"type":"challenge"}"#.to_vec(),
    url: url.to_string(),
    target: target.to_string(),
  }
}

pub fn authorization() -> AcmeAuthorization {
  AcmeAuthorization {
    identifier: "wireapp://%40alice@wire.example".to_string(),
    key_auth: Some("SY74tJmAIIhdzRtJvpx389f6EKHbXuxQ.yzwlYCH0RjBoW3nyoEhAsKlhRbxY9mlVVHvfLMHNi4Y".to_string()),
    oidc_challenge: challenge(
      "https://acme.wire.example/acme/wire/challenge/oidc",
      OIDC_TARGET,
    ),
    dpop_challenge: challenge(
      "https://acme.wire.example/acme/wire/challenge/dpop",
      "https://backend.wire.example/clients/cafe/access-token",
    ),
  }
}

pub fn directory() -> AcmeDirectory {
  AcmeDirectory {
    new_nonce: "https://acme.wire.example/acme/wire/new-nonce".to_string(),
    new_account: "https://acme.wire.example/acme/wire/new-account".to_string(),
    new_order: "https://acme.wire.example/acme/wire/new-order".to_string(),
  }
}

pub fn access_token() -> WireAccessToken {
  WireAccessToken {
    token: "access".to_string(),
    token_type: "DPoP".to_string(),
    expires_in: 300,
  }
}

pub fn identity(
  client: &str,
  display_name: &str,
  handle: &str,
  raw_status: RawCertificateStatus,
) -> IdentityRecord {
  IdentityRecord {
    client_id: ClientId::new(client),
    handle: handle.to_string(),
    display_name: display_name.to_string(),
    domain: "wire.example".to_string(),
    certificate_pem: String::new(),
    raw_status,
    thumbprint: String::new(),
    serial_number: String::new(),
    not_before: 0,
    not_after: 0,
  }
}

/// Step-level transport that hands out numbered nonces and remembers every
/// nonce it was given.
pub struct FakeTransport {
  pub log: CallLog,
  pub fail_at: Option<&'static str>,
  pub order_not_ready: bool,
  pub authorizations: Vec<String>,
  pub delay: Option<(&'static str, Duration)>,
  pub certificate_chain: Vec<u8>,
  nonces: AtomicUsize,
  consumed: Mutex<Vec<String>>,
}

impl FakeTransport {
  pub fn new(log: CallLog) -> Self {
    FakeTransport {
      log,
      fail_at: None,
      order_not_ready: false,
      authorizations: vec![AUTHZ_URL.to_string()],
      delay: None,
      certificate_chain: certificate_chain(),
      nonces: AtomicUsize::new(0),
      consumed: Mutex::new(vec![]),
    }
  }

  pub fn failing_at(mut self, step: &'static str) -> Self {
    self.fail_at = Some(step);
    self
  }

  pub fn consumed(&self) -> Vec<String> {
    self.consumed.lock().unwrap().clone()
  }

  async fn enter(&self, step: &'static str) -> Result<(), Error> {
    self.log.push(step);
    if let Some((slow, delay)) = self.delay {
      if slow == step {
        tokio::time::sleep(delay).await;
      }
    }
    if self.fail_at == Some(step) {
      return Err(injected());
    }
    Ok(())
  }

  fn next_nonce(&self) -> Nonce {
    Nonce::new(format!("n{}", self.nonces.fetch_add(1, Ordering::SeqCst) + 1))
  }

  fn consume(&self, nonce: Nonce) {
    self.consumed.lock().unwrap().push(nonce.into_inner());
  }

  fn envelope(&self, location: &str, response: Vec<u8>) -> AcmeResponse {
    AcmeResponse {
      nonce: self.next_nonce(),
      location: location.to_string(),
      response,
    }
  }

  fn challenge_response(&self, challenge: &AcmeChallenge) -> ChallengeResponse {
    ChallengeResponse {
      typ: "wire-challenge-01".to_string(),
      url: challenge.url.clone(),
      status: ChallengeStatus::Valid,
      token: Some("token".to_string()),
      nonce: self.next_nonce(),
    }
  }
}

#[async_trait]
impl AcmeTransport for FakeTransport {
  async fn fetch_trust_anchors(&self) -> Result<(), Error> {
    self.enter("fetch_trust_anchors").await
  }

  async fn load_acme_directories(&self) -> Result<AcmeDirectory, Error> {
    self.enter("load_acme_directories").await?;
    Ok(directory())
  }

  async fn get_acme_nonce(&self, _url: &str) -> Result<Nonce, Error> {
    self.enter("get_acme_nonce").await?;
    Ok(self.next_nonce())
  }

  async fn create_new_account(
    &self,
    _url: &str,
    nonce: Nonce,
  ) -> Result<Nonce, Error> {
    self.consume(nonce);
    self.enter("create_new_account").await?;
    Ok(self.next_nonce())
  }

  async fn create_new_order(
    &self,
    _url: &str,
    nonce: Nonce,
  ) -> Result<(AcmeOrder, Nonce, String), Error> {
    self.consume(nonce);
    self.enter("create_new_order").await?;
    let order = AcmeOrder {
      delegate: b"{}".to_vec(),
      authorizations: self.authorizations.clone(),
    };
    Ok((order, self.next_nonce(), ORDER_LOCATION.to_string()))
  }

  async fn create_authz(
    &self,
    url: &str,
    nonce: Nonce,
  ) -> Result<(AcmeAuthorization, Nonce, String), Error> {
    self.consume(nonce);
    self.enter("create_authz").await?;
    Ok((authorization(), self.next_nonce(), url.to_string()))
  }

  async fn get_wire_nonce(&self) -> Result<Nonce, Error> {
    self.enter("get_wire_nonce").await?;
    Ok(Nonce::new("wire-1"))
  }

  async fn get_dpop_token(&self, wire_nonce: Nonce) -> Result<DpopToken, Error> {
    self.consume(wire_nonce);
    self.enter("get_dpop_token").await?;
    Ok(DpopToken::new("dpop"))
  }

  async fn get_wire_access_token(
    &self,
    dpop_token: &DpopToken,
  ) -> Result<WireAccessToken, Error> {
    assert_eq!(dpop_token.as_str(), "dpop");
    self.enter("get_wire_access_token").await?;
    Ok(access_token())
  }

  async fn validate_dpop_challenge(
    &self,
    access_token: &WireAccessToken,
    nonce: Nonce,
    challenge: &AcmeChallenge,
  ) -> Result<ChallengeResponse, Error> {
    assert_eq!(access_token.token, "access");
    self.consume(nonce);
    self.enter("validate_dpop_challenge").await?;
    Ok(self.challenge_response(challenge))
  }

  async fn validate_oidc_challenge(
    &self,
    id_token: &str,
    _refresh_token: &str,
    nonce: Nonce,
    challenge: &AcmeChallenge,
  ) -> Result<ChallengeResponse, Error> {
    assert_eq!(id_token, "id-token");
    self.consume(nonce);
    self.enter("validate_oidc_challenge").await?;
    Ok(self.challenge_response(challenge))
  }

  async fn check_order_request(
    &self,
    order_location: &str,
    nonce: Nonce,
  ) -> Result<(AcmeResponse, String), Error> {
    self.consume(nonce);
    self.enter("check_order_request").await?;
    if self.order_not_ready {
      return Err(Error::OrderNotReady);
    }
    let res = self.envelope(order_location, br#"{"status":"ready"}"#.to_vec());
    Ok((res, FINALIZE_URL.to_string()))
  }

  async fn finalize(
    &self,
    _finalize_url: &str,
    nonce: Nonce,
  ) -> Result<(AcmeResponse, String), Error> {
    self.consume(nonce);
    self.enter("finalize").await?;
    let res = self.envelope(ORDER_LOCATION, br#"{"status":"valid"}"#.to_vec());
    Ok((res, CERTIFICATE_URL.to_string()))
  }

  async fn certificate_request(
    &self,
    certificate_url: &str,
    nonce: Nonce,
  ) -> Result<AcmeResponse, Error> {
    self.consume(nonce);
    self.enter("certificate_request").await?;
    Ok(self.envelope(certificate_url, self.certificate_chain.clone()))
  }

  async fn fetch_federation_certificates(&self) -> Result<(), Error> {
    self.enter("fetch_federation_certificates").await
  }
}

/// Crypto provider serving canned identities and recording every mutation.
pub struct FakeCrypto {
  pub log: CallLog,
  pub fail_rotate: bool,
  pub identity_lookup_fails: bool,
  pub client_identities: HashMap<ClientId, IdentityRecord>,
  pub user_identities: HashMap<UserId, Vec<IdentityRecord>>,
  pub members: HashMap<ConversationId, HashMap<UserId, Vec<IdentityRecord>>>,
  pub crl_registration: CrlRegistration,
}

impl FakeCrypto {
  pub fn new(log: CallLog) -> Self {
    FakeCrypto {
      log,
      fail_rotate: false,
      identity_lookup_fails: false,
      client_identities: HashMap::new(),
      user_identities: HashMap::new(),
      members: HashMap::new(),
      crl_registration: CrlRegistration {
        dirty: false,
        expiration: None,
      },
    }
  }

  pub fn with_crl_expiration(mut self, expiration: u64) -> Self {
    self.crl_registration.expiration = Some(expiration);
    self
  }

  fn lookup(&self, call: &str) -> Result<(), Error> {
    self.log.push(call);
    if self.identity_lookup_fails {
      return Err(crypto_err(io::Error::new(io::ErrorKind::Other, "wrong epoch")));
    }
    Ok(())
  }
}

#[async_trait]
impl IdentityCryptoProvider for FakeCrypto {
  async fn register_trust_anchors(&self, pem: &str) -> Result<(), Error> {
    self.log.push(format!("register_trust_anchors:{}", pem));
    Ok(())
  }

  async fn register_intermediate_cas(
    &self,
    pems: &[String],
  ) -> Result<(), Error> {
    self.log.push(format!("register_intermediate_cas:{}", pems.len()));
    Ok(())
  }

  async fn register_crl(
    &self,
    url: &str,
    _der: &[u8],
  ) -> Result<CrlRegistration, Error> {
    self.log.push(format!("register_crl:{}", url));
    Ok(self.crl_registration)
  }

  async fn rotate_keys_and_migrate_conversations(
    &self,
    _finalize_response: &AcmeResponse,
  ) -> Result<(), Error> {
    self.log.push("rotate_keys_and_migrate_conversations");
    if self.fail_rotate {
      return Err(crypto_err(io::Error::new(io::ErrorKind::Other, "rotation failed")));
    }
    Ok(())
  }

  async fn nuke_e2ei_client(&self) -> Result<(), Error> {
    self.log.push("nuke_e2ei_client");
    Ok(())
  }

  async fn get_client_identity(
    &self,
    client_id: &ClientId,
  ) -> Result<Option<IdentityRecord>, Error> {
    self.lookup("get_client_identity")?;
    Ok(self.client_identities.get(client_id).cloned())
  }

  async fn get_user_identities(
    &self,
    user_id: &UserId,
  ) -> Result<Vec<IdentityRecord>, Error> {
    self.lookup("get_user_identities")?;
    Ok(self.user_identities.get(user_id).cloned().unwrap_or_default())
  }

  async fn get_members_identities(
    &self,
    conversation_id: &ConversationId,
  ) -> Result<HashMap<UserId, Vec<IdentityRecord>>, Error> {
    self.lookup("get_members_identities")?;
    Ok(self.members.get(conversation_id).cloned().unwrap_or_default())
  }
}

/// HTTP layer stand-in routing ACME posts by URL.
pub struct FakeApi {
  pub log: CallLog,
  pub routes: HashMap<String, (Vec<u8>, Option<String>)>,
  pub failing_crls: HashSet<String>,
  nonces: AtomicUsize,
}

impl FakeApi {
  pub fn new(log: CallLog) -> Self {
    FakeApi {
      log,
      routes: HashMap::new(),
      failing_crls: HashSet::new(),
      nonces: AtomicUsize::new(0),
    }
  }

  pub fn route(mut self, url: &str, body: &[u8], location: Option<&str>) -> Self {
    self
      .routes
      .insert(url.to_string(), (body.to_vec(), location.map(str::to_string)));
    self
  }

  pub fn failing_crl(mut self, url: &str) -> Self {
    self.failing_crls.insert(url.to_string());
    self
  }

  fn next_nonce(&self) -> Nonce {
    Nonce::new(format!("srv{}", self.nonces.fetch_add(1, Ordering::SeqCst) + 1))
  }
}

#[async_trait]
impl AcmeApi for FakeApi {
  async fn get_directory(&self) -> Result<Vec<u8>, Error> {
    self.log.push("get_directory");
    Ok(serde_json::to_vec(&directory()).unwrap())
  }

  async fn get_nonce(&self, _url: &str) -> Result<Nonce, Error> {
    self.log.push("get_nonce");
    Ok(self.next_nonce())
  }

  async fn send_acme_request(
    &self,
    url: &str,
    body: Vec<u8>,
  ) -> Result<AcmeResponse, Error> {
    self.log.push(format!(
      "post:{}:{}",
      url,
      String::from_utf8_lossy(&body)
    ));
    let (response, location) = self
      .routes
      .get(url)
      .cloned()
      .ok_or_else(|| transport_err("no route"))?;
    Ok(AcmeResponse {
      nonce: self.next_nonce(),
      location: location.unwrap_or_else(|| url.to_string()),
      response,
    })
  }

  async fn get_trust_anchors(&self) -> Result<String, Error> {
    self.log.push("get_trust_anchors");
    Ok("roots".to_string())
  }

  async fn get_federation_certificates(&self) -> Result<Vec<String>, Error> {
    self.log.push("get_federation_certificates");
    Ok(vec!["a".to_string(), "b".to_string()])
  }

  async fn get_wire_nonce(&self, client_id: &ClientId) -> Result<Nonce, Error> {
    self.log.push(format!("get_wire_nonce:{}", client_id));
    Ok(Nonce::new("wire-1"))
  }

  async fn get_access_token(
    &self,
    client_id: &ClientId,
    dpop_token: &str,
  ) -> Result<WireAccessToken, Error> {
    self
      .log
      .push(format!("get_access_token:{}:{}", client_id, dpop_token));
    Ok(access_token())
  }

  async fn get_crl(&self, url: &str) -> Result<Vec<u8>, Error> {
    self.log.push(format!("get_crl:{}", url));
    if self.failing_crls.contains(url) {
      return Err(injected());
    }
    Ok(b"crl".to_vec())
  }
}

/// Crypto-side enrollment that signs every request with the nonce it was
/// given, so the request bodies expose the nonce chain.
pub struct FakeEnrollmentClient {
  pub log: CallLog,
}

impl FakeEnrollmentClient {
  fn sign(&self, step: &str, nonce: Nonce) -> Vec<u8> {
    self.log.push(format!("sign:{}:{}", step, nonce.as_str()));
    format!("{}@{}", step, nonce.into_inner()).into_bytes()
  }
}

#[async_trait]
impl EnrollmentClient for FakeEnrollmentClient {
  async fn directory_response(
    &self,
    directory: &[u8],
  ) -> Result<AcmeDirectory, Error> {
    AcmeDirectory::parse(directory)
  }

  async fn new_account_request(&self, nonce: Nonce) -> Result<Vec<u8>, Error> {
    Ok(self.sign("account", nonce))
  }

  async fn new_account_response(&self, _account: &[u8]) -> Result<(), Error> {
    Ok(())
  }

  async fn new_order_request(&self, nonce: Nonce) -> Result<Vec<u8>, Error> {
    Ok(self.sign("order", nonce))
  }

  async fn new_order_response(&self, order: &[u8]) -> Result<AcmeOrder, Error> {
    Ok(AcmeOrder {
      delegate: order.to_vec(),
      authorizations: vec![AUTHZ_URL.to_string()],
    })
  }

  async fn new_authz_request(
    &self,
    _url: &str,
    nonce: Nonce,
  ) -> Result<Vec<u8>, Error> {
    Ok(self.sign("authz", nonce))
  }

  async fn new_authz_response(
    &self,
    _authz: &[u8],
  ) -> Result<AcmeAuthorization, Error> {
    Ok(authorization())
  }

  async fn create_dpop_token(
    &self,
    expiry_secs: u32,
    backend_nonce: Nonce,
  ) -> Result<String, Error> {
    self.log.push(format!(
      "create_dpop_token:{}:{}",
      expiry_secs,
      backend_nonce.as_str()
    ));
    Ok("dpop".to_string())
  }

  async fn new_dpop_challenge_request(
    &self,
    access_token: &str,
    nonce: Nonce,
  ) -> Result<Vec<u8>, Error> {
    assert_eq!(access_token, "access");
    Ok(self.sign("dpop", nonce))
  }

  async fn new_dpop_challenge_response(
    &self,
    _challenge: &[u8],
  ) -> Result<(), Error> {
    Ok(())
  }

  async fn new_oidc_challenge_request(
    &self,
    _id_token: &str,
    _refresh_token: &str,
    nonce: Nonce,
  ) -> Result<Vec<u8>, Error> {
    Ok(self.sign("oidc", nonce))
  }

  async fn new_oidc_challenge_response(
    &self,
    _challenge: &[u8],
  ) -> Result<(), Error> {
    Ok(())
  }

  async fn check_order_request(
    &self,
    _order_url: &str,
    nonce: Nonce,
  ) -> Result<Vec<u8>, Error> {
    Ok(self.sign("check", nonce))
  }

  async fn check_order_response(&self, _order: &[u8]) -> Result<String, Error> {
    Ok(FINALIZE_URL.to_string())
  }

  async fn finalize_request(&self, nonce: Nonce) -> Result<Vec<u8>, Error> {
    Ok(self.sign("finalize", nonce))
  }

  async fn finalize_response(&self, _finalize: &[u8]) -> Result<String, Error> {
    Ok(CERTIFICATE_URL.to_string())
  }

  async fn certificate_request(&self, nonce: Nonce) -> Result<Vec<u8>, Error> {
    Ok(self.sign("certificate", nonce))
  }
}

/// CRL store that records every upsert on top of [`MemoryCrlStore`].
pub struct RecordingCrlStore {
  pub inner: MemoryCrlStore,
  pub updates: Mutex<Vec<(String, u64)>>,
  pub fail_updates: bool,
}

impl RecordingCrlStore {
  pub fn new(entries: Vec<CrlEntry>) -> Self {
    RecordingCrlStore {
      inner: MemoryCrlStore::with_entries(entries),
      updates: Mutex::new(vec![]),
      fail_updates: false,
    }
  }

  pub fn updates(&self) -> Vec<(String, u64)> {
    self.updates.lock().unwrap().clone()
  }
}

#[async_trait]
impl CrlRepository for RecordingCrlStore {
  async fn crl_entries(&self) -> Result<Vec<CrlEntry>, Error> {
    self.inner.crl_entries().await
  }

  async fn add_or_update_crl(
    &self,
    url: &str,
    expiration: u64,
  ) -> Result<(), Error> {
    self
      .updates
      .lock()
      .unwrap()
      .push((url.to_string(), expiration));
    if self.fail_updates {
      return Err(storage_err(io::Error::new(io::ErrorKind::Other, "disk full")));
    }
    self.inner.add_or_update_crl(url, expiration).await
  }

  async fn last_check_instant(&self) -> Result<Option<DateTime<Utc>>, Error> {
    self.inner.last_check_instant().await
  }

  async fn set_last_check_instant(&self, at: DateTime<Utc>) -> Result<(), Error> {
    self.inner.set_last_check_instant(at).await
  }
}
