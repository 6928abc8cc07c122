use crate::error::*;
use crate::helpers::*;
use crate::order::AcmeResponse;
use serde::Deserialize;
use serde::Serialize;

/// The status of a challenge. Possible values are "pending",
/// "processing", "valid", and "invalid".
#[derive(Serialize, Deserialize, Debug, Eq, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub enum ChallengeStatus {
  Pending,
  Processing,
  Valid,
  Invalid,
}

impl std::fmt::Display for ChallengeStatus {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let s = match self {
      ChallengeStatus::Pending => "pending",
      ChallengeStatus::Processing => "processing",
      ChallengeStatus::Valid => "valid",
      ChallengeStatus::Invalid => "invalid",
    };
    f.write_str(s)
  }
}

/// A challenge as handed out by the crypto provider after it parsed an
/// authorization.
#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AcmeChallenge {
  /// The raw challenge object, kept so the crypto provider can answer it.
  #[serde(with = "base64url")]
  pub delegate: Vec<u8>,
  /// The URL to which a response can be posted.
  pub url: String,
  /// For the OIDC challenge, the identity provider the user must log in to.
  /// For the DPoP challenge, the backend access token endpoint.
  pub target: String,
}

/// The authorization for the device identifier, carrying both the OIDC and
/// the DPoP challenge.
#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AcmeAuthorization {
  pub identifier: String,
  /// The key authorization the identity provider has to echo back in the
  /// id token.
  pub key_auth: Option<String>,
  pub oidc_challenge: AcmeChallenge,
  pub dpop_challenge: AcmeChallenge,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct ChallengeObject {
  #[serde(rename = "type")]
  typ: String,
  url: String,
  status: ChallengeStatus,
  token: Option<String>,
  error: Option<ServerError>,
}

/// The server's answer after it validated a challenge.
#[derive(Debug)]
pub struct ChallengeResponse {
  /// The type of challenge encoded in the object.
  pub typ: String,
  pub url: String,
  pub status: ChallengeStatus,
  /// A random value that uniquely identifies the challenge.
  pub token: Option<String>,
  /// The fresh nonce issued alongside the response.
  pub nonce: Nonce,
}

impl ChallengeResponse {
  /// Decode a challenge response envelope.
  ///
  /// An `invalid` challenge is reported as [`Error::ChallengeRejected`], an
  /// attached problem document takes precedence over the bare status.
  ///
  /// A `pending` or `processing` challenge is accepted: the server may
  /// validate asynchronously, and the order check that follows fails with
  /// [`Error::OrderNotReady`] until every challenge is `valid`.
  pub fn from_acme(
    challenge: &'static str,
    res: AcmeResponse,
  ) -> Result<ChallengeResponse, Error> {
    let object: ChallengeObject = serde_json::from_slice(&res.response)?;

    if object.status == ChallengeStatus::Invalid {
      if let Some(err) = object.error {
        return Err(err.into());
      }
      return Err(Error::ChallengeRejected {
        challenge,
        status: object.status.to_string(),
      });
    }

    Ok(ChallengeResponse {
      typ: object.typ,
      url: object.url,
      status: object.status,
      token: object.token,
      nonce: res.nonce,
    })
  }
}
