use crate::error::*;
use crate::helpers::*;
use data_encoding::HEXLOWER;
use openssl::hash::MessageDigest;
use openssl::x509::X509;
use serde::Deserialize;
use serde::Serialize;

/// The status of an order. Possible values are "pending", "ready",
/// "processing", "valid", and "invalid".
#[derive(Deserialize, Debug, Eq, PartialEq, Clone, Copy)]
#[serde(rename_all = "camelCase")]
pub enum OrderStatus {
  Pending,
  Ready,
  Processing,
  Valid,
  Invalid,
}

/// A freshly created order, as parsed by the crypto provider.
#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AcmeOrder {
  /// The raw order object, kept so the crypto provider can finalize it.
  #[serde(with = "base64url")]
  pub delegate: Vec<u8>,
  /// The authorizations the client needs to complete before the requested
  /// certificate can be issued.
  pub authorizations: Vec<String>,
}

/// Generic envelope around an authenticated ACME call.
#[derive(Debug)]
pub struct AcmeResponse {
  pub nonce: Nonce,
  pub location: String,
  pub response: Vec<u8>,
}

#[derive(Deserialize)]
struct OrderObject {
  status: OrderStatus,
  error: Option<ServerError>,
}

impl AcmeResponse {
  /// Check that the order object carried by this response can be finalized
  /// (or already has been).
  ///
  /// A pending or processing order yields [`Error::OrderNotReady`]; polling
  /// again is up to the caller.
  pub fn ensure_order_ready(&self) -> Result<OrderStatus, Error> {
    let object: OrderObject = serde_json::from_slice(&self.response)?;
    match object.status {
      OrderStatus::Ready | OrderStatus::Valid => Ok(object.status),
      OrderStatus::Pending | OrderStatus::Processing => {
        Err(Error::OrderNotReady)
      }
      OrderStatus::Invalid => match object.error {
        Some(err) => Err(err.into()),
        None => Err(Error::Validation("the order is invalid")),
      },
    }
  }
}

/// The certificate issued at the end of an enrollment.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct IssuedCertificate {
  /// PEM of the device (leaf) certificate only.
  pub pem: String,
  /// The full PEM chain as returned by the ACME server.
  pub chain_pem: String,
  /// Lower-case hex SHA-256 digest of the leaf DER.
  pub thumbprint: String,
  /// Lower-case hex serial number of the leaf.
  pub serial_number: String,
}

impl IssuedCertificate {
  /// Split the chain returned by the certificate endpoint and keep the leaf.
  pub fn from_chain(raw: &[u8]) -> Result<IssuedCertificate, Error> {
    let chain = X509::stack_from_pem(raw)
      .map_err(|_| Error::Validation("the certificate chain is malformed"))?;
    let leaf = chain
      .first()
      .ok_or(Error::Validation("the certificate chain is empty"))?;

    let pem = String::from_utf8(leaf.to_pem()?)
      .map_err(|_| Error::Validation("the certificate is not valid PEM"))?;
    let chain_pem = String::from_utf8(raw.to_vec())
      .map_err(|_| Error::Validation("the certificate chain is not valid PEM"))?;
    let thumbprint = HEXLOWER.encode(&leaf.digest(MessageDigest::sha256())?);
    let serial_number = HEXLOWER.encode(&leaf.serial_number().to_bn()?.to_vec());

    Ok(IssuedCertificate {
      pem,
      chain_pem,
      thumbprint,
      serial_number,
    })
  }
}
