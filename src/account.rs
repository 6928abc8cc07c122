use serde::Deserialize;
use serde::Serialize;

macro_rules! string_id {
  ($(#[$meta:meta])* $name:ident) => {
    $(#[$meta])*
    #[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
    #[serde(transparent)]
    pub struct $name(pub String);

    impl $name {
      pub fn new(value: impl Into<String>) -> Self {
        $name(value.into())
      }

      pub fn as_str(&self) -> &str {
        &self.0
      }
    }

    impl std::fmt::Display for $name {
      fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
      }
    }

    impl From<&str> for $name {
      fn from(value: &str) -> Self {
        $name(value.to_string())
      }
    }
  };
}

string_id!(
  /// A qualified device client id, e.g. `user@domain:client`.
  ClientId
);
string_id!(
  /// A qualified user id.
  UserId
);
string_id!(
  /// A conversation (secure group) id.
  ConversationId
);

/// The certificate status as reported by the crypto provider for a single
/// credential.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Eq, PartialEq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RawCertificateStatus {
  Valid,
  Expired,
  Revoked,
}

/// A cached identity of one client, owned by the crypto provider.
#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IdentityRecord {
  pub client_id: ClientId,
  pub handle: String,
  pub display_name: String,
  pub domain: String,
  pub certificate_pem: String,
  pub raw_status: RawCertificateStatus,
  pub thumbprint: String,
  pub serial_number: String,
  /// Seconds since the unix epoch.
  pub not_before: u64,
  /// Seconds since the unix epoch.
  pub not_after: u64,
}

/// The profile a user is known under locally, compared against the names
/// embedded in their certificates.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct NameAndHandle {
  pub name: Option<String>,
  pub handle: Option<String>,
}

impl NameAndHandle {
  pub fn new(name: impl Into<String>, handle: impl Into<String>) -> Self {
    NameAndHandle {
      name: Some(name.into()),
      handle: Some(handle.into()),
    }
  }

  /// Whether a certificate identity was issued for this profile.
  ///
  /// Certificates carry the handle in the `wireapp://%40handle@domain` URI
  /// form, so both the bare handle and the URI form are accepted.
  pub fn matches(&self, record: &IdentityRecord) -> bool {
    let (Some(name), Some(handle)) = (&self.name, &self.handle) else {
      return false;
    };
    if &record.display_name != name {
      return false;
    }
    record.handle == *handle
      || record.handle == format!("wireapp://%40{}@{}", handle, record.domain)
  }
}
