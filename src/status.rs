use crate::account::*;
use serde::Deserialize;
use serde::Serialize;
use std::cmp::Ordering;

/// Trust status of a client, a user or a conversation member.
///
/// Statuses are totally ordered by severity:
/// `Revoked > Expired > Valid > NotActivated`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Eq, PartialEq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CertificateStatus {
  Valid,
  Expired,
  Revoked,
  NotActivated,
}

impl CertificateStatus {
  pub fn severity(self) -> u8 {
    match self {
      CertificateStatus::NotActivated => 0,
      CertificateStatus::Valid => 1,
      CertificateStatus::Expired => 2,
      CertificateStatus::Revoked => 3,
    }
  }
}

impl Ord for CertificateStatus {
  fn cmp(&self, other: &Self) -> Ordering {
    self.severity().cmp(&other.severity())
  }
}

impl PartialOrd for CertificateStatus {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

impl From<RawCertificateStatus> for CertificateStatus {
  fn from(raw: RawCertificateStatus) -> Self {
    match raw {
      RawCertificateStatus::Valid => CertificateStatus::Valid,
      RawCertificateStatus::Expired => CertificateStatus::Expired,
      RawCertificateStatus::Revoked => CertificateStatus::Revoked,
    }
  }
}

/// The most severe status among `records`, or `NotActivated` when there is
/// no record at all.
pub fn resolve(records: &[IdentityRecord]) -> CertificateStatus {
  records
    .iter()
    .map(|record| CertificateStatus::from(record.raw_status))
    .max()
    .unwrap_or(CertificateStatus::NotActivated)
}
