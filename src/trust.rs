use crate::account::*;
use crate::crypto::IdentityCryptoProvider;
use crate::error::*;
use crate::features::*;
use crate::status::*;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use tracing::instrument;
use tracing::warn;
use tracing::Level;

/// Trust status lookups over the identities cached by the crypto provider.
///
/// A failing identity lookup is an explicit error for a single client, but
/// an empty map for the per-user and per-conversation aggregates, which
/// callers render as "not activated".
pub struct TrustQueries {
  crypto: Arc<dyn IdentityCryptoProvider>,
  features: Arc<dyn FeatureFlagSource>,
}

impl TrustQueries {
  pub fn new(
    crypto: Arc<dyn IdentityCryptoProvider>,
    features: Arc<dyn FeatureFlagSource>,
  ) -> Self {
    TrustQueries { crypto, features }
  }

  #[instrument(level = Level::DEBUG, name = "e2ei::TrustQueries::client_status", err, skip(self))]
  pub async fn client_status(
    &self,
    client_id: &ClientId,
  ) -> Result<CertificateStatus, Error> {
    let identity = self.crypto.get_client_identity(client_id).await?;
    Ok(match identity {
      Some(record) => resolve(std::slice::from_ref(&record)),
      None => CertificateStatus::NotActivated,
    })
  }

  /// Status of every client of `user_id` that has an identity.
  pub async fn user_client_statuses(
    &self,
    user_id: &UserId,
  ) -> HashMap<ClientId, CertificateStatus> {
    let records = match self.crypto.get_user_identities(user_id).await {
      Ok(records) => records,
      Err(err) => {
        warn!(user = %user_id, error = %err, "Failed to read user identities");
        return HashMap::new();
      }
    };

    let mut by_client: HashMap<ClientId, Vec<IdentityRecord>> = HashMap::new();
    for record in records {
      by_client
        .entry(record.client_id.clone())
        .or_default()
        .push(record);
    }

    by_client
      .into_iter()
      .map(|(client_id, records)| (client_id, resolve(&records)))
      .collect()
  }

  /// Aggregate status of every member of a conversation, across all of the
  /// member's clients.
  pub async fn conversation_member_statuses(
    &self,
    conversation_id: &ConversationId,
  ) -> HashMap<UserId, CertificateStatus> {
    match self.crypto.get_members_identities(conversation_id).await {
      Ok(members) => members
        .into_iter()
        .map(|(user_id, records)| (user_id, resolve(&records)))
        .collect(),
      Err(err) => {
        warn!(
          conversation = %conversation_id,
          error = %err,
          "Failed to read conversation member identities"
        );
        HashMap::new()
      }
    }
  }

  /// Whether every certificate of `user_id` is valid and was issued for the
  /// name and handle the user is known under.
  pub async fn is_user_verified(
    &self,
    user_id: &UserId,
    known_as: &NameAndHandle,
  ) -> bool {
    if !is_e2ei_enabled(self.features.as_ref()) {
      return false;
    }

    let records = match self.crypto.get_user_identities(user_id).await {
      Ok(records) => records,
      Err(err) => {
        debug!(user = %user_id, error = %err, "Cannot verify user");
        return false;
      }
    };

    !records.is_empty()
      && resolve(&records) == CertificateStatus::Valid
      && records.iter().all(|record| known_as.matches(record))
  }
}
