//! End-to-end identity for a messaging client: certificate enrollment over
//! ACME with an OIDC login in the middle, background upkeep of revocation
//! lists and federation trust anchors, and trust status resolution for
//! clients, users and conversation members.

mod account;
mod api;
mod authorization;
mod config;
mod crl;
mod crypto;
mod directory;
mod enrollment;
mod error;
mod federation;
mod features;
mod helpers;
mod order;
mod repository;
mod revocation;
mod status;
mod transport;
mod trust;

pub use account::*;
pub use api::*;
pub use authorization::*;
pub use config::*;
pub use crl::*;
pub use crypto::*;
pub use directory::*;
pub use enrollment::*;
pub use error::crypto_err;
pub use error::map_transport_err;
pub use error::storage_err;
pub use error::transport_err;
pub use error::Error;
pub use error::ErrorKind;
pub use error::ServerError;
pub use error::TransportError;
pub use federation::*;
pub use features::*;
pub use helpers::Clock;
pub use helpers::Nonce;
pub use helpers::SystemClock;
pub use order::*;
pub use repository::*;
pub use revocation::*;
pub use status::*;
pub use transport::*;
pub use trust::*;
