//! # Licensing
//!
//! Persists licenses and the local-server records bound to them, backed by
//! [`centra_database`]. The two atomic operations that make concurrent
//! attestation safe — [`LicenseStore::try_consume_usage`] and
//! [`LocalStore::take_nonce`] — are each a single conditional `SurrealQL`
//! update, not a read-modify-write in application code.

mod error;
mod license;
mod local;

pub use error::{LicensingError, LicensingErrorExt};
pub use license::{Client, License, LicensePage, LicensePatch, LicenseStatus, LicenseStore, Quota, UsageKind};
pub use local::{Local, LocalStatus, LocalStore};

pub(crate) fn license_record_id(id: &str) -> surrealdb::types::RecordId {
    id.split_once(':').map_or_else(
        || surrealdb::types::RecordId::new("license", id),
        |(table, key)| surrealdb::types::RecordId::new(table, key),
    )
}
