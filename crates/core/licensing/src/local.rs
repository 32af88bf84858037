use crate::error::{LicensingError, LicensingErrorExt};
use centra_database::Database;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use surrealdb::types::SurrealValue;
use tracing::instrument;

/// Local-server lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, SurrealValue)]
#[serde(rename_all = "snake_case")]
pub enum LocalStatus {
    Active,
    Blocked,
    Revoked,
}

impl LocalStatus {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Blocked => "blocked",
            Self::Revoked => "revoked",
        }
    }
}

/// A persisted local-server record.
#[derive(Debug, Clone, Serialize, Deserialize, SurrealValue)]
pub struct Local {
    pub id: String,
    pub license_id: String,
    pub local_id: String,
    pub public_key: String,
    pub machine_uuid: Option<String>,
    pub status: LocalStatus,
    pub nonce: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Field list shared by every query that hands a [`Local`] back out of
/// storage. `id` is a SurrealDB record id and `license_id` a `record<license>`
/// reference, so both are projected through `.id()` to strip the table
/// prefix before landing in a `String` field — see
/// `infra/database/src/migrations.rs`'s `AppliedMigration` for the same idiom.
const LOCAL_FIELDS: &str = "id.id() AS id, license_id.id() AS license_id, local_id, public_key, \
    machine_uuid, status, nonce, created_at, updated_at";

/// Persists local-server records and their single outstanding nonce.
#[derive(Debug, Clone)]
pub struct LocalStore {
    db: Database,
}

impl LocalStore {
    #[must_use]
    pub const fn new(db: Database) -> Self {
        Self { db }
    }

    /// Inserts a new local record bound to `license_id`.
    ///
    /// # Errors
    /// Returns [`LicensingError::LocalAlreadyExists`] if `local_id` is already taken.
    #[instrument(skip(self, public_key))]
    pub async fn create(
        &self,
        license_id: &str,
        local_id: &str,
        public_key: &str,
        machine_uuid: Option<String>,
    ) -> Result<Local, LicensingError> {
        let query = format!(
            "CREATE local SET
                license_id = $license_id,
                local_id = $local_id,
                public_key = $public_key,
                machine_uuid = $machine_uuid,
                status = 'active',
                nonce = NONE
            RETURN {LOCAL_FIELDS};"
        );

        let mut response = self
            .db
            .query(&query)
            .bind(("license_id", crate::license_record_id(license_id)))
            .bind(("local_id", local_id.to_owned()))
            .bind(("public_key", public_key.to_owned()))
            .bind(("machine_uuid", machine_uuid))
            .await
            .map_err(|e| map_create_error(&e, local_id))?;

        take_one(&mut response, "Creating local")
    }

    /// Fetches a local record by its human-readable handle.
    ///
    /// # Errors
    /// Returns [`LicensingError::StorageUnavailable`] on query failure.
    #[instrument(skip(self))]
    pub async fn get_by_local_id(&self, local_id: &str) -> Result<Option<Local>, LicensingError> {
        let query = format!("SELECT {LOCAL_FIELDS} FROM local WHERE local_id = $local_id LIMIT 1;");

        let mut response = self
            .db
            .query(&query)
            .bind(("local_id", local_id.to_owned()))
            .await
            .context("Fetching local by local_id")?;

        Ok(response.take::<Vec<Local>>(0).context("Parsing local")?.into_iter().next())
    }

    /// Fetches the local record bound to a license.
    ///
    /// # Errors
    /// Returns [`LicensingError::StorageUnavailable`] on query failure.
    #[instrument(skip(self))]
    pub async fn get_by_license(&self, license_id: &str) -> Result<Option<Local>, LicensingError> {
        let query = format!("SELECT {LOCAL_FIELDS} FROM local WHERE license_id = $license_id LIMIT 1;");

        let mut response = self
            .db
            .query(&query)
            .bind(("license_id", crate::license_record_id(license_id)))
            .await
            .context("Fetching local by license")?;

        Ok(response.take::<Vec<Local>>(0).context("Parsing local")?.into_iter().next())
    }

    /// Transitions a local's status.
    ///
    /// # Errors
    /// Returns [`LicensingError::LocalNotFound`] if no record matches `local_id`.
    #[instrument(skip(self))]
    pub async fn set_status(
        &self,
        local_id: &str,
        status: LocalStatus,
    ) -> Result<Local, LicensingError> {
        let query = format!(
            "UPDATE local SET status = $status, updated_at = time::now()
                WHERE local_id = $local_id RETURN {LOCAL_FIELDS};"
        );

        let mut response = self
            .db
            .query(&query)
            .bind(("local_id", local_id.to_owned()))
            .bind(("status", status.as_str()))
            .await
            .context("Setting local status")?;

        take_one(&mut response, "Setting local status")
    }

    /// Writes a fresh nonce, but only if `(local_id, license_id)` match an existing record.
    ///
    /// # Errors
    /// Returns [`LicensingError::LocalNotFound`] if no matching record exists.
    #[instrument(skip(self, nonce))]
    pub async fn set_nonce(
        &self,
        local_id: &str,
        license_id: &str,
        nonce: &str,
    ) -> Result<(), LicensingError> {
        let query = format!(
            "UPDATE local SET nonce = $nonce, updated_at = time::now()
                WHERE local_id = $local_id AND license_id = $license_id
                RETURN {LOCAL_FIELDS};"
        );

        let mut response = self
            .db
            .query(&query)
            .bind(("local_id", local_id.to_owned()))
            .bind(("license_id", crate::license_record_id(license_id)))
            .bind(("nonce", nonce.to_owned()))
            .await
            .context("Setting nonce")?;

        let updated = response.take::<Vec<Local>>(0).context("Parsing nonce update")?;
        if updated.is_empty() {
            return Err(LicensingError::LocalNotFound {
                message: format!("no local {local_id} bound to license {license_id}").into(),
                context: None,
            });
        }
        Ok(())
    }

    /// Atomically clears the nonce if it equals `expected_nonce`.
    ///
    /// Returns `true` if this call consumed the nonce, `false` if the stored
    /// nonce had already changed (replay or a concurrent winner).
    ///
    /// # Errors
    /// Returns [`LicensingError::StorageUnavailable`] on query failure.
    #[instrument(skip(self, expected_nonce))]
    pub async fn take_nonce(
        &self,
        local_id: &str,
        expected_nonce: &str,
    ) -> Result<bool, LicensingError> {
        let query = format!(
            "UPDATE local SET nonce = NONE, updated_at = time::now()
                WHERE local_id = $local_id AND nonce = $nonce
                RETURN {LOCAL_FIELDS};"
        );

        let mut response = self
            .db
            .query(&query)
            .bind(("local_id", local_id.to_owned()))
            .bind(("nonce", expected_nonce.to_owned()))
            .await
            .context("Taking nonce")?;

        let updated = response.take::<Vec<Local>>(0).context("Parsing nonce take")?;
        Ok(!updated.is_empty())
    }
}

fn map_create_error(err: &surrealdb::Error, local_id: &str) -> LicensingError {
    let text = err.to_string();
    if text.contains("already contains") || text.contains("index") || text.contains("unique") {
        return LicensingError::LocalAlreadyExists {
            message: format!("local_id {local_id} already exists").into(),
            context: None,
        };
    }
    LicensingError::Internal { message: text.into(), context: Some("Creating local".into()) }
}

fn take_one(
    response: &mut surrealdb::IndexedResults,
    context: &'static str,
) -> Result<Local, LicensingError> {
    response
        .take::<Vec<Local>>(0)
        .context(context)?
        .into_iter()
        .next()
        .ok_or_else(|| LicensingError::Internal {
            message: "conditional update matched no rows".into(),
            context: Some(context.into()),
        })
}
