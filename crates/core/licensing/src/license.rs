use crate::error::{LicensingError, LicensingErrorExt};
use crate::license_record_id as record_id;
use centra_database::Database;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use surrealdb::types::SurrealValue;
use tracing::instrument;

/// Usage kind consumed by a `SubmitAssertion` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "server", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum UsageKind {
    Scan,
    User,
}

impl UsageKind {
    const fn field(self) -> &'static str {
        match self {
            Self::Scan => "scans",
            Self::User => "users",
        }
    }
}

/// License lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, SurrealValue)]
#[cfg_attr(feature = "server", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum LicenseStatus {
    Active,
    Revoked,
    Expired,
}

impl LicenseStatus {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Revoked => "revoked",
            Self::Expired => "expired",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, SurrealValue)]
#[cfg_attr(feature = "server", derive(utoipa::ToSchema))]
pub struct Client {
    pub name: String,
    pub contact_email: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, SurrealValue)]
#[cfg_attr(feature = "server", derive(utoipa::ToSchema))]
pub struct Quota {
    pub scans: i64,
    pub users: i64,
}

/// A persisted license record.
#[derive(Debug, Clone, Serialize, Deserialize, SurrealValue)]
pub struct License {
    pub id: String,
    pub client: Client,
    pub limits: Quota,
    pub usage: Quota,
    pub expiry: DateTime<Utc>,
    pub status: LicenseStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl License {
    /// Remaining quota for each kind (never negative).
    #[must_use]
    pub fn remaining(&self) -> Quota {
        Quota {
            scans: (self.limits.scans - self.usage.scans).max(0),
            users: (self.limits.users - self.usage.users).max(0),
        }
    }
}

/// A page of licenses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LicensePage {
    pub items: Vec<License>,
    pub page: u32,
    pub limit: u32,
}

/// Partial update applied by [`LicenseStore::update`].
#[derive(Debug, Clone, Default)]
pub struct LicensePatch {
    pub client: Option<Client>,
    pub limits: Option<Quota>,
    pub expiry: Option<DateTime<Utc>>,
    pub status: Option<LicenseStatus>,
}

/// Field list shared by every query that hands a [`License`] back out of
/// storage. `id` is a SurrealDB record id, so it's always projected through
/// `id.id()` to strip the `license:` table prefix before it lands in a
/// `String` field — see `infra/database/src/migrations.rs`'s `AppliedMigration`
/// for the same idiom.
const LICENSE_FIELDS: &str =
    "id.id() AS id, client, limits, usage, expiry, status, created_at, updated_at";

/// Persists licenses and mutates their state through atomic conditional updates.
#[derive(Debug, Clone)]
pub struct LicenseStore {
    db: Database,
}

impl LicenseStore {
    #[must_use]
    pub const fn new(db: Database) -> Self {
        Self { db }
    }

    /// Creates a new license in `active` status with zeroed usage.
    ///
    /// # Errors
    /// Returns [`LicensingError::ValidationFailed`] if `expiry` is not strictly
    /// in the future, or if either limit is non-positive.
    #[instrument(skip(self))]
    pub async fn create(
        &self,
        client_name: impl Into<String> + std::fmt::Debug,
        contact_email: impl Into<String> + std::fmt::Debug,
        limits: Quota,
        expiry: DateTime<Utc>,
    ) -> Result<License, LicensingError> {
        if expiry <= Utc::now() {
            return Err(LicensingError::ValidationFailed {
                message: "expiry must be strictly in the future".into(),
                context: None,
            });
        }
        if limits.scans <= 0 || limits.users <= 0 {
            return Err(LicensingError::ValidationFailed {
                message: "limits must be positive".into(),
                context: None,
            });
        }

        let query = format!(
            "CREATE license SET
                client = {{ name: $name, contact_email: $email }},
                limits = $limits,
                usage = {{ scans: 0, users: 0 }},
                expiry = $expiry,
                status = 'active'
            RETURN {LICENSE_FIELDS};"
        );

        let mut response = self
            .db
            .query(&query)
            .bind(("name", client_name.into()))
            .bind(("email", contact_email.into()))
            .bind(("limits", limits))
            .bind(("expiry", expiry))
            .await
            .context("Creating license")?;

        take_one(&mut response, "Creating license")
    }

    /// Fetches a license by id.
    ///
    /// # Errors
    /// Returns [`LicensingError::StorageUnavailable`] on query failure.
    #[instrument(skip(self))]
    pub async fn get(&self, id: &str) -> Result<Option<License>, LicensingError> {
        let query = format!("SELECT {LICENSE_FIELDS} FROM $id");

        let mut response = self.db.query(&query).bind(("id", record_id(id))).await.context("Fetching license")?;

        Ok(response.take::<Vec<License>>(0).context("Parsing license")?.into_iter().next())
    }

    /// Lists licenses, newest first.
    ///
    /// # Errors
    /// Returns [`LicensingError::ValidationFailed`] if `page` or `limit` is zero.
    #[instrument(skip(self))]
    pub async fn list(&self, page: u32, limit: u32) -> Result<LicensePage, LicensingError> {
        if page == 0 || limit == 0 {
            return Err(LicensingError::ValidationFailed {
                message: "page and limit must be at least 1".into(),
                context: None,
            });
        }
        let start = u64::from(page - 1) * u64::from(limit);

        let query = format!(
            "SELECT {LICENSE_FIELDS} FROM license ORDER BY created_at DESC LIMIT $limit START $start;"
        );

        let mut response = self
            .db
            .query(&query)
            .bind(("limit", limit))
            .bind(("start", start))
            .await
            .context("Listing licenses")?;

        let items = response.take::<Vec<License>>(0).context("Parsing license list")?;
        Ok(LicensePage { items, page, limit })
    }

    /// Applies a partial update; rejects shrinking a limit below current usage.
    ///
    /// # Errors
    /// Returns [`LicensingError::LicenseInvalid`] if the license does not
    /// exist, or [`LicensingError::ValidationFailed`] if a limit would drop
    /// below current usage.
    #[instrument(skip(self, patch))]
    pub async fn update(&self, id: &str, patch: LicensePatch) -> Result<License, LicensingError> {
        let current = self.get(id).await?.ok_or_else(|| LicensingError::LicenseInvalid {
            message: format!("no license with id {id}").into(),
            context: None,
        })?;

        if let Some(limits) = patch.limits {
            if limits.scans < current.usage.scans || limits.users < current.usage.users {
                return Err(LicensingError::ValidationFailed {
                    message: "cannot decrease a limit below current usage".into(),
                    context: None,
                });
            }
        }

        let client = patch.client.unwrap_or(current.client);
        let limits = patch.limits.unwrap_or(current.limits);
        let expiry = patch.expiry.unwrap_or(current.expiry);
        let status = patch.status.unwrap_or(current.status);

        let query = format!(
            "UPDATE $id SET client = $client, limits = $limits, expiry = $expiry,
                status = $status, updated_at = time::now() RETURN {LICENSE_FIELDS};"
        );

        let mut response = self
            .db
            .query(&query)
            .bind(("id", record_id(id)))
            .bind(("client", client))
            .bind(("limits", limits))
            .bind(("expiry", expiry))
            .bind(("status", status.as_str()))
            .await
            .context("Updating license")?;

        take_one(&mut response, "Updating license")
    }

    /// Transitions `status`; idempotent if already in the target status.
    ///
    /// # Errors
    /// Returns [`LicensingError::LicenseInvalid`] if the license does not exist.
    #[instrument(skip(self))]
    pub async fn set_status(
        &self,
        id: &str,
        status: LicenseStatus,
    ) -> Result<License, LicensingError> {
        let query = format!(
            "UPDATE $id SET status = $status, updated_at = time::now() RETURN {LICENSE_FIELDS};"
        );

        let mut response = self
            .db
            .query(&query)
            .bind(("id", record_id(id)))
            .bind(("status", status.as_str()))
            .await
            .context("Setting license status")?;

        take_one(&mut response, "Setting license status")
    }

    /// Atomically consumes one unit of `kind` usage.
    ///
    /// Performs a single conditional update so that no two concurrent callers
    /// can both observe `usage[kind] < limits[kind]` and both increment it.
    ///
    /// # Errors
    /// Returns [`LicensingError::LicenseInvalid`] if the license does not
    /// exist, [`LicensingError::LicenseInactive`] if `status != active`,
    /// [`LicensingError::LicenseExpired`] if `expiry` has passed, or
    /// [`LicensingError::LimitExhausted`] if usage is already at its limit.
    #[instrument(skip(self))]
    pub async fn try_consume_usage(
        &self,
        id: &str,
        kind: UsageKind,
    ) -> Result<License, LicensingError> {
        let field = kind.field();
        let query = format!(
            "UPDATE $id SET usage.{field} += 1, updated_at = time::now()
                WHERE status = 'active' AND expiry > time::now() AND usage.{field} < limits.{field}
                RETURN {LICENSE_FIELDS};"
        );

        let mut response =
            self.db.query(&query).bind(("id", record_id(id))).await.context("Consuming usage")?;

        if let Some(license) = response.take::<Vec<License>>(0).context("Parsing usage update")?.into_iter().next()
        {
            return Ok(license);
        }

        // The conditional update matched nothing; disambiguate the failure without mutating state.
        let current = self.get(id).await?.ok_or_else(|| LicensingError::LicenseInvalid {
            message: format!("no license with id {id}").into(),
            context: None,
        })?;

        if current.status != LicenseStatus::Active {
            return Err(LicensingError::LicenseInactive {
                message: format!("license {id} is {}", current.status.as_str()).into(),
                context: None,
            });
        }
        if current.expiry <= Utc::now() {
            return Err(LicensingError::LicenseExpired {
                message: format!("license {id} expired at {}", current.expiry).into(),
                context: None,
            });
        }
        Err(LicensingError::LimitExhausted {
            message: format!("no remaining {field} quota for license {id}").into(),
            context: None,
        })
    }

    /// Compensating operation: decrements `usage[kind]` by one, floored at zero.
    ///
    /// Used only by the rollback path when a usage increment must be undone
    /// because the paired nonce clear failed.
    ///
    /// # Errors
    /// Returns [`LicensingError::LicenseInvalid`] if the license does not exist.
    #[instrument(skip(self))]
    pub async fn decrement_usage(&self, id: &str, kind: UsageKind) -> Result<(), LicensingError> {
        let field = kind.field();
        let query = format!(
            "UPDATE $id SET usage.{field} = math::max(usage.{field} - 1, 0), updated_at = time::now();"
        );

        self.db.query(&query).bind(("id", record_id(id))).await.context("Rolling back usage")?;

        Ok(())
    }
}

fn take_one(
    response: &mut surrealdb::IndexedResults,
    context: &'static str,
) -> Result<License, LicensingError> {
    response
        .take::<Vec<License>>(0)
        .context(context)?
        .into_iter()
        .next()
        .ok_or_else(|| LicensingError::Internal {
            message: "conditional update matched no rows".into(),
            context: Some(context.into()),
        })
}
