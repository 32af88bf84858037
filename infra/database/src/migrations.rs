use crate::error::{DatabaseError, DatabaseErrorExt};
use fxhash::FxHashMap;
use surrealdb::Surreal;
use surrealdb::engine::any::Any;
use surrealdb::types::SurrealValue;

/// A single schema migration, embedded directly in the binary.
///
/// Unlike a codegen-manifest approach, migrations here are a plain static slice;
/// `checksum` is a hand-assigned tag bumped whenever `script` changes.
struct Migration {
    version: &'static str,
    script: &'static str,
    checksum: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: "0001_license",
        script: r"
            DEFINE TABLE license SCHEMAFULL;
            DEFINE FIELD client ON license TYPE object;
            DEFINE FIELD client.name ON license TYPE string;
            DEFINE FIELD client.contact_email ON license TYPE string;
            DEFINE FIELD limits ON license TYPE object;
            DEFINE FIELD limits.scans ON license TYPE int;
            DEFINE FIELD limits.users ON license TYPE int;
            DEFINE FIELD usage ON license TYPE object;
            DEFINE FIELD usage.scans ON license TYPE int DEFAULT 0;
            DEFINE FIELD usage.users ON license TYPE int DEFAULT 0;
            DEFINE FIELD expiry ON license TYPE datetime;
            DEFINE FIELD status ON license TYPE string
                ASSERT $value IN ['active', 'revoked', 'expired'] DEFAULT 'active';
            DEFINE FIELD created_at ON license TYPE datetime DEFAULT time::now();
            DEFINE FIELD updated_at ON license TYPE datetime DEFAULT time::now();
        ",
        checksum: "v1",
    },
    Migration {
        version: "0002_local",
        script: r"
            DEFINE TABLE local SCHEMAFULL;
            DEFINE FIELD license_id ON local TYPE record<license>;
            DEFINE FIELD local_id ON local TYPE string;
            DEFINE FIELD public_key ON local TYPE string;
            DEFINE FIELD machine_uuid ON local TYPE option<string>;
            DEFINE FIELD status ON local TYPE string
                ASSERT $value IN ['active', 'blocked', 'revoked'] DEFAULT 'active';
            DEFINE FIELD nonce ON local TYPE option<string>;
            DEFINE FIELD created_at ON local TYPE datetime DEFAULT time::now();
            DEFINE FIELD updated_at ON local TYPE datetime DEFAULT time::now();
            DEFINE INDEX local_id_unique ON local FIELDS local_id UNIQUE;
        ",
        checksum: "v1",
    },
];

#[derive(Debug, SurrealValue)]
struct AppliedMigration {
    version: String,
    checksum: String,
}

#[derive(Debug, Default)]
pub(crate) struct MigrationReport {
    pub applied: Vec<String>,
    pub skipped: Vec<String>,
}

pub(crate) struct MigrationRunner {
    db: Surreal<Any>,
}

impl MigrationRunner {
    pub(crate) const fn new(db: Surreal<Any>) -> Self {
        Self { db }
    }

    pub(crate) async fn run(&self) -> Result<MigrationReport, DatabaseError> {
        let mut report = MigrationReport::default();
        let applied = self.get_applied_map().await?;

        for migration in MIGRATIONS {
            if let Some(existing) = applied.get(migration.version) {
                ensure_checksum_match(migration, &existing.checksum)?;
                report.skipped.push(migration.version.to_owned());
                continue;
            }

            self.apply(migration).await?;
            report.applied.push(migration.version.to_owned());
        }

        Ok(report)
    }

    async fn apply(&self, migration: &Migration) -> Result<(), DatabaseError> {
        let query = format!(
            "BEGIN TRANSACTION;
            {}
            CREATE type::thing('migration', $version) SET checksum = $checksum;
            COMMIT TRANSACTION;",
            migration.script,
        );

        self.db
            .query(&query)
            .bind(("version", migration.version))
            .bind(("checksum", migration.checksum))
            .await
            .context(format!("Applying migration {}", migration.version))?;

        Ok(())
    }

    async fn get_applied_map(&self) -> Result<FxHashMap<String, AppliedMigration>, DatabaseError> {
        let exists = self
            .db
            .query("RETURN array::len((INFO FOR DB).tables.keys()) > 0")
            .await
            .context("Checking for existing schema")?
            .take::<Option<bool>>(0)
            .context("Parsing schema presence check")?
            .unwrap_or(false);

        if !exists {
            return Ok(FxHashMap::default());
        }

        let entries = self
            .db
            .query("SELECT id.id() AS version, checksum FROM migration")
            .await
            .context("Loading applied migrations")?
            .take::<Vec<AppliedMigration>>(0)
            .context("Parsing migrations map")?;

        Ok(entries.into_iter().map(|e| (e.version.clone(), e)).collect())
    }
}

fn ensure_checksum_match(migration: &Migration, existing: &str) -> Result<(), DatabaseError> {
    if existing != migration.checksum {
        return Err(DatabaseError::Migration {
            message: format!(
                "Checksum mismatch for {} (expected {}, got {existing})",
                migration.version, migration.checksum
            )
            .into(),
            context: Some("Migration already applied with different checksum".into()),
        });
    }
    Ok(())
}
