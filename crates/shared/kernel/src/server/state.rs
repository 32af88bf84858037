use axum::extract::FromRef;
use centra_attestation::AttestationEngine;
use centra_database::Database;
use centra_domain::config::ApiConfig;
use centra_licensing::LicenseStore;
use std::borrow::Cow;
use std::ops::Deref;
use std::sync::Arc;

#[centra_derive::centra_error]
pub enum ApiStateError {
    #[error("State validation error{}: {message}", format_context(.context))]
    Validation { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}

#[derive(Debug)]
pub struct ApiStateInner {
    pub config: ApiConfig,
    pub database: Database,
    pub engine: AttestationEngine,
    pub licenses: LicenseStore,
}

#[derive(Debug, Clone)]
pub struct ApiState {
    inner: Arc<ApiStateInner>,
}

impl ApiState {
    #[must_use]
    pub fn builder() -> ApiStateBuilder {
        ApiStateBuilder::default()
    }
}

impl Deref for ApiState {
    type Target = ApiStateInner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl FromRef<ApiState> for ApiConfig {
    fn from_ref(state: &ApiState) -> Self {
        state.inner.config.clone()
    }
}

impl FromRef<ApiState> for Database {
    fn from_ref(state: &ApiState) -> Self {
        state.inner.database.clone()
    }
}

impl FromRef<ApiState> for AttestationEngine {
    fn from_ref(state: &ApiState) -> Self {
        state.inner.engine.clone()
    }
}

impl FromRef<ApiState> for LicenseStore {
    fn from_ref(state: &ApiState) -> Self {
        state.inner.licenses.clone()
    }
}

#[derive(Debug, Default)]
pub struct ApiStateBuilder {
    config: Option<ApiConfig>,
    database: Option<Database>,
    engine: Option<AttestationEngine>,
    licenses: Option<LicenseStore>,
}

impl ApiStateBuilder {
    pub fn config(mut self, config: ApiConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn db(mut self, database: Database) -> Self {
        self.database = Some(database);
        self
    }

    pub fn engine(mut self, engine: AttestationEngine) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn licenses(mut self, licenses: LicenseStore) -> Self {
        self.licenses = Some(licenses);
        self
    }

    pub fn build(self) -> Result<ApiState, ApiStateError> {
        let config = self.config.ok_or_else(|| ApiStateError::Validation {
            message: "ApiConfig not provided".into(),
            context: None,
        })?;
        let database = self.database.ok_or_else(|| ApiStateError::Validation {
            message: "Database not provided".into(),
            context: None,
        })?;
        let engine = self.engine.ok_or_else(|| ApiStateError::Validation {
            message: "AttestationEngine not provided".into(),
            context: None,
        })?;
        let licenses = self.licenses.ok_or_else(|| ApiStateError::Validation {
            message: "LicenseStore not provided".into(),
            context: None,
        })?;

        Ok(ApiState { inner: Arc::new(ApiStateInner { config, database, engine, licenses }) })
    }
}
