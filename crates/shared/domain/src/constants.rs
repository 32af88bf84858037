//! `OpenAPI` tag names, kept in one place so the HTTP layer and docs agree.

pub const SYSTEM_TAG: &str = "system";
pub const ATTESTATION_TAG: &str = "attestation";
pub const LICENSE_TAG: &str = "license";
