//! # Attestation
//!
//! Orchestrates the three operations a local server performs against the
//! central license authority: `Provision`, `RequestChallenge` and
//! `SubmitAssertion`. Bearer tokens are EdDSA JWTs signed with the root
//! keypair ([`centra_keystore`]); usage accounting and nonce single-use are
//! delegated to [`centra_licensing`]'s atomic store operations.

mod engine;
mod error;
mod nonce;
mod token;

pub use engine::{AssertionResult, AttestationEngine, ChallengeResult, LicenseConfig, ProvisionResult};
pub use error::{AttestationError, AttestationErrorExt, TokenError, TokenErrorExt};
pub use nonce::NonceService;
pub use token::{Claims, ClaimsInput, TokenService, TokenType};
