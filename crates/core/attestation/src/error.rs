use std::borrow::Cow;

/// Errors produced by [`crate::TokenService`].
#[centra_derive::centra_error]
pub enum TokenError {
    /// Signature verification failed, or claims were structurally wrong.
    #[error("Token invalid{}: {message}", format_context(.context))]
    Invalid { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// `exp` is in the past.
    #[error("Token expired{}: {message}", format_context(.context))]
    Expired { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// The token could not be parsed as a compact JWS.
    #[error("Token malformed{}: {source}", format_context(.context))]
    Malformed {
        #[source]
        source: jsonwebtoken::errors::Error,
        context: Option<Cow<'static, str>>,
    },
}

/// Errors produced by [`crate::AttestationEngine`].
#[centra_derive::centra_error]
pub enum AttestationError {
    /// Malformed or missing request input.
    #[error("Validation failed{}: {message}", format_context(.context))]
    ValidationFailed { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// The supplied local public key could not be parsed as Ed25519.
    #[error("Key malformed{}: {message}", format_context(.context))]
    KeyMalformed { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// A verified token's claims disagree with the request that presented it.
    #[error("Token mismatch{}: {message}", format_context(.context))]
    TokenMismatch { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// No outstanding nonce matches the one presented.
    #[error("Nonce invalid{}: {message}", format_context(.context))]
    NonceInvalid { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// The detached signature over the nonce does not verify.
    #[error("Signature invalid{}: {message}", format_context(.context))]
    SignatureInvalid { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// A bearer token failed to verify; see the nested [`TokenError`] for the reason.
    #[error("Token error{}: {source}", format_context(.context))]
    Token {
        #[source]
        source: TokenError,
        context: Option<Cow<'static, str>>,
    },

    /// A licensing-layer operation failed; see the nested error for the reason.
    #[error("Licensing error{}: {source}", format_context(.context))]
    Licensing {
        #[source]
        source: centra_licensing::LicensingError,
        context: Option<Cow<'static, str>>,
    },

    /// The root keypair could not be loaded; see the nested error for the reason.
    #[error("Key store error{}: {source}", format_context(.context))]
    KeyStore {
        #[source]
        source: centra_keystore::KeyStoreError,
        context: Option<Cow<'static, str>>,
    },

    /// Internal invariant violation.
    #[error("Internal attestation error{}: {message}", format_context(.context))]
    Internal { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}
