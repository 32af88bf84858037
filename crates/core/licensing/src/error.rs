use std::borrow::Cow;

/// Errors produced by [`crate::LicenseStore`] and [`crate::LocalStore`].
#[centra_derive::centra_error]
pub enum LicensingError {
    /// Malformed or missing input (e.g. non-positive limit, expiry in the past).
    #[error("Validation failed{}: {message}", format_context(.context))]
    ValidationFailed { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// The referenced license does not exist.
    #[error("License invalid{}: {message}", format_context(.context))]
    LicenseInvalid { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// The license exists but its status is not `active`.
    #[error("License inactive{}: {message}", format_context(.context))]
    LicenseInactive { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// The license's expiry has passed.
    #[error("License expired{}: {message}", format_context(.context))]
    LicenseExpired { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// Usage is already at its limit for the requested kind.
    #[error("Limit exhausted{}: {message}", format_context(.context))]
    LimitExhausted { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// No local record matches the supplied identifiers.
    #[error("Local not found{}: {message}", format_context(.context))]
    LocalNotFound { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// A duplicate `local_id` was supplied at creation time.
    #[error("Local already exists{}: {message}", format_context(.context))]
    LocalAlreadyExists { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// The persistence layer failed or returned an unexpected shape.
    #[error("Storage unavailable{}: {source}", format_context(.context))]
    StorageUnavailable {
        #[source]
        source: surrealdb::Error,
        context: Option<Cow<'static, str>>,
    },

    /// Internal invariant violation.
    #[error("Internal licensing error{}: {message}", format_context(.context))]
    Internal { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}
