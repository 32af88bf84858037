use std::borrow::Cow;

/// Errors produced while generating or loading the root signing keypair.
#[centra_derive::centra_error]
pub enum KeyStoreError {
    /// The keys directory could not be created, or a file could not be written/read.
    #[error("Key I/O error{}: {source}", format_context(.context))]
    Io {
        #[source]
        source: std::io::Error,
        context: Option<Cow<'static, str>>,
    },

    /// Generation was requested but key material already exists on disk.
    #[error("Root keypair already exists{}: {message}", format_context(.context))]
    AlreadyExists { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// One or both key files are absent when loading.
    #[error("Root key material missing{}: {message}", format_context(.context))]
    KeyMaterialMissing { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// The PEM/PKCS8 encoding on disk could not be parsed.
    #[error("Malformed key material{}: {message}", format_context(.context))]
    Malformed { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}
