use std::borrow::Cow;

#[centra_derive::centra_error]
pub enum ResourceGuardError {
    #[error("Resource validation error{}: {message}", format_context(.context))]
    Validation { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}

/// Utilities for safe resource handling and ID validation.
#[derive(Debug)]
pub struct ResourceGuard;

impl ResourceGuard {
    /// Validates a `SurrealDB` ID string against a specific table.
    ///
    /// Prevents "ID Spoofing" where a caller provides an ID from a different table
    /// (e.g., providing a 'local:abc' ID to a 'license' endpoint).
    ///
    /// # Errors
    /// Returns an error if the ID table does not match the expected table.
    pub fn verify<I, T>(id: I, expected_table: T) -> Result<String, ResourceGuardError>
    where
        I: AsRef<str>,
        T: AsRef<str>,
    {
        let id_ref = id.as_ref();
        let table_ref = expected_table.as_ref();

        if let Some((table, _)) = id_ref.split_once(':') {
            if table != table_ref {
                return Err(ResourceGuardError::Validation {
                    message: format!("Expected '{table_ref}', got '{table}'").into(),
                    context: Some("ID table mismatch".into()),
                });
            }
            Ok(id_ref.to_owned())
        } else {
            Ok(format!("{table_ref}:{id_ref}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_prefixes_bare_id() {
        assert_eq!(ResourceGuard::verify("123", "license").unwrap(), "license:123");
    }

    #[test]
    fn verify_accepts_matching_table() {
        assert_eq!(ResourceGuard::verify("license:123", "license").unwrap(), "license:123");
    }

    #[test]
    fn verify_rejects_mismatched_table() {
        assert!(ResourceGuard::verify("local:123", "license").is_err());
    }
}
