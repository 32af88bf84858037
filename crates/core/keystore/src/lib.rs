//! # `KeyStore`
//!
//! Owns the root Ed25519 signing keypair on disk: generates it once, loads it
//! on demand thereafter. The keypair signs every token [`centra_attestation`]
//! mints and the license-config export.
//!
//! Private key material is written as PKCS8/PEM with no passphrase; the public
//! key as `SubjectPublicKeyInfo`/PEM. Both files are written atomically (write
//! to a sibling `.tmp`, then rename) with Unix permissions tightened before the
//! rename lands: directory `0700`, private key `0600`, public key `0644`.

mod error;

pub use error::{KeyStoreError, KeyStoreErrorExt};

use ed25519_dalek::pkcs8::spki::der::pem::LineEnding;
use ed25519_dalek::pkcs8::spki::{DecodePublicKey, EncodePublicKey};
use ed25519_dalek::pkcs8::{DecodePrivateKey, EncodePrivateKey};
use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use std::fs;
use std::path::{Path, PathBuf};

const PRIVATE_KEY_FILE: &str = "central_root_sk.pem";
const PUBLIC_KEY_FILE: &str = "central_root_pk.pem";

/// Root signing keypair, decoded into memory.
#[derive(Clone)]
pub struct RootKeypair {
    pub signing_key: SigningKey,
    pub verifying_key: VerifyingKey,
}

impl std::fmt::Debug for RootKeypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RootKeypair").field("verifying_key", &self.verifying_key).finish_non_exhaustive()
    }
}

/// Generates a fresh root keypair under `dir`, refusing to overwrite existing key material.
///
/// Creates `dir` (and any parents) with permission `0700` if absent, writes
/// `central_root_sk.pem` (`0600`) and `central_root_pk.pem` (`0644`).
///
/// # Errors
/// Returns [`KeyStoreError::AlreadyExists`] if either file is already present,
/// or [`KeyStoreError::Io`] if the directory or files cannot be written.
pub fn generate_root_keypair(dir: impl AsRef<Path>) -> Result<(), KeyStoreError> {
    let dir = dir.as_ref();
    let private_path = dir.join(PRIVATE_KEY_FILE);
    let public_path = dir.join(PUBLIC_KEY_FILE);

    if private_path.exists() || public_path.exists() {
        return Err(KeyStoreError::AlreadyExists {
            message: format!("key material already present in {}", dir.display()).into(),
            context: None,
        });
    }

    fs::create_dir_all(dir).context("Creating keys directory")?;
    set_permissions(dir, 0o700)?;

    let signing_key = SigningKey::generate(&mut OsRng);
    let verifying_key = signing_key.verifying_key();

    let private_pem = signing_key
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| KeyStoreError::Malformed {
            message: e.to_string().into(),
            context: Some("Encoding private key as PKCS8/PEM".into()),
        })?;
    let public_pem =
        verifying_key.to_public_key_pem(LineEnding::LF).map_err(|e| KeyStoreError::Malformed {
            message: e.to_string().into(),
            context: Some("Encoding public key as SubjectPublicKeyInfo/PEM".into()),
        })?;

    atomic_write(&private_path, private_pem.as_bytes(), 0o600)?;
    atomic_write(&public_path, public_pem.as_bytes(), 0o644)?;

    tracing::info!(dir = %dir.display(), "Generated root signing keypair");

    Ok(())
}

/// Reads the root keypair's private and public PEM files verbatim.
///
/// # Errors
/// Returns [`KeyStoreError::KeyMaterialMissing`] if either file is absent.
pub fn load_root_keys(dir: impl AsRef<Path>) -> Result<(String, String), KeyStoreError> {
    let dir = dir.as_ref();
    let private_path = dir.join(PRIVATE_KEY_FILE);
    let public_path = dir.join(PUBLIC_KEY_FILE);

    let private_pem = read_required(&private_path)?;
    let public_pem = read_required(&public_path)?;

    Ok((private_pem, public_pem))
}

/// Reads and parses the root keypair into memory, ready for signing/verification.
///
/// # Errors
/// Returns [`KeyStoreError::KeyMaterialMissing`] if either file is absent, or
/// [`KeyStoreError::Malformed`] if the PEM/PKCS8 encoding cannot be parsed.
pub fn load_root_keypair(dir: impl AsRef<Path>) -> Result<RootKeypair, KeyStoreError> {
    let (private_pem, public_pem) = load_root_keys(dir)?;

    let signing_key =
        SigningKey::from_pkcs8_pem(&private_pem).map_err(|e| KeyStoreError::Malformed {
            message: e.to_string().into(),
            context: Some("Parsing private key PEM".into()),
        })?;
    let verifying_key =
        VerifyingKey::from_public_key_pem(&public_pem).map_err(|e| KeyStoreError::Malformed {
            message: e.to_string().into(),
            context: Some("Parsing public key PEM".into()),
        })?;

    Ok(RootKeypair { signing_key, verifying_key })
}

fn read_required(path: &Path) -> Result<String, KeyStoreError> {
    fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            KeyStoreError::KeyMaterialMissing {
                message: format!("missing key file: {}", path.display()).into(),
                context: None,
            }
        } else {
            KeyStoreError::Io { source: e, context: Some(path.display().to_string().into()) }
        }
    })
}

fn atomic_write(path: &Path, bytes: &[u8], mode: u32) -> Result<(), KeyStoreError> {
    let tmp: PathBuf = path.with_extension("tmp");

    {
        let mut f = fs::OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&tmp)
            .context(format!("Opening {}", tmp.display()))?;
        use std::io::Write as _;
        f.write_all(bytes).context(format!("Writing {}", tmp.display()))?;
        f.sync_all().context(format!("Fsyncing {}", tmp.display()))?;
    }

    set_permissions(&tmp, mode)?;
    fs::rename(&tmp, path).context(format!("Renaming into {}", path.display()))?;

    Ok(())
}

#[cfg(unix)]
fn set_permissions(path: &Path, mode: u32) -> Result<(), KeyStoreError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
        .context(format!("Setting permissions on {}", path.display()))
}

#[cfg(not(unix))]
fn set_permissions(_path: &Path, _mode: u32) -> Result<(), KeyStoreError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn generate_then_load_round_trips() {
        let dir = tempdir().unwrap();
        generate_root_keypair(dir.path()).unwrap();

        let keypair = load_root_keypair(dir.path()).unwrap();
        let msg = b"hello";
        let sig = ed25519_dalek::Signer::sign(&keypair.signing_key, msg);
        assert!(ed25519_dalek::Verifier::verify(&keypair.verifying_key, msg, &sig).is_ok());
    }

    #[test]
    fn generate_refuses_when_already_present() {
        let dir = tempdir().unwrap();
        generate_root_keypair(dir.path()).unwrap();

        let err = generate_root_keypair(dir.path()).unwrap_err();
        assert!(matches!(err, KeyStoreError::AlreadyExists { .. }));
    }

    #[test]
    fn load_fails_when_absent() {
        let dir = tempdir().unwrap();
        let err = load_root_keys(dir.path()).unwrap_err();
        assert!(matches!(err, KeyStoreError::KeyMaterialMissing { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn private_key_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        generate_root_keypair(dir.path()).unwrap();

        let meta = fs::metadata(dir.path().join(PRIVATE_KEY_FILE)).unwrap();
        assert_eq!(meta.permissions().mode() & 0o777, 0o600);

        let meta = fs::metadata(dir.path().join(PUBLIC_KEY_FILE)).unwrap();
        assert_eq!(meta.permissions().mode() & 0o777, 0o644);

        let meta = fs::metadata(dir.path()).unwrap();
        assert_eq!(meta.permissions().mode() & 0o777, 0o700);
    }
}
