//! Signature section: RSA binding of the control digest
//!
//! The legacy v2 scheme signs the SHA-1 digest of the control section with
//! RSASSA-PKCS1-v1_5 and ships the raw signature bytes as the only file of
//! the first gzip member, named after the public key the installer will
//! verify against.

use crate::package::PackageContext;
use crate::tarball::{MemFs, TarballContext};
use crate::types::SigningConfig;
use crucible_errors::{BuildError, Error, Result, SigningError};
use crucible_events::{Event, Section};
use crucible_hash::HashValue;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::Pkcs1v15Sign;
use rsa::RsaPrivateKey;
use sha1::Sha1;
use std::io::{Seek, SeekFrom, Write};
use std::path::PathBuf;

/// Signs control digests with an RSA private key loaded from PEM
pub struct PackageSigner {
    key_path: PathBuf,
    passphrase: Option<String>,
}

impl PackageSigner {
    #[must_use]
    pub fn new(config: &SigningConfig) -> Self {
        Self {
            key_path: config.key_path.clone(),
            passphrase: config.passphrase.clone(),
        }
    }

    /// Signature file name inside the package:
    /// `.SIGN.RSA.<basename(key)>.pub`
    #[must_use]
    pub fn signature_name(&self) -> String {
        let base = self
            .key_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        format!(".SIGN.RSA.{base}.pub")
    }

    fn load_key(&self) -> Result<RsaPrivateKey> {
        let path = self.key_path.display().to_string();
        let pem = std::fs::read_to_string(&self.key_path).map_err(|e| {
            Error::from(SigningError::KeyUnreadable {
                path: path.clone(),
                message: e.to_string(),
            })
        })?;

        let key = if let Some(passphrase) = &self.passphrase {
            RsaPrivateKey::from_pkcs8_encrypted_pem(&pem, passphrase.as_bytes())
                .map_err(|e| e.to_string())
        } else {
            // Unencrypted keys circulate in both PKCS#8 and PKCS#1 PEM.
            RsaPrivateKey::from_pkcs8_pem(&pem)
                .map_err(|e| e.to_string())
                .or_else(|_| RsaPrivateKey::from_pkcs1_pem(&pem).map_err(|e| e.to_string()))
        };

        key.map_err(|message| SigningError::KeyInvalid { path, message }.into())
    }

    /// Produce the raw RSASSA-PKCS1-v1_5 signature over a SHA-1 digest
    ///
    /// # Errors
    ///
    /// Returns an error if the key cannot be loaded or signing fails.
    pub fn sign_sha1_digest(&self, digest: &HashValue) -> Result<Vec<u8>> {
        let key = self.load_key()?;
        key.sign(Pkcs1v15Sign::new::<Sha1>(), digest.as_bytes())
            .map_err(|e| {
                SigningError::SignatureFailed {
                    message: e.to_string(),
                }
                .into()
            })
    }
}

impl PackageContext {
    /// Emit the signature section binding the control digest
    ///
    /// # Errors
    ///
    /// Returns an error if signing fails or the archive cannot be written.
    pub(crate) fn emit_signature_section(
        &self,
        signing: &SigningConfig,
        control_digest: &HashValue,
        dst: &mut (impl Write + Seek),
    ) -> Result<()> {
        let tarctx = TarballContext::new()
            .with_source_date_epoch(self.source_date_epoch)
            .with_override_uid_gid(0, 0)
            .with_override_uname("root")
            .with_override_gname("root")
            .with_skip_close(true);

        let signer = PackageSigner::new(signing);
        let signature = signer.sign_sha1_digest(control_digest)?;

        let mut fsys = MemFs::new();
        fsys.write_file(signer.signature_name(), signature, 0o644);

        tarctx
            .write_targz(&mut *dst, &fsys.entries())
            .map_err(|e| BuildError::TarballFailed {
                section: "signature".to_string(),
                message: e.to_string(),
            })?;

        self.emit_event(Event::SectionWritten {
            section: Section::Signature,
            digest: None,
        });

        dst.seek(SeekFrom::Start(0))?;
        Ok(())
    }
}
