#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Digest handling for crucible: SHA-256 for data-section binding, SHA-1
//! for the legacy v2 signature chain and per-file archive checksums.
//!
//! The emitter never hard-codes an algorithm at a call site that the
//! packager is supposed to choose; it passes a [`HashAlgorithm`] down and
//! builds a [`Hasher`] from it.

use crucible_errors::{Error, PackageError};
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::fmt;
use std::io::{Read, Write};

/// Size of chunks for streaming hash computation
const CHUNK_SIZE: usize = 64 * 1024; // 64KB

/// Hash algorithm type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HashAlgorithm {
    /// SHA-1 - signed control digests and tar checksum records
    Sha1,
    /// SHA-256 - data-section digest and unsigned control digests
    Sha256,
}

impl HashAlgorithm {
    /// Digest length in bytes
    #[must_use]
    pub fn digest_len(self) -> usize {
        match self {
            Self::Sha1 => 20,
            Self::Sha256 => 32,
        }
    }
}

/// A hash value tagged with its algorithm
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HashValue {
    algorithm: HashAlgorithm,
    bytes: Vec<u8>,
}

impl HashValue {
    /// Get the hash algorithm
    #[must_use]
    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Get the raw bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Convert to hex string
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }

    /// Parse from hex string (detects algorithm based on length)
    ///
    /// # Errors
    /// Returns an error if the input is not valid hex or has a length
    /// matching neither SHA-1 nor SHA-256.
    pub fn from_hex(s: &str) -> Result<Self, Error> {
        let bytes = hex::decode(s).map_err(|e| PackageError::InvalidFormat {
            message: format!("invalid hex: {e}"),
        })?;

        let algorithm = match bytes.len() {
            20 => HashAlgorithm::Sha1,
            32 => HashAlgorithm::Sha256,
            n => {
                return Err(PackageError::InvalidFormat {
                    message: format!("hash must be 20 or 32 bytes, got {n}"),
                }
                .into())
            }
        };

        Ok(Self { algorithm, bytes })
    }

    /// Compute hash of a byte slice using the given algorithm
    #[must_use]
    pub fn from_data(data: &[u8], algorithm: HashAlgorithm) -> Self {
        let mut hasher = Hasher::new(algorithm);
        hasher.update(data);
        hasher.finalize()
    }

    /// Compute hash of a reader using the given algorithm
    ///
    /// # Errors
    /// Returns an error if reading fails.
    pub fn from_reader<R: Read>(mut reader: R, algorithm: HashAlgorithm) -> Result<Self, Error> {
        let mut hasher = Hasher::new(algorithm);
        let mut buffer = vec![0; CHUNK_SIZE];

        loop {
            let n = reader.read(&mut buffer)?;
            if n == 0 {
                break;
            }
            hasher.update(&buffer[..n]);
        }

        Ok(hasher.finalize())
    }
}

impl fmt::Display for HashValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for HashValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for HashValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

enum HasherInner {
    Sha1(Sha1),
    Sha256(Sha256),
}

/// Streaming hasher constructed from a [`HashAlgorithm`]
pub struct Hasher {
    inner: HasherInner,
}

impl Hasher {
    /// Create a hasher for the given algorithm
    #[must_use]
    pub fn new(algorithm: HashAlgorithm) -> Self {
        let inner = match algorithm {
            HashAlgorithm::Sha1 => HasherInner::Sha1(Sha1::new()),
            HashAlgorithm::Sha256 => HasherInner::Sha256(Sha256::new()),
        };
        Self { inner }
    }

    /// Get the algorithm this hasher was built for
    #[must_use]
    pub fn algorithm(&self) -> HashAlgorithm {
        match self.inner {
            HasherInner::Sha1(_) => HashAlgorithm::Sha1,
            HasherInner::Sha256(_) => HashAlgorithm::Sha256,
        }
    }

    /// Feed bytes into the digest
    pub fn update(&mut self, data: &[u8]) {
        match &mut self.inner {
            HasherInner::Sha1(h) => h.update(data),
            HasherInner::Sha256(h) => h.update(data),
        }
    }

    /// Finalize and return the hash value
    #[must_use]
    pub fn finalize(self) -> HashValue {
        match self.inner {
            HasherInner::Sha1(h) => HashValue {
                algorithm: HashAlgorithm::Sha1,
                bytes: h.finalize().to_vec(),
            },
            HasherInner::Sha256(h) => HashValue {
                algorithm: HashAlgorithm::Sha256,
                bytes: h.finalize().to_vec(),
            },
        }
    }
}

/// A writer that tees bytes through a digest on their way to an underlying
/// sink, so archive streams are hashed as they are written instead of being
/// materialized.
pub struct HashingWriter<W: Write> {
    inner: W,
    hasher: Hasher,
}

impl<W: Write> HashingWriter<W> {
    /// Wrap a sink, hashing everything written with the given algorithm
    #[must_use]
    pub fn new(inner: W, algorithm: HashAlgorithm) -> Self {
        Self {
            inner,
            hasher: Hasher::new(algorithm),
        }
    }

    /// Finish hashing, returning the digest and the underlying sink
    #[must_use]
    pub fn finalize(self) -> (HashValue, W) {
        (self.hasher.finalize(), self.inner)
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}
