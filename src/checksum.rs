//! Content checksums for source blobs.
//!
//! Both the lookaside cache and the upload path identify blobs by the hex
//! digest of their content. Files are read in fixed-size chunks so memory
//! use stays flat regardless of blob size.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use md5::Md5;
use sha2::{Digest, Sha256, Sha512};

/// Read chunk size for streaming digests.
const CHUNK_SIZE: usize = 8192;

/// Supported digest algorithms.
///
/// `Md5` is the default because existing sources manifests were written
/// against the legacy cache, which keys blobs by md5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HashKind {
    #[default]
    Md5,
    Sha256,
    Sha512,
}

impl HashKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HashKind::Md5 => "md5",
            HashKind::Sha256 => "sha256",
            HashKind::Sha512 => "sha512",
        }
    }
}

impl FromStr for HashKind {
    type Err = ChecksumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "md5" => Ok(HashKind::Md5),
            "sha256" => Ok(HashKind::Sha256),
            "sha512" => Ok(HashKind::Sha512),
            other => Err(ChecksumError::UnknownHashKind(other.to_string())),
        }
    }
}

/// Errors from checksum computation.
#[derive(Debug, thiserror::Error)]
pub enum ChecksumError {
    #[error("unknown hash type: {0}")]
    UnknownHashKind(String),

    #[error("could not read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Compute the hex digest of a file, streaming it chunk by chunk.
pub fn hash_file(path: &Path, kind: HashKind) -> Result<String, ChecksumError> {
    let file = File::open(path).map_err(|source| ChecksumError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let digest = match kind {
        HashKind::Md5 => hash_reader::<Md5>(file),
        HashKind::Sha256 => hash_reader::<Sha256>(file),
        HashKind::Sha512 => hash_reader::<Sha512>(file),
    };
    digest.map_err(|source| ChecksumError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Compute the hex digest of an in-memory buffer.
pub fn hash_bytes(bytes: &[u8], kind: HashKind) -> String {
    match kind {
        HashKind::Md5 => hex::encode(Md5::digest(bytes)),
        HashKind::Sha256 => hex::encode(Sha256::digest(bytes)),
        HashKind::Sha512 => hex::encode(Sha512::digest(bytes)),
    }
}

/// Verify a file against an expected hex digest.
pub fn verify_file(path: &Path, expected: &str, kind: HashKind) -> Result<bool, ChecksumError> {
    let actual = hash_file(path, kind)?;
    Ok(actual.eq_ignore_ascii_case(expected))
}

fn hash_reader<D: Digest>(mut reader: impl Read) -> io::Result<String> {
    let mut digest = D::new();
    let mut chunk = [0u8; CHUNK_SIZE];
    loop {
        let n = reader.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        digest.update(&chunk[..n]);
    }
    Ok(hex::encode(digest.finalize()))
}
