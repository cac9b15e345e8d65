//! Lookaside cache client.
//!
//! Large source blobs never live in the code repository: the `sources`
//! manifest records `(checksum, filename)` pairs and the blobs themselves
//! sit in a content-addressed remote store, keyed by package, filename and
//! checksum. This module checks blob existence, uploads new blobs, and
//! syncs a checkout's blobs back down with verification.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::blocking::multipart;
use reqwest::blocking::Client;
use reqwest::{Certificate, Identity};

use crate::checksum::{self, ChecksumError, HashKind};
use crate::config::ClientConfig;
use crate::report::Reporter;

/// Sentinel bodies the cache CGI answers existence checks with.
const SENTINEL_PRESENT: &str = "Available";
const SENTINEL_MISSING: &str = "Missing";

/// Errors from lookaside operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("existence check for {filename} failed: {reason}")]
    Query { filename: String, reason: String },

    #[error("upload of {filename} failed: {reason}")]
    Upload { filename: String, reason: String },

    #[error("could not fetch {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("{filename} failed checksum")]
    ChecksumMismatch { filename: String },

    #[error(transparent)]
    Checksum(#[from] ChecksumError),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{} is not a regular file", .0.display())]
    NotAFile(PathBuf),
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> CacheError + '_ {
    move |source| CacheError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Transport seam for the cache service, substitutable by an in-memory
/// double in tests.
pub trait CacheTransport {
    /// POST an existence check; returns the raw response body.
    fn check(&self, name: &str, checksum: &str, filename: &str) -> Result<String, String>;

    /// Upload one blob as multipart form data.
    fn upload(&self, name: &str, checksum: &str, file: &Path) -> Result<(), String>;

    /// Fetch a blob by URL.
    fn fetch(&self, url: &str) -> Result<Vec<u8>, String>;
}

/// Real transport: form-encoded POSTs against the cache CGI over TLS with
/// the client certificate, plain GETs for downloads.
pub struct HttpCacheTransport {
    client: Client,
    cgi_url: String,
}

impl HttpCacheTransport {
    pub fn connect(config: &ClientConfig) -> Result<Self, CacheError> {
        let build = || -> Result<Client, String> {
            let pem = fs::read(&config.cert)
                .map_err(|e| format!("client certificate {} unreadable: {e}", config.cert.display()))?;
            let identity = Identity::from_pem(&pem).map_err(|e| e.to_string())?;
            let server_ca = fs::read(&config.serverca_cert)
                .map_err(|e| format!("server CA {} unreadable: {e}", config.serverca_cert.display()))?;
            let server_ca = Certificate::from_pem(&server_ca).map_err(|e| e.to_string())?;
            Client::builder()
                .identity(identity)
                .add_root_certificate(server_ca)
                .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
                .timeout(Duration::from_secs(config.read_timeout_secs))
                .build()
                .map_err(|e| e.to_string())
        };
        let client = build().map_err(CacheError::Auth)?;
        Ok(Self {
            client,
            cgi_url: config.lookaside_cgi.clone(),
        })
    }
}

impl CacheTransport for HttpCacheTransport {
    fn check(&self, name: &str, checksum: &str, filename: &str) -> Result<String, String> {
        let form = [
            ("name", name),
            ("md5sum", checksum),
            ("filename", filename),
        ];
        self.client
            .post(&self.cgi_url)
            .form(&form)
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.text())
            .map_err(|e| e.to_string())
    }

    fn upload(&self, name: &str, checksum: &str, file: &Path) -> Result<(), String> {
        let form = multipart::Form::new()
            .text("name", name.to_string())
            .text("md5sum", checksum.to_string())
            .file("file", file)
            .map_err(|e| e.to_string())?;
        self.client
            .post(&self.cgi_url)
            .multipart(form)
            .send()
            .and_then(|r| r.error_for_status())
            .map(|_| ())
            .map_err(|e| e.to_string())
    }

    fn fetch(&self, url: &str) -> Result<Vec<u8>, String> {
        self.client
            .get(url)
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.bytes())
            .map(|b| b.to_vec())
            .map_err(|e| e.to_string())
    }
}

/// The ordered `sources` manifest of a checkout.
///
/// One `(checksum, filename)` pair per line. Corrections replace the whole
/// file on save; a filename never appears twice with differing checksums.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourcesManifest {
    entries: Vec<(String, String)>,
}

impl SourcesManifest {
    /// Parse a manifest file. A missing file is an empty manifest.
    pub fn load(path: &Path) -> Result<Self, CacheError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path).map_err(io_err(path))?;
        Ok(Self::parse(&text))
    }

    pub fn parse(text: &str) -> Self {
        let entries = text
            .lines()
            .filter_map(|line| {
                let mut parts = line.split_whitespace();
                match (parts.next(), parts.next()) {
                    (Some(checksum), Some(filename)) => {
                        Some((checksum.to_string(), filename.to_string()))
                    }
                    _ => None,
                }
            })
            .collect();
        Self { entries }
    }

    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    pub fn contains(&self, checksum: &str, filename: &str) -> bool {
        self.entries
            .iter()
            .any(|(c, f)| c == checksum && f == filename)
    }

    /// Record a blob, keeping insertion order. A new checksum for an
    /// already-listed filename replaces the old pair in place.
    pub fn insert(&mut self, checksum: &str, filename: &str) {
        for entry in &mut self.entries {
            if entry.1 == filename {
                entry.0 = checksum.to_string();
                return;
            }
        }
        self.entries
            .push((checksum.to_string(), filename.to_string()));
    }

    /// Rewrite the manifest file.
    pub fn save(&self, path: &Path) -> Result<(), CacheError> {
        let mut text = String::new();
        for (checksum, filename) in &self.entries {
            text.push_str(checksum);
            text.push(' ');
            text.push_str(filename);
            text.push('\n');
        }
        fs::write(path, text).map_err(io_err(path))
    }
}

/// Append a filename to an ignore file unless an identical line exists.
pub fn append_ignore(path: &Path, filename: &str) -> Result<(), CacheError> {
    let existing = if path.exists() {
        fs::read_to_string(path).map_err(io_err(path))?
    } else {
        String::new()
    };
    if existing.lines().any(|line| line == filename) {
        return Ok(());
    }
    let mut updated = existing;
    if !updated.is_empty() && !updated.ends_with('\n') {
        updated.push('\n');
    }
    updated.push_str(filename);
    updated.push('\n');
    fs::write(path, updated).map_err(io_err(path))
}

/// Content-addressed cache client.
pub struct LookasideCache<'a> {
    transport: &'a dyn CacheTransport,
    reporter: &'a Reporter,
    download_url: String,
    hash: HashKind,
}

impl<'a> LookasideCache<'a> {
    pub fn new(
        transport: &'a dyn CacheTransport,
        reporter: &'a Reporter,
        download_url: &str,
        hash: HashKind,
    ) -> Self {
        Self {
            transport,
            reporter,
            download_url: download_url.to_string(),
            hash,
        }
    }

    /// Ask the cache whether it already holds this blob.
    ///
    /// Only the two sentinel bodies are trusted; anything else, transport
    /// failure included, is a hard error, never interpreted as "missing".
    pub fn exists(&self, package: &str, filename: &str, checksum: &str) -> Result<bool, CacheError> {
        let body = self
            .transport
            .check(package, checksum, filename)
            .map_err(|reason| CacheError::Query {
                filename: filename.to_string(),
                reason,
            })?;
        match body.trim() {
            SENTINEL_PRESENT => Ok(true),
            SENTINEL_MISSING => Ok(false),
            other => Err(CacheError::Query {
                filename: filename.to_string(),
                reason: format!("unexpected cache response: {other:?}"),
            }),
        }
    }

    /// Upload one blob, then record it in the manifest and ignore list.
    ///
    /// The network upload is skipped when the cache already holds the
    /// checksum. The manifest and ignore list are only touched after the
    /// blob is confirmed present or uploaded, so they never reference a
    /// blob the cache does not hold.
    pub fn upload(
        &self,
        package: &str,
        file: &Path,
        manifest_path: &Path,
        ignore_path: &Path,
    ) -> Result<(), CacheError> {
        if !file.is_file() {
            return Err(CacheError::NotAFile(file.to_path_buf()));
        }
        let filename = file
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .ok_or_else(|| CacheError::NotAFile(file.to_path_buf()))?;
        let checksum = checksum::hash_file(file, self.hash)?;

        if self.exists(package, &filename, &checksum)? {
            self.reporter
                .progress(&format!("{filename} already uploaded, skipping"));
        } else {
            self.reporter.progress(&format!("Uploading {filename}"));
            self.transport
                .upload(package, &checksum, file)
                .map_err(|reason| CacheError::Upload {
                    filename: filename.clone(),
                    reason,
                })?;
        }

        let mut manifest = SourcesManifest::load(manifest_path)?;
        manifest.insert(&checksum, &filename);
        manifest.save(manifest_path)?;
        append_ignore(ignore_path, &filename)?;
        Ok(())
    }

    /// Download every manifest entry that is not already present and valid.
    ///
    /// Fetched bytes are verified before the file lands under its final
    /// name; a mismatch is a hard failure that leaves nothing behind.
    pub fn sync(
        &self,
        package: &str,
        manifest: &SourcesManifest,
        outdir: &Path,
    ) -> Result<(), CacheError> {
        for (checksum, filename) in manifest.entries() {
            let outfile = outdir.join(filename);
            if outfile.exists() && checksum::verify_file(&outfile, checksum, self.hash)? {
                continue;
            }
            let url = format!(
                "{}/{}/{}/{}/{}",
                self.download_url, package, filename, checksum, filename
            );
            self.reporter.progress(&format!("Downloading {filename}"));
            let bytes = self
                .transport
                .fetch(&url)
                .map_err(|reason| CacheError::Fetch { url, reason })?;
            if !checksum::hash_bytes(&bytes, self.hash).eq_ignore_ascii_case(checksum) {
                return Err(CacheError::ChecksumMismatch {
                    filename: filename.clone(),
                });
            }
            fs::write(&outfile, bytes).map_err(io_err(&outfile))?;
        }
        Ok(())
    }
}
