//! In-memory cache transport.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::Mutex;

use crate::lookaside::CacheTransport;

#[derive(Default)]
struct CacheState {
    /// Blobs the cache holds, keyed by (package, checksum, filename).
    available: HashSet<(String, String, String)>,
    /// Uploads performed, in order.
    uploads: Vec<(String, String, String)>,
    /// Download bodies keyed by full URL.
    objects: HashMap<String, Vec<u8>>,
    /// Override for the existence-check body, to simulate a confused
    /// server.
    check_override: Option<String>,
    /// Fail the next upload attempt.
    fail_upload: bool,
    check_calls: u32,
}

/// Cache transport double recording all traffic.
#[derive(Default)]
pub struct MemoryCacheTransport {
    state: Mutex<CacheState>,
}

impl MemoryCacheTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Mark a blob as already present in the cache.
    pub fn put_available(&self, package: &str, checksum: &str, filename: &str) {
        self.lock().available.insert((
            package.to_string(),
            checksum.to_string(),
            filename.to_string(),
        ));
    }

    /// Serve `body` for the given download URL.
    pub fn put_object(&self, url: &str, body: &[u8]) {
        self.lock().objects.insert(url.to_string(), body.to_vec());
    }

    /// Answer the next existence checks with an arbitrary body.
    pub fn set_check_override(&self, body: &str) {
        self.lock().check_override = Some(body.to_string());
    }

    pub fn set_fail_upload(&self, fail: bool) {
        self.lock().fail_upload = fail;
    }

    /// Uploads performed so far, as (package, checksum, filename).
    pub fn uploads(&self) -> Vec<(String, String, String)> {
        self.lock().uploads.clone()
    }

    pub fn check_calls(&self) -> u32 {
        self.lock().check_calls
    }
}

impl CacheTransport for MemoryCacheTransport {
    fn check(&self, name: &str, checksum: &str, filename: &str) -> Result<String, String> {
        let mut state = self.lock();
        state.check_calls += 1;
        if let Some(body) = &state.check_override {
            return Ok(body.clone());
        }
        let key = (
            name.to_string(),
            checksum.to_string(),
            filename.to_string(),
        );
        Ok(if state.available.contains(&key) {
            "Available".to_string()
        } else {
            "Missing".to_string()
        })
    }

    fn upload(&self, name: &str, checksum: &str, file: &Path) -> Result<(), String> {
        let filename = file
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| "not a file".to_string())?
            .to_string();
        fs::read(file).map_err(|e| e.to_string())?;
        let mut state = self.lock();
        if state.fail_upload {
            return Err("injected upload failure".to_string());
        }
        state
            .uploads
            .push((name.to_string(), checksum.to_string(), filename.clone()));
        state
            .available
            .insert((name.to_string(), checksum.to_string(), filename));
        Ok(())
    }

    fn fetch(&self, url: &str) -> Result<Vec<u8>, String> {
        self.lock()
            .objects
            .get(url)
            .cloned()
            .ok_or_else(|| format!("404 for {url}"))
    }
}
