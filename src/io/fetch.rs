//! Remote and local acquisition with a URL-keyed content cache.
//!
//! `file://` URLs and bare local paths short-circuit to filesystem copies
//! and reads. Remote URLs go through a plain blocking client; when a cache
//! TTL is configured, bodies land in `<temp>/luadist_cache/<md5(url)>` and
//! are served from there while fresh.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use md5::{Digest, Md5};
use thiserror::Error;
use tracing::debug;

use crate::config::Config;
use crate::io::sysfs;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{url}: server returned {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("cannot fetch `{0}`")]
    BadTarget(String),
}

/// Whether a locator names a remote resource.
pub fn is_remote(locator: &str) -> bool {
    locator.starts_with("http://") || locator.starts_with("https://")
}

/// The local path behind a locator, if it has one.
pub fn local_path(locator: &str) -> Option<PathBuf> {
    if let Some(rest) = locator.strip_prefix("file://") {
        Some(PathBuf::from(rest))
    } else if is_remote(locator) {
        None
    } else {
        Some(PathBuf::from(locator))
    }
}

fn client(cfg: &Config) -> Result<reqwest::blocking::Client, FetchError> {
    let mut builder = reqwest::blocking::Client::builder()
        .user_agent(crate::USER_AGENT)
        .timeout(Duration::from_secs(cfg.timeout))
        .danger_accept_invalid_certs(!cfg.verify_tls);
    if let Some(proxy) = &cfg.proxy {
        builder = builder.proxy(reqwest::Proxy::all(proxy.as_str())?);
    }
    Ok(builder.build()?)
}

fn cache_path(cfg: &Config, url: &str) -> PathBuf {
    cfg.cache_dir().join(hex::encode(Md5::digest(url.as_bytes())))
}

fn cache_fresh(cfg: &Config, path: &Path) -> bool {
    let Some(ttl) = cfg.cache_ttl else {
        return false;
    };
    let Ok(modified) = fs::metadata(path).and_then(|m| m.modified()) else {
        return false;
    };
    modified + Duration::from_secs(ttl) > SystemTime::now()
}

/// Write `body` at `dest` through a `.part` sibling so interrupted writes
/// never look complete.
fn land(dest: &Path, body: &[u8]) -> Result<(), FetchError> {
    let mut part = dest.as_os_str().to_os_string();
    part.push(".part");
    let part = PathBuf::from(part);
    fs::write(&part, body)?;
    fs::rename(&part, dest)?;
    Ok(())
}

fn get_remote(cfg: &Config, url: &str) -> Result<Vec<u8>, FetchError> {
    debug!("fetching {url}");
    let response = client(cfg)?.get(url).send()?;
    if !response.status().is_success() {
        return Err(FetchError::Status {
            url: url.to_string(),
            status: response.status(),
        });
    }
    Ok(response.bytes()?.to_vec())
}

fn cached_body(cfg: &Config, url: &str) -> Result<Vec<u8>, FetchError> {
    let cache = cache_path(cfg, url);
    if cache_fresh(cfg, &cache) {
        debug!("cache hit for {url}");
        return Ok(fs::read(&cache)?);
    }
    let body = get_remote(cfg, url)?;
    if cfg.cache_ttl.is_some() {
        fs::create_dir_all(cfg.cache_dir())?;
        land(&cache, &body)?;
    }
    Ok(body)
}

/// Fetch `url` into `dest_dir`, returning the path of the local file.
pub fn download(cfg: &Config, url: &str, dest_dir: &Path) -> Result<PathBuf, FetchError> {
    fs::create_dir_all(dest_dir)?;

    if let Some(src) = local_path(url) {
        let name = src
            .file_name()
            .ok_or_else(|| FetchError::BadTarget(url.to_string()))?;
        let dest = dest_dir.join(name);
        sysfs::copy_all(&src, &dest)?;
        return Ok(dest);
    }

    let name = url
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty() && !s.contains(':'))
        .ok_or_else(|| FetchError::BadTarget(url.to_string()))?;
    let dest = dest_dir.join(name);

    let body = cached_body(cfg, url)?;
    land(&dest, &body)?;
    Ok(dest)
}

/// Fetch `url` and return its body as text.
pub fn get(cfg: &Config, url: &str) -> Result<String, FetchError> {
    if let Some(src) = local_path(url) {
        return Ok(fs::read_to_string(src)?);
    }
    let body = cached_body(cfg, url)?;
    Ok(String::from_utf8_lossy(&body).into_owned())
}
