//! Manifest acquisition, validation, and ordering.
//!
//! Repository locators come in three shapes: a remote URL serving
//! `dist.manifest`, a local directory of unpacked trees and archives, or a
//! single unpacked dist. Every candidate passes validation before it may
//! enter a manifest; bad records are dropped with a warning, never fatal.

use std::cmp::Ordering;
use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use tracing::{debug, warn};

use crate::codec;
use crate::config::Config;
use crate::core::version;
use crate::io::{fetch, sysfs};
use crate::types::DistInfo;
use crate::{host, DIST_INFO, DIST_MANIFEST};

/// Collect, validate, and order candidates from every configured repository.
pub fn get_manifest(cfg: &Config) -> Result<Vec<DistInfo>> {
    if cfg.repositories.is_empty() {
        bail!("no repositories configured");
    }
    let mut all = Vec::new();
    for locator in &cfg.repositories {
        let mut dists = from_repository(cfg, locator)
            .with_context(|| format!("repository `{locator}` unavailable"))?;
        all.append(&mut dists);
    }
    sort(&mut all);
    Ok(all)
}

/// Candidates from one repository locator, validated but unsorted.
pub fn from_repository(cfg: &Config, locator: &str) -> Result<Vec<DistInfo>> {
    if let Some(dir) = fetch::local_path(locator) {
        if dir.join(DIST_INFO).is_file() {
            // a single unpacked dist
            let mut info = load_info(&dir.join(DIST_INFO))?;
            info.path = Some(dir.display().to_string());
            return Ok(vec![info]);
        }
        if dir.is_dir() {
            return Ok(from_directory(&dir));
        }
        bail!("`{locator}` is neither a directory nor an unpacked dist");
    }
    from_remote(cfg, locator)
}

/// Recursively collect dists from a local directory of unpacked trees and
/// archives. Subdirectories that produced no dist are recursed into.
fn from_directory(dir: &Path) -> Vec<DistInfo> {
    let mut found = Vec::new();
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            warn!("cannot read {}: {err}", dir.display());
            return found;
        }
    };
    let mut entries: Vec<_> = entries.flatten().collect();
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let path = entry.path();
        if path.is_dir() {
            if path.join(DIST_INFO).is_file() {
                match load_info(&path.join(DIST_INFO)) {
                    Ok(mut info) => {
                        info.path = Some(path.display().to_string());
                        found.push(info);
                    }
                    Err(err) => warn!("dropping {}: {err:#}", path.display()),
                }
            } else {
                found.append(&mut from_directory(&path));
            }
        } else if is_archive_name(&path) {
            match sysfs::archive_info(&path) {
                Ok(Some(text)) => match parse_info(&text) {
                    Ok(mut info) => {
                        info.path = Some(path.display().to_string());
                        found.push(info);
                    }
                    Err(err) => warn!("dropping {}: {err:#}", path.display()),
                },
                Ok(None) => debug!("no dist.info in {}", path.display()),
                Err(err) => warn!("unreadable archive {}: {err}", path.display()),
            }
        }
    }
    found
}

/// Decode a remote repository's `dist.manifest`.
fn from_remote(cfg: &Config, url: &str) -> Result<Vec<DistInfo>> {
    let base = url.trim_end_matches('/');
    let text = fetch::get(cfg, &format!("{base}/{DIST_MANIFEST}"))?;
    let entries = codec::parse_manifest(&text)?;

    let mut found = Vec::new();
    for entry in &entries {
        match DistInfo::from_table(entry).map_err(anyhow::Error::from).and_then(|mut info| {
            info.validate()?;
            Ok(info)
        }) {
            Ok(mut info) => {
                // relative entry paths resolve against the repository URL
                match &info.path {
                    Some(path)
                        if !fetch::is_remote(path)
                            && !path.starts_with("file://")
                            && !path.starts_with('/') =>
                    {
                        info.path = Some(format!("{base}/{path}"));
                    }
                    Some(_) => {}
                    None => info.path = Some(format!("{base}/{}", archive_name(&info))),
                }
                found.push(info);
            }
            Err(err) => warn!("dropping manifest entry from {url}: {err:#}"),
        }
    }
    Ok(found)
}

fn is_archive_name(path: &Path) -> bool {
    let name = path.file_name().map(|n| n.to_string_lossy().to_lowercase());
    name.is_some_and(|n| n.ends_with(".zip") || n.ends_with(".dist"))
}

/// Canonical archive file name for a dist.
pub fn archive_name(info: &DistInfo) -> String {
    if info.arch() == host::UNIVERSAL && info.dist_type() == host::SOURCE {
        format!("{}.dist", info.id())
    } else {
        format!("{}-{}-{}.dist", info.id(), info.arch(), info.dist_type())
    }
}

/// Load and validate a `dist.info` file.
pub fn load_info(path: &Path) -> Result<DistInfo> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_info(&text).with_context(|| format!("invalid {}", path.display()))
}

/// Parse and validate `dist.info` text.
pub fn parse_info(text: &str) -> Result<DistInfo> {
    let document = codec::parse_document(text)?;
    let mut info = DistInfo::from_document(&document)?;
    info.validate()?;
    Ok(info)
}

/// Manifest ordering: name ascending, version descending, concrete arch
/// before `Universal`, binary type before `source`. The sort is stable, so
/// earlier repositories win ties.
pub fn sort(dists: &mut [DistInfo]) {
    dists.sort_by(compare_entries);
}

fn compare_entries(a: &DistInfo, b: &DistInfo) -> Ordering {
    a.name
        .cmp(&b.name)
        .then_with(|| version::compare(&b.version, &a.version))
        .then_with(|| arch_rank(a.arch()).cmp(&arch_rank(b.arch())))
        .then_with(|| type_rank(a.dist_type()).cmp(&type_rank(b.dist_type())))
}

fn arch_rank(arch: &str) -> u8 {
    u8::from(arch == host::UNIVERSAL)
}

fn type_rank(dist_type: &str) -> u8 {
    u8::from(dist_type == host::SOURCE)
}
