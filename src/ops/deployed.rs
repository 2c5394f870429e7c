//! Installed-dist enumeration.

use std::fs;
use std::path::Path;

use anyhow::Result;
use tracing::warn;

use crate::config::Config;
use crate::core::manifest;
use crate::types::{split_name_version, DistInfo};
use crate::{DISTS_DIR, DIST_INFO};

/// Installed dists plus synthetic records for everything they provide and
/// for the configured host-provided list, all carrying `provided`
/// back-references. Suitable for prepending to a manifest so deployed
/// dists satisfy dependents without re-install.
pub fn get_deployed(cfg: &Config, deployment: &Path) -> Result<Vec<DistInfo>> {
    let dists_dir = deployment.join(DISTS_DIR);
    let mut deployed = Vec::new();

    if dists_dir.is_dir() {
        let mut entries: Vec<_> = fs::read_dir(&dists_dir)?.flatten().collect();
        entries.sort_by_key(|e| e.file_name());
        for entry in entries {
            let info_path = entry.path().join(DIST_INFO);
            if !info_path.is_file() {
                continue;
            }
            match manifest::load_info(&info_path) {
                Ok(mut info) => {
                    info.path = Some(entry.path().display().to_string());
                    deployed.push(info);
                }
                Err(err) => warn!("skipping {}: {err:#}", entry.path().display()),
            }
        }
    }

    let mut synthetic = Vec::new();
    for info in &deployed {
        for entry in info.provides_for(cfg) {
            match split_name_version(&entry) {
                Some((name, version)) => synthetic.push(info.provided_record(name, version)),
                None => warn!("{} provides malformed entry `{entry}`", info.id()),
            }
        }
    }
    for entry in &cfg.provides {
        let Some((name, version)) = split_name_version(entry) else {
            warn!("host provides malformed entry `{entry}`");
            continue;
        };
        let base = DistInfo {
            name: name.to_string(),
            version: version.to_string(),
            arch: Some(cfg.arch.clone()),
            dist_type: Some(cfg.dist_type.clone()),
            ..Default::default()
        };
        synthetic.push(DistInfo {
            provided: Some(Box::new(base.clone())),
            ..base
        });
    }

    deployed.extend(synthetic);
    Ok(deployed)
}
