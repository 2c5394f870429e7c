//! Orchestrated repackaging.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::config::Config;
use crate::ops::{self, deployed, package};

/// Pack every installed dist matching `names` into `dest_dir`, returning
/// the archive paths.
pub fn pack(
    cfg: &Config,
    names: &[String],
    deployment: &Path,
    dest_dir: &Path,
) -> Result<Vec<PathBuf>> {
    let installed = deployed::get_deployed(cfg, deployment)?;
    let targets = ops::match_installed(&installed, names)?;

    let mut archives = Vec::new();
    for dist in targets {
        let archive = package::pack(cfg, &dist, deployment, dest_dir)
            .with_context(|| format!("failed to pack {}", dist.id()))?;
        archives.push(archive);
    }
    Ok(archives)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::fs;
    use tempfile::tempdir;
    use crate::core::manifest;
    use crate::ops::install;
    use crate::DIST_INFO;

    #[test]
    fn test_packed_dist_reinstalls_from_its_archive() {
        let dir = tempdir().unwrap();
        let repo = dir.path().join("repo");
        let tree = repo.join("tool-1.0");
        fs::create_dir_all(tree.join("bin")).unwrap();
        fs::write(tree.join("bin/tool"), "#!tool").unwrap();
        fs::write(
            tree.join(DIST_INFO),
            "name = \"tool\"\nversion = \"1.0\"\ntype = \"all\"\n",
        )
        .unwrap();

        let cfg = Config {
            repositories: vec![repo.display().to_string()],
            temp_dir: dir.path().join("tmp"),
            link: false,
            arch: "Linux".to_string(),
            dist_type: "x64".to_string(),
            ..Config::default()
        };

        let deployment = dir.path().join("deploy");
        install::install(&cfg, &["tool".to_string()], &deployment, None, &BTreeMap::new()).unwrap();

        let out = dir.path().join("archives");
        let archives = pack(&cfg, &["tool".to_string()], &deployment, &out).unwrap();
        assert_eq!(archives.len(), 1);

        // the archive is a well-formed repository entry in its own right
        let archive_repo = out.display().to_string();
        let cfg_two = Config {
            repositories: vec![archive_repo],
            ..cfg.clone()
        };
        let dists = manifest::from_repository(&cfg_two, &cfg_two.repositories[0]).unwrap();
        assert_eq!(dists.len(), 1);
        assert_eq!(dists[0].id(), "tool-1.0");

        let second = dir.path().join("deploy2");
        install::install(&cfg_two, &["tool".to_string()], &second, None, &BTreeMap::new()).unwrap();
        assert!(second.join("bin/tool").is_file());
    }

    #[test]
    fn test_pack_unknown_name_fails() {
        let dir = tempdir().unwrap();
        let cfg = Config {
            temp_dir: dir.path().join("tmp"),
            ..Config::default()
        };
        let deployment = dir.path().join("deploy");
        fs::create_dir_all(&deployment).unwrap();
        let err = pack(&cfg, &["ghost".to_string()], &deployment, dir.path()).unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }
}
