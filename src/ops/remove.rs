//! Orchestrated removal.

use std::path::Path;

use anyhow::{Context, Result};

use crate::config::Config;
use crate::ops::{self, deployed, package};

/// Remove every installed dist matching `names`, in match order.
pub fn remove(cfg: &Config, names: &[String], deployment: &Path) -> Result<Vec<String>> {
    let installed = deployed::get_deployed(cfg, deployment)?;
    let targets = ops::match_installed(&installed, names)?;

    let mut removed = Vec::new();
    for dist in targets {
        package::delete(&dist, deployment)
            .with_context(|| format!("failed to remove {}", dist.id()))?;
        removed.push(dist.id());
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::tempdir;
    use crate::io::sysfs;
    use crate::ops::install;
    use crate::{DIST_INFO, DISTS_DIR};

    fn write_dist(repo: &Path, name: &str, version: &str) -> PathBuf {
        let dir = repo.join(format!("{name}-{version}"));
        fs::create_dir_all(dir.join("bin")).unwrap();
        fs::write(dir.join("bin").join(name), format!("#!{name}")).unwrap();
        fs::write(
            dir.join(DIST_INFO),
            format!("name = \"{name}\"\nversion = \"{version}\"\ntype = \"all\"\n"),
        )
        .unwrap();
        dir
    }

    fn test_cfg(root: &Path, repo: &Path) -> Config {
        Config {
            repositories: vec![repo.display().to_string()],
            temp_dir: root.join("tmp"),
            link: false,
            arch: "Linux".to_string(),
            dist_type: "x64".to_string(),
            ..Config::default()
        }
    }

    #[test]
    fn test_install_remove_roundtrip_restores_snapshot() {
        let dir = tempdir().unwrap();
        let repo = dir.path().join("repo");
        write_dist(&repo, "a", "1.0");
        let deployment = dir.path().join("deploy");
        fs::create_dir_all(deployment.join(DISTS_DIR)).unwrap();
        let cfg = test_cfg(dir.path(), &repo);

        let before = sysfs::list_recursive(&deployment).unwrap();
        install::install(&cfg, &["a".to_string()], &deployment, None, &BTreeMap::new()).unwrap();
        assert!(deployment.join("bin/a").is_file());

        let removed = remove(&cfg, &["a".to_string()], &deployment).unwrap();
        assert_eq!(removed, vec!["a-1.0"]);

        let after = sysfs::list_recursive(&deployment).unwrap();
        assert_eq!(before, after, "deployment should match its pre-install snapshot");
        assert!(deployment.join(DISTS_DIR).is_dir());
    }

    #[test]
    fn test_remove_unknown_name_fails() {
        let dir = tempdir().unwrap();
        let repo = dir.path().join("repo");
        write_dist(&repo, "a", "1.0");
        let deployment = dir.path().join("deploy");
        let cfg = test_cfg(dir.path(), &repo);

        let err = remove(&cfg, &["ghost".to_string()], &deployment).unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn test_remove_respects_version_constraints() {
        let dir = tempdir().unwrap();
        let repo = dir.path().join("repo");
        write_dist(&repo, "lib", "1.0");
        write_dist(&repo, "lib2", "2.0");
        let deployment = dir.path().join("deploy");
        let cfg = test_cfg(dir.path(), &repo);

        install::install(&cfg, &["lib".to_string()], &deployment, None, &BTreeMap::new()).unwrap();
        // a constraint that matches nothing installed is an error
        let err = remove(&cfg, &["lib >= 2".to_string()], &deployment).unwrap_err();
        assert!(err.to_string().contains("lib >= 2"));
        // the installed dist is still there
        assert!(deployment.join(DISTS_DIR).join("lib-1.0").is_dir());

        let removed = remove(&cfg, &["lib < 2".to_string()], &deployment).unwrap();
        assert_eq!(removed, vec!["lib-1.0"]);
    }
}
