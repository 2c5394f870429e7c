//! Orchestrated installation.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::config::Config;
use crate::core::resolver;
use crate::io::sysfs;
use crate::ops::{deployed, package};
use crate::types::DistInfo;
use crate::DISTS_DIR;

/// Resolve `names` and deploy every selected dist into `deployment`.
///
/// Already-installed dists are prepended to the manifest as candidates, so
/// dependents are satisfied without re-install. Deployment is sequential
/// and aborts on the first failure; nothing is rolled back.
pub fn install(
    cfg: &Config,
    names: &[String],
    deployment: &Path,
    manifest: Option<Vec<DistInfo>>,
    variables: &BTreeMap<String, String>,
) -> Result<Vec<DistInfo>> {
    fs::create_dir_all(deployment.join(DISTS_DIR))
        .with_context(|| format!("cannot use deployment {}", deployment.display()))?;

    let available = match manifest {
        Some(manifest) => manifest,
        None => crate::core::manifest::get_manifest(cfg)?,
    };
    let deployed = deployed::get_deployed(cfg, deployment)?;
    let installed: HashSet<String> = deployed
        .iter()
        .map(|d| d.provided.as_deref().unwrap_or(d).id())
        .collect();

    let mut candidates = deployed;
    candidates.extend(available);

    let selected = resolver::resolve(names, &candidates, cfg)?;
    info!(
        "resolved {names:?} to {:?}",
        selected.iter().map(DistInfo::id).collect::<Vec<_>>()
    );

    let mut done = Vec::new();
    for dist in selected {
        if installed.contains(&dist.id()) {
            debug!("{} already deployed", dist.id());
            continue;
        }
        let work = package::scratch_dir(cfg, &dist.id())?;
        let result = package::unpack(cfg, &dist, &work)
            .and_then(|pkg| package::deploy(cfg, &pkg, deployment, variables));
        if !cfg.debug {
            let _ = sysfs::host().delete(&work);
        }
        match result {
            Ok(deployed) => done.push(deployed),
            Err(err) => {
                return Err(err.context(format!(
                    "failed to install {} ({} of its predecessors stay deployed)",
                    dist.id(),
                    done.len()
                )))
            }
        }
    }
    Ok(done)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::tempdir;
    use crate::DIST_INFO;

    fn write_dist(repo: &Path, name: &str, version: &str, extra: &str) -> PathBuf {
        let dir = repo.join(format!("{name}-{version}"));
        fs::create_dir_all(dir.join("bin")).unwrap();
        fs::write(dir.join("bin").join(name), format!("#!{name}")).unwrap();
        fs::write(
            dir.join(DIST_INFO),
            format!("name = \"{name}\"\nversion = \"{version}\"\ntype = \"all\"\n{extra}"),
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
    fn test_install_resolves_chain_in_order() {
        let dir = tempdir().unwrap();
        let repo = dir.path().join("repo");
        write_dist(&repo, "c", "1.0", "");
        write_dist(&repo, "b", "1.0", "depends = {\n  \"c\",\n}\n");
        write_dist(&repo, "a", "1.0", "depends = {\n  \"b\",\n}\n");
        let deployment = dir.path().join("deploy");

        let cfg = test_cfg(dir.path(), &repo);
        let done = install(&cfg, &["a".to_string()], &deployment, None, &BTreeMap::new()).unwrap();
        let ids: Vec<_> = done.iter().map(|d| d.id()).collect();
        assert_eq!(ids, vec!["c-1.0", "b-1.0", "a-1.0"]);
        assert!(deployment.join("bin/a").is_file());
        assert!(deployment.join("bin/c").is_file());
    }

    #[test]
    fn test_reinstall_is_a_no_op() {
        let dir = tempdir().unwrap();
        let repo = dir.path().join("repo");
        write_dist(&repo, "solo", "1.0", "");
        let deployment = dir.path().join("deploy");
        let cfg = test_cfg(dir.path(), &repo);

        let first = install(&cfg, &["solo".to_string()], &deployment, None, &BTreeMap::new()).unwrap();
        assert_eq!(first.len(), 1);
        let second = install(&cfg, &["solo".to_string()], &deployment, None, &BTreeMap::new()).unwrap();
        assert!(second.is_empty());
    }

    #[test]
    fn test_installed_dist_satisfies_new_dependents() {
        let dir = tempdir().unwrap();
        let repo = dir.path().join("repo");
        write_dist(&repo, "lib", "1.0", "");
        write_dist(&repo, "app", "1.0", "depends = {\n  \"lib\",\n}\n");
        let deployment = dir.path().join("deploy");
        let cfg = test_cfg(dir.path(), &repo);

        install(&cfg, &["lib".to_string()], &deployment, None, &BTreeMap::new()).unwrap();
        let done = install(&cfg, &["app".to_string()], &deployment, None, &BTreeMap::new()).unwrap();
        let ids: Vec<_> = done.iter().map(|d| d.id()).collect();
        assert_eq!(ids, vec!["app-1.0"]);
    }

    #[test]
    fn test_explicit_manifest_bypasses_repositories() {
        let dir = tempdir().unwrap();
        let repo = dir.path().join("repo");
        let pkg = write_dist(&repo, "direct", "2.0", "");
        let deployment = dir.path().join("deploy");
        // no repositories configured at all
        let cfg = Config {
            repositories: Vec::new(),
            ..test_cfg(dir.path(), &repo)
        };

        let manifest = vec![DistInfo {
            name: "direct".to_string(),
            version: "2.0".to_string(),
            arch: Some("Universal".to_string()),
            dist_type: Some("all".to_string()),
            path: Some(pkg.display().to_string()),
            ..Default::default()
        }];
        let done = install(
            &cfg,
            &["direct".to_string()],
            &deployment,
            Some(manifest),
            &BTreeMap::new(),
        )
        .unwrap();
        assert_eq!(done[0].id(), "direct-2.0");
    }

    #[test]
    fn test_unresolvable_name_fails_before_deploying() {
        let dir = tempdir().unwrap();
        let repo = dir.path().join("repo");
        write_dist(&repo, "present", "1.0", "");
        let deployment = dir.path().join("deploy");
        let cfg = test_cfg(dir.path(), &repo);

        let err = install(&cfg, &["absent".to_string()], &deployment, None, &BTreeMap::new())
            .unwrap_err();
        assert!(err.to_string().contains("absent"));
        assert!(!deployment.join("bin").exists());
    }
}
