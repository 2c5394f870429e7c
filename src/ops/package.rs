//! Package operations: unpack, deploy (install or build), pack, delete.
//!
//! A selected dist's `path` names a local directory, a local archive, or a
//! remote URL. `unpack` normalizes that to an extracted directory, the
//! *package*, which `deploy` then installs into a deployment - building
//! through the external driver first when the dist is a source tree.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use tracing::{debug, info};

use crate::codec;
use crate::config::Config;
use crate::core::manifest;
use crate::io::{fetch, sysfs};
use crate::types::DistInfo;
use crate::{host, DISTS_DIR, DIST_INFO};

/// Create a clean scratch directory under the configured temp root.
pub fn scratch_dir(cfg: &Config, name: &str) -> Result<PathBuf> {
    let dir = cfg.temp_dir.join(format!("luadist-{name}"));
    sysfs::host().delete(&dir)?;
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Normalize a selected dist's origin into a local package directory.
pub fn unpack(cfg: &Config, dist: &DistInfo, work: &Path) -> Result<PathBuf> {
    let origin = dist
        .path
        .as_deref()
        .ok_or_else(|| anyhow!("{} has no origin path", dist.id()))?;

    let local = match fetch::local_path(origin) {
        Some(path) if path.is_dir() => return Ok(path),
        Some(path) => path,
        None => fetch::download(cfg, origin, work)
            .with_context(|| format!("failed to fetch {}", dist.id()))?,
    };

    let dest = work.join(dist.id());
    sysfs::extract_archive(&local, &dest)
        .with_context(|| format!("failed to extract {}", local.display()))?;
    package_root(&dest).ok_or_else(|| anyhow!("no {DIST_INFO} inside {}", local.display()))
}

/// The directory holding `dist.info`: the extraction root, or the single
/// top-level directory archives conventionally carry.
fn package_root(dest: &Path) -> Option<PathBuf> {
    if dest.join(DIST_INFO).is_file() {
        return Some(dest.to_path_buf());
    }
    let mut entries: Vec<_> = fs::read_dir(dest).ok()?.flatten().collect();
    entries.sort_by_key(|e| e.file_name());
    entries
        .into_iter()
        .map(|e| e.path())
        .find(|p| p.join(DIST_INFO).is_file())
}

/// Deploy an unpacked package into `deployment`.
pub fn deploy(
    cfg: &Config,
    pkg: &Path,
    deployment: &Path,
    variables: &BTreeMap<String, String>,
) -> Result<DistInfo> {
    let text = fs::read_to_string(pkg.join(DIST_INFO))
        .with_context(|| format!("no {DIST_INFO} in {}", pkg.display()))?;
    let document = codec::parse_document(&text)?;
    let mut dist = DistInfo::from_document(&document)?;

    // a bare source tree with a build recipe deploys as Universal source
    if dist.dist_type.is_none() && pkg.join("CMakeLists.txt").is_file() {
        dist.arch = Some(host::UNIVERSAL.to_string());
        dist.dist_type = Some(host::SOURCE.to_string());
    }
    dist.validate()?;

    if dist.arch() != host::UNIVERSAL && dist.arch() != cfg.arch {
        bail!(
            "{} is built for arch {} (host is {})",
            dist.id(),
            dist.arch(),
            cfg.arch
        );
    }
    let ty = dist.dist_type();
    if ty != host::SOURCE && ty != host::ALL && ty != cfg.dist_type {
        bail!(
            "{} has type {} (host accepts {}, all, source)",
            dist.id(),
            ty,
            cfg.dist_type
        );
    }

    if ty == host::SOURCE {
        build(cfg, pkg, dist, deployment, variables)
    } else {
        install(cfg, pkg, dist, deployment)
    }
}

/// Install a pre-built package: originals land in the per-dist directory,
/// the deployment root gets relative symlinks or copies.
fn install(cfg: &Config, pkg: &Path, mut dist: DistInfo, deployment: &Path) -> Result<DistInfo> {
    let platform = sysfs::host();
    let dist_dir = deployment.join(DISTS_DIR).join(dist.id());
    if dist_dir.exists() {
        bail!("{} is already deployed", dist.id());
    }
    fs::create_dir_all(&dist_dir)?;

    let mut files: Vec<String> = Vec::new();
    let mut entries: Vec<_> = fs::read_dir(pkg)?.flatten().collect();
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let name = entry.file_name();
        if name == DIST_INFO {
            continue;
        }
        platform.copy(&entry.path(), &dist_dir.join(&name))?;
        if cfg.link {
            let target = Path::new(DISTS_DIR).join(dist.id()).join(&name);
            platform.link(&target, &deployment.join(&name))?;
            files.push(name.to_string_lossy().into_owned());
        } else {
            copy_tracked(&entry.path(), deployment, Path::new(&name), &mut files)?;
        }
    }

    dist.path = None;
    dist.files = files;
    fs::write(
        dist_dir.join(DIST_INFO),
        codec::write_document(&dist.to_document()),
    )?;
    info!("deployed {}", dist.id());
    Ok(dist)
}

/// Copy a tree into the deployment, recording every created path relative
/// to the deployment root, parents before children.
fn copy_tracked(
    src: &Path,
    deployment: &Path,
    rel: &Path,
    out: &mut Vec<String>,
) -> Result<()> {
    let dest = deployment.join(rel);
    if src.is_dir() {
        fs::create_dir_all(&dest)?;
        out.push(sysfs::slashed(rel));
        let mut entries: Vec<_> = fs::read_dir(src)?.flatten().collect();
        entries.sort_by_key(|e| e.file_name());
        for entry in entries {
            copy_tracked(&entry.path(), deployment, &rel.join(entry.file_name()), out)?;
        }
    } else {
        fs::copy(src, &dest)?;
        out.push(sysfs::slashed(rel));
    }
    Ok(())
}

/// Build a source package through the external driver, then install the
/// resulting prefix as a binary package of the host flavor.
fn build(
    cfg: &Config,
    pkg: &Path,
    mut dist: DistInfo,
    deployment: &Path,
    variables: &BTreeMap<String, String>,
) -> Result<DistInfo> {
    let (cmake, make) = cfg.build_commands();
    let driver = cmake.split_whitespace().next().unwrap_or(cmake);
    if which::which(driver).is_err() {
        bail!("build driver `{driver}` not found on this host");
    }

    let work = scratch_dir(cfg, &format!("{}-build", dist.id()))?;
    let build_dir = work.join("build");
    let prefix = work.join("install");
    fs::create_dir_all(&build_dir)?;
    fs::create_dir_all(&prefix)?;

    // config variables, then caller variables, then the fixed overrides
    let mut vars = cfg.variables.clone();
    vars.extend(variables.clone());
    vars.insert(
        "CMAKE_INSTALL_PREFIX".to_string(),
        prefix.display().to_string(),
    );
    vars.insert(
        "CMAKE_INCLUDE_PATH".to_string(),
        deployment.join("include").display().to_string(),
    );
    vars.insert(
        "CMAKE_LIBRARY_PATH".to_string(),
        format!(
            "{};{}",
            deployment.join("lib").display(),
            deployment.join("bin").display()
        ),
    );

    let mut cache = String::new();
    for (key, value) in &vars {
        cache.push_str(&format!("SET({key} \"{value}\" CACHE STRING \"\" FORCE)\n"));
    }
    fs::write(build_dir.join("cache.cmake"), cache)?;

    let platform = sysfs::host();
    debug!("building {} in {}", dist.id(), build_dir.display());
    let configure = format!(
        "{cmake} -C cache.cmake {}",
        platform.quote(&pkg.display().to_string())
    );
    sysfs::exec_in(&build_dir, &configure)
        .with_context(|| format!("build configuration failed for {}", dist.id()))?;
    sysfs::exec_in(&build_dir, make)
        .with_context(|| format!("build failed for {}", dist.id()))?;

    // the emitted prefix is a package of the host flavor
    dist.arch = Some(cfg.arch.clone());
    dist.dist_type = Some(cfg.dist_type.clone());
    fs::write(
        prefix.join(DIST_INFO),
        codec::write_document(&dist.to_document()),
    )?;

    let deployed = install(cfg, &prefix, dist, deployment)?;
    if !cfg.debug {
        let _ = platform.delete(&work);
    }
    Ok(deployed)
}

/// Assemble a redistributable archive of an installed dist.
pub fn pack(
    cfg: &Config,
    dist: &DistInfo,
    deployment: &Path,
    dest_dir: &Path,
) -> Result<PathBuf> {
    let dist_dir = deployment.join(DISTS_DIR).join(dist.id());
    if !dist_dir.is_dir() {
        bail!("{} is not deployed", dist.id());
    }

    let stage_root = scratch_dir(cfg, &format!("{}-pack", dist.id()))?;
    let stage = stage_root.join(dist.id());
    fs::create_dir_all(&stage)?;

    let files = if dist.files.is_empty() {
        sysfs::list_recursive(&dist_dir)?
            .iter()
            .map(|p| sysfs::slashed(p))
            .filter(|f| f != DIST_INFO)
            .collect()
    } else {
        dist.files.clone()
    };

    for rel in &files {
        let src = dist_dir.join(rel);
        if src.is_dir() {
            fs::create_dir_all(stage.join(rel))?;
        } else if src.is_file() {
            if let Some(parent) = stage.join(rel).parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(&src, stage.join(rel))?;
        }
    }

    // metadata travels without deployment bookkeeping
    let mut meta = dist.clone();
    meta.path = None;
    meta.files = Vec::new();
    meta.provided = None;
    fs::write(
        stage.join(DIST_INFO),
        codec::write_document(&meta.to_document()),
    )?;

    fs::create_dir_all(dest_dir)?;
    let archive = dest_dir.join(manifest::archive_name(&meta));
    sysfs::create_archive(&archive, &stage)?;
    if !cfg.debug {
        let _ = sysfs::host().delete(&stage_root);
    }
    info!("packed {} into {}", dist.id(), archive.display());
    Ok(archive)
}

/// Remove an installed dist: recorded files in reverse order, emptied
/// directories pruned, then the per-dist directory itself.
pub fn delete(dist: &DistInfo, deployment: &Path) -> Result<()> {
    for rel in dist.files.iter().rev() {
        let path = deployment.join(rel);
        let Ok(meta) = fs::symlink_metadata(&path) else {
            continue;
        };
        if meta.is_dir() {
            if fs::read_dir(&path)?.next().is_none() {
                fs::remove_dir(&path)?;
            }
        } else {
            fs::remove_file(&path)?;
        }
    }
    let dist_dir = deployment.join(DISTS_DIR).join(dist.id());
    sysfs::host().delete(&dist_dir)?;
    info!("removed {}", dist.id());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn copy_cfg(temp: &Path) -> Config {
        Config {
            temp_dir: temp.to_path_buf(),
            link: false,
            arch: "Linux".to_string(),
            dist_type: "x64".to_string(),
            ..Config::default()
        }
    }

    fn write_package(root: &Path, name: &str, version: &str) -> PathBuf {
        let pkg = root.join(format!("{name}-{version}"));
        fs::create_dir_all(pkg.join("bin")).unwrap();
        fs::create_dir_all(pkg.join("lib/share")).unwrap();
        fs::write(pkg.join("bin").join(name), format!("#!{name}")).unwrap();
        fs::write(pkg.join("lib/share/data.lua"), "return 1").unwrap();
        fs::write(
            pkg.join(DIST_INFO),
            format!("name = \"{name}\"\nversion = \"{version}\"\narch = \"Universal\"\ntype = \"all\"\n"),
        )
        .unwrap();
        pkg
    }

    #[test]
    fn test_deploy_copy_mode_records_files() {
        let dir = tempdir().unwrap();
        let cfg = copy_cfg(dir.path());
        let pkg = write_package(dir.path(), "demo", "1.0");
        let deployment = dir.path().join("deploy");
        fs::create_dir_all(&deployment).unwrap();

        let deployed = deploy(&cfg, &pkg, &deployment, &BTreeMap::new()).unwrap();
        assert!(deployment.join("bin/demo").is_file());
        assert!(deployment.join("lib/share/data.lua").is_file());
        assert!(deployment
            .join(DISTS_DIR)
            .join("demo-1.0")
            .join(DIST_INFO)
            .is_file());
        // parents are recorded before children
        let bin = deployed.files.iter().position(|f| f == "bin").unwrap();
        let exe = deployed.files.iter().position(|f| f == "bin/demo").unwrap();
        assert!(bin < exe);
    }

    #[cfg(unix)]
    #[test]
    fn test_deploy_link_mode_symlinks_into_dists() {
        let dir = tempdir().unwrap();
        let mut cfg = copy_cfg(dir.path());
        cfg.link = true;
        let pkg = write_package(dir.path(), "demo", "1.0");
        let deployment = dir.path().join("deploy");
        fs::create_dir_all(&deployment).unwrap();

        let deployed = deploy(&cfg, &pkg, &deployment, &BTreeMap::new()).unwrap();
        assert_eq!(deployed.files, vec!["bin", "lib"]);
        let link = deployment.join("bin");
        assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert_eq!(
            fs::read_link(&link).unwrap(),
            Path::new("dists/demo-1.0/bin")
        );
        // the link resolves to the per-dist original
        assert!(deployment.join("bin/demo").exists());
    }

    #[test]
    fn test_deploy_then_delete_restores_file_set() {
        let dir = tempdir().unwrap();
        let cfg = copy_cfg(dir.path());
        let pkg = write_package(dir.path(), "demo", "1.0");
        let deployment = dir.path().join("deploy");
        fs::create_dir_all(deployment.join(DISTS_DIR)).unwrap();
        let before = sysfs::list_recursive(&deployment).unwrap();

        let deployed = deploy(&cfg, &pkg, &deployment, &BTreeMap::new()).unwrap();
        delete(&deployed, &deployment).unwrap();

        let after = sysfs::list_recursive(&deployment).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_delete_keeps_shared_directories() {
        let dir = tempdir().unwrap();
        let cfg = copy_cfg(dir.path());
        let deployment = dir.path().join("deploy");
        fs::create_dir_all(&deployment).unwrap();

        let one = write_package(dir.path(), "one", "1.0");
        let pkg_two = dir.path().join("two-1.0");
        fs::create_dir_all(pkg_two.join("bin")).unwrap();
        fs::write(pkg_two.join("bin/two"), "#!two").unwrap();
        fs::write(
            pkg_two.join(DIST_INFO),
            "name = \"two\"\nversion = \"1.0\"\ntype = \"all\"\n",
        )
        .unwrap();

        let first = deploy(&cfg, &one, &deployment, &BTreeMap::new()).unwrap();
        let _second = deploy(&cfg, &pkg_two, &deployment, &BTreeMap::new()).unwrap();

        delete(&first, &deployment).unwrap();
        // `bin` still holds the other dist's file
        assert!(deployment.join("bin/two").is_file());
        assert!(!deployment.join("bin/one").exists());
    }

    #[test]
    fn test_deploy_rejects_foreign_arch_and_type() {
        let dir = tempdir().unwrap();
        let cfg = copy_cfg(dir.path());
        let deployment = dir.path().join("deploy");
        fs::create_dir_all(&deployment).unwrap();

        let pkg = dir.path().join("alien-1.0");
        fs::create_dir_all(&pkg).unwrap();
        fs::write(
            pkg.join(DIST_INFO),
            "name = \"alien\"\nversion = \"1.0\"\narch = \"Windows\"\ntype = \"x86\"\n",
        )
        .unwrap();
        let err = deploy(&cfg, &pkg, &deployment, &BTreeMap::new()).unwrap_err();
        assert!(err.to_string().contains("arch"));

        let pkg = dir.path().join("mistyped-1.0");
        fs::create_dir_all(&pkg).unwrap();
        fs::write(
            pkg.join(DIST_INFO),
            "name = \"mistyped\"\nversion = \"1.0\"\narch = \"Universal\"\ntype = \"x86\"\n",
        )
        .unwrap();
        let err = deploy(&cfg, &pkg, &deployment, &BTreeMap::new()).unwrap_err();
        assert!(err.to_string().contains("type"));
    }

    #[test]
    fn test_unpack_passes_directories_through() {
        let dir = tempdir().unwrap();
        let cfg = copy_cfg(dir.path());
        let pkg = write_package(dir.path(), "demo", "1.0");
        let mut dist = DistInfo {
            name: "demo".to_string(),
            version: "1.0".to_string(),
            path: Some(pkg.display().to_string()),
            ..Default::default()
        };
        let work = dir.path().join("work");
        fs::create_dir_all(&work).unwrap();
        assert_eq!(unpack(&cfg, &dist, &work).unwrap(), pkg);

        dist.path = None;
        assert!(unpack(&cfg, &dist, &work).is_err());
    }

    #[test]
    fn test_unpack_extracts_archives() {
        let dir = tempdir().unwrap();
        let cfg = copy_cfg(dir.path());
        let pkg = write_package(dir.path(), "demo", "1.0");
        let archive = dir.path().join("demo-1.0.dist");
        sysfs::create_archive(&archive, &pkg).unwrap();

        let dist = DistInfo {
            name: "demo".to_string(),
            version: "1.0".to_string(),
            path: Some(archive.display().to_string()),
            ..Default::default()
        };
        let work = dir.path().join("work");
        fs::create_dir_all(&work).unwrap();
        let root = unpack(&cfg, &dist, &work).unwrap();
        assert!(root.join(DIST_INFO).is_file());
        assert!(root.join("bin/demo").is_file());
    }

    #[test]
    fn test_pack_strips_bookkeeping_metadata() {
        let dir = tempdir().unwrap();
        let cfg = copy_cfg(dir.path());
        let pkg = write_package(dir.path(), "demo", "1.0");
        let deployment = dir.path().join("deploy");
        fs::create_dir_all(&deployment).unwrap();
        let deployed = deploy(&cfg, &pkg, &deployment, &BTreeMap::new()).unwrap();

        let out = dir.path().join("out");
        let archive = pack(&cfg, &deployed, &deployment, &out).unwrap();
        assert_eq!(
            archive.file_name().unwrap().to_string_lossy(),
            "demo-1.0-Universal-all.dist"
        );

        let text = sysfs::archive_info(&archive).unwrap().unwrap();
        let packed = manifest::parse_info(&text).unwrap();
        assert_eq!(packed.id(), "demo-1.0");
        assert!(packed.files.is_empty());
        assert!(packed.path.is_none());
    }
}
