//! Backtracking dependency resolver.
//!
//! Selects an ordered, mutually consistent set of dists satisfying a list
//! of requirements over an ordered manifest. Candidates are tried in
//! manifest order, so the pipeline's sort decides preference; for a given
//! (requirements, manifest) pair the output is deterministic.
//!
//! A `provides` entry of any manifest dist can stand in for a requirement:
//! matching synthesizes a provided record that, when chosen, installs its
//! provider instead. Provided records carry no dependencies of their own,
//! so augmentation cannot recurse.

use std::cmp::Ordering;

use thiserror::Error;
use tracing::{debug, trace};

use crate::config::Config;
use crate::core::version;
use crate::types::constraint::ConstraintError;
use crate::types::{split_name_version, DistInfo, NameConstraint};
use crate::host;

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("invalid requirement: {0}")]
    Requirement(#[from] ConstraintError),

    #[error("{0}")]
    Unsatisfiable(String),
}

/// Resolve `requirements` against `manifest`, returning the selected dists
/// in installation order (dependencies before dependents).
pub fn resolve(
    requirements: &[String],
    manifest: &[DistInfo],
    cfg: &Config,
) -> Result<Vec<DistInfo>, ResolveError> {
    for requirement in requirements {
        NameConstraint::parse(requirement)?;
    }
    debug!("resolving {requirements:?}");
    let mut path = Vec::new();
    search(requirements, manifest, &mut path, cfg).map_err(ResolveError::Unsatisfiable)
}

/// One backtracking step: satisfy the head requirement, then the rest.
fn search(
    pending: &[String],
    manifest: &[DistInfo],
    path: &mut Vec<(String, String)>,
    cfg: &Config,
) -> Result<Vec<DistInfo>, String> {
    let Some((head, rest)) = pending.split_first() else {
        return Ok(Vec::new());
    };
    let requirement = NameConstraint::parse(head).map_err(|e| e.to_string())?;
    let mut last_err = format!("no suitable dist for `{requirement}`");

    for candidate in candidates(&requirement, manifest, cfg) {
        // the dist that would actually be installed
        let target = candidate.provided.as_deref().unwrap_or(&candidate);
        let key = (target.name.clone(), target.version.clone());

        // a dist already being installed higher up this branch keeps its
        // dependencies collapsed, which is what breaks dependency and
        // provides cycles
        let on_path = path.contains(&key);
        if on_path {
            trace!("{} already on the resolution path", target.id());
        }

        let mut next = if on_path {
            Vec::new()
        } else {
            candidate.depends_for(cfg)
        };
        next.extend(rest.iter().cloned());

        if !on_path {
            path.push(key);
        }
        let result = search(&next, manifest, path, cfg);
        if !on_path {
            path.pop();
        }

        match result {
            Err(err) => last_err = err,
            Ok(mut selected) => match admit(&selected, target, cfg) {
                Admission::Present => return Ok(selected),
                Admission::New => {
                    selected.push(target.clone());
                    return Ok(selected);
                }
                Admission::Blocked(err) => last_err = err,
            },
        }
    }
    Err(last_err)
}

/// Candidates for one requirement, in manifest order: dists matched by
/// name, and provided records synthesized from matching `provides` entries.
fn candidates(
    requirement: &NameConstraint,
    manifest: &[DistInfo],
    cfg: &Config,
) -> Vec<DistInfo> {
    let mut out: Vec<DistInfo> = Vec::new();
    for dist in manifest {
        if !host_compatible(dist, cfg) {
            continue;
        }
        if dist.name == requirement.name {
            if requirement.admits(&dist.version) {
                out.push(dist.clone());
            }
            continue;
        }
        for entry in dist.provides_for(cfg) {
            let Some((name, provided_version)) = split_name_version(&entry) else {
                continue;
            };
            if name != requirement.name || !requirement.admits(provided_version) {
                continue;
            }
            let duplicate = out.iter().any(|c| {
                c.provided.is_some()
                    && c.name == name
                    && version::compare(&c.version, provided_version) == Ordering::Equal
            });
            if !duplicate {
                out.push(dist.provided_record(name, provided_version));
            }
            break;
        }
    }
    out
}

fn host_compatible(dist: &DistInfo, cfg: &Config) -> bool {
    let arch_ok = dist.arch() == host::UNIVERSAL || dist.arch() == cfg.arch;
    let ty = dist.dist_type();
    let type_ok = ty == host::SOURCE || ty == host::ALL || ty == cfg.dist_type;
    arch_ok && type_ok
}

enum Admission {
    /// An equal dist is already selected; nothing to add.
    Present,
    /// Consistent with every selected dist.
    New,
    /// Inconsistent with a selected dist.
    Blocked(String),
}

/// Consistency checks between a candidate and the already-selected set.
fn admit(selected: &[DistInfo], candidate: &DistInfo, cfg: &Config) -> Admission {
    for prior in selected {
        if prior.name == candidate.name {
            return if version::equals(&prior.version, &candidate.version) {
                Admission::Present
            } else {
                Admission::Blocked(format!(
                    "{} blocked by selected {}",
                    candidate.id(),
                    prior.id()
                ))
            };
        }
    }
    for prior in selected {
        for entry in prior.depends_for(cfg) {
            let Ok(dep) = NameConstraint::parse(&entry) else {
                continue;
            };
            if dep.name == candidate.name && !dep.admits(&candidate.version) {
                return Admission::Blocked(format!(
                    "{} blocked by dependency `{dep}` of {}",
                    candidate.id(),
                    prior.id()
                ));
            }
        }
        for entry in prior.conflicts_for(cfg) {
            let Ok(conflict) = NameConstraint::parse(&entry) else {
                continue;
            };
            if conflict.name == candidate.name && conflict.admits(&candidate.version) {
                return Admission::Blocked(format!(
                    "{} conflicts with {}",
                    prior.id(),
                    candidate.id()
                ));
            }
        }
        for entry in candidate.conflicts_for(cfg) {
            let Ok(conflict) = NameConstraint::parse(&entry) else {
                continue;
            };
            if conflict.name == prior.name && conflict.admits(&prior.version) {
                return Admission::Blocked(format!(
                    "{} conflicts with {}",
                    candidate.id(),
                    prior.id()
                ));
            }
        }
    }
    Admission::New
}
