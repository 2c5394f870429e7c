//! Public operations over deployments.

pub mod deployed;
pub mod install;
pub mod pack;
pub mod package;
pub mod remove;

use anyhow::{bail, Result};

use crate::types::{DistInfo, NameConstraint};

/// Match installed dists against requirement strings with constraint
/// semantics. Synthetic provided records are not matchable; a name that
/// matches nothing is an error.
pub fn match_installed(deployed: &[DistInfo], names: &[String]) -> Result<Vec<DistInfo>> {
    let mut matched: Vec<DistInfo> = Vec::new();
    for raw in names {
        let requirement = NameConstraint::parse(raw)?;
        let mut hit = false;
        for info in deployed {
            if info.provided.is_some() {
                continue;
            }
            if requirement.name == info.name && requirement.admits(&info.version) {
                if !matched.iter().any(|m| m.id() == info.id()) {
                    matched.push(info.clone());
                }
                hit = true;
            }
        }
        if !hit {
            bail!("no deployed dist matches `{raw}`");
        }
    }
    Ok(matched)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn installed(name: &str, version: &str) -> DistInfo {
        DistInfo {
            name: name.to_string(),
            version: version.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_match_with_constraints() {
        let deployed = vec![
            installed("lua", "5.1.4"),
            installed("md5", "1.0"),
            installed("lua", "5.2.0"),
        ];
        let matched = match_installed(&deployed, &["lua < 5.2".to_string()]).unwrap();
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].id(), "lua-5.1.4");

        let matched = match_installed(&deployed, &["lua".to_string()]).unwrap();
        assert_eq!(matched.len(), 2);
    }

    #[test]
    fn test_unmatched_name_is_an_error() {
        let deployed = vec![installed("lua", "5.1.4")];
        let err = match_installed(&deployed, &["missing".to_string()]).unwrap_err();
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_synthetic_records_are_not_matchable() {
        let provider = installed("bundle", "1.0");
        let synthetic = provider.provided_record("widget", "1.0");
        let deployed = vec![provider, synthetic];
        assert!(match_installed(&deployed, &["widget".to_string()]).is_err());
    }
}
