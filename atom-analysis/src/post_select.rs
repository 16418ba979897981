//! Shot post-selection on the loading pattern.
//!
//! Selection never removes shots: it produces a per-shot mask, and masked
//! shots are later marked excluded so every variation keeps its
//! repetitions in place.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{AnalysisError, Result};

/// Which loading patterns a shot must show to be kept
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssemblyCondition {
    /// At least `n` sites loaded
    AtLeast(usize),
    /// Exactly `n` sites loaded
    Exactly(usize),
    /// Every listed site (by index into the site list) loaded
    Sites(Vec<usize>),
}

impl FromStr for AssemblyCondition {
    type Err = String;

    /// Parse `at_least:N`, `exactly:N` or `sites:i,j,...`
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (kind, value) = s
            .split_once(':')
            .ok_or_else(|| format!("expected 'kind:value', got '{s}'"))?;
        let number = |v: &str| {
            v.trim()
                .parse::<usize>()
                .map_err(|_| format!("invalid number '{v}'"))
        };
        match kind.trim() {
            "at_least" => Ok(AssemblyCondition::AtLeast(number(value)?)),
            "exactly" => Ok(AssemblyCondition::Exactly(number(value)?)),
            "sites" => Ok(AssemblyCondition::Sites(
                value.split(',').map(number).collect::<std::result::Result<_, _>>()?,
            )),
            other => Err(format!("unknown post-selection condition '{other}'")),
        }
    }
}

fn longest_run(loaded: impl Iterator<Item = bool>) -> usize {
    loaded
        .fold((0, 0), |(best, current), atom| {
            let current = if atom { current + 1 } else { 0 };
            (best.max(current), current)
        })
        .0
}

/// Mask of shots whose load picture satisfies `condition`.
///
/// # Arguments
/// * `load_atoms` - Atom states per site, each with one entry per shot
/// * `condition` - Required loading pattern
/// * `connected` - For counted conditions, require the loaded sites to
///   include a run of that many neighbours in site-list order
pub fn post_select(
    load_atoms: &[Vec<bool>],
    condition: &AssemblyCondition,
    connected: bool,
) -> Result<Vec<bool>> {
    let Some(first) = load_atoms.first() else {
        return Err(AnalysisError::NoSites);
    };
    let shots = first.len();
    if let Some(site) = load_atoms.iter().find(|s| s.len() != shots) {
        return Err(AnalysisError::SiteCountMismatch {
            first: shots,
            second: site.len(),
        });
    }
    if let AssemblyCondition::Sites(required) = condition {
        if let Some(&bad) = required.iter().find(|&&i| i >= load_atoms.len()) {
            return Err(AnalysisError::InvalidOption(format!(
                "post-selection site {bad} is not one of the {} sites",
                load_atoms.len()
            )));
        }
    }

    let mask: Vec<bool> = (0..shots)
        .map(|shot| {
            let loaded = || load_atoms.iter().map(move |site| site[shot]);
            let count = loaded().filter(|&a| a).count();
            match condition {
                AssemblyCondition::AtLeast(n) if connected => longest_run(loaded()) >= *n,
                AssemblyCondition::AtLeast(n) => count >= *n,
                AssemblyCondition::Exactly(n) if connected => {
                    count == *n && longest_run(loaded()) == *n
                }
                AssemblyCondition::Exactly(n) => count == *n,
                AssemblyCondition::Sites(required) => required.iter().all(|&i| load_atoms[i][shot]),
            }
        })
        .collect();

    log::debug!(
        "post-selection {:?} kept {} of {} shots",
        condition,
        mask.iter().filter(|&&k| k).count(),
        shots
    );
    Ok(mask)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Three sites, four shots: loaded counts 3, 2 (sites 0 and 2), 2 (sites 0 and 1), 0
    fn atoms() -> Vec<Vec<bool>> {
        vec![
            vec![true, true, true, false],
            vec![true, false, true, false],
            vec![true, true, false, false],
        ]
    }

    #[test]
    fn test_at_least() {
        let mask = post_select(&atoms(), &AssemblyCondition::AtLeast(2), false).unwrap();
        assert_eq!(mask, vec![true, true, true, false]);
    }

    #[test]
    fn test_exactly() {
        let mask = post_select(&atoms(), &AssemblyCondition::Exactly(2), false).unwrap();
        assert_eq!(mask, vec![false, true, true, false]);
    }

    #[test]
    fn test_connected() {
        let mask = post_select(&atoms(), &AssemblyCondition::Exactly(2), true).unwrap();
        assert_eq!(mask, vec![false, false, true, false]);
        let mask = post_select(&atoms(), &AssemblyCondition::AtLeast(2), true).unwrap();
        assert_eq!(mask, vec![true, false, true, false]);
    }

    #[test]
    fn test_required_sites() {
        let mask = post_select(&atoms(), &AssemblyCondition::Sites(vec![0, 2]), false).unwrap();
        assert_eq!(mask, vec![true, true, false, false]);
        assert!(post_select(&atoms(), &AssemblyCondition::Sites(vec![5]), false).is_err());
    }

    #[test]
    fn test_mismatched_sites() {
        let atoms = vec![vec![true, false], vec![true]];
        assert!(matches!(
            post_select(&atoms, &AssemblyCondition::AtLeast(1), false),
            Err(AnalysisError::SiteCountMismatch { first: 2, second: 1 })
        ));
    }

    #[test]
    fn test_parse() {
        assert_eq!(
            "at_least:5".parse::<AssemblyCondition>().unwrap(),
            AssemblyCondition::AtLeast(5)
        );
        assert_eq!(
            "sites:0,3".parse::<AssemblyCondition>().unwrap(),
            AssemblyCondition::Sites(vec![0, 3])
        );
        assert!("most:3".parse::<AssemblyCondition>().is_err());
    }
}
