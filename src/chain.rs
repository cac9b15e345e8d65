//! Chain build group construction.
//!
//! A chain build is an ordered sequence of build groups: each group must
//! finish before the next starts, members of a group build in parallel.
//! The command line expresses groups as runs of package names split by a
//! separator token, and the submitting package always joins the final
//! group.

use crate::vcs::{source_url, Vcs};

/// Errors from chain construction.
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("{0} cannot be chain built with itself")]
    SelfReference(String),

    #[error("could not resolve {component}: {reason}")]
    ComponentResolution { component: String, reason: String },
}

/// Split an ordered token list into build groups.
///
/// Runs of non-separator tokens form groups in their original order, and
/// interior empty groups (separator directly after separator) are dropped.
/// The submitter itself is appended to the trailing run; when the list ends
/// with a separator that run is empty, so the submitter gets a group of its
/// own.
pub fn build_groups(
    tokens: &[String],
    separator: &str,
    self_name: &str,
) -> Result<Vec<Vec<String>>, ChainError> {
    if tokens.iter().any(|t| t == self_name) {
        return Err(ChainError::SelfReference(self_name.to_string()));
    }

    let mut groups: Vec<Vec<String>> = Vec::new();
    let mut current: Vec<String> = Vec::new();
    for token in tokens {
        if token == separator {
            if !current.is_empty() {
                groups.push(std::mem::take(&mut current));
            }
        } else {
            current.push(token.clone());
        }
    }
    current.push(self_name.to_string());
    groups.push(current);
    Ok(groups)
}

/// Resolve every group member to a concrete source reference.
///
/// Components are resolved to the latest published commit of their
/// development ref; the submitter's own entry uses the already-validated
/// local source instead. Any failure aborts the whole chain; a partial
/// chain is never submitted.
pub fn resolve_groups(
    groups: &[Vec<String>],
    self_name: &str,
    self_source: &str,
    vcs: &dyn Vcs,
    anongit_url: &str,
) -> Result<Vec<Vec<String>>, ChainError> {
    groups
        .iter()
        .map(|group| {
            group
                .iter()
                .map(|component| {
                    if component == self_name {
                        return Ok(self_source.to_string());
                    }
                    let commit = vcs.latest_commit(component, "master").map_err(|e| {
                        ChainError::ComponentResolution {
                            component: component.clone(),
                            reason: e.to_string(),
                        }
                    })?;
                    Ok(source_url(anongit_url, component, &commit))
                })
                .collect()
        })
        .collect()
}
