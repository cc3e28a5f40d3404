use log::debug;
use serde::Serialize;
use similar::{ChangeTag, TextDiff};

use crate::{error::CheckError, normalize::Normalizer, script::ConfigScript};

/// Lines of unchanged context around each hunk of the rendered diff.
const CONTEXT_RADIUS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChangeKind {
    /// Line only present in the baseline.
    Delete,

    /// Line only present in the candidate.
    Insert,
}

/// One line that differs between the normalized scripts. Line numbers are
/// 1-based and refer to the normalized scripts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LineChange {
    pub kind: ChangeKind,
    pub baseline_line: Option<usize>,
    pub candidate_line: Option<usize>,
    pub text: String,
}

/// Difference between two normalized scripts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffResult {
    pub baseline: String,
    pub candidate: String,
    pub changes: Vec<LineChange>,

    /// Unified diff of the normalized scripts, empty when they match.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub unified: String,
}

impl DiffResult {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Turn a non-empty diff into [`CheckError::Divergence`].
    pub fn check(&self) -> Result<(), CheckError> {
        if self.is_empty() {
            return Ok(());
        }

        Err(CheckError::Divergence {
            baseline: self.baseline.clone(),
            candidate: self.candidate.clone(),
            diff: self.unified.clone(),
        })
    }
}

/// Compare the offline generated `baseline` with the runtime generated
/// `candidate` after normalizing both with `normalizer`.
pub fn diff(
    baseline: &ConfigScript,
    candidate: &ConfigScript,
    normalizer: &Normalizer,
) -> Result<DiffResult, CheckError> {
    let old = normalizer.normalize(baseline)?.render();
    let new = normalizer.normalize(candidate)?.render();

    let text_diff = TextDiff::from_lines(&old, &new);
    let changes: Vec<LineChange> = text_diff
        .iter_all_changes()
        .filter_map(|change| {
            let kind = match change.tag() {
                ChangeTag::Equal => return None,
                ChangeTag::Delete => ChangeKind::Delete,
                ChangeTag::Insert => ChangeKind::Insert,
            };
            Some(LineChange {
                kind,
                baseline_line: change.old_index().map(|i| i + 1),
                candidate_line: change.new_index().map(|i| i + 1),
                text: change.value().trim_end_matches('\n').to_owned(),
            })
        })
        .collect();

    let unified = if changes.is_empty() {
        String::new()
    } else {
        text_diff
            .unified_diff()
            .context_radius(CONTEXT_RADIUS)
            .header(baseline.name(), candidate.name())
            .to_string()
    };

    debug!(
        "Compared '{}' with '{}': {} changed line(s)",
        baseline.name(),
        candidate.name(),
        changes.len()
    );

    Ok(DiffResult {
        baseline: baseline.name().into(),
        candidate: candidate.name().into(),
        changes,
        unified,
    })
}
