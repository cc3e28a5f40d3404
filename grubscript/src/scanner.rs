use log::{debug, trace};
use regex::Regex;
use serde::{Deserialize, Serialize};
use strum_macros::IntoStaticStr;

use crate::{
    block::{BlockState, HeaderBlock},
    constants::{
        ALLOWED_ROOT_PATTERN, EXEMPT_HEADER_BLOCK, REQUIRED_MARKER, ROOT_ASSIGNMENT_PATTERN,
    },
    error::CheckError,
    script::ConfigScript,
};

/// What to do when the exempt block is still open at the end of a script.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnterminatedBlockPolicy {
    /// Report the script as invalid.
    #[default]
    Fail,

    /// Treat the rest of the script as exempt.
    Ignore,
}

/// Configurable parts of the root assignment scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct ScanRules {
    /// Lines matching this pattern may assign `root`.
    pub allowed_pattern: String,

    /// Name of the `/etc/grub.d` block inside which `root` may be assigned.
    pub exempt_block: String,

    /// Substring that must appear somewhere in the script.
    pub required_marker: String,

    pub unterminated_block: UnterminatedBlockPolicy,
}

impl Default for ScanRules {
    fn default() -> Self {
        Self {
            allowed_pattern: ALLOWED_ROOT_PATTERN.into(),
            exempt_block: EXEMPT_HEADER_BLOCK.into(),
            required_marker: REQUIRED_MARKER.into(),
            unterminated_block: UnterminatedBlockPolicy::Fail,
        }
    }
}

/// Classification of a single line, in matcher priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoStaticStr)]
#[strum(serialize_all = "kebab-case")]
pub enum LineClass {
    Allowed,
    BlockBegin,
    BlockEnd,
    RootAssignment,
    MarkerHit,
    Plain,
}

#[derive(Debug)]
enum Matcher {
    Pattern(Regex),
    Begin(HeaderBlock),
    End(HeaderBlock),
    Contains(String),
}

impl Matcher {
    fn matches(&self, line: &str) -> bool {
        match self {
            Self::Pattern(re) => re.is_match(line),
            Self::Begin(block) => block.is_begin(line),
            Self::End(block) => block.is_end(line),
            Self::Contains(needle) => line.contains(needle.as_str()),
        }
    }
}

/// Result of scanning one script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResult {
    pub script: String,
    pub outcome: ScanOutcome,
    pub marker_found: bool,
    pub lines_scanned: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "kebab-case")]
pub enum ScanOutcome {
    Passed,
    Violation { line_number: usize, line: String },
    MissingMarker { marker: String },
    UnterminatedBlock { block: String, line_number: usize },
}

impl ScanResult {
    pub fn passed(&self) -> bool {
        self.outcome == ScanOutcome::Passed
    }

    /// Turn a failed scan into the matching [`CheckError`].
    pub fn check(&self) -> Result<(), CheckError> {
        let script = self.script.clone();
        match &self.outcome {
            ScanOutcome::Passed => Ok(()),
            ScanOutcome::Violation { line_number, line } => Err(CheckError::RootAssignment {
                script,
                line_number: *line_number,
                line: line.clone(),
            }),
            ScanOutcome::MissingMarker { marker } => Err(CheckError::MissingMarker {
                script,
                marker: marker.clone(),
            }),
            ScanOutcome::UnterminatedBlock { block, line_number } => {
                Err(CheckError::UnterminatedBlock {
                    script,
                    block: block.clone(),
                    line_number: *line_number,
                })
            }
        }
    }
}

/// Scans scripts for assignments of the `root` variable that the update
/// agent does not control.
#[derive(Debug)]
pub struct Scanner {
    matchers: Vec<(LineClass, Matcher)>,
    exempt: HeaderBlock,
    marker: String,
    policy: UnterminatedBlockPolicy,
}

impl Scanner {
    pub fn new(rules: &ScanRules) -> Result<Self, CheckError> {
        let exempt = HeaderBlock::grub_d(&rules.exempt_block);
        let matchers = vec![
            (
                LineClass::Allowed,
                Matcher::Pattern(compile(&rules.allowed_pattern)?),
            ),
            (LineClass::BlockBegin, Matcher::Begin(exempt.clone())),
            (LineClass::BlockEnd, Matcher::End(exempt.clone())),
            (
                LineClass::RootAssignment,
                Matcher::Pattern(compile(ROOT_ASSIGNMENT_PATTERN)?),
            ),
            (
                LineClass::MarkerHit,
                Matcher::Contains(rules.required_marker.clone()),
            ),
        ];

        Ok(Self {
            matchers,
            exempt,
            marker: rules.required_marker.clone(),
            policy: rules.unterminated_block,
        })
    }

    /// Classify a line with the first matching matcher.
    pub fn classify(&self, line: &str) -> LineClass {
        self.matchers
            .iter()
            .find(|(_, matcher)| matcher.matches(line))
            .map(|(class, _)| *class)
            .unwrap_or(LineClass::Plain)
    }

    /// Scan `script`, stopping at the first disallowed root assignment.
    pub fn scan(&self, script: &ConfigScript) -> ScanResult {
        let mut state = BlockState::Normal;
        let mut marker_found = false;
        let mut lines_scanned = 0;

        for (line_number, line) in script.numbered_lines() {
            lines_scanned = line_number;
            let class = self.classify(line);
            trace!(
                "{}:{line_number} [{}] {line}",
                script.name(),
                <&str>::from(class)
            );

            match class {
                LineClass::Allowed => continue,
                LineClass::BlockBegin | LineClass::BlockEnd => {
                    state = state.step(&self.exempt, line_number, line);
                }
                LineClass::RootAssignment if !state.is_inside() => {
                    debug!(
                        "Unexpected root assignment in '{}' on line {line_number}",
                        script.name()
                    );
                    return ScanResult {
                        script: script.name().into(),
                        outcome: ScanOutcome::Violation {
                            line_number,
                            line: line.into(),
                        },
                        marker_found,
                        lines_scanned,
                    };
                }
                LineClass::RootAssignment => {
                    trace!(
                        "Root assignment inside block '{}' is exempt",
                        self.exempt.name()
                    );
                    marker_found |= line.contains(self.marker.as_str());
                }
                LineClass::MarkerHit => marker_found = true,
                LineClass::Plain => (),
            }
        }

        let outcome = match (state.open_since(), self.policy) {
            (Some(line_number), UnterminatedBlockPolicy::Fail) => {
                ScanOutcome::UnterminatedBlock {
                    block: self.exempt.name().into(),
                    line_number,
                }
            }
            _ if !marker_found => ScanOutcome::MissingMarker {
                marker: self.marker.clone(),
            },
            _ => ScanOutcome::Passed,
        };

        ScanResult {
            script: script.name().into(),
            outcome,
            marker_found,
            lines_scanned,
        }
    }
}

fn compile(pattern: &str) -> Result<Regex, CheckError> {
    Regex::new(pattern).map_err(|source| CheckError::InvalidPattern {
        pattern: pattern.into(),
        source,
    })
}
