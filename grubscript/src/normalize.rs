use std::fmt::Debug;

use log::{trace, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use strum_macros::{EnumIter, IntoStaticStr};

use crate::{
    block::{BlockState, HeaderBlock},
    constants::{FIRMWARE_SETUP_BLOCK, PLACEHOLDER_ROOT_LINE},
    error::CheckError,
    script::ConfigScript,
};

// `hd0,gpt1` style device location, with any white space in front of it.
static LOCATION_HINT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r" *hd[0-9]+,gpt[0-9]+").expect("valid location hint pattern"));

static SEARCH_COMMAND: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bsearch\b").expect("valid search pattern"));

// `--hint`, `--hint-bios=...`, `--hint-efi=...` and so on.
static SEARCH_HINT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r" --hint[^ ]*").expect("valid search hint pattern"));

/// What a [`NormalizationRule`] does to one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleOutcome {
    Unchanged,
    Rewritten(String),
    Dropped,
}

/// A known, accepted difference between offline and runtime generated
/// scripts, expressed as a rewrite of a single line.
pub trait NormalizationRule: Debug + Send + Sync {
    fn name(&self) -> &'static str;

    fn apply(&self, line: &str) -> RuleOutcome;
}

fn rewritten(original: &str, replaced: String) -> RuleOutcome {
    if replaced == original {
        RuleOutcome::Unchanged
    } else {
        RuleOutcome::Rewritten(replaced)
    }
}

/// Removes `hd<N>,gpt<N>` device locations. Offline generation looks
/// filesystems up by UUID and never writes them.
#[derive(Debug)]
pub struct StripLocationHints;

impl NormalizationRule for StripLocationHints {
    fn name(&self) -> &'static str {
        "strip-location-hints"
    }

    fn apply(&self, line: &str) -> RuleOutcome {
        rewritten(line, LOCATION_HINT.replace_all(line, "").into_owned())
    }
}

/// Removes `--hint*` arguments from `search` commands, they depend on the
/// disks of the generating host.
#[derive(Debug)]
pub struct StripSearchHints;

impl NormalizationRule for StripSearchHints {
    fn name(&self) -> &'static str {
        "strip-search-hints"
    }

    fn apply(&self, line: &str) -> RuleOutcome {
        if !SEARCH_COMMAND.is_match(line) {
            return RuleOutcome::Unchanged;
        }
        rewritten(line, SEARCH_HINT.replace_all(line, "").into_owned())
    }
}

/// Drops the placeholder `root` assignment that only runtime generation
/// emits.
#[derive(Debug)]
pub struct DropPlaceholderRoot {
    line: String,
}

impl Default for DropPlaceholderRoot {
    fn default() -> Self {
        Self {
            line: PLACEHOLDER_ROOT_LINE.into(),
        }
    }
}

impl NormalizationRule for DropPlaceholderRoot {
    fn name(&self) -> &'static str {
        "drop-placeholder-root"
    }

    fn apply(&self, line: &str) -> RuleOutcome {
        if line == self.line {
            RuleOutcome::Dropped
        } else {
            RuleOutcome::Unchanged
        }
    }
}

/// Named sets of rules for the scripts the update agent generates.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, IntoStaticStr, EnumIter,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum NormalizationProfile {
    /// The stub `grub.cfg` on the EFI system partition.
    Efi,

    /// The main `grub.cfg` and the per-partition environment script.
    Main,

    /// Every known difference.
    #[default]
    Full,
}

/// Applies an ordered list of rules to every line of a script. Lines inside
/// the pass-through block are excluded from comparison; its marker lines are
/// kept verbatim.
#[derive(Debug)]
pub struct Normalizer {
    passthrough: Option<HeaderBlock>,
    rules: Vec<Box<dyn NormalizationRule>>,
}

impl Normalizer {
    pub fn new(passthrough: Option<HeaderBlock>, rules: Vec<Box<dyn NormalizationRule>>) -> Self {
        Self { passthrough, rules }
    }

    pub fn for_profile(profile: NormalizationProfile) -> Self {
        let firmware_block = || Some(HeaderBlock::grub_d(FIRMWARE_SETUP_BLOCK));
        match profile {
            NormalizationProfile::Efi => Self::new(None, vec![Box::new(StripLocationHints)]),
            NormalizationProfile::Main => Self::new(
                firmware_block(),
                vec![
                    Box::new(DropPlaceholderRoot::default()),
                    Box::new(StripSearchHints),
                ],
            ),
            // The placeholder must be dropped before location hints would
            // turn it into `set root=''`.
            NormalizationProfile::Full => Self::new(
                firmware_block(),
                vec![
                    Box::new(DropPlaceholderRoot::default()),
                    Box::new(StripSearchHints),
                    Box::new(StripLocationHints),
                ],
            ),
        }
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|rule| rule.name()).collect()
    }

    /// Apply the rules to a single line outside of the pass-through block.
    /// Returns `None` if the line is dropped.
    ///
    /// After every rewrite the rules start over from the first one, and the
    /// line is done once no rule changes it. A rewrite can expose a new match
    /// for an earlier rule, or join the text around a removed match into a
    /// new one.
    pub fn normalize_line(&self, line: &str) -> Option<String> {
        let mut current = line.to_owned();
        // The built-in rules only ever shorten the line, so they never reach
        // this bound.
        'rewrites: for _ in 0..=line.len() {
            for rule in &self.rules {
                match rule.apply(&current) {
                    RuleOutcome::Unchanged => (),
                    RuleOutcome::Rewritten(new) => {
                        trace!("[{}] '{current}' -> '{new}'", rule.name());
                        current = new;
                        continue 'rewrites;
                    }
                    RuleOutcome::Dropped => {
                        trace!("[{}] dropped '{current}'", rule.name());
                        return None;
                    }
                }
            }
            return Some(current);
        }

        warn!("Normalization of '{line}' did not settle, using '{current}'");
        Some(current)
    }

    /// Produce a new, normalized script. `script` is left untouched.
    pub fn normalize(&self, script: &ConfigScript) -> Result<ConfigScript, CheckError> {
        let mut state = BlockState::Normal;
        let mut lines = Vec::with_capacity(script.lines().len());

        for (line_number, line) in script.numbered_lines() {
            let Some(block) = &self.passthrough else {
                lines.extend(self.normalize_line(line));
                continue;
            };

            let next = state.step(block, line_number, line);
            match (state.is_inside(), next.is_inside()) {
                // Begin and end markers
                (false, true) | (true, false) => lines.push(line.to_owned()),
                (true, true) => trace!(
                    "{}:{line_number} skipped inside block '{}'",
                    script.name(),
                    block.name()
                ),
                (false, false) => lines.extend(self.normalize_line(line)),
            }
            state = next;
        }

        if let (Some(block), Some(line_number)) = (&self.passthrough, state.open_since()) {
            return Err(CheckError::UnterminatedBlock {
                script: script.name().into(),
                block: block.name().into(),
                line_number,
            });
        }

        Ok(ConfigScript::from_lines(script.name(), lines))
    }
}

impl From<NormalizationProfile> for Normalizer {
    fn from(profile: NormalizationProfile) -> Self {
        Self::for_profile(profile)
    }
}
