use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    path::PathBuf,
};

use clap::{Args, Parser, Subcommand};
use log::LevelFilter;

use grubscript::{NormalizationProfile, ScanRules, UnterminatedBlockPolicy};

use crate::GRUBCHECK_VERSION;

#[derive(Parser, Debug)]
#[clap(version = GRUBCHECK_VERSION)]
pub struct Cli {
    /// Logging verbosity [OFF, ERROR, WARN, INFO, DEBUG, TRACE]
    #[arg(global = true, short, long, default_value_t = LevelFilter::Info)]
    pub verbosity: LevelFilter,

    #[clap(subcommand)]
    pub command: Commands,
}

/// Sets of known differences between offline and runtime generated scripts
#[derive(clap::ValueEnum, Clone, Copy, Debug, Eq, PartialEq)]
pub enum Profile {
    /// Device locations in the EFI stub script
    Efi,
    /// Search hints, the placeholder root, and the firmware setup entry
    Main,
    /// All of the above
    Full,
}

impl From<Profile> for NormalizationProfile {
    fn from(profile: Profile) -> Self {
        match profile {
            Profile::Efi => NormalizationProfile::Efi,
            Profile::Main => NormalizationProfile::Main,
            Profile::Full => NormalizationProfile::Full,
        }
    }
}

/// Overrides of the default scan rules
#[derive(Args, Debug, Default)]
pub struct ScanArgs {
    /// Substring every script must contain
    #[clap(long)]
    pub marker: Option<String>,

    /// grub.d block in which root may be assigned
    #[clap(long)]
    pub exempt_block: Option<String>,

    /// Pattern of root assignments that are always allowed
    #[clap(long)]
    pub allowed_pattern: Option<String>,

    /// Do not fail when the exempt block is never closed
    #[clap(long)]
    pub lenient_blocks: bool,
}

impl ScanArgs {
    pub fn rules(&self) -> ScanRules {
        let defaults = ScanRules::default();
        ScanRules {
            allowed_pattern: self
                .allowed_pattern
                .clone()
                .unwrap_or(defaults.allowed_pattern),
            exempt_block: self.exempt_block.clone().unwrap_or(defaults.exempt_block),
            required_marker: self.marker.clone().unwrap_or(defaults.required_marker),
            unterminated_block: if self.lenient_blocks {
                UnterminatedBlockPolicy::Ignore
            } else {
                UnterminatedBlockPolicy::Fail
            },
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check GRUB scripts for root assignments outside of the update agent's control
    Scan {
        /// Scripts to scan
        #[clap(required = true)]
        files: Vec<PathBuf>,

        #[clap(flatten)]
        rules: ScanArgs,
    },

    /// Compare an offline generated script with a runtime generated one
    Diff {
        /// Offline generated script
        baseline: PathBuf,

        /// Runtime generated script
        candidate: PathBuf,

        /// Known differences to ignore
        #[clap(long, value_enum, default_value_t = Profile::Full)]
        profile: Profile,
    },

    /// Print a script with the known differences removed
    Normalize {
        file: PathBuf,

        /// Known differences to remove
        #[clap(long, value_enum, default_value_t = Profile::Full)]
        profile: Profile,
    },

    /// Run a check plan against disk images and the running system
    Check {
        /// The check plan to run
        #[clap(index = 1, default_value = "/etc/grubcheck/plan.yaml")]
        plan: PathBuf,

        /// Path to save the resulting report
        #[clap(short, long)]
        report: Option<PathBuf>,
    },

    /// Print the default check plan
    Plan {
        /// Disk image whose offline generated scripts should be checked too
        #[clap(long)]
        image: Option<PathBuf>,
    },
}

impl Commands {
    pub fn name(&self) -> &'static str {
        match self {
            Commands::Scan { .. } => "scan",
            Commands::Diff { .. } => "diff",
            Commands::Normalize { .. } => "normalize",
            Commands::Check { .. } => "check",
            Commands::Plan { .. } => "plan",
        }
    }
}

impl Display for Commands {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(f, "{}", self.name())
    }
}
