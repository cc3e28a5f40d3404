pub mod block;
pub mod constants;
pub mod diff;
pub mod error;
pub mod normalize;
pub mod scanner;
pub mod script;

pub use block::{BlockState, HeaderBlock};
pub use diff::{diff, ChangeKind, DiffResult, LineChange};
pub use error::CheckError;
pub use normalize::{NormalizationProfile, NormalizationRule, Normalizer, RuleOutcome};
pub use scanner::{LineClass, ScanOutcome, ScanResult, ScanRules, Scanner, UnterminatedBlockPolicy};
pub use script::ConfigScript;
