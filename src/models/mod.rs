//! Model identifiers, priority scoring and model/credential selection
//!
//! The selector is the failover core: it ranks candidate models, probes them
//! under each credential slot and keeps track of exhausted pairs.

pub mod catalog;
pub mod exhaustion;
pub mod pair;
pub mod scoring;
pub mod selector;

pub use exhaustion::ExhaustionTable;
pub use pair::{Credential, CredentialIndex, ExclusionSet, ModelId, Pair};
pub use selector::{ModelSelector, SelectorSettings, SelectorSnapshot, SelectorStatus};
