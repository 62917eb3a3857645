//! pagepatch library crate
//!
//! Recovers the HTML document buried in a generative model's reply and
//! merges it into a managed page file, keeping an auditable report of every
//! decision made along the way. The orchestration layer (prompting, model
//! calls, sessions) lives elsewhere and consumes this crate as a library.

pub mod config;
pub mod engine;
pub mod error;
pub mod extract;
pub mod patch;
pub mod report;
pub mod snapshot;
pub mod util;

pub use config::EngineOptions;
pub use engine::Engine;
pub use error::{ApplyError, ExtractError, PatchError};
pub use extract::{Extractor, HtmlPayload};
pub use patch::{PatchOutcome, PatchStrategy, Patcher};
pub use report::{Report, Step};
pub use snapshot::SnapshotStore;
