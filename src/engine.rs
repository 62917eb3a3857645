//! One-call facade wiring extraction, patching and reporting together
//!
//! The engine is stateless across calls: every invocation gets a fresh
//! report, and the report travels back to the caller as a value next to the
//! outcome, so concurrent invocations never cross-talk.

use crate::config::EngineOptions;
use crate::error::ApplyError;
use crate::extract::Extractor;
use crate::patch::{PatchOutcome, Patcher};
use crate::report::Report;
use std::path::Path;
use std::time::Instant;

pub struct Engine {
    options: EngineOptions,
    extractor: Extractor,
    patcher: Patcher,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineOptions::default())
    }
}

impl Engine {
    pub fn new(options: EngineOptions) -> Self {
        let patcher = Patcher::new(options.lock_target);
        Self {
            options,
            extractor: Extractor::new(),
            patcher,
        }
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn extractor(&self) -> &Extractor {
        &self.extractor
    }

    /// Recover the HTML document from `raw` and merge it into `target`.
    ///
    /// The report is finalized and persisted on every path, success or
    /// failure; losing the artifact never changes the outcome.
    pub fn apply_response(
        &self,
        raw: &str,
        target: &Path,
    ) -> (Result<PatchOutcome, ApplyError>, Report) {
        let mut report = Report::begin(target, raw.chars().count(), self.options.reporting_enabled);
        report.add_step("initialize", true, format!("target: {}", target.display()));

        let extract_started = Instant::now();
        let extracted = self.extractor.extract(raw, &mut report);
        report.record_extraction_duration(extract_started.elapsed().as_secs_f64());

        let payload = match extracted {
            Ok(payload) => payload,
            Err(err) => {
                report.finalize(false, Some(err.to_string()));
                self.persist_report(&report);
                return (Err(ApplyError::Extract(err)), report);
            }
        };

        match self.patcher.apply(&payload, target, &mut report) {
            Ok(outcome) => {
                report.finalize(true, None);
                self.persist_report(&report);
                (Ok(outcome), report)
            }
            Err(err) => {
                report.finalize(false, Some(err.to_string()));
                self.persist_report(&report);
                (Err(ApplyError::Patch(err)), report)
            }
        }
    }

    fn persist_report(&self, report: &Report) {
        if let Err(err) = report.persist(&self.options.report_dir) {
            eprintln!("  Warning: failed to persist apply report: {}", err);
        }
    }
}
