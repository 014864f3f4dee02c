//! Progress tracking for drain passes.
//!
//! `DrainTracker` counts what happened to each record during a pass and produces both the
//! caller-facing [`SyncOutcome`] and a one-line summary for the logs.

use std::time::{Duration, Instant};

/// Result of a drain pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOutcome {
	pub synced: usize,
	pub failed: usize,
}

/// Service for tracking a single drain pass
#[derive(Debug, Clone)]
pub struct DrainTracker {
	started: Instant,
	/// Pending records at the start of the pass
	pending_at_start: usize,
	/// Records accepted by the ledger in this pass
	submitted: usize,
	/// Records the ledger already had
	duplicates: usize,
	/// Failures that left the record pending
	retryable_failures: usize,
	/// Failures that moved the record to failed
	terminal_failures: usize,
	/// Records that disappeared before they could be processed
	skipped: usize,
}

impl DrainTracker {
	pub fn new(pending_at_start: usize) -> Self {
		Self {
			started: Instant::now(),
			pending_at_start,
			submitted: 0,
			duplicates: 0,
			retryable_failures: 0,
			terminal_failures: 0,
			skipped: 0,
		}
	}

	pub fn record_submitted(&mut self) {
		self.submitted += 1;
	}

	pub fn record_duplicate(&mut self) {
		self.duplicates += 1;
	}

	pub fn record_failure(&mut self, terminal: bool) {
		if terminal {
			self.terminal_failures += 1;
		} else {
			self.retryable_failures += 1;
		}
	}

	pub fn record_skipped(&mut self) {
		self.skipped += 1;
	}

	pub fn outcome(&self) -> SyncOutcome {
		SyncOutcome {
			synced: self.submitted + self.duplicates,
			failed: self.retryable_failures + self.terminal_failures,
		}
	}

	pub fn elapsed(&self) -> Duration {
		self.started.elapsed()
	}

	/// Get a human-readable summary of the pass
	pub fn summary(&self) -> String {
		let outcome = self.outcome();
		format!(
			"Drain of {} pending transfers finished in {:?}: {} synced ({} submitted, {} duplicates), {} failed ({} will retry, {} terminal){}",
			self.pending_at_start,
			self.elapsed(),
			outcome.synced,
			self.submitted,
			self.duplicates,
			outcome.failed,
			self.retryable_failures,
			self.terminal_failures,
			if self.skipped == 0 {
				String::new()
			} else {
				format!(", {} skipped", self.skipped)
			}
		)
	}
}
