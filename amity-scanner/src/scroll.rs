use crate::driver::PageDriver;
use crate::error::Result;
use crate::extract::RecordExtractor;
use crate::record::{CandidateRecord, RecordSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Called once for every record the first time it is seen
pub type RecordCallback = Arc<dyn Fn(&CandidateRecord) + Send + Sync>;
/// Called after every cycle with (cycle number, records collected so far)
pub type CycleCallback = Arc<dyn Fn(usize, usize) + Send + Sync>;

/// Limits for a scroll collection
#[derive(Debug, Clone)]
pub struct ScrollOptions {
    /// Hard ceiling on the number of cycles
    pub max_iterations: usize,
    /// Consecutive cycles without new records before the listing counts as complete
    pub stable_rounds: usize,
    /// Stop once this many records are collected (0 = no target)
    pub target_count: usize,
    /// Pause after each scroll while the page renders
    pub idle_wait: Duration,
    /// Checked at the top of every cycle
    pub deadline: Option<Instant>,
}

impl Default for ScrollOptions {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            stable_rounds: 3,
            target_count: 0,
            idle_wait: Duration::from_millis(1500),
            deadline: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// No new records for `stable_rounds` consecutive cycles
    Stabilized,
    TargetReached,
    IterationLimit,
    DeadlineExpired,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::Stabilized => "stabilized",
            StopReason::TargetReached => "target reached",
            StopReason::IterationLimit => "iteration limit",
            StopReason::DeadlineExpired => "deadline expired",
        }
    }
}

/// Outcome of a scroll collection
#[derive(Debug, Clone)]
pub struct Collection {
    pub records: RecordSet,
    pub iterations: usize,
    pub failed_cycles: usize,
    pub stop_reason: StopReason,
}

/// Drives a page through scroll/extract cycles until the listing stops growing.
pub struct ScrollController {
    options: ScrollOptions,
    record_callback: Option<RecordCallback>,
    cycle_callback: Option<CycleCallback>,
}

impl ScrollController {
    pub fn new(options: ScrollOptions) -> Self {
        Self {
            options,
            record_callback: None,
            cycle_callback: None,
        }
    }

    pub fn with_record_callback(mut self, callback: RecordCallback) -> Self {
        self.record_callback = Some(callback);
        self
    }

    pub fn with_cycle_callback(mut self, callback: CycleCallback) -> Self {
        self.cycle_callback = Some(callback);
        self
    }

    /// Collects records until the listing stabilizes, the target count is
    /// reached, the iteration ceiling is hit or the deadline passes.
    ///
    /// A failing cycle is logged and counted as a cycle without new records;
    /// records gathered by earlier cycles are always kept.
    pub async fn collect<D, E>(&self, driver: &mut D, extractor: &E) -> Collection
    where
        D: PageDriver,
        E: RecordExtractor + ?Sized,
    {
        let ScrollOptions {
            max_iterations,
            stable_rounds,
            target_count,
            idle_wait,
            deadline,
        } = self.options.clone();
        let stable_rounds = stable_rounds.max(1);

        let mut records = RecordSet::new();
        let mut iterations = 0;
        let mut failed_cycles = 0;
        let mut idle_rounds = 0;

        let stop_reason = loop {
            if iterations >= max_iterations {
                break StopReason::IterationLimit;
            }
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                break StopReason::DeadlineExpired;
            }
            iterations += 1;

            let budget = if target_count > 0 {
                target_count.saturating_sub(records.len())
            } else {
                usize::MAX
            };
            let added = match self.run_cycle(driver, extractor, &mut records, budget).await {
                Ok(added) => added,
                Err(e) => {
                    warn!("Extraction cycle {} failed: {}", iterations, e);
                    failed_cycles += 1;
                    0
                }
            };
            debug!(
                "Cycle {}: {} new, {} total",
                iterations,
                added,
                records.len()
            );

            if let Some(ref callback) = self.cycle_callback {
                callback(iterations, records.len());
            }

            if target_count > 0 && records.len() >= target_count {
                break StopReason::TargetReached;
            }

            if added == 0 {
                idle_rounds += 1;
                if idle_rounds >= stable_rounds {
                    break StopReason::Stabilized;
                }
            } else {
                idle_rounds = 0;
            }

            if let Err(e) = driver.scroll_to_end().await {
                warn!("Scroll failed after cycle {}: {}", iterations, e);
            }
            if !idle_wait.is_zero() {
                tokio::time::sleep(idle_wait).await;
            }
        };

        info!(
            "Collected {} records in {} cycles ({})",
            records.len(),
            iterations,
            stop_reason.as_str()
        );

        Collection {
            records,
            iterations,
            failed_cycles,
            stop_reason,
        }
    }

    async fn run_cycle<D, E>(
        &self,
        driver: &mut D,
        extractor: &E,
        records: &mut RecordSet,
        budget: usize,
    ) -> Result<usize>
    where
        D: PageDriver,
        E: RecordExtractor + ?Sized,
    {
        let page = driver.rendered_page().await?;
        let candidates = extractor.extract(&page)?;
        let new_records = records.extend_new_up_to(candidates, budget);

        if let Some(ref callback) = self.record_callback {
            for record in &new_records {
                callback(record);
            }
        }

        Ok(new_records.len())
    }
}

impl Default for ScrollController {
    fn default() -> Self {
        Self::new(ScrollOptions::default())
    }
}
