use crate::config::AnalysisConfig;
use crate::domain::services::pump_detector::PumpSignal;
use std::collections::HashMap;
use std::collections::HashSet;

/// Debounce and concurrency control for deep analysis.
///
/// A symbol lives in at most one place at a time: the debounce queue or the
/// active set. Completion always removes it from the active set, success or
/// not, so a crashed analysis can never wedge a slot.
#[derive(Debug)]
pub struct AnalysisScheduler {
    config: AnalysisConfig,
    queued: HashMap<String, PendingAnalysis>,
    active: HashSet<String>,
    last_started_ms: HashMap<String, i64>,
}

#[derive(Debug)]
struct PendingAnalysis {
    signal: PumpSignal,
    ready_at_ms: i64,
}

impl AnalysisScheduler {
    pub fn new(config: AnalysisConfig) -> Self {
        AnalysisScheduler {
            config,
            queued: HashMap::new(),
            active: HashSet::new(),
            last_started_ms: HashMap::new(),
        }
    }

    /// Queue a candidate for analysis after the debounce window. Returns
    /// false when the symbol is already queued, already running, the queue
    /// is at capacity, or the symbol was analyzed too recently.
    pub fn enqueue(&mut self, signal: PumpSignal, now_ms: i64) -> bool {
        let symbol = &signal.symbol;
        if self.queued.contains_key(symbol) || self.active.contains(symbol) {
            return false;
        }
        if self.queued.len() + self.active.len() >= self.config.max_concurrent {
            return false;
        }
        if let Some(&last) = self.last_started_ms.get(symbol) {
            if now_ms - last < self.config.min_reanalysis_interval_ms {
                return false;
            }
        }
        self.queued.insert(
            symbol.clone(),
            PendingAnalysis {
                ready_at_ms: now_ms + self.config.queue_debounce_ms as i64,
                signal,
            },
        );
        true
    }

    /// Candidates whose debounce has elapsed, up to the free concurrency
    /// slots. Each returned symbol is moved into the active set.
    pub fn take_due(&mut self, now_ms: i64) -> Vec<PumpSignal> {
        let mut due = Vec::new();
        if self.active.len() >= self.config.max_concurrent {
            return due;
        }
        let mut ready: Vec<String> = self
            .queued
            .iter()
            .filter(|(_, pending)| pending.ready_at_ms <= now_ms)
            .map(|(symbol, _)| symbol.clone())
            .collect();
        // Deterministic dispatch order under contention.
        ready.sort();
        for symbol in ready {
            if self.active.len() >= self.config.max_concurrent {
                break;
            }
            if let Some(pending) = self.queued.remove(&symbol) {
                self.active.insert(symbol.clone());
                self.last_started_ms.insert(symbol, now_ms);
                due.push(pending.signal);
            }
        }
        due
    }

    /// Release the symbol's analysis slot. Called on every completion path.
    pub fn finish(&mut self, symbol: &str) {
        self.active.remove(symbol);
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }
}
