//! Per-run crawl state
//!
//! Owned by the orchestrating task of a single crawl run and never shared,
//! so it needs no locking.

use std::collections::{HashSet, VecDeque};
use std::fmt;
use url::Url;

/// Lifecycle of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CrawlStatus {
    /// Not started; no fetch has been dispatched
    Idle,
    /// The only state in which fetches are dispatched
    Running,
    /// Every reachable page was fetched within the budget
    Completed,
    /// The budget ran out while discovered pages were still unfetched
    BudgetExhausted,
    Cancelled,
}

impl CrawlStatus {
    /// Leaves `Idle`; a run whose token already fired never runs
    pub fn begin(self, cancelled: bool) -> Self {
        match self {
            CrawlStatus::Idle if cancelled => CrawlStatus::Cancelled,
            CrawlStatus::Idle => CrawlStatus::Running,
            other => other,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            CrawlStatus::Completed | CrawlStatus::BudgetExhausted | CrawlStatus::Cancelled
        )
    }
}

impl fmt::Display for CrawlStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CrawlStatus::Idle => "idle",
            CrawlStatus::Running => "running",
            CrawlStatus::Completed => "completed",
            CrawlStatus::BudgetExhausted => "budget exhausted",
            CrawlStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Visited set, bounded FIFO frontier and dispatch counter for one run
///
/// A URL enters the visited set when it is first discovered, so it can be
/// queued at most once. The queue never holds more URLs than the budget can
/// still dispatch; links found beyond that are marked visited and counted
/// as overflow. The dispatch counter never exceeds the budget.
#[derive(Debug)]
pub struct CrawlState {
    visited: HashSet<String>,
    queue: VecDeque<Url>,
    overflow: usize,
    dispatched: u64,
    budget: u64,
}

impl CrawlState {
    /// Creates the state with `seed` already visited and queued
    pub fn new(seed: Url, budget: u64) -> Self {
        let mut state = Self {
            visited: HashSet::new(),
            queue: VecDeque::new(),
            overflow: 0,
            dispatched: 0,
            budget,
        };
        state.discover(seed);
        state
    }

    /// Records `url` and queues it if it is new and the budget has room
    ///
    /// Returns whether the URL was queued.
    pub fn discover(&mut self, url: Url) -> bool {
        if !self.visited.insert(url.as_str().to_string()) {
            return false;
        }
        if self.room() == 0 {
            self.overflow += 1;
            return false;
        }
        self.queue.push_back(url);
        true
    }

    /// Takes the next queued URL if the budget allows another fetch
    ///
    /// Returns the URL with its 1-based dispatch sequence number.
    pub fn next_dispatch(&mut self) -> Option<(Url, u64)> {
        if self.is_budget_exhausted() {
            return None;
        }
        let url = self.queue.pop_front()?;
        self.dispatched += 1;
        Some((url, self.dispatched))
    }

    pub fn is_budget_exhausted(&self) -> bool {
        self.dispatched >= self.budget
    }

    /// Queued and not yet dispatched; never more than the unspent budget
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Discovered pages the run will never fetch
    pub fn overflow(&self) -> usize {
        self.overflow
    }

    /// Whether any discovered page is still unfetched
    pub fn has_unfetched(&self) -> bool {
        self.pending() > 0 || self.overflow > 0
    }

    pub fn dispatched(&self) -> u64 {
        self.dispatched
    }

    pub fn visited_count(&self) -> usize {
        self.visited.len()
    }

    fn room(&self) -> usize {
        let unspent = self.budget.saturating_sub(self.dispatched);
        usize::try_from(unspent)
            .unwrap_or(usize::MAX)
            .saturating_sub(self.queue.len())
    }
}
