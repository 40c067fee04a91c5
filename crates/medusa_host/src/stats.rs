//! Solve statistics for batch and benchmark reports.
//!
//! Collects the elapsed sampling time and attempt count of every converged
//! run together with whether its assignment satisfies the formula, and
//! prints summary figures and a time histogram.

use medusa_core::record::SolverRunRecord;

/// Histogram bucket width in microseconds.
const BUCKET_US: u64 = 500;

/// Number of histogram buckets; the last one is open-ended.
const BUCKETS: usize = 20;

/// Accumulated solve statistics.
///
/// Designed to be filled per worker and merged, so parallel benchmark
/// batches never share a tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolveStats {
    pub min_us: u64,
    pub max_us: u64,
    pub sum_us: u64,
    pub count: u64,
    pub attempts: u64,
    pub max_attempts: u32,
    pub satisfied: u64,
    pub buckets: [u64; BUCKETS],
}

impl Default for SolveStats {
    fn default() -> Self {
        Self::new()
    }
}

impl SolveStats {
    /// Creates an empty tracker.
    ///
    /// `min_us` starts at `u64::MAX` so the first record becomes the
    /// minimum.
    pub fn new() -> Self {
        Self {
            min_us: u64::MAX,
            max_us: 0,
            sum_us: 0,
            count: 0,
            attempts: 0,
            max_attempts: 0,
            satisfied: 0,
            buckets: [0; BUCKETS],
        }
    }

    /// Records one converged run.
    ///
    /// # Arguments
    ///
    /// * `record` - The run's persisted record
    /// * `sat` - Whether its decoded assignment satisfies every clause
    pub fn update(&mut self, record: &SolverRunRecord, sat: bool) {
        let us = record.elapsed_us();
        self.min_us = self.min_us.min(us);
        self.max_us = self.max_us.max(us);
        self.sum_us += us;
        self.count += 1;
        self.attempts += record.attempts as u64;
        self.max_attempts = self.max_attempts.max(record.attempts);
        if sat {
            self.satisfied += 1;
        }
        let idx = (us / BUCKET_US).min(BUCKETS as u64 - 1) as usize;
        self.buckets[idx] += 1;
    }

    /// Folds another tracker into this one.
    pub fn merge(mut self, other: SolveStats) -> Self {
        self.min_us = self.min_us.min(other.min_us);
        self.max_us = self.max_us.max(other.max_us);
        self.sum_us += other.sum_us;
        self.count += other.count;
        self.attempts += other.attempts;
        self.max_attempts = self.max_attempts.max(other.max_attempts);
        self.satisfied += other.satisfied;
        for (mine, theirs) in self.buckets.iter_mut().zip(other.buckets) {
            *mine += theirs;
        }
        self
    }

    /// Mean elapsed time in microseconds, 0.0 when empty.
    pub fn avg_us(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum_us as f64 / self.count as f64
        }
    }

    /// Mean retries per run, 0.0 when empty.
    pub fn avg_attempts(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.attempts as f64 / self.count as f64
        }
    }

    pub fn print_report(&self) {
        println!("\nSolve Metrics");
        println!("Runs:      {}", self.count);
        if self.count == 0 {
            return;
        }
        println!(
            "Satisfied: {}/{} ({:.1}%)",
            self.satisfied,
            self.count,
            100.0 * self.satisfied as f64 / self.count as f64
        );
        println!("Min:       {} us", self.min_us);
        println!("Avg:       {:.2} us", self.avg_us());
        println!("Max:       {} us", self.max_us);
        println!(
            "Retries:   {:.2} avg, {} max",
            self.avg_attempts(),
            self.max_attempts
        );

        println!("Distribution ({}us buckets):", BUCKET_US);
        for (i, &count) in self.buckets.iter().enumerate() {
            if count > 0 {
                let open = if i == BUCKETS - 1 { ">" } else { "" };
                let lower = i as u64 * BUCKET_US;
                let upper = lower + BUCKET_US;
                println!("[{:5}-{:5}{} us]: {}", lower, upper, open, count);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(ticks: u32, attempts: u32) -> SolverRunRecord {
        SolverRunRecord {
            outputs: [0; 2],
            time_ticks: ticks,
            attempts,
        }
    }

    #[test]
    fn tracks_extremes_and_buckets() {
        let mut s = SolveStats::new();
        s.update(&record(114_560, 1), true);
        s.update(&record(11_456, 3), false);
        assert_eq!(s.min_us, 100);
        assert_eq!(s.max_us, 1000);
        assert_eq!(s.buckets[0], 1);
        assert_eq!(s.buckets[2], 1);
        assert_eq!(s.satisfied, 1);
        assert_eq!(s.avg_attempts(), 2.0);
    }

    #[test]
    fn merge_matches_sequential_updates() {
        let records = [record(1_000, 1), record(50_000, 2), record(2_000_000, 7)];
        let mut all = SolveStats::new();
        for r in &records {
            all.update(r, true);
        }
        let mut a = SolveStats::new();
        a.update(&records[0], true);
        let mut b = SolveStats::new();
        b.update(&records[1], true);
        b.update(&records[2], true);
        assert_eq!(a.merge(b), all);
    }
}
