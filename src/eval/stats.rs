//! Accumulated evaluation counters and their report.

use crate::coord::Coord;
use std::collections::BTreeMap;
use std::fmt::Write;

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        sorted[mid]
    } else {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    }
}

/// Counters and distance samples over evaluated documents.
///
/// Rank outcomes are histogrammed up to a credit cutoff K: a document at
/// rank r <= K lands in the histogram, anything deeper counts as "not in
/// top K". Distance samples stay unordered; mean and median sort a copy on
/// demand. Named side counters ("skipped.no-coordinate" and friends) ride
/// along so the report accounts for every document that entered the
/// evaluator.
#[derive(Debug, Clone)]
pub struct EvalStats {
    credit_rank: usize,
    units: &'static str,
    alt_units: &'static str,
    units_per_alt: f64,
    total: usize,
    correct_at_rank: Vec<usize>,
    not_in_top_k: usize,
    other_stats: BTreeMap<String, usize>,
    error_dists: Vec<f64>,
    degree_errors: Vec<f64>,
    oracle_dists: Vec<f64>,
    oracle_degree_errors: Vec<f64>,
}

impl EvalStats {
    /// Creates empty statistics with explicit display units.
    pub fn new(
        credit_rank: usize,
        units: &'static str,
        alt_units: &'static str,
        units_per_alt: f64,
    ) -> Self {
        assert!(credit_rank >= 1, "credit rank must be at least 1");
        Self {
            credit_rank,
            units,
            alt_units,
            units_per_alt,
            total: 0,
            correct_at_rank: vec![0; credit_rank],
            not_in_top_k: 0,
            other_stats: BTreeMap::new(),
            error_dists: Vec::new(),
            degree_errors: Vec::new(),
            oracle_dists: Vec::new(),
            oracle_degree_errors: Vec::new(),
        }
    }

    /// Creates empty statistics displayed in a coordinate type's units.
    pub fn for_coord<C: Coord>(credit_rank: usize) -> Self {
        Self::new(credit_rank, C::UNITS, C::ALT_UNITS, C::UNITS_PER_ALT)
    }

    /// Folds in one evaluated document.
    pub fn record_result(
        &mut self,
        rank: usize,
        error_dist: f64,
        degree_error: f64,
        oracle_dist: f64,
        oracle_degree_error: f64,
    ) {
        assert!(rank >= 1, "document rank must be 1-based");
        self.total += 1;
        if rank <= self.credit_rank {
            self.correct_at_rank[rank - 1] += 1;
        } else {
            self.not_in_top_k += 1;
        }
        self.error_dists.push(error_dist);
        self.degree_errors.push(degree_error);
        self.oracle_dists.push(oracle_dist);
        self.oracle_degree_errors.push(oracle_degree_error);
    }

    /// Bumps a named side counter.
    pub fn increment_other(&mut self, name: &str) {
        *self.other_stats.entry(name.to_string()).or_insert(0) += 1;
    }

    /// Number of evaluated documents.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Documents whose correct cell ranked first.
    pub fn num_correct(&self) -> usize {
        self.correct_at_rank.first().copied().unwrap_or(0)
    }

    /// Documents whose correct cell ranked past the credit cutoff.
    pub fn not_in_top_k(&self) -> usize {
        self.not_in_top_k
    }

    /// Summed partial credit: a document at rank r within the cutoff K
    /// earns K + 1 - r points.
    pub fn partial_credit(&self) -> usize {
        self.correct_at_rank
            .iter()
            .enumerate()
            .map(|(i, &count)| count * (self.credit_rank - i))
            .sum()
    }

    /// A named side counter's value.
    pub fn other_stat(&self, name: &str) -> usize {
        self.other_stats.get(name).copied().unwrap_or(0)
    }

    /// Mean prediction error distance, 0 when nothing was recorded.
    pub fn mean_error_dist(&self) -> f64 {
        mean(&self.error_dists)
    }

    /// Median prediction error distance, 0 when nothing was recorded.
    pub fn median_error_dist(&self) -> f64 {
        median(&self.error_dists)
    }

    /// Mean oracle distance, 0 when nothing was recorded.
    pub fn mean_oracle_dist(&self) -> f64 {
        mean(&self.oracle_dists)
    }

    fn physical_lines(&self, out: &mut String, label: &str, values: &[f64]) {
        if values.is_empty() {
            return;
        }
        for (stat, value) in [("mean", mean(values)), ("median", median(values))] {
            let _ = writeln!(
                out,
                "  {stat} {label}: {value:.2} {} ({:.2} {})",
                self.units,
                value / self.units_per_alt,
                self.alt_units
            );
        }
    }

    fn degree_lines(&self, out: &mut String, label: &str, values: &[f64]) {
        if values.is_empty() {
            return;
        }
        let _ = writeln!(out, "  mean {label}: {:.4}", mean(values));
        let _ = writeln!(out, "  median {label}: {:.4}", median(values));
    }

    /// Renders the human-readable summary.
    pub fn report(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Results for {} documents:", self.total);
        if self.total > 0 {
            let pct = |n: usize| 100.0 * n as f64 / self.total as f64;
            let _ = writeln!(
                out,
                "  {} ({:.2}%) correct at rank 1",
                self.num_correct(),
                pct(self.num_correct())
            );
            let _ = writeln!(
                out,
                "  {:.2}% correct with partial credit (rank <= {})",
                100.0 * self.partial_credit() as f64 / (self.credit_rank * self.total) as f64,
                self.credit_rank
            );
            let mut cumulative = 0;
            for (i, &count) in self.correct_at_rank.iter().enumerate() {
                cumulative += count;
                if i > 0 {
                    let _ = writeln!(
                        out,
                        "  {} ({:.2}%) correct within rank {}",
                        cumulative,
                        pct(cumulative),
                        i + 1
                    );
                }
            }
            let _ = writeln!(
                out,
                "  {} ({:.2}%) with correct cell not in top {}",
                self.not_in_top_k,
                pct(self.not_in_top_k),
                self.credit_rank
            );
            self.physical_lines(&mut out, "true error distance", &self.error_dists);
            self.physical_lines(&mut out, "oracle true error distance", &self.oracle_dists);
            self.degree_lines(&mut out, "degree error distance", &self.degree_errors);
            self.degree_lines(
                &mut out,
                "oracle degree error distance",
                &self.oracle_degree_errors,
            );
        }
        for (name, count) in &self.other_stats {
            let _ = writeln!(out, "  {name}: {count}");
        }
        out
    }
}
