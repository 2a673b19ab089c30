//! Statistics bucketed by auxiliary dimensions.

use crate::config::EvalConfig;
use crate::coord::Coord;
use crate::eval::evaluator::DocEvalResult;
use crate::eval::stats::EvalStats;
use once_cell::sync::Lazy;
use std::fmt::Write;

/// Escalating upper bounds for center offsets of two cell widths and more.
static OFFSET_BREAKPOINTS: Lazy<Vec<f64>> =
    Lazy::new(|| (1..=10).map(|i| f64::from(1u32 << i)).collect());

/// Bucket for a center offset expressed in cell widths: quarter-width
/// buckets below two widths, power-of-two ranges beyond. Returns the
/// numeric lower bound (for report ordering) and the label.
fn offset_bucket(frac: f64) -> (f64, String) {
    if frac < 2.0 {
        let lower = (frac / 0.25).floor() * 0.25;
        (lower, format!("[{:.2}..{:.2})", lower, lower + 0.25))
    } else {
        for pair in OFFSET_BREAKPOINTS.windows(2) {
            if frac < pair[1] {
                return (pair[0], format!("[{}..{})", pair[0], pair[1]));
            }
        }
        let last = OFFSET_BREAKPOINTS[OFFSET_BREAKPOINTS.len() - 1];
        (last, format!("[{last}..)"))
    }
}

/// Bucket for the number of training documents in the true cell.
fn doc_count_bucket(num_docs: usize) -> (f64, &'static str) {
    match num_docs {
        0 => (0.0, "0"),
        1..=9 => (1.0, "1-9"),
        10..=99 => (10.0, "10-99"),
        100..=999 => (100.0, "100-999"),
        _ => (1000.0, "1000+"),
    }
}

/// Label-to-statistics mapping with explicit lazy insertion.
///
/// A bucket exists only once a result lands in it; reports order buckets
/// by the numeric lower bound kept alongside each label.
#[derive(Debug, Clone)]
pub struct BucketMap {
    credit_rank: usize,
    units: &'static str,
    alt_units: &'static str,
    units_per_alt: f64,
    buckets: Vec<(f64, String, EvalStats)>,
}

impl BucketMap {
    fn new(
        credit_rank: usize,
        units: &'static str,
        alt_units: &'static str,
        units_per_alt: f64,
    ) -> Self {
        Self {
            credit_rank,
            units,
            alt_units,
            units_per_alt,
            buckets: Vec::new(),
        }
    }

    /// The statistics for `label`, created empty on first use.
    pub fn stats_for(&mut self, lower: f64, label: &str) -> &mut EvalStats {
        if let Some(idx) = self.buckets.iter().position(|(_, l, _)| l == label) {
            return &mut self.buckets[idx].2;
        }
        self.buckets.push((
            lower,
            label.to_string(),
            EvalStats::new(
                self.credit_rank,
                self.units,
                self.alt_units,
                self.units_per_alt,
            ),
        ));
        let last = self.buckets.len() - 1;
        &mut self.buckets[last].2
    }

    /// Number of populated buckets.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// Whether any bucket exists yet.
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Buckets ordered by their lower bound.
    pub fn iter_sorted(&self) -> Vec<(&str, &EvalStats)> {
        let mut ordered: Vec<&(f64, String, EvalStats)> = self.buckets.iter().collect();
        ordered.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());
        ordered
            .into_iter()
            .map(|(_, label, stats)| (label.as_str(), stats))
            .collect()
    }
}

/// Aggregate statistics plus per-bucket breakdowns.
///
/// Results are grouped three ways: by the document's offset from its true
/// cell's center, by its offset from the predicted cell's center (both in
/// cell widths), and by how many training documents the true cell holds.
#[derive(Debug, Clone)]
pub struct GroupedEvalStats {
    aggregate: EvalStats,
    by_true_offset: BucketMap,
    by_pred_offset: BucketMap,
    by_true_cell_docs: BucketMap,
    include_buckets: bool,
}

impl GroupedEvalStats {
    /// Creates empty grouped statistics with explicit display units.
    /// `include_buckets` controls whether [`report`](Self::report) appends
    /// the per-bucket sub-reports.
    pub fn new(
        credit_rank: usize,
        units: &'static str,
        alt_units: &'static str,
        units_per_alt: f64,
        include_buckets: bool,
    ) -> Self {
        Self {
            aggregate: EvalStats::new(credit_rank, units, alt_units, units_per_alt),
            by_true_offset: BucketMap::new(credit_rank, units, alt_units, units_per_alt),
            by_pred_offset: BucketMap::new(credit_rank, units, alt_units, units_per_alt),
            by_true_cell_docs: BucketMap::new(credit_rank, units, alt_units, units_per_alt),
            include_buckets,
        }
    }

    /// Creates empty grouped statistics in a coordinate type's units,
    /// with the configured rank cutoff and bucket reporting.
    pub fn for_coord<C: Coord>(config: &EvalConfig) -> Self {
        Self::new(
            config.credit_rank,
            C::UNITS,
            C::ALT_UNITS,
            C::UNITS_PER_ALT,
            config.report_buckets,
        )
    }

    /// Folds one evaluated document into the aggregate and every bucket
    /// dimension.
    pub fn record<C: Coord>(&mut self, result: &DocEvalResult<C>) {
        let record = |stats: &mut EvalStats| {
            stats.record_result(
                result.rank,
                result.error_dist,
                result.degree_error,
                result.oracle_dist,
                result.oracle_degree_error,
            )
        };
        record(&mut self.aggregate);
        let (lower, label) = offset_bucket(result.true_center_offset);
        record(self.by_true_offset.stats_for(lower, &label));
        let (lower, label) = offset_bucket(result.pred_center_offset);
        record(self.by_pred_offset.stats_for(lower, &label));
        let (lower, label) = doc_count_bucket(result.num_docs_in_true_cell);
        record(self.by_true_cell_docs.stats_for(lower, label));
    }

    /// Counts a skipped document in the aggregate's side counters.
    pub fn record_skip(&mut self, reason: &str) {
        self.aggregate.increment_other(reason);
    }

    /// The ungrouped statistics.
    pub fn aggregate(&self) -> &EvalStats {
        &self.aggregate
    }

    /// Buckets keyed by offset from the true cell center.
    pub fn by_true_offset(&self) -> &BucketMap {
        &self.by_true_offset
    }

    /// Buckets keyed by offset from the predicted cell center.
    pub fn by_pred_offset(&self) -> &BucketMap {
        &self.by_pred_offset
    }

    /// Buckets keyed by the true cell's document count.
    pub fn by_true_cell_docs(&self) -> &BucketMap {
        &self.by_true_cell_docs
    }

    /// Renders the aggregate report, with one sub-report per bucket when
    /// the configuration asked for them.
    pub fn report(&self) -> String {
        let mut out = self.aggregate.report();
        if !self.include_buckets {
            return out;
        }
        for (title, map) in [
            ("distance from true cell center (cell widths)", &self.by_true_offset),
            (
                "distance from predicted cell center (cell widths)",
                &self.by_pred_offset,
            ),
            ("documents in true cell", &self.by_true_cell_docs),
        ] {
            if map.is_empty() {
                continue;
            }
            let _ = writeln!(out, "\nBy {title}:");
            for (label, stats) in map.iter_sorted() {
                let _ = writeln!(out, "{label}:");
                out.push_str(&stats.report());
            }
        }
        out
    }
}
