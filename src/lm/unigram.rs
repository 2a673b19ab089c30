//! Unigram word distributions with Jelinek-Mercer smoothing.

use super::WordId;
use std::collections::HashMap;
use std::sync::Arc;

/// Corpus-global word distribution used as the smoothing backoff.
///
/// Probabilities carry a Lidstone floor so that every word in the frozen
/// vocabulary (and any word interned later) has positive probability:
/// `p(w) = (count(w) + alpha) / (total + alpha * vocab_size)`.
#[derive(Debug)]
pub struct GlobalDist {
    counts: HashMap<WordId, f64>,
    total: f64,
    vocab_size: usize,
    alpha: f64,
}

impl GlobalDist {
    pub(crate) fn new(
        counts: HashMap<WordId, f64>,
        total: f64,
        vocab_size: usize,
        alpha: f64,
    ) -> Self {
        Self {
            counts,
            total,
            vocab_size: vocab_size.max(1),
            alpha,
        }
    }

    /// Lidstone-floored probability of a word.
    #[inline]
    pub fn prob(&self, word: WordId) -> f64 {
        let count = self.counts.get(&word).copied().unwrap_or(0.0);
        (count + self.alpha) / (self.total + self.alpha * self.vocab_size as f64)
    }

    /// Total token count the distribution was frozen with.
    #[inline]
    pub fn total_tokens(&self) -> f64 {
        self.total
    }

    /// Number of word types with a direct count.
    #[inline]
    pub fn num_word_types(&self) -> usize {
        self.counts.len()
    }
}

#[derive(Debug, Clone)]
struct Smoothing {
    global: Arc<GlobalDist>,
    interp: f64,
}

/// A unigram word distribution over interned word ids.
///
/// Models move through two explicit phases. [`finish_before_global`]
/// seals the raw counts; [`finish_after_global`] attaches the shared
/// global distribution and makes the model scoreable. Adding counts to a
/// sealed model, finishing a phase twice, or querying probabilities before
/// the model is finished are contract violations and panic.
///
/// Finished probabilities interpolate the maximum-likelihood estimate with
/// the global backoff: `p(w) = (1 - f) * count(w) / total + f * p_global(w)`
/// where `f` is the interpolation factor. An empty model degenerates to the
/// global distribution itself.
///
/// [`finish_before_global`]: Unigram::finish_before_global
/// [`finish_after_global`]: Unigram::finish_after_global
#[derive(Debug, Clone, Default)]
pub struct Unigram {
    counts: HashMap<WordId, f64>,
    total: f64,
    sealed: bool,
    smoothing: Option<Smoothing>,
}

impl Unigram {
    /// Creates an empty, unsealed model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `count` observations of `word`.
    pub fn add_word(&mut self, word: WordId, count: f64) {
        assert!(!self.sealed, "add_word() on a sealed unigram model");
        *self.counts.entry(word).or_insert(0.0) += count;
        self.total += count;
    }

    /// Folds another model's raw counts into this one, scaled by `weight`.
    ///
    /// Used when aggregating document models into a cell model.
    pub fn add_unigram(&mut self, other: &Unigram, weight: f64) {
        assert!(!self.sealed, "add_unigram() on a sealed unigram model");
        for (&word, &count) in &other.counts {
            *self.counts.entry(word).or_insert(0.0) += count * weight;
        }
        self.total += other.total * weight;
    }

    /// Seals the raw counts. Must be called exactly once, before the global
    /// distribution is attached.
    pub fn finish_before_global(&mut self) {
        assert!(!self.sealed, "finish_before_global() called twice");
        self.sealed = true;
    }

    /// Attaches the global backoff distribution, making the model scoreable.
    pub fn finish_after_global(&mut self, global: Arc<GlobalDist>, interp: f64) {
        assert!(
            self.sealed,
            "finish_after_global() before finish_before_global()"
        );
        assert!(
            self.smoothing.is_none(),
            "finish_after_global() called twice"
        );
        self.smoothing = Some(Smoothing { global, interp });
    }

    /// Whether both finish phases have run.
    #[inline]
    pub fn is_finished(&self) -> bool {
        self.smoothing.is_some()
    }

    /// Whether the model holds no observations.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.total == 0.0
    }

    /// Total (possibly fractional) token count.
    #[inline]
    pub fn total_tokens(&self) -> f64 {
        self.total
    }

    /// Number of distinct word types observed.
    #[inline]
    pub fn num_types(&self) -> usize {
        self.counts.len()
    }

    /// Raw count of a word.
    #[inline]
    pub fn count(&self, word: WordId) -> f64 {
        self.counts.get(&word).copied().unwrap_or(0.0)
    }

    /// Iterates over `(word, count)` pairs in arbitrary order.
    pub fn iter_counts(&self) -> impl Iterator<Item = (WordId, f64)> + '_ {
        self.counts.iter().map(|(&w, &c)| (w, c))
    }

    fn smoothing(&self, caller: &str) -> &Smoothing {
        match &self.smoothing {
            Some(s) => s,
            None => panic!("{caller}() on an unfinished unigram model"),
        }
    }

    /// Smoothed probability of a word.
    ///
    /// # Panics
    /// If the model is not finished.
    pub fn lookup_word(&self, word: WordId) -> f64 {
        let s = self.smoothing("lookup_word");
        let backoff = s.global.prob(word);
        if self.total == 0.0 {
            return backoff;
        }
        let direct = self.count(word) / self.total;
        (1.0 - s.interp) * direct + s.interp * backoff
    }

    /// Maximum-likelihood probability, zero for unseen words and for an
    /// empty model.
    #[inline]
    pub fn unsmoothed_prob(&self, word: WordId) -> f64 {
        if self.total == 0.0 {
            0.0
        } else {
            self.count(word) / self.total
        }
    }

    /// KL divergence `KL(self || other)` over smoothed probabilities.
    ///
    /// With `partial` the sum runs over this model's support only; the full
    /// variant also visits words seen only in `other`. Words in neither
    /// support contribute identical interpolated-backoff mass on both sides
    /// and are skipped.
    pub fn kl_divergence(&self, other: &Unigram, partial: bool) -> f64 {
        self.smoothing("kl_divergence");
        other.smoothing("kl_divergence");
        let mut sum = 0.0;
        for &word in self.counts.keys() {
            let p = self.lookup_word(word);
            let q = other.lookup_word(word);
            sum += p * (p / q).ln();
        }
        if !partial {
            for &word in other.counts.keys() {
                if self.counts.contains_key(&word) {
                    continue;
                }
                let p = self.lookup_word(word);
                let q = other.lookup_word(word);
                sum += p * (p / q).ln();
            }
        }
        sum
    }

    /// Per-word contributions to the partial KL divergence, sorted by
    /// descending absolute contribution.
    pub fn kl_contributions(&self, other: &Unigram) -> Vec<(WordId, f64)> {
        self.smoothing("kl_contributions");
        other.smoothing("kl_contributions");
        let mut contribs: Vec<(WordId, f64)> = self
            .counts
            .keys()
            .map(|&word| {
                let p = self.lookup_word(word);
                let q = other.lookup_word(word);
                (word, p * (p / q).ln())
            })
            .collect();
        contribs.sort_by(|a, b| b.1.abs().partial_cmp(&a.1.abs()).unwrap());
        contribs
    }

    /// Cosine similarity between the two distributions.
    ///
    /// With `partial` only this model's support contributes; otherwise the
    /// union of both supports does. With `smoothed` the interpolated
    /// probabilities are compared, otherwise the raw maximum-likelihood
    /// estimates. Dot product and norms run over the same index set, so the
    /// result is bounded by 1 up to rounding.
    pub fn cosine_similarity(&self, other: &Unigram, partial: bool, smoothed: bool) -> f64 {
        if smoothed {
            self.smoothing("cosine_similarity");
            other.smoothing("cosine_similarity");
        }
        let prob = |m: &Unigram, w: WordId| {
            if smoothed {
                m.lookup_word(w)
            } else {
                m.unsmoothed_prob(w)
            }
        };
        let mut dot = 0.0;
        let mut norm_a = 0.0;
        let mut norm_b = 0.0;
        let mut visit = |word: WordId| {
            let p = prob(self, word);
            let q = prob(other, word);
            dot += p * q;
            norm_a += p * p;
            norm_b += q * q;
        };
        for &word in self.counts.keys() {
            visit(word);
        }
        if !partial {
            for &word in other.counts.keys() {
                if !self.counts.contains_key(&word) {
                    visit(word);
                }
            }
        }
        if norm_a == 0.0 || norm_b == 0.0 {
            return 0.0;
        }
        dot / (norm_a.sqrt() * norm_b.sqrt())
    }

    /// Sum over this model's words of `count(w) * p_other(w)` using the
    /// other model's unsmoothed probabilities.
    pub fn sum_frequency(&self, other: &Unigram) -> f64 {
        self.counts
            .iter()
            .map(|(&word, &count)| count * other.unsmoothed_prob(word))
            .sum()
    }

    /// Log probability of this model's tokens under the other model's
    /// smoothed distribution: `sum count(w) * ln p_other(w)`.
    pub fn model_logprob(&self, other: &Unigram) -> f64 {
        other.smoothing("model_logprob");
        self.counts
            .iter()
            .map(|(&word, &count)| count * other.lookup_word(word).ln())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LmConfig;
    use crate::lm::LangModelFactory;

    fn finished_pair() -> (Unigram, Unigram, LangModelFactory) {
        let mut factory = LangModelFactory::new(LmConfig::default());
        let mut a = factory.build_model(vec![("paris", 5.0), ("seine", 2.0), ("tower", 1.0)]);
        let mut b = factory.build_model(vec![("paris", 1.0), ("thames", 4.0), ("tower", 3.0)]);
        factory.finish_global();
        factory.finish_model(&mut a);
        factory.finish_model(&mut b);
        (a, b, factory)
    }

    #[test]
    fn test_probabilities_sum_to_one() {
        let (a, _, factory) = finished_pair();
        let vocab_sum: f64 = (0..factory.vocab().len() as WordId)
            .map(|w| a.lookup_word(w))
            .sum();
        // Mass outside both supports is floor-only and tiny here; the
        // in-vocabulary sum should be within the floor of 1.
        assert!(vocab_sum > 0.95 && vocab_sum <= 1.0 + 1e-9, "{vocab_sum}");
    }

    #[test]
    #[should_panic(expected = "add_word() on a sealed unigram model")]
    fn test_add_after_seal_panics() {
        let mut m = Unigram::new();
        m.add_word(0, 1.0);
        m.finish_before_global();
        m.add_word(1, 1.0);
    }

    #[test]
    #[should_panic(expected = "lookup_word() on an unfinished unigram model")]
    fn test_lookup_before_finish_panics() {
        let mut m = Unigram::new();
        m.add_word(0, 1.0);
        m.finish_before_global();
        m.lookup_word(0);
    }

    #[test]
    fn test_kl_self_is_zero_and_other_positive() {
        let (a, b, _) = finished_pair();
        assert!(a.kl_divergence(&a, true).abs() < 1e-12);
        assert!(a.kl_divergence(&b, true) > 0.0);
        assert!(a.kl_divergence(&b, false) > 0.0);
    }

    #[test]
    fn test_full_kl_adds_negative_terms() {
        let (a, b, _) = finished_pair();
        let partial = a.kl_divergence(&b, true);
        let full = a.kl_divergence(&b, false);
        // Words seen only in b have p < q there, so the extra terms are
        // negative.
        assert!(full <= partial + 1e-12);
    }

    #[test]
    fn test_kl_contributions_sorted_and_sums_to_partial() {
        let (a, b, _) = finished_pair();
        let contribs = a.kl_contributions(&b);
        assert_eq!(contribs.len(), a.num_types());
        for pair in contribs.windows(2) {
            assert!(pair[0].1.abs() >= pair[1].1.abs());
        }
        let total: f64 = contribs.iter().map(|(_, c)| c).sum();
        assert!((total - a.kl_divergence(&b, true)).abs() < 1e-9);
    }

    #[test]
    fn test_cosine_bounds_and_self_similarity() {
        let (a, b, _) = finished_pair();
        for &(partial, smoothed) in &[(true, true), (true, false), (false, true), (false, false)] {
            let sim = a.cosine_similarity(&b, partial, smoothed);
            assert!((0.0..=1.0 + 1e-9).contains(&sim), "{sim}");
        }
        let self_sim = a.cosine_similarity(&a, false, false);
        assert!((self_sim - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_sum_frequency_favors_overlap() {
        let (a, b, _) = finished_pair();
        let mut factory = LangModelFactory::new(LmConfig::default());
        let mut unrelated = factory.build_model(vec![("quartz", 3.0)]);
        factory.finish_global();
        factory.finish_model(&mut unrelated);
        assert!(a.sum_frequency(&b) > a.sum_frequency(&unrelated));
    }

    #[test]
    fn test_model_logprob_is_negative_and_prefers_self() {
        let (a, b, _) = finished_pair();
        let own = a.model_logprob(&a);
        let cross = a.model_logprob(&b);
        assert!(own < 0.0);
        assert!(own > cross);
    }

    #[test]
    fn test_add_unigram_scales_counts() {
        let (a, _, factory) = finished_pair();
        let mut merged = Unigram::new();
        merged.add_unigram(&a, 2.0);
        let paris = factory.word_id("paris").unwrap();
        assert!((merged.count(paris) - 2.0 * a.count(paris)).abs() < 1e-12);
        assert!((merged.total_tokens() - 2.0 * a.total_tokens()).abs() < 1e-12);
    }
}
