//! Word-distribution support: vocabulary interning and unigram models.
//!
//! The ranking engine consumes word distributions as a black box; this module
//! supplies the concrete capability. Words are interned to dense ids through
//! a [`Vocab`], per-document [`Unigram`] models are built by a
//! [`LangModelFactory`], and smoothing backs off onto a corpus-global
//! distribution shared by every finished model.

mod unigram;

pub use unigram::{GlobalDist, Unigram};

use crate::config::LmConfig;
use log::info;
use std::collections::HashMap;
use std::sync::Arc;

/// Dense identifier for an interned word.
pub type WordId = u32;

/// Interning table mapping words to dense ids and back.
#[derive(Debug, Clone, Default)]
pub struct Vocab {
    word_to_id: HashMap<String, WordId>,
    id_to_word: Vec<String>,
}

impl Vocab {
    /// Creates an empty vocabulary.
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns a word, returning its id.
    pub fn intern(&mut self, word: &str) -> WordId {
        if let Some(&id) = self.word_to_id.get(word) {
            return id;
        }
        let id = self.id_to_word.len() as WordId;
        self.id_to_word.push(word.to_string());
        self.word_to_id.insert(word.to_string(), id);
        id
    }

    /// Looks up the id of an already-interned word.
    pub fn id(&self, word: &str) -> Option<WordId> {
        self.word_to_id.get(word).copied()
    }

    /// Returns the word for an id.
    pub fn word(&self, id: WordId) -> Option<&str> {
        self.id_to_word.get(id as usize).map(|s| s.as_str())
    }

    /// Number of distinct words interned.
    pub fn len(&self) -> usize {
        self.id_to_word.len()
    }

    /// Whether no words have been interned.
    pub fn is_empty(&self) -> bool {
        self.id_to_word.is_empty()
    }
}

/// Builds unigram models, owning the vocabulary and the corpus-global
/// distribution every finished model backs off onto.
///
/// Lifecycle: build models for the corpus (each build folds its counts into
/// the global accumulator), call [`finish_global`](Self::finish_global) once,
/// then finish each model. Models built after the global freeze (late test
/// documents) come back already finished; their counts no longer influence
/// the global distribution.
#[derive(Debug)]
pub struct LangModelFactory {
    vocab: Vocab,
    config: LmConfig,
    global_counts: HashMap<WordId, f64>,
    global_total: f64,
    global: Option<Arc<GlobalDist>>,
}

impl LangModelFactory {
    /// Creates a factory with the given smoothing configuration.
    pub fn new(config: LmConfig) -> Self {
        Self {
            vocab: Vocab::new(),
            config,
            global_counts: HashMap::new(),
            global_total: 0.0,
            global: None,
        }
    }

    /// Builds a sealed unigram model from word counts, interning the words.
    ///
    /// Non-positive counts are dropped. Before the global freeze the counts
    /// also accumulate into the global distribution and the returned model
    /// still needs [`finish_model`](Self::finish_model); afterwards the model
    /// is returned fully finished.
    pub fn build_model<S: AsRef<str>>(
        &mut self,
        word_counts: impl IntoIterator<Item = (S, f64)>,
    ) -> Unigram {
        let accumulate = self.global.is_none();
        let mut model = Unigram::new();
        for (word, count) in word_counts {
            if count <= 0.0 {
                continue;
            }
            let id = self.vocab.intern(word.as_ref());
            model.add_word(id, count);
            if accumulate {
                *self.global_counts.entry(id).or_insert(0.0) += count;
                self.global_total += count;
            }
        }
        model.finish_before_global();
        if let Some(global) = &self.global {
            model.finish_after_global(global.clone(), self.config.interpolation_factor);
        }
        model
    }

    /// Freezes the corpus-global distribution. Calling twice is a fatal
    /// contract violation.
    pub fn finish_global(&mut self) {
        assert!(
            self.global.is_none(),
            "finish_global() called twice on the language-model factory"
        );
        let global = GlobalDist::new(
            std::mem::take(&mut self.global_counts),
            self.global_total,
            self.vocab.len(),
            self.config.lidstone_alpha,
        );
        info!(
            "global word distribution finished: {} word types, {:.0} tokens",
            global.num_word_types(),
            global.total_tokens()
        );
        self.global = Some(Arc::new(global));
    }

    /// Whether [`finish_global`](Self::finish_global) has run.
    pub fn is_global_finished(&self) -> bool {
        self.global.is_some()
    }

    /// Attaches the global distribution to a sealed model, finishing it.
    pub fn finish_model(&self, model: &mut Unigram) {
        model.finish_after_global(self.global().clone(), self.config.interpolation_factor);
    }

    /// Returns a finished, empty model (used for synthesized cells).
    pub fn empty_model(&self) -> Unigram {
        let mut model = Unigram::new();
        model.finish_before_global();
        model.finish_after_global(self.global().clone(), self.config.interpolation_factor);
        model
    }

    /// The frozen global distribution.
    ///
    /// # Panics
    /// If the global distribution has not been finished yet.
    pub fn global(&self) -> &Arc<GlobalDist> {
        self.global
            .as_ref()
            .expect("global distribution accessed before finish_global()")
    }

    /// The smoothing configuration the factory was built with.
    pub fn config(&self) -> &LmConfig {
        &self.config
    }

    /// The vocabulary.
    pub fn vocab(&self) -> &Vocab {
        &self.vocab
    }

    /// Convenience lookup of a word's id.
    pub fn word_id(&self, word: &str) -> Option<WordId> {
        self.vocab.id(word)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vocab_intern_roundtrip() {
        let mut vocab = Vocab::new();
        let a = vocab.intern("paris");
        let b = vocab.intern("london");
        assert_ne!(a, b);
        assert_eq!(vocab.intern("paris"), a);
        assert_eq!(vocab.word(a), Some("paris"));
        assert_eq!(vocab.id("london"), Some(b));
        assert_eq!(vocab.len(), 2);
    }

    #[test]
    fn test_factory_lifecycle() {
        let mut factory = LangModelFactory::new(LmConfig::default());
        let mut m = factory.build_model(vec![("paris", 3.0), ("seine", 1.0)]);
        assert!(!m.is_finished());
        factory.finish_global();
        factory.finish_model(&mut m);
        assert!(m.is_finished());
        let p = m.lookup_word(factory.word_id("paris").unwrap());
        assert!(p > 0.0 && p < 1.0);
    }

    #[test]
    fn test_late_model_is_finished() {
        let mut factory = LangModelFactory::new(LmConfig::default());
        let _ = factory.build_model(vec![("paris", 3.0)]);
        factory.finish_global();
        let late = factory.build_model(vec![("paris", 1.0), ("novel", 2.0)]);
        assert!(late.is_finished());
        // A word first seen after the freeze still has positive probability.
        let id = factory.word_id("novel").unwrap();
        assert!(late.lookup_word(id) > 0.0);
    }

    #[test]
    #[should_panic(expected = "finish_global() called twice")]
    fn test_double_finish_global_panics() {
        let mut factory = LangModelFactory::new(LmConfig::default());
        factory.finish_global();
        factory.finish_global();
    }

    #[test]
    fn test_empty_model_backs_off_to_global() {
        let mut factory = LangModelFactory::new(LmConfig::default());
        let _ = factory.build_model(vec![("paris", 10.0)]);
        factory.finish_global();
        let empty = factory.empty_model();
        assert!(empty.is_empty());
        let id = factory.word_id("paris").unwrap();
        assert!((empty.lookup_word(id) - factory.global().prob(id)).abs() < 1e-12);
    }
}
