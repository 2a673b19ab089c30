//! Documents and corpus assembly.
//!
//! The crate does not parse corpus files. Upstream sources hand over
//! [`DocStatus`] records (parsed fields or a named failure), and a
//! [`Corpus`] turns them into [`GeoDoc`]s backed by a shared
//! [`LangModelFactory`]. Documents without a coordinate are valid here;
//! the grid and the evaluator decide what to do with them and count the
//! skips under the names in [`SKIP_NO_COORD`] and [`SKIP_EMPTY_LM`].

use crate::config::LmConfig;
use crate::coord::Coord;
use crate::error::{GridLocateError, Result};
use crate::lm::{LangModelFactory, Unigram};
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Skip-counter name for a document with no coordinate.
pub const SKIP_NO_COORD: &str = "skipped.no-coordinate";
/// Skip-counter name for a document whose word distribution is empty.
pub const SKIP_EMPTY_LM: &str = "skipped.empty-distribution";

/// Corpus split a document belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocSplit {
    /// Used to populate the grid.
    Training,
    /// Held out for tuning.
    Dev,
    /// Held out for evaluation.
    Test,
}

impl fmt::Display for DocSplit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DocSplit::Training => "training",
            DocSplit::Dev => "dev",
            DocSplit::Test => "test",
        };
        write!(f, "{name}")
    }
}

impl FromStr for DocSplit {
    type Err = GridLocateError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "training" | "train" => Ok(DocSplit::Training),
            "dev" => Ok(DocSplit::Dev),
            "test" => Ok(DocSplit::Test),
            other => Err(GridLocateError::Corpus(format!(
                "unknown document split '{other}'"
            ))),
        }
    }
}

/// Parsed fields of a document as an upstream source provides them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawDoc<C: Coord> {
    /// Document identifier.
    pub title: String,
    /// Location the document is about, when known.
    pub coord: Option<C>,
    /// Popularity weight (e.g. incoming-link count), zero when absent.
    pub salience: f64,
    /// Corpus split.
    pub split: DocSplit,
    /// Pre-counted word frequencies. Counts may be fractional.
    pub word_counts: Vec<(String, f64)>,
}

/// One record of the upstream document stream: either parsed fields or a
/// failure the source wants counted rather than silently dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DocStatus<C: Coord> {
    /// The source produced a usable record.
    Processed(RawDoc<C>),
    /// The source could not turn the record into a document.
    Failed {
        /// Identifier of the failed record, when available.
        title: String,
        /// Counter name the failure is recorded under.
        reason: String,
    },
}

/// A geolocated document with its word distribution.
#[derive(Debug, Clone)]
pub struct GeoDoc<C: Coord> {
    title: String,
    coord: Option<C>,
    salience: f64,
    split: DocSplit,
    lm: Unigram,
}

impl<C: Coord> GeoDoc<C> {
    /// Document identifier.
    #[inline]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// The document's coordinate, when known.
    #[inline]
    pub fn coord(&self) -> Option<C> {
        self.coord
    }

    /// Whether the document has a coordinate.
    #[inline]
    pub fn has_coord(&self) -> bool {
        self.coord.is_some()
    }

    /// Popularity weight.
    #[inline]
    pub fn salience(&self) -> f64 {
        self.salience
    }

    /// Corpus split.
    #[inline]
    pub fn split(&self) -> DocSplit {
        self.split
    }

    /// The document's word distribution.
    #[inline]
    pub fn lm(&self) -> &Unigram {
        &self.lm
    }
}

/// Collects documents from an upstream stream and owns the shared
/// language-model machinery.
///
/// All documents should be added before [`finish`](Self::finish) so their
/// counts inform the global backoff distribution; documents added later are
/// still accepted (their models simply no longer shape the backoff).
#[derive(Debug)]
pub struct Corpus<C: Coord> {
    factory: LangModelFactory,
    docs: Vec<GeoDoc<C>>,
    failed: HashMap<String, usize>,
    finished: bool,
}

impl<C: Coord> Corpus<C> {
    /// Creates an empty corpus with the given smoothing configuration.
    pub fn new(config: LmConfig) -> Self {
        Self {
            factory: LangModelFactory::new(config),
            docs: Vec::new(),
            failed: HashMap::new(),
            finished: false,
        }
    }

    /// Adds a parsed document, building its word distribution.
    pub fn add(&mut self, raw: RawDoc<C>) {
        let lm = self.factory.build_model(raw.word_counts);
        self.docs.push(GeoDoc {
            title: raw.title,
            coord: raw.coord,
            salience: raw.salience,
            split: raw.split,
            lm,
        });
    }

    /// Adds one upstream record, counting failures by reason.
    pub fn add_status(&mut self, status: DocStatus<C>) {
        match status {
            DocStatus::Processed(raw) => self.add(raw),
            DocStatus::Failed { reason, .. } => {
                *self.failed.entry(reason).or_insert(0) += 1;
            }
        }
    }

    /// Drains an upstream stream into the corpus.
    pub fn add_stream(&mut self, stream: impl IntoIterator<Item = DocStatus<C>>) {
        for status in stream {
            self.add_status(status);
        }
    }

    /// Freezes the global word distribution and finishes every document
    /// model. Calling twice is a fatal contract violation.
    pub fn finish(&mut self) {
        assert!(!self.finished, "finish() called twice on a corpus");
        self.factory.finish_global();
        for doc in &mut self.docs {
            self.factory.finish_model(&mut doc.lm);
        }
        self.finished = true;
        let count = |split| self.docs.iter().filter(|d| d.split() == split).count();
        info!(
            "corpus finished: {} documents ({} training, {} dev, {} test), {} upstream failures",
            self.docs.len(),
            count(DocSplit::Training),
            count(DocSplit::Dev),
            count(DocSplit::Test),
            self.failed.values().sum::<usize>()
        );
    }

    /// Whether [`finish`](Self::finish) has run.
    #[inline]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// All documents, in insertion order.
    pub fn docs(&self) -> &[GeoDoc<C>] {
        &self.docs
    }

    /// Documents belonging to one split, in insertion order.
    pub fn docs_in_split(&self, split: DocSplit) -> impl Iterator<Item = &GeoDoc<C>> {
        self.docs.iter().filter(move |d| d.split() == split)
    }

    /// The shared language-model factory.
    pub fn factory(&self) -> &LangModelFactory {
        &self.factory
    }

    /// A finished empty model, used by grids to synthesize cells for
    /// unrecorded coordinates. Only valid after [`finish`](Self::finish).
    pub fn empty_model(&self) -> Unigram {
        self.factory.empty_model()
    }

    /// Upstream failure counts by reason.
    pub fn failed_counts(&self) -> &HashMap<String, usize> {
        &self.failed
    }
}
