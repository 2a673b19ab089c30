//! Batch scoring behind a request/response seam.
//!
//! Rankers that score a whole test set up front talk to a [`BatchScorer`]:
//! a batch of per-candidate feature vectors in, a batch of score vectors
//! out. [`LinearBatchScorer`] answers in process;
//! [`ProcessBatchScorer`] shells out to an external classifier tool
//! through scoped temporary files, the way large external models are
//! integrated. Raw scores become log-probabilities through a
//! [`ScoreConversion`].

use crate::classify::{FeatureVector, LinearScorer};
use crate::error::{GridLocateError, Result};
use log::info;
use std::fs;
use std::process::Command;

/// How raw classifier scores become log-probabilities.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScoreConversion {
    /// Raw scores are costs; the log-probability is the negated cost.
    CostSensitive,
    /// Raw scores are margins passed through a logistic transform.
    Logistic {
        /// Renormalize per-label probabilities to sum to 1 before taking
        /// logs. Renormalized scores rank better, so this is the default.
        renormalize: bool,
    },
}

impl Default for ScoreConversion {
    fn default() -> Self {
        ScoreConversion::Logistic { renormalize: true }
    }
}

impl ScoreConversion {
    /// Converts one document's raw candidate scores to log-probabilities.
    pub fn to_log_probs(&self, raw: &[f64]) -> Vec<f64> {
        match *self {
            ScoreConversion::CostSensitive => raw.iter().map(|&cost| -cost).collect(),
            ScoreConversion::Logistic { renormalize } => {
                let probs: Vec<f64> = raw.iter().map(|&s| 1.0 / (1.0 + (-s).exp())).collect();
                if renormalize {
                    let total: f64 = probs.iter().sum();
                    if total == 0.0 {
                        return vec![f64::NEG_INFINITY; raw.len()];
                    }
                    probs.iter().map(|p| (p / total).ln()).collect()
                } else {
                    probs.iter().map(|p| p.ln()).collect()
                }
            }
        }
    }
}

/// One document's scoring request: a feature vector per candidate label,
/// in candidate-index order.
#[derive(Debug, Clone)]
pub struct ScoreRequest {
    /// Identifier carried through to the caller's score cache.
    pub title: String,
    /// One feature vector per candidate.
    pub candidates: Vec<FeatureVector>,
}

/// Scores batches of candidate feature vectors.
///
/// The subprocess detail of external classifiers hides behind this seam,
/// so an in-process model can stand in for the external tool without
/// touching ranker logic.
pub trait BatchScorer {
    /// Returns one raw score per candidate per request, in request order.
    fn score_batch(&mut self, requests: &[ScoreRequest]) -> Result<Vec<Vec<f64>>>;
}

/// In-process batch scorer backed by a linear model.
#[derive(Debug, Clone)]
pub struct LinearBatchScorer {
    scorer: LinearScorer,
}

impl LinearBatchScorer {
    /// Wraps a trained linear model.
    pub fn new(scorer: LinearScorer) -> Self {
        Self { scorer }
    }
}

impl BatchScorer for LinearBatchScorer {
    fn score_batch(&mut self, requests: &[ScoreRequest]) -> Result<Vec<Vec<f64>>> {
        Ok(requests
            .iter()
            .map(|req| req.candidates.iter().map(|fv| self.scorer.score(fv)).collect())
            .collect())
    }
}

/// Batch scorer that invokes an external classifier tool once per batch.
///
/// Requests are serialized to a temporary input file, one line per
/// candidate: `title<TAB>candidate-index<TAB>feature:value ...`. The tool
/// runs as `program [args...] input output` and must write one score per
/// input line, in order, to the output path. Both files live in a scoped
/// temporary directory released when the call returns, so the external
/// tool's working files are single-use by construction.
#[derive(Debug, Clone)]
pub struct ProcessBatchScorer {
    program: String,
    args: Vec<String>,
}

impl ProcessBatchScorer {
    /// Creates a scorer invoking `program` with leading `args`.
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    fn write_requests(requests: &[ScoreRequest]) -> String {
        let mut out = String::new();
        for req in requests {
            for (idx, fv) in req.candidates.iter().enumerate() {
                out.push_str(&req.title);
                out.push('\t');
                out.push_str(&idx.to_string());
                out.push('\t');
                for (n, &(feature, value)) in fv.iter().enumerate() {
                    if n > 0 {
                        out.push(' ');
                    }
                    out.push_str(&format!("{feature}:{value}"));
                }
                out.push('\n');
            }
        }
        out
    }
}

impl BatchScorer for ProcessBatchScorer {
    fn score_batch(&mut self, requests: &[ScoreRequest]) -> Result<Vec<Vec<f64>>> {
        let total_rows: usize = requests.iter().map(|r| r.candidates.len()).sum();
        let dir = tempfile::tempdir()?;
        let input = dir.path().join("features");
        let output = dir.path().join("scores");
        fs::write(&input, Self::write_requests(requests))?;

        info!(
            "scoring {} documents ({} candidate rows) through '{}'",
            requests.len(),
            total_rows,
            self.program
        );
        let status = Command::new(&self.program)
            .args(&self.args)
            .arg(&input)
            .arg(&output)
            .status()?;
        if !status.success() {
            return Err(GridLocateError::ExternalScorer(format!(
                "scorer '{}' exited with {status}",
                self.program
            )));
        }

        let raw = fs::read_to_string(&output)?;
        let mut scores = Vec::with_capacity(total_rows);
        for (lineno, line) in raw.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let score: f64 = line.parse().map_err(|_| {
                GridLocateError::ExternalScorer(format!(
                    "unparseable score '{line}' on output line {}",
                    lineno + 1
                ))
            })?;
            scores.push(score);
        }
        if scores.len() != total_rows {
            return Err(GridLocateError::ExternalScorer(format!(
                "scorer '{}' returned {} scores for {} candidate rows",
                self.program,
                scores.len(),
                total_rows
            )));
        }

        let mut iter = scores.into_iter();
        Ok(requests
            .iter()
            .map(|req| iter.by_ref().take(req.candidates.len()).collect())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::FeatureId;

    fn fv(entries: &[(FeatureId, f64)]) -> FeatureVector {
        let mut v = FeatureVector::new();
        for &(id, value) in entries {
            v.push(id, value);
        }
        v
    }

    #[test]
    fn test_cost_sensitive_negates() {
        let logp = ScoreConversion::CostSensitive.to_log_probs(&[1.5, -2.0]);
        assert_eq!(logp, vec![-1.5, 2.0]);
    }

    #[test]
    fn test_logistic_renormalized_sums_to_one() {
        let logp = ScoreConversion::default().to_log_probs(&[2.0, 0.0, -1.0]);
        let total: f64 = logp.iter().map(|lp| lp.exp()).sum();
        assert!((total - 1.0).abs() < 1e-9);
        // Ordering of raw scores survives the conversion.
        assert!(logp[0] > logp[1] && logp[1] > logp[2]);
    }

    #[test]
    fn test_logistic_unnormalized_is_negative() {
        let conv = ScoreConversion::Logistic { renormalize: false };
        for lp in conv.to_log_probs(&[3.0, -3.0]) {
            assert!(lp < 0.0);
        }
    }

    #[test]
    fn test_linear_batch_scorer() {
        let mut scorer = LinearBatchScorer::new(LinearScorer::new(vec![1.0, -1.0]));
        let requests = vec![ScoreRequest {
            title: "doc".to_string(),
            candidates: vec![fv(&[(0, 2.0)]), fv(&[(1, 2.0)])],
        }];
        let scores = scorer.score_batch(&requests).unwrap();
        assert_eq!(scores, vec![vec![2.0, -2.0]]);
    }

    #[test]
    fn test_process_scorer_round_trip() {
        // Fake external tool: scores each candidate row by its feature
        // count (whitespace fields minus title and index).
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("scorer.sh");
        fs::write(&script, "#!/bin/sh\nawk '{print NF - 2}' \"$1\" > \"$2\"\n").unwrap();
        let mut scorer =
            ProcessBatchScorer::new("sh", vec![script.to_string_lossy().into_owned()]);
        let requests = vec![
            ScoreRequest {
                title: "a".to_string(),
                candidates: vec![fv(&[(0, 1.0), (1, 1.0)]), fv(&[(2, 1.0)])],
            },
            ScoreRequest {
                title: "b".to_string(),
                candidates: vec![fv(&[(0, 1.0), (1, 1.0), (2, 1.0)])],
            },
        ];
        let scores = scorer.score_batch(&requests).unwrap();
        assert_eq!(scores, vec![vec![2.0, 1.0], vec![3.0]]);
    }

    #[test]
    fn test_process_scorer_failure_is_an_error() {
        let mut scorer = ProcessBatchScorer::new("sh", vec!["-c".to_string(), "exit 3".to_string()]);
        let requests = vec![ScoreRequest {
            title: "a".to_string(),
            candidates: vec![fv(&[(0, 1.0)])],
        }];
        match scorer.score_batch(&requests) {
            Err(GridLocateError::ExternalScorer(msg)) => assert!(msg.contains("exited")),
            other => panic!("expected external-scorer error, got {other:?}"),
        }
    }
}
