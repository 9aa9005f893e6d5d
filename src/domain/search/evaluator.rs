//! Candidate evaluation: the backtest-backed oracle and the bounded pool that
//! scores batches of candidates while keeping selection deterministic.

use super::objective::{objective_score, WORST_SCORE};
use super::parameters::ParameterSet;
use crate::domain::backtest::{BacktestConfig, BacktestRunner};
use crate::domain::error::StratsearchError;
use crate::domain::metrics::PerformanceReport;
use crate::domain::series::HistoricalData;
use crate::domain::strategy::StrategyFactory;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

pub trait Evaluator: Sync {
    fn evaluate(&self, params: &ParameterSet) -> Result<PerformanceReport, StratsearchError>;
}

impl<F> Evaluator for F
where
    F: Fn(&ParameterSet) -> Result<PerformanceReport, StratsearchError> + Sync,
{
    fn evaluate(&self, params: &ParameterSet) -> Result<PerformanceReport, StratsearchError> {
        self(params)
    }
}

/// Runs a fresh [`BacktestRunner`] per candidate. Only the historical data is
/// shared, and it is read-only.
pub struct BacktestEvaluator<F: StrategyFactory> {
    data: Arc<HistoricalData>,
    config: BacktestConfig,
    factory: F,
    abort: Option<Arc<AtomicBool>>,
}

impl<F: StrategyFactory> BacktestEvaluator<F> {
    pub fn new(data: Arc<HistoricalData>, config: BacktestConfig, factory: F) -> Self {
        BacktestEvaluator {
            data,
            config,
            factory,
            abort: None,
        }
    }

    pub fn with_abort(mut self, flag: Arc<AtomicBool>) -> Self {
        self.abort = Some(flag);
        self
    }
}

impl<F: StrategyFactory> Evaluator for BacktestEvaluator<F> {
    fn evaluate(&self, params: &ParameterSet) -> Result<PerformanceReport, StratsearchError> {
        let collaborators = self.factory.build(params)?;
        let config = BacktestConfig {
            strategy_tag: self.factory.tag(),
            ..self.config.clone()
        };
        let mut runner = BacktestRunner::new(Arc::clone(&self.data), config, collaborators);
        if let Some(flag) = &self.abort {
            runner = runner.with_abort(Arc::clone(flag));
        }
        runner.run()
    }
}

/// One scored candidate, in evaluation order.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationRecord {
    pub index: usize,
    pub generation: usize,
    pub parameters: ParameterSet,
    pub score: f64,
    /// `None` when the evaluation failed.
    pub performance: Option<PerformanceReport>,
}

impl EvaluationRecord {
    pub fn failed(&self) -> bool {
        self.performance.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationStats {
    pub generation: usize,
    pub evaluated: usize,
    pub best_score: f64,
    pub mean_score: f64,
    pub best_ever_score: f64,
}

/// Scores batches on a thread pool of fixed size and remembers every outcome.
///
/// Results are consumed in submission order, so the best candidate is the
/// highest score with the lowest index regardless of which thread finished first.
pub struct CandidatePool<'a> {
    evaluator: &'a dyn Evaluator,
    pool: ThreadPool,
    abort: Option<Arc<AtomicBool>>,
    history: Vec<EvaluationRecord>,
    best: Option<usize>,
    failures: usize,
    aborted: bool,
}

impl<'a> CandidatePool<'a> {
    pub fn new(
        evaluator: &'a dyn Evaluator,
        concurrency: usize,
        abort: Option<Arc<AtomicBool>>,
    ) -> Result<Self, StratsearchError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(concurrency.max(1))
            .build()
            .map_err(|e| StratsearchError::Evaluation {
                reason: format!("failed to start worker pool: {e}"),
            })?;
        Ok(CandidatePool {
            evaluator,
            pool,
            abort,
            history: Vec::new(),
            best: None,
            failures: 0,
            aborted: false,
        })
    }

    fn abort_requested(&self) -> bool {
        self.abort
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    /// Score `batch` and return the scores in input order. Failed candidates
    /// score [`WORST_SCORE`]; candidates skipped after an abort do too but are
    /// not recorded.
    pub fn evaluate_batch(&mut self, generation: usize, batch: &[ParameterSet]) -> Vec<f64> {
        if self.aborted || self.abort_requested() {
            self.aborted = true;
            return vec![WORST_SCORE; batch.len()];
        }

        let evaluator = self.evaluator;
        let abort = self.abort.clone();
        let outcomes: Vec<Option<Result<PerformanceReport, StratsearchError>>> =
            self.pool.install(|| {
                batch
                    .par_iter()
                    .map(|params| {
                        if abort.as_ref().is_some_and(|f| f.load(Ordering::Relaxed)) {
                            return None;
                        }
                        Some(evaluator.evaluate(params))
                    })
                    .collect()
            });

        let mut scores = Vec::with_capacity(batch.len());
        for (params, outcome) in batch.iter().zip(outcomes) {
            let (score, performance) = match outcome {
                None | Some(Err(StratsearchError::Aborted)) => {
                    self.aborted = true;
                    scores.push(WORST_SCORE);
                    continue;
                }
                Some(Err(e)) => {
                    warn!(params = %params, error = %e, "candidate evaluation failed");
                    self.failures += 1;
                    (WORST_SCORE, None)
                }
                Some(Ok(report)) => (objective_score(&report), Some(report)),
            };

            let index = self.history.len();
            debug!(index, generation, params = %params, score, "candidate scored");
            if performance.is_some() && self.best.is_none_or(|b| score > self.history[b].score) {
                self.best = Some(index);
            }
            self.history.push(EvaluationRecord {
                index,
                generation,
                parameters: params.clone(),
                score,
                performance,
            });
            scores.push(score);
        }
        scores
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    pub fn best(&self) -> Option<&EvaluationRecord> {
        self.best.map(|i| &self.history[i])
    }

    pub fn best_score(&self) -> f64 {
        self.best().map_or(WORST_SCORE, |r| r.score)
    }

    pub fn failures(&self) -> usize {
        self.failures
    }

    pub fn history(&self) -> &[EvaluationRecord] {
        &self.history
    }

    pub fn into_history(self) -> Vec<EvaluationRecord> {
        self.history
    }
}

/// Summary of one generation's scores. Failed candidates are left out of the mean.
pub fn generation_stats(generation: usize, scores: &[f64], best_ever_score: f64) -> GenerationStats {
    let finite: Vec<f64> = scores.iter().copied().filter(|s| s.is_finite()).collect();
    let mean_score = if finite.is_empty() {
        0.0
    } else {
        finite.iter().sum::<f64>() / finite.len() as f64
    };
    GenerationStats {
        generation,
        evaluated: scores.len(),
        best_score: scores.iter().copied().fold(WORST_SCORE, f64::max),
        mean_score,
        best_ever_score,
    }
}
