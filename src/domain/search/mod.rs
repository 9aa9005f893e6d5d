//! Parameter search over backtest runs.
//!
//! Every method scores candidates with [`objective::objective_score`] through
//! a [`evaluator::CandidatePool`], which owns concurrency, failure counting and
//! deterministic best-candidate selection.

pub mod evaluator;
pub mod genetic;
pub mod grid;
pub mod iterative;
pub mod objective;
pub mod parameters;

use crate::domain::backtest::BacktestConfig;
use crate::domain::clock::{RandomSource, SeededRandom};
use crate::domain::error::StratsearchError;
use crate::domain::metrics::PerformanceReport;
use crate::domain::series::HistoricalData;
use crate::domain::strategy::StrategyFactory;
use evaluator::{BacktestEvaluator, CandidatePool, EvaluationRecord, Evaluator, GenerationStats};
use parameters::{ParameterSet, ParameterSpace};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMethod {
    Grid,
    Genetic,
    Iterative,
}

impl SearchMethod {
    pub const VALID: &'static str = "grid, genetic, iterative";

    pub fn name(&self) -> &'static str {
        match self {
            SearchMethod::Grid => "grid",
            SearchMethod::Genetic => "genetic",
            SearchMethod::Iterative => "iterative",
        }
    }
}

impl FromStr for SearchMethod {
    type Err = StratsearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "grid" => Ok(SearchMethod::Grid),
            "genetic" => Ok(SearchMethod::Genetic),
            "iterative" => Ok(SearchMethod::Iterative),
            _ => Err(StratsearchError::UnknownMethod {
                name: s.to_string(),
                valid: SearchMethod::VALID.to_string(),
            }),
        }
    }
}

impl fmt::Display for SearchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchConfig {
    pub population_size: usize,
    pub generations: usize,
    pub mutation_rate: f64,
    pub elite_size: usize,
    pub iterations: usize,
    /// Upper bound on concurrently running candidate evaluations.
    pub concurrency: usize,
    pub seed: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            population_size: 20,
            generations: 10,
            mutation_rate: 0.1,
            elite_size: 2,
            iterations: 50,
            concurrency: 4,
            seed: 42,
        }
    }
}

impl SearchConfig {
    pub fn validate(&self) -> Result<(), StratsearchError> {
        let invalid = |name: &str, reason: &str| StratsearchError::InvalidParameter {
            name: name.to_string(),
            reason: reason.to_string(),
        };
        if self.population_size == 0 {
            return Err(invalid("population_size", "must be at least 1"));
        }
        if self.generations == 0 {
            return Err(invalid("generations", "must be at least 1"));
        }
        if self.elite_size > self.population_size {
            return Err(invalid("elite_size", "must not exceed population_size"));
        }
        if !(0.0..=1.0).contains(&self.mutation_rate) {
            return Err(invalid("mutation_rate", "must be in [0, 1]"));
        }
        if self.iterations == 0 {
            return Err(invalid("iterations", "must be at least 1"));
        }
        if self.concurrency == 0 {
            return Err(invalid("concurrency", "must be at least 1"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct OptimizationResult {
    pub method: SearchMethod,
    pub parameters: ParameterSet,
    pub performance: PerformanceReport,
    pub score: f64,
    pub evaluations: usize,
    pub failures: usize,
    pub history: Vec<EvaluationRecord>,
    pub generations: Vec<GenerationStats>,
    /// The search stopped early; the result is the best seen before the abort.
    pub aborted: bool,
}

/// Run `method` against any evaluator.
pub fn search(
    method: SearchMethod,
    space: &ParameterSpace,
    evaluator: &dyn Evaluator,
    config: &SearchConfig,
    rng: &mut dyn RandomSource,
    abort: Option<Arc<AtomicBool>>,
) -> Result<OptimizationResult, StratsearchError> {
    space.validate()?;
    config.validate()?;
    info!(method = %method, dimensions = space.len(), "starting parameter search");

    let mut pool = CandidatePool::new(evaluator, config.concurrency, abort)?;
    let generations = match method {
        SearchMethod::Grid => grid::grid_search(space, &mut pool)?,
        SearchMethod::Genetic => genetic::genetic_search(space, config, rng, &mut pool)?,
        SearchMethod::Iterative => iterative::iterative_search(space, config, rng, &mut pool)?,
    };

    let aborted = pool.is_aborted();
    let failures = pool.failures();
    let best = match pool.best() {
        Some(best) => best.clone(),
        None if aborted => return Err(StratsearchError::Aborted),
        None => return Err(StratsearchError::NoViableCandidate { failures }),
    };
    let history = pool.into_history();
    info!(
        method = %method,
        evaluations = history.len(),
        failures,
        score = best.score,
        params = %best.parameters,
        "parameter search complete"
    );

    Ok(OptimizationResult {
        method,
        parameters: best.parameters,
        performance: best.performance.unwrap_or_default(),
        score: best.score,
        evaluations: history.len(),
        failures,
        history,
        generations,
        aborted,
    })
}

/// Searches strategy parameters by replaying the same data under each candidate.
pub struct SearchEngine<F: StrategyFactory> {
    data: Arc<HistoricalData>,
    backtest: BacktestConfig,
    factory: F,
    config: SearchConfig,
    abort: Option<Arc<AtomicBool>>,
    rng: Option<Box<dyn RandomSource>>,
}

impl<F: StrategyFactory> SearchEngine<F> {
    pub fn new(
        data: Arc<HistoricalData>,
        backtest: BacktestConfig,
        factory: F,
        config: SearchConfig,
    ) -> Self {
        SearchEngine {
            data,
            backtest,
            factory,
            config,
            abort: None,
            rng: None,
        }
    }

    pub fn with_abort(mut self, flag: Arc<AtomicBool>) -> Self {
        self.abort = Some(flag);
        self
    }

    /// Replace the default stream seeded from `SearchConfig::seed`.
    pub fn with_random(mut self, rng: Box<dyn RandomSource>) -> Self {
        self.rng = Some(rng);
        self
    }

    pub fn optimize_strategy(
        &mut self,
        start: i64,
        end: i64,
        method: &str,
        space: &ParameterSpace,
    ) -> Result<OptimizationResult, StratsearchError> {
        let method: SearchMethod = method.parse()?;
        let backtest = BacktestConfig {
            start,
            end,
            ..self.backtest.clone()
        };
        let mut evaluator = BacktestEvaluator::new(Arc::clone(&self.data), backtest, &self.factory);
        if let Some(flag) = &self.abort {
            evaluator = evaluator.with_abort(Arc::clone(flag));
        }

        let mut seeded = SeededRandom::new(self.config.seed);
        let rng: &mut dyn RandomSource = match self.rng.as_mut() {
            Some(rng) => &mut **rng,
            None => &mut seeded,
        };
        search(method, space, &evaluator, &self.config, rng, self.abort.clone())
    }
}
