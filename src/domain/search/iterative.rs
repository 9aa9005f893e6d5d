//! Iterative random search.
//!
//! Draws one round of samples per worker, scores the round, and keeps the
//! running best. Each round only depends on the random stream, so a guided
//! sampler can replace `next_round` later without touching the callers.

use super::evaluator::{generation_stats, CandidatePool, GenerationStats};
use super::parameters::{ParameterSet, ParameterSpace};
use super::SearchConfig;
use crate::domain::clock::RandomSource;
use crate::domain::error::StratsearchError;
use tracing::{debug, info};

fn next_round(space: &ParameterSpace, size: usize, rng: &mut dyn RandomSource) -> Vec<ParameterSet> {
    (0..size).map(|_| space.sample(rng)).collect()
}

pub fn iterative_search(
    space: &ParameterSpace,
    config: &SearchConfig,
    rng: &mut dyn RandomSource,
    pool: &mut CandidatePool<'_>,
) -> Result<Vec<GenerationStats>, StratsearchError> {
    space.validate()?;
    let round_size = config.concurrency.max(1);
    let mut remaining = config.iterations;
    let mut round = 0;
    let mut stats = Vec::new();

    while remaining > 0 && !pool.is_aborted() {
        let batch = next_round(space, round_size.min(remaining), rng);
        remaining -= batch.len();
        let scores = pool.evaluate_batch(round, &batch);
        stats.push(generation_stats(round, &scores, pool.best_score()));
        debug!(round, remaining, best = pool.best_score(), "iteration round complete");
        round += 1;
    }
    info!(
        evaluations = pool.history().len(),
        best = pool.best_score(),
        "iterative search complete"
    );
    Ok(stats)
}
