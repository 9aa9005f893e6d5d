//! Exhaustive grid search.

use super::evaluator::{generation_stats, CandidatePool, GenerationStats};
use super::parameters::ParameterSpace;
use crate::domain::error::StratsearchError;
use tracing::info;

/// Evaluate the full Cartesian product of every dimension's grid.
pub fn grid_search(
    space: &ParameterSpace,
    pool: &mut CandidatePool<'_>,
) -> Result<Vec<GenerationStats>, StratsearchError> {
    let combos = space.grid()?;
    info!(combinations = combos.len(), "grid search");
    let scores = pool.evaluate_batch(0, &combos);
    Ok(vec![generation_stats(0, &scores, pool.best_score())])
}
