//! Genetic search: elitism, tournament selection, uniform crossover and
//! per-dimension resampling mutation.

use super::evaluator::{generation_stats, CandidatePool, GenerationStats};
use super::parameters::{ParameterSet, ParameterSpace};
use super::SearchConfig;
use crate::domain::clock::RandomSource;
use crate::domain::error::StratsearchError;
use tracing::info;

pub const TOURNAMENT_SIZE: usize = 3;

/// Best of `TOURNAMENT_SIZE` random draws; the earlier draw wins ties.
fn tournament<'p>(
    population: &'p [ParameterSet],
    scores: &[f64],
    rng: &mut dyn RandomSource,
) -> &'p ParameterSet {
    let mut best = rng.next_index(population.len());
    for _ in 1..TOURNAMENT_SIZE {
        let idx = rng.next_index(population.len());
        if scores[idx] > scores[best] {
            best = idx;
        }
    }
    &population[best]
}

fn crossover(
    space: &ParameterSpace,
    a: &ParameterSet,
    b: &ParameterSet,
    rng: &mut dyn RandomSource,
) -> ParameterSet {
    space
        .iter()
        .map(|(name, spec)| {
            let from = if rng.chance(0.5) { a } else { b };
            let value = from.get(name).unwrap_or(spec.min);
            (name.clone(), value)
        })
        .collect()
}

fn mutate(
    space: &ParameterSpace,
    child: &mut ParameterSet,
    rate: f64,
    rng: &mut dyn RandomSource,
) {
    for (name, spec) in space.iter() {
        if rng.chance(rate) {
            child.insert(name, spec.sample(rng));
        }
    }
}

/// Indices ordered by descending score; equal scores keep population order.
fn ranked(scores: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));
    order
}

pub fn genetic_search(
    space: &ParameterSpace,
    config: &SearchConfig,
    rng: &mut dyn RandomSource,
    pool: &mut CandidatePool<'_>,
) -> Result<Vec<GenerationStats>, StratsearchError> {
    space.validate()?;
    let size = config.population_size;
    let elite = config.elite_size.min(size);

    let mut population: Vec<ParameterSet> = (0..size).map(|_| space.sample(rng)).collect();
    let mut stats = Vec::with_capacity(config.generations);

    for generation in 0..config.generations {
        let scores = pool.evaluate_batch(generation, &population);
        if pool.is_aborted() {
            break;
        }
        let gen_stats = generation_stats(generation, &scores, pool.best_score());
        info!(
            generation,
            best = gen_stats.best_score,
            mean = gen_stats.mean_score,
            best_ever = gen_stats.best_ever_score,
            "generation complete"
        );
        stats.push(gen_stats);

        if generation + 1 == config.generations {
            break;
        }

        let mut next: Vec<ParameterSet> = ranked(&scores)
            .into_iter()
            .take(elite)
            .map(|i| population[i].clone())
            .collect();
        while next.len() < size {
            let a = tournament(&population, &scores, rng);
            let b = tournament(&population, &scores, rng);
            let mut child = crossover(space, a, b, rng);
            mutate(space, &mut child, config.mutation_rate, rng);
            next.push(child);
        }
        population = next;
    }
    Ok(stats)
}
