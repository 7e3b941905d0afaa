//! Bounded global minimiser for small parameter vectors.
//!
//! Differential evolution (`best/1/bin` with dithered mutation) explores the
//! box, then a Nelder-Mead simplex clamped to the box polishes the best
//! member. Restarts rerun the global stage from fresh populations and keep the
//! best result. All randomness comes from the caller's RNG, so a fit is fully
//! determined by its seed.

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Absolute part of the population convergence test.
const ENERGY_ATOL: f64 = 1e-12;
/// Smallest population regardless of dimension.
const MIN_POPULATION: usize = 5;

/// Effort level of the optimiser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intensity {
    /// Moderate population and tolerance; enough for well separated parameters.
    #[default]
    Default,
    /// Larger population, tighter tolerance and more restarts, for fits with
    /// strongly correlated amplitude and decay-constant terms.
    Intense,
}

impl Intensity {
    /// Concrete settings for this level.
    pub fn settings(&self) -> OptimizerSettings {
        match self {
            Intensity::Default => OptimizerSettings::default(),
            Intensity::Intense => OptimizerSettings {
                population_factor: 40,
                max_generations: 4000,
                tolerance: 1e-5,
                restarts: 3,
                polish_iterations: 10_000,
                polish_tolerance: 1e-14,
                ..OptimizerSettings::default()
            },
        }
    }
}

/// Tunables of [`minimize`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerSettings {
    /// Population size per parameter.
    pub population_factor: usize,
    /// Generation budget of one global run.
    pub max_generations: usize,
    /// Relative tolerance on the spread of population costs.
    pub tolerance: f64,
    /// Number of independent global runs.
    pub restarts: usize,
    /// Range of the dithered mutation factor.
    pub mutation: (f64, f64),
    /// Binomial crossover probability.
    pub crossover: f64,
    /// Iteration budget of the simplex polish.
    pub polish_iterations: usize,
    /// Absolute tolerance of the simplex polish on both cost and vertices.
    pub polish_tolerance: f64,
}

impl Default for OptimizerSettings {
    fn default() -> Self {
        Self {
            population_factor: 15,
            max_generations: 1000,
            tolerance: 0.01,
            restarts: 1,
            mutation: (0.5, 1.0),
            crossover: 0.7,
            polish_iterations: 2000,
            polish_tolerance: 1e-10,
        }
    }
}

/// Result of a bounded minimisation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimOutcome {
    /// Best point found; always inside the box.
    pub parameters: Vec<f64>,
    /// Cost at `parameters`.
    pub cost: f64,
    /// True when either stage met its tolerance and the cost is finite.
    pub converged: bool,
    /// Generations used over all global runs.
    pub generations: usize,
    /// Cost evaluations over both stages.
    pub evaluations: usize,
}

struct Counted<F> {
    cost: F,
    evaluations: usize,
}

impl<F: Fn(&[f64]) -> f64> Counted<F> {
    fn eval(&mut self, x: &[f64]) -> f64 {
        self.evaluations += 1;
        let value = (self.cost)(x);
        if value.is_nan() {
            f64::INFINITY
        } else {
            value
        }
    }
}

/// Minimises `cost` over the box `bounds`.
///
/// NaN costs are treated as `+inf`, so regions where the model is undefined
/// are avoided rather than aborting the search.
pub fn minimize<F, R>(
    cost: F,
    bounds: &[(f64, f64)],
    settings: &OptimizerSettings,
    rng: &mut R,
) -> OptimOutcome
where
    F: Fn(&[f64]) -> f64,
    R: Rng + ?Sized,
{
    let mut counted = Counted {
        cost,
        evaluations: 0,
    };
    let mut generations = 0;
    let mut best: Option<(Vec<f64>, f64, bool)> = None;

    for _ in 0..settings.restarts.max(1) {
        let run = evolve(&mut counted, bounds, settings, rng);
        generations += run.generations;
        let better = best
            .as_ref()
            .map_or(true, |(_, cost, _)| run.cost < *cost);
        if better {
            best = Some((run.parameters, run.cost, run.converged));
        }
    }

    let (start, start_cost, global_converged) = match best {
        Some(found) => found,
        None => (midpoint(bounds), f64::INFINITY, false),
    };
    let polished = polish(&mut counted, start.clone(), bounds, settings);
    let (parameters, cost, polish_converged) = if polished.1 <= start_cost {
        polished
    } else {
        (start, start_cost, false)
    };

    OptimOutcome {
        converged: cost.is_finite() && (global_converged || polish_converged),
        parameters,
        cost,
        generations,
        evaluations: counted.evaluations,
    }
}

struct Evolution {
    parameters: Vec<f64>,
    cost: f64,
    converged: bool,
    generations: usize,
}

fn evolve<F, R>(
    counted: &mut Counted<F>,
    bounds: &[(f64, f64)],
    settings: &OptimizerSettings,
    rng: &mut R,
) -> Evolution
where
    F: Fn(&[f64]) -> f64,
    R: Rng + ?Sized,
{
    let dim = bounds.len();
    let size = (settings.population_factor * dim).max(MIN_POPULATION);
    let mut population: Vec<Vec<f64>> = (0..size)
        .map(|_| {
            bounds
                .iter()
                .map(|&(lo, hi)| rng.gen_range(lo..=hi))
                .collect()
        })
        .collect();
    let mut energies: Vec<f64> = population.iter().map(|x| counted.eval(x)).collect();
    let mut best = argmin(&energies);

    let mut converged = population_converged(&energies, settings.tolerance);
    let mut generations = 0;
    let mut trial = vec![0.0; dim];
    while !converged && generations < settings.max_generations {
        generations += 1;
        let scale = rng.gen_range(settings.mutation.0..=settings.mutation.1);
        for i in 0..size {
            let (r1, r2) = distinct_pair(size, i, rng);
            let forced = rng.gen_range(0..dim);
            for j in 0..dim {
                trial[j] = if j == forced || rng.gen::<f64>() < settings.crossover {
                    population[best][j] + scale * (population[r1][j] - population[r2][j])
                } else {
                    population[i][j]
                };
                let (lo, hi) = bounds[j];
                if !(lo..=hi).contains(&trial[j]) {
                    trial[j] = rng.gen_range(lo..=hi);
                }
            }
            let energy = counted.eval(&trial);
            if energy <= energies[i] {
                population[i].copy_from_slice(&trial);
                energies[i] = energy;
                if energy < energies[best] {
                    best = i;
                }
            }
        }
        converged = population_converged(&energies, settings.tolerance);
    }

    Evolution {
        parameters: population.swap_remove(best),
        cost: energies[best],
        converged,
        generations,
    }
}

fn population_converged(energies: &[f64], tolerance: f64) -> bool {
    if energies.iter().any(|e| !e.is_finite()) {
        return false;
    }
    let n = energies.len() as f64;
    let mean = energies.iter().sum::<f64>() / n;
    let spread = (energies.iter().map(|e| (e - mean) * (e - mean)).sum::<f64>() / n).sqrt();
    spread <= ENERGY_ATOL + tolerance * mean.abs()
}

fn distinct_pair<R: Rng + ?Sized>(size: usize, exclude: usize, rng: &mut R) -> (usize, usize) {
    let mut r1 = rng.gen_range(0..size);
    while r1 == exclude {
        r1 = rng.gen_range(0..size);
    }
    let mut r2 = rng.gen_range(0..size);
    while r2 == exclude || r2 == r1 {
        r2 = rng.gen_range(0..size);
    }
    (r1, r2)
}

fn argmin(values: &[f64]) -> usize {
    values
        .iter()
        .enumerate()
        .fold(0, |best, (i, v)| if *v < values[best] { i } else { best })
}

fn midpoint(bounds: &[(f64, f64)]) -> Vec<f64> {
    bounds.iter().map(|&(lo, hi)| 0.5 * (lo + hi)).collect()
}

fn clamp_into(x: &mut [f64], bounds: &[(f64, f64)]) {
    for (value, &(lo, hi)) in x.iter_mut().zip(bounds) {
        *value = value.clamp(lo, hi);
    }
}

/// Nelder-Mead with standard coefficients; every vertex is clamped to the box.
fn polish<F>(
    counted: &mut Counted<F>,
    start: Vec<f64>,
    bounds: &[(f64, f64)],
    settings: &OptimizerSettings,
) -> (Vec<f64>, f64, bool)
where
    F: Fn(&[f64]) -> f64,
{
    let dim = start.len();
    let mut simplex = Vec::with_capacity(dim + 1);
    simplex.push(start.clone());
    for (j, &(lo, hi)) in bounds.iter().enumerate() {
        let mut vertex = start.clone();
        let step = 0.05 * (hi - lo);
        vertex[j] = if vertex[j] + step <= hi {
            vertex[j] + step
        } else {
            vertex[j] - step
        };
        clamp_into(&mut vertex, bounds);
        simplex.push(vertex);
    }
    let mut values: Vec<f64> = simplex.iter().map(|x| counted.eval(x)).collect();

    let tol = settings.polish_tolerance;
    let mut converged = false;
    for _ in 0..settings.polish_iterations {
        let mut order: Vec<usize> = (0..=dim).collect();
        order.sort_by(|a, b| values[*a].total_cmp(&values[*b]));
        simplex = order.iter().map(|&i| simplex[i].clone()).collect();
        values = order.iter().map(|&i| values[i]).collect();

        let spread_f = values[1..]
            .iter()
            .map(|v| (v - values[0]).abs())
            .fold(0.0, f64::max);
        let spread_x = simplex[1..]
            .iter()
            .flat_map(|vertex| vertex.iter().zip(&simplex[0]).map(|(a, b)| (a - b).abs()))
            .fold(0.0, f64::max);
        if spread_f <= tol && spread_x <= tol {
            converged = true;
            break;
        }

        let mut centroid = vec![0.0; dim];
        for vertex in &simplex[..dim] {
            for (c, v) in centroid.iter_mut().zip(vertex) {
                *c += v / dim as f64;
            }
        }
        let towards = |coef: f64, from: &[f64]| -> Vec<f64> {
            let mut point: Vec<f64> = centroid
                .iter()
                .zip(from)
                .map(|(c, w)| c + coef * (c - w))
                .collect();
            clamp_into(&mut point, bounds);
            point
        };

        let worst = simplex[dim].clone();
        let reflected = towards(1.0, &worst);
        let f_reflected = counted.eval(&reflected);
        if f_reflected < values[0] {
            let expanded = towards(2.0, &worst);
            let f_expanded = counted.eval(&expanded);
            if f_expanded < f_reflected {
                simplex[dim] = expanded;
                values[dim] = f_expanded;
            } else {
                simplex[dim] = reflected;
                values[dim] = f_reflected;
            }
            continue;
        }
        if f_reflected < values[dim - 1] {
            simplex[dim] = reflected;
            values[dim] = f_reflected;
            continue;
        }
        let (contracted, f_contracted) = if f_reflected < values[dim] {
            let point = towards(0.5, &worst);
            let value = counted.eval(&point);
            (point, value)
        } else {
            let point = towards(-0.5, &worst);
            let value = counted.eval(&point);
            (point, value)
        };
        if f_contracted < values[dim].min(f_reflected) {
            simplex[dim] = contracted;
            values[dim] = f_contracted;
            continue;
        }
        let best = simplex[0].clone();
        for (vertex, value) in simplex.iter_mut().zip(values.iter_mut()).skip(1) {
            for (v, b) in vertex.iter_mut().zip(&best) {
                *v = b + 0.5 * (*v - b);
            }
            *value = counted.eval(vertex);
        }
    }

    let best = argmin(&values);
    (simplex.swap_remove(best), values[best], converged)
}
