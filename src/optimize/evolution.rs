//! Differential evolution (`best1bin`) over a bounded box.

use crate::optimize::nelder_mead::{Minimum, SearchBounds};
use rand::Rng;

/// Mutation factor is dithered uniformly over this range every generation.
const MUTATION: (f64, f64) = (0.5, 1.0);
const ATOL: f64 = 0.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvolutionOptions {
    pub popsize: usize,
    pub recombination: f64,
    pub maxiter: usize,
    pub tol: f64,
}

pub fn differential_evolution<F, R>(
    f: F,
    bounds: &SearchBounds,
    opts: &EvolutionOptions,
    seed_point: Option<&[f64]>,
    rng: &mut R,
) -> Minimum
where
    F: Fn(&[f64]) -> f64,
    R: Rng + ?Sized,
{
    let n = bounds.len();
    let npop = (opts.popsize * n).max(5);
    let eval = |x: &[f64]| {
        let v = f(x);
        if v.is_nan() {
            f64::INFINITY
        } else {
            v
        }
    };

    let mut population: Vec<Vec<f64>> = (0..npop)
        .map(|_| {
            (0..n)
                .map(|j| bounds.lo[j] + rng.random::<f64>() * bounds.width(j))
                .collect()
        })
        .collect();
    if let Some(x0) = seed_point {
        let mut x = x0.to_vec();
        bounds.clip(&mut x);
        population[0] = x;
    }
    let mut energies: Vec<f64> = population.iter().map(|x| eval(x)).collect();
    let mut nfev = npop;

    let mut best = argmin(&energies);
    let mut converged = false;
    let mut nit = 0;

    for generation in 1..=opts.maxiter {
        nit = generation;
        let scale = rng.random_range(MUTATION.0..MUTATION.1);
        for i in 0..npop {
            let (r1, r2) = pick_two(npop, i, rng);
            let fill = rng.random_range(0..n.max(1));
            let mut trial = population[i].clone();
            for j in 0..n {
                if j == fill || rng.random::<f64>() < opts.recombination {
                    trial[j] =
                        population[best][j] + scale * (population[r1][j] - population[r2][j]);
                }
            }
            bounds.clip(&mut trial);

            let energy = eval(&trial);
            nfev += 1;
            if energy <= energies[i] {
                population[i] = trial;
                energies[i] = energy;
                if energy < energies[best] {
                    best = i;
                }
            }
        }

        let mean = energies.iter().sum::<f64>() / npop as f64;
        let sd = (energies.iter().map(|e| (e - mean).powi(2)).sum::<f64>() / npop as f64).sqrt();
        if sd.is_finite() && sd <= ATOL + opts.tol * mean.abs() {
            converged = true;
            break;
        }
    }

    Minimum {
        x: population[best].clone(),
        fun: energies[best],
        nfev,
        nit,
        converged,
    }
}

fn argmin(values: &[f64]) -> usize {
    values
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

/// Two distinct member indices, both different from `exclude`.
fn pick_two<R: Rng + ?Sized>(npop: usize, exclude: usize, rng: &mut R) -> (usize, usize) {
    let mut draw = |other: Option<usize>| loop {
        let k = rng.random_range(0..npop);
        if k != exclude && Some(k) != other {
            break k;
        }
    };
    let r1 = draw(None);
    let r2 = draw(Some(r1));
    (r1, r2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    #[test]
    fn test_minimizes_rastrigin_like_surface() {
        let f = |x: &[f64]| {
            x.iter()
                .map(|v| v * v - 0.5 * (6.0 * v).cos() + 0.5)
                .sum::<f64>()
        };
        let bounds = SearchBounds::new(vec![-2.0; 2], vec![2.0; 2]);
        let opts = EvolutionOptions {
            popsize: 15,
            recombination: 0.7,
            maxiter: 300,
            tol: 1e-6,
        };
        let mut rng = SmallRng::seed_from_u64(9);
        let res = differential_evolution(f, &bounds, &opts, None, &mut rng);
        assert!(res.fun < 1e-3, "fun = {}", res.fun);
        assert!(res.x.iter().all(|v| v.abs() < 0.05));
    }

    #[test]
    fn test_seed_point_enters_population() {
        let bounds = SearchBounds::new(vec![0.0], vec![1.0]);
        let opts = EvolutionOptions {
            popsize: 5,
            recombination: 0.7,
            maxiter: 0,
            tol: 0.01,
        };
        let mut rng = SmallRng::seed_from_u64(0);
        let res = differential_evolution(
            |x| (x[0] - 0.25).abs(),
            &bounds,
            &opts,
            Some(&[0.25]),
            &mut rng,
        );
        assert_eq!(res.x, vec![0.25]);
        assert_eq!(res.fun, 0.0);
    }
}
