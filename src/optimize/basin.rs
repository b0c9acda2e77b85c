//! Basin hopping: random perturbation, local minimization and a Metropolis
//! acceptance test, with an adaptive stepsize.

use crate::optimize::callbacks::BasinTracker;
use crate::optimize::nelder_mead::{nelder_mead, Minimum, NelderMeadOptions, SearchBounds};
use rand::Rng;

const TARGET_ACCEPT_RATE: f64 = 0.5;
const STEPWISE_FACTOR: f64 = 0.9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BasinOptions {
    pub niter: usize,
    pub temperature: f64,
    pub stepsize: f64,
    pub interval: usize,
    pub nsuccess: usize,
    pub local: NelderMeadOptions,
}

pub fn basinhopping<F, R>(
    f: F,
    x0: &[f64],
    bounds: &SearchBounds,
    scalars: &[f64],
    opts: &BasinOptions,
    rng: &mut R,
    tracker: &mut BasinTracker,
) -> Minimum
where
    F: Fn(&[f64]) -> f64,
    R: Rng + ?Sized,
{
    let mut current = nelder_mead(&f, x0, bounds, &opts.local);
    let mut nfev = current.nfev;
    tracker.on_minimum(&current.x, current.fun, true);
    let mut best = current.clone();

    let mut stepsize = opts.stepsize;
    let mut naccept = 0usize;
    let mut since_improved = 0usize;
    let mut nit = 0;

    for hop in 1..=opts.niter {
        nit = hop;
        let mut trial: Vec<f64> = current
            .x
            .iter()
            .zip(scalars)
            .map(|(x, s)| x + rng.random_range(-1.0_f64..=1.0) * stepsize * s)
            .collect();
        bounds.clip(&mut trial);

        let local = nelder_mead(&f, &trial, bounds, &opts.local);
        nfev += local.nfev;

        let accept = local.fun < current.fun || {
            let w = ((current.fun - local.fun) / opts.temperature).exp();
            opts.temperature > 0.0 && rng.random::<f64>() < w
        };
        let improved = tracker.on_minimum(&local.x, local.fun, accept);
        if local.fun < best.fun {
            best = local.clone();
        }
        if accept {
            naccept += 1;
            current = local;
        }

        if improved {
            since_improved = 0;
        } else {
            since_improved += 1;
        }

        if opts.interval > 0 && hop % opts.interval == 0 {
            let rate = naccept as f64 / hop as f64;
            if rate > TARGET_ACCEPT_RATE {
                stepsize /= STEPWISE_FACTOR;
            } else {
                stepsize *= STEPWISE_FACTOR;
            }
        }

        if opts.nsuccess > 0 && since_improved >= opts.nsuccess {
            tracing::debug!("No new global minimum in {} hops, stopping", opts.nsuccess);
            break;
        }
    }

    tracker.finish();
    Minimum {
        x: best.x,
        fun: best.fun,
        nfev,
        nit,
        converged: best.converged,
    }
}
