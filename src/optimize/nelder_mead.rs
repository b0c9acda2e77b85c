//! Bounded Nelder–Mead simplex search.
//!
//! Vertices are clipped into the box after every reflection, expansion,
//! contraction and shrink, so the objective is never evaluated outside the
//! bounds.

use serde::{Deserialize, Serialize};

const RHO: f64 = 1.0;
const CHI: f64 = 2.0;
const PSI: f64 = 0.5;
const SIGMA: f64 = 0.5;
const NONZDELT: f64 = 0.05;
const ZDELT: f64 = 0.00025;

/// Box constraints, one `(lo, hi)` pair per coordinate.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchBounds {
    pub lo: Vec<f64>,
    pub hi: Vec<f64>,
}

impl SearchBounds {
    pub fn new(lo: Vec<f64>, hi: Vec<f64>) -> Self {
        Self { lo, hi }
    }

    pub fn len(&self) -> usize {
        self.lo.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lo.is_empty()
    }

    pub fn clip(&self, x: &mut [f64]) {
        for ((xi, lo), hi) in x.iter_mut().zip(&self.lo).zip(&self.hi) {
            *xi = xi.clamp(*lo, *hi);
        }
    }

    pub fn width(&self, i: usize) -> f64 {
        self.hi[i] - self.lo[i]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NelderMeadOptions {
    pub maxiter: usize,
    pub maxfev: usize,
    pub xtol: f64,
    pub ftol: f64,
}

impl Default for NelderMeadOptions {
    fn default() -> Self {
        Self {
            maxiter: 450,
            maxfev: 450,
            xtol: 1e-4,
            ftol: 1e-4,
        }
    }
}

/// Outcome of a minimization.
#[derive(Debug, Clone, PartialEq)]
pub struct Minimum {
    pub x: Vec<f64>,
    pub fun: f64,
    pub nfev: usize,
    pub nit: usize,
    pub converged: bool,
}

pub fn nelder_mead<F>(
    mut f: F,
    x0: &[f64],
    bounds: &SearchBounds,
    opts: &NelderMeadOptions,
) -> Minimum
where
    F: FnMut(&[f64]) -> f64,
{
    let n = x0.len();
    let mut nfev = 0;
    let mut eval = |x: &[f64], nfev: &mut usize| {
        *nfev += 1;
        let v = f(x);
        if v.is_nan() {
            f64::INFINITY
        } else {
            v
        }
    };

    let mut start = x0.to_vec();
    bounds.clip(&mut start);
    if n == 0 {
        let fun = eval(&start, &mut nfev);
        return Minimum {
            x: start,
            fun,
            nfev,
            nit: 0,
            converged: true,
        };
    }

    let mut simplex = vec![start.clone()];
    for i in 0..n {
        let mut vertex = start.clone();
        vertex[i] = if vertex[i] != 0.0 {
            (1.0 + NONZDELT) * vertex[i]
        } else {
            ZDELT
        };
        // a vertex clipped back onto the start would collapse the simplex
        if vertex[i] > bounds.hi[i] {
            vertex[i] = start[i] - NONZDELT * bounds.width(i).max(ZDELT);
        }
        bounds.clip(&mut vertex);
        simplex.push(vertex);
    }
    let mut fsim: Vec<f64> = simplex.iter().map(|v| eval(v, &mut nfev)).collect();

    let mut nit = 0;
    let mut converged = false;
    while nfev < opts.maxfev && nit < opts.maxiter {
        sort_simplex(&mut simplex, &mut fsim);

        let xspread = simplex[1..]
            .iter()
            .flat_map(|v| v.iter().zip(&simplex[0]).map(|(a, b)| (a - b).abs()))
            .fold(0.0, f64::max);
        let fspread = fsim[1..]
            .iter()
            .map(|v| (v - fsim[0]).abs())
            .fold(0.0, f64::max);
        if xspread <= opts.xtol && fspread <= opts.ftol {
            converged = true;
            break;
        }

        let centroid: Vec<f64> = (0..n)
            .map(|j| simplex[..n].iter().map(|v| v[j]).sum::<f64>() / n as f64)
            .collect();
        let worst = simplex[n].clone();
        let point = |coef: f64| -> Vec<f64> {
            let mut p: Vec<f64> = centroid
                .iter()
                .zip(&worst)
                .map(|(c, w)| c + coef * (c - w))
                .collect();
            bounds.clip(&mut p);
            p
        };

        let xr = point(RHO);
        let fr = eval(&xr, &mut nfev);
        let mut shrink = false;

        if fr < fsim[0] {
            let xe = point(RHO * CHI);
            let fe = eval(&xe, &mut nfev);
            if fe < fr {
                simplex[n] = xe;
                fsim[n] = fe;
            } else {
                simplex[n] = xr;
                fsim[n] = fr;
            }
        } else if fr < fsim[n - 1] {
            simplex[n] = xr;
            fsim[n] = fr;
        } else if fr < fsim[n] {
            let xc = point(PSI * RHO);
            let fc = eval(&xc, &mut nfev);
            if fc <= fr {
                simplex[n] = xc;
                fsim[n] = fc;
            } else {
                shrink = true;
            }
        } else {
            let xcc = point(-PSI);
            let fcc = eval(&xcc, &mut nfev);
            if fcc < fsim[n] {
                simplex[n] = xcc;
                fsim[n] = fcc;
            } else {
                shrink = true;
            }
        }

        if shrink {
            let best = simplex[0].clone();
            for j in 1..=n {
                for (xi, bi) in simplex[j].iter_mut().zip(&best) {
                    *xi = bi + SIGMA * (*xi - bi);
                }
                bounds.clip(&mut simplex[j]);
                fsim[j] = eval(&simplex[j], &mut nfev);
            }
        }
        nit += 1;
    }

    sort_simplex(&mut simplex, &mut fsim);
    Minimum {
        x: simplex.swap_remove(0),
        fun: fsim[0],
        nfev,
        nit,
        converged,
    }
}

fn sort_simplex(simplex: &mut Vec<Vec<f64>>, fsim: &mut Vec<f64>) {
    let mut order: Vec<usize> = (0..fsim.len()).collect();
    order.sort_by(|&a, &b| fsim[a].total_cmp(&fsim[b]));
    *simplex = order.iter().map(|&i| simplex[i].clone()).collect();
    *fsim = order.iter().map(|&i| fsim[i]).collect();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quadratic(x: &[f64]) -> f64 {
        (x[0] - 0.3).powi(2) + 2.0 * (x[1] + 0.2).powi(2)
    }

    #[test]
    fn test_finds_interior_minimum() {
        let bounds = SearchBounds::new(vec![-1.0, -1.0], vec![1.0, 1.0]);
        let opts = NelderMeadOptions {
            maxiter: 1000,
            maxfev: 2000,
            xtol: 1e-8,
            ftol: 1e-10,
        };
        let res = nelder_mead(quadratic, &[0.9, 0.9], &bounds, &opts);
        assert!(res.converged);
        assert!((res.x[0] - 0.3).abs() < 1e-3);
        assert!((res.x[1] + 0.2).abs() < 1e-3);
    }

    #[test]
    fn test_respects_bounds() {
        let bounds = SearchBounds::new(vec![0.5, 0.0], vec![1.0, 1.0]);
        let mut outside = false;
        let res = nelder_mead(
            |x| {
                outside |= x[0] < 0.5 || x[1] < 0.0;
                quadratic(x)
            },
            &[0.8, 0.5],
            &bounds,
            &NelderMeadOptions {
                maxiter: 500,
                maxfev: 1000,
                ..Default::default()
            },
        );
        assert!(!outside);
        assert!((res.x[0] - 0.5).abs() < 2e-2);
        assert!(res.x[1].abs() < 2e-2);
    }

    #[test]
    fn test_stops_at_maxfev() {
        let bounds = SearchBounds::new(vec![-5.0; 3], vec![5.0; 3]);
        let opts = NelderMeadOptions {
            maxiter: 1000,
            maxfev: 20,
            xtol: 1e-30,
            ftol: 1e-30,
        };
        let res = nelder_mead(|x| x.iter().map(|v| v * v).sum(), &[2.0, 2.0, 2.0], &bounds, &opts);
        assert!(!res.converged);
        assert!(res.nfev < 20 + 3 + 2);
    }
}
