//! Damped least-squares engine shared by the profile models
//!
//! Levenberg-Marquardt with analytic Jacobians over a fixed number of
//! parameters. Priors enter the objective as penalty residuals, turning the
//! fit into maximum-a-posteriori estimation.

use nalgebra::{Const, DimMin, SMatrix, SVector, ToTypenum};
use ndarray::ArrayView1;

use crate::error::Error;
use crate::model::prior::NormalPrior;

pub(crate) struct LmSettings {
    pub max_iterations: usize,
    pub convergence_threshold: f64,
    pub initial_lambda: f64,
    pub lambda_up: f64,
    pub lambda_down: f64,
}

impl Default for LmSettings {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            convergence_threshold: 1e-8,
            initial_lambda: 1e-3,
            lambda_up: 10.0,
            lambda_down: 0.1,
        }
    }
}

/// A model of `N` parameters fittable by [levenberg_marquardt].
pub(crate) trait LmProblem<const N: usize> {
    /// Model value at coordinate `x`.
    fn value(&self, x: f64, params: &SVector<f64, N>) -> f64;

    /// Partial derivatives of the model value with respect to each parameter.
    fn gradient(&self, x: f64, params: &SVector<f64, N>, grad: &mut SVector<f64, N>);

    /// Project a parameter step back into the model's feasible region.
    fn clamp(&self, params: &mut SVector<f64, N>);

    /// Per-parameter priors; `None` entries are unconstrained.
    fn priors(&self) -> [Option<NormalPrior>; N] {
        [None; N]
    }
}

fn chi2<const N: usize, P: LmProblem<N>>(
    problem: &P,
    data: ArrayView1<'_, f64>,
    params: &SVector<f64, N>,
) -> f64 {
    let data_term: f64 = data
        .iter()
        .enumerate()
        .map(|(i, &y)| {
            let r = y - problem.value(i as f64, params);
            r * r
        })
        .sum();
    let prior_term: f64 = problem
        .priors()
        .iter()
        .zip(params.iter())
        .filter_map(|(prior, &p)| prior.map(|prior| prior.residual(p).powi(2)))
        .sum();
    data_term + prior_term
}

/// Fit `problem` to `data` sampled at integer coordinates `0..data.len()`.
///
/// Returns the best parameter vector found. A singular normal-equation
/// system terminates the iteration and yields the parameters accepted so
/// far; degenerate data (for example an all-zero profile) is therefore not
/// an error. [Error::SingularFit] is reserved for a parameter vector that
/// ends up non-finite.
pub(crate) fn levenberg_marquardt<const N: usize, P: LmProblem<N>>(
    problem: &P,
    data: ArrayView1<'_, f64>,
    init: SVector<f64, N>,
    settings: &LmSettings,
) -> Result<SVector<f64, N>, Error>
where
    Const<N>: ToTypenum + DimMin<Const<N>, Output = Const<N>>,
{
    if data.len() < N {
        return Err(Error::ShortProjection {
            actual: data.len(),
            minimum: N,
        });
    }

    let priors = problem.priors();
    let mut params = init;
    problem.clamp(&mut params);

    let mut lambda = settings.initial_lambda;
    let mut best_chi2 = chi2(problem, data, &params);

    for _iteration in 0..settings.max_iterations {
        // Accumulate J^T J and J^T r over the data and the prior penalties
        let mut hessian = SMatrix::<f64, N, N>::zeros();
        let mut gradient = SVector::<f64, N>::zeros();
        let mut jac = SVector::<f64, N>::zeros();

        for (i, &y) in data.iter().enumerate() {
            let x = i as f64;
            let residual = y - problem.value(x, &params);
            problem.gradient(x, &params, &mut jac);
            hessian += jac * jac.transpose();
            gradient += jac * residual;
        }
        for (k, prior) in priors.iter().enumerate() {
            if let Some(prior) = prior {
                let d = prior.residual_derivative();
                hessian[(k, k)] += d * d;
                gradient[k] -= d * prior.residual(params[k]);
            }
        }

        // Marquardt damping of the diagonal
        let mut damped = hessian;
        for k in 0..N {
            damped[(k, k)] *= 1.0 + lambda;
        }

        let step = match damped.lu().solve(&gradient) {
            Some(step) if step.iter().all(|v| v.is_finite()) => step,
            _ => break,
        };

        let mut candidate = params + step;
        problem.clamp(&mut candidate);
        let candidate_chi2 = chi2(problem, data, &candidate);

        if candidate_chi2 < best_chi2 {
            params = candidate;
            best_chi2 = candidate_chi2;
            lambda *= settings.lambda_down;

            if step.amax() < settings.convergence_threshold {
                break;
            }
        } else {
            lambda *= settings.lambda_up;
            if lambda > 1e10 {
                break;
            }
        }
    }

    if params.iter().all(|v| v.is_finite()) {
        Ok(params)
    } else {
        Err(Error::SingularFit)
    }
}
