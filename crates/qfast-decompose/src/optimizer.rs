//! Gradient-based minimizers used by the circuit models.
//!
//! Every model objective supplies its analytic gradient, so the
//! [`Optimizer`] trait only needs a value-and-gradient callback. Models call
//! [`Optimizer::minimize_coarse`] many times while exploring structure and
//! [`Optimizer::minimize_fine`] once when a solution is finalized.
//!
//! [`LbfgsOptimizer`] is the built-in implementation: limited-memory BFGS
//! with two-loop recursion and an Armijo backtracking line search. Its
//! stopping rules follow the usual projected-gradient and relative-reduction
//! tests:
//!
//! - `max_i |g_i| <= gtol`
//! - `(f_k - f_{k+1}) / max(|f_k|, |f_{k+1}|, 1) <= ftol`

use std::collections::VecDeque;

use tracing::{debug, trace};

use crate::cancel::{CANCEL_CHECK_INTERVAL, CancelToken};
use crate::error::{DecomposeError, DecomposeResult};

/// Objective callback returning `(value, gradient)`.
pub type ObjectiveFn<'a> = dyn FnMut(&[f64]) -> DecomposeResult<(f64, Vec<f64>)> + 'a;

/// Why a minimization stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Largest gradient component fell below `gtol`.
    GradientTolerance,
    /// Relative reduction of the objective fell below `ftol`.
    FunctionTolerance,
    /// Iteration limit reached.
    MaxIterations,
    /// No step satisfying the sufficient-decrease condition was found.
    LineSearchFailed,
}

impl Termination {
    /// Whether this counts as convergence.
    pub fn is_converged(self) -> bool {
        matches!(self, Termination::GradientTolerance | Termination::FunctionTolerance)
    }
}

/// Result of a minimization.
#[derive(Debug, Clone)]
pub struct Minimum {
    /// Best parameters found.
    pub x: Vec<f64>,
    /// Objective value at `x`.
    pub value: f64,
    /// Iterations performed.
    pub iterations: usize,
    /// Stopping reason.
    pub termination: Termination,
}

impl Minimum {
    /// Whether the run met a convergence criterion.
    pub fn converged(&self) -> bool {
        self.termination.is_converged()
    }
}

/// Unconstrained gradient-based minimizer with coarse and fine modes.
pub trait Optimizer: Send + Sync {
    /// Registry name of this optimizer.
    fn name(&self) -> &str;

    /// Fast, loose-tolerance minimization used during exploration.
    fn minimize_coarse(
        &self,
        objective: &mut ObjectiveFn<'_>,
        x0: &[f64],
        cancel: &CancelToken,
    ) -> DecomposeResult<Minimum>;

    /// Tight-tolerance minimization used once per finalized model.
    fn minimize_fine(
        &self,
        objective: &mut ObjectiveFn<'_>,
        x0: &[f64],
        cancel: &CancelToken,
    ) -> DecomposeResult<Minimum>;
}

/// Configuration for [`LbfgsOptimizer`].
#[derive(Debug, Clone, PartialEq)]
pub struct LbfgsConfig {
    /// Maximum number of iterations.
    pub max_iterations: usize,
    /// Relative objective reduction tolerance.
    pub ftol: f64,
    /// Largest gradient component tolerance.
    pub gtol: f64,
    /// Number of curvature pairs kept for the inverse Hessian estimate.
    pub memory_size: usize,
    /// Armijo sufficient-decrease constant.
    pub line_search_tolerance: f64,
    /// Maximum number of step halvings per line search.
    pub max_line_search_iterations: usize,
}

impl LbfgsConfig {
    /// Loose tolerances for exploration.
    pub fn coarse() -> Self {
        Self {
            max_iterations: 15_000,
            ftol: 1e7 * f64::EPSILON,
            gtol: 1e-5,
            memory_size: 10,
            line_search_tolerance: 1e-4,
            max_line_search_iterations: 40,
        }
    }

    /// Tight tolerances for the final polish.
    pub fn fine() -> Self {
        Self {
            ftol: 1e-14,
            gtol: 1e-10,
            ..Self::coarse()
        }
    }

    /// Override the iteration limit.
    #[must_use]
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }
}

impl Default for LbfgsConfig {
    fn default() -> Self {
        Self::coarse()
    }
}

/// Limited-memory BFGS minimizer.
#[derive(Debug, Clone)]
pub struct LbfgsOptimizer {
    coarse: LbfgsConfig,
    fine: LbfgsConfig,
}

impl LbfgsOptimizer {
    /// Registry name.
    pub const NAME: &'static str = "LBFGSOptimizer";

    /// Optimizer with the default coarse and fine settings.
    pub fn new() -> Self {
        Self {
            coarse: LbfgsConfig::coarse(),
            fine: LbfgsConfig::fine(),
        }
    }

    /// Replace the coarse configuration.
    #[must_use]
    pub fn with_coarse(mut self, config: LbfgsConfig) -> Self {
        self.coarse = config;
        self
    }

    /// Replace the fine configuration.
    #[must_use]
    pub fn with_fine(mut self, config: LbfgsConfig) -> Self {
        self.fine = config;
        self
    }

    /// Run L-BFGS from `x0` under `config`.
    pub fn minimize(
        config: &LbfgsConfig,
        objective: &mut ObjectiveFn<'_>,
        x0: &[f64],
        cancel: &CancelToken,
    ) -> DecomposeResult<Minimum> {
        let mut x = x0.to_vec();
        let (mut f, mut g) = objective(&x)?;
        check_gradient(&g, x.len())?;

        let mut history: VecDeque<CurvaturePair> = VecDeque::with_capacity(config.memory_size);
        let mut termination = Termination::MaxIterations;
        let mut iterations = 0;

        while iterations < config.max_iterations {
            if iterations % CANCEL_CHECK_INTERVAL == 0 && cancel.is_cancelled() {
                return Err(DecomposeError::Cancelled);
            }
            if max_abs(&g) <= config.gtol {
                termination = Termination::GradientTolerance;
                break;
            }

            let mut direction = compute_lbfgs_direction(&g, &history);
            let mut slope = dot(&g, &direction);
            if slope >= 0.0 || slope.is_nan() {
                history.clear();
                direction = g.iter().map(|v| -v).collect();
                slope = -dot(&g, &g);
            }

            let initial_step = if history.is_empty() {
                1.0 / norm(&g).max(1.0)
            } else {
                1.0
            };

            let Some((step, x_new, f_new, g_new)) =
                line_search(config, objective, &x, f, &direction, slope, initial_step)?
            else {
                if history.is_empty() {
                    termination = Termination::LineSearchFailed;
                    break;
                }
                history.clear();
                iterations += 1;
                continue;
            };
            iterations += 1;

            let s: Vec<f64> = direction.iter().map(|d| step * d).collect();
            let y: Vec<f64> = g_new.iter().zip(&g).map(|(a, b)| a - b).collect();
            let sy = dot(&s, &y);
            if sy > f64::EPSILON * dot(&y, &y) {
                if history.len() == config.memory_size {
                    history.pop_front();
                }
                history.push_back(CurvaturePair { rho: 1.0 / sy, s, y });
            }

            let reduction = (f - f_new) / f.abs().max(f_new.abs()).max(1.0);
            x = x_new;
            f = f_new;
            g = g_new;

            if reduction <= config.ftol {
                termination = Termination::FunctionTolerance;
                break;
            }
        }

        trace!(iterations, value = f, ?termination, "L-BFGS finished");
        Ok(Minimum {
            x,
            value: f,
            iterations,
            termination,
        })
    }
}

impl Default for LbfgsOptimizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Optimizer for LbfgsOptimizer {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn minimize_coarse(
        &self,
        objective: &mut ObjectiveFn<'_>,
        x0: &[f64],
        cancel: &CancelToken,
    ) -> DecomposeResult<Minimum> {
        Self::minimize(&self.coarse, objective, x0, cancel)
    }

    fn minimize_fine(
        &self,
        objective: &mut ObjectiveFn<'_>,
        x0: &[f64],
        cancel: &CancelToken,
    ) -> DecomposeResult<Minimum> {
        let result = Self::minimize(&self.fine, objective, x0, cancel)?;
        debug!(
            iterations = result.iterations,
            value = result.value,
            termination = ?result.termination,
            "fine optimization finished"
        );
        Ok(result)
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

struct CurvaturePair {
    s: Vec<f64>,
    y: Vec<f64>,
    rho: f64,
}

#[inline]
fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[inline]
fn norm(a: &[f64]) -> f64 {
    dot(a, a).sqrt()
}

#[inline]
fn max_abs(a: &[f64]) -> f64 {
    a.iter().fold(0.0, |m, v| m.max(v.abs()))
}

fn check_gradient(g: &[f64], expected: usize) -> DecomposeResult<()> {
    if g.len() != expected {
        return Err(DecomposeError::InvalidConfig(format!(
            "objective returned a gradient of length {}, expected {expected}",
            g.len()
        )));
    }
    Ok(())
}

/// `-H g` from the stored curvature pairs.
fn compute_lbfgs_direction(g: &[f64], history: &VecDeque<CurvaturePair>) -> Vec<f64> {
    let mut q = g.to_vec();
    let mut alphas = vec![0.0; history.len()];

    for (i, pair) in history.iter().enumerate().rev() {
        alphas[i] = pair.rho * dot(&pair.s, &q);
        for (qj, yj) in q.iter_mut().zip(&pair.y) {
            *qj -= alphas[i] * yj;
        }
    }

    let gamma = history
        .back()
        .map_or(1.0, |pair| dot(&pair.s, &pair.y) / dot(&pair.y, &pair.y));
    for qj in &mut q {
        *qj *= gamma;
    }

    for (pair, alpha) in history.iter().zip(&alphas) {
        let beta = pair.rho * dot(&pair.y, &q);
        for (qj, sj) in q.iter_mut().zip(&pair.s) {
            *qj += sj * (alpha - beta);
        }
    }

    q.iter().map(|v| -v).collect()
}

type LineSearchStep = (f64, Vec<f64>, f64, Vec<f64>);

/// Backtracking search for the Armijo condition along `direction`.
fn line_search(
    config: &LbfgsConfig,
    objective: &mut ObjectiveFn<'_>,
    x: &[f64],
    f: f64,
    direction: &[f64],
    slope: f64,
    initial_step: f64,
) -> DecomposeResult<Option<LineSearchStep>> {
    let mut step = initial_step;
    for _ in 0..config.max_line_search_iterations {
        let candidate: Vec<f64> = x.iter().zip(direction).map(|(xi, di)| xi + step * di).collect();
        let (f_new, g_new) = objective(&candidate)?;
        if f_new.is_finite() && f_new <= f + config.line_search_tolerance * step * slope {
            check_gradient(&g_new, x.len())?;
            return Ok(Some((step, candidate, f_new, g_new)));
        }
        step *= 0.5;
    }
    Ok(None)
}
