//! Bridge from reprojection problems to the `levenberg-marquardt` crate.
//!
//! Problems are written against the full parameter vector. A mask of free
//! entries picks the sub-vector the optimiser actually sees; frozen entries
//! never move.

use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt, TerminationReason};
use log::trace;
use nalgebra::{storage::Owned, DMatrix, DVector, Dyn};
use serde::{Deserialize, Serialize};

/// Nonlinear least-squares model over a full parameter vector.
pub trait NllsProblem {
    fn residuals(&self, params: &DVector<f64>) -> DVector<f64>;

    /// Jacobian of [`Self::residuals`]; forward differences unless overridden.
    ///
    /// Columns with `free[j] == false` may be left at zero.
    fn jacobian(&self, params: &DVector<f64>, free: &[bool]) -> DMatrix<f64> {
        forward_difference_jacobian(|p| self.residuals(p), params, free)
    }
}

/// Relative step used for numeric differentiation.
const FD_STEP: f64 = 1e-6;

#[inline]
pub(crate) fn fd_step(x: f64) -> f64 {
    FD_STEP * x.abs().max(1.0)
}

/// Forward-difference Jacobian of `f` at `params`, skipping frozen columns.
pub fn forward_difference_jacobian(
    f: impl Fn(&DVector<f64>) -> DVector<f64>,
    params: &DVector<f64>,
    free: &[bool],
) -> DMatrix<f64> {
    let r0 = f(params);
    let mut jac = DMatrix::zeros(r0.len(), params.len());
    let mut shifted = params.clone();
    for j in (0..params.len()).filter(|&j| free.get(j).copied().unwrap_or(true)) {
        let h = fd_step(params[j]);
        shifted[j] = params[j] + h;
        let r = f(&shifted);
        jac.set_column(j, &((r - &r0) / h));
        shifted[j] = params[j];
    }
    jac
}

/// Exposes the free entries of an [`NllsProblem`] to the optimiser.
struct FreeParams<'a, P: ?Sized> {
    problem: &'a P,
    full: DVector<f64>,
    free: &'a [bool],
    active: Vec<usize>,
}

impl<P: NllsProblem + ?Sized> LeastSquaresProblem<f64, Dyn, Dyn> for FreeParams<'_, P> {
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, Dyn>;
    type ParameterStorage = Owned<f64, Dyn>;

    fn set_params(&mut self, x: &DVector<f64>) {
        for (k, &j) in self.active.iter().enumerate() {
            self.full[j] = x[k];
        }
    }

    fn params(&self) -> DVector<f64> {
        DVector::from_iterator(self.active.len(), self.active.iter().map(|&j| self.full[j]))
    }

    fn residuals(&self) -> Option<DVector<f64>> {
        Some(self.problem.residuals(&self.full))
    }

    fn jacobian(&self) -> Option<DMatrix<f64>> {
        Some(
            self.problem
                .jacobian(&self.full, self.free)
                .select_columns(&self.active),
        )
    }
}

#[derive(Debug)]
pub struct LmReport {
    /// Full parameter vector, frozen entries included.
    pub params: DVector<f64>,
    pub initial_cost: f64,
    /// Sum of squared residuals at `params`.
    pub final_cost: f64,
    /// Residual evaluations spent by the optimiser; 0 when nothing was free.
    pub evaluations: usize,
    pub termination: TerminationReason,
}

// `TerminationReason` does not implement `Clone`, so `Clone` is written out by hand.
impl Clone for LmReport {
    fn clone(&self) -> Self {
        let termination = match &self.termination {
            TerminationReason::User(s) => TerminationReason::User(s),
            TerminationReason::Numerical(s) => TerminationReason::Numerical(s),
            TerminationReason::ResidualsZero => TerminationReason::ResidualsZero,
            TerminationReason::Orthogonal => TerminationReason::Orthogonal,
            TerminationReason::Converged { ftol, xtol } => TerminationReason::Converged {
                ftol: *ftol,
                xtol: *xtol,
            },
            TerminationReason::NoImprovementPossible(s) => {
                TerminationReason::NoImprovementPossible(s)
            }
            TerminationReason::LostPatience => TerminationReason::LostPatience,
            TerminationReason::NoParameters => TerminationReason::NoParameters,
            TerminationReason::NoResiduals => TerminationReason::NoResiduals,
            TerminationReason::WrongDimensions(s) => TerminationReason::WrongDimensions(s),
        };
        Self {
            params: self.params.clone(),
            initial_cost: self.initial_cost,
            final_cost: self.final_cost,
            evaluations: self.evaluations,
            termination,
        }
    }
}

impl LmReport {
    pub fn converged(&self) -> bool {
        self.termination.was_successful()
    }
}

/// Tolerances handed to [`LevenbergMarquardt`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LmOptions {
    /// Relative reduction of the cost below which the run ends.
    pub ftol: f64,
    /// Relative change of the parameters below which the run ends.
    pub xtol: f64,
    /// Orthogonality between residuals and Jacobian columns below which the run ends.
    pub gtol: f64,
    /// Evaluation budget, as a multiple of `free parameters + 1`.
    pub patience: usize,
}

impl Default for LmOptions {
    fn default() -> Self {
        Self {
            ftol: 1e-12,
            xtol: 1e-12,
            gtol: 1e-12,
            patience: 100,
        }
    }
}

fn tolerance(v: f64) -> f64 {
    if v.is_finite() && v >= 0.0 {
        v
    } else {
        0.0
    }
}

impl LmOptions {
    fn solver(&self) -> LevenbergMarquardt<f64> {
        LevenbergMarquardt::new()
            .with_ftol(tolerance(self.ftol))
            .with_xtol(tolerance(self.xtol))
            .with_gtol(tolerance(self.gtol))
            .with_patience(self.patience.max(1))
    }

    /// Minimise `problem` from `initial`, keeping entries with `free[j] == false` fixed.
    pub fn minimize<P: NllsProblem + ?Sized>(
        &self,
        problem: &P,
        initial: DVector<f64>,
        free: &[bool],
    ) -> LmReport {
        let active: Vec<usize> = (0..initial.len())
            .filter(|&j| free.get(j).copied().unwrap_or(true))
            .collect();
        let initial_cost = problem.residuals(&initial).norm_squared();

        if active.is_empty() || !initial_cost.is_finite() {
            return LmReport {
                params: initial,
                initial_cost,
                final_cost: initial_cost,
                evaluations: 0,
                termination: TerminationReason::NoParameters,
            };
        }

        let wrapper = FreeParams {
            problem,
            full: initial,
            free,
            active,
        };
        let (wrapper, report) = self.solver().minimize(wrapper);
        let final_cost = problem.residuals(&wrapper.full).norm_squared();
        trace!(
            "lm: cost {initial_cost:.6e} -> {final_cost:.6e} in {} evaluations ({:?})",
            report.number_of_evaluations,
            report.termination
        );

        LmReport {
            params: wrapper.full,
            initial_cost,
            final_cost,
            evaluations: report.number_of_evaluations,
            termination: report.termination,
        }
    }
}
