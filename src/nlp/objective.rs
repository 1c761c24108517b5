//! The least-squares objective of a parameter table against observed data.
//!
//! The active parameters are stored kind by kind, each kind holding one
//! value per oscillator (the column-major table layout restricted to the
//! active columns). Passive values are taken from a template table.

use super::config::{HessianMethod, VariancePenalty};
use super::mode::ParameterMode;
use crate::error::{FidFitError, Result};
use crate::model::ModelGrid;
use crate::problem::{Evaluation, Problem};
use crate::table::{wrap_phase, Oscillator, ParamKind, ParameterTable};
use ndarray::{Array1, Array2};
use num_complex::Complex64;
use std::f64::consts::PI;

/// `Σ conj(a_k)·b_k`
fn inner(a: &Array1<Complex64>, b: &Array1<Complex64>) -> Complex64 {
    a.iter().zip(b.iter()).map(|(x, y)| x.conj() * y).sum()
}

/// `F(θ) = ‖y − x(θ)‖² + w·Var(kind)`.
#[derive(Debug, Clone)]
pub struct FidObjective {
    data: Array1<Complex64>,
    grid: ModelGrid,
    template: ParameterTable,
    kinds: Vec<ParamKind>,
    hessian: HessianMethod,
    penalty: Option<VariancePenalty>,
}

impl FidObjective {
    /// Build an objective for flattened `data` on `grid`.
    ///
    /// `template` provides the number of oscillators and the passive values.
    pub fn new(
        data: Array1<Complex64>,
        grid: ModelGrid,
        template: ParameterTable,
        mode: ParameterMode,
    ) -> Result<Self> {
        if data.len() != grid.len() {
            return Err(FidFitError::DimensionMismatch(format!(
                "{} data points for a model grid of {} points",
                data.len(),
                grid.len()
            )));
        }
        if template.dim() != grid.dim() {
            return Err(FidFitError::DimensionMismatch(format!(
                "the parameter table is {}D but the signal is {}D",
                template.dim(),
                grid.dim()
            )));
        }
        let kinds = mode.kinds(template.dim());
        if kinds.is_empty() {
            return Err(FidFitError::InvalidParameter(
                "at least one parameter kind must be active".to_string(),
            ));
        }

        Ok(Self {
            data,
            grid,
            template,
            kinds,
            hessian: HessianMethod::default(),
            penalty: None,
        })
    }

    pub fn with_hessian(mut self, hessian: HessianMethod) -> Self {
        self.hessian = hessian;
        self
    }

    /// Add a variance penalty. Needs at least two oscillators.
    pub fn with_penalty(mut self, penalty: Option<VariancePenalty>) -> Result<Self> {
        if let Some(p) = penalty {
            if self.template.len() < 2 {
                return Err(FidFitError::AmbiguousConfiguration(format!(
                    "a {} variance penalty needs at least two oscillators, the table has {}",
                    p.kind,
                    self.template.len()
                )));
            }
            if !ParamKind::all(self.template.dim()).contains(&p.kind) {
                return Err(FidFitError::DimensionMismatch(format!(
                    "cannot penalise {} of a {}D table",
                    p.kind,
                    self.template.dim()
                )));
            }
            if !p.weight.is_finite() || p.weight < 0.0 {
                return Err(FidFitError::InvalidParameter(format!(
                    "penalty weight must be finite and non-negative, got {}",
                    p.weight
                )));
            }
        }
        self.penalty = penalty;
        Ok(self)
    }

    pub fn oscillator_count(&self) -> usize {
        self.template.len()
    }

    /// Active kinds in layout order.
    pub fn kinds(&self) -> &[ParamKind] {
        &self.kinds
    }

    /// Number of complex data points.
    pub fn point_count(&self) -> usize {
        self.data.len()
    }

    fn index(&self, kind: usize, osc: usize) -> usize {
        kind * self.template.len() + osc
    }

    fn position(&self, kind: ParamKind) -> Option<usize> {
        self.kinds.iter().position(|&k| k == kind)
    }

    /// The active parameters of a table with the template's shape.
    pub fn params_from_table(&self, table: &ParameterTable) -> Result<Array1<f64>> {
        if table.len() != self.template.len() || table.dim() != self.template.dim() {
            return Err(FidFitError::DimensionMismatch(format!(
                "expected a {}D table of {} oscillators, got {}D with {}",
                self.template.dim(),
                self.template.len(),
                table.dim(),
                table.len()
            )));
        }
        let m = table.len();
        let mut params = Array1::zeros(self.kinds.len() * m);
        for (k, kind) in self.kinds.iter().enumerate() {
            for (j, osc) in table.iter().enumerate() {
                params[k * m + j] = kind.value(osc);
            }
        }
        Ok(params)
    }

    /// The active parameters of the template.
    pub fn initial_params(&self) -> Result<Array1<f64>> {
        self.params_from_table(&self.template)
    }

    fn oscillators(&self, params: &Array1<f64>) -> Result<Vec<Oscillator>> {
        let m = self.template.len();
        if params.len() != self.kinds.len() * m {
            return Err(FidFitError::DimensionMismatch(format!(
                "expected {} parameters, got {}",
                self.kinds.len() * m,
                params.len()
            )));
        }
        let mut rows = self.template.oscillators().to_vec();
        for (k, kind) in self.kinds.iter().enumerate() {
            for (j, osc) in rows.iter_mut().enumerate() {
                kind.set(osc, params[k * m + j]);
            }
        }
        Ok(rows)
    }

    /// The full table for a parameter vector.
    pub fn table(&self, params: &Array1<f64>) -> Result<ParameterTable> {
        ParameterTable::new(self.template.dim(), self.oscillators(params)?)
    }

    fn model(&self, oscillators: &[Oscillator], bases: &[Array1<Complex64>]) -> Array1<Complex64> {
        let mut model = Array1::zeros(self.grid.len());
        for (osc, basis) in oscillators.iter().zip(bases) {
            model.scaled_add(Complex64::new(osc.amplitude, 0.0), basis);
        }
        model
    }

    /// `y − x(θ)`, flattened.
    pub fn residual(&self, params: &Array1<f64>) -> Result<Array1<Complex64>> {
        let oscillators = self.oscillators(params)?;
        let bases: Vec<_> = oscillators.iter().map(|o| self.grid.basis(o)).collect();
        Ok(&self.data - &self.model(&oscillators, &bases))
    }

    fn penalty_cost(&self, oscillators: &[Oscillator]) -> f64 {
        match self.penalty {
            None => 0.0,
            Some(p) => {
                let m = oscillators.len() as f64;
                let values: Vec<f64> = oscillators.iter().map(|o| p.kind.value(o)).collect();
                let mean = values.iter().sum::<f64>() / m;
                p.weight * values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / m
            }
        }
    }

    /// Derivative columns `∂x/∂θ_i` in parameter order.
    fn jacobian(
        &self,
        oscillators: &[Oscillator],
        bases: &[Array1<Complex64>],
    ) -> Vec<Array1<Complex64>> {
        self.kinds
            .iter()
            .flat_map(|&kind| {
                oscillators
                    .iter()
                    .zip(bases)
                    .map(move |(osc, basis)| self.grid.derivative(osc, basis, kind))
            })
            .collect()
    }

    fn gauss_newton(jacobian: &[Array1<Complex64>]) -> Array2<f64> {
        let n = jacobian.len();
        let mut hessian = Array2::zeros((n, n));
        for i in 0..n {
            for j in i..n {
                let h = 2.0 * inner(&jacobian[i], &jacobian[j]).re;
                hessian[[i, j]] = h;
                hessian[[j, i]] = h;
            }
        }
        hessian
    }

    /// `2·Re(JᴴJ)` without any penalty contribution.
    pub fn gauss_newton_hessian(&self, params: &Array1<f64>) -> Result<Array2<f64>> {
        let oscillators = self.oscillators(params)?;
        let bases: Vec<_> = oscillators.iter().map(|o| self.grid.basis(o)).collect();
        Ok(Self::gauss_newton(&self.jacobian(&oscillators, &bases)))
    }
}

impl Problem for FidObjective {
    fn parameter_count(&self) -> usize {
        self.kinds.len() * self.template.len()
    }

    fn cost(&self, params: &Array1<f64>) -> Result<f64> {
        let oscillators = self.oscillators(params)?;
        let bases: Vec<_> = oscillators.iter().map(|o| self.grid.basis(o)).collect();
        let residual = &self.data - &self.model(&oscillators, &bases);
        let rss: f64 = residual.iter().map(|r| r.norm_sqr()).sum();
        Ok(rss + self.penalty_cost(&oscillators))
    }

    fn evaluate(&self, params: &Array1<f64>) -> Result<Evaluation> {
        let oscillators = self.oscillators(params)?;
        let m = oscillators.len();
        let bases: Vec<_> = oscillators.iter().map(|o| self.grid.basis(o)).collect();
        let residual = &self.data - &self.model(&oscillators, &bases);
        let rss: f64 = residual.iter().map(|r| r.norm_sqr()).sum();

        let jacobian = self.jacobian(&oscillators, &bases);
        let gradient = Array1::from_iter(jacobian.iter().map(|col| -2.0 * inner(col, &residual).re));
        let mut hessian = Self::gauss_newton(&jacobian);

        if self.hessian == HessianMethod::Exact {
            // −2·Re Σ conj(r)·∂²x; parameters of different oscillators do not couple.
            for (j, (osc, basis)) in oscillators.iter().zip(&bases).enumerate() {
                for (a, &ka) in self.kinds.iter().enumerate() {
                    for (b, &kb) in self.kinds.iter().enumerate().skip(a) {
                        let second = self.grid.second_derivative(osc, basis, ka, kb);
                        let h = -2.0 * inner(&residual, &second).re;
                        let (p, q) = (self.index(a, j), self.index(b, j));
                        hessian[[p, q]] += h;
                        if p != q {
                            hessian[[q, p]] += h;
                        }
                    }
                }
            }
        }

        let mut gradient = gradient;
        if let Some(p) = self.penalty {
            if let Some(k) = self.position(p.kind) {
                let mf = m as f64;
                let values: Vec<f64> = oscillators.iter().map(|o| p.kind.value(o)).collect();
                let mean = values.iter().sum::<f64>() / mf;
                for i in 0..m {
                    gradient[self.index(k, i)] += 2.0 * p.weight * (values[i] - mean) / mf;
                    for j in 0..m {
                        let delta = if i == j { 1.0 } else { 0.0 };
                        hessian[[self.index(k, i), self.index(k, j)]] +=
                            2.0 * p.weight * (delta - 1.0 / mf) / mf;
                    }
                }
            }
        }

        Ok(Evaluation {
            cost: rss + self.penalty_cost(&oscillators),
            gradient,
            hessian,
        })
    }

    /// Flip negative amplitudes (shifting the phase by π) and wrap phases.
    ///
    /// Amplitudes are only repaired while the phase is active; otherwise the
    /// final table is normalised instead.
    fn normalize(&self, params: &mut Array1<f64>) -> bool {
        let m = self.template.len();
        let phase = self.position(ParamKind::Phase);
        let mut changed = false;

        if let (Some(a), Some(p)) = (self.position(ParamKind::Amplitude), phase) {
            for j in 0..m {
                if params[a * m + j] < 0.0 {
                    params[a * m + j] = -params[a * m + j];
                    params[p * m + j] += PI;
                    changed = true;
                }
            }
        }
        if let Some(p) = phase {
            for j in 0..m {
                let wrapped = wrap_phase(params[p * m + j]);
                if wrapped != params[p * m + j] {
                    params[p * m + j] = wrapped;
                    changed = true;
                }
            }
        }
        changed
    }
}
