//! Constraint-aware selection of the best observed point.

use tracing::debug;
use wop_types::{ConstraintSpec, History, OptimizationConfig, WopError, WopResult};

/// An observed row picked out of the history.
#[derive(Debug, Clone, PartialEq)]
pub struct BestPoint {
    /// Row index in the history.
    pub index: usize,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

/// Checks output rows (objectives followed by constraint values) against
/// the constraint specs.
#[derive(Debug, Clone, Copy)]
pub struct ConstraintFilter<'a> {
    objective_count: usize,
    constraints: &'a [ConstraintSpec],
}

impl<'a> ConstraintFilter<'a> {
    pub fn new(objective_count: usize, constraints: &'a [ConstraintSpec]) -> Self {
        Self {
            objective_count,
            constraints,
        }
    }

    pub fn from_config(config: &'a OptimizationConfig) -> Self {
        Self::new(config.objective_count(), config.constraints())
    }

    /// Whether every constraint value in `y` is satisfied within tolerance.
    pub fn is_feasible(&self, y: &[f64]) -> bool {
        if y.len() < self.objective_count + self.constraints.len() {
            return false;
        }
        self.constraints
            .iter()
            .zip(&y[self.objective_count..])
            .all(|(spec, &value)| spec.is_satisfied(value))
    }

    /// Lowest first objective among feasible rows.
    ///
    /// Takes the best remaining row by objective, keeps it if feasible and
    /// otherwise discards it and tries again. Discarded rows are never
    /// reconsidered; ties go to the earliest row. Rows whose objective is NaN
    /// are never candidates. An empty pool, including an empty history,
    /// yields [`WopError::ValidOptimumNotFound`].
    pub fn best(&self, history: &History) -> WopResult<BestPoint> {
        history.check_consistent()?;

        let y = history.y();
        let mut candidates: Vec<usize> = (0..history.len())
            .filter(|&index| !objective(&y[index]).is_nan())
            .collect();

        while let Some(pos) = candidates
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| objective(&y[**a]).total_cmp(&objective(&y[**b])))
            .map(|(pos, _)| pos)
        {
            let index = candidates[pos];
            if self.is_feasible(&y[index]) {
                return Ok(BestPoint {
                    index,
                    x: history.x()[index].clone(),
                    y: y[index].clone(),
                });
            }
            debug!("Discarding infeasible row {}: {:?}", index, y[index]);
            candidates.remove(pos);
        }

        Err(WopError::ValidOptimumNotFound)
    }

    /// Feasible rows not dominated by any other feasible row, all objectives
    /// minimized. Rows keep their history order.
    pub fn pareto_front(&self, history: &History) -> Vec<BestPoint> {
        let feasible: Vec<(usize, &[f64])> = history
            .y()
            .iter()
            .enumerate()
            .filter(|(_, y)| self.is_feasible(y))
            .map(|(index, y)| (index, &y[..self.objective_count]))
            .filter(|(_, objectives)| !objectives.iter().any(|v| v.is_nan()))
            .collect();

        feasible
            .iter()
            .filter(|(_, a)| !feasible.iter().any(|(_, b)| dominates(b, a)))
            .map(|&(index, _)| BestPoint {
                index,
                x: history.x()[index].clone(),
                y: history.y()[index].clone(),
            })
            .collect()
    }
}

fn objective(y: &[f64]) -> f64 {
    y.first().copied().unwrap_or(f64::INFINITY)
}

/// `a` is no worse than `b` everywhere and strictly better somewhere.
fn dominates(a: &[f64], b: &[f64]) -> bool {
    let mut strictly_better = false;
    for (&ai, &bi) in a.iter().zip(b) {
        if ai > bi {
            return false;
        }
        if ai < bi {
            strictly_better = true;
        }
    }
    strictly_better
}
