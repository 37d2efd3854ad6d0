//! Observation history shared with the remote solver.

use serde::Serialize;

use crate::errors::WopResult;
use crate::size_mismatch;

/// Result of telling one observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TellOutcome {
    /// The observation was appended.
    Accepted,
    /// The input was already told; the history is unchanged. `index` is the
    /// row holding the earlier observation.
    DuplicateObservation { index: usize },
}

/// Evaluated inputs `x` and outputs `y`, row `i` of one matching row `i` of
/// the other. Output rows hold the objectives followed by the constraint
/// values.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct History {
    x: Vec<Vec<f64>>,
    y: Vec<Vec<f64>>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a history from a design of experiments.
    pub fn from_doe(x: Vec<Vec<f64>>, y: Vec<Vec<f64>>) -> WopResult<Self> {
        if x.len() != y.len() {
            return Err(size_mismatch!(
                "DOE has {} inputs but {} outputs",
                x.len(),
                y.len()
            ));
        }
        Ok(Self { x, y })
    }

    /// Append an observation unless its input was already told.
    pub fn tell(&mut self, x: Vec<f64>, y: Vec<f64>) -> TellOutcome {
        if let Some(index) = self.position(&x) {
            return TellOutcome::DuplicateObservation { index };
        }
        self.x.push(x);
        self.y.push(y);
        TellOutcome::Accepted
    }

    /// Row index of an already told input.
    pub fn position(&self, x: &[f64]) -> Option<usize> {
        self.x.iter().position(|row| row.as_slice() == x)
    }

    pub fn x(&self) -> &[Vec<f64>] {
        &self.x
    }

    pub fn y(&self) -> &[Vec<f64>] {
        &self.y
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty() && self.y.is_empty()
    }

    pub fn rows(&self) -> impl Iterator<Item = (&[f64], &[f64])> {
        self.x
            .iter()
            .zip(self.y.iter())
            .map(|(x, y)| (x.as_slice(), y.as_slice()))
    }

    /// Check that inputs and outputs pair up.
    pub fn check_consistent(&self) -> WopResult<()> {
        if self.x.len() != self.y.len() {
            return Err(size_mismatch!(
                "history has {} inputs but {} outputs",
                self.x.len(),
                self.y.len()
            ));
        }
        Ok(())
    }

    /// Check every row against the expected input and output widths.
    pub fn check_widths(&self, input_width: usize, output_width: usize) -> WopResult<()> {
        for (index, (x, y)) in self.rows().enumerate() {
            check_row(index, x, y, input_width, output_width)?;
        }
        Ok(())
    }
}

/// Check a single observation against the expected widths.
pub fn check_row(
    index: usize,
    x: &[f64],
    y: &[f64],
    input_width: usize,
    output_width: usize,
) -> WopResult<()> {
    if x.len() != input_width {
        return Err(size_mismatch!(
            "row {index}: expected {input_width} inputs, got {}",
            x.len()
        ));
    }
    if y.len() != output_width {
        return Err(size_mismatch!(
            "row {index}: expected {output_width} outputs, got {}",
            y.len()
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::WopError;

    #[test]
    fn test_doe_requires_paired_rows() {
        let result = History::from_doe(vec![vec![0.0], vec![1.0]], vec![vec![4.0]]);
        assert!(matches!(result, Err(WopError::SizeMismatch { .. })));

        let history = History::from_doe(vec![vec![0.0], vec![1.0]], vec![vec![4.0], vec![1.0]])
            .unwrap();
        assert_eq!(history.len(), 2);
        assert!(history.check_consistent().is_ok());
    }

    #[test]
    fn test_tell_appends_and_detects_duplicates() {
        let mut history = History::new();
        assert!(history.is_empty());

        assert_eq!(history.tell(vec![0.5, 1.0], vec![2.0]), TellOutcome::Accepted);
        assert_eq!(history.tell(vec![0.25, 1.0], vec![3.0]), TellOutcome::Accepted);
        assert_eq!(
            history.tell(vec![0.5, 1.0], vec![9.0]),
            TellOutcome::DuplicateObservation { index: 0 }
        );

        assert_eq!(history.len(), 2);
        assert_eq!(history.x().len(), history.y().len());
        assert_eq!(history.y()[0], vec![2.0]);
    }

    #[test]
    fn test_width_checks() {
        let history =
            History::from_doe(vec![vec![0.0, 1.0]], vec![vec![1.0, -1.0]]).unwrap();
        assert!(history.check_widths(2, 2).is_ok());
        assert!(matches!(
            history.check_widths(1, 2),
            Err(WopError::SizeMismatch { .. })
        ));
        assert!(matches!(
            history.check_widths(2, 3),
            Err(WopError::SizeMismatch { .. })
        ));
    }

    #[test]
    fn test_serializes_as_parallel_arrays() {
        let history = History::from_doe(vec![vec![0.0], vec![1.0]], vec![vec![4.0], vec![1.0]])
            .unwrap();
        let value = serde_json::to_value(&history).unwrap();
        assert_eq!(value, serde_json::json!({"x": [[0.0], [1.0]], "y": [[4.0], [1.0]]}));
    }
}
