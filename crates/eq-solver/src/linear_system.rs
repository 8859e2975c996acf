//! Systems of linear equations `A x = b`.

use crate::analysis_model::DofGraph;
use crate::error::{SolverError, SolverResult};
use nalgebra::{DMatrix, DVector, Dyn, LU};

pub trait LinearSystem {
    fn name(&self) -> &str;

    /// Resize for the equations in `graph`. Clears A, b and x.
    fn set_size(&mut self, graph: &DofGraph) -> SolverResult<()>;

    fn size(&self) -> usize;

    fn zero_a(&mut self);

    fn zero_b(&mut self);

    /// Scatter `fact * m` into A; `None` rows/columns are skipped.
    fn add_a(&mut self, m: &DMatrix<f64>, eq_ids: &[Option<usize>], fact: f64)
    -> SolverResult<()>;

    /// Scatter `fact * v` into b; `None` rows are skipped.
    fn add_b(&mut self, v: &DVector<f64>, eq_ids: &[Option<usize>], fact: f64)
    -> SolverResult<()>;

    /// Solve for x. A is only refactored if it changed since the last solve.
    fn solve(&mut self) -> SolverResult<()>;

    fn x(&self) -> &DVector<f64>;

    fn b(&self) -> &DVector<f64>;

    /// Factorizations performed since creation.
    fn num_factorizations(&self) -> usize;
}

/// Eigenvalue system seam. Only sizing is part of the equilibrium engine.
pub trait EigenSystem {
    fn name(&self) -> &str;

    fn set_size(&mut self, graph: &DofGraph) -> SolverResult<()>;
}

/// Dense storage with an LU factorization kept between solves.
#[derive(Debug)]
pub struct DenseLinearSystem {
    a: DMatrix<f64>,
    b: DVector<f64>,
    x: DVector<f64>,
    lu: Option<LU<f64, Dyn, Dyn>>,
    a_modified: bool,
    factorizations: usize,
}

impl Default for DenseLinearSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl DenseLinearSystem {
    pub fn new() -> Self {
        Self {
            a: DMatrix::zeros(0, 0),
            b: DVector::zeros(0),
            x: DVector::zeros(0),
            lu: None,
            a_modified: true,
            factorizations: 0,
        }
    }

    pub fn a(&self) -> &DMatrix<f64> {
        &self.a
    }

    fn check_ids(&self, eq_ids: &[Option<usize>], len: usize) -> SolverResult<()> {
        if eq_ids.len() != len {
            return Err(SolverError::Setup {
                what: format!("{} equation ids for a block of size {}", eq_ids.len(), len),
            });
        }
        if let Some(eq) = eq_ids.iter().flatten().find(|&&eq| eq >= self.size()) {
            return Err(SolverError::Setup {
                what: format!("equation {} outside system of size {}", eq, self.size()),
            });
        }
        Ok(())
    }
}

impl LinearSystem for DenseLinearSystem {
    fn name(&self) -> &str {
        "DenseLU"
    }

    fn set_size(&mut self, graph: &DofGraph) -> SolverResult<()> {
        let n = graph.num_equations();
        self.a = DMatrix::zeros(n, n);
        self.b = DVector::zeros(n);
        self.x = DVector::zeros(n);
        self.lu = None;
        self.a_modified = true;
        Ok(())
    }

    fn size(&self) -> usize {
        self.b.len()
    }

    fn zero_a(&mut self) {
        self.a.fill(0.0);
        self.a_modified = true;
    }

    fn zero_b(&mut self) {
        self.b.fill(0.0);
    }

    fn add_a(
        &mut self,
        m: &DMatrix<f64>,
        eq_ids: &[Option<usize>],
        fact: f64,
    ) -> SolverResult<()> {
        if m.nrows() != m.ncols() {
            return Err(SolverError::Setup {
                what: format!("non-square block {}x{}", m.nrows(), m.ncols()),
            });
        }
        self.check_ids(eq_ids, m.nrows())?;
        if fact == 0.0 {
            return Ok(());
        }
        for (i, row) in eq_ids.iter().enumerate() {
            let Some(row) = *row else { continue };
            for (j, col) in eq_ids.iter().enumerate() {
                if let Some(col) = *col {
                    self.a[(row, col)] += fact * m[(i, j)];
                }
            }
        }
        self.a_modified = true;
        Ok(())
    }

    fn add_b(
        &mut self,
        v: &DVector<f64>,
        eq_ids: &[Option<usize>],
        fact: f64,
    ) -> SolverResult<()> {
        self.check_ids(eq_ids, v.len())?;
        for (i, row) in eq_ids.iter().enumerate() {
            if let Some(row) = *row {
                self.b[row] += fact * v[i];
            }
        }
        Ok(())
    }

    fn solve(&mut self) -> SolverResult<()> {
        if self.size() == 0 {
            return Ok(());
        }
        if self.a_modified || self.lu.is_none() {
            self.lu = Some(self.a.clone().lu());
            self.a_modified = false;
            self.factorizations += 1;
        }
        let lu = self.lu.as_ref().ok_or_else(|| SolverError::Numeric {
            what: "no factorization available".to_string(),
        })?;
        self.x = lu.solve(&self.b).ok_or_else(|| SolverError::Numeric {
            what: format!("singular matrix of size {}", self.size()),
        })?;
        Ok(())
    }

    fn x(&self) -> &DVector<f64> {
        &self.x
    }

    fn b(&self) -> &DVector<f64> {
        &self.b
    }

    fn num_factorizations(&self) -> usize {
        self.factorizations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis_model::{AnalysisModel, DofGroup, DofSlot};
    use eq_core::NodeId;

    fn graph(n: usize) -> DofGraph {
        let mut model = AnalysisModel::new();
        let slots = (0..n).map(|eq| DofSlot::Free(Some(eq))).collect();
        model.add_dof_group(DofGroup::new(NodeId::from_index(0), slots));
        model.set_num_equations(n);
        model.dof_graph().clone()
    }

    #[test]
    fn solves_assembled_system() {
        let mut soe = DenseLinearSystem::new();
        soe.set_size(&graph(2)).unwrap();
        let k = DMatrix::from_row_slice(2, 2, &[2.0, -1.0, -1.0, 2.0]);
        soe.add_a(&k, &[Some(0), Some(1)], 1.0).unwrap();
        soe.add_b(&DVector::from_column_slice(&[1.0, 0.0]), &[Some(0), Some(1)], 1.0)
            .unwrap();
        soe.solve().unwrap();
        assert!((soe.x()[0] - 2.0 / 3.0).abs() < 1e-12);
        assert!((soe.x()[1] - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn constrained_entries_are_skipped() {
        let mut soe = DenseLinearSystem::new();
        soe.set_size(&graph(1)).unwrap();
        let k = DMatrix::from_row_slice(2, 2, &[5.0, -5.0, -5.0, 5.0]);
        soe.add_a(&k, &[None, Some(0)], 1.0).unwrap();
        assert_eq!(soe.a()[(0, 0)], 5.0);
    }

    #[test]
    fn refactors_only_when_a_changes() {
        let mut soe = DenseLinearSystem::new();
        soe.set_size(&graph(1)).unwrap();
        soe.add_a(&DMatrix::from_element(1, 1, 4.0), &[Some(0)], 1.0)
            .unwrap();
        soe.add_b(&DVector::from_element(1, 1.0), &[Some(0)], 1.0).unwrap();
        soe.solve().unwrap();
        soe.zero_b();
        soe.add_b(&DVector::from_element(1, 2.0), &[Some(0)], 1.0).unwrap();
        soe.solve().unwrap();
        assert_eq!(soe.num_factorizations(), 1);
        assert!((soe.x()[0] - 0.5).abs() < 1e-12);

        soe.zero_a();
        soe.add_a(&DMatrix::from_element(1, 1, 2.0), &[Some(0)], 1.0)
            .unwrap();
        soe.solve().unwrap();
        assert_eq!(soe.num_factorizations(), 2);
    }

    #[test]
    fn singular_matrix_is_numeric_error() {
        let mut soe = DenseLinearSystem::new();
        soe.set_size(&graph(2)).unwrap();
        soe.add_b(&DVector::from_element(2, 1.0), &[Some(0), Some(1)], 1.0)
            .unwrap();
        assert!(matches!(soe.solve(), Err(SolverError::Numeric { .. })));
    }

    #[test]
    fn out_of_range_equation_is_rejected() {
        let mut soe = DenseLinearSystem::new();
        soe.set_size(&graph(1)).unwrap();
        let err = soe.add_b(&DVector::from_element(1, 1.0), &[Some(3)], 1.0);
        assert!(err.is_err());
    }
}
