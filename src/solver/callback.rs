//! Callback
//!
//! The seam through which user code observes the search and injects lazy constraints.
use super::model::{Constraint, VarId};
use crate::errors::FlowTreeError;
use std::sync::Mutex;

/// Point of the search at which a callback is invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackWhere {
    /// Every binary variable of the current relaxation solution is integral.
    Integer,
    /// The current relaxation solution is fractional.
    General,
}

/// Thread-safe collection of lazy constraints submitted during one invocation.
#[derive(Debug, Default)]
pub struct LazyCuts {
    inner: Mutex<Vec<Constraint>>,
}

impl LazyCuts {
    pub fn new() -> Self {
        LazyCuts::default()
    }

    pub fn push(&self, cut: Constraint) {
        match self.inner.lock() {
            Ok(mut cuts) => cuts.push(cut),
            Err(poisoned) => poisoned.into_inner().push(cut),
        }
    }

    pub fn len(&self) -> usize {
        match self.inner.lock() {
            Ok(cuts) => cuts.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Submitted cuts ordered by name, so the search does not depend on thread scheduling.
    pub fn into_sorted(self) -> Vec<Constraint> {
        let mut cuts = match self.inner.into_inner() {
            Ok(cuts) => cuts,
            Err(poisoned) => poisoned.into_inner(),
        };
        cuts.sort_by(|a, b| a.name.cmp(&b.name));
        cuts
    }
}

/// Read-only view of the search state handed to a [`Callback`].
///
/// The value snapshot is immutable; the only way to influence the search
/// is to submit cuts through [`CallbackContext::add_lazy`].
pub struct CallbackContext<'a> {
    location: CallbackWhere,
    values: &'a [f64],
    cuts: &'a LazyCuts,
}

impl<'a> CallbackContext<'a> {
    pub fn new(location: CallbackWhere, values: &'a [f64], cuts: &'a LazyCuts) -> Self {
        CallbackContext {
            location,
            values,
            cuts,
        }
    }

    pub fn location(&self) -> CallbackWhere {
        self.location
    }

    /// Value of `var` in the current relaxation solution.
    pub fn value(&self, var: VarId) -> f64 {
        self.values[var.0]
    }

    /// Violation of `constraint` at the current point.
    pub fn violation(&self, constraint: &Constraint) -> f64 {
        constraint.violation(self.values)
    }

    /// Submit a lazy constraint. Safe to call from several threads at once.
    pub fn add_lazy(&self, cut: Constraint) {
        self.cuts.push(cut);
    }
}

/// Code run by the solver at every callback point.
///
/// Implementations may be invoked from any worker thread and must not keep
/// state between invocations other than through atomics or locks.
pub trait Callback: Sync {
    /// An error aborts the search and is returned from `Solver::optimize`.
    fn invoke(&self, ctx: &CallbackContext<'_>) -> Result<(), FlowTreeError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::model::{LinExpr, Sense};
    use rayon::prelude::*;

    #[test]
    fn test_lazy_cuts_from_many_threads() {
        let cuts = LazyCuts::new();
        let values = vec![0.0; 4];
        let ctx = CallbackContext::new(CallbackWhere::General, &values, &cuts);
        (0..64usize).into_par_iter().for_each(|i| {
            ctx.add_lazy(Constraint::new(
                format!("cut[{:03}]", i),
                LinExpr::sum([VarId(i % 4)]),
                Sense::Le,
                LinExpr::constant(1.0),
            ));
        });
        assert_eq!(cuts.len(), 64);
        let sorted = cuts.into_sorted();
        assert_eq!(sorted[0].name, "cut[000]");
        assert_eq!(sorted[63].name, "cut[063]");
    }
}
