//! Model
//!
//! Variables, linear expressions and constraints of a mixed-integer linear model.
//! The model only records the problem; `Solver` turns it into LP relaxations.
use serde::{Deserialize, Serialize};

/// Handle to a variable registered in a [`Model`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VarId(pub(crate) usize);

impl VarId {
    /// Position of the variable in the model.
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Domain of a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VarType {
    /// Takes values in {0, 1}.
    Binary,
    /// Takes any value in `[lb, ub]`.
    Continuous,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub var_type: VarType,
    pub lb: f64,
    pub ub: f64,
    /// Objective coefficient.
    pub obj: f64,
}

/// A linear combination of variables plus a constant.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinExpr {
    pub terms: Vec<(VarId, f64)>,
    pub constant: f64,
}

impl LinExpr {
    pub fn new() -> Self {
        LinExpr::default()
    }

    /// Expression holding only a constant.
    pub fn constant(value: f64) -> Self {
        LinExpr {
            terms: Vec::new(),
            constant: value,
        }
    }

    /// Sum of the given variables, each with coefficient one.
    pub fn sum<I: IntoIterator<Item = VarId>>(vars: I) -> Self {
        LinExpr {
            terms: vars.into_iter().map(|v| (v, 1.0)).collect(),
            constant: 0.0,
        }
    }

    /// Add `coeff * var` to the expression.
    pub fn add_term(&mut self, var: VarId, coeff: f64) {
        self.terms.push((var, coeff));
    }

    /// Add every term of `other`, scaled by `scale`.
    pub fn add_expr(&mut self, other: &LinExpr, scale: f64) {
        self.terms.extend(other.terms.iter().map(|(v, c)| (*v, c * scale)));
        self.constant += other.constant * scale;
    }

    /// Value of the expression at the given point.
    pub fn evaluate(&self, values: &[f64]) -> f64 {
        self.terms.iter().map(|(v, c)| c * values[v.0]).sum::<f64>() + self.constant
    }

    /// Merge duplicate variables (first-seen order) and drop exact zeros.
    fn canonical_terms(&self) -> Vec<(VarId, f64)> {
        let mut merged: Vec<(VarId, f64)> = Vec::with_capacity(self.terms.len());
        for (var, coeff) in self.terms.iter() {
            match merged.iter_mut().find(|(v, _)| v == var) {
                Some((_, c)) => *c += coeff,
                None => merged.push((*var, *coeff)),
            }
        }
        merged.retain(|(_, c)| *c != 0.0);
        merged
    }
}

/// Relation between the left and right hand side of a [`Constraint`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sense {
    Le,
    Ge,
    Eq,
}

/// `expr (sense) rhs`, with every variable on the left and the constant on the right.
#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    pub name: String,
    pub expr: LinExpr,
    pub sense: Sense,
    pub rhs: f64,
}

impl Constraint {
    /// Build a canonical constraint from `lhs (sense) rhs`.
    pub fn new(name: impl Into<String>, lhs: LinExpr, sense: Sense, rhs: LinExpr) -> Self {
        let mut diff = lhs;
        diff.add_expr(&rhs, -1.0);
        let rhs_value = -diff.constant;
        Constraint {
            name: name.into(),
            expr: LinExpr {
                terms: diff.canonical_terms(),
                constant: 0.0,
            },
            sense,
            rhs: rhs_value,
        }
    }

    /// Amount by which the constraint is violated at `values` (zero when satisfied).
    pub fn violation(&self, values: &[f64]) -> f64 {
        let lhs = self.expr.evaluate(values);
        match self.sense {
            Sense::Le => (lhs - self.rhs).max(0.0),
            Sense::Ge => (self.rhs - lhs).max(0.0),
            Sense::Eq => (lhs - self.rhs).abs(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Maximize,
    Minimize,
}

/// A mixed-integer linear model with binary integer variables.
#[derive(Debug, Clone)]
pub struct Model {
    pub direction: Direction,
    vars: Vec<Variable>,
    constraints: Vec<Constraint>,
    obj_constant: f64,
}

impl Model {
    pub fn new(direction: Direction) -> Self {
        Model {
            direction,
            vars: Vec::new(),
            constraints: Vec::new(),
            obj_constant: 0.0,
        }
    }

    fn add_var(&mut self, name: String, var_type: VarType, lb: f64, ub: f64) -> VarId {
        let id = VarId(self.vars.len());
        self.vars.push(Variable {
            name,
            var_type,
            lb,
            ub,
            obj: 0.0,
        });
        id
    }

    pub fn add_binary(&mut self, name: impl Into<String>) -> VarId {
        self.add_var(name.into(), VarType::Binary, 0.0, 1.0)
    }

    pub fn add_continuous(&mut self, name: impl Into<String>, lb: f64, ub: f64) -> VarId {
        self.add_var(name.into(), VarType::Continuous, lb, ub)
    }

    /// Register `lhs (sense) rhs`.
    pub fn add_constr(&mut self, name: impl Into<String>, lhs: LinExpr, sense: Sense, rhs: LinExpr) {
        self.constraints.push(Constraint::new(name, lhs, sense, rhs));
    }

    /// Replace the objective with `expr`.
    pub fn set_objective(&mut self, expr: LinExpr) {
        for var in self.vars.iter_mut() {
            var.obj = 0.0;
        }
        for (var, coeff) in expr.terms.iter() {
            self.vars[var.0].obj += coeff;
        }
        self.obj_constant = expr.constant;
    }

    pub fn objective_constant(&self) -> f64 {
        self.obj_constant
    }

    /// Objective value of a full assignment.
    pub fn objective_value(&self, values: &[f64]) -> f64 {
        self.vars.iter().zip(values.iter()).map(|(v, x)| v.obj * x).sum::<f64>() + self.obj_constant
    }

    pub fn variables(&self) -> &[Variable] {
        &self.vars
    }

    pub fn var(&self, id: VarId) -> &Variable {
        &self.vars[id.0]
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn num_vars(&self) -> usize {
        self.vars.len()
    }

    pub fn num_binaries(&self) -> usize {
        self.vars.iter().filter(|v| v.var_type == VarType::Binary).count()
    }

    pub fn num_constraints(&self) -> usize {
        self.constraints.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constraint_canonical_form() {
        let mut model = Model::new(Direction::Maximize);
        let x = model.add_binary("x");
        let y = model.add_continuous("y", 0.0, 1.0);
        // x + y + 2 = y + 3x  =>  -2x = -2
        let mut lhs = LinExpr::sum([x, y]);
        lhs.add_term(x, 0.0);
        lhs.add_expr(&LinExpr::constant(2.0), 1.0);
        let rhs = LinExpr {
            terms: vec![(y, 1.0), (x, 3.0)],
            constant: 0.0,
        };
        model.add_constr("c", lhs, Sense::Eq, rhs);
        let c = &model.constraints()[0];
        assert_eq!(c.expr.terms, vec![(x, -2.0)]);
        assert_eq!(c.rhs, -2.0);
    }

    #[test]
    fn test_violation() {
        let c = Constraint::new(
            "le",
            LinExpr::sum([VarId(0), VarId(1)]),
            Sense::Le,
            LinExpr::constant(1.0),
        );
        assert_eq!(c.violation(&[0.5, 0.5]), 0.0);
        assert!((c.violation(&[1.0, 0.75]) - 0.75).abs() < 1e-12);
        let e = Constraint {
            sense: Sense::Eq,
            ..c.clone()
        };
        assert!((e.violation(&[0.25, 0.25]) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_objective_value() {
        let mut model = Model::new(Direction::Minimize);
        let x = model.add_binary("x");
        let y = model.add_continuous("y", 0.0, 10.0);
        let obj = LinExpr {
            terms: vec![(x, 2.0), (y, -1.0), (x, 1.0)],
            constant: 4.0,
        };
        model.set_objective(obj);
        assert_eq!(model.var(x).obj, 3.0);
        assert_eq!(model.objective_value(&[1.0, 2.0]), 5.0);
        assert_eq!(model.num_binaries(), 1);
    }
}
