//! A constraint model of the task for the SMT solver.
//!
//! One bounded integer variable is created per state variable and per
//! action variable; preconditions and the concurrency bound become
//! constraints. The solver is only ever asked for satisfiability, with a
//! per-query timeout; `unknown` results are surfaced as `None` so callers
//! can treat them conservatively.
//!
//! Formulas are translated by a pair of mutually recursive encoders: a
//! boolean encoding for logical structure and a real-valued encoding for
//! arithmetic, with `ite` bridging between the two.

use z3::ast::{Ast, Bool, Int, Real};
use z3::{Config, Context, Params, SatResult, Solver};

use crate::logic::{Expr, Expression};
use crate::task::Task;

/// Creates a solver context with the given per-query timeout.
pub fn solver_context(query_timeout_ms: u32) -> Context {
    let mut config = Config::new();
    config.set_param_value("timeout", &query_timeout_ms.to_string());
    Context::new(&config)
}

pub struct TaskCsp<'ctx> {
    ctx: &'ctx Context,
    solver: Solver<'ctx>,
    state_vars: Vec<Int<'ctx>>,
    action_vars: Vec<Int<'ctx>>,
}

impl<'ctx> TaskCsp<'ctx> {
    pub fn new(ctx: &'ctx Context, task: &Task, query_timeout_ms: u32) -> Self {
        let solver = Solver::new(ctx);
        let mut params = Params::new(ctx);
        params.set_u32("timeout", query_timeout_ms);
        solver.set_params(&params);

        let mut state_vars = Vec::with_capacity(task.cpfs.len());
        for (index, cpf) in task.cpfs.iter().enumerate() {
            let var = Int::new_const(ctx, format!("s{}_{}", index, cpf.head_name));
            solver.assert(&var.ge(&Int::from_i64(ctx, 0)));
            let bound = cpf.domain_size().max(cpf.max_domain_size) as i64;
            solver.assert(&var.lt(&Int::from_i64(ctx, bound)));
            state_vars.push(var);
        }

        let mut action_vars = Vec::with_capacity(task.action_fluents.len());
        for (index, fluent) in task.action_fluents.iter().enumerate() {
            let var = Int::new_const(ctx, format!("a{}_{}", index, fluent.name));
            solver.assert(&var.ge(&Int::from_i64(ctx, 0)));
            let bound = task.action_fluent_domain_size(index) as i64;
            solver.assert(&var.lt(&Int::from_i64(ctx, bound)));
            action_vars.push(var);
        }

        Self {
            ctx,
            solver,
            state_vars,
            action_vars,
        }
    }

    /// Constrains the model with every precondition and the concurrency
    /// bound of the task.
    pub fn add_preconditions(&mut self, task: &Task) {
        for formula in &task.sacs {
            let encoded = self.encode_bool(formula);
            self.solver.assert(&encoded);
        }
        self.add_concurrency_constraint(task);
    }

    fn add_concurrency_constraint(&mut self, task: &Task) {
        let num_fluents = self.action_vars.len();
        if task.max_concurrent_actions >= num_fluents {
            return;
        }
        let vars: Vec<&Int<'ctx>> = self.action_vars.iter().collect();
        let sum = Int::add(self.ctx, &vars);
        let bound = Int::from_i64(self.ctx, task.max_concurrent_actions as i64);
        self.solver.assert(&sum.le(&bound));
    }

    /// `Some(true)` if satisfiable, `Some(false)` if not, `None` if the
    /// solver gave up within its timeout.
    pub fn has_solution(&self) -> Option<bool> {
        match self.solver.check() {
            SatResult::Sat => Some(true),
            SatResult::Unsat => Some(false),
            SatResult::Unknown => None,
        }
    }

    pub fn push(&self) {
        self.solver.push();
    }

    pub fn pop(&self) {
        self.solver.pop(1);
    }

    fn encode_bool(&self, expr: &Expr) -> Bool<'ctx> {
        match &**expr {
            Expression::Constant(value) => {
                Bool::from_bool(self.ctx, crate::math::is_true(*value))
            }
            Expression::Conjunction(exprs) => {
                let encoded: Vec<Bool<'ctx>> =
                    exprs.iter().map(|e| self.encode_bool(e)).collect();
                let refs: Vec<&Bool<'ctx>> = encoded.iter().collect();
                Bool::and(self.ctx, &refs)
            }
            Expression::Disjunction(exprs) => {
                let encoded: Vec<Bool<'ctx>> =
                    exprs.iter().map(|e| self.encode_bool(e)).collect();
                let refs: Vec<&Bool<'ctx>> = encoded.iter().collect();
                Bool::or(self.ctx, &refs)
            }
            Expression::Negation(inner) => self.encode_bool(inner).not(),
            Expression::Equals(exprs) => {
                debug_assert_eq!(exprs.len(), 2);
                self.encode_real(&exprs[0])._eq(&self.encode_real(&exprs[1]))
            }
            Expression::Greater(exprs) => {
                self.encode_real(&exprs[0]).gt(&self.encode_real(&exprs[1]))
            }
            Expression::Lower(exprs) => {
                self.encode_real(&exprs[0]).lt(&self.encode_real(&exprs[1]))
            }
            Expression::GreaterEqual(exprs) => {
                self.encode_real(&exprs[0]).ge(&self.encode_real(&exprs[1]))
            }
            Expression::LowerEqual(exprs) => {
                self.encode_real(&exprs[0]).le(&self.encode_real(&exprs[1]))
            }
            Expression::IfThenElse {
                condition,
                if_true,
                if_false,
            } => self.encode_bool(condition).ite(
                &self.encode_bool(if_true),
                &self.encode_bool(if_false),
            ),
            _ => {
                // Numeric subformula in boolean position.
                let zero = Real::from_real(self.ctx, 0, 1);
                self.encode_real(expr)._eq(&zero).not()
            }
        }
    }

    fn encode_real(&self, expr: &Expr) -> Real<'ctx> {
        match &**expr {
            Expression::Constant(value) => rational(self.ctx, *value),
            Expression::StateFluent(index) => self.state_vars[*index].to_real(),
            Expression::ActionFluent(index) => self.action_vars[*index].to_real(),

            Expression::Addition(exprs) => {
                let encoded: Vec<Real<'ctx>> =
                    exprs.iter().map(|e| self.encode_real(e)).collect();
                let refs: Vec<&Real<'ctx>> = encoded.iter().collect();
                Real::add(self.ctx, &refs)
            }
            Expression::Subtraction(exprs) => {
                let encoded: Vec<Real<'ctx>> =
                    exprs.iter().map(|e| self.encode_real(e)).collect();
                let refs: Vec<&Real<'ctx>> = encoded.iter().collect();
                Real::sub(self.ctx, &refs)
            }
            Expression::Multiplication(exprs) => {
                let encoded: Vec<Real<'ctx>> =
                    exprs.iter().map(|e| self.encode_real(e)).collect();
                let refs: Vec<&Real<'ctx>> = encoded.iter().collect();
                Real::mul(self.ctx, &refs)
            }
            Expression::Division(exprs) => {
                debug_assert_eq!(exprs.len(), 2);
                let lhs = self.encode_real(&exprs[0]);
                let rhs = self.encode_real(&exprs[1]);
                &lhs / &rhs
            }

            Expression::IfThenElse {
                condition,
                if_true,
                if_false,
            } => self.encode_bool(condition).ite(
                &self.encode_real(if_true),
                &self.encode_real(if_false),
            ),
            Expression::MultiCondition {
                conditions,
                effects,
            } => {
                let mut result = self.encode_real(effects.last().expect("empty guard list"));
                for (condition, effect) in
                    conditions.iter().zip(effects).rev().skip(1)
                {
                    result = self
                        .encode_bool(condition)
                        .ite(&self.encode_real(effect), &result);
                }
                result
            }

            Expression::Conjunction(_)
            | Expression::Disjunction(_)
            | Expression::Equals(_)
            | Expression::Greater(_)
            | Expression::Lower(_)
            | Expression::GreaterEqual(_)
            | Expression::LowerEqual(_)
            | Expression::Negation(_) => {
                let one = Real::from_real(self.ctx, 1, 1);
                let zero = Real::from_real(self.ctx, 0, 1);
                self.encode_bool(expr).ite(&one, &zero)
            }

            Expression::Exponential(_)
            | Expression::Bernoulli(_)
            | Expression::Discrete { .. }
            | Expression::Parameter(_)
            | Expression::Object(_)
            | Expression::Variable { .. }
            | Expression::Quantifier { .. } => {
                unreachable!("constraint translation applied to {:?}", expr)
            }
        }
    }

    /// The action variable term for ad-hoc constraints.
    pub fn action_var(&self, index: usize) -> &Int<'ctx> {
        &self.action_vars[index]
    }

    pub fn assert(&self, constraint: &Bool<'ctx>) {
        self.solver.assert(constraint);
    }

    pub fn context(&self) -> &'ctx Context {
        self.ctx
    }
}

/// Rationalizes a double at micro resolution; task constants are almost
/// always small integers or simple fractions.
fn rational(ctx: &Context, value: f64) -> Real<'_> {
    const SCALE: f64 = 1_000_000.0;
    Real::from_real(ctx, (value * SCALE).round() as i32, SCALE as i32)
}
