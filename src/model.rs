//! The in-process [`Backend`]: an assertion stack decided by BDD-guided search.
//!
//! [`Model::check`] abstracts all assertions into one BDD over linear atoms and walks it
//! depth-first. Every time the walk fixes an atom,
//! the linear constraints fixed so far are run through Fourier–Motzkin elimination, and
//! the branch is dropped as soon as they become infeasible. Reaching the `one` terminal
//! means the assertions are satisfiable, and the elimination yields the witness.
//!
//! Products of two unknowns are only approximated, so a problem that contains one can be
//! refuted (`unsat`) but never confirmed: what would be `sat` is reported as `unknown`.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashSet};
use std::fmt::Write as _;

use log::{debug, trace, warn};
use num_rational::BigRational;
use num_traits::Zero;

use crate::backend::{Backend, SatResult};
use crate::encode::{Atom, Encoder};
use crate::expr::{write_symbol, Bool, BoolNode, CmpOp, Real, RealNode};
use crate::linear::{self, Constraint, Feasibility};
use crate::reference::Ref;

/// Tuning knobs for [`Model`].
#[derive(Debug, Clone)]
pub struct Config {
    /// Initial node capacity of the BDD built by each check.
    pub bdd_capacity: usize,
    /// Largest constraint set a single elimination step may produce before the check gives
    /// up on that branch (and the overall answer degrades to `unknown`).
    pub max_constraints: usize,
    /// Largest number of BDD nodes a single check may branch on before answering `unknown`.
    pub max_decisions: usize,
    /// Warn about unknowns that reach [`Backend::add`] without being declared first.
    /// When off, such unknowns are declared on the spot.
    pub warn_undeclared: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bdd_capacity: 1 << 10,
            max_constraints: 4096,
            max_decisions: 1 << 20,
            warn_undeclared: true,
        }
    }
}

/// Counters accumulated over the lifetime of a [`Model`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Statistics {
    pub checks: usize,
    pub decisions: usize,
    pub eliminations: usize,
    pub atoms: usize,
    pub bdd_nodes: usize,
    /// Undeclared unknowns reported by [`Backend::add`].
    pub undeclared: usize,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Sort {
    Real,
    Bool,
}

/// A satisfying assignment produced by the last successful [`Model::check`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Assignment {
    reals: BTreeMap<String, BigRational>,
    bools: BTreeMap<String, bool>,
}

impl Assignment {
    /// Value of a real unknown; unknowns the check never saw are zero.
    pub fn real(&self, name: &str) -> BigRational {
        self.reals.get(name).cloned().unwrap_or_else(BigRational::zero)
    }

    /// Value of a boolean unknown; unknowns the check never saw are false.
    pub fn bool(&self, name: &str) -> bool {
        self.bools.get(name).copied().unwrap_or(false)
    }

    pub fn eval_real(&self, r: &Real) -> BigRational {
        match r.node() {
            RealNode::Const(c) => c.clone(),
            RealNode::Var(name) => self.real(name),
            RealNode::Add(xs) => xs.iter().map(|x| self.eval_real(x)).sum(),
            RealNode::Mul(xs) => xs.iter().map(|x| self.eval_real(x)).product(),
            RealNode::Neg(x) => -self.eval_real(x),
            RealNode::Ite(c, a, b) => {
                if self.eval_bool(c) {
                    self.eval_real(a)
                } else {
                    self.eval_real(b)
                }
            }
        }
    }

    pub fn eval_bool(&self, b: &Bool) -> bool {
        match b.node() {
            BoolNode::Const(v) => *v,
            BoolNode::Var(name) => self.bool(name),
            BoolNode::Not(x) => !self.eval_bool(x),
            BoolNode::And(xs) => xs.iter().all(|x| self.eval_bool(x)),
            BoolNode::Or(xs) => xs.iter().any(|x| self.eval_bool(x)),
            BoolNode::Implies(a, b) => !self.eval_bool(a) || self.eval_bool(b),
            BoolNode::Cmp(op, lhs, rhs) => {
                let (l, r) = (self.eval_real(lhs), self.eval_real(rhs));
                match op {
                    CmpOp::Lt => l < r,
                    CmpOp::Le => l <= r,
                    CmpOp::Gt => l > r,
                    CmpOp::Ge => l >= r,
                    CmpOp::Eq => l == r,
                    CmpOp::Ne => l != r,
                }
            }
        }
    }
}

pub struct Model {
    config: Config,
    assertions: RefCell<Vec<Bool>>,
    /// Assertion counts at each open `push`.
    scopes: RefCell<Vec<usize>>,
    declared: RefCell<Vec<(String, Sort)>>,
    declared_names: RefCell<HashSet<String>>,
    next_id: Cell<usize>,
    last: RefCell<Option<Assignment>>,
    stats: RefCell<Statistics>,
}

impl Default for Model {
    fn default() -> Self {
        Model::with_config(Config::default())
    }
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model")
            .field("assertions", &self.num_assertions())
            .field("scopes", &self.scopes.borrow().len())
            .field("declared", &self.declared.borrow().len())
            .finish()
    }
}

impl Model {
    pub fn with_config(config: Config) -> Self {
        Self {
            config,
            assertions: RefCell::new(Vec::new()),
            scopes: RefCell::new(Vec::new()),
            declared: RefCell::new(Vec::new()),
            declared_names: RefCell::new(HashSet::new()),
            next_id: Cell::new(0),
            last: RefCell::new(None),
            stats: RefCell::new(Statistics::default()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn declare(&self, name: &str, sort: Sort) {
        if self.declared_names.borrow_mut().insert(name.to_string()) {
            debug!("declare {} : {:?}", name, sort);
            self.declared.borrow_mut().push((name.to_string(), sort));
        }
    }

    /// A boolean unknown named `name`.
    pub fn new_bool(&self, name: &str) -> Bool {
        self.declare(name, Sort::Bool);
        Bool::var(name)
    }

    pub fn num_assertions(&self) -> usize {
        self.assertions.borrow().len()
    }

    /// All constraints of all open scopes, in insertion order.
    pub fn assertions(&self) -> Vec<Bool> {
        self.assertions.borrow().clone()
    }

    pub fn num_scopes(&self) -> usize {
        self.scopes.borrow().len()
    }

    /// The witness found by the last check, if it answered `sat` and nothing changed since.
    pub fn model(&self) -> Option<Assignment> {
        self.last.borrow().clone()
    }

    pub fn statistics(&self) -> Statistics {
        self.stats.borrow().clone()
    }

    /// The current assertions as an SMT-LIB 2 script.
    pub fn to_smt2(&self) -> String {
        struct Symbol<'a>(&'a str);
        impl std::fmt::Display for Symbol<'_> {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write_symbol(f, self.0)
            }
        }

        let mut out = String::new();
        for (name, sort) in self.declared.borrow().iter() {
            let sort = match sort {
                Sort::Real => "Real",
                Sort::Bool => "Bool",
            };
            let _ = writeln!(out, "(declare-fun {} () {})", Symbol(name), sort);
        }
        for a in self.assertions.borrow().iter() {
            let _ = writeln!(out, "(assert {})", a);
        }
        out.push_str("(check-sat)\n");
        out
    }

    fn search(&self, enc: &Encoder, root: Ref) -> Outcome {
        let mut search = Search {
            enc,
            limit: self.config.max_constraints,
            max_decisions: self.config.max_decisions,
            trail: Vec::new(),
            bools: Vec::new(),
            decisions: 0,
            eliminations: 0,
            gave_up: false,
        };
        let found = search.dfs(root);
        search.finish(found)
    }
}

/// Depth-first walk over the BDD of the assertions.
struct Search<'a> {
    enc: &'a Encoder,
    limit: usize,
    max_decisions: usize,
    trail: Vec<Constraint>,
    bools: Vec<(String, bool)>,
    decisions: usize,
    eliminations: usize,
    gave_up: bool,
}

struct Outcome {
    witness: Option<(BTreeMap<usize, BigRational>, Vec<(String, bool)>)>,
    decisions: usize,
    eliminations: usize,
    gave_up: bool,
}

impl Search<'_> {
    fn finish(self, found: Option<BTreeMap<usize, BigRational>>) -> Outcome {
        Outcome {
            witness: found.map(|values| (values, self.bools)),
            decisions: self.decisions,
            eliminations: self.eliminations,
            gave_up: self.gave_up,
        }
    }

    fn solve(&mut self) -> Feasibility {
        self.eliminations += 1;
        linear::solve(&self.trail, self.limit)
    }

    fn dfs(&mut self, node: Ref) -> Option<BTreeMap<usize, BigRational>> {
        let enc = self.enc;
        let bdd = enc.bdd();
        if bdd.is_zero(node) {
            return None;
        }
        if bdd.is_one(node) {
            return match self.solve() {
                Feasibility::Feasible(values) => Some(values),
                Feasibility::Infeasible => None,
                Feasibility::GaveUp => {
                    self.gave_up = true;
                    None
                }
            };
        }

        if self.decisions >= self.max_decisions {
            trace!("decision budget of {} exhausted", self.max_decisions);
            self.gave_up = true;
            return None;
        }
        self.decisions += 1;
        let v = bdd.variable(node.index());
        for (child, value) in [(bdd.high_node(node), true), (bdd.low_node(node), false)] {
            if bdd.is_zero(child) {
                continue;
            }
            match enc.atom(v) {
                Atom::Bool(name) => {
                    self.bools.push((name.clone(), value));
                    if let Some(found) = self.dfs(child) {
                        return Some(found);
                    }
                    self.bools.pop();
                }
                Atom::Linear(c) => {
                    let literal = if value { c.clone() } else { c.negate() };
                    trace!("decide {}", literal);
                    self.trail.push(literal);
                    // An inconclusive elimination keeps the branch alive.
                    if self.solve() != Feasibility::Infeasible {
                        if let Some(found) = self.dfs(child) {
                            return Some(found);
                        }
                    }
                    self.trail.pop();
                }
            }
        }
        None
    }
}

impl Backend for Model {
    fn add(&self, constraint: Bool) {
        trace!("assert {}", constraint);
        if self.config.warn_undeclared {
            let (reals, bools) = constraint.variables();
            let declared = self.declared_names.borrow();
            for name in reals.iter().chain(&bools) {
                if !declared.contains(name) {
                    warn!("{} in {} not previously declared", name, constraint);
                    self.stats.borrow_mut().undeclared += 1;
                }
            }
        } else {
            self.declare_all(&constraint);
        }
        self.last.replace(None);
        self.assertions.borrow_mut().push(constraint);
    }

    fn push(&self) {
        let n = self.num_assertions();
        self.scopes.borrow_mut().push(n);
        trace!("push (level {})", self.num_scopes());
    }

    fn pop(&self) {
        let mark = self.scopes.borrow_mut().pop();
        let Some(mark) = mark else {
            panic!("pop called without a matching push");
        };
        self.last.replace(None);
        self.assertions.borrow_mut().truncate(mark);
        trace!("pop (level {})", self.num_scopes());
    }

    fn check(&self) -> SatResult {
        let assertions = self.assertions.borrow().clone();
        let mut enc = Encoder::new(self.config.bdd_capacity);
        let root = enc.encode_all(assertions.iter());
        let outcome = self.search(&enc, root);

        {
            let mut stats = self.stats.borrow_mut();
            stats.checks += 1;
            stats.decisions += outcome.decisions;
            stats.eliminations += outcome.eliminations;
            stats.atoms = enc.num_atoms();
            stats.bdd_nodes = enc.bdd().num_nodes();
        }

        let result = match outcome.witness {
            Some(_) if enc.is_nonlinear() => SatResult::Unknown,
            Some((values, bools)) => {
                let mut assignment = Assignment::default();
                for (name, sort) in self.declared.borrow().iter() {
                    match sort {
                        Sort::Real => {
                            assignment.reals.insert(name.clone(), BigRational::zero());
                        }
                        Sort::Bool => {
                            assignment.bools.insert(name.clone(), false);
                        }
                    }
                }
                for (v, value) in values {
                    if let Some(name) = enc.var_name(v) {
                        assignment.reals.insert(name.to_string(), value);
                    }
                }
                assignment.bools.extend(bools);
                self.last.replace(Some(assignment));
                SatResult::Sat
            }
            None if outcome.gave_up => SatResult::Unknown,
            None => SatResult::Unsat,
        };
        debug!(
            "check over {} assertions: {} ({} decisions)",
            assertions.len(),
            result,
            outcome.decisions
        );
        result
    }

    fn new_real(&self, name: &str) -> Real {
        self.declare(name, Sort::Real);
        Real::var(name)
    }

    fn fresh_id(&self) -> usize {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        id
    }

    fn declare_all(&self, constraint: &Bool) {
        let (reals, bools) = constraint.variables();
        for name in &reals {
            self.declare(name, Sort::Real);
        }
        for name in &bools {
            self.declare(name, Sort::Bool);
        }
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::backend::Scope;

    fn int(n: i64) -> BigRational {
        BigRational::from_integer(n.into())
    }

    #[test]
    fn test_empty_model_is_sat() {
        let model = Model::default();
        assert_eq!(model.check(), SatResult::Sat);
        assert_eq!(model.model(), Some(Assignment::default()));
    }

    #[test]
    fn test_contradiction() {
        let model = Model::default();
        let x = model.new_real("x");
        model.add(x.gt(0));
        model.add(x.lt(0));
        assert_eq!(model.check(), SatResult::Unsat);
        assert_eq!(model.model(), None);
    }

    #[test]
    fn test_witness_satisfies_assertions() {
        let model = Model::default();
        let x = model.new_real("x");
        let y = model.new_real("y");
        let p = model.new_bool("p");
        model.add(x.ge(1) & x.lt(2));
        model.add(p.implies(y.eq_to(&x + 3)));
        model.add(p.clone() | y.lt(-10));
        model.add(y.gt(0));
        assert_eq!(model.check(), SatResult::Sat);

        let assignment = model.model().unwrap();
        println!("assignment = {:?}", assignment);
        for a in model.assertions() {
            assert!(assignment.eval_bool(&a), "violated: {}", a);
        }
        assert!(assignment.bool("p"));
        assert_eq!(assignment.real("y"), assignment.real("x") + int(3));
    }

    #[test]
    fn test_push_pop() {
        let model = Model::default();
        let x = model.new_real("x");
        model.add(x.ge(0));
        model.push();
        model.add(x.lt(0));
        assert_eq!(model.num_scopes(), 1);
        assert_eq!(model.num_assertions(), 2);
        assert_eq!(model.check(), SatResult::Unsat);
        model.pop();
        assert_eq!(model.num_scopes(), 0);
        assert_eq!(model.num_assertions(), 1);
        assert_eq!(model.check(), SatResult::Sat);
    }

    #[test]
    fn test_scope_guard_pops_on_drop() {
        let model = Model::default();
        let x = model.new_real("x");
        {
            let scope = Scope::new(&model);
            scope.add(x.ne_to(x.clone()));
            assert_eq!(model.num_scopes(), 1);
            assert_eq!(scope.check(), SatResult::Unsat);
        }
        assert_eq!(model.num_scopes(), 0);
        assert_eq!(model.num_assertions(), 0);
    }

    #[test]
    #[should_panic(expected = "pop called without a matching push")]
    fn test_unbalanced_pop() {
        let model = Model::default();
        model.pop();
    }

    #[test]
    fn test_counting_conditions() {
        let model = Model::default();
        let p = model.new_bool("p");
        let q = model.new_bool("q");
        let count = Real::sum([p.ite(1, 0), q.ite(1, 0)]);
        model.add(count.eq_to(2));
        assert_eq!(model.check(), SatResult::Sat);
        let assignment = model.model().unwrap();
        assert!(assignment.bool("p") && assignment.bool("q"));

        model.add(!p);
        assert_eq!(model.check(), SatResult::Unsat);
    }

    #[test]
    fn test_nonlinear_is_never_sat() {
        let model = Model::default();
        let x = model.new_real("x");
        let y = model.new_real("y");
        model.push();
        model.add((&x * &y).eq_to(1));
        assert_eq!(model.check(), SatResult::Unknown);
        assert_eq!(model.model(), None);
        model.pop();

        // The same product on both sides still refutes.
        model.add((&x * &y).gt(0));
        model.add((&y * &x).lt(0));
        assert_eq!(model.check(), SatResult::Unsat);
    }

    #[test]
    fn test_give_up_is_unknown() {
        let model = Model::with_config(Config {
            max_constraints: 0,
            ..Config::default()
        });
        let xs: Vec<Real> = ["x", "y", "z", "w"].iter().map(|n| model.new_real(n)).collect();
        for i in 0..4 {
            model.add(xs[i].lt(&xs[(i + 1) % 4]));
        }
        assert_eq!(model.check(), SatResult::Unknown);

        let model = Model::default();
        for i in 0..4 {
            model.add(xs[i].lt(&xs[(i + 1) % 4]));
        }
        assert_eq!(model.check(), SatResult::Unsat);
    }

    #[test]
    fn test_decision_budget() {
        let model = Model::with_config(Config {
            max_decisions: 0,
            ..Config::default()
        });
        assert_eq!(model.check(), SatResult::Sat);

        let x = model.new_real("x");
        model.add(x.lt(0) | x.gt(1));
        assert_eq!(model.check(), SatResult::Unknown);
        assert_eq!(model.model(), None);
        assert_eq!(model.statistics().decisions, 0);
    }

    #[test]
    fn test_many_equalities_stay_cheap() {
        let model = Model::with_config(Config {
            max_constraints: 8,
            ..Config::default()
        });
        let xs: Vec<Real> = (0..8).map(|i| model.new_real(&format!("x{}", i))).collect();
        for pair in xs.windows(2) {
            model.add(pair[1].eq_to(&pair[0] + 1));
        }
        model.add(xs[0].ge(0));
        model.add(xs[7].le(7));
        assert_eq!(model.check(), SatResult::Sat);
        let assignment = model.model().unwrap();
        assert_eq!(assignment.real("x0"), int(0));
        assert_eq!(assignment.real("x7"), int(7));

        model.add(xs[3].gt(3));
        assert_eq!(model.check(), SatResult::Unsat);
    }

    #[test]
    fn test_undeclared_are_reported() {
        let model = Model::default();
        let x = model.new_real("x");
        model.add(x.lt(Real::var("y")) | Bool::var("p"));
        model.add(x.gt(0));
        assert_eq!(model.statistics().undeclared, 2);
        assert_eq!(model.to_smt2().matches("declare-fun").count(), 1);
    }

    #[test]
    fn test_undeclared_are_adopted_when_not_warning() {
        let model = Model::with_config(Config {
            warn_undeclared: false,
            ..Config::default()
        });
        let x = model.new_real("x");
        model.add(x.lt(Real::var("y")) | Bool::var("p"));
        assert_eq!(model.statistics().undeclared, 0);
        assert_eq!(
            model.to_smt2(),
            "(declare-fun x () Real)\n\
             (declare-fun y () Real)\n\
             (declare-fun p () Bool)\n\
             (assert (or (< x y) p))\n\
             (check-sat)\n"
        );
    }

    #[test]
    fn test_declare_all() {
        let model = Model::default();
        let claim = Real::var("a").le(Real::var("b")).implies(Bool::var("q"));
        model.declare_all(&claim);
        model.add(claim);
        assert_eq!(model.statistics().undeclared, 0);
        assert_eq!(model.check(), SatResult::Sat);
        let assignment = model.model().unwrap();
        assert!(assignment.eval_bool(&model.assertions()[0]));
    }

    #[test]
    fn test_user_names_shadow_nothing() {
        let model = Model::default();
        let p = model.new_bool("p");
        let odd = model.new_real("!ite0");
        model.add(p.ite(1, 0).eq_to(1));
        model.add(odd.eq_to(5));
        assert_eq!(model.check(), SatResult::Sat);
        assert_eq!(model.model().unwrap().real("!ite0"), int(5));
    }

    #[test]
    fn test_fresh_ids() {
        let model = Model::default();
        assert_eq!(model.fresh_id(), 0);
        assert_eq!(model.fresh_id(), 1);
        assert_eq!(Model::default().fresh_id(), 0);
    }

    #[test]
    fn test_same_name_same_symbol() {
        let model = Model::default();
        let a = model.new_real("a");
        let b = model.new_real("a");
        assert_eq!(a, b);
        model.add(a.gt(0));
        model.add(b.lt(0));
        assert_eq!(model.check(), SatResult::Unsat);
        assert_eq!(model.to_smt2().matches("declare-fun").count(), 1);
    }

    #[test]
    fn test_to_smt2() {
        let model = Model::default();
        let x = model.new_real("x");
        let p = model.new_bool("p");
        model.add(p.implies(x.eq_to(2)));
        let script = model.to_smt2();
        println!("{}", script);
        assert_eq!(
            script,
            "(declare-fun x () Real)\n\
             (declare-fun p () Bool)\n\
             (assert (=> p (= x 2)))\n\
             (check-sat)\n"
        );
    }

    #[test]
    fn test_statistics() {
        let model = Model::default();
        let x = model.new_real("x");
        model.add(x.lt(1) | x.gt(2));
        model.add(x.ge(1));
        assert_eq!(model.check(), SatResult::Sat);
        assert_eq!(model.check(), SatResult::Sat);
        let stats = model.statistics();
        assert_eq!(stats.checks, 2);
        assert_eq!(stats.atoms, 2);
        assert!(stats.decisions > 0);
        assert!(model.model().unwrap().real("x") > int(2));
    }
}
