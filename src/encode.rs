//! Boolean abstraction of assertions.
//!
//! Each comparison is rewritten into linear atoms `e < 0` / `e ≤ 0` whose leading
//! coefficient is `+1`, so that `x < 1` and `x ≥ 1` share one BDD variable with opposite
//! polarity. Terms that are not linear get purified into fresh variables:
//!
//! - `ite(c, a, b)` becomes `t` together with the side conditions `c ⇒ t = a` and
//!   `¬c ⇒ t = b`, which is exact;
//! - a product of two non-constant terms becomes an opaque variable, which only relaxes
//!   the problem. Such encodings are flagged as [`nonlinear`][Encoder::is_nonlinear].

use std::collections::HashMap;

use log::{debug, trace};
use num_rational::BigRational;
use num_traits::Signed;

use crate::bdd::Bdd;
use crate::expr::{Bool, BoolNode, CmpOp, Real, RealNode};
use crate::linear::{Constraint, LinExpr};
use crate::reference::Ref;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum Atom {
    Bool(String),
    Linear(Constraint),
}

pub(crate) struct Encoder {
    bdd: Bdd,
    /// Real variable names by index; purified terms have no name.
    vars: Vec<Option<String>>,
    var_index: HashMap<String, usize>,
    /// `atoms[v - 1]` is the atom behind BDD variable `v`.
    atoms: Vec<Atom>,
    atom_index: HashMap<Atom, u32>,
    ites: HashMap<Real, usize>,
    products: HashMap<(LinExpr, LinExpr), usize>,
    side: Vec<Ref>,
    nonlinear: bool,
}

impl Encoder {
    pub fn new(capacity: usize) -> Self {
        Self {
            bdd: Bdd::new(capacity),
            vars: Vec::new(),
            var_index: HashMap::new(),
            atoms: Vec::new(),
            atom_index: HashMap::new(),
            ites: HashMap::new(),
            products: HashMap::new(),
            side: Vec::new(),
            nonlinear: false,
        }
    }

    pub fn bdd(&self) -> &Bdd {
        &self.bdd
    }

    pub fn atom(&self, variable: u32) -> &Atom {
        &self.atoms[variable as usize - 1]
    }

    pub fn num_atoms(&self) -> usize {
        self.atoms.len()
    }

    /// Name of a user variable, `None` for the ones introduced by purification.
    pub fn var_name(&self, v: usize) -> Option<&str> {
        self.vars[v].as_deref()
    }

    pub fn is_nonlinear(&self) -> bool {
        self.nonlinear
    }

    /// Conjunction of all `assertions` together with the purification side conditions.
    pub fn encode_all<'a>(&mut self, assertions: impl IntoIterator<Item = &'a Bool>) -> Ref {
        let roots: Vec<Ref> = assertions.into_iter().map(|a| self.encode(a)).collect();
        let side = std::mem::take(&mut self.side);
        let f = self.bdd.apply_and_many(roots.into_iter().chain(side));
        debug!(
            "encoded {} atoms over {} variables into {} BDD nodes",
            self.atoms.len(),
            self.vars.len(),
            self.bdd.size(f)
        );
        f
    }

    pub fn encode(&mut self, b: &Bool) -> Ref {
        match b.node() {
            BoolNode::Const(true) => self.bdd.one,
            BoolNode::Const(false) => self.bdd.zero,
            BoolNode::Var(name) => self.mk_atom(Atom::Bool(name.clone())),
            BoolNode::Not(x) => -self.encode(x),
            BoolNode::And(xs) => {
                let xs: Vec<Ref> = xs.iter().map(|x| self.encode(x)).collect();
                self.bdd.apply_and_many(xs)
            }
            BoolNode::Or(xs) => {
                let xs: Vec<Ref> = xs.iter().map(|x| self.encode(x)).collect();
                self.bdd.apply_or_many(xs)
            }
            BoolNode::Implies(a, b) => {
                let a = self.encode(a);
                let b = self.encode(b);
                self.bdd.apply_imply(a, b)
            }
            BoolNode::Cmp(op, lhs, rhs) => {
                let e = self.linearize(lhs).sub(&self.linearize(rhs));
                self.compare(*op, e)
            }
        }
    }

    /// `e ⋈ 0` as a combination of atoms.
    fn compare(&mut self, op: CmpOp, e: LinExpr) -> Ref {
        match op {
            CmpOp::Lt => self.linear(Constraint::lt(e)),
            CmpOp::Le => self.linear(Constraint::le(e)),
            CmpOp::Gt => -self.linear(Constraint::le(e)),
            CmpOp::Ge => -self.linear(Constraint::lt(e)),
            CmpOp::Eq => self.equal(e),
            CmpOp::Ne => -self.equal(e),
        }
    }

    fn equal(&mut self, e: LinExpr) -> Ref {
        let le = self.linear(Constraint::le(e.clone()));
        let lt = self.linear(Constraint::lt(e));
        self.bdd.apply_and(le, -lt)
    }

    fn linear(&mut self, c: Constraint) -> Ref {
        if let Some(truth) = c.truth() {
            return if truth { self.bdd.one } else { self.bdd.zero };
        }
        let c = c.normalized();
        let negative = c.expr.leading().is_some_and(|lead| lead.is_negative());
        if negative {
            // e < 0 ≡ ¬(-e ≤ 0) and e ≤ 0 ≡ ¬(-e < 0)
            -self.mk_atom(Atom::Linear(c.negate()))
        } else {
            self.mk_atom(Atom::Linear(c))
        }
    }

    fn mk_atom(&mut self, atom: Atom) -> Ref {
        let v = match self.atom_index.get(&atom) {
            Some(&v) => v,
            None => {
                self.atoms.push(atom.clone());
                let v = self.atoms.len() as u32;
                self.atom_index.insert(atom, v);
                v
            }
        };
        self.bdd.mk_var(v)
    }

    fn real_var(&mut self, name: &str) -> usize {
        if let Some(&v) = self.var_index.get(name) {
            return v;
        }
        let v = self.vars.len();
        self.vars.push(Some(name.to_string()));
        self.var_index.insert(name.to_string(), v);
        v
    }

    fn internal_var(&mut self, kind: &str) -> usize {
        let v = self.vars.len();
        trace!("x{} stands for an {} term", v, kind);
        self.vars.push(None);
        v
    }

    pub fn linearize(&mut self, r: &Real) -> LinExpr {
        match r.node() {
            RealNode::Const(c) => LinExpr::constant(c.clone()),
            RealNode::Var(name) => LinExpr::var(self.real_var(name)),
            RealNode::Add(xs) => xs
                .iter()
                .fold(LinExpr::default(), |acc, x| acc.add(&self.linearize(x))),
            RealNode::Neg(x) => self.linearize(x).scale(&-BigRational::from_integer(1.into())),
            RealNode::Mul(xs) => {
                let mut factors = xs.iter();
                let Some(first) = factors.next() else {
                    return LinExpr::constant(BigRational::from_integer(1.into()));
                };
                let first = self.linearize(first);
                factors.fold(first, |acc, x| {
                    let y = self.linearize(x);
                    self.multiply(acc, y)
                })
            }
            RealNode::Ite(c, a, b) => {
                if let Some(&t) = self.ites.get(r) {
                    return LinExpr::var(t);
                }
                let t = self.internal_var("if-then-else");
                self.ites.insert(r.clone(), t);

                let guard = self.encode(c);
                let then = LinExpr::var(t).sub(&self.linearize(a));
                let then = self.equal(then);
                let otherwise = LinExpr::var(t).sub(&self.linearize(b));
                let otherwise = self.equal(otherwise);
                let def = self.bdd.apply_ite(guard, then, otherwise);
                self.side.push(def);
                LinExpr::var(t)
            }
        }
    }

    fn multiply(&mut self, a: LinExpr, b: LinExpr) -> LinExpr {
        if a.is_constant() {
            return b.scale(a.constant_term());
        }
        if b.is_constant() {
            return a.scale(b.constant_term());
        }
        let key = if format!("{}", a) <= format!("{}", b) {
            (a, b)
        } else {
            (b, a)
        };
        if let Some(&p) = self.products.get(&key) {
            return LinExpr::var(p);
        }
        debug!("abstracting nonlinear product ({}) * ({})", key.0, key.1);
        self.nonlinear = true;
        let p = self.internal_var("opaque product");
        self.products.insert(key, p);
        LinExpr::var(p)
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    #[test]
    fn test_complementary_atoms_share_variable() {
        let mut enc = Encoder::new(64);
        let x = Real::var("x");
        let lt = enc.encode(&x.lt(1));
        let ge = enc.encode(&x.ge(1));
        assert_eq!(lt, -ge);
        assert_eq!(enc.num_atoms(), 1);

        // Scaling does not create a new atom either.
        let scaled = enc.encode(&(&x * 2).lt(2));
        assert_eq!(scaled, lt);
        assert_eq!(enc.num_atoms(), 1);
    }

    #[test]
    fn test_constant_comparisons() {
        let mut enc = Encoder::new(64);
        assert_eq!(enc.encode(&Real::from(1).lt(2)), enc.bdd().one);
        assert_eq!(enc.encode(&Real::from(1).eq_to(2)), enc.bdd().zero);
        let x = Real::var("x");
        assert_eq!(enc.encode(&(&x - &x).eq_to(0)), enc.bdd().one);
        assert_eq!(enc.num_atoms(), 0);
    }

    #[test]
    fn test_equality_uses_two_atoms() {
        let mut enc = Encoder::new(64);
        let x = Real::var("x");
        let eq = enc.encode(&x.eq_to(3));
        let ne = enc.encode(&x.ne_to(3));
        assert_eq!(eq, -ne);
        assert_eq!(enc.num_atoms(), 2);
    }

    #[test]
    fn test_ite_purification() {
        let mut enc = Encoder::new(64);
        let p = Bool::var("p");
        let count = p.ite(1, 0);
        let e1 = enc.linearize(&count);
        let e2 = enc.linearize(&count);
        assert_eq!(e1, e2);
        assert_eq!(enc.side.len(), 1);
        assert_eq!(enc.var_name(0), None);
        assert!(!enc.is_nonlinear());
    }

    #[test]
    fn test_nonlinear_product() {
        let mut enc = Encoder::new(64);
        let x = Real::var("x");
        let y = Real::var("y");
        let xy = enc.linearize(&(&x * &y));
        let yx = enc.linearize(&(&y * &x));
        assert_eq!(xy, yx);
        assert!(enc.is_nonlinear());

        let scaled = enc.linearize(&(&x * 3));
        assert!(!scaled.is_constant());
        assert_eq!(enc.var_name(0), Some("x"));
    }

    #[test]
    fn test_internal_names_do_not_clash() {
        let mut enc = Encoder::new(64);
        let p = Bool::var("p");
        let t = enc.linearize(&p.ite(1, 0));
        let user = enc.linearize(&Real::var("!ite0"));
        assert_ne!(t, user);
        assert_eq!(enc.var_name(0), None);
        assert_eq!(enc.var_name(1), Some("!ite0"));
    }
}
