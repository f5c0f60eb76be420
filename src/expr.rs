//! Symbolic real and boolean expressions.
//!
//! Expressions are immutable trees shared through [`Rc`], so cloning a handle is cheap and
//! two handles compare equal exactly when they denote the same term. They carry no link to
//! a [`Model`][crate::model::Model]: a variable is identified by its name alone, and the
//! model that receives an assertion decides what the name means.
//!
//! Both types render as SMT-LIB 2 terms through [`Display`].

use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};
use std::ops::{Add, BitAnd, BitOr, Mul, Neg, Not, Sub};
use std::rc::Rc;

use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{One, Signed, Zero};

use crate::error::ExprError;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum RealNode {
    Const(BigRational),
    Var(String),
    Add(Vec<Real>),
    Mul(Vec<Real>),
    Neg(Real),
    Ite(Bool, Real, Real),
}

/// A real-valued term.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Real(Rc<RealNode>);

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum CmpOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum BoolNode {
    Const(bool),
    Var(String),
    Not(Bool),
    And(Vec<Bool>),
    Or(Vec<Bool>),
    Implies(Bool, Bool),
    Cmp(CmpOp, Real, Real),
}

/// A boolean-valued term.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Bool(Rc<BoolNode>);

impl Real {
    fn new(node: RealNode) -> Self {
        Real(Rc::new(node))
    }

    pub(crate) fn node(&self) -> &RealNode {
        &self.0
    }

    /// A free real unknown. Prefer [`Backend::new_real`][crate::backend::Backend::new_real],
    /// which also declares the name in the model.
    pub fn var(name: impl Into<String>) -> Self {
        Real::new(RealNode::Var(name.into()))
    }

    pub fn constant(value: BigRational) -> Self {
        Real::new(RealNode::Const(value))
    }

    pub fn zero() -> Self {
        Real::constant(BigRational::zero())
    }

    /// Sum of all the terms; the empty sum is zero.
    pub fn sum(terms: impl IntoIterator<Item = Real>) -> Self {
        let mut terms: Vec<Real> = terms.into_iter().collect();
        match terms.len() {
            0 => Real::zero(),
            1 => terms.swap_remove(0),
            _ => Real::new(RealNode::Add(terms)),
        }
    }

    /// The literal value, if this term is a numeric literal.
    pub fn as_const(&self) -> Option<&BigRational> {
        match self.node() {
            RealNode::Const(c) => Some(c),
            _ => None,
        }
    }

    /// The symbol name, if this term is a bare variable.
    pub fn name(&self) -> Option<&str> {
        match self.node() {
            RealNode::Var(name) => Some(name),
            _ => None,
        }
    }

    fn collect_variables(&self, reals: &mut BTreeSet<String>, bools: &mut BTreeSet<String>) {
        match self.node() {
            RealNode::Const(_) => {}
            RealNode::Var(name) => {
                reals.insert(name.clone());
            }
            RealNode::Add(xs) | RealNode::Mul(xs) => {
                for x in xs {
                    x.collect_variables(reals, bools);
                }
            }
            RealNode::Neg(x) => x.collect_variables(reals, bools),
            RealNode::Ite(c, a, b) => {
                c.collect_variables(reals, bools);
                a.collect_variables(reals, bools);
                b.collect_variables(reals, bools);
            }
        }
    }

    /// Whether both handles point to the very same term allocation.
    pub fn ptr_eq(&self, other: &Real) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    fn compare(&self, op: CmpOp, other: impl Into<Real>) -> Bool {
        Bool::new(BoolNode::Cmp(op, self.clone(), other.into()))
    }

    pub fn lt(&self, other: impl Into<Real>) -> Bool {
        self.compare(CmpOp::Lt, other)
    }
    pub fn le(&self, other: impl Into<Real>) -> Bool {
        self.compare(CmpOp::Le, other)
    }
    pub fn gt(&self, other: impl Into<Real>) -> Bool {
        self.compare(CmpOp::Gt, other)
    }
    pub fn ge(&self, other: impl Into<Real>) -> Bool {
        self.compare(CmpOp::Ge, other)
    }
    pub fn eq_to(&self, other: impl Into<Real>) -> Bool {
        self.compare(CmpOp::Eq, other)
    }
    pub fn ne_to(&self, other: impl Into<Real>) -> Bool {
        self.compare(CmpOp::Ne, other)
    }
}

impl Bool {
    fn new(node: BoolNode) -> Self {
        Bool(Rc::new(node))
    }

    pub(crate) fn node(&self) -> &BoolNode {
        &self.0
    }

    /// A free boolean unknown. Prefer [`Model::new_bool`][crate::model::Model::new_bool].
    pub fn var(name: impl Into<String>) -> Self {
        Bool::new(BoolNode::Var(name.into()))
    }

    pub fn constant(value: bool) -> Self {
        Bool::new(BoolNode::Const(value))
    }

    pub fn as_const(&self) -> Option<bool> {
        match self.node() {
            BoolNode::Const(b) => Some(*b),
            _ => None,
        }
    }

    /// Conjunction of all the terms; the empty conjunction is `true`.
    pub fn and(terms: impl IntoIterator<Item = Bool>) -> Self {
        let mut terms: Vec<Bool> = terms.into_iter().collect();
        match terms.len() {
            0 => Bool::constant(true),
            1 => terms.swap_remove(0),
            _ => Bool::new(BoolNode::And(terms)),
        }
    }

    /// Disjunction of all the terms; the empty disjunction is `false`.
    pub fn or(terms: impl IntoIterator<Item = Bool>) -> Self {
        let mut terms: Vec<Bool> = terms.into_iter().collect();
        match terms.len() {
            0 => Bool::constant(false),
            1 => terms.swap_remove(0),
            _ => Bool::new(BoolNode::Or(terms)),
        }
    }

    pub fn implies(&self, other: impl Into<Bool>) -> Bool {
        Bool::new(BoolNode::Implies(self.clone(), other.into()))
    }

    /// `if self then a else b` as a real term.
    pub fn ite(&self, a: impl Into<Real>, b: impl Into<Real>) -> Real {
        Real::new(RealNode::Ite(self.clone(), a.into(), b.into()))
    }
    /// Names of the real and boolean unknowns this term mentions.
    pub fn variables(&self) -> (BTreeSet<String>, BTreeSet<String>) {
        let mut reals = BTreeSet::new();
        let mut bools = BTreeSet::new();
        self.collect_variables(&mut reals, &mut bools);
        (reals, bools)
    }

    fn collect_variables(&self, reals: &mut BTreeSet<String>, bools: &mut BTreeSet<String>) {
        match self.node() {
            BoolNode::Const(_) => {}
            BoolNode::Var(name) => {
                bools.insert(name.clone());
            }
            BoolNode::Not(x) => x.collect_variables(reals, bools),
            BoolNode::And(xs) | BoolNode::Or(xs) => {
                for x in xs {
                    x.collect_variables(reals, bools);
                }
            }
            BoolNode::Implies(a, b) => {
                a.collect_variables(reals, bools);
                b.collect_variables(reals, bools);
            }
            BoolNode::Cmp(_, a, b) => {
                a.collect_variables(reals, bools);
                b.collect_variables(reals, bools);
            }
        }
    }
}

impl From<BigRational> for Real {
    fn from(value: BigRational) -> Self {
        Real::constant(value)
    }
}

impl From<i64> for Real {
    fn from(value: i64) -> Self {
        Real::constant(BigRational::from_integer(BigInt::from(value)))
    }
}

impl From<i32> for Real {
    fn from(value: i32) -> Self {
        Real::from(value as i64)
    }
}

impl From<&Real> for Real {
    fn from(value: &Real) -> Self {
        value.clone()
    }
}

impl TryFrom<f64> for Real {
    type Error = ExprError;

    /// Converts the float exactly (every finite `f64` is a dyadic rational).
    fn try_from(value: f64) -> Result<Self, Self::Error> {
        BigRational::from_float(value)
            .map(Real::constant)
            .ok_or(ExprError::NonFinite(value))
    }
}

impl From<bool> for Bool {
    fn from(value: bool) -> Self {
        Bool::constant(value)
    }
}

impl From<&Bool> for Bool {
    fn from(value: &Bool) -> Self {
        value.clone()
    }
}

fn fold(op: fn(&BigRational, &BigRational) -> BigRational, a: &Real, b: &Real) -> Option<Real> {
    match (a.as_const(), b.as_const()) {
        (Some(x), Some(y)) => Some(Real::constant(op(x, y))),
        _ => None,
    }
}

impl<T: Into<Real>> Add<T> for &Real {
    type Output = Real;

    fn add(self, rhs: T) -> Real {
        let rhs = rhs.into();
        fold(|x, y| x + y, self, &rhs)
            .unwrap_or_else(|| Real::new(RealNode::Add(vec![self.clone(), rhs])))
    }
}

impl<T: Into<Real>> Add<T> for Real {
    type Output = Real;

    fn add(self, rhs: T) -> Real {
        &self + rhs
    }
}

impl<T: Into<Real>> Mul<T> for &Real {
    type Output = Real;

    fn mul(self, rhs: T) -> Real {
        let rhs = rhs.into();
        fold(|x, y| x * y, self, &rhs)
            .unwrap_or_else(|| Real::new(RealNode::Mul(vec![self.clone(), rhs])))
    }
}

impl<T: Into<Real>> Mul<T> for Real {
    type Output = Real;

    fn mul(self, rhs: T) -> Real {
        &self * rhs
    }
}

impl Neg for &Real {
    type Output = Real;

    fn neg(self) -> Real {
        match self.as_const() {
            Some(c) => Real::constant(-c),
            None => Real::new(RealNode::Neg(self.clone())),
        }
    }
}

impl Neg for Real {
    type Output = Real;

    fn neg(self) -> Real {
        -&self
    }
}

impl<T: Into<Real>> Sub<T> for &Real {
    type Output = Real;

    fn sub(self, rhs: T) -> Real {
        let rhs: Real = rhs.into();
        self + (-rhs)
    }
}

impl<T: Into<Real>> Sub<T> for Real {
    type Output = Real;

    fn sub(self, rhs: T) -> Real {
        &self - rhs
    }
}

impl Not for &Bool {
    type Output = Bool;

    fn not(self) -> Bool {
        match self.as_const() {
            Some(b) => Bool::constant(!b),
            None => Bool::new(BoolNode::Not(self.clone())),
        }
    }
}

impl Not for Bool {
    type Output = Bool;

    fn not(self) -> Bool {
        !&self
    }
}

impl<T: Into<Bool>> BitAnd<T> for &Bool {
    type Output = Bool;

    fn bitand(self, rhs: T) -> Bool {
        Bool::and([self.clone(), rhs.into()])
    }
}

impl<T: Into<Bool>> BitAnd<T> for Bool {
    type Output = Bool;

    fn bitand(self, rhs: T) -> Bool {
        Bool::and([self, rhs.into()])
    }
}

impl<T: Into<Bool>> BitOr<T> for &Bool {
    type Output = Bool;

    fn bitor(self, rhs: T) -> Bool {
        Bool::or([self.clone(), rhs.into()])
    }
}

impl<T: Into<Bool>> BitOr<T> for Bool {
    type Output = Bool;

    fn bitor(self, rhs: T) -> Bool {
        Bool::or([self, rhs.into()])
    }
}

/// Writes `name` as an SMT-LIB symbol, quoting it when it is not a simple symbol.
pub(crate) fn write_symbol(f: &mut Formatter<'_>, name: &str) -> std::fmt::Result {
    const EXTRA: &str = "~!@$%^&*_-+=<>.?/";
    let simple = !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || EXTRA.contains(c));
    if simple {
        write!(f, "{}", name)
    } else {
        write!(f, "|{}|", name)
    }
}

fn write_rational(f: &mut Formatter<'_>, value: &BigRational) -> std::fmt::Result {
    let magnitude = value.abs();
    let body = if magnitude.denom().is_one() {
        magnitude.numer().to_string()
    } else {
        format!("(/ {} {})", magnitude.numer(), magnitude.denom())
    };
    if value.is_negative() {
        write!(f, "(- {})", body)
    } else {
        write!(f, "{}", body)
    }
}

fn write_app<T: Display>(f: &mut Formatter<'_>, op: &str, args: &[T]) -> std::fmt::Result {
    write!(f, "({}", op)?;
    for arg in args {
        write!(f, " {}", arg)?;
    }
    write!(f, ")")
}

impl Display for Real {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.node() {
            RealNode::Const(c) => write_rational(f, c),
            RealNode::Var(name) => write_symbol(f, name),
            RealNode::Add(xs) => write_app(f, "+", xs),
            RealNode::Mul(xs) => write_app(f, "*", xs),
            RealNode::Neg(x) => write!(f, "(- {})", x),
            RealNode::Ite(c, a, b) => write!(f, "(ite {} {} {})", c, a, b),
        }
    }
}

impl Display for CmpOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
            CmpOp::Eq => "=",
            CmpOp::Ne => "distinct",
        };
        write!(f, "{}", s)
    }
}

impl Display for Bool {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.node() {
            BoolNode::Const(b) => write!(f, "{}", b),
            BoolNode::Var(name) => write_symbol(f, name),
            BoolNode::Not(x) => write!(f, "(not {})", x),
            BoolNode::And(xs) => write_app(f, "and", xs),
            BoolNode::Or(xs) => write_app(f, "or", xs),
            BoolNode::Implies(a, b) => write!(f, "(=> {} {})", a, b),
            BoolNode::Cmp(op, a, b) => write!(f, "({} {} {})", op, a, b),
        }
    }
}
