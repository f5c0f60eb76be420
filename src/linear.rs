//! Linear constraints over the reals and their exact feasibility check.
//!
//! Every theory literal the search collects is a [`Constraint`] of the form `e < 0` or
//! `e ≤ 0`. A conjunction of them is decided by Fourier–Motzkin elimination over
//! [`BigRational`], which is exact for real-valued variables (strict bounds included).
//! When a conjunction is feasible, the elimination stages are replayed backwards to pick a
//! witness value for every variable.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt::{Display, Formatter};

use log::trace;
use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{One, Signed, Zero};

/// `constant + Σ coeff·x`, with no zero coefficients stored.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LinExpr {
    coeffs: BTreeMap<usize, BigRational>,
    constant: BigRational,
}

impl Default for LinExpr {
    fn default() -> Self {
        Self::constant(BigRational::zero())
    }
}

impl LinExpr {
    pub fn constant(c: BigRational) -> Self {
        Self {
            coeffs: BTreeMap::new(),
            constant: c,
        }
    }

    pub fn var(v: usize) -> Self {
        let mut coeffs = BTreeMap::new();
        coeffs.insert(v, BigRational::one());
        Self {
            coeffs,
            constant: BigRational::zero(),
        }
    }

    pub fn constant_term(&self) -> &BigRational {
        &self.constant
    }

    pub fn coeff(&self, v: usize) -> Option<&BigRational> {
        self.coeffs.get(&v)
    }

    pub fn is_constant(&self) -> bool {
        self.coeffs.is_empty()
    }

    pub fn variables(&self) -> impl Iterator<Item = usize> + '_ {
        self.coeffs.keys().copied()
    }

    /// Coefficient of the smallest variable, if any.
    pub fn leading(&self) -> Option<&BigRational> {
        self.coeffs.values().next()
    }

    #[must_use]
    pub fn add(&self, other: &Self) -> Self {
        let mut result = self.clone();
        result.constant += &other.constant;
        for (&v, c) in &other.coeffs {
            let entry = result.coeffs.entry(v).or_insert_with(BigRational::zero);
            *entry += c;
            if entry.is_zero() {
                result.coeffs.remove(&v);
            }
        }
        result
    }

    #[must_use]
    pub fn sub(&self, other: &Self) -> Self {
        self.add(&other.scale(&-BigRational::one()))
    }

    #[must_use]
    pub fn scale(&self, k: &BigRational) -> Self {
        if k.is_zero() {
            return Self::default();
        }
        Self {
            coeffs: self.coeffs.iter().map(|(&v, c)| (v, c * k)).collect(),
            constant: &self.constant * k,
        }
    }

    /// Value under `values`; variables without a value count as zero.
    pub fn eval(&self, values: &BTreeMap<usize, BigRational>) -> BigRational {
        let mut total = self.constant.clone();
        for (v, c) in &self.coeffs {
            if let Some(x) = values.get(v) {
                total += c * x;
            }
        }
        total
    }
}

impl Display for LinExpr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for (v, c) in &self.coeffs {
            if !first {
                write!(f, " + ")?;
            }
            first = false;
            if c.is_one() {
                write!(f, "x{}", v)?;
            } else {
                write!(f, "{}*x{}", c, v)?;
            }
        }
        if first {
            write!(f, "{}", self.constant)
        } else if self.constant.is_zero() {
            Ok(())
        } else {
            write!(f, " + {}", self.constant)
        }
    }
}

/// `expr < 0` when `strict`, `expr ≤ 0` otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Constraint {
    pub expr: LinExpr,
    pub strict: bool,
}

impl Constraint {
    pub fn le(expr: LinExpr) -> Self {
        Self { expr, strict: false }
    }

    pub fn lt(expr: LinExpr) -> Self {
        Self { expr, strict: true }
    }

    #[must_use]
    pub fn negate(&self) -> Self {
        // ¬(e ≤ 0) ≡ -e < 0 and ¬(e < 0) ≡ -e ≤ 0
        Self {
            expr: self.expr.scale(&-BigRational::one()),
            strict: !self.strict,
        }
    }

    /// Truth value when the constraint mentions no variable.
    pub fn truth(&self) -> Option<bool> {
        if !self.expr.is_constant() {
            return None;
        }
        let c = self.expr.constant_term();
        Some(if self.strict {
            c.is_negative()
        } else {
            !c.is_positive()
        })
    }

    /// Scaled so that the leading coefficient has magnitude one.
    #[must_use]
    pub fn normalized(&self) -> Self {
        match self.expr.leading() {
            Some(lead) => Self {
                expr: self.expr.scale(&lead.abs().recip()),
                strict: self.strict,
            },
            None => self.clone(),
        }
    }
}

impl Display for Constraint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} 0", self.expr, if self.strict { "<" } else { "<=" })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Feasibility {
    /// Witness values for every variable mentioned by the constraints.
    Feasible(BTreeMap<usize, BigRational>),
    Infeasible,
    /// Elimination produced more than the allowed number of constraints.
    GaveUp,
}

/// One step of the elimination, replayed backwards to build the witness.
enum Stage {
    /// The variable was solved from `expr = 0` and substituted everywhere.
    Substituted(usize, LinExpr),
    /// The variable was projected out; these constraints bounded it.
    Eliminated(usize, Vec<Constraint>),
}

/// Decides the conjunction of `constraints`.
///
/// Equalities (pairs `e ≤ 0`, `-e ≤ 0`) are substituted away first; the remaining
/// variables go through Fourier–Motzkin elimination, cheapest variable first.
/// `limit` bounds the number of constraints kept after each elimination step.
pub fn solve(constraints: &[Constraint], limit: usize) -> Feasibility {
    let vars: BTreeSet<usize> = constraints.iter().flat_map(|c| c.expr.variables()).collect();
    let Some(mut current) = simplify(constraints.iter().cloned()) else {
        return Feasibility::Infeasible;
    };
    let mut stages = Vec::with_capacity(vars.len());

    loop {
        if let Some(eq) = find_equality(&current) {
            let Some((v, a)) = eq.coeffs.iter().next().map(|(&v, a)| (v, a.clone())) else {
                break;
            };
            trace!("x{} solved from {} = 0", v, eq);
            current = match simplify(current.iter().map(|c| substitute(c, v, &eq, &a))) {
                Some(cs) => cs,
                None => return Feasibility::Infeasible,
            };
            stages.push(Stage::Substituted(v, eq));
            continue;
        }

        let Some(v) = cheapest_variable(&current) else {
            break;
        };
        let (with, without): (Vec<Constraint>, Vec<Constraint>) =
            current.into_iter().partition(|c| c.expr.coeff(v).is_some());
        let (lower, upper): (Vec<&Constraint>, Vec<&Constraint>) =
            with.iter().partition(|c| c.expr.coeff(v).is_some_and(|a| a.is_negative()));

        let mut next = without;
        for l in &lower {
            for u in &upper {
                let a_l = l.expr.coeff(v).cloned().unwrap_or_else(BigRational::zero);
                let a_u = u.expr.coeff(v).cloned().unwrap_or_else(BigRational::zero);
                // Both multipliers are positive, so the direction of the bound is kept.
                next.push(Constraint {
                    expr: u.expr.scale(&-a_l).add(&l.expr.scale(&a_u)),
                    strict: l.strict || u.strict,
                });
            }
        }
        let Some(next) = simplify(next) else {
            trace!("x{} eliminated into a contradiction", v);
            return Feasibility::Infeasible;
        };

        if next.len() > limit {
            trace!("giving up after eliminating x{}: {} constraints", v, next.len());
            return Feasibility::GaveUp;
        }
        stages.push(Stage::Eliminated(v, with));
        current = next;
    }

    let mut values = back_substitute(&stages);
    for v in vars {
        values.entry(v).or_insert_with(BigRational::zero);
    }
    Feasibility::Feasible(values)
}

/// Normalizes every constraint, drops tautologies and keeps only the tightest bound per
/// variable part. `None` if a constraint is false or two bounds contradict each other.
fn simplify(constraints: impl IntoIterator<Item = Constraint>) -> Option<Vec<Constraint>> {
    let mut best: BTreeMap<BTreeMap<usize, BigRational>, (BigRational, bool)> = BTreeMap::new();
    for c in constraints {
        match c.truth() {
            Some(true) => continue,
            Some(false) => return None,
            None => {}
        }
        let c = c.normalized();
        let strict = c.strict;
        let LinExpr { coeffs, constant } = c.expr;
        match best.get_mut(&coeffs) {
            Some((k, s)) => {
                if constant > *k {
                    *k = constant;
                    *s = strict;
                } else if constant == *k {
                    *s |= strict;
                }
            }
            None => {
                best.insert(coeffs, (constant, strict));
            }
        }
    }

    // e + k1 ⋈ 0 and -e + k2 ⋈ 0 bound e within [k2, -k1].
    for (coeffs, (k1, s1)) in &best {
        let opposite: BTreeMap<usize, BigRational> = coeffs.iter().map(|(&v, a)| (v, -a)).collect();
        if let Some((k2, s2)) = best.get(&opposite) {
            let gap = k1 + k2;
            if gap.is_positive() || (gap.is_zero() && (*s1 || *s2)) {
                return None;
            }
        }
    }

    Some(
        best.into_iter()
            .map(|(coeffs, (constant, strict))| Constraint {
                expr: LinExpr { coeffs, constant },
                strict,
            })
            .collect(),
    )
}

/// `e` such that both `e ≤ 0` and `-e ≤ 0` are present.
fn find_equality(constraints: &[Constraint]) -> Option<LinExpr> {
    let weak: HashSet<&LinExpr> = constraints.iter().filter(|c| !c.strict).map(|c| &c.expr).collect();
    constraints
        .iter()
        .filter(|c| !c.strict)
        .find(|c| weak.contains(&c.expr.scale(&-BigRational::one())))
        .map(|c| c.expr.clone())
}

/// Rewrites `c` with `v` replaced according to `eq = 0`, where `a` is the coefficient of `v`
/// in `eq`.
fn substitute(c: &Constraint, v: usize, eq: &LinExpr, a: &BigRational) -> Constraint {
    match c.expr.coeff(v) {
        Some(b) => Constraint {
            expr: c.expr.sub(&eq.scale(&(b / a))),
            strict: c.strict,
        },
        None => c.clone(),
    }
}

/// The variable whose elimination creates the fewest new constraints.
fn cheapest_variable(constraints: &[Constraint]) -> Option<usize> {
    let mut bounds: BTreeMap<usize, (usize, usize)> = BTreeMap::new();
    for c in constraints {
        for (&v, a) in &c.expr.coeffs {
            let entry = bounds.entry(v).or_default();
            if a.is_negative() {
                entry.0 += 1;
            } else {
                entry.1 += 1;
            }
        }
    }
    bounds
        .into_iter()
        .min_by_key(|&(_, (lower, upper))| lower * upper)
        .map(|(v, _)| v)
}

fn back_substitute(stages: &[Stage]) -> BTreeMap<usize, BigRational> {
    let mut values = BTreeMap::new();
    for stage in stages.iter().rev() {
        let (v, value) = match stage {
            Stage::Substituted(v, eq) => {
                let a = eq.coeff(*v).cloned().unwrap_or_else(BigRational::one);
                (*v, -eq.eval(&values) / a)
            }
            Stage::Eliminated(v, with) => {
                let mut lower: Option<(BigRational, bool)> = None;
                let mut upper: Option<(BigRational, bool)> = None;
                for c in with {
                    let Some(a) = c.expr.coeff(*v) else { continue };
                    // a·v + rest ⋈ 0  =>  v ⋈ -rest / a (direction flips when a < 0)
                    let rest = c.expr.eval(&values);
                    let bound = -rest / a;
                    if a.is_positive() {
                        tighten(&mut upper, bound, c.strict, |new, old| new < old);
                    } else {
                        tighten(&mut lower, bound, c.strict, |new, old| new > old);
                    }
                }
                (*v, pick(lower, upper))
            }
        };
        trace!("x{} := {}", v, value);
        values.insert(v, value);
    }
    values
}

fn tighten(
    slot: &mut Option<(BigRational, bool)>,
    bound: BigRational,
    strict: bool,
    better: impl Fn(&BigRational, &BigRational) -> bool,
) {
    match slot {
        Some((old, old_strict)) if *old == bound => *old_strict |= strict,
        Some((old, _)) if !better(&bound, old) => {}
        _ => *slot = Some((bound, strict)),
    }
}

fn pick(lower: Option<(BigRational, bool)>, upper: Option<(BigRational, bool)>) -> BigRational {
    let one = BigRational::one();
    match (lower, upper) {
        (None, None) => BigRational::zero(),
        (Some((l, strict)), None) => {
            if strict {
                (l + one).floor()
            } else {
                l
            }
        }
        (None, Some((u, strict))) => {
            if strict {
                (u - one).ceil()
            } else {
                u
            }
        }
        (Some((l, _)), Some((u, _))) if l == u => l,
        (Some((l, _)), Some((u, _))) => (l + u) / BigRational::from_integer(BigInt::from(2)),
    }
}
