//! Values defined by cases.
//!
//! A [`Piecewise`] stands for a real quantity that equals `vᵢ` whenever condition `cᵢ`
//! holds, e.g. "`x = 1` if `y < 0` and `x = 2` otherwise". It is most useful for
//! multiplication: `pw * e` for a symbolic `e` is not linear, but each case
//! `cᵢ ⇒ aux = vᵢ·e` is, as long as the values are literals.
//!
//! The conditions *must* be mutually exclusive and exhaustive. Nothing enforces this at
//! construction time; [`Piecewise::verify`] proves it with a separate satisfiability query.
//!
//! ```
//! use piecewise_rs::backend::{Backend, SatResult};
//! use piecewise_rs::model::Model;
//! use piecewise_rs::piecewise::Piecewise;
//!
//! let model = Model::default();
//! let x = model.new_real("x");
//! let y = model.new_real("y");
//!
//! // 1 below zero, 2 from zero on
//! let pw = Piecewise::from_breakpoints(&model, "rate", &x, [0], [Some(1), Some(2)]).unwrap();
//! pw.verify(None).unwrap();
//!
//! let z = &pw * &y;
//! model.add(x.ge(5));
//! model.add(y.eq_to(3));
//! model.add(z.ne_to(6));
//! assert_eq!(model.check(), SatResult::Unsat);
//! ```

use std::cell::{Cell, OnceCell};
use std::fmt::Write as _;
use std::ops::{Add, Mul};

use log::debug;

use crate::backend::{Backend, SatResult, Scope};
use crate::error::{PiecewiseError, Result};
use crate::expr::{Bool, Real};
use crate::model::Model;

pub struct Piecewise<'m, B: Backend = Model> {
    model: &'m B,
    name: String,
    id: usize,
    vals: Vec<(Bool, Real)>,
    /// Distinguishes the auxiliary unknowns created by [`apply_mul`] and [`apply_add`].
    ///
    /// [`apply_mul`]: Piecewise::apply_mul
    /// [`apply_add`]: Piecewise::apply_add
    aux_id: Cell<usize>,
    val_def: OnceCell<Real>,
}

impl<'m, B: Backend> Piecewise<'m, B> {
    /// Wrap the `(condition, value)` pairs. The id comes from the model's allocator, so
    /// generated names never collide even when `name` is reused.
    pub fn new(model: &'m B, name: impl Into<String>, vals: Vec<(Bool, Real)>) -> Self {
        let id = model.fresh_id();
        let name = name.into();
        debug!("piecewise {} #{} with {} cases", name, id, vals.len());
        Self {
            model,
            name,
            id,
            vals,
            aux_id: Cell::new(0),
            val_def: OnceCell::new(),
        }
    }

    /// Compare `var` against the ranges `(-∞, b₁), [b₁, b₂), …, [bₖ, ∞)` and take the
    /// corresponding entry of `range_vals`, which must hold exactly `k + 1` entries.
    ///
    /// A `None` entry declares that its range never occurs: the case is left out, so
    /// [`verify`][Piecewise::verify] only succeeds if the ranges that remain cover every
    /// reachable value of `var`. With no breakpoints at all the single entry applies
    /// unconditionally.
    pub fn from_breakpoints<T, V>(
        model: &'m B,
        name: impl Into<String>,
        var: &Real,
        breaks: impl IntoIterator<Item = T>,
        range_vals: impl IntoIterator<Item = Option<V>>,
    ) -> Result<Self>
    where
        T: Into<Real>,
        V: Into<Real>,
    {
        let breaks: Vec<Real> = breaks.into_iter().map(Into::into).collect();
        let range_vals: Vec<Option<Real>> = range_vals.into_iter().map(|v| v.map(Into::into)).collect();

        if range_vals.len() != breaks.len() + 1 {
            return Err(PiecewiseError::ShapeMismatch {
                breakpoints: breaks.len(),
                values: range_vals.len(),
            });
        }
        for (i, pair) in breaks.windows(2).enumerate() {
            if let (Some(lo), Some(hi)) = (pair[0].as_const(), pair[1].as_const()) {
                if lo >= hi {
                    return Err(PiecewiseError::UnorderedBreakpoints { index: i + 1 });
                }
            }
        }

        let conds: Vec<Bool> = match (breaks.first(), breaks.last()) {
            (Some(first), Some(last)) => {
                let mut conds = Vec::with_capacity(breaks.len() + 1);
                conds.push(var.lt(first));
                for pair in breaks.windows(2) {
                    conds.push(var.ge(&pair[0]) & var.lt(&pair[1]));
                }
                conds.push(var.ge(last));
                conds
            }
            _ => vec![Bool::constant(true)],
        };

        let vals = conds
            .into_iter()
            .zip(range_vals)
            .filter_map(|(c, v)| v.map(|v| (c, v)))
            .collect();
        Ok(Self::new(model, name, vals))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// The `(condition, value)` pairs, in the order they were given.
    pub fn cases(&self) -> &[(Bool, Real)] {
        &self.vals
    }

    /// The unknown equal to this piecewise value.
    ///
    /// The first call declares it and registers `cᵢ ⇒ val = vᵢ` for every case; later
    /// calls return the same unknown without touching the model.
    pub fn val(&self) -> Real {
        self.val_def
            .get_or_init(|| {
                let v = self.model.new_real(&format!("piecewise_val_{}", self.id));
                for (c, x) in &self.vals {
                    self.model.add(c.implies(v.eq_to(x)));
                }
                v
            })
            .clone()
    }

    fn aux(&self, op: &str) -> Real {
        let aux_id = self.aux_id.get();
        self.aux_id.set(aux_id + 1);
        self.model
            .new_real(&format!("piecewise_{}_{}_{}_{}", op, self.name, self.id, aux_id))
    }

    /// `self * other`.
    ///
    /// A literal factor just scales [`val`][Piecewise::val]. A symbolic one gets a fresh
    /// unknown constrained by `cᵢ ⇒ aux = vᵢ·other`.
    pub fn apply_mul(&self, other: impl Into<Real>) -> Real {
        let other = other.into();
        if other.as_const().is_some() {
            return self.val() * other;
        }
        let aux = self.aux("mul");
        for (c, v) in &self.vals {
            self.model.add(c.implies(aux.eq_to(v * &other)));
        }
        aux
    }

    /// `self + other`, always as a fresh unknown constrained by `cᵢ ⇒ aux = vᵢ + other`.
    pub fn apply_add(&self, other: impl Into<Real>) -> Real {
        let other = other.into();
        let aux = self.aux("add");
        for (c, v) in &self.vals {
            self.model.add(c.implies(aux.eq_to(v + &other)));
        }
        aux
    }

    /// Prove that exactly one condition holds under the constraints of `s` (or under no
    /// constraints at all when `s` is `None`).
    ///
    /// `s` is left as it was found: the query runs inside a scope that is popped on return.
    /// A fresh context declares the unknowns of the conditions itself.
    pub fn verify(&self, s: Option<&B>) -> Result<()>
    where
        B: Default,
    {
        let num_sat = Real::sum(self.vals.iter().map(|(c, _)| c.ite(1, 0)));
        let not_one = num_sat.ne_to(1);

        let fresh;
        let s = match s {
            Some(s) => s,
            None => {
                fresh = B::default();
                fresh.declare_all(&not_one);
                &fresh
            }
        };

        let satisfiable = {
            let scope = Scope::new(s);
            scope.add(not_one);
            scope.check()
        };
        debug!("verify {} #{}: {}", self.name, self.id, satisfiable);

        if satisfiable == SatResult::Unsat {
            Ok(())
        } else {
            Err(PiecewiseError::VerificationFailed {
                result: satisfiable,
                pairs: self.describe(),
            })
        }
    }

    fn describe(&self) -> String {
        let mut out = String::from("[");
        for (i, (c, v)) in self.vals.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            let _ = write!(out, "({}, {})", c, v);
        }
        out.push(']');
        out
    }
}

impl<B: Backend, T: Into<Real>> Mul<T> for &Piecewise<'_, B> {
    type Output = Real;

    fn mul(self, rhs: T) -> Real {
        self.apply_mul(rhs)
    }
}

impl<B: Backend, T: Into<Real>> Add<T> for &Piecewise<'_, B> {
    type Output = Real;

    fn add(self, rhs: T) -> Real {
        self.apply_add(rhs)
    }
}
