//! The capability contract a constraint store has to offer to [`Piecewise`][crate::piecewise::Piecewise].

use std::fmt::{Display, Formatter};
use std::ops::Deref;

use crate::expr::{Bool, Real};

/// Outcome of a satisfiability check.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum SatResult {
    Sat,
    Unsat,
    Unknown,
}

impl Display for SatResult {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SatResult::Sat => "sat",
            SatResult::Unsat => "unsat",
            SatResult::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

/// An incremental constraint store with nested scopes.
///
/// All methods take `&self`: a backend is shared by every object that registers constraints
/// into it, and is expected to use interior mutability (see [`Model`][crate::model::Model]).
pub trait Backend {
    /// Register `constraint` in the current scope.
    fn add(&self, constraint: Bool);

    /// Open a nested scope.
    fn push(&self);

    /// Drop every constraint added since the matching [`push`][Backend::push].
    ///
    /// # Panics
    ///
    /// Panics if no scope is open.
    fn pop(&self);

    /// Decide satisfiability of all constraints in all open scopes.
    fn check(&self) -> SatResult;

    /// A real unknown named `name`. The same name always denotes the same unknown.
    fn new_real(&self, name: &str) -> Real;

    /// Next id from the backend's allocator, used to build unique symbol names.
    fn fresh_id(&self) -> usize;

    /// Declare every unknown `constraint` mentions, for backends that track declarations.
    fn declare_all(&self, _constraint: &Bool) {}
}

/// A scope that is popped when the guard goes out of scope.
///
/// ```
/// use piecewise_rs::backend::{Backend, SatResult, Scope};
/// use piecewise_rs::model::Model;
///
/// let model = Model::default();
/// let x = model.new_real("x");
/// model.add(x.gt(0));
/// {
///     let scope = Scope::new(&model);
///     scope.add(x.lt(0));
///     assert_eq!(scope.check(), SatResult::Unsat);
/// }
/// assert_eq!(model.check(), SatResult::Sat);
/// ```
pub struct Scope<'a, B: Backend + ?Sized> {
    backend: &'a B,
}

impl<'a, B: Backend + ?Sized> Scope<'a, B> {
    pub fn new(backend: &'a B) -> Self {
        backend.push();
        Self { backend }
    }
}

impl<B: Backend + ?Sized> Deref for Scope<'_, B> {
    type Target = B;

    fn deref(&self) -> &B {
        self.backend
    }
}

impl<B: Backend + ?Sized> Drop for Scope<'_, B> {
    fn drop(&mut self) {
        self.backend.pop();
    }
}
