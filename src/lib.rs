//! # piecewise-rs: values defined by cases
//!
//! **`piecewise-rs`** models real quantities that take a different value depending on which
//! of several conditions holds, inside an incremental constraint model.
//!
//! The typical use is a rate that depends on a range: "the slope is `1` below zero and `2`
//! from zero on". Multiplying such a value by another unknown is not linear, but splitting
//! it case by case is, so [`Piecewise`][crate::piecewise::Piecewise] keeps the cases and
//! emits one implication per case whenever it is combined with something.
//!
//! ## Key Features
//!
//! - **Backend-agnostic core**: [`Piecewise`][crate::piecewise::Piecewise] only needs the
//!   [`Backend`][crate::backend::Backend] contract: add, push, pop, check, declare.
//! - **Batteries included**: [`Model`][crate::model::Model] decides linear real arithmetic
//!   with BDD-guided search and Fourier–Motzkin elimination, and produces witnesses.
//! - **Self-checking**: [`Piecewise::verify`][crate::piecewise::Piecewise::verify] proves that
//!   the cases are mutually exclusive and exhaustive.
//!
//! ## Basic Usage
//!
//! ```rust
//! use piecewise_rs::backend::{Backend, SatResult};
//! use piecewise_rs::model::Model;
//! use piecewise_rs::piecewise::Piecewise;
//!
//! // 1. Create the model and some unknowns
//! let model = Model::default();
//! let x = model.new_real("x");
//! let y = model.new_real("y");
//!
//! // 2. Rate is 1 for x < 0, and 2 for x >= 0
//! let rate = Piecewise::from_breakpoints(&model, "rate", &x, [0], [Some(1), Some(2)]).unwrap();
//! rate.verify(None).unwrap();
//!
//! // 3. Combine it with another unknown
//! let z = &rate * &y;
//!
//! // 4. Ask questions
//! model.add(x.eq_to(-3));
//! model.add(y.eq_to(5));
//! assert_eq!(model.check(), SatResult::Sat);
//! let assignment = model.model().unwrap();
//! assert_eq!(assignment.eval_real(&z), assignment.eval_real(&y));
//! ```
//!
//! ## Core Components
//!
//! - **[`piecewise`]**: The [`Piecewise`][crate::piecewise::Piecewise] value itself.
//! - **[`minmax`]**: Minimum and maximum of several terms.
//! - **[`expr`]**: Real and boolean terms with operator overloading.
//! - **[`model`]**: The in-process solver.
//! - **[`bdd`]**: The decision diagram the solver searches over.

pub mod backend;
pub mod bdd;
mod encode;
pub mod error;
pub mod expr;
pub mod linear;
pub mod minmax;
pub mod model;
pub mod piecewise;
pub mod reference;
