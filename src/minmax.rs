//! Minimum and maximum of real terms.
//!
//! Two arguments become a plain `ite`. Longer lists get a fresh unknown `r` with
//! `r ≤ nᵢ` (resp. `r ≥ nᵢ`) for every argument and `r = n₁ ∨ … ∨ r = nₖ`.

use log::debug;

use crate::backend::Backend;
use crate::error::{PiecewiseError, Result};
use crate::expr::{Bool, CmpOp, Real};

pub fn min<B: Backend + ?Sized>(model: &B, nums: &[Real]) -> Result<Real> {
    extremum(model, "min", CmpOp::Le, nums)
}

pub fn max<B: Backend + ?Sized>(model: &B, nums: &[Real]) -> Result<Real> {
    extremum(model, "max", CmpOp::Ge, nums)
}

fn extremum<B: Backend + ?Sized>(model: &B, op: &'static str, cmp: CmpOp, nums: &[Real]) -> Result<Real> {
    let bound = |a: &Real, b: &Real| match cmp {
        CmpOp::Le => a.le(b),
        _ => a.ge(b),
    };
    match nums {
        [] => Err(PiecewiseError::EmptyArguments { op }),
        [x] => Ok(x.clone()),
        [a, b] => Ok(bound(a, b).ite(a, b)),
        _ => {
            let res = model.new_real(&format!("{}{}", op, model.fresh_id()));
            debug!("{} over {} terms as {}", op, nums.len(), res);
            for n in nums {
                model.add(bound(&res, n));
            }
            model.add(Bool::or(nums.iter().map(|n| res.eq_to(n))));
            Ok(res)
        }
    }
}
