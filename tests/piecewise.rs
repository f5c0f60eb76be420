use test_log::test;

use piecewise_rs::backend::{Backend, SatResult, Scope};
use piecewise_rs::error::PiecewiseError;
use piecewise_rs::expr::{Bool, Real};
use piecewise_rs::minmax::{max, min};
use piecewise_rs::model::{Config, Model};
use piecewise_rs::piecewise::Piecewise;

/// `1` below `0`, `2` on `[0, 10)`, `3` from `10` on.
fn steps<'m>(model: &'m Model, x: &Real) -> Piecewise<'m> {
    Piecewise::from_breakpoints(model, "steps", x, [0, 10], [Some(1), Some(2), Some(3)]).unwrap()
}

/// Whether `claim` holds in every solution of `model`.
fn entails(model: &Model, claim: Bool) -> bool {
    let scope = Scope::new(model);
    scope.add(!claim);
    scope.check() == SatResult::Unsat
}

#[test]
fn test_verify_under_ambient_model() {
    let model = Model::default();
    let x = model.new_real("x");
    let y = model.new_real("y");

    // Conditions over y that only partition the range allowed by the model.
    let pw = Piecewise::new(
        &model,
        "narrow",
        vec![(y.lt(&x), Real::from(1)), (y.ge(&x) & y.le(&x + 1), Real::from(2))],
    );
    assert!(matches!(
        pw.verify(None),
        Err(PiecewiseError::VerificationFailed {
            result: SatResult::Sat,
            ..
        })
    ));

    model.add(y.le(&x + 1));
    pw.verify(Some(&model)).unwrap();
    println!("assertions after verify: {}", model.num_assertions());
    assert_eq!(model.num_assertions(), 1);
    assert_eq!(model.num_scopes(), 0);
}

#[test]
fn test_verify_failure_reports_pairs() {
    let model = Model::default();
    let x = model.new_real("x");
    let pw = Piecewise::new(&model, "overlap", vec![(x.lt(5), Real::from(1)), (x.gt(-5), Real::from(2))]);
    let err = pw.verify(None).unwrap_err();
    let message = err.to_string();
    println!("{}", message);
    assert!(message.contains("got sat"));
    assert!(message.contains("((< x 5), 1)"));
    assert!(message.contains("((> x (- 5)), 2)"));
}

#[test]
fn test_val_is_memoized() {
    let model = Model::default();
    let x = model.new_real("x");
    let pw = steps(&model, &x);

    let before = model.num_assertions();
    let v = pw.val();
    let after = model.num_assertions();
    assert_eq!(after - before, 3);
    assert!(pw.val().ptr_eq(&v));
    assert_eq!(model.num_assertions(), after);
}

#[test]
fn test_mul_by_literal_is_scaled_val() {
    let model = Model::default();
    let x = model.new_real("x");
    let pw = steps(&model, &x);

    let scaled = &pw * 4;
    assert!(entails(&model, scaled.eq_to(pw.val() * 4)));

    model.add(x.eq_to(7));
    assert!(entails(&model, scaled.eq_to(8)));
}

#[test]
fn test_mul_by_symbol_twice() {
    let model = Model::default();
    let x = model.new_real("x");
    let e = model.new_real("e");
    let pw = steps(&model, &x);

    let a = &pw * &e;
    let b = &pw * &e;
    assert_ne!(a.name(), b.name());
    assert_eq!(a.name(), Some("piecewise_mul_steps_0_0"));
    assert_eq!(b.name(), Some("piecewise_mul_steps_0_1"));

    for (c, v) in pw.cases() {
        assert!(entails(&model, c.implies(a.eq_to(v * &e))));
        assert!(entails(&model, c.implies(b.eq_to(v * &e))));
    }

    model.add(x.ge(10));
    model.add(e.eq_to(-2));
    assert_eq!(model.check(), SatResult::Sat);
    let assignment = model.model().unwrap();
    assert_eq!(assignment.eval_real(&a), assignment.eval_real(&Real::from(-6)));
    assert_eq!(assignment.eval_real(&b), assignment.eval_real(&a));
}

#[test]
fn test_add() {
    let model = Model::default();
    let x = model.new_real("x");
    let e = model.new_real("e");
    let pw = steps(&model, &x);

    let sum = &pw + &e;
    model.add(x.lt(0));
    assert!(entails(&model, sum.eq_to(&e + 1)));
    assert!(!entails(&model, sum.eq_to(&e + 2)));
}

#[test]
fn test_breakpoints_with_impossible_range() {
    let model = Model::default();
    let x = model.new_real("x");
    let pw = Piecewise::from_breakpoints(&model, "f", &x, [1, 2, 3], [Some(10), Some(20), None, Some(40)]).unwrap();

    let conds: Vec<String> = pw.cases().iter().map(|(c, _)| c.to_string()).collect();
    assert_eq!(conds, ["(< x 1)", "(and (>= x 1) (< x 2))", "(>= x 3)"]);

    // The dropped range is still reachable unless the model says otherwise.
    assert!(pw.verify(None).is_err());
    model.add(x.lt(2) | x.ge(3));
    pw.verify(Some(&model)).unwrap();

    // Dropping a range does not make it unreachable in the model.
    let fresh = Model::default();
    let y = fresh.new_real("y");
    let pw = Piecewise::from_breakpoints(&fresh, "g", &y, [0], [None, Some(1)]).unwrap();
    let v = pw.val();
    fresh.add(y.lt(0));
    fresh.add(v.eq_to(42));
    assert_eq!(fresh.check(), SatResult::Sat);
}

#[test]
fn test_symbolic_breakpoints() {
    let model = Model::default();
    let x = model.new_real("x");
    let lo = model.new_real("lo");
    let hi = model.new_real("hi");
    let pw = Piecewise::from_breakpoints(&model, "band", &x, [&lo, &hi], [Some(-1), Some(0), Some(1)]).unwrap();

    // Without lo < hi the middle range may be empty and the outer ones may overlap.
    assert!(pw.verify(Some(&model)).is_err());
    model.add(lo.lt(&hi));
    pw.verify(Some(&model)).unwrap();
}

#[test]
fn test_names_never_collide() {
    let model = Model::default();
    let x = model.new_real("x");
    let e = model.new_real("e");
    let first = steps(&model, &x);
    let second = steps(&model, &x);

    let names: Vec<String> = [
        first.val(),
        second.val(),
        &first * &e,
        &second * &e,
        &first + &e,
        &second + &e,
        min(&model, &[x.clone(), e.clone(), first.val()]).unwrap(),
        max(&model, &[x.clone(), e.clone(), second.val()]).unwrap(),
    ]
    .iter()
    .map(|r| r.name().unwrap().to_string())
    .collect();
    println!("names = {:?}", names);

    for (i, a) in names.iter().enumerate() {
        for b in &names[i + 1..] {
            assert_ne!(a, b);
        }
    }
}

#[test]
fn test_failed_verify_leaves_no_scope() {
    let model = Model::default();
    let x = model.new_real("x");
    let pw = Piecewise::new(&model, "gap", vec![(x.lt(0), Real::from(0))]);
    for _ in 0..3 {
        assert!(pw.verify(Some(&model)).is_err());
        assert_eq!(model.num_scopes(), 0);
    }
    assert_eq!(model.check(), SatResult::Sat);
}

#[test]
fn test_verify_under_mixed_ambient_model() {
    // A small elimination limit: any blow-up shows as `unknown` and fails the proof.
    let model = Model::with_config(Config {
        max_constraints: 256,
        ..Config::default()
    });
    let x = model.new_real("x");
    let y = model.new_real("y");
    let z = model.new_real("z");
    let p = model.new_bool("p");
    let q = model.new_bool("q");
    model.add(p.implies(y.eq_to(&x + 1)));
    model.add((!&p).implies(y.eq_to(&x * 2)));
    model.add(q.clone() | z.ne_to(&y));
    model.add(z.eq_to(q.ite(&x, &y - 1)));
    model.add(x.ge(-5) & x.le(5));

    let pw = Piecewise::from_breakpoints(&model, "f", &x, [0, 1], [Some(1), Some(2), Some(3)]).unwrap();
    pw.verify(Some(&model)).unwrap();
    let stats = model.statistics();
    println!("stats = {:?}", stats);
    assert_eq!(stats.checks, 1);
    assert_eq!(model.num_assertions(), 5);

    assert_eq!(model.check(), SatResult::Sat);
    let assignment = model.model().unwrap();
    for a in model.assertions() {
        assert!(assignment.eval_bool(&a), "violated: {}", a);
    }
}
