//! Algebraic laws of the formula language, checked by property tests.

use std::collections::HashMap;

use proptest::prelude::*;
use serde_json::{json, Value as Json};
use verdict_engine::smt::{GroundBackend, SatResult, SmtBackend, SmtExpr};
use verdict_engine::{compile_formula, Value};
use verdict_ontology::{CmpOp, Formula, Sort};

/// Decide whether a formula holds when each variable is pinned to the given
/// value, mirroring the verifier's negation check.
fn holds(formula: &Json, bindings: &[(&str, Sort, Value)]) -> bool {
    let parsed = Formula::parse(formula).expect("formula parses");
    let decls: HashMap<String, Sort> = bindings
        .iter()
        .map(|(n, s, _)| (n.to_string(), *s))
        .collect();
    let compiled = compile_formula(&parsed, &decls).expect("formula compiles");

    let mut ctx = GroundBackend.fresh_context();
    for (name, sort) in &compiled.free {
        ctx.declare(name, *sort);
    }
    for (name, sort, value) in bindings {
        let literal = match value {
            Value::Bool(b) => SmtExpr::Bool(*b),
            Value::Int(i) => SmtExpr::Int(*i),
            Value::Real(r) => SmtExpr::Real(*r),
            other => panic!("non-solver value {:?}", other),
        };
        ctx.assert(SmtExpr::Cmp(
            CmpOp::Eq,
            Box::new(SmtExpr::Var(name.to_string(), *sort)),
            Box::new(literal),
        ));
    }
    ctx.assert(SmtExpr::Not(Box::new(compiled.expr)));
    match ctx.check().expect("ground check succeeds") {
        SatResult::Unsat => true,
        SatResult::Sat => false,
        SatResult::Unknown(reason) => panic!("ground query came back unknown: {}", reason),
    }
}

proptest! {
    // and([f]) == or([f]) == f for any single-element wrapping.
    #[test]
    fn singleton_connectives_are_identity(x in -1000i64..1000, bound in -1000i64..1000) {
        let inner = json!({"<=": ["x", bound]});
        let bindings = [("x", Sort::Int, Value::Int(x))];
        let direct = holds(&inner, &bindings);
        prop_assert_eq!(holds(&json!({"and": [inner.clone()]}), &bindings), direct);
        prop_assert_eq!(holds(&json!({"or": [inner.clone()]}), &bindings), direct);
    }

    // implies(a, b) == or(not(a), b).
    #[test]
    fn implication_is_material(a in any::<bool>(), b in any::<bool>()) {
        let bindings = [
            ("a", Sort::Bool, Value::Bool(a)),
            ("b", Sort::Bool, Value::Bool(b)),
        ];
        let implies = json!({"implies": [
            {"==": ["a", true]},
            {"==": ["b", true]},
        ]});
        let rewritten = json!({"or": [
            {"not": {"==": ["a", true]}},
            {"==": ["b", true]},
        ]});
        prop_assert_eq!(holds(&implies, &bindings), holds(&rewritten, &bindings));
        prop_assert_eq!(holds(&implies, &bindings), !a || b);
    }

    // ite(true, x, y) == x and ite(false, x, y) == y.
    #[test]
    fn ite_selects_its_branch(x in -1000i64..1000, y in -1000i64..1000) {
        let bindings = [
            ("x", Sort::Int, Value::Int(x)),
            ("y", Sort::Int, Value::Int(y)),
        ];
        prop_assert!(holds(
            &json!({"==": [{"ite": [true, "x", "y"]}, "x"]}),
            &bindings,
        ), "ite(true, x, y) == x");
        prop_assert!(holds(
            &json!({"==": [{"ite": [false, "x", "y"]}, "y"]}),
            &bindings,
        ), "ite(false, x, y) == y");
    }

    // The negation check agrees with direct evaluation of a comparison.
    #[test]
    fn comparison_verdicts_match_native_semantics(x in -1000i64..1000, bound in -1000i64..1000) {
        let bindings = [("x", Sort::Int, Value::Int(x))];
        prop_assert_eq!(holds(&json!({"<": ["x", bound]}), &bindings), x < bound);
        prop_assert_eq!(holds(&json!({">=": ["x", bound]}), &bindings), x >= bound);
        prop_assert_eq!(holds(&json!({"!=": ["x", bound]}), &bindings), x != bound);
    }

    // min/max agree with their pointwise definitions.
    #[test]
    fn min_max_agree_with_pointwise(x in -1000i64..1000, y in -1000i64..1000) {
        let bindings = [
            ("x", Sort::Int, Value::Int(x)),
            ("y", Sort::Int, Value::Int(y)),
        ];
        prop_assert!(holds(
            &json!({"==": [{"min": ["x", "y"]}, x.min(y)]}),
            &bindings,
        ), "min(x, y) matches x.min(y)");
        prop_assert!(holds(
            &json!({"==": [{"max": ["x", "y"]}, x.max(y)]}),
            &bindings,
        ), "max(x, y) matches x.max(y)");
    }
}
