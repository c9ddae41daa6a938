//! Typed quantifier-free SMT expressions over Bool, Int, and Real.
//!
//! This is the target language of the formula compiler and the input
//! language of the solver oracle. It renders to SMT-LIB2 for external
//! solver processes; the builtin ground backend evaluates it directly.
//! Mixed-sort arithmetic never appears here: the compiler inserts explicit
//! [`SmtExpr::ToReal`] casts at every Int→Real promotion point.

use verdict_ontology::{CmpOp, Sort};

/// A quantifier-free SMT expression.
///
/// `And`, `Or`, `Add`, and `Mul` are n-ary (n ≥ 1); everything else is
/// fixed-arity. `Min`/`Max` have no SMT-LIB primitive and render as `ite`.
#[derive(Debug, Clone, PartialEq)]
pub enum SmtExpr {
    Bool(bool),
    Int(i64),
    Real(f64),
    Var(String, Sort),
    Not(Box<SmtExpr>),
    And(Vec<SmtExpr>),
    Or(Vec<SmtExpr>),
    Implies(Box<SmtExpr>, Box<SmtExpr>),
    Cmp(CmpOp, Box<SmtExpr>, Box<SmtExpr>),
    Add(Vec<SmtExpr>),
    Sub(Box<SmtExpr>, Box<SmtExpr>),
    Mul(Vec<SmtExpr>),
    Div(Box<SmtExpr>, Box<SmtExpr>),
    Min(Box<SmtExpr>, Box<SmtExpr>),
    Max(Box<SmtExpr>, Box<SmtExpr>),
    Ite(Box<SmtExpr>, Box<SmtExpr>, Box<SmtExpr>),
    ToReal(Box<SmtExpr>),
}

impl SmtExpr {
    /// The sort this expression evaluates to.
    pub fn sort(&self) -> Sort {
        match self {
            SmtExpr::Bool(_)
            | SmtExpr::Not(_)
            | SmtExpr::And(_)
            | SmtExpr::Or(_)
            | SmtExpr::Implies(_, _)
            | SmtExpr::Cmp(_, _, _) => Sort::Bool,
            SmtExpr::Int(_) => Sort::Int,
            SmtExpr::Real(_) | SmtExpr::ToReal(_) => Sort::Real,
            SmtExpr::Var(_, sort) => *sort,
            SmtExpr::Add(items) | SmtExpr::Mul(items) => items
                .iter()
                .fold(Sort::Int, |acc, e| acc.promote(e.sort())),
            SmtExpr::Sub(a, b)
            | SmtExpr::Div(a, b)
            | SmtExpr::Min(a, b)
            | SmtExpr::Max(a, b) => a.sort().promote(b.sort()),
            SmtExpr::Ite(_, then, _) => then.sort(),
        }
    }

    /// Free variables with their sorts, first-occurrence order.
    pub fn free_vars(&self) -> Vec<(String, Sort)> {
        let mut out = Vec::new();
        self.collect_vars(&mut out);
        out
    }

    fn collect_vars(&self, out: &mut Vec<(String, Sort)>) {
        match self {
            SmtExpr::Var(name, sort) => {
                if !out.iter().any(|(n, _)| n == name) {
                    out.push((name.clone(), *sort));
                }
            }
            SmtExpr::Bool(_) | SmtExpr::Int(_) | SmtExpr::Real(_) => {}
            SmtExpr::Not(a) | SmtExpr::ToReal(a) => a.collect_vars(out),
            SmtExpr::And(items) | SmtExpr::Or(items) | SmtExpr::Add(items) | SmtExpr::Mul(items) => {
                for item in items {
                    item.collect_vars(out);
                }
            }
            SmtExpr::Implies(a, b)
            | SmtExpr::Cmp(_, a, b)
            | SmtExpr::Sub(a, b)
            | SmtExpr::Div(a, b)
            | SmtExpr::Min(a, b)
            | SmtExpr::Max(a, b) => {
                a.collect_vars(out);
                b.collect_vars(out);
            }
            SmtExpr::Ite(c, t, e) => {
                c.collect_vars(out);
                t.collect_vars(out);
                e.collect_vars(out);
            }
        }
    }

    /// Render as an SMT-LIB2 term.
    pub fn to_smtlib2(&self) -> String {
        match self {
            SmtExpr::Bool(b) => b.to_string(),
            SmtExpr::Int(i) => {
                if *i < 0 {
                    format!("(- {})", i.unsigned_abs())
                } else {
                    i.to_string()
                }
            }
            SmtExpr::Real(r) => render_real(*r),
            SmtExpr::Var(name, _) => name.clone(),
            SmtExpr::Not(a) => format!("(not {})", a.to_smtlib2()),
            SmtExpr::And(items) => render_nary("and", items, "true"),
            SmtExpr::Or(items) => render_nary("or", items, "false"),
            SmtExpr::Implies(a, b) => format!("(=> {} {})", a.to_smtlib2(), b.to_smtlib2()),
            SmtExpr::Cmp(op, a, b) => {
                let (a, b) = (a.to_smtlib2(), b.to_smtlib2());
                match op {
                    CmpOp::Eq => format!("(= {} {})", a, b),
                    CmpOp::Ne => format!("(not (= {} {}))", a, b),
                    CmpOp::Lt => format!("(< {} {})", a, b),
                    CmpOp::Le => format!("(<= {} {})", a, b),
                    CmpOp::Gt => format!("(> {} {})", a, b),
                    CmpOp::Ge => format!("(>= {} {})", a, b),
                }
            }
            SmtExpr::Add(items) => render_nary("+", items, "0"),
            SmtExpr::Mul(items) => render_nary("*", items, "1"),
            SmtExpr::Sub(a, b) => format!("(- {} {})", a.to_smtlib2(), b.to_smtlib2()),
            SmtExpr::Div(a, b) => {
                let op = if self.sort() == Sort::Int { "div" } else { "/" };
                format!("({} {} {})", op, a.to_smtlib2(), b.to_smtlib2())
            }
            SmtExpr::Min(a, b) => {
                let (a, b) = (a.to_smtlib2(), b.to_smtlib2());
                format!("(ite (<= {a} {b}) {a} {b})")
            }
            SmtExpr::Max(a, b) => {
                let (a, b) = (a.to_smtlib2(), b.to_smtlib2());
                format!("(ite (>= {a} {b}) {a} {b})")
            }
            SmtExpr::Ite(c, t, e) => format!(
                "(ite {} {} {})",
                c.to_smtlib2(),
                t.to_smtlib2(),
                e.to_smtlib2()
            ),
            SmtExpr::ToReal(a) => format!("(to_real {})", a.to_smtlib2()),
        }
    }
}

fn render_nary(op: &str, items: &[SmtExpr], empty: &str) -> String {
    match items {
        [] => empty.to_string(),
        [single] => single.to_smtlib2(),
        many => {
            let inner: Vec<String> = many.iter().map(SmtExpr::to_smtlib2).collect();
            format!("({} {})", op, inner.join(" "))
        }
    }
}

fn render_real(v: f64) -> String {
    if v < 0.0 {
        return format!("(- {})", render_real(-v));
    }
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}.0", v as i64)
    } else {
        // Decimal notation; SMT-LIB2 has no exponent literals.
        format!("{:.10}", v)
            .trim_end_matches('0')
            .trim_end_matches('.')
            .to_string()
    }
}

/// Render a sort as SMT-LIB2.
pub fn sort_name(sort: Sort) -> &'static str {
    match sort {
        Sort::Bool => "Bool",
        Sort::Int => "Int",
        Sort::Real => "Real",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_comparison() {
        let e = SmtExpr::Cmp(
            CmpOp::Le,
            Box::new(SmtExpr::Var("dti".into(), Sort::Real)),
            Box::new(SmtExpr::Real(43.0)),
        );
        assert_eq!(e.to_smtlib2(), "(<= dti 43.0)");
    }

    #[test]
    fn single_element_connectives_collapse() {
        let e = SmtExpr::And(vec![SmtExpr::Var("p".into(), Sort::Bool)]);
        assert_eq!(e.to_smtlib2(), "p");
    }

    #[test]
    fn negative_literals_use_unary_minus() {
        assert_eq!(SmtExpr::Int(-5).to_smtlib2(), "(- 5)");
        assert_eq!(SmtExpr::Real(-0.5).to_smtlib2(), "(- 0.5)");
    }

    #[test]
    fn integer_division_renders_div() {
        let int_div = SmtExpr::Div(
            Box::new(SmtExpr::Var("a".into(), Sort::Int)),
            Box::new(SmtExpr::Int(2)),
        );
        assert_eq!(int_div.to_smtlib2(), "(div a 2)");

        let real_div = SmtExpr::Div(
            Box::new(SmtExpr::Var("x".into(), Sort::Real)),
            Box::new(SmtExpr::Real(2.0)),
        );
        assert_eq!(real_div.to_smtlib2(), "(/ x 2.0)");
    }

    #[test]
    fn min_renders_as_ite() {
        let e = SmtExpr::Min(
            Box::new(SmtExpr::Var("a".into(), Sort::Int)),
            Box::new(SmtExpr::Var("b".into(), Sort::Int)),
        );
        assert_eq!(e.to_smtlib2(), "(ite (<= a b) a b)");
    }

    #[test]
    fn collects_free_vars_once() {
        let e = SmtExpr::And(vec![
            SmtExpr::Cmp(
                CmpOp::Lt,
                Box::new(SmtExpr::Var("a".into(), Sort::Int)),
                Box::new(SmtExpr::Var("b".into(), Sort::Int)),
            ),
            SmtExpr::Cmp(
                CmpOp::Gt,
                Box::new(SmtExpr::Var("a".into(), Sort::Int)),
                Box::new(SmtExpr::Int(0)),
            ),
        ]);
        assert_eq!(
            e.free_vars(),
            vec![("a".to_string(), Sort::Int), ("b".to_string(), Sort::Int)]
        );
    }

    #[test]
    fn mixed_sorts_promote() {
        let e = SmtExpr::Add(vec![
            SmtExpr::Var("n".into(), Sort::Int),
            SmtExpr::ToReal(Box::new(SmtExpr::Int(1))),
        ]);
        assert_eq!(e.sort(), Sort::Real);
    }
}
