//! Direct evaluation of a formula over a view, without a CCT.  This
//! is the ground truth the incremental techniques are held to: it
//! implements the same truth and link rules as the CCT, but
//! recursively and from scratch every time.
use crate::bfunc::{self, BehaviorFunctions};
use crate::context::RuleView;
use crate::link::{bind, cartesian, Binding, LinkSet};
use crate::rule::{Formula, FormulaId, FormulaKind};
use crate::Error;

/// Returns the truth of `formula` over `view`, and the link set of
/// its root.
///
/// # Errors
///
/// Returns `Err` when a behavior function fails.
pub fn evaluate(
    formula: &Formula,
    view: &RuleView,
    functions: &dyn BehaviorFunctions,
) -> Result<(bool, LinkSet), Error> {
    Evaluator {
        formula,
        view,
        functions,
        env: Vec::new(),
    }
    .eval(formula.root())
}

struct Evaluator<'a> {
    formula: &'a Formula,
    view: &'a RuleView,
    functions: &'a dyn BehaviorFunctions,
    env: Vec<Binding>,
}

impl Evaluator<'_> {
    fn eval(&mut self, id: FormulaId) -> Result<(bool, LinkSet), Error> {
        let formula = self.formula;
        match formula.kind(id) {
            FormulaKind::Forall { var, pattern, body } => self.quantify(var, pattern, *body, true),
            FormulaKind::Exists { var, pattern, body } => self.quantify(var, pattern, *body, false),
            FormulaKind::And(lhs, rhs) => {
                let (l, r) = (self.eval(*lhs)?, self.eval(*rhs)?);
                Ok(match (l.0, r.0) {
                    (true, true) => (true, cartesian(&l.1, &r.1)),
                    (true, false) => (false, r.1),
                    (false, true) => (false, l.1),
                    (false, false) => (false, union(l.1, r.1)),
                })
            }
            FormulaKind::Or(lhs, rhs) => {
                let (l, r) = (self.eval(*lhs)?, self.eval(*rhs)?);
                Ok(match (l.0, r.0) {
                    (false, false) => (false, cartesian(&l.1, &r.1)),
                    (false, true) => (true, r.1),
                    (true, false) => (true, l.1),
                    (true, true) => (true, union(l.1, r.1)),
                })
            }
            FormulaKind::Implies(lhs, rhs) => {
                let (l, r) = (self.eval(*lhs)?, self.eval(*rhs)?);
                Ok(match (l.0, r.0) {
                    (true, false) => (false, cartesian(&l.1, &r.1)),
                    (true, true) => (true, r.1),
                    (false, false) => (true, l.1),
                    (false, true) => (true, union(l.1, r.1)),
                })
            }
            FormulaKind::Not(body) => {
                let (truth, links) = self.eval(*body)?;
                Ok((!truth, links))
            }
            FormulaKind::Atom { function, params } => Ok((
                bfunc::invoke(self.functions, function, params, &self.env)?,
                LinkSet::new(),
            )),
        }
    }

    fn quantify(
        &mut self,
        var: &str,
        pattern: &str,
        body: FormulaId,
        universal: bool,
    ) -> Result<(bool, LinkSet), Error> {
        let view = self.view;
        let mut branches = Vec::new();
        for context in view.live(pattern) {
            let binding = Binding::new(var, context.clone());
            self.env.push(binding.clone());
            let result = self.eval(body);
            self.env.pop();

            let (truth, links) = result?;
            branches.push((binding, truth, links));
        }

        let truth = if universal {
            branches.iter().all(|(_, t, _)| *t)
        } else {
            branches.iter().any(|(_, t, _)| *t)
        };

        let mut links = LinkSet::new();
        for (binding, branch_truth, branch_links) in &branches {
            if *branch_truth == truth {
                links.extend(bind(binding, branch_links));
            }
        }

        Ok((truth, links))
    }
}

fn union(mut lhs: LinkSet, rhs: LinkSet) -> LinkSet {
    lhs.extend(rhs);
    lhs
}

#[test]
fn test_reference_matches_scenario() {
    use crate::bfunc::FunctionTable;
    use crate::context::{Context, ContextPool, Pattern};
    use crate::rule::{FormulaBuilder, Rule};

    let mut f = FormulaBuilder::new();
    let pa = f.atom("a_pos", &["a"]);
    let pb = f.atom("b_small", &["b"]);
    let both = f.and(pa, pb);
    let rule = Rule::new("R1", f, both, [("a", "A"), ("b", "B")]).expect("ok");

    let mut pool = ContextPool::new();
    for p in ["A", "B"].iter() {
        pool.init_pattern_sets(Pattern::new(p, ["x", "y"]))
            .expect("ok");
    }
    pool.init_rule(&rule);

    let functions = FunctionTable::new()
        .with_fields("a_pos", &["x"], |v| v[0].parse::<i64>().map_or(false, |x| x > 0))
        .with_fields("b_small", &["y"], |v| v[0].parse::<i64>().map_or(false, |y| y < 5));

    let eval = |pool: &ContextPool| {
        evaluate(rule.formula(), pool.view("R1").expect("ok"), &functions).expect("ok")
    };

    // Vacuously false with nothing live.
    assert_eq!(eval(&pool), (false, LinkSet::new()));

    pool.seed("A", Context::new("ctx1", [("x", "1")])).expect("ok");
    pool.seed("B", Context::new("ctx2", [("y", "3")])).expect("ok");
    let (truth, links) = eval(&pool);
    assert!(truth);
    assert_eq!(links.len(), 1);

    // An extra failing binding neither flips the truth nor adds a
    // satisfied link.
    pool.seed("A", Context::new("ctx3", [("x", "-1")])).expect("ok");
    assert_eq!(eval(&pool), (truth, links));
}
