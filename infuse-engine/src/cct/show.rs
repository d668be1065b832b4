use super::{Cct, NodeId};
use crate::rule::Formula;
use std::fmt::Write;

impl Cct {
    /// Renders the tree, two spaces of indentation per level, one node
    /// per line: `[var=ctx] <label> = <truth>`.  When `substantial_only`
    /// is set, subtrees rooted at non-substantial nodes are skipped.
    #[must_use]
    pub fn show(&self, formula: &Formula, substantial_only: bool) -> String {
        let mut ret = String::new();
        let mut stack: Vec<(NodeId, usize)> = vec![(self.root, 0)];

        while let Some((id, level)) = stack.pop() {
            let node = self.node(id);
            if substantial_only && !node.substantial {
                continue;
            }

            let _ = write!(ret, "{:indent$}", "", indent = 2 * level);
            if let Some(binding) = &node.binding {
                let _ = write!(ret, "[{}={}] ", binding.var, binding.context.id());
            }
            let _ = writeln!(ret, "{} = {}", formula.kind(node.formula), node.truth);

            for child in node.children.iter().rev() {
                stack.push((*child, level + 1));
            }
        }

        ret
    }
}

#[test]
fn test_show() {
    use crate::bfunc::FunctionTable;
    use crate::context::{Context, ContextPool, Pattern};
    use crate::rule::{FormulaBuilder, Rule};

    let mut f = FormulaBuilder::new();
    let pos = f.atom("pos", &["a"]);
    let root = f.forall("a", "A", pos);
    let rule = Rule::new::<_, &str, &str>("r", f, root, []).expect("ok");

    let mut pool = ContextPool::new();
    pool.init_pattern_sets(Pattern::new::<_, &str>("A", []))
        .expect("ok");
    pool.init_rule(&rule);
    pool.seed("A", Context::new("c1", [("x", "1")])).expect("ok");
    pool.seed("A", Context::new("c2", [("x", "0")])).expect("ok");

    let functions = FunctionTable::new().with_fields("pos", &["x"], |v| v[0] == "1");
    let mut cct = Cct::build(rule.formula(), pool.view("r").expect("ok"), &functions).expect("ok");

    assert_eq!(
        cct.show(rule.formula(), false),
        "forall a in A = false\n  [a=c1] bfunc pos(a) = true\n  [a=c2] bfunc pos(a) = false\n"
    );

    cct.taint(rule.formula());
    assert_eq!(
        cct.show(rule.formula(), true),
        "forall a in A = false\n  [a=c2] bfunc pos(a) = false\n"
    );
}
