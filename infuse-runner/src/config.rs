//! Rule sets are JSON documents listing patterns, declared behavior
//! functions and rules:
//!
//! ```json
//! {
//!   "patterns": [{ "id": "A", "fields": ["x"] }],
//!   "functions": [
//!     { "name": "a_pos", "op": "gt", "lhs": { "param": 0, "field": "x" }, "rhs": { "value": 0 } }
//!   ],
//!   "rules": [
//!     { "id": "R1", "vars": { "a": "A" }, "formula": { "atom": { "function": "a_pos", "params": ["a"] } } }
//!   ]
//! }
//! ```
//!
//! Formulas nest as `{"forall": {"var", "pattern", "body"}}`,
//! `{"exists": ...}`, `{"and": [lhs, rhs]}`, `{"or": ...}`,
//! `{"implies": ...}`, `{"not": body}` and `{"atom": {"function",
//! "params"}}`.
use infuse_engine::{
    Approach, Arguments, BehaviorFunctions, Engine, FormulaBuilder, FormulaId, Pattern, Rule,
    RuleHandler,
};
use serde::Deserialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("duplicate function `{0}`")]
    DuplicateFunction(String),
    #[error(transparent)]
    Engine(#[from] infuse_engine::Error),
}

#[derive(Clone, Debug, Deserialize)]
pub struct RuleSet {
    #[serde(default)]
    pub patterns: Vec<PatternSpec>,
    #[serde(default)]
    pub functions: Vec<FunctionSpec>,
    #[serde(default)]
    pub rules: Vec<RuleSpec>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct PatternSpec {
    pub id: String,
    /// Declared fields; empty admits any field.
    #[serde(default)]
    pub fields: Vec<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct RuleSpec {
    pub id: String,
    /// Patterns of the free variables.
    #[serde(default)]
    pub vars: BTreeMap<String, String>,
    pub formula: FormulaSpec,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormulaSpec {
    Forall {
        var: String,
        pattern: String,
        body: Box<FormulaSpec>,
    },
    Exists {
        var: String,
        pattern: String,
        body: Box<FormulaSpec>,
    },
    And(Box<FormulaSpec>, Box<FormulaSpec>),
    Or(Box<FormulaSpec>, Box<FormulaSpec>),
    Implies(Box<FormulaSpec>, Box<FormulaSpec>),
    Not(Box<FormulaSpec>),
    Atom {
        function: String,
        #[serde(default)]
        params: Vec<String>,
    },
}

impl FormulaSpec {
    fn build(&self, f: &mut FormulaBuilder) -> FormulaId {
        match self {
            FormulaSpec::Forall { var, pattern, body } => {
                let body = body.build(f);
                f.forall(var, pattern, body)
            }
            FormulaSpec::Exists { var, pattern, body } => {
                let body = body.build(f);
                f.exists(var, pattern, body)
            }
            FormulaSpec::And(lhs, rhs) => {
                let (lhs, rhs) = (lhs.build(f), rhs.build(f));
                f.and(lhs, rhs)
            }
            FormulaSpec::Or(lhs, rhs) => {
                let (lhs, rhs) = (lhs.build(f), rhs.build(f));
                f.or(lhs, rhs)
            }
            FormulaSpec::Implies(lhs, rhs) => {
                let (lhs, rhs) = (lhs.build(f), rhs.build(f));
                f.implies(lhs, rhs)
            }
            FormulaSpec::Not(body) => {
                let body = body.build(f);
                f.not(body)
            }
            FormulaSpec::Atom { function, params } => {
                let params: Vec<&str> = params.iter().map(String::as_str).collect();
                f.atom(function, &params)
            }
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Op {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Op {
    fn holds(self, ordering: Ordering) -> bool {
        match self {
            Op::Eq => ordering == Ordering::Equal,
            Op::Ne => ordering != Ordering::Equal,
            Op::Lt => ordering == Ordering::Less,
            Op::Le => ordering != Ordering::Greater,
            Op::Gt => ordering == Ordering::Greater,
            Op::Ge => ordering != Ordering::Less,
        }
    }
}

/// One side of a declared comparison.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum Operand {
    /// A field of the context passed as the `param`th argument.
    Field { param: usize, field: String },
    Value { value: serde_json::Value },
}

impl Operand {
    fn resolve(&self, args: &Arguments<'_>) -> Result<String, String> {
        match self {
            Operand::Field { param, field } => {
                let ctx = args
                    .nth(*param)
                    .ok_or_else(|| format!("missing argument {}", param))?;
                ctx.field(field)
                    .map(str::to_owned)
                    .ok_or_else(|| format!("context `{}` has no field `{}`", ctx.id(), field))
            }
            Operand::Value { value } => Ok(scalar(value)),
        }
    }
}

/// Renders a JSON scalar the way context fields are stored.
pub fn scalar(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct FunctionSpec {
    pub name: String,
    pub op: Op,
    pub lhs: Operand,
    pub rhs: Operand,
}

/// Compares numerically when both sides parse as numbers, as strings
/// otherwise.
fn compare(lhs: &str, rhs: &str) -> Ordering {
    match (lhs.parse::<f64>(), rhs.parse::<f64>()) {
        (Ok(l), Ok(r)) => l.partial_cmp(&r).unwrap_or(Ordering::Equal),
        _ => lhs.cmp(rhs),
    }
}

/// `BehaviorFunctions` backed by the comparisons a rule set declares.
#[derive(Debug, Default)]
pub struct DeclaredFunctions {
    functions: BTreeMap<String, FunctionSpec>,
    calls: AtomicU64,
}

impl DeclaredFunctions {
    /// # Errors
    ///
    /// Returns `Err` if two declarations share a name.
    pub fn new<I: IntoIterator<Item = FunctionSpec>>(specs: I) -> Result<Self, ConfigError> {
        let mut functions = BTreeMap::new();
        for spec in specs {
            if functions.contains_key(&spec.name) {
                return Err(ConfigError::DuplicateFunction(spec.name));
            }
            functions.insert(spec.name.clone(), spec);
        }

        Ok(Self {
            functions,
            calls: AtomicU64::new(0),
        })
    }

    #[must_use]
    pub fn calls(&self) -> u64 {
        self.calls.load(AtomicOrdering::Relaxed)
    }
}

impl BehaviorFunctions for DeclaredFunctions {
    fn provides(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    fn call(&self, name: &str, args: Arguments<'_>) -> Result<bool, String> {
        let spec = self
            .functions
            .get(name)
            .ok_or_else(|| format!("unknown function `{}`", name))?;
        self.calls.fetch_add(1, AtomicOrdering::Relaxed);

        let lhs = spec.lhs.resolve(&args)?;
        let rhs = spec.rhs.resolve(&args)?;
        Ok(spec.op.holds(compare(&lhs, &rhs)))
    }

    fn end(&mut self) {
        info!(calls = self.calls(), "behavior functions done");
    }
}

impl RuleSet {
    /// # Errors
    ///
    /// Returns `Err` if the file cannot be read or is not a rule set.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// # Errors
    ///
    /// Returns `Err` if `text` is not a rule set.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Builds the rules, checking each one's formula.
    ///
    /// # Errors
    ///
    /// Returns the first malformed rule's error.
    pub fn rules(&self) -> Result<RuleHandler, ConfigError> {
        let mut ret = RuleHandler::new();
        for spec in &self.rules {
            let mut f = FormulaBuilder::new();
            let root = spec.formula.build(&mut f);
            ret.add_rule(Rule::new(&spec.id, f, root, spec.vars.clone())?)?;
        }

        Ok(ret)
    }

    #[must_use]
    pub fn patterns(&self) -> Vec<Pattern> {
        self.patterns
            .iter()
            .map(|p| Pattern::new(&p.id, p.fields.iter().cloned()))
            .collect()
    }

    /// Sets up an engine running `approach` over this rule set.
    ///
    /// # Errors
    ///
    /// Returns the first setup error.
    pub fn engine(&self, approach: Approach, mg: bool) -> Result<Engine, ConfigError> {
        let functions = DeclaredFunctions::new(self.functions.iter().cloned())?;
        let engine = Engine::new(
            approach,
            self.patterns(),
            self.rules()?,
            Box::new(functions),
            mg,
        )?;

        info!(
            %approach,
            patterns = self.patterns.len(),
            rules = self.rules.len(),
            "rule set loaded"
        );
        Ok(engine)
    }
}

#[cfg(test)]
pub(crate) const R1: &str = r#"{
  "patterns": [{ "id": "A", "fields": ["x"] }, { "id": "B", "fields": ["y"] }],
  "functions": [
    { "name": "a_pos", "op": "gt", "lhs": { "param": 0, "field": "x" }, "rhs": { "value": 0 } },
    { "name": "b_small", "op": "lt", "lhs": { "param": 0, "field": "y" }, "rhs": { "value": "5" } }
  ],
  "rules": [
    {
      "id": "R1",
      "vars": { "a": "A", "b": "B" },
      "formula": {
        "and": [
          { "atom": { "function": "a_pos", "params": ["a"] } },
          { "atom": { "function": "b_small", "params": ["b"] } }
        ]
      }
    },
    {
      "id": "all_a",
      "formula": {
        "forall": { "var": "a", "pattern": "A", "body": { "atom": { "function": "a_pos", "params": ["a"] } } }
      }
    }
  ]
}"#;

#[test]
fn test_parse_rule_set() {
    let set = RuleSet::parse(R1).expect("ok");
    assert_eq!(set.patterns.len(), 2);

    let rules = set.rules().expect("ok");
    assert_eq!(rules.ids().collect::<Vec<_>>(), vec!["R1", "all_a"]);
    let formula = rules.get("all_a").expect("ok").formula();
    assert_eq!(formula.kind(formula.root()).to_string(), "forall a in A");

    set.engine(Approach::INFUSE, false).expect("ok");
}

#[test]
fn test_setup_errors() {
    let unknown_function = R1.replace("\"b_small\", \"params\"", "\"b_huge\", \"params\"");
    assert!(matches!(
        RuleSet::parse(&unknown_function)
            .expect("ok")
            .engine(Approach::INFUSE, false),
        Err(ConfigError::Engine(
            infuse_engine::Error::UnresolvedFunction { .. }
        ))
    ));

    let unbound = R1.replace("\"vars\": { \"a\": \"A\", \"b\": \"B\" },", "");
    assert!(matches!(
        RuleSet::parse(&unbound).expect("ok").rules(),
        Err(ConfigError::Engine(infuse_engine::Error::UnboundVariable { .. }))
    ));

    assert!(matches!(
        RuleSet::parse("{\"rules\": [{\"id\": \"r\", \"formula\": {\"xor\": []}}]}"),
        Err(ConfigError::Serde(_))
    ));
}

#[test]
fn test_declared_comparisons() {
    use infuse_engine::Context;

    let functions = DeclaredFunctions::new(vec![FunctionSpec {
        name: "same_room".into(),
        op: Op::Eq,
        lhs: Operand::Field {
            param: 0,
            field: "room".into(),
        },
        rhs: Operand::Field {
            param: 1,
            field: "room".into(),
        },
    }])
    .expect("ok");

    let a = Context::new("a", [("room", "1.0")]);
    let b = Context::new("b", [("room", "1")]);
    let c = Context::new("c", [("room", "hall")]);
    let call = |x: &Context, y: &Context| {
        let params = [("p", x), ("q", y)];
        functions.call("same_room", Arguments::new(&params))
    };

    assert_eq!(call(&a, &b), Ok(true));
    assert_eq!(call(&a, &c), Ok(false));
    assert_eq!(call(&c, &c), Ok(true));
    assert_eq!(functions.calls(), 3);

    let params = [("p", &a)];
    assert!(functions
        .call("same_room", Arguments::new(&params))
        .is_err());
}

#[test]
fn test_ops() {
    assert!(Op::Le.holds(Ordering::Equal));
    assert!(Op::Ge.holds(Ordering::Greater));
    assert!(!Op::Lt.holds(Ordering::Equal));
    assert!(Op::Ne.holds(Ordering::Less));
    assert_eq!(compare("10", "9"), Ordering::Greater);
    assert_eq!(compare("10", "9a"), Ordering::Less);
}
