//! Behavior functions are the rule author's predicates: every ATOM
//! node of a rule names one, and passes it the contexts bound to its
//! parameters.  The engine only ever calls through the
//! `BehaviorFunctions` capability; how an implementation is resolved
//! (a table built in code, a configuration file...) is the caller's
//! business, and happens before any change is checked.
use crate::context::Context;
use crate::link::Binding;
use crate::Error;
use std::collections::BTreeMap;
use std::fmt;

/// Arguments of one behavior function call: the bound contexts in
/// parameter order, along with the variable they are bound to.
#[derive(Clone, Copy, Debug)]
pub struct Arguments<'a> {
    params: &'a [(&'a str, &'a Context)],
}

impl<'a> Arguments<'a> {
    #[must_use]
    pub fn new(params: &'a [(&'a str, &'a Context)]) -> Self {
        Self { params }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.params.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Returns the context passed as the `index`th parameter.
    #[must_use]
    pub fn nth(&self, index: usize) -> Option<&'a Context> {
        self.params.get(index).map(|(_, ctx)| *ctx)
    }

    /// Returns the context bound to `var`, if `var` is a parameter.
    #[must_use]
    pub fn var(&self, var: &str) -> Option<&'a Context> {
        self.params
            .iter()
            .find(|(name, _)| *name == var)
            .map(|(_, ctx)| *ctx)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'a str, &'a Context)> + 'a {
        self.params.iter().copied()
    }
}

/// The named-predicate capability consulted by ATOM nodes.
pub trait BehaviorFunctions {
    /// Returns true iff the capability can evaluate `name`.  Rules are
    /// checked against this at load time.
    fn provides(&self, name: &str) -> bool;

    /// Evaluates `name` on `args`.
    ///
    /// # Errors
    ///
    /// Returns `Err` with a human readable reason when the function
    /// cannot be evaluated on these arguments (e.g., a missing field).
    fn call(&self, name: &str, args: Arguments<'_>) -> Result<bool, String>;

    /// Invoked once after the change stream is exhausted in test runs.
    fn end(&mut self) {}
}

type Predicate = Box<dyn Fn(Arguments<'_>) -> Result<bool, String> + Send + Sync>;

/// A `BehaviorFunctions` implementation backed by closures.
#[derive(Default)]
pub struct FunctionTable {
    functions: BTreeMap<String, Predicate>,
}

impl FunctionTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a fallible predicate under `name`, replacing any
    /// previous definition.
    #[must_use]
    pub fn with<F>(mut self, name: &str, fun: F) -> Self
    where
        F: Fn(Arguments<'_>) -> Result<bool, String> + Send + Sync + 'static,
    {
        self.functions.insert(name.into(), Box::new(fun));
        self
    }

    /// Registers a predicate over the fields of its arguments.  A
    /// missing argument or field makes the call fail.
    #[must_use]
    pub fn with_fields<F>(self, name: &str, fields: &[&str], fun: F) -> Self
    where
        F: Fn(&[&str]) -> bool + Send + Sync + 'static,
    {
        let wanted: Vec<String> = fields.iter().map(|f| (*f).to_owned()).collect();
        self.with(name, move |args| {
            let mut values = Vec::with_capacity(wanted.len());
            for (index, field) in wanted.iter().enumerate() {
                let ctx = args
                    .nth(index)
                    .ok_or_else(|| format!("missing argument {}", index))?;
                let value = ctx
                    .field(field)
                    .ok_or_else(|| format!("context `{}` has no field `{}`", ctx.id(), field))?;
                values.push(value);
            }

            Ok(fun(&values))
        })
    }
}

/// Calls `function` with the contexts `env` binds to `params`.
pub(crate) fn invoke(
    functions: &dyn BehaviorFunctions,
    function: &str,
    params: &[String],
    env: &[Binding],
) -> Result<bool, Error> {
    let failure = |reason: String| Error::Function {
        function: function.into(),
        reason,
    };

    let mut args: Vec<(&str, &Context)> = Vec::with_capacity(params.len());
    for param in params {
        let binding = env
            .iter()
            .rev()
            .find(|b| b.var == *param)
            .ok_or_else(|| failure(format!("variable `{}` is unbound", param)))?;
        args.push((param.as_str(), binding.context.as_ref()));
    }

    functions
        .call(function, Arguments::new(&args))
        .map_err(failure)
}

impl fmt::Debug for FunctionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.functions.keys()).finish()
    }
}

impl BehaviorFunctions for FunctionTable {
    fn provides(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    fn call(&self, name: &str, args: Arguments<'_>) -> Result<bool, String> {
        match self.functions.get(name) {
            Some(fun) => fun(args),
            None => Err("no such function".into()),
        }
    }
}

#[test]
fn test_function_table() {
    let table = FunctionTable::new()
        .with("always", |_| Ok(true))
        .with_fields("positive", &["x"], |v| {
            v[0].parse::<i64>().map_or(false, |x| x > 0)
        });

    let pos = Context::new("c1", [("x", "3")]);
    let neg = Context::new("c2", [("x", "-3")]);
    let blank = Context::new("c3", [("y", "1")]);

    assert!(table.provides("positive"));
    assert!(!table.provides("negative"));

    let call = |ctx: &Context| table.call("positive", Arguments::new(&[("a", ctx)]));
    assert_eq!(call(&pos), Ok(true));
    assert_eq!(call(&neg), Ok(false));
    assert!(call(&blank).is_err());

    assert_eq!(table.call("always", Arguments::new(&[])), Ok(true));
    assert!(table.call("negative", Arguments::new(&[])).is_err());
}

#[test]
fn test_arguments_lookup() {
    let a = Context::new("c1", [("x", "1")]);
    let b = Context::new("c2", [("x", "2")]);
    let params = [("v1", &a), ("v2", &b)];
    let args = Arguments::new(&params);

    assert_eq!(args.len(), 2);
    assert_eq!(args.nth(1).map(Context::id), Some("c2"));
    assert_eq!(args.var("v1").map(Context::id), Some("c1"));
    assert!(args.var("v3").is_none());
}

#[test]
fn test_invoke_binds_params() {
    use std::sync::Arc;

    let table = FunctionTable::new().with_fields("lt", &["x", "x"], |v| v[0] < v[1]);
    let env = [
        Binding::new("a", Arc::new(Context::new("c1", [("x", "1")]))),
        Binding::new("b", Arc::new(Context::new("c2", [("x", "2")]))),
    ];

    let params = |p: &[&str]| p.iter().map(|s| (*s).to_owned()).collect::<Vec<_>>();
    assert_eq!(invoke(&table, "lt", &params(&["a", "b"]), &env), Ok(true));
    assert_eq!(invoke(&table, "lt", &params(&["b", "a"]), &env), Ok(false));
    assert!(matches!(
        invoke(&table, "lt", &params(&["a", "z"]), &env),
        Err(Error::Function { .. })
    ));
}
