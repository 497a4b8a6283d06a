//! Argument bindings of the explored function.
//!
//! An [`Invocation`] names the target and binds every declared parameter
//! either to a fixed concrete value or to a fresh symbolic handle. Only the
//! symbolic parameters make up the [`Inputs`] that exploration varies.

use std::fmt;
use std::ops::Index;

use crate::config::ConfigError;
use crate::expr::Bindings;
use crate::solver::Model;
use crate::sym::Sym;
use crate::value::Value;

/// Concrete values of the symbolic parameters for one run, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inputs {
    values: Vec<(String, Value)>,
}

impl Inputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Sets `name` to `value`, appending it if not present.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        match self.values.iter_mut().find(|(n, _)| *n == name) {
            Some((_, v)) => *v = value,
            None => self.values.push((name, value)),
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value.into());
        self
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(n, v)| (n.as_str(), v))
    }
}

impl Bindings for Inputs {
    fn value_of(&self, name: &str) -> Option<&Value> {
        self.get(name)
    }
}

impl fmt::Display for Inputs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, (name, value)) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", name, value)?;
        }
        write!(f, ")")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    Concrete(Value),
    /// Symbolic handle seeded with the given value.
    Symbolic(Value),
}

/// Bound parameters of the explored function.
#[derive(Debug, Clone)]
pub struct Invocation {
    name: String,
    params: Vec<(String, Binding)>,
}

impl Invocation {
    /// Starts binding the parameters of function `name`.
    pub fn builder<S: Into<String>>(name: impl Into<String>, params: impl IntoIterator<Item = S>) -> InvocationBuilder {
        InvocationBuilder {
            name: name.into(),
            params: params.into_iter().map(Into::into).collect(),
            concrete: Vec::new(),
            symbolic: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[(String, Binding)] {
        &self.params
    }

    pub fn symbolic_names(&self) -> impl Iterator<Item = &str> {
        self.params.iter().filter_map(|(n, b)| match b {
            Binding::Symbolic(_) => Some(n.as_str()),
            Binding::Concrete(_) => None,
        })
    }

    /// Seed values of the symbolic parameters.
    pub fn initial_inputs(&self) -> Inputs {
        let mut inputs = Inputs::new();
        for (name, binding) in &self.params {
            if let Binding::Symbolic(seed) = binding {
                inputs.set(name.clone(), seed.clone());
            }
        }
        inputs
    }

    /// Builds the arguments of one run: symbolic parameters take their value from `inputs`.
    pub fn arguments(&self, inputs: &Inputs) -> Arguments {
        let values = self
            .params
            .iter()
            .map(|(name, binding)| {
                let arg = match binding {
                    Binding::Concrete(v) => Sym::concrete(v.clone()),
                    Binding::Symbolic(seed) => {
                        let value = inputs.get(name).unwrap_or(seed).clone();
                        // Sorts were checked when the invocation was built.
                        Sym::symbolic(name.clone(), value).unwrap_or_else(|| Sym::concrete(seed.clone()))
                    }
                };
                (name.clone(), arg)
            })
            .collect();
        Arguments { values }
    }

    /// Overlays a solver model on `base`.
    ///
    /// Only symbolic parameters are taken from the model, and only when the
    /// model value has the parameter's sort.
    pub fn apply_model(&self, base: &Inputs, model: &Model) -> Inputs {
        let mut inputs = base.clone();
        for (name, binding) in &self.params {
            let Binding::Symbolic(seed) = binding else {
                continue;
            };
            if let Some(value) = model.get(name) {
                if value.sort() == seed.sort() {
                    inputs.set(name.clone(), value.clone());
                }
            }
        }
        inputs
    }
}

pub struct InvocationBuilder {
    name: String,
    params: Vec<String>,
    concrete: Vec<(String, Value)>,
    symbolic: Vec<(String, Value)>,
}

impl InvocationBuilder {
    pub fn concrete(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.concrete.push((name.into(), value.into()));
        self
    }

    pub fn symbolic(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.symbolic.push((name.into(), value.into()));
        self
    }

    /// Validates the bindings.
    ///
    /// Parameters with no binding become symbolic integers seeded at 0.
    pub fn build(self) -> Result<Invocation, ConfigError> {
        for (i, p) in self.params.iter().enumerate() {
            if self.params[..i].contains(p) {
                return Err(ConfigError::DuplicateParameter(p.clone()));
            }
        }

        let all = self.concrete.iter().chain(self.symbolic.iter());
        for (name, _) in all {
            if !self.params.contains(name) {
                return Err(ConfigError::UnknownParameter {
                    function: self.name.clone(),
                    name: name.clone(),
                });
            }
        }
        for bindings in [&self.concrete, &self.symbolic] {
            for (i, (name, _)) in bindings.iter().enumerate() {
                if bindings[..i].iter().any(|(n, _)| n == name) {
                    return Err(ConfigError::DuplicateBinding(name.clone()));
                }
            }
        }
        for (name, _) in &self.concrete {
            if self.symbolic.iter().any(|(n, _)| n == name) {
                return Err(ConfigError::ConflictingBinding(name.clone()));
            }
        }
        for (name, value) in &self.symbolic {
            if value.sort().is_none() {
                return Err(ConfigError::NoSymbolicType {
                    name: name.clone(),
                    type_name: value.type_name(),
                });
            }
        }

        let params = self
            .params
            .into_iter()
            .map(|name| {
                let binding = if let Some((_, v)) = self.concrete.iter().find(|(n, _)| *n == name) {
                    Binding::Concrete(v.clone())
                } else if let Some((_, v)) = self.symbolic.iter().find(|(n, _)| *n == name) {
                    Binding::Symbolic(v.clone())
                } else {
                    Binding::Symbolic(Value::from(0))
                };
                (name, binding)
            })
            .collect();

        Ok(Invocation { name: self.name, params })
    }
}

/// Arguments of one run, in declaration order.
#[derive(Debug, Clone)]
pub struct Arguments {
    values: Vec<(String, Sym)>,
}

impl Arguments {
    pub fn get(&self, name: &str) -> Option<&Sym> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, s)| s)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Sym)> {
        self.values.iter().map(|(n, s)| (n.as_str(), s))
    }
}

impl Index<&str> for Arguments {
    type Output = Sym;

    fn index(&self, name: &str) -> &Sym {
        match self.get(name) {
            Some(s) => s,
            None => panic!("no argument named `{}`", name),
        }
    }
}
