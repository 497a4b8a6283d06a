//! Target modules written in a small brace-syntax language.
//!
//! A module declares functions and binds the parameters of its entry point,
//! the function named after the file stem:
//!
//! ```text
//! // classify.cl
//! symbolic x = 0;
//! concrete limit = 10;
//!
//! fn classify(x, limit) {
//!     if x > limit {
//!         return "big";
//!     }
//!     return "small";
//! }
//! ```
//!
//! Parameters without a declaration are symbolic integers seeded at 0.
//! Branch labels and fault locations have the form `path:line`.

pub mod ast;
pub mod interp;
pub mod lexer;
pub mod parser;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::debug;
use thiserror::Error;

use crate::binding::{Arguments, Invocation};
use crate::config::ConfigError;
use crate::runner::{RunContext, RunOutcome, TargetRunner};

use self::ast::{DeclKind, Module};
use self::interp::Interpreter;
pub use self::parser::{parse_literal, parse_module};

/// Default number of statements and loop iterations a run may execute.
pub const DEFAULT_STEP_LIMIT: usize = 100_000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {message}")]
pub struct SyntaxError {
    pub line: usize,
    pub message: String,
}

impl SyntaxError {
    pub fn new(line: usize, message: impl Into<String>) -> Self {
        SyntaxError {
            line,
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read `{}`: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{path}: {error}")]
    Syntax {
        path: String,
        #[source]
        error: SyntaxError,
    },
    #[error("invalid module name `{}`", .0.display())]
    BadName(PathBuf),
    #[error("{path}: no entry function `{name}`")]
    MissingEntry { path: String, name: String },
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// A parsed module, runnable as a [`TargetRunner`].
#[derive(Debug, Clone)]
pub struct ScriptTarget {
    name: String,
    label: String,
    module: Module,
    invocation: Invocation,
    step_limit: usize,
}

impl ScriptTarget {
    /// Parses `src` and binds the parameters of function `name`.
    ///
    /// `label` prefixes branch labels and fault locations.
    pub fn from_source(name: &str, label: impl Into<String>, src: &str) -> Result<Self, LoadError> {
        let label = label.into();
        let module = parse_module(src).map_err(|error| LoadError::Syntax {
            path: label.clone(),
            error,
        })?;
        let Some(entry) = module.function(name) else {
            return Err(LoadError::MissingEntry {
                path: label,
                name: name.to_string(),
            });
        };

        let mut builder = Invocation::builder(name, entry.params.iter().cloned());
        for decl in &module.declarations {
            builder = match decl.kind {
                DeclKind::Concrete => builder.concrete(decl.name.clone(), decl.value.clone()),
                DeclKind::Symbolic => builder.symbolic(decl.name.clone(), decl.value.clone()),
            };
        }
        let invocation = builder.build()?;
        debug!("loaded `{}` from {}: {} function(s)", name, label, module.functions.len());

        Ok(ScriptTarget {
            name: name.to_string(),
            label,
            module,
            invocation,
            step_limit: DEFAULT_STEP_LIMIT,
        })
    }

    pub fn with_step_limit(mut self, step_limit: usize) -> Self {
        self.step_limit = step_limit;
        self
    }

    pub fn invocation(&self) -> &Invocation {
        &self.invocation
    }

    pub fn module(&self) -> &Module {
        &self.module
    }
}

impl TargetRunner for ScriptTarget {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, args: &Arguments, ctx: &mut RunContext<'_>) -> RunOutcome {
        let mut interp = Interpreter::new(&self.module, &self.label, ctx, self.step_limit);
        let result = interp.run(&self.name, args);
        debug!("`{}` ran {} step(s)", self.name, interp.steps());
        result.into()
    }
}

/// Reads the module at `path`. The entry point is named after the file stem.
pub fn load_module(path: impl AsRef<Path>) -> Result<ScriptTarget, LoadError> {
    let path = path.as_ref();
    let src = fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| LoadError::BadName(path.to_path_buf()))?;
    ScriptTarget::from_source(name, path.display().to_string(), &src)
}
