//! The binding environment shared by every task of one generation run.
//!
//! Inline source, libraries and templates are all compiled as MiniJinja units
//! into a single [`Environment`]. After a unit runs, the variables it defined
//! at the top level are folded into the scope's bindings and become context
//! for every later unit. Macros cannot outlive the state that defined them,
//! so each exported macro is re-exposed as a global function that re-enters
//! its defining unit and calls the macro there.

use std::collections::{BTreeMap, HashSet};
use std::fmt::Debug;
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use minijinja::syntax::SyntaxConfig;
use minijinja::value::{Rest, Value, ValueKind};
use minijinja::{AutoEscape, Environment, ErrorKind, State, UndefinedBehavior};
use thiserror::Error;

/// Extension tried when a required library is named without one.
pub const LIBRARY_EXTENSION: &str = "j2";

/// Prefix of code lines when percent lines are enabled.
pub const LINE_STATEMENT_PREFIX: &str = "%";

/// Errors that can occur while loading a library into the scope.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("library {0} not found")]
    NotFound(String),

    #[error("couldn't read library {path}: {source}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("library {path} failed: {source}")]
    Script {
        path: Utf8PathBuf,
        #[source]
        source: minijinja::Error,
    },
}

/// Syntax and limits a unit is compiled and run with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Dialect {
    /// Lines starting with [`LINE_STATEMENT_PREFIX`] are statements.
    pub line_statements: bool,
    /// Drop the first newline after a block tag.
    pub trim_blocks: bool,
    /// Strip whitespace from the start of a line up to a block tag.
    pub lstrip_blocks: bool,
    /// Instruction budget, `None` for unlimited.
    pub fuel: Option<u64>,
}

pub struct ExecutionScope {
    env: Environment<'static>,
    bindings: BTreeMap<String, Value>,
    library_paths: Vec<Utf8PathBuf>,
    loaded: HashSet<Utf8PathBuf>,
    units: usize,
}

impl ExecutionScope {
    /// Creates a fresh scope which looks up libraries in the current directory.
    pub fn new() -> Self {
        Self::with_library_paths(vec![Utf8PathBuf::from(".")])
    }

    pub fn with_library_paths(library_paths: Vec<Utf8PathBuf>) -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_keep_trailing_newline(true);
        env.set_auto_escape_callback(|_| AutoEscape::None);
        env.add_function("read_file", read_file);
        env.add_function("load_json", load_json);
        env.add_function("parse_json", parse_json);

        Self {
            env,
            bindings: BTreeMap::new(),
            library_paths,
            loaded: HashSet::new(),
            units: 0,
        }
    }

    /// Looks up a variable defined by an earlier unit (or set from outside).
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.bindings.insert(name.into(), value.into());
    }

    /// Names of all variables currently bound in the scope.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.bindings.keys().map(String::as_str)
    }

    /// Runs inline source against the scope and returns whatever it printed.
    pub fn evaluate(&mut self, source: &str) -> Result<String, minijinja::Error> {
        self.units += 1;
        let name = format!("<eval {}>", self.units);

        self.run(name, source.to_string(), &Dialect::default())
    }

    /// Loads a library into the scope. Returns `false` when the library was
    /// already loaded during this run, in which case nothing is executed.
    pub fn load_library(&mut self, path: &str) -> Result<bool, LoadError> {
        let resolved = self
            .resolve_library(path)
            .ok_or_else(|| LoadError::NotFound(path.to_string()))?;

        if !self.loaded.insert(resolved.clone()) {
            tracing::debug!(library = %resolved, "library already loaded");
            return Ok(false);
        }

        tracing::debug!(library = %resolved, "loading library");

        let source = fs::read_to_string(&resolved).map_err(|source| LoadError::Io {
            path: resolved.clone(),
            source,
        })?;

        // Library output is discarded, only its definitions matter.
        self.run(resolved.to_string(), source, &Dialect::default())
            .map_err(|source| LoadError::Script {
                path: resolved,
                source,
            })?;

        Ok(true)
    }

    /// Compiles `source` under `dialect` and renders it against the scope.
    pub fn render(
        &mut self,
        name: &str,
        source: &str,
        dialect: &Dialect,
    ) -> Result<String, minijinja::Error> {
        self.units += 1;
        let name = match self.env.get_template(name) {
            Ok(_) => format!("{name}#{}", self.units),
            Err(_) => name.to_string(),
        };

        self.run(name, source.to_string(), dialect)
    }

    fn run(
        &mut self,
        name: String,
        source: String,
        dialect: &Dialect,
    ) -> Result<String, minijinja::Error> {
        self.apply(dialect)?;
        self.env.add_template_owned(name.clone(), source)?;

        let (output, exports) = {
            let template = self.env.get_template(&name)?;
            let captured = template.render_captured(&self.bindings)?;
            let state = captured.state();
            let exports: Vec<(String, Value)> = state
                .exports()
                .into_iter()
                .filter_map(|export| state.lookup(export).map(|value| (export.to_string(), value)))
                .collect();

            (captured.into_output(), exports)
        };

        self.absorb(&name, exports);

        Ok(output)
    }

    fn apply(&mut self, dialect: &Dialect) -> Result<(), minijinja::Error> {
        let syntax = if dialect.line_statements {
            SyntaxConfig::builder()
                .line_statement_prefix(LINE_STATEMENT_PREFIX)
                .build()?
        } else {
            SyntaxConfig::builder().build()?
        };

        self.env.set_syntax(syntax);
        self.env.set_trim_blocks(dialect.trim_blocks);
        self.env.set_lstrip_blocks(dialect.lstrip_blocks);
        self.env.set_fuel(dialect.fuel);

        Ok(())
    }

    fn absorb(&mut self, unit: &str, exports: Vec<(String, Value)>) {
        for (name, value) in exports {
            if value.kind() == ValueKind::Plain {
                // A context variable would shadow the global function.
                self.bindings.remove(&name);
                self.expose_macro(unit, name);
            } else {
                self.bindings.insert(name, value);
            }
        }
    }

    fn expose_macro(&mut self, unit: &str, name: String) {
        let unit = unit.to_string();
        let export = name.clone();
        let bindings = Value::from_serialize(&self.bindings);

        self.env.add_function(
            name,
            move |state: &State, args: Rest<Value>| -> Result<Value, minijinja::Error> {
                let template = state.env().get_template(&unit)?;
                let defining = template.render_captured(&bindings)?;
                let rendered = defining.state().call_macro(&export, &args)?;

                Ok(Value::from_safe_string(rendered))
            },
        );
    }

    fn resolve_library(&self, name: &str) -> Option<Utf8PathBuf> {
        let requested = Utf8Path::new(name);
        let mut candidates = vec![requested.to_path_buf()];

        if requested.extension().is_none() {
            candidates.push(requested.with_extension(LIBRARY_EXTENSION));
        }

        if requested.is_absolute() {
            return candidates.into_iter().find(|path| path.is_file());
        }

        self.library_paths
            .iter()
            .flat_map(|dir| {
                candidates.iter().map(move |candidate| match dir.as_str() {
                    "." | "" => candidate.clone(),
                    _ => dir.join(candidate),
                })
            })
            .find(|path| path.is_file())
    }
}

impl Default for ExecutionScope {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for ExecutionScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionScope")
            .field("bindings", &self.bindings)
            .field("library_paths", &self.library_paths)
            .field("loaded", &self.loaded)
            .field("units", &self.units)
            .finish()
    }
}

fn read_file(path: String) -> Result<String, minijinja::Error> {
    fs::read_to_string(&path).map_err(|err| {
        minijinja::Error::new(ErrorKind::InvalidOperation, format!("cannot read {path}"))
            .with_source(err)
    })
}

fn parse_json(text: String) -> Result<Value, minijinja::Error> {
    let data: serde_json::Value = serde_json::from_str(&text).map_err(|err| {
        minijinja::Error::new(ErrorKind::InvalidOperation, "cannot parse JSON").with_source(err)
    })?;

    Ok(Value::from_serialize(&data))
}

fn load_json(path: String) -> Result<Value, minijinja::Error> {
    parse_json(read_file(path)?)
}
