//! Variable registry and formula declarations.
//!
//! A [`Graph`] is the immutable description of a system of equations: which
//! variables exist, what type each holds, whether the caller may fix it, and
//! the ordered list of formulas that can derive it. Graphs are built once with
//! a [`GraphBuilder`] and shared between [`Solver`](super::Solver) instances
//! through an `Arc`.
//!
//! # Example
//!
//! ```rust
//! use raster_scan::solver::{Flags, Graph, Kind, Value};
//!
//! let mut builder = Graph::builder();
//! builder.variable("a", Kind::Float, Flags::FIXED);
//! builder
//!     .variable("b", Kind::Float, Flags::COMPUTED | Flags::READONLY)
//!     .formula(&["a"], |s| Ok(Value::Float(2.0 * s.float("a")?)));
//! let graph = builder.build().unwrap();
//! assert_eq!(graph.len(), 2);
//! ```

use super::error::{SolveError, SolveResult};
use super::value::{Kind, Value};
use super::Scope;
use bitflags::bitflags;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

bitflags! {
    /// Role of a variable within the graph.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Flags: u8 {
        /// The caller may assign a value directly.
        const FIXED = 0b001;
        /// The value may be produced by formulas.
        const COMPUTED = 0b010;
        /// Exposed as an output only.
        const READONLY = 0b100;
    }
}

/// Signature of a derivation formula.
pub type FormulaFn = dyn Fn(&mut Scope<'_>) -> SolveResult<Value> + Send + Sync;

/// One way of deriving a variable from others.
#[derive(Clone)]
pub struct Formula {
    reads: Vec<String>,
    func: Arc<FormulaFn>,
}

impl Formula {
    /// Variables this formula is declared to read.
    pub fn reads(&self) -> &[String] {
        &self.reads
    }

    pub(crate) fn call(&self, scope: &mut Scope<'_>) -> SolveResult<Value> {
        (self.func)(scope)
    }
}

impl std::fmt::Debug for Formula {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Formula").field("reads", &self.reads).finish()
    }
}

/// A named variable and its derivations.
#[derive(Debug, Clone)]
pub struct Variable {
    name: String,
    kind: Kind,
    flags: Flags,
    formulas: Vec<Formula>,
}

impl Variable {
    /// Unique variable name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Semantic type
    pub fn kind(&self) -> Kind {
        self.kind
    }

    /// Role flags
    pub fn flags(&self) -> Flags {
        self.flags
    }

    /// Formulas in the order they are tried
    pub fn formulas(&self) -> &[Formula] {
        &self.formulas
    }

    /// Whether the caller may assign this variable.
    pub fn is_settable(&self) -> bool {
        self.flags.contains(Flags::FIXED)
    }
}

/// Immutable set of variables and formulas.
#[derive(Debug, Clone)]
pub struct Graph {
    variables: Vec<Variable>,
    index: HashMap<String, usize>,
}

impl Graph {
    /// Starts a new graph definition.
    pub fn builder() -> GraphBuilder {
        GraphBuilder::default()
    }

    /// Looks up a variable by name.
    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.index.get(name).map(|&i| &self.variables[i])
    }

    /// Variables in registration order.
    pub fn variables(&self) -> impl Iterator<Item = &Variable> {
        self.variables.iter()
    }

    /// Number of registered variables.
    pub fn len(&self) -> usize {
        self.variables.len()
    }

    /// True when no variables are registered.
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Every variable that any formula of `name` is declared to read.
    pub fn declared_dependencies(&self, name: &str) -> Vec<&str> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        if let Some(var) = self.variable(name) {
            for dep in var.formulas.iter().flat_map(|f| f.reads.iter()) {
                if seen.insert(dep.as_str()) {
                    out.push(dep.as_str());
                }
            }
        }
        out
    }

    /// Finds a path of declared dependencies from `from` to any of `targets`.
    fn find_path(&self, from: &str, targets: &HashSet<&str>) -> Option<Vec<String>> {
        let mut visited = HashSet::new();
        let mut path = vec![from.to_string()];
        if self.walk(from, targets, &mut visited, &mut path) {
            Some(path)
        } else {
            None
        }
    }

    fn walk<'a>(
        &'a self,
        node: &'a str,
        targets: &HashSet<&str>,
        visited: &mut HashSet<&'a str>,
        path: &mut Vec<String>,
    ) -> bool {
        if !visited.insert(node) {
            return false;
        }
        for dep in self.declared_dependencies(node) {
            path.push(dep.to_string());
            if targets.contains(dep) || self.walk(dep, targets, visited, path) {
                return true;
            }
            path.pop();
        }
        false
    }
}

/// Incremental [`Graph`] construction.
#[derive(Default)]
pub struct GraphBuilder {
    variables: Vec<Variable>,
    index: HashMap<String, usize>,
    forbidden: Vec<(String, Vec<String>)>,
    duplicate: Option<String>,
}

impl GraphBuilder {
    /// Registers a variable and returns a handle for attaching formulas.
    pub fn variable(&mut self, name: &str, kind: Kind, flags: Flags) -> VariableBuilder<'_> {
        let index = match self.index.get(name) {
            Some(&existing) => {
                self.duplicate.get_or_insert_with(|| name.to_string());
                existing
            }
            None => {
                self.variables.push(Variable {
                    name: name.to_string(),
                    kind,
                    flags,
                    formulas: Vec::new(),
                });
                let i = self.variables.len() - 1;
                self.index.insert(name.to_string(), i);
                i
            }
        };
        VariableBuilder {
            builder: self,
            index,
        }
    }

    /// Declares that no formula chain starting at `variable` may reach any of
    /// `forbidden`. Checked by [`GraphBuilder::build`].
    pub fn forbid(&mut self, variable: &str, forbidden: &[&str]) -> &mut Self {
        self.forbidden.push((
            variable.to_string(),
            forbidden.iter().map(|s| s.to_string()).collect(),
        ));
        self
    }

    /// Validates the declarations and freezes the graph.
    pub fn build(self) -> SolveResult<Graph> {
        if let Some(name) = self.duplicate {
            return Err(SolveError::DuplicateVariable(name));
        }

        let graph = Graph {
            variables: self.variables,
            index: self.index,
        };

        for var in &graph.variables {
            for dep in var.formulas.iter().flat_map(|f| f.reads.iter()) {
                if graph.variable(dep).is_none() {
                    return Err(SolveError::UnknownVariable(dep.clone()));
                }
            }
            if var.formulas.is_empty() && !var.is_settable() {
                return Err(SolveError::invalid(
                    &var.name,
                    "variable has no formulas and cannot be fixed",
                ));
            }
        }

        for (variable, forbidden) in &self.forbidden {
            if graph.variable(variable).is_none() {
                return Err(SolveError::UnknownVariable(variable.clone()));
            }
            let targets: HashSet<&str> = forbidden.iter().map(String::as_str).collect();
            if let Some(path) = graph.find_path(variable, &targets) {
                return Err(SolveError::ForbiddenDependency {
                    variable: variable.clone(),
                    path,
                });
            }
        }

        Ok(graph)
    }
}

/// Handle returned by [`GraphBuilder::variable`].
pub struct VariableBuilder<'a> {
    builder: &'a mut GraphBuilder,
    index: usize,
}

impl VariableBuilder<'_> {
    /// Appends a formula. Formulas are tried in the order they are added.
    ///
    /// `reads` must list every variable the closure accesses; reading an
    /// undeclared variable fails the resolution.
    pub fn formula<F>(self, reads: &[&str], func: F) -> Self
    where
        F: Fn(&mut Scope<'_>) -> SolveResult<Value> + Send + Sync + 'static,
    {
        self.builder.variables[self.index].formulas.push(Formula {
            reads: reads.iter().map(|s| s.to_string()).collect(),
            func: Arc::new(func),
        });
        self
    }
}
