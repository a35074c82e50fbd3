//! Lazy constraint solver over a graph of named variables.
//!
//! The solver resolves variables on demand. Each variable either holds a value
//! fixed by the caller or is derived by the first of its formulas whose inputs
//! are themselves resolvable. Results are memoized together with the set of
//! variables consulted while producing them, so that re-fixing an input only
//! discards the values that actually depended on it.
//!
//! ## Fallback
//!
//! A formula that reads an unresolvable variable (or one that is already being
//! resolved higher up the stack) fails *recoverably* and the next formula is
//! tried. Only when every formula of a variable fails is the failure reported:
//! as [`SolveError::CyclicDependency`] if all attempts ran into cycles, or as
//! [`SolveError::Unresolvable`] otherwise.
//!
//! Which formula wins can depend on what is already on the stack, so values
//! are always produced in graph registration order: the first miss in
//! [`Solver::get`] resolves every variable, exactly as [`Solver::resolve_all`]
//! does on a fresh solver.
//!
//! ## Example
//!
//! ```rust
//! use raster_scan::solver::{Flags, Graph, Kind, Solver, Value};
//! use std::sync::Arc;
//!
//! let mut b = Graph::builder();
//! b.variable("radius", Kind::Float, Flags::FIXED | Flags::COMPUTED)
//!     .formula(&["diameter"], |s| Ok(Value::Float(s.float("diameter")? / 2.0)));
//! b.variable("diameter", Kind::Float, Flags::FIXED | Flags::COMPUTED)
//!     .formula(&["radius"], |s| Ok(Value::Float(s.float("radius")? * 2.0)));
//! let graph = Arc::new(b.build().unwrap());
//!
//! let mut solver = Solver::new(graph);
//! solver.set("radius", 1.5).unwrap();
//! assert_eq!(solver.get("diameter").unwrap(), Value::Float(3.0));
//! ```

mod error;
mod graph;
mod value;

pub use error::{SolveError, SolveResult};
pub use graph::{Flags, Formula, FormulaFn, Graph, GraphBuilder, Variable, VariableBuilder};
pub use value::{Kind, Value};

use nalgebra::Vector2;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, trace};

/// Resolution state for one set of inputs.
///
/// Cloning a solver copies its fixed inputs and memo table; the graph itself
/// is shared.
#[derive(Debug, Clone)]
pub struct Solver {
    graph: Arc<Graph>,
    fixed: HashMap<String, Value>,
    cache: HashMap<String, Value>,
    // Variables consulted (directly, or through failed attempts) when the
    // cached value was produced.
    dependencies: HashMap<String, BTreeSet<String>>,
    dependents: HashMap<String, BTreeSet<String>>,
    stack: Vec<String>,
}

impl Solver {
    /// Creates a solver with no fixed inputs.
    pub fn new(graph: Arc<Graph>) -> Self {
        Self {
            graph,
            fixed: HashMap::new(),
            cache: HashMap::new(),
            dependencies: HashMap::new(),
            dependents: HashMap::new(),
            stack: Vec::new(),
        }
    }

    /// The graph this solver resolves.
    pub fn graph(&self) -> &Arc<Graph> {
        &self.graph
    }

    /// Fixes a settable variable and invalidates everything derived from it.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> SolveResult<()> {
        let value = value.into();
        let var = self
            .graph
            .variable(name)
            .ok_or_else(|| SolveError::UnknownVariable(name.to_string()))?;
        if !var.is_settable() {
            return Err(SolveError::NotSettable(name.to_string()));
        }
        if var.kind() != value.kind() {
            return Err(SolveError::TypeMismatch {
                name: name.to_string(),
                expected: var.kind(),
                found: value.kind(),
            });
        }
        if !value.is_finite() {
            return Err(SolveError::invalid(name, "value must be finite"));
        }

        debug!(variable = name, %value, "fixing variable");
        self.fixed.insert(name.to_string(), value);
        self.invalidate(name);
        Ok(())
    }

    /// Removes a fixed value, returning it. Dependents are invalidated.
    pub fn unset(&mut self, name: &str) -> Option<Value> {
        let previous = self.fixed.remove(name);
        if previous.is_some() {
            self.invalidate(name);
        }
        previous
    }

    /// Discards the cached value of `name` and of everything derived from it.
    pub fn invalidate(&mut self, name: &str) {
        let mut pending = vec![name.to_string()];
        while let Some(current) = pending.pop() {
            if self.cache.remove(&current).is_some() {
                trace!(variable = %current, "invalidated");
            }
            if let Some(deps) = self.dependencies.remove(&current) {
                for dep in deps {
                    if let Some(set) = self.dependents.get_mut(&dep) {
                        set.remove(&current);
                    }
                }
            }
            if let Some(children) = self.dependents.remove(&current) {
                pending.extend(children);
            }
        }
    }

    /// Drops every computed value; fixed inputs are kept.
    pub fn clear_cache(&mut self) {
        self.cache.clear();
        self.dependencies.clear();
        self.dependents.clear();
    }

    /// True if `name` currently holds a memoized computed value.
    pub fn is_cached(&self, name: &str) -> bool {
        self.cache.contains_key(name)
    }

    /// True if the caller fixed `name`.
    pub fn is_fixed(&self, name: &str) -> bool {
        self.fixed.contains_key(name)
    }

    /// The caller-assigned value of `name`, if any.
    pub fn fixed_value(&self, name: &str) -> Option<&Value> {
        self.fixed.get(name)
    }

    /// Variables consulted when the cached value of `name` was produced.
    pub fn dependencies_of(&self, name: &str) -> Option<&BTreeSet<String>> {
        self.dependencies.get(name)
    }

    /// Resolves `name`, computing and memoizing it if necessary.
    ///
    /// A miss resolves the whole graph in registration order before answering,
    /// so the result never depends on which variables were queried earlier.
    pub fn get(&mut self, name: &str) -> SolveResult<Value> {
        if self.graph.variable(name).is_none() {
            return Err(SolveError::UnknownVariable(name.to_string()));
        }
        if let Some(value) = self.fixed.get(name).or_else(|| self.cache.get(name)) {
            return Ok(value.clone());
        }
        self.sweep()
            .into_iter()
            .find(|(var, _)| var == name)
            .map(|(_, result)| result)
            .unwrap_or_else(|| Err(SolveError::Unresolvable(name.to_string())))
    }

    /// Resolves every variable in registration order.
    ///
    /// Pure inputs (no formulas) that were never fixed are skipped; if anything
    /// needs them it fails in their place. Fails with
    /// [`SolveError::Underdetermined`] listing every variable that no formula
    /// chain can produce, or with the first cycle found when the graph is stuck
    /// on cycles through variables the caller cannot fix.
    pub fn resolve_all(&mut self) -> SolveResult<Vec<(String, Value)>> {
        let graph = Arc::clone(&self.graph);
        let mut resolved = Vec::with_capacity(graph.len());
        let mut unresolved = Vec::new();
        let mut first_cycle = None;
        let mut saw_unresolvable = false;

        for (name, result) in self.sweep() {
            match result {
                Ok(value) => resolved.push((name, value)),
                Err(SolveError::Unresolvable(_)) => {
                    saw_unresolvable = true;
                    unresolved.push(name);
                }
                Err(err @ SolveError::CyclicDependency { .. }) => {
                    unresolved.push(name);
                    first_cycle.get_or_insert(err);
                }
                Err(err) => return Err(err),
            }
        }

        if unresolved.is_empty() {
            return Ok(resolved);
        }
        // A cycle through variables the caller could fix is just a missing input.
        let settable = unresolved
            .iter()
            .any(|name| graph.variable(name).is_some_and(Variable::is_settable));
        match first_cycle {
            Some(cycle) if !saw_unresolvable && !settable => Err(cycle),
            _ => Err(SolveError::Underdetermined { unresolved }),
        }
    }

    // Every variable gets its own top-level resolution, in registration order.
    // Values found on the way are memoized in the same order a fresh solver
    // would produce them.
    fn sweep(&mut self) -> Vec<(String, SolveResult<Value>)> {
        let graph = Arc::clone(&self.graph);
        let mut results = Vec::with_capacity(graph.len());
        for var in graph.variables() {
            if var.formulas().is_empty() && !self.fixed.contains_key(var.name()) {
                continue;
            }
            results.push((var.name().to_string(), self.evaluate(var.name())));
        }
        results
    }

    fn evaluate(&mut self, name: &str) -> SolveResult<Value> {
        let mut touched = BTreeSet::new();
        self.resolve(name, &mut touched)
    }

    /// Checks every fixed variable against the value the *other* fixed inputs
    /// imply for it.
    ///
    /// Each check runs on a scratch copy with that one input removed. A fixed
    /// variable that cannot be derived without itself is an independent
    /// degree of freedom and is skipped.
    pub fn check_consistency(&self, rel_tol: f64) -> SolveResult<()> {
        for var in self.graph.variables() {
            let Some(fixed) = self.fixed.get(var.name()) else {
                continue;
            };
            if var.formulas().is_empty() {
                continue;
            }

            let mut scratch = Solver::new(Arc::clone(&self.graph));
            scratch.fixed = self.fixed.clone();
            scratch.fixed.remove(var.name());

            if let Ok(computed) = scratch.evaluate(var.name()) {
                if !computed.approx_eq(fixed, rel_tol) {
                    return Err(SolveError::Conflicting {
                        variable: var.name().to_string(),
                        fixed: fixed.clone(),
                        computed,
                    });
                }
            }
        }
        Ok(())
    }

    fn resolve(&mut self, name: &str, touched: &mut BTreeSet<String>) -> SolveResult<Value> {
        touched.insert(name.to_string());

        if let Some(value) = self.fixed.get(name) {
            return Ok(value.clone());
        }
        if let Some(value) = self.cache.get(name) {
            return Ok(value.clone());
        }

        let graph = Arc::clone(&self.graph);
        let var = graph
            .variable(name)
            .ok_or_else(|| SolveError::UnknownVariable(name.to_string()))?;

        if let Some(pos) = self.stack.iter().position(|s| s == name) {
            let mut path = self.stack[pos..].to_vec();
            path.push(name.to_string());
            return Err(SolveError::CyclicDependency { path });
        }

        self.stack.push(name.to_string());
        let outcome = self.try_formulas(var);
        self.stack.pop();

        match outcome {
            Ok((value, mut deps)) => {
                deps.remove(name);
                trace!(variable = name, %value, "resolved");
                for dep in &deps {
                    self.dependents
                        .entry(dep.clone())
                        .or_default()
                        .insert(name.to_string());
                }
                self.dependencies.insert(name.to_string(), deps);
                self.cache.insert(name.to_string(), value.clone());
                Ok(value)
            }
            Err((err, attempted)) => {
                // The caller's choice of formula hinges on everything tried here.
                touched.extend(attempted);
                Err(err)
            }
        }
    }

    #[allow(clippy::type_complexity)]
    fn try_formulas(
        &mut self,
        var: &Variable,
    ) -> Result<(Value, BTreeSet<String>), (SolveError, BTreeSet<String>)> {
        let mut attempted = BTreeSet::new();
        let mut cycle = None;
        let mut saw_unresolvable = var.formulas().is_empty();

        for (i, formula) in var.formulas().iter().enumerate() {
            let mut scope = Scope {
                solver: &mut *self,
                variable: var.name(),
                declared: formula.reads(),
                reads: BTreeSet::new(),
            };
            let result = formula.call(&mut scope);
            let reads = scope.reads;

            match result {
                Ok(value) => {
                    if value.kind() != var.kind() {
                        return Err((
                            SolveError::TypeMismatch {
                                name: var.name().to_string(),
                                expected: var.kind(),
                                found: value.kind(),
                            },
                            attempted,
                        ));
                    }
                    if !value.is_finite() {
                        return Err((
                            SolveError::invalid(var.name(), format!("formula {i} produced {value}")),
                            attempted,
                        ));
                    }
                    attempted.extend(reads);
                    return Ok((value, attempted));
                }
                Err(err) if err.is_recoverable() => {
                    trace!(variable = var.name(), formula = i, error = %err, "formula fell through");
                    attempted.extend(reads);
                    match err {
                        SolveError::CyclicDependency { .. } => {
                            cycle.get_or_insert(err);
                        }
                        _ => saw_unresolvable = true,
                    }
                }
                Err(err) => {
                    attempted.extend(reads);
                    return Err((err, attempted));
                }
            }
        }

        let err = match cycle {
            Some(cycle) if !saw_unresolvable => cycle,
            _ => SolveError::Unresolvable(var.name().to_string()),
        };
        Err((err, attempted))
    }
}

/// Read access to other variables from inside a formula.
pub struct Scope<'a> {
    solver: &'a mut Solver,
    variable: &'a str,
    declared: &'a [String],
    reads: BTreeSet<String>,
}

impl Scope<'_> {
    /// Name of the variable being computed.
    pub fn variable(&self) -> &str {
        self.variable
    }

    /// Resolves a declared dependency.
    pub fn get(&mut self, name: &str) -> SolveResult<Value> {
        if !self.declared.iter().any(|d| d == name) {
            return Err(SolveError::UndeclaredDependency {
                variable: self.variable.to_string(),
                dependency: name.to_string(),
            });
        }
        self.solver.resolve(name, &mut self.reads)
    }

    /// Resolves a float dependency.
    pub fn float(&mut self, name: &str) -> SolveResult<f64> {
        match self.get(name)? {
            Value::Float(v) => Ok(v),
            other => Err(mismatch(name, Kind::Float, &other)),
        }
    }

    /// Resolves an integer dependency.
    pub fn int(&mut self, name: &str) -> SolveResult<i64> {
        match self.get(name)? {
            Value::Int(v) => Ok(v),
            other => Err(mismatch(name, Kind::Int, &other)),
        }
    }

    /// Resolves a boolean dependency.
    pub fn flag(&mut self, name: &str) -> SolveResult<bool> {
        match self.get(name)? {
            Value::Bool(v) => Ok(v),
            other => Err(mismatch(name, Kind::Bool, &other)),
        }
    }

    /// Resolves a vector dependency.
    pub fn vector(&mut self, name: &str) -> SolveResult<Vector2<f64>> {
        match self.get(name)? {
            Value::Vector(v) => Ok(v),
            other => Err(mismatch(name, Kind::Vector, &other)),
        }
    }

    /// Resolves a shape dependency.
    pub fn shape(&mut self, name: &str) -> SolveResult<[i64; 2]> {
        match self.get(name)? {
            Value::Shape(v) => Ok(v),
            other => Err(mismatch(name, Kind::Shape, &other)),
        }
    }
}

fn mismatch(name: &str, expected: Kind, found: &Value) -> SolveError {
    SolveError::TypeMismatch {
        name: name.to_string(),
        expected,
        found: found.kind(),
    }
}
