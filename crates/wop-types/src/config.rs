//! Optimization problem description sent to the remote solver.

use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;

use crate::config_error;
use crate::errors::WopResult;

/// Tolerance applied to constraints that do not specify one.
pub const DEFAULT_TOLERANCE: f64 = 1e-4;

/// Which remote solver runs the optimization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolverKind {
    /// Mixed-integer single-objective Bayesian optimizer.
    #[serde(rename = "SEGOMOE")]
    SingleObjective,
    /// Mixed-integer multi-objective Bayesian optimizer.
    #[serde(rename = "SEGMOOMOE")]
    MultiObjective,
}

impl SolverKind {
    /// Solver picked when the caller only gives an objective count.
    pub fn for_objectives(objective_count: usize) -> Self {
        if objective_count > 1 {
            Self::MultiObjective
        } else {
            Self::SingleObjective
        }
    }
}

impl std::fmt::Display for SolverKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SingleObjective => write!(f, "SEGOMOE"),
            Self::MultiObjective => write!(f, "SEGMOOMOE"),
        }
    }
}

// ---------------------------------------------------------------------------
// Constraints
// ---------------------------------------------------------------------------

/// Relation a constraint value must hold against its bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConstraintType {
    #[default]
    #[serde(rename = "<")]
    LessThan,
    #[serde(rename = "=")]
    Equal,
    #[serde(rename = ">")]
    GreaterThan,
}

/// A fully specified constraint: `value <type> bound`, accepted within
/// `tolerance`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "PartialConstraintSpec")]
pub struct ConstraintSpec {
    #[serde(rename = "type")]
    pub kind: ConstraintType,
    pub bound: f64,
    #[serde(rename = "tol")]
    pub tolerance: f64,
}

impl ConstraintSpec {
    pub fn new(kind: ConstraintType, bound: f64) -> Self {
        Self {
            kind,
            bound,
            tolerance: DEFAULT_TOLERANCE,
        }
    }

    pub fn less_than(bound: f64) -> Self {
        Self::new(ConstraintType::LessThan, bound)
    }

    pub fn equal(bound: f64) -> Self {
        Self::new(ConstraintType::Equal, bound)
    }

    pub fn greater_than(bound: f64) -> Self {
        Self::new(ConstraintType::GreaterThan, bound)
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Whether `value` satisfies this constraint within tolerance.
    pub fn is_satisfied(&self, value: f64) -> bool {
        match self.kind {
            ConstraintType::LessThan => value - self.bound < self.tolerance,
            ConstraintType::Equal => (self.bound - value).abs() < self.tolerance,
            ConstraintType::GreaterThan => self.bound - value < self.tolerance,
        }
    }
}

impl Default for ConstraintSpec {
    fn default() -> Self {
        Self::less_than(0.0)
    }
}

/// Constraint as given by a caller, any field may be left out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PartialConstraintSpec {
    #[serde(rename = "type", default)]
    pub kind: Option<ConstraintType>,
    #[serde(default)]
    pub bound: Option<f64>,
    #[serde(rename = "tol", default)]
    pub tolerance: Option<f64>,
}

impl From<PartialConstraintSpec> for ConstraintSpec {
    fn from(partial: PartialConstraintSpec) -> Self {
        let default = ConstraintSpec::default();
        Self {
            kind: partial.kind.unwrap_or(default.kind),
            bound: partial.bound.unwrap_or(default.bound),
            tolerance: partial.tolerance.unwrap_or(default.tolerance),
        }
    }
}

// ---------------------------------------------------------------------------
// Variables
// ---------------------------------------------------------------------------

/// A typed design variable and its limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "limits")]
pub enum VariableType {
    /// Continuous variable in `[lower, upper]`.
    #[serde(rename = "float_type")]
    Float([f64; 2]),
    /// Integer variable in `[lower, upper]` inclusive.
    #[serde(rename = "int_type")]
    Int([i64; 2]),
    /// Ordered set of admissible integer levels.
    #[serde(rename = "ord_type")]
    Ordinal(Vec<i64>),
    /// Unordered categorical levels, told and suggested as level indices.
    #[serde(rename = "enum_type")]
    Enum(Vec<String>),
}

/// How the design space was described.
#[derive(Debug, Clone, PartialEq)]
pub enum VariableSpec {
    /// Plain `[lower, upper]` float bounds.
    Bounds(Vec<[f64; 2]>),
    /// Mixed-integer typed specs.
    Typed(Vec<VariableType>),
}

impl VariableSpec {
    pub fn dimension(&self) -> usize {
        match self {
            Self::Bounds(bounds) => bounds.len(),
            Self::Typed(types) => types.len(),
        }
    }

    /// Typed view of the space; plain bounds become float variables.
    pub fn to_types(&self) -> Vec<VariableType> {
        match self {
            Self::Bounds(bounds) => bounds.iter().copied().map(VariableType::Float).collect(),
            Self::Typed(types) => types.clone(),
        }
    }

    fn validate(&self) -> WopResult<()> {
        if self.dimension() == 0 {
            return Err(config_error!("the design space has no variables"));
        }
        for (index, var) in self.to_types().iter().enumerate() {
            match var {
                VariableType::Float([lower, upper]) => {
                    if !(lower < upper) {
                        return Err(config_error!(
                            "variable {index}: lower bound {lower} must be below \
                             upper bound {upper}"
                        ));
                    }
                }
                VariableType::Int([lower, upper]) => {
                    if lower > upper {
                        return Err(config_error!(
                            "variable {index}: lower bound {lower} exceeds upper bound {upper}"
                        ));
                    }
                }
                VariableType::Ordinal(levels) if levels.is_empty() => {
                    return Err(config_error!("variable {index}: ordinal levels are empty"));
                }
                VariableType::Enum(levels) if levels.is_empty() => {
                    return Err(config_error!("variable {index}: enum levels are empty"));
                }
                _ => {}
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Solver options
// ---------------------------------------------------------------------------

/// A primitive solver option value. Options are checked by the remote
/// service only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl From<bool> for OptionValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for OptionValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for OptionValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for OptionValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

pub type SolverOptions = BTreeMap<String, OptionValue>;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Validated, immutable description of an optimization problem.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationConfig {
    kind: SolverKind,
    variables: VariableSpec,
    objective_count: usize,
    constraints: Vec<ConstraintSpec>,
    options: SolverOptions,
}

impl OptimizationConfig {
    pub fn builder() -> OptimizationConfigBuilder {
        OptimizationConfigBuilder::default()
    }

    /// Single-objective, unconstrained problem over float bounds.
    pub fn with_bounds(xlimits: Vec<[f64; 2]>) -> WopResult<Self> {
        Self::builder().xlimits(xlimits).build()
    }

    pub fn kind(&self) -> SolverKind {
        self.kind
    }

    pub fn variables(&self) -> &VariableSpec {
        &self.variables
    }

    pub fn dimension(&self) -> usize {
        self.variables.dimension()
    }

    pub fn objective_count(&self) -> usize {
        self.objective_count
    }

    pub fn constraints(&self) -> &[ConstraintSpec] {
        &self.constraints
    }

    pub fn options(&self) -> &SolverOptions {
        &self.options
    }

    /// Width of an output row: objectives followed by constraint values.
    pub fn output_width(&self) -> usize {
        self.objective_count + self.constraints.len()
    }
}

/// Shape of the configuration expected by the remote service.
#[derive(Serialize)]
struct WireConfig<'a> {
    kind: SolverKind,
    n_obj: usize,
    xlimits: &'a [[f64; 2]],
    xtypes: Vec<VariableType>,
    cstr_specs: &'a [ConstraintSpec],
    options: &'a SolverOptions,
}

impl Serialize for OptimizationConfig {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let xlimits: &[[f64; 2]] = match &self.variables {
            VariableSpec::Bounds(bounds) => bounds,
            VariableSpec::Typed(_) => &[],
        };
        WireConfig {
            kind: self.kind,
            n_obj: self.objective_count,
            xlimits,
            xtypes: self.variables.to_types(),
            cstr_specs: &self.constraints,
            options: &self.options,
        }
        .serialize(serializer)
    }
}

/// Collects the raw pieces of a configuration and validates them in
/// [`OptimizationConfigBuilder::build`].
#[derive(Debug, Clone, Default)]
pub struct OptimizationConfigBuilder {
    kind: Option<SolverKind>,
    xlimits: Option<Vec<[f64; 2]>>,
    xtypes: Option<Vec<VariableType>>,
    objective_count: Option<usize>,
    constraints: Vec<ConstraintSpec>,
    options: SolverOptions,
}

impl OptimizationConfigBuilder {
    pub fn kind(mut self, kind: SolverKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn xlimits(mut self, xlimits: Vec<[f64; 2]>) -> Self {
        self.xlimits = Some(xlimits);
        self
    }

    pub fn xtypes(mut self, xtypes: Vec<VariableType>) -> Self {
        self.xtypes = Some(xtypes);
        self
    }

    pub fn objectives(mut self, count: usize) -> Self {
        self.objective_count = Some(count);
        self
    }

    pub fn constraint(mut self, spec: impl Into<ConstraintSpec>) -> Self {
        self.constraints.push(spec.into());
        self
    }

    pub fn constraints<I, C>(mut self, specs: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<ConstraintSpec>,
    {
        self.constraints.extend(specs.into_iter().map(Into::into));
        self
    }

    pub fn option(mut self, key: impl Into<String>, value: impl Into<OptionValue>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn options(mut self, options: SolverOptions) -> Self {
        self.options.extend(options);
        self
    }

    pub fn build(self) -> WopResult<OptimizationConfig> {
        let variables = match (self.xlimits, self.xtypes) {
            (Some(_), Some(_)) => {
                return Err(config_error!(
                    "specify either xtypes or xlimits exclusively, not both"
                ))
            }
            (None, None) => return Err(config_error!("specify either xtypes or xlimits")),
            (Some(bounds), None) => VariableSpec::Bounds(bounds),
            (None, Some(types)) => VariableSpec::Typed(types),
        };
        variables.validate()?;

        let objective_count = self.objective_count.unwrap_or(1);
        if objective_count == 0 {
            return Err(config_error!("at least one objective is required"));
        }

        let kind = self
            .kind
            .unwrap_or_else(|| SolverKind::for_objectives(objective_count));
        if kind == SolverKind::SingleObjective && objective_count > 1 {
            return Err(config_error!(
                "{kind} handles a single objective, got {objective_count}"
            ));
        }

        for (index, spec) in self.constraints.iter().enumerate() {
            if !(spec.tolerance >= 0.0) {
                return Err(config_error!(
                    "constraint {index}: tolerance must be non-negative, got {}",
                    spec.tolerance
                ));
            }
        }

        Ok(OptimizationConfig {
            kind,
            variables,
            objective_count,
            constraints: self.constraints,
            options: self.options,
        })
    }
}
