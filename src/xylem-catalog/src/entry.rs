//! Catalog entries and the registry.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use common_error::{ErrorCode, XylemError, XylemResult};
use xylem_core::{ItemType, QName, SequenceType};
use xylem_ir::Tristate;
use xylem_runtime::{NodeMeta, PlanBuilder, PlanNodeId};

use crate::signature::{Arity, Signature};

/// Maps argument static types to the result type.
pub type TypeCheckFn = Arc<dyn Fn(&[SequenceType]) -> XylemResult<SequenceType> + Send + Sync>;

/// Builds the plan subtree of a call from its lowered arguments.
pub type CodegenFn =
    Arc<dyn Fn(&mut PlanBuilder, Vec<PlanNodeId>, NodeMeta) -> XylemResult<PlanNodeId> + Send + Sync>;

// ============================================================================
// Properties
// ============================================================================

/// Evaluation properties of a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionProps {
    /// Same arguments always give the same result.
    pub deterministic: bool,
    pub side_effect_free: bool,
    /// Reads the dynamic context (documents, current time, ...).
    pub requires_dynamic_context: bool,
    /// Potentially large result or costly evaluation.
    pub expensive: bool,
    /// Must never be evaluated at compile time.
    pub unfoldable: bool,
}

impl Default for FunctionProps {
    fn default() -> Self {
        Self {
            deterministic: true,
            side_effect_free: true,
            requires_dynamic_context: false,
            expensive: false,
            unfoldable: false,
        }
    }
}

/// How a producer annotation of a call is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Producer {
    /// Derived from the return type: resolved when at most one item or
    /// atomic, conservative otherwise.
    #[default]
    Default,
    /// Asserted regardless of the inputs.
    Fixed(Tristate),
    /// Copied from one argument.
    Input(usize),
    /// Copied from the only argument that may be non-empty.
    Inputs,
}

/// How a consumer annotation flows from a call to its arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Propagation {
    /// Arguments get `Maybe`.
    #[default]
    Conservative,
    /// Arguments get whatever the call's own consumer says.
    Inherit,
    /// Arguments get a fixed value.
    Assert(Tristate),
}

/// Default annotation behavior of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AnnotationBehavior {
    pub duplicates: Producer,
    pub sorted: Producer,
    pub ignores_sorted: Propagation,
    pub ignores_duplicates: Propagation,
}

impl AnnotationBehavior {
    /// Order and duplicates pass through unchanged in both directions.
    pub fn transparent() -> Self {
        Self {
            duplicates: Producer::Inputs,
            sorted: Producer::Inputs,
            ignores_sorted: Propagation::Inherit,
            ignores_duplicates: Propagation::Inherit,
        }
    }

    /// The result depends on neither order nor duplicates of the arguments.
    pub fn insensitive() -> Self {
        Self {
            ignores_sorted: Propagation::Assert(Tristate::Yes),
            ignores_duplicates: Propagation::Assert(Tristate::Yes),
            ..Self::default()
        }
    }
}

// ============================================================================
// Entry
// ============================================================================

/// A registered function or operator.
#[derive(Clone)]
pub struct FunctionEntry {
    pub name: QName,
    pub signature: Signature,
    pub props: FunctionProps,
    pub annotations: AnnotationBehavior,
    type_check: Option<TypeCheckFn>,
    codegen: CodegenFn,
}

impl fmt::Debug for FunctionEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionEntry")
            .field("name", &self.name.to_string())
            .field("arity", &self.signature.arity)
            .field("props", &self.props)
            .finish_non_exhaustive()
    }
}

impl FunctionEntry {
    pub fn new<F>(name: QName, signature: Signature, codegen: F) -> Self
    where
        F: Fn(&mut PlanBuilder, Vec<PlanNodeId>, NodeMeta) -> XylemResult<PlanNodeId> + Send + Sync + 'static,
    {
        Self {
            name,
            signature,
            props: FunctionProps::default(),
            annotations: AnnotationBehavior::default(),
            type_check: None,
            codegen: Arc::new(codegen),
        }
    }

    #[must_use]
    pub fn with_props(mut self, props: FunctionProps) -> Self {
        self.props = props;
        self
    }

    #[must_use]
    pub fn with_annotations(mut self, annotations: AnnotationBehavior) -> Self {
        self.annotations = annotations;
        self
    }

    /// Replace the default result type with one computed from the arguments.
    #[must_use]
    pub fn with_type_check<F>(mut self, check: F) -> Self
    where
        F: Fn(&[SequenceType]) -> XylemResult<SequenceType> + Send + Sync + 'static,
    {
        self.type_check = Some(Arc::new(check));
        self
    }

    /// Static result type for the given argument types.
    ///
    /// # Errors
    ///
    /// `XPTY0004` when an argument can never match its parameter.
    pub fn type_check(&self, args: &[SequenceType]) -> XylemResult<SequenceType> {
        self.signature.check_arity(&self.name.to_string(), args.len())?;
        for (i, arg) in args.iter().enumerate() {
            let param = self.signature.param_type(i);
            if !convertible(arg, &param) {
                return Err(XylemError::static_error(
                    ErrorCode::XPTY0004,
                    format!("argument {} of {}: {arg} does not match {param}", i + 1, self.name),
                ));
            }
        }
        match &self.type_check {
            Some(check) => check(args),
            None => Ok(self.signature.return_type),
        }
    }

    /// Lower a call to a plan subtree.
    ///
    /// # Errors
    ///
    /// `ArityMismatch` when the argument count is not covered by the
    /// signature; nothing is added to the builder in that case.
    pub fn codegen(
        &self,
        builder: &mut PlanBuilder,
        args: Vec<PlanNodeId>,
        meta: NodeMeta,
    ) -> XylemResult<PlanNodeId> {
        self.signature.check_arity(&self.name.to_string(), args.len())?;
        (self.codegen)(builder, args, meta)
    }
}

/// Whether a value of type `arg` could pass function conversion to `param`.
fn convertible(arg: &SequenceType, param: &SequenceType) -> bool {
    let arg = if param.item.is_atomic() {
        // Atomization and untyped casting happen at run time.
        let item = match arg.item {
            ItemType::Node | ItemType::Untyped | ItemType::Item => param.item,
            ItemType::Integer if param.item == ItemType::Double => ItemType::Double,
            other => other,
        };
        SequenceType::new(item, arg.occurrence)
    } else {
        *arg
    };
    arg.intersects(param)
}

// ============================================================================
// Catalog
// ============================================================================

/// Read-only registry of functions, built once.
#[derive(Debug, Default)]
pub struct FunctionCatalog {
    entries: HashMap<QName, Vec<FunctionEntry>>,
}

impl FunctionCatalog {
    pub fn builder() -> CatalogBuilder {
        CatalogBuilder::default()
    }

    /// Catalog holding every built-in function.
    pub fn builtin() -> XylemResult<Self> {
        Ok(CatalogBuilder::with_builtins()?.build())
    }

    /// Entry for `name` called with `arity` arguments: an exact fixed
    /// arity wins over a variadic entry.
    pub fn lookup(&self, name: &QName, arity: usize) -> Option<&FunctionEntry> {
        let entries = self.entries.get(name)?;
        entries
            .iter()
            .find(|e| e.signature.arity == Arity::Fixed(arity))
            .or_else(|| entries.iter().find(|e| e.signature.arity.accepts(arity)))
    }

    /// Like [`lookup`](Self::lookup), but a miss is an error.
    ///
    /// A known name with no matching arity is an arity mismatch; an
    /// unknown name is an internal defect, since names are resolved
    /// before the catalog is consulted.
    pub fn resolve(&self, name: &QName, arity: usize) -> XylemResult<&FunctionEntry> {
        if let Some(entry) = self.lookup(name, arity) {
            return Ok(entry);
        }
        match self.entries.get(name) {
            Some(entries) => {
                let expected: Vec<String> = entries.iter().map(|e| e.signature.arity.to_string()).collect();
                Err(XylemError::arity_mismatch(name.to_string(), expected.join(" or "), arity))
            }
            None => Err(XylemError::internal(format!(
                "unregistered function {name}#{arity}"
            ))),
        }
    }

    pub fn contains(&self, name: &QName) -> bool {
        self.entries.contains_key(name)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Collects entries at session start.
#[derive(Debug, Default)]
pub struct CatalogBuilder {
    entries: HashMap<QName, Vec<FunctionEntry>>,
}

impl CatalogBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A builder pre-populated with the built-in functions.
    pub fn with_builtins() -> XylemResult<Self> {
        let mut builder = Self::new();
        crate::builtins::register_builtins(&mut builder)?;
        Ok(builder)
    }

    /// Register an entry.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if an entry with the same name and arity exists.
    pub fn register(&mut self, entry: FunctionEntry) -> XylemResult<()> {
        let existing = self.entries.entry(entry.name.clone()).or_default();
        if existing.iter().any(|e| e.signature.arity == entry.signature.arity) {
            return Err(XylemError::invalid_config(format!(
                "function {}#{} is already registered",
                entry.name, entry.signature.arity
            )));
        }
        existing.push(entry);
        Ok(())
    }

    pub fn build(self) -> FunctionCatalog {
        FunctionCatalog {
            entries: self.entries,
        }
    }
}
