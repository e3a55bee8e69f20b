//! Function resolution service.
//!
//! The lowering stages never hard-code function metadata. They ask a
//! [`FunctionResolver`] supplied by the host, which answers for the small
//! set of [`Builtin`]s the compiler itself introduces (index reads produced
//! by indexer classification, fused n-ary arithmetic produced by the
//! sequence optimizer).
//!
//! Functions are registered explicitly at startup; there is no discovery
//! step. [`FunctionRegistry::with_builtins`] registers the default set.
//!
//! # Example
//!
//! ```
//! use lanescript_ast::{Builtin, FunctionRegistry, FunctionResolver};
//!
//! let registry = FunctionRegistry::with_builtins();
//! let info = registry.resolve(Builtin::AddAll).unwrap();
//! assert_eq!(info.name, "adda");
//! ```

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::node::{Component, Operator};

/// Functions the compiler may introduce on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Builtin {
    IndexX,
    IndexY,
    IndexZ,
    IndexW,
    /// `adda(a, b, ...)` = `a + b + ...`
    AddAll,
    /// `suba(a, b, ...)` = `a - b - ...`
    SubtractAll,
    /// `mula(a, b, ...)` = `a * b * ...`
    MultiplyAll,
    /// `diva(a, b, ...)` = `a / b / ...`
    DivideAll,
}

impl Builtin {
    /// Index-read builtin for a component.
    pub fn index_read(component: Component) -> Self {
        match component {
            Component::X => Builtin::IndexX,
            Component::Y => Builtin::IndexY,
            Component::Z => Builtin::IndexZ,
            Component::W => Builtin::IndexW,
        }
    }

    /// Fused n-ary builtin for a foldable operator.
    pub fn fused(op: Operator) -> Option<Self> {
        match op {
            Operator::Add => Some(Builtin::AddAll),
            Operator::Subtract => Some(Builtin::SubtractAll),
            Operator::Multiply => Some(Builtin::MultiplyAll),
            Operator::Divide => Some(Builtin::DivideAll),
            _ => None,
        }
    }

    /// Operator folded by a fused builtin.
    pub fn folded_operator(self) -> Option<Operator> {
        match self {
            Builtin::AddAll => Some(Operator::Add),
            Builtin::SubtractAll => Some(Operator::Subtract),
            Builtin::MultiplyAll => Some(Operator::Multiply),
            Builtin::DivideAll => Some(Operator::Divide),
            _ => None,
        }
    }

    /// Component read by an index builtin.
    pub fn component(self) -> Option<Component> {
        match self {
            Builtin::IndexX => Some(Component::X),
            Builtin::IndexY => Some(Component::Y),
            Builtin::IndexZ => Some(Component::Z),
            Builtin::IndexW => Some(Component::W),
            _ => None,
        }
    }

    /// Default script-visible name.
    pub fn name(self) -> &'static str {
        match self {
            Builtin::IndexX => "index_x",
            Builtin::IndexY => "index_y",
            Builtin::IndexZ => "index_z",
            Builtin::IndexW => "index_w",
            Builtin::AddAll => "adda",
            Builtin::SubtractAll => "suba",
            Builtin::MultiplyAll => "mula",
            Builtin::DivideAll => "diva",
        }
    }

    pub const ALL: [Builtin; 8] = [
        Builtin::IndexX,
        Builtin::IndexY,
        Builtin::IndexZ,
        Builtin::IndexW,
        Builtin::AddAll,
        Builtin::SubtractAll,
        Builtin::MultiplyAll,
        Builtin::DivideAll,
    ];
}

/// Metadata for a resolvable function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionInfo {
    pub builtin: Builtin,
    /// Script-visible name.
    pub name: String,
    pub min_parameters: usize,
    pub max_parameters: usize,
    /// Result width, `0` meaning "same as the first argument".
    pub return_vector_size: u8,
}

impl FunctionInfo {
    /// Whether `count` arguments are accepted.
    pub fn accepts(&self, count: usize) -> bool {
        (self.min_parameters..=self.max_parameters).contains(&count)
    }
}

/// Host-supplied lookup from builtin to metadata.
pub trait FunctionResolver: Send + Sync {
    fn resolve(&self, builtin: Builtin) -> Option<&FunctionInfo>;
}

/// Explicitly populated function table.
#[derive(Debug, Clone, Default)]
pub struct FunctionRegistry {
    functions: IndexMap<Builtin, FunctionInfo>,
}

/// Largest operand count of a fused call; matches the one-byte count operand.
pub const MAX_FUSED_OPERANDS: usize = 63;

impl FunctionRegistry {
    /// Empty registry; nothing resolves until registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every [`Builtin`] registered under its default name.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for builtin in Builtin::ALL {
            let (min, max, ret) = match builtin.component() {
                Some(_) => (1, 1, 1),
                None => (2, MAX_FUSED_OPERANDS, 0),
            };
            registry.register(FunctionInfo {
                builtin,
                name: builtin.name().to_string(),
                min_parameters: min,
                max_parameters: max,
                return_vector_size: ret,
            });
        }
        registry
    }

    /// Register or replace the metadata for a builtin.
    pub fn register(&mut self, info: FunctionInfo) {
        self.functions.insert(info.builtin, info);
    }

    /// Remove a builtin; later resolution of it fails.
    pub fn unregister(&mut self, builtin: Builtin) -> Option<FunctionInfo> {
        self.functions.shift_remove(&builtin)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

impl FunctionResolver for FunctionRegistry {
    fn resolve(&self, builtin: Builtin) -> Option<&FunctionInfo> {
        self.functions.get(&builtin)
    }
}
