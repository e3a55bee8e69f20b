//! Script variable table.
//!
//! Variables are keyed by name in insertion order, which is also their
//! data-segment order. Literal constants that have no dedicated opcode are
//! interned here as read-only data slots.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Index of a variable in its [`Variables`] table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VariableId(pub u16);

impl VariableId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// One variable slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub id: VariableId,
    pub name: String,
    pub vector_size: u8,
    /// Interned literal; never written by scripts.
    pub is_constant: bool,
    /// Initial value for constant slots.
    pub value: Option<f32>,
    /// Number of parameter nodes referring to this slot.
    pub reference_count: u32,
}

/// Ordered variable table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Variables {
    entries: IndexMap<String, Variable>,
}

impl Variables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a variable, or return the existing one with the same name.
    pub fn declare(&mut self, name: &str, vector_size: u8) -> VariableId {
        if let Some(existing) = self.entries.get(name) {
            return existing.id;
        }
        let id = VariableId(self.entries.len() as u16);
        self.entries.insert(
            name.to_string(),
            Variable {
                id,
                name: name.to_string(),
                vector_size: vector_size.max(1),
                is_constant: false,
                value: None,
                reference_count: 0,
            },
        );
        id
    }

    /// Intern a literal as a read-only data slot.
    ///
    /// Equal bit patterns share a slot, so `0.0` and `-0.0` stay distinct.
    pub fn intern_constant(&mut self, value: f32) -> VariableId {
        let name = constant_name(value);
        if let Some(existing) = self.entries.get(&name) {
            return existing.id;
        }
        let id = VariableId(self.entries.len() as u16);
        self.entries.insert(
            name.clone(),
            Variable {
                id,
                name,
                vector_size: 1,
                is_constant: true,
                value: Some(value),
                reference_count: 0,
            },
        );
        id
    }

    /// Slot previously interned for `value`.
    pub fn constant_slot(&self, value: f32) -> Option<VariableId> {
        self.entries.get(&constant_name(value)).map(|v| v.id)
    }

    pub fn get(&self, id: VariableId) -> Option<&Variable> {
        self.entries.get_index(id.index()).map(|(_, v)| v)
    }

    pub fn by_name(&self, name: &str) -> Option<&Variable> {
        self.entries.get(name)
    }

    /// Record one more parameter node referring to `id`.
    pub fn add_reference(&mut self, id: VariableId) {
        if let Some((_, variable)) = self.entries.get_index_mut(id.index()) {
            variable.reference_count += 1;
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Variable> {
        self.entries.values()
    }
}

fn constant_name(value: f32) -> String {
    format!("#const_{:08x}", value.to_bits())
}
