//! Symbolic jump labels.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Role of a label within a jump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelKind {
    /// Attached to the instruction that jumps.
    Jump,
    /// Attached to the instruction jumped to.
    Label,
    /// Attached to the placeholder that receives the resolved address.
    Offset,
}

impl LabelKind {
    pub fn name(self) -> &'static str {
        match self {
            LabelKind::Jump => "jump",
            LabelKind::Label => "label",
            LabelKind::Offset => "offset",
        }
    }
}

/// A label owned by one instruction.
///
/// Jump and offset labels name their target's id, so several jumps may
/// share an id; a `Label` id is unique per program.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JumpLabel {
    pub kind: LabelKind,
    pub id: String,
}

impl JumpLabel {
    pub fn new(kind: LabelKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }

    pub fn jump(id: impl Into<String>) -> Self {
        Self::new(LabelKind::Jump, id)
    }

    pub fn target(id: impl Into<String>) -> Self {
        Self::new(LabelKind::Label, id)
    }

    pub fn offset(id: impl Into<String>) -> Self {
        Self::new(LabelKind::Offset, id)
    }
}

impl fmt::Display for JumpLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.name(), self.id)
    }
}

/// One row of the label table handed to the address resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelRecord {
    pub id: String,
    pub kind: LabelKind,
    /// Index of the owning instruction.
    pub index: usize,
}
