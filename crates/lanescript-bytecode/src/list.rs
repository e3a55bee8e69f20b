//! Instruction lists with labels and mergeable segments.
//!
//! An [`InstructionList`] is an ordered run of one-byte instructions, each
//! owning zero or more [`JumpLabel`]s, plus an ordered set of child segments
//! that are merged into it by [`InstructionList::reduce`]. Segments let
//! independent producers (one per top-level statement) build code
//! concurrently; order comes from slot reservation, never from timing.
//!
//! # Label invariant
//!
//! Labels are never duplicated or dropped. Removing a labelled instruction
//! hands its labels to the instruction that takes its place; the last
//! instruction cannot be removed that way, so it is turned into a nop
//! instead and a warning is recorded.

use std::fmt::Write;
use std::ops::Range;
use std::sync::{Mutex, MutexGuard, PoisonError};

use lanescript_ast::{Diagnostics, ErrorCode};
use tracing::trace;

use crate::error::IrError;
use crate::label::{JumpLabel, LabelRecord};
use crate::opcode::{Opcode, VARIABLE_BASE};

/// One instruction byte and the labels it owns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub code: u8,
    pub labels: Vec<JumpLabel>,
}

impl Instruction {
    pub fn new(code: impl Into<u8>) -> Self {
        Self {
            code: code.into(),
            labels: Vec::new(),
        }
    }

    pub fn labeled(code: impl Into<u8>, label: JumpLabel) -> Self {
        Self {
            code: code.into(),
            labels: vec![label],
        }
    }

    /// Fixed opcode, or `None` for variable and raw argument bytes.
    pub fn opcode(&self) -> Option<Opcode> {
        Opcode::from_byte(self.code)
    }

    pub fn is_nop(&self) -> bool {
        self.code == Opcode::Nop.byte()
    }
}

/// What [`InstructionList::remove`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    /// Unlabelled instruction removed.
    Removed,
    /// Removed; its labels moved to the following instruction.
    Relocated,
    /// Last instruction with labels; rewritten to a nop instead.
    Nopped,
}

/// Ordered instructions plus pending child segments.
#[derive(Debug, Default)]
pub struct InstructionList {
    instructions: Vec<Instruction>,
    /// `None` marks a reserved slot not filled yet.
    segments: Mutex<Vec<Option<InstructionList>>>,
}

impl InstructionList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_instructions(instructions: Vec<Instruction>) -> Self {
        Self {
            instructions,
            segments: Mutex::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn get(&self, index: usize) -> Option<&Instruction> {
        self.instructions.get(index)
    }

    /// Append an unlabelled instruction.
    pub fn push(&mut self, code: impl Into<u8>) {
        self.instructions.push(Instruction::new(code));
    }

    /// Append an instruction owning `label`.
    pub fn push_labeled(&mut self, code: impl Into<u8>, label: JumpLabel) {
        self.instructions.push(Instruction::labeled(code, label));
    }

    pub fn push_instruction(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
    }

    // ------------------------------------------------------------------
    // Segments
    // ------------------------------------------------------------------

    fn lock_segments(&self) -> MutexGuard<'_, Vec<Option<InstructionList>>> {
        // A panicking producer cannot leave the vector half-updated.
        self.segments.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn segments_mut(&mut self) -> &mut Vec<Option<InstructionList>> {
        self.segments
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a finished segment. Safe to call from several threads; the
    /// segment lands after every slot added or reserved before it.
    pub fn add_segment(&self, segment: InstructionList) -> usize {
        let mut segments = self.lock_segments();
        segments.push(Some(segment));
        segments.len() - 1
    }

    /// Reserve `count` consecutive segment slots for later [`fill_segment`].
    ///
    /// [`fill_segment`]: Self::fill_segment
    pub fn reserve_segments(&self, count: usize) -> Range<usize> {
        let mut segments = self.lock_segments();
        let start = segments.len();
        segments.resize_with(start + count, || None);
        start..start + count
    }

    /// Fill a slot returned by [`reserve_segments`](Self::reserve_segments).
    pub fn fill_segment(&self, slot: usize, segment: InstructionList) -> Result<(), IrError> {
        let mut segments = self.lock_segments();
        let len = segments.len();
        match segments.get_mut(slot) {
            None => Err(IrError::NoSuchSegment { slot, len }),
            Some(Some(_)) => Err(IrError::SegmentFilled(slot)),
            Some(entry) => {
                *entry = Some(segment);
                Ok(())
            }
        }
    }

    /// Number of segment slots, filled or not.
    pub fn pending_segments(&self) -> usize {
        self.lock_segments().len()
    }

    fn ensure_flat(&self) -> Result<(), IrError> {
        match self.pending_segments() {
            0 => Ok(()),
            n => Err(IrError::PendingSegments(n)),
        }
    }

    /// Merge all segments into this list in slot order, recursively, and
    /// clear the segment list.
    pub fn reduce(&mut self) -> Result<(), IrError> {
        let segments = std::mem::take(self.segments_mut());
        if let Some(slot) = segments.iter().position(Option::is_none) {
            *self.segments_mut() = segments;
            return Err(IrError::UnfilledSegment(slot));
        }
        let count = segments.len();
        for mut segment in segments.into_iter().flatten() {
            segment.reduce()?;
            self.instructions.append(&mut segment.instructions);
        }
        if count > 0 {
            trace!(segments = count, len = self.instructions.len(), "reduced segments");
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Editing
    // ------------------------------------------------------------------

    /// Insert a raw instruction byte at `index` (`len` appends).
    pub fn insert_at(&mut self, index: usize, code: impl Into<u8>) -> Result<(), IrError> {
        let len = self.instructions.len();
        if index > len {
            return Err(IrError::IndexOutOfRange { index, len });
        }
        self.instructions.insert(index, Instruction::new(code));
        Ok(())
    }

    /// Remove the instruction at `index` without losing its labels.
    pub fn remove(&mut self, index: usize, diagnostics: &mut Diagnostics) -> Result<Removal, IrError> {
        self.ensure_flat()?;
        let len = self.instructions.len();
        if index >= len {
            return Err(IrError::IndexOutOfRange { index, len });
        }

        if self.instructions[index].labels.is_empty() {
            self.instructions.remove(index);
            return Ok(Removal::Removed);
        }

        if index + 1 == len {
            let last = &mut self.instructions[index];
            last.code = Opcode::Nop.byte();
            diagnostics.log_warning(
                None,
                ErrorCode::LabelOrphanAvoided,
                format!(
                    "kept last instruction as nop to hold {} label(s)",
                    last.labels.len()
                ),
            );
            return Ok(Removal::Nopped);
        }

        let removed = self.instructions.remove(index);
        let next = &mut self.instructions[index];
        let mut labels = removed.labels;
        labels.append(&mut next.labels);
        next.labels = labels;
        Ok(Removal::Relocated)
    }

    /// Remove every nop, relocating labels. Returns how many were removed.
    ///
    /// The raw count byte after an n-ary opcode is data, never a nop.
    pub fn strip_nops(&mut self, diagnostics: &mut Diagnostics) -> Result<usize, IrError> {
        self.ensure_flat()?;
        let mut removed = 0;
        let mut index = 0;
        let mut raw_follows = false;
        while index < self.instructions.len() {
            let instruction = &self.instructions[index];
            let is_raw = raw_follows;
            raw_follows = !is_raw && instruction.opcode().is_some_and(Opcode::takes_argument_count);
            if is_raw || !instruction.is_nop() {
                index += 1;
                continue;
            }
            match self.remove(index, diagnostics)? {
                Removal::Removed | Removal::Relocated => removed += 1,
                Removal::Nopped => break,
            }
        }
        Ok(removed)
    }

    // ------------------------------------------------------------------
    // Output
    // ------------------------------------------------------------------

    /// Flat instruction bytes. Labels are metadata and not emitted.
    pub fn serialize(&self) -> Result<Vec<u8>, IrError> {
        self.ensure_flat()?;
        Ok(self.instructions.iter().map(|i| i.code).collect())
    }

    /// Every label with the index of the instruction that owns it.
    pub fn label_table(&self) -> Result<Vec<LabelRecord>, IrError> {
        self.ensure_flat()?;
        Ok(self
            .instructions
            .iter()
            .enumerate()
            .flat_map(|(index, instruction)| {
                instruction.labels.iter().map(move |label| LabelRecord {
                    id: label.id.clone(),
                    kind: label.kind,
                    index,
                })
            })
            .collect())
    }

    /// One line per instruction: index, mnemonic and labels.
    pub fn disassemble(&self) -> String {
        let mut out = String::new();
        let mut raw_follows = false;
        for (index, instruction) in self.instructions.iter().enumerate() {
            let text = match instruction.opcode() {
                _ if raw_follows => format!("#{}", instruction.code),
                Some(op) => op.mnemonic().to_string(),
                None if instruction.code >= VARIABLE_BASE => {
                    format!("var{}", instruction.code - VARIABLE_BASE)
                }
                None => format!("0x{:02x}", instruction.code),
            };
            raw_follows = !raw_follows
                && instruction
                    .opcode()
                    .is_some_and(Opcode::takes_argument_count);
            let _ = write!(out, "{index:04}  {text:<10}");
            for label in &instruction.labels {
                let _ = write!(out, " [{label}]");
            }
            out.push('\n');
        }
        out
    }
}
