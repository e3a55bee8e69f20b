//! Lowered AST → instruction list.
//!
//! Each top-level statement is emitted into its own segment, either on the
//! rayon pool or serially, and the segments are reduced in source order.
//! Both paths produce identical bytes.
//!
//! Literals without a dedicated opcode are interned into the variable table
//! before emission starts, so emitting only needs shared access.
//!
//! Control flow emits jump and offset placeholder pairs with labels named
//! after the node id (`if_12_else`, `while_7_start`). Jump targets are nops
//! carrying a `Label`; [`InstructionList::strip_nops`] later moves those
//! labels onto the instruction that follows.

use lanescript_ast::{Ast, Callee, NodeId, NodeKind, Operand, Script, Variables};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::EmitError;
use crate::label::JumpLabel;
use crate::list::InstructionList;
use crate::opcode::{variable_byte, Opcode, MAX_VARIABLES};

/// Emission settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmitOptions {
    /// Emit top-level statements on the rayon pool.
    pub parallel: bool,
}

impl Default for EmitOptions {
    fn default() -> Self {
        Self { parallel: true }
    }
}

/// Intern every literal that has no dedicated opcode. Returns the number
/// of constant slots added.
pub fn intern_constants(ast: &Ast, variables: &mut Variables) -> usize {
    let before = variables.len();
    for id in ast.descendants(ast.root()) {
        if let NodeKind::Parameter(Operand::Constant(value)) = ast.kind(id) {
            if Opcode::common_constant(value).is_none() {
                variables.intern_constant(value);
            }
        }
    }
    variables.len() - before
}

/// Emit the whole script, ending with `halt`.
///
/// The result is reduced; nops are left in place.
#[instrument(skip_all, name = "emit")]
pub fn emit(script: &mut Script, options: &EmitOptions) -> Result<InstructionList, EmitError> {
    let interned = intern_constants(&script.ast, &mut script.variables);
    if script.variables.len() > MAX_VARIABLES {
        return Err(EmitError::TooManyVariables {
            count: script.variables.len(),
            max: MAX_VARIABLES,
        });
    }

    let emitter = Emitter::new(&script.ast, &script.variables);
    let statements = script.ast.children(script.ast.root());
    let mut list = InstructionList::new();
    let slots = list.reserve_segments(statements.len());

    let fill = |(offset, &statement): (usize, &NodeId)| -> Result<(), EmitError> {
        let segment = emitter.statement(statement)?;
        list.fill_segment(slots.start + offset, segment)?;
        Ok(())
    };
    if options.parallel {
        statements.par_iter().enumerate().try_for_each(fill)?;
    } else {
        statements.iter().enumerate().try_for_each(fill)?;
    }

    list.reduce()?;
    list.push(Opcode::Halt);
    debug!(
        statements = statements.len(),
        instructions = list.len(),
        interned,
        parallel = options.parallel,
        "emitted"
    );
    Ok(list)
}

/// Shared-access emitter over one lowered tree.
pub struct Emitter<'a> {
    ast: &'a Ast,
    variables: &'a Variables,
}

impl<'a> Emitter<'a> {
    pub fn new(ast: &'a Ast, variables: &'a Variables) -> Self {
        Self { ast, variables }
    }

    /// Emit one statement (and its dependencies) into a fresh list.
    pub fn statement(&self, id: NodeId) -> Result<InstructionList, EmitError> {
        let mut out = InstructionList::new();
        self.emit_statement(id, &mut out)?;
        Ok(out)
    }

    fn emit_statement(&self, id: NodeId, out: &mut InstructionList) -> Result<(), EmitError> {
        self.emit_dependencies(id, out)?;
        match self.ast.kind(id) {
            NodeKind::Assignment => self.emit_assignment(id, out),
            NodeKind::IfThenElse => self.emit_if(id, out),
            NodeKind::While => self.emit_while(id, out),
            NodeKind::Block | NodeKind::Then | NodeKind::Else => self.emit_statements(id, out),
            NodeKind::Label => {
                out.push_labeled(Opcode::Nop, JumpLabel::target(self.identifier(id)));
                Ok(())
            }
            NodeKind::Jump => {
                self.emit_jump(Opcode::Jump, self.identifier(id), out);
                Ok(())
            }
            kind => Err(self.not_lowered(id, kind)),
        }
    }

    fn emit_statements(&self, id: NodeId, out: &mut InstructionList) -> Result<(), EmitError> {
        for &child in self.ast.children(id) {
            self.emit_statement(child, out)?;
        }
        Ok(())
    }

    fn emit_dependencies(&self, id: NodeId, out: &mut InstructionList) -> Result<(), EmitError> {
        for &dependency in self.ast.node(id).depends_on() {
            self.emit_statement(dependency, out)?;
        }
        Ok(())
    }

    /// Dependencies of expression nodes under `id` run before the
    /// instruction that reads the expression.
    fn hoist_dependencies(&self, id: NodeId, out: &mut InstructionList) -> Result<(), EmitError> {
        for &child in self.ast.children(id) {
            self.emit_dependencies(child, out)?;
            self.hoist_dependencies(child, out)?;
        }
        Ok(())
    }

    fn emit_assignment(&self, id: NodeId, out: &mut InstructionList) -> Result<(), EmitError> {
        let node = self.ast.node(id);
        self.hoist_dependencies(id, out)?;

        out.push(Opcode::Assign);
        out.push(self.variable(id, &node.identifier)?);
        match node.indexers() {
            [] => {}
            [indexer] => match self.ast.kind(*indexer) {
                NodeKind::IndexWrite(component) => out.push(Opcode::write(component)),
                kind => return Err(self.not_lowered(*indexer, kind)),
            },
            _ => {
                return Err(self.malformed(id, "more than one write indexer"));
            }
        }
        self.emit_sequence(id, out)?;
        out.push(Opcode::EndExpr);
        Ok(())
    }

    /// `[condition, then, else?]`
    fn emit_if(&self, id: NodeId, out: &mut InstructionList) -> Result<(), EmitError> {
        let (condition, then, otherwise) = match self.ast.children(id) {
            [c, t] => (*c, *t, None),
            [c, t, e] => (*c, *t, Some(*e)),
            _ => return Err(self.malformed(id, "expected condition, then and optional else")),
        };
        self.expect(condition, NodeKind::Condition)?;

        let end = format!("if_{}_end", id.index());
        let skip = match otherwise {
            Some(_) => format!("if_{}_else", id.index()),
            None => end.clone(),
        };

        self.emit_condition(condition, skip.clone(), out)?;
        self.emit_statement(then, out)?;
        if let Some(otherwise) = otherwise {
            self.emit_jump(Opcode::Jump, end.clone(), out);
            out.push_labeled(Opcode::Nop, JumpLabel::target(skip));
            self.emit_statement(otherwise, out)?;
        }
        out.push_labeled(Opcode::Nop, JumpLabel::target(end));
        Ok(())
    }

    /// `[condition, body]`; dependencies already ran once before the loop.
    fn emit_while(&self, id: NodeId, out: &mut InstructionList) -> Result<(), EmitError> {
        let [condition, body] = self.ast.children(id) else {
            return Err(self.malformed(id, "expected condition and body"));
        };
        self.expect(*condition, NodeKind::Condition)?;

        let start = format!("while_{}_start", id.index());
        let end = format!("while_{}_end", id.index());

        out.push_labeled(Opcode::Nop, JumpLabel::target(start.clone()));
        self.emit_condition(*condition, end.clone(), out)?;
        self.emit_statement(*body, out)?;
        self.emit_jump(Opcode::Jump, start, out);
        out.push_labeled(Opcode::Nop, JumpLabel::target(end));
        Ok(())
    }

    /// `branch offset <expr> end_expr`, jumping to `target` when false.
    fn emit_condition(
        &self,
        condition: NodeId,
        target: String,
        out: &mut InstructionList,
    ) -> Result<(), EmitError> {
        self.emit_dependencies(condition, out)?;
        self.hoist_dependencies(condition, out)?;
        self.emit_jump(Opcode::Branch, target, out);
        self.emit_sequence(condition, out)?;
        out.push(Opcode::EndExpr);
        Ok(())
    }

    fn emit_jump(&self, opcode: Opcode, target: String, out: &mut InstructionList) {
        out.push_labeled(opcode, JumpLabel::jump(target.clone()));
        out.push_labeled(Opcode::Offset, JumpLabel::offset(target));
    }

    /// Children of `id` as a flat expression sequence.
    fn emit_sequence(&self, id: NodeId, out: &mut InstructionList) -> Result<(), EmitError> {
        if self.ast.children(id).is_empty() {
            return Err(self.malformed(id, "empty expression"));
        }
        for &item in self.ast.children(id) {
            match self.ast.kind(item) {
                NodeKind::Operation(op) => out.push(Opcode::from_operator(op)),
                _ => self.emit_operand(item, out)?,
            }
        }
        Ok(())
    }

    fn emit_operand(&self, id: NodeId, out: &mut InstructionList) -> Result<(), EmitError> {
        let node = self.ast.node(id);
        if let Some(&indexer) = node.indexers().first() {
            return Err(self.not_lowered(indexer, self.ast.kind(indexer)));
        }
        match node.kind {
            NodeKind::Parameter(Operand::Variable(variable)) => {
                out.push(self.slot_byte(variable.index())?);
            }
            NodeKind::Parameter(Operand::Constant(value)) => match Opcode::common_constant(value) {
                Some(op) => out.push(op),
                None => {
                    let slot = self.variables.constant_slot(value).ok_or_else(|| {
                        EmitError::UnknownVariable {
                            node: id,
                            name: value.to_string(),
                        }
                    })?;
                    out.push(self.slot_byte(slot.index())?);
                }
            },
            NodeKind::Compound => {
                out.push(Opcode::Open);
                self.emit_sequence(id, out)?;
                out.push(Opcode::Close);
            }
            NodeKind::Call(Callee::Builtin(builtin)) => {
                let opcode = Opcode::from_builtin(builtin);
                out.push(opcode);
                let arguments = self.ast.children(id);
                if opcode.takes_argument_count() {
                    let count = u8::try_from(arguments.len())
                        .map_err(|_| self.malformed(id, "too many call arguments"))?;
                    out.push(count);
                } else if arguments.len() != 1 {
                    return Err(self.malformed(id, "index read takes one argument"));
                }
                for &argument in arguments {
                    self.emit_operand(argument, out)?;
                }
            }
            kind => return Err(self.not_lowered(id, kind)),
        }
        Ok(())
    }

    fn variable(&self, id: NodeId, name: &str) -> Result<u8, EmitError> {
        let variable = self
            .variables
            .by_name(name)
            .ok_or_else(|| EmitError::UnknownVariable {
                node: id,
                name: name.to_string(),
            })?;
        self.slot_byte(variable.id.index())
    }

    fn slot_byte(&self, index: usize) -> Result<u8, EmitError> {
        variable_byte(index).ok_or(EmitError::TooManyVariables {
            count: index + 1,
            max: MAX_VARIABLES,
        })
    }

    fn identifier(&self, id: NodeId) -> String {
        self.ast.node(id).identifier.clone()
    }

    fn expect(&self, id: NodeId, kind: NodeKind) -> Result<(), EmitError> {
        if self.ast.kind(id) == kind {
            Ok(())
        } else {
            Err(self.malformed(id, format!("expected {}", kind.name())))
        }
    }

    fn not_lowered(&self, node: NodeId, kind: NodeKind) -> EmitError {
        EmitError::NotLowered {
            node,
            kind: kind.name(),
        }
    }

    fn malformed(&self, node: NodeId, message: impl Into<String>) -> EmitError {
        EmitError::Malformed {
            node,
            kind: self.ast.kind(node).name(),
            message: message.into(),
        }
    }
}
