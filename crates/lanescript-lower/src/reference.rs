//! Reference evaluator for lowered trees.
//!
//! A direct tree walker with one value per variable (a single lane). It
//! only understands the primitive forms the transform stage produces, so
//! it doubles as a check that lowering left nothing behind, and gives the
//! tests a semantics to compare a lowered tree against.
//!
//! Values are four components wide. Reading a variable of width `w`
//! repeats its components (`v[k % w]`), the same broadcast rule the
//! execution kernels use.
//!
//! Jumps are resolved structurally: a statement list that receives a jump
//! looks for the label among its own statements and resumes after it,
//! otherwise it hands the jump to its parent.

use lanescript_ast::{
    Ast, Builtin, Callee, NodeId, NodeKind, Operand, Operator, Script, VariableId, Variables,
};

use crate::error::EvalError;

/// Result alias for evaluation.
pub type EvalResult<T> = std::result::Result<T, EvalError>;

/// A four-component value.
pub type Value = [f32; 4];

/// Default step budget.
pub const DEFAULT_MAX_STEPS: usize = 1_000_000;

/// Variable storage for one evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct Memory {
    slots: Vec<Value>,
    widths: Vec<u8>,
}

impl Memory {
    /// Zeroed storage for `variables`, with interned constants filled in.
    pub fn new(variables: &Variables) -> Self {
        let mut slots = vec![[0.0; 4]; variables.len()];
        let mut widths = vec![1; variables.len()];
        for variable in variables.iter() {
            widths[variable.id.index()] = variable.vector_size.clamp(1, 4);
            if let Some(value) = variable.value {
                slots[variable.id.index()] = [value; 4];
            }
        }
        Self { slots, widths }
    }

    /// Value of a variable, components repeated up to four.
    pub fn get(&self, id: VariableId) -> Value {
        let raw = self.slots[id.index()];
        let width = usize::from(self.widths[id.index()]);
        std::array::from_fn(|k| raw[k % width])
    }

    /// First component of a variable.
    pub fn scalar(&self, id: VariableId) -> f32 {
        self.slots[id.index()][0]
    }

    /// Overwrite a variable; components past its width are ignored on read.
    pub fn set(&mut self, id: VariableId, value: Value) {
        self.slots[id.index()] = value;
    }

    fn set_component(&mut self, id: VariableId, component: usize, value: f32) {
        self.slots[id.index()][component] = value;
    }

    fn width(&self, id: VariableId) -> usize {
        usize::from(self.widths[id.index()])
    }
}

enum Flow {
    Next,
    Jump(String),
}

/// Tree-walking evaluator over a lowered [`Ast`].
pub struct Evaluator<'a> {
    ast: &'a Ast,
    variables: &'a Variables,
    max_steps: usize,
    steps: usize,
}

impl<'a> Evaluator<'a> {
    pub fn new(ast: &'a Ast, variables: &'a Variables) -> Self {
        Self {
            ast,
            variables,
            max_steps: DEFAULT_MAX_STEPS,
            steps: 0,
        }
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Run the whole script once against `memory`.
    pub fn run(&mut self, memory: &mut Memory) -> EvalResult<()> {
        self.steps = 0;
        match self.exec_list(self.ast.children(self.ast.root()), memory)? {
            Flow::Next => Ok(()),
            Flow::Jump(label) => Err(EvalError::UnresolvedLabel(label)),
        }
    }

    fn tick(&mut self) -> EvalResult<()> {
        self.steps += 1;
        if self.steps > self.max_steps {
            return Err(EvalError::StepLimit(self.max_steps));
        }
        Ok(())
    }

    fn exec_list(&mut self, list: &[NodeId], memory: &mut Memory) -> EvalResult<Flow> {
        let mut pc = 0;
        while pc < list.len() {
            match self.exec(list[pc], memory)? {
                Flow::Next => pc += 1,
                Flow::Jump(label) => {
                    let target = list.iter().position(|&n| {
                        self.ast.kind(n) == NodeKind::Label && self.ast.node(n).identifier == label
                    });
                    match target {
                        Some(target) => pc = target + 1,
                        None => return Ok(Flow::Jump(label)),
                    }
                }
            }
        }
        Ok(Flow::Next)
    }

    fn exec_dependencies(&mut self, id: NodeId, memory: &mut Memory) -> EvalResult<Flow> {
        self.exec_list(self.ast.node(id).depends_on(), memory)
    }

    fn exec(&mut self, id: NodeId, memory: &mut Memory) -> EvalResult<Flow> {
        self.tick()?;
        if let Flow::Jump(label) = self.exec_dependencies(id, memory)? {
            return Ok(Flow::Jump(label));
        }

        let node = self.ast.node(id);
        match node.kind {
            NodeKind::Assignment => {
                let value = self.eval_sequence(id, memory)?;
                self.assign(id, value, memory)?;
                Ok(Flow::Next)
            }
            NodeKind::IfThenElse => {
                let children = node.children();
                let condition = *children.first().ok_or(EvalError::MalformedSequence(id))?;
                let taken = if truthy(self.eval_sequence(condition, memory)?) {
                    children.get(1)
                } else {
                    children.get(2)
                };
                match taken {
                    Some(&branch) => self.exec_list(self.ast.children(branch), memory),
                    None => Ok(Flow::Next),
                }
            }
            NodeKind::While => {
                let [condition, body] = node.children() else {
                    return Err(EvalError::MalformedSequence(id));
                };
                while truthy(self.eval_sequence(*condition, memory)?) {
                    self.tick()?;
                    if let Flow::Jump(label) = self.exec_list(self.ast.children(*body), memory)? {
                        return Ok(Flow::Jump(label));
                    }
                }
                Ok(Flow::Next)
            }
            NodeKind::Block | NodeKind::Then | NodeKind::Else => {
                self.exec_list(node.children(), memory)
            }
            NodeKind::Label | NodeKind::InlineFunction => Ok(Flow::Next),
            NodeKind::Jump => Ok(Flow::Jump(node.identifier.clone())),
            NodeKind::Parameter(_) | NodeKind::Compound | NodeKind::Call(_) => {
                self.eval_operand(id, memory)?;
                Ok(Flow::Next)
            }
            NodeKind::Root
            | NodeKind::Operation(_)
            | NodeKind::Return
            | NodeKind::Condition
            | NodeKind::For
            | NodeKind::Switch
            | NodeKind::Case
            | NodeKind::Default
            | NodeKind::Index
            | NodeKind::IndexWrite(_) => Err(EvalError::NotLowered {
                node: id,
                kind: node.kind.name(),
            }),
        }
    }

    fn assign(&mut self, id: NodeId, value: Value, memory: &mut Memory) -> EvalResult<()> {
        let node = self.ast.node(id);
        let variable = self
            .variables
            .by_name(&node.identifier)
            .ok_or(EvalError::UnknownVariable(id))?;

        match node.indexers() {
            [] => {
                let mut slot = memory.get(variable.id);
                let width = memory.width(variable.id);
                slot[..width].copy_from_slice(&value[..width]);
                memory.set(variable.id, slot);
            }
            [indexer] => match self.ast.kind(*indexer) {
                NodeKind::IndexWrite(component) => {
                    memory.set_component(variable.id, component.offset(), value[0]);
                }
                kind => {
                    return Err(EvalError::NotLowered {
                        node: *indexer,
                        kind: kind.name(),
                    })
                }
            },
            [_, second, ..] => {
                return Err(EvalError::NotLowered {
                    node: *second,
                    kind: self.ast.kind(*second).name(),
                })
            }
        }
        Ok(())
    }

    /// Evaluate the flat sequence held in `id`'s children.
    fn eval_sequence(&mut self, id: NodeId, memory: &mut Memory) -> EvalResult<Value> {
        let children = self.ast.children(id);
        let (unary, rest) = match children.first().map(|&c| self.ast.kind(c)) {
            Some(NodeKind::Operation(op)) if op.is_unary_prefix() => (Some(op), &children[1..]),
            _ => (None, children),
        };
        let (&first, tail) = rest.split_first().ok_or(EvalError::MalformedSequence(id))?;
        if tail.len() % 2 != 0 {
            return Err(EvalError::MalformedSequence(id));
        }

        let mut acc = self.eval_operand(first, memory)?;
        match unary {
            Some(Operator::Subtract) => acc = acc.map(|v| -v),
            Some(Operator::Not) => acc = acc.map(|v| bool_value(v == 0.0)),
            _ => {}
        }
        for pair in tail.chunks_exact(2) {
            let op = self
                .ast
                .node(pair[0])
                .operator()
                .ok_or(EvalError::MalformedSequence(id))?;
            let rhs = self.eval_operand(pair[1], memory)?;
            acc = apply(op, acc, rhs).ok_or(EvalError::MalformedSequence(id))?;
        }
        Ok(acc)
    }

    fn eval_operand(&mut self, id: NodeId, memory: &mut Memory) -> EvalResult<Value> {
        self.tick()?;
        let node = self.ast.node(id);
        if let Some(&indexer) = node.indexers().first() {
            return Err(EvalError::NotLowered {
                node: indexer,
                kind: self.ast.kind(indexer).name(),
            });
        }
        match node.kind {
            NodeKind::Parameter(Operand::Variable(variable)) => Ok(memory.get(variable)),
            NodeKind::Parameter(Operand::Constant(value)) => Ok([value; 4]),
            NodeKind::Compound => {
                if let Flow::Jump(label) = self.exec_dependencies(id, memory)? {
                    return Err(EvalError::UnresolvedLabel(label));
                }
                self.eval_sequence(id, memory)
            }
            NodeKind::Call(Callee::Builtin(builtin)) => self.eval_builtin(id, builtin, memory),
            kind => Err(EvalError::NotLowered {
                node: id,
                kind: kind.name(),
            }),
        }
    }

    fn eval_builtin(
        &mut self,
        id: NodeId,
        builtin: Builtin,
        memory: &mut Memory,
    ) -> EvalResult<Value> {
        let arguments = self.ast.children(id);
        if let Some(component) = builtin.component() {
            let [argument] = arguments else {
                return Err(EvalError::MalformedSequence(id));
            };
            let value = self.eval_operand(*argument, memory)?;
            return Ok([value[component.offset()]; 4]);
        }

        let op = builtin
            .folded_operator()
            .ok_or(EvalError::MalformedSequence(id))?;
        let (&first, rest) = arguments
            .split_first()
            .ok_or(EvalError::MalformedSequence(id))?;
        let mut acc = self.eval_operand(first, memory)?;
        for &argument in rest {
            let rhs = self.eval_operand(argument, memory)?;
            acc = apply(op, acc, rhs).ok_or(EvalError::MalformedSequence(id))?;
        }
        Ok(acc)
    }
}

/// Run a lowered script once from zeroed memory.
pub fn evaluate(script: &Script) -> EvalResult<Memory> {
    let mut memory = Memory::new(&script.variables);
    Evaluator::new(&script.ast, &script.variables).run(&mut memory)?;
    Ok(memory)
}

fn truthy(value: Value) -> bool {
    value[0] != 0.0
}

fn bool_value(b: bool) -> f32 {
    if b {
        1.0
    } else {
        0.0
    }
}

/// Component-wise binary operator; `None` for unary-only operators.
fn apply(op: Operator, lhs: Value, rhs: Value) -> Option<Value> {
    let f: fn(f32, f32) -> f32 = match op {
        Operator::Add => |a, b| a + b,
        Operator::Subtract => |a, b| a - b,
        Operator::Multiply => |a, b| a * b,
        Operator::Divide => |a, b| a / b,
        Operator::Equals => |a, b| bool_value(a == b),
        Operator::NotEquals => |a, b| bool_value(a != b),
        Operator::Greater => |a, b| bool_value(a > b),
        Operator::GreaterEquals => |a, b| bool_value(a >= b),
        Operator::Smaller => |a, b| bool_value(a < b),
        Operator::SmallerEquals => |a, b| bool_value(a <= b),
        Operator::And => |a, b| bool_value(a != 0.0 && b != 0.0),
        Operator::Or => |a, b| bool_value(a != 0.0 || b != 0.0),
        Operator::Xor => |a, b| bool_value((a != 0.0) != (b != 0.0)),
        Operator::Not => return None,
    };
    Some(std::array::from_fn(|k| f(lhs[k], rhs[k])))
}
