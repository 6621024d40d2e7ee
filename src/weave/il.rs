//! Label-addressed instruction lists
//!
//! Every instruction carries a [`Label`]. Branch targets, exception handler
//! boundaries and sequence points name labels rather than offsets, so
//! inserting code never shifts them. [`InstructionInjector`] is the cursor
//! used to splice code into an existing body.

use super::model::MethodRef;
use crate::Constant;
use serde::{Deserialize, Serialize};
use std::ops::Range;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Label(pub u32);

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "IL_{:04x}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BranchCond {
    Always,
    /// Taken when the popped reference is null
    IfNull,
    /// Taken when the popped reference is set
    IfNotNull,
}

/// Abstract opcodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Op {
    Nop,
    LoadArg(u16),
    StoreArg(u16),
    LoadLocal(u16),
    StoreLocal(u16),
    LoadNull,
    LoadConst(Constant),
    /// Push an object array holding the constants
    LoadConstArray(Vec<Constant>),
    LoadField(String),
    StoreField(String),
    LoadStaticField(String),
    StoreStaticField(String),
    /// Push a delegate to a static method
    LoadFunction(MethodRef),
    Call(MethodRef),
    NewObj(MethodRef),
    Branch { cond: BranchCond, target: Label },
    /// Exit a protected region
    Leave(Label),
    Dup,
    Pop,
    Throw,
    Return,
}

impl Op {
    /// Label this op transfers control to
    #[inline]
    pub fn branch_target(&self) -> Option<Label> {
        match self {
            Op::Branch { target, .. } | Op::Leave(target) => Some(*target),
            _ => None,
        }
    }

    fn branch_target_mut(&mut self) -> Option<&mut Label> {
        match self {
            Op::Branch { target, .. } | Op::Leave(target) => Some(target),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    pub label: Label,
    pub op: Op,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HandlerKind {
    /// Catch exceptions of the named type
    Catch(String),
    Finally,
}

/// Protected region; `*_end` labels are exclusive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionHandler {
    pub kind: HandlerKind,
    pub try_start: Label,
    pub try_end: Label,
    pub handler_start: Label,
    pub handler_end: Label,
}

impl ExceptionHandler {
    fn labels_mut(&mut self) -> [&mut Label; 4] {
        [
            &mut self.try_start,
            &mut self.try_end,
            &mut self.handler_start,
            &mut self.handler_end,
        ]
    }
}

/// Debug mapping from an instruction to source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequencePoint {
    pub label: Label,
    pub document: String,
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MethodBody {
    pub instructions: Vec<Instruction>,
    /// Local variable types
    #[serde(default)]
    pub locals: Vec<String>,
    #[serde(default)]
    pub exception_handlers: Vec<ExceptionHandler>,
    #[serde(default)]
    pub sequence_points: Vec<SequencePoint>,
    #[serde(default)]
    next_label: u32,
}

impl MethodBody {
    pub fn new() -> Self {
        Self::default()
    }

    /// Body holding `ops`, labelled in order
    pub fn from_ops(ops: impl IntoIterator<Item = Op>) -> Self {
        let mut body = Self::new();
        for op in ops {
            let label = body.allocate_label();
            body.instructions.push(Instruction { label, op });
        }
        body
    }

    /// A label unused by any instruction of this body.
    ///
    /// The counter is seeded from the instruction list once, for bodies
    /// decoded without it; after that allocation is constant time.
    pub fn allocate_label(&mut self) -> Label {
        if self.next_label == 0 {
            self.next_label = self
                .instructions
                .iter()
                .map(|i| i.label.0 + 1)
                .max()
                .unwrap_or(0);
        }
        let label = Label(self.next_label);
        self.next_label += 1;
        label
    }

    /// Add a local, returning its slot
    pub fn add_local(&mut self, type_name: impl Into<String>) -> u16 {
        self.locals.push(type_name.into());
        (self.locals.len() - 1) as u16
    }

    pub fn position_of(&self, label: Label) -> Option<usize> {
        self.instructions.iter().position(|i| i.label == label)
    }

    pub fn ops(&self) -> impl Iterator<Item = &Op> {
        self.instructions.iter().map(|i| &i.op)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Every label referenced from branches, handlers or sequence points
    /// exists in the instruction list
    pub fn labels_resolve(&self) -> bool {
        let exists = |label: &Label| self.position_of(*label).is_some();
        self.ops().filter_map(Op::branch_target).all(|l| exists(&l))
            && self.exception_handlers.iter().all(|h| {
                exists(&h.try_start)
                    && exists(&h.try_end)
                    && exists(&h.handler_start)
                    && exists(&h.handler_end)
            })
            && self.sequence_points.iter().all(|s| exists(&s.label))
    }

    fn is_referenced(&self, label: Label) -> bool {
        self.ops().filter_map(Op::branch_target).any(|l| l == label)
            || self
                .exception_handlers
                .iter()
                .any(|h| [h.try_start, h.try_end, h.handler_start, h.handler_end].contains(&label))
            || self.sequence_points.iter().any(|s| s.label == label)
    }

    fn retarget(&mut self, from: Label, to: Label) {
        for instruction in &mut self.instructions {
            if let Some(target) = instruction.op.branch_target_mut() {
                if *target == from {
                    *target = to;
                }
            }
        }
        for handler in &mut self.exception_handlers {
            for label in handler.labels_mut() {
                if *label == from {
                    *label = to;
                }
            }
        }
        for point in &mut self.sequence_points {
            if point.label == from {
                point.label = to;
            }
        }
    }
}

/// Insertion cursor into a method body.
///
/// # Examples
///
/// ```rust
/// use autodi::weave::il::{InstructionInjector, MethodBody, Op};
///
/// let mut body = MethodBody::from_ops([Op::Nop, Op::Return]);
/// let ret = body.instructions[1].label;
///
/// let mut injector = InstructionInjector::new(&mut body);
/// injector.seek_start();
/// injector.insert(Op::LoadNull);
/// injector.insert(Op::Pop);
///
/// assert_eq!(body.len(), 4);
/// assert_eq!(body.position_of(ret), Some(3));
/// ```
pub struct InstructionInjector<'b> {
    body: &'b mut MethodBody,
    cursor: usize,
}

impl<'b> InstructionInjector<'b> {
    /// Cursor at the start of `body`
    pub fn new(body: &'b mut MethodBody) -> Self {
        Self { body, cursor: 0 }
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.cursor
    }

    #[inline]
    pub fn seek_start(&mut self) {
        self.cursor = 0;
    }

    #[inline]
    pub fn seek_end(&mut self) {
        self.cursor = self.body.instructions.len();
    }

    /// Move the cursor after the instruction labelled `label`; `false` if
    /// there is none
    pub fn seek_after(&mut self, label: Label) -> bool {
        match self.body.position_of(label) {
            Some(pos) => {
                self.cursor = pos + 1;
                true
            }
            None => false,
        }
    }

    /// Reserve a label to place later with [`insert_labeled`](Self::insert_labeled)
    #[inline]
    pub fn label(&mut self) -> Label {
        self.body.allocate_label()
    }

    /// Insert `op` at the cursor and advance past it
    pub fn insert(&mut self, op: Op) -> Label {
        let label = self.body.allocate_label();
        self.insert_labeled(label, op);
        label
    }

    /// Insert `op` under a reserved label
    pub fn insert_labeled(&mut self, label: Label, op: Op) {
        self.body
            .instructions
            .insert(self.cursor, Instruction { label, op });
        self.cursor += 1;
    }

    pub fn insert_all(&mut self, ops: impl IntoIterator<Item = Op>) {
        for op in ops {
            self.insert(op);
        }
    }

    /// Remove instructions in `range`.
    ///
    /// References to removed labels move to the instruction that follows
    /// the range. When the range ends the body and something still refers
    /// into it, a `Nop` is appended to carry those references.
    pub fn remove_range(&mut self, range: Range<usize>) -> Vec<Instruction> {
        let removed: Vec<Instruction> = self.body.instructions.drain(range.clone()).collect();

        let following = self.body.instructions.get(range.start).map(|i| i.label);
        let next = match following {
            Some(label) => Some(label),
            None if removed.iter().any(|i| self.body.is_referenced(i.label)) => {
                let label = self.body.allocate_label();
                self.body.instructions.push(Instruction { label, op: Op::Nop });
                Some(label)
            }
            None => None,
        };
        if let Some(next) = next {
            for instruction in &removed {
                self.body.retarget(instruction.label, next);
            }
        }

        if self.cursor >= range.end {
            self.cursor -= removed.len();
        } else if self.cursor > range.start {
            self.cursor = range.start;
        }
        removed
    }

    /// Add an exception handler to the body
    pub fn add_handler(&mut self, handler: ExceptionHandler) {
        self.body.exception_handlers.push(handler);
    }

    pub fn add_local(&mut self, type_name: impl Into<String>) -> u16 {
        self.body.add_local(type_name)
    }

    #[inline]
    pub fn body(&self) -> &MethodBody {
        self.body
    }
}
