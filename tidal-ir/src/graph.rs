//! The arena owning every op, block, and value of a program.
//!
//! Nodes are addressed by plain index newtypes. The def-use graph is cyclic,
//! so edges are kept as index pairs and every value carries an explicit use
//! list; `replace_all_uses` and friends rewrite those lists instead of
//! chasing pointers.
use crate::ops::{OpKind, Port};
use crate::types::Type;
use smallvec::SmallVec;
use tidal_utils::Id;

macro_rules! def_idx {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord,
        )]
        pub struct $name(u32);

        impl $name {
            pub(crate) fn new(idx: usize) -> Self {
                $name(idx as u32)
            }

            pub fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

def_idx!(
    /// Handle to an operation.
    OpIdx
);
def_idx!(
    /// Handle to a block.
    BlockIdx
);
def_idx!(
    /// Handle to an SSA value (block argument or op result).
    ValueIdx
);

/// One reader of a value: an op and the operand slot it reads through.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Use {
    pub op: OpIdx,
    pub operand: usize,
}

/// An ordered list of blocks owned by an op.
#[derive(Clone, Debug, Default)]
pub struct Region {
    pub blocks: Vec<BlockIdx>,
}

#[derive(Debug)]
struct OpData {
    kind: OpKind,
    operands: SmallVec<[ValueIdx; 2]>,
    results: SmallVec<[ValueIdx; 1]>,
    regions: SmallVec<[Region; 1]>,
    parent: Option<BlockIdx>,
    dead: bool,
}

#[derive(Debug, Default)]
struct BlockData {
    args: Vec<ValueIdx>,
    ops: Vec<OpIdx>,
    parent: Option<OpIdx>,
}

#[derive(Debug)]
struct ValueData {
    ty: Type,
    /// The op producing this value; `None` for block arguments.
    defining: Option<OpIdx>,
    uses: Vec<Use>,
}

/// The arena. All structural mutation goes through the methods here (or the
/// [`crate::Builder`] wrapper, which adds insertion-point management).
#[derive(Default)]
pub struct Graph {
    ops: Vec<OpData>,
    blocks: Vec<BlockData>,
    values: Vec<ValueData>,
    top: Vec<OpIdx>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    // ===================== creation =====================

    /// Create a detached op. Results are allocated from `result_tys`; uses
    /// of the operands are registered immediately.
    pub fn create_op(
        &mut self,
        kind: OpKind,
        operands: Vec<ValueIdx>,
        result_tys: Vec<Type>,
    ) -> OpIdx {
        let op = OpIdx::new(self.ops.len());
        let mut results = SmallVec::new();
        for ty in result_tys {
            let value = ValueIdx::new(self.values.len());
            self.values.push(ValueData {
                ty,
                defining: Some(op),
                uses: Vec::new(),
            });
            results.push(value);
        }
        for (slot, value) in operands.iter().enumerate() {
            self.values[value.index()].uses.push(Use { op, operand: slot });
        }
        self.ops.push(OpData {
            kind,
            operands: operands.into(),
            results,
            regions: SmallVec::new(),
            parent: None,
            dead: false,
        });
        op
    }

    /// Create a detached, empty block.
    pub fn add_block(&mut self) -> BlockIdx {
        let block = BlockIdx::new(self.blocks.len());
        self.blocks.push(BlockData::default());
        block
    }

    /// Append an argument of the given type to a block.
    pub fn append_block_arg(
        &mut self,
        block: BlockIdx,
        ty: Type,
    ) -> ValueIdx {
        let value = ValueIdx::new(self.values.len());
        self.values.push(ValueData {
            ty,
            defining: None,
            uses: Vec::new(),
        });
        self.blocks[block.index()].args.push(value);
        value
    }

    /// Attach a region made of the given blocks to an op.
    pub fn attach_region(&mut self, op: OpIdx, blocks: Vec<BlockIdx>) {
        for block in &blocks {
            self.blocks[block.index()].parent = Some(op);
        }
        self.ops[op.index()].regions.push(Region { blocks });
    }

    /// Create a function-like op holding one entry block with an argument
    /// per edge type, and register it at the top level.
    pub fn add_func<S: Into<Id>>(
        &mut self,
        name: S,
        arg_tys: Vec<Type>,
        result_tys: Vec<Type>,
    ) -> OpIdx {
        let block = self.add_block();
        for ty in arg_tys {
            self.append_block_arg(block, ty);
        }
        let func = self.create_op(
            OpKind::Func {
                name: name.into(),
                results: result_tys,
            },
            Vec::new(),
            Vec::new(),
        );
        self.attach_region(func, vec![block]);
        self.top.push(func);
        func
    }

    /// Create a detached circuit op with an empty body block.
    pub fn create_circuit<S: Into<Id>>(&mut self, name: S) -> OpIdx {
        let block = self.add_block();
        let circuit = self.create_op(
            OpKind::Circuit { name: name.into() },
            Vec::new(),
            Vec::new(),
        );
        self.attach_region(circuit, vec![block]);
        circuit
    }

    /// Create a detached module op; its entry block receives one argument
    /// per port.
    pub fn create_module(&mut self, name: Id, ports: Vec<Port>) -> OpIdx {
        let block = self.add_block();
        for port in &ports {
            self.append_block_arg(block, port.ty.clone());
        }
        let module =
            self.create_op(OpKind::Module { name, ports }, Vec::new(), Vec::new());
        self.attach_region(module, vec![block]);
        module
    }

    // ===================== placement =====================

    /// Append a detached op to the end of a block.
    pub fn insert_op_at_end(&mut self, op: OpIdx, block: BlockIdx) {
        debug_assert!(self.ops[op.index()].parent.is_none());
        self.ops[op.index()].parent = Some(block);
        self.blocks[block.index()].ops.push(op);
    }

    /// Insert a detached op immediately before another op in its block.
    pub fn insert_op_before(&mut self, op: OpIdx, before: OpIdx) {
        debug_assert!(self.ops[op.index()].parent.is_none());
        let block = self.ops[before.index()]
            .parent
            .expect("insertion anchor must be in a block");
        let pos = self.op_position(block, before);
        self.ops[op.index()].parent = Some(block);
        self.blocks[block.index()].ops.insert(pos, op);
    }

    fn op_position(&self, block: BlockIdx, op: OpIdx) -> usize {
        self.blocks[block.index()]
            .ops
            .iter()
            .position(|&o| o == op)
            .expect("op not found in its parent block")
    }

    /// Move every op of `from` to the end of `to`, preserving order.
    pub fn splice_block_ops(&mut self, from: BlockIdx, to: BlockIdx) {
        let moved = std::mem::take(&mut self.blocks[from.index()].ops);
        for op in &moved {
            self.ops[op.index()].parent = Some(to);
        }
        self.blocks[to.index()].ops.extend(moved);
    }

    /// Move all blocks of `src`'s first region to the end of `dst`'s first
    /// region (region inlining).
    pub fn transfer_region_blocks(&mut self, src: OpIdx, dst: OpIdx) {
        let blocks =
            std::mem::take(&mut self.ops[src.index()].regions[0].blocks);
        for block in &blocks {
            self.blocks[block.index()].parent = Some(dst);
        }
        self.ops[dst.index()].regions[0].blocks.extend(blocks);
    }

    /// Register a detached op (circuit) at the top level.
    pub fn push_top(&mut self, op: OpIdx) {
        self.top.push(op);
    }

    // ===================== erasure =====================

    /// Erase an op: detach it from its block, drop its operand uses, and
    /// mark it dead. Its results must no longer have any uses.
    pub fn erase_op(&mut self, op: OpIdx) {
        debug_assert!(
            self.ops[op.index()]
                .results
                .iter()
                .all(|r| self.values[r.index()].uses.is_empty()),
            "erasing an op whose results still have uses"
        );
        if let Some(block) = self.ops[op.index()].parent {
            let pos = self.op_position(block, op);
            self.blocks[block.index()].ops.remove(pos);
        }
        let operands: Vec<_> =
            self.ops[op.index()].operands.iter().copied().collect();
        for value in operands {
            self.values[value.index()].uses.retain(|u| u.op != op);
        }
        let data = &mut self.ops[op.index()];
        data.operands.clear();
        data.parent = None;
        data.dead = true;
    }

    /// Erase an empty block. Its arguments must no longer have any uses.
    pub fn erase_block(&mut self, block: BlockIdx) {
        debug_assert!(self.blocks[block.index()].ops.is_empty());
        debug_assert!(
            self.blocks[block.index()]
                .args
                .iter()
                .all(|a| self.values[a.index()].uses.is_empty()),
            "erasing a block whose arguments still have uses"
        );
        if let Some(op) = self.blocks[block.index()].parent {
            for region in &mut self.ops[op.index()].regions {
                region.blocks.retain(|&b| b != block);
            }
        }
        self.blocks[block.index()].parent = None;
    }

    /// Remove a top-level op from the top list and mark it dead. Its
    /// regions must already be empty.
    pub fn erase_top(&mut self, op: OpIdx) {
        debug_assert!(self.ops[op.index()]
            .regions
            .iter()
            .all(|r| r.blocks.is_empty()));
        self.top.retain(|&o| o != op);
        self.ops[op.index()].dead = true;
    }

    // ===================== rewrites =====================

    /// Redirect every use of `old` to `new`.
    pub fn replace_all_uses(&mut self, old: ValueIdx, new: ValueIdx) {
        if old == new {
            return;
        }
        let uses = std::mem::take(&mut self.values[old.index()].uses);
        for u in &uses {
            self.ops[u.op.index()].operands[u.operand] = new;
        }
        self.values[new.index()].uses.extend(uses);
    }

    /// Redirect the uses of `old` whose owning op satisfies `pred`.
    pub fn replace_uses_where<F>(
        &mut self,
        old: ValueIdx,
        new: ValueIdx,
        pred: F,
    ) where
        F: Fn(&Graph, OpIdx) -> bool,
    {
        if old == new {
            return;
        }
        let uses = std::mem::take(&mut self.values[old.index()].uses);
        let mut kept = Vec::new();
        let mut moved = Vec::new();
        for u in uses {
            if pred(self, u.op) {
                moved.push(u);
            } else {
                kept.push(u);
            }
        }
        for u in &moved {
            self.ops[u.op.index()].operands[u.operand] = new;
        }
        self.values[old.index()].uses = kept;
        self.values[new.index()].uses.extend(moved);
    }

    // ===================== accessors =====================

    pub fn kind(&self, op: OpIdx) -> &OpKind {
        &self.ops[op.index()].kind
    }

    pub fn operands(&self, op: OpIdx) -> &[ValueIdx] {
        &self.ops[op.index()].operands
    }

    pub fn operand(&self, op: OpIdx, index: usize) -> ValueIdx {
        self.ops[op.index()].operands[index]
    }

    pub fn results(&self, op: OpIdx) -> &[ValueIdx] {
        &self.ops[op.index()].results
    }

    pub fn result(&self, op: OpIdx, index: usize) -> ValueIdx {
        self.ops[op.index()].results[index]
    }

    pub fn num_operands(&self, op: OpIdx) -> usize {
        self.ops[op.index()].operands.len()
    }

    pub fn num_results(&self, op: OpIdx) -> usize {
        self.ops[op.index()].results.len()
    }

    pub fn regions(&self, op: OpIdx) -> &[Region] {
        &self.ops[op.index()].regions
    }

    pub fn region_blocks(&self, op: OpIdx, region: usize) -> &[BlockIdx] {
        &self.ops[op.index()].regions[region].blocks
    }

    /// First block of the op's first region.
    pub fn entry_block(&self, op: OpIdx) -> BlockIdx {
        self.ops[op.index()].regions[0].blocks[0]
    }

    pub fn parent_block(&self, op: OpIdx) -> Option<BlockIdx> {
        self.ops[op.index()].parent
    }

    pub fn is_dead(&self, op: OpIdx) -> bool {
        self.ops[op.index()].dead
    }

    pub fn block_args(&self, block: BlockIdx) -> &[ValueIdx] {
        &self.blocks[block.index()].args
    }

    pub fn block_arg(&self, block: BlockIdx, index: usize) -> ValueIdx {
        self.blocks[block.index()].args[index]
    }

    pub fn block_ops(&self, block: BlockIdx) -> &[OpIdx] {
        &self.blocks[block.index()].ops
    }

    pub fn value_ty(&self, value: ValueIdx) -> &Type {
        &self.values[value.index()].ty
    }

    pub fn value_uses(&self, value: ValueIdx) -> &[Use] {
        &self.values[value.index()].uses
    }

    /// The op producing this value; `None` for block arguments.
    pub fn defining_op(&self, value: ValueIdx) -> Option<OpIdx> {
        self.values[value.index()].defining
    }

    pub fn top_ops(&self) -> &[OpIdx] {
        &self.top
    }

    /// Name of a func, circuit, or module op.
    pub fn op_name(&self, op: OpIdx) -> Option<Id> {
        match self.kind(op) {
            OpKind::Func { name, .. }
            | OpKind::Circuit { name }
            | OpKind::Module { name, .. } => Some(*name),
            _ => None,
        }
    }
}
