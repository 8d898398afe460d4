//! IR builder that tracks an insertion point.
//!
//! Every mutation the lowering performs goes through a [`Builder`]. The
//! `when`/`when_else` methods hand the builder to a closure with the
//! insertion point moved into the region and restore it when the closure
//! returns, so nesting can never leak an insertion point.
use crate::graph::{BlockIdx, Graph, OpIdx, ValueIdx};
use crate::ops::{OpKind, PrimOp};
use crate::types::Type;
use tidal_utils::{Error, Id, TidalResult};

/// Where the next op is materialized.
#[derive(Clone, Copy, Debug)]
pub enum InsertPoint {
    /// Append at the end of the block.
    AtEnd(BlockIdx),
    /// Insert immediately before the op.
    Before(OpIdx),
}

/// Builder for extracting and constructing IR nodes at an insertion point.
pub struct Builder<'a> {
    pub graph: &'a mut Graph,
    point: InsertPoint,
}

impl<'a> Builder<'a> {
    pub fn at_end(graph: &'a mut Graph, block: BlockIdx) -> Self {
        Builder {
            graph,
            point: InsertPoint::AtEnd(block),
        }
    }

    pub fn before(graph: &'a mut Graph, op: OpIdx) -> Self {
        Builder {
            graph,
            point: InsertPoint::Before(op),
        }
    }

    pub fn set_point(&mut self, point: InsertPoint) {
        self.point = point;
    }

    /// Create an op with the given operands and result types and insert it
    /// at the current point.
    pub fn op(
        &mut self,
        kind: OpKind,
        operands: Vec<ValueIdx>,
        result_tys: Vec<Type>,
    ) -> OpIdx {
        let op = self.graph.create_op(kind, operands, result_tys);
        match self.point {
            InsertPoint::AtEnd(block) => {
                self.graph.insert_op_at_end(op, block)
            }
            InsertPoint::Before(anchor) => {
                self.graph.insert_op_before(op, anchor)
            }
        }
        op
    }

    fn unary_result(&mut self, op: OpIdx) -> ValueIdx {
        self.graph.result(op, 0)
    }

    // ===================== hardware ops =====================

    /// Project the named subfield out of a bundle-typed value.
    pub fn subfield<S: Into<Id>>(
        &mut self,
        value: ValueIdx,
        field: S,
    ) -> TidalResult<ValueIdx> {
        let field = field.into();
        let ty = self.graph.value_ty(value);
        let Some(element) = ty.field(field) else {
            return Err(Error::malformed_structure(format!(
                "no subfield `{}` in type `{}`",
                field, ty
            )));
        };
        let element_ty = element.ty.clone();
        let op = self.op(
            OpKind::Subfield { field },
            vec![value],
            vec![element_ty],
        );
        Ok(self.unary_result(op))
    }

    /// `connect dest, src`.
    pub fn connect(&mut self, dest: ValueIdx, src: ValueIdx) -> OpIdx {
        self.op(OpKind::Connect, vec![dest, src], Vec::new())
    }

    /// A hardware constant of the given integer type.
    pub fn constant(&mut self, ty: Type, value: u64) -> ValueIdx {
        let op = self.op(OpKind::HwConstant { value }, Vec::new(), vec![ty]);
        self.unary_result(op)
    }

    /// A combinational primitive with an explicit result type.
    pub fn prim(
        &mut self,
        prim: PrimOp,
        ty: Type,
        operands: Vec<ValueIdx>,
    ) -> ValueIdx {
        let op = self.op(OpKind::Prim(prim), operands, vec![ty]);
        self.unary_result(op)
    }

    /// `a & b`, typed like `a`.
    pub fn and(&mut self, a: ValueIdx, b: ValueIdx) -> ValueIdx {
        let ty = self.graph.value_ty(a).clone();
        self.prim(PrimOp::And, ty, vec![a, b])
    }

    /// `!a`, typed like `a`.
    pub fn not(&mut self, a: ValueIdx) -> ValueIdx {
        let ty = self.graph.value_ty(a).clone();
        self.prim(PrimOp::Not, ty, vec![a])
    }

    /// `a == b`, producing a 1-bit unsigned value.
    pub fn eq(&mut self, a: ValueIdx, b: ValueIdx) -> ValueIdx {
        self.prim(PrimOp::Eq, Type::UInt(1), vec![a, b])
    }

    /// A named wire.
    pub fn wire<S: Into<Id>>(&mut self, name: S, ty: Type) -> ValueIdx {
        let op = self.op(
            OpKind::Wire { name: name.into() },
            Vec::new(),
            vec![ty],
        );
        self.unary_result(op)
    }

    /// A named register clocked by `clock`.
    pub fn reg<S: Into<Id>>(
        &mut self,
        name: S,
        ty: Type,
        clock: ValueIdx,
    ) -> ValueIdx {
        let op = self.op(
            OpKind::Reg { name: name.into() },
            vec![clock],
            vec![ty],
        );
        self.unary_result(op)
    }

    /// A named register with reset value `init`.
    pub fn reg_reset<S: Into<Id>>(
        &mut self,
        name: S,
        ty: Type,
        clock: ValueIdx,
        reset: ValueIdx,
        init: ValueIdx,
    ) -> ValueIdx {
        let op = self.op(
            OpKind::RegReset { name: name.into() },
            vec![clock, reset, init],
            vec![ty],
        );
        self.unary_result(op)
    }

    /// An instance of the named module; `ty` is the flipped port bundle.
    pub fn instance(&mut self, module: Id, ty: Type) -> ValueIdx {
        let op = self.op(OpKind::Instance { module }, Vec::new(), vec![ty]);
        self.unary_result(op)
    }

    /// A `when` with only a then region. The closure builds the region body
    /// with the insertion point scoped inside it.
    pub fn when<F>(&mut self, cond: ValueIdx, then: F) -> TidalResult<OpIdx>
    where
        F: FnOnce(&mut Self) -> TidalResult<()>,
    {
        let block = self.graph.add_block();
        let op = self.op(OpKind::When, vec![cond], Vec::new());
        self.graph.attach_region(op, vec![block]);
        let saved = self.point;
        self.point = InsertPoint::AtEnd(block);
        let result = then(self);
        self.point = saved;
        result.map(|_| op)
    }

    /// A `when` with both regions, each built by its own scoped closure.
    pub fn when_else<F, G>(
        &mut self,
        cond: ValueIdx,
        then: F,
        orelse: G,
    ) -> TidalResult<OpIdx>
    where
        F: FnOnce(&mut Self) -> TidalResult<()>,
        G: FnOnce(&mut Self) -> TidalResult<()>,
    {
        let then_block = self.graph.add_block();
        let else_block = self.graph.add_block();
        let op = self.op(OpKind::When, vec![cond], Vec::new());
        self.graph.attach_region(op, vec![then_block]);
        self.graph.attach_region(op, vec![else_block]);
        let saved = self.point;
        self.point = InsertPoint::AtEnd(then_block);
        let result = then(self).and_then(|_| {
            self.point = InsertPoint::AtEnd(else_block);
            orelse(self)
        });
        self.point = saved;
        result.map(|_| op)
    }
}
