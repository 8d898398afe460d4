//! Internal representation for the Tidal compiler.
//!
//! One arena ([`Graph`]) owns both dialects that the compiler works with:
//! the elastic *handshake* dialect consumed by the lowering pass, and the
//! FIRRTL-style *hardware* dialect it produces. Ops, blocks, and values are
//! addressed by stable indices; edges between them are kept in use lists so
//! rewrites never chase pointers through the cyclic use-def graph.

mod builder;
mod graph;
mod ops;
mod printer;
mod types;

pub use builder::{Builder, InsertPoint};
pub use graph::{BlockIdx, Graph, OpIdx, Region, Use, ValueIdx};
pub use ops::{ArithOp, CmpPred, OpKind, Port, PrimOp};
pub use printer::Printer;
pub use types::{BundleField, Direction, Type, INDEX_WIDTH};
