//! Lowering from the elastic handshake dialect to the FIRRTL dialect.
//!
//! Process of lowering, per function:
//!
//! 0. Create a new circuit named after the function;
//! 1. Create the top module with bundled ports plus clock/reset pairs;
//! 2. Inline the function body into the top module and reconcile the block
//!    arguments;
//! 3. Traverse and convert each operator:
//!    - return ops connect their operands to the top module's outputs;
//!    - pipeline ops take the specialized stateful path;
//!    - everything else is keyed by its structural signature: on a cache
//!      miss a sub-module is created, its port subfields extracted, and its
//!      combinational logic built; the operator is then replaced by an
//!      instance wired to its predecessors, successors, and clock domain;
//! 4. Erase the function and register the circuit at the top level.
mod bundle;
mod logic;
mod pipeline;
mod signature;
mod submodule;

use crate::pass::{Named, Pass};
use linked_hash_map::LinkedHashMap;
use smallvec::SmallVec;
use tidal_ir::{
    Builder, Direction, Graph, OpIdx, OpKind, Port, Type, ValueIdx,
};
use tidal_utils::{Error, Id, TidalResult};

/// Subfield handles of one port, in `[valid, ready, data?]` order (or the
/// single handle of a clock/scalar port).
pub(crate) type ValueVector = SmallVec<[ValueIdx; 3]>;
/// One [`ValueVector`] per port, aligned with the module's port order.
pub(crate) type ValueVectorList = Vec<ValueVector>;

/// The handshake-to-FIRRTL conversion.
pub struct HandshakeToFirrtl {
    /// Number of clock domains appended to every top module.
    num_clocks: usize,
}

impl Default for HandshakeToFirrtl {
    fn default() -> Self {
        HandshakeToFirrtl { num_clocks: 1 }
    }
}

impl HandshakeToFirrtl {
    pub fn new(num_clocks: usize) -> Self {
        HandshakeToFirrtl { num_clocks }
    }
}

impl Named for HandshakeToFirrtl {
    fn name() -> &'static str {
        "lower-handshake-to-firrtl"
    }

    fn description() -> &'static str {
        "Lowering to FIRRTL Dialect"
    }
}

impl Pass for HandshakeToFirrtl {
    fn run(&mut self, graph: &mut Graph) -> TidalResult<()> {
        let funcs: Vec<OpIdx> = graph
            .top_ops()
            .iter()
            .copied()
            .filter(|&op| matches!(graph.kind(op), OpKind::Func { .. }))
            .collect();
        for func in funcs {
            self.convert_func(graph, func)?;
        }
        Ok(())
    }
}

impl HandshakeToFirrtl {
    fn convert_func(
        &self,
        graph: &mut Graph,
        func: OpIdx,
    ) -> TidalResult<()> {
        let OpKind::Func { name, .. } = graph.kind(func).clone() else {
            return Err(Error::malformed_structure(
                "conversion driver expects a function",
            ));
        };
        log::debug!("lowering function `{}`", name);
        let num_ins = graph.block_args(graph.entry_block(func)).len();

        let circuit = graph.create_circuit(name);
        let top = self.create_top_module(graph, circuit, func)?;

        // Snapshot the inlined body: conversion interleaves new hardware ops
        // with the operators still waiting to be visited.
        let body = graph.entry_block(top);
        let worklist = graph.block_ops(body).to_vec();
        let mut cache: LinkedHashMap<String, OpIdx> = LinkedHashMap::new();
        let mut pipeline_idx = 0;

        for op in worklist {
            let kind = graph.kind(op).clone();
            match kind {
                OpKind::Return => {
                    convert_return(graph, top, op, num_ins)?
                }
                OpKind::Pipeline => {
                    pipeline::convert_pipeline_op(
                        graph,
                        op,
                        top,
                        pipeline_idx,
                    )?;
                    pipeline_idx += 1;
                }
                ref kind if kind.is_handshake() => {
                    let sig = signature::submodule_signature(graph, op);
                    let has_clock =
                        matches!(kind, OpKind::Buffer { .. });
                    let module = match cache.get(&sig) {
                        Some(&module) => module,
                        None => {
                            let module = submodule::create_submodule(
                                graph,
                                op,
                                top,
                                has_clock,
                                Id::new(&sig),
                            )?;
                            let ports = submodule::extract_subfields(
                                graph, module,
                            )?;
                            build_logic(graph, module, kind, &ports)?;
                            log::debug!("created sub-module `{}`", sig);
                            cache.insert(sig, module);
                            module
                        }
                    };
                    submodule::create_instance(graph, op, module, top, 0)?;
                }
                _ => {
                    return Err(Error::unsupported_operation(
                        submodule::op_desc(graph, op),
                    ));
                }
            }
        }

        graph.erase_top(func);
        graph.push_top(circuit);
        Ok(())
    }

    /// Create the top module for a function and inline the function body
    /// into it.
    fn create_top_module(
        &self,
        graph: &mut Graph,
        circuit: OpIdx,
        func: OpIdx,
    ) -> TidalResult<OpIdx> {
        let OpKind::Func { name, results } = graph.kind(func).clone()
        else {
            return Err(Error::malformed_structure(
                "top-level op is not a function",
            ));
        };
        let func_body = graph.entry_block(func);
        let arg_tys: Vec<Type> = graph
            .block_args(func_body)
            .iter()
            .map(|&arg| graph.value_ty(arg).clone())
            .collect();

        let mut ports = Vec::new();
        let mut args_idx = 0;
        for ty in &arg_tys {
            let bundle = bundle::bundle_of(ty, Direction::Input)
                .ok_or_else(|| {
                    Error::unsupported_type(format!("function `{}`", name))
                })?;
            ports.push(Port::new(format!("arg{}", args_idx), bundle));
            args_idx += 1;
        }
        for ty in &results {
            let bundle = bundle::bundle_of(ty, Direction::Output)
                .ok_or_else(|| {
                    Error::unsupported_type(format!("function `{}`", name))
                })?;
            ports.push(Port::new(format!("arg{}", args_idx), bundle));
            args_idx += 1;
        }

        if self.num_clocks == 1 {
            ports.push(Port::new("clock", Type::Clock));
            ports.push(Port::new("reset", Type::UInt(1)));
        } else {
            for i in 0..self.num_clocks {
                ports.push(Port::new(format!("clock{}", i), Type::Clock));
                ports.push(Port::new(format!("reset{}", i), Type::UInt(1)));
            }
        }

        let top = graph.create_module(name, ports);
        let circuit_body = graph.entry_block(circuit);
        graph.insert_op_at_end(top, circuit_body);

        // Replace uses of each inlined block argument with the matching
        // argument of the module's entry block, then merge the blocks.
        let module_body = graph.entry_block(top);
        let func_args = graph.block_args(func_body).to_vec();
        for (i, &arg) in func_args.iter().enumerate() {
            let module_arg = graph.block_arg(module_body, i);
            graph.replace_all_uses(arg, module_arg);
        }
        graph.splice_block_ops(func_body, module_body);
        graph.erase_block(func_body);
        Ok(top)
    }
}

/// Connect each operand of the return with the corresponding output port
/// of the top module, then erase the return.
fn convert_return(
    graph: &mut Graph,
    top_module: OpIdx,
    op: OpIdx,
    num_ins: usize,
) -> TidalResult<()> {
    let module_body = graph.entry_block(top_module);
    let operands = graph.operands(op).to_vec();
    if num_ins + operands.len() > graph.block_args(module_body).len() {
        return Err(Error::malformed_structure(
            "return arity does not match the function signature",
        ));
    }
    let mut builder = Builder::before(graph, op);
    for (k, &operand) in operands.iter().enumerate() {
        let dest = builder.graph.block_arg(module_body, num_ins + k);
        builder.connect(dest, operand);
    }
    graph.erase_op(op);
    Ok(())
}

/// Build the combinational logic of a freshly created sub-module.
fn build_logic(
    graph: &mut Graph,
    module: OpIdx,
    kind: &OpKind,
    ports: &ValueVectorList,
) -> TidalResult<()> {
    let body = graph.entry_block(module);
    let mut b = Builder::at_end(graph, body);
    match kind {
        OpKind::Arith(op) => {
            logic::build_binary_logic(&mut b, op.prim(), ports)
        }
        OpKind::Cmp(pred) => {
            logic::build_binary_logic(&mut b, pred.prim(), ports)
        }
        OpKind::Sink => logic::build_sink_logic(&mut b, ports),
        OpKind::Join => logic::build_join_logic(&mut b, ports),
        OpKind::Mux => logic::build_mux_logic(&mut b, ports),
        OpKind::Merge => logic::build_merge_logic(&mut b, ports),
        OpKind::ControlMerge { control } => {
            logic::build_control_merge_logic(&mut b, ports, *control)
        }
        OpKind::Branch { control } => {
            logic::build_branch_logic(&mut b, ports, *control)
        }
        OpKind::CondBranch { control } => {
            logic::build_cond_branch_logic(&mut b, ports, *control)
        }
        OpKind::Fork { control } | OpKind::LazyFork { control } => {
            logic::build_fork_logic(&mut b, ports, *control)
        }
        OpKind::Constant { value } => {
            logic::build_constant_logic(&mut b, ports, *value)
        }
        OpKind::Buffer { .. } => logic::build_buffer_logic(&mut b, ports),
        other => Err(Error::unsupported_operation(other.mnemonic())),
    }
}
