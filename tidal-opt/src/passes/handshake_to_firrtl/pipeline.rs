//! Lowering of statically-scheduled pipeline regions.
//!
//! A pipeline op becomes a stateful sub-module: its stage blocks are inlined
//! after the module's entry block, data-path ops are rewritten to hardware
//! primitives, and each stage receives a reset-to-zero valid register, a
//! ready wire, and one data register per value crossing a stage boundary.
//! The flushable control lets a bubble-holding stage accept new data every
//! cycle while an occupied stage advances only under downstream demand.
use super::submodule::{create_instance, create_submodule, extract_subfields};
use super::ValueVectorList;
use tidal_ir::{
    BlockIdx, Builder, Graph, InsertPoint, OpIdx, OpKind, Type, ValueIdx,
    INDEX_WIDTH,
};
use tidal_utils::{Error, Id, TidalResult};

pub(super) fn convert_pipeline_op(
    graph: &mut Graph,
    op: OpIdx,
    top_module: OpIdx,
    pipeline_idx: usize,
) -> TidalResult<()> {
    // Pipeline sub-modules are not deduplicated; each gets a unique suffix.
    let name = Id::new(format!(
        "{}_{}",
        graph.kind(op).mnemonic(),
        pipeline_idx
    ));
    let module = create_submodule(graph, op, top_module, true, name)?;
    let ports = extract_subfields(graph, module)?;

    let num_ins = graph.num_operands(op);
    let num_outs = graph.num_results(op);
    if ports.len() != num_ins + num_outs + 2 {
        return Err(Error::malformed_structure(
            "pipeline sub-module must end with clock and reset ports",
        ));
    }

    // Inline all blocks of the pipeline region into the sub-module.
    graph.transfer_region_blocks(op, module);
    if graph.region_blocks(module, 0).len() < 2 {
        return Err(Error::malformed_structure(
            "pipeline op must carry a non-empty region",
        ));
    }

    lower_stage_ops(graph, module)?;

    let return_op = find_pipeline_return(graph, module)?;
    build_pipeline_structure(
        graph, module, &ports, return_op, num_ins, num_outs,
    )?;

    // Replace the entry-block arguments with the data subfields of the
    // module's input bundles.
    let pipe_entry = graph.region_blocks(module, 0)[1];
    let entry_args = graph.block_args(pipe_entry).to_vec();
    for (k, &arg) in entry_args.iter().enumerate() {
        let input_data = port_data(&ports, k)?;
        graph.replace_all_uses(arg, input_data);
    }

    // Connect the pipeline-return operands to the output data subfields.
    let returned = graph.operands(return_op).to_vec();
    let mut builder = Builder::before(graph, return_op);
    for (k, &operand) in returned.iter().enumerate() {
        let output_data = port_data(&ports, num_ins + k)?;
        builder.connect(output_data, operand);
    }

    // Hardware has no control flow: flatten every inlined block into the
    // module's entry block.
    graph.erase_op(return_op);
    let module_entry = graph.region_blocks(module, 0)[0];
    let inlined: Vec<_> = graph.region_blocks(module, 0)[1..].to_vec();
    for block in inlined {
        graph.splice_block_ops(block, module_entry);
        graph.erase_block(block);
    }

    create_instance(graph, op, module, top_module, 0)
}

/// Rewrite data-path operations of every stage into their hardware
/// primitive counterparts (data only, no handshake).
fn lower_stage_ops(graph: &mut Graph, module: OpIdx) -> TidalResult<()> {
    let blocks = graph.region_blocks(module, 0)[1..].to_vec();
    for block in blocks {
        let ops = graph.block_ops(block).to_vec();
        for op in ops {
            let prim = match graph.kind(op) {
                OpKind::Arith(arith) => Some((arith.prim(), false)),
                OpKind::Cmp(pred) => Some((pred.prim(), true)),
                _ => None,
            };
            let Some((prim, is_cmp)) = prim else {
                continue;
            };
            let result = graph.result(op, 0);
            let ty = if is_cmp {
                Type::UInt(1)
            } else {
                hw_type(graph.value_ty(result))
            };
            let operands = graph.operands(op).to_vec();
            let mut builder = Builder::before(graph, op);
            let lowered = builder.prim(prim, ty, operands);
            graph.replace_all_uses(result, lowered);
            graph.erase_op(op);
        }
    }
    Ok(())
}

/// The pipeline terminator lives at the end of the region's last block.
fn find_pipeline_return(
    graph: &Graph,
    module: OpIdx,
) -> TidalResult<OpIdx> {
    let last = *graph
        .region_blocks(module, 0)
        .last()
        .expect("region checked non-empty");
    graph
        .block_ops(last)
        .last()
        .copied()
        .filter(|&op| matches!(graph.kind(op), OpKind::PipelineReturn))
        .ok_or_else(|| {
            Error::malformed_structure(
                "pipeline region must end in a pipeline return",
            )
        })
}

/// Insert the per-stage registers and the flushable control logic.
fn build_pipeline_structure(
    graph: &mut Graph,
    module: OpIdx,
    ports: &ValueVectorList,
    return_op: OpIdx,
    num_ins: usize,
    num_outs: usize,
) -> TidalResult<()> {
    let clock = scalar_port(ports, num_ins + num_outs)?;
    let reset = scalar_port(ports, num_ins + num_outs + 1)?;
    let signal = Type::UInt(1);

    let module_entry = graph.region_blocks(module, 0)[0];
    let stage_blocks: Vec<_> = graph.region_blocks(module, 0)[1..]
        .iter()
        .copied()
        .filter(|&block| {
            graph
                .block_ops(block)
                .last()
                .map(|&op| {
                    !matches!(graph.kind(op), OpKind::PipelineReturn)
                })
                .unwrap_or(true)
        })
        .collect();

    // Constants for initializing and clearing the valid registers.
    let mut builder = Builder::at_end(graph, module_entry);
    let zero = builder.constant(signal.clone(), 0);
    let one = builder.constant(signal.clone(), 1);

    let mut valid_regs: Vec<ValueIdx> = Vec::new();
    let mut ready_wires: Vec<ValueIdx> = Vec::new();
    let mut data_regs: Vec<Vec<(ValueIdx, ValueIdx)>> = Vec::new();

    for (stage, &block) in stage_blocks.iter().enumerate() {
        builder.set_point(InsertPoint::AtEnd(block));

        // Valid registers and ready wires. Ready must stay a wire: a
        // registered ready would break back-pressure propagation.
        let valid = builder.reg_reset(
            format!("valid{}", stage),
            signal.clone(),
            clock,
            reset,
            zero,
        );
        valid_regs.push(valid);
        let ready =
            builder.wire(format!("ready{}", stage), signal.clone());
        ready_wires.push(ready);

        // Values defined here but read by another block cross a stage
        // boundary and need a register.
        let mut stage_outs: Vec<ValueIdx> = Vec::new();
        for &arg in builder.graph.block_args(block) {
            if used_outside(builder.graph, arg, block) {
                stage_outs.push(arg);
            }
        }
        let block_ops = builder.graph.block_ops(block).to_vec();
        for op in block_ops {
            for &result in builder.graph.results(op) {
                if used_outside(builder.graph, result, block)
                    && !stage_outs.contains(&result)
                {
                    stage_outs.push(result);
                }
            }
        }

        let mut registers = Vec::with_capacity(stage_outs.len());
        for (k, &value) in stage_outs.iter().enumerate() {
            let ty = hw_type(builder.graph.value_ty(value));
            let reg = builder.reg(
                format!("data{}.{}", stage, k),
                ty,
                clock,
            );
            builder.graph.replace_uses_where(value, reg, |g, user| {
                g.parent_block(user) != Some(block)
            });
            registers.push((value, reg));
        }
        data_regs.push(registers);
    }

    // Flushable control. The module-side handshake wrapper that drives
    // valid_in/ready_in from the port bundles lands with the wrapper patch.
    builder.set_point(InsertPoint::Before(return_op));
    let valid_in = builder.wire("valid_in", signal.clone());
    let ready_in = builder.wire("ready_in", signal);

    let stages = stage_blocks.len();
    for i in 0..stages {
        let valid_prev = if i == 0 { valid_in } else { valid_regs[i - 1] };
        let ready_next = if i + 1 == stages {
            ready_in
        } else {
            ready_wires[i + 1]
        };
        let valid = valid_regs[i];
        let ready = ready_wires[i];
        let registers = &data_regs[i];

        builder.set_point(InsertPoint::Before(return_op));
        builder.when_else(
            valid,
            |b| {
                // The stage holds a token: data advances only under
                // downstream demand, and a bubble forms when upstream idles.
                let advance = b.and(ready_next, valid_prev);
                b.when(advance, |b| {
                    for &(value, reg) in registers {
                        b.connect(reg, value);
                    }
                    Ok(())
                })?;
                let idle = b.not(valid_prev);
                let drain = b.and(ready_next, idle);
                b.when(drain, |b| {
                    b.connect(valid, zero);
                    Ok(())
                })?;
                b.connect(ready, ready_next);
                Ok(())
            },
            |b| {
                // The stage holds a bubble: accept unconditionally.
                for &(value, reg) in registers {
                    b.connect(reg, value);
                }
                b.connect(valid, valid_prev);
                b.connect(ready, one);
                Ok(())
            },
        )?;
    }
    Ok(())
}

/// True when any reader of `value` lives outside `block`.
fn used_outside(graph: &Graph, value: ValueIdx, block: BlockIdx) -> bool {
    graph
        .value_uses(value)
        .iter()
        .any(|u| graph.parent_block(u.op) != Some(block))
}

/// Data types of the handshake dialect, as hardware sees them.
fn hw_type(ty: &Type) -> Type {
    match ty {
        Type::SInt(width) => Type::SInt(*width),
        Type::UInt(width) => Type::UInt(*width),
        Type::Int(width) => Type::UInt(*width),
        Type::Index => Type::UInt(INDEX_WIDTH),
        other => other.clone(),
    }
}

fn port_data(
    ports: &ValueVectorList,
    index: usize,
) -> TidalResult<ValueIdx> {
    ports
        .get(index)
        .and_then(|port| port.get(2))
        .copied()
        .ok_or_else(|| {
            Error::malformed_structure(
                "pipeline port is missing its data subfield",
            )
        })
}

fn scalar_port(
    ports: &ValueVectorList,
    index: usize,
) -> TidalResult<ValueIdx> {
    ports
        .get(index)
        .and_then(|port| port.first())
        .copied()
        .ok_or_else(|| {
            Error::malformed_structure(
                "pipeline sub-module is missing its clock or reset port",
            )
        })
}
