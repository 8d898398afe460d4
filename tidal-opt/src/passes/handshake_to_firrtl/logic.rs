//! Combinational logic builders, one per operator family.
//!
//! Each builder runs with the insertion point inside the sub-module body
//! and receives the extracted port subfields in port order. The builders
//! only connect subfields and primitives; no input token is consumed unless
//! the handshake invariant of the operator allows it.
use super::{ValueVector, ValueVectorList};
use tidal_ir::{Builder, PrimOp, Type, ValueIdx};
use tidal_utils::{Error, TidalResult};

/// The data subfield of a port, which must be present on data-path ports.
fn data(port: &ValueVector) -> TidalResult<ValueIdx> {
    port.get(2).copied().ok_or_else(|| {
        Error::malformed_structure(
            "data-path port is missing its data subfield",
        )
    })
}

/// Binary arithmetic, compare, and shift operators.
///
/// The result is valid once both operands are; an operand is consumed only
/// when the result is both valid and accepted downstream.
pub(super) fn build_binary_logic(
    b: &mut Builder,
    prim: PrimOp,
    ports: &ValueVectorList,
) -> TidalResult<()> {
    let [arg0, arg1, result] = ports.as_slice() else {
        return Err(Error::malformed_structure(
            "binary operator must have exactly two operands and one result",
        ));
    };
    let (arg0_valid, arg0_ready) = (arg0[0], arg0[1]);
    let (arg1_valid, arg1_ready) = (arg1[0], arg1[1]);
    let (result_valid, result_ready) = (result[0], result[1]);
    let arg0_data = data(arg0)?;
    let arg1_data = data(arg1)?;
    let result_data = data(result)?;

    // Carry out the binary operation.
    let data_ty = if prim.is_comparison() {
        Type::UInt(1)
    } else {
        b.graph.value_ty(arg0_data).clone()
    };
    let computed = b.prim(prim, data_ty, vec![arg0_data, arg1_data]);
    b.connect(result_data, computed);

    // Generate the valid signal.
    let valid = b.and(arg0_valid, arg1_valid);
    b.connect(result_valid, valid);

    // Generate the ready signals.
    let ready = b.and(result_ready, valid);
    b.connect(arg0_ready, ready);
    b.connect(arg1_ready, ready);
    Ok(())
}

/// A sink accepts every token. The valid and data subfields have no readers
/// in the module, so the dangling projections are erased.
pub(super) fn build_sink_logic(
    b: &mut Builder,
    ports: &ValueVectorList,
) -> TidalResult<()> {
    let arg = ports.first().ok_or_else(|| {
        Error::malformed_structure("sink must have one operand")
    })?;
    let one = b.constant(Type::UInt(1), 1);
    b.connect(arg[1], one);

    if let Some(def) = b.graph.defining_op(arg[0]) {
        b.graph.erase_op(def);
    }
    if let Some(&arg_data) = arg.get(2) {
        if let Some(def) = b.graph.defining_op(arg_data) {
            b.graph.erase_op(def);
        }
    }
    Ok(())
}

/// A join fires once every input is valid; inputs are consumed together
/// when the output token is sent.
pub(super) fn build_join_logic(
    b: &mut Builder,
    ports: &ValueVectorList,
) -> TidalResult<()> {
    if ports.len() < 3 {
        return Err(Error::malformed_structure(
            "join must have at least two operands",
        ));
    }
    let result = &ports[ports.len() - 1];
    let inputs = &ports[..ports.len() - 1];

    let mut valid = inputs[0][0];
    for input in &inputs[1..] {
        valid = b.and(input[0], valid);
    }
    b.connect(result[0], valid);

    let ready = b.and(result[1], valid);
    for input in inputs {
        b.connect(input[1], ready);
    }
    Ok(())
}

/// Subfield handles shared by every arm of the mux chain.
struct MuxPorts {
    select_data: ValueIdx,
    select_ready: ValueIdx,
    select_ty: Type,
    result_valid: ValueIdx,
    result_ready: ValueIdx,
    result_data: ValueIdx,
}

/// A mux steers one of N data inputs to the output, gated by the select
/// input being active. The chain compares the select data against each
/// input index in turn; the final branch has no else.
pub(super) fn build_mux_logic(
    b: &mut Builder,
    ports: &ValueVectorList,
) -> TidalResult<()> {
    if ports.len() < 3 {
        return Err(Error::malformed_structure(
            "mux must have a select, at least one data input, and a result",
        ));
    }
    let select = &ports[0];
    let result = &ports[ports.len() - 1];
    let select_valid = select[0];
    let mp = MuxPorts {
        select_data: data(select)?,
        select_ready: select[1],
        select_ty: b.graph.value_ty(data(select)?).clone(),
        result_valid: result[0],
        result_ready: result[1],
        result_data: data(result)?,
    };

    // The mux works only while the select input is active.
    b.when(select_valid, |b| mux_chain(b, ports, 0, &mp))?;
    Ok(())
}

fn mux_chain(
    b: &mut Builder,
    ports: &ValueVectorList,
    index: usize,
    mp: &MuxPorts,
) -> TidalResult<()> {
    let input = &ports[1 + index];
    let input_valid = input[0];
    let input_ready = input[1];
    let input_data = data(input)?;

    let index_value = b.constant(mp.select_ty.clone(), index as u64);
    let cond = b.eq(mp.select_data, index_value);

    let arm = |b: &mut Builder| -> TidalResult<()> {
        b.connect(mp.result_valid, input_valid);
        b.connect(mp.result_data, input_data);
        b.connect(input_ready, mp.result_ready);
        // The select is consumed once data has passed input to output.
        let select_ready = b.and(input_valid, mp.result_ready);
        b.connect(mp.select_ready, select_ready);
        Ok(())
    };

    if 1 + index == ports.len() - 2 {
        b.when(cond, arm)?;
    } else {
        b.when_else(cond, arm, |b| mux_chain(b, ports, index + 1, mp))?;
    }
    Ok(())
}

/// A merge forwards whichever input is valid, assuming at most one is at a
/// time; earlier inputs win ties.
pub(super) fn build_merge_logic(
    b: &mut Builder,
    ports: &ValueVectorList,
) -> TidalResult<()> {
    if ports.len() < 2 {
        return Err(Error::malformed_structure(
            "merge must have at least one operand",
        ));
    }
    let result = &ports[ports.len() - 1];
    let result_triple = (result[0], result[1], data(result)?);
    merge_chain(b, ports, 0, result_triple)
}

fn merge_chain(
    b: &mut Builder,
    ports: &ValueVectorList,
    index: usize,
    result: (ValueIdx, ValueIdx, ValueIdx),
) -> TidalResult<()> {
    let (result_valid, result_ready, result_data) = result;
    let input = &ports[index];
    let input_valid = input[0];
    let input_ready = input[1];
    let input_data = data(input)?;

    let arm = move |b: &mut Builder| -> TidalResult<()> {
        b.connect(result_data, input_data);
        b.connect(result_valid, input_valid);
        b.connect(input_ready, result_ready);
        Ok(())
    };

    if index == ports.len() - 2 {
        b.when(input_valid, arm)?;
    } else {
        b.when_else(input_valid, arm, |b| {
            merge_chain(b, ports, index + 1, result)
        })?;
    }
    Ok(())
}

/// A control merge forwards the winning input on the main output and its
/// index on the control output; both consumers must be ready before the
/// input is consumed.
pub(super) fn build_control_merge_logic(
    b: &mut Builder,
    ports: &ValueVectorList,
    control: bool,
) -> TidalResult<()> {
    if ports.len() < 3 {
        return Err(Error::malformed_structure(
            "control merge must have at least one input and two results",
        ));
    }
    let num_ports = ports.len();
    let result = &ports[num_ports - 2];
    let index_out = &ports[num_ports - 1];
    let index_data = data(index_out)?;
    let index_ty = b.graph.value_ty(index_data).clone();

    let ready = b.and(result[1], index_out[1]);
    cmerge_chain(b, ports, 0, result, index_out, &index_ty, ready, control)
}

#[allow(clippy::too_many_arguments)]
fn cmerge_chain(
    b: &mut Builder,
    ports: &ValueVectorList,
    index: usize,
    result: &ValueVector,
    index_out: &ValueVector,
    index_ty: &Type,
    ready: ValueIdx,
    control: bool,
) -> TidalResult<()> {
    let input = &ports[index];
    let input_valid = input[0];
    let input_ready = input[1];

    let arm = |b: &mut Builder| -> TidalResult<()> {
        let winner = b.constant(index_ty.clone(), index as u64);
        b.connect(data(index_out)?, winner);
        b.connect(index_out[0], input_valid);
        b.connect(result[0], input_valid);
        b.connect(input_ready, ready);
        if !control {
            b.connect(data(result)?, data(input)?);
        }
        Ok(())
    };

    if index == ports.len() - 3 {
        b.when(input_valid, arm)?;
    } else {
        b.when_else(input_valid, arm, |b| {
            cmerge_chain(
                b,
                ports,
                index + 1,
                result,
                index_out,
                index_ty,
                ready,
                control,
            )
        })?;
    }
    Ok(())
}

/// An unconditional branch passes valid, ready, and (for data components)
/// data straight through.
pub(super) fn build_branch_logic(
    b: &mut Builder,
    ports: &ValueVectorList,
    control: bool,
) -> TidalResult<()> {
    let [arg, result] = ports.as_slice() else {
        return Err(Error::malformed_structure(
            "branch must have one operand and one result",
        ));
    };
    b.connect(result[0], arg[0]);
    b.connect(arg[1], result[1]);
    if !control {
        b.connect(data(result)?, data(arg)?);
    }
    Ok(())
}

/// A conditional branch steers the input to the first output when the
/// condition data is true, to the second otherwise. The condition token is
/// consumed once the selected output accepts the input.
pub(super) fn build_cond_branch_logic(
    b: &mut Builder,
    ports: &ValueVectorList,
    control: bool,
) -> TidalResult<()> {
    let [cond, arg, result0, result1] = ports.as_slice() else {
        return Err(Error::malformed_structure(
            "conditional branch must have two operands and two results",
        ));
    };
    let cond_valid = cond[0];
    let cond_ready = cond[1];
    let cond_data = data(cond)?;
    let arg_valid = arg[0];
    let arg_ready = arg[1];

    b.when(cond_valid, |b| {
        b.when_else(
            cond_data,
            |b| {
                b.connect(result0[0], arg_valid);
                b.connect(arg_ready, result0[1]);
                if !control {
                    b.connect(data(result0)?, data(arg)?);
                }
                let consumed = b.and(arg_valid, result0[1]);
                b.connect(cond_ready, consumed);
                Ok(())
            },
            |b| {
                b.connect(result1[0], arg_valid);
                b.connect(arg_ready, result1[1]);
                if !control {
                    b.connect(data(result1)?, data(arg)?);
                }
                let consumed = b.and(arg_valid, result1[1]);
                b.connect(cond_ready, consumed);
                Ok(())
            },
        )?;
        Ok(())
    })?;
    Ok(())
}

/// Forks emit to all outputs together, once every output is ready. The
/// eager fork is currently lowered the same way; tracking per-output
/// acceptance with registers is left to the eager-fork patch.
pub(super) fn build_fork_logic(
    b: &mut Builder,
    ports: &ValueVectorList,
    control: bool,
) -> TidalResult<()> {
    if ports.len() < 2 {
        return Err(Error::malformed_structure(
            "fork must have at least one result",
        ));
    }
    let arg = &ports[0];
    let arg_valid = arg[0];
    let arg_ready = arg[1];

    // The input accepts a new token once all outputs are ready.
    let mut ready = ports[1][1];
    for result in &ports[2..] {
        ready = b.and(result[1], ready);
    }
    b.connect(arg_ready, ready);

    // All outputs must be ready before the token is emitted.
    let valid = b.and(arg_valid, ready);
    for result in &ports[1..] {
        b.connect(result[0], valid);
        if !control {
            b.connect(data(result)?, data(arg)?);
        }
    }
    Ok(())
}

/// A constant emits its value each time the control input fires.
pub(super) fn build_constant_logic(
    b: &mut Builder,
    ports: &ValueVectorList,
    value: i64,
) -> TidalResult<()> {
    let [control, result] = ports.as_slice() else {
        return Err(Error::malformed_structure(
            "constant must have one control operand and one result",
        ));
    };
    let result_data = data(result)?;
    let data_ty = b.graph.value_ty(result_data).clone();
    let width = data_ty.width().ok_or_else(|| {
        Error::malformed_structure("constant result has no data width")
    })?;

    b.connect(result[0], control[0]);
    b.connect(control[1], result[1]);
    let bits = if width >= 64 {
        value as u64
    } else {
        (value as u64) & ((1u64 << width) - 1)
    };
    let constant = b.constant(data_ty, bits);
    b.connect(result_data, constant);
    Ok(())
}

/// A buffer exposes its bundles and clock/reset; the internal register
/// chain is synthesized by the buffer-materialization patch.
pub(super) fn build_buffer_logic(
    _b: &mut Builder,
    ports: &ValueVectorList,
) -> TidalResult<()> {
    if ports.len() != 4 {
        return Err(Error::malformed_structure(
            "buffer must have one operand, one result, clock, and reset",
        ));
    }
    Ok(())
}
