//! Sub-module synthesis, port subfield extraction, and instantiation.
use super::bundle::bundle_of;
use super::{ValueVector, ValueVectorList};
use smallvec::smallvec;
use tidal_ir::{
    Builder, BundleField, Direction, Graph, OpIdx, OpKind, Port, Type,
};
use tidal_utils::{Error, Id, TidalResult};

/// Create the sub-module realizing `op`, inserted immediately before the
/// top module in the enclosing circuit. Ports are named `arg0..argN-1` in
/// operand-then-result order; `clock` and `reset` are appended when the
/// component is stateful.
pub(super) fn create_submodule(
    graph: &mut Graph,
    op: OpIdx,
    top_module: OpIdx,
    has_clock: bool,
    name: Id,
) -> TidalResult<OpIdx> {
    let mut ports = Vec::new();
    let mut args_idx = 0;

    for &operand in graph.operands(op) {
        let ty = graph.value_ty(operand);
        let bundle =
            bundle_of(ty, Direction::Input).ok_or_else(|| {
                Error::unsupported_type(op_desc(graph, op))
            })?;
        ports.push(Port::new(format!("arg{}", args_idx), bundle));
        args_idx += 1;
    }

    for &result in graph.results(op) {
        let ty = graph.value_ty(result);
        let bundle =
            bundle_of(ty, Direction::Output).ok_or_else(|| {
                Error::unsupported_type(op_desc(graph, op))
            })?;
        ports.push(Port::new(format!("arg{}", args_idx), bundle));
        args_idx += 1;
    }

    if has_clock {
        ports.push(Port::new("clock", Type::Clock));
        ports.push(Port::new("reset", Type::UInt(1)));
    }

    let module = graph.create_module(name, ports);
    graph.insert_op_before(module, top_module);
    Ok(module)
}

/// Extract the subfields of every port of a sub-module, in port order. A
/// bundle port yields its `[valid, ready, data?]` projections; clock and
/// 1-bit scalar ports yield the port value itself.
pub(super) fn extract_subfields(
    graph: &mut Graph,
    module: OpIdx,
) -> TidalResult<ValueVectorList> {
    let body = graph.entry_block(module);
    let args = graph.block_args(body).to_vec();
    let mut builder = Builder::at_end(graph, body);

    let mut ports = Vec::with_capacity(args.len());
    for arg in args {
        let ty = builder.graph.value_ty(arg).clone();
        let subfields: ValueVector = if ty.is_bundle() {
            let mut fields = smallvec![];
            for field in ty.fields() {
                fields.push(builder.subfield(arg, field.name)?);
            }
            fields
        } else if ty.is_clock() || ty.is_signal() {
            smallvec![arg]
        } else {
            smallvec![]
        };
        ports.push(subfields);
    }
    Ok(ports)
}

/// Create an instance of `submodule` in place of `op` and wire it up:
/// operand ports connect from the operator's operands, result ports replace
/// all uses of the operator's results, and trailing clock/reset ports
/// connect to the pair of the selected clock domain. The operator is erased.
pub(super) fn create_instance(
    graph: &mut Graph,
    op: OpIdx,
    submodule: OpIdx,
    top_module: OpIdx,
    clock_domain: usize,
) -> TidalResult<()> {
    let OpKind::Module { name: module_name, ports } =
        graph.kind(submodule).clone()
    else {
        return Err(Error::malformed_structure(
            "instantiated op is not a module",
        ));
    };

    // The caller's view of each port is the dual of the callee's: flip
    // every element of the bundled instance type.
    let elements: Vec<BundleField> = ports
        .iter()
        .map(|port| BundleField::new(port.name, true, port.ty.clone()))
        .collect();
    let inst_ty = Type::Bundle(elements);

    let num_ins = graph.num_operands(op);
    let num_args = num_ins + graph.num_results(op);

    let top_args = graph.block_args(graph.entry_block(top_module)).to_vec();
    let first_clock = top_args
        .iter()
        .position(|&arg| graph.value_ty(arg).is_clock())
        .ok_or_else(|| {
            Error::malformed_structure(format!(
                "no clock argument in top module for instance of `{}`",
                module_name
            ))
        })?;

    let mut builder = Builder::before(graph, op);
    let instance = builder.instance(module_name, inst_ty);

    for (ports_idx, port) in ports.iter().enumerate() {
        let subfield = builder.subfield(instance, port.name)?;
        if ports_idx < num_ins {
            // Connect input ports.
            let operand = builder.graph.operand(op, ports_idx);
            builder.connect(subfield, operand);
        } else if ports_idx < num_args {
            // Redirect readers of the op's results to the instance.
            let result = builder.graph.result(op, ports_idx - num_ins);
            builder.graph.replace_all_uses(result, subfield);
        } else {
            // Connect clock or reset of the chosen domain.
            let signal = top_args[first_clock
                + 2 * clock_domain
                + (ports_idx - num_args)];
            builder.connect(subfield, signal);
        }
    }

    graph.erase_op(op);
    Ok(())
}

/// Short description of an operator for diagnostics.
pub(super) fn op_desc(graph: &Graph, op: OpIdx) -> String {
    format!(
        "op `{}` ({} operands, {} results)",
        graph.kind(op).mnemonic(),
        graph.num_operands(op),
        graph.num_results(op)
    )
}
