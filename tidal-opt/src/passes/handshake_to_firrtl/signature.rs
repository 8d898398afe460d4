//! Structural signatures naming deduplicated sub-modules.
use tidal_ir::{Graph, OpIdx, OpKind};

/// Construct the name of the sub-module realizing an operator. The string
/// encodes: 1) the opcode text; 2) the number of inputs and outputs; 3) the
/// compare predicate (if applicable); 4) buffer slot count and sequential
/// flag (if applicable); 5) whether the component serves the control path.
///
/// Two operators with equal signatures share one sub-module, so the string
/// must determine the port shape and internal logic. Widths are not
/// embedded; equal-signature operators have structurally compatible ports by
/// construction of the input graph.
pub fn submodule_signature(graph: &Graph, op: OpIdx) -> String {
    let kind = graph.kind(op);
    let mut name = format!(
        "{}_{}ins_{}outs",
        kind.mnemonic(),
        graph.num_operands(op),
        graph.num_results(op)
    );

    if let OpKind::Cmp(pred) = kind {
        name.push('_');
        name.push_str(pred.as_str());
    }

    if let OpKind::Buffer { slots, sequential } = kind {
        name.push_str(&format!("_{}slots", slots));
        if *sequential {
            name.push_str("_seq");
        }
    }

    if control_flag(kind) {
        name.push_str("_ctrl");
    }

    name
}

/// Whether the operator's `control` attribute is set.
pub(super) fn control_flag(kind: &OpKind) -> bool {
    matches!(
        kind,
        OpKind::Fork { control: true }
            | OpKind::LazyFork { control: true }
            | OpKind::Branch { control: true }
            | OpKind::CondBranch { control: true }
            | OpKind::ControlMerge { control: true }
    )
}
