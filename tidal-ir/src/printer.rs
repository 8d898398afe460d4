//! Textual form of a lowered circuit.
//!
//! The printer walks the hardware ops of each module and writes a
//! deterministic MLIR-flavored rendering. It performs no mutation and is
//! used by tests and logging; the actual RTL emitter is downstream tooling.
use crate::graph::{BlockIdx, Graph, OpIdx, ValueIdx};
use crate::ops::OpKind;
use itertools::Itertools;
use std::collections::HashMap;
use std::io;

/// Printer for lowered circuits.
pub struct Printer;

impl Printer {
    /// Write the textual form of a circuit to `f`.
    pub fn write_circuit<F: io::Write>(
        graph: &Graph,
        circuit: OpIdx,
        f: &mut F,
    ) -> io::Result<()> {
        let OpKind::Circuit { name } = graph.kind(circuit) else {
            unreachable!("write_circuit called on a non-circuit op");
        };
        writeln!(f, "circuit \"{}\" {{", name)?;
        for &module in graph.block_ops(graph.entry_block(circuit)) {
            Self::write_module(graph, module, f)?;
        }
        writeln!(f, "}}")
    }

    /// Render a circuit to a string; convenient in tests.
    pub fn circuit_string(graph: &Graph, circuit: OpIdx) -> String {
        let mut buf = Vec::new();
        Self::write_circuit(graph, circuit, &mut buf)
            .expect("writing to a Vec cannot fail");
        String::from_utf8(buf).expect("printer emits valid utf-8")
    }

    fn write_module<F: io::Write>(
        graph: &Graph,
        module: OpIdx,
        f: &mut F,
    ) -> io::Result<()> {
        let OpKind::Module { name, ports } = graph.kind(module) else {
            unreachable!("circuit body may only contain modules");
        };
        let body = graph.entry_block(module);

        let mut names: HashMap<ValueIdx, String> = HashMap::new();
        for (arg, port) in
            graph.block_args(body).iter().zip_eq(ports.iter())
        {
            names.insert(*arg, format!("%{}", port.name));
        }
        let mut counter = 0usize;
        Self::name_results(graph, body, &mut names, &mut counter);

        let ports = ports
            .iter()
            .map(|p| format!("{}: {}", p.name, p.ty))
            .join(", ");
        writeln!(f, "  module @{}({}) {{", name, ports)?;
        Self::write_block(graph, body, &names, 2, f)?;
        writeln!(f, "  }}")
    }

    /// Assign `%N` names to every op result in the block, recursing into
    /// regions, so forward references inside `connect` print consistently.
    fn name_results(
        graph: &Graph,
        block: BlockIdx,
        names: &mut HashMap<ValueIdx, String>,
        counter: &mut usize,
    ) {
        for &op in graph.block_ops(block) {
            for &result in graph.results(op) {
                names.insert(result, format!("%{}", counter));
                *counter += 1;
            }
            for region in graph.regions(op) {
                for &inner in &region.blocks {
                    Self::name_results(graph, inner, names, counter);
                }
            }
        }
    }

    fn write_block<F: io::Write>(
        graph: &Graph,
        block: BlockIdx,
        names: &HashMap<ValueIdx, String>,
        depth: usize,
        f: &mut F,
    ) -> io::Result<()> {
        let pad = "  ".repeat(depth);
        let name = |v: ValueIdx| -> &str {
            names.get(&v).map(String::as_str).unwrap_or("%?")
        };
        for &op in graph.block_ops(block) {
            match graph.kind(op) {
                OpKind::Subfield { field } => {
                    let result = graph.result(op, 0);
                    writeln!(
                        f,
                        "{}{} = subfield {}, {}",
                        pad,
                        name(result),
                        name(graph.operand(op, 0)),
                        field
                    )?;
                }
                OpKind::Connect => {
                    writeln!(
                        f,
                        "{}connect {}, {}",
                        pad,
                        name(graph.operand(op, 0)),
                        name(graph.operand(op, 1))
                    )?;
                }
                OpKind::HwConstant { value } => {
                    let result = graph.result(op, 0);
                    writeln!(
                        f,
                        "{}{} = constant {} : {}",
                        pad,
                        name(result),
                        value,
                        graph.value_ty(result)
                    )?;
                }
                OpKind::Wire { name: wire } => {
                    let result = graph.result(op, 0);
                    writeln!(
                        f,
                        "{}{} = wire \"{}\" : {}",
                        pad,
                        name(result),
                        wire,
                        graph.value_ty(result)
                    )?;
                }
                OpKind::Reg { name: reg } => {
                    let result = graph.result(op, 0);
                    writeln!(
                        f,
                        "{}{} = reg \"{}\" {} : {}",
                        pad,
                        name(result),
                        reg,
                        name(graph.operand(op, 0)),
                        graph.value_ty(result)
                    )?;
                }
                OpKind::RegReset { name: reg } => {
                    let result = graph.result(op, 0);
                    writeln!(
                        f,
                        "{}{} = regreset \"{}\" {}, {}, {} : {}",
                        pad,
                        name(result),
                        reg,
                        name(graph.operand(op, 0)),
                        name(graph.operand(op, 1)),
                        name(graph.operand(op, 2)),
                        graph.value_ty(result)
                    )?;
                }
                OpKind::Instance { module } => {
                    let result = graph.result(op, 0);
                    writeln!(
                        f,
                        "{}{} = instance @{}",
                        pad,
                        name(result),
                        module
                    )?;
                }
                OpKind::When => {
                    writeln!(
                        f,
                        "{}when {} {{",
                        pad,
                        name(graph.operand(op, 0))
                    )?;
                    let regions = graph.regions(op);
                    Self::write_block(
                        graph,
                        regions[0].blocks[0],
                        names,
                        depth + 1,
                        f,
                    )?;
                    if let Some(orelse) = regions.get(1) {
                        writeln!(f, "{}}} else {{", pad)?;
                        Self::write_block(
                            graph,
                            orelse.blocks[0],
                            names,
                            depth + 1,
                            f,
                        )?;
                    }
                    writeln!(f, "{}}}", pad)?;
                }
                OpKind::Prim(prim) => {
                    let result = graph.result(op, 0);
                    writeln!(
                        f,
                        "{}{} = {} {} : {}",
                        pad,
                        name(result),
                        prim.mnemonic(),
                        graph
                            .operands(op)
                            .iter()
                            .map(|&v| name(v))
                            .join(", "),
                        graph.value_ty(result)
                    )?;
                }
                other => {
                    // Unlowered ops should never survive to printing; show
                    // them loudly instead of hiding them.
                    writeln!(
                        f,
                        "{}!unlowered {} ({} operands)",
                        pad,
                        other.mnemonic(),
                        graph.num_operands(op)
                    )?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::Builder;
    use crate::ops::Port;
    use crate::types::Type;

    #[test]
    fn prints_nested_whens() {
        let mut g = Graph::new();
        let circuit = g.create_circuit("test");
        let body = g.entry_block(circuit);
        let module = g.create_module(
            "m".into(),
            vec![Port::new("arg0", Type::UInt(1))],
        );
        g.insert_op_at_end(module, body);

        let block = g.entry_block(module);
        let arg = g.block_arg(block, 0);
        let mut b = Builder::at_end(&mut g, block);
        let one = b.constant(Type::UInt(1), 1);
        b.when(arg, |b| {
            b.connect(arg, one);
            Ok(())
        })
        .unwrap();

        let text = Printer::circuit_string(&g, circuit);
        assert!(text.contains("module @m(arg0: uint<1>)"));
        assert!(text.contains("when %arg0 {"));
        assert!(text.contains("connect %arg0, %0"));
    }
}
