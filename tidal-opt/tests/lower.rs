//! End-to-end tests for the handshake-to-FIRRTL lowering: each test builds
//! a dataflow function through the public IR API, runs the pass, and
//! structurally inspects the produced circuit.
use tidal_ir::{
    ArithOp, BlockIdx, CmpPred, Graph, OpIdx, OpKind, PrimOp, Printer, Type,
    ValueIdx,
};
use tidal_opt::pass::{Named, Pass};
use tidal_opt::passes::HandshakeToFirrtl;
use tidal_utils::Error;

fn edge(width: u64) -> Type {
    Type::Int(width)
}

fn lower(graph: &mut Graph) {
    HandshakeToFirrtl::default()
        .run(graph)
        .expect("lowering should succeed");
}

/// The single circuit left at the top level after lowering.
fn circuit(graph: &Graph) -> OpIdx {
    assert_eq!(graph.top_ops().len(), 1, "expected exactly one circuit");
    let circuit = graph.top_ops()[0];
    assert!(matches!(graph.kind(circuit), OpKind::Circuit { .. }));
    circuit
}

fn module_names(graph: &Graph, circuit: OpIdx) -> Vec<String> {
    graph
        .block_ops(graph.entry_block(circuit))
        .iter()
        .filter_map(|&m| graph.op_name(m))
        .map(|id| id.to_string())
        .collect()
}

fn find_module(graph: &Graph, circuit: OpIdx, name: &str) -> OpIdx {
    graph
        .block_ops(graph.entry_block(circuit))
        .iter()
        .copied()
        .find(|&m| graph.op_name(m).is_some_and(|id| id == name))
        .unwrap_or_else(|| panic!("no module named `{}`", name))
}

/// All ops of a block, recursing into `when` regions.
fn all_ops(graph: &Graph, block: BlockIdx, out: &mut Vec<OpIdx>) {
    for &op in graph.block_ops(block) {
        out.push(op);
        for region in graph.regions(op) {
            for &inner in &region.blocks {
                all_ops(graph, inner, out);
            }
        }
    }
}

fn ops_in_module(graph: &Graph, module: OpIdx) -> Vec<OpIdx> {
    let mut out = Vec::new();
    all_ops(graph, graph.entry_block(module), &mut out);
    out
}

/// For a value produced by a subfield projection of a module port, return
/// the port's argument index and the subfield name.
fn port_subfield(
    graph: &Graph,
    module: OpIdx,
    value: ValueIdx,
) -> Option<(usize, String)> {
    let def = graph.defining_op(value)?;
    let OpKind::Subfield { field } = graph.kind(def) else {
        return None;
    };
    let base = graph.operand(def, 0);
    let body = graph.entry_block(module);
    let index = graph.block_args(body).iter().position(|&a| a == base)?;
    Some((index, field.to_string()))
}

/// Collect the non-`and` leaves of an and-tree.
fn and_leaves(graph: &Graph, value: ValueIdx, out: &mut Vec<ValueIdx>) {
    match graph.defining_op(value).map(|op| graph.kind(op)) {
        Some(OpKind::Prim(PrimOp::And)) => {
            let op = graph.defining_op(value).unwrap();
            and_leaves(graph, graph.operand(op, 0), out);
            and_leaves(graph, graph.operand(op, 1), out);
        }
        _ => out.push(value),
    }
}

/// The connects (dest, src) appearing anywhere in a module.
fn connects(graph: &Graph, module: OpIdx) -> Vec<(ValueIdx, ValueIdx)> {
    ops_in_module(graph, module)
        .into_iter()
        .filter(|&op| matches!(graph.kind(op), OpKind::Connect))
        .map(|op| (graph.operand(op, 0), graph.operand(op, 1)))
        .collect()
}

// ===================== scenarios =====================

#[test]
fn s1_single_add() {
    let mut g = Graph::new();
    let func =
        g.add_func("simple_addi", vec![edge(32), edge(32)], vec![edge(32)]);
    let body = g.entry_block(func);
    let a = g.block_arg(body, 0);
    let b = g.block_arg(body, 1);
    let add =
        g.create_op(OpKind::Arith(ArithOp::Add), vec![a, b], vec![edge(32)]);
    g.insert_op_at_end(add, body);
    let ret = g.create_op(OpKind::Return, vec![g.result(add, 0)], vec![]);
    g.insert_op_at_end(ret, body);

    lower(&mut g);

    let circuit = circuit(&g);
    assert_eq!(g.op_name(circuit).unwrap(), "simple_addi");
    assert_eq!(
        module_names(&g, circuit),
        vec!["addi_2ins_1outs", "simple_addi"]
    );

    // Top module ports: two input bundles, one output bundle, clock, reset.
    let top = find_module(&g, circuit, "simple_addi");
    let OpKind::Module { ports, .. } = g.kind(top).clone() else {
        unreachable!()
    };
    assert_eq!(ports.len(), 5);
    let input = &ports[0].ty;
    assert!(!input.field("valid").unwrap().flip);
    assert!(input.field("ready").unwrap().flip);
    assert_eq!(input.field("data").unwrap().ty, Type::UInt(32));
    let output = &ports[2].ty;
    assert!(output.field("valid").unwrap().flip);
    assert!(!output.field("ready").unwrap().flip);
    assert!(output.field("data").unwrap().flip);
    assert_eq!(ports[3].ty, Type::Clock);
    assert_eq!(ports[4].ty, Type::UInt(1));

    // One instance, wired from the top args and into the top output.
    let instances: Vec<_> = g
        .block_ops(g.entry_block(top))
        .iter()
        .copied()
        .filter(|&op| matches!(g.kind(op), OpKind::Instance { .. }))
        .collect();
    assert_eq!(instances.len(), 1);
    let OpKind::Instance { module } = g.kind(instances[0]) else {
        unreachable!()
    };
    assert_eq!(*module, "addi_2ins_1outs");

    // Return wiring: the top output port is driven exactly once, by the
    // instance's result subfield.
    let top_body = g.entry_block(top);
    let out_arg = g.block_arg(top_body, 2);
    let drivers: Vec<_> = connects(&g, top)
        .into_iter()
        .filter(|&(dest, _)| dest == out_arg)
        .collect();
    assert_eq!(drivers.len(), 1);
    let (_, src) = drivers[0];
    let def = g.defining_op(src).unwrap();
    let OpKind::Subfield { field } = g.kind(def) else {
        panic!("top output must be driven by an instance subfield")
    };
    assert_eq!(*field, "arg2");
    assert_eq!(g.defining_op(g.operand(def, 0)), Some(instances[0]));

    // The circuit renders with both modules in place.
    let text = Printer::circuit_string(&g, circuit);
    assert!(text.contains("circuit \"simple_addi\""));
    assert!(text.contains("module @addi_2ins_1outs"));
    assert!(text.contains("instance @addi_2ins_1outs"));
}

#[test]
fn s2_equal_signatures_share_one_submodule() {
    let mut g = Graph::new();
    let func = g.add_func(
        "dedup",
        vec![edge(32), edge(32), edge(32)],
        vec![edge(32)],
    );
    let body = g.entry_block(func);
    let a = g.block_arg(body, 0);
    let b = g.block_arg(body, 1);
    let c = g.block_arg(body, 2);
    let add0 =
        g.create_op(OpKind::Arith(ArithOp::Add), vec![a, b], vec![edge(32)]);
    g.insert_op_at_end(add0, body);
    let add1 = g.create_op(
        OpKind::Arith(ArithOp::Add),
        vec![g.result(add0, 0), c],
        vec![edge(32)],
    );
    g.insert_op_at_end(add1, body);
    let ret = g.create_op(OpKind::Return, vec![g.result(add1, 0)], vec![]);
    g.insert_op_at_end(ret, body);

    lower(&mut g);

    let circuit = circuit(&g);
    let names = module_names(&g, circuit);
    assert_eq!(names.iter().filter(|n| *n == "addi_2ins_1outs").count(), 1);

    let top = find_module(&g, circuit, "dedup");
    let instances = ops_in_module(&g, top)
        .into_iter()
        .filter(|&op| matches!(g.kind(op), OpKind::Instance { .. }))
        .count();
    assert_eq!(instances, 2);
}

#[test]
fn s3_compare_produces_one_bit_output() {
    let mut g = Graph::new();
    let func =
        g.add_func("less", vec![edge(32), edge(32)], vec![edge(1)]);
    let body = g.entry_block(func);
    let a = g.block_arg(body, 0);
    let b = g.block_arg(body, 1);
    let cmp =
        g.create_op(OpKind::Cmp(CmpPred::Slt), vec![a, b], vec![edge(1)]);
    g.insert_op_at_end(cmp, body);
    let ret = g.create_op(OpKind::Return, vec![g.result(cmp, 0)], vec![]);
    g.insert_op_at_end(ret, body);

    lower(&mut g);

    let circuit = circuit(&g);
    let sub = find_module(&g, circuit, "cmpi_2ins_1outs_slt");
    let OpKind::Module { ports, .. } = g.kind(sub).clone() else {
        unreachable!()
    };
    assert_eq!(ports[2].ty.field("data").unwrap().ty, Type::UInt(1));

    // The comparison primitive itself is 1-bit unsigned.
    let lt = ops_in_module(&g, sub)
        .into_iter()
        .find(|&op| matches!(g.kind(op), OpKind::Prim(PrimOp::Lt)))
        .expect("lowered compare primitive");
    assert_eq!(*g.value_ty(g.result(lt, 0)), Type::UInt(1));
}

#[test]
fn s4_mux_builds_a_priority_when_chain() {
    let mut g = Graph::new();
    let func = g.add_func(
        "pick",
        vec![Type::Index, edge(32), edge(32), edge(32)],
        vec![edge(32)],
    );
    let body = g.entry_block(func);
    let operands: Vec<_> = g.block_args(body).to_vec();
    let mux = g.create_op(OpKind::Mux, operands, vec![edge(32)]);
    g.insert_op_at_end(mux, body);
    let ret = g.create_op(OpKind::Return, vec![g.result(mux, 0)], vec![]);
    g.insert_op_at_end(ret, body);

    lower(&mut g);

    let circuit = circuit(&g);
    let sub = find_module(&g, circuit, "select_4ins_1outs");
    let sub_body = g.entry_block(sub);

    // One outer when, gated on the select port's valid subfield, with no
    // else region.
    let outer: Vec<_> = g
        .block_ops(sub_body)
        .iter()
        .copied()
        .filter(|&op| matches!(g.kind(op), OpKind::When))
        .collect();
    assert_eq!(outer.len(), 1);
    let outer = outer[0];
    assert_eq!(g.regions(outer).len(), 1);
    assert_eq!(
        port_subfield(&g, sub, g.operand(outer, 0)),
        Some((0, "valid".to_string()))
    );

    // Inside: a chain of three equality tests, the last without an else.
    let mut when = *g
        .block_ops(g.regions(outer)[0].blocks[0])
        .iter()
        .find(|&&op| matches!(g.kind(op), OpKind::When))
        .expect("when chain");
    let mut chain_len = 1;
    while g.regions(when).len() == 2 {
        let else_block = g.regions(when)[1].blocks[0];
        when = *g
            .block_ops(else_block)
            .iter()
            .find(|&&op| matches!(g.kind(op), OpKind::When))
            .expect("chained when");
        chain_len += 1;
    }
    assert_eq!(chain_len, 3);

    let eqs = ops_in_module(&g, sub)
        .into_iter()
        .filter(|&op| matches!(g.kind(op), OpKind::Prim(PrimOp::Eq)))
        .count();
    assert_eq!(eqs, 3);
}

#[test]
fn s5_fork_fans_out_data_and_collects_readies() {
    let mut g = Graph::new();
    let func = g.add_func(
        "fanout",
        vec![edge(8)],
        vec![edge(8), edge(8), edge(8)],
    );
    let body = g.entry_block(func);
    let a = g.block_arg(body, 0);
    let fork = g.create_op(
        OpKind::Fork { control: false },
        vec![a],
        vec![edge(8), edge(8), edge(8)],
    );
    g.insert_op_at_end(fork, body);
    let results: Vec<_> = g.results(fork).to_vec();
    let ret = g.create_op(OpKind::Return, results, vec![]);
    g.insert_op_at_end(ret, body);

    lower(&mut g);

    let circuit = circuit(&g);
    let sub = find_module(&g, circuit, "fork_1ins_3outs");
    let wires = connects(&g, sub);

    // Each output's data comes from the input's data.
    for out in 1..=3 {
        let driven = wires.iter().any(|&(dest, src)| {
            port_subfield(&g, sub, dest)
                == Some((out, "data".to_string()))
                && port_subfield(&g, sub, src)
                    == Some((0, "data".to_string()))
        });
        assert!(driven, "output {} data must mirror the input", out);
    }

    // The input is ready only when every output is.
    let (_, ready_src) = wires
        .iter()
        .copied()
        .find(|&(dest, _)| {
            port_subfield(&g, sub, dest) == Some((0, "ready".to_string()))
        })
        .expect("input ready driver");
    let mut leaves = Vec::new();
    and_leaves(&g, ready_src, &mut leaves);
    let mut fields: Vec<_> = leaves
        .into_iter()
        .filter_map(|leaf| port_subfield(&g, sub, leaf))
        .collect();
    fields.sort();
    assert_eq!(
        fields,
        vec![
            (1, "ready".to_string()),
            (2, "ready".to_string()),
            (3, "ready".to_string())
        ]
    );
}

#[test]
fn s6_single_stage_pipeline() {
    let mut g = Graph::new();
    let func = g.add_func(
        "staged",
        vec![edge(32), edge(32)],
        vec![edge(32)],
    );
    let body = g.entry_block(func);
    let a = g.block_arg(body, 0);
    let b = g.block_arg(body, 1);

    // Pipeline region: one stage block computing an add, then the
    // terminator block returning the cross-stage value.
    let stage = g.add_block();
    let x = g.append_block_arg(stage, edge(32));
    let y = g.append_block_arg(stage, edge(32));
    let add =
        g.create_op(OpKind::Arith(ArithOp::Add), vec![x, y], vec![edge(32)]);
    g.insert_op_at_end(add, stage);
    let exit = g.add_block();
    let pret =
        g.create_op(OpKind::PipelineReturn, vec![g.result(add, 0)], vec![]);
    g.insert_op_at_end(pret, exit);

    let pipeline =
        g.create_op(OpKind::Pipeline, vec![a, b], vec![edge(32)]);
    g.attach_region(pipeline, vec![stage, exit]);
    g.insert_op_at_end(pipeline, body);
    let ret =
        g.create_op(OpKind::Return, vec![g.result(pipeline, 0)], vec![]);
    g.insert_op_at_end(ret, body);

    lower(&mut g);

    let circuit = circuit(&g);
    let sub = find_module(&g, circuit, "pipeline_0");
    let OpKind::Module { ports, .. } = g.kind(sub).clone() else {
        unreachable!()
    };
    assert_eq!(ports.len(), 5);
    assert_eq!(ports[3].ty, Type::Clock);

    // All stage blocks were flattened into the entry block.
    assert_eq!(g.region_blocks(sub, 0).len(), 1);

    let ops = ops_in_module(&g, sub);

    // Exactly one reset-to-zero valid register.
    let valid_regs: Vec<_> = ops
        .iter()
        .copied()
        .filter(|&op| {
            matches!(g.kind(op), OpKind::RegReset { name } if *name == "valid0")
        })
        .collect();
    assert_eq!(valid_regs.len(), 1);
    let init = g.operand(valid_regs[0], 2);
    let init_def = g.defining_op(init).unwrap();
    assert!(
        matches!(g.kind(init_def), OpKind::HwConstant { value: 0 }),
        "valid register must reset to zero"
    );

    // Exactly one ready wire and one cross-stage data register.
    let wire_names: Vec<_> = ops
        .iter()
        .copied()
        .filter_map(|op| match g.kind(op) {
            OpKind::Wire { name } => Some(name.to_string()),
            _ => None,
        })
        .collect();
    assert_eq!(
        wire_names
            .iter()
            .filter(|n| n.as_str() == "ready0")
            .count(),
        1
    );
    assert!(wire_names.iter().any(|n| n == "valid_in"));
    assert!(wire_names.iter().any(|n| n == "ready_in"));

    let data_regs: Vec<_> = ops
        .iter()
        .copied()
        .filter(|&op| {
            matches!(g.kind(op), OpKind::Reg { name } if *name == "data0.0")
        })
        .collect();
    assert_eq!(data_regs.len(), 1);
    let data_reg = g.result(data_regs[0], 0);

    // The flushable control: one when on valid0 with both branches.
    let valid0 = g.result(valid_regs[0], 0);
    let guard = ops
        .iter()
        .copied()
        .find(|&op| {
            matches!(g.kind(op), OpKind::When)
                && g.operand(op, 0) == valid0
        })
        .expect("flushable control guard");
    assert_eq!(g.regions(guard).len(), 2);

    // Occupied stage: the data register updates under demand; idle stage:
    // it updates unconditionally. Both connects read the add result.
    let add_prim = ops
        .iter()
        .copied()
        .find(|&op| matches!(g.kind(op), OpKind::Prim(PrimOp::Add)))
        .expect("lowered stage add");
    let add_result = g.result(add_prim, 0);
    let reg_updates: Vec<_> = connects(&g, sub)
        .into_iter()
        .filter(|&(dest, src)| dest == data_reg && src == add_result)
        .collect();
    assert_eq!(reg_updates.len(), 2);

    // The output data is driven by the stage register.
    let output_driven = connects(&g, sub).into_iter().any(|(dest, src)| {
        port_subfield(&g, sub, dest) == Some((2, "data".to_string()))
            && src == data_reg
    });
    assert!(output_driven);
}

// ===================== universal properties =====================

#[test]
fn binary_operands_consumed_only_on_output_handshake() {
    let mut g = Graph::new();
    let func =
        g.add_func("live", vec![edge(16), edge(16)], vec![edge(16)]);
    let body = g.entry_block(func);
    let a = g.block_arg(body, 0);
    let b = g.block_arg(body, 1);
    let sub =
        g.create_op(OpKind::Arith(ArithOp::Sub), vec![a, b], vec![edge(16)]);
    g.insert_op_at_end(sub, body);
    let ret = g.create_op(OpKind::Return, vec![g.result(sub, 0)], vec![]);
    g.insert_op_at_end(ret, body);

    lower(&mut g);

    let circuit = circuit(&g);
    let module = find_module(&g, circuit, "subi_2ins_1outs");
    for arg in 0..2 {
        let (_, src) = connects(&g, module)
            .into_iter()
            .find(|&(dest, _)| {
                port_subfield(&g, module, dest)
                    == Some((arg, "ready".to_string()))
            })
            .expect("operand ready driver");
        let mut leaves = Vec::new();
        and_leaves(&g, src, &mut leaves);
        let mut fields: Vec<_> = leaves
            .into_iter()
            .filter_map(|leaf| port_subfield(&g, module, leaf))
            .collect();
        fields.sort();
        assert_eq!(
            fields,
            vec![
                (0, "valid".to_string()),
                (1, "valid".to_string()),
                (2, "ready".to_string())
            ]
        );
    }
}

#[test]
fn join_output_valid_is_conjunction_of_inputs() {
    let mut g = Graph::new();
    let func = g.add_func(
        "sync",
        vec![Type::None, Type::None, Type::None],
        vec![Type::None],
    );
    let body = g.entry_block(func);
    let operands: Vec<_> = g.block_args(body).to_vec();
    let join = g.create_op(OpKind::Join, operands, vec![Type::None]);
    g.insert_op_at_end(join, body);
    let ret = g.create_op(OpKind::Return, vec![g.result(join, 0)], vec![]);
    g.insert_op_at_end(ret, body);

    lower(&mut g);

    let circuit = circuit(&g);
    let module = find_module(&g, circuit, "join_3ins_1outs");

    let (_, src) = connects(&g, module)
        .into_iter()
        .find(|&(dest, _)| {
            port_subfield(&g, module, dest)
                == Some((3, "valid".to_string()))
        })
        .expect("output valid driver");
    let mut leaves = Vec::new();
    and_leaves(&g, src, &mut leaves);
    let mut fields: Vec<_> = leaves
        .into_iter()
        .filter_map(|leaf| port_subfield(&g, module, leaf))
        .collect();
    fields.sort();
    assert_eq!(
        fields,
        vec![
            (0, "valid".to_string()),
            (1, "valid".to_string()),
            (2, "valid".to_string())
        ]
    );

    // Control-only: the join module has no data subfields at all.
    assert!(ops_in_module(&g, module).iter().all(|&op| {
        !matches!(g.kind(op), OpKind::Subfield { field } if *field == "data")
    }));
}

#[test]
fn merge_gives_priority_to_earlier_inputs() {
    let mut g = Graph::new();
    let func =
        g.add_func("first", vec![edge(16), edge(16)], vec![edge(16)]);
    let body = g.entry_block(func);
    let operands: Vec<_> = g.block_args(body).to_vec();
    let merge = g.create_op(OpKind::Merge, operands, vec![edge(16)]);
    g.insert_op_at_end(merge, body);
    let ret = g.create_op(OpKind::Return, vec![g.result(merge, 0)], vec![]);
    g.insert_op_at_end(ret, body);

    lower(&mut g);

    let circuit = circuit(&g);
    let module = find_module(&g, circuit, "merge_2ins_1outs");
    let module_body = g.entry_block(module);

    // The outer when tests input 0; input 1 only drives the output from
    // the else region.
    let outer = g
        .block_ops(module_body)
        .iter()
        .copied()
        .find(|&op| matches!(g.kind(op), OpKind::When))
        .expect("merge priority chain");
    assert_eq!(
        port_subfield(&g, module, g.operand(outer, 0)),
        Some((0, "valid".to_string()))
    );
    assert_eq!(g.regions(outer).len(), 2);
}

#[test]
fn instance_ports_are_the_dual_of_the_submodule() {
    let mut g = Graph::new();
    let func =
        g.add_func("dual", vec![edge(32), edge(32)], vec![edge(32)]);
    let body = g.entry_block(func);
    let a = g.block_arg(body, 0);
    let b = g.block_arg(body, 1);
    let mul =
        g.create_op(OpKind::Arith(ArithOp::Mul), vec![a, b], vec![edge(32)]);
    g.insert_op_at_end(mul, body);
    let ret = g.create_op(OpKind::Return, vec![g.result(mul, 0)], vec![]);
    g.insert_op_at_end(ret, body);

    lower(&mut g);

    let circuit = circuit(&g);
    let sub = find_module(&g, circuit, "muli_2ins_1outs");
    let top = find_module(&g, circuit, "dual");
    let OpKind::Module { ports, .. } = g.kind(sub).clone() else {
        unreachable!()
    };

    let instance = ops_in_module(&g, top)
        .into_iter()
        .find(|&op| matches!(g.kind(op), OpKind::Instance { .. }))
        .expect("instance of the multiplier");
    let inst_ty = g.value_ty(g.result(instance, 0)).clone();
    let fields = inst_ty.fields();
    assert_eq!(fields.len(), ports.len());
    for (field, port) in fields.iter().zip(ports.iter()) {
        assert_eq!(field.name, port.name);
        assert!(field.flip, "instance-side ports are all flipped");
        assert_eq!(field.ty, port.ty);
    }
}

#[test]
fn control_merge_reports_the_winning_index() {
    let mut g = Graph::new();
    let func = g.add_func(
        "arbitrate",
        vec![Type::None, Type::None],
        vec![Type::None, Type::Index],
    );
    let body = g.entry_block(func);
    let operands: Vec<_> = g.block_args(body).to_vec();
    let cmerge = g.create_op(
        OpKind::ControlMerge { control: true },
        operands,
        vec![Type::None, Type::Index],
    );
    g.insert_op_at_end(cmerge, body);
    let results: Vec<_> = g.results(cmerge).to_vec();
    let ret = g.create_op(OpKind::Return, results, vec![]);
    g.insert_op_at_end(ret, body);

    lower(&mut g);

    let circuit = circuit(&g);
    let module =
        find_module(&g, circuit, "control_merge_2ins_2outs_ctrl");

    // The winning index constants are index-typed.
    let mut winners: Vec<u64> = ops_in_module(&g, module)
        .into_iter()
        .filter_map(|op| match g.kind(op) {
            OpKind::HwConstant { value }
                if *g.value_ty(g.result(op, 0)) == Type::UInt(64) =>
            {
                Some(*value)
            }
            _ => None,
        })
        .collect();
    winners.sort();
    assert_eq!(winners, vec![0, 1]);
}

#[test]
fn sink_is_always_ready_and_drops_dangling_readers() {
    let mut g = Graph::new();
    let func = g.add_func("drop", vec![edge(8)], vec![]);
    let body = g.entry_block(func);
    let a = g.block_arg(body, 0);
    let sink = g.create_op(OpKind::Sink, vec![a], vec![]);
    g.insert_op_at_end(sink, body);
    let ret = g.create_op(OpKind::Return, vec![], vec![]);
    g.insert_op_at_end(ret, body);

    lower(&mut g);

    let circuit = circuit(&g);
    let module = find_module(&g, circuit, "sink_1ins_0outs");

    let (_, src) = connects(&g, module)
        .into_iter()
        .find(|&(dest, _)| {
            port_subfield(&g, module, dest)
                == Some((0, "ready".to_string()))
        })
        .expect("sink ready driver");
    let def = g.defining_op(src).unwrap();
    assert!(matches!(g.kind(def), OpKind::HwConstant { value: 1 }));

    // The valid and data projections were erased.
    for op in ops_in_module(&g, module) {
        if let OpKind::Subfield { field } = g.kind(op) {
            assert_eq!(*field, "ready");
        }
    }
}

#[test]
fn constant_emits_its_value_on_the_control_token() {
    let mut g = Graph::new();
    let func = g.add_func("lit", vec![Type::None], vec![edge(32)]);
    let body = g.entry_block(func);
    let ctrl = g.block_arg(body, 0);
    let constant = g.create_op(
        OpKind::Constant { value: 42 },
        vec![ctrl],
        vec![edge(32)],
    );
    g.insert_op_at_end(constant, body);
    let ret =
        g.create_op(OpKind::Return, vec![g.result(constant, 0)], vec![]);
    g.insert_op_at_end(ret, body);

    lower(&mut g);

    let circuit = circuit(&g);
    let module = find_module(&g, circuit, "constant_1ins_1outs");
    let (_, src) = connects(&g, module)
        .into_iter()
        .find(|&(dest, _)| {
            port_subfield(&g, module, dest)
                == Some((1, "data".to_string()))
        })
        .expect("constant data driver");
    let def = g.defining_op(src).unwrap();
    assert!(matches!(g.kind(def), OpKind::HwConstant { value: 42 }));
}

#[test]
fn buffer_submodule_exposes_clock_and_reset() {
    let mut g = Graph::new();
    let func = g.add_func("hold", vec![edge(8)], vec![edge(8)]);
    let body = g.entry_block(func);
    let a = g.block_arg(body, 0);
    let buffer = g.create_op(
        OpKind::Buffer {
            slots: 2,
            sequential: true,
        },
        vec![a],
        vec![edge(8)],
    );
    g.insert_op_at_end(buffer, body);
    let ret = g.create_op(OpKind::Return, vec![g.result(buffer, 0)], vec![]);
    g.insert_op_at_end(ret, body);

    lower(&mut g);

    let circuit = circuit(&g);
    let module = find_module(&g, circuit, "buffer_1ins_1outs_2slots_seq");
    let OpKind::Module { ports, .. } = g.kind(module).clone() else {
        unreachable!()
    };
    assert_eq!(ports.len(), 4);
    assert_eq!(ports[2].name, "clock");
    assert_eq!(ports[2].ty, Type::Clock);
    assert_eq!(ports[3].name, "reset");
    assert_eq!(ports[3].ty, Type::UInt(1));
}

#[test]
fn multiple_clock_domains_number_their_ports() {
    let mut g = Graph::new();
    let func = g.add_func("domains", vec![edge(8)], vec![edge(8)]);
    let body = g.entry_block(func);
    let a = g.block_arg(body, 0);
    let branch = g.create_op(
        OpKind::Branch { control: false },
        vec![a],
        vec![edge(8)],
    );
    g.insert_op_at_end(branch, body);
    let ret = g.create_op(OpKind::Return, vec![g.result(branch, 0)], vec![]);
    g.insert_op_at_end(ret, body);

    HandshakeToFirrtl::new(2).run(&mut g).unwrap();

    let circuit = circuit(&g);
    let top = find_module(&g, circuit, "domains");
    let OpKind::Module { ports, .. } = g.kind(top).clone() else {
        unreachable!()
    };
    let names: Vec<_> =
        ports.iter().map(|p| p.name.to_string()).collect();
    assert_eq!(
        &names[2..],
        &["clock0", "reset0", "clock1", "reset1"]
    );
}

// ===================== diagnostics =====================

#[test]
fn pass_identity_is_stable() {
    assert_eq!(
        HandshakeToFirrtl::name(),
        "lower-handshake-to-firrtl"
    );
    assert_eq!(
        HandshakeToFirrtl::description(),
        "Lowering to FIRRTL Dialect"
    );
}

#[test]
fn unsupported_edge_type_is_reported() {
    let mut g = Graph::new();
    let func = g.add_func("clocked", vec![Type::Clock], vec![]);
    let body = g.entry_block(func);
    let ret = g.create_op(OpKind::Return, vec![], vec![]);
    g.insert_op_at_end(ret, body);

    let err = HandshakeToFirrtl::default().run(&mut g).unwrap_err();
    assert!(matches!(err, Error::UnsupportedType(_)));
}

#[test]
fn unsupported_operation_is_reported() {
    let mut g = Graph::new();
    let func = g.add_func("odd", vec![], vec![]);
    let body = g.entry_block(func);
    let wire = g.create_op(
        OpKind::Wire {
            name: "loose".into(),
        },
        vec![],
        vec![Type::UInt(1)],
    );
    g.insert_op_at_end(wire, body);
    let ret = g.create_op(OpKind::Return, vec![], vec![]);
    g.insert_op_at_end(ret, body);

    let err = HandshakeToFirrtl::default().run(&mut g).unwrap_err();
    assert!(matches!(err, Error::UnsupportedOperation(_)));
}

#[test]
fn malformed_constant_is_reported() {
    let mut g = Graph::new();
    let func = g.add_func("tokenlit", vec![Type::None], vec![Type::None]);
    let body = g.entry_block(func);
    let ctrl = g.block_arg(body, 0);
    // A constant whose result carries no data subfield is malformed.
    let constant = g.create_op(
        OpKind::Constant { value: 1 },
        vec![ctrl],
        vec![Type::None],
    );
    g.insert_op_at_end(constant, body);
    let ret =
        g.create_op(OpKind::Return, vec![g.result(constant, 0)], vec![]);
    g.insert_op_at_end(ret, body);

    let err = HandshakeToFirrtl::default().run(&mut g).unwrap_err();
    assert!(matches!(err, Error::MalformedStructure(_)));
}
