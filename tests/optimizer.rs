//! Whole-pipeline integration tests.
//!
//! These tests verify the complete optimizer using the public API:
//! 1. Build a program model with `ProgramBuilder`/`BodyBuilder`
//! 2. Run the interprocedural analysis and rewrite pass
//! 3. Verify the field classifications in the report
//! 4. Verify the exact instructions that were (and were not) replaced

use ipcp::{
    prelude::*,
    rewrite::{optimize, optimize_with},
};

/// A `const` into `dest`.
fn konst(dest: u16, value: i64) -> Instr {
    Instr::Const {
        dest: Reg::new(dest),
        value,
    }
}

/// A body consisting of one straight-line block.
fn linear_body(reg_count: u16, param_regs: Vec<Reg>, instrs: Vec<Instr>, ret: Option<Reg>) -> Result<MethodBody> {
    let mut body = BodyBuilder::new(reg_count, param_regs);
    let b0 = body.block();
    for instr in instrs {
        body.push(b0, instr);
    }
    body.terminate(b0, Terminator::Return { value: ret });
    body.finish()
}

/// The instructions of block `index` of a method.
fn instrs_of(program: &Program, method: MethodId, index: u32) -> Vec<Instr> {
    let body = program
        .method(method)
        .expect("method exists")
        .body
        .as_ref()
        .expect("method has a body");
    body.block(BlockId::new(index))
        .expect("block exists")
        .instrs()
        .to_vec()
}

/// Looks up a field's converged classification in the report.
fn fact_of(report: &OptimizationReport, field: FieldId) -> FieldFact {
    report
        .fields
        .iter()
        .find(|f| f.field == field)
        .expect("field classified")
        .fact
}

/// A class with two constructors that agree on one field and disagree on the
/// other, plus a method constructing through both and reading both fields.
///
/// Only the agreeing field's reads collapse; path-insensitivity means the
/// disagreeing field never collapses, even right after a known construction.
#[test]
fn test_two_constructors() -> Result<()> {
    let mut builder = ProgramBuilder::new();
    let class = builder.add_class("TestA");
    let a = builder.add_field(class, "a", ValueType::Int, FieldFlags::empty());
    let b = builder.add_field(class, "b", ValueType::Int, FieldFlags::empty());

    // <init>() { a = 0; b = 1 }
    let ctor0 = builder.declare_method(class, "<init>", MethodFlags::CONSTRUCTOR, 1);
    builder.set_body(
        ctor0,
        linear_body(
            2,
            vec![Reg::new(0)],
            vec![
                konst(1, 0),
                Instr::IPut {
                    src: Reg::new(1),
                    object: Reg::new(0),
                    field: a,
                },
                konst(1, 1),
                Instr::IPut {
                    src: Reg::new(1),
                    object: Reg::new(0),
                    field: b,
                },
            ],
            None,
        )?,
    );

    // <init>(x) { b = x }   -- `a` keeps its default of zero
    let ctor1 = builder.declare_method(class, "<init>", MethodFlags::CONSTRUCTOR, 2);
    builder.set_body(
        ctor1,
        linear_body(
            2,
            vec![Reg::new(0), Reg::new(1)],
            vec![Instr::IPut {
                src: Reg::new(1),
                object: Reg::new(0),
                field: b,
            }],
            None,
        )?,
    );

    // two_ctors() { one = new TestA(); one.a; one.b; two = new TestA(0); two.a; two.b }
    let harness = builder.declare_method(class, "two_ctors", MethodFlags::STATIC, 0);
    builder.set_body(
        harness,
        linear_body(
            7,
            vec![],
            vec![
                Instr::NewInstance {
                    dest: Reg::new(0),
                    class,
                },
                Instr::InvokeDirect {
                    method: ctor0,
                    this: Reg::new(0),
                    args: vec![],
                },
                Instr::IGet {
                    dest: Reg::new(1),
                    object: Reg::new(0),
                    field: a,
                },
                Instr::IGet {
                    dest: Reg::new(2),
                    object: Reg::new(0),
                    field: b,
                },
                Instr::NewInstance {
                    dest: Reg::new(3),
                    class,
                },
                konst(4, 0),
                Instr::InvokeDirect {
                    method: ctor1,
                    this: Reg::new(3),
                    args: vec![Reg::new(4)],
                },
                Instr::IGet {
                    dest: Reg::new(5),
                    object: Reg::new(3),
                    field: a,
                },
                Instr::IGet {
                    dest: Reg::new(6),
                    object: Reg::new(3),
                    field: b,
                },
            ],
            None,
        )?,
    );

    let mut program = builder.finish()?;
    let report = optimize(&mut program)?;

    assert_eq!(fact_of(&report, a), FieldFact::KnownConstant(ConstValue::Int(0)));
    assert_eq!(fact_of(&report, b), FieldFact::Conflicting);

    let instrs = instrs_of(&program, harness, 0);
    // Both reads of `a` collapse to the agreed constant.
    assert_eq!(instrs[2], konst(1, 0));
    assert_eq!(instrs[7], konst(5, 0));
    // Reads of `b` survive untouched, even though the second object was just
    // constructed with a known argument: `b` is not final.
    assert!(matches!(instrs[3], Instr::IGet { field, .. } if field == b));
    assert!(matches!(instrs[8], Instr::IGet { field, .. } if field == b));
    assert_eq!(report.rewrites_of_kind(RewriteKind::InstanceRead), 2);
    Ok(())
}

/// A field written by a non-constructor method. The extra writer agrees on
/// one field (still collapses) and disagrees on the other (never collapses).
#[test]
fn test_field_modified_outside_constructor() -> Result<()> {
    let mut builder = ProgramBuilder::new();
    let class = builder.add_class("TestB");
    let a = builder.add_field(class, "a", ValueType::Int, FieldFlags::empty());
    let b = builder.add_field(class, "b", ValueType::Int, FieldFlags::empty());

    let world = builder.add_class("Math");
    let random = builder.declare_method(world, "random", MethodFlags::STATIC, 0);

    // <init>() {}   -- both fields keep their default of zero
    let ctor = builder.declare_method(class, "<init>", MethodFlags::CONSTRUCTOR, 1);
    builder.set_body(ctor, linear_body(1, vec![Reg::new(0)], vec![], None)?);

    // change_ifield() { if random() > 1 { a = 0; b = 1 } else { a = 0; b = 0 } }
    let change = builder.declare_method(class, "change_ifield", MethodFlags::empty(), 1);
    let mut body = BodyBuilder::new(4, vec![Reg::new(0)]);
    let b0 = body.block();
    let b1 = body.block();
    let b2 = body.block();
    let b3 = body.block();
    body.push(
        b0,
        Instr::InvokeStatic {
            dest: Some(Reg::new(1)),
            method: random,
            args: vec![],
        },
    )
    .push(b0, konst(2, 1))
    .terminate(
        b0,
        Terminator::Branch {
            cmp: CmpKind::Gt,
            lhs: Reg::new(1),
            rhs: Reg::new(2),
            then_target: b1,
            else_target: b2,
        },
    );
    body.push(b1, konst(3, 0))
        .push(
            b1,
            Instr::IPut {
                src: Reg::new(3),
                object: Reg::new(0),
                field: a,
            },
        )
        .push(b1, konst(3, 1))
        .push(
            b1,
            Instr::IPut {
                src: Reg::new(3),
                object: Reg::new(0),
                field: b,
            },
        )
        .terminate(b1, Terminator::Goto { target: b3 });
    body.push(b2, konst(3, 0))
        .push(
            b2,
            Instr::IPut {
                src: Reg::new(3),
                object: Reg::new(0),
                field: a,
            },
        )
        .push(b2, konst(3, 0))
        .push(
            b2,
            Instr::IPut {
                src: Reg::new(3),
                object: Reg::new(0),
                field: b,
            },
        )
        .terminate(b2, Terminator::Goto { target: b3 });
    body.terminate(b3, Terminator::Return { value: None });
    builder.set_body(change, body.finish()?);

    // harness() { o = new TestB(); o.change_ifield(); o.a; o.b }
    let harness = builder.declare_method(class, "harness", MethodFlags::STATIC, 0);
    builder.set_body(
        harness,
        linear_body(
            3,
            vec![],
            vec![
                Instr::NewInstance {
                    dest: Reg::new(0),
                    class,
                },
                Instr::InvokeDirect {
                    method: ctor,
                    this: Reg::new(0),
                    args: vec![],
                },
                Instr::InvokeVirtual {
                    dest: None,
                    method: change,
                    this: Reg::new(0),
                    args: vec![],
                },
                Instr::IGet {
                    dest: Reg::new(1),
                    object: Reg::new(0),
                    field: a,
                },
                Instr::IGet {
                    dest: Reg::new(2),
                    object: Reg::new(0),
                    field: b,
                },
            ],
            None,
        )?,
    );

    let mut program = builder.finish()?;
    let report = optimize(&mut program)?;

    assert_eq!(fact_of(&report, a), FieldFact::KnownConstant(ConstValue::Int(0)));
    assert_eq!(fact_of(&report, b), FieldFact::Conflicting);

    let instrs = instrs_of(&program, harness, 0);
    assert_eq!(instrs[3], konst(1, 0));
    assert!(matches!(instrs[4], Instr::IGet { field, .. } if field == b));
    Ok(())
}

/// `get_item(x) { if x < 3 { return 5 } return 10 }` plus a class whose
/// initializer stores `get_item(2)` into a static.
fn item_table(builder: &mut ProgramBuilder) -> Result<(MethodId, FieldId, MethodId)> {
    let lookup = builder.add_class("GetItem");
    let get_item = builder.declare_method(lookup, "get_item", MethodFlags::STATIC, 1);
    let mut body = BodyBuilder::new(3, vec![Reg::new(0)]);
    let b0 = body.block();
    let b1 = body.block();
    let b2 = body.block();
    body.push(b0, konst(1, 3)).terminate(
        b0,
        Terminator::Branch {
            cmp: CmpKind::Lt,
            lhs: Reg::new(0),
            rhs: Reg::new(1),
            then_target: b1,
            else_target: b2,
        },
    );
    body.push(b1, konst(2, 5)).terminate(
        b1,
        Terminator::Return {
            value: Some(Reg::new(2)),
        },
    );
    body.push(b2, konst(2, 10)).terminate(
        b2,
        Terminator::Return {
            value: Some(Reg::new(2)),
        },
    );
    builder.set_body(get_item, body.finish()?);

    let holder = builder.add_class("TestC");
    let a = builder.add_field(
        holder,
        "a",
        ValueType::Int,
        FieldFlags::STATIC | FieldFlags::FINAL,
    );
    let clinit = builder.declare_method(
        holder,
        "<clinit>",
        MethodFlags::STATIC | MethodFlags::CLASS_INIT,
        0,
    );
    builder.set_body(
        clinit,
        linear_body(
            2,
            vec![],
            vec![
                konst(0, 2),
                Instr::InvokeStatic {
                    dest: Some(Reg::new(1)),
                    method: get_item,
                    args: vec![Reg::new(0)],
                },
                Instr::SPut {
                    src: Reg::new(1),
                    field: a,
                },
            ],
            None,
        )?,
    );
    Ok((get_item, a, clinit))
}

/// A static initialized through a branching callee: specialization on the
/// constant argument selects one arm, and both the stored field and other
/// call sites of the callee collapse.
#[test]
fn test_constant_through_specialized_call() -> Result<()> {
    let mut builder = ProgramBuilder::new();
    let (get_item, a, clinit) = item_table(&mut builder)?;

    let class = builder.add_class("Harness");
    // read() { return TestC.a }
    let read = builder.declare_method(class, "read", MethodFlags::STATIC, 0);
    builder.set_body(
        read,
        linear_body(
            1,
            vec![],
            vec![Instr::SGet {
                dest: Reg::new(0),
                field: a,
            }],
            Some(Reg::new(0)),
        )?,
    );
    // another_call() { return get_item(9) }
    let another = builder.declare_method(class, "another_call", MethodFlags::STATIC, 0);
    builder.set_body(
        another,
        linear_body(
            2,
            vec![],
            vec![
                konst(0, 9),
                Instr::InvokeStatic {
                    dest: Some(Reg::new(1)),
                    method: get_item,
                    args: vec![Reg::new(0)],
                },
            ],
            Some(Reg::new(1)),
        )?,
    );

    let mut program = builder.finish()?;
    let report = optimize(&mut program)?;

    assert_eq!(fact_of(&report, a), FieldFact::KnownConstant(ConstValue::Int(5)));

    // The static read collapses to the stored constant.
    assert_eq!(instrs_of(&program, read, 0)[0], konst(0, 5));
    // get_item(9) takes the other arm.
    assert_eq!(instrs_of(&program, another, 0)[1], konst(1, 10));
    // The initializer's own call site folds too (the callee is pure).
    assert_eq!(instrs_of(&program, clinit, 0)[1], konst(1, 5));
    assert_eq!(report.rewrites_of_kind(RewriteKind::CallResult), 2);
    Ok(())
}

/// Statics holding boxed small integers: reads collapse to loads of the
/// canonical cached instance, values outside the cache range never collapse,
/// and the boxing calls themselves are kept.
#[test]
fn test_boxed_integer_constants() -> Result<()> {
    let mut builder = ProgramBuilder::new();
    let integer = builder.add_class("Integer");
    let value_of = builder.add_intrinsic(integer, "valueOf", 1, Intrinsic::BoxInt);

    let class = builder.add_class("IntegerHolder");
    // f2 and g2 are boxed from the same literal: reads of either must load
    // the identical canonical instance.
    let names = ["f0", "f1", "f2", "g2", "big"];
    let values = [0, 1, 2, 2, 1000_i64];
    let mut fields = Vec::new();
    for name in names {
        fields.push(builder.add_field(
            class,
            name,
            ValueType::Reference,
            FieldFlags::STATIC | FieldFlags::FINAL,
        ));
    }

    let clinit = builder.declare_method(
        class,
        "<clinit>",
        MethodFlags::STATIC | MethodFlags::CLASS_INIT,
        0,
    );
    let mut instrs = Vec::new();
    for (value, field) in values.iter().zip(&fields) {
        instrs.push(konst(0, *value));
        instrs.push(Instr::InvokeStatic {
            dest: Some(Reg::new(1)),
            method: value_of,
            args: vec![Reg::new(0)],
        });
        instrs.push(Instr::SPut {
            src: Reg::new(1),
            field: *field,
        });
    }
    builder.set_body(clinit, linear_body(2, vec![], instrs, None)?);

    let harness = builder.declare_method(class, "use_boxed", MethodFlags::STATIC, 0);
    builder.set_body(
        harness,
        linear_body(
            5,
            vec![],
            fields
                .iter()
                .enumerate()
                .map(|(i, field)| Instr::SGet {
                    dest: Reg::new(i as u16),
                    field: *field,
                })
                .collect(),
            None,
        )?,
    );

    let mut program = builder.finish()?;
    let report = optimize(&mut program)?;

    for (i, expected) in [0, 1, 2, 2].iter().enumerate() {
        assert_eq!(
            fact_of(&report, fields[i]),
            FieldFact::KnownConstant(ConstValue::CachedBox(*expected))
        );
    }
    // 1000 has no cache slot, so no identity guarantee and no constant.
    assert_eq!(fact_of(&report, fields[4]), FieldFact::Conflicting);

    let instrs = instrs_of(&program, harness, 0);
    for (i, expected) in [0, 1, 2, 2].iter().enumerate() {
        assert_eq!(
            instrs[i],
            Instr::LoadCachedBox {
                dest: Reg::new(i as u16),
                value: *expected
            }
        );
    }
    // f2 and g2 load the same canonical instance.
    assert_eq!(instrs[2].dest(), Some(Reg::new(2)));
    assert!(matches!(
        (&instrs[2], &instrs[3]),
        (
            Instr::LoadCachedBox { value: a, .. },
            Instr::LoadCachedBox { value: b, .. }
        ) if a == b
    ));
    assert!(matches!(instrs[4], Instr::SGet { .. }));

    // The boxing factory calls in the initializer are kept as-is.
    let clinit_instrs = instrs_of(&program, clinit, 0);
    assert!(clinit_instrs
        .iter()
        .filter(|i| matches!(i, Instr::InvokeStatic { .. }))
        .count()
        == 5);
    Ok(())
}

/// Reads of a final instance field right after a known construction collapse
/// per construction site, even though the global fact is conflicting.
#[test]
fn test_immutable_instance_field() -> Result<()> {
    let mut builder = ProgramBuilder::new();
    let class = builder.add_class("ObjectWithImmutField");
    let field = builder.add_field(class, "field", ValueType::Int, FieldFlags::FINAL);

    // <init>(x) { field = x }
    let ctor = builder.declare_method(class, "<init>", MethodFlags::CONSTRUCTOR, 2);
    builder.set_body(
        ctor,
        linear_body(
            2,
            vec![Reg::new(0), Reg::new(1)],
            vec![Instr::IPut {
                src: Reg::new(1),
                object: Reg::new(0),
                field,
            }],
            None,
        )?,
    );

    // get_field() { return field }
    let getter = builder.declare_method(class, "get_field", MethodFlags::empty(), 1);
    builder.set_body(
        getter,
        linear_body(
            2,
            vec![Reg::new(0)],
            vec![Instr::IGet {
                dest: Reg::new(1),
                object: Reg::new(0),
                field,
            }],
            Some(Reg::new(1)),
        )?,
    );

    // harness() {
    //   x = new ObjectWithImmutField(42); x.get_field(); x.field;
    //   y = new ObjectWithImmutField(43); y.field;
    // }
    let harness = builder.declare_method(class, "harness", MethodFlags::STATIC, 0);
    builder.set_body(
        harness,
        linear_body(
            8,
            vec![],
            vec![
                Instr::NewInstance {
                    dest: Reg::new(0),
                    class,
                },
                konst(1, 42),
                Instr::InvokeDirect {
                    method: ctor,
                    this: Reg::new(0),
                    args: vec![Reg::new(1)],
                },
                Instr::InvokeVirtual {
                    dest: Some(Reg::new(2)),
                    method: getter,
                    this: Reg::new(0),
                    args: vec![],
                },
                Instr::IGet {
                    dest: Reg::new(3),
                    object: Reg::new(0),
                    field,
                },
                Instr::NewInstance {
                    dest: Reg::new(4),
                    class,
                },
                konst(5, 43),
                Instr::InvokeDirect {
                    method: ctor,
                    this: Reg::new(4),
                    args: vec![Reg::new(5)],
                },
                Instr::IGet {
                    dest: Reg::new(6),
                    object: Reg::new(4),
                    field,
                },
            ],
            None,
        )?,
    );

    let mut program = builder.finish()?;
    let report = optimize(&mut program)?;

    // Globally the writes disagree, so the field itself never collapses.
    assert_eq!(fact_of(&report, field), FieldFact::Conflicting);

    // But each construction site knows its own value: the field is final, so
    // not even the interleaved virtual call can disturb it.
    let instrs = instrs_of(&program, harness, 0);
    assert_eq!(instrs[4], konst(3, 42));
    assert_eq!(instrs[8], konst(6, 43));
    // The getter body reads through the conflicting global fact and is kept.
    assert!(matches!(
        instrs_of(&program, getter, 0)[0],
        Instr::IGet { .. }
    ));
    Ok(())
}

/// A callee with a constant return but a field write is never folded at its
/// call sites; the constant still flows into the caller's summary.
#[test]
fn test_impure_callee_is_not_folded() -> Result<()> {
    let mut builder = ProgramBuilder::new();
    let class = builder.add_class("P");
    let counter = builder.add_field(class, "counter", ValueType::Int, FieldFlags::STATIC);

    // bump() { counter = 7; return 7 }
    let bump = builder.declare_method(class, "bump", MethodFlags::STATIC, 0);
    builder.set_body(
        bump,
        linear_body(
            1,
            vec![],
            vec![
                konst(0, 7),
                Instr::SPut {
                    src: Reg::new(0),
                    field: counter,
                },
            ],
            Some(Reg::new(0)),
        )?,
    );

    // caller() { return bump() }
    let caller = builder.declare_method(class, "caller", MethodFlags::STATIC, 0);
    builder.set_body(
        caller,
        linear_body(
            1,
            vec![],
            vec![Instr::InvokeStatic {
                dest: Some(Reg::new(0)),
                method: bump,
                args: vec![],
            }],
            Some(Reg::new(0)),
        )?,
    );

    let mut program = builder.finish()?;
    let report = optimize(&mut program)?;

    assert!(matches!(
        instrs_of(&program, caller, 0)[0],
        Instr::InvokeStatic { .. }
    ));
    assert_eq!(report.rewrites_of_kind(RewriteKind::CallResult), 0);
    Ok(())
}

/// Constant arguments propagate through a bounded chain of recursive
/// specializations.
#[test]
fn test_recursive_specialization() -> Result<()> {
    let mut builder = ProgramBuilder::new();
    let class = builder.add_class("R");

    // countdown(x) { if x <= 0 { return 0 } return countdown(x - 1) }
    let countdown = builder.declare_method(class, "countdown", MethodFlags::STATIC, 1);
    let mut body = BodyBuilder::new(3, vec![Reg::new(0)]);
    let b0 = body.block();
    let b1 = body.block();
    let b2 = body.block();
    body.push(b0, konst(1, 0)).terminate(
        b0,
        Terminator::Branch {
            cmp: CmpKind::Le,
            lhs: Reg::new(0),
            rhs: Reg::new(1),
            then_target: b1,
            else_target: b2,
        },
    );
    body.push(b1, konst(2, 0)).terminate(
        b1,
        Terminator::Return {
            value: Some(Reg::new(2)),
        },
    );
    body.push(b2, konst(1, 1))
        .push(
            b2,
            Instr::BinOp {
                op: BinKind::Sub,
                dest: Reg::new(2),
                lhs: Reg::new(0),
                rhs: Reg::new(1),
            },
        )
        .push(
            b2,
            Instr::InvokeStatic {
                dest: Some(Reg::new(2)),
                method: countdown,
                args: vec![Reg::new(2)],
            },
        )
        .terminate(
            b2,
            Terminator::Return {
                value: Some(Reg::new(2)),
            },
        );
    builder.set_body(countdown, body.finish()?);

    // caller() { return countdown(3) }
    let caller = builder.declare_method(class, "caller", MethodFlags::STATIC, 0);
    builder.set_body(
        caller,
        linear_body(
            2,
            vec![],
            vec![
                konst(0, 3),
                Instr::InvokeStatic {
                    dest: Some(Reg::new(1)),
                    method: countdown,
                    args: vec![Reg::new(0)],
                },
            ],
            Some(Reg::new(1)),
        )?,
    );

    let mut program = builder.finish()?;
    optimize(&mut program)?;

    assert_eq!(instrs_of(&program, caller, 0)[1], konst(1, 0));
    Ok(())
}

/// Running the optimizer on its own output finds nothing left to rewrite and
/// leaves every body untouched.
#[test]
fn test_optimizer_is_idempotent() -> Result<()> {
    let mut builder = ProgramBuilder::new();
    let (_, a, _) = item_table(&mut builder)?;
    let class = builder.add_class("Harness");
    let read = builder.declare_method(class, "read", MethodFlags::STATIC, 0);
    builder.set_body(
        read,
        linear_body(
            1,
            vec![],
            vec![Instr::SGet {
                dest: Reg::new(0),
                field: a,
            }],
            Some(Reg::new(0)),
        )?,
    );
    let mut program = builder.finish()?;

    let first = optimize(&mut program)?;
    assert!(first.total_rewrites() > 0);
    let snapshot = program.clone();

    let second = optimize(&mut program)?;
    assert_eq!(second.total_rewrites(), 0);
    for (id, method) in snapshot.methods() {
        assert_eq!(method.body, program.method(id)?.body);
    }
    // The classifications themselves are stable across runs.
    assert_eq!(fact_of(&second, a), FieldFact::KnownConstant(ConstValue::Int(5)));
    Ok(())
}

/// An exhausted round cap surfaces as a diagnosable error naming the pending
/// methods instead of hanging.
#[test]
fn test_round_cap_overrun_is_diagnosable() -> Result<()> {
    let mut builder = ProgramBuilder::new();
    let (_, _, _) = item_table(&mut builder)?;
    let mut program = builder.finish()?;

    let config = SolverConfig {
        max_rounds: Some(0),
        ..SolverConfig::default()
    };
    let err = optimize_with(&mut program, config).unwrap_err();
    match err {
        Error::FixedPointOverrun { pending, .. } => {
            assert!(!pending.is_empty());
            assert!(pending.iter().all(|name| name.contains('.')));
        }
        other => panic!("expected FixedPointOverrun, got {other}"),
    }
    Ok(())
}

/// Specialization bounds degrade gracefully: a callee beyond the block bound
/// still contributes its context-insensitive summary.
#[test]
fn test_specialization_block_bound() -> Result<()> {
    let mut builder = ProgramBuilder::new();
    let (get_item, _, _) = item_table(&mut builder)?;
    let class = builder.add_class("Harness");
    let caller = builder.declare_method(class, "caller", MethodFlags::STATIC, 0);
    builder.set_body(
        caller,
        linear_body(
            2,
            vec![],
            vec![
                konst(0, 2),
                Instr::InvokeStatic {
                    dest: Some(Reg::new(1)),
                    method: get_item,
                    args: vec![Reg::new(0)],
                },
            ],
            Some(Reg::new(1)),
        )?,
    );
    let mut program = builder.finish()?;

    // get_item has three blocks; a bound of one refuses to specialize it.
    let config = SolverConfig {
        specialize_max_blocks: 1,
        ..SolverConfig::default()
    };
    let report = optimize_with(&mut program, config)?;

    // The call survives: without specialization the summary joins both arms.
    assert!(matches!(
        instrs_of(&program, caller, 0)[1],
        Instr::InvokeStatic { .. }
    ));
    assert_eq!(report.rewrites_of_kind(RewriteKind::CallResult), 0);
    Ok(())
}

/// A constructor that writes a field on only one branch leaves the default
/// observable on the other: the field must classify as conflicting, and a
/// read after a construction that skips the write must survive.
#[test]
fn test_conditional_constructor_write_keeps_default_observable() -> Result<()> {
    let mut builder = ProgramBuilder::new();
    let class = builder.add_class("TestD");
    let f = builder.add_field(class, "f", ValueType::Int, FieldFlags::empty());

    // <init>(p) { if p != 0 { f = 5 } }
    let ctor = builder.declare_method(class, "<init>", MethodFlags::CONSTRUCTOR, 2);
    let mut body = BodyBuilder::new(3, vec![Reg::new(0), Reg::new(1)]);
    let b0 = body.block();
    let b1 = body.block();
    let b2 = body.block();
    body.push(b0, konst(2, 0)).terminate(
        b0,
        Terminator::Branch {
            cmp: CmpKind::Ne,
            lhs: Reg::new(1),
            rhs: Reg::new(2),
            then_target: b1,
            else_target: b2,
        },
    );
    body.push(b1, konst(2, 5))
        .push(
            b1,
            Instr::IPut {
                src: Reg::new(2),
                object: Reg::new(0),
                field: f,
            },
        )
        .terminate(b1, Terminator::Goto { target: b2 });
    body.terminate(b2, Terminator::Return { value: None });
    builder.set_body(ctor, body.finish()?);

    // harness() { o = new TestD(0); o.f }
    let harness = builder.declare_method(class, "harness", MethodFlags::STATIC, 0);
    builder.set_body(
        harness,
        linear_body(
            3,
            vec![],
            vec![
                Instr::NewInstance {
                    dest: Reg::new(0),
                    class,
                },
                konst(1, 0),
                Instr::InvokeDirect {
                    method: ctor,
                    this: Reg::new(0),
                    args: vec![Reg::new(1)],
                },
                Instr::IGet {
                    dest: Reg::new(2),
                    object: Reg::new(0),
                    field: f,
                },
            ],
            None,
        )?,
    );

    let mut program = builder.finish()?;
    let report = optimize(&mut program)?;

    // The write of 5 joins with the default of 0 left on the untaken arm.
    assert_eq!(fact_of(&report, f), FieldFact::Conflicting);
    let instrs = instrs_of(&program, harness, 0);
    assert!(matches!(instrs[3], Instr::IGet { field, .. } if field == f));
    assert_eq!(report.rewrites_of_kind(RewriteKind::InstanceRead), 0);
    Ok(())
}

/// A receiver re-bound to a fresh construction inside a loop: the read at the
/// loop head sees different objects on the first and later iterations, so it
/// must never collapse to the first iteration's value.
#[test]
fn test_loop_rebound_receiver_is_not_folded() -> Result<()> {
    let mut builder = ProgramBuilder::new();
    let class = builder.add_class("Rebind");
    let field = builder.add_field(class, "field", ValueType::Int, FieldFlags::FINAL);

    // <init>(x) { field = x }
    let ctor = builder.declare_method(class, "<init>", MethodFlags::CONSTRUCTOR, 2);
    builder.set_body(
        ctor,
        linear_body(
            2,
            vec![Reg::new(0), Reg::new(1)],
            vec![Instr::IPut {
                src: Reg::new(1),
                object: Reg::new(0),
                field,
            }],
            None,
        )?,
    );

    // harness() {
    //   i = 0; o = new Rebind(2);
    //   do { o.field; o = new Rebind(3); i = i + 1 } while i < 2;
    // }
    let harness = builder.declare_method(class, "harness", MethodFlags::STATIC, 0);
    let mut body = BodyBuilder::new(6, vec![]);
    let b0 = body.block();
    let b1 = body.block();
    let b2 = body.block();
    body.push(b0, konst(3, 0))
        .push(
            b0,
            Instr::NewInstance {
                dest: Reg::new(0),
                class,
            },
        )
        .push(b0, konst(1, 2))
        .push(
            b0,
            Instr::InvokeDirect {
                method: ctor,
                this: Reg::new(0),
                args: vec![Reg::new(1)],
            },
        )
        .terminate(b0, Terminator::Goto { target: b1 });
    body.push(
        b1,
        Instr::IGet {
            dest: Reg::new(2),
            object: Reg::new(0),
            field,
        },
    )
    .push(
        b1,
        Instr::NewInstance {
            dest: Reg::new(0),
            class,
        },
    )
    .push(b1, konst(1, 3))
    .push(
        b1,
        Instr::InvokeDirect {
            method: ctor,
            this: Reg::new(0),
            args: vec![Reg::new(1)],
        },
    )
    .push(b1, konst(5, 1))
    .push(
        b1,
        Instr::BinOp {
            op: BinKind::Add,
            dest: Reg::new(3),
            lhs: Reg::new(3),
            rhs: Reg::new(5),
        },
    )
    .push(b1, konst(4, 2))
    .terminate(
        b1,
        Terminator::Branch {
            cmp: CmpKind::Lt,
            lhs: Reg::new(3),
            rhs: Reg::new(4),
            then_target: b1,
            else_target: b2,
        },
    );
    body.terminate(b2, Terminator::Return { value: None });
    builder.set_body(harness, body.finish()?);

    let mut program = builder.finish()?;
    let report = optimize(&mut program)?;

    // At the converged loop head the receiver joins two allocation sites, so
    // the read stays, despite looking like a fresh `new Rebind(2)` read on
    // the first visit.
    let instrs = instrs_of(&program, harness, 1);
    assert!(matches!(instrs[0], Instr::IGet { .. }));
    assert_eq!(report.rewrites_of_kind(RewriteKind::InstanceRead), 0);
    assert_eq!(report.total_rewrites(), 0);
    Ok(())
}

/// A constant read inside a loop body is replaced, and counted, exactly once
/// even though the block is visited repeatedly on the way to the fixed point.
#[test]
fn test_loop_read_is_rewritten_once() -> Result<()> {
    let mut builder = ProgramBuilder::new();
    let class = builder.add_class("LoopRead");
    let s = builder.add_field(class, "s", ValueType::Int, FieldFlags::STATIC);
    let clinit = builder.declare_method(
        class,
        "<clinit>",
        MethodFlags::STATIC | MethodFlags::CLASS_INIT,
        0,
    );
    builder.set_body(
        clinit,
        linear_body(
            1,
            vec![],
            vec![
                konst(0, 7),
                Instr::SPut {
                    src: Reg::new(0),
                    field: s,
                },
            ],
            None,
        )?,
    );

    // harness() { i = 0; do { s; i = i + 1 } while i < 3; }
    let harness = builder.declare_method(class, "harness", MethodFlags::STATIC, 0);
    let mut body = BodyBuilder::new(4, vec![]);
    let b0 = body.block();
    let b1 = body.block();
    let b2 = body.block();
    body.push(b0, konst(0, 0))
        .terminate(b0, Terminator::Goto { target: b1 });
    body.push(
        b1,
        Instr::SGet {
            dest: Reg::new(1),
            field: s,
        },
    )
    .push(b1, konst(3, 1))
    .push(
        b1,
        Instr::BinOp {
            op: BinKind::Add,
            dest: Reg::new(0),
            lhs: Reg::new(0),
            rhs: Reg::new(3),
        },
    )
    .push(b1, konst(2, 3))
    .terminate(
        b1,
        Terminator::Branch {
            cmp: CmpKind::Lt,
            lhs: Reg::new(0),
            rhs: Reg::new(2),
            then_target: b1,
            else_target: b2,
        },
    );
    body.terminate(b2, Terminator::Return { value: None });
    builder.set_body(harness, body.finish()?);

    let mut program = builder.finish()?;
    let report = optimize(&mut program)?;

    assert_eq!(fact_of(&report, s), FieldFact::KnownConstant(ConstValue::Int(7)));
    assert_eq!(instrs_of(&program, harness, 1)[0], konst(1, 7));
    assert_eq!(report.rewrites_for(harness).map(|m| m.sites.len()), Some(1));
    assert_eq!(report.total_rewrites(), 1);

    // The replacement is stable: a second run has nothing left to count.
    let second = optimize(&mut program)?;
    assert_eq!(second.total_rewrites(), 0);
    Ok(())
}

/// Unwritten fields of instantiable classes read as their default values;
/// unwritten reference fields never collapse (null is not materializable).
#[test]
fn test_default_values() -> Result<()> {
    let mut builder = ProgramBuilder::new();
    let class = builder.add_class("Defaults");
    let number = builder.add_field(class, "number", ValueType::Int, FieldFlags::empty());
    let object = builder.add_field(class, "object", ValueType::Reference, FieldFlags::empty());

    let ctor = builder.declare_method(class, "<init>", MethodFlags::CONSTRUCTOR, 1);
    builder.set_body(ctor, linear_body(1, vec![Reg::new(0)], vec![], None)?);

    let harness = builder.declare_method(class, "harness", MethodFlags::STATIC, 0);
    builder.set_body(
        harness,
        linear_body(
            3,
            vec![],
            vec![
                Instr::NewInstance {
                    dest: Reg::new(0),
                    class,
                },
                Instr::InvokeDirect {
                    method: ctor,
                    this: Reg::new(0),
                    args: vec![],
                },
                Instr::IGet {
                    dest: Reg::new(1),
                    object: Reg::new(0),
                    field: number,
                },
                Instr::IGet {
                    dest: Reg::new(2),
                    object: Reg::new(0),
                    field: object,
                },
            ],
            None,
        )?,
    );

    let mut program = builder.finish()?;
    let report = optimize(&mut program)?;

    assert_eq!(
        fact_of(&report, number),
        FieldFact::KnownConstant(ConstValue::Int(0))
    );
    assert_eq!(fact_of(&report, object), FieldFact::Conflicting);

    let instrs = instrs_of(&program, harness, 0);
    assert_eq!(instrs[2], konst(1, 0));
    assert!(matches!(instrs[3], Instr::IGet { .. }));
    Ok(())
}
