use werk::{ErrCode, Executor, Module, Value};

fn run_export(wat: &str, name: &str, args: Vec<Value>) -> Result<Vec<Value>, ErrCode> {
    let mut exec = Executor::new();
    exec.set_start_func_name(name)?;
    exec.set_module(Module::from_wat(wat)?)?;
    exec.instantiate()?;
    exec.set_args(args)?;
    exec.run()?;
    exec.get_rets()
}

#[test]
fn branch_preserves_label_arity_operands() -> Result<(), anyhow::Error> {
    // A taken br_if must carry the block result past the unwinding.
    let wat = r#"
        (module
            (func (export "pick") (param i32) (result i32)
                block (result i32)
                    i32.const 7
                    local.get 0
                    br_if 0
                    drop
                    i32.const 9
                end
            )
        )
    "#;
    assert_eq!(
        run_export(wat, "pick", vec![Value::I32(1)])?,
        vec![Value::I32(7)]
    );
    assert_eq!(
        run_export(wat, "pick", vec![Value::I32(0)])?,
        vec![Value::I32(9)]
    );
    Ok(())
}

#[test]
fn if_else_selects_arm() -> Result<(), anyhow::Error> {
    let wat = r#"
        (module
            (func (export "sign") (param i32) (result i32)
                local.get 0
                i32.const 0
                i32.lt_s
                if (result i32)
                    i32.const -1
                else
                    local.get 0
                    if (result i32)
                        i32.const 1
                    else
                        i32.const 0
                    end
                end
            )
        )
    "#;
    assert_eq!(
        run_export(wat, "sign", vec![Value::I32(-5)])?,
        vec![Value::I32(-1)]
    );
    assert_eq!(
        run_export(wat, "sign", vec![Value::I32(0)])?,
        vec![Value::I32(0)]
    );
    assert_eq!(
        run_export(wat, "sign", vec![Value::I32(3)])?,
        vec![Value::I32(1)]
    );
    Ok(())
}

#[test]
fn br_table_selects_depth() -> Result<(), anyhow::Error> {
    let wat = r#"
        (module
            (func (export "classify") (param i32) (result i32)
                block
                    block
                        block
                            local.get 0
                            br_table 0 1 2
                        end
                        i32.const 100
                        return
                    end
                    i32.const 200
                    return
                end
                i32.const 300
            )
        )
    "#;
    assert_eq!(
        run_export(wat, "classify", vec![Value::I32(0)])?,
        vec![Value::I32(100)]
    );
    assert_eq!(
        run_export(wat, "classify", vec![Value::I32(1)])?,
        vec![Value::I32(200)]
    );
    // Out-of-range selectors take the default label.
    assert_eq!(
        run_export(wat, "classify", vec![Value::I32(9)])?,
        vec![Value::I32(300)]
    );
    Ok(())
}

#[test]
fn loop_falls_through_with_result() -> Result<(), anyhow::Error> {
    let rets = run_export(
        r#"
        (module
            (func (export "once") (result i32)
                loop (result i32)
                    i32.const 11
                end
            )
        )
    "#,
        "once",
        vec![],
    )?;
    assert_eq!(rets, vec![Value::I32(11)]);
    Ok(())
}

#[test]
fn branch_to_function_label_returns() -> Result<(), anyhow::Error> {
    // br to the outermost depth acts as return.
    let rets = run_export(
        r#"
        (module
            (func (export "early") (result i32)
                i32.const 42
                br 0
            )
        )
    "#,
        "early",
        vec![],
    )?;
    assert_eq!(rets, vec![Value::I32(42)]);
    Ok(())
}

#[test]
fn return_unwinds_nested_blocks() -> Result<(), anyhow::Error> {
    let rets = run_export(
        r#"
        (module
            (func (export "deep") (result i32)
                block
                    block
                        loop
                            i32.const 5
                            return
                        end
                    end
                end
                i32.const 0
            )
        )
    "#,
        "deep",
        vec![],
    )?;
    assert_eq!(rets, vec![Value::I32(5)]);
    Ok(())
}

#[test]
fn nested_calls_compose() -> Result<(), anyhow::Error> {
    let rets = run_export(
        r#"
        (module
            (func $double (param i32) (result i32)
                local.get 0
                i32.const 2
                i32.mul
            )
            (func (export "quad") (param i32) (result i32)
                local.get 0
                call $double
                call $double
            )
        )
    "#,
        "quad",
        vec![Value::I32(5)],
    )?;
    assert_eq!(rets, vec![Value::I32(20)]);
    Ok(())
}

#[test]
fn recursion_terminates() -> Result<(), anyhow::Error> {
    // fib(10) through plain recursion.
    let rets = run_export(
        r#"
        (module
            (func $fib (param i32) (result i32)
                local.get 0
                i32.const 2
                i32.lt_s
                if (result i32)
                    local.get 0
                else
                    local.get 0
                    i32.const 1
                    i32.sub
                    call $fib
                    local.get 0
                    i32.const 2
                    i32.sub
                    call $fib
                    i32.add
                end
            )
            (export "fib" (func $fib))
        )
    "#,
        "fib",
        vec![Value::I32(10)],
    )?;
    assert_eq!(rets, vec![Value::I32(55)]);
    Ok(())
}

#[test]
fn runaway_recursion_exhausts_call_stack() {
    let err = run_export(
        r#"
        (module
            (func $spin (export "spin")
                call $spin
            )
        )
    "#,
        "spin",
        vec![],
    )
    .unwrap_err();
    assert_eq!(err, ErrCode::CallStackExhausted);
}

#[test]
fn unreachable_traps() {
    let err = run_export(
        r#"
        (module
            (func (export "boom") unreachable)
        )
    "#,
        "boom",
        vec![],
    )
    .unwrap_err();
    assert_eq!(err, ErrCode::Unreachable);
}
