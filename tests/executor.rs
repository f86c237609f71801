use werk::{ErrCode, Executor, Module, State, Value};

const COUNTER: &str = r#"
    (module
        (memory 1)
        (global $n (mut i32) (i32.const 0))
        (func (export "inc") (result i32)
            global.get $n
            i32.const 1
            i32.add
            global.set $n
            i32.const 0
            global.get $n
            i32.store
            global.get $n
        )
    )
"#;

fn counter_executor() -> Result<Executor, ErrCode> {
    let mut exec = Executor::new();
    exec.set_start_func_name("inc")?;
    exec.set_module(Module::from_wat(COUNTER)?)?;
    exec.instantiate()?;
    Ok(exec)
}

#[test]
fn state_machine_walks_the_happy_path() -> Result<(), anyhow::Error> {
    let mut exec = Executor::new();
    assert_eq!(exec.state(), State::Inited);
    exec.set_start_func_name("inc")?;
    exec.set_module(Module::from_wat(COUNTER)?)?;
    assert_eq!(exec.state(), State::ModuleSet);
    exec.instantiate()?;
    assert_eq!(exec.state(), State::Instantiated);
    exec.set_args(vec![])?;
    assert_eq!(exec.state(), State::ArgsSet);
    exec.run()?;
    assert_eq!(exec.state(), State::Executed);
    assert_eq!(exec.get_rets()?, vec![Value::I32(1)]);
    assert_eq!(exec.state(), State::Finished);
    Ok(())
}

#[test]
fn transitions_guard_their_source_state() -> Result<(), anyhow::Error> {
    let mut exec = Executor::new();
    assert_eq!(exec.instantiate().unwrap_err(), ErrCode::WrongExecutorState);
    assert_eq!(exec.run().unwrap_err(), ErrCode::WrongExecutorState);
    assert_eq!(
        exec.set_args(vec![]).unwrap_err(),
        ErrCode::WrongExecutorState
    );
    assert_eq!(exec.get_rets().unwrap_err(), ErrCode::WrongExecutorState);

    exec.set_start_func_name("inc")?;
    exec.set_module(Module::from_wat(COUNTER)?)?;
    // A second module while one is loaded is illegal.
    assert_eq!(
        exec.set_module(Module::from_wat(COUNTER)?).unwrap_err(),
        ErrCode::WrongExecutorState
    );
    exec.instantiate()?;
    exec.set_args(vec![])?;
    // Start-name overrides are sealed once arguments are set.
    assert_eq!(
        exec.set_start_func_name("inc").unwrap_err(),
        ErrCode::WrongExecutorState
    );
    Ok(())
}

#[test]
fn argument_arity_and_types_checked() -> Result<(), anyhow::Error> {
    let wat = r#"
        (module
            (func (export "id") (param i32) (result i32) local.get 0)
        )
    "#;
    let mut exec = Executor::new();
    exec.set_start_func_name("id")?;
    exec.set_module(Module::from_wat(wat)?)?;
    exec.instantiate()?;
    assert_eq!(
        exec.set_args(vec![]).unwrap_err(),
        ErrCode::WrongArgumentsCount
    );
    assert_eq!(
        exec.set_args(vec![Value::I64(1)]).unwrap_err(),
        ErrCode::TypeMismatch
    );
    exec.set_args(vec![Value::I32(1)])?;
    Ok(())
}

#[test]
fn soft_reset_allows_another_cycle() -> Result<(), anyhow::Error> {
    let mut exec = counter_executor()?;
    exec.set_args(vec![])?;
    exec.run()?;
    assert_eq!(exec.get_rets()?, vec![Value::I32(1)]);

    exec.reset(false);
    assert_eq!(exec.state(), State::Instantiated);
    exec.set_args(vec![])?;
    exec.run()?;
    // Store state survived: the counter kept its value.
    assert_eq!(exec.get_rets()?, vec![Value::I32(2)]);
    Ok(())
}

#[test]
fn forced_reset_drops_module_and_store() -> Result<(), anyhow::Error> {
    let mut exec = counter_executor()?;
    exec.set_args(vec![])?;
    exec.run()?;

    exec.reset(true);
    assert_eq!(exec.state(), State::Inited);
    // A fresh module loads from scratch and the counter starts over.
    exec.set_module(Module::from_wat(COUNTER)?)?;
    exec.instantiate()?;
    exec.set_args(vec![])?;
    exec.run()?;
    assert_eq!(exec.get_rets()?, vec![Value::I32(1)]);
    Ok(())
}

#[test]
fn snapshot_and_restore_roundtrip() -> Result<(), anyhow::Error> {
    let mut exec = counter_executor()?;
    exec.set_args(vec![])?;
    exec.run()?;
    assert_eq!(exec.get_rets()?, vec![Value::I32(1)]);

    let snapshot = exec.snapshot()?;
    assert_eq!(snapshot.memories.len(), 1);
    assert_eq!(snapshot.memories[0].page_count, 1);
    assert_eq!(snapshot.globals.len(), 1);
    assert_eq!(snapshot.globals[0].value, Value::I32(1));

    // Advance the counter twice more.
    for _ in 0..2 {
        exec.reset(false);
        exec.set_args(vec![])?;
        exec.run()?;
    }
    assert_eq!(exec.get_memory_bytes(0, 0, 4)?, vec![3, 0, 0, 0]);

    // Rewind to the snapshot and replay.
    exec.reset(false);
    exec.restore(&snapshot)?;
    assert_eq!(exec.get_memory_bytes(0, 0, 4)?, vec![1, 0, 0, 0]);
    exec.set_args(vec![])?;
    exec.run()?;
    assert_eq!(exec.get_rets()?, vec![Value::I32(2)]);
    Ok(())
}

#[test]
fn restore_rejects_mismatched_global_type() -> Result<(), anyhow::Error> {
    let mut exec = counter_executor()?;
    let mut snapshot = exec.snapshot()?;
    snapshot.globals[0].value = Value::I64(5);
    snapshot.globals[0].ty = werk::ValType::I64;
    assert_eq!(
        exec.restore(&snapshot).unwrap_err(),
        ErrCode::GlobalMutabilityMismatch
    );
    Ok(())
}

#[test]
fn cost_limit_stops_runaway_loops() -> Result<(), anyhow::Error> {
    let wat = r#"
        (module
            (func (export "spin")
                loop
                    br 0
                end
            )
        )
    "#;
    let mut exec = Executor::new();
    exec.set_cost_limit(Some(10_000));
    exec.set_start_func_name("spin")?;
    exec.set_module(Module::from_wat(wat)?)?;
    exec.instantiate()?;
    exec.set_args(vec![])?;
    assert_eq!(exec.run().unwrap_err(), ErrCode::CostLimitExceeded);
    assert_eq!(exec.state(), State::Finished);
    Ok(())
}

#[test]
fn binary_start_section_runs_without_override() -> Result<(), anyhow::Error> {
    let wat = r#"
        (module
            (global $ran (mut i32) (i32.const 0))
            (func $init
                i32.const 1
                global.set $ran
            )
            (start $init)
        )
    "#;
    let mut exec = Executor::new();
    exec.set_module(Module::from_wat(wat)?)?;
    exec.instantiate()?;
    exec.set_args(vec![])?;
    exec.run()?;
    let snapshot = exec.snapshot()?;
    assert_eq!(snapshot.globals[0].value, Value::I32(1));
    Ok(())
}

#[test]
fn unknown_start_name_fails_instantiation() {
    let mut exec = Executor::new();
    exec.set_start_func_name("missing").unwrap();
    exec.set_module(
        Module::from_wat(r#"(module (func (export "main")))"#).unwrap(),
    )
    .unwrap();
    assert_eq!(exec.instantiate().unwrap_err(), ErrCode::InstantiationFailed);
    assert_eq!(exec.state(), State::Finished);
}

#[test]
fn start_name_resolves_against_live_instance() -> Result<(), anyhow::Error> {
    let wat = r#"
        (module
            (func (export "one") (result i32) i32.const 1)
            (func (export "two") (result i32) i32.const 2)
        )
    "#;
    let mut exec = Executor::new();
    exec.set_start_func_name("one")?;
    exec.set_module(Module::from_wat(wat)?)?;
    exec.instantiate()?;
    // Retarget after instantiation.
    exec.set_start_func_name("two")?;
    exec.set_args(vec![])?;
    exec.run()?;
    assert_eq!(exec.get_rets()?, vec![Value::I32(2)]);
    Ok(())
}

#[test]
fn global_get_initializer_fails_instantiation() {
    // Initializers may only reference imported globals, and the host
    // registry provides none, so chaining off a local global must fail.
    let wat = r#"
        (module
            (global $a i32 (i32.const 1))
            (global $b i32 (global.get $a))
        )
    "#;
    let mut exec = Executor::new();
    exec.set_module(Module::from_wat(wat).unwrap()).unwrap();
    assert_eq!(exec.instantiate().unwrap_err(), ErrCode::InstantiationFailed);
}

#[test]
fn global_get_segment_offset_fails_instantiation() {
    let wat = r#"
        (module
            (global $base i32 (i32.const 0))
            (memory 1)
            (data (global.get $base) "xy")
        )
    "#;
    let mut exec = Executor::new();
    exec.set_module(Module::from_wat(wat).unwrap()).unwrap();
    assert_eq!(exec.instantiate().unwrap_err(), ErrCode::InstantiationFailed);
}

#[test]
fn decode_errors_surface_before_set_module() {
    assert_eq!(
        Module::from_bytes(&[0x00, 0x61]).unwrap_err(),
        ErrCode::EndOfFile
    );
    assert_eq!(
        Module::from_bytes(b"\0asm\x02\0\0\0").unwrap_err(),
        ErrCode::InvalidGrammar
    );
}
