mod common;

use abir_builder::*;
use abir_isa::{Arg, DecodeError, Opcode};
use common::*;

fn try_build(method: &MethodDescriptor<'_>) -> Result<BuiltMethod, BuildError> {
    build_method(method, &NoCallees, &BuilderConfig::default())
}

#[test]
fn unknown_opcode_is_unsupported() {
    let code = [0x00, 0xff];
    let method = MethodDescriptor::new("bad_opcode", &code, 0, 0);
    let err = try_build(&method).unwrap_err();
    assert_eq!(
        err,
        BuildError::UnsupportedInstruction {
            pc: 1,
            opcode: "0xff".to_string()
        }
    );
    assert_eq!(err.pc(), Some(1));
}

#[test]
fn unknown_callee_is_unsupported() {
    let code = assemble(|e| {
        e.emit(Opcode::CallShort, &[Arg::Id(9), Arg::Reg(0), Arg::Reg(0)])?;
        e.emit(Opcode::ReturnVoid, &[])?;
        Ok(())
    });
    let method = MethodDescriptor::new("call", &code, 1, 0);
    match try_build(&method).unwrap_err() {
        BuildError::UnsupportedInstruction { pc, opcode } => {
            assert_eq!(pc, 0);
            assert!(opcode.contains("unknown callee"), "{opcode}");
        }
        other => panic!("unexpected error {other}"),
    }
}

#[test]
fn reading_unassigned_register_is_unresolved() {
    let code = assemble(|e| {
        e.emit(Opcode::Lda, &[Arg::Reg(0)])?;
        e.emit(Opcode::Return, &[])?;
        Ok(())
    });
    let method = MethodDescriptor::new("unassigned", &code, 1, 0);
    let err = try_build(&method).unwrap_err();
    assert_eq!(
        err,
        BuildError::UnresolvedDefinition {
            pc: 0,
            vreg: Some(0)
        }
    );
    assert_eq!(err.to_string(), "unresolved definition of r0 at pc 0x0");
}

#[test]
fn register_on_one_path_only_is_unresolved() {
    // v0 is assigned on the fallthrough path only, then returned.
    let code = assemble(|e| {
        let join = e.create_label();
        e.emit(Opcode::Lda, &[Arg::Reg(1)])?;
        e.emit(Opcode::Jeqz, &[Arg::Label(join)])?;
        e.emit(Opcode::Movi, &[Arg::Reg(0), Arg::Imm(3)])?;
        e.bind(join)?;
        e.emit(Opcode::Lda, &[Arg::Reg(0)])?;
        e.emit(Opcode::Return, &[])?;
        Ok(())
    });
    let method = MethodDescriptor::new("one_path", &code, 1, 1);
    let err = try_build(&method).unwrap_err();
    assert!(
        matches!(err, BuildError::UnresolvedDefinition { vreg: Some(0), .. }),
        "{err}"
    );
}

#[test]
fn falling_off_the_end_is_malformed() {
    let code = assemble(|e| {
        e.emit(Opcode::Ldai, &[Arg::Imm(1)])?;
        Ok(())
    });
    let method = MethodDescriptor::new("no_return", &code, 0, 0);
    assert_eq!(
        try_build(&method).unwrap_err(),
        BuildError::MalformedBytecode(DecodeError::Truncated(5))
    );
}

#[test]
fn truncated_instruction_is_malformed() {
    let code = assemble(|e| {
        e.emit(Opcode::Ldai, &[Arg::Imm(1)])?;
        Ok(())
    });
    let method = MethodDescriptor::new("cut", &code[..3], 0, 0);
    assert_eq!(
        try_build(&method).unwrap_err(),
        BuildError::MalformedBytecode(DecodeError::Truncated(0))
    );
}

#[test]
fn handler_inside_an_instruction_is_misaligned() {
    let code = assemble(|e| {
        e.emit(Opcode::Ldai, &[Arg::Imm(1)])?;
        e.emit(Opcode::Return, &[])?;
        Ok(())
    });
    let method = MethodDescriptor::new("misaligned", &code, 0, 0).with_catch(0, 5, 2, 0);
    assert_eq!(
        try_build(&method).unwrap_err(),
        BuildError::MalformedBytecode(DecodeError::Misaligned(2))
    );
}

#[test]
fn register_out_of_range_is_unsupported() {
    let code = assemble(|e| {
        e.emit(Opcode::Lda, &[Arg::Reg(4)])?;
        e.emit(Opcode::Return, &[])?;
        Ok(())
    });
    let method = MethodDescriptor::new("wide", &code, 1, 0);
    assert!(matches!(
        try_build(&method).unwrap_err(),
        BuildError::UnsupportedInstruction { pc: 0, .. }
    ));
}
