mod common;

use abir_isa::*;
use common::assemble;

#[test]
fn forward_and_backward_targets() {
    let bytes = assemble(|e| {
        let top = e.create_label();
        let out = e.create_label();
        e.bind(top)?;
        e.emit(Opcode::Lda, &[Arg::Reg(0)])?; // 0
        e.emit(Opcode::Jeqz, &[Arg::Label(out)])?; // 2
        e.emit(Opcode::Jmp, &[Arg::Label(top)])?; // 4
        e.bind(out)?;
        e.emit(Opcode::ReturnVoid, &[])?; // 6
        Ok(())
    });
    let insns = decode(&bytes).unwrap();
    assert_eq!(insns[1].jump_target(), Some(6));
    assert_eq!(insns[2].jump_offset(), Some(-4));
    assert_eq!(insns[2].jump_target(), Some(0));
    assert_eq!(insns[3].jump_target(), None);
}

#[test]
fn register_compare_jump() {
    let bytes = assemble(|e| {
        let l = e.create_label();
        e.emit(Opcode::Jlt, &[Arg::Reg(7), Arg::Label(l)])?;
        e.bind(l)?;
        e.emit(Opcode::Return, &[])?;
        Ok(())
    });
    let insn = decode_at(&bytes, 0).unwrap();
    assert_eq!(insn.vreg(0), Some(7));
    assert_eq!(insn.jump_target(), Some(3));
}

#[test]
fn short_jump_out_of_range() {
    let mut e = Emitter::new();
    let far = e.create_label();
    e.emit(Opcode::Jmp, &[Arg::Label(far)]).unwrap();
    for _ in 0..130 {
        e.emit(Opcode::Nop, &[]).unwrap();
    }
    e.bind(far).unwrap();
    e.emit(Opcode::ReturnVoid, &[]).unwrap();
    assert_eq!(
        e.build().unwrap_err(),
        EncodeError::JumpOutOfRange {
            pc: 0,
            distance: 132
        }
    );
}

#[test]
fn wide_jump_reaches_far_target() {
    let bytes = assemble(|e| {
        let far = e.create_label();
        e.emit(Opcode::JmpWide, &[Arg::Label(far)])?;
        for _ in 0..1000 {
            e.emit(Opcode::Nop, &[])?;
        }
        e.bind(far)?;
        e.emit(Opcode::ReturnVoid, &[])?;
        Ok(())
    });
    let insns = decode(&bytes).unwrap();
    assert_eq!(insns[0].jump_target(), Some(1003));
}

#[test]
fn unbound_label() {
    let mut e = Emitter::new();
    let l = e.create_label();
    e.emit(Opcode::Jmp, &[Arg::Label(l)]).unwrap();
    assert_eq!(e.build().unwrap_err(), EncodeError::UnboundLabel(0));
}

#[test]
fn label_on_non_jump_is_rejected() {
    let mut e = Emitter::new();
    let l = e.create_label();
    assert_eq!(
        e.emit(Opcode::Ldai, &[Arg::Label(l)]).unwrap_err(),
        EncodeError::OperandMismatch(Opcode::Ldai)
    );
}

#[test]
fn display_shows_absolute_target() {
    let bytes = assemble(|e| {
        let l = e.create_label();
        e.emit(Opcode::Nop, &[])?;
        e.emit(Opcode::Jnez, &[Arg::Label(l)])?;
        e.bind(l)?;
        e.emit(Opcode::ReturnVoid, &[])?;
        Ok(())
    });
    let insn = decode_at(&bytes, 1).unwrap();
    assert_eq!(insn.to_string(), "jnez 0x3");
}
