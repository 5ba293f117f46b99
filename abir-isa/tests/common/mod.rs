use abir_isa::*;

/// Assemble a program built by `f`, panicking on encoder errors.
pub fn assemble(f: impl FnOnce(&mut Emitter) -> Result<(), EncodeError>) -> Vec<u8> {
    let mut e = Emitter::new();
    f(&mut e).unwrap();
    e.build().unwrap()
}
