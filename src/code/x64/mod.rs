//! x86-64 code generation

use std::mem;

#[repr(packed)]
#[allow(dead_code)]
/// Struct helper for generating an absolute jump
struct JmpAbs {
    /// Absolute jmp instruction (jmp [rip + 0])
    jmp: [u8; 6],
    /// Absolute address to jump to, read by the `jmp` right after its own encoding
    target: usize,
}

/// Number of bytes overwritten at the start of a redirected function
pub const JMP_ABS_LEN: usize = mem::size_of::<JmpAbs>();

/// Generates an absolute jump to `target` and returns its bytecode
///
/// The jump does not touch any register, so arguments already loaded by the caller
/// arrive untouched at `target`.
pub fn jmp_abs(target: usize) -> [u8; JMP_ABS_LEN] {
    // SAFETY: `JmpAbs` is packed, so it is exactly `JMP_ABS_LEN` initialized bytes
    unsafe {
        mem::transmute(JmpAbs {
            jmp: [0xff, 0x25, 0x00, 0x00, 0x00, 0x00],
            target,
        })
    }
}
