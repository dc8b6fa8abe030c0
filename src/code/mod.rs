//! # Code
//!
//! Machine code generators for the supported architectures

#[cfg(target_arch = "x86_64")]
pub mod x64;

#[cfg(not(target_arch = "x86_64"))]
compile_error!("libstub can only redirect functions on x86-64 targets");
