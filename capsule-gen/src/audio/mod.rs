//! Audio assembly: synthesized segments → one narrated MP3.

pub mod assembler;

pub use assembler::{AssemblyMode, AudioAssembler, DEFAULT_PAUSE_MS};
