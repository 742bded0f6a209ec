//! Core types, traits, and dispatch for the JIT image disassembler.
//!
//! This library turns a raw block of machine code (for example a JIT-compiled
//! program image) into one record per instruction, rendered either as a plain
//! text listing or as a JSON array of instruction objects. Source-line
//! metadata can be interleaved with the instructions it describes.
//!
//! # Basic Usage
//!
//! ```rust,no_run
//! use jit_disasm::{
//!     decoder::CapstoneBackend,
//!     driver::{DisasmRequest, Driver},
//!     format::OutputMode,
//!     parser::SelfExeProbe,
//! };
//!
//! let image = [0x55, 0x48, 0x89, 0xe5, 0xc3];
//!
//! let backend = CapstoneBackend::new();
//! let probe = SelfExeProbe::new();
//! let driver = Driver::new(&backend, &probe);
//!
//! let request = DisasmRequest::new(&image)
//!     .with_arch("x86-64")
//!     .with_opcodes(true);
//!
//! driver
//!     .disassemble_to(&request, OutputMode::Json, false, std::io::stdout().lock())
//!     .unwrap();
//! ```

pub mod capture;
pub mod decoder;
pub mod driver;
pub mod format;
pub mod linfo;
pub mod parser;
mod large_tests;

/// Represents an address in memory
pub type Address = u64;

use std::fmt;

/// Maximum instruction size in bytes
pub const MAX_INSTRUCTION_SIZE: usize = 16;

/// Supported architectures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Architecture {
    /// 32-bit x86
    X86_32,
    /// 64-bit x86
    X86_64,
    /// ARM (32-bit)
    Arm,
    /// ARM Thumb mode
    Thumb,
    /// AArch64 (ARM 64-bit)
    AArch64,
    /// MIPS 32-bit
    Mips32,
    /// RISC-V 32-bit
    RiscV32,
    /// RISC-V 64-bit
    RiscV64,
    /// PowerPC 32-bit
    Ppc32,
    /// Unknown architecture
    Unknown,
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Architecture::X86_32 => write!(f, "x86-32"),
            Architecture::X86_64 => write!(f, "x86-64"),
            Architecture::Arm => write!(f, "ARM"),
            Architecture::Thumb => write!(f, "Thumb"),
            Architecture::AArch64 => write!(f, "AArch64"),
            Architecture::Mips32 => write!(f, "MIPS32"),
            Architecture::RiscV32 => write!(f, "RISC-V 32"),
            Architecture::RiscV64 => write!(f, "RISC-V 64"),
            Architecture::Ppc32 => write!(f, "PowerPC 32"),
            Architecture::Unknown => write!(f, "Unknown"),
        }
    }
}

impl Architecture {
    /// Every architecture a decoder can be requested for.
    pub fn known() -> &'static [Architecture] {
        &[
            Architecture::X86_32,
            Architecture::X86_64,
            Architecture::Arm,
            Architecture::Thumb,
            Architecture::AArch64,
            Architecture::Mips32,
            Architecture::RiscV32,
            Architecture::RiscV64,
            Architecture::Ppc32,
        ]
    }

    /// Look up an architecture by name.
    ///
    /// Accepts the binutils-style names (`i386:x86-64`, `aarch64`,
    /// `riscv:rv32`, `powerpc:common`, ...) as well as this crate's own
    /// display names, case-insensitively. Returns `None` for anything else.
    pub fn from_name(name: &str) -> Option<Architecture> {
        let name = name.trim().to_ascii_lowercase();
        let arch = match name.as_str() {
            "i386" | "i386:x86-32" | "i386:intel" | "x86" | "x86-32" | "x86_32" | "ia32" => {
                Architecture::X86_32
            }
            "i386:x86-64" | "i386:x86-64:intel" | "x86-64" | "x86_64" | "amd64" => {
                Architecture::X86_64
            }
            "arm" | "armv7" => Architecture::Arm,
            "thumb" | "armv7-thumb" => Architecture::Thumb,
            "aarch64" | "arm64" => Architecture::AArch64,
            "mips" | "mips32" | "mips:isa32" => Architecture::Mips32,
            "riscv:rv32" | "riscv32" | "risc-v 32" => Architecture::RiscV32,
            "riscv" | "riscv:rv64" | "riscv64" | "risc-v 64" => Architecture::RiscV64,
            "powerpc" | "powerpc:common" | "ppc" | "ppc32" | "powerpc 32" => Architecture::Ppc32,
            _ => return None,
        };
        Some(arch)
    }

    /// Byte order used when the architecture is named explicitly.
    pub fn default_endianness(&self) -> Endianness {
        match self {
            Architecture::Ppc32 => Endianness::Big,
            _ => Endianness::Little,
        }
    }

    /// Smallest step the decode loop can take on this architecture.
    ///
    /// Used to skip over bytes the decoder cannot make sense of.
    pub fn min_insn_size(&self) -> usize {
        match self {
            Architecture::X86_32 | Architecture::X86_64 | Architecture::Unknown => 1,
            Architecture::Thumb | Architecture::RiscV32 | Architecture::RiscV64 => 2,
            Architecture::Arm | Architecture::AArch64 | Architecture::Mips32 | Architecture::Ppc32 => 4,
        }
    }
}

/// Byte order of the decoded code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endianness {
    Little,
    Big,
}

/// The architecture a run decodes for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target {
    pub architecture: Architecture,
    pub endianness: Endianness,
}

impl Target {
    pub fn new(architecture: Architecture, endianness: Endianness) -> Self {
        Self {
            architecture,
            endianness,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let endian = match self.endianness {
            Endianness::Little => "le",
            Endianness::Big => "be",
        };
        write!(f, "{} ({})", self.architecture, endian)
    }
}

/// Receives the textual rendering of one instruction, one token at a time.
///
/// A decoder must route all human-readable output through this sink.
pub trait TokenSink {
    /// Accept one fully formatted token.
    fn token(&mut self, text: &str) -> Result<(), DisasmError>;
}

/// Decoder trait: renders one instruction at a time.
pub trait Decoder {
    /// Decode the instruction starting at `pc` in `image`.
    ///
    /// The textual form is written to `sink`. Returns the number of bytes
    /// consumed; zero means the decoder cannot make progress.
    fn decode_one(
        &self,
        image: &[u8],
        pc: usize,
        sink: &mut dyn TokenSink,
    ) -> Result<usize, DisasmError>;
}

/// A decoding library, set up once and asked for decoders per run.
pub trait Backend {
    /// Perform one-time library setup. Repeated calls are no-ops.
    fn init(&self);

    /// Whether the library can decode `arch` at all.
    fn supports(&self, arch: Architecture) -> bool;

    /// Build a decoder for `target`, applying backend-specific `options`.
    fn decoder(
        &self,
        target: &Target,
        options: Option<&str>,
    ) -> Result<Box<dyn Decoder>, DisasmError>;
}

/// Finds out which architecture the running process itself was built for.
pub trait HostProbe {
    fn host_target(&self) -> Result<Target, DisasmError>;
}

/// Error type for disassembly operations
#[derive(Debug, thiserror::Error)]
pub enum DisasmError {
    /// Zero-length input image
    #[error("image is empty")]
    ImageEmpty,

    /// The host binary could not be located or read
    #[error("failed to create disassembler (host binary unavailable): {0}")]
    HostBinaryUnavailable(String),

    /// The host binary is not a recognized object format
    #[error("failed to create disassembler (unrecognized host binary format): {0}")]
    HostBinaryFormatUnrecognized(String),

    /// An explicitly requested architecture is not known
    #[error("no decoder support for {0}")]
    ArchitectureUnsupported(String),

    /// The backend cannot produce a decoder for the resolved architecture
    #[error("failed to create disassembler: {0}")]
    DecoderUnavailable(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
