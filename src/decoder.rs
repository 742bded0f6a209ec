//! Capstone-based decoding backend.

use std::fmt;
use std::sync::OnceLock;

use capstone::{Arch, Capstone, Endian, Mode, Syntax, NO_EXTRA_MODE};

use crate::{
    Architecture, Backend, Decoder, DisasmError, Endianness, Target, TokenSink,
    MAX_INSTRUCTION_SIZE,
};

/// Text rendered for bytes that do not decode to an instruction.
pub const BAD_INSN: &str = "(bad)";

/// Mnemonics are padded to this width when operands follow.
const MNEMONIC_WIDTH: usize = 6;

/// The capstone library as a service.
///
/// `init` records the library version once; decoders are built per run.
#[derive(Debug, Default)]
pub struct CapstoneBackend {
    version: OnceLock<(u32, u32)>,
}

impl CapstoneBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Library version, available after `init`.
    pub fn version(&self) -> Option<(u32, u32)> {
        self.version.get().copied()
    }
}

impl Backend for CapstoneBackend {
    fn init(&self) {
        self.version.get_or_init(|| {
            let (major, minor) = Capstone::lib_version();
            log::debug!("capstone {}.{} initialized", major, minor);
            (major, minor)
        });
    }

    fn supports(&self, arch: Architecture) -> bool {
        match arch_mode(arch) {
            Some((cs_arch, _)) => Capstone::supports_arch(cs_arch),
            None => false,
        }
    }

    fn decoder(
        &self,
        target: &Target,
        options: Option<&str>,
    ) -> Result<Box<dyn Decoder>, DisasmError> {
        self.init();
        let opts = DecoderOptions::parse(options.unwrap_or(""));
        let decoder = CapstoneDecoder::new(*target, &opts)?;
        log::debug!("built {} ({:?})", decoder, decoder.endianness());
        Ok(Box::new(decoder))
    }
}

/// Syntax flavour for x86 output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum X86Syntax {
    Intel,
    Att,
}

/// Parsed form of the comma-separated disassembler options string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecoderOptions {
    pub syntax: Option<X86Syntax>,
    /// `Some(true)` forces Thumb, `Some(false)` forces ARM
    pub thumb: Option<bool>,
    /// Byte order replacing the target's
    pub endianness: Option<Endianness>,
}

impl DecoderOptions {
    pub fn parse(options: &str) -> Self {
        let mut opts = DecoderOptions::default();
        for opt in options.split(',').map(str::trim).filter(|o| !o.is_empty()) {
            match opt.to_ascii_lowercase().as_str() {
                "intel" | "intel-mnemonic" => opts.syntax = Some(X86Syntax::Intel),
                "att" | "att-mnemonic" => opts.syntax = Some(X86Syntax::Att),
                "thumb" | "force-thumb" => opts.thumb = Some(true),
                "arm" | "no-force-thumb" => opts.thumb = Some(false),
                "big" | "big-endian" | "eb" => opts.endianness = Some(Endianness::Big),
                "little" | "little-endian" | "el" => opts.endianness = Some(Endianness::Little),
                _ => log::warn!("unrecognised disassembler option: {}", opt),
            }
        }
        opts
    }
}

/// Capstone arch and mode for each ISA.
fn arch_mode(arch: Architecture) -> Option<(Arch, Mode)> {
    let pair = match arch {
        Architecture::X86_32 => (Arch::X86, Mode::Mode32),
        Architecture::X86_64 => (Arch::X86, Mode::Mode64),
        Architecture::Arm => (Arch::ARM, Mode::Arm),
        Architecture::Thumb => (Arch::ARM, Mode::Thumb),
        Architecture::AArch64 => (Arch::ARM64, Mode::Arm),
        Architecture::Mips32 => (Arch::MIPS, Mode::Mips32),
        Architecture::RiscV32 => (Arch::RISCV, Mode::RiscV32),
        Architecture::RiscV64 => (Arch::RISCV, Mode::RiscV64),
        Architecture::Ppc32 => (Arch::PPC, Mode::Mode32),
        Architecture::Unknown => return None,
    };
    Some(pair)
}

/// Split an operand string at top-level commas.
///
/// Commas nested in brackets, parentheses, or braces stay inside their
/// operand (`[r1, #4]`, `(%rax,%rbx,4)`, `{r4, lr}`).
pub fn split_operands(op_str: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in op_str.char_indices() {
        match c {
            '[' | '(' | '{' => depth += 1,
            ']' | ')' | '}' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(op_str[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    let last = op_str[start..].trim();
    if !last.is_empty() || !parts.is_empty() {
        parts.push(last);
    }
    parts
}

/// A Capstone decoder bound to one target.
pub struct CapstoneDecoder {
    cs: Capstone,
    architecture: Architecture,
    endianness: Endianness,
}

impl CapstoneDecoder {
    /// Build a decoder for `target`, honouring `opts` where they apply.
    pub fn new(target: Target, opts: &DecoderOptions) -> Result<Self, DisasmError> {
        let mut architecture = target.architecture;
        if let Some(thumb) = opts.thumb {
            match architecture {
                Architecture::Arm | Architecture::Thumb => {
                    architecture = if thumb {
                        Architecture::Thumb
                    } else {
                        Architecture::Arm
                    };
                }
                _ => log::warn!("ARM mode option ignored for {}", architecture),
            }
        }

        let (arch, mode) = arch_mode(architecture).ok_or_else(|| {
            DisasmError::DecoderUnavailable(format!("no decoder for {}", architecture))
        })?;
        let endianness = opts.endianness.unwrap_or(target.endianness);
        let endian = match endianness {
            Endianness::Little => Endian::Little,
            Endianness::Big => Endian::Big,
        };

        let mut cs = Capstone::new_raw(arch, mode, NO_EXTRA_MODE, Some(endian))
            .map_err(|e| DisasmError::DecoderUnavailable(format!("{}: {}", target, e)))?;

        if let Some(syntax) = opts.syntax {
            if arch == Arch::X86 {
                let syntax = match syntax {
                    X86Syntax::Intel => Syntax::Intel,
                    X86Syntax::Att => Syntax::Att,
                };
                cs.set_syntax(syntax)
                    .map_err(|e| DisasmError::DecoderUnavailable(e.to_string()))?;
            } else {
                log::warn!("syntax option ignored for {}", architecture);
            }
        }

        Ok(Self {
            cs,
            architecture,
            endianness,
        })
    }

    /// Get the architecture of this decoder
    pub fn architecture(&self) -> Architecture {
        self.architecture
    }

    /// Byte order the decoder reads instructions in
    pub fn endianness(&self) -> Endianness {
        self.endianness
    }

    fn render_bad(&self, remaining: usize, sink: &mut dyn TokenSink) -> Result<usize, DisasmError> {
        sink.token(BAD_INSN)?;
        Ok(self.architecture.min_insn_size().min(remaining))
    }
}

impl fmt::Display for CapstoneDecoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CapstoneDecoder::{}", self.architecture)
    }
}

impl fmt::Debug for CapstoneDecoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapstoneDecoder")
            .field("architecture", &self.architecture)
            .field("endianness", &self.endianness)
            .finish()
    }
}

impl Decoder for CapstoneDecoder {
    fn decode_one(
        &self,
        image: &[u8],
        pc: usize,
        sink: &mut dyn TokenSink,
    ) -> Result<usize, DisasmError> {
        if pc >= image.len() {
            return Ok(0);
        }

        // Only look at a small slice (16 bytes max)
        let end = std::cmp::min(pc + MAX_INSTRUCTION_SIZE, image.len());
        let window = &image[pc..end];

        let insns = match self.cs.disasm_count(window, pc as u64, 1) {
            Ok(insns) => insns,
            Err(e) => {
                log::trace!("capstone failed at 0x{:x}: {}", pc, e);
                return self.render_bad(window.len(), sink);
            }
        };
        let Some(insn) = insns.iter().next() else {
            return self.render_bad(window.len(), sink);
        };

        let mnemonic = insn.mnemonic().unwrap_or("");
        let operands = split_operands(insn.op_str().unwrap_or(""));

        if operands.is_empty() {
            sink.token(mnemonic)?;
        } else {
            sink.token(&format!("{:<width$} ", mnemonic, width = MNEMONIC_WIDTH))?;
            for (i, op) in operands.iter().enumerate() {
                if i > 0 {
                    sink.token(",")?;
                }
                sink.token(op)?;
            }
        }

        Ok(insn.len())
    }
}
