//! Host binary introspection via Goblin.
//!
//! The architecture of the running executable is the default decoding
//! target when a caller does not name one.

use std::fs;
use std::path::PathBuf;

use goblin::mach::{constants::cputype, Mach, MachO};
use goblin::{elf, pe, Object};

use crate::{Architecture, DisasmError, Endianness, HostProbe, Target};

/// Reads the target out of ELF, PE, and Mach-O headers.
#[derive(Debug, Default)]
pub struct GoblinParser;

impl GoblinParser {
    /// Construct a new GoblinParser.
    pub fn new() -> Self {
        GoblinParser
    }

    /// Parse an object image into its target.
    pub fn parse(&self, data: &[u8]) -> Result<Target, DisasmError> {
        match Object::parse(data) {
            Ok(Object::Elf(elf)) => Ok(self.parse_elf(&elf)),
            Ok(Object::PE(pe)) => Ok(self.parse_pe(&pe)),
            Ok(Object::Mach(m)) => self.parse_mach(m),
            Ok(_) => Err(DisasmError::HostBinaryFormatUnrecognized(
                "not an object file".into(),
            )),
            Err(e) => Err(DisasmError::HostBinaryFormatUnrecognized(e.to_string())),
        }
    }

    fn parse_elf(&self, elf: &elf::Elf) -> Target {
        let arch = match elf.header.e_machine {
            elf::header::EM_386 => Architecture::X86_32,
            elf::header::EM_X86_64 => Architecture::X86_64,
            elf::header::EM_ARM => Architecture::Arm,
            elf::header::EM_AARCH64 => Architecture::AArch64,
            elf::header::EM_MIPS => Architecture::Mips32,
            elf::header::EM_PPC => Architecture::Ppc32,
            elf::header::EM_RISCV => {
                // Determine RISC-V bitness from ELF class
                match elf.header.e_ident[elf::header::EI_CLASS] {
                    elf::header::ELFCLASS32 => Architecture::RiscV32,
                    elf::header::ELFCLASS64 => Architecture::RiscV64,
                    _ => Architecture::Unknown,
                }
            }
            _ => Architecture::Unknown,
        };
        let endianness = if elf.little_endian {
            Endianness::Little
        } else {
            Endianness::Big
        };
        Target::new(arch, endianness)
    }

    fn parse_pe(&self, pe: &pe::PE<'_>) -> Target {
        let arch = match pe.header.coff_header.machine {
            pe::header::COFF_MACHINE_X86 => Architecture::X86_32,
            pe::header::COFF_MACHINE_X86_64 => Architecture::X86_64,
            pe::header::COFF_MACHINE_ARM => Architecture::Arm,
            pe::header::COFF_MACHINE_ARM64 => Architecture::AArch64,
            _ => Architecture::Unknown,
        };
        Target::new(arch, Endianness::Little)
    }

    fn macho_arch(cpu: u32) -> Architecture {
        match cpu {
            cputype::CPU_TYPE_I386 => Architecture::X86_32,
            cputype::CPU_TYPE_X86_64 => Architecture::X86_64,
            cputype::CPU_TYPE_ARM => Architecture::Arm,
            cputype::CPU_TYPE_ARM64 => Architecture::AArch64,
            _ => Architecture::Unknown,
        }
    }

    fn parse_macho(&self, macho: &MachO) -> Target {
        let endianness = if macho.little_endian {
            Endianness::Little
        } else {
            Endianness::Big
        };
        Target::new(Self::macho_arch(macho.header.cputype), endianness)
    }

    fn parse_mach(&self, m: Mach<'_>) -> Result<Target, DisasmError> {
        match m {
            Mach::Binary(binary) => Ok(self.parse_macho(&binary)),
            Mach::Fat(fat) => {
                // Universal binary: take the first slice we can decode
                let arch = fat
                    .iter_arches()
                    .filter_map(Result::ok)
                    .map(|a| Self::macho_arch(a.cputype))
                    .find(|a| *a != Architecture::Unknown)
                    .unwrap_or(Architecture::Unknown);
                Ok(Target::new(arch, Endianness::Little))
            }
        }
    }
}

/// Probes the running process's own executable.
#[derive(Debug, Default)]
pub struct SelfExeProbe {
    path: Option<PathBuf>,
}

impl SelfExeProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Probe `path` instead of the current executable.
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    fn exe_path(&self) -> Result<PathBuf, DisasmError> {
        match &self.path {
            Some(p) => Ok(p.clone()),
            None => std::env::current_exe()
                .map_err(|e| DisasmError::HostBinaryUnavailable(format!("current_exe: {}", e))),
        }
    }
}

impl HostProbe for SelfExeProbe {
    fn host_target(&self) -> Result<Target, DisasmError> {
        let path = self.exe_path()?;
        let data = fs::read(&path).map_err(|e| {
            DisasmError::HostBinaryUnavailable(format!("{}: {}", path.display(), e))
        })?;
        let target = GoblinParser::new().parse(&data)?;
        log::debug!("host binary {} is {}", path.display(), target);
        Ok(target)
    }
}

/// A probe that always reports the same target.
#[derive(Debug, Clone, Copy)]
pub struct FixedProbe(pub Target);

impl HostProbe for FixedProbe {
    fn host_target(&self) -> Result<Target, DisasmError> {
        Ok(self.0)
    }
}
