//! The disassembly driver: target resolution and the decode loop.

use std::io::Write;
use std::time::Instant;

use crate::format::{OutputMode, Renderer};
use crate::linfo::{LineCursor, LineQuery, LineTable};
use crate::{Address, Architecture, Backend, Decoder, DisasmError, HostProbe, Target};

/// Everything one disassembly run needs besides the output sink.
#[derive(Debug, Clone, Copy)]
pub struct DisasmRequest<'a> {
    /// Code to disassemble
    pub image: &'a [u8],
    /// Dump the raw bytes of every instruction
    pub opcodes: bool,
    /// Architecture name overriding the host's
    pub arch: Option<&'a str>,
    /// Passed through to the backend untouched
    pub disassembler_options: Option<&'a str>,
    /// Source lines to interleave
    pub line_info: Option<LineQuery<'a>>,
    /// Include file/line/column details with source lines
    pub linum: bool,
}

impl<'a> DisasmRequest<'a> {
    pub fn new(image: &'a [u8]) -> Self {
        Self {
            image,
            opcodes: false,
            arch: None,
            disassembler_options: None,
            line_info: None,
            linum: false,
        }
    }

    pub fn with_opcodes(mut self, opcodes: bool) -> Self {
        self.opcodes = opcodes;
        self
    }

    pub fn with_arch(mut self, arch: &'a str) -> Self {
        self.arch = Some(arch);
        self
    }

    pub fn with_options(mut self, options: &'a str) -> Self {
        self.disassembler_options = Some(options);
        self
    }

    /// Correlate with function `func_idx` of `table`, whose code starts at
    /// `func_base`.
    pub fn with_line_info(mut self, table: &'a LineTable, func_base: Address, func_idx: usize) -> Self {
        self.line_info = Some(LineQuery {
            table,
            func_base,
            func_idx,
        });
        self
    }

    pub fn with_linum(mut self, linum: bool) -> Self {
        self.linum = linum;
        self
    }
}

/// Outcome of a completed run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DisasmSummary {
    /// Instruction records emitted, including a final one that consumed nothing
    pub instructions: usize,
    /// Sum of all consumed lengths; also the final program counter
    pub bytes_consumed: usize,
    /// Records preceded by a source line
    pub line_annotations: usize,
}

/// Runs disassembly with an injected backend and host probe.
pub struct Driver<'a> {
    backend: &'a dyn Backend,
    probe: &'a dyn HostProbe,
}

impl<'a> Driver<'a> {
    pub fn new(backend: &'a dyn Backend, probe: &'a dyn HostProbe) -> Self {
        Self { backend, probe }
    }

    /// Work out the decoding target: the host's, unless `arch` names
    /// another one.
    pub fn resolve_target(&self, arch: Option<&str>) -> Result<Target, DisasmError> {
        let host = self.probe.host_target()?;
        let Some(name) = arch else {
            return Ok(host);
        };

        match Architecture::from_name(name) {
            Some(a) if self.backend.supports(a) => Ok(Target::new(a, a.default_endianness())),
            _ => Err(DisasmError::ArchitectureUnsupported(name.to_string())),
        }
    }

    /// Disassemble `req.image` into `renderer`.
    pub fn disassemble(
        &self,
        req: &DisasmRequest<'_>,
        renderer: &mut dyn Renderer,
    ) -> Result<DisasmSummary, DisasmError> {
        if req.image.is_empty() {
            return Err(DisasmError::ImageEmpty);
        }

        self.backend.init();
        let target = self.resolve_target(req.arch)?;
        if !self.backend.supports(target.architecture) {
            return Err(DisasmError::DecoderUnavailable(format!(
                "no decoder for {}",
                target
            )));
        }
        let decoder = self.backend.decoder(&target, req.disassembler_options)?;
        log::debug!(
            "disassembling {} bytes as {}",
            req.image.len(),
            target
        );

        renderer.begin_listing()?;
        match run_loop(req, decoder.as_ref(), renderer) {
            Ok(summary) => {
                renderer.end_listing()?;
                Ok(summary)
            }
            Err(e) => {
                // keep the listing well-formed for whatever was already written
                let _ = renderer.end_listing();
                Err(e)
            }
        }
    }

    /// Disassemble into `out` using the renderer for `mode`.
    pub fn disassemble_to<W: Write>(
        &self,
        req: &DisasmRequest<'_>,
        mode: OutputMode,
        pretty: bool,
        out: W,
    ) -> Result<DisasmSummary, DisasmError> {
        let mut renderer = mode.renderer(out, pretty);
        self.disassemble(req, renderer.as_mut())
    }
}

/// The decode loop proper.
fn run_loop(
    req: &DisasmRequest<'_>,
    decoder: &dyn Decoder,
    renderer: &mut dyn Renderer,
) -> Result<DisasmSummary, DisasmError> {
    let start_time = Instant::now();
    let image = req.image;
    let len = image.len();
    let mut cursor = req
        .line_info
        .map(|q| (LineCursor::new(q.table, q.func_idx), q.func_base));

    let mut summary = DisasmSummary::default();
    let mut pc = 0usize;

    loop {
        let line = match cursor.as_mut() {
            Some((c, base)) => c.next_for(base.wrapping_add(pc as Address)),
            None => None,
        };
        if line.is_some() {
            summary.line_annotations += 1;
        }

        renderer.begin_insn(pc as Address, line, req.linum)?;
        // never step past the end of the image
        let count = decoder
            .decode_one(image, pc, renderer.sink())?
            .min(len - pc);
        let opcodes = if req.opcodes {
            Some(&image[pc..pc + count])
        } else {
            None
        };
        renderer.end_insn(opcodes)?;

        summary.instructions += 1;
        pc += count;
        if count == 0 || pc >= len {
            break;
        }
    }

    summary.bytes_consumed = pc;
    log::debug!(
        "decoded {} instructions ({} of {} bytes) in {:?}",
        summary.instructions,
        pc,
        len,
        start_time.elapsed()
    );
    Ok(summary)
}
