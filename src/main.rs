use std::fs;
use std::io::{self, BufWriter};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::Parser;

use jit_disasm::{
    decoder::CapstoneBackend,
    driver::{DisasmRequest, Driver},
    format::OutputMode,
    linfo::LineTable,
    parser::SelfExeProbe,
    Architecture, Backend,
};

/// Disassemble a raw JIT code image.
#[derive(Parser, Debug)]
#[command(name = "jit-disasm", version, about)]
struct Cli {
    /// File holding the raw code bytes
    image: Option<PathBuf>,

    /// Emit a JSON array instead of a plain listing
    #[arg(short, long)]
    json: bool,

    /// Pretty-print JSON output (implies --json)
    #[arg(short, long)]
    pretty: bool,

    /// Dump the raw bytes of each instruction
    #[arg(long)]
    opcodes: bool,

    /// Architecture to decode for instead of the host's (e.g. i386:x86-64, aarch64)
    #[arg(long)]
    arch: Option<String>,

    /// Comma-separated decoder options (e.g. att, intel, force-thumb, big, little)
    #[arg(short = 'M', long = "disassembler-options")]
    disassembler_options: Option<String>,

    /// JSON line table: an array of per-function arrays of line entries
    #[arg(long)]
    line_info: Option<PathBuf>,

    /// Address the image is loaded at, for line table lookups
    #[arg(long, value_parser = parse_address, default_value = "0")]
    func_base: u64,

    /// Which function of the line table the image is
    #[arg(long, default_value_t = 0)]
    func_idx: usize,

    /// Show file, line, and column with each source line
    #[arg(long)]
    linum: bool,

    /// List the architectures the decoder supports and exit
    #[arg(long)]
    list_archs: bool,
}

fn parse_address(s: &str) -> Result<u64, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid address '{}': {}", s, e))
}

fn list_archs(backend: &CapstoneBackend) {
    for arch in Architecture::known() {
        if backend.supports(*arch) {
            println!("{}", arch);
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let backend = CapstoneBackend::new();
    backend.init();

    if cli.list_archs {
        list_archs(&backend);
        return Ok(());
    }

    let Some(image_path) = cli.image.as_ref() else {
        bail!("no image given (see --help)");
    };
    let image = fs::read(image_path)
        .with_context(|| format!("failed to read image {}", image_path.display()))?;

    let table = match &cli.line_info {
        Some(path) => {
            let table = LineTable::from_path(path)
                .with_context(|| format!("failed to load line info {}", path.display()))?;
            if table.is_empty() {
                log::warn!("line info {} has no entries", path.display());
            }
            Some(table)
        }
        None => None,
    };

    let mut req = DisasmRequest::new(&image)
        .with_opcodes(cli.opcodes)
        .with_linum(cli.linum);
    if let Some(arch) = cli.arch.as_deref() {
        req = req.with_arch(arch);
    }
    if let Some(opts) = cli.disassembler_options.as_deref() {
        req = req.with_options(opts);
    }
    if let Some(table) = table.as_ref() {
        req = req.with_line_info(table, cli.func_base, cli.func_idx);
    }

    let mode = if cli.json || cli.pretty {
        OutputMode::Json
    } else {
        OutputMode::Plain
    };

    let probe = SelfExeProbe::new();
    let driver = Driver::new(&backend, &probe);
    let out = BufWriter::new(io::stdout().lock());
    let summary = driver
        .disassemble_to(&req, mode, cli.pretty, out)
        .with_context(|| format!("failed to disassemble {}", image_path.display()))?;

    log::info!(
        "{} instructions, {} bytes, {} source lines",
        summary.instructions,
        summary.bytes_consumed,
        summary.line_annotations
    );
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_address() {
        assert_eq!(parse_address("0x10"), Ok(16));
        assert_eq!(parse_address("42"), Ok(42));
        assert!(parse_address("0xzz").is_err());
    }

    #[test]
    fn test_cli_flags() {
        let cli = Cli::parse_from([
            "jit-disasm",
            "prog.bin",
            "--json",
            "--arch",
            "aarch64",
            "-M",
            "att",
            "--func-base",
            "0xffffffffa0000000",
        ]);
        assert!(cli.json);
        assert_eq!(cli.arch.as_deref(), Some("aarch64"));
        assert_eq!(cli.disassembler_options.as_deref(), Some("att"));
        assert_eq!(cli.func_base, 0xffff_ffff_a000_0000);
        assert_eq!(cli.func_idx, 0);
    }

    #[test]
    fn test_cli_verify() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
