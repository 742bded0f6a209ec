#[cfg(test)]
mod tests {
    use std::fs;

    use serde_json::Value;

    use crate::{
        decoder::{CapstoneBackend, BAD_INSN},
        driver::{DisasmRequest, Driver},
        format::OutputMode,
        linfo::{LineInfo, LineTable},
        parser::{GoblinParser, SelfExeProbe},
        Architecture, DisasmError,
    };

    // push rbp; mov rbp, rsp; xor eax, eax; pop rbp; ret
    const X86_64_PROLOGUE: [u8; 9] = [0x55, 0x48, 0x89, 0xe5, 0x31, 0xc0, 0x5d, 0xc3, 0x90];

    fn run(req: &DisasmRequest<'_>, mode: OutputMode) -> Result<String, DisasmError> {
        let backend = CapstoneBackend::new();
        let probe = SelfExeProbe::new();
        let driver = Driver::new(&backend, &probe);
        let mut out = Vec::new();
        driver.disassemble_to(req, mode, false, &mut out)?;
        Ok(String::from_utf8(out).expect("listing is UTF-8"))
    }

    #[test]
    fn test_host_binary_is_parseable() {
        let exe = std::env::current_exe().expect("current exe");
        let data = fs::read(exe).expect("read current exe");
        let target = GoblinParser::new().parse(&data).expect("parse current exe");
        println!("Host target: {}", target);
        assert_ne!(target.architecture, Architecture::Unknown);
    }

    #[test]
    fn test_x86_64_json_listing() {
        let req = DisasmRequest::new(&X86_64_PROLOGUE)
            .with_arch("i386:x86-64")
            .with_opcodes(true);
        let out = run(&req, OutputMode::Json).expect("disassembly failed");
        let v: Value = serde_json::from_str(&out).expect("valid JSON");
        let records = v.as_array().expect("top-level array");

        let ops: Vec<&str> = records
            .iter()
            .map(|r| r["operation"].as_str().unwrap())
            .collect();
        assert_eq!(ops, vec!["push", "mov", "xor", "pop", "ret", "nop"]);

        assert_eq!(records[1]["operands"], serde_json::json!(["rbp", "rsp"]));
        assert_eq!(records[4]["operands"], Value::Null);
        assert_eq!(records[2]["pc"], "0x4");

        let total: usize = records
            .iter()
            .map(|r| r["opcodes"].as_array().unwrap().len())
            .sum();
        assert_eq!(total, X86_64_PROLOGUE.len());
    }

    #[test]
    fn test_x86_64_plain_listing() {
        let req = DisasmRequest::new(&X86_64_PROLOGUE).with_arch("x86_64");
        let out = run(&req, OutputMode::Plain).expect("disassembly failed");
        let lines: Vec<&str> = out.lines().collect();

        assert_eq!(lines.len(), 6);
        assert_eq!(lines[0], "   0:\tpush   rbp");
        assert_eq!(lines[1], "   1:\tmov    rbp,rsp");
        assert_eq!(lines[4], "   7:\tret");
    }

    #[test]
    fn test_truncated_tail_renders_bad() {
        // an aarch64 nop followed by half an instruction
        let image = [0x1f, 0x20, 0x03, 0xd5, 0x1f, 0x20];
        let req = DisasmRequest::new(&image).with_arch("aarch64").with_opcodes(true);
        let out = run(&req, OutputMode::Json).expect("disassembly failed");
        let v: Value = serde_json::from_str(&out).unwrap();

        assert_eq!(v[0]["operation"], "nop");
        assert_eq!(v[1]["operation"], BAD_INSN);
        assert_eq!(v[1]["opcodes"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_line_info_with_real_decoder() {
        let table = LineTable::new(vec![vec![
            LineInfo::new(0xffff_0000, "prog.c", 3).with_src("int prog(void) {"),
            LineInfo::new(0xffff_0004, "prog.c", 4).with_src("\treturn 0;"),
        ]]);
        let req = DisasmRequest::new(&X86_64_PROLOGUE)
            .with_arch("x86-64")
            .with_line_info(&table, 0xffff_0000, 0);
        let out = run(&req, OutputMode::Plain).expect("disassembly failed");
        let lines: Vec<&str> = out.lines().collect();

        assert_eq!(lines[0], "; int prog(void) {");
        assert_eq!(lines[1], "   0:\tpush   rbp");
        assert_eq!(lines[3], "; return 0;");
        assert_eq!(lines[4], "   4:\txor    eax,eax");
    }

    #[test]
    fn test_default_arch_comes_from_host() {
        // a single nop decodes on x86 and is harmless elsewhere
        let req = DisasmRequest::new(&[0x90]);
        match run(&req, OutputMode::Json) {
            Ok(out) => {
                let v: Value = serde_json::from_str(&out).unwrap();
                assert_eq!(v.as_array().unwrap().len(), 1);
            }
            Err(e) => panic!("host disassembly failed: {}", e),
        }
    }

    #[test]
    fn test_errors() {
        let err = run(&DisasmRequest::new(&[]), OutputMode::Json).unwrap_err();
        assert!(matches!(err, DisasmError::ImageEmpty));

        let req = DisasmRequest::new(&[0x90]).with_arch("z80");
        let err = run(&req, OutputMode::Json).unwrap_err();
        assert!(matches!(err, DisasmError::ArchitectureUnsupported(_)));
        assert_eq!(err.to_string(), "no decoder support for z80");
    }
}
