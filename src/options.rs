use std::path::PathBuf;

use clap::Parser;

use crate::Arch;


/// Worst-case stack usage of firmware tasks, from the disassembly.
#[derive(Parser, Clone, Debug)]
#[command(name = "stack-analyzer", version)]
pub struct Options
{
    /// ELF image to analyze
    pub elf_path: PathBuf,

    /// Task list: JSON array of {"name", "routine", "stack_size"}
    #[arg(long = "tasks")]
    pub tasks: PathBuf,

    /// Annotation file adding and removing call graph edges
    #[arg(long = "annotation")]
    pub annotation: Option<PathBuf>,

    #[arg(long = "objdump", default_value = "arm-none-eabi-objdump")]
    pub objdump: String,

    #[arg(long = "addr2line", default_value = "arm-none-eabi-addr2line")]
    pub addr2line: String,

    /// Instruction set; read from the ELF header when omitted
    #[arg(long = "arch")]
    pub arch: Option<Arch>,

    /// Bytes added to every task total for the exception frame
    #[arg(long = "context-reserve", default_value_t = 0)]
    pub context_reserve: u64,

    /// Also write the call graph in DOT format here
    #[arg(long = "dot")]
    pub dot: Option<PathBuf>,

    /// More log output; repeat for more
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Options
{
    pub fn log_spec(&self) -> &'static str
    {
        match self.verbose
        {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}



#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn defaults()
    {
        let opts = Options::try_parse_from(["stack-analyzer", "ec.RW.elf", "--tasks", "tasks.json"]).unwrap();

        assert_eq!(opts.elf_path, PathBuf::from("ec.RW.elf"));
        assert_eq!(opts.objdump, "arm-none-eabi-objdump");
        assert_eq!(opts.addr2line, "arm-none-eabi-addr2line");
        assert_eq!(opts.arch, None);
        assert_eq!(opts.context_reserve, 0);
        assert_eq!(opts.log_spec(), "warn");
    }

    #[test]
    fn overrides()
    {
        let opts = Options::try_parse_from([
            "stack-analyzer", "ec.RW.elf", "--tasks", "tasks.json",
            "--annotation", "annotation.json", "--arch", "arm",
            "--context-reserve", "224", "-vv",
        ])
        .unwrap();

        assert_eq!(opts.annotation, Some(PathBuf::from("annotation.json")));
        assert_eq!(opts.arch, Some(Arch::Arm));
        assert_eq!(opts.context_reserve, 224);
        assert_eq!(opts.log_spec(), "debug");

        assert!(Options::try_parse_from(["stack-analyzer", "ec.RW.elf", "--tasks", "t", "--arch", "mips"]).is_err());
        assert!(Options::try_parse_from(["stack-analyzer", "ec.RW.elf"]).is_err());
    }
}
