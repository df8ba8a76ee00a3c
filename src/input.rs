use std::{fs, path::{Path, PathBuf}};

use log::{info, warn};
use xmas_elf::{header::Machine, ElfFile};

use crate::error::{Error, Result};
use crate::Arch;



///
/// What the analysis needs to know about the ELF before running the
/// external tools on it.
///
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InputData
{
    pub elf_path: PathBuf,
    pub arch:     Option<Arch>,
}

///
/// Read the ELF header of `elf_fp`, check there is code to analyze and
/// find out which instruction set it holds.
///
/// `arch` is `None` for a machine with no `InstructionAnalyzer`; the
/// caller decides whether an explicit `--arch` overrides that.
///
pub fn load_elf(elf_fp: &Path) -> Result<InputData>
{
    let elf_bytes: Vec<u8> = fs::read(elf_fp).map_err(|e| Error::Io(elf_fp.to_path_buf(), e))?;

    let elf = ElfFile::new(&elf_bytes).map_err(|s| Error::BadElf(s.to_string()))?;

    if elf.find_section_by_name(".text").is_none()
    {
        return Err(Error::BadElf("section .text could not be found".to_string()));
    }

    let arch = match elf.header.pt2.machine().as_machine()
    {
        Machine::Arm => Some(Arch::Arm),
        other        =>
        {
            warn!("no instruction analyzer for machine {:?}", other);
            None
        },
    };
    info!("{:?}: arch {:?}", elf_fp, arch);

    Ok(InputData
    {
        elf_path: elf_fp.to_path_buf(),
        arch,
    })
}

/// `--arch` if given, otherwise what the ELF header says.
pub fn select_arch(requested: Option<Arch>, input: &InputData) -> Result<Arch>
{
    requested
        .or(input.arch)
        .ok_or_else(|| Error::UnsupportedArch(input.elf_path.display().to_string()))
}
