//! External binutils: disassembler, symbol dumper, address-to-line resolver.

use std::{
    collections::HashMap,
    ffi::OsStr,
    path::{Path, PathBuf},
    process::Command,
    sync::LazyLock,
};

use log::debug;
use regex::Regex;

use crate::error::{Error, Result};


/// Run `tool`, returning its stdout. Failing to start it and a non-zero
/// exit are both fatal.
fn run<I, S>(tool: &str, args: I, action: &'static str) -> Result<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut cmd = Command::new(tool);
    cmd.args(args);
    debug!("running {:?}", cmd);

    let output = cmd.output().map_err(|source| Error::ToolInvocation
    {
        tool: tool.to_string(),
        source,
    })?;

    if !output.status.success()
    {
        return Err(Error::ToolExecution
        {
            tool:   tool.to_string(),
            action,
            status: output.status,
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}


///
/// The objdump / addr2line pair used on one ELF.
///
#[derive(Clone, Debug)]
pub struct Toolchain
{
    pub objdump:   String,
    pub addr2line: String,
    pub elf:       PathBuf,
}

impl Toolchain
{
    pub fn new(objdump: &str, addr2line: &str, elf: &Path) -> Self
    {
        Toolchain
        {
            objdump:   objdump.to_string(),
            addr2line: addr2line.to_string(),
            elf:       elf.to_path_buf(),
        }
    }

    pub fn disassemble(&self) -> Result<String>
    {
        run(&self.objdump, [OsStr::new("-d"), self.elf.as_os_str()], "disassemble")
    }

    pub fn dump_symbols(&self) -> Result<String>
    {
        run(&self.objdump, [OsStr::new("-t"), self.elf.as_os_str()], "dump symbol table")
    }

    pub fn line_source(&self) -> Addr2Line
    {
        Addr2Line
        {
            tool: self.addr2line.clone(),
            elf:  self.elf.clone(),
        }
    }
}



/// Maps a code address to `path:line`.
pub trait LineSource
{
    fn address_to_line(&mut self, address: u64) -> Result<String>;
}

/// `addr2line -e <elf> <address>`
#[derive(Clone, Debug)]
pub struct Addr2Line
{
    tool: String,
    elf:  PathBuf,
}

impl LineSource for Addr2Line
{
    fn address_to_line(&mut self, address: u64) -> Result<String>
    {
        let hex = format!("{:x}", address);
        let out = run(
            &self.tool,
            [OsStr::new("-e"), self.elf.as_os_str(), OsStr::new(&hex)],
            "resolve lines",
        )?;
        Ok(strip_discriminator(&out))
    }
}

/// Fixed answers; unknown addresses give `??:0` like addr2line does.
impl LineSource for HashMap<u64, String>
{
    fn address_to_line(&mut self, address: u64) -> Result<String>
    {
        Ok(self.get(&address).cloned().unwrap_or_else(|| "??:0".to_string()))
    }
}


static DISCRIMINATOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\s*\(discriminator\s+\d+\)\s*$").expect("UNREACHABLE")
});

/// First line of addr2line output without the ` (discriminator N)` tail.
pub fn strip_discriminator(out: &str) -> String
{
    let first = out.lines().next().unwrap_or("").trim();
    DISCRIMINATOR_RE.replace(first, "").into_owned()
}

/// `path/to/file.c:12` -> `path/to/file.c`
pub fn location_path(location: &str) -> &str
{
    location.rsplit_once(':').map_or(location, |(path, _)| path)
}


///
/// Memoizes a `LineSource` per address for the lifetime of the run.
///
pub struct LineCache
{
    source: Box<dyn LineSource>,
    cache:  HashMap<u64, String>,
}

impl LineCache
{
    pub fn new(source: impl LineSource + 'static) -> Self
    {
        LineCache
        {
            source: Box::new(source),
            cache:  HashMap::new(),
        }
    }

    pub fn line(&mut self, address: u64) -> Result<&str>
    {
        if !self.cache.contains_key(&address)
        {
            let line = self.source.address_to_line(address)?;
            self.cache.insert(address, line);
        }
        Ok(self.cache[&address].as_str())
    }

    /// Source file part of the line for `address`.
    pub fn path(&mut self, address: u64) -> Result<&str>
    {
        self.line(address).map(location_path)
    }
}
