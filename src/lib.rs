#![allow(clippy::redundant_field_names)]

pub mod annotation;
pub mod disasm;
pub mod error;
pub mod graph;
pub mod input;
pub mod options;
pub mod output;
pub mod stack;
pub mod state;
pub mod symbol;
pub mod task;
pub mod thumb;
pub mod tools;

pub use error::Error;
pub use graph::{CallGraph, Callsite, Function};
pub use state::State;
pub use symbol::{Symbol, SymbolKind, SymbolTable};
pub use task::Task;









/*       █████╗ ██████╗  ██████╗██╗  ██╗      */
/*      ██╔══██╗██╔══██╗██╔════╝██║  ██║      */
/*      ███████║██████╔╝██║     ███████║      */
/*      ██╔══██║██╔══██╗██║     ██╔══██║      */
/*      ██║  ██║██║  ██║╚██████╗██║  ██║      */
/*      ╚═╝  ╚═╝╚═╝  ╚═╝ ╚═════╝╚═╝  ╚═╝      */
/*     ████████████████████████████████╗      */
/*     ╚═══════════════════════════════╝      */
use core::{fmt, str::FromStr};

/// Instruction-set family of the analyzed binary. Picks the
/// `InstructionAnalyzer` used to read each function's disassembly.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Arch
{
    Arm,
}

impl Arch
{
    pub fn analyzer(&self) -> Box<dyn InstructionAnalyzer>
    {
        match *self
        {
            Arch::Arm => Box::new(thumb::ArmAnalyzer),
        }
    }
}

impl FromStr for Arch
{
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s
        {
            "arm" | "thumb" | "cortex-m" => Ok(Arch::Arm),
            other                        => Err(format!("unsupported architecture `{}`", other)),
        }
    }
}

impl fmt::Display for Arch
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        match *self
        {
            Arch::Arm => f.write_str("arm"),
        }
    }
}











/*      ██╗███╗   ██╗███████╗███╗   ██╗      */
/*      ██║████╗  ██║██╔════╝████╗  ██║      */
/*      ██║██╔██╗ ██║███████╗██╔██╗ ██║      */
/*      ██║██║╚██╗██║╚════██║██║╚██╗██║      */
/*      ██║██║ ╚████║███████║██║ ╚████║      */
/*      ╚═╝╚═╝  ╚═══╝╚══════╝╚═╝  ╚═══╝      */
/*     ███████████████████████████████╗      */
/*     ╚══════════════════════════════╝      */

/// One decoded disassembly line, borrowed from the objdump text.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Instruction<'a>
{
    pub address:  u64,
    pub opcode:   &'a str,
    pub operands: &'a str,
}

#[allow(non_snake_case)]
pub fn Instruction<'a>(address: u64, opcode: &'a str, operands: &'a str) -> Instruction<'a>
{
    Instruction { address, opcode, operands }
}

///
/// Per-architecture reader of a single function's instruction stream.
///
/// Returns the bytes the function itself pushes onto the stack and the
/// outgoing callsites in source order. Callsites leave `callee` unset;
/// the call graph builder fills it in once every function is known.
///
pub trait InstructionAnalyzer
{
    fn analyze_function(&self, symbol: &Symbol, instructions: &[Instruction]) -> (u64, Vec<Callsite>);
}
