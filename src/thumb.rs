//! ARM / Thumb-2 reading of objdump disassembly.

use std::sync::LazyLock;

use log::trace;
use regex::Regex;

use crate::graph::Callsite;
use crate::symbol::Symbol;
use crate::{Instruction, InstructionAnalyzer};


const CONDITION_CODES: &str = "eq|ne|cs|hs|cc|lo|mi|pl|vs|vc|hi|ls|ge|lt|gt|le|al";

fn opcode_re(stem: &str) -> Regex
{
    Regex::new(&format!(r"^(?:{})(?:{})?(?:\.[nw])?$", stem, CONDITION_CODES))
        .expect("UNREACHABLE: opcode regex")
}

macro_rules! lazy_re {
    ($name:ident, $re:expr) => {
        static $name: LazyLock<Regex> = LazyLock::new(|| $re);
    };
}

lazy_re!(JUMP_OPCODE_RE, opcode_re("b|bx"));
lazy_re!(CALL_OPCODE_RE, opcode_re("bl|blx"));
lazy_re!(CBZ_CBNZ_OPCODE_RE, Regex::new(r"^cbn?z(?:\.[nw])?$").expect("UNREACHABLE"));
lazy_re!(PUSH_OPCODE_RE, opcode_re("push"));
lazy_re!(STM_OPCODE_RE, opcode_re("stmdb"));
lazy_re!(SUB_OPCODE_RE, opcode_re("subs?w?"));

// `53f90 <get_time+0x18>`
lazy_re!(CALL_OPERAND_RE, Regex::new(r"^([0-9A-Fa-f]+)\s+<([^>]+)>").expect("UNREACHABLE"));
// `r6, 53f90 <get+0x0>`
lazy_re!(CBZ_CBNZ_OPERAND_RE, Regex::new(r"^[^,]+,\s+([0-9A-Fa-f]+)\s+<([^>]+)>").expect("UNREACHABLE"));
// `r3`, `ip`, ...
lazy_re!(REGISTER_OPERAND_RE, Regex::new(r"^(?:r\d+|sb|sl|fp|ip|sp|lr|pc)\b").expect("UNREACHABLE"));
// `sp, sp, #1668 ; 0x684` or `sp, #1668`; the decimal immediate is authoritative
lazy_re!(SUB_OPERAND_RE, Regex::new(r"^sp[^#]+#(\d+)").expect("UNREACHABLE"));
lazy_re!(REGISTER_LIST_RE, Regex::new(r"\{([^}]*)\}").expect("UNREACHABLE"));
lazy_re!(STM_OPERAND_RE, Regex::new(r"^sp!,\s*\{([^}]*)\}").expect("UNREACHABLE"));
lazy_re!(REGISTER_RANGE_RE, Regex::new(r"^r(\d+)\s*-\s*r(\d+)$").expect("UNREACHABLE"));


#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Branch
{
    Call,
    Jump,
}

fn classify_branch(opcode: &str) -> Option<Branch>
{
    if CALL_OPCODE_RE.is_match(opcode)
    {
        Some(Branch::Call)
    }
    else if JUMP_OPCODE_RE.is_match(opcode) || CBZ_CBNZ_OPCODE_RE.is_match(opcode)
    {
        Some(Branch::Jump)
    }
    else
    {
        None
    }
}

///
/// Target of a branch, read from the hex field of the operand.
///
/// `Ok(None)` is a register-indirect target, `Err(())` an operand that
/// could not be read at all.
///
fn branch_target(opcode: &str, operands: &str) -> Result<Option<u64>, ()>
{
    let caps = if CBZ_CBNZ_OPCODE_RE.is_match(opcode)
    {
        CBZ_CBNZ_OPERAND_RE.captures(operands)
    }
    else
    {
        CALL_OPERAND_RE.captures(operands)
    };

    match caps
    {
        Some(caps) => u64::from_str_radix(&caps[1], 16).map(Some).map_err(|_| ()),
        None if REGISTER_OPERAND_RE.is_match(operands) => Ok(None),
        None => Err(()),
    }
}

/// Number of registers in a `{r4, r5, r8-r11, lr}` list.
fn count_registers(list: &str) -> u64
{
    list.split(',')
        .map(str::trim)
        .filter(|reg| !reg.is_empty())
        .map(|reg| match REGISTER_RANGE_RE.captures(reg)
        {
            Some(caps) =>
            {
                let lo: u64 = caps[1].parse().unwrap_or(0);
                let hi: u64 = caps[2].parse().unwrap_or(0);
                hi.saturating_sub(lo) + 1
            },
            None => 1,
        })
        .sum()
}

/// Bytes pushed onto the stack by one instruction.
fn stack_delta(opcode: &str, operands: &str) -> u64
{
    const WORD: u64 = 4;

    if PUSH_OPCODE_RE.is_match(opcode)
    {
        REGISTER_LIST_RE
            .captures(operands)
            .map_or(0, |caps| count_registers(&caps[1]) * WORD)
    }
    else if STM_OPCODE_RE.is_match(opcode)
    {
        // without writeback SP doesn't move
        STM_OPERAND_RE
            .captures(operands)
            .map_or(0, |caps| count_registers(&caps[1]) * WORD)
    }
    else if SUB_OPCODE_RE.is_match(opcode)
    {
        SUB_OPERAND_RE
            .captures(operands)
            .and_then(|caps| caps[1].parse().ok())
            .unwrap_or(0)
    }
    else
    {
        0
    }
}



/// `InstructionAnalyzer` for ARMv6-M / ARMv7-M code.
#[derive(Clone, Copy, Debug, Default)]
pub struct ArmAnalyzer;

impl InstructionAnalyzer for ArmAnalyzer
{
    fn analyze_function(&self, symbol: &Symbol, instructions: &[Instruction]) -> (u64, Vec<Callsite>)
    {
        let start = symbol.address;
        let end   = start.saturating_add(symbol.size);

        let mut frame_size = 0;
        let mut callsites  = Vec::new();

        for ins in instructions
        {
            let opcode   = ins.opcode.to_ascii_lowercase();
            let operands = ins.operands.trim();

            frame_size += stack_delta(&opcode, operands);

            let Some(kind) = classify_branch(&opcode) else { continue };
            let is_jump = kind == Branch::Jump;

            match branch_target(&opcode, operands)
            {
                Ok(Some(target)) =>
                {
                    // in-function targets are local branches, not calls
                    if symbol.size > 0 && start < target && target < end
                    {
                        continue;
                    }
                    callsites.push(Callsite(Some(ins.address), Some(target), is_jump));
                },
                Ok(None) =>
                {
                    // `bx lr` returns
                    if operands == "lr"
                    {
                        continue;
                    }
                    trace!("`{}`: indirect {} at {:x}", symbol.name, opcode, ins.address);
                    callsites.push(Callsite(Some(ins.address), None, is_jump));
                },
                Err(()) =>
                {
                    trace!("`{}`: unreadable operand `{}` at {:x}", symbol.name, operands, ins.address);
                },
            }
        }

        (frame_size, callsites)
    }
}



#[cfg(test)]
mod tests
{
    use super::*;
    use crate::symbol::{Symbol, SymbolKind};

    fn with_condition_codes(stems: &[&str]) -> Vec<String>
    {
        let mut opcodes = Vec::new();
        for stem in stems
        {
            opcodes.push(stem.to_string());
            opcodes.extend(CONDITION_CODES.split('|').map(|cc| format!("{}{}", stem, cc)));
        }
        opcodes
    }

    #[test]
    fn branch_opcodes()
    {
        for opcode in with_condition_codes(&["b", "bx"])
        {
            assert_eq!(classify_branch(&opcode), Some(Branch::Jump), "{}", opcode);
            assert_eq!(classify_branch(&format!("{}.n", opcode)), Some(Branch::Jump));
            assert_eq!(classify_branch(&format!("{}.w", opcode)), Some(Branch::Jump));
        }
        for opcode in with_condition_codes(&["bl", "blx"])
        {
            assert_eq!(classify_branch(&opcode), Some(Branch::Call), "{}", opcode);
            assert_eq!(classify_branch(&format!("{}.n", opcode)), Some(Branch::Call));
        }
        for opcode in ["cbz", "cbnz", "cbz.n", "cbnz.n", "cbz.w", "cbnz.w"]
        {
            assert_eq!(classify_branch(opcode), Some(Branch::Jump));
        }

        assert!(!JUMP_OPCODE_RE.is_match("bl"));
        assert!(!JUMP_OPCODE_RE.is_match("blx"));
        assert!(!CALL_OPCODE_RE.is_match("ble"));
        assert!(!CBZ_CBNZ_OPCODE_RE.is_match("cbn"));
        assert_eq!(classify_branch("bic"), None);
    }

    #[test]
    fn branch_operands()
    {
        assert_eq!(branch_target("bl", "53f90 <get_time+0x18>"), Ok(Some(0x53f90)));
        assert_eq!(branch_target("cbz", "r6, 53f90 <get+0x0>"), Ok(Some(0x53f90)));
        assert_eq!(branch_target("blx", "r3"), Ok(None));
        assert_eq!(branch_target("b.w", "garbage"), Err(()));
    }

    #[test]
    fn stack_adjusting_opcodes()
    {
        assert!(PUSH_OPCODE_RE.is_match("push"));
        assert!(!PUSH_OPCODE_RE.is_match("pushal"));
        assert!(STM_OPCODE_RE.is_match("stmdb"));
        assert!(!STM_OPCODE_RE.is_match("lstm"));
        for opcode in ["sub", "subs", "subw", "sub.w", "subs.w"]
        {
            assert!(SUB_OPCODE_RE.is_match(opcode), "{}", opcode);
        }

        assert_eq!(stack_delta("sub", "sp, sp, #1668   ; 0x684"), 1668);
        assert_eq!(stack_delta("sub", "sp, #1668"), 1668);
        assert_eq!(stack_delta("sub", "sl, #1668"), 0);
        assert_eq!(stack_delta("push", "{r4-r7, lr}"), 20);
        assert_eq!(stack_delta("stmdb", "sp, {r4}"), 0);
    }

    #[test]
    fn analyze_function()
    {
        let symbol = Symbol(0x10, SymbolKind::Function, 0x100, "foo");
        let instructions = [
            Instruction(0x10, "push", "{r4, r5, r6, r7, lr}"),
            Instruction(0x12, "subw", "sp, sp, #16\t; 0x10"),
            Instruction(0x16, "movs", "lr, r1"),
            Instruction(0x18, "beq.n", "26 <foo+0x26>"),
            Instruction(0x1a, "bl", "30 <foo+0x30>"),
            Instruction(0x1e, "bl", "deadbeef <bar>"),
            Instruction(0x22, "blx", "0 <woo>"),
            Instruction(0x26, "push", "{r1}"),
            Instruction(0x28, "stmdb", "sp!, {r4, r5, r6, r7, r8, r9, lr}"),
            Instruction(0x2c, "stmdb", "sp!, {r4}"),
            Instruction(0x30, "stmdb", "sp, {r4}"),
            Instruction(0x34, "bx.n", "10 <foo>"),
        ];

        let (size, callsites) = ArmAnalyzer.analyze_function(&symbol, &instructions);

        assert_eq!(size, 72);
        assert_eq!(callsites, vec![
            Callsite(Some(0x1e), Some(0xdeadbeef), false),
            Callsite(Some(0x22), Some(0x0), false),
            Callsite(Some(0x34), Some(0x10), true),
        ]);
    }

    #[test]
    fn prologue_call_and_self_tail_branch()
    {
        // the function ends at 0x2e, so 0x30 is a neighbour
        let symbol = Symbol(0x10, SymbolKind::Function, 0x1e, "foo");
        let instructions = [
            Instruction(0x10, "push", "{r4,r5,r6,r7,lr}"),
            Instruction(0x12, "subw", "sp,sp,#16"),
            Instruction(0x16, "bl", "30 <bar>"),
            Instruction(0x1a, "bx.n", "10 <foo>"),
            Instruction(0x1c, "blx", "r3"),
            Instruction(0x1e, "bx", "lr"),
        ];

        let (size, callsites) = ArmAnalyzer.analyze_function(&symbol, &instructions);

        assert_eq!(size, 36);
        assert_eq!(callsites, vec![
            Callsite(Some(0x16), Some(0x30), false),
            Callsite(Some(0x1a), Some(0x10), true),
            Callsite(Some(0x1c), None, false),
        ]);
    }
}
