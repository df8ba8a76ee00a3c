//! Splitting `objdump -d` output into functions.

use std::sync::LazyLock;

use log::{debug, info, trace};
use regex::Regex;

use crate::graph::{CallGraph, Function};
use crate::symbol::{Symbol, SymbolTable};
use crate::{Instruction, InstructionAnalyzer};


// `00001000 <hook_task>:`
static FUNCTION_HEAD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([0-9A-Fa-f]+)\s+<([^>]+)>:\s*$").expect("UNREACHABLE")
});

// `   2002:	f00e fcc5	bl	1000 <hook_task>`
static INSTRUCTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([0-9A-Fa-f]+):\s+[0-9A-Fa-f ]+\t\s*(\S+)(?:\s+(.*))?$").expect("UNREACHABLE")
});

const SECTION_PREFIX: &str = "Disassembly of section ";


fn parse_function_head(line: &str) -> Option<(u64, &str)>
{
    let caps = FUNCTION_HEAD_RE.captures(line)?;
    let address = u64::from_str_radix(caps.get(1)?.as_str(), 16).ok()?;
    Some((address, caps.get(2)?.as_str()))
}

fn parse_instruction(line: &str) -> Option<Instruction<'_>>
{
    let caps = INSTRUCTION_RE.captures(line)?;
    let address = u64::from_str_radix(caps.get(1)?.as_str(), 16).ok()?;
    let opcode = caps.get(2)?.as_str();
    let operands = caps.get(3).map_or("", |m| m.as_str().trim());

    Some(Instruction(address, opcode, operands))
}


struct Block<'t, 's>
{
    symbol:       &'s Symbol,
    instructions: Vec<Instruction<'t>>,
}

impl CallGraph
{
    ///
    /// Build the call graph from disassembly text.
    ///
    /// Each `<hex> <name>:` header starts a block owned by the function
    /// symbol at that address; headers with no function symbol (data, or
    /// code the symbol table doesn't know) are skipped. Lines that don't
    /// parse as instructions are ignored.
    ///
    pub fn from_disassembly(text: &str, symbols: &SymbolTable, analyzer: &dyn InstructionAnalyzer) -> CallGraph
    {
        let mut graph = CallGraph::default();
        let mut current: Option<Block> = None;

        let finish = |block: Option<Block>, graph: &mut CallGraph|
        {
            if let Some(block) = block
            {
                let (frame_size, callsites) = analyzer.analyze_function(block.symbol, &block.instructions);
                trace!(
                    "`{}`: {} instructions, frame {}, {} callsites",
                    block.symbol.name, block.instructions.len(), frame_size, callsites.len()
                );
                let func = Function(block.symbol.address, &block.symbol.name, frame_size, callsites);
                graph.functions.insert(func.address, func);
            }
        };

        for line in text.lines()
        {
            if line.starts_with(SECTION_PREFIX)
            {
                finish(current.take(), &mut graph);
                continue;
            }

            if let Some((address, name)) = parse_function_head(line)
            {
                finish(current.take(), &mut graph);

                current = symbols
                    .function_at(address, Some(name))
                    .map(|symbol| Block { symbol, instructions: Vec::new() });

                if current.is_none()
                {
                    debug!("`{}` at {:x} has no function symbol; skipped", name, address);
                }
                continue;
            }

            if let Some(block) = current.as_mut()
            {
                match parse_instruction(line)
                {
                    Some(ins) => block.instructions.push(ins),
                    None      => trace!("ignoring `{}`", line),
                }
            }
        }
        finish(current.take(), &mut graph);

        graph.resolve_callees(symbols);
        info!("call graph: {} functions", graph.len());

        graph
    }
}



#[cfg(test)]
mod tests
{
    use super::*;
    use crate::graph::Callsite;
    use crate::symbol::{Symbol, SymbolKind};
    use crate::thumb::ArmAnalyzer;

    fn symbols() -> SymbolTable
    {
        SymbolTable::new(vec![
            Symbol(0x1000, SymbolKind::Function, 0x15C, "hook_task"),
            Symbol(0x2000, SymbolKind::Function, 0x51C, "console_task"),
            Symbol(0x3200, SymbolKind::Object, 0x124, "__just_data"),
            Symbol(0x4000, SymbolKind::Function, 0x11C, "touchpad_calc"),
            Symbol(0x5000, SymbolKind::Function, 0x12C, "touchpad_calc.constprop.42"),
            Symbol(0x12000, SymbolKind::Function, 0x13C, "trackpad_range"),
            Symbol(0x13000, SymbolKind::Function, 0x200, "inlined_mul"),
            Symbol(0x13100, SymbolKind::Function, 0x200, "inlined_mul"),
            Symbol(0x13100, SymbolKind::Function, 0x200, "inlined_mul_alias"),
        ])
    }

    #[test]
    fn line_parsers()
    {
        assert_eq!(parse_function_head("00001000 <hook_task>:"), Some((0x1000, "hook_task")));
        assert_eq!(parse_function_head("\t..."), None);

        assert_eq!(
            parse_instruction("   2002:\tf00e fcc5\tbl\t1000 <hook_task>"),
            Some(Instruction(0x2002, "bl", "1000 <hook_task>"))
        );
        assert_eq!(
            parse_instruction("   1004:\t4770\t\tbx\tlr"),
            Some(Instruction(0x1004, "bx", "lr"))
        );
        assert_eq!(
            parse_instruction("   1000:\tdead beef\tfake"),
            Some(Instruction(0x1000, "fake", ""))
        );
        assert_eq!(parse_instruction("\t..."), None);
    }

    #[test]
    fn analyze_disassembly()
    {
        let text = "\n\
            Disassembly of section .text:\n\
            \n\
            00000900 <wook_task>:\n\
            \t...\n\
            00001000 <hook_task>:\n   \
            1000:\tdead beef\tfake\n   \
            1004:\t4770\t\tbx\tlr\n   \
            1006:\tb113\tcbz\tr3, 100929de <flash_command_write>\n   \
            1008:\t00015cfc\t.word\t0x00015cfc\n\
            00002000 <console_task>:\n   \
            2000:\tb508\t\tpush\t{r3, lr} ; malformed comments,; r0, r1 \n   \
            2002:\tf00e fcc5\tbl\t1000 <hook_task>\n   \
            2006:\tf00e bd3b\tb.w\t53968 <get_program_memory_addr>\n   \
            200a:\tdead beef\tfake\n\
            00004000 <touchpad_calc>:\n   \
            4000:\t4770\t\tbx\tlr\n\
            00010000 <look_task>:";

        let graph = CallGraph::from_disassembly(text, &symbols(), &ArmAnalyzer);

        let expect = CallGraph::new([
            Function(0x1000, "hook_task", 0, vec![
                Callsite(Some(0x1006), Some(0x100929de), true),
            ]),
            Function(0x2000, "console_task", 8, vec![
                Callsite(Some(0x2002), Some(0x1000), false).with_callee(0x1000),
                Callsite(Some(0x2006), Some(0x53968), true),
            ]),
            Function(0x4000, "touchpad_calc", 0, vec![]),
        ]);
        assert_eq!(graph, expect);
    }

    #[test]
    fn empty_function_and_mid_function_target()
    {
        let text = "00001000 <hook_task>:\n\
            \t...\n\
            00002000 <console_task>:\n   \
            2000:\tf00e fcc5\tbl\t1010 <hook_task+0x10>\n   \
            2004:\tf00e fcc5\tbl\t3210 <__just_data+0x10>\n";

        let graph = CallGraph::from_disassembly(text, &symbols(), &ArmAnalyzer);

        assert_eq!(graph.get(0x1000), Some(&Function(0x1000, "hook_task", 0, vec![])));
        assert_eq!(graph.get(0x2000).unwrap().callsites, vec![
            Callsite(Some(0x2000), Some(0x1010), false).with_callee(0x1000),
            Callsite(Some(0x2004), Some(0x3210), false),
        ]);
    }

    #[test]
    fn target_past_inner_mapping_symbol()
    {
        let symbols = SymbolTable::parse(
            "00001000 g     F .text\t00000100 foo\n\
             00001000 l       .text\t00000000 $t\n\
             00001040 l       .text\t00000000 $d\n\
             00001048 l       .text\t00000000 $t\n\
             00002000 g     F .text\t00000010 bar\n\
             00002000 l       .text\t00000000 $t\n",
        );
        let text = "00001000 <foo>:\n   \
            1000:\tb500\t\tpush\t{lr}\n\
            00002000 <bar>:\n   \
            2000:\tb508\t\tpush\t{r3, lr}\n   \
            2002:\tf7ff fffe\tbl\t1080 <foo+0x80>\n";

        let graph = CallGraph::from_disassembly(text, &symbols, &ArmAnalyzer);

        assert_eq!(graph.get(0x2000).unwrap().callsites, vec![
            Callsite(Some(0x2002), Some(0x1080), false).with_callee(0x1000),
        ]);
    }
}
