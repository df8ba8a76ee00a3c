use std::{
    collections::{BTreeMap, HashMap},
    sync::LazyLock,
};

use log::trace;
use regex::Regex;


#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SymbolKind
{
    Function,
    Object,
}

/// One entry of `objdump -t`. Several symbols may share an address.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Symbol
{
    pub address: u64,
    pub kind:    SymbolKind,
    pub size:    u64,
    pub name:    String,
}

#[allow(non_snake_case)]
pub fn Symbol(address: u64, kind: SymbolKind, size: u64, name: &str) -> Symbol
{
    Symbol
    {
        address,
        kind,
        size,
        name: name.to_string(),
    }
}

impl Symbol
{
    pub fn is_function(&self) -> bool
    {
        self.kind == SymbolKind::Function
    }

    pub fn contains(&self, address: u64) -> bool
    {
        self.size > 0 && self.address <= address && address - self.address < self.size
    }
}


// ADDR FLAG [TYPE] SECTION SIZE [.hidden] NAME
static SYMBOL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<address>[0-9A-Fa-f]+)\s+[lwg]\s+((?P<type>[OF])\s+)?\S+\s+(?P<size>[0-9A-Fa-f]+)\s+(\S+\s+)?(?P<name>\S+)$",
    )
    .expect("UNREACHABLE: symbol regex")
});

///
/// Parse the text printed by `objdump -t`.
///
/// Lines that don't describe a function or data symbol (headers, section
/// and file symbols) are skipped. A symbol without a type column is taken
/// as data.
///
pub fn parse_symbol_text(text: &str) -> Vec<Symbol>
{
    let mut symbols = Vec::new();

    for line in text.lines()
    {
        let caps = match SYMBOL_RE.captures(line.trim())
        {
            Some(caps) => caps,
            None       =>
            {
                trace!("skipping symbol line `{}`", line);
                continue;
            },
        };

        let kind = match caps.name("type").map(|m| m.as_str())
        {
            Some("F") => SymbolKind::Function,
            _         => SymbolKind::Object,
        };

        // both fields are guaranteed hex by the regex, but may overflow
        let (Ok(address), Ok(size)) = (
            u64::from_str_radix(&caps["address"], 16),
            u64::from_str_radix(&caps["size"], 16),
        )
        else
        {
            trace!("skipping symbol line `{}`", line);
            continue;
        };

        symbols.push(Symbol(address, kind, size, &caps["name"]));
    }

    symbols
}



///
/// Symbols in dump order, indexed by address and by name.
///
#[derive(Clone, Debug, Default)]
pub struct SymbolTable
{
    symbols:    Vec<Symbol>,
    by_address: BTreeMap<u64, Vec<usize>>,
    by_name:    HashMap<String, Vec<usize>>,
}

impl SymbolTable
{
    pub fn new(symbols: Vec<Symbol>) -> Self
    {
        let mut by_address: BTreeMap<u64, Vec<usize>> = BTreeMap::new();
        let mut by_name:    HashMap<String, Vec<usize>> = HashMap::new();

        for (i, sym) in symbols.iter().enumerate()
        {
            by_address.entry(sym.address).or_default().push(i);
            by_name.entry(sym.name.clone()).or_default().push(i);
        }

        SymbolTable { symbols, by_address, by_name }
    }

    pub fn parse(text: &str) -> Self
    {
        SymbolTable::new(parse_symbol_text(text))
    }

    pub fn symbols(&self) -> &[Symbol]
    {
        &self.symbols
    }

    pub fn len(&self) -> usize
    {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.symbols.is_empty()
    }

    /// Every symbol (aliases included) starting at `address`.
    pub fn at(&self, address: u64) -> impl Iterator<Item = &Symbol>
    {
        self.by_address
            .get(&address)
            .into_iter()
            .flatten()
            .map(move |&i| &self.symbols[i])
    }

    pub fn named<'s>(&'s self, name: &str) -> impl Iterator<Item = &'s Symbol>
    {
        self.by_name
            .get(name)
            .into_iter()
            .flatten()
            .map(move |&i| &self.symbols[i])
    }

    /// Function symbol owning the code at `address`. When aliases exist,
    /// the one called `preferred` wins.
    pub fn function_at(&self, address: u64, preferred: Option<&str>) -> Option<&Symbol>
    {
        let mut first = None;
        for sym in self.at(address).filter(|s| s.is_function())
        {
            if Some(sym.name.as_str()) == preferred
            {
                return Some(sym);
            }
            first.get_or_insert(sym);
        }
        first
    }

    pub fn function_named(&self, name: &str) -> Option<&Symbol>
    {
        self.named(name).find(|s| s.is_function())
    }

    ///
    /// Nearest symbol at or before `address` whose extent covers it.
    ///
    /// Zero-size symbols (the `$t` / `$d` mapping symbols of ARM objects,
    /// section end markers) cover nothing and are walked past. Among
    /// symbols sharing an address, functions win.
    ///
    pub fn containing(&self, address: u64) -> Option<&Symbol>
    {
        self.by_address
            .range(..=address)
            .rev()
            .find_map(|(_, group)|
            {
                group
                    .iter()
                    .map(|&i| &self.symbols[i])
                    .filter(|sym| sym.contains(address))
                    .min_by_key(|sym| !sym.is_function())
            })
    }
}



#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn parses_function_and_hidden_symbols()
    {
        let text = "0 g     F .text  e8 Foo\n\
                    0000dead  w    F .text  000000e8 .hidden Bar\n";

        assert_eq!(
            parse_symbol_text(text),
            vec![
                Symbol(0x0, SymbolKind::Function, 0xe8, "Foo"),
                Symbol(0xdead, SymbolKind::Function, 0xe8, "Bar"),
            ]
        );
    }

    #[test]
    fn parses_data_symbols_and_untyped_markers()
    {
        let text = "\n\
            elf:     file format elf32-littlearm\n\
            \n\
            SYMBOL TABLE:\n\
            00000000 l    d  .text\t00000000 .text\n\
            deadbeef l     O .bss   00000004 .hidden Woooo\n\
            deadbee g     O .rodata        00000008 __Hooo_ooo\n\
            deadbee g       .rodata        00000000 __foo_doo_coo_end\n";

        assert_eq!(
            parse_symbol_text(text),
            vec![
                Symbol(0xdeadbeef, SymbolKind::Object, 0x4, "Woooo"),
                Symbol(0xdeadbee, SymbolKind::Object, 0x8, "__Hooo_ooo"),
                Symbol(0xdeadbee, SymbolKind::Object, 0x0, "__foo_doo_coo_end"),
            ]
        );
    }

    #[test]
    fn lookups_cover_aliases_and_ranges()
    {
        let table = SymbolTable::new(vec![
            Symbol(0x13000, SymbolKind::Function, 0x100, "inlined_mul"),
            Symbol(0x13100, SymbolKind::Function, 0x200, "inlined_mul"),
            Symbol(0x13100, SymbolKind::Function, 0x200, "inlined_mul_alias"),
            Symbol(0x14000, SymbolKind::Object, 0x10, "table"),
        ]);

        assert_eq!(table.at(0x13100).count(), 2);
        assert_eq!(table.named("inlined_mul").count(), 2);
        assert_eq!(
            table.function_at(0x13100, Some("inlined_mul_alias")).map(|s| s.name.as_str()),
            Some("inlined_mul_alias")
        );
        assert_eq!(
            table.function_at(0x13100, None).map(|s| s.name.as_str()),
            Some("inlined_mul")
        );

        assert_eq!(table.containing(0x13018).map(|s| s.address), Some(0x13000));
        assert_eq!(table.containing(0x1400f).map(|s| s.name.as_str()), Some("table"));
        assert!(table.containing(0x14010).is_none());
        assert!(table.containing(0x100).is_none());
    }

    #[test]
    fn containing_walks_past_mapping_symbols()
    {
        let table = SymbolTable::parse(
            "00001000 g     F .text\t00000100 foo\n\
             00001000 l       .text\t00000000 $t\n\
             00001040 l       .text\t00000000 $d\n\
             00001048 l       .text\t00000000 $t\n\
             00001100 l     O .rodata\t00000010 table\n\
             00001100 l       .rodata\t00000000 $d\n",
        );

        assert_eq!(table.at(0x1040).next().map(|s| s.kind), Some(SymbolKind::Object));
        assert_eq!(table.containing(0x1080).map(|s| s.name.as_str()), Some("foo"));
        assert_eq!(table.containing(0x1044).map(|s| s.name.as_str()), Some("foo"));
        assert_eq!(table.containing(0x1000).map(|s| s.name.as_str()), Some("foo"));
        assert_eq!(table.containing(0x1104).map(|s| s.name.as_str()), Some("table"));
        assert!(table.containing(0x1110).is_none());
    }
}
