use std::collections::{BTreeMap, BTreeSet, HashSet};

use log::{debug, warn};

use crate::symbol::SymbolTable;


/// An outgoing edge of a function.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Callsite
{
    /// Address of the branch instruction; `None` for an edge added by an
    /// annotation.
    pub address: Option<u64>,
    /// `None` when the target is a register (indirect call / jump).
    pub target:  Option<u64>,
    /// Tail branch: transfers control without pushing a return address.
    pub is_jump: bool,
    /// Address of the called `Function`, once resolved.
    pub callee:  Option<u64>,
}

#[allow(non_snake_case)]
pub fn Callsite(address: Option<u64>, target: Option<u64>, is_jump: bool) -> Callsite
{
    Callsite
    {
        address,
        target,
        is_jump,
        callee: None,
    }
}

impl Callsite
{
    pub fn with_callee(mut self, callee: u64) -> Self
    {
        self.callee = Some(callee);
        self
    }

    /// True subroutine call into a known function.
    pub fn call_edge(&self) -> Option<u64>
    {
        if self.is_jump { None } else { self.callee }
    }
}


#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Function
{
    pub address:         u64,
    pub name:            String,
    /// Bytes this function reserves itself, callees excluded.
    pub frame_size:      u64,
    pub callsites:       Vec<Callsite>,

    // filled in by `CallGraph::analyze()`
    pub stack_max_usage: Option<u64>,
    pub stack_successor: Option<u64>,
    pub cycle_index:     Option<usize>,
}

#[allow(non_snake_case)]
pub fn Function(address: u64, name: &str, frame_size: u64, callsites: Vec<Callsite>) -> Function
{
    Function
    {
        address,
        name: name.to_string(),
        frame_size,
        callsites,
        stack_max_usage: None,
        stack_successor: None,
        cycle_index:     None,
    }
}

impl Function
{
    /// Callees reached through true calls, in callsite order.
    pub fn call_successors(&self) -> impl Iterator<Item = u64> + '_
    {
        self.callsites.iter().filter_map(Callsite::call_edge)
    }
}



///
/// Whole-program call graph: every function keyed by its start address.
/// Edges are plain `Callsite` records naming the callee's address, so the
/// map is the only owner of the nodes.
///
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CallGraph
{
    pub functions: BTreeMap<u64, Function>,
}

impl CallGraph
{
    pub fn new(functions: impl IntoIterator<Item = Function>) -> Self
    {
        CallGraph
        {
            functions: functions.into_iter().map(|f| (f.address, f)).collect(),
        }
    }

    pub fn get(&self, address: u64) -> Option<&Function>
    {
        self.functions.get(&address)
    }

    pub fn get_mut(&mut self, address: u64) -> Option<&mut Function>
    {
        self.functions.get_mut(&address)
    }

    pub fn len(&self) -> usize
    {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.functions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Function>
    {
        self.functions.values()
    }

    ///
    /// Fill in `callee` for every callsite with a numeric target.
    ///
    /// A target that is a function start maps to that function. Otherwise
    /// the symbol whose extent covers the target is used; when that symbol
    /// is not a function of this graph the edge stays unresolved.
    ///
    /// Modified fields:
    /// - `Callsite::callee`
    pub fn resolve_callees(&mut self, symbols: &SymbolTable)
    {
        let known: HashSet<u64> = self.functions.keys().copied().collect();

        for func in self.functions.values_mut()
        {
            for site in func.callsites.iter_mut()
            {
                let Some(target) = site.target else { continue };

                site.callee = if known.contains(&target)
                {
                    Some(target)
                }
                else
                {
                    symbols
                        .containing(target)
                        .map(|sym| sym.address)
                        .filter(|addr| known.contains(addr))
                };

                if site.callee.is_none()
                {
                    debug!("`{}`: no function at target {:x}", func.name, target);
                }
            }
        }
    }

    ///
    /// Apply annotation edits.
    ///
    /// Every function in `remove_set` loses its callsites and every callsite
    /// into it is dropped. Then each `(src, dst)` pair of `add_set` with
    /// neither end removed gets a synthetic call appended to `src`.
    ///
    /// Modified fields:
    /// - `Function::callsites`
    pub fn preprocess(&mut self, add_set: &BTreeSet<(u64, u64)>, remove_set: &BTreeSet<u64>)
    {
        for func in self.functions.values_mut()
        {
            if remove_set.contains(&func.address)
            {
                func.callsites.clear();
            }
            else
            {
                func.callsites
                    .retain(|site| site.callee.map_or(true, |callee| !remove_set.contains(&callee)));
            }
        }

        for &(src, dst) in add_set
        {
            if remove_set.contains(&src) || remove_set.contains(&dst)
            {
                continue;
            }
            if !self.functions.contains_key(&dst)
            {
                warn!("annotation adds a call to unknown function at {:x}", dst);
                continue;
            }

            match self.functions.get_mut(&src)
            {
                Some(func) => func.callsites.push(Callsite(None, Some(dst), false).with_callee(dst)),
                None       => warn!("annotation adds a call from unknown function at {:x}", src),
            }
        }
    }

    ///
    /// Worst-case call chain from `start`, following `stack_successor`.
    ///
    pub fn trace(&self, start: u64) -> Vec<&Function>
    {
        let mut trace: Vec<&Function> = Vec::new();
        let mut seen = HashSet::new();
        let mut next = Some(start);

        while let Some(addr) = next
        {
            if !seen.insert(addr)
            {
                break;
            }
            let Some(func) = self.functions.get(&addr) else { break };
            trace.push(func);
            next = func.stack_successor;
        }

        trace
    }
}
