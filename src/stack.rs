//! Worst-case stack usage over the call graph.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use log::{debug, warn};
use petgraph::{
    algo,
    graph::{DiGraph, NodeIndex},
};

use crate::graph::CallGraph;


/// A strongly connected component of the call-edge subgraph.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Component
{
    /// Function addresses, ascending.
    pub members:   Vec<u64>,
    /// More than one member, or a function calling itself.
    pub recursive: bool,
}


impl CallGraph
{
    ///
    /// Compute `stack_max_usage`, `stack_successor` and `cycle_index` for
    /// every function. Returns the components indexed by `cycle_index`.
    ///
    /// Only true calls count. Tail branches neither grow the caller's
    /// frame nor take part in cycle detection.
    ///
    /// Components are settled callees first. Inside a recursive component
    /// a depth-first walk from its lowest-address member ignores any
    /// callee still on the walk's path, so each cycle is counted once.
    ///
    /// Modified fields:
    /// - `Function::stack_max_usage`
    /// - `Function::stack_successor`
    /// - `Function::cycle_index`
    pub fn analyze(&mut self) -> Vec<Component>
    {
        for func in self.functions.values_mut()
        {
            func.stack_max_usage = None;
            func.stack_successor = None;
            func.cycle_index     = None;
        }

        let mut g = DiGraph::<u64, ()>::new();
        let indices: BTreeMap<u64, NodeIndex> = self.functions
            .keys()
            .map(|&addr| (addr, g.add_node(addr)))
            .collect();

        for func in self.functions.values()
        {
            for callee in func.call_successors()
            {
                if let Some(&to) = indices.get(&callee)
                {
                    g.update_edge(indices[&func.address], to, ());
                }
            }
        }

        // reverse topological order: callees come first
        let sccs = algo::tarjan_scc(&g);
        let mut components = Vec::with_capacity(sccs.len());

        for (cycle_index, scc) in sccs.iter().enumerate()
        {
            let mut members: Vec<u64> = scc.iter().map(|&n| g[n]).collect();
            members.sort_unstable();

            let recursive = scc.len() > 1 || g.contains_edge(scc[0], scc[0]);

            for addr in &members
            {
                if let Some(func) = self.functions.get_mut(addr)
                {
                    func.cycle_index = Some(cycle_index);
                }
            }

            if recursive
            {
                debug!("recursive component #{}: {:x?}", cycle_index, members);
                let inside: BTreeSet<u64> = members.iter().copied().collect();
                let mut path = HashSet::new();
                self.walk_cycle(members[0], &inside, &mut path);
            }
            else
            {
                self.settle(members[0], &HashSet::new());
            }

            components.push(Component { members, recursive });
        }

        components
    }

    fn walk_cycle(&mut self, addr: u64, inside: &BTreeSet<u64>, path: &mut HashSet<u64>)
    {
        path.insert(addr);

        let pending: Vec<u64> = match self.functions.get(&addr)
        {
            Some(func) => func.call_successors().collect(),
            None       => return,
        };

        for callee in pending
        {
            let unsettled = self.functions
                .get(&callee)
                .map_or(false, |f| f.stack_max_usage.is_none());

            if inside.contains(&callee) && !path.contains(&callee) && unsettled
            {
                self.walk_cycle(callee, inside, path);
            }
        }

        self.settle(addr, path);
        path.remove(&addr);
    }

    /// `frame_size` plus the deepest settled callee not on `path`.
    /// Ties go to the earliest callsite. A callee using no stack at all
    /// never becomes the successor.
    fn settle(&mut self, addr: u64, path: &HashSet<u64>)
    {
        let Some(func) = self.functions.get(&addr) else { return };

        let mut best: Option<(u64, u64)> = None;
        for callee in func.call_successors()
        {
            if path.contains(&callee)
            {
                continue;
            }

            let Some(callee_func) = self.functions.get(&callee) else { continue };
            match callee_func.stack_max_usage
            {
                Some(usage) =>
                {
                    if usage > best.map_or(0, |(max, _)| max)
                    {
                        best = Some((usage, callee));
                    }
                },
                None => warn!("BUG? `{}` calls unsettled `{}`", func.name, callee_func.name),
            }
        }

        let frame = func.frame_size;
        if let Some(func) = self.functions.get_mut(&addr)
        {
            func.stack_max_usage = Some(frame + best.map_or(0, |(usage, _)| usage));
            func.stack_successor = best.map(|(_, callee)| callee);
        }
    }
}
