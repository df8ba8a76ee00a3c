use std::{
    collections::BTreeMap,
    io,
    io::Write as _, // to get write_fmt, granting writeln!
};

use crate::graph::CallGraph;
use crate::output::escaper::Escaper;
use crate::stack::Component;
use crate::state::State;



impl State
{
    pub fn output_dot(&self, writer: impl io::Write, dc: DotConf) -> io::Result<()>
    {
        write_dot(&self.graph, &self.cycles, writer, dc)
    }
}


/// Call edges solid, tail branches dashed, recursive components boxed.
pub fn write_dot(
    graph:      &CallGraph,
    cycles:     &[Component],
    mut writer: impl io::Write,
    dc:         DotConf,
) -> io::Result<()>
{
    writeln!(writer, "digraph {{")?;
    writeln!(writer, "    node [fontname={} shape=box]", &dc.font)?;

    // DOT node ids are positions in address order
    let ids: BTreeMap<u64, usize> = graph.functions
        .keys()
        .enumerate()
        .map(|(i, &addr)| (addr, i))
        .collect();

    for (i, func) in graph.iter().enumerate()
    {
        write!(writer, "    {} [label=\"", i)?;

        let mut esc = Escaper::new(&mut writer);
        write!(esc, "{:#}", rustc_demangle::demangle(&func.name))?;

        if let Some(max) = func.stack_max_usage
        {
            write!(writer, "\\nmax = {}", max)?;
        }

        writeln!(writer, "\\nlocal = {}\"]", func.frame_size)?;
    }

    for func in graph.iter()
    {
        for site in &func.callsites
        {
            let Some(to) = site.callee.and_then(|callee| ids.get(&callee)) else { continue };

            write!(writer, "    {} -> {}", ids[&func.address], to)?;
            if site.is_jump
            {
                write!(writer, " [style=dashed]")?;
            }
            writeln!(writer)?;
        }
    }

    for (i, cycle) in cycles.iter().enumerate().filter(|(_, c)| c.recursive)
    {
        writeln!(writer, "\n    subgraph cluster_{} {{", i)?;
        writeln!(writer, "        style=dashed")?;
        writeln!(writer, "        fontname={}", &dc.font)?;
        writeln!(writer, "        label=\"SCC{}\"", i)?;

        for addr in &cycle.members
        {
            writeln!(writer, "        {}", ids[addr])?;
        }

        writeln!(writer, "    }}")?;
    }

    writeln!(writer, "}}")?;

    Ok(())
}



pub struct DotConf
{
    pub font: String,
}

impl Default for DotConf
{
    fn default() -> Self
    {
        DotConf
        {
            font: "monospace".to_string(),
        }
    }
}
