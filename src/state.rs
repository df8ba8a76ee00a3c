use std::collections::BTreeMap;

use log::{info, warn};

use crate::annotation::{self, Annotation, SignatureError};
use crate::error::Result;
use crate::graph::{CallGraph, Function};
use crate::input;
use crate::options::Options;
use crate::stack::Component;
use crate::symbol::SymbolTable;
use crate::task::{self, Task};
use crate::tools::{LineCache, Toolchain};
use crate::Arch;


///
/// Everything one analysis run knows. The stages below are meant to be
/// called in order; `analyze()` does that.
///
pub struct State
{
    pub arch:            Arch,
    pub symbols:         SymbolTable,
    pub tasks:           Vec<Task>,
    pub annotation:      Annotation,
    pub lines:           LineCache,

    pub graph:           CallGraph,
    /// Indexed by `Function::cycle_index`.
    pub cycles:          Vec<Component>,
    pub failed_sigs:     BTreeMap<String, SignatureError>,

    /// Added to each task's total for the exception / context frame.
    pub context_reserve: u64,
}


impl State
{
    pub fn new(arch: Arch, symbols: SymbolTable, tasks: Vec<Task>, lines: LineCache) -> Self
    {
        State
        {
            arch,
            symbols,
            tasks,
            annotation:      Annotation::default(),
            lines,
            graph:           CallGraph::default(),
            cycles:          vec![],
            failed_sigs:     BTreeMap::new(),
            context_reserve: 0,
        }
    }

    ///
    /// Gather the inputs named on the command line: ELF header, symbol
    /// table, task list and annotation. Returns the state together with
    /// the toolchain, which still has to produce the disassembly.
    ///
    pub fn from_options(opts: &Options) -> Result<(State, Toolchain)>
    {
        let input = input::load_elf(&opts.elf_path)?;
        let arch  = input::select_arch(opts.arch, &input)?;
        let tools = Toolchain::new(&opts.objdump, &opts.addr2line, &input.elf_path);

        let annotation = match &opts.annotation
        {
            Some(path) => Annotation::load(path)?,
            None       => Annotation::default(),
        };

        let symbols = SymbolTable::parse(&tools.dump_symbols()?);
        info!("{} symbols", symbols.len());

        let tasks = task::load_tasklist(&opts.tasks, &symbols)?;
        let lines = LineCache::new(tools.line_source());

        let mut state = State::new(arch, symbols, tasks, lines);
        state.annotation      = annotation;
        state.context_reserve = opts.context_reserve;

        Ok((state, tools))
    }

    /// Modified fields:
    /// - graph
    pub fn load_disassembly(&mut self, text: &str)
    {
        let analyzer = self.arch.analyzer();
        self.graph = CallGraph::from_disassembly(text, &self.symbols, analyzer.as_ref());
    }

    /// Modified fields:
    /// - graph
    /// - failed_sigs
    pub fn apply_annotation(&mut self) -> Result<()>
    {
        let resolution = annotation::resolve_annotation(
            &self.annotation,
            &self.graph,
            &self.symbols,
            &mut self.lines,
        )?;

        self.graph.preprocess(&resolution.add_set, &resolution.remove_set);
        self.failed_sigs = resolution.failed_sigs;

        Ok(())
    }

    /// Modified fields:
    /// - graph
    /// - cycles
    pub fn stack_usage_analysis(&mut self)
    {
        self.cycles = self.graph.analyze();

        let recursive = self.cycles.iter().filter(|c| c.recursive).count();
        if recursive > 0
        {
            warn!(
                "{} recursive cycle(s) in the call graph; usage inside them counts each cycle once",
                recursive
            );
        }
    }

    pub fn warn_for_tasks(&self)
    {
        for task in &self.tasks
        {
            match self.routine(task).and_then(|f| f.stack_max_usage)
            {
                None => warn!("task `{}`: routine `{}` was not analyzed", task.name, task.routine_name),
                Some(usage) if usage + self.context_reserve > task.stack_max_size =>
                {
                    warn!(
                        "task `{}` may overflow its stack: {} bytes needed, {} allocated",
                        task.name, usage + self.context_reserve, task.stack_max_size
                    );
                },
                Some(_) => {},
            }
        }
    }

    /// All stages, from disassembly text to per-function usage.
    pub fn analyze(&mut self, disassembly: &str) -> Result<()>
    {
        self.load_disassembly(disassembly);
        self.apply_annotation()?;
        self.stack_usage_analysis();
        self.warn_for_tasks();
        Ok(())
    }

    pub fn routine(&self, task: &Task) -> Option<&Function>
    {
        self.graph.get(task.routine_address?)
    }

    /// The task's worst case, reserve excluded.
    pub fn task_usage(&self, task: &Task) -> Option<u64>
    {
        self.routine(task)?.stack_max_usage
    }

    pub fn is_recursive(&self, func: &Function) -> bool
    {
        func.cycle_index
            .and_then(|i| self.cycles.get(i))
            .map_or(false, |c| c.recursive)
    }
}
