use std::{
    io,
    io::Write as _, // to get write_fmt, granting writeln!
};

use crate::error::Result;
use crate::state::State;



impl State
{
    ///
    /// Per-task totals with the worst call trace, then any annotation
    /// signatures that failed to resolve.
    ///
    /// ```text
    /// Task: CONSOLE, Max size: 232 (8 + 224), Allocated size: 460
    /// Call Trace:
    ///     console_task (8) 2000 [console.c:120]
    /// ```
    pub fn output_report(&mut self, mut writer: impl io::Write) -> Result<()>
    {
        for task in &self.tasks
        {
            let Some(routine) = task.routine_address.and_then(|addr| self.graph.get(addr)) else
            {
                writeln!(
                    writer,
                    "Task: {}, Routine {} not found, Allocated size: {}",
                    task.name, task.routine_name, task.stack_max_size
                )?;
                continue;
            };

            let usage = routine.stack_max_usage.unwrap_or(routine.frame_size);
            let total = usage + self.context_reserve;
            writeln!(
                writer,
                "Task: {}, Max size: {} ({} + {}), Allocated size: {}",
                task.name,
                total,
                routine.frame_size,
                total - routine.frame_size,
                task.stack_max_size
            )?;

            writeln!(writer, "Call Trace:")?;
            for func in self.graph.trace(routine.address)
            {
                let line = self.lines.line(func.address)?;
                write!(
                    writer,
                    "\t{:#} ({}) {:x} [{}]",
                    rustc_demangle::demangle(&func.name),
                    func.frame_size,
                    func.address,
                    line
                )?;

                if self.is_recursive(func)
                {
                    write!(writer, " [recursive]")?;
                }
                writeln!(writer)?;
            }
        }

        if !self.failed_sigs.is_empty()
        {
            writeln!(writer, "Failed to resolve some annotation signatures:")?;
            for (sig, why) in &self.failed_sigs
            {
                writeln!(writer, "\t{}: {}", sig, why)?;
            }
        }

        Ok(())
    }
}
