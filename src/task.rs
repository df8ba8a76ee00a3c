use std::{fs, path::Path};

use log::warn;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::symbol::SymbolTable;


/// A firmware task: its entry routine and the stack allotted to it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Task
{
    pub name:            String,
    pub routine_name:    String,
    pub stack_max_size:  u64,
    pub routine_address: Option<u64>,
}

#[allow(non_snake_case)]
pub fn Task(name: &str, routine_name: &str, stack_max_size: u64, routine_address: Option<u64>) -> Task
{
    Task
    {
        name:           name.to_string(),
        routine_name:   routine_name.to_string(),
        stack_max_size,
        routine_address,
    }
}


/// One row of the task table as the loader hands it over.
#[derive(Clone, Debug, Deserialize)]
struct TaskInfo
{
    name:       String,
    routine:    String,
    stack_size: u64,
}

///
/// Read a task list (`[{"name", "routine", "stack_size"}, ...]`) and look
/// each routine up in the symbol table.
///
pub fn load_tasklist(path: &Path, symbols: &SymbolTable) -> Result<Vec<Task>>
{
    let text = fs::read_to_string(path).map_err(|e| Error::TaskList(Box::new(e)))?;
    parse_tasklist(&text, symbols)
}

pub fn parse_tasklist(text: &str, symbols: &SymbolTable) -> Result<Vec<Task>>
{
    let infos: Vec<TaskInfo> = serde_json::from_str(text).map_err(|e| Error::TaskList(Box::new(e)))?;

    Ok(infos
        .into_iter()
        .map(|info|
        {
            let routine_address = symbols.function_named(&info.routine).map(|sym| sym.address);
            if routine_address.is_none()
            {
                warn!("task `{}`: no function symbol for routine `{}`", info.name, info.routine);
            }
            Task(&info.name, &info.routine, info.stack_size, routine_address)
        })
        .collect())
}
