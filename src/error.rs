use std::{io, path::PathBuf, process::ExitStatus};

use thiserror::Error;



///
/// Fatal errors. Any of these aborts the analysis run.
///
/// Annotation signatures that fail to resolve are not errors in this
/// sense; see `annotation::SignatureError`.
///
#[derive(Error, Debug)]
pub enum Error
{
        #[error("Failed to run {tool}.")]
        ToolInvocation
        {
            tool:   String,
            #[source]
            source: io::Error,
        },

        #[error("{tool} failed to {action}.")]
        ToolExecution
        {
            tool:   String,
            action: &'static str,
            status: ExitStatus,
        },

        #[error("Failed to open annotation file.")]
        AnnotationOpen(#[source] io::Error),

        #[error("Failed to parse annotation file.")]
        AnnotationParse(#[source] serde_json::Error),

        #[error("Invalid annotation file.")]
        AnnotationInvalid(#[source] serde_json::Error),

        #[error("Failed to load task list.")]
        TaskList(#[source] Box<dyn std::error::Error + Send + Sync>),

        #[error("Failed to read {0:?}.")]
        Io(PathBuf, #[source] io::Error),

        #[error("Failed to write output: {0}")]
        Write(#[from] io::Error),

        #[error("Not a valid ELF: {0}")]
        BadElf(String),

        #[error("Unsupported architecture: {0}")]
        UnsupportedArch(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
