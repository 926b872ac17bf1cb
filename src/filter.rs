use std::{path::Path, process::Command};

use crate::error::{Error, Result};

/// An external content pre-processor such as `pdftotext -` or `zcat`.
///
/// The command line is split on whitespace; the input file is appended as
/// the final argument and the child's stdout becomes the document content.
#[derive(Debug, Clone)]
pub struct FilterCommand {
    program: String,
    args: Vec<String>,
}

impl FilterCommand {
    pub fn parse(command_line: &str) -> Result<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts.next().ok_or_else(|| {
            Error::Config("filter command line is empty".into())
        })?;
        Ok(Self {
            program,
            args: parts.collect(),
        })
    }

    /// Run the filter over `input` and return its stdout. Blocks until the
    /// child exits.
    pub fn execute(&self, input: &Path) -> Result<Vec<u8>> {
        tracing::debug!(
            program = %self.program,
            input = %input.display(),
            "running filter"
        );

        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(input)
            .output()?;

        if !output.status.success() {
            return Err(Error::Filter {
                command: self.program.clone(),
                status: output.status.to_string(),
            });
        }
        Ok(output.stdout)
    }
}
