use crate::util::shell::{shell_quote, strlist_to_shell_cmd};
use tokio::process::Command;

/// A command executed on the host on behalf of the scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cmd {
    /// Interpreted by `sh -c`.
    Shell(String),
    /// Executed directly, without a shell.
    Argv(Vec<String>),
}

impl Cmd {
    pub fn shell(cmd: impl Into<String>) -> Self {
        Cmd::Shell(cmd.into())
    }

    pub fn argv<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Cmd::Argv(argv.into_iter().map(Into::into).collect())
    }

    /// The command line as echoed into the scan log.
    pub fn display(&self) -> String {
        match self {
            Cmd::Shell(cmd) => shell_quote(cmd),
            Cmd::Argv(argv) => strlist_to_shell_cmd(argv, true),
        }
    }

    pub(crate) fn to_command(&self) -> Command {
        match self {
            Cmd::Shell(cmd) => {
                let mut command = Command::new("sh");
                command.arg("-c").arg(cmd);
                command
            }
            Cmd::Argv(argv) => {
                let mut command = Command::new(argv.first().map(String::as_str).unwrap_or(""));
                command.args(argv.iter().skip(1));
                command
            }
        }
    }
}

impl From<Vec<String>> for Cmd {
    fn from(argv: Vec<String>) -> Self {
        Cmd::Argv(argv)
    }
}
