//! Everything that touches the terraform binary: command lines, process
//! execution, transcript logging and output parsing.

pub mod backend;
pub mod command;
pub mod exec_log;
pub mod output;
pub mod runner;
pub mod sanitize;

pub use backend::{BackendInjector, BackendProfile};
pub use command::{CommandKind, TerraformCommand, Variable};
pub use exec_log::ExecLog;
pub use output::{OutputValue, TerraformOutputs, parse_outputs};
pub use runner::{ProcessRunner, TerraformCli};
