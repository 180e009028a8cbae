use std::collections::BTreeMap;
use std::fmt;

pub const PLAN_FILE: &str = "planfile";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Init,
    Plan,
    Apply,
    Output,
    Destroy,
}

impl CommandKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::Init => "INIT",
            CommandKind::Plan => "PLAN",
            CommandKind::Apply => "APPLY",
            CommandKind::Output => "OUTPUT",
            CommandKind::Destroy => "DESTROY",
        }
    }

    /// `output -json` may carry sensitive values and never reaches the exec log.
    pub fn is_loggable(&self) -> bool {
        !matches!(self, CommandKind::Output)
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A Terraform input variable, rendered as `-var name=value`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    pub name: String,
    pub value: String,
}

impl Variable {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Arguments for one terraform invocation, excluding the binary itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerraformCommand {
    pub kind: CommandKind,
    pub args: Vec<String>,
    pub write_to_log: bool,
}

impl TerraformCommand {
    fn new(kind: CommandKind, args: &[&str]) -> Self {
        Self {
            kind,
            args: args.iter().map(|a| a.to_string()).collect(),
            write_to_log: kind.is_loggable(),
        }
    }

    pub fn init(backend_config: &BTreeMap<String, String>) -> Self {
        let mut cmd = Self::new(CommandKind::Init, &["init", "-input=false", "-no-color"]);
        cmd.args.extend(
            backend_config
                .iter()
                .map(|(key, value)| format!("-backend-config={}={}", key, value)),
        );
        cmd
    }

    pub fn plan(variables: &[Variable]) -> Self {
        let mut cmd = Self::new(
            CommandKind::Plan,
            &["plan", "-out", PLAN_FILE, "-input=false", "-no-color"],
        );
        cmd.push_variables(variables);
        cmd
    }

    pub fn apply() -> Self {
        Self::new(
            CommandKind::Apply,
            &["apply", "-auto-approve", "-no-color", PLAN_FILE],
        )
    }

    pub fn output_json() -> Self {
        Self::new(CommandKind::Output, &["output", "-json", "-no-color"])
    }

    pub fn destroy(variables: &[Variable]) -> Self {
        let mut cmd = Self::new(
            CommandKind::Destroy,
            &["destroy", "-auto-approve", "-input=false", "-no-color"],
        );
        cmd.push_variables(variables);
        cmd
    }

    // NOTE: No dedup; terraform keeps the last -var for a repeated name
    fn push_variables(&mut self, variables: &[Variable]) {
        for var in variables {
            self.args.push("-var".to_string());
            self.args.push(format!("{}={}", var.name, var.value));
        }
    }

    /// Whether the transcript belongs in the exec log.
    pub fn loggable(&self) -> bool {
        self.write_to_log && self.kind.is_loggable()
    }
}
