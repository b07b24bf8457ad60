//! Scripted process executor shared by the integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use ios_simulator_mcp::{CommandOptions, CommandOutput, Executor, Result};

type Responder = dyn Fn(&[&str], &CommandOptions) -> Result<CommandOutput> + Send + Sync;

/// Executor that answers from a closure and records every invocation.
pub struct ScriptedExecutor {
    responder: Box<Responder>,
    calls: Mutex<Vec<Call>>,
}

/// One recorded invocation.
#[derive(Debug, Clone)]
pub struct Call {
    pub argv: Vec<String>,
    pub stdin: Option<String>,
}

impl Call {
    pub fn program(&self) -> &str {
        &self.argv[0]
    }

    /// The `-e` script of an `osascript` call.
    pub fn script(&self) -> Option<&str> {
        (self.program() == "osascript").then(|| self.argv[2].as_str())
    }
}

impl ScriptedExecutor {
    pub fn new<F>(responder: F) -> Arc<Self>
    where
        F: Fn(&[&str], &CommandOptions) -> Result<CommandOutput> + Send + Sync + 'static,
    {
        Arc::new(Self {
            responder: Box::new(responder),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn scripts(&self) -> Vec<String> {
        self.calls()
            .iter()
            .filter_map(|c| c.script().map(str::to_string))
            .collect()
    }
}

#[async_trait::async_trait]
impl Executor for ScriptedExecutor {
    async fn execute(&self, argv: &[&str], options: &CommandOptions) -> Result<CommandOutput> {
        self.calls.lock().unwrap().push(Call {
            argv: argv.iter().map(|s| s.to_string()).collect(),
            stdin: options.stdin.clone(),
        });
        (self.responder)(argv, options)
    }
}

/// A finished process with the given exit code and output.
pub fn output(exit_code: i32, stdout: &str, stderr: &str) -> CommandOutput {
    CommandOutput {
        command: String::new(),
        exit_code,
        stdout: stdout.to_string(),
        stderr: stderr.to_string(),
        success: exit_code == 0,
        elapsed: Duration::from_millis(1),
    }
}

pub fn ok(stdout: &str) -> Result<CommandOutput> {
    Ok(output(0, stdout, ""))
}

pub fn fail(stderr: &str) -> Result<CommandOutput> {
    Ok(output(1, "", stderr))
}
