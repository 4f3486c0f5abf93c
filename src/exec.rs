use std::io;
use std::process::Command;

use colored::*;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("required tool '{0}' is not installed or not on PATH")]
    Missing(String),
    #[error("failed to run '{tool}': {source}")]
    Io {
        tool: String,
        #[source]
        source: io::Error,
    },
}

/// Captured result of one external command.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }

    /// Last non-empty stderr line, for one-line failure reports.
    pub fn error_line(&self) -> String {
        self.stderr
            .lines()
            .rev()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("exit status {}", self.status))
    }
}

/// Runs external tools from an argument vector, never a shell string, so
/// nothing in a path or password can smuggle in extra arguments. Credentials
/// go through the child environment only.
pub trait CommandRunner {
    fn run(
        &self,
        program: &str,
        args: &[&str],
        env: &[(String, String)],
    ) -> Result<CommandOutput, ExecError>;
}

pub struct SystemRunner {
    pub verbose: bool,
}

impl CommandRunner for SystemRunner {
    fn run(
        &self,
        program: &str,
        args: &[&str],
        env: &[(String, String)],
    ) -> Result<CommandOutput, ExecError> {
        if self.verbose {
            eprintln!("{}", format!("$ {} {}", program, args.join(" ")).dimmed());
        }

        let mut cmd = Command::new(program);
        cmd.args(args);
        for (key, value) in env {
            cmd.env(key, value);
        }

        let output = cmd.output().map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => ExecError::Missing(program.to_string()),
            _ => ExecError::Io {
                tool: program.to_string(),
                source: e,
            },
        })?;

        Ok(CommandOutput {
            status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    type Response = (Result<CommandOutput, ExecError>, Option<Box<dyn Fn()>>);

    /// Test double that replays queued responses and records every
    /// invocation, including the environment handed to the child.
    #[derive(Default)]
    pub struct ScriptedRunner {
        responses: RefCell<VecDeque<Response>>,
        pub calls: RefCell<Vec<(String, Vec<String>, Vec<(String, String)>)>>,
    }

    impl ScriptedRunner {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn push_ok(&self, stdout: &str) {
            self.push_output(0, stdout, "", None);
        }

        pub fn push_status(&self, status: i32, stderr: &str) {
            self.push_output(status, "", stderr, None);
        }

        pub fn push_ok_with<F: Fn() + 'static>(&self, stdout: &str, effect: F) {
            self.push_output(0, stdout, "", Some(Box::new(effect)));
        }

        pub fn push_missing(&self, tool: &str) {
            self.responses
                .borrow_mut()
                .push_back((Err(ExecError::Missing(tool.to_string())), None));
        }

        fn push_output(&self, status: i32, stdout: &str, stderr: &str, effect: Option<Box<dyn Fn()>>) {
            self.responses.borrow_mut().push_back((
                Ok(CommandOutput {
                    status,
                    stdout: stdout.to_string(),
                    stderr: stderr.to_string(),
                }),
                effect,
            ));
        }

        /// Flattened "program arg arg" lines, in invocation order.
        pub fn commands(&self) -> Vec<String> {
            self.calls
                .borrow()
                .iter()
                .map(|(program, args, _)| {
                    let mut line = program.clone();
                    for arg in args {
                        line.push(' ');
                        line.push_str(arg);
                    }
                    line
                })
                .collect()
        }
    }

    impl CommandRunner for ScriptedRunner {
        fn run(
            &self,
            program: &str,
            args: &[&str],
            env: &[(String, String)],
        ) -> Result<CommandOutput, ExecError> {
            self.calls.borrow_mut().push((
                program.to_string(),
                args.iter().map(|a| a.to_string()).collect(),
                env.to_vec(),
            ));
            let (response, effect) = self
                .responses
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| panic!("unexpected command: {} {}", program, args.join(" ")));
            if let Some(effect) = effect {
                effect();
            }
            response
        }
    }

    #[test]
    fn error_line_prefers_last_stderr_line() {
        let out = CommandOutput {
            status: 1,
            stdout: String::new(),
            stderr: "warning: something\nFATAL: it broke\n".into(),
        };
        assert_eq!(out.error_line(), "FATAL: it broke");
    }

    #[test]
    fn error_line_falls_back_to_status() {
        let out = CommandOutput {
            status: 3,
            stdout: String::new(),
            stderr: String::new(),
        };
        assert_eq!(out.error_line(), "exit status 3");
    }
}
