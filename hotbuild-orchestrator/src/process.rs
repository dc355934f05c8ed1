//! Compile service backed by a helper executable
//!
//! Each request spawns the helper, writes one JSON request to its stdin and
//! reads one JSON response from its stdout. The request is written from a
//! separate thread while the output is drained, so neither pipe can stall
//! the other.

use crate::error::ServiceError;
use crate::service::{
    CompileService, Diagnostic, EmitOutput, EmitRequest, Runnable, ScriptBuild, ScriptRequest,
    SourceFile, SyntaxTree,
};
use hotbuild_config::LanguageVersion;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::ffi::OsString;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::{Command, Output, Stdio};
use std::sync::Arc;
use std::thread;
use tracing::debug;

const TARGET: &str = "hotbuild::compile";

/// Error kind the helper reports when it runs out of memory
pub const OUT_OF_MEMORY_KIND: &str = "out_of_memory";

#[derive(Serialize)]
#[serde(tag = "op", rename_all = "camelCase", rename_all_fields = "camelCase")]
enum HelperRequest<'a> {
    Parse {
        source: &'a SourceFile,
        language_version: LanguageVersion,
    },
    Emit {
        request: &'a EmitRequest,
    },
    Script {
        request: &'a ScriptRequest,
    },
    Invoke {
        script: &'a str,
        handle: &'a str,
        context: &'a Value,
    },
}

#[derive(Debug, Deserialize)]
struct HelperResponse {
    ok: bool,
    #[serde(default)]
    payload: Value,
    #[serde(default)]
    error: Option<HelperFailure>,
}

#[derive(Debug, Deserialize)]
struct HelperFailure {
    message: String,
    #[serde(default)]
    kind: Option<String>,
}

/// Payload of a `script` response
#[derive(Debug, Deserialize)]
struct ScriptPayload {
    success: bool,
    #[serde(default)]
    diagnostics: Vec<Diagnostic>,
    /// Identity of the compiled script inside the helper
    #[serde(default)]
    handle: Option<String>,
}

#[derive(Debug, Clone)]
struct HelperCommand {
    program: PathBuf,
    args: Vec<OsString>,
}

impl HelperCommand {
    fn call<T: DeserializeOwned>(&self, request: &HelperRequest<'_>) -> Result<T, ServiceError> {
        let body = serde_json::to_vec(request).map_err(|e| ServiceError::Protocol(e.to_string()))?;
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                ServiceError::Transport(format!("cannot start {}: {}", self.program.display(), e))
            })?;
        let Some(mut stdin) = child.stdin.take() else {
            // reap the child before giving up on it
            let _ = child.kill();
            let _ = child.wait();
            return Err(ServiceError::Transport("helper stdin unavailable".to_string()));
        };

        let (written, output) = thread::scope(|scope| {
            let writer = scope.spawn(move || {
                let result = stdin.write_all(&body);
                drop(stdin);
                result
            });
            let output = child.wait_with_output();
            let written = writer
                .join()
                .unwrap_or_else(|_| Err(io::Error::other("request writer panicked")));
            (written, output)
        });
        let output = output.map_err(|e| ServiceError::Transport(e.to_string()))?;
        debug!(target: TARGET, status = ?output.status, bytes = output.stdout.len(), "helper finished");

        match (decode_response(&output), written) {
            (Err(_), Err(err)) => {
                Err(ServiceError::Transport(format!("cannot write request: {}", err)))
            }
            (result, _) => result,
        }
    }
}

fn decode_response<T: DeserializeOwned>(output: &Output) -> Result<T, ServiceError> {
    let response: HelperResponse = match serde_json::from_slice(&output.stdout) {
        Ok(response) => response,
        Err(err) if output.status.success() => return Err(ServiceError::Protocol(err.to_string())),
        Err(_) => {
            return Err(ServiceError::Transport(format!(
                "helper exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )))
        }
    };

    if !response.ok {
        let failure = response.error.unwrap_or(HelperFailure {
            message: "helper reported failure without a message".to_string(),
            kind: None,
        });
        return Err(match failure.kind.as_deref() {
            Some(OUT_OF_MEMORY_KIND) => ServiceError::OutOfMemory(failure.message),
            _ => ServiceError::Rejected(failure.message),
        });
    }
    serde_json::from_value(response.payload).map_err(|e| ServiceError::Protocol(e.to_string()))
}

/// [`CompileService`] that delegates to an external helper program
#[derive(Debug, Clone)]
pub struct ProcessCompileService {
    command: Arc<HelperCommand>,
}

impl ProcessCompileService {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            command: Arc::new(HelperCommand {
                program: program.into(),
                args: Vec::new(),
            }),
        }
    }

    pub fn with_args<I, S>(self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Self {
            command: Arc::new(HelperCommand {
                program: self.command.program.clone(),
                args: args.into_iter().map(Into::into).collect(),
            }),
        }
    }
}

impl CompileService for ProcessCompileService {
    fn name(&self) -> &str {
        "process"
    }

    fn parse(
        &self,
        source: &SourceFile,
        language_version: LanguageVersion,
    ) -> Result<SyntaxTree, ServiceError> {
        self.command.call(&HelperRequest::Parse {
            source,
            language_version,
        })
    }

    fn emit(&self, request: &EmitRequest) -> Result<EmitOutput, ServiceError> {
        self.command.call(&HelperRequest::Emit { request })
    }

    fn compile_script(&self, request: &ScriptRequest) -> Result<ScriptBuild, ServiceError> {
        let payload: ScriptPayload = self.command.call(&HelperRequest::Script { request })?;
        let runnable = match (payload.success, payload.handle) {
            (true, Some(handle)) => Some(Arc::new(HelperScript {
                command: Arc::clone(&self.command),
                script: request.name.clone(),
                handle,
            }) as Arc<dyn Runnable>),
            (true, None) => {
                return Err(ServiceError::Protocol(
                    "successful script compile without a handle".to_string(),
                ))
            }
            (false, _) => None,
        };
        Ok(ScriptBuild {
            success: payload.success,
            diagnostics: payload.diagnostics,
            runnable,
        })
    }
}

struct HelperScript {
    command: Arc<HelperCommand>,
    script: String,
    handle: String,
}

impl Runnable for HelperScript {
    fn invoke(&self, context: &Value) -> Result<Value, String> {
        self.command
            .call(&HelperRequest::Invoke {
                script: &self.script,
                handle: &self.handle,
                context,
            })
            .map_err(|e| e.to_string())
    }
}
