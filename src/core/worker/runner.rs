// ─── Transform Runner ───
// The one place a logical transform becomes a concrete invocation.

use std::path::PathBuf;
use std::process::Command;
use std::time::Instant;

use tracing::{debug, info};

use crate::core::cache::StagedFile;
use crate::core::error::{ProvisionError, ProvisionResult};
use crate::core::merge::{merge_jars, overlay_resources};
use crate::core::patch::{apply_patches, copy_missing, inject};
use crate::core::remap::remap_jar;

use super::request::{ExternalTool, MergePlan, TransformKind, TransformOutcome, TransformRequest};

/// Environment variable carrying the log configuration path to external tools.
pub const LOG_CONFIG_ENV: &str = "JARLOOM_LOG_CONFIG";

#[derive(Debug, Clone, Copy, Default)]
pub struct TransformRunner;

impl TransformRunner {
    pub fn new() -> Self {
        Self
    }

    /// Run a request to completion on the calling thread.
    pub fn invoke(&self, request: &TransformRequest) -> ProvisionResult<TransformOutcome> {
        let started = Instant::now();
        debug!(
            "Transform {} {:?} -> {:?}",
            request.kind.label(),
            request.input,
            request.output
        );

        match &request.kind {
            TransformKind::Remap {
                mappings,
                direction,
                strict,
            } => {
                remap_jar(
                    &request.input,
                    &request.output,
                    mappings,
                    *direction,
                    &request.classpath,
                    *strict,
                )?;
            }
            TransformKind::ApplyPatches { patches } => {
                apply_patches(&request.input, patches, &request.output)?;
            }
            TransformKind::CopyMissing => {
                copy_missing(&request.input, &request.output)?;
            }
            TransformKind::Overlay { archives } => {
                inject(&request.input, archives, &request.output)?;
            }
            TransformKind::Merge(MergePlan::Structural {
                server,
                synthetic_offset,
            }) => {
                merge_jars(&request.input, server, &request.output, *synthetic_offset)?;
            }
            TransformKind::Merge(MergePlan::ResourceOverlay {
                client_raw,
                server_raw,
            }) => {
                overlay_resources(&request.input, client_raw, server_raw, &request.output)?;
            }
            TransformKind::External { tool, extra_inputs } => {
                run_external(tool, request, extra_inputs)?;
            }
        }

        Ok(TransformOutcome {
            output: request.output.clone(),
            duration: started.elapsed(),
        })
    }
}

/// `program [args…] <input> <output> [extra inputs…] [classpath…]`, writing
/// to a staged path that replaces the output only on success.
fn run_external(
    tool: &ExternalTool,
    request: &TransformRequest,
    extra_inputs: &[PathBuf],
) -> ProvisionResult<()> {
    let staged = StagedFile::new(&request.output)?;

    let mut command = Command::new(&tool.program);
    command
        .args(&tool.args)
        .arg(&request.input)
        .arg(staged.path())
        .args(extra_inputs)
        .args(&request.classpath);
    if let Some(log_config) = &request.log_config {
        command.env(LOG_CONFIG_ENV, log_config);
    }

    info!("Running external transform {:?}", tool.program);
    let output = command.output().map_err(|e| {
        ProvisionError::Transform(format!("failed to start {:?}: {e}", tool.program))
    })?;

    if !output.status.success() {
        return Err(ProvisionError::Transform(format!(
            "{:?} failed (code {:?})\nSTDOUT:\n{}\nSTDERR:\n{}",
            tool.program,
            output.status.code(),
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        )));
    }
    if !staged.path().is_file() {
        return Err(ProvisionError::Transform(format!(
            "{:?} exited successfully but wrote no output",
            tool.program
        )));
    }
    staged.commit()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::archive::read_all;
    use crate::core::testing::write_jar;

    #[test]
    fn overlay_writes_a_new_jar() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.jar");
        write_jar(&input, &[("A.class", b"a"), ("B.class", b"b")]);
        let extra = dir.path().join("extra.jar");
        write_jar(&extra, &[("B.class", b"injected")]);

        let out = dir.path().join("out.jar");
        let request = TransformRequest::new(
            TransformKind::Overlay {
                archives: vec![extra],
            },
            &input,
            &out,
        );
        let outcome = TransformRunner::new().invoke(&request).unwrap();
        assert_eq!(outcome.output, out);
        assert_eq!(read_all(&out).unwrap()["B.class"], b"injected");
        assert_eq!(read_all(&input).unwrap()["B.class"], b"b");
    }

    #[cfg(unix)]
    fn shell(script: &str) -> ExternalTool {
        ExternalTool {
            program: PathBuf::from("sh"),
            args: vec!["-c".into(), script.into(), "tool".into()],
        }
    }

    #[cfg(unix)]
    #[test]
    fn external_tool_gets_fixed_arguments_and_log_config() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.jar");
        std::fs::write(&input, b"payload").unwrap();
        let out = dir.path().join("out.jar");
        let log = dir.path().join("log4j2.xml");
        let seen = dir.path().join("seen.txt");

        let script = format!(
            "cp \"$1\" \"$2\" && echo \"$3 $4 $JARLOOM_LOG_CONFIG\" > {}",
            seen.display()
        );
        let request = TransformRequest::new(
            TransformKind::External {
                tool: shell(&script),
                extra_inputs: vec![PathBuf::from("extra.txt")],
            },
            &input,
            &out,
        )
        .with_classpath(vec![PathBuf::from("lib.jar")])
        .with_log_config(Some(log.clone()));

        TransformRunner::new().invoke(&request).unwrap();
        assert_eq!(std::fs::read(&out).unwrap(), b"payload");
        assert_eq!(
            std::fs::read_to_string(&seen).unwrap().trim(),
            format!("extra.txt lib.jar {}", log.display())
        );
    }

    #[cfg(unix)]
    #[test]
    fn external_failure_carries_output_and_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.jar");
        std::fs::write(&input, b"payload").unwrap();
        let out = dir.path().join("out.jar");

        let request = TransformRequest::new(
            TransformKind::External {
                tool: shell("echo half > \"$2\"; echo boom >&2; exit 3"),
                extra_inputs: Vec::new(),
            },
            &input,
            &out,
        );
        match TransformRunner::new().invoke(&request) {
            Err(ProvisionError::Transform(message)) => {
                assert!(message.contains("boom"));
                assert!(message.contains("Some(3)"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
