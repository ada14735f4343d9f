// Helper functions shared by the subprocess-backed components

use std::io;
use std::path::Path;
use std::process::Stdio;

use bytes::Bytes;
use futures::stream::{self, StreamExt};
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStderr, Command as TokioCommand};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration as TokioDuration};
use tokio_util::io::ReaderStream;

use super::errors::ProviderError;
use super::models::ByteStream;

/// Bytes of stderr kept for error reports
pub const STDERR_TAIL: usize = 4 * 1024;
pub const PIPE_CHUNK: usize = 16 * 1024;

const FILENAME_MAX: usize = 50;
const FILENAME_FALLBACK: &str = "audio";

/// Run command with timeout, capturing both pipes
pub async fn run_output_with_timeout(
    program: &Path,
    args: Vec<String>,
    timeout_secs: u64,
) -> Result<std::process::Output, ProviderError> {
    let mut child = TokioCommand::new(program)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| ProviderError::Spawn {
            program: program.display().to_string(),
            source,
        })?;

    let name = program.display().to_string();
    let mut stdout_pipe = child.stdout.take().ok_or_else(|| missing_pipe(&name, "stdout"))?;
    let mut stderr_pipe = child.stderr.take().ok_or_else(|| missing_pipe(&name, "stderr"))?;

    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stdout_pipe.read_to_end(&mut buf).await?;
        Ok::<Vec<u8>, io::Error>(buf)
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stderr_pipe.read_to_end(&mut buf).await?;
        Ok::<Vec<u8>, io::Error>(buf)
    });

    let waited = timeout(TokioDuration::from_secs(timeout_secs), child.wait()).await;
    match waited {
        Ok(status_res) => {
            let status = status_res?;
            let stdout = stdout_task.await.map_err(io::Error::other)??;
            let stderr = stderr_task.await.map_err(io::Error::other)??;
            Ok(std::process::Output { status, stdout, stderr })
        }
        Err(_) => {
            tracing::warn!(program = %name, timeout_secs, "process timed out, killing it");
            let _ = child.kill().await;
            stdout_task.abort();
            stderr_task.abort();
            Err(ProviderError::Timeout(timeout_secs))
        }
    }
}

fn missing_pipe(program: &str, pipe: &str) -> ProviderError {
    ProviderError::Io(io::Error::new(
        io::ErrorKind::BrokenPipe,
        format!("failed to capture {} from {}", pipe, program),
    ))
}

/// Last `STDERR_TAIL` bytes of a byte buffer, lossily decoded and trimmed
pub fn stderr_excerpt(raw: &[u8]) -> String {
    let start = raw.len().saturating_sub(STDERR_TAIL);
    String::from_utf8_lossy(&raw[start..]).trim().to_string()
}

/// Drain a child's stderr in the background, keeping only the tail
///
/// The pipe has to be drained or a chatty child blocks on a full buffer.
pub fn collect_stderr_tail(mut stderr: ChildStderr) -> JoinHandle<String> {
    tokio::spawn(async move {
        let mut kept: Vec<u8> = Vec::with_capacity(STDERR_TAIL);
        let mut buf = [0u8; 2048];
        loop {
            match stderr.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    kept.extend_from_slice(&buf[..n]);
                    if kept.len() > STDERR_TAIL * 2 {
                        let excess = kept.len() - STDERR_TAIL;
                        kept.drain(..excess);
                    }
                }
            }
        }
        stderr_excerpt(&kept)
    })
}

enum ChildState {
    Reading {
        program: String,
        stdout: ReaderStream<tokio::process::ChildStdout>,
        child: Child,
        stderr: JoinHandle<String>,
    },
    Done,
}

/// Expose a spawned child's stdout as a byte stream
///
/// The exit status is checked once stdout reaches EOF: a non-zero exit
/// yields one final `Err` item wrapping `ProviderError::Exit`. Dropping the
/// stream drops the child, which kills it when spawned with `kill_on_drop`.
pub fn child_stdout_stream(program: &str, mut child: Child) -> Result<ByteStream, ProviderError> {
    let stdout = child.stdout.take().ok_or_else(|| missing_pipe(program, "stdout"))?;
    let stderr = child.stderr.take().ok_or_else(|| missing_pipe(program, "stderr"))?;

    let state = ChildState::Reading {
        program: program.to_string(),
        stdout: ReaderStream::with_capacity(stdout, PIPE_CHUNK),
        child,
        stderr: collect_stderr_tail(stderr),
    };

    Ok(stream::unfold(state, |state| async move {
        let ChildState::Reading {
            program,
            mut stdout,
            mut child,
            stderr,
        } = state
        else {
            return None;
        };

        match stdout.next().await {
            Some(Ok(chunk)) => Some((
                Ok(chunk),
                ChildState::Reading {
                    program,
                    stdout,
                    child,
                    stderr,
                },
            )),
            Some(Err(e)) => Some((Err(e), ChildState::Done)),
            None => {
                let status = match child.wait().await {
                    Ok(status) => status,
                    Err(e) => return Some((Err(e), ChildState::Done)),
                };
                let tail = stderr.await.unwrap_or_default();
                if status.success() {
                    return None;
                }
                tracing::debug!(program = %program, code = ?status.code(), "child exited unsuccessfully");
                let err = ProviderError::Exit {
                    program,
                    code: status.code(),
                    stderr: tail,
                };
                Some((Err(io::Error::other(err)), ChildState::Done))
            }
        }
    })
    .boxed())
}

/// Wait for the first item of a stream before handing it on
///
/// A source that fails before producing anything surfaces the failure
/// here instead of inside the consumer. An empty stream stays empty.
pub async fn prime(mut stream: ByteStream) -> io::Result<ByteStream> {
    match stream.next().await {
        Some(Ok(first)) => Ok(stream::once(async move { Ok::<Bytes, io::Error>(first) })
            .chain(stream)
            .boxed()),
        Some(Err(e)) => Err(e),
        None => Ok(stream::empty().boxed()),
    }
}

/// Recover the provider error carried inside an `io::Error`, if any
pub fn provider_error_from_io(err: io::Error) -> ProviderError {
    let wrapped = err
        .get_ref()
        .is_some_and(|inner| inner.is::<ProviderError>());
    if !wrapped {
        return ProviderError::Io(err);
    }
    match err.into_inner().map(|inner| inner.downcast::<ProviderError>()) {
        Some(Ok(provider)) => *provider,
        Some(Err(other)) => ProviderError::Io(io::Error::other(other)),
        None => ProviderError::Io(io::Error::other("empty i/o error")),
    }
}

/// Filesystem- and header-safe title fragment
///
/// Keeps ASCII alphanumerics and whitespace, collapses whitespace runs to
/// `_`, caps the length.
pub fn sanitize_filename(title: &str) -> String {
    let kept: String = title
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || c.is_whitespace())
        .collect();
    let joined = kept.split_whitespace().collect::<Vec<_>>().join("_");
    let capped: String = joined.chars().take(FILENAME_MAX).collect();

    if capped.is_empty() {
        FILENAME_FALLBACK.to_string()
    } else {
        capped
    }
}

/// `Content-Disposition` value for a download named after `title`
pub fn content_disposition(title: &str, extension: &str) -> String {
    format!(
        "attachment; filename=\"{}.{}\"; filename*=UTF-8''{}.{}",
        sanitize_filename(title),
        extension,
        urlencoding::encode(title.trim()),
        extension
    )
}
