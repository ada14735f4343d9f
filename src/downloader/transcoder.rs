// Transcoding pipe: feeds an AudioSource into an external encoder
//
// One process per conversion. A feeder task copies source chunks into the
// encoder's stdin; `write_all` only completes when the pipe has room, so a
// slow consumer of stdout throttles the source read. Dropping the output
// stream cancels the feeder (which releases the source and any spool) and
// kills the encoder.

use std::fmt;
use std::io;
use std::process::Stdio;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, ChildStdout, Command as TokioCommand};
use tokio::task::JoinHandle;
use tokio_util::io::ReaderStream;
use tokio_util::sync::{CancellationToken, DropGuard};

use super::errors::ClassifiedError;
use super::models::{AudioSource, ByteStream};
use super::tools::{BinaryProbe, ToolInfo};
use super::utils::{collect_stderr_tail, PIPE_CHUNK};

/// Output container the encoder produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetFormat {
    pub name: &'static str,
    pub mime: &'static str,
    pub extension: &'static str,
}

impl TargetFormat {
    pub const MP3: TargetFormat = TargetFormat {
        name: "mp3",
        mime: "audio/mpeg",
        extension: "mp3",
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranscodeOptions {
    pub format: TargetFormat,
    pub bitrate_kbps: u32,
}

impl Default for TranscodeOptions {
    fn default() -> Self {
        Self {
            format: TargetFormat::MP3,
            bitrate_kbps: 320,
        }
    }
}

/// Encoded output; a failure after the first byte arrives as an `Err` item
pub struct TranscodeStream {
    pub format: TargetFormat,
    pub body: ByteStream,
}

impl fmt::Debug for TranscodeStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TranscodeStream")
            .field("format", &self.format)
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait Transcoder: Send + Sync {
    fn name(&self) -> &str;

    /// Cheap capability check, made before a conversion commits to anything
    async fn is_available(&self) -> bool;

    async fn info(&self) -> ToolInfo;

    /// Take ownership of `source` and start encoding it
    async fn transcode(
        &self,
        source: AudioSource,
        options: &TranscodeOptions,
    ) -> Result<TranscodeStream, ClassifiedError>;
}

#[derive(Debug, Clone)]
enum Invocation {
    /// `ffmpeg` reading stdin and writing the target container to stdout
    Ffmpeg,
    /// Any stdin-to-stdout filter with fixed arguments
    Custom(Vec<String>),
}

/// Transcoder backed by an external process
#[derive(Debug)]
pub struct ProcessTranscoder {
    name: String,
    invocation: Invocation,
    /// Resolves the program that is actually spawned
    probe: BinaryProbe,
}

impl ProcessTranscoder {
    pub fn ffmpeg(path: impl Into<String>) -> Self {
        let program = path.into();
        Self {
            name: "ffmpeg".to_string(),
            probe: BinaryProbe::new(program),
            invocation: Invocation::Ffmpeg,
        }
    }

    pub fn custom(program: impl Into<String>, args: Vec<String>) -> Self {
        let program = program.into();
        Self {
            name: program.clone(),
            probe: BinaryProbe::new(program),
            invocation: Invocation::Custom(args),
        }
    }

    fn args(&self, options: &TranscodeOptions) -> Vec<String> {
        match &self.invocation {
            Invocation::Ffmpeg => {
                let codec = match options.format.name {
                    "mp3" => "libmp3lame",
                    other => other,
                };
                vec![
                    "-hide_banner".to_string(),
                    "-loglevel".to_string(),
                    "error".to_string(),
                    "-i".to_string(),
                    "pipe:0".to_string(),
                    "-vn".to_string(),
                    "-f".to_string(),
                    options.format.name.to_string(),
                    "-codec:a".to_string(),
                    codec.to_string(),
                    "-b:a".to_string(),
                    format!("{}k", options.bitrate_kbps),
                    "pipe:1".to_string(),
                ]
            }
            Invocation::Custom(args) => args.clone(),
        }
    }
}

#[async_trait]
impl Transcoder for ProcessTranscoder {
    fn name(&self) -> &str {
        &self.name
    }

    async fn is_available(&self) -> bool {
        self.probe.is_available().await
    }

    async fn info(&self) -> ToolInfo {
        self.probe.info(&self.name).await
    }

    async fn transcode(
        &self,
        source: AudioSource,
        options: &TranscodeOptions,
    ) -> Result<TranscodeStream, ClassifiedError> {
        tracing::info!(
            transcoder = %self.name,
            provider = source.provider(),
            handoff = ?source.handoff(),
            hint = %source.hint(),
            bitrate_kbps = options.bitrate_kbps,
            "starting transcode"
        );

        let program = self.probe.resolve().await.ok_or_else(|| {
            ClassifiedError::provider_unavailable(format!("{} is not installed", self.probe.program()))
        })?;

        let input = source.into_stream().await.map_err(|e| {
            ClassifiedError::transcode_failure(format!("audio source could not be opened: {}", e))
        })?;

        let mut child = TokioCommand::new(&program)
            .args(self.args(options))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == io::ErrorKind::NotFound {
                    ClassifiedError::provider_unavailable(format!("{} is not installed", program.display()))
                } else {
                    ClassifiedError::transcode_failure(format!("failed to start {}: {}", program.display(), e))
                }
            })?;

        let (stdin, stdout, stderr) = match (child.stdin.take(), child.stdout.take(), child.stderr.take()) {
            (Some(stdin), Some(stdout), Some(stderr)) => (stdin, stdout, stderr),
            _ => {
                return Err(ClassifiedError::transcode_failure(format!(
                    "failed to capture pipes of {}",
                    self.name
                )))
            }
        };

        let cancel = CancellationToken::new();
        let feeder = tokio::spawn(feed(input, stdin, cancel.clone()));

        let state = PipeState::Running(Box::new(Running {
            program: self.name.clone(),
            stdout: ReaderStream::with_capacity(stdout, PIPE_CHUNK),
            child,
            feeder,
            stderr: collect_stderr_tail(stderr),
            cancel: cancel.clone(),
            _guard: cancel.drop_guard(),
            produced: 0,
        }));

        Ok(TranscodeStream {
            format: options.format,
            body: stream::unfold(state, step).boxed(),
        })
    }
}

/// The source failed while the feeder was reading it
#[derive(Debug)]
struct SourceFailed(io::Error);

async fn feed(
    mut source: ByteStream,
    mut stdin: ChildStdin,
    cancel: CancellationToken,
) -> Result<u64, SourceFailed> {
    let mut written = 0u64;
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => return Ok(written),
            next = source.next() => next,
        };
        let chunk = match next {
            Some(Ok(chunk)) => chunk,
            Some(Err(e)) => return Err(SourceFailed(e)),
            None => break,
        };

        tokio::select! {
            _ = cancel.cancelled() => return Ok(written),
            res = stdin.write_all(&chunk) => match res {
                Ok(()) => written += chunk.len() as u64,
                // Encoder stopped reading; its exit status decides the outcome
                Err(e) => {
                    tracing::debug!(error = %e, written, "transcoder input closed early");
                    return Ok(written);
                }
            }
        }
    }

    if let Err(e) = stdin.shutdown().await {
        tracing::debug!(error = %e, "failed to close transcoder input");
    }
    Ok(written)
}

struct Running {
    program: String,
    stdout: ReaderStream<ChildStdout>,
    child: Child,
    feeder: JoinHandle<Result<u64, SourceFailed>>,
    stderr: JoinHandle<String>,
    cancel: CancellationToken,
    _guard: DropGuard,
    produced: u64,
}

enum PipeState {
    Running(Box<Running>),
    Done,
}

async fn step(state: PipeState) -> Option<(io::Result<bytes::Bytes>, PipeState)> {
    let PipeState::Running(mut running) = state else {
        return None;
    };

    match running.stdout.next().await {
        Some(Ok(chunk)) => {
            running.produced += chunk.len() as u64;
            Some((Ok(chunk), PipeState::Running(running)))
        }
        Some(Err(e)) => {
            let err = ClassifiedError::transcode_failure(format!(
                "failed reading {} output: {}",
                running.program, e
            ));
            tracing::error!(transcoder = %running.program, error = %err, "transcode failed");
            Some((Err(io::Error::other(err)), PipeState::Done))
        }
        None => finish(*running).await.map(|err| (Err(err), PipeState::Done)),
    }
}

/// Output reached EOF: settle the feeder and the exit status
async fn finish(mut running: Running) -> Option<io::Error> {
    let status = running.child.wait().await;
    running.cancel.cancel();
    let fed = running.feeder.await;
    let tail = running.stderr.await.unwrap_or_default();

    let failure = match (fed, status) {
        (Ok(Err(SourceFailed(e))), _) => Some(format!("audio source failed mid-stream: {}", e)),
        (Err(join), _) => Some(format!("transcoder feeder crashed: {}", join)),
        (_, Err(e)) => Some(format!("failed to wait for {}: {}", running.program, e)),
        (Ok(Ok(_)), Ok(status)) if !status.success() => Some(format!(
            "{} exited with {}: {}",
            running.program,
            status
                .code()
                .map(|c| format!("exit code {}", c))
                .unwrap_or_else(|| "signal".to_string()),
            tail
        )),
        (Ok(Ok(fed)), Ok(_)) => {
            tracing::info!(
                transcoder = %running.program,
                bytes_in = fed,
                bytes_out = running.produced,
                "transcode finished"
            );
            None
        }
    };

    failure.map(|message| {
        let err = ClassifiedError::transcode_failure(message);
        tracing::error!(
            transcoder = %running.program,
            bytes_out = running.produced,
            error = %err,
            "transcode failed"
        );
        io::Error::other(err)
    })
}
