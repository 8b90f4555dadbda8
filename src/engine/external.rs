//! Out-of-process analysis engine
//!
//! Runs a configured program once per file with the audio path as its last
//! argument. The program must print one JSON object such as
//! `{"bpm": 128.0, "key": "A min"}` on stdout (either field may be null or
//! missing). The last line that parses as such an object is used.
//!
//! On unix the program leads its own process group. A program that outlives
//! the timeout is killed together with everything it started, as is a group
//! whose descendants keep stdout open after the program itself exited. Any
//! failure (spawn error, non-zero exit, timeout, unparsable output) yields an
//! empty result.

use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use serde::Deserialize;

use super::AnalysisEngine;
use crate::analysis::result::AnalysisResult;
use crate::error::AnalysisError;

/// Interval between child status polls
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// How long stdout may stay open once the program is gone
const READER_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Deserialize)]
struct Reply {
    #[serde(default)]
    bpm: Option<f32>,
    #[serde(default)]
    key: Option<String>,
}

/// Analysis engine backed by an external program
#[derive(Debug, Clone)]
pub struct ExternalEngine {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
    tag: String,
    sample_rate: u32,
}

impl ExternalEngine {
    /// Create an engine running `program`, stamping results with `tag`
    ///
    /// Defaults: no extra arguments, 120 second timeout, 44100 Hz temp files.
    pub fn new(program: impl Into<PathBuf>, tag: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: Duration::from_secs(120),
            tag: tag.into(),
            sample_rate: 44100,
        }
    }

    /// Arguments placed before the audio path
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Kill the program if it runs longer than this
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run the program on one file and parse its reply
    ///
    /// # Errors
    ///
    /// Returns `AnalysisError::ProcessingError` on spawn failure, timeout,
    /// non-zero exit or missing JSON reply
    pub fn run(&self, path: &Path) -> Result<AnalysisResult, AnalysisError> {
        log::debug!("Running {} on {}", self.program.display(), path.display());

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }
        let mut child = command.spawn().map_err(|e| {
            AnalysisError::ProcessingError(format!("cannot start {}: {}", self.program.display(), e))
        })?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| AnalysisError::ProcessingError("child stdout unavailable".to_string()))?;
        let (tx, rx) = mpsc::channel();
        let reader = thread::spawn(move || {
            let mut output = String::new();
            let _ = tx.send(stdout.read_to_string(&mut output).map(|_| output));
        });

        let status = self.wait_with_timeout(&mut child);
        let output = match self.collect_stdout(&child, &rx) {
            Some(output) => {
                // The reader has sent its result or died; either way it is done
                let _ = reader.join();
                output
            }
            None => {
                log::warn!(
                    "stdout of {} still open after killing its process group, abandoning reader",
                    self.program.display()
                );
                Err(AnalysisError::ProcessingError("child stdout never closed".to_string()))
            }
        };
        let status = status?;
        let output = output?;

        if !status.success() {
            return Err(AnalysisError::ProcessingError(format!(
                "{} exited with {}",
                self.program.display(),
                status
            )));
        }

        let reply = output
            .lines()
            .rev()
            .find_map(|line| serde_json::from_str::<Reply>(line.trim()).ok())
            .ok_or_else(|| AnalysisError::ProcessingError("no JSON reply on stdout".to_string()))?;

        Ok(AnalysisResult {
            bpm: reply.bpm.filter(|b| b.is_finite() && *b > 0.0),
            key: reply
                .key
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty()),
        })
    }

    /// Wait for the reader's output, killing lingering descendants once
    ///
    /// `None` if stdout is still open after the kill and the grace period.
    fn collect_stdout(
        &self,
        child: &Child,
        output: &Receiver<io::Result<String>>,
    ) -> Option<Result<String, AnalysisError>> {
        let received = match output.recv_timeout(READER_GRACE) {
            Err(RecvTimeoutError::Timeout) => {
                log::debug!("{} left stdout open, killing its process group", self.program.display());
                kill_process_group(child);
                output.recv_timeout(READER_GRACE)
            }
            other => other,
        };
        match received {
            Ok(result) => {
                Some(result.map_err(|e| AnalysisError::ProcessingError(format!("reading child stdout: {}", e))))
            }
            Err(RecvTimeoutError::Disconnected) => {
                Some(Err(AnalysisError::ProcessingError("stdout reader panicked".to_string())))
            }
            Err(RecvTimeoutError::Timeout) => None,
        }
    }

    fn wait_with_timeout(&self, child: &mut Child) -> Result<ExitStatus, AnalysisError> {
        let started = Instant::now();
        loop {
            match child.try_wait() {
                Ok(Some(status)) => return Ok(status),
                Ok(None) if started.elapsed() >= self.timeout => {
                    log::warn!(
                        "{} timed out after {:?}, killing",
                        self.program.display(),
                        self.timeout
                    );
                    // The child may exit between the poll and the kill
                    kill_process_group(child);
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(AnalysisError::ProcessingError(format!(
                        "timed out after {:?}",
                        self.timeout
                    )));
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => {
                    return Err(AnalysisError::ProcessingError(format!("waiting for child: {}", e)));
                }
            }
        }
    }

    /// Write samples to a temporary WAV file and run the program on it
    fn run_on_samples(&self, samples: &[f32], sample_rate: u32) -> Result<AnalysisResult, AnalysisError> {
        let file = tempfile::Builder::new()
            .prefix("cratedig-")
            .suffix(".wav")
            .tempfile()
            .map_err(|e| AnalysisError::ProcessingError(format!("temp file: {}", e)))?;

        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::create(file.path(), spec)
            .map_err(|e| AnalysisError::ProcessingError(format!("temp wav: {}", e)))?;
        for &sample in samples {
            writer
                .write_sample(sample)
                .map_err(|e| AnalysisError::ProcessingError(format!("temp wav: {}", e)))?;
        }
        writer
            .finalize()
            .map_err(|e| AnalysisError::ProcessingError(format!("temp wav: {}", e)))?;

        self.run(file.path())
    }

    fn degrade(&self, result: Result<AnalysisResult, AnalysisError>) -> AnalysisResult {
        result.unwrap_or_else(|e| {
            log::warn!("{} engine failed: {}", self.tag, e);
            AnalysisResult::default()
        })
    }
}

/// SIGKILL the process group led by `child`
#[cfg(unix)]
fn kill_process_group(child: &Child) {
    let Ok(pgid) = libc::pid_t::try_from(child.id()) else {
        return;
    };
    // SAFETY: kill(2) takes plain integers and touches no memory
    unsafe {
        libc::kill(-pgid, libc::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_process_group(_child: &Child) {}

impl AnalysisEngine for ExternalEngine {
    fn tag(&self) -> &str {
        &self.tag
    }

    fn estimate_tempo(&self, samples: &[f32], sample_rate: u32) -> Option<f32> {
        self.analyze_samples(samples, sample_rate).bpm
    }

    fn estimate_key(&self, samples: &[f32], sample_rate: u32) -> Option<String> {
        self.analyze_samples(samples, sample_rate).key
    }

    fn analyze_samples(&self, samples: &[f32], sample_rate: u32) -> AnalysisResult {
        let rate = if sample_rate > 0 { sample_rate } else { self.sample_rate };
        self.degrade(self.run_on_samples(samples, rate))
    }

    fn analyze_file(&self, path: &Path) -> AnalysisResult {
        self.degrade(self.run(path))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn shell(script: &str) -> ExternalEngine {
        // With `sh -c script name`, the appended file path becomes $1
        ExternalEngine::new("sh", "external").with_args(["-c", script, "engine"])
    }

    #[test]
    fn test_parses_last_json_line() {
        let engine = shell(r#"echo "loading $1"; echo '{"bpm": 128.0, "key": "A min"}'"#);
        let result = engine.analyze_file(Path::new("/tmp/sample.wav"));
        assert_eq!(result.bpm, Some(128.0));
        assert_eq!(result.key.as_deref(), Some("A min"));
    }

    #[test]
    fn test_null_and_invalid_fields() {
        let engine = shell(r#"echo '{"bpm": -1.0, "key": null}'"#);
        assert_eq!(engine.analyze_file(Path::new("x.wav")), AnalysisResult::default());

        let engine = shell(r#"echo '{"bpm": 0}'"#);
        assert_eq!(engine.analyze_file(Path::new("x.wav")).bpm, None);
    }

    #[test]
    fn test_failures_degrade_to_empty() {
        assert_eq!(
            shell("exit 3").analyze_file(Path::new("x.wav")),
            AnalysisResult::default()
        );
        assert_eq!(
            shell("echo not json").analyze_file(Path::new("x.wav")),
            AnalysisResult::default()
        );
        let missing = ExternalEngine::new("/nonexistent/analyzer", "external");
        assert!(missing.run(Path::new("x.wav")).is_err());
    }

    #[test]
    fn test_timeout_kills_child() {
        let engine = shell("sleep 5").with_timeout(Duration::from_millis(200));
        let started = Instant::now();
        assert!(engine.run(Path::new("x.wav")).is_err());
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn test_background_descendant_does_not_hold_reply() {
        // The backgrounded sleep inherits stdout and would keep it open for 30 s
        let engine = shell(r#"sleep 30 & echo '{"bpm": 120.0}'"#);
        let started = Instant::now();
        let result = engine.run(Path::new("x.wav")).unwrap();
        assert_eq!(result.bpm, Some(120.0));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_timeout_kills_descendants() {
        let engine = shell("sleep 30 & sleep 30").with_timeout(Duration::from_millis(200));
        let started = Instant::now();
        assert!(engine.run(Path::new("x.wav")).is_err());
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_samples_written_to_temp_wav() {
        // Replies only if the temp WAV exists and is non-empty
        let engine = shell(r#"test -s "$1" && echo '{"bpm": 99.5, "key": "C maj"}'"#);
        let result = engine.analyze_samples(&vec![0.1f32; 1000], 44100);
        assert_eq!(result.bpm, Some(99.5));
        assert_eq!(engine.tag(), "external");
    }
}
