//! `ProcessSpawner` seam: abstracts "start an external encoder process" so
//! the Encoder Driver's lifecycle logic can be exercised in tests without a
//! real ffmpeg binary on `PATH`. Grounded on the `async_trait`-based hardware
//! transport seams in the pack's device-control examples (e.g. the
//! Hikvision/Dahua device logic modules), generalized from "HTTP transport"
//! to "subprocess transport."

use async_trait::async_trait;
use std::path::Path;
use std::process::ExitStatus;
use tokio::io::AsyncRead;
use tokio::process::Command;
use std::pin::Pin;

/// A process that has been spawned and can be waited on / terminated.
/// Implemented both by a real `tokio::process::Child` wrapper and, in tests,
/// by an in-memory fake that replays canned stderr lines.
#[async_trait]
pub trait ManagedChild: Send {
    fn id(&self) -> Option<u32>;

    /// Takes the child's stderr pipe, if any. Called at most once.
    fn take_stderr(&mut self) -> Option<Pin<Box<dyn AsyncRead + Send>>>;

    /// Waits for the process to exit, returning its exit code if available.
    async fn wait(&mut self) -> std::io::Result<Option<i32>>;

    /// Requests graceful termination (SIGTERM on unix).
    fn terminate(&mut self);

    /// Forcefully kills the process (SIGKILL on unix).
    fn kill(&mut self);
}

pub trait ProcessSpawner: Send + Sync {
    fn spawn(
        &self,
        argv: &[String],
        cwd: Option<&Path>,
    ) -> std::io::Result<Box<dyn ManagedChild>>;
}

pub struct TokioProcessSpawner;

impl ProcessSpawner for TokioProcessSpawner {
    fn spawn(
        &self,
        argv: &[String],
        cwd: Option<&Path>,
    ) -> std::io::Result<Box<dyn ManagedChild>> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty argv"))?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = cwd {
            cmd.current_dir(cwd);
        }

        let mut child = cmd.spawn()?;
        let stderr = child.stderr.take();
        Ok(Box::new(TokioManagedChild { child, stderr }))
    }
}

struct TokioManagedChild {
    child: tokio::process::Child,
    stderr: Option<tokio::process::ChildStderr>,
}

#[async_trait]
impl ManagedChild for TokioManagedChild {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    fn take_stderr(&mut self) -> Option<Pin<Box<dyn AsyncRead + Send>>> {
        self.stderr
            .take()
            .map(|s| Box::pin(s) as Pin<Box<dyn AsyncRead + Send>>)
    }

    async fn wait(&mut self) -> std::io::Result<Option<i32>> {
        let status: ExitStatus = self.child.wait().await?;
        Ok(status.code())
    }

    fn terminate(&mut self) {
        if let Some(pid) = self.child.id() {
            // SAFETY: libc::kill with a valid pid and SIGTERM is a plain
            // syscall wrapper; no preconditions beyond a valid pid, which we
            // just obtained from the child handle.
            unsafe {
                libc::kill(pid as i32, libc::SIGTERM);
            }
        }
    }

    fn kill(&mut self) {
        let _ = self.child.start_kill();
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::sync::Mutex;
    use tokio::io::AsyncRead;
    use tokio::sync::Notify;

    /// An in-memory fake child: replays the given stderr lines, then either
    /// exits immediately or waits to be killed.
    pub struct FakeChild {
        lines: Vec<String>,
        exit_code: Option<i32>,
        kill_notify: std::sync::Arc<Notify>,
        killed: std::sync::Arc<std::sync::atomic::AtomicBool>,
    }

    impl FakeChild {
        pub fn with_stderr_lines(lines: Vec<String>) -> Self {
            Self {
                lines,
                exit_code: None,
                kill_notify: std::sync::Arc::new(Notify::new()),
                killed: std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false)),
            }
        }

        pub fn exits_immediately(code: i32) -> Self {
            Self {
                lines: vec![],
                exit_code: Some(code),
                kill_notify: std::sync::Arc::new(Notify::new()),
                killed: std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false)),
            }
        }
    }

    pub struct FakeSpawner {
        template: Mutex<Option<FakeChild>>,
    }

    impl FakeSpawner {
        pub fn new(child: FakeChild) -> Self {
            Self { template: Mutex::new(Some(child)) }
        }
    }

    impl ProcessSpawner for FakeSpawner {
        fn spawn(
            &self,
            _argv: &[String],
            _cwd: Option<&Path>,
        ) -> std::io::Result<Box<dyn ManagedChild>> {
            let child = self
                .template
                .lock()
                .unwrap()
                .take()
                .expect("FakeSpawner::spawn called more than once in this test");
            Ok(Box::new(child))
        }
    }

    struct LinesStream {
        data: Vec<u8>,
        pos: usize,
    }

    impl AsyncRead for LinesStream {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
            buf: &mut tokio::io::ReadBuf<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            let remaining = &self.data[self.pos..];
            let n = remaining.len().min(buf.remaining());
            buf.put_slice(&remaining[..n]);
            self.pos += n;
            std::task::Poll::Ready(Ok(()))
        }
    }

    #[async_trait]
    impl ManagedChild for FakeChild {
        fn id(&self) -> Option<u32> {
            Some(4242)
        }

        fn take_stderr(&mut self) -> Option<Pin<Box<dyn AsyncRead + Send>>> {
            let mut data = self.lines.join("\n").into_bytes();
            if !data.is_empty() {
                data.push(b'\n');
            }
            Some(Box::pin(LinesStream { data, pos: 0 }))
        }

        async fn wait(&mut self) -> std::io::Result<Option<i32>> {
            if let Some(code) = self.exit_code {
                return Ok(Some(code));
            }
            self.kill_notify.notified().await;
            Ok(None)
        }

        fn terminate(&mut self) {
            self.killed.store(true, std::sync::atomic::Ordering::SeqCst);
            self.kill_notify.notify_one();
        }

        fn kill(&mut self) {
            self.killed.store(true, std::sync::atomic::Ordering::SeqCst);
            self.kill_notify.notify_one();
        }
    }
}
