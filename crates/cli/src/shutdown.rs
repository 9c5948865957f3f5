use engine_runtime::launcher::JobLauncher;
use model::execution::{job::JobExecution, status::ExecutionStatus};
use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Signal {
    Interrupt,
    Terminate,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Interrupt => f.write_str("SIGINT"),
            Signal::Terminate => f.write_str("SIGTERM"),
        }
    }
}

/// Resolves on the first SIGINT or SIGTERM. A listener that cannot be
/// installed is logged and never fires.
async fn next_signal() -> Signal {
    let interrupt = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => Signal::Interrupt,
            Err(err) => {
                error!(error = %err, "SIGINT listener unavailable");
                std::future::pending().await
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                Signal::Terminate
            }
            Err(err) => {
                error!(error = %err, "SIGTERM listener unavailable");
                std::future::pending().await
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<Signal>();

    tokio::select! {
        signal = interrupt => signal,
        signal = terminate => signal,
    }
}

/// Turns the first termination signal into [`JobLauncher::stop`]: running
/// chunks finish, nothing new starts.
#[derive(Clone)]
pub struct ShutdownCoordinator {
    launcher: JobLauncher,
    requested: Arc<AtomicBool>,
}

impl ShutdownCoordinator {
    pub fn new(launcher: JobLauncher) -> Self {
        Self {
            launcher,
            requested: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn register_handlers(&self) {
        let this = self.clone();
        tokio::spawn(async move {
            let signal = next_signal().await;
            info!(%signal, "Stopping after in-flight work");
            this.request();
        });
    }

    fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
        self.launcher.stop();
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Process exit code for a finished `run`.
    pub fn exit_code(&self, execution: &JobExecution) -> ExitCode {
        if self.is_shutdown_requested() {
            ExitCode::ShutdownRequested
        } else if execution.status == ExecutionStatus::Completed {
            ExitCode::Success
        } else {
            ExitCode::JobFailed
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success = 0,
    JobFailed = 1,
    /// 128 + SIGINT, as shells report it.
    ShutdownRequested = 130,
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}
