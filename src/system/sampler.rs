//! Lifecycle of the privileged powermetrics child.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use super::kill::{self, KillResult};
use crate::config::SamplerConfig;
use crate::error::{CollectorError, Result};

/// Program and arguments used to launch the sampler.
#[derive(Clone, Debug)]
pub struct LaunchSpec {
    pub program: PathBuf,
    pub args: Vec<OsString>,
}

impl LaunchSpec {
    /// `sudo -n powermetrics` writing plist samples into the feed file,
    /// one sample per interval, forever.
    pub fn powermetrics(config: &SamplerConfig) -> Self {
        let mut args: Vec<OsString> = vec!["-n".into(), config.binary.clone().into()];
        args.extend(
            [
                "-i".to_string(),
                config.interval_ms.to_string(),
                "-n".to_string(),
                "-1".to_string(),
                "-b".to_string(),
                "1".to_string(),
                "-s".to_string(),
                config.samplers.join(","),
                "-f".to_string(),
                "plist".to_string(),
                "-o".to_string(),
            ]
            .into_iter()
            .map(OsString::from),
        );
        args.push(config.output_file.clone().into());
        LaunchSpec {
            program: config.sudo.clone(),
            args,
        }
    }

    /// `sudo -n powermetrics` for a single 1 ms sample. Exits non-zero when
    /// sudo would have asked for a password.
    pub fn single_sample(sudo: &Path, binary: &Path) -> Self {
        let mut args: Vec<OsString> = vec!["-n".into(), binary.into()];
        args.extend(["-i", "1", "-n", "1"].into_iter().map(OsString::from));
        LaunchSpec {
            program: sudo.to_path_buf(),
            args,
        }
    }
}

/// Leftover sampler processes that outlived their `sudo` parent.
#[derive(Clone, Debug)]
pub struct StrayGuard {
    sudo: PathBuf,
    binary: PathBuf,
    timeout: Duration,
}

impl StrayGuard {
    pub fn new(sudo: &Path, binary: &Path, timeout: Duration) -> Self {
        StrayGuard {
            sudo: sudo.to_path_buf(),
            binary: binary.to_path_buf(),
            timeout,
        }
    }

    fn name(&self) -> Option<&str> {
        self.binary.file_name().and_then(|n| n.to_str())
    }

    pub fn survivors(&self) -> usize {
        self.name().map_or(0, kill::running_instances)
    }

    /// Sweep leftovers and wait for them to go. True once none are left.
    pub fn clear(&self) -> bool {
        if self.survivors() == 0 {
            return true;
        }
        kill::sweep_strays(&self.sudo, &self.binary);

        let deadline = Instant::now() + self.timeout;
        while Instant::now() < deadline {
            if self.survivors() == 0 {
                return true;
            }
            thread::sleep(Duration::from_millis(50));
        }
        self.survivors() == 0
    }
}

/// Owned handle to a running sampler; terminates the child when dropped.
pub struct SamplerHandle {
    child: Child,
    stop_timeout: Duration,
}

impl SamplerHandle {
    pub fn id(&self) -> u32 {
        self.child.id()
    }

    /// False once the child has exited (e.g. sudo refused without a password).
    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    pub fn terminate(mut self) -> KillResult {
        self.terminate_in_place()
    }

    fn terminate_in_place(&mut self) -> KillResult {
        kill::terminate_child(&mut self.child, self.stop_timeout)
    }
}

impl Drop for SamplerHandle {
    fn drop(&mut self) {
        let _ = self.terminate_in_place();
    }
}

/// A stop detached from its supervisor so it can finish on a blocking
/// thread. The old sampler is gone once [`PendingStop::finish`] returns.
pub struct PendingStop {
    handle: Option<SamplerHandle>,
    guard: Option<StrayGuard>,
}

impl PendingStop {
    pub fn finish(mut self) {
        if let Some(handle) = self.handle.take() {
            let pid = handle.id();
            match handle.terminate() {
                KillResult::Failed(reason) => tracing::warn!("sampler pid {pid}: {reason}"),
                result => tracing::debug!("sampler pid {pid} stopped: {result:?}"),
            }
        }
        if let Some(guard) = &self.guard
            && !guard.clear()
        {
            tracing::warn!("{} sampler process(es) survived the sweep", guard.survivors());
        }
    }
}

pub struct SamplerSupervisor {
    spec: LaunchSpec,
    stop_timeout: Duration,
    handle: Option<SamplerHandle>,
    guard: Option<StrayGuard>,
}

impl SamplerSupervisor {
    pub fn new(config: &SamplerConfig) -> Self {
        let stop_timeout = Duration::from_millis(config.stop_timeout_ms);
        Self::with_spec(LaunchSpec::powermetrics(config), stop_timeout).with_stray_guard(
            StrayGuard::new(&config.sudo, &config.binary, stop_timeout),
        )
    }

    /// No stray guard: only the owned child is tracked.
    pub fn with_spec(spec: LaunchSpec, stop_timeout: Duration) -> Self {
        SamplerSupervisor {
            spec,
            stop_timeout,
            handle: None,
            guard: None,
        }
    }

    pub fn with_stray_guard(mut self, guard: StrayGuard) -> Self {
        self.guard = Some(guard);
        self
    }

    pub fn spec(&self) -> &LaunchSpec {
        &self.spec
    }

    /// Launch the child. Any child this supervisor already owns is
    /// terminated first, and the launch is refused while a stray sampler
    /// is still writing, so there is never more than one writer.
    pub fn launch(&mut self) -> Result<u32> {
        self.stop();
        if let Some(guard) = &self.guard {
            let count = guard.survivors();
            if count > 0 {
                return Err(CollectorError::StraySampler {
                    name: guard.name().unwrap_or_default().to_string(),
                    count,
                });
            }
        }

        let child = Command::new(&self.spec.program)
            .args(&self.spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| CollectorError::Launch {
                program: self.spec.program.display().to_string(),
                source,
            })?;

        let handle = SamplerHandle {
            child,
            stop_timeout: self.stop_timeout,
        };
        let pid = handle.id();
        tracing::info!("sampler started (pid {pid})");
        self.handle = Some(handle);
        Ok(pid)
    }

    pub fn is_running(&mut self) -> bool {
        self.handle.as_mut().is_some_and(SamplerHandle::is_running)
    }

    /// Detach the owned child for a stop that runs elsewhere.
    pub fn take_stop(&mut self) -> PendingStop {
        PendingStop {
            handle: self.handle.take(),
            guard: self.guard.clone(),
        }
    }

    /// Terminate the owned child, if any, sweep strays and wait for both.
    pub fn stop(&mut self) {
        self.take_stop().finish();
    }
}

impl Drop for SamplerSupervisor {
    fn drop(&mut self) {
        self.stop();
    }
}
