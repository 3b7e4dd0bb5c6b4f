use std::ffi::OsStr;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use sysinfo::{Pid, Process, ProcessRefreshKind, ProcessStatus, ProcessesToUpdate, Signal, System};

const POLL: Duration = Duration::from_millis(20);

#[derive(Debug, PartialEq, Eq)]
pub enum KillResult {
    /// Child exited after SIGTERM.
    Terminated,
    /// Child ignored SIGTERM and was killed.
    Killed,
    /// Child had already exited.
    NotRunning,
    Failed(String),
}

fn process_table(which: ProcessesToUpdate<'_>) -> System {
    let mut sys = System::new();
    sys.refresh_processes_specifics(which, true, ProcessRefreshKind::nothing());
    sys
}

/// Zombies are already dead; they only wait for their parent to reap them.
fn is_live(process: &Process) -> bool {
    process.status() != ProcessStatus::Zombie
}

/// Count live processes whose executable name matches `name`.
pub fn running_instances(name: &str) -> usize {
    process_table(ProcessesToUpdate::All)
        .processes_by_exact_name(OsStr::new(name))
        .filter(|p| is_live(p))
        .count()
}

pub fn is_alive(pid: u32) -> bool {
    let pid = Pid::from_u32(pid);
    process_table(ProcessesToUpdate::Some(&[pid]))
        .process(pid)
        .is_some_and(is_live)
}

/// Every process below `root` in the parent chain, children first.
pub fn descendants(sys: &System, root: Pid) -> Vec<Pid> {
    let mut found = Vec::new();
    let mut frontier = vec![root];
    while let Some(parent) = frontier.pop() {
        for (pid, process) in sys.processes() {
            if process.parent() == Some(parent) && !found.contains(pid) {
                found.push(*pid);
                frontier.push(*pid);
            }
        }
    }
    found
}

fn send_signal(sys: &System, pid: Pid, signal: Signal) -> bool {
    match sys.process(pid) {
        Some(process) => match process.kill_with(signal) {
            Some(sent) => sent,
            // Signal not supported on this platform, fall back to kill()
            None => process.kill(),
        },
        None => false,
    }
}

/// Best-effort privileged sweep of leftover sampler processes.
///
/// Strays are usually root-owned, so this goes through `sudo -n killall`.
/// Failures are ignored: without permission there is nothing to sweep anyway.
pub fn sweep_strays(sudo: &Path, binary: &Path) {
    let Some(name) = binary.file_name().and_then(|n| n.to_str()) else {
        return;
    };
    let strays = running_instances(name);
    if strays == 0 {
        return;
    }
    tracing::debug!("sweeping {strays} stray {name} process(es)");
    let status = Command::new(sudo)
        .args(["-n", "killall", name])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    if let Err(e) = status {
        tracing::debug!("stray sweep for {name} failed: {e}");
    }
}

/// Stop a child and everything it spawned: SIGTERM first so sudo relays it
/// to the sampler, then SIGKILL once `timeout` has passed. Always reaps the
/// child. Descendants still alive afterwards get the same treatment, since
/// a killed `sudo` cannot relay anything.
pub fn terminate_child(child: &mut Child, timeout: Duration) -> KillResult {
    match child.try_wait() {
        Ok(Some(_)) => return KillResult::NotRunning,
        Ok(None) => {}
        Err(e) => return KillResult::Failed(format!("failed to poll PID {}: {e}", child.id())),
    }

    let root = Pid::from_u32(child.id());
    let sys = process_table(ProcessesToUpdate::All);
    // Collected up front: once the child dies they are reparented.
    let tree = descendants(&sys, root);

    let result = if send_signal(&sys, root, Signal::Term) && wait_for_exit(child, timeout) {
        KillResult::Terminated
    } else {
        force_kill(child)
    };

    stop_orphans(&tree, timeout);
    result
}

fn wait_for_exit(child: &mut Child, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        match child.try_wait() {
            Ok(Some(_)) => return true,
            Ok(None) => thread::sleep(POLL),
            Err(_) => return false,
        }
    }
    false
}

fn force_kill(child: &mut Child) -> KillResult {
    let pid = child.id();
    match child.kill() {
        Ok(()) => match child.wait() {
            Ok(_) => KillResult::Killed,
            Err(e) => KillResult::Failed(format!("failed to reap PID {pid}: {e}")),
        },
        // Raced with a natural exit.
        Err(_) if matches!(child.try_wait(), Ok(Some(_))) => KillResult::Terminated,
        Err(e) => KillResult::Failed(format!("failed to kill PID {pid}: {e}")),
    }
}

fn survivors(tree: &[Pid]) -> (System, Vec<Pid>) {
    let sys = process_table(ProcessesToUpdate::Some(tree));
    let alive = tree
        .iter()
        .copied()
        .filter(|pid| sys.process(*pid).is_some_and(is_live))
        .collect();
    (sys, alive)
}

fn wait_gone(tree: &[Pid], timeout: Duration) -> Vec<Pid> {
    let deadline = Instant::now() + timeout;
    loop {
        let (_, alive) = survivors(tree);
        if alive.is_empty() || Instant::now() >= deadline {
            return alive;
        }
        thread::sleep(POLL);
    }
}

fn stop_orphans(tree: &[Pid], timeout: Duration) {
    if tree.is_empty() {
        return;
    }
    let (sys, alive) = survivors(tree);
    if alive.is_empty() {
        return;
    }
    for pid in &alive {
        send_signal(&sys, *pid, Signal::Term);
    }
    let stubborn = wait_gone(&alive, timeout);
    if stubborn.is_empty() {
        return;
    }

    let (sys, _) = survivors(&stubborn);
    for pid in &stubborn {
        if !send_signal(&sys, *pid, Signal::Kill) {
            // Root-owned sampler under sudo; the stray sweep handles it.
            tracing::debug!("could not kill orphaned PID {pid}");
        }
    }
    let left = wait_gone(&stubborn, timeout);
    if !left.is_empty() {
        tracing::warn!("{} orphaned sampler process(es) survived termination", left.len());
    }
}
