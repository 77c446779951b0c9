//! Managed child process abstraction.
//!
//! Children are started in their own process groups so the manager can signal
//! a node and everything it forked as one unit.

use std::path::Path;
use std::time::Duration;

use tokio::process::{Child, Command};

use crate::manager::ManagerError;

pub struct ManagedChild {
    pub node_name: String,
    child: Child,
    pid: Option<u32>,
    exited: bool,
}

impl ManagedChild {
    /// Spawn `program args...` in a new process group.
    pub fn spawn(node_name: &str, program: &Path, args: &[String]) -> Result<Self, ManagerError> {
        let mut cmd = Command::new(program);
        cmd.args(args).kill_on_drop(true);

        #[cfg(unix)]
        unsafe {
            cmd.pre_exec(|| {
                nix::unistd::setsid()
                    .map(|_| ())
                    .map_err(|e| std::io::Error::from_raw_os_error(e as i32))
            });
        }

        let child = cmd.spawn().map_err(|source| ManagerError::ChildSpawn {
            node: node_name.to_string(),
            source,
        })?;
        let pid = child.id();
        log::info!("[{node_name}] started child process (pid {pid:?})");
        Ok(Self {
            node_name: node_name.to_string(),
            child,
            pid,
            exited: false,
        })
    }

    /// Non-blocking liveness check; logs the exit the first time it is seen.
    pub fn has_exited(&mut self) -> bool {
        if self.exited {
            return true;
        }
        match self.child.try_wait() {
            Ok(Some(status)) => {
                log::info!("[{}] child exited with code {:?}", self.node_name, status.code());
                self.exited = true;
                true
            }
            Ok(None) => false,
            Err(e) => {
                log::error!("[{}] error checking child status: {e}", self.node_name);
                false
            }
        }
    }

    /// SIGTERM the process group, wait up to `timeout`, then SIGKILL.
    pub async fn stop(&mut self, timeout: Duration) {
        if self.exited {
            return;
        }
        #[cfg(unix)]
        self.signal_group(nix::sys::signal::Signal::SIGTERM);
        #[cfg(not(unix))]
        {
            let _ = self.child.start_kill();
        }

        match tokio::time::timeout(timeout, self.child.wait()).await {
            Ok(Ok(status)) => {
                log::info!("[{}] child exited with code {:?}", self.node_name, status.code());
                self.exited = true;
            }
            Ok(Err(e)) => {
                log::error!("[{}] error waiting for child: {e}", self.node_name);
                self.exited = true;
            }
            Err(_) => {
                log::warn!("[{}] child did not exit in time, killing", self.node_name);
                #[cfg(unix)]
                self.signal_group(nix::sys::signal::Signal::SIGKILL);
                let _ = self.child.kill().await;
                self.exited = true;
            }
        }
    }

    #[cfg(unix)]
    fn signal_group(&self, signal: nix::sys::signal::Signal) {
        use nix::sys::signal::kill;
        use nix::unistd::Pid;

        let Some(pid) = self.pid else { return };
        // Negative pid targets the whole process group.
        match kill(Pid::from_raw(-(pid as i32)), signal) {
            Ok(()) => log::info!("[{}] sent {signal} to process group {pid}", self.node_name),
            Err(nix::errno::Errno::ESRCH) => {
                log::info!("[{}] process group {pid} not found", self.node_name)
            }
            Err(e) => log::warn!(
                "[{}] failed to signal process group {pid}: {e}",
                self.node_name
            ),
        }
    }
}
