use std::io;
use std::os::unix::process::ExitStatusExt;
use std::process::{Child, ExitStatus};
use std::ptr;
use std::sync::atomic::{AtomicI32, Ordering};

pub const JAVA_EXECUTABLE: &str = "java";

/// Exit code to report for a finished runtime. A runtime killed by a signal
/// is reported the way shells do, as `128 + signal`.
pub fn exit_code(status: ExitStatus) -> i32 {
    match (status.code(), status.signal()) {
        (Some(code), _) => code,
        (None, Some(signal)) => 128 + signal,
        (None, None) => 1,
    }
}

// Terminal signals reach the whole foreground process group, the runtime included.
const GROUP_SIGNALS: [libc::c_int; 2] = [libc::SIGINT, libc::SIGQUIT];
// Usually aimed at the launcher's pid alone, so they are passed on to the runtime.
const FORWARDED_SIGNALS: [libc::c_int; 2] = [libc::SIGTERM, libc::SIGHUP];

static RUNTIME_PID: AtomicI32 = AtomicI32::new(0);
static PENDING_SIGNAL: AtomicI32 = AtomicI32::new(0);

extern "C" fn on_signal(signal: libc::c_int) {
    if FORWARDED_SIGNALS.contains(&signal) {
        PENDING_SIGNAL.store(signal, Ordering::SeqCst);
        deliver_pending();
    }
}

// Called from the handler and from `watch`, so a signal that arrives between
// spawn and `watch` still reaches the runtime.
fn deliver_pending() {
    let pid = RUNTIME_PID.load(Ordering::SeqCst);
    if pid <= 0 {
        return;
    }
    let signal = PENDING_SIGNAL.swap(0, Ordering::SeqCst);
    if signal != 0 {
        // kill(2) is async-signal-safe.
        unsafe {
            libc::kill(pid, signal);
        }
    }
}

/// Keeps the launcher alive while the runtime runs.
///
/// Termination signals are caught instead of killing the launcher, so it can
/// wait for the runtime, report its exit code and remove the extracted jar.
/// Caught signals revert to their default action in the child on exec, while
/// a signal the launcher inherited as ignored is left ignored for the child.
/// Dropping the guard restores the previous dispositions.
pub struct SignalGuard {
    previous: Vec<(libc::c_int, libc::sigaction)>,
}

impl SignalGuard {
    pub fn install() -> io::Result<Self> {
        let mut guard = Self { previous: Vec::new() };

        for signal in GROUP_SIGNALS.into_iter().chain(FORWARDED_SIGNALS) {
            unsafe {
                let mut old: libc::sigaction = std::mem::zeroed();
                if libc::sigaction(signal, ptr::null(), &mut old) != 0 {
                    return Err(io::Error::last_os_error());
                }
                if old.sa_sigaction == libc::SIG_IGN {
                    continue;
                }

                let mut action: libc::sigaction = std::mem::zeroed();
                action.sa_sigaction = on_signal as extern "C" fn(libc::c_int) as libc::sighandler_t;
                action.sa_flags = libc::SA_RESTART;
                libc::sigemptyset(&mut action.sa_mask);
                if libc::sigaction(signal, &action, ptr::null_mut()) != 0 {
                    return Err(io::Error::last_os_error());
                }
                guard.previous.push((signal, old));
            }
        }

        Ok(guard)
    }

    /// Forwards later termination requests to `child`.
    pub fn watch(&self, child: &Child) {
        RUNTIME_PID.store(child.id() as i32, Ordering::SeqCst);
        deliver_pending();
    }
}

impl Drop for SignalGuard {
    fn drop(&mut self) {
        RUNTIME_PID.store(0, Ordering::SeqCst);
        PENDING_SIGNAL.store(0, Ordering::SeqCst);
        for (signal, old) in self.previous.iter().rev() {
            unsafe {
                libc::sigaction(*signal, old, ptr::null_mut());
            }
        }
    }
}
