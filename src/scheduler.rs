//! Real-time priority hints
//!
//! A link asks for higher scheduling priority while a ground station is
//! connected and gives it back when the link goes idle. Hints are
//! best-effort: a failure is logged and the link carries on.
//!
//! Hints act on the calling OS thread. A hint that really changes thread
//! scheduling asks for [`PriorityHint::dedicated_thread`], and each of its
//! links then runs on a thread of its own instead of the shared runtime
//! workers.

/// Priority policy consulted on liveness transitions
pub trait PriorityHint: Send + Sync + 'static {
    /// Link `link` became active
    fn raise(&self, link: &str);

    /// Link `link` went idle or terminated
    fn lower(&self, link: &str);

    /// Whether each link needs its own OS thread for this hint to apply
    fn dedicated_thread(&self) -> bool {
        false
    }
}

/// Leaves scheduling alone
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPriority;

impl PriorityHint for NoPriority {
    fn raise(&self, _link: &str) {}

    fn lower(&self, _link: &str) {}
}

/// Switches the link's thread to `SCHED_FIFO` while the link is active
///
/// Links run on dedicated threads under this hint, so raising one link
/// never touches a thread another link or task is using. Usually requires
/// `CAP_SYS_NICE`.
#[derive(Debug, Clone, Copy)]
pub struct RealtimePriority {
    priority: i32,
}

impl Default for RealtimePriority {
    fn default() -> Self {
        Self { priority: 5 }
    }
}

impl RealtimePriority {
    pub fn new(priority: i32) -> Self {
        Self { priority }
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }
}

impl PriorityHint for RealtimePriority {
    fn raise(&self, link: &str) {
        match set_thread_policy(true, self.priority) {
            Ok(()) => tracing::debug!(link = %link, priority = self.priority, "Real-time priority raised"),
            Err(e) => tracing::warn!(link = %link, error = %e, "Failed to raise priority"),
        }
    }

    fn lower(&self, link: &str) {
        match set_thread_policy(false, 0) {
            Ok(()) => tracing::debug!(link = %link, "Real-time priority lowered"),
            Err(e) => tracing::warn!(link = %link, error = %e, "Failed to lower priority"),
        }
    }

    fn dedicated_thread(&self) -> bool {
        true
    }
}

#[cfg(target_os = "linux")]
fn set_thread_policy(realtime: bool, priority: i32) -> std::io::Result<()> {
    let policy = if realtime {
        libc::SCHED_FIFO
    } else {
        libc::SCHED_OTHER
    };

    // SAFETY: sched_param is plain data; pthread_self() is always valid
    // for the calling thread.
    let ret = unsafe {
        let mut param: libc::sched_param = std::mem::zeroed();
        param.sched_priority = if realtime { priority } else { 0 };
        libc::pthread_setschedparam(libc::pthread_self(), policy, &param)
    };

    if ret != 0 {
        return Err(std::io::Error::from_raw_os_error(ret));
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn set_thread_policy(_realtime: bool, _priority: i32) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "real-time scheduling is only supported on Linux",
    ))
}
