//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::future::Future;
use std::net::IpAddr;
use std::sync::Weak;
use std::time::Duration;

use derive_new::new;
use tokio::task;
use tracing::{Instrument, debug_span};

use crate::close::PeerCloseManager;

//
// Close manager tasks diagram:
//
//                      +---------------+
//      restart_timer ->|               |
//        sweep_timer ->| close manager |<- membership callback
//                      |               |
//                      +---------------+
//
// Both timers are one-shot. The restart timer covers the GR and LLGR waits;
// the sweep timer fires at zero to move the sweep out of the caller's
// critical section.
//

/// A handle which can be used to manipulate the task created by the
/// [`Task::spawn`] function.
///
/// Dropping this handle cancels the task.
#[derive(Debug)]
pub struct Task<T> {
    join_handle: task::JoinHandle<T>,
}

/// A handle for the timeout task created by the [`TimeoutTask::new`]
/// function.
///
/// Dropping this handle cancels the timeout task.
#[derive(Debug)]
pub struct TimeoutTask {
    #[cfg(not(feature = "testing"))]
    inner: TimeoutTaskInner,
}

#[derive(Debug, new)]
struct TimeoutTaskInner {
    _task: Task<()>,
}

// ===== impl Task =====

impl<T> Task<T> {
    /// Spawns a new asynchronous task, returning a handle for it.
    pub fn spawn<Fut>(future: Fut) -> Task<T>
    where
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        Task {
            join_handle: task::spawn(future),
        }
    }
}

impl<T> Drop for Task<T> {
    fn drop(&mut self) {
        self.join_handle.abort();
    }
}

// ===== impl TimeoutTask =====

impl TimeoutTask {
    /// Spawns a new task that will call the provided async closure when the
    /// specified timeout expires.
    #[cfg(not(feature = "testing"))]
    pub fn new<F, Fut>(timeout: Duration, cb: F) -> TimeoutTask
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let task = Task::spawn(
            async move {
                tokio::time::sleep(timeout).await;
                (cb)().await;
            }
            .in_current_span(),
        );

        TimeoutTask {
            inner: TimeoutTaskInner::new(task),
        }
    }
}

// ===== close manager tasks =====

// Graceful restart timer task.
//
// Covers both the GR and the LLGR wait; the expiry handler decides which
// one just ended from the manager's state.
pub(crate) fn restart_timer(
    nbr_addr: IpAddr,
    timeout: Duration,
    close_manager: &Weak<PeerCloseManager>,
) -> TimeoutTask {
    #[cfg(not(feature = "testing"))]
    {
        let span = debug_span!("neighbor", addr = %nbr_addr);
        let _span_guard = span.enter();

        let close_manager = close_manager.clone();
        TimeoutTask::new(timeout, move || async move {
            if let Some(close_manager) = close_manager.upgrade() {
                close_manager.restart_timer_expired();
            }
        })
    }
    #[cfg(feature = "testing")]
    {
        TimeoutTask {}
    }
}

// Deferred sweep task.
//
// Fires right away so the sweep runs at a task boundary instead of inside
// the membership callback that scheduled it.
pub(crate) fn sweep_timer(
    nbr_addr: IpAddr,
    close_manager: &Weak<PeerCloseManager>,
) -> TimeoutTask {
    #[cfg(not(feature = "testing"))]
    {
        let span = debug_span!("neighbor", addr = %nbr_addr);
        let _span_guard = span.enter();

        let close_manager = close_manager.clone();
        TimeoutTask::new(Duration::ZERO, move || async move {
            if let Some(close_manager) = close_manager.upgrade() {
                close_manager.sweep_timer_expired();
            }
        })
    }
    #[cfg(feature = "testing")]
    {
        TimeoutTask {}
    }
}
