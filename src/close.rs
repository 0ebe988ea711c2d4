//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeSet;
use std::net::IpAddr;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::af::AddressFamily;
use crate::debug::Debug;
use crate::membership::{MembershipManager, MembershipState};
use crate::peer::PeerClose;
use crate::rib::{Path, PathAction, PathFlags, WellKnownCommunities};
use crate::tasks;
use crate::tasks::TimeoutTask;

// Phases of the peer close process.
//
// A closure advances through these phases and always ends back at `None`:
//
// Graceful:
//   None -> Stale -> GrTimer -> Sweep -> None
// GR expired, LLGR negotiated:
//   None -> Stale -> GrTimer -> LlgrStale -> LlgrTimer -> {Sweep, Delete}
// Non-graceful (or GR not negotiated):
//   None -> Delete -> None
//
// `Stale`, `LlgrStale`, `Sweep` and `Delete` each dispatch one membership
// round; the round's completion callback performs the next transition. The
// timer phases wait for the peer to come back, for all End-of-RIB markers,
// or for the restart timer to expire.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum State {
    None,
    Stale,
    GrTimer,
    LlgrStale,
    LlgrTimer,
    Sweep,
    Delete,
}

// Close process statistics.
#[derive(Debug, Default)]
pub struct Statistics {
    pub init: u64,
    pub close: u64,
    pub nested: u64,
    pub deletes: u64,
    pub stale: u64,
    pub sweep: u64,
    pub gr_timer: u64,
    pub llgr_stale: u64,
    pub llgr_timer: u64,
}

// Snapshot of the close process, attached to neighbor introspection
// responses.
#[derive(Debug, Serialize)]
pub struct CloseInfo {
    pub state: String,
    pub close_again: bool,
    pub non_graceful: bool,
    pub init: u64,
    pub close: u64,
    pub nested: u64,
    pub deletes: u64,
    pub stale: u64,
    pub sweep: u64,
    pub gr_timer: u64,
    pub llgr_stale: u64,
    pub llgr_timer: u64,
}

// Peer close manager.
//
// One per neighbor; orchestrates session teardown while honoring the
// negotiated Graceful Restart and Long-Lived Graceful Restart semantics.
// Events arrive from four sources (close requests, timer expiries,
// End-of-RIB markers, membership callbacks) and are serialized under a
// single mutex. The neighbor owns the manager; the back reference is a
// non-owning handle resolved at event entry.
pub struct PeerCloseManager {
    // Neighbor address, used for logging spans.
    nbr_addr: IpAddr,
    // Non-owning handle to the peer.
    peer: Weak<dyn PeerClose>,
    // Membership manager shared across peers.
    membership: Arc<dyn MembershipManager>,
    // Self-handle for arming timer tasks.
    me: Weak<PeerCloseManager>,
    // Mutable state.
    inner: Mutex<CloseState>,
}

#[derive(Debug)]
struct CloseState {
    state: State,
    // A close was requested while one is in progress; restart at the
    // earliest safe point.
    close_again: bool,
    // Sticky until the closure fully completes; forces the delete path
    // regardless of GR capability.
    non_graceful: bool,
    // Time spent in prior timer phases of nested closures, subtracted from
    // the next arm so the total wait never exceeds the negotiated time.
    gr_elapsed: Duration,
    llgr_elapsed: Duration,
    // Families for which an End-of-RIB marker is still expected.
    families: BTreeSet<AddressFamily>,
    membership_state: MembershipState,
    stale_timer: Option<TimeoutTask>,
    stale_timer_armed: Option<Instant>,
    sweep_timer: Option<TimeoutTask>,
    stats: Statistics,
}

// ===== impl PeerCloseManager =====

impl PeerCloseManager {
    pub fn new(
        nbr_addr: IpAddr,
        peer: Weak<dyn PeerClose>,
        membership: Arc<dyn MembershipManager>,
    ) -> Arc<PeerCloseManager> {
        Arc::new_cyclic(|me| PeerCloseManager {
            nbr_addr,
            peer,
            membership,
            me: me.clone(),
            inner: Mutex::new(CloseState::new()),
        })
    }

    // ===== event entry points =====

    // Trigger closure of the peer.
    //
    // Once a non-graceful closure is requested, it remains non-graceful
    // until the close process completes, no matter what later calls ask for.
    pub fn close(&self, non_graceful: bool) {
        let Some(peer) = self.peer.upgrade() else {
            return;
        };
        let mut inner = self.inner.lock().unwrap();
        inner.non_graceful |= non_graceful;
        self.close_internal(&mut inner, &*peer);
    }

    // An End-of-RIB marker arrived for the given family.
    //
    // Only meaningful while waiting in a timer phase; reception of the full
    // set lets the timer fire early.
    pub fn process_eor_marker_received(&self, family: AddressFamily) {
        let mut inner = self.inner.lock().unwrap();
        if matches!(inner.state, State::GrTimer | State::LlgrTimer)
            && !inner.families.is_empty()
        {
            Debug::EorRx(&self.nbr_addr, family).log();
            if family == AddressFamily::Unspec {
                inner.families.clear();
            } else {
                inner.families.remove(&family);
            }
            if inner.families.is_empty() {
                self.start_restart_timer(&mut inner, Duration::ZERO);
            }
        }
    }

    // Restart timer expiry, from the timer task.
    pub fn restart_timer_expired(&self) {
        let Some(peer) = self.peer.upgrade() else {
            return;
        };
        let mut inner = self.inner.lock().unwrap();
        Debug::RestartTimerExpired(&self.nbr_addr).log();
        inner.stale_timer = None;
        inner.stale_timer_armed = None;
        if matches!(inner.state, State::GrTimer | State::LlgrTimer) {
            self.process_closure(&mut inner, &*peer);
        }
    }

    // Deferred sweep, from the sweep timer task.
    pub fn sweep_timer_expired(&self) {
        let Some(peer) = self.peer.upgrade() else {
            return;
        };
        let mut inner = self.inner.lock().unwrap();
        assert_eq!(inner.state, State::Sweep);
        inner.sweep_timer = None;

        // Notify the peer to regenerate RibOut and refresh its RibIn.
        peer.graceful_restart_sweep();
        self.close_complete(&mut inner, &*peer);
    }

    // Start (or resume, after `MembershipState::InWait`) a membership round.
    pub fn membership_request(&self) {
        let Some(peer) = self.peer.upgrade() else {
            return;
        };
        let mut inner = self.inner.lock().unwrap();
        self.membership_request_internal(&mut inner, &*peer);
    }

    // Completion callback from the membership manager.
    //
    // Walking RibIns and RibOuts for this peer is complete; advance the
    // close process.
    pub fn membership_request_callback(&self) {
        let Some(peer) = self.peer.upgrade() else {
            return;
        };
        let mut inner = self.inner.lock().unwrap();
        self.membership_request_callback_internal(&mut inner, &*peer);
    }

    // Per-path visit from a RibIn walk.
    //
    // Decides the fate of one path from the current close phase and the
    // path's flags.
    pub fn membership_path_callback(&self, path: &Path) -> PathAction {
        let inner = self.inner.lock().unwrap();
        match inner.state {
            State::None | State::GrTimer | State::LlgrTimer => {
                PathAction::Skip
            }
            State::Stale => {
                // Already marked; the session flipped while in GrTimer.
                if path.flags.contains(PathFlags::STALE) {
                    return PathAction::Skip;
                }
                PathAction::AddChange(path.flags | PathFlags::STALE)
            }
            State::LlgrStale => {
                // Paths carrying NO_LLGR must not survive long-lived
                // retention.
                if let Some(comm) = &path.comm {
                    if comm.contains(WellKnownCommunities::NoLlgr) {
                        return PathAction::Delete(path.flags);
                    }
                }
                // Already marked; the session flipped while in LlgrTimer.
                if path.flags.contains(PathFlags::LLGR_STALE) {
                    return PathAction::Skip;
                }
                PathAction::AddChange(path.flags | PathFlags::LLGR_STALE)
            }
            State::Sweep => {
                // Only paths still marked stale were not refreshed by the
                // new session.
                if !path
                    .flags
                    .intersects(PathFlags::STALE | PathFlags::LLGR_STALE)
                {
                    return PathAction::Skip;
                }
                let flags =
                    path.flags - (PathFlags::STALE | PathFlags::LLGR_STALE);
                PathAction::Delete(flags)
            }
            State::Delete => PathAction::Delete(path.flags),
        }
    }

    // ===== introspection =====

    // Snapshot for diagnostic RPCs.
    pub fn close_info(&self) -> CloseInfo {
        let inner = self.inner.lock().unwrap();
        CloseInfo {
            state: inner.state.to_string(),
            close_again: inner.close_again,
            non_graceful: inner.non_graceful,
            init: inner.stats.init,
            close: inner.stats.close,
            nested: inner.stats.nested,
            deletes: inner.stats.deletes,
            stale: inner.stats.stale,
            sweep: inner.stats.sweep,
            gr_timer: inner.stats.gr_timer,
            llgr_stale: inner.stats.llgr_stale,
            llgr_timer: inner.stats.llgr_timer,
        }
    }

    pub fn state(&self) -> State {
        self.inner.lock().unwrap().state
    }

    pub fn restart_timer_armed(&self) -> bool {
        self.inner.lock().unwrap().stale_timer.is_some()
    }

    // ===== internal helpers (lock held) =====

    fn close_internal(&self, inner: &mut CloseState, peer: &dyn PeerClose) {
        inner.stats.close += 1;

        // Ignore closures nested more than one level deep.
        if inner.close_again {
            Debug::NestedCloseIgnored(&self.nbr_addr).log();
            return;
        }

        match inner.state {
            State::None => self.process_closure(inner, peer),

            // Restart the closure right away, banking the time already
            // waited so the fresh timer is shortened accordingly.
            State::GrTimer => {
                Debug::NestedClose(&self.nbr_addr, inner.state).log();
                inner.close_again = true;
                inner.stats.nested += 1;
                let elapsed = inner.stale_timer_elapsed();
                inner.gr_elapsed += elapsed;
                self.close_complete(inner, peer);
            }
            State::LlgrTimer => {
                Debug::NestedClose(&self.nbr_addr, inner.state).log();
                inner.close_again = true;
                inner.stats.nested += 1;
                let elapsed = inner.stale_timer_elapsed();
                inner.llgr_elapsed += elapsed;
                self.close_complete(inner, peer);
            }

            // A membership round is in flight; its completion callback is
            // the first safe point to restart.
            State::Stale | State::LlgrStale | State::Sweep | State::Delete => {
                Debug::NestedClose(&self.nbr_addr, inner.state).log();
                inner.close_again = true;
                inner.stats.nested += 1;
            }
        }
    }

    // Pick the next phase and dispatch the membership round implementing it.
    fn process_closure(&self, inner: &mut CloseState, peer: &dyn PeerClose) {
        match inner.state {
            State::None => {
                if inner.non_graceful || !peer.is_close_graceful() {
                    self.move_to_state(inner, State::Delete);
                    inner.stats.deletes += 1;
                } else {
                    self.move_to_state(inner, State::Stale);
                    inner.stats.stale += 1;
                    peer.graceful_restart_stale();
                }
            }
            State::GrTimer => {
                if peer.is_ready() {
                    // The peer is back; sweep old paths which may not have
                    // come back in the new session.
                    self.move_to_state(inner, State::Sweep);
                    inner.gr_elapsed = Duration::ZERO;
                    inner.llgr_elapsed = Duration::ZERO;
                    inner.stats.sweep += 1;
                } else if peer.is_close_long_lived_graceful() {
                    self.move_to_state(inner, State::LlgrStale);
                    inner.stats.llgr_stale += 1;
                } else {
                    self.move_to_state(inner, State::Delete);
                    inner.stats.deletes += 1;
                }
            }
            State::LlgrTimer => {
                if peer.is_ready() {
                    self.move_to_state(inner, State::Sweep);
                    inner.gr_elapsed = Duration::ZERO;
                    inner.llgr_elapsed = Duration::ZERO;
                    inner.stats.sweep += 1;
                } else {
                    self.move_to_state(inner, State::Delete);
                    inner.stats.deletes += 1;
                }
            }
            State::Stale | State::LlgrStale | State::Sweep | State::Delete => {
                unreachable!("closure processed in state {}", inner.state);
            }
        }

        if inner.state == State::Delete {
            peer.custom_close();
        }
        self.membership_request_internal(inner, peer);
    }

    // One pass of the close process finished; return to idle and service a
    // nested closure, if any.
    fn close_complete(&self, inner: &mut CloseState, peer: &dyn PeerClose) {
        self.move_to_state(inner, State::None);
        inner.stale_timer = None;
        inner.stale_timer_armed = None;
        inner.sweep_timer = None;
        inner.families.clear();
        inner.stats.init += 1;

        // Nested closures trigger a fresh closure.
        if inner.close_again {
            inner.close_again = false;
            self.close_internal(inner, peer);
        }
    }

    // Dispatch one round of per-table unregister/walk operations.
    fn membership_request_internal(
        &self,
        inner: &mut CloseState,
        peer: &dyn PeerClose,
    ) {
        assert_ne!(inner.membership_state, MembershipState::InUse);

        // Pause until the membership manager is ready for use; a later
        // `membership_request` resumes the round.
        if !peer.can_use_membership_manager() {
            inner.membership_state = MembershipState::InWait;
            Debug::MembershipInWait(&self.nbr_addr).log();
            return;
        }
        inner.membership_state = MembershipState::InUse;

        let ribs = self.membership.registered_ribs(self.nbr_addr);
        if ribs.is_empty() {
            self.membership_request_callback_internal(inner, peer);
            return;
        }

        for rib in ribs {
            if self.membership.is_registered(self.nbr_addr, rib) {
                if inner.state == State::Delete {
                    self.membership.unregister(self.nbr_addr, rib);
                } else {
                    self.membership.unregister_rib_out(self.nbr_addr, rib);
                }
            } else {
                assert!(
                    self.membership.is_rib_in_registered(self.nbr_addr, rib)
                );
                if inner.state == State::Delete {
                    self.membership.unregister_rib_in(self.nbr_addr, rib);
                } else {
                    self.membership.walk_rib_in(self.nbr_addr, rib);
                }
            }
        }
    }

    fn membership_request_callback_internal(
        &self,
        inner: &mut CloseState,
        peer: &dyn PeerClose,
    ) {
        assert!(matches!(
            inner.state,
            State::Stale | State::LlgrStale | State::Sweep | State::Delete
        ));
        assert_eq!(inner.membership_state, MembershipState::InUse);

        if self.membership.is_pending(self.nbr_addr) {
            return;
        }

        inner.membership_state = MembershipState::None;
        Debug::RibWalkComplete(&self.nbr_addr).log();

        // Unregistration complete; the peer can be destroyed.
        if inner.state == State::Delete {
            self.move_to_state(inner, State::None);
            peer.delete();
            inner.gr_elapsed = Duration::ZERO;
            inner.llgr_elapsed = Duration::ZERO;
            inner.families.clear();
            inner.close_again = false;
            inner.non_graceful = false;
            inner.stats.init += 1;
            return;
        }

        // Service a nested closure at the first safe point.
        if inner.close_again {
            self.close_complete(inner, peer);
            return;
        }

        // Wait for the peer (and the paths) to come back up, hopefully
        // before the timer fires.
        if inner.state == State::Stale {
            peer.close_complete();
            self.move_to_state(inner, State::GrTimer);
            inner.families = peer.graceful_restart_families();

            // Offset the restart time by the time elapsed during nested
            // closures.
            let time = Duration::from_secs(peer.graceful_restart_time().into())
                .saturating_sub(inner.gr_elapsed);
            self.start_restart_timer(inner, time);
            inner.stats.gr_timer += 1;
            return;
        }

        // Typically a very long wait; the expectation is to receive all
        // End-of-RIB markers well before it ends.
        if inner.state == State::LlgrStale {
            self.move_to_state(inner, State::LlgrTimer);
            inner.families = peer.graceful_restart_families();

            let time = Duration::from_secs(
                peer.long_lived_graceful_restart_time().into(),
            )
            .saturating_sub(inner.llgr_elapsed);
            self.start_restart_timer(inner, time);
            inner.stats.llgr_timer += 1;
            return;
        }

        self.trigger_sweep_state_actions(inner);
    }

    fn move_to_state(&self, inner: &mut CloseState, new_state: State) {
        assert_ne!(inner.state, new_state);
        Debug::StateTransition(&self.nbr_addr, inner.state, new_state).log();
        inner.state = new_state;
    }

    fn start_restart_timer(&self, inner: &mut CloseState, time: Duration) {
        Debug::RestartTimerStart(&self.nbr_addr, time).log();
        inner.stale_timer =
            Some(tasks::restart_timer(self.nbr_addr, time, &self.me));
        inner.stale_timer_armed = Some(Instant::now());
    }

    // Defer the sweep to a task boundary, outside the membership callback's
    // critical section.
    fn trigger_sweep_state_actions(&self, inner: &mut CloseState) {
        Debug::SweepTimerStart(&self.nbr_addr).log();
        inner.sweep_timer = Some(tasks::sweep_timer(self.nbr_addr, &self.me));
    }
}

// ===== impl CloseState =====

impl CloseState {
    fn new() -> CloseState {
        CloseState {
            state: State::None,
            close_again: false,
            non_graceful: false,
            gr_elapsed: Duration::ZERO,
            llgr_elapsed: Duration::ZERO,
            families: Default::default(),
            membership_state: MembershipState::None,
            stale_timer: None,
            stale_timer_armed: None,
            sweep_timer: None,
            stats: Statistics {
                init: 1,
                ..Default::default()
            },
        }
    }

    // Time since the restart timer was last armed.
    fn stale_timer_elapsed(&self) -> Duration {
        self.stale_timer_armed
            .map(|armed| armed.elapsed())
            .unwrap_or_default()
    }
}

// ===== impl State =====

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            State::None => write!(f, "none"),
            State::Stale => write!(f, "stale"),
            State::GrTimer => write!(f, "gr-timer"),
            State::LlgrStale => write!(f, "llgr-stale"),
            State::LlgrTimer => write!(f, "llgr-timer"),
            State::Sweep => write!(f, "sweep"),
            State::Delete => write!(f, "delete"),
        }
    }
}
