//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::IpAddr;
use std::time::Duration;

use tracing::{debug, debug_span};

use crate::af::AddressFamily;
use crate::close::State;

// Close manager debug messages.
#[derive(Debug)]
pub enum Debug<'a> {
    StateTransition(&'a IpAddr, State, State),
    NestedClose(&'a IpAddr, State),
    NestedCloseIgnored(&'a IpAddr),
    RestartTimerStart(&'a IpAddr, Duration),
    RestartTimerExpired(&'a IpAddr),
    SweepTimerStart(&'a IpAddr),
    EorRx(&'a IpAddr, AddressFamily),
    MembershipInWait(&'a IpAddr),
    RibWalkComplete(&'a IpAddr),
}

// ===== impl Debug =====

impl Debug<'_> {
    // Log debug message using the tracing API.
    pub(crate) fn log(&self) {
        match self {
            Debug::StateTransition(addr, old_state, new_state) => {
                debug_span!("neighbor", %addr).in_scope(|| {
                    debug_span!("close").in_scope(|| {
                        debug!(%old_state, %new_state, "{}", self);
                    })
                });
            }
            Debug::NestedClose(addr, state) => {
                debug_span!("neighbor", %addr).in_scope(|| {
                    debug_span!("close").in_scope(|| {
                        debug!(%state, "{}", self);
                    })
                });
            }
            Debug::NestedCloseIgnored(addr)
            | Debug::RestartTimerExpired(addr)
            | Debug::SweepTimerStart(addr)
            | Debug::MembershipInWait(addr)
            | Debug::RibWalkComplete(addr) => {
                debug_span!("neighbor", %addr).in_scope(|| {
                    debug_span!("close").in_scope(|| {
                        debug!("{}", self);
                    })
                });
            }
            Debug::RestartTimerStart(addr, timeout) => {
                debug_span!("neighbor", %addr).in_scope(|| {
                    debug_span!("close").in_scope(|| {
                        debug!(?timeout, "{}", self);
                    })
                });
            }
            Debug::EorRx(addr, family) => {
                debug_span!("neighbor", %addr).in_scope(|| {
                    debug_span!("close").in_scope(|| {
                        debug!(%family, "{}", self);
                    })
                });
            }
        }
    }
}

impl std::fmt::Display for Debug<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Debug::StateTransition(..) => {
                write!(f, "state transition")
            }
            Debug::NestedClose(..) => {
                write!(f, "nested close")
            }
            Debug::NestedCloseIgnored(..) => {
                write!(f, "nested close ignored")
            }
            Debug::RestartTimerStart(..) => {
                write!(f, "restart timer started")
            }
            Debug::RestartTimerExpired(..) => {
                write!(f, "restart timer expired")
            }
            Debug::SweepTimerStart(..) => {
                write!(f, "sweep scheduled")
            }
            Debug::EorRx(..) => {
                write!(f, "end-of-rib marker received")
            }
            Debug::MembershipInWait(..) => {
                write!(f, "membership manager busy, waiting")
            }
            Debug::RibWalkComplete(..) => {
                write!(f, "rib walk completed")
            }
        }
    }
}
