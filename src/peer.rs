//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeSet;

use crate::af::AddressFamily;

// Capabilities a peer exposes to its close manager.
//
// The peer owns the close manager; the manager holds a non-owning handle
// back to the peer and resolves it at event entry. Lifecycle hooks are
// invoked with the manager's lock held, so implementations must not call
// back into the manager from within them. `graceful_restart_sweep` is the
// one exception: it runs from the deferred sweep task, outside any caller's
// critical section.
pub trait PeerClose: Send + Sync {
    // Session is currently established.
    fn is_ready(&self) -> bool;

    // Graceful Restart was negotiated for the session.
    fn is_close_graceful(&self) -> bool;

    // Long-Lived Graceful Restart was negotiated for the session.
    fn is_close_long_lived_graceful(&self) -> bool;

    // Negotiated restart time, in seconds.
    fn graceful_restart_time(&self) -> u16;

    // Negotiated long-lived stale time, in seconds.
    fn long_lived_graceful_restart_time(&self) -> u32;

    // Families for which an End-of-RIB marker is expected.
    fn graceful_restart_families(&self) -> BTreeSet<AddressFamily>;

    // All routes learned from the peer have been marked stale.
    fn graceful_restart_stale(&self);

    // Routes not refreshed by the new session are being purged.
    fn graceful_restart_sweep(&self);

    // Teardown specific to the peer variant (BGP peer, XMPP agent, ...).
    fn custom_close(&self);

    // The close process finished a pass; the session may restart.
    fn close_complete(&self);

    // Unregistration finished; the peer itself can now be destroyed.
    fn delete(&self);

    // Backpressure gate for the shared membership manager.
    fn can_use_membership_manager(&self) -> bool;
}
