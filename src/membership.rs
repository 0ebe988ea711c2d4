//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::IpAddr;

use serde::{Deserialize, Serialize};

// Identifier of a RIB table a peer is registered to.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct RibId(pub u32);

// Interlock with the shared membership manager.
//
// At most one membership round is outstanding per peer. `InWait` means a
// round was requested while the manager was busy and will be resumed by a
// later `membership_request` call.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MembershipState {
    None,
    InWait,
    InUse,
}

// Per-peer/per-table registration and walk scheduling, owned by the BGP
// server and shared across peers.
//
// The register/unregister/walk operations are asynchronous: each eventually
// drives `is_pending` toward false and produces a completion callback into
// the close manager. Implementations must not invoke the close manager's
// callbacks synchronously from within these methods, as the manager holds
// its lock across the dispatch loop.
pub trait MembershipManager: Send + Sync {
    // Tables the peer is currently registered to, in either direction.
    fn registered_ribs(&self, peer: IpAddr) -> Vec<RibId>;

    // Peer is registered in both directions.
    fn is_registered(&self, peer: IpAddr, rib: RibId) -> bool;

    // Peer is registered for RibIn only.
    fn is_rib_in_registered(&self, peer: IpAddr, rib: RibId) -> bool;

    // Remove both RibIn and RibOut registrations.
    fn unregister(&self, peer: IpAddr, rib: RibId);

    // Remove the RibOut registration; RibIn will be walked instead.
    fn unregister_rib_out(&self, peer: IpAddr, rib: RibId);

    // Remove the RibIn registration.
    fn unregister_rib_in(&self, peer: IpAddr, rib: RibId);

    // Visit every RibIn path learned from the peer.
    fn walk_rib_in(&self, peer: IpAddr, rib: RibId);

    // Queries still outstanding for the peer.
    fn is_pending(&self, peer: IpAddr) -> bool;
}
