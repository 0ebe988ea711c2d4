//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeSet;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    // Per-path flags relevant to session teardown.
    //
    // Both flags demote the path in best-path selection while keeping it
    // eligible for forwarding.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct PathFlags: u32 {
        const STALE = 0x01;
        const LLGR_STALE = 0x02;
    }
}

// BGP standard community.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct Comm(pub u32);

// List of standard communities attached to a path.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct Comms(pub BTreeSet<Comm>);

// BGP Well-known Communities.
//
// IANA registry:
// https://www.iana.org/assignments/bgp-well-known-communities/bgp-well-known-communities.xhtml
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
#[repr(u32)]
pub enum WellKnownCommunities {
    LlgrStale = 0xFFFF0006,
    NoLlgr = 0xFFFF0007,
    NoExport = 0xFFFFFF01,
    NoAdvertise = 0xFFFFFF02,
    NoExportSubconfed = 0xFFFFFF03,
}

// Path attributes visible to the close manager's table walks.
//
// The full RIB lives outside this crate; a walk hands the visitor one of
// these per (table, route, path) tuple.
#[derive(Clone, Debug, Default)]
pub struct Path {
    pub flags: PathFlags,
    pub comm: Option<Comms>,
}

// Route modification produced by a path visit.
//
// The table feeds the result to its input pipeline with the closing peer as
// originator. `AddChange` reinserts the path with the given flags and
// attributes unchanged.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PathAction {
    Skip,
    AddChange(PathFlags),
    Delete(PathFlags),
}

// ===== impl Comms =====

impl Comms {
    // Whether the list carries the given well-known community.
    pub fn contains(&self, comm: WellKnownCommunities) -> bool {
        self.0.contains(&Comm(comm as u32))
    }
}
