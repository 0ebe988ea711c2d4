//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use serde::{Deserialize, Serialize};

// Address families for which routes can be retained across a session flap.
//
// `Unspec` is the sentinel carried by an End-of-RIB marker that covers every
// address family at once.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub enum AddressFamily {
    Ipv4Unicast,
    Ipv6Unicast,
    Ipv4Vpn,
    Ipv6Vpn,
    Evpn,
    Unspec,
}

// ===== impl AddressFamily =====

impl std::fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AddressFamily::Ipv4Unicast => write!(f, "ipv4-unicast"),
            AddressFamily::Ipv6Unicast => write!(f, "ipv6-unicast"),
            AddressFamily::Ipv4Vpn => write!(f, "ipv4-vpn"),
            AddressFamily::Ipv6Vpn => write!(f, "ipv6-vpn"),
            AddressFamily::Evpn => write!(f, "evpn"),
            AddressFamily::Unspec => write!(f, "unspec"),
        }
    }
}
