//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

#![cfg_attr(
    feature = "testing",
    allow(dead_code, unused_variables, unused_imports)
)]

pub mod af;
pub mod close;
pub mod debug;
pub mod membership;
pub mod peer;
pub mod rib;
pub mod tasks;
