// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

pub use self::shared::*;
pub use self::singletons::*;

mod shared;
pub mod singletons;
