// Copyright (c) 2022, Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0
#![warn(
    future_incompatible,
    nonstandard_style,
    rust_2018_idioms,
    rust_2021_compatibility
)]

pub mod mem_store;
pub mod rocks_store;
pub mod slot_store;

pub use mem_store::InMemorySlotStore;
pub use rocks_store::RocksSlotStore;
pub use slot_store::{now_millis, SlotStore};
