//! Shared fixtures for hub integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use iscc_hub::{Hub, HubConfig, MemoryStore, MicrosClock};
use iscc_hub_core::{testkit, IsccNote, Keypair};

pub const HUB_SEED: [u8; 32] = [0x11; 32];

pub fn fixed_clock(micros: u64) -> MicrosClock {
    Arc::new(move || micros)
}

pub fn test_config(server_id: u16) -> HubConfig {
    HubConfig::new(
        server_id,
        hex::encode(HUB_SEED),
        "hub.example.com",
        "unused.db",
    )
}

/// A hub over a fresh in-memory store with the clock frozen at the
/// fixture timestamp.
pub fn memory_hub(server_id: u16) -> Hub<MemoryStore> {
    memory_hub_with(test_config(server_id), testkit::TEST_NOW_MICROS)
}

pub fn memory_hub_with(config: HubConfig, now_micros: u64) -> Hub<MemoryStore> {
    Hub::with_store_and_clock(config, MemoryStore::new(), fixed_clock(now_micros)).unwrap()
}

pub fn client() -> Keypair {
    Keypair::from_seed(&[0x42; 32])
}

pub fn signed_note(server_id: u16, n: u64) -> IsccNote {
    testkit::signed_note(&client(), server_id, n).unwrap()
}

pub fn note_bytes(server_id: u16, n: u64) -> Vec<u8> {
    serde_json::to_vec(&signed_note(server_id, n)).unwrap()
}
