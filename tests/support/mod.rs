//! Shared utilities for integration tests.

#![allow(dead_code)]

pub mod scripted_transport;
pub mod socket_guard;

/// Deterministic, non-repeating-looking payload of `len` bytes.
#[must_use]
pub fn payload(len: usize) -> Vec<u8> {
    (0..len)
        .map(|i| u8::try_from((i * 31 + i / 251) % 251).unwrap_or(0))
        .collect()
}
