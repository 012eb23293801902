//! Client-side credential and membership cache for anonymous gift-exchange
//! rooms.
//!
//! A [`cache::RoomCache`] remembers admin codes, participant access codes,
//! which participants this client holds per group, and a display profile per
//! group. The [`realtime`] and [`gateway`] modules keep that memory in step
//! with server-pushed group events.

pub mod cache;
pub mod codes;
pub mod config;
pub mod gateway;
pub mod groups;
pub mod logging;
pub mod realtime;
pub mod reconcile;
pub mod storage;

pub use cache::RoomCache;
