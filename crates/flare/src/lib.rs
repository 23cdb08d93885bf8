//! Flare - incident tracking core.
//!
//! This crate provides both a CLI application and a library for incident
//! tracking: gapless incident numbering, an incident and user store with
//! JSONL persistence, private-incident visibility, resolution of chat and SSO
//! identities to local users, and reconciliation of incident participants
//! from a chat channel.

#![forbid(unsafe_code)]

// Public modules for library usage
pub mod directory;
pub mod domain;
pub mod duration;
pub mod error;
pub mod id_allocation;
pub mod storage;
pub mod sync;
pub mod users;
pub mod visibility;

// Public CLI module (needed by binary)
pub mod cli;

// Command implementations
pub mod app;
pub mod commands;
pub mod config;
pub mod output;
