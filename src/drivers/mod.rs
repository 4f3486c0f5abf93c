//! Clients for the external tools this binary orchestrates. Each client is
//! a thin argv-builder over a [`crate::exec::CommandRunner`], so tests swap
//! in a scripted runner instead of real processes.

pub mod postgres;
pub mod restic;
