//! dtbloader — UEFI device-tree shim
//!
//! Picks the device tree matching the running machine (by CHID), grows it so
//! a downstream loader can patch it in place, publishes it as the FDT
//! configuration table and, at ExitBootServices, decides whether the OS
//! boots with the device tree (ACPI tables retracted) or with ACPI (both
//! descriptions left alone).
//!
//! Flow:
//! - `resolver`  : prioritized CHID candidates, then the override file
//! - `blob`      : pool-owned blob buffers, grown with `fdt::open_into`
//! - `publish`   : fingerprint + FDT table install
//! - `arbiter`   : one-shot ExitBootServices decision
//! - `pipeline`  : the four steps above, in order
//!
//! Supporting pieces: `smbios` and `chid` derive the hardware IDs, `config`
//! reads `\dtbloader.conf`, `chainload` finds the next stage.
//!
//! Everything here is firmware-agnostic and runs under host tests; the
//! `firmware` module binds the traits to the `uefi` crate.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod arbiter;
pub mod blob;
pub mod chainload;
pub mod chid;
pub mod config;
pub mod error;
pub mod fdt;
pub mod fingerprint;
pub mod pipeline;
pub mod publish;
pub mod resolver;
pub mod smbios;
pub mod tables;

#[cfg(feature = "firmware")]
pub mod firmware;

#[cfg(test)]
mod testing;

pub use arbiter::{Arbiter, ArbiterState, Decision, ExitBootServicesEvents};
pub use blob::{BlobPool, DtBlob};
pub use config::{LoaderConfig, OverridePolicy};
pub use error::{FdtError, LoaderError};
pub use fingerprint::Fingerprint;
pub use publish::PublishedDescriptor;
pub use resolver::{Candidate, CandidateSource, FileLookup, HardwareIds};
pub use tables::{TableDirectory, TableId};
