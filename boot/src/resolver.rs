//! resolver.rs — pick the device tree for this machine
//!
//! Walks the configured CHID kinds, most specific first, and loads the first
//! `<dtb_dir>\<chid>.<dtb_ext>` that reads and parses. The override file is
//! tried once, before or after the sweep depending on `OverridePolicy`.

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use log::{debug, info, warn};
use uuid::Uuid;

use crate::blob::{BlobPool, DtBlob};
use crate::chid::ChidKind;
use crate::config::{LoaderConfig, OverridePolicy};
use crate::error::LoaderError;

/// Maps a CHID kind to this machine's GUID for it.
pub trait HardwareIds {
    /// `None` when the kind cannot be derived here; the resolver skips it.
    fn hardware_id(&self, kind: ChidKind) -> Option<Uuid>;
}

/// Whole-file reads from the boot volume.
pub trait FileLookup {
    fn read(&mut self, path: &str) -> Result<Vec<u8>, LoaderError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateSource {
    Chid { kind: ChidKind, id: Uuid },
    Override,
}

impl fmt::Display for CandidateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CandidateSource::Chid { kind, id } => write!(f, "{kind} {{{id}}}"),
            CandidateSource::Override => f.write_str("override"),
        }
    }
}

/// The winning blob and where it came from.
#[derive(Debug)]
pub struct Candidate<'p, P: BlobPool + ?Sized> {
    pub blob: DtBlob<'p, P>,
    pub source: CandidateSource,
    pub path: String,
}

pub fn candidate_path(config: &LoaderConfig, id: &Uuid) -> String {
    format!("{}\\{}.{}", config.dtb_dir.trim_end_matches('\\'), id.hyphenated(), config.dtb_ext)
}

pub fn resolve<'p, I, V, P>(
    config: &LoaderConfig,
    ids: &I,
    volume: &mut V,
    pool: &'p P,
) -> Result<Candidate<'p, P>, LoaderError>
where
    I: HardwareIds + ?Sized,
    V: FileLookup + ?Sized,
    P: BlobPool + ?Sized,
{
    if config.override_policy == OverridePolicy::First {
        if let Some(found) = try_override(config, volume, pool)? {
            return Ok(found);
        }
    }

    for &kind in &config.chid_order {
        let Some(id) = ids.hardware_id(kind) else {
            debug!("{kind}: not derivable, skipped");
            continue;
        };
        let path = candidate_path(config, &id);
        if let Some(blob) = load(volume, pool, &path)? {
            info!("matched {kind} {{{id}}}");
            return Ok(Candidate { blob, source: CandidateSource::Chid { kind, id }, path });
        }
    }

    if config.override_policy == OverridePolicy::Last {
        if let Some(found) = try_override(config, volume, pool)? {
            return Ok(found);
        }
    }
    Err(LoaderError::NotFound)
}

fn try_override<'p, V, P>(
    config: &LoaderConfig,
    volume: &mut V,
    pool: &'p P,
) -> Result<Option<Candidate<'p, P>>, LoaderError>
where
    V: FileLookup + ?Sized,
    P: BlobPool + ?Sized,
{
    let path = config.override_path.clone();
    Ok(load(volume, pool, &path)?.map(|blob| {
        info!("using override {path}");
        Candidate { blob, source: CandidateSource::Override, path }
    }))
}

/// `Ok(None)` means "try the next one". Only running out of memory stops
/// the search.
fn load<'p, V, P>(volume: &mut V, pool: &'p P, path: &str) -> Result<Option<DtBlob<'p, P>>, LoaderError>
where
    V: FileLookup + ?Sized,
    P: BlobPool + ?Sized,
{
    let bytes = match volume.read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.is_not_found() => {
            debug!("{path}: not present");
            return Ok(None);
        }
        Err(LoaderError::OutOfMemory) => return Err(LoaderError::OutOfMemory),
        Err(e) => {
            warn!("{path}: {e}");
            return Ok(None);
        }
    };
    match DtBlob::from_bytes(pool, &bytes) {
        Ok(blob) => Ok(Some(blob)),
        Err(LoaderError::OutOfMemory) => Err(LoaderError::OutOfMemory),
        Err(e) => {
            warn!("{path}: {e}, skipped");
            Ok(None)
        }
    }
}
