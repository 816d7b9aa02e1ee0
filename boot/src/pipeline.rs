//! pipeline.rs — resolve, grow, publish, arm
//!
//! Every step up to publishing either hands its blob to the next or stops
//! the whole augmentation; the caller logs the error and chainloads
//! regardless. Once the table is out, a failed hook registration only
//! disables ACPI arbitration and is carried in the report.

use alloc::string::String;

use log::{info, warn};

use crate::arbiter::{Arbiter, ExitBootServicesEvents};
use crate::blob::BlobPool;
use crate::config::LoaderConfig;
use crate::error::LoaderError;
use crate::fingerprint::Fingerprint;
use crate::publish::publish;
use crate::resolver::{resolve, CandidateSource, FileLookup, HardwareIds};
use crate::tables::TableDirectory;

/// What ended up published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub source: CandidateSource,
    pub path: String,
    pub fingerprint: Fingerprint,
    /// Declared size after growth.
    pub total_size: usize,
    /// Why the ExitBootServices hook is missing, if it is. Both ACPI and
    /// the device tree then stay visible to the OS.
    pub unarmed: Option<LoaderError>,
}

pub fn augment<I, V, P, D, E>(
    config: &LoaderConfig,
    ids: &I,
    volume: &mut V,
    pool: &P,
    directory: D,
    events: &mut E,
) -> Result<Report, LoaderError>
where
    I: HardwareIds + ?Sized,
    V: FileLookup + ?Sized,
    P: BlobPool + ?Sized,
    D: TableDirectory,
    E: ExitBootServicesEvents<D> + ?Sized,
{
    let candidate = resolve(config, ids, volume, pool)?;
    info!("device tree: {} ({} bytes)", candidate.path, candidate.blob.total_size());

    // A failed grow hands the candidate back; dropping it releases it.
    let grown = candidate.blob.grow(config.headroom)?;

    let descriptor = publish(grown, &directory).map_err(|(descriptor, e)| {
        warn!("device tree left unpublished at {:p}", descriptor.data());
        e
    })?;

    let mut report = Report {
        source: candidate.source,
        path: candidate.path,
        fingerprint: descriptor.fingerprint(),
        total_size: descriptor.total_size(),
        unarmed: None,
    };
    if let Err(e) = events.register(Arbiter::arm(descriptor, directory)) {
        warn!("device tree installed, ACPI arbitration disabled: {e}");
        report.unarmed = Some(e);
    }
    Ok(report)
}
