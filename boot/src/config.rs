//! config.rs — loader tunables and the optional `\dtbloader.conf`
//!
//! Format: one `key = value` per line, `#` starts a comment, blank lines
//! are ignored and unknown keys are skipped. Keys:
//!
//! | key               | default                         |
//! |-------------------|---------------------------------|
//! | `dtb_dir`         | `\dtb`                          |
//! | `dtb_ext`         | `dtb`                           |
//! | `override`        | `\MY.dtb`                       |
//! | `override_policy` | `last` (`first`, `disabled`)    |
//! | `headroom`        | `0x400`                         |
//! | `chid_order`      | `3,6,8,10,4,5,7,9,11`           |
//! | `next_stage`      | `grubaa64.efi` / `grubx64.efi`  |
//! | `log_level`       | `info`                          |

use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::str::FromStr;

use log::LevelFilter;

use crate::chid::{ChidKind, DEFAULT_PRIORITY};
use crate::error::LoaderError;

/// Path of the optional config file, relative to the boot volume root.
pub const CONFIG_PATH: &str = "\\dtbloader.conf";

/// Room left for a downstream loader to add nodes (chosen, bootargs, ...).
pub const DEFAULT_HEADROOM: usize = 0x400;
pub const MAX_HEADROOM: usize = 0x10_0000;

#[cfg(target_arch = "aarch64")]
pub const DEFAULT_NEXT_STAGE: &str = "grubaa64.efi";
#[cfg(target_arch = "x86")]
pub const DEFAULT_NEXT_STAGE: &str = "grubia32.efi";
#[cfg(not(any(target_arch = "aarch64", target_arch = "x86")))]
pub const DEFAULT_NEXT_STAGE: &str = "grubx64.efi";

/// When the hardware-independent override file is tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverridePolicy {
    /// Before any CHID candidate (development override).
    First,
    /// Only after every CHID candidate failed.
    Last,
    Disabled,
}

impl FromStr for OverridePolicy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "first" => Ok(OverridePolicy::First),
            "last" => Ok(OverridePolicy::Last),
            "disabled" | "off" | "none" => Ok(OverridePolicy::Disabled),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderConfig {
    pub dtb_dir: String,
    pub dtb_ext: String,
    pub override_path: String,
    pub override_policy: OverridePolicy,
    pub headroom: usize,
    pub chid_order: Vec<ChidKind>,
    /// File name of the chainloaded image, next to our own image.
    pub next_stage: String,
    pub log_level: LevelFilter,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            dtb_dir: "\\dtb".into(),
            dtb_ext: "dtb".into(),
            override_path: "\\MY.dtb".into(),
            override_policy: OverridePolicy::Last,
            headroom: DEFAULT_HEADROOM,
            chid_order: DEFAULT_PRIORITY.to_vec(),
            next_stage: DEFAULT_NEXT_STAGE.into(),
            log_level: LevelFilter::Info,
        }
    }
}

impl LoaderConfig {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, LoaderError> {
        let bytes = bytes.strip_prefix(b"\xef\xbb\xbf").unwrap_or(bytes);
        let text = core::str::from_utf8(bytes)
            .map_err(|_| LoaderError::Config { line: 0, reason: "not UTF-8" })?;
        Self::parse(text)
    }

    /// Apply `text` on top of the defaults.
    pub fn parse(text: &str) -> Result<Self, LoaderError> {
        let mut config = Self::default();
        for (index, raw) in text.lines().enumerate() {
            let line = raw.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let err = |reason| LoaderError::Config { line: index + 1, reason };

            let (key, value) = line.split_once('=').ok_or(err("missing '='"))?;
            let (key, value) = (key.trim(), value.trim());
            match key {
                "dtb_dir" => config.dtb_dir = path(value).ok_or(err("empty dtb_dir"))?,
                "dtb_ext" => {
                    let ext = value.trim_start_matches('.');
                    if ext.is_empty() {
                        return Err(err("empty dtb_ext"));
                    }
                    config.dtb_ext = ext.to_string();
                }
                "override" => config.override_path = path(value).ok_or(err("empty override"))?,
                "override_policy" => {
                    config.override_policy = value.parse().map_err(|_| err("bad override_policy"))?
                }
                "headroom" => {
                    let headroom = parse_number(value).ok_or(err("bad headroom"))?;
                    if headroom > MAX_HEADROOM {
                        return Err(err("headroom too large"));
                    }
                    config.headroom = headroom;
                }
                "chid_order" => config.chid_order = parse_chid_order(value).ok_or(err("bad chid_order"))?,
                "next_stage" => {
                    if value.is_empty() || value.contains('\\') {
                        return Err(err("next_stage must be a bare file name"));
                    }
                    config.next_stage = value.to_string();
                }
                "log_level" => {
                    config.log_level = LevelFilter::from_str(value).map_err(|_| err("bad log_level"))?
                }
                _ => {}
            }
        }
        Ok(config)
    }
}

/// Volume paths are absolute with `\` separators; `/` is accepted.
fn path(value: &str) -> Option<String> {
    if value.is_empty() {
        return None;
    }
    let mut p = value.replace('/', "\\");
    if !p.starts_with('\\') {
        p.insert(0, '\\');
    }
    Some(p)
}

fn parse_number(value: &str) -> Option<usize> {
    match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => usize::from_str_radix(hex, 16).ok(),
        None => value.parse().ok(),
    }
}

fn parse_chid_order(value: &str) -> Option<Vec<ChidKind>> {
    let mut order = Vec::new();
    for item in value.split(',') {
        let kind = ChidKind::from_index(item.trim().parse().ok()?)?;
        if !order.contains(&kind) {
            order.push(kind);
        }
    }
    (!order.is_empty()).then_some(order)
}
