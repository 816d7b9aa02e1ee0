//! ui.rs — console output around the log stream
//!
//! The banner and failure block go straight to ConOut; everything else
//! goes through `log`.

use core::fmt::{Display, Write};

use uefi::proto::console::text::Color;
use uefi::table::{Boot, SystemTable};

/// Boot splash with the crate version.
pub fn draw_banner(st: &mut SystemTable<Boot>) {
    let out = st.stdout();

    let _ = out.set_color(Color::LightCyan, Color::Black);
    let _ = write!(
        out,
        "\r\n  dtbloader {} :: device tree selection + DT/ACPI arbitration\r\n\r\n",
        env!("CARGO_PKG_VERSION")
    );
    let _ = out.set_color(Color::LightGray, Color::Black);
}

/// Red failure block. The boot carries on afterwards.
pub fn display_failure(st: &mut SystemTable<Boot>, what: &str, reason: &dyn Display) {
    let out = st.stdout();

    let _ = out.set_color(Color::Red, Color::Black);
    let _ = write!(out, "\r\n---------------- {what} ----------------\r\n");
    let _ = write!(out, "[!]: {reason}\r\n");
    let _ = out.set_color(Color::LightGray, Color::Black);
}
