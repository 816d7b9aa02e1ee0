//! chainload.rs — where the next stage lives
//!
//! The next stage sits in the same directory as our own image; only the
//! final path component changes.

use alloc::string::String;

/// `own` with its last `\` component replaced by `next`. A bare file name
/// is replaced as a whole.
pub fn sibling_path(own: &str, next: &str) -> String {
    let own = own.replace('/', "\\");
    let dir = match own.rfind('\\') {
        Some(pos) => &own[..=pos],
        None => "",
    };
    let mut path = String::with_capacity(dir.len() + next.len());
    path.push_str(dir);
    path.push_str(next);
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_last_component() {
        assert_eq!(sibling_path("\\EFI\\BOOT\\dtbloader.efi", "grubaa64.efi"), "\\EFI\\BOOT\\grubaa64.efi");
        assert_eq!(sibling_path("\\dtbloader.efi", "grubaa64.efi"), "\\grubaa64.efi");
    }

    #[test]
    fn bare_name_is_replaced() {
        assert_eq!(sibling_path("dtbloader.efi", "grubx64.efi"), "grubx64.efi");
    }

    #[test]
    fn forward_slashes_are_normalized() {
        assert_eq!(sibling_path("/EFI/debian/dtbloader.efi", "shimaa64.efi"), "\\EFI\\debian\\shimaa64.efi");
    }
}
