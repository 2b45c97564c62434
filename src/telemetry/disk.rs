use std::ffi::CString;
use std::mem::MaybeUninit;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use super::{read_file, TelemetryError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskUsage {
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub available_bytes: u64,
}

impl DiskUsage {
    /// Percentage as `df` reports it: used / (used + available), rounded up.
    pub fn percent(&self) -> u64 {
        let denominator = self.used_bytes + self.available_bytes;
        if denominator == 0 {
            return 0;
        }
        (self.used_bytes * 100).div_ceil(denominator)
    }
}

/// Usage of the filesystem mounted at `mount`.
///
/// The path has to be listed in `mounts`; a plain directory would silently
/// report the root filesystem while the USB drive is unplugged.
pub fn usage(mounts: &Path, mount: &Path) -> Result<DiskUsage, TelemetryError> {
    if !is_mount_point(&read_file(mounts)?, mount) {
        return Err(TelemetryError::NotMounted(mount.to_path_buf()));
    }
    statvfs(mount)
}

fn is_mount_point(mounts: &str, mount: &Path) -> bool {
    mounts
        .lines()
        .filter_map(|line| line.split_whitespace().nth(1))
        .any(|target| Path::new(&unescape_mount_field(target)) == mount)
}

/// `/proc/self/mounts` escapes whitespace as octal, e.g. `\040` for a space.
fn unescape_mount_field(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut chars = field.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let digits: String = chars.clone().take(3).collect();
        match u8::from_str_radix(&digits, 8) {
            Ok(byte) if digits.len() == 3 => {
                out.push(byte as char);
                chars.nth(2);
            }
            _ => out.push(c),
        }
    }
    out
}

fn statvfs(path: &Path) -> Result<DiskUsage, TelemetryError> {
    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|_| TelemetryError::Unavailable(format!("invalid path {}", path.display())))?;
    let mut stat = MaybeUninit::<libc::statvfs>::uninit();
    // SAFETY: c_path is NUL-terminated and stat points to writable storage
    // for one statvfs struct.
    let rc = unsafe { libc::statvfs(c_path.as_ptr(), stat.as_mut_ptr()) };
    if rc != 0 {
        return Err(TelemetryError::Read {
            path: path.to_path_buf(),
            source: std::io::Error::last_os_error(),
        });
    }
    // SAFETY: statvfs returned 0, so the struct is initialised.
    let stat = unsafe { stat.assume_init() };

    let fragment = stat.f_frsize as u64;
    let total_bytes = stat.f_blocks as u64 * fragment;
    let free_bytes = stat.f_bfree as u64 * fragment;
    Ok(DiskUsage {
        total_bytes,
        used_bytes: total_bytes.saturating_sub(free_bytes),
        available_bytes: stat.f_bavail as u64 * fragment,
    })
}

/// `df -h` style sizes: one decimal below 10, none above (`1.2G`, `29G`).
pub fn size_to_human(bytes: u64) -> String {
    const UNITS: [char; 6] = ['K', 'M', 'G', 'T', 'P', 'E'];
    if bytes < 1024 {
        return format!("{}B", bytes);
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if value < 10.0 {
        format!("{:.1}{}", (value * 10.0).ceil() / 10.0, UNITS[unit])
    } else {
        format!("{:.0}{}", value.ceil(), UNITS[unit])
    }
}
