//! Small helpers shared by the primitives.

use crate::KernelError;

/// Duplicates `name` into a freshly allocated string.
///
/// Every primitive keeps a private copy of its diagnostic name. Allocation
/// failure is reported as [`KernelError::NoMemory`] instead of aborting.
pub fn kstrdup(name: &str) -> Result<String, KernelError> {
    kstrcat(name, "")
}

/// Allocates `prefix` followed by `suffix`.
pub fn kstrcat(prefix: &str, suffix: &str) -> Result<String, KernelError> {
    let mut out = String::new();
    out.try_reserve_exact(prefix.len() + suffix.len())
        .map_err(|_| KernelError::NoMemory)?;
    out.push_str(prefix);
    out.push_str(suffix);
    Ok(out)
}
