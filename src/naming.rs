//! Naming convention capability.
//!
//! The engine never decides how a source package name maps to a
//! distribution package name; it asks a [`NameConvertor`]. The CLI uses
//! [`DistroNameConvertor`], library callers may inject their own.

/// Maps a source package name to a canonical target name.
#[cfg_attr(test, mockall::automock)]
pub trait NameConvertor: Send + Sync {
    fn canonical_name(&self, raw_name: &str, python_version: &str) -> String;
}

/// `python<version>-<normalized name>`, the convention used by Fedora-like
/// distributions. Names are lowercased and runs of `-`, `_`, `.` collapse
/// to a single `-`.
#[derive(Debug, Clone, Default)]
pub struct DistroNameConvertor;

impl DistroNameConvertor {
    fn normalize(raw: &str) -> String {
        let mut out = String::with_capacity(raw.len());
        let mut pending_dash = false;
        for c in raw.trim().chars() {
            if matches!(c, '-' | '_' | '.') {
                pending_dash = !out.is_empty();
                continue;
            }
            if pending_dash {
                out.push('-');
                pending_dash = false;
            }
            out.extend(c.to_lowercase());
        }
        out
    }
}

impl NameConvertor for DistroNameConvertor {
    fn canonical_name(&self, raw_name: &str, python_version: &str) -> String {
        let name = Self::normalize(raw_name);
        let name = name
            .strip_prefix("python-")
            .or_else(|| name.strip_prefix("py-"))
            .unwrap_or(&name);
        let major = python_version.split('.').next().unwrap_or(python_version);
        format!("python{}-{}", major, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distro_names() {
        let convertor = DistroNameConvertor;
        assert_eq!(convertor.canonical_name("Django", "3"), "python3-django");
        assert_eq!(
            convertor.canonical_name("zope.interface", "3.12"),
            "python3-zope-interface"
        );
        assert_eq!(
            convertor.canonical_name("python-dateutil", "3"),
            "python3-dateutil"
        );
        assert_eq!(convertor.canonical_name("Foo__Bar", "2"), "python2-foo-bar");
    }
}
