//! The canonical metadata record and the rules overlays follow to update it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::deps::{DependencyKind, DependencyList};

/// Sentinel for text fields nobody could resolve.
pub const UNKNOWN: &str = "TODO:";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeMode {
    /// Write only fields still at their sentinel or default value.
    SetIfMissing,
    /// The incoming value always wins.
    ForceUpdate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub local_file: PathBuf,
    pub name: String,
    pub target_name: String,
    pub version: String,

    pub runtime_deps: DependencyList,
    pub build_deps: DependencyList,

    pub packages: BTreeSet<String>,
    pub py_modules: BTreeSet<String>,
    pub scripts: BTreeSet<String>,

    pub home_page: String,
    pub summary: String,
    pub description: String,
    pub license: String,
    /// Download URL reported by the registry.
    pub url: String,
    pub checksum: String,

    pub has_extension: bool,
    pub has_test_suite: bool,
    pub has_pth: bool,
    pub has_packages: bool,
    pub has_bundled_egg_info: bool,

    pub doc_files: Vec<String>,
    pub doc_license: Vec<String>,
    /// Root-relative documentation source dir, when one with `conf.py` exists.
    pub sphinx_dir: Option<String>,

    pub base_python_version: String,
    pub python_versions: Vec<String>,
}

impl MetadataRecord {
    /// A record with identity filled in and every other field at its default.
    pub fn new(
        local_file: impl Into<PathBuf>,
        name: impl Into<String>,
        target_name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            local_file: local_file.into(),
            name: name.into(),
            target_name: target_name.into(),
            version: version.into(),
            runtime_deps: DependencyList::new(DependencyKind::Runtime),
            build_deps: DependencyList::new(DependencyKind::Build),
            packages: BTreeSet::new(),
            py_modules: BTreeSet::new(),
            scripts: BTreeSet::new(),
            home_page: UNKNOWN.to_string(),
            summary: UNKNOWN.to_string(),
            description: UNKNOWN.to_string(),
            license: UNKNOWN.to_string(),
            url: UNKNOWN.to_string(),
            checksum: UNKNOWN.to_string(),
            has_extension: false,
            has_test_suite: false,
            has_pth: false,
            has_packages: false,
            has_bundled_egg_info: false,
            doc_files: Vec::new(),
            doc_license: Vec::new(),
            sphinx_dir: None,
            base_python_version: String::new(),
            python_versions: Vec::new(),
        }
    }

    /// Apply every field present in `update` according to `mode`.
    pub fn merge(&mut self, update: RecordUpdate, mode: MergeMode) {
        let packages_touched = update.packages.is_some();
        merge_field(&mut self.home_page, update.home_page, mode);
        merge_field(&mut self.summary, update.summary, mode);
        merge_field(&mut self.description, update.description, mode);
        merge_field(&mut self.license, update.license, mode);
        merge_field(&mut self.url, update.url, mode);
        merge_field(&mut self.checksum, update.checksum, mode);
        merge_field(&mut self.runtime_deps, update.runtime_deps, mode);
        merge_field(&mut self.build_deps, update.build_deps, mode);
        merge_field(&mut self.packages, update.packages, mode);
        merge_field(&mut self.py_modules, update.py_modules, mode);
        merge_field(&mut self.scripts, update.scripts, mode);
        merge_field(&mut self.has_extension, update.has_extension, mode);
        merge_field(&mut self.has_test_suite, update.has_test_suite, mode);
        merge_field(&mut self.has_pth, update.has_pth, mode);
        merge_field(&mut self.doc_files, update.doc_files, mode);
        merge_field(&mut self.doc_license, update.doc_license, mode);
        if packages_touched {
            self.has_packages = !self.packages.is_empty();
        }
    }
}

/// Partial record produced by an overlay. `None` means "not touched".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordUpdate {
    pub home_page: Option<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub license: Option<String>,
    pub url: Option<String>,
    pub checksum: Option<String>,
    pub runtime_deps: Option<DependencyList>,
    pub build_deps: Option<DependencyList>,
    pub packages: Option<BTreeSet<String>>,
    pub py_modules: Option<BTreeSet<String>>,
    pub scripts: Option<BTreeSet<String>>,
    pub has_extension: Option<bool>,
    pub has_test_suite: Option<bool>,
    pub has_pth: Option<bool>,
    pub doc_files: Option<Vec<String>>,
    pub doc_license: Option<Vec<String>>,
}

impl RecordUpdate {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Whether a field still holds its "nothing resolved" value.
trait Unresolved {
    fn is_unresolved(&self) -> bool;
}

impl Unresolved for String {
    fn is_unresolved(&self) -> bool {
        self == UNKNOWN
    }
}

impl Unresolved for bool {
    fn is_unresolved(&self) -> bool {
        !*self
    }
}

impl<T> Unresolved for Vec<T> {
    fn is_unresolved(&self) -> bool {
        self.is_empty()
    }
}

impl<T> Unresolved for BTreeSet<T> {
    fn is_unresolved(&self) -> bool {
        self.is_empty()
    }
}

impl Unresolved for DependencyList {
    fn is_unresolved(&self) -> bool {
        self.is_empty()
    }
}

fn merge_field<T: Unresolved>(slot: &mut T, value: Option<T>, mode: MergeMode) {
    let Some(value) = value else {
        return;
    };
    match mode {
        MergeMode::ForceUpdate => *slot = value,
        MergeMode::SetIfMissing if slot.is_unresolved() => *slot = value,
        MergeMode::SetIfMissing => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deps::DependencySpec;

    fn record() -> MetadataRecord {
        MetadataRecord::new("/tmp/spam-1.0.tar.gz", "spam", "python3-spam", "1.0")
    }

    #[test]
    fn test_new_record_has_sentinels() {
        let record = record();
        assert_eq!(record.home_page, UNKNOWN);
        assert_eq!(record.license, UNKNOWN);
        assert!(record.packages.is_empty());
        assert_eq!(record.build_deps.kind, DependencyKind::Build);
    }

    #[test]
    fn test_force_update_overwrites_resolved_fields() {
        let mut record = record();
        record.home_page = "https://spam.example".into();
        record.has_extension = true;
        record.scripts.insert("spam".into());

        record.merge(
            RecordUpdate {
                home_page: Some("https://eggs.example".into()),
                has_extension: Some(false),
                scripts: Some(BTreeSet::from(["eggs".to_string()])),
                ..Default::default()
            },
            MergeMode::ForceUpdate,
        );

        assert_eq!(record.home_page, "https://eggs.example");
        assert!(!record.has_extension);
        assert_eq!(record.scripts, BTreeSet::from(["eggs".to_string()]));
    }

    #[test]
    fn test_set_if_missing_never_overwrites_resolved_fields() {
        let mut record = record();
        record.home_page = "https://spam.example".into();
        record.doc_files = vec!["README.rst".into()];
        record
            .runtime_deps
            .specs
            .push(DependencySpec::requires("python3-six"));
        let before = record.clone();

        record.merge(
            RecordUpdate {
                home_page: Some("https://eggs.example".into()),
                doc_files: Some(vec!["NEWS".into()]),
                runtime_deps: Some(DependencyList::new(DependencyKind::Runtime)),
                ..Default::default()
            },
            MergeMode::SetIfMissing,
        );

        assert_eq!(record, before);
    }

    #[test]
    fn test_set_if_missing_fills_unresolved_fields() {
        let mut record = record();
        record.merge(
            RecordUpdate {
                summary: Some("Spam".into()),
                has_test_suite: Some(true),
                packages: Some(BTreeSet::from(["spam".to_string()])),
                ..Default::default()
            },
            MergeMode::SetIfMissing,
        );

        assert_eq!(record.summary, "Spam");
        assert!(record.has_test_suite);
        assert!(record.has_packages);
    }

    #[test]
    fn test_untouched_fields_stay() {
        let mut record = record();
        record.license = "MIT".into();
        record.merge(
            RecordUpdate {
                url: Some("https://files.example/spam.tar.gz".into()),
                ..Default::default()
            },
            MergeMode::ForceUpdate,
        );
        assert_eq!(record.license, "MIT");
        assert_eq!(record.url, "https://files.example/spam.tar.gz");
        assert!(RecordUpdate::default().is_empty());
    }
}
