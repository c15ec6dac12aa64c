//! Strategy selection, record assembly and the `extract` entry point.
//!
//! A strategy reads everything it needs from the archive while it is open
//! and keeps it; assembly then works on that snapshot alone, so the archive
//! is closed before any overlay runs.

mod setup_py;
mod wheel;

use log::{debug, info};
use regex::Regex;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use crate::archive::{Archive, ArchiveKind};
use crate::config::Settings;
use crate::deps::{
    DependencyKind, DependencyList, DependencySpec, Normalizer, RequirementGroup, marker_applies,
    parse_specifier,
};
use crate::description;
use crate::error::Result;
use crate::naming::NameConvertor;
use crate::overlay::{OverlayPipeline, RegistryOverlay, VenvOverlay};
use crate::platform::Platform;
use crate::record::{MetadataRecord, UNKNOWN};
use crate::registry::RegistryClient;
use crate::sandbox::DescriptorRunner;
use crate::trove::versions_from_trove;

pub use setup_py::SetupPySource;
pub use wheel::{WheelMetadata, WheelSource, parse_metadata_file, parse_record};

static VERSION_SUFFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-?\d\.\d+$").expect("valid version suffix regex"));

/// Requirements as a strategy found them, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum Requirements {
    /// Specifier strings (`install_requires`, `Requires-Dist`).
    Flat(Vec<String>),
    /// Structured groups from JSON wheel metadata.
    Grouped(Vec<RequirementGroup>),
}

impl Requirements {
    /// Whether `name` survives normalization on `platform`.
    fn mentions(&self, name: &str, platform: &Platform) -> bool {
        let applies = |marker: Option<&str>| marker.is_none_or(|m| marker_applies(m, platform));
        let named = |spec: &String| {
            parse_specifier(spec)
                .is_ok_and(|p| p.name.eq_ignore_ascii_case(name) && applies(p.marker.as_deref()))
        };
        match self {
            Requirements::Flat(specs) => specs.iter().any(named),
            Requirements::Grouped(groups) => groups
                .iter()
                .filter(|g| g.extra.is_none() && applies(g.environment.as_deref()))
                .any(|g| g.requires.iter().any(named)),
        }
    }

    /// Add an unconstrained requirement on `name` unless one that applies on
    /// `platform` is already there.
    pub fn ensure(&mut self, name: &str, platform: &Platform) {
        if self.mentions(name, platform) {
            return;
        }
        match self {
            Requirements::Flat(specs) => specs.push(name.to_string()),
            Requirements::Grouped(groups) => groups.push(RequirementGroup {
                requires: vec![name.to_string()],
                ..Default::default()
            }),
        }
    }

    pub fn normalize(
        &self,
        normalizer: &Normalizer<'_>,
        kind: DependencyKind,
    ) -> Result<DependencyList> {
        match self {
            Requirements::Flat(specs) => normalizer.from_specifiers(specs, kind),
            Requirements::Grouped(groups) => normalizer.from_requirement_groups(groups, kind),
        }
    }
}

/// Read-only view every strategy offers over its archive.
pub trait MetadataSource {
    fn runtime_requirements(&self) -> Requirements;
    fn build_requirements(&self) -> Requirements;
    fn packages(&self) -> BTreeSet<String>;
    fn py_modules(&self) -> BTreeSet<String>;
    fn scripts(&self) -> BTreeSet<String>;
    fn home_page(&self) -> String;
    /// Long description, unprocessed.
    fn description(&self) -> String;
    fn summary(&self) -> String;
    fn license(&self) -> String;
    fn classifiers(&self) -> &[String];
    fn has_extension(&self) -> bool;
    fn has_test_suite(&self) -> bool;
    /// Runtime deps must carry `setuptools` (entry points need `pkg_resources`).
    fn runtime_needs_setuptools(&self) -> bool;
    /// Doc file candidates, license files included.
    fn doc_files(&self) -> Vec<String>;

    fn has_pth(&self, name: &str) -> bool {
        name.contains('.')
    }

    fn has_bundled_egg_info(&self) -> bool {
        false
    }

    fn sphinx_dir(&self) -> Option<String> {
        None
    }

    fn versions_declared(&self) -> Vec<String> {
        versions_from_trove(self.classifiers())
    }
}

/// What to resolve.
#[derive(Debug, Clone)]
pub struct ExtractRequest {
    pub local_file: PathBuf,
    pub name: String,
    pub version: String,
    /// Overrides the name produced by the naming convention.
    pub target_name: Option<String>,
    pub enable_registry_overlay: bool,
    pub enable_env_overlay: bool,
    pub base_python_version: String,
}

impl ExtractRequest {
    pub fn new(
        local_file: impl Into<PathBuf>,
        name: impl Into<String>,
        version: impl Into<String>,
        base_python_version: impl Into<String>,
    ) -> Self {
        Self {
            local_file: local_file.into(),
            name: name.into(),
            version: version.into(),
            target_name: None,
            enable_registry_overlay: true,
            enable_env_overlay: true,
            base_python_version: base_python_version.into(),
        }
    }
}

/// Capabilities the engine consumes but does not implement.
#[derive(Clone)]
pub struct Collaborators {
    pub convertor: Arc<dyn NameConvertor>,
    /// Without a client the registry overlay is skipped.
    pub registry: Option<Arc<dyn RegistryClient>>,
    pub runner: Arc<dyn DescriptorRunner>,
    pub settings: Settings,
    pub platform: Platform,
}

pub enum Strategy {
    SetupPy(SetupPySource),
    Wheel(WheelSource),
}

impl Strategy {
    /// Pick the strategy for the archive kind and let it read the archive.
    pub async fn load(
        archive: &mut Archive,
        request: &ExtractRequest,
        runner: &dyn DescriptorRunner,
        settings: &Settings,
    ) -> Result<Self> {
        match archive.kind() {
            ArchiveKind::SourceTree => {
                SetupPySource::load(archive, &request.name, runner, settings)
                    .await
                    .map(Strategy::SetupPy)
            }
            ArchiveKind::Wheel => WheelSource::load(archive, settings).map(Strategy::Wheel),
        }
    }

    pub fn source(&self) -> &dyn MetadataSource {
        match self {
            Strategy::SetupPy(source) => source,
            Strategy::Wheel(source) => source,
        }
    }

    /// Build the base record.
    pub fn assemble(&self, request: &ExtractRequest, deps: &Collaborators) -> Result<MetadataRecord> {
        assemble(self.source(), request, deps)
    }
}

fn or_unknown(value: String) -> String {
    if value.trim().is_empty() {
        UNKNOWN.to_string()
    } else {
        value
    }
}

/// Drop a trailing Python version from script names (`pip3.9` -> `pip`).
pub fn remove_major_minor_suffix(scripts: BTreeSet<String>) -> BTreeSet<String> {
    scripts
        .into_iter()
        .map(|script| {
            let stripped = VERSION_SUFFIX_RE.replace(&script, "").into_owned();
            if stripped.is_empty() { script } else { stripped }
        })
        .collect()
}

/// Partition doc files into (other, license) by case-insensitive marker match.
pub fn split_license_files<S: AsRef<str>>(
    doc_files: Vec<String>,
    markers: &[S],
) -> (Vec<String>, Vec<String>) {
    doc_files.into_iter().partition(|doc| {
        let lower = doc.to_lowercase();
        !markers
            .iter()
            .any(|m| lower.contains(&m.as_ref().to_lowercase()))
    })
}

/// Base python version and the additional ones.
fn resolve_versions(declared: Vec<String>, requested: &str, settings: &Settings) -> (String, Vec<String>) {
    if declared.is_empty() {
        return (
            requested.to_string(),
            settings.default_additional_versions.clone(),
        );
    }
    let base = if declared.iter().any(|v| v == requested) {
        requested.to_string()
    } else {
        declared[0].clone()
    };
    let others = declared.into_iter().filter(|v| *v != base).collect();
    (base, others)
}

pub fn assemble(
    source: &dyn MetadataSource,
    request: &ExtractRequest,
    deps: &Collaborators,
) -> Result<MetadataRecord> {
    let settings = &deps.settings;
    let (base_python_version, python_versions) = resolve_versions(
        source.versions_declared(),
        &request.base_python_version,
        settings,
    );
    let target_name = request.target_name.clone().unwrap_or_else(|| {
        deps.convertor
            .canonical_name(&request.name, &base_python_version)
    });
    let mut record = MetadataRecord::new(
        &request.local_file,
        &request.name,
        target_name,
        &request.version,
    );

    let normalizer = Normalizer {
        convertor: deps.convertor.as_ref(),
        python_version: &base_python_version,
        platform: &deps.platform,
    };
    let mut runtime_requirements = source.runtime_requirements();
    if source.runtime_needs_setuptools() {
        runtime_requirements.ensure("setuptools", &deps.platform);
    }
    record.runtime_deps = runtime_requirements.normalize(&normalizer, DependencyKind::Runtime)?;

    let mut build_requirements = source.build_requirements();
    build_requirements.ensure("setuptools", &deps.platform);
    let mut build_deps = DependencyList::new(DependencyKind::Build);
    build_deps
        .specs
        .push(DependencySpec::requires(&settings.baseline_build_dep));
    build_deps.specs.extend(
        build_requirements
            .normalize(&normalizer, DependencyKind::Build)?
            .specs,
    );
    record.sphinx_dir = source.sphinx_dir();
    if record.sphinx_dir.is_some() {
        build_deps
            .specs
            .push(DependencySpec::requires(&settings.docs_build_dep));
    }
    record.build_deps = build_deps;

    record.py_modules = source.py_modules();
    record.scripts = remove_major_minor_suffix(source.scripts());
    record.home_page = or_unknown(source.home_page());
    record.summary = or_unknown(source.summary());
    record.license = or_unknown(source.license());
    record.description = description::process(
        &source.description(),
        settings.wrap_width,
        settings.description_cut,
    );

    record.has_extension = source.has_extension();
    record.has_test_suite = source.has_test_suite();
    record.has_pth = source.has_pth(&request.name);
    record.has_bundled_egg_info = source.has_bundled_egg_info();

    record.packages = source.packages();
    record.has_packages = !record.packages.is_empty();
    if record.packages.is_empty() {
        debug!("No packages declared, falling back to {}", request.name);
        record.packages.insert(request.name.clone());
    }

    let (doc_files, doc_license) =
        split_license_files(source.doc_files(), &settings.license_markers);
    record.doc_files = doc_files;
    record.doc_license = doc_license;

    record.base_python_version = base_python_version;
    record.python_versions = python_versions;
    Ok(record)
}

/// Resolve the full record for one archive: strategy, then overlays.
#[tracing::instrument(skip_all, fields(file = ?request.local_file))]
pub async fn extract(request: ExtractRequest, deps: Collaborators) -> Result<MetadataRecord> {
    let mut archive = Archive::open(&request.local_file)?;
    info!("Extracting metadata from {:?} ({:?})", archive.path(), archive.kind());
    let strategy = Strategy::load(&mut archive, &request, deps.runner.as_ref(), &deps.settings).await;
    archive.close();
    let record = strategy?.assemble(&request, &deps)?;

    let mut pipeline = OverlayPipeline::new();
    if request.enable_registry_overlay {
        match &deps.registry {
            Some(client) => pipeline.push(Box::new(RegistryOverlay::new(
                Arc::clone(client),
                deps.settings.clone(),
            ))),
            None => debug!("No registry client, skipping registry metadata"),
        }
    }
    if request.enable_env_overlay {
        pipeline.push(Box::new(VenvOverlay::from_settings(&deps.settings)));
    }
    Ok(pipeline.run(record).await)
}

/// `(name, version)` from a conventional archive file name, e.g.
/// `spam-1.0.tar.gz` or `spam-1.0-py3-none-any.whl`.
pub fn guess_name_version(path: &Path) -> Option<(String, String)> {
    let file_name = path.file_name()?.to_str()?;
    let lower = file_name.to_lowercase();
    if lower.ends_with(".whl") {
        let mut parts = file_name[..file_name.len() - 4].split('-');
        let name = parts.next()?;
        let version = parts.next()?;
        return Some((name.to_string(), version.to_string()));
    }
    let stem = [".tar.gz", ".tgz", ".zip"]
        .iter()
        .find(|ext| lower.ends_with(*ext))
        .map(|ext| &file_name[..file_name.len() - ext.len()])?;
    let (name, version) = stem.rsplit_once('-')?;
    if name.is_empty() || version.is_empty() {
        return None;
    }
    Some((name.to_string(), version.to_string()))
}
