//! Trove classifier helpers.

use std::collections::BTreeSet;

const LICENSE_PREFIX: &str = "License :: ";
const PYTHON_PREFIX: &str = "Programming Language :: Python :: ";

/// Last classifier segment -> short license name.
const LICENSES: &[(&str, &str)] = &[
    ("Academic Free License (AFL)", "AFL"),
    ("Apache Software License", "ASL 2.0"),
    ("Apache License 2.0", "ASL 2.0"),
    ("Artistic License", "Artistic"),
    ("BSD License", "BSD"),
    ("Boost Software License 1.0 (BSL-1.0)", "Boost"),
    ("CC0 1.0 Universal (CC0 1.0) Public Domain Dedication", "CC0"),
    ("Common Public License", "CPL"),
    ("Eclipse Public License 1.0 (EPL-1.0)", "EPL-1.0"),
    ("Eclipse Public License 2.0 (EPL-2.0)", "EPL-2.0"),
    ("GNU Affero General Public License v3", "AGPLv3"),
    (
        "GNU Affero General Public License v3 or later (AGPLv3+)",
        "AGPLv3+",
    ),
    ("GNU Free Documentation License (FDL)", "GFDL"),
    ("GNU General Public License (GPL)", "GPL"),
    ("GNU General Public License v2 (GPLv2)", "GPLv2"),
    ("GNU General Public License v2 or later (GPLv2+)", "GPLv2+"),
    ("GNU General Public License v3 (GPLv3)", "GPLv3"),
    ("GNU General Public License v3 or later (GPLv3+)", "GPLv3+"),
    ("GNU Lesser General Public License v2 (LGPLv2)", "LGPLv2"),
    (
        "GNU Lesser General Public License v2 or later (LGPLv2+)",
        "LGPLv2+",
    ),
    ("GNU Lesser General Public License v3 (LGPLv3)", "LGPLv3"),
    (
        "GNU Lesser General Public License v3 or later (LGPLv3+)",
        "LGPLv3+",
    ),
    ("GNU Library or Lesser General Public License (LGPL)", "LGPL"),
    ("ISC License (ISCL)", "ISC"),
    ("MIT License", "MIT"),
    ("MIT No Attribution License (MIT-0)", "MIT-0"),
    ("Mozilla Public License 1.1 (MPL 1.1)", "MPLv1.1"),
    ("Mozilla Public License 2.0 (MPL 2.0)", "MPLv2.0"),
    ("Python Software Foundation License", "Python"),
    ("Zope Public License", "ZPL"),
    ("zlib/libpng License", "zlib"),
    ("Public Domain", "Public Domain"),
    ("The Unlicense (Unlicense)", "Unlicense"),
];

/// License implied by the classifiers, when they agree on exactly one.
///
/// Any license classifier without a known mapping (including the umbrella
/// `License :: OSI Approved`) makes the answer ambiguous.
pub fn license_from_trove<S: AsRef<str>>(classifiers: &[S]) -> Option<String> {
    let mut found = BTreeSet::new();
    for classifier in classifiers {
        let Some(rest) = classifier.as_ref().trim().strip_prefix(LICENSE_PREFIX) else {
            continue;
        };
        let leaf = rest.rsplit(" :: ").next().unwrap_or(rest);
        match LICENSES.iter().find(|(trove, _)| *trove == leaf) {
            Some((_, short)) => {
                found.insert(*short);
            }
            None if rest == "OSI Approved" => {}
            None => return None,
        }
    }
    if found.len() == 1 {
        found.into_iter().next().map(str::to_string)
    } else {
        None
    }
}

/// Python major versions declared by the classifiers, ascending.
pub fn versions_from_trove<S: AsRef<str>>(classifiers: &[S]) -> Vec<String> {
    let versions: BTreeSet<String> = classifiers
        .iter()
        .filter_map(|c| c.as_ref().trim().strip_prefix(PYTHON_PREFIX))
        .filter_map(|v| v.split(['.', ' ']).next())
        .filter(|major| !major.is_empty() && major.chars().all(|c| c.is_ascii_digit()))
        .map(str::to_string)
        .collect();
    versions.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_license() {
        let classifiers = [
            "Development Status :: 5 - Production/Stable",
            "License :: OSI Approved :: MIT License",
        ];
        assert_eq!(license_from_trove(&classifiers).as_deref(), Some("MIT"));
    }

    #[test]
    fn test_umbrella_classifier_is_ignored() {
        let classifiers = ["License :: OSI Approved", "License :: OSI Approved :: BSD License"];
        assert_eq!(license_from_trove(&classifiers).as_deref(), Some("BSD"));
    }

    #[test]
    fn test_ambiguous_licenses() {
        let dual = [
            "License :: OSI Approved :: MIT License",
            "License :: OSI Approved :: Apache Software License",
        ];
        assert_eq!(license_from_trove(&dual), None);

        let unknown = ["License :: Other/Proprietary License"];
        assert_eq!(license_from_trove(&unknown), None);

        let none: [&str; 0] = [];
        assert_eq!(license_from_trove(&none), None);
    }

    #[test]
    fn test_versions() {
        let classifiers = [
            "Programming Language :: Python :: 3.11",
            "Programming Language :: Python :: 2.7",
            "Programming Language :: Python :: 3",
            "Programming Language :: Python :: 3 :: Only",
            "Programming Language :: Python :: Implementation :: CPython",
        ];
        assert_eq!(versions_from_trove(&classifiers), vec!["2", "3"]);
    }
}
