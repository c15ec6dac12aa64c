//! Dependency normalization.
//!
//! Two input shapes are accepted: flat specifier strings as written in
//! `install_requires` (`foo (>=1.2)`, `foo>=1.2,<2; python_version>"3"`) and
//! structured requirement groups as found in wheel metadata
//! (`{"requires": [...], "environment": "..."}`). Both end up as an ordered
//! list of [`DependencySpec`] with names already translated by the injected
//! [`NameConvertor`](crate::naming::NameConvertor). Duplicates are kept.

mod markers;
mod specifier;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Result;
use crate::naming::NameConvertor;
use crate::platform::Platform;

pub use markers::marker_applies;
pub use specifier::{Operator, ParsedRequirement, parse_specifier};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    Requires,
    Provides,
    Conflicts,
}

/// Comparison kept in a normalized constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparison {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
}

impl Comparison {
    pub fn symbol(&self) -> &'static str {
        match self {
            Comparison::Eq => "=",
            Comparison::Ge => ">=",
            Comparison::Le => "<=",
            Comparison::Gt => ">",
            Comparison::Lt => "<",
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constraint {
    pub op: Comparison,
    pub version: String,
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.op, self.version)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencySpec {
    pub relation: Relation,
    pub name: String,
    pub constraint: Option<Constraint>,
}

impl DependencySpec {
    pub fn requires(name: impl Into<String>) -> Self {
        Self {
            relation: Relation::Requires,
            name: name.into(),
            constraint: None,
        }
    }

    /// Manifest tag for this entry, e.g. `BuildRequires >=`.
    pub fn label(&self, kind: DependencyKind) -> String {
        let tag = match (kind, self.relation) {
            (_, Relation::Provides) => "Provides",
            (DependencyKind::Runtime, Relation::Requires) => "Requires",
            (DependencyKind::Runtime, Relation::Conflicts) => "Conflicts",
            (DependencyKind::Build, Relation::Requires) => "BuildRequires",
            (DependencyKind::Build, Relation::Conflicts) => "BuildConflicts",
        };
        match &self.constraint {
            Some(c) => format!("{} {}", tag, c.op),
            None => tag.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyKind {
    Runtime,
    Build,
}

/// Ordered dependency entries tagged with the kind they belong to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyList {
    pub kind: DependencyKind,
    pub specs: Vec<DependencySpec>,
}

impl DependencyList {
    pub fn new(kind: DependencyKind) -> Self {
        Self {
            kind,
            specs: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    /// `(label, name, version)` rows ready for a manifest renderer.
    pub fn rows(&self) -> Vec<(String, String, Option<String>)> {
        self.specs
            .iter()
            .map(|s| {
                (
                    s.label(self.kind),
                    s.name.clone(),
                    s.constraint.as_ref().map(|c| c.version.clone()),
                )
            })
            .collect()
    }
}

/// One group of a structured requirement list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequirementGroup {
    #[serde(default)]
    pub requires: Vec<String>,
    /// Environment marker restricting the whole group.
    #[serde(default)]
    pub environment: Option<String>,
    /// Optional feature the group belongs to; such groups are not installed by default.
    #[serde(default)]
    pub extra: Option<String>,
}

/// Everything the normalizer needs besides its input.
pub struct Normalizer<'a> {
    pub convertor: &'a dyn NameConvertor,
    pub python_version: &'a str,
    pub platform: &'a Platform,
}

impl Normalizer<'_> {
    /// Format (a): flat specifier strings.
    pub fn from_specifiers<S: AsRef<str>>(
        &self,
        specifiers: &[S],
        kind: DependencyKind,
    ) -> Result<DependencyList> {
        let mut list = DependencyList::new(kind);
        for raw in specifiers {
            let raw = raw.as_ref().trim();
            if raw.is_empty() || raw.starts_with('#') {
                continue;
            }
            let parsed = parse_specifier(raw)?;
            if let Some(marker) = &parsed.marker
                && !marker_applies(marker, self.platform)
            {
                continue;
            }
            self.push_parsed(&mut list, parsed);
        }
        Ok(list)
    }

    /// Format (b): structured requirement groups. Groups scoped to an
    /// environment that excludes the target platform, or to an extra, are
    /// dropped before any specifier is parsed.
    pub fn from_requirement_groups(
        &self,
        groups: &[RequirementGroup],
        kind: DependencyKind,
    ) -> Result<DependencyList> {
        let mut list = DependencyList::new(kind);
        for group in groups {
            if group.extra.is_some() {
                continue;
            }
            if let Some(env) = &group.environment
                && !marker_applies(env, self.platform)
            {
                continue;
            }
            let specs = self.from_specifiers(&group.requires, kind)?;
            list.specs.extend(specs.specs);
        }
        Ok(list)
    }

    fn push_parsed(&self, list: &mut DependencyList, parsed: ParsedRequirement) {
        let name = self
            .convertor
            .canonical_name(&parsed.name, self.python_version);
        if parsed.constraints.is_empty() {
            list.specs.push(DependencySpec::requires(name));
            return;
        }
        for (op, version) in parsed.constraints {
            let (relation, op) = match op {
                Operator::NotEqual => (Relation::Conflicts, Comparison::Eq),
                Operator::Equal | Operator::Arbitrary => (Relation::Requires, Comparison::Eq),
                Operator::Compatible | Operator::GreaterEqual => {
                    (Relation::Requires, Comparison::Ge)
                }
                Operator::LessEqual => (Relation::Requires, Comparison::Le),
                Operator::Greater => (Relation::Requires, Comparison::Gt),
                Operator::Less => (Relation::Requires, Comparison::Lt),
            };
            list.specs.push(DependencySpec {
                relation,
                name: name.clone(),
                constraint: Some(Constraint { op, version }),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExtractError;
    use crate::naming::MockNameConvertor;
    use mockall::predicate::eq;

    fn identity() -> MockNameConvertor {
        let mut convertor = MockNameConvertor::new();
        convertor
            .expect_canonical_name()
            .returning(|name, _| name.to_string());
        convertor
    }

    fn triples(list: &DependencyList) -> Vec<(Relation, Option<String>, String)> {
        list.specs
            .iter()
            .map(|s| {
                (
                    s.relation,
                    s.constraint.as_ref().map(|c| c.to_string()),
                    s.name.clone(),
                )
            })
            .collect()
    }

    #[test]
    fn test_install_requires_order_preserved() {
        let convertor = identity();
        let platform = Platform::linux();
        let normalizer = Normalizer {
            convertor: &convertor,
            python_version: "3",
            platform: &platform,
        };

        let list = normalizer
            .from_specifiers(&["a>=1.0", "b"], DependencyKind::Runtime)
            .unwrap();

        assert_eq!(
            triples(&list),
            vec![
                (Relation::Requires, Some(">=1.0".to_string()), "a".to_string()),
                (Relation::Requires, None, "b".to_string()),
            ]
        );
    }

    #[test]
    fn test_operators_map_to_relations() {
        let convertor = identity();
        let platform = Platform::linux();
        let normalizer = Normalizer {
            convertor: &convertor,
            python_version: "3",
            platform: &platform,
        };

        let list = normalizer
            .from_specifiers(&["foo>=1,!=1.5,<2", "bar~=2.1", "baz==3"], DependencyKind::Build)
            .unwrap();

        assert_eq!(
            list.rows(),
            vec![
                ("BuildRequires >=".into(), "foo".into(), Some("1".into())),
                ("BuildConflicts =".into(), "foo".into(), Some("1.5".into())),
                ("BuildRequires <".into(), "foo".into(), Some("2".into())),
                ("BuildRequires >=".into(), "bar".into(), Some("2.1".into())),
                ("BuildRequires =".into(), "baz".into(), Some("3".into())),
            ]
        );
    }

    #[test]
    fn test_names_go_through_convertor() {
        let mut convertor = MockNameConvertor::new();
        convertor
            .expect_canonical_name()
            .with(eq("Foo"), eq("3"))
            .returning(|_, _| "python3-foo".to_string());
        let platform = Platform::linux();
        let normalizer = Normalizer {
            convertor: &convertor,
            python_version: "3",
            platform: &platform,
        };

        let list = normalizer
            .from_specifiers(&["Foo (>=1.2.3)"], DependencyKind::Runtime)
            .unwrap();
        assert_eq!(
            list.rows(),
            vec![(
                "Requires >=".into(),
                "python3-foo".into(),
                Some("1.2.3".into())
            )]
        );
    }

    #[test]
    fn test_duplicates_are_kept() {
        let convertor = identity();
        let platform = Platform::linux();
        let normalizer = Normalizer {
            convertor: &convertor,
            python_version: "3",
            platform: &platform,
        };
        let list = normalizer
            .from_specifiers(&["a", "a"], DependencyKind::Runtime)
            .unwrap();
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_windows_marker_dropped_on_linux() {
        let convertor = identity();
        let platform = Platform::linux();
        let normalizer = Normalizer {
            convertor: &convertor,
            python_version: "3",
            platform: &platform,
        };
        let list = normalizer
            .from_specifiers(
                &["pywin32; sys_platform == 'win32'", "colorama"],
                DependencyKind::Runtime,
            )
            .unwrap();
        assert_eq!(list.rows(), vec![("Requires".into(), "colorama".into(), None)]);
    }

    #[test]
    fn test_requirement_groups_filtering() {
        let convertor = identity();
        let platform = Platform::linux();
        let normalizer = Normalizer {
            convertor: &convertor,
            python_version: "3",
            platform: &platform,
        };
        let groups: Vec<RequirementGroup> = serde_json::from_str(
            r#"[
                {"requires": ["six (>=1.9)"]},
                {"requires": ["pywin32"], "environment": "sys_platform==\"win32\""},
                {"requires": ["pytest"], "extra": "test"},
                {"requires": ["enum34"], "environment": "python_version<\"3.4\""}
            ]"#,
        )
        .unwrap();

        let list = normalizer
            .from_requirement_groups(&groups, DependencyKind::Runtime)
            .unwrap();
        let names: Vec<_> = list.specs.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["six", "enum34"]);
    }

    #[test]
    fn test_malformed_specifier_fails() {
        let convertor = identity();
        let platform = Platform::linux();
        let normalizer = Normalizer {
            convertor: &convertor,
            python_version: "3",
            platform: &platform,
        };
        let err = normalizer
            .from_specifiers(&["foo ?? 1"], DependencyKind::Runtime)
            .unwrap_err();
        assert!(matches!(err, ExtractError::SpecifierParse { .. }));
    }

    #[test]
    fn test_label_for_provides() {
        let spec = DependencySpec {
            relation: Relation::Provides,
            name: "spam".into(),
            constraint: None,
        };
        assert_eq!(spec.label(DependencyKind::Build), "Provides");
    }
}
