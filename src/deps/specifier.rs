use regex::Regex;
use std::str::FromStr;
use std::sync::LazyLock;

use crate::error::{ExtractError, Result};

static NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z0-9](?:[A-Za-z0-9._-]*[A-Za-z0-9])?)\s*(?:\[([^\]]*)\])?\s*(.*)$")
        .expect("valid name regex")
});

static CONSTRAINT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(===|==|!=|~=|>=|<=|>|<)\s*([A-Za-z0-9*+!._-]+)$")
        .expect("valid constraint regex")
});

/// Version comparison as written in a specifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Equal,
    Arbitrary,
    NotEqual,
    GreaterEqual,
    LessEqual,
    Greater,
    Less,
    Compatible,
}

impl FromStr for Operator {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "==" => Ok(Operator::Equal),
            "===" => Ok(Operator::Arbitrary),
            "!=" => Ok(Operator::NotEqual),
            ">=" => Ok(Operator::GreaterEqual),
            "<=" => Ok(Operator::LessEqual),
            ">" => Ok(Operator::Greater),
            "<" => Ok(Operator::Less),
            "~=" => Ok(Operator::Compatible),
            other => Err(format!("unknown operator {:?}", other)),
        }
    }
}

/// A single specifier split into its parts, before name translation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRequirement {
    pub name: String,
    pub extras: Vec<String>,
    pub constraints: Vec<(Operator, String)>,
    pub marker: Option<String>,
}

/// Parse `name`, `name op version[, op version...]` or `name (op version)`,
/// optionally with `[extras]` and a `; marker` suffix.
pub fn parse_specifier(raw: &str) -> Result<ParsedRequirement> {
    let (requirement, marker) = match raw.split_once(';') {
        Some((req, marker)) => {
            let marker = marker.trim();
            (req, (!marker.is_empty()).then(|| marker.to_string()))
        }
        None => (raw, None),
    };

    let caps = NAME_RE
        .captures(requirement.trim())
        .ok_or_else(|| ExtractError::specifier(raw, "missing or invalid project name"))?;
    let name = caps[1].to_string();
    let extras = caps
        .get(2)
        .map(|m| {
            m.as_str()
                .split(',')
                .map(str::trim)
                .filter(|e| !e.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();

    let mut rest = caps.get(3).map_or("", |m| m.as_str()).trim();
    if rest.starts_with('@') {
        // direct URL reference, no version constraint to carry over
        rest = "";
    }
    if let Some(inner) = rest.strip_prefix('(') {
        rest = inner
            .strip_suffix(')')
            .ok_or_else(|| ExtractError::specifier(raw, "unbalanced parenthesis"))?
            .trim();
    }

    let mut constraints = Vec::new();
    if !rest.is_empty() {
        for part in rest.split(',') {
            let part = part.trim();
            let caps = CONSTRAINT_RE.captures(part).ok_or_else(|| {
                ExtractError::specifier(raw, format!("invalid version constraint {:?}", part))
            })?;
            let op = caps[1]
                .parse::<Operator>()
                .map_err(|e| ExtractError::specifier(raw, e))?;
            constraints.push((op, caps[2].to_string()));
        }
    }

    Ok(ParsedRequirement {
        name,
        extras,
        constraints,
        marker,
    })
}
