//! Profile file reader.
//!
//! A profile file holds the baseline options plus any number of profile set
//! definitions. `profileset."name"=option` starts a definition and
//! `profileset."name"+=option` adds another option line to it. Every other
//! line belongs to the baseline.
use std::sync::OnceLock;

use profileset_engine::ProfilesetDefinition;
use regex::Regex;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InputError {
    #[error("line {line}: profileset '{name}' is already defined")]
    Redefined { line: usize, name: String },
    #[error("line {line}: profileset '{name}' must be started with '=' before appending")]
    AppendWithoutDefinition { line: usize, name: String },
    #[error("line {line}: malformed profileset line")]
    Malformed { line: usize },
}

/// Baseline lines and profile set definitions, in file order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProfileFile {
    pub baseline: Vec<String>,
    pub profilesets: Vec<ProfilesetDefinition>,
}

fn profileset_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(r#"^profileset\.(?:"([^"]*)"|([A-Za-z0-9_\-]+))\s*(\+?=)\s*(.*)$"#).ok()
        })
        .as_ref()
}

/// Split profile text into baseline options and profile set definitions.
///
/// # Errors
///
/// Returns an [`InputError`] for repeated definitions, appends to unknown
/// profile sets and `profileset.` lines that do not fit the syntax.
pub fn parse_profile(text: &str) -> Result<ProfileFile, InputError> {
    let mut file = ProfileFile::default();
    for (index, raw) in text.lines().enumerate() {
        let line_no = index + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if !line.starts_with("profileset.") {
            file.baseline.push(line.to_string());
            continue;
        }

        let captures = profileset_pattern()
            .and_then(|pattern| pattern.captures(line))
            .ok_or(InputError::Malformed { line: line_no })?;
        let name = captures
            .get(1)
            .or_else(|| captures.get(2))
            .map_or("", |m| m.as_str())
            .to_string();
        let append = captures.get(3).is_some_and(|m| m.as_str() == "+=");
        let option = captures.get(4).map_or("", |m| m.as_str().trim_end());

        let existing = file
            .profilesets
            .iter_mut()
            .find(|definition| definition.name == name);
        match (existing, append) {
            (Some(definition), true) => push_option(definition, option),
            (None, true) => {
                return Err(InputError::AppendWithoutDefinition {
                    line: line_no,
                    name,
                });
            }
            (Some(_), false) => return Err(InputError::Redefined { line: line_no, name }),
            (None, false) => {
                let mut definition = ProfilesetDefinition::new(name, Vec::<String>::new());
                push_option(&mut definition, option);
                file.profilesets.push(definition);
            }
        }
    }
    Ok(file)
}

fn push_option(definition: &mut ProfilesetDefinition, option: &str) {
    if !option.is_empty() {
        definition.options.push(option.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROFILE: &str = r#"
# baseline
iterations=200
base_dps=10000
crit_rating=500

profileset."reforge_crit"=crit_rating=900
profileset."reforge_haste"=crit_rating=100
profileset."reforge_haste"+=haste_rating=800
profileset.plain=
"#;

    #[test]
    fn splits_baseline_and_definitions() {
        let file = parse_profile(PROFILE).unwrap();
        assert_eq!(
            file.baseline,
            vec!["iterations=200", "base_dps=10000", "crit_rating=500"]
        );
        let names: Vec<&str> = file.profilesets.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["reforge_crit", "reforge_haste", "plain"]);
        assert_eq!(
            file.profilesets[1].options,
            vec!["crit_rating=100", "haste_rating=800"]
        );
        assert!(file.profilesets[2].options.is_empty());
    }

    #[test]
    fn quoted_names_may_contain_spaces_and_be_empty() {
        let file = parse_profile("profileset.\"two words\"=a=1\nprofileset.\"\"=b=2").unwrap();
        assert_eq!(file.profilesets[0].name, "two words");
        assert_eq!(file.profilesets[1].name, "");
    }

    #[test]
    fn rejects_append_before_definition() {
        let err = parse_profile("profileset.\"x\"+=a=1").unwrap_err();
        assert_eq!(
            err,
            InputError::AppendWithoutDefinition {
                line: 1,
                name: "x".to_string()
            }
        );
    }

    #[test]
    fn rejects_redefinition_and_malformed_lines() {
        let err = parse_profile("profileset.x=a=1\nprofileset.x=a=2").unwrap_err();
        assert_eq!(
            err,
            InputError::Redefined {
                line: 2,
                name: "x".to_string()
            }
        );
        assert_eq!(
            parse_profile("profileset.\"open=a=1").unwrap_err(),
            InputError::Malformed { line: 1 }
        );
    }
}
