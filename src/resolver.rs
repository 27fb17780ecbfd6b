// File: ./src/resolver.rs
//! Resolves view source references to document identities.
//!
//! Two forms are accepted:
//! - a plain document path (`Trips/Japan.md`), which must exist;
//! - a symbolic reference (`[[Japan]]`, `[[Trips/Japan]]`, `[[Japan|alias]]`),
//!   matched by base name against every known document.
//!
//! For symbolic references an exact "parent path + base name" match wins over
//! a base-name-only match. The parent path is the one written in the
//! reference, or the folder of the document hosting the view when the
//! reference names no folder.
use crate::error::ResolutionError;
use crate::store::DOCUMENT_EXTENSION;

/// The inner target of a `[[...]]` reference, without alias or heading.
pub fn symbolic_target(reference: &str) -> Option<&str> {
    let inner = reference.trim().strip_prefix("[[")?.strip_suffix("]]")?;
    let inner = inner.split('|').next().unwrap_or(inner);
    let inner = inner.split('#').next().unwrap_or(inner);
    let inner = inner.trim();
    if inner.is_empty() { None } else { Some(inner) }
}

pub fn is_symbolic(reference: &str) -> bool {
    let r = reference.trim();
    r.starts_with("[[") && r.ends_with("]]")
}

fn strip_extension(path: &str) -> &str {
    path.strip_suffix(&format!(".{}", DOCUMENT_EXTENSION))
        .unwrap_or(path)
}

fn base_name(path: &str) -> &str {
    let stem = strip_extension(path);
    stem.rsplit('/').next().unwrap_or(stem)
}

fn parent_of(path: &str) -> Option<&str> {
    path.rsplit_once('/').map(|(parent, _)| parent)
}

/// Resolves one source entry of a view spec.
///
/// `host` is the document the view is embedded in; `documents` is the full set
/// of known document identities.
pub fn resolve(
    reference: &str,
    host: &str,
    documents: &[String],
) -> Result<String, ResolutionError> {
    if !is_symbolic(reference) {
        let path = reference.trim();
        return if documents.iter().any(|d| d == path) {
            Ok(path.to_string())
        } else {
            Err(ResolutionError::NotFound(path.to_string()))
        };
    }

    let target = symbolic_target(reference)
        .ok_or_else(|| ResolutionError::NotFound(reference.to_string()))?;
    let target = strip_extension(target);

    let exact = match parent_of(target) {
        Some(_) => format!("{}.{}", target, DOCUMENT_EXTENSION),
        None => match parent_of(host) {
            Some(folder) => format!("{}/{}.{}", folder, target, DOCUMENT_EXTENSION),
            None => format!("{}.{}", target, DOCUMENT_EXTENSION),
        },
    };
    if let Some(doc) = documents.iter().find(|d| **d == exact) {
        return Ok(doc.clone());
    }

    let wanted = base_name(target);
    let candidates: Vec<String> = documents
        .iter()
        .filter(|d| base_name(d) == wanted)
        .cloned()
        .collect();

    match candidates.len() {
        0 => Err(ResolutionError::NotFound(reference.to_string())),
        1 => Ok(candidates.into_iter().next().unwrap_or_default()),
        _ => Err(ResolutionError::Ambiguous {
            reference: reference.to_string(),
            candidates,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn docs(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_symbolic_target_strips_alias_and_heading() {
        assert_eq!(symbolic_target("[[Trip Plan]]"), Some("Trip Plan"));
        assert_eq!(symbolic_target("[[Trips/Japan|the trip]]"), Some("Trips/Japan"));
        assert_eq!(symbolic_target("[[Japan#Day 1]]"), Some("Japan"));
        assert_eq!(symbolic_target("[[ ]]"), None);
        assert_eq!(symbolic_target("Japan.md"), None);
    }

    #[test]
    fn test_plain_paths_must_exist() {
        let all = docs(&["trip.md"]);
        assert_eq!(resolve("trip.md", "home.md", &all).unwrap(), "trip.md");
        assert_eq!(
            resolve("nope.md", "home.md", &all),
            Err(ResolutionError::NotFound("nope.md".to_string()))
        );
    }

    #[test]
    fn test_unique_base_name() {
        let all = docs(&["Home.md", "Trips/Japan.md"]);
        assert_eq!(resolve("[[Japan]]", "Home.md", &all).unwrap(), "Trips/Japan.md");
        assert_eq!(resolve("[[Japan.md]]", "Home.md", &all).unwrap(), "Trips/Japan.md");
    }

    #[test]
    fn test_exact_match_beats_base_name() {
        let all = docs(&["A/Trip Plan.md", "B/Trip Plan.md"]);
        // Written path
        assert_eq!(resolve("[[B/Trip Plan]]", "Home.md", &all).unwrap(), "B/Trip Plan.md");
        // Host folder
        assert_eq!(resolve("[[Trip Plan]]", "A/Index.md", &all).unwrap(), "A/Trip Plan.md");
    }

    #[test]
    fn test_ambiguous_reference_is_named() {
        let all = docs(&["A/Trip Plan.md", "B/Trip Plan.md", "Home.md"]);
        match resolve("[[Trip Plan]]", "Home.md", &all) {
            Err(ResolutionError::Ambiguous { reference, candidates }) => {
                assert_eq!(reference, "[[Trip Plan]]");
                assert_eq!(candidates.len(), 2);
            }
            other => panic!("expected ambiguity, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_reference() {
        let all = docs(&["Home.md"]);
        assert_eq!(
            resolve("[[Nowhere]]", "Home.md", &all),
            Err(ResolutionError::NotFound("[[Nowhere]]".to_string()))
        );
    }
}
