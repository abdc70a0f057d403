//! # Annotation Resolution
//!
//! Maps prioritized external annotation namespaces onto typed configuration
//! records. Each resolvable record declares a static field-descriptor table
//! (annotation suffix, default value, setter); resolution walks the table
//! and, per field, takes the first `prefix/suffix` key present in the
//! annotation map, falling back to the declared default.
//!
//! Records embedded by composition resolve depth-first before the embedding
//! record's own fields, so an outer record can add fields without
//! redeclaring inherited ones. Only string fields participate here; typed
//! conversion (durations, ints, bools) is a separate per-domain step.
//!
//! Resolution is a pure function over its inputs and has no failure path.

use std::collections::BTreeMap;

/// Raw annotation key/value map from an ingress-style resource.
pub type Annotations = BTreeMap<String, String>;

/// One resolvable string field: its annotation suffix, declared default and
/// a setter into the target record.
pub struct FieldSpec<T> {
    pub suffix: &'static str,
    pub default: &'static str,
    pub set: fn(&mut T, String),
}

/// A record populated from prioritized annotation namespaces.
pub trait ResolveAnnotations: Default {
    /// Field descriptor table for this record's directly declared fields.
    fn fields() -> &'static [FieldSpec<Self>]
    where
        Self: Sized;

    /// Resolve records embedded by composition, depth-first. Returns true
    /// when any embedded field matched an annotation key.
    fn resolve_embedded(&mut self, _annotations: &Annotations, _prefixes: &[String]) -> bool {
        false
    }
}

/// Populate an existing record from the annotation map. Returns true when
/// at least one key matched (as opposed to every field using its default),
/// which callers use to distinguish "not configured" from "all defaults".
pub fn resolve_into<T: ResolveAnnotations + 'static>(
    target: &mut T,
    annotations: &Annotations,
    prefixes: &[String],
) -> bool {
    let mut matched = target.resolve_embedded(annotations, prefixes);
    for spec in T::fields() {
        let mut resolved = false;
        for prefix in prefixes {
            let key = format!("{}/{}", prefix, spec.suffix);
            if let Some(value) = annotations.get(&key) {
                (spec.set)(target, value.clone());
                resolved = true;
                matched = true;
                break;
            }
        }
        if !resolved {
            (spec.set)(target, spec.default.to_string());
        }
    }
    matched
}

/// Look up a single suffix through the prefix list, first hit wins.
pub fn get<'a>(
    annotations: &'a Annotations,
    prefixes: &[String],
    suffix: &str,
) -> Option<&'a str> {
    prefixes
        .iter()
        .find_map(|prefix| annotations.get(&format!("{}/{}", prefix, suffix)))
        .map(String::as_str)
}

/// Resolve a fresh record from the annotation map.
pub fn resolve<T: ResolveAnnotations + 'static>(annotations: &Annotations, prefixes: &[String]) -> (T, bool) {
    let mut target = T::default();
    let matched = resolve_into(&mut target, annotations, prefixes);
    (target, matched)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default, Debug, PartialEq)]
    struct Inner {
        url: String,
        method: String,
    }

    impl ResolveAnnotations for Inner {
        fn fields() -> &'static [FieldSpec<Self>] {
            &[
                FieldSpec { suffix: "auth-url", default: "", set: |t, v| t.url = v },
                FieldSpec { suffix: "auth-method", default: "GET", set: |t, v| t.method = v },
            ]
        }
    }

    #[derive(Default, Debug, PartialEq)]
    struct Outer {
        enable: String,
        inner: Inner,
    }

    impl ResolveAnnotations for Outer {
        fn fields() -> &'static [FieldSpec<Self>] {
            &[FieldSpec { suffix: "auth-enable", default: "true", set: |t, v| t.enable = v }]
        }

        fn resolve_embedded(&mut self, annotations: &Annotations, prefixes: &[String]) -> bool {
            resolve_into(&mut self.inner, annotations, prefixes)
        }
    }

    fn prefixes() -> Vec<String> {
        vec!["alb.ingress.cpaas.io".to_string(), "nginx.ingress.kubernetes.io".to_string()]
    }

    #[test]
    fn test_first_prefix_wins() {
        let mut ann = Annotations::new();
        ann.insert("alb.ingress.cpaas.io/auth-url".into(), "http://ours".into());
        ann.insert("nginx.ingress.kubernetes.io/auth-url".into(), "http://theirs".into());
        let (outer, matched) = resolve::<Outer>(&ann, &prefixes());
        assert!(matched);
        assert_eq!(outer.inner.url, "http://ours");
    }

    #[test]
    fn test_lower_priority_prefix_used_when_higher_absent() {
        let mut ann = Annotations::new();
        ann.insert("nginx.ingress.kubernetes.io/auth-url".into(), "http://theirs".into());
        let (outer, matched) = resolve::<Outer>(&ann, &prefixes());
        assert!(matched);
        assert_eq!(outer.inner.url, "http://theirs");
    }

    #[test]
    fn test_defaults_when_nothing_matches() {
        let (outer, matched) = resolve::<Outer>(&Annotations::new(), &prefixes());
        assert!(!matched);
        assert_eq!(outer.enable, "true");
        assert_eq!(outer.inner.method, "GET");
        assert_eq!(outer.inner.url, "");
    }

    #[test]
    fn test_per_field_override_not_per_record() {
        // One field from the product namespace, another from the community
        // namespace: prefixes are tried per field, not per record.
        let mut ann = Annotations::new();
        ann.insert("alb.ingress.cpaas.io/auth-method".into(), "POST".into());
        ann.insert("nginx.ingress.kubernetes.io/auth-url".into(), "http://theirs".into());
        let (outer, _) = resolve::<Outer>(&ann, &prefixes());
        assert_eq!(outer.inner.method, "POST");
        assert_eq!(outer.inner.url, "http://theirs");
    }
}
