//! Allow-list registry: the ambient globals a sandbox may see

use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, LazyLock};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Names that refer back to the ambient global object itself. No allow-list
/// ever contains them.
pub const GLOBAL_SELF_REFERENCES: [&str; 4] = ["globalThis", "global", "self", "window"];

/// Trust level of an allow-list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    /// The full standard global surface
    Broad,
    /// Numeric sentinels, dates and math only
    #[default]
    Narrow,
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Profile::Broad => write!(f, "broad"),
            Profile::Narrow => write!(f, "narrow"),
        }
    }
}

const BROAD_NAMES: &[&str] = &[
    // Fundamental constructors
    "Object",
    "Function",
    "Array",
    "Number",
    "String",
    "Boolean",
    "Symbol",
    "BigInt",
    "Error",
    "EvalError",
    "RangeError",
    "ReferenceError",
    "SyntaxError",
    "TypeError",
    "URIError",
    "AggregateError",
    // Numeric, date and math utilities
    "NaN",
    "Infinity",
    "isFinite",
    "isNaN",
    "parseFloat",
    "parseInt",
    "Math",
    "Date",
    // Structured text
    "JSON",
    "encodeURI",
    "encodeURIComponent",
    "decodeURI",
    "decodeURIComponent",
    // Promises and microtasks
    "Promise",
    "queueMicrotask",
    // Typed arrays and buffers
    "ArrayBuffer",
    "SharedArrayBuffer",
    "DataView",
    "Int8Array",
    "Uint8Array",
    "Uint8ClampedArray",
    "Int16Array",
    "Uint16Array",
    "Int32Array",
    "Uint32Array",
    "Float32Array",
    "Float64Array",
    "BigInt64Array",
    "BigUint64Array",
    "TextEncoder",
    "TextDecoder",
    // Collections
    "Map",
    "Set",
    "WeakMap",
    "WeakSet",
    // Reflection
    "Reflect",
    "Proxy",
    "Intl",
];

const NARROW_NAMES: &[&str] = &["NaN", "Infinity", "Date", "Math"];

static BROAD: LazyLock<Arc<AllowList>> =
    LazyLock::new(|| Arc::new(AllowList::build(Profile::Broad, BROAD_NAMES.iter().copied())));

static NARROW: LazyLock<Arc<AllowList>> =
    LazyLock::new(|| Arc::new(AllowList::build(Profile::Narrow, NARROW_NAMES.iter().copied())));

/// Immutable set of identifier names that pass through to the ambient realm
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowList {
    profile: Profile,
    names: BTreeSet<String>,
}

impl AllowList {
    /// The shared process-wide list for a profile
    pub fn for_profile(profile: Profile) -> Arc<AllowList> {
        match profile {
            Profile::Broad => BROAD.clone(),
            Profile::Narrow => NARROW.clone(),
        }
    }

    pub fn broad() -> Arc<AllowList> {
        Self::for_profile(Profile::Broad)
    }

    pub fn narrow() -> Arc<AllowList> {
        Self::for_profile(Profile::Narrow)
    }

    /// A list tagged with `profile` holding exactly `names`, minus any global
    /// self reference
    pub fn custom<I, S>(profile: Profile, names: I) -> AllowList
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::build(profile, names)
    }

    /// The profile's names plus `extra`
    pub fn extend<I, S>(profile: Profile, extra: I) -> AllowList
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let base = Self::for_profile(profile);
        let names: Vec<String> = base
            .names
            .iter()
            .cloned()
            .chain(extra.into_iter().map(|s| s.as_ref().to_string()))
            .collect();
        Self::build(profile, names)
    }

    fn build<I, S>(profile: Profile, names: I) -> AllowList
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names = names
            .into_iter()
            .map(|s| s.as_ref().to_string())
            .filter(|name| !is_global_self_reference(name))
            .collect();
        AllowList { profile, names }
    }

    pub fn is_allowed(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Allowed names in sorted order
    pub fn allowed_names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn profile(&self) -> Profile {
        self.profile
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

pub fn is_global_self_reference(name: &str) -> bool {
    GLOBAL_SELF_REFERENCES.contains(&name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_narrow_profile() {
        let list = AllowList::narrow();
        assert_eq!(list.profile(), Profile::Narrow);
        let names: Vec<&str> = list.allowed_names().collect();
        assert_eq!(names, vec!["Date", "Infinity", "Math", "NaN"]);
        assert!(!list.is_allowed("JSON"));
    }

    #[test]
    fn test_broad_profile_covers_required_groups() {
        let list = AllowList::broad();
        for name in ["Object", "Array", "Math", "Date", "JSON", "Promise", "Uint8Array", "Map", "Set"] {
            assert!(list.is_allowed(name), "{} should be allowed", name);
        }
    }

    #[test]
    fn test_no_profile_exposes_global_self_reference() {
        for list in [AllowList::broad(), AllowList::narrow()] {
            for name in GLOBAL_SELF_REFERENCES {
                assert!(!list.is_allowed(name));
            }
        }
    }

    #[test]
    fn test_custom_list_drops_self_reference() {
        let list = AllowList::custom(Profile::Narrow, ["Math", "globalThis", "window"]);
        assert!(list.is_allowed("Math"));
        assert!(!list.is_allowed("globalThis"));
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_extend_appends_to_profile() {
        let list = AllowList::extend(Profile::Narrow, ["JSON", "self"]);
        assert!(list.is_allowed("JSON"));
        assert!(list.is_allowed("Math"));
        assert!(!list.is_allowed("self"));
    }

    #[test]
    fn test_shared_lists_are_the_same_instance() {
        assert!(Arc::ptr_eq(&AllowList::broad(), &AllowList::broad()));
    }

    #[test]
    fn test_profile_serde_names() {
        assert_eq!(serde_json::to_string(&Profile::Broad).unwrap(), "\"broad\"");
        let parsed: Profile = serde_json::from_str("\"narrow\"").unwrap();
        assert_eq!(parsed, Profile::Narrow);
    }
}
