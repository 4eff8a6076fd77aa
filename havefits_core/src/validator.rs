//! Input screening for a batch: base location shape and item name suffixes.
//!
//! Nothing in here touches the network or the filesystem.

use url::Url;

/// Accepted item suffixes (the FITS family), compared case-insensitively.
pub const ACCEPTED_SUFFIXES: [&str; 2] = [".fit", ".fits"];

/// Header line of the aggregated rejected-names diagnostic.
pub const REJECTED_HEADER: &str =
    "The following files are not FITS files and will not be downloaded:";

/// Returns true when `base` parses as a URL with a non-empty scheme and a
/// non-empty network location written out as `scheme://authority`.
pub fn validate_base(base: &str) -> bool {
    // The URL parser fills in a host for `http:example.org`; the authority
    // has to be spelled out.
    let has_authority = base
        .split_once(':')
        .is_some_and(|(_, rest)| rest.starts_with("//"));
    if !has_authority {
        return false;
    }
    match Url::parse(base) {
        Ok(url) => !url.scheme().is_empty() && url.host_str().is_some_and(|h| !h.is_empty()),
        Err(_) => false,
    }
}

/// Returns true when the lowercased name ends with an accepted suffix.
pub fn validate_item_name(name: &str) -> bool {
    let lower = name.to_lowercase();
    ACCEPTED_SUFFIXES.iter().any(|suffix| lower.ends_with(suffix))
}

/// Splits candidate names into `(valid, rejected)`, keeping input order and
/// duplicates on both sides.
pub fn partition_names<S: AsRef<str>>(names: &[S]) -> (Vec<String>, Vec<String>) {
    let mut valid = Vec::new();
    let mut rejected = Vec::new();
    for name in names {
        let name = name.as_ref();
        if validate_item_name(name) {
            valid.push(name.to_string());
        } else {
            rejected.push(name.to_string());
        }
    }
    (valid, rejected)
}

/// Joins a base location and an item name with path-join semantics: the name
/// is appended, never resolved against the last path segment.
pub fn compose_source_url(base: &str, name: &str) -> String {
    if base.ends_with('/') {
        format!("{}{}", base, name)
    } else {
        format!("{}/{}", base, name)
    }
}

/// Renders the one diagnostic covering every rejected name, or `None` when
/// nothing was rejected.
pub fn rejected_names_diagnostic(rejected: &[String]) -> Option<String> {
    if rejected.is_empty() {
        return None;
    }
    Some(format!("{}\n{}", REJECTED_HEADER, rejected.join("\n")))
}
