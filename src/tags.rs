use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;

fn quoted() -> &'static Regex {
    static QUOTED: OnceLock<Regex> = OnceLock::new();
    QUOTED.get_or_init(|| Regex::new(r#""(.+?)""#).expect("quoted tag regex is valid"))
}

/// Splits a raw tag string such as `foo "multi word tag" bar BAR` into a
/// sorted, lower-cased, de-duplicated tag list.
pub fn derive_tags(input: &str) -> Vec<String> {
    let mut tags = BTreeSet::new();

    for caps in quoted().captures_iter(input) {
        tags.insert(caps[1].to_lowercase());
    }

    let residual = quoted().replace_all(input, "");
    for token in residual.split_whitespace() {
        tags.insert(token.to_lowercase());
    }

    tags.into_iter().filter(|tag| !tag.trim().is_empty()).collect()
}
