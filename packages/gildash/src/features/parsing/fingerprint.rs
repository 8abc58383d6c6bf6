//! Symbol shape fingerprints
//!
//! A fingerprint digests the shape-relevant fields of a declaration: kind,
//! name, signature, exportedness, and the structural lists in `detail`
//! (heritage, members, parameters, return type, decorators). Spans never
//! participate, so moving a declaration within its file keeps the
//! fingerprint stable while any shape change alters it.

use sha2::{Digest, Sha256};

use gildash_store::{Symbol, SymbolKind};

pub fn fingerprint_symbol(
    kind: SymbolKind,
    name: &str,
    signature: Option<&str>,
    is_exported: bool,
    detail: &serde_json::Value,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(kind.as_str().as_bytes());
    hasher.update([0]);
    hasher.update(name.as_bytes());
    hasher.update([0]);
    hasher.update(signature.unwrap_or_default().as_bytes());
    hasher.update([0]);
    hasher.update([u8::from(is_exported)]);

    for field in [
        "parameters",
        "return_type",
        "heritage",
        "members",
        "decorators",
    ] {
        hasher.update([0]);
        if let Some(value) = detail.get(field) {
            // serde_json renders maps with sorted keys, so this is stable
            hasher.update(value.to_string().as_bytes());
        }
    }

    format!("{:x}", hasher.finalize())
}

/// Recompute the fingerprint from an already-built symbol.
pub fn fingerprint_of(symbol: &Symbol) -> String {
    fingerprint_symbol(
        symbol.kind,
        &symbol.name,
        symbol.signature.as_deref(),
        symbol.is_exported,
        &symbol.detail,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn identical_shape_identical_fingerprint() {
        let detail = json!({"parameters": ["a"], "return_type": "number"});
        let one = fingerprint_symbol(SymbolKind::Function, "f", Some("f(a: number)"), true, &detail);
        let two = fingerprint_symbol(SymbolKind::Function, "f", Some("f(a: number)"), true, &detail);
        assert_eq!(one, two);
    }

    #[test]
    fn shape_changes_alter_the_fingerprint() {
        let base = fingerprint_symbol(
            SymbolKind::Function,
            "f",
            Some("f(a: number)"),
            true,
            &serde_json::Value::Null,
        );
        let renamed = fingerprint_symbol(
            SymbolKind::Function,
            "g",
            Some("f(a: number)"),
            true,
            &serde_json::Value::Null,
        );
        let resigned = fingerprint_symbol(
            SymbolKind::Function,
            "f",
            Some("f(a: string)"),
            true,
            &serde_json::Value::Null,
        );
        let unexported = fingerprint_symbol(
            SymbolKind::Function,
            "f",
            Some("f(a: number)"),
            false,
            &serde_json::Value::Null,
        );
        assert_ne!(base, renamed);
        assert_ne!(base, resigned);
        assert_ne!(base, unexported);
    }

    #[test]
    fn detail_members_participate() {
        let one = fingerprint_symbol(
            SymbolKind::Class,
            "C",
            None,
            true,
            &json!({"members": ["a", "b"]}),
        );
        let two = fingerprint_symbol(
            SymbolKind::Class,
            "C",
            None,
            true,
            &json!({"members": ["a", "c"]}),
        );
        assert_ne!(one, two);
    }
}
