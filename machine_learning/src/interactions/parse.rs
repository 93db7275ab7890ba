use crate::{MlErr, Result, example::NamespaceIndex, hash::hash_namespace};

/// The namespace byte expanded into every seen namespace.
pub const WILDCARD_NAMESPACE: NamespaceIndex = b':';

/// One term of a full name interaction, the namespace bucket and the hash of its full name.
pub type ExtentTerm = (NamespaceIndex, u64);

/// Parses a namespace byte interaction such as `ab`, `a:` or `\x01b`.
///
/// # Arguments
/// * `spec` - Every char is a namespace, `\xHH` escapes an arbitrary byte.
///
/// # Returns
/// The namespace bytes or a `MalformedInteraction` error.
pub fn parse_interaction(spec: &str) -> Result<Vec<NamespaceIndex>> {
    let malformed = |reason| MlErr::MalformedInteraction {
        spec: spec.to_string(),
        reason,
    };

    let bytes = spec.as_bytes();
    let mut term = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'\\' && bytes.get(i + 1) == Some(&b'x') {
            let hex = bytes.get(i + 2..i + 4).ok_or(malformed("truncated \\x escape"))?;
            let hex = std::str::from_utf8(hex).map_err(|_| malformed("invalid \\x escape"))?;
            let byte = u8::from_str_radix(hex, 16).map_err(|_| malformed("invalid \\x escape"))?;

            term.push(byte);
            i += 4;
        } else {
            term.push(bytes[i]);
            i += 1;
        }
    }

    if term.is_empty() {
        return Err(malformed("empty interaction"));
    }

    Ok(term)
}

/// Parses a full name interaction such as `user|item|ctx`.
///
/// The namespace bucket of every term is the first byte of its name.
///
/// # Returns
/// The extent terms, or a `MalformedInteraction` error on an empty segment or a wildcard.
pub fn parse_full_name_interaction(spec: &str) -> Result<Vec<ExtentTerm>> {
    spec.split('|')
        .map(|name| {
            let malformed = |reason| MlErr::MalformedInteraction {
                spec: spec.to_string(),
                reason,
            };

            let Some(&first) = name.as_bytes().first() else {
                return Err(malformed("empty namespace name"));
            };

            if first == WILDCARD_NAMESPACE {
                return Err(malformed("wildcards are not supported in full name interactions"));
            }

            Ok((first, hash_namespace(name)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_interactions_with_escapes() {
        assert_eq!(parse_interaction("ab").unwrap(), b"ab".to_vec());
        assert_eq!(parse_interaction("\\x01b:").unwrap(), vec![1, b'b', b':']);
        assert!(parse_interaction("\\x0").is_err());
        assert!(parse_interaction("\\xzz").is_err());
        assert!(parse_interaction("").is_err());
    }

    #[test]
    fn full_name_interactions() {
        let terms = parse_full_name_interaction("user|item").unwrap();
        assert_eq!(
            terms,
            vec![
                (b'u', hash_namespace("user")),
                (b'i', hash_namespace("item"))
            ]
        );
    }

    #[test]
    fn empty_segments_and_wildcards_are_malformed() {
        for spec in ["a||b", "|a", "a|", "a|:"] {
            assert!(
                matches!(
                    parse_full_name_interaction(spec),
                    Err(MlErr::MalformedInteraction { .. })
                ),
                "{spec} should be rejected"
            );
        }
    }
}
