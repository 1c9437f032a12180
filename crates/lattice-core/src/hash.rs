//! Content hashing for change detection and version checksums.

use sha2::{Digest, Sha256};

use crate::edge::EdgeType;
use crate::node::NodeKey;

/// Hex SHA-256 of an entity's exact source text.
pub fn content_hash(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

/// Checksum of a version's membership.
///
/// Order-independent: pairs and triples are sorted before hashing, so two
/// versions with the same keyed content share a checksum regardless of
/// storage order or ids.
pub fn version_checksum<'a>(
    nodes: impl IntoIterator<Item = (&'a NodeKey, &'a str)>,
    edges: impl IntoIterator<Item = (&'a NodeKey, &'a NodeKey, EdgeType)>,
) -> String {
    let mut node_lines: Vec<(&NodeKey, &str)> = nodes.into_iter().collect();
    node_lines.sort();
    let mut edge_lines: Vec<(&NodeKey, &NodeKey, EdgeType)> = edges.into_iter().collect();
    edge_lines.sort();

    let mut hasher = Sha256::new();
    for (key, hash) in node_lines {
        hasher.update(key.as_str().as_bytes());
        hasher.update([0u8]);
        hasher.update(hash.as_bytes());
        hasher.update([b'\n']);
    }
    hasher.update([0xffu8]);
    for (source, target, edge_type) in edge_lines {
        hasher.update(source.as_str().as_bytes());
        hasher.update([0u8]);
        hasher.update(target.as_str().as_bytes());
        hasher.update([0u8]);
        hasher.update(edge_type.as_str().as_bytes());
        hasher.update([b'\n']);
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_is_stable() {
        assert_eq!(content_hash("fn a() {}"), content_hash("fn a() {}"));
        assert_ne!(content_hash("fn a() {}"), content_hash("fn a() { }"));
        assert_eq!(content_hash("").len(), 64);
    }

    #[test]
    fn test_checksum_ignores_order() {
        let a = NodeKey::declaration("a.ts", 1, "a");
        let b = NodeKey::declaration("b.ts", 1, "b");

        let first = version_checksum(
            vec![(&a, "h1"), (&b, "h2")],
            vec![(&a, &b, EdgeType::Calls)],
        );
        let second = version_checksum(
            vec![(&b, "h2"), (&a, "h1")],
            vec![(&a, &b, EdgeType::Calls)],
        );
        assert_eq!(first, second);

        let changed = version_checksum(vec![(&a, "h1"), (&b, "h3")], vec![]);
        assert_ne!(first, changed);
    }
}
