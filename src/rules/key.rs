//! Content-addressed dedup key for signal candidates.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::snapshot::Window;

use super::{DetectorKind, Scope};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SignalKey(pub String);

impl std::fmt::Display for SignalKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// `hash(type | window | scope | sort(primaryActorIds) | sort(primaryEdgeIds))`.
/// Identical structural events across runs always yield the same key.
pub fn compute_signal_key(
    kind: DetectorKind,
    window: Window,
    scope: Scope,
    primary_actor_ids: &[String],
    primary_edge_ids: &[String],
) -> SignalKey {
    let mut hasher = DefaultHasher::new();
    "SIGKEY_V1".hash(&mut hasher);
    kind.as_str().hash(&mut hasher);
    window.as_str().hash(&mut hasher);
    scope.as_str().hash(&mut hasher);

    let mut actors = primary_actor_ids.to_vec();
    actors.sort();
    actors.hash(&mut hasher);

    let mut edges = primary_edge_ids.to_vec();
    edges.sort();
    edges.hash(&mut hasher);

    SignalKey(format!("{:016x}", hasher.finish()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_structural_input_yields_identical_key() {
        let k1 = compute_signal_key(
            DetectorKind::NewCorridor,
            Window::H24,
            Scope::Corridor,
            &["b".to_string(), "a".to_string()],
            &[],
        );
        let k2 = compute_signal_key(
            DetectorKind::NewCorridor,
            Window::H24,
            Scope::Corridor,
            &["a".to_string(), "b".to_string()],
            &[],
        );
        assert_eq!(k1, k2);
    }

    #[test]
    fn different_detector_yields_different_key() {
        let k1 = compute_signal_key(
            DetectorKind::NewCorridor,
            Window::H24,
            Scope::Corridor,
            &["a".to_string()],
            &[],
        );
        let k2 = compute_signal_key(
            DetectorKind::NewBridge,
            Window::H24,
            Scope::Corridor,
            &["a".to_string()],
            &[],
        );
        assert_ne!(k1, k2);
    }
}
