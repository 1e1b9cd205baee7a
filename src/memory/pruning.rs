//! Pruning strategy selection (spec §4.D "Pruning strategies").

use crate::model::MemoryEntry;
use chrono::Utc;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PruneStrategy {
    Lru,
    Lfu,
    Importance,
    Age,
}

/// Selects the indices (into `entries`, in their given order) to evict,
/// `ceil(prune_ratio * entries.len())` of them, per `strategy`.
pub fn select_for_pruning(entries: &[&MemoryEntry], strategy: PruneStrategy, prune_ratio: f64) -> Vec<String> {
    let n = entries.len();
    if n == 0 {
        return Vec::new();
    }
    let count = ((prune_ratio.clamp(0.0, 1.0)) * n as f64).ceil() as usize;
    let count = count.min(n);

    let mut ordered: Vec<&&MemoryEntry> = entries.iter().collect();
    let now = Utc::now();

    match strategy {
        PruneStrategy::Lru => ordered.sort_by_key(|e| e.last_accessed_at),
        PruneStrategy::Lfu => ordered.sort_by_key(|e| e.access_count),
        PruneStrategy::Importance => {
            ordered.sort_by(|a, b| a.importance.partial_cmp(&b.importance).unwrap_or(std::cmp::Ordering::Equal))
        }
        PruneStrategy::Age => ordered.sort_by_key(|e| std::cmp::Reverse(e.age_ms(now))),
    }

    ordered.into_iter().take(count).map(|e| e.id.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MemoryKind;

    #[test]
    fn lfu_evicts_least_frequently_accessed_first() {
        let mut low = MemoryEntry::new("rare", MemoryKind::Fact);
        low.access_count = 1;
        let mut high = MemoryEntry::new("common", MemoryKind::Fact);
        high.access_count = 10;
        let entries = vec![&low, &high];
        let victims = select_for_pruning(&entries, PruneStrategy::Lfu, 0.5);
        assert_eq!(victims, vec![low.id.clone()]);
    }

    #[test]
    fn importance_evicts_lowest_importance_first() {
        let low = MemoryEntry::new("x", MemoryKind::Fact).with_importance(0.1);
        let high = MemoryEntry::new("y", MemoryKind::Fact).with_importance(0.9);
        let entries = vec![&low, &high];
        let victims = select_for_pruning(&entries, PruneStrategy::Importance, 0.5);
        assert_eq!(victims, vec![low.id.clone()]);
    }

    #[test]
    fn prune_ratio_rounds_up_to_whole_entries() {
        let a = MemoryEntry::new("a", MemoryKind::Fact);
        let b = MemoryEntry::new("b", MemoryKind::Fact);
        let c = MemoryEntry::new("c", MemoryKind::Fact);
        let entries = vec![&a, &b, &c];
        let victims = select_for_pruning(&entries, PruneStrategy::Age, 0.34);
        assert_eq!(victims.len(), 2);
    }
}
