use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;

use crate::types::{EntityId, Row};

/// How evenly the combined rows are spread across entities.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EntityCoverage {
    /// Rows counted across all entities.
    pub total: usize,
    /// Entities considered.
    pub entities: usize,
    /// Smallest per-entity row count.
    pub min: usize,
    /// Largest per-entity row count.
    pub max: usize,
    /// Mean rows per entity.
    pub mean: f64,
    /// Largest share of `total`.
    pub max_share: f64,
    /// Smallest share of `total`.
    pub min_share: f64,
    /// `max / min`; infinite when some entity has no rows.
    pub ratio: f64,
    /// Per-entity breakdown.
    pub per_entity: Vec<EntityShare>,
}

/// One entity's slice of the combined rows.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EntityShare {
    /// Entity id.
    pub entity_id: EntityId,
    /// Rows for this entity.
    pub count: usize,
    /// Fraction of all counted rows.
    pub share: f64,
}

/// Row count per value of `entity_field`. Rows without the field are skipped.
pub fn entity_counts(rows: &[Row], entity_field: &str) -> HashMap<EntityId, usize> {
    let mut counts = HashMap::new();
    for row in rows {
        let entity = match row.get(entity_field) {
            Some(Value::String(text)) => text.clone(),
            Some(Value::Null) | None => continue,
            Some(other) => other.to_string(),
        };
        *counts.entry(entity).or_insert(0) += 1;
    }
    counts
}

/// Coverage of `rows` grouped by `entity_field`.
pub fn entity_coverage(rows: &[Row], entity_field: &str) -> Option<EntityCoverage> {
    coverage_from_counts(&entity_counts(rows, entity_field))
}

/// Coverage from precomputed counts.
///
/// Seed requested entities with `0` beforehand to surface the ones whose
/// fetches returned nothing.
pub fn coverage_from_counts(counts: &HashMap<EntityId, usize>) -> Option<EntityCoverage> {
    let min = *counts.values().min()?;
    let max = *counts.values().max()?;
    let total: usize = counts.values().sum();
    let entities = counts.len();
    let share_of = |count: usize| {
        if total == 0 {
            0.0
        } else {
            count as f64 / total as f64
        }
    };
    let ratio = if min == 0 {
        f64::INFINITY
    } else {
        max as f64 / min as f64
    };
    let mut per_entity: Vec<EntityShare> = counts
        .iter()
        .map(|(entity_id, &count)| EntityShare {
            entity_id: entity_id.clone(),
            count,
            share: share_of(count),
        })
        .collect();
    per_entity.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.entity_id.cmp(&b.entity_id))
    });
    Some(EntityCoverage {
        total,
        entities,
        min,
        max,
        mean: total as f64 / entities as f64,
        max_share: share_of(max),
        min_share: share_of(min),
        ratio,
        per_entity,
    })
}
