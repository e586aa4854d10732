//! Drill-down state and the effective pivot configuration it implies

use std::collections::BTreeSet;

use cubeql_model::{Axis, Cube, Dimension, FilterSpec, FilterValue, LevelRef, PivotConfig};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One expanded member: `value` of `dimension/level` on `axis`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DrillKey {
    pub axis: Axis,
    pub dimension: String,
    pub level: String,
    pub value: FilterValue,
}

impl DrillKey {
    pub fn new(
        axis: Axis,
        dimension: impl Into<String>,
        level: impl Into<String>,
        value: impl Into<FilterValue>,
    ) -> Self {
        Self {
            axis,
            dimension: dimension.into(),
            level: level.into(),
            value: value.into(),
        }
    }
}

/// Set of expanded keys, owned by the caller.
///
/// `toggle` is the only mutation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrillState {
    expanded: BTreeSet<DrillKey>,
}

impl DrillState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip membership of `key`. Returns whether it is expanded afterwards.
    pub fn toggle(&mut self, key: DrillKey) -> bool {
        if self.expanded.remove(&key) {
            false
        } else {
            self.expanded.insert(key);
            true
        }
    }

    pub fn is_expanded(&self, key: &DrillKey) -> bool {
        self.expanded.contains(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &DrillKey> {
        self.expanded.iter()
    }

    pub fn len(&self) -> usize {
        self.expanded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.expanded.is_empty()
    }
}

/// Derive the pivot configuration the compiler should see.
///
/// For every live key `(axis, D, L, V)` the next level `L'` of `D` is placed
/// right after `D/L` on that axis (unless already present on either axis)
/// and `D/L` is restricted to `V`. Keys naming a missing dimension or level,
/// a finest level, or a level not on the axis are skipped. Keys on coarser
/// levels are applied first, so a key on a level inserted by another key is
/// live. Values for the same `D/L` are merged into one filter: `=` for one
/// value, `in` for several.
pub fn effective_config(cube: &Cube, base: &PivotConfig, state: &DrillState) -> PivotConfig {
    let mut live: Vec<(&DrillKey, &Dimension, usize)> = Vec::new();
    for key in state.keys() {
        let Some(dimension) = cube.dimension(&key.dimension) else {
            debug!(dimension = %key.dimension, "Skipping drill key: unknown dimension");
            continue;
        };
        let Some(index) = dimension.level_index(&key.level) else {
            debug!(dimension = %key.dimension, level = %key.level, "Skipping drill key: unknown level");
            continue;
        };
        if index + 1 >= dimension.levels.len() {
            debug!(dimension = %key.dimension, level = %key.level, "Skipping drill key: finest level");
            continue;
        }
        live.push((key, dimension, index));
    }
    // Stable: ties keep the set's order
    live.sort_by_key(|(_, _, index)| *index);

    let mut config = base.clone();
    let mut restrictions: Vec<(LevelRef, Vec<FilterValue>)> = Vec::new();

    for (key, dimension, index) in live {
        let next = &dimension.levels[index + 1].name;
        let axis = config.axis(key.axis);
        let Some(position) = axis.iter().position(|l| l.matches(&key.dimension, &key.level)) else {
            debug!(
                axis = %key.axis,
                dimension = %key.dimension,
                level = %key.level,
                "Skipping drill key: level not on axis"
            );
            continue;
        };

        let present = config
            .rows
            .iter()
            .chain(config.columns.iter())
            .any(|l| l.matches(&key.dimension, next));
        if !present {
            config
                .axis_mut(key.axis)
                .insert(position + 1, LevelRef::new(key.dimension.as_str(), next.as_str()));
        }

        match restrictions
            .iter_mut()
            .find(|(field, _)| field.matches(&key.dimension, &key.level))
        {
            Some((_, values)) => {
                if !values.contains(&key.value) {
                    values.push(key.value.clone());
                }
            }
            None => restrictions.push((
                LevelRef::new(key.dimension.as_str(), key.level.as_str()),
                vec![key.value.clone()],
            )),
        }
    }

    for (field, values) in restrictions {
        let operator = if values.len() == 1 { "=" } else { "in" };
        let filter = FilterSpec::new(field.dimension, field.level, operator, values);
        if !config.filters.contains(&filter) {
            config.filters.push(filter);
        }
    }
    config
}
