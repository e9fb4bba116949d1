use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Unidad con la que el engine reporta un contador.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RuntimeCounterUnit {
    #[default]
    None,
    Nanos,
    Bytes,
}

/// Resumen estadístico de un contador con nombre (sum, count, min, max).
///
/// El `Default` es el elemento neutro del merge: count=0, sum=0,
/// min=i64::MAX, max=i64::MIN.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeMetric {
    pub sum: i64,
    pub count: i64,
    pub min: i64,
    pub max: i64,
    pub unit: RuntimeCounterUnit,
}

impl Default for RuntimeMetric {
    fn default() -> Self {
        Self::empty(RuntimeCounterUnit::None)
    }
}

impl RuntimeMetric {
    /// Métrica vacía con la unidad dada.
    pub fn empty(unit: RuntimeCounterUnit) -> Self {
        Self {
            sum: 0,
            count: 0,
            min: i64::MAX,
            max: i64::MIN,
            unit,
        }
    }

    /// Métrica construida a partir de un único valor crudo.
    pub fn from_value(value: i64, unit: RuntimeCounterUnit) -> Self {
        Self {
            sum: value,
            count: 1,
            min: value,
            max: value,
            unit,
        }
    }

    pub fn add_value(&mut self, value: i64) {
        self.sum = self.sum.saturating_add(value);
        self.count += 1;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    /// Combina otra métrica en esta. Conmutativo y asociativo.
    ///
    /// Las dos métricas tienen que tener la misma unidad (salvo que alguna
    /// esté vacía): una métrica con nombre tiene una sola unidad.
    pub fn merge(&mut self, other: &RuntimeMetric) {
        if other.count == 0 {
            return;
        }
        if self.count == 0 {
            // la unidad de una métrica vacía no dice nada
            self.unit = other.unit;
        }
        debug_assert_eq!(
            self.unit, other.unit,
            "merge de métricas con unidades distintas"
        );
        self.sum = self.sum.saturating_add(other.sum);
        self.count += other.count;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    pub fn merged(mut self, other: &RuntimeMetric) -> Self {
        self.merge(other);
        self
    }
}

/// Inserta `metric` bajo `name`, haciendo merge si ya existía.
pub fn add_runtime_metric(
    metrics: &mut BTreeMap<String, RuntimeMetric>,
    name: &str,
    metric: &RuntimeMetric,
) {
    match metrics.get_mut(name) {
        Some(existing) => existing.merge(metric),
        None => {
            metrics.insert(name.to_string(), *metric);
        }
    }
}
