use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Active row of the external fleet registry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct VehicleRecord {
    pub brand: Option<String>,
    pub model: Option<String>,
    pub color: Option<String>,
    pub year: Option<i32>,
    pub cargo_capacity_m3: Option<f64>,
    pub organization_id: Option<Uuid>,
}

impl VehicleRecord {
    /// Capacity usable for volume derivation, if any
    pub fn positive_capacity(&self) -> Option<f64> {
        self.cargo_capacity_m3.filter(|c| *c > 0.0)
    }
}
