use serde::{Deserialize, Serialize};

use catalog_core::{Entity, Measure, uuid_id};

use crate::reference::UnitId;

uuid_id!(pub struct AlternativeUnitId, "AlternativeUnitId");

/// Additional unit a product can be counted in, e.g. a box of 12.
///
/// `conversion_ratio` is the number of base units in one target unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductAlternativeUnit {
    pub id: AlternativeUnitId,
    pub target_unit_id: UnitId,
    pub conversion_ratio: Measure,
}

impl ProductAlternativeUnit {
    pub fn new(target_unit_id: UnitId, conversion_ratio: Measure) -> Self {
        Self {
            id: AlternativeUnitId::new(),
            target_unit_id,
            conversion_ratio,
        }
    }

    /// Copy mutable fields from `incoming`; returns whether anything changed.
    pub(crate) fn update_from(&mut self, incoming: ProductAlternativeUnit) -> bool {
        let changed = self.target_unit_id != incoming.target_unit_id
            || self.conversion_ratio != incoming.conversion_ratio;
        self.target_unit_id = incoming.target_unit_id;
        self.conversion_ratio = incoming.conversion_ratio;
        changed
    }
}

impl Entity for ProductAlternativeUnit {
    type Id = AlternativeUnitId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
