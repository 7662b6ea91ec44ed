use serde::{Deserialize, Serialize};

use catalog_core::{Entity, Measure};

use crate::reference::PriceListId;

/// Net price of a product on one price list. A product has at most one entry
/// per price list, so the price list id doubles as the entry key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductPrice {
    pub price_list_id: PriceListId,
    pub net_price: Measure,
}

impl ProductPrice {
    pub(crate) fn update_from(&mut self, incoming: ProductPrice) -> bool {
        let changed = self.net_price != incoming.net_price;
        self.net_price = incoming.net_price;
        changed
    }
}

impl Entity for ProductPrice {
    type Id = PriceListId;

    fn id(&self) -> &Self::Id {
        &self.price_list_id
    }
}
