use psstore_client::DefaultSku;

use super::value::Tier;

/// Discount rates (percent) and discounted prices (minor units) for both tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DiscountInfo {
    pub base_rate: i64,
    pub plus_rate: i64,
    pub base_price: i64,
    pub plus_price: i64,
}

impl DiscountInfo {
    pub fn undiscounted(price: i64) -> Self {
        Self {
            base_rate: 0,
            plus_rate: 0,
            base_price: price,
            plus_price: price,
        }
    }

    /// Only the first reward block counts. A base discount applies to both
    /// tiers; a bonus discount then overrides the plus tier alone.
    pub fn from_sku(sku: &DefaultSku) -> Self {
        let mut info = Self::undiscounted(sku.price);
        let Some(reward) = sku.rewards.first() else {
            return info;
        };

        if let Some(discount) = reward.discount {
            let price = reward.price.unwrap_or(sku.price);
            info.base_rate = discount;
            info.base_price = price;
            info.plus_rate = discount;
            info.plus_price = price;
        }
        if let Some(bonus) = reward.bonus_discount {
            info.plus_rate = bonus;
            info.plus_price = reward.bonus_price.unwrap_or(info.plus_price);
        }
        info
    }

    pub fn price(&self, tier: Tier) -> i64 {
        match tier {
            Tier::Base => self.base_price,
            Tier::Plus => self.plus_price,
        }
    }

    pub fn rate(&self, tier: Tier) -> i64 {
        match tier {
            Tier::Base => self.base_rate,
            Tier::Plus => self.plus_rate,
        }
    }
}
