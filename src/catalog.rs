//! Items purchasable with Telegram Stars.

/// Global supply of every NFT item type.
pub const NFT_SUPPLY_CAP: i64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Item {
    TonBoost,
    AppsBoost,
    PremBoost,
    EthBoost,
    BtcBoost,
    SolBoost,
    NearBoost,
    UpStorage,
    UpBoosters,
    FlowerNft,
    CactusNft,
    PalmNft,
    SpruceNft,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    /// Bought once, re-purchase is refused.
    Booster,
    /// Bought once, re-purchase is accepted and leaves the flag set.
    Upgrade,
    /// Counted per user, bounded by a supply shared by all users.
    Nft { cap: i64 },
}

impl Item {
    pub const ALL: [Item; 13] = [
        Item::TonBoost,
        Item::AppsBoost,
        Item::PremBoost,
        Item::EthBoost,
        Item::BtcBoost,
        Item::SolBoost,
        Item::NearBoost,
        Item::UpStorage,
        Item::UpBoosters,
        Item::FlowerNft,
        Item::CactusNft,
        Item::PalmNft,
        Item::SpruceNft,
    ];

    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|item| item.id() == id)
    }

    pub const fn id(self) -> &'static str {
        match self {
            Item::TonBoost => "ton_boost",
            Item::AppsBoost => "apps_boost",
            Item::PremBoost => "prem_boost",
            Item::EthBoost => "eth_boost",
            Item::BtcBoost => "btc_boost",
            Item::SolBoost => "sol_boost",
            Item::NearBoost => "near_boost",
            Item::UpStorage => "up_storage",
            Item::UpBoosters => "up_boosters",
            Item::FlowerNft => "flower_nft",
            Item::CactusNft => "cactus_nft",
            Item::PalmNft => "palm_nft",
            Item::SpruceNft => "spruce_nft",
        }
    }

    pub const fn kind(self) -> ItemKind {
        match self {
            Item::UpStorage | Item::UpBoosters => ItemKind::Upgrade,
            Item::FlowerNft | Item::CactusNft | Item::PalmNft | Item::SpruceNft => ItemKind::Nft {
                cap: NFT_SUPPLY_CAP,
            },
            _ => ItemKind::Booster,
        }
    }

    /// Price in Stars (XTR).
    pub const fn price(self) -> u32 {
        match self {
            Item::TonBoost => 100,
            Item::AppsBoost => 300,
            Item::PremBoost => 500,
            Item::EthBoost => 1000,
            Item::BtcBoost => 1300,
            Item::SolBoost => 600,
            Item::NearBoost => 800,
            Item::UpStorage | Item::UpBoosters => 149,
            Item::FlowerNft => 5,
            Item::CactusNft => 15,
            Item::PalmNft => 25,
            Item::SpruceNft => 50,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_id() {
        for item in Item::ALL {
            assert_eq!(Item::from_id(item.id()), Some(item));
        }
        assert_eq!(Item::from_id("gold_nft"), None);
        assert_eq!(Item::from_id(""), None);
    }

    #[test]
    fn test_kinds() {
        assert_eq!(Item::TonBoost.kind(), ItemKind::Booster);
        assert_eq!(Item::UpBoosters.kind(), ItemKind::Upgrade);
        assert_eq!(Item::PalmNft.kind(), ItemKind::Nft { cap: 1000 });
    }
}
