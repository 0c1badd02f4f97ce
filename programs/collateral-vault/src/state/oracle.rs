use borsh::{BorshDeserialize, BorshSerialize};

/// Layout of the external price feed account the engine reads: a USD price
/// with 8 decimals plus its publication time. Feed freshness is not enforced
/// here; validity checking of the feed sits outside this program.
#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, Copy)]
pub struct PriceFeed {
    /// USD price per whole token, 8 decimals
    pub price: u64,

    /// Unix time the price was published
    pub published_at: i64,
}

impl PriceFeed {
    pub const LEN: usize = 8 + 8;
}
