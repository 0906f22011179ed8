use crate::flags::flag_models::FlagSet;

/// Position of the first flag whose market equals `requested_market` exactly, or `None`.
///
/// Markets are compared byte for byte, so `"us"` does not match `"US"`. When a market
/// appears more than once the earliest entry wins.
pub fn find_match(flag_set: &FlagSet, requested_market: &str) -> Option<usize> {
    flag_set
        .flags
        .iter()
        .position(|flag| flag.market == requested_market)
}
