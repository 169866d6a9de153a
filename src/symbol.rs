use crate::venue::Venue;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// The cross-venue canonical identifier for a contract — venue B's wire form (eg/ `BTCUSDT`).
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default, Deserialize, Serialize)]
pub struct CanonicalSymbol(pub String);

impl Display for CanonicalSymbol {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CanonicalSymbol {
    fn from(value: &str) -> Self {
        Self(value.to_uppercase())
    }
}

/// Normalise a venue-specific wire symbol to its [`CanonicalSymbol`].
///
/// Venue B's form is already canonical. Venue A's form (`BTC-USDT-SWAP`) is normalised by
/// stripping the `-SWAP` suffix and removing dashes.
pub fn canonicalize(venue: Venue, wire_symbol: &str) -> CanonicalSymbol {
    match venue {
        Venue::BinanceFutures => CanonicalSymbol(wire_symbol.to_uppercase()),
        Venue::Okx => {
            let stripped = wire_symbol.trim_end_matches("-SWAP");
            CanonicalSymbol(stripped.replace('-', "").to_uppercase())
        }
    }
}

/// Partition `symbols` into at most `masters` disjoint, near-equal groups.
///
/// First splits into `ceil(N / capacity)` groups of `capacity` symbols each. If that produces
/// more groups than `masters`, the groups are rebalanced down to exactly `masters` groups whose
/// sizes differ by at most one. The union of the returned groups always equals `symbols` and no
/// symbol is ever dropped, even at the `start + size > len` boundary the original `_balance_symbol_groups`
/// Python routine mishandled (see SPEC_FULL.md §3 / Open Questions).
pub fn partition_symbols(
    symbols: &[CanonicalSymbol],
    masters: usize,
    capacity: usize,
) -> Vec<Vec<CanonicalSymbol>> {
    if symbols.is_empty() || masters == 0 {
        return Vec::new();
    }

    let capacity = capacity.max(1);
    let initial_groups = symbols.chunks(capacity).count();

    let groups: Vec<Vec<CanonicalSymbol>> = if initial_groups <= masters {
        symbols.chunks(capacity).map(|c| c.to_vec()).collect()
    } else {
        rebalance(symbols, masters)
    };

    debug_assert_eq!(
        groups.iter().map(Vec::len).sum::<usize>(),
        symbols.len(),
        "partition_symbols must not drop any symbol"
    );

    groups
}

/// Splits `symbols` into exactly `target_groups` groups whose sizes differ by at most one.
fn rebalance(symbols: &[CanonicalSymbol], target_groups: usize) -> Vec<Vec<CanonicalSymbol>> {
    let total = symbols.len();
    let base_size = total / target_groups;
    let remainder = total % target_groups;

    let mut groups = Vec::with_capacity(target_groups);
    let mut start = 0;
    for i in 0..target_groups {
        // The first `remainder` groups absorb one extra symbol so every input symbol lands
        // in exactly one group, unlike the original which could leave a remainder unassigned.
        let size = base_size + usize::from(i < remainder);
        let end = (start + size).min(total);
        groups.push(symbols[start..end].to_vec());
        start = end;
    }

    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    fn syms(n: usize) -> Vec<CanonicalSymbol> {
        (0..n).map(|i| CanonicalSymbol(format!("SYM{i}"))).collect()
    }

    #[test]
    fn canonicalize_binance_is_uppercased_passthrough() {
        assert_eq!(
            canonicalize(Venue::BinanceFutures, "btcusdt"),
            CanonicalSymbol("BTCUSDT".into())
        );
    }

    #[test]
    fn canonicalize_okx_strips_swap_and_dashes() {
        assert_eq!(
            canonicalize(Venue::Okx, "BTC-USDT-SWAP"),
            CanonicalSymbol("BTCUSDT".into())
        );
    }

    #[test]
    fn partition_under_capacity_keeps_single_group() {
        let groups = partition_symbols(&syms(10), 3, 300);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].len(), 10);
    }

    #[test]
    fn partition_rebalances_when_chunking_exceeds_masters() {
        // 700 symbols, capacity 300 -> 3 chunked groups, but only 2 masters configured.
        let groups = partition_symbols(&syms(700), 2, 300);
        assert_eq!(groups.len(), 2);
        let sizes: Vec<usize> = groups.iter().map(Vec::len).collect();
        assert!((sizes[0] as i64 - sizes[1] as i64).abs() <= 1);
        assert_eq!(sizes.iter().sum::<usize>(), 700);
    }

    #[test]
    fn partition_covers_every_symbol_at_boundary() {
        // 10 symbols into 3 masters: sizes must be 4/3/3 and cover all 10, never drop the
        // trailing remainder the way the original Python implementation could.
        let groups = partition_symbols(&syms(10), 3, 3);
        assert_eq!(groups.iter().map(Vec::len).sum::<usize>(), 10);
        let sizes: Vec<usize> = groups.iter().map(Vec::len).collect();
        assert_eq!(sizes.iter().max().unwrap() - sizes.iter().min().unwrap(), 1);
    }

    #[test]
    fn partition_zero_symbols_yields_no_groups() {
        assert!(partition_symbols(&[], 3, 300).is_empty());
    }

    #[test]
    fn partitions_are_pairwise_disjoint() {
        let groups = partition_symbols(&syms(17), 4, 5);
        let mut seen = std::collections::HashSet::new();
        for group in &groups {
            for symbol in group {
                assert!(seen.insert(symbol.clone()), "duplicate symbol across groups");
            }
        }
    }
}
