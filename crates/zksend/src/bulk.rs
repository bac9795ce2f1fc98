//! Bulk link input parsing and export.

use std::sync::LazyLock;

use regex::Regex;

use crate::coin::{ClaimSpec, CoinType, parse_amount};
use crate::error::{Result, ZkSendError};
use crate::funding::MAX_LINKS_PER_BATCH;

static LINK_GROUP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+)\s*[xX*]\s*(\d+(?:\.\d+)?|\.\d+)").expect("valid link group pattern")
});

/// `count` links holding `amount` each, as written by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkGroup {
    pub count: usize,
    pub amount: String,
}

/// Parses input like `"2x100 3x0.5"`, `"2 * 100, 3 X 50"`. Text between
/// groups is ignored.
pub fn parse_link_groups(input: &str) -> Result<Vec<LinkGroup>> {
    let groups = LINK_GROUP
        .captures_iter(input)
        .map(|caps| {
            let count = caps[1].parse::<usize>().map_err(|_| {
                ZkSendError::InvalidClaim(format!("link count '{}' is too large", &caps[1]))
            })?;
            Ok(LinkGroup {
                count,
                amount: caps[2].to_string(),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    if groups.is_empty() {
        return Err(ZkSendError::InvalidClaim(format!(
            "no '<count>x<amount>' groups found in '{input}'"
        )));
    }
    Ok(groups)
}

/// Number of links requested by `groups`, saturating at `usize::MAX`.
pub fn link_count(groups: &[LinkGroup]) -> usize {
    groups
        .iter()
        .fold(0usize, |acc, group| acc.saturating_add(group.count))
}

/// Expands groups into one claim spec per link, converting amounts into base
/// units of `coin_type`. Fails with `BatchSizeExceeded` before allocating
/// when more than [`MAX_LINKS_PER_BATCH`] links are requested.
pub fn expand_link_groups(
    groups: &[LinkGroup],
    coin_type: &CoinType,
    decimals: u8,
) -> Result<Vec<ClaimSpec>> {
    let requested = link_count(groups);
    if requested > MAX_LINKS_PER_BATCH {
        return Err(ZkSendError::BatchSizeExceeded {
            requested,
            max: MAX_LINKS_PER_BATCH,
        });
    }
    let mut specs = Vec::with_capacity(requested);
    for group in groups {
        if group.count == 0 {
            continue;
        }
        let amount = parse_amount(&group.amount, decimals)?;
        let spec = ClaimSpec::single(coin_type.clone(), amount)?;
        specs.extend(std::iter::repeat_n(spec, group.count));
    }
    Ok(specs)
}

/// Total base units requested by `groups`.
pub fn total_amount(groups: &[LinkGroup], decimals: u8) -> Result<u128> {
    groups.iter().try_fold(0u128, |acc, group| {
        let amount = parse_amount(&group.amount, decimals)? as u128;
        amount
            .checked_mul(group.count as u128)
            .and_then(|subtotal| acc.checked_add(subtotal))
            .ok_or_else(|| ZkSendError::InvalidClaim("total amount overflows".to_string()))
    })
}

/// One link URL per line.
pub fn links_to_csv<S: AsRef<str>>(urls: &[S]) -> String {
    urls.iter().map(AsRef::as_ref).collect::<Vec<_>>().join("\n")
}
