//! Coin type identifiers, claim specs and base-unit amount conversion.

use std::fmt;
use std::str::FromStr;

use crate::error::{Result, ZkSendError};

pub const SUI_COIN_TYPE: &str =
    "0x0000000000000000000000000000000000000000000000000000000000000002::sui::SUI";
pub const SUI_DECIMALS: u8 = 9;

const COIN_STRUCT: &str =
    "0x0000000000000000000000000000000000000000000000000000000000000002::coin::Coin";
const PRIMITIVES: [&str; 9] = [
    "bool", "u8", "u16", "u32", "u64", "u128", "u256", "address", "signer",
];

/// Fully qualified Move type of a coin, normalized so that `0x2::sui::SUI`
/// and its long form compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CoinType(String);

impl CoinType {
    pub fn parse(input: &str) -> Result<Self> {
        match normalize_type(input) {
            Some(normalized) if normalized.contains("::") => Ok(Self(normalized)),
            _ => Err(ZkSendError::InvalidCoinType(input.to_string())),
        }
    }

    pub fn sui() -> Self {
        Self(SUI_COIN_TYPE.to_string())
    }

    pub fn is_sui(&self) -> bool {
        self.0 == SUI_COIN_TYPE
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `0x2::coin::Coin<T>` for this coin type.
    pub fn coin_object_type(&self) -> String {
        format!("{COIN_STRUCT}<{}>", self.0)
    }

    /// Extracts `T` from a `0x2::coin::Coin<T>` object type; `None` for any
    /// other object type.
    pub fn from_coin_object_type(object_type: &str) -> Option<Self> {
        let normalized = normalize_type(object_type)?;
        let inner = normalized
            .strip_prefix(COIN_STRUCT)?
            .strip_prefix('<')?
            .strip_suffix('>')?;
        Some(Self(inner.to_string()))
    }
}

impl fmt::Display for CoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for CoinType {
    type Err = ZkSendError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Left-pads a hex address to 32 bytes, lowercased with a `0x` prefix.
pub fn normalize_address(input: &str) -> Option<String> {
    let hex = input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
        .unwrap_or(input);
    if hex.is_empty() || hex.len() > 64 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    Some(format!("0x{:0>64}", hex.to_ascii_lowercase()))
}

fn normalize_type(input: &str) -> Option<String> {
    let s = input.trim();
    if PRIMITIVES.contains(&s) {
        return Some(s.to_string());
    }
    if let Some(inner) = s.strip_prefix("vector<") {
        let inner = inner.strip_suffix('>')?;
        return Some(format!("vector<{}>", normalize_type(inner)?));
    }

    let (head, params) = match s.find('<') {
        Some(open) => (&s[..open], Some(s[open + 1..].strip_suffix('>')?)),
        None => (s, None),
    };

    let mut parts = head.split("::");
    let (address, module, name) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() || !is_identifier(module) || !is_identifier(name) {
        return None;
    }

    let mut out = format!("{}::{module}::{name}", normalize_address(address)?);
    if let Some(params) = params {
        let normalized = split_type_params(params)?
            .into_iter()
            .map(normalize_type)
            .collect::<Option<Vec<_>>>()?;
        out.push('<');
        out.push_str(&normalized.join(", "));
        out.push('>');
    }
    Some(out)
}

fn split_type_params(params: &str) -> Option<Vec<&str>> {
    let mut depth = 0usize;
    let mut start = 0;
    let mut out = Vec::new();
    for (i, c) in params.char_indices() {
        match c {
            '<' => depth += 1,
            '>' => depth = depth.checked_sub(1)?,
            ',' if depth == 0 => {
                out.push(&params[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return None;
    }
    out.push(&params[start..]);
    Some(out)
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

/// Converts a human decimal string ("0.5") into base units for a coin with
/// `decimals` places. Rejects signs, exponents and excess precision.
pub fn parse_amount(input: &str, decimals: u8) -> Result<u64> {
    let invalid = |reason: &str| ZkSendError::InvalidAmount {
        input: input.to_string(),
        reason: reason.to_string(),
    };

    let s = input.trim();
    let (whole, frac) = s.split_once('.').unwrap_or((s, ""));
    if whole.is_empty() && frac.is_empty() {
        return Err(invalid("empty amount"));
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid("not a decimal number"));
    }
    if frac.len() > decimals as usize {
        return Err(invalid(&format!("more than {decimals} decimal places")));
    }

    let scale = 10u128
        .checked_pow(decimals as u32)
        .ok_or_else(|| invalid("unsupported decimals"))?;
    let whole_units: u128 = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| invalid("amount too large"))?
    };
    let frac_units: u128 = if frac.is_empty() {
        0
    } else {
        format!("{frac:0<width$}", width = decimals as usize)
            .parse()
            .map_err(|_| invalid("amount too large"))?
    };

    let total = whole_units
        .checked_mul(scale)
        .and_then(|units| units.checked_add(frac_units))
        .ok_or_else(|| invalid("amount too large"))?;
    u64::try_from(total).map_err(|_| invalid("amount does not fit in u64"))
}

/// Renders base units as a decimal string without trailing zeros.
pub fn format_amount(amount: u64, decimals: u8) -> String {
    let digits = amount.to_string();
    let decimals = decimals as usize;
    if decimals == 0 {
        return digits;
    }

    let padded = if digits.len() <= decimals {
        format!("{}{digits}", "0".repeat(decimals - digits.len() + 1))
    } else {
        digits
    };
    let (whole, frac) = padded.split_at(padded.len() - decimals);
    let frac = frac.trim_end_matches('0');
    if frac.is_empty() {
        whole.to_string()
    } else {
        format!("{whole}.{frac}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claim {
    pub coin_type: CoinType,
    pub amount: u64,
}

/// What a single link should hold. Entries of the same coin type are summed
/// when the link is funded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClaimSpec {
    claims: Vec<Claim>,
}

impl ClaimSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(coin_type: CoinType, amount: u64) -> Result<Self> {
        Self::new().with(coin_type, amount)
    }

    pub fn with(mut self, coin_type: CoinType, amount: u64) -> Result<Self> {
        self.add(coin_type, amount)?;
        Ok(self)
    }

    pub fn add(&mut self, coin_type: CoinType, amount: u64) -> Result<()> {
        if amount == 0 {
            return Err(ZkSendError::InvalidClaim(format!(
                "amount for {coin_type} must be greater than zero"
            )));
        }
        self.claims.push(Claim { coin_type, amount });
        Ok(())
    }

    pub fn claims(&self) -> &[Claim] {
        &self.claims
    }

    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }

    /// Per-coin-type totals in first-seen order.
    pub fn totals(&self) -> Result<Vec<Claim>> {
        let mut totals: Vec<Claim> = Vec::new();
        for claim in &self.claims {
            match totals.iter_mut().find(|t| t.coin_type == claim.coin_type) {
                Some(total) => {
                    total.amount = total.amount.checked_add(claim.amount).ok_or_else(|| {
                        ZkSendError::InvalidClaim(format!(
                            "total for {} overflows u64",
                            claim.coin_type
                        ))
                    })?;
                }
                None => totals.push(claim.clone()),
            }
        }
        Ok(totals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_short_and_long_forms() {
        let short = CoinType::parse("0x2::sui::SUI").unwrap();
        let long = CoinType::parse(SUI_COIN_TYPE).unwrap();
        assert_eq!(short, long);
        assert!(short.is_sui());
        assert_eq!(short, CoinType::sui());
    }

    #[test]
    fn test_normalize_nested_type_params() {
        let coin = CoinType::parse("0xABC::pool::LP<0x2::sui::SUI,0x3::usdc::USDC>").unwrap();
        assert_eq!(
            coin.as_str(),
            "0x0000000000000000000000000000000000000000000000000000000000000abc::pool::LP<\
             0x0000000000000000000000000000000000000000000000000000000000000002::sui::SUI, \
             0x0000000000000000000000000000000000000000000000000000000000000003::usdc::USDC>"
        );
    }

    #[test]
    fn test_rejects_invalid_coin_types() {
        for input in ["", "u64", "0x2::sui", "0xZZ::a::B", "0x2::1abc::B", "0x2::a::B<", "0x2::a::B::C"] {
            assert!(CoinType::parse(input).is_err(), "accepted {input:?}");
        }
    }

    #[test]
    fn test_coin_object_type() {
        let usdc = CoinType::parse("0x5d4b::coin::COIN").unwrap();
        let object_type = usdc.coin_object_type();
        assert_eq!(CoinType::from_coin_object_type(&object_type), Some(usdc));
        assert_eq!(
            CoinType::from_coin_object_type("0x2::coin::Coin<0x2::sui::SUI>"),
            Some(CoinType::sui())
        );
        assert_eq!(CoinType::from_coin_object_type("0x2::kiosk::Kiosk"), None);
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("0.5", 6).unwrap(), 500_000);
        assert_eq!(parse_amount("1", 9).unwrap(), 1_000_000_000);
        assert_eq!(parse_amount(".25", 2).unwrap(), 25);
        assert_eq!(parse_amount("3.", 0).unwrap(), 3);
        assert_eq!(parse_amount(" 12.000001 ", 6).unwrap(), 12_000_001);
        assert_eq!(parse_amount("0", 9).unwrap(), 0);
    }

    #[test]
    fn test_parse_amount_rejects_bad_input() {
        for input in ["", ".", "-1", "+1", "1e9", "1.2.3", "abc", "0.0000001"] {
            assert!(
                matches!(parse_amount(input, 6), Err(ZkSendError::InvalidAmount { .. })),
                "accepted {input:?}"
            );
        }
        assert!(parse_amount("18446744073709551616", 0).is_err());
        assert!(parse_amount("18446744073.709551616", 9).is_err());
    }

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(500_000, 6), "0.5");
        assert_eq!(format_amount(1_000_000_000, 9), "1");
        assert_eq!(format_amount(1, 9), "0.000000001");
        assert_eq!(format_amount(42, 0), "42");
        assert_eq!(format_amount(0, 6), "0");
        assert_eq!(format_amount(u64::MAX, 9), "18446744073.709551615");
    }

    #[test]
    fn test_claim_spec_totals() {
        let sui = CoinType::sui();
        let usdc = CoinType::parse("0x3::usdc::USDC").unwrap();
        let spec = ClaimSpec::new()
            .with(usdc.clone(), 5)
            .unwrap()
            .with(sui.clone(), 10)
            .unwrap()
            .with(usdc.clone(), 7)
            .unwrap();

        assert_eq!(
            spec.totals().unwrap(),
            vec![
                Claim { coin_type: usdc, amount: 12 },
                Claim { coin_type: sui, amount: 10 },
            ]
        );
    }

    #[test]
    fn test_claim_spec_rejects_zero_and_overflow() {
        assert!(ClaimSpec::single(CoinType::sui(), 0).is_err());

        let spec = ClaimSpec::new()
            .with(CoinType::sui(), u64::MAX)
            .unwrap()
            .with(CoinType::sui(), 1)
            .unwrap();
        assert!(matches!(spec.totals(), Err(ZkSendError::InvalidClaim(_))));
    }
}
