//! ABI encoding for the thought-log contract.
//!
//! The contract surface is small and fixed, so calls are encoded by hand
//! from 32-byte words:
//! - `getSubmittedTokens(uint256) returns (uint256[])`
//! - `propose(uint256[])`
//! - `bondedBalances(address) returns (uint256)`
//! - `submissionThreshold() returns (uint256)`
//! - `bond()` (payable)

use alloy_primitives::{hex, keccak256, Address, U256};

use super::LedgerError;

pub const GET_SUBMITTED_TOKENS: &str = "getSubmittedTokens(uint256)";
pub const PROPOSE: &str = "propose(uint256[])";
pub const BONDED_BALANCES: &str = "bondedBalances(address)";
pub const SUBMISSION_THRESHOLD: &str = "submissionThreshold()";
pub const BOND: &str = "bond()";

const WORD: usize = 32;

/// First four bytes of the keccak hash of a function signature.
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    let mut out = [0u8; 4];
    out.copy_from_slice(&hash[..4]);
    out
}

fn word(value: U256) -> [u8; WORD] {
    value.to_be_bytes::<WORD>()
}

fn address_word(address: Address) -> [u8; WORD] {
    let mut out = [0u8; WORD];
    out[12..].copy_from_slice(address.as_slice());
    out
}

pub fn encode_get_submitted_tokens(index: u64) -> Vec<u8> {
    let mut data = selector(GET_SUBMITTED_TOKENS).to_vec();
    data.extend_from_slice(&word(U256::from(index)));
    data
}

pub fn encode_propose(tokens: &[u32]) -> Vec<u8> {
    let mut data = selector(PROPOSE).to_vec();
    data.reserve(WORD * (2 + tokens.len()));
    // head: offset of the dynamic array, then its tail
    data.extend_from_slice(&word(U256::from(WORD)));
    data.extend_from_slice(&word(U256::from(tokens.len())));
    for token in tokens {
        data.extend_from_slice(&word(U256::from(*token)));
    }
    data
}

pub fn encode_bonded_balances(account: Address) -> Vec<u8> {
    let mut data = selector(BONDED_BALANCES).to_vec();
    data.extend_from_slice(&address_word(account));
    data
}

pub fn encode_submission_threshold() -> Vec<u8> {
    selector(SUBMISSION_THRESHOLD).to_vec()
}

pub fn encode_bond() -> Vec<u8> {
    selector(BOND).to_vec()
}

fn read_word(data: &[u8], offset: usize) -> Result<U256, LedgerError> {
    let end = offset
        .checked_add(WORD)
        .ok_or_else(|| LedgerError::Decode("offset overflow".to_string()))?;
    let bytes = data.get(offset..end).ok_or_else(|| {
        LedgerError::Decode(format!("return data too short: {} < {}", data.len(), end))
    })?;
    Ok(U256::from_be_slice(bytes))
}

fn word_to_usize(value: U256, what: &str) -> Result<usize, LedgerError> {
    usize::try_from(value).map_err(|_| LedgerError::Decode(format!("{} out of range: {}", what, value)))
}

/// Decode a single `uint256` return value.
pub fn decode_uint(data: &[u8]) -> Result<U256, LedgerError> {
    read_word(data, 0)
}

/// Decode a `uint256[]` return value.
pub fn decode_token_array(data: &[u8]) -> Result<Vec<U256>, LedgerError> {
    let offset = word_to_usize(read_word(data, 0)?, "array offset")?;
    let len = word_to_usize(read_word(data, offset)?, "array length")?;

    let mut words = Vec::with_capacity(len.min(data.len() / WORD));
    for i in 0..len {
        words.push(read_word(data, offset + WORD * (i + 1))?);
    }
    Ok(words)
}

/// `0x`-prefixed hex for JSON-RPC payloads.
pub fn to_hex(data: &[u8]) -> String {
    hex::encode_prefixed(data)
}

/// Parse `0x`-prefixed hex returned by JSON-RPC.
pub fn from_hex(text: &str) -> Result<Vec<u8>, LedgerError> {
    hex::decode(text).map_err(|e| LedgerError::Decode(format!("invalid hex {:?}: {}", text, e)))
}

/// Parse a JSON-RPC quantity (`0x1a`) into U256.
pub fn parse_quantity(text: &str) -> Result<U256, LedgerError> {
    let digits = text.strip_prefix("0x").unwrap_or(text);
    if digits.is_empty() {
        return Ok(U256::ZERO);
    }
    U256::from_str_radix(digits, 16)
        .map_err(|e| LedgerError::Decode(format!("invalid quantity {:?}: {}", text, e)))
}

/// Format a U256 as a JSON-RPC quantity.
pub fn quantity(value: U256) -> String {
    format!("{:#x}", value)
}

/// Render a wei amount in ether with up to 18 decimals (`1.5`, `2.0`).
pub fn format_ether(wei: U256) -> String {
    let unit = U256::from(10u64).pow(U256::from(18u64));
    let whole = wei / unit;
    let frac = wei % unit;
    if frac.is_zero() {
        return format!("{}.0", whole);
    }
    let frac = format!("{:0>18}", frac.to_string());
    format!("{}.{}", whole, frac.trim_end_matches('0'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::widen;
    use std::str::FromStr;

    #[test]
    fn test_known_selectors() {
        // well-known ERC-20 selector as a sanity check of the hashing path
        assert_eq!(selector("transfer(address,uint256)"), [0xa9, 0x05, 0x9c, 0xbb]);
        assert_eq!(encode_bond().len(), 4);
        assert_eq!(encode_submission_threshold(), selector(SUBMISSION_THRESHOLD).to_vec());
    }

    #[test]
    fn test_encode_get_submitted_tokens() {
        let data = encode_get_submitted_tokens(10);
        assert_eq!(data.len(), 4 + 32);
        assert_eq!(data[35], 10);
        assert!(data[4..35].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_encode_propose_layout() {
        let data = encode_propose(&[7, 300]);
        assert_eq!(data.len(), 4 + 32 * 4);
        let body = &data[4..];
        assert_eq!(decode_uint(&body[0..32]).unwrap(), U256::from(32));
        assert_eq!(decode_uint(&body[32..64]).unwrap(), U256::from(2));
        assert_eq!(decode_uint(&body[64..96]).unwrap(), U256::from(7));
        assert_eq!(decode_uint(&body[96..128]).unwrap(), U256::from(300));
    }

    #[test]
    fn test_propose_body_decodes_as_token_array() {
        let data = encode_propose(&[1, 2, 3]);
        assert_eq!(decode_token_array(&data[4..]).unwrap(), widen(&[1, 2, 3]));
        assert!(decode_token_array(&encode_propose(&[])[4..]).unwrap().is_empty());
    }

    #[test]
    fn test_encode_bonded_balances_pads_address() {
        let account = Address::from_str("0x00000000000000000000000000000000000000ff").unwrap();
        let data = encode_bonded_balances(account);
        assert_eq!(data.len(), 36);
        assert_eq!(data[35], 0xff);
        assert!(data[4..35].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_decode_rejects_truncated_array() {
        let mut body = encode_propose(&[1, 2])[4..].to_vec();
        body.truncate(96);
        assert!(matches!(decode_token_array(&body), Err(LedgerError::Decode(_))));
    }

    #[test]
    fn test_decode_keeps_words_past_u32() {
        let wide = U256::from(1u64 << 32);
        let mut body = Vec::new();
        body.extend_from_slice(&word(U256::from(32)));
        body.extend_from_slice(&word(U256::from(2)));
        body.extend_from_slice(&word(wide));
        body.extend_from_slice(&word(U256::MAX));
        assert_eq!(decode_token_array(&body).unwrap(), vec![wide, U256::MAX]);
    }

    #[test]
    fn test_quantity_roundtrip_and_hex() {
        assert_eq!(parse_quantity("0x1a").unwrap(), U256::from(26));
        assert_eq!(parse_quantity("0x").unwrap(), U256::ZERO);
        assert_eq!(quantity(U256::from(26)), "0x1a");
        assert_eq!(to_hex(&[0xde, 0xad]), "0xdead");
        assert_eq!(from_hex("0xdead").unwrap(), vec![0xde, 0xad]);
    }

    #[test]
    fn test_format_ether() {
        let ether = U256::from(1_000_000_000_000_000_000u128);
        assert_eq!(format_ether(ether), "1.0");
        assert_eq!(format_ether(ether + ether / U256::from(2)), "1.5");
        assert_eq!(format_ether(U256::from(1)), "0.000000000000000001");
        assert_eq!(format_ether(U256::ZERO), "0.0");
    }
}
