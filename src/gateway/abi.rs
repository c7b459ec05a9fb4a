//! Minimal Solidity ABI encoding for the handful of calls the claimer makes.

use sha3::{Digest, Keccak256};

use crate::codec::PackedStatus;

use super::{Address, GatewayError, PositionId};

pub const OWNED_TOKENS: &str = "ownedTokens()";
pub const TOKEN_URI: &str = "tokenURI(uint256)";
pub const MINT_INFO: &str = "mintInfo(uint256)";
pub const BULK_CLAIM_MINT_REWARD: &str = "bulkClaimMintReward(uint256,address)";

const WORD: usize = 32;

pub fn keccak256(data: &[u8]) -> [u8; 32] {
    Keccak256::digest(data).into()
}

/// First four bytes of the keccak hash of a function signature.
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

fn uint_word(v: u64) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[WORD - 8..].copy_from_slice(&v.to_be_bytes());
    word
}

fn address_word(a: &Address) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[WORD - 20..].copy_from_slice(&a.0);
    word
}

fn encode(signature: &str, words: &[[u8; WORD]]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + words.len() * WORD);
    out.extend_from_slice(&selector(signature));
    for w in words {
        out.extend_from_slice(w);
    }
    out
}

pub fn owned_tokens_call() -> Vec<u8> {
    encode(OWNED_TOKENS, &[])
}

pub fn token_uri_call(id: PositionId) -> Vec<u8> {
    encode(TOKEN_URI, &[uint_word(id.0)])
}

pub fn mint_info_call(id: PositionId) -> Vec<u8> {
    encode(MINT_INFO, &[uint_word(id.0)])
}

/// Call data for `bulkClaimMintReward(tokenId, to)`.
pub fn claim_call(id: PositionId, to: &Address) -> Vec<u8> {
    encode(BULK_CLAIM_MINT_REWARD, &[uint_word(id.0), address_word(to)])
}

fn checked_end(start: usize, len: usize) -> Result<usize, GatewayError> {
    start
        .checked_add(len)
        .ok_or_else(|| GatewayError::Decode(format!("offset {start} + {len} overflows")))
}

fn word_at(data: &[u8], offset: usize) -> Result<&[u8], GatewayError> {
    data.get(offset..checked_end(offset, WORD)?)
        .ok_or_else(|| GatewayError::Decode(format!("return data too short for word at {offset}")))
}

/// Reads the head offset and length word of a dynamic value; returns (body start, length).
fn dynamic_header(data: &[u8]) -> Result<(usize, usize), GatewayError> {
    let offset = word_to_usize(word_at(data, 0)?)?;
    let len = word_to_usize(word_at(data, offset)?)?;
    Ok((checked_end(offset, WORD)?, len))
}

fn word_to_usize(word: &[u8]) -> Result<usize, GatewayError> {
    if word[..WORD - 8].iter().any(|b| *b != 0) {
        return Err(GatewayError::Decode("length or offset out of range".into()));
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&word[WORD - 8..]);
    usize::try_from(u64::from_be_bytes(buf))
        .map_err(|_| GatewayError::Decode("length or offset out of range".into()))
}

fn word_to_position(word: &[u8]) -> Result<PositionId, GatewayError> {
    if word[..WORD - 8].iter().any(|b| *b != 0) {
        return Err(GatewayError::Decode(format!(
            "token id 0x{} exceeds 64 bits",
            hex::encode(word)
        )));
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&word[WORD - 8..]);
    Ok(PositionId(u64::from_be_bytes(buf)))
}

pub fn decode_uint256(data: &[u8]) -> Result<PackedStatus, GatewayError> {
    let word = word_at(data, 0)?;
    let mut buf = [0u8; WORD];
    buf.copy_from_slice(word);
    Ok(PackedStatus::from_be_bytes(buf))
}

pub fn decode_position_array(data: &[u8]) -> Result<Vec<PositionId>, GatewayError> {
    let (start, len) = dynamic_header(data)?;
    let body = len
        .checked_mul(WORD)
        .ok_or_else(|| GatewayError::Decode(format!("array length {len} out of range")))?;
    if checked_end(start, body)? > data.len() {
        return Err(GatewayError::Decode(format!(
            "array of {len} ids truncated at {} bytes",
            data.len()
        )));
    }
    (0..len)
        .map(|i| word_at(data, start + i * WORD).and_then(word_to_position))
        .collect()
}

pub fn decode_string(data: &[u8]) -> Result<String, GatewayError> {
    let (start, len) = dynamic_header(data)?;
    let bytes = data
        .get(start..checked_end(start, len)?)
        .ok_or_else(|| GatewayError::Decode("string body truncated".into()))?;
    String::from_utf8(bytes.to_vec()).map_err(|e| GatewayError::Decode(e.to_string()))
}

/// ABI-encodes a `uint256[]` return value. Inverse of [decode_position_array].
pub fn encode_position_array(ids: &[PositionId]) -> Vec<u8> {
    let mut out = Vec::with_capacity((ids.len() + 2) * WORD);
    out.extend_from_slice(&uint_word(WORD as u64));
    out.extend_from_slice(&uint_word(ids.len() as u64));
    for id in ids {
        out.extend_from_slice(&uint_word(id.0));
    }
    out
}

/// ABI-encodes a `string` return value. Inverse of [decode_string].
pub fn encode_string(s: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(2 * WORD + s.len() + WORD);
    out.extend_from_slice(&uint_word(WORD as u64));
    out.extend_from_slice(&uint_word(s.len() as u64));
    out.extend_from_slice(s.as_bytes());
    let pad = (WORD - s.len() % WORD) % WORD;
    out.extend(std::iter::repeat(0u8).take(pad));
    out
}
