//! Legacy (EIP-155) transaction signing.
//!
//! The private key lives in a [SecretString] for the whole run. It is decoded
//! into raw bytes only inside [sign_transaction] / [SigningKey::address], and
//! those bytes are zeroised when the call returns.

use k256::ecdsa::SigningKey as EcdsaKey;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use secrecy::zeroize::Zeroizing;
use secrecy::{ExposeSecret, SecretString};

use crate::error::ClaimError;

use super::abi::keccak256;
use super::{Address, GatewayError, UnsignedTransaction};

/// Hex-encoded secp256k1 private key. `Debug` never prints the key.
pub struct SigningKey {
    secret: SecretString,
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SigningKey([REDACTED])")
    }
}

impl SigningKey {
    /// Validates the key shape up front so a typo fails before any chain call.
    pub fn new(secret: SecretString) -> Result<Self, GatewayError> {
        let key = Self { secret };
        key.with_ecdsa_key(|_| Ok(()))?;
        Ok(key)
    }

    fn with_ecdsa_key<T>(
        &self,
        f: impl FnOnce(&EcdsaKey) -> Result<T, GatewayError>,
    ) -> Result<T, GatewayError> {
        let text = self.secret.expose_secret().trim();
        let digits = text.strip_prefix("0x").unwrap_or(text);
        let bytes = Zeroizing::new(
            hex::decode(digits).map_err(|_| GatewayError::Signing("key is not hex".into()))?,
        );
        let key = EcdsaKey::from_slice(&bytes)
            .map_err(|_| GatewayError::Signing("key is not a valid secp256k1 scalar".into()))?;
        f(&key)
    }

    /// Account address controlled by this key.
    pub fn address(&self) -> Result<Address, GatewayError> {
        self.with_ecdsa_key(|key| Ok(address_of(key)))
    }

    /// Fails unless this key signs for `account`.
    pub fn ensure_controls(&self, account: &Address) -> Result<(), ClaimError> {
        let derived = self.address()?;
        if &derived != account {
            return Err(ClaimError::Config(format!(
                "private key controls {derived}, not {account}"
            )));
        }
        Ok(())
    }
}

fn address_of(key: &EcdsaKey) -> Address {
    let point = key.verifying_key().to_encoded_point(false);
    let hash = keccak256(&point.as_bytes()[1..]);
    let mut out = [0u8; 20];
    out.copy_from_slice(&hash[12..]);
    Address(out)
}

fn trim_leading_zeros(bytes: &[u8]) -> &[u8] {
    let first = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    &bytes[first..]
}

fn rlp_length_prefix(out: &mut Vec<u8>, len: usize, offset: u8) {
    if len < 56 {
        out.push(offset + len as u8);
    } else {
        let len_bytes = len.to_be_bytes();
        let trimmed = trim_leading_zeros(&len_bytes);
        out.push(offset + 55 + trimmed.len() as u8);
        out.extend_from_slice(trimmed);
    }
}

fn rlp_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    if bytes.len() == 1 && bytes[0] < 0x80 {
        out.push(bytes[0]);
    } else {
        rlp_length_prefix(out, bytes.len(), 0x80);
        out.extend_from_slice(bytes);
    }
}

fn rlp_uint(out: &mut Vec<u8>, v: u128) {
    rlp_bytes(out, trim_leading_zeros(&v.to_be_bytes()));
}

fn rlp_list(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 9);
    rlp_length_prefix(&mut out, payload.len(), 0xc0);
    out.extend_from_slice(payload);
    out
}

fn rlp_common_fields(tx: &UnsignedTransaction) -> Vec<u8> {
    let mut body = Vec::with_capacity(64 + tx.data.len());
    rlp_uint(&mut body, u128::from(tx.nonce));
    rlp_uint(&mut body, tx.gas_price);
    rlp_uint(&mut body, u128::from(tx.gas_limit));
    rlp_bytes(&mut body, &tx.to.0);
    rlp_uint(&mut body, tx.value);
    rlp_bytes(&mut body, &tx.data);
    body
}

/// Keccak hash that EIP-155 signs: `rlp([nonce, gasPrice, gas, to, value, data, chainId, 0, 0])`.
pub fn signing_hash(tx: &UnsignedTransaction) -> [u8; 32] {
    let mut body = rlp_common_fields(tx);
    rlp_uint(&mut body, u128::from(tx.chain_id));
    rlp_uint(&mut body, 0);
    rlp_uint(&mut body, 0);
    keccak256(&rlp_list(&body))
}

/// Returns the raw signed transaction ready for `eth_sendRawTransaction`.
pub fn sign_transaction(tx: &UnsignedTransaction, key: &SigningKey) -> Result<Vec<u8>, GatewayError> {
    let hash = signing_hash(tx);
    let (signature, recovery_id) = key.with_ecdsa_key(|k| {
        k.sign_prehash_recoverable(&hash)
            .map_err(|e| GatewayError::Signing(e.to_string()))
    })?;

    let v = u128::from(tx.chain_id) * 2 + 35 + u128::from(recovery_id.to_byte());
    let sig_bytes = signature.to_bytes();
    let (r, s) = sig_bytes.split_at(32);

    let mut body = rlp_common_fields(tx);
    rlp_uint(&mut body, v);
    rlp_bytes(&mut body, trim_leading_zeros(r));
    rlp_bytes(&mut body, trim_leading_zeros(s));
    Ok(rlp_list(&body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};

    fn key(hex_key: &str) -> SigningKey {
        SigningKey::new(SecretString::from(hex_key.to_string())).unwrap()
    }

    fn eip155_example() -> UnsignedTransaction {
        UnsignedTransaction {
            nonce: 9,
            gas_price: 20_000_000_000,
            gas_limit: 21_000,
            to: "0x3535353535353535353535353535353535353535".parse().unwrap(),
            value: 1_000_000_000_000_000_000,
            data: vec![],
            chain_id: 1,
        }
    }

    #[test]
    fn derives_known_addresses() {
        let one = key("0x0000000000000000000000000000000000000000000000000000000000000001");
        assert_eq!(
            one.address().unwrap().to_string(),
            "0x7e5f4552091a69125d5dfcb7b8c2659029395bdf"
        );
        let eip155 = key("4646464646464646464646464646464646464646464646464646464646464646");
        assert_eq!(
            eip155.address().unwrap().to_string(),
            "0x9d8a62f656a8d1615c1294fd71e9cfb3e4855a4f"
        );
    }

    #[test]
    fn account_must_match_key() {
        let k = key("4646464646464646464646464646464646464646464646464646464646464646");
        let own: Address = "0x9D8A62F656A8D1615C1294FD71E9CFB3E4855A4F".parse().unwrap();
        assert!(k.ensure_controls(&own).is_ok());

        let other: Address = "0x7e5f4552091a69125d5dfcb7b8c2659029395bdf".parse().unwrap();
        match k.ensure_controls(&other) {
            Err(ClaimError::Config(msg)) => {
                assert!(msg.contains("0x7e5f4552091a69125d5dfcb7b8c2659029395bdf"));
                assert!(!msg.contains("4646"));
            }
            res => panic!("expected config error, got {res:?}"),
        }
    }

    #[test]
    fn rejects_malformed_keys() {
        assert!(SigningKey::new(SecretString::from("zz".to_string())).is_err());
        assert!(SigningKey::new(SecretString::from("00".repeat(32))).is_err());
        assert!(SigningKey::new(SecretString::from("0102".to_string())).is_err());
    }

    #[test]
    fn debug_is_redacted() {
        let k = key("4646464646464646464646464646464646464646464646464646464646464646");
        assert!(!format!("{k:?}").contains("4646"));
    }

    #[test]
    fn signing_hash_matches_eip155_example() {
        assert_eq!(
            hex::encode(signing_hash(&eip155_example())),
            "daf5a779ae972f972197303d7b574746c7ef83eadac0f2791ad23db92e4c8e53"
        );
    }

    /// Splits a flat RLP list of byte strings into its items.
    fn rlp_items(raw: &[u8]) -> Vec<Vec<u8>> {
        let read_len = |bytes: &[u8]| bytes.iter().fold(0usize, |acc, b| (acc << 8) | *b as usize);
        let (mut pos, end) = match raw[0] {
            h @ 0xc0..=0xf7 => (1, 1 + (h - 0xc0) as usize),
            h => {
                let n = (h - 0xf7) as usize;
                (1 + n, 1 + n + read_len(&raw[1..1 + n]))
            }
        };
        assert_eq!(end, raw.len());
        let mut items = Vec::new();
        while pos < end {
            let h = raw[pos];
            let (start, len) = match h {
                0x00..=0x7f => (pos, 1),
                0x80..=0xb7 => (pos + 1, (h - 0x80) as usize),
                _ => {
                    let n = (h - 0xb7) as usize;
                    (pos + 1 + n, read_len(&raw[pos + 1..pos + 1 + n]))
                }
            };
            items.push(raw[start..start + len].to_vec());
            pos = start + len;
        }
        items
    }

    #[test]
    fn signed_transaction_recovers_to_signer() {
        let k = key("4646464646464646464646464646464646464646464646464646464646464646");
        let tx = eip155_example();
        let raw = sign_transaction(&tx, &k).unwrap();

        let items = rlp_items(&raw);
        assert_eq!(items.len(), 9);
        assert_eq!(items[0], vec![9]);
        assert_eq!(items[3], tx.to.0.to_vec());
        assert!(items[5].is_empty());
        assert_eq!(items[6].len(), 1);
        let v = items[6][0];
        assert!(v == 37 || v == 38);

        let mut rs = [0u8; 64];
        rs[32 - items[7].len()..32].copy_from_slice(&items[7]);
        rs[64 - items[8].len()..].copy_from_slice(&items[8]);
        let sig = Signature::from_slice(&rs).unwrap();
        let recid = RecoveryId::from_byte(v - 37).unwrap();
        let recovered =
            VerifyingKey::recover_from_prehash(&signing_hash(&tx), &sig, recid).unwrap();
        let expected = k.with_ecdsa_key(|ek| Ok(ek.verifying_key().clone())).unwrap();
        assert_eq!(recovered, expected);
    }

    #[test]
    fn rlp_encodes_long_payloads() {
        let mut out = Vec::new();
        rlp_bytes(&mut out, &[0xaa; 60]);
        assert_eq!(&out[..2], &[0xb8, 60]);
        let mut zero = Vec::new();
        rlp_uint(&mut zero, 0);
        assert_eq!(zero, vec![0x80]);
        let mut small = Vec::new();
        rlp_uint(&mut small, 0x7f);
        assert_eq!(small, vec![0x7f]);
    }
}
