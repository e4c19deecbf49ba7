//! Coinbase transaction paying the template's reward to the session address.
//!
//! The block is coinbase-only, so the merkle root equals the coinbase txid and
//! the witness merkle root is all zeros.

use alloc::vec::Vec;

use crate::address::Address;
use crate::hash::double_sha256;
use crate::network::MINER_TAG;

/// Witness commitment header bytes following OP_RETURN.
const WITNESS_COMMITMENT_MAGIC: [u8; 4] = [0xaa, 0x21, 0xa9, 0xed];

/// Builder for the coinbase of a single template.
#[derive(Debug, Clone)]
pub struct CoinbaseBuilder<'a> {
    height: u32,
    payout: &'a Address,
    witness_reserved: [u8; 32],
}

impl<'a> CoinbaseBuilder<'a> {
    pub fn new(height: u32, payout: &'a Address) -> Self {
        CoinbaseBuilder {
            height,
            payout,
            witness_reserved: [0u8; 32],
        }
    }

    /// Build the coinbase paying `reward` satoshis.
    pub fn build(&self, reward: u64) -> CoinbaseTransaction {
        let script_sig = self.script_sig();
        let outputs = [
            (reward, self.payout.script_pubkey().to_vec()),
            (0, witness_commitment_script(&witness_commitment(&self.witness_reserved))),
        ];

        let raw_tx = self.serialize(&script_sig, &outputs, false);
        let raw_tx_with_witness = self.serialize(&script_sig, &outputs, true);

        CoinbaseTransaction {
            txid: double_sha256(&raw_tx),
            raw_tx,
            raw_tx_with_witness,
        }
    }

    /// BIP34 height push followed by the miner tag.
    fn script_sig(&self) -> Vec<u8> {
        let height_bytes = encode_block_height(self.height);
        let mut script_sig = Vec::with_capacity(1 + height_bytes.len() + MINER_TAG.len());
        script_sig.push(height_bytes.len() as u8);
        script_sig.extend_from_slice(&height_bytes);
        script_sig.extend_from_slice(MINER_TAG);
        script_sig
    }

    fn serialize(&self, script_sig: &[u8], outputs: &[(u64, Vec<u8>)], with_witness: bool) -> Vec<u8> {
        let mut tx = Vec::with_capacity(256);

        tx.extend_from_slice(&2u32.to_le_bytes());
        if with_witness {
            // SegWit marker and flag
            tx.extend_from_slice(&[0x00, 0x01]);
        }

        // Single null input
        tx.push(0x01);
        tx.extend_from_slice(&[0u8; 32]);
        tx.extend_from_slice(&u32::MAX.to_le_bytes());
        encode_varint(script_sig.len() as u64, &mut tx);
        tx.extend_from_slice(script_sig);
        tx.extend_from_slice(&u32::MAX.to_le_bytes());

        encode_varint(outputs.len() as u64, &mut tx);
        for (value, script_pubkey) in outputs {
            tx.extend_from_slice(&value.to_le_bytes());
            encode_varint(script_pubkey.len() as u64, &mut tx);
            tx.extend_from_slice(script_pubkey);
        }

        if with_witness {
            // One stack item: the 32-byte witness reserved value
            tx.extend_from_slice(&[0x01, 0x20]);
            tx.extend_from_slice(&self.witness_reserved);
        }

        // Locktime
        tx.extend_from_slice(&0u32.to_le_bytes());
        tx
    }
}

/// A constructed coinbase transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoinbaseTransaction {
    /// Raw transaction without witness (hashed for the txid).
    pub raw_tx: Vec<u8>,
    /// Raw transaction with witness (used in the serialized block).
    pub raw_tx_with_witness: Vec<u8>,
    /// Transaction ID, which is also the block's merkle root.
    pub txid: [u8; 32],
}

/// SHA256d(witness_merkle_root || witness_reserved_value).
///
/// The witness merkle root of a coinbase-only block is all zeros because the
/// coinbase wtxid is defined as zero.
fn witness_commitment(witness_reserved: &[u8; 32]) -> [u8; 32] {
    let mut data = [0u8; 64];
    data[32..].copy_from_slice(witness_reserved);
    double_sha256(&data)
}

/// OP_RETURN <0xaa21a9ed || commitment>
fn witness_commitment_script(commitment: &[u8; 32]) -> Vec<u8> {
    let mut script = Vec::with_capacity(38);
    script.extend_from_slice(&[0x6a, 0x24]);
    script.extend_from_slice(&WITNESS_COMMITMENT_MAGIC);
    script.extend_from_slice(commitment);
    script
}

/// Minimal little-endian height encoding per BIP34.
fn encode_block_height(height: u32) -> Vec<u8> {
    let mut bytes: Vec<u8> = height.to_le_bytes().into_iter().collect();
    while bytes.last() == Some(&0) {
        bytes.pop();
    }
    // Pad so the top bit is not read as a sign bit.
    if bytes.last().is_some_and(|&b| b & 0x80 != 0) {
        bytes.push(0x00);
    }
    bytes
}

/// Bitcoin compact-size integer.
fn encode_varint(value: u64, output: &mut Vec<u8>) {
    match value {
        0..=0xfc => output.push(value as u8),
        0xfd..=0xffff => {
            output.push(0xfd);
            output.extend_from_slice(&(value as u16).to_le_bytes());
        }
        0x1_0000..=0xffff_ffff => {
            output.push(0xfe);
            output.extend_from_slice(&(value as u32).to_le_bytes());
        }
        _ => {
            output.push(0xff);
            output.extend_from_slice(&value.to_le_bytes());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::validate_address;
    use crate::network::Network;
    use alloc::vec;
    use test_case::test_case;

    #[test_case(0, vec![] ; "zero")]
    #[test_case(1, vec![0x01] ; "one")]
    #[test_case(127, vec![0x7f] ; "no sign padding")]
    #[test_case(128, vec![0x80, 0x00] ; "sign padding")]
    #[test_case(256, vec![0x00, 0x01] ; "two bytes")]
    #[test_case(500_000, vec![0x20, 0xa1, 0x07] ; "mainnet height")]
    fn test_encode_block_height(height: u32, expected: Vec<u8>) {
        assert_eq!(encode_block_height(height), expected);
    }

    #[test]
    fn test_encode_varint() {
        let mut output = Vec::new();
        encode_varint(100, &mut output);
        assert_eq!(output, vec![100]);

        output.clear();
        encode_varint(0x1234, &mut output);
        assert_eq!(output, vec![0xfd, 0x34, 0x12]);

        output.clear();
        encode_varint(0x1_0000, &mut output);
        assert_eq!(output, vec![0xfe, 0x00, 0x00, 0x01, 0x00]);
    }

    #[test]
    fn test_witness_commitment_script() {
        let script = witness_commitment_script(&[0xab; 32]);
        assert_eq!(script.len(), 38);
        assert_eq!(&script[..6], &[0x6a, 0x24, 0xaa, 0x21, 0xa9, 0xed]);
        assert_eq!(&script[6..], &[0xab; 32]);
    }

    #[test]
    fn test_coinbase_pays_address() {
        let address = validate_address("bc1qar0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq", Network::Mainnet).unwrap();
        let coinbase = CoinbaseBuilder::new(875_000, &address).build(312_500_000);

        assert_eq!(coinbase.txid, double_sha256(&coinbase.raw_tx));
        // marker, flag and the witness stack
        assert_eq!(coinbase.raw_tx_with_witness.len(), coinbase.raw_tx.len() + 2 + 2 + 32);

        let reward = 312_500_000u64.to_le_bytes();
        let pos = coinbase
            .raw_tx
            .windows(8)
            .position(|w| w == reward)
            .expect("reward output present");
        assert_eq!(coinbase.raw_tx[pos + 8] as usize, address.script_pubkey().len());
        assert_eq!(&coinbase.raw_tx[pos + 9..pos + 9 + 22], address.script_pubkey());
    }

    #[test]
    fn test_coinbase_commits_to_height() {
        let address = validate_address("1BvBMSEYstWetqTFn5Au4m4GFg7xJaNVN2", Network::Mainnet).unwrap();
        let a = CoinbaseBuilder::new(100, &address).build(1);
        let b = CoinbaseBuilder::new(101, &address).build(1);
        assert_ne!(a.txid, b.txid);
    }
}
