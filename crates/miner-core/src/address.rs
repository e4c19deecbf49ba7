//! Bitcoin address validation and scriptPubKey generation.
//!
//! Validation happens in two stages. A network-scoped prefix gate rejects
//! empty input, unknown prefixes and addresses for the other network. The
//! address is then fully decoded (Base58Check or Bech32/Bech32m) so the
//! coinbase can pay to its scriptPubKey.
//!
//! Supports:
//! - P2PKH - Legacy addresses starting with 1 (mainnet) or m/n (testnet)
//! - P2SH - Addresses starting with 3 (mainnet) or 2 (testnet)
//! - P2WPKH / P2WSH - Native SegWit v0, bc1q.../tb1q...
//! - P2TR - SegWit v1, bc1p.../tb1p...

use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::fmt;

use thiserror::Error;

use crate::hash::double_sha256;
use crate::network::Network;

/// Why an address was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidAddressReason {
    #[error("address is empty")]
    Empty,
    #[error("address prefix is not recognised")]
    UnknownPrefix,
    #[error("address belongs to {found}, expected {expected}")]
    WrongNetwork { expected: Network, found: Network },
    #[error("invalid address format")]
    InvalidFormat,
    #[error("invalid Base58 character: {0}")]
    InvalidBase58Char(char),
    #[error("invalid checksum")]
    InvalidChecksum,
    #[error("invalid Bech32 encoding: {0}")]
    InvalidBech32(&'static str),
    #[error("invalid witness version: {0}")]
    InvalidWitnessVersion(u8),
    #[error("invalid witness program length: {0}")]
    InvalidWitnessProgramLength(usize),
    #[error("unsupported address type")]
    UnsupportedType,
}

/// A rejected reward address.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid address: {reason}")]
pub struct InvalidAddressError {
    pub reason: InvalidAddressReason,
}

impl From<InvalidAddressReason> for InvalidAddressError {
    fn from(reason: InvalidAddressReason) -> Self {
        InvalidAddressError { reason }
    }
}

/// Bitcoin address type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressType {
    /// Legacy P2PKH: OP_DUP OP_HASH160 <20-byte-hash> OP_EQUALVERIFY OP_CHECKSIG
    P2PKH,
    /// P2SH: OP_HASH160 <20-byte-hash> OP_EQUAL
    P2SH,
    /// Native SegWit v0 P2WPKH: OP_0 <20-byte-hash>
    P2WPKH,
    /// Native SegWit v0 P2WSH: OP_0 <32-byte-hash>
    P2WSH,
    /// Taproot P2TR: OP_1 <32-byte-x-only-pubkey>
    P2TR,
}

impl AddressType {
    pub fn name(&self) -> &'static str {
        match self {
            AddressType::P2PKH => "P2PKH",
            AddressType::P2SH => "P2SH",
            AddressType::P2WPKH => "P2WPKH",
            AddressType::P2WSH => "P2WSH",
            AddressType::P2TR => "P2TR",
        }
    }
}

/// A validated reward address, tagged with the network it was checked
/// against. Never mutated after validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    display: String,
    network: Network,
    address_type: AddressType,
    script_pubkey: Vec<u8>,
}

impl Address {
    /// The address as the user entered it (trimmed).
    pub fn as_str(&self) -> &str {
        &self.display
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn address_type(&self) -> AddressType {
        self.address_type
    }

    /// The scriptPubKey paid by the coinbase reward output.
    pub fn script_pubkey(&self) -> &[u8] {
        &self.script_pubkey
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display)
    }
}

/// Validate a Bitcoin address for the given network.
pub fn validate_address(address: &str, network: Network) -> Result<Address, InvalidAddressError> {
    let trimmed = address.trim();
    if trimmed.is_empty() {
        return Err(InvalidAddressReason::Empty.into());
    }

    match network_for_prefix(trimmed) {
        Some(found) if found == network => {}
        Some(found) => {
            return Err(InvalidAddressReason::WrongNetwork { expected: network, found }.into());
        }
        None => return Err(InvalidAddressReason::UnknownPrefix.into()),
    }

    let prefix = format_prefix(network);
    let (address_type, script_pubkey) = if trimmed.to_ascii_lowercase().starts_with(&prefix) {
        decode_segwit(trimmed, network)?
    } else {
        decode_base58(trimmed, network)?
    };

    Ok(Address {
        display: trimmed.to_string(),
        network,
        address_type,
        script_pubkey,
    })
}

fn format_prefix(network: Network) -> String {
    let mut prefix = String::from(network.bech32_hrp());
    prefix.push('1');
    prefix
}

/// Which network's prefix table the address matches, if any.
fn network_for_prefix(address: &str) -> Option<Network> {
    let lower = address.to_ascii_lowercase();
    Network::ALL.into_iter().find(|network| {
        network.address_prefixes().iter().any(|prefix| {
            // Bech32 is case-insensitive, Base58 is not.
            if prefix.len() > 1 {
                lower.starts_with(prefix)
            } else {
                address.starts_with(prefix)
            }
        })
    })
}

fn decode_base58(address: &str, network: Network) -> Result<(AddressType, Vec<u8>), InvalidAddressReason> {
    let decoded = base58_decode(address)?;
    if decoded.len() != 25 {
        return Err(InvalidAddressReason::InvalidFormat);
    }

    let (payload, checksum) = decoded.split_at(21);
    if checksum != &double_sha256(payload)[..4] {
        return Err(InvalidAddressReason::InvalidChecksum);
    }

    let (version, hash) = (payload[0], &payload[1..]);
    let mut script = Vec::with_capacity(25);
    let address_type = if version == network.p2pkh_version() {
        // OP_DUP OP_HASH160 <20> <hash> OP_EQUALVERIFY OP_CHECKSIG
        script.extend_from_slice(&[0x76, 0xa9, 0x14]);
        script.extend_from_slice(hash);
        script.extend_from_slice(&[0x88, 0xac]);
        AddressType::P2PKH
    } else if version == network.p2sh_version() {
        // OP_HASH160 <20> <hash> OP_EQUAL
        script.extend_from_slice(&[0xa9, 0x14]);
        script.extend_from_slice(hash);
        script.push(0x87);
        AddressType::P2SH
    } else {
        return Err(InvalidAddressReason::InvalidFormat);
    };

    Ok((address_type, script))
}

fn decode_segwit(address: &str, network: Network) -> Result<(AddressType, Vec<u8>), InvalidAddressReason> {
    let (hrp, data, variant) = bech32_decode(address)?;
    if hrp != network.bech32_hrp() {
        return Err(InvalidAddressReason::InvalidBech32("unexpected human-readable part"));
    }

    let (&witness_version, program_5bit) = data.split_first().ok_or(InvalidAddressReason::InvalidFormat)?;
    let program = convert_bits(program_5bit, 5, 8)?;

    match (witness_version, variant) {
        (0, Bech32Variant::Bech32) | (1..=16, Bech32Variant::Bech32m) => {}
        (0, _) => return Err(InvalidAddressReason::InvalidBech32("SegWit v0 must use Bech32")),
        (1..=16, _) => return Err(InvalidAddressReason::InvalidBech32("SegWit v1+ must use Bech32m")),
        (v, _) => return Err(InvalidAddressReason::InvalidWitnessVersion(v)),
    }

    let address_type = match (witness_version, program.len()) {
        (0, 20) => AddressType::P2WPKH,
        (0, 32) => AddressType::P2WSH,
        (1, 32) => AddressType::P2TR,
        (v, len) if v > 1 && (2..=40).contains(&len) => return Err(InvalidAddressReason::UnsupportedType),
        (_, len) => return Err(InvalidAddressReason::InvalidWitnessProgramLength(len)),
    };

    // OP_0 = 0x00, OP_1..OP_16 = 0x51..0x60
    let version_opcode = if witness_version == 0 { 0x00 } else { 0x50 + witness_version };
    let mut script = Vec::with_capacity(2 + program.len());
    script.push(version_opcode);
    script.push(program.len() as u8);
    script.extend_from_slice(&program);

    Ok((address_type, script))
}

// ============================================================================
// Base58
// ============================================================================

const BASE58_ALPHABET: &[u8; 58] = b"123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

fn base58_decode(input: &str) -> Result<Vec<u8>, InvalidAddressReason> {
    // Accumulated little-endian, reversed at the end.
    let mut bytes: Vec<u8> = Vec::with_capacity(input.len());

    for c in input.chars() {
        let digit = BASE58_ALPHABET
            .iter()
            .position(|&x| x as char == c)
            .ok_or(InvalidAddressReason::InvalidBase58Char(c))? as u32;

        let mut carry = digit;
        for byte in bytes.iter_mut() {
            carry += (*byte as u32) * 58;
            *byte = carry as u8;
            carry >>= 8;
        }
        while carry > 0 {
            bytes.push(carry as u8);
            carry >>= 8;
        }
    }

    // Each leading '1' encodes a leading zero byte.
    let leading_zeros = input.chars().take_while(|&c| c == '1').count();
    bytes.extend(core::iter::repeat(0u8).take(leading_zeros));
    bytes.reverse();

    Ok(bytes)
}

// ============================================================================
// Bech32 / Bech32m
// ============================================================================

const BECH32_CHARSET: &[u8; 32] = b"qpzry9x8gf2tvdw0s3jn54khce6mua7l";
const BECH32M_CONST: u32 = 0x2bc830a3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bech32Variant {
    Bech32,
    Bech32m,
}

fn bech32_decode(input: &str) -> Result<(String, Vec<u8>, Bech32Variant), InvalidAddressReason> {
    if input.len() > 90 {
        return Err(InvalidAddressReason::InvalidBech32("too long"));
    }
    let has_lower = input.bytes().any(|b| b.is_ascii_lowercase());
    let has_upper = input.bytes().any(|b| b.is_ascii_uppercase());
    if has_lower && has_upper {
        return Err(InvalidAddressReason::InvalidBech32("mixed case"));
    }

    let lower = input.to_ascii_lowercase();
    let sep = lower
        .rfind('1')
        .ok_or(InvalidAddressReason::InvalidBech32("no separator found"))?;
    if sep == 0 || sep + 7 > lower.len() {
        return Err(InvalidAddressReason::InvalidBech32("invalid separator position"));
    }

    let (hrp, data_part) = (&lower[..sep], &lower[sep + 1..]);
    let mut data = data_part
        .bytes()
        .map(|c| {
            BECH32_CHARSET
                .iter()
                .position(|&x| x == c)
                .map(|idx| idx as u8)
                .ok_or(InvalidAddressReason::InvalidBech32("invalid character"))
        })
        .collect::<Result<Vec<u8>, _>>()?;

    let variant = match bech32_polymod(&hrp_expand(hrp), &data) {
        1 => Bech32Variant::Bech32,
        BECH32M_CONST => Bech32Variant::Bech32m,
        _ => return Err(InvalidAddressReason::InvalidChecksum),
    };

    data.truncate(data.len() - 6);
    Ok((hrp.to_string(), data, variant))
}

fn hrp_expand(hrp: &str) -> Vec<u8> {
    let mut result = Vec::with_capacity(hrp.len() * 2 + 1);
    result.extend(hrp.bytes().map(|c| c >> 5));
    result.push(0);
    result.extend(hrp.bytes().map(|c| c & 31));
    result
}

fn bech32_polymod(hrp: &[u8], data: &[u8]) -> u32 {
    const GEN: [u32; 5] = [0x3b6a57b2, 0x26508e6d, 0x1ea119fa, 0x3d4233dd, 0x2a1462b3];

    let mut chk: u32 = 1;
    for &value in hrp.iter().chain(data.iter()) {
        let top = chk >> 25;
        chk = ((chk & 0x1ffffff) << 5) ^ (value as u32);
        for (i, &g) in GEN.iter().enumerate() {
            if (top >> i) & 1 == 1 {
                chk ^= g;
            }
        }
    }
    chk
}

/// Regroup 5-bit words into bytes, rejecting non-zero padding.
fn convert_bits(data: &[u8], from_bits: u8, to_bits: u8) -> Result<Vec<u8>, InvalidAddressReason> {
    let mut acc: u32 = 0;
    let mut bits: u8 = 0;
    let mut result = Vec::with_capacity(data.len() * from_bits as usize / to_bits as usize);
    let max_value = (1u32 << to_bits) - 1;

    for &value in data {
        if value >> from_bits != 0 {
            return Err(InvalidAddressReason::InvalidBech32("invalid value in data"));
        }
        acc = (acc << from_bits) | value as u32;
        bits += from_bits;
        while bits >= to_bits {
            bits -= to_bits;
            result.push(((acc >> bits) & max_value) as u8);
        }
    }

    if bits >= from_bits || ((acc << (to_bits - bits)) & max_value) != 0 {
        return Err(InvalidAddressReason::InvalidBech32("invalid padding"));
    }

    Ok(result)
}
