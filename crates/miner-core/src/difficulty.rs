//! Difficulty target conversion, subsidy schedule and hash ranking.
//!
//! Targets are 256-bit unsigned integers stored big-endian, so the derived
//! byte-wise ordering of [`Target`] is numeric ordering. Block hashes come out
//! of SHA256 in little-endian order and are compared against a target only
//! after reversal, see [`Target::is_met_by`].

use alloc::format;
use alloc::string::String;
use core::fmt;

use crate::hash::reverse_bytes;

/// Compact bits of the minimum-difficulty ("difficulty 1") target.
pub const POW_LIMIT_BITS: u32 = 0x1d00ffff;

/// Leading zero bits a hash needs to count as a share.
///
/// 8 bits means one zero byte, so shares display as "00..." in hex and arrive
/// roughly once every 256 hashes.
pub const SHARE_THRESHOLD_BITS: u8 = 8;

/// Initial block subsidy in satoshis (50 BTC).
pub const INITIAL_SUBSIDY: u64 = 5_000_000_000;

/// Blocks between subsidy halvings.
pub const HALVING_INTERVAL: u32 = 210_000;

/// A 256-bit proof-of-work threshold, big-endian.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Target([u8; 32]);

impl Target {
    /// The zero target. No hash can meet it except the all-zero hash.
    pub const ZERO: Target = Target([0u8; 32]);

    /// Wrap raw big-endian bytes.
    pub const fn from_be_bytes(bytes: [u8; 32]) -> Self {
        Target(bytes)
    }

    /// Expand a compact "bits" value.
    ///
    /// The bits format is `[exponent (1 byte)][mantissa (3 bytes)]` and
    /// encodes `mantissa * 256^(exponent - 3)`. Negative encodings and values
    /// that do not fit in 256 bits yield [`Target::ZERO`].
    pub fn from_bits(bits: u32) -> Self {
        let exponent = (bits >> 24) as isize;
        let mantissa = bits & 0x007f_ffff;

        if bits & 0x0080_0000 != 0 && mantissa != 0 {
            return Target::ZERO;
        }

        let mantissa_bytes = [(mantissa >> 16) as u8, (mantissa >> 8) as u8, mantissa as u8];
        let mut target = [0u8; 32];

        for (i, &byte) in mantissa_bytes.iter().enumerate() {
            let pos = 32 - exponent + i as isize;
            if pos > 31 {
                // Shifted below the least significant byte.
                continue;
            }
            if pos < 0 {
                if byte != 0 {
                    return Target::ZERO;
                }
                continue;
            }
            target[pos as usize] = byte;
        }

        Target(target)
    }

    /// Encode back into compact "bits" form.
    ///
    /// Precision beyond the three most significant bytes is lost.
    pub fn to_bits(&self) -> u32 {
        let first_nonzero = match self.0.iter().position(|&b| b != 0) {
            Some(pos) => pos,
            None => return 0,
        };

        let mut exponent = (32 - first_nonzero) as u32;
        let mut mantissa: u32 = 0;
        for i in 0..3 {
            let byte = self.0.get(first_nonzero + i).copied().unwrap_or(0);
            mantissa = (mantissa << 8) | byte as u32;
        }

        // Keep the sign bit clear.
        if mantissa & 0x0080_0000 != 0 {
            mantissa >>= 8;
            exponent += 1;
        }

        (exponent << 24) | mantissa
    }

    /// Big-endian bytes of the target.
    pub fn as_be_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Leading zero bits of the target itself.
    pub fn leading_zero_bits(&self) -> u32 {
        count_leading_zeros_be(&self.0)
    }

    /// Whether a hash (internal little-endian byte order) is numerically
    /// less than or equal to this target.
    #[inline]
    pub fn is_met_by(&self, hash: &[u8; 32]) -> bool {
        reverse_bytes(hash) <= self.0
    }

    /// Approximate value as f64.
    pub fn to_f64(&self) -> f64 {
        self.0.iter().fold(0.0, |acc, &b| acc * 256.0 + b as f64)
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Target({})", hex::encode(self.0))
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Expand compact bits into a target.
pub fn target_from_bits(bits: u32) -> Target {
    Target::from_bits(bits)
}

/// Difficulty relative to the minimum-difficulty target.
///
/// Difficulty = pow_limit_target / current_target.
pub fn bits_to_difficulty(bits: u32) -> f64 {
    let current = Target::from_bits(bits).to_f64();
    if current == 0.0 {
        return f64::INFINITY;
    }
    Target::from_bits(POW_LIMIT_BITS).to_f64() / current
}

/// Format a difficulty with two decimals and a K/M/B/T suffix.
pub fn format_difficulty(difficulty: f64) -> String {
    if !difficulty.is_finite() {
        return String::from("∞");
    }
    if difficulty >= 1e12 {
        format!("{:.2}T", difficulty / 1e12)
    } else if difficulty >= 1e9 {
        format!("{:.2}B", difficulty / 1e9)
    } else if difficulty >= 1e6 {
        format!("{:.2}M", difficulty / 1e6)
    } else if difficulty >= 1e3 {
        format!("{:.2}K", difficulty / 1e3)
    } else {
        format!("{:.2}", difficulty)
    }
}

/// Human-readable difficulty for compact bits, e.g. "95.67T".
pub fn difficulty_display(bits: u32) -> String {
    format_difficulty(bits_to_difficulty(bits))
}

/// Average number of hashes needed to meet the target for `bits`.
pub fn expected_hashes(bits: u32) -> f64 {
    // difficulty 1 takes 2^32 hashes on average
    bits_to_difficulty(bits) * 4_294_967_296.0
}

/// Block subsidy in satoshis at the given height.
pub fn subsidy_for_height(height: u32) -> u64 {
    let halvings = height / HALVING_INTERVAL;
    if halvings >= 64 {
        return 0;
    }
    INITIAL_SUBSIDY >> halvings
}

/// Count leading zero bits of a hash as it is displayed.
///
/// Hashes are displayed byte-reversed, so the zeros visible at the start of a
/// block hash are the trailing bytes of the internal array. The count
/// saturates at 255 for the all-zero hash.
pub fn leading_zero_bits(hash: &[u8; 32]) -> u8 {
    let zeros = count_leading_zeros_be(&reverse_bytes(hash));
    zeros.min(u8::MAX as u32) as u8
}

fn count_leading_zeros_be(bytes: &[u8; 32]) -> u32 {
    let mut zeros = 0u32;
    for byte in bytes {
        if *byte == 0 {
            zeros += 8;
        } else {
            zeros += byte.leading_zeros();
            break;
        }
    }
    zeros
}
