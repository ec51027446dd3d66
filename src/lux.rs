//! Fixed-point conversion from raw channel counts to lux.
//!
//! This is the empirical formula from the TSL2561 datasheet: both channels are
//! normalized to the 402ms / 16x reference, the IR-to-broadband ratio picks one
//! of eight linear segments, and the segment's coefficients approximate the
//! human eye response. Everything is integer math so it runs on cores without
//! an FPU.

use crate::{Gain, Integration, Package};

/// Lux values are scaled by 2^LUX_SCALE
pub const LUX_SCALE: u32 = 14;
/// Channel ratios are scaled by 2^RATIO_SCALE
pub const RATIO_SCALE: u32 = 9;
/// Channel values are scaled by 2^CH_SCALE
pub const CH_SCALE: u32 = 10;
/// 322/11 * 2^CH_SCALE, normalizes a 13.7ms window to 402ms
pub const CHSCALE_TINT0: u32 = 0x7517;
/// 322/81 * 2^CH_SCALE, normalizes a 101ms window to 402ms
pub const CHSCALE_TINT1: u32 = 0x0fe7;

/// One linear piece of the lux approximation.
///
/// Applies to ratios up to and including `k`: `lux = ch0 * b - ch1 * m`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LuxSegment {
    pub k: u32,
    pub b: u32,
    pub m: u32,
}

const fn seg(k: u32, b: u32, m: u32) -> LuxSegment {
    LuxSegment { k, b, m }
}

/// T, FN and CL packages
pub const TABLE_T: [LuxSegment; 8] = [
    seg(0x0040, 0x01f2, 0x01be), // 0.125: 0.0304, 0.0272
    seg(0x0080, 0x0214, 0x02d1), // 0.250: 0.0325, 0.0440
    seg(0x00c0, 0x023f, 0x037b), // 0.375: 0.0351, 0.0544
    seg(0x0100, 0x0270, 0x03fe), // 0.50:  0.0381, 0.0624
    seg(0x0138, 0x016f, 0x01fc), // 0.61:  0.0224, 0.0310
    seg(0x019a, 0x00d2, 0x00fb), // 0.80:  0.0128, 0.0153
    seg(0x029a, 0x0018, 0x0012), // 1.30:  0.00146, 0.00112
    seg(0x029a, 0x0000, 0x0000), // > 1.30
];

/// CS (chipscale) package
pub const TABLE_CS: [LuxSegment; 8] = [
    seg(0x0043, 0x0204, 0x01ad), // 0.130: 0.0315, 0.0262
    seg(0x0085, 0x0228, 0x02c1), // 0.260: 0.0337, 0.0430
    seg(0x00c8, 0x0253, 0x0363), // 0.390: 0.0363, 0.0529
    seg(0x010a, 0x0282, 0x03df), // 0.520: 0.0392, 0.0605
    seg(0x014d, 0x0177, 0x01dd), // 0.65:  0.0229, 0.0291
    seg(0x019a, 0x0101, 0x0127), // 0.80:  0.0157, 0.0180
    seg(0x029a, 0x0037, 0x002b), // 1.30:  0.00338, 0.00260
    seg(0x029a, 0x0000, 0x0000), // > 1.30
];

impl Package {
    pub fn table(self) -> &'static [LuxSegment; 8] {
        match self {
            Package::T => &TABLE_T,
            Package::Cs => &TABLE_CS,
        }
    }
}

/// Channel scale for the given timing, in units of 2^-CH_SCALE.
pub fn channel_scale(integration: Integration, gain: Gain) -> u32 {
    let scale = match integration {
        Integration::T13ms => CHSCALE_TINT0,
        Integration::T101ms => CHSCALE_TINT1,
        Integration::T402ms => 1u32 << CH_SCALE,
    };

    // 16x is the reference gain
    match gain {
        Gain::X1 => scale << 4,
        Gain::X16 => scale,
    }
}

/// Rounded ch1/ch0 ratio in units of 2^-RATIO_SCALE. Zero when `ch0` is zero.
pub fn channel_ratio(ch0: u64, ch1: u64) -> u64 {
    let ratio = if ch0 != 0 {
        (ch1 << (RATIO_SCALE + 1)) / ch0
    } else {
        0
    };

    (ratio + 1) >> 1
}

/// Index of the first segment whose upper bound is >= `ratio`, the last one otherwise.
pub fn segment_index(ratio: u64, package: Package) -> usize {
    let table = package.table();
    table
        .iter()
        .position(|seg| ratio <= u64::from(seg.k))
        .unwrap_or(table.len() - 1)
}

/// Converts a raw channel pair into lux.
///
/// Total over its whole input domain: a dark broadband channel gives a ratio of
/// zero instead of dividing by zero, and negative intermediate results clamp to 0.
pub fn compute_lux(
    ch0: u16,
    ch1: u16,
    integration: Integration,
    gain: Gain,
    package: Package,
) -> u32 {
    let scale = u64::from(channel_scale(integration, gain));
    let channel0 = (u64::from(ch0) * scale) >> CH_SCALE;
    let channel1 = (u64::from(ch1) * scale) >> CH_SCALE;

    let ratio = channel_ratio(channel0, channel1);
    let seg = package.table()[segment_index(ratio, package)];

    let lux = (channel0 * u64::from(seg.b)).saturating_sub(channel1 * u64::from(seg.m));
    let lux = (lux + (1u64 << (LUX_SCALE - 1))) >> LUX_SCALE;

    u32::try_from(lux).unwrap_or(u32::MAX)
}
