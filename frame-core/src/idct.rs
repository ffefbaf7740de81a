//! Integer 8x8 inverse DCT.
//!
//! IJG "islow" (Loeffler-Ligtenberg-Moschytz) in two separable passes,
//! rows then columns, with 13-bit fixed-point constants and two extra
//! fraction bits carried between passes. No floating point, no divides.
//!
//! Precision: for coefficients an 8-bit baseline encoder can produce,
//! every output sample is within ±2 levels of a double-precision
//! reference IDCT, and usually within ±1.
//!
//! The butterflies run in `i64`, so any input within [`COEF_LIMIT`]
//! produces clamped samples rather than an arithmetic overflow.

/// Largest dequantized coefficient magnitude the decoder passes in.
/// Legal 8-bit data stays well below it.
pub const COEF_LIMIT: i32 = 1 << 14;

// fixed-point constants, FIX(x) = round(x * 2^13)
const CB: i64 = 13;
const P1: i64 = 2;
const F0298: i64 = 2446;
const F0390: i64 = 3196;
const F0541: i64 = 4433;
const F0765: i64 = 6270;
const F0899: i64 = 7373;
const F1175: i64 = 9633;
const F1501: i64 = 12299;
const F1847: i64 = 15137;
const F1961: i64 = 16069;
const F2053: i64 = 16819;
const F2562: i64 = 20995;
const F3072: i64 = 25172;

/// Transform a dequantized coefficient block (natural order) into
/// level-shifted, clamped samples. Coefficients beyond ±[`COEF_LIMIT`]
/// are treated as the limit.
pub fn transform(block: &[i32; 64], out: &mut [u8; 64]) {
    let mut ws = [0i64; 64];

    for row in 0..8 {
        let b = row * 8;
        let mut d = [0i64; 8];
        for (v, &c) in d.iter_mut().zip(&block[b..b + 8]) {
            *v = c.clamp(-COEF_LIMIT, COEF_LIMIT) as i64;
        }

        if d[1..].iter().all(|&v| v == 0) {
            ws[b..b + 8].fill(d[0] << P1);
            continue;
        }

        let o = butterfly(d);
        let sh = CB - P1;
        for i in 0..8 {
            ws[b + i] = descale(o[i], sh);
        }
    }

    for col in 0..8 {
        let d = [
            ws[col],
            ws[col + 8],
            ws[col + 16],
            ws[col + 24],
            ws[col + 32],
            ws[col + 40],
            ws[col + 48],
            ws[col + 56],
        ];

        if d[1..].iter().all(|&v| v == 0) {
            let v = clamp(descale(d[0], P1 + 3) + 128);
            for r in 0..8 {
                out[col + r * 8] = v;
            }
            continue;
        }

        let o = butterfly(d);
        let sh = CB + P1 + 3;
        for r in 0..8 {
            out[col + r * 8] = clamp(descale(o[r], sh) + 128);
        }
    }
}

// one 1-D pass; outputs still scaled by 2^CB
#[inline]
fn butterfly(d: [i64; 8]) -> [i64; 8] {
    // even part
    let z1 = (d[2] + d[6]) * F0541;
    let tmp2 = z1 - d[6] * F1847;
    let tmp3 = z1 + d[2] * F0765;
    let tmp0 = (d[0] + d[4]) << CB;
    let tmp1 = (d[0] - d[4]) << CB;
    let (t10, t13) = (tmp0 + tmp3, tmp0 - tmp3);
    let (t11, t12) = (tmp1 + tmp2, tmp1 - tmp2);

    // odd part
    let (zz1, zz2, zz3, zz4) = (d[7] + d[1], d[5] + d[3], d[7] + d[3], d[5] + d[1]);
    let z5 = (zz3 + zz4) * F1175;
    let mut o0 = d[7] * F0298;
    let mut o1 = d[5] * F2053;
    let mut o2 = d[3] * F3072;
    let mut o3 = d[1] * F1501;
    let (s1, s2) = (-zz1 * F0899, -zz2 * F2562);
    let s3 = z5 - zz3 * F1961;
    let s4 = z5 - zz4 * F0390;
    o0 += s1 + s3;
    o1 += s2 + s4;
    o2 += s2 + s3;
    o3 += s1 + s4;

    [
        t10 + o3,
        t11 + o2,
        t12 + o1,
        t13 + o0,
        t13 - o0,
        t12 - o1,
        t11 - o2,
        t10 - o3,
    ]
}

#[inline]
fn descale(x: i64, n: i64) -> i64 {
    (x + (1 << (n - 1))) >> n
}

#[inline]
fn clamp(x: i64) -> u8 {
    x.clamp(0, 255) as u8
}
