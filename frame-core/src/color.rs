// YCbCr -> RGB in 16.16 fixed point (JFIF / ITU-R BT.601 full range).
//
//   R = Y + 1.402    (Cr - 128)
//   G = Y - 0.344136 (Cb - 128) - 0.714136 (Cr - 128)
//   B = Y + 1.772    (Cb - 128)

const FIX_1_402: i32 = 91881;
const FIX_0_344: i32 = 22554;
const FIX_0_714: i32 = 46802;
const FIX_1_772: i32 = 116130;
const HALF: i32 = 1 << 15;

#[inline]
pub fn ycbcr_to_rgb(y: u8, cb: u8, cr: u8) -> [u8; 3] {
    let y = y as i32;
    let cb = cb as i32 - 128;
    let cr = cr as i32 - 128;
    let r = y + ((FIX_1_402 * cr + HALF) >> 16);
    let g = y + ((HALF - FIX_0_344 * cb - FIX_0_714 * cr) >> 16);
    let b = y + ((FIX_1_772 * cb + HALF) >> 16);
    [clamp(r), clamp(g), clamp(b)]
}

#[inline]
fn clamp(x: i32) -> u8 {
    x.clamp(0, 255) as u8
}
