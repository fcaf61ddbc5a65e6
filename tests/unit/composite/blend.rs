use super::*;

#[test]
fn over_src_alpha_0_is_noop() {
    let dst = [10, 20, 30, 255];
    assert_eq!(over(dst, [0, 0, 0, 0]), dst);
}

#[test]
fn over_src_opaque_replaces_dst() {
    let dst = [0, 0, 0, 255];
    let src = [255, 0, 0, 255];
    assert_eq!(over(dst, src), src);
}

#[test]
fn half_black_over_white_is_mid_gray_and_opaque() {
    let out = over([255, 255, 255, 255], [0, 0, 0, 128]);
    assert_eq!(out, [127, 127, 127, 255]);
}

#[test]
fn alpha_accumulates_as_one_minus_product() {
    // 1 - (1 - 0.5)(1 - 0.5) = 0.75
    let out = over([0, 0, 0, 128], [0, 0, 0, 128]);
    assert_eq!(out[3], 192);
}

#[test]
fn over_in_place_rejects_mismatched_buffers() {
    let mut dst = vec![0u8; 8];
    assert!(over_in_place(&mut dst, &[0u8; 4]).is_err());
}

#[test]
fn premultiply_scales_color_by_alpha() {
    let mut px = vec![100u8, 50, 200, 128, 9, 9, 9, 0];
    premultiply_rgba8_in_place(&mut px);
    assert_eq!(
        px,
        vec![
            ((100u16 * 128 + 127) / 255) as u8,
            ((50u16 * 128 + 127) / 255) as u8,
            ((200u16 * 128 + 127) / 255) as u8,
            128,
            0,
            0,
            0,
            0
        ]
    );
}

#[test]
fn flatten_fills_transparency_with_background() {
    let rgb = flatten_premul_to_rgb8(&[0, 0, 0, 0, 10, 20, 30, 255], [255, 255, 255]).unwrap();
    assert_eq!(rgb, vec![255, 255, 255, 10, 20, 30]);
}
