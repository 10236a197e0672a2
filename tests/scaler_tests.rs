// SPDX-License-Identifier: MPL-2.0

//! Integration tests for scaler setup and geometry negotiation

use fimc::context::{ContextMode, DirtyFlags};
use fimc::media::formats::{FormatFlags, find_format, fourcc};
use fimc::media::{ScalerParams, check_scaler_ratio, compute_factor, prepare_scaler};
use fimc::{BufType, Context, FimcError, PixFormatMplane, Rect, Rotation, Size, Variant};

fn m2m_context() -> Context {
    Context::new(ContextMode::M2m, 0, Variant::default())
}

fn configure(ctx: &Context, src: (fimc::FourCc, Size), dst: (fimc::FourCc, Size)) {
    ctx.set_format(BufType::VideoOutputMplane, &PixFormatMplane::new(src.0, src.1))
        .unwrap();
    ctx.set_format(BufType::VideoCaptureMplane, &PixFormatMplane::new(dst.0, dst.1))
        .unwrap();
}

#[test]
fn test_identical_formats_select_copy_mode() {
    let ctx = m2m_context();
    let size = Size::new(320, 240);
    configure(&ctx, (fourcc::RGB565X, size), (fourcc::RGB565X, size));

    let mut state = ctx.state();
    assert!(state.src_fmt_set && state.dst_fmt_set);
    assert!(state.dirty.contains(DirtyFlags::PARAMS));

    let params = *state.prepare_scaler().unwrap();
    assert!(params.copy_mode);
    assert_eq!(params.pre_hratio, 1);
    assert_eq!(params.main_hratio, 1 << 8);
}

#[test]
fn test_same_size_different_format_scales() {
    let ctx = m2m_context();
    let size = Size::new(320, 240);
    configure(&ctx, (fourcc::YUYV, size), (fourcc::RGB32, size));

    let params = *ctx.state().prepare_scaler().unwrap();
    assert!(!params.copy_mode);
    assert!(params.scaleup_h && params.scaleup_v);
}

#[test]
fn test_hd_to_thumbnail_prescale() {
    let h = compute_factor(1280, 64).unwrap();
    assert_eq!((h.ratio, h.shift), (16, 4));
    // The chosen ratio is the largest with src >= target * ratio
    assert!(1280 >= 64 * h.ratio);
    assert!(1280 < 64 * h.ratio * 2);

    assert!(check_scaler_ratio(Size::new(1280, 720), Size::new(64, 64), Rotation::None).is_ok());

    let fmt = find_format(fourcc::YUYV, FormatFlags::M2M).unwrap();
    let params: ScalerParams = prepare_scaler(
        Size::new(1280, 720),
        fmt,
        Size::new(64, 64),
        fmt,
        Rotation::None,
    )
    .unwrap();
    assert_eq!(params.pre_vratio, 8);
    assert_eq!(params.vfactor, 3);
    assert_eq!(params.pre_dst_height, 90);
}

#[test]
fn test_rotation_swaps_target_axes() {
    let fmt = find_format(fourcc::YUYV, FormatFlags::M2M).unwrap();
    let params = prepare_scaler(
        Size::new(640, 480),
        fmt,
        Size::new(240, 320),
        fmt,
        Rotation::Rotate90,
    )
    .unwrap();
    // Rotated destination is 320x240: an exact 2x downscale
    assert_eq!(params.pre_hratio, 2);
    assert_eq!(params.pre_vratio, 2);
}

#[test]
fn test_downscale_beyond_limit_rejected() {
    let err = check_scaler_ratio(Size::new(4096, 480), Size::new(64, 480), Rotation::None);
    assert!(matches!(err, Err(FimcError::InvalidGeometry(_))));
}

#[test]
fn test_negative_crop_leaves_frame_unchanged() {
    let ctx = m2m_context();
    let size = Size::new(320, 240);
    configure(&ctx, (fourcc::YUYV, size), (fourcc::YUYV, size));
    let before = ctx.get_crop(BufType::VideoOutputMplane).unwrap();
    let dirty_before = ctx.state().dirty;

    let err = ctx.set_crop(BufType::VideoOutputMplane, Rect::new(-1, 0, 160, 120));
    assert!(matches!(err, Err(FimcError::InvalidArgument(_))));
    assert_eq!(ctx.get_crop(BufType::VideoOutputMplane).unwrap(), before);
    assert_eq!(ctx.state().dirty, dirty_before);
}

#[test]
fn test_crop_out_of_scaler_range_rejected() {
    let ctx = m2m_context();
    configure(
        &ctx,
        (fourcc::YUYV, Size::new(1024, 64)),
        (fourcc::YUYV, Size::new(1024, 64)),
    );
    let before = ctx.get_crop(BufType::VideoCaptureMplane).unwrap();

    // A 16 pixel wide destination needs a 64x downscale of 1024
    let err = ctx.set_crop(BufType::VideoCaptureMplane, Rect::new(0, 0, 16, 64));
    assert!(matches!(err, Err(FimcError::InvalidGeometry(_))));
    assert_eq!(ctx.get_crop(BufType::VideoCaptureMplane).unwrap(), before);
}

#[test]
fn test_crop_adjusted_into_frame() {
    let ctx = m2m_context();
    let size = Size::new(320, 240);
    configure(&ctx, (fourcc::YUYV, size), (fourcc::YUYV, size));

    let out = ctx
        .set_crop(BufType::VideoOutputMplane, Rect::new(300, 200, 100, 100))
        .unwrap();
    assert!(out.left >= 0 && out.top >= 0);
    assert!(out.left as u32 + out.width <= 320);
    assert!(out.top as u32 + out.height <= 240);
    assert!(ctx.state().dirty.contains(DirtyFlags::PARAMS));
}

#[test]
fn test_prescale_ratio_is_largest_reachable() {
    for target in 1..=64u32 {
        for src in 1..64 * target {
            let factor = compute_factor(src, target).unwrap();
            assert!(factor.ratio.is_power_of_two() && factor.ratio <= 32);
            assert_eq!(1 << factor.shift, factor.ratio);
            if src < target {
                assert_eq!(factor.ratio, 1, "{src} -> {target}");
                continue;
            }
            assert!(src >= target * factor.ratio, "{src} -> {target}");
            assert!(
                factor.ratio == 32 || src < target * factor.ratio * 2,
                "{src} -> {target} picked {}",
                factor.ratio
            );
        }
        assert!(compute_factor(64 * target, target).is_err());
        assert!(compute_factor(64 * target + 1, target).is_err());
    }
}

#[test]
fn test_scaler_range_matches_ratio_limits() {
    let sizes = [8u32, 16, 63, 64, 100, 640, 1023, 1024, 4096];
    for rotation in Rotation::ALL {
        for src_w in sizes {
            for src_h in sizes {
                for dst_w in sizes {
                    for dst_h in sizes {
                        let src = Size::new(src_w, src_h);
                        let dst = Size::new(dst_w, dst_h);
                        let (tw, th) = if matches!(rotation, Rotation::Rotate90 | Rotation::Rotate270) {
                            (dst_h, dst_w)
                        } else {
                            (dst_w, dst_h)
                        };
                        let reachable = src_w < 64 * tw && src_h < 64 * th;
                        assert_eq!(
                            check_scaler_ratio(src, dst, rotation).is_ok(),
                            reachable,
                            "{src} -> {dst} at {rotation}"
                        );
                    }
                }
            }
        }
    }
}

#[test]
fn test_quarter_turn_needs_swapped_target() {
    // 4096 wide needs more than 64 horizontally; only the swapped axes reach
    let src = Size::new(4096, 64);
    let dst = Size::new(32, 128);
    assert!(check_scaler_ratio(src, dst, Rotation::None).is_err());
    assert!(check_scaler_ratio(src, dst, Rotation::Rotate180).is_err());
    assert!(check_scaler_ratio(src, dst, Rotation::Rotate90).is_ok());
    assert!(check_scaler_ratio(src, dst, Rotation::Rotate270).is_ok());
}
