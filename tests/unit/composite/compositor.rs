use image::Rgba;

use super::*;

fn solid(w: u32, h: u32, px: [u8; 4]) -> RgbaImage {
    RgbaImage::from_pixel(w, h, Rgba(px))
}

fn gradient(w: u32, h: u32) -> RgbaImage {
    RgbaImage::from_fn(w, h, |x, y| Rgba([(x * 9) as u8, (y * 13) as u8, 77, 255]))
}

#[test]
fn white_lineart_leaves_shading_untouched() {
    let shading = gradient(16, 8);
    let out = Compositor::default()
        .compose(LayerImages {
            lineart: &solid(16, 8, [255, 255, 255, 255]),
            flat_color: &solid(16, 8, [1, 2, 3, 255]),
            shading: &shading,
        })
        .unwrap();

    for (x, y, px) in out.enumerate_pixels() {
        let s = shading.get_pixel(x, y).0;
        assert_eq!(px.0, [s[0], s[1], s[2]]);
    }
}

#[test]
fn black_lineart_inks_everything() {
    let out = Compositor::default()
        .compose(LayerImages {
            lineart: &solid(4, 4, [0, 0, 0, 255]),
            flat_color: &solid(4, 4, [0, 0, 0, 255]),
            shading: &gradient(4, 4),
        })
        .unwrap();
    assert!(out.pixels().all(|p| p.0 == [0, 0, 0]));
}

#[test]
fn gray_lineart_blends_halfway() {
    let out = Compositor::default()
        .compose(LayerImages {
            lineart: &solid(2, 2, [128, 128, 128, 255]),
            flat_color: &solid(2, 2, [0, 0, 0, 255]),
            shading: &solid(2, 2, [200, 100, 0, 255]),
        })
        .unwrap();
    // alpha 127: rgb = base * 128 / 255
    assert_eq!(out.get_pixel(0, 0).0, [100, 50, 0]);
}

#[test]
fn flat_color_layer_does_not_affect_the_result() {
    let compose = |flat: &RgbaImage| {
        Compositor::default()
            .compose(LayerImages {
                lineart: &gradient(8, 8),
                flat_color: flat,
                shading: &solid(8, 8, [10, 200, 30, 255]),
            })
            .unwrap()
    };
    let a = compose(&solid(8, 8, [255, 0, 0, 255]));
    let b = compose(&solid(8, 8, [0, 0, 255, 255]));
    assert_eq!(a.as_raw(), b.as_raw());
}

#[test]
fn composing_twice_is_byte_identical() {
    let layers = (gradient(12, 12), solid(12, 12, [5, 5, 5, 255]), gradient(12, 12));
    let compose = || {
        Compositor::default()
            .compose(LayerImages {
                lineart: &layers.0,
                flat_color: &layers.1,
                shading: &layers.2,
            })
            .unwrap()
    };
    assert_eq!(compose().as_raw(), compose().as_raw());
}

#[test]
fn translucent_shading_is_flattened_over_background() {
    let out = Compositor::new([0, 0, 255])
        .compose(LayerImages {
            lineart: &solid(1, 1, [255, 255, 255, 255]),
            flat_color: &solid(1, 1, [0, 0, 0, 255]),
            shading: &solid(1, 1, [255, 0, 0, 0]),
        })
        .unwrap();
    assert_eq!(out.get_pixel(0, 0).0, [0, 0, 255]);
}

#[test]
fn mismatched_dimensions_are_rejected() {
    let err = Compositor::default()
        .compose(LayerImages {
            lineart: &solid(512, 512, [255; 4]),
            flat_color: &solid(1024, 1024, [255; 4]),
            shading: &solid(1024, 1024, [255; 4]),
        })
        .unwrap_err();
    assert!(matches!(err, InklayerError::Compositing(_)));
    assert!(err.to_string().contains("lineart"));
}

#[test]
fn unreadable_layer_writes_no_final_file() {
    let dir = tempfile::tempdir().unwrap();
    let outputs = PipelineOutputs::for_dir(dir.path());
    std::fs::write(&outputs.lineart, b"not a png").unwrap();
    solid(4, 4, [0; 4]).save(&outputs.flat_color).unwrap();
    solid(4, 4, [0; 4]).save(&outputs.shading).unwrap();

    let err = Compositor::default().compose_files(&outputs).unwrap_err();
    assert!(matches!(err, InklayerError::Compositing(_)));
    assert!(err.to_string().contains("unreadable lineart"));
    assert!(!outputs.final_composite.exists());
}
