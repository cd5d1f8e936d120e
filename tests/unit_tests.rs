use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{GrayImage, Luma, RgbImage};
use serde_json::json;
use std::fs;
use std::io::Cursor;
use std::path::Path;

use labelme2mask::progress::percent_complete;
use labelme2mask::utils::{find_companion_raster, infer_image_format, list_annotation_files};
use labelme2mask::{
    colorize, rasterize_shapes, remap, AnnotationRecord, ClassScheme, Encoded, LabelIndexMap,
    LabelMask, MaskError, MaskPolicy, OutputMask, Palette, RemapTable, Shape, UngatedPolicy,
};

fn labels(pairs: &[(&str, u8)]) -> LabelIndexMap {
    pairs.iter().map(|&(k, v)| (k, v)).collect()
}

fn square(label: &str, x0: f64, y0: f64, x1: f64, y1: f64) -> Shape {
    Shape::polygon(label, vec![(x0, y0), (x1, y0), (x1, y1), (x0, y1)])
}

fn count(mask: &LabelMask, value: u8) -> usize {
    mask.as_raw().iter().filter(|&&v| v == value).count()
}

fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    RgbImage::new(width, height)
        .write_to(&mut buf, image::ImageFormat::Png)
        .unwrap();
    buf.into_inner()
}

#[test]
fn test_infer_image_format() {
    let jpg_bytes = vec![0xFF, 0xD8, 0xFF];
    let png_bytes = vec![0x89, b'P', b'N', b'G'];
    let bmp_bytes = vec![b'B', b'M'];
    let gif_bytes = vec![0x47, 0x49, 0x46];
    let tif_bytes = vec![b'I', b'I', b'*', 0x00];
    let unknown_bytes = vec![0x00, 0x00, 0x00];

    assert_eq!(infer_image_format(&jpg_bytes), Some("jpg"));
    assert_eq!(infer_image_format(&png_bytes), Some("png"));
    assert_eq!(infer_image_format(&bmp_bytes), Some("bmp"));
    assert_eq!(infer_image_format(&gif_bytes), Some("gif"));
    assert_eq!(infer_image_format(&tif_bytes), Some("tif"));
    assert_eq!(infer_image_format(&unknown_bytes), None);
}

#[test]
fn test_percent_complete_rounds() {
    assert_eq!(percent_complete(1, 3), 33);
    assert_eq!(percent_complete(2, 3), 67);
    assert_eq!(percent_complete(3, 3), 100);
    assert_eq!(percent_complete(1, 2), 50);
    assert_eq!(percent_complete(1, 200), 1);
    assert_eq!(percent_complete(0, 0), 100);
}

#[test]
fn test_rasterize_square_includes_boundary() {
    let map = labels(&[("a", 1)]);
    let mask = rasterize_shapes(10, 10, &[square("a", 2.0, 2.0, 6.0, 6.0)], &map).unwrap();

    assert_eq!(count(&mask, 1), 25);
    assert_eq!(mask.get(2, 2), 1);
    assert_eq!(mask.get(6, 6), 1);
    assert_eq!(mask.get(1, 2), 0);
    assert_eq!(mask.get(7, 6), 0);
}

#[test]
fn test_rasterize_output_matches_image_shape() {
    let map = labels(&[("a", 1)]);
    let mask = rasterize_shapes(3, 7, &[], &map).unwrap();
    assert_eq!((mask.width(), mask.height()), (7, 3));
    assert_eq!(mask.as_raw().len(), 21);
    assert!(!mask.contains(1));
}

#[test]
fn test_rasterize_last_shape_wins() {
    let map = labels(&[("a", 1), ("b", 2)]);
    let a = square("a", 0.0, 0.0, 5.0, 5.0);
    let b = square("b", 3.0, 3.0, 8.0, 8.0);

    let mask = rasterize_shapes(10, 10, &[a.clone(), b.clone()], &map).unwrap();
    assert_eq!(mask.get(4, 4), 2);
    assert_eq!(mask.get(1, 1), 1);
    assert_eq!(mask.get(7, 7), 2);

    let mask = rasterize_shapes(10, 10, &[b, a], &map).unwrap();
    assert_eq!(mask.get(4, 4), 1);
    assert_eq!(mask.get(7, 7), 2);
}

#[test]
fn test_rasterize_shape_outside_image_is_ignored() {
    let map = labels(&[("a", 1), ("b", 2)]);
    let inside = square("a", 1.0, 1.0, 4.0, 4.0);
    let outside = vec![
        square("b", 20.0, 20.0, 30.0, 30.0),
        square("b", -30.0, -30.0, -1.0, -1.0),
        square("b", 12.0, -5.0, 40.0, 15.0),
    ];

    let without = rasterize_shapes(10, 10, std::slice::from_ref(&inside), &map).unwrap();
    let mut shapes = vec![inside];
    shapes.extend(outside);
    let with = rasterize_shapes(10, 10, &shapes, &map).unwrap();

    assert_eq!(with, without);
}

#[test]
fn test_rasterize_clips_large_shapes() {
    let map = labels(&[("a", 3)]);
    let triangle = Shape::polygon("a", vec![(-5.0, -5.0), (15.0, 0.0), (0.0, 15.0)]);
    let mask = rasterize_shapes(10, 10, &[triangle], &map).unwrap();
    assert_eq!(mask.get(0, 0), 3);
    assert_eq!(mask.get(5, 5), 3);
    assert_eq!(mask.get(9, 9), 0);
}

#[test]
fn test_rasterize_skips_unmapped_labels() {
    let map = labels(&[("a", 1)]);
    let mask = rasterize_shapes(10, 10, &[square("zzz", 0.0, 0.0, 9.0, 9.0)], &map).unwrap();
    assert_eq!(mask, LabelMask::new(10, 10));
}

#[test]
fn test_rasterize_rejects_degenerate_polygon() {
    let map = labels(&[("a", 1)]);
    let line = Shape::polygon("a", vec![(0.0, 0.0), (5.0, 5.0)]);
    let err = rasterize_shapes(10, 10, &[square("a", 0.0, 0.0, 2.0, 2.0), line], &map).unwrap_err();
    assert!(matches!(err, MaskError::InvalidShape { index: 1, .. }));
    assert!(!err.is_fatal());
}

#[test]
fn test_rasterize_rectangle_and_circle() {
    let map = labels(&[("r", 1), ("c", 2)]);
    let rect = Shape {
        label: "r".to_string(),
        points: vec![(1.0, 1.0), (3.0, 4.0)],
        shape_type: "rectangle".to_string(),
    };
    let mask = rasterize_shapes(10, 10, &[rect], &map).unwrap();
    assert_eq!(count(&mask, 1), 12);

    let circle = Shape {
        label: "c".to_string(),
        points: vec![(5.0, 5.0), (5.0, 7.0)],
        shape_type: "circle".to_string(),
    };
    let mask = rasterize_shapes(10, 10, &[circle], &map).unwrap();
    assert_eq!(count(&mask, 2), 13);
    assert_eq!(mask.get(5, 5), 2);
    assert_eq!(mask.get(6, 6), 2);
    assert_eq!(mask.get(7, 6), 0);
}

fn shape(label: &str, shape_type: &str, points: Vec<(f64, f64)>) -> Shape {
    Shape {
        label: label.to_string(),
        points,
        shape_type: shape_type.to_string(),
    }
}

#[test]
fn test_rasterize_line_is_stroked_ten_pixels_wide() {
    let map = labels(&[("5", 5)]);
    let line = shape("5", "line", vec![(1.0, 5.0), (14.0, 5.0)]);
    let mask = rasterize_shapes(12, 16, &[line], &map).unwrap();

    // x from 1 to 14, y within 5 of the line
    assert_eq!(count(&mask, 5), 14 * 11);
    assert_eq!(mask.get(1, 0), 5);
    assert_eq!(mask.get(14, 10), 5);
    assert_eq!(mask.get(0, 5), 0);
    assert_eq!(mask.get(15, 5), 0);
    assert_eq!(mask.get(8, 11), 0);
}

#[test]
fn test_rasterize_linestrip_strokes_each_segment() {
    let map = labels(&[("a", 1)]);
    let strip = shape("a", "linestrip", vec![(2.0, 2.0), (2.0, 15.0), (15.0, 15.0)]);
    let mask = rasterize_shapes(20, 20, &[strip], &map).unwrap();

    assert_eq!(mask.get(2, 10), 1);
    assert_eq!(mask.get(7, 5), 1);
    assert_eq!(mask.get(8, 5), 0);
    assert_eq!(mask.get(10, 15), 1);
    assert_eq!(mask.get(15, 2), 0);
    assert_eq!(mask.get(0, 0), 0);
}

#[test]
fn test_rasterize_point_is_a_disc() {
    let map = labels(&[("5", 5)]);
    let point = shape("5", "point", vec![(10.0, 10.0)]);
    let mask = rasterize_shapes(20, 20, &[point], &map).unwrap();

    assert_eq!(count(&mask, 5), 81);
    assert_eq!(mask.get(10, 10), 5);
    assert_eq!(mask.get(15, 10), 5);
    assert_eq!(mask.get(14, 14), 0);
}

#[test]
fn test_rasterize_rejects_malformed_lines_and_points() {
    let map = labels(&[("a", 1)]);
    for bad in [
        shape("a", "line", vec![(0.0, 0.0), (1.0, 1.0), (2.0, 2.0)]),
        shape("a", "linestrip", vec![(0.0, 0.0)]),
        shape("a", "point", vec![(0.0, 0.0), (1.0, 1.0)]),
    ] {
        let err = rasterize_shapes(10, 10, &[bad], &map).unwrap_err();
        assert!(matches!(err, MaskError::InvalidShape { index: 0, .. }));
    }
}

#[test]
fn test_rasterize_skips_unsupported_shape_types() {
    let map = labels(&[("a", 1)]);
    let unknown = shape("a", "mask", vec![(0.0, 0.0), (9.0, 9.0)]);
    let mask = rasterize_shapes(10, 10, &[unknown], &map).unwrap();
    assert_eq!(mask, LabelMask::new(10, 10));
}

#[test]
fn test_rasterize_is_deterministic() {
    let map = labels(&[("a", 1), ("b", 2)]);
    let shapes = vec![
        Shape::polygon(
            "a",
            vec![(0.3, 1.7), (17.2, 3.1), (12.9, 15.5), (4.4, 11.8), (8.0, 6.6)],
        ),
        Shape::polygon("b", vec![(5.5, 5.5), (19.0, 9.25), (2.0, 18.75)]),
    ];
    let first = rasterize_shapes(20, 20, &shapes, &map).unwrap();
    let second = rasterize_shapes(20, 20, &shapes, &map).unwrap();
    assert_eq!(first, second);
    assert!(first.contains(1) && first.contains(2));
}

#[test]
fn test_remap_follows_table_for_every_label() {
    let scheme = ClassScheme::six_class();
    for (label, index) in [("gum", 0), ("0", 1), ("2", 2), ("3", 3), ("4", 4), ("5", 5)] {
        let mask = rasterize_shapes(4, 4, &[square(label, 0.0, 0.0, 3.0, 3.0)], &scheme.labels)
            .unwrap();
        let remapped = remap(&mask, &scheme.remap).unwrap();
        let expected = scheme.remap.lookup(index).unwrap();
        assert!(remapped.as_raw().iter().all(|&v| v == expected), "label {}", label);
    }
}

#[test]
fn test_remap_reports_unmapped_index() {
    let table = RemapTable::new(vec![(0, 2), (1, 0)]).unwrap();
    let mask = LabelMask::from_raw(2, 2, vec![0, 1, 7, 1]).unwrap();
    let err = remap(&mask, &table).unwrap_err();
    assert!(matches!(err, MaskError::UnmappedIndex(7)));
    assert!(err.is_fatal());
}

#[test]
fn test_remap_table_validation() {
    let table = RemapTable::new(vec![(0, 0), (2, 1)]).unwrap();
    let err = table
        .validate_for(&labels(&[("a", 2)]))
        .unwrap_err();
    assert!(matches!(err, MaskError::UnmappedIndex(1)));

    assert!(table.validate_for(&labels(&[])).is_ok());
    assert!(matches!(
        RemapTable::new(vec![(0, 0), (0, 1)]),
        Err(MaskError::InvalidScheme(_))
    ));
}

#[test]
fn test_colorize_uses_palette() {
    let palette = ClassScheme::six_class().palette;
    let mask = GrayImage::from_raw(3, 1, vec![0, 5, 3]).unwrap();
    let color = colorize(&mask, &palette).unwrap();
    assert_eq!(color.get_pixel(0, 0).0, [0, 0, 0]);
    assert_eq!(color.get_pixel(1, 0).0, [255, 129, 64]);
    assert_eq!(color.get_pixel(2, 0).0, [64, 255, 64]);
}

#[test]
fn test_colorize_rejects_values_outside_palette() {
    let palette = Palette::new(vec![[0, 0, 0], [255, 255, 255]]);
    let mask = GrayImage::from_pixel(2, 2, Luma([2]));
    let err = colorize(&mask, &palette).unwrap_err();
    assert!(matches!(err, MaskError::PaletteIndex { value: 2, len: 2 }));
}

#[test]
fn test_policy_gates_on_sentinel() {
    let scheme = ClassScheme::six_class();
    let policy = MaskPolicy::from_scheme(&scheme, UngatedPolicy::Skip);

    let without = GrayImage::from_raw(2, 1, vec![2, 4]).unwrap();
    assert_eq!(
        policy.encode(without.clone(), &scheme.palette).unwrap(),
        Encoded::Filtered
    );

    let keep_gray = MaskPolicy::from_scheme(&scheme, UngatedPolicy::WriteGray);
    assert_eq!(
        keep_gray.encode(without.clone(), &scheme.palette).unwrap(),
        Encoded::Ungated(without)
    );

    let with = GrayImage::from_raw(2, 1, vec![2, 5]).unwrap();
    match policy.encode(with, &scheme.palette).unwrap() {
        Encoded::Qualified(mask) => {
            assert_eq!(mask.channels(), 3);
            assert_eq!(mask.dimensions(), (2, 1));
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_policy_without_sentinel_keeps_gray() {
    let scheme = ClassScheme::five_class();
    let policy = MaskPolicy::from_scheme(&scheme, UngatedPolicy::WriteGray);
    let mask = GrayImage::from_raw(2, 1, vec![2, 0]).unwrap();
    assert_eq!(
        policy.encode(mask.clone(), &scheme.palette).unwrap(),
        Encoded::Qualified(OutputMask::Gray(mask))
    );
}

#[test]
fn test_presets_are_consistent() {
    assert!(ClassScheme::six_class().validate().is_ok());
    assert!(ClassScheme::five_class().validate().is_ok());

    let mut scheme = ClassScheme::six_class();
    scheme.palette = Palette::new(vec![[0, 0, 0]; 3]);
    assert!(matches!(
        scheme.validate(),
        Err(MaskError::PaletteIndex { len: 3, .. })
    ));
}

#[test]
fn test_load_scheme_file() {
    let temp_dir = tempfile::tempdir().unwrap();
    let path = temp_dir.path().join("scheme.json");
    fs::write(
        &path,
        r#"{"labels": {"bg": 0, "crack": 1}, "remap": [[0, 0], [1, 255]], "sentinel": 255}"#,
    )
    .unwrap();

    let scheme = ClassScheme::load(&path).unwrap();
    assert_eq!(scheme.labels.get("crack"), Some(1));
    assert_eq!(scheme.remap.lookup(1), Some(255));
    assert_eq!(scheme.sentinel, Some(255));
    assert!(!scheme.color);
    assert!(scheme.palette.is_empty());
    assert!(scheme.validate().is_ok());

    fs::write(&path, r#"{"labels": {}, "remap": [[0, 0], [0, 1]]}"#).unwrap();
    assert!(matches!(
        ClassScheme::load(&path),
        Err(MaskError::InvalidScheme(_))
    ));
}

fn write_json(path: &Path, value: serde_json::Value) {
    fs::write(path, serde_json::to_vec_pretty(&value).unwrap()).unwrap();
}

#[test]
fn test_record_prefers_embedded_image_size() {
    let temp_dir = tempfile::tempdir().unwrap();
    let path = temp_dir.path().join("a.json");
    write_json(
        &path,
        json!({
            "version": "5.4.1",
            "flags": {},
            "shapes": [{"label": "5", "points": [[1, 1], [4, 1], [4, 3]], "group_id": null}],
            "imagePath": "missing.png",
            "imageData": STANDARD.encode(png_bytes(8, 6)),
            "imageHeight": 6,
            "imageWidth": 8
        }),
    );

    let record = AnnotationRecord::load(&path).unwrap();
    assert_eq!((record.image.width, record.image.height), (8, 6));
    assert!(record.image.embedded.is_some());
    assert_eq!(record.shapes.len(), 1);
    assert_eq!(record.shapes[0].shape_type, "polygon");
}

#[test]
fn test_record_reads_null_shape_type_as_polygon() {
    let temp_dir = tempfile::tempdir().unwrap();
    let path = temp_dir.path().join("n.json");
    write_json(
        &path,
        json!({
            "shapes": [{"label": "5", "points": [[1, 1], [4, 1], [4, 3]], "shape_type": null}],
            "imagePath": "",
            "imageData": null,
            "imageHeight": 6,
            "imageWidth": 8
        }),
    );

    let record = AnnotationRecord::load(&path).unwrap();
    assert_eq!(record.shapes[0].shape_type, "polygon");
}

#[test]
fn test_record_rejects_oversized_image() {
    let temp_dir = tempfile::tempdir().unwrap();
    let path = temp_dir.path().join("huge.json");
    write_json(
        &path,
        json!({"shapes": [], "imagePath": "", "imageData": null, "imageHeight": 4000000000u32, "imageWidth": 4000000000u32}),
    );

    let err = AnnotationRecord::load(&path).unwrap_err();
    assert!(matches!(err, MaskError::ImageData { .. }));
    assert!(!err.is_fatal());
}

#[test]
fn test_record_reads_referenced_image() {
    let temp_dir = tempfile::tempdir().unwrap();
    RgbImage::new(5, 7)
        .save(temp_dir.path().join("b.png"))
        .unwrap();
    let path = temp_dir.path().join("b.json");
    write_json(
        &path,
        json!({"shapes": [], "imagePath": "b.png", "imageData": null, "imageHeight": 99, "imageWidth": 99}),
    );

    let record = AnnotationRecord::load(&path).unwrap();
    assert_eq!((record.image.width, record.image.height), (5, 7));
    assert!(record.image.embedded.is_none());
}

#[test]
fn test_record_falls_back_to_declared_size() {
    let temp_dir = tempfile::tempdir().unwrap();
    let path = temp_dir.path().join("c.json");
    write_json(
        &path,
        json!({"shapes": [], "imagePath": "nowhere.png", "imageData": null, "imageHeight": 4, "imageWidth": 3}),
    );
    let record = AnnotationRecord::load(&path).unwrap();
    assert_eq!((record.image.width, record.image.height), (3, 4));

    write_json(&path, json!({"shapes": [], "imagePath": "nowhere.png"}));
    assert!(matches!(
        AnnotationRecord::load(&path),
        Err(MaskError::ImageData { .. })
    ));
}

#[test]
fn test_record_reports_malformed_json() {
    let temp_dir = tempfile::tempdir().unwrap();
    let path = temp_dir.path().join("broken.json");
    fs::write(&path, "{ \"shapes\": [").unwrap();
    let err = AnnotationRecord::load(&path).unwrap_err();
    assert!(matches!(err, MaskError::Parse { .. }));
    assert!(!err.is_fatal());
}

#[test]
fn test_find_companion_raster_respects_order() {
    let temp_dir = tempfile::tempdir().unwrap();
    let json_path = temp_dir.path().join("frame.json");
    assert_eq!(find_companion_raster(&json_path, &["png", "tif"]), None);

    fs::write(temp_dir.path().join("frame.tif"), b"II*\0").unwrap();
    assert_eq!(
        find_companion_raster(&json_path, &["png", "tif"]),
        Some(temp_dir.path().join("frame.tif"))
    );

    fs::write(temp_dir.path().join("frame.png"), b"").unwrap();
    assert_eq!(
        find_companion_raster(&json_path, &["png", "tif"]),
        Some(temp_dir.path().join("frame.png"))
    );
}

#[test]
fn test_list_annotation_files_is_sorted_and_flat() {
    let temp_dir = tempfile::tempdir().unwrap();
    for name in ["b.json", "a.json", "c.json", "notes.txt"] {
        fs::write(temp_dir.path().join(name), "{}").unwrap();
    }
    fs::create_dir(temp_dir.path().join("dataset")).unwrap();
    fs::write(temp_dir.path().join("dataset").join("d.json"), "{}").unwrap();

    let files = list_annotation_files(temp_dir.path(), true).unwrap();
    let names: Vec<_> = files
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["a.json", "b.json", "c.json"]);
}
