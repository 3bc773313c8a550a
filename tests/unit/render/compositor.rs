use std::io::Cursor;
use std::sync::Mutex;

use base64::Engine as _;

use super::*;
use crate::assets::cache::TileDecodeCache;
use crate::assets::loader::LoaderOpts;
use crate::model::map::Layer;

fn tile_payload(side: u32, px: [u8; 4]) -> String {
    let img = image::RgbaImage::from_pixel(side, side, image::Rgba(px));
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    format!(
        "data:image/png;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(&buf)
    )
}

fn compositor(opts: CompositorOpts) -> Compositor {
    let cache = Arc::new(TileDecodeCache::default());
    let loader = Arc::new(TilePayloadLoader::new(LoaderOpts::default(), cache));
    Compositor::new(loader, opts)
}

fn layer(id: i32, tiles: Vec<Tile>) -> Layer {
    Layer {
        id,
        name: format!("layer {id}"),
        visible: true,
        locked: false,
        tiles,
    }
}

fn request(width: u32, height: u32, layers: Vec<Layer>) -> RenderRequest {
    RenderRequest {
        width,
        height,
        tile_size: 8,
        layers,
        show_grid: false,
        show_checkerboard: false,
    }
}

fn decode(img: &EncodedImage) -> image::RgbaImage {
    image::load_from_memory(&img.bytes).unwrap().to_rgba8()
}

#[test]
fn later_layer_wins_and_hidden_layers_are_skipped() {
    let red = tile_payload(8, [255, 0, 0, 255]);
    let blue = tile_payload(8, [0, 0, 255, 255]);
    let green = tile_payload(8, [0, 255, 0, 255]);
    let mut hidden = layer(3, vec![Tile::new(0, 0, green)]);
    hidden.visible = false;
    let req = request(
        2,
        1,
        vec![
            layer(1, vec![Tile::new(0, 0, red.clone()), Tile::new(1, 0, red)]),
            layer(2, vec![Tile::new(1, 0, blue)]),
            hidden,
        ],
    );

    let out = compositor(CompositorOpts::default())
        .render_with_progress(&req, &NoProgress, &CancelToken::new())
        .unwrap();
    let img = decode(&out.image);
    assert_eq!(img.get_pixel(3, 3).0, [255, 0, 0, 255]);
    assert_eq!(img.get_pixel(12, 3).0, [0, 0, 255, 255]);
    assert_eq!(out.stats.tiles_painted, 3);
    assert!(!out.stats.budget_exhausted);
}

#[test]
fn out_of_bounds_and_short_payloads_are_skipped() {
    let red = tile_payload(8, [255, 0, 0, 255]);
    let req = request(
        2,
        2,
        vec![layer(
            1,
            vec![
                Tile::new(-1, 0, red.clone()),
                Tile::new(2, 0, red.clone()),
                Tile::new(0, 1, "data:image/png;base64,AAAA"),
                Tile::new(1, 1, ""),
            ],
        )],
    );

    let comp = compositor(CompositorOpts::default());
    let out = comp
        .render_with_progress(&req, &NoProgress, &CancelToken::new())
        .unwrap();
    assert_eq!(out.stats.tiles_skipped, 4);
    assert_eq!(out.stats.tiles_painted, 0);
    assert_eq!(comp.loader().decodes_started(), 0);
    assert!(decode(&out.image).pixels().all(|p| p.0 == [255, 255, 255, 255]));
}

#[test]
fn undecodable_tile_is_counted_and_render_continues() {
    let garbage = format!(
        "data:image/png;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(vec![7u8; 96])
    );
    let req = request(
        2,
        1,
        vec![layer(
            1,
            vec![
                Tile::new(0, 0, garbage),
                Tile::new(1, 0, tile_payload(8, [0, 0, 0, 255])),
            ],
        )],
    );
    let out = compositor(CompositorOpts::default())
        .render_with_progress(&req, &NoProgress, &CancelToken::new())
        .unwrap();
    assert_eq!(out.stats.tiles_failed, 1);
    assert_eq!(out.stats.tiles_painted, 1);
}

#[test]
fn progress_is_staged_and_monotonic() {
    let red = tile_payload(8, [255, 0, 0, 255]);
    let tiles = (0..12).map(|i| Tile::new(i % 4, i / 4, red.clone())).collect();
    let req = request(4, 3, vec![layer(1, tiles)]);

    let seen = Mutex::new(Vec::<(u32, String)>::new());
    let observer = |current: u32, _total: u32, message: &str| {
        seen.lock().unwrap().push((current, message.to_string()));
    };
    compositor(CompositorOpts::default())
        .render_with_progress(&req, &observer, &CancelToken::new())
        .unwrap();

    let seen = seen.into_inner().unwrap();
    let currents: Vec<u32> = seen.iter().map(|(c, _)| *c).collect();
    assert_eq!(&currents[..4], &[0, 10, 15, 20]);
    assert!(currents.windows(2).all(|w| w[0] <= w[1]), "{currents:?}");
    assert_eq!(
        seen.last(),
        Some(&(90, "encoding image".to_string())),
        "completion is published by the caller, not the compositor"
    );
    assert!(!currents.contains(&100));
    assert!(seen.iter().any(|(_, m)| m == "Rendering tiles... (10/12)"));
    assert!(seen.iter().any(|(_, m)| m == "Rendering tiles... (12/12)"));
    assert!(seen.iter().any(|(c, m)| *c == 85 && m == "drawing grid"));
    assert!(seen.iter().any(|(c, m)| *c == 90 && m == "encoding image"));
}

#[test]
fn exhausted_budget_still_produces_image() {
    let red = tile_payload(8, [255, 0, 0, 255]);
    let req = RenderRequest {
        show_grid: true,
        ..request(1, 1, vec![layer(1, vec![Tile::new(0, 0, red)])])
    };
    let out = compositor(CompositorOpts {
        render_budget: Duration::ZERO,
        ..CompositorOpts::default()
    })
    .render_with_progress(&req, &NoProgress, &CancelToken::new())
    .unwrap();

    assert!(out.stats.budget_exhausted);
    assert_eq!(out.stats.tiles_painted, 0);
    let img = decode(&out.image);
    assert_eq!(img.get_pixel(0, 0).0, [51, 65, 85, 76]);
    assert_eq!(img.get_pixel(4, 4).0, [255, 255, 255, 255]);
}

#[test]
fn cancelled_render_returns_error() {
    let red = tile_payload(8, [255, 0, 0, 255]);
    let req = request(1, 1, vec![layer(1, vec![Tile::new(0, 0, red)])]);
    let cancel = CancelToken::new();
    cancel.cancel();
    let err = compositor(CompositorOpts::default())
        .render_with_progress(&req, &NoProgress, &cancel)
        .unwrap_err();
    assert!(matches!(err, TileMapError::Cancelled));
}

#[test]
fn sequential_and_parallel_outputs_match() {
    let a = tile_payload(8, [10, 200, 30, 255]);
    let b = tile_payload(8, [90, 20, 230, 128]);
    let tiles = (0..25)
        .map(|i| Tile::new(i % 5, i / 5, if i % 2 == 0 { a.clone() } else { b.clone() }))
        .collect();
    let req = RenderRequest {
        show_checkerboard: true,
        show_grid: true,
        ..request(5, 5, vec![layer(1, tiles)])
    };

    let par = compositor(CompositorOpts::default()).render(&req).unwrap();
    let seq = compositor(CompositorOpts {
        parallel: false,
        ..CompositorOpts::default()
    })
    .render(&req)
    .unwrap();
    assert_eq!(par.bytes, seq.bytes);
}

#[test]
fn region_render_has_region_size() {
    let red = tile_payload(8, [255, 0, 0, 255]);
    let req = request(10, 10, vec![layer(1, vec![Tile::new(4, 5, red)])]);
    let patch = compositor(CompositorOpts::default())
        .render_region(&req, TileRegion::new(3, 5, 2, 1))
        .unwrap();
    assert_eq!((patch.width, patch.height), (16, 8));
    let img = decode(&patch);
    assert_eq!(img.get_pixel(2, 2).0, [255, 255, 255, 255]);
    assert_eq!(img.get_pixel(10, 2).0, [255, 0, 0, 255]);
}

#[test]
fn invalid_requests_are_rejected() {
    let comp = compositor(CompositorOpts::default());
    let err = comp.render(&request(0, 4, vec![])).unwrap_err();
    assert!(matches!(err, TileMapError::Validation(_)));
    let err = comp
        .render_region(&request(4, 4, vec![]), TileRegion::new(0, 0, 0, 1))
        .unwrap_err();
    assert!(matches!(err, TileMapError::Validation(_)));
}

#[test]
fn tile_budget_shrinks_towards_deadline() {
    let now = Instant::now();
    let timeout = Duration::from_secs(5);

    let far = now + Duration::from_secs(30);
    assert_eq!(tile_budget(timeout, far, now), Some(timeout));

    let near = now + Duration::from_secs(2);
    assert_eq!(tile_budget(timeout, near, now), Some(Duration::from_secs(2)));
    // A later tile of the same chunk only gets what is left.
    assert_eq!(
        tile_budget(timeout, near, now + Duration::from_millis(1500)),
        Some(Duration::from_millis(500))
    );

    assert_eq!(tile_budget(timeout, near, near), None);
    assert_eq!(tile_budget(timeout, near, near + Duration::from_secs(1)), None);
}

#[test]
fn tile_stage_caps_before_grid() {
    assert_eq!(layer_stage(0), 25);
    assert_eq!(layer_stage(1), 40);
    assert_eq!(layer_stage(9), 85);
    assert_eq!(tile_stage(0, 5, 10), 55);
    assert_eq!(tile_stage(2, 10, 10), 85);
}

#[test]
fn opts_parse_from_json() {
    let opts: CompositorOpts =
        serde_json::from_str(r#"{"tileTimeout": 1500, "gridRgba": [0, 0, 0, 255], "parallel": false}"#)
            .unwrap();
    assert_eq!(opts.tile_timeout, Duration::from_millis(1500));
    assert_eq!(opts.grid_rgba, Rgba8::new(0, 0, 0, 255));
    assert!(!opts.parallel);
    assert_eq!(opts.render_budget, Duration::from_secs(30));
}
