use super::*;

#[test]
fn render_request_parses_camel_case_json() {
    let json = r#"{
        "width": 2,
        "height": 3,
        "tileSize": 16,
        "showGrid": true,
        "layers": [
            {"id": 1, "name": "ground", "tiles": [{"x": 0, "y": 1, "tileId": "abc"}]}
        ]
    }"#;
    let req = RenderRequest::from_reader(json.as_bytes()).unwrap();
    assert_eq!(req.tile_size, 16);
    assert!(req.show_grid);
    assert!(!req.show_checkerboard);
    assert!(!req.layers[0].visible, "a layer without `visible` is hidden");
    assert_eq!(req.layers[0].tiles[0], Tile::new(0, 1, "abc"));
    req.validate().unwrap();
}

#[test]
fn render_request_rejects_zero_dimensions() {
    let mut req = RenderRequest {
        width: 0,
        height: 1,
        tile_size: 8,
        layers: vec![],
        show_grid: false,
        show_checkerboard: false,
    };
    assert!(req.validate().is_err());
    req.width = 1;
    req.tile_size = 0;
    assert!(req.validate().is_err());
}

#[test]
fn selected_tile_footprint_defaults_to_one() {
    let brush = SelectedTile {
        image: "img".to_string(),
        ..SelectedTile::default()
    };
    assert_eq!(brush.footprint(), (1, 1));
}

#[test]
fn selected_tile_payload_prefers_sub_tile() {
    let brush = SelectedTile {
        image: "fallback".to_string(),
        width: 2,
        height: 2,
        sub_tiles: Some(vec![
            vec!["a0".to_string(), "a1".to_string()],
            vec!["b0".to_string()],
        ]),
        ..SelectedTile::default()
    };
    assert_eq!(brush.payload_at(0, 1), "a1");
    assert_eq!(brush.payload_at(1, 0), "b0");
    assert_eq!(brush.payload_at(1, 1), "fallback");
}

#[test]
fn stamp_request_defaults_render_flags() {
    let json = r#"{
        "selectedTile": {"image": "img"},
        "x": 1, "y": 2, "width": 4, "height": 4,
        "activeLayerId": 9
    }"#;
    let req = StampRequest::from_reader(json.as_bytes()).unwrap();
    assert_eq!(req.tile_size, 32);
    assert!(req.show_grid);
    assert!(req.show_checkerboard);
    assert_eq!(req.active_layer_id, 9);
}

#[test]
fn collect_tile_ids_dedups_in_first_seen_order() {
    let layers = vec![
        Layer {
            id: 1,
            tiles: vec![Tile::new(0, 0, "b"), Tile::new(1, 0, "a"), Tile::new(2, 0, "")],
            ..Layer::default()
        },
        Layer {
            id: 2,
            tiles: vec![Tile::new(0, 0, "a"), Tile::new(0, 1, "c")],
            ..Layer::default()
        },
    ];
    assert_eq!(collect_tile_ids(&layers), vec!["b", "a", "c"]);
}
