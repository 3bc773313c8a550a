use std::io::Cursor;
use std::sync::Mutex;
use std::time::Duration;

use base64::Engine as _;

use super::*;
use crate::assets::cache::TileDecodeCache;
use crate::assets::loader::LoaderOpts;
use crate::foundation::core::CancelToken;
use crate::model::map::{Layer, Tile, collect_tile_ids};
use crate::render::compositor::{
    Compositor, CompositorOpts, MapRenderer, ProgressObserver, RenderOutput,
};

fn tile_payload(px: [u8; 4]) -> String {
    let img = image::RgbaImage::from_pixel(16, 16, image::Rgba(px));
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    format!(
        "data:image/png;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(&buf)
    )
}

fn opts() -> SessionOpts {
    SessionOpts {
        preload_batch_size: 2,
        preload_batch_pause: Duration::ZERO,
        ..SessionOpts::default()
    }
}

fn loader() -> Arc<TilePayloadLoader> {
    Arc::new(TilePayloadLoader::new(
        LoaderOpts::default(),
        Arc::new(TileDecodeCache::default()),
    ))
}

fn request(tiles: Vec<Tile>) -> RenderRequest {
    RenderRequest {
        width: 2,
        height: 2,
        tile_size: 16,
        layers: vec![Layer {
            id: 1,
            name: "ground".to_string(),
            visible: true,
            locked: false,
            tiles,
        }],
        show_grid: false,
        show_checkerboard: false,
    }
}

#[test]
fn preload_warms_cache_then_renders() {
    let red = tile_payload([255, 0, 0, 255]);
    let blue = tile_payload([0, 0, 255, 255]);
    let req = request(vec![
        Tile::new(0, 0, red.clone()),
        Tile::new(1, 1, blue.clone()),
        Tile::new(1, 0, "data:image/png;base64,AAAA"),
    ]);
    let ids = collect_tile_ids(&req.layers);
    assert_eq!(ids.len(), 3);

    let loader = loader();
    let compositor = Arc::new(Compositor::new(loader.clone(), CompositorOpts::default()));
    let render = Arc::new(RenderSession::new(compositor, opts()));
    let preload = Arc::new(PreloadSession::new(loader.clone(), render.clone(), opts()));
    let events = preload.subscribe();

    let image = preload.start(ids, req).unwrap().wait().unwrap();
    assert_eq!((image.width, image.height), (32, 32));

    assert!(loader.cache().contains(&red));
    assert!(loader.cache().contains(&blue));
    // Both tiles were decoded by the preload; the render only hit the cache.
    assert_eq!(loader.decodes_started(), 2);

    let snap = preload.progress();
    assert_eq!(snap.state, SessionState::Completed);
    assert!(!snap.is_running);
    assert_eq!(render.progress().state, SessionState::Completed);

    let events: Vec<PreloadEvent> = events.try_iter().collect();
    assert_eq!(
        events,
        vec![
            PreloadEvent::Progress {
                current: 2,
                total: 3,
                message: "Preloading tiles... (2/3)".to_string()
            },
            PreloadEvent::Progress {
                current: 3,
                total: 3,
                message: "Preloading tiles... (3/3)".to_string()
            },
            PreloadEvent::Progress {
                current: 3,
                total: 3,
                message: "Tiles preloaded, starting map rendering...".to_string()
            },
            PreloadEvent::Complete { total: 3 },
        ]
    );
}

#[test]
fn empty_id_list_still_renders() {
    let loader = loader();
    let compositor = Arc::new(Compositor::new(loader.clone(), CompositorOpts::default()));
    let render = Arc::new(RenderSession::new(compositor, opts()));
    let preload = Arc::new(PreloadSession::new(loader, render, opts()));

    let image = preload
        .start(Vec::new(), request(vec![]))
        .unwrap()
        .wait()
        .unwrap();
    assert_eq!(image.width, 32);
    assert_eq!(preload.progress().state, SessionState::Completed);
}

struct GateRenderer {
    gate: Mutex<Receiver<()>>,
}

impl MapRenderer for GateRenderer {
    fn render_map(
        &self,
        _req: &RenderRequest,
        _observer: &dyn ProgressObserver,
        _cancel: &CancelToken,
    ) -> TileMapResult<RenderOutput> {
        let _ = self.gate.lock().unwrap().recv();
        Err(TileMapError::encode("gate closed"))
    }
}

#[test]
fn preload_is_single_flight_and_surfaces_render_failure() {
    let (release, gate) = mpsc::channel();
    let render = Arc::new(RenderSession::new(
        Arc::new(GateRenderer {
            gate: Mutex::new(gate),
        }),
        opts(),
    ));
    let preload = Arc::new(PreloadSession::new(loader(), render, opts()));
    let events = preload.subscribe();

    let handle = preload.start(Vec::new(), request(vec![])).unwrap();
    assert!(matches!(
        preload.start(Vec::new(), request(vec![])),
        Err(TileMapError::SessionBusy("preload"))
    ));

    release.send(()).unwrap();
    let err = handle.wait().unwrap_err();
    assert!(matches!(err, TileMapError::Encode(_)));

    let snap = preload.progress();
    assert_eq!(snap.state, SessionState::Failed);
    assert!(!snap.is_running);
    let last = events.try_iter().last().unwrap();
    assert_eq!(last, PreloadEvent::Error("encode error: gate closed".to_string()));
}
