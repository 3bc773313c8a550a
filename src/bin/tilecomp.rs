use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "tilecomp", version)]
struct Cli {
    /// Engine config JSON (loader, cache, compositor and session options).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render a full map as a PNG.
    Render(RenderArgs),
    /// Stamp a brush onto a layer and write the re-rendered patch as a PNG.
    Stamp(StampArgs),
    /// Warm the tile cache, then render a full map through the tracked sessions.
    Preload(RenderArgs),
}

#[derive(Parser, Debug)]
struct RenderArgs {
    /// Input render request JSON.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,
}

#[derive(Parser, Debug)]
struct StampArgs {
    /// Input stamp request JSON.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Output PNG path for the patch.
    #[arg(long)]
    out: PathBuf,

    /// Write the edited layer stack as JSON.
    #[arg(long)]
    layers_out: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let opts = match &cli.config {
        Some(path) => tilecomp::EngineOpts::from_path(path)?,
        None => tilecomp::EngineOpts::default(),
    };
    let service = tilecomp::MapService::new(opts);

    match cli.cmd {
        Command::Render(args) => cmd_render(&service, args),
        Command::Stamp(args) => cmd_stamp(&service, args),
        Command::Preload(args) => cmd_preload(&service, args),
    }
}

fn cmd_render(service: &tilecomp::MapService, args: RenderArgs) -> anyhow::Result<()> {
    let req = tilecomp::RenderRequest::from_path(&args.in_path)?;
    let image = service.render_map(&req)?;
    write_output(&args.out, &image.bytes)?;
    eprintln!("wrote {} ({}x{})", args.out.display(), image.width, image.height);
    Ok(())
}

fn cmd_stamp(service: &tilecomp::MapService, args: StampArgs) -> anyhow::Result<()> {
    let req = tilecomp::StampRequest::from_path(&args.in_path)?;
    let outcome = service.stamp_tile(req)?;
    write_output(&args.out, &outcome.image.bytes)?;

    if let Some(path) = &args.layers_out {
        let json = serde_json::to_vec_pretty(&outcome.layers).context("serialize layers")?;
        write_output(path, &json)?;
        eprintln!("wrote {}", path.display());
    }

    let r = outcome.region;
    eprintln!(
        "wrote {} (region {}x{} at {},{})",
        args.out.display(),
        r.w,
        r.h,
        r.x,
        r.y
    );
    Ok(())
}

fn cmd_preload(service: &tilecomp::MapService, args: RenderArgs) -> anyhow::Result<()> {
    let req = tilecomp::RenderRequest::from_path(&args.in_path)?;
    let ids = tilecomp::collect_tile_ids(&req.layers);
    let events = service.subscribe_preload();

    let handle = service.preload_and_render(ids, req)?;
    let printer = std::thread::spawn(move || {
        for event in events {
            match event {
                tilecomp::PreloadEvent::Progress { message, .. } => eprintln!("{message}"),
                tilecomp::PreloadEvent::Complete { .. } => break,
                tilecomp::PreloadEvent::Error(reason) => {
                    eprintln!("preload failed: {reason}");
                    break;
                }
            }
        }
    });

    let result = handle.wait();
    // The bus holds its sender for the life of the service, so the printer stops on a
    // terminal event rather than on disconnect.
    let _ = printer.join();
    let image = result?;

    write_output(&args.out, &image.bytes)?;
    eprintln!("wrote {} ({}x{})", args.out.display(), image.width, image.height);
    Ok(())
}

fn write_output(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    std::fs::write(path, bytes).with_context(|| format!("write '{}'", path.display()))
}
