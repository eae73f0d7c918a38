//! qld - Tool for inspecting Quipu DEM pyramid files.

use std::env;
use std::path::Path;

use quipu::dem::{probe, Albedo, DemPyramid, DemReaderOptions, PyramidSummary};
use quipu::util::Decomposed;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

fn main() {
    let args: Vec<String> = env::args().collect();

    // Parse global flags
    let mut level = "info";
    let mut filtered_args: Vec<&str> = Vec::new();
    for arg in &args[1..] {
        match arg.as_str() {
            "-v" | "--verbose" => level = "debug",
            "-vv" | "--trace" => level = "trace",
            "-q" | "--quiet" => level = "warn",
            _ => filtered_args.push(arg),
        }
    }
    init_tracing(level);

    if filtered_args.is_empty() {
        print_help();
        return;
    }

    let json_mode = filtered_args.iter().any(|&s| s == "--json" || s == "-j");
    filtered_args.retain(|&s| s != "--json" && s != "-j");

    match filtered_args[0] {
        // Info command - header summary
        "info" | "i" => {
            let path = require_arg(&filtered_args, 1, "qld info <file.qld> [--json]");
            cmd_info(path, json_mode);
        }

        // Levels command - per-level table
        "levels" | "l" => {
            let path = require_arg(&filtered_args, 1, "qld levels <file.qld>");
            cmd_levels(path);
        }

        // Select command - which level a streaming read would load
        "select" | "s" => {
            let usage = "qld select <file.qld> <gsd>";
            let path = require_arg(&filtered_args, 1, usage);
            let gsd = parse_arg::<f64>(require_arg(&filtered_args, 2, usage), "gsd");
            cmd_select(path, gsd);
        }

        // Dump command - one level's projection and statistics
        "dump" | "d" => {
            let usage = "qld dump <file.qld> <level> [--json]";
            let path = require_arg(&filtered_args, 1, usage);
            let index = parse_arg::<usize>(require_arg(&filtered_args, 2, usage), "level");
            cmd_dump(path, index, json_mode);
        }

        // Help
        "help" | "h" | "-h" | "--help" => print_help(),

        // Default: if file exists, show info; otherwise error
        _ => {
            if Path::new(filtered_args[0]).exists() {
                cmd_info(filtered_args[0], json_mode);
            } else {
                eprintln!("Unknown command: {}", filtered_args[0]);
                eprintln!();
                print_help();
                std::process::exit(1);
            }
        }
    }
}

fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn print_help() {
    println!("qld - Quipu DEM pyramid toolkit");
    println!();
    println!("USAGE:");
    println!("    qld [OPTIONS] <COMMAND> [ARGS]");
    println!();
    println!("COMMANDS:");
    println!("    i, info   <file> [--json]       Show header summary");
    println!("    l, levels <file>                Show the level table");
    println!("    s, select <file> <gsd>          Show which level a read at <gsd> loads");
    println!("    d, dump   <file> <level> [--json]  Show one level's projection and statistics");
    println!("    h, help                         Show this help");
    println!();
    println!("OPTIONS:");
    println!("    -v, --verbose    Show debug output");
    println!("    -vv, --trace     Show trace output (very verbose)");
    println!("    -q, --quiet      Only show warnings and errors");
    println!();
    println!("EXAMPLES:");
    println!("    qld info moon.qld                  # Quick overview");
    println!("    qld select moon.qld 12.5           # Level picked for 12.5 m/px");
    println!("    qld dump moon.qld 0 --json         # Finest level as JSON");
    println!();
    println!("NOTES:");
    println!("    - Passing a .qld file directly is equivalent to 'info'");
    println!("    - RUST_LOG overrides the verbosity flags");
}

fn require_arg<'a>(args: &[&'a str], index: usize, usage: &str) -> &'a str {
    match args.get(index) {
        Some(&arg) => arg,
        None => {
            eprintln!("Error: missing argument");
            eprintln!("Usage: {}", usage);
            std::process::exit(1);
        }
    }
}

fn parse_arg<T: std::str::FromStr>(arg: &str, what: &str) -> T {
    match arg.parse() {
        Ok(v) => v,
        Err(_) => {
            eprintln!("Error: invalid {}: {}", what, arg);
            std::process::exit(1);
        }
    }
}

fn open_or_exit(path: &str) -> DemPyramid {
    info!("Opening pyramid: {}", path);
    match DemPyramid::open_with(path, DemReaderOptions::default()) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Failed to open {}: {}", path, e);
            std::process::exit(1);
        }
    }
}

fn probe_or_exit(path: &str) -> PyramidSummary {
    match probe(path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to read {}: {}", path, e);
            std::process::exit(1);
        }
    }
}

fn cmd_info(path: &str, json_mode: bool) {
    let pyramid = open_or_exit(path);
    let t = Decomposed::from_affine(&pyramid.transformation());
    let normal = pyramid.normal();
    let [hmin, hmax] = pyramid.height_range();

    if json_mode {
        let json = serde_json::json!({
            "file": path,
            "levels": pyramid.num_levels(),
            "header_size": pyramid.header_size(),
            "compressed": pyramid.is_compressed(),
            "has_albedo": pyramid.has_albedos(),
            "height_range": [hmin, hmax],
            "normal": normal.to_array(),
            "cone_angle_deg": pyramid.cone_angle().to_degrees(),
            "position": t.position.to_array(),
            "scale": t.scale.to_array(),
            "gsds": pyramid.gsds(),
            "offsets": pyramid.offsets(),
        });
        println!("{}", serde_json::to_string_pretty(&json).unwrap_or_default());
        return;
    }

    println!("Pyramid: {}", path);
    println!("Levels:      {}", pyramid.num_levels());
    println!("Header size: {} bytes", pyramid.header_size());
    println!("Compressed:  {}", pyramid.is_compressed());
    println!("Albedo:      {}", pyramid.has_albedos());
    println!("Heights:     {:.3} .. {:.3}", hmin, hmax);
    println!(
        "Normal:      ({:.4}, {:.4}, {:.4}) within {:.2} deg",
        normal.x,
        normal.y,
        normal.z,
        pyramid.cone_angle().to_degrees()
    );
    println!(
        "Position:    ({:.3}, {:.3}, {:.3})",
        t.position.x, t.position.y, t.position.z
    );
    println!("Scale:       ({:.3}, {:.3}, {:.3})", t.scale.x, t.scale.y, t.scale.z);
    println!(
        "GSD range:   {} .. {}",
        pyramid.gsds()[0],
        pyramid.gsds()[pyramid.num_levels() - 1]
    );
}

fn cmd_levels(path: &str) {
    let summary = probe_or_exit(path);
    debug!("Header ends at {}", summary.header_size);

    println!("Pyramid: {} ({} bytes)", path, summary.file_len);
    println!();
    println!("{:>5}  {:>12}  {:>12}  {:>12}", "level", "gsd", "offset", "size");
    for (i, size) in summary.level_sizes().into_iter().enumerate() {
        println!(
            "{:>5}  {:>12}  {:>12}  {:>12}",
            i, summary.gsds[i], summary.offsets[i], size
        );
    }
}

fn cmd_select(path: &str, gsd: f64) {
    let pyramid = open_or_exit(path);
    let index = pyramid.select_level(gsd);
    println!(
        "Requested gsd {} -> level {} (gsd {})",
        gsd,
        index,
        pyramid.gsds()[index]
    );
}

fn cmd_dump(path: &str, index: usize, json_mode: bool) {
    let pyramid = open_or_exit(path);
    let level = match pyramid.read_level(index) {
        Ok(l) => l,
        Err(e) => {
            eprintln!("Failed to read level {}: {}", index, e);
            std::process::exit(1);
        }
    };

    let p = &level.projection;
    let res = level.resolution();
    let range = level.height_range();
    let missing = level.heights.data().iter().filter(|h| !h.is_finite()).count();
    let (albedo_kind, albedo_detail) = match &level.albedo {
        Albedo::Constant(c) => ("constant", format!("{:?}", c.0)),
        Albedo::Float(img) => ("float", format!("{} image", img.resolution())),
        Albedo::Color(img) => ("color", format!("{} image", img.resolution())),
    };

    if json_mode {
        let json = serde_json::json!({
            "file": path,
            "level": index,
            "gsd": level.gsd(),
            "resolution": [res.width, res.height],
            "pixel_scale": p.pixel_scale,
            "tile": p.tile_string(),
            "offset": [p.xoff, p.yoff],
            "step": [p.dx, p.dy],
            "georeferenced": p.georeference.is_some(),
            "height_range": range,
            "missing_heights": missing,
            "albedo": albedo_kind,
        });
        println!("{}", serde_json::to_string_pretty(&json).unwrap_or_default());
        return;
    }

    println!("Pyramid: {}", path);
    println!("Level {} (gsd {})", index, level.gsd());
    println!("  Resolution:  {}", res);
    println!("  Pixel scale: {:?}", p.pixel_scale);
    if !p.tile_string().is_empty() {
        println!("  Tile:        {}", p.tile_string());
    }
    println!("  Offset:      ({}, {}) step ({}, {})", p.xoff, p.yoff, p.dx, p.dy);
    if let Some(geo) = &p.georeference {
        println!("  Tie point:   {:?}", geo.model_tie_point);
        println!("  Rotation:    {:?}", geo.row_col_rotation);
        println!("  Projection:  {}", geo.proj_ref);
    }
    match range {
        Some([lo, hi]) => println!("  Heights:     {:.3} .. {:.3} ({} missing)", lo, hi, missing),
        None => println!("  Heights:     all missing"),
    }
    println!("  Albedo:      {} {}", albedo_kind, albedo_detail);
    println!("  Triangles:   {}", level.make_index_buffer().len() / 3);
}
