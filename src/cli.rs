// ============================================================================
// HairlineFE CLI: headless region, strand and submission runs
// ============================================================================
//
// Usage examples:
//   HairlineFE region -i photo.jpg --face 100,50,200,250 --kind hairline --design m -o out/
//   HairlineFE region -i "shots/*.jpg" --face-json detect.json --kind crown -o out/
//   HairlineFE paint -i photo.jpg --points "150,90;170,92;190,95" --seed 7 --texture curly -o out/
//   HairlineFE submit -i photo.jpg --mask-3m drawing3.png --timeframe 3months --body form.bin
//   HairlineFE colors -i photo.jpg
//
// Everything runs synchronously on the current thread; nothing is sent over
// the network. `submit` writes the multipart body it would post.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::{Args, Parser, Subcommand};
use egui::{Pos2, Rect, pos2};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde_json::json;

use hairlinefe::assets::AppSettings;
use hairlinefe::canvas::{CanvasView, to_image_space};
use hairlinefe::components::colors;
use hairlinefe::components::tools::Tool;
use hairlinefe::io;
use hairlinefe::ops::mask;
use hairlinefe::ops::shapes::{FaceBounds, HairlineDesign, PatternKind};
use hairlinefe::ops::strands::HairTexture;
use hairlinefe::ops::submission::{FaceDetectionResponse, MarkMode, PartBody, Timeframe};
use hairlinefe::project::ImageSession;

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// HairlineFE headless compositing engine.
#[derive(Parser, Debug)]
#[command(
    name = "HairlineFE",
    about = "Hairline region, hair strand and mask compositing without a UI",
    long_about = "Build hairline/scalp region masks from face bounds, paint procedural\n\
                  hair strands along a pointer path, and assemble the generation\n\
                  request a backend would receive.\n\n\
                  Example:\n  \
                  HairlineFE region -i photo.jpg --face 100,50,200,250 -o out/"
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,

    /// Mirror the session log to stderr and print per-file timing.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Settings file to use instead of the per-user one.
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Render the region overlay, region mask and combined preview.
    Region(RegionArgs),
    /// Paint hair strands along a pointer path.
    Paint(PaintArgs),
    /// Write the multipart generation request for a photo.
    Submit(SubmitArgs),
    /// Print the sampled palette and hair color names as JSON.
    Colors(ColorsArgs),
}

/// Face bounds from the command line: either a rectangle or a detector reply.
#[derive(Args, Debug, Clone)]
pub struct FaceArgs {
    /// Face rectangle as LEFT,TOP,WIDTH,HEIGHT in image pixels.
    #[arg(long, value_name = "L,T,W,H")]
    pub face: Option<String>,

    /// JSON reply of the face detection endpoint.
    #[arg(long, value_name = "FILE", conflicts_with = "face")]
    pub face_json: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct RegionArgs {
    /// Input photo(s). Glob patterns accepted (e.g. "shots/*.jpg").
    #[arg(short, long, required = true, num_args = 1..)]
    pub input: Vec<String>,

    #[command(flatten)]
    pub face: FaceArgs,

    /// hairline, crown, mid-crown, full-scalp.
    #[arg(long, default_value = "hairline")]
    pub kind: String,

    /// Hairline design: m, z, curve.
    #[arg(long, default_value = "m")]
    pub design: String,

    /// Shift the generated region by "DX,DY" pixels.
    #[arg(long, value_name = "DX,DY", allow_hyphen_values = true)]
    pub nudge: Option<String>,

    /// Output directory; files are named after the input stem.
    #[arg(short, long, value_name = "DIR", default_value = ".")]
    pub output_dir: PathBuf,
}

#[derive(Args, Debug)]
pub struct PaintArgs {
    #[arg(short, long)]
    pub input: PathBuf,

    /// Pointer samples "x,y;x,y;...". Consecutive samples form one stroke;
    /// an empty entry ("...;;...") starts a new stroke.
    #[arg(long, required = true)]
    pub points: String,

    /// Interpret points in a display rect X,Y,W,H instead of image pixels.
    #[arg(long, value_name = "X,Y,W,H")]
    pub view: Option<String>,

    #[arg(long, default_value_t = 1)]
    pub seed: u64,

    #[arg(long, default_value = "straight")]
    pub texture: String,

    #[arg(long)]
    pub density: Option<f32>,

    #[arg(long, default_value_t = 40.0)]
    pub brush_size: f32,

    #[arg(long, default_value_t = 80.0)]
    pub hair_length: f32,

    #[arg(long, default_value_t = 6.0)]
    pub softness: f32,

    #[arg(long, default_value_t = 0.0)]
    pub curl: f32,

    /// Hair color as #rrggbb.
    #[arg(long)]
    pub color: Option<String>,

    #[arg(long, default_value = "3months")]
    pub timeframe: String,

    /// Use the eraser instead of the hair brush.
    #[arg(long)]
    pub erase: bool,

    /// Undo this many strokes after painting.
    #[arg(long, default_value_t = 0)]
    pub undo: usize,

    #[arg(short, long, value_name = "DIR", default_value = ".")]
    pub output_dir: PathBuf,
}

#[derive(Args, Debug)]
pub struct SubmitArgs {
    #[arg(short, long)]
    pub input: PathBuf,

    #[command(flatten)]
    pub face: FaceArgs,

    /// Drawing for the 3-month timeframe (same size as the photo).
    #[arg(long, value_name = "PNG")]
    pub mask_3m: Option<PathBuf>,

    #[arg(long, value_name = "PNG")]
    pub mask_8m: Option<PathBuf>,

    #[arg(long, default_value = "hairline")]
    pub kind: String,

    #[arg(long, default_value = "m")]
    pub design: String,

    #[arg(long, default_value = "3months")]
    pub timeframe: String,

    #[arg(long)]
    pub color: Option<String>,

    #[arg(long, default_value = "straight")]
    pub hair_type: String,

    #[arg(long)]
    pub density_3m: Option<f32>,

    #[arg(long)]
    pub density_8m: Option<f32>,

    /// Where to write the encoded multipart body.
    #[arg(long, value_name = "FILE")]
    pub body: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ColorsArgs {
    #[arg(short, long)]
    pub input: PathBuf,
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run the selected subcommand and return an OS exit code.
pub fn run(args: CliArgs) -> ExitCode {
    let settings = match args.config {
        Some(ref path) => AppSettings::load_from(path),
        None => AppSettings::load(),
    };

    let result = match args.command {
        Command::Region(ref a) => return run_region(a, &settings, args.verbose),
        Command::Paint(ref a) => run_paint(a, &settings),
        Command::Submit(ref a) => run_submit(a, &settings),
        Command::Colors(ref a) => run_colors(a),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            hairlinefe::log_err!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_region(args: &RegionArgs, settings: &AppSettings, verbose: bool) -> ExitCode {
    let inputs = resolve_inputs(&args.input);
    if inputs.is_empty() {
        eprintln!("error: no input files matched the given pattern(s).");
        return ExitCode::FAILURE;
    }
    if let Err(e) = std::fs::create_dir_all(&args.output_dir) {
        eprintln!("error: could not create output directory '{}': {}", args.output_dir.display(), e);
        return ExitCode::FAILURE;
    }

    let total = inputs.len();
    let multi = total > 1;
    let mut any_failure = false;

    for (idx, input_path) in inputs.iter().enumerate() {
        if multi || verbose {
            println!("[{}/{}] {}", idx + 1, total, input_path.display());
        }
        let file_start = Instant::now();
        match region_one(input_path, args, settings) {
            Ok(written) => {
                if multi || verbose {
                    for path in written {
                        println!("  → {}", path.display());
                    }
                    println!("  ({:.0}ms)", file_start.elapsed().as_secs_f64() * 1000.0);
                }
            }
            Err(e) => {
                eprintln!("  error: {}", e);
                any_failure = true;
            }
        }
    }

    if any_failure { ExitCode::FAILURE } else { ExitCode::SUCCESS }
}

// ============================================================================
// Per-command pipelines
// ============================================================================

fn region_one(input: &Path, args: &RegionArgs, settings: &AppSettings) -> Result<Vec<PathBuf>, String> {
    let mut session = ImageSession::from_file(input, settings).map_err(|e| format!("load failed: {}", e))?;
    let (kind, design) = parse_pattern(&args.kind, &args.design)?;
    apply_face(&mut session, &args.face)?;
    session.select_pattern(kind, design);
    if let Some(ref nudge) = args.nudge {
        let d = parse_floats(nudge, 2, "nudge")?;
        session.nudge_region(d[0], d[1]);
    }

    let region_mask = session
        .region_mask()
        .ok_or_else(|| "no region: face bounds are required (--face or --face-json)".to_string())?;
    let combined = session
        .combined_preview(session.active_timeframe())
        .ok_or_else(|| "no region to composite".to_string())?;

    let stem = file_stem(input)?;
    let outputs = [
        (format!("{}_overlay.png", stem), session.region_overlay()),
        (format!("{}_region_mask.png", stem), region_mask),
        (format!("{}_combined.png", stem), combined),
    ];
    let mut written = Vec::with_capacity(outputs.len());
    for (name, img) in outputs {
        let path = args.output_dir.join(name);
        io::write_png(&img, &path).map_err(|e| format!("save failed: {}", e))?;
        written.push(path);
    }
    Ok(written)
}

fn run_paint(args: &PaintArgs, settings: &AppSettings) -> Result<(), String> {
    let mut session = ImageSession::from_file(&args.input, settings).map_err(|e| format!("load failed: {}", e))?;
    let timeframe = parse_timeframe(&args.timeframe)?;
    session.switch_timeframe(timeframe);

    session.brush_settings.texture = parse_texture(&args.texture)?;
    session.brush_settings.brush_size = args.brush_size;
    session.brush_settings.hair_length = args.hair_length;
    session.brush_settings.hair_softness = args.softness;
    session.brush_settings.curl_intensity = args.curl;
    if let Some(ref hex) = args.color {
        let rgb = colors::parse_hex(hex).ok_or_else(|| format!("invalid color '{}'", hex))?;
        session.brush_settings.color = Some(rgb);
    }
    if let Some(d) = args.density {
        session.set_density(timeframe, d);
    }
    session.set_tool(if args.erase { Tool::Eraser } else { Tool::HairBrush });

    let view = args.view.as_deref().map(|v| parse_view(v, session.dimensions())).transpose()?;
    let strokes = parse_strokes(&args.points)?;
    let mut rng = StdRng::seed_from_u64(args.seed);
    let mut strand_count = 0;

    for stroke in &strokes {
        let mapped: Vec<Pos2> = stroke.iter().map(|p| map_point(*p, view.as_ref())).collect();
        let Some((&first, rest)) = mapped.split_first() else { continue };
        session.stroke_begin(first);
        strand_count += session.stroke_to(&mut rng, first).len();
        for p in rest {
            strand_count += session.stroke_to(&mut rng, *p).len();
        }
        session.stroke_end();
    }

    let mut undone = 0;
    while undone < args.undo && session.undo().is_some() {
        undone += 1;
    }

    let stem = file_stem(&args.input)?;
    let layer = session.layer(timeframe).to_rgba_image();
    let white = mask::binary_mask(&layer, session.mask_background);
    let combined = mask::overlay_composite(session.original(), &layer);
    for (suffix, img) in [("drawing", &layer), ("mask", &white), ("combined", &combined)] {
        let path = args.output_dir.join(format!("{}_{}_{}.png", stem, timeframe.wire_name(), suffix));
        io::write_png(img, &path).map_err(|e| format!("save failed: {}", e))?;
    }

    let report = json!({
        "timeframe": timeframe.wire_name(),
        "strokes": strokes.len(),
        "strands": strand_count,
        "undone": undone,
        "history": session.history(timeframe).undo_history(),
        "marked_pixels": mask::marked_pixel_count(&white),
    });
    println!("{}", report);
    Ok(())
}

fn run_submit(args: &SubmitArgs, settings: &AppSettings) -> Result<(), String> {
    let mut session = ImageSession::from_file(&args.input, settings).map_err(|e| format!("load failed: {}", e))?;
    let timeframe = parse_timeframe(&args.timeframe)?;
    let (kind, design) = parse_pattern(&args.kind, &args.design)?;
    apply_face(&mut session, &args.face)?;
    session.select_pattern(kind, design);
    session.brush_settings.texture = parse_texture(&args.hair_type)?;
    if let Some(d) = args.density_3m {
        session.set_density(Timeframe::ThreeMonths, d);
    }
    if let Some(d) = args.density_8m {
        session.set_density(Timeframe::EightMonths, d);
    }

    for (tf, path) in [(Timeframe::ThreeMonths, &args.mask_3m), (Timeframe::EightMonths, &args.mask_8m)] {
        let Some(path) = path else { continue };
        let drawing = io::load_image(path).map_err(|e| format!("mask load failed: {}", e))?;
        session
            .restore_drawing_image(tf, &drawing)
            .map_err(|e| format!("mask '{}': {}", path.display(), e))?;
        session.mode = MarkMode::FreeMark;
    }

    let form = session.build_form(timeframe, args.color.as_deref()).map_err(|e| e.to_string())?;
    let parts = form.parts().map_err(|e| e.to_string())?;
    let summary: Vec<_> = parts
        .iter()
        .map(|p| match p.body {
            PartBody::Text(ref v) => json!({ "name": p.name, "value": v }),
            PartBody::File(ref f) => json!({
                "name": p.name,
                "filename": f.filename,
                "content_type": f.content_type,
                "bytes": f.data.len(),
            }),
        })
        .collect();

    let mut report = json!({
        "endpoint": settings.endpoint_url(hairlinefe::assets::Endpoint::GenerateIndividual),
        "fields": summary,
    });
    if let Some(ref path) = args.body {
        let (content_type, body) = form.encode().map_err(|e| e.to_string())?;
        io::write_bytes(&body, path).map_err(|e| format!("write failed: {}", e))?;
        report["content_type"] = json!(content_type);
        report["body"] = json!(path.display().to_string());
        report["body_bytes"] = json!(body.len());
    }
    println!("{}", serde_json::to_string_pretty(&report).map_err(|e| e.to_string())?);
    Ok(())
}

fn run_colors(args: &ColorsArgs) -> Result<(), String> {
    let img = io::load_image(&args.input).map_err(|e| format!("load failed: {}", e))?;
    let palette: Vec<_> = colors::extract_palette(&img)
        .into_iter()
        .map(|hex| {
            let name = colors::color_name_hex(&hex);
            json!({ "hex": hex, "name": name })
        })
        .collect();
    let presets: Vec<_> = hairlinefe::assets::PREDEFINED_COLORS
        .iter()
        .map(|(hex, label)| json!({ "hex": hex, "label": label, "name": colors::color_name_hex(hex) }))
        .collect();
    let report = json!({ "palette": palette, "presets": presets });
    println!("{}", serde_json::to_string_pretty(&report).map_err(|e| e.to_string())?);
    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

/// Expand glob patterns and literal paths into a deduplicated, ordered list.
fn resolve_inputs(patterns: &[String]) -> Vec<PathBuf> {
    let mut result: Vec<PathBuf> = Vec::new();

    for pattern in patterns {
        let as_path = Path::new(pattern);

        if as_path.exists() {
            if !result.iter().any(|p| p.as_path() == as_path) {
                result.push(as_path.to_path_buf());
            }
            continue;
        }

        match glob::glob(pattern) {
            Ok(entries) => {
                let mut matched = false;
                for entry in entries.flatten() {
                    let supported = entry
                        .extension()
                        .and_then(|e| e.to_str())
                        .is_some_and(io::is_supported_extension);
                    if supported && !result.contains(&entry) {
                        result.push(entry);
                        matched = true;
                    }
                }
                if !matched {
                    eprintln!("warning: pattern '{}' matched no images.", pattern);
                }
            }
            Err(e) => {
                eprintln!("warning: invalid glob '{}': {}", pattern, e);
            }
        }
    }

    result
}

fn file_stem(path: &Path) -> Result<String, String> {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .ok_or_else(|| format!("cannot derive a name from '{}'", path.display()))
}

fn parse_floats(s: &str, n: usize, what: &str) -> Result<Vec<f32>, String> {
    let values: Vec<f32> = s
        .split(',')
        .map(|v| v.trim().parse::<f32>())
        .collect::<Result<_, _>>()
        .map_err(|_| format!("invalid {} '{}'", what, s))?;
    if values.len() != n || values.iter().any(|v| !v.is_finite()) {
        return Err(format!("{} needs {} numbers, got '{}'", what, n, s));
    }
    Ok(values)
}

fn apply_face(session: &mut ImageSession, args: &FaceArgs) -> Result<(), String> {
    if let Some(ref rect) = args.face {
        let v = parse_floats(rect, 4, "face")?;
        let face = FaceBounds {
            left: v[0],
            top: v[1],
            width: v[2],
            height: v[3],
            right: v[0] + v[2],
            center_x: v[0] + v[2] / 2.0,
        };
        session.set_face(Some(face));
    } else if let Some(ref path) = args.face_json {
        let text = std::fs::read_to_string(path).map_err(|e| format!("cannot read '{}': {}", path.display(), e))?;
        let reply = FaceDetectionResponse::parse(&text).map_err(|e| e.to_string())?;
        let token = session.begin_load();
        session.complete_face_detection(token, &reply);
    }
    Ok(())
}

fn parse_pattern(kind: &str, design: &str) -> Result<(PatternKind, HairlineDesign), String> {
    let kind = PatternKind::parse(kind).ok_or_else(|| format!("unknown region kind '{}'", kind))?;
    let design = HairlineDesign::parse(design).ok_or_else(|| format!("unknown hairline design '{}'", design))?;
    Ok((kind, design))
}

fn parse_timeframe(s: &str) -> Result<Timeframe, String> {
    Timeframe::parse(s).ok_or_else(|| format!("timeframe must be 3months or 8months, got '{}'", s))
}

fn parse_texture(s: &str) -> Result<HairTexture, String> {
    HairTexture::parse(s).ok_or_else(|| format!("unknown hair type '{}'", s))
}

/// `"x,y;x,y;;x,y"` → strokes separated by empty entries.
fn parse_strokes(s: &str) -> Result<Vec<Vec<Pos2>>, String> {
    let mut strokes = vec![Vec::new()];
    for entry in s.split(';').map(str::trim) {
        if entry.is_empty() {
            if strokes.last().is_some_and(|st| !st.is_empty()) {
                strokes.push(Vec::new());
            }
            continue;
        }
        let v = parse_floats(entry, 2, "point")?;
        if let Some(stroke) = strokes.last_mut() {
            stroke.push(pos2(v[0], v[1]));
        }
    }
    strokes.retain(|st| !st.is_empty());
    if strokes.is_empty() {
        return Err("no points given".into());
    }
    Ok(strokes)
}

fn parse_view(s: &str, native: (u32, u32)) -> Result<CanvasView, String> {
    let v = parse_floats(s, 4, "view")?;
    let rect = Rect::from_min_size(pos2(v[0], v[1]), egui::vec2(v[2], v[3]));
    let view = CanvasView::new(rect, native.0, native.1);
    if !view.is_mounted() {
        return Err(format!("view '{}' has no area", s));
    }
    Ok(view)
}

fn map_point(p: Pos2, view: Option<&CanvasView>) -> Pos2 {
    match view {
        Some(_) => to_image_space(p, view),
        None => p,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_strokes_splits_on_empty_entries() {
        let strokes = parse_strokes("1,2; 3,4;;5,6;").unwrap();
        assert_eq!(strokes, vec![vec![pos2(1.0, 2.0), pos2(3.0, 4.0)], vec![pos2(5.0, 6.0)]]);
        assert!(parse_strokes(";;").is_err());
        assert!(parse_strokes("1,2,3").is_err());
    }

    #[test]
    fn test_view_maps_to_image_space() {
        let view = parse_view("10,10,200,100", (400, 200)).unwrap();
        assert_eq!(map_point(pos2(110.0, 60.0), Some(&view)), pos2(200.0, 100.0));
        assert!(parse_view("0,0,0,10", (4, 4)).is_err());
    }

    #[test]
    fn test_parse_floats_rejects_nan() {
        assert!(parse_floats("1,NaN", 2, "point").is_err());
        assert_eq!(parse_floats("1, 2.5", 2, "point").unwrap(), vec![1.0, 2.5]);
    }

    #[test]
    fn test_cli_parses_subcommands() {
        let args = CliArgs::try_parse_from(["HairlineFE", "paint", "-i", "a.png", "--points", "1,2", "--undo", "2"])
            .unwrap();
        match args.command {
            Command::Paint(p) => assert_eq!(p.undo, 2),
            other => panic!("unexpected {:?}", other),
        }
        assert!(CliArgs::try_parse_from(["HairlineFE", "region", "-i", "a.png", "--face", "1,2,3,4", "--face-json", "f.json"]).is_err());
    }
}
