use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{ArgAction, Args, Parser, Subcommand};
use font8x8::{UnicodeFonts, BASIC_FONTS};
use image::imageops::FilterType;
use image::{DynamicImage, Rgba, RgbaImage};
use serde::Deserialize;
use serde_json::{json, Value};
use std::f64::consts::PI;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

const PAGE_W: u32 = 840;
const PAGE_H: u32 = 1188;
const MARGIN: f64 = 56.0;
const CONTENT_W: f64 = 728.0;
const GRID_SPACING: f64 = 40.0;
const PANEL_STROKE_W: f64 = 2.0;

const GAUGE_STEP: f64 = 0.08;
const GAUGE_RADIUS: f64 = 36.0;
const GAUGE_TRACK_W: f64 = 10.0;
const GAUGE_ARC_W: f64 = 8.0;

const EXCERPT_LIMIT: usize = 400;
const EXCERPT_MAX_LINES: usize = 8;
const NARRATIVE_MAX_LINES: usize = 6;
const LINE_H: f64 = 12.0;

const IMAGE_EVIDENCE_W: f64 = 320.0;
const IMAGE_EVIDENCE_H: f64 = 220.0;
const IMAGE_PANEL_ADVANCE: f64 = IMAGE_EVIDENCE_H + 56.0;
const TEXT_PANEL_H: f64 = 152.0;
const TEXT_PANEL_ADVANCE: f64 = 176.0;

#[derive(Parser, Debug)]
#[command(
    name = "omnidetect-report",
    version,
    about = "Render OmniDetect AI-content analysis results into styled single-page PNG reports"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Render an analysis result into a report page and save it
    Render(RenderArgs),
    /// Print the narrative interpretation for an analysis result as JSON
    Narrative(NarrativeArgs),
}

#[derive(Args, Debug)]
struct RenderArgs {
    /// Analysis result JSON path (or - for stdin)
    result: String,
    /// Evidence image path (image scans only)
    #[arg(long)]
    image: Option<PathBuf>,
    /// Explicit output path (default: derived report file name)
    #[arg(long)]
    out: Option<PathBuf>,
    /// Directory for the derived report file name
    #[arg(long)]
    out_dir: Option<PathBuf>,
    /// Print report metadata JSON to stdout
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,
    /// Custom metadata sidecar path (default: <out>.json)
    #[arg(long)]
    sidecar: Option<PathBuf>,
    /// Disable metadata sidecar generation
    #[arg(long, action = ArgAction::SetTrue)]
    no_sidecar: bool,
    /// Fail with non-zero status when the report completed with warnings
    #[arg(long, action = ArgAction::SetTrue)]
    strict: bool,
}

#[derive(Args, Debug)]
struct NarrativeArgs {
    /// Analysis result JSON path (or - for stdin)
    result: String,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Render(args) => command_render(args),
        Commands::Narrative(args) => command_narrative(args),
    }
}

fn command_render(args: RenderArgs) -> Result<()> {
    let result = load_result(&args.result)?;
    let snapshot = ReportSnapshot::capture(result, args.image.clone());
    let doc = render_report(&snapshot)?;

    let out_path = args.out.clone().unwrap_or_else(|| {
        let dir = args.out_dir.clone().unwrap_or_else(|| PathBuf::from("."));
        dir.join(report_file_name(&snapshot))
    });
    let sidecar_path = if args.no_sidecar {
        None
    } else {
        Some(
            args.sidecar
                .unwrap_or_else(|| default_sidecar_for(&out_path)),
        )
    };

    let payload = export_report(&doc, &snapshot, &out_path, sidecar_path.as_deref())?;

    if args.json {
        println!("{}", serde_json::to_string(&payload)?);
    } else {
        println!("{}", abs_path(&out_path).display());
    }

    if args.strict && !doc.meta.warnings.is_empty() {
        bail!(
            "report completed with warnings: {}",
            doc.meta.warnings.join("; ")
        );
    }

    Ok(())
}

fn command_narrative(args: NarrativeArgs) -> Result<()> {
    let result = load_result(&args.result)?;
    let snapshot = ReportSnapshot::capture(result, None);
    let class = VerdictClass::classify(&snapshot.verdict);
    let narrative = interpret(&snapshot);

    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "verdict": snapshot.verdict,
            "verdict_class": class.as_str(),
            "narrative": narrative.narrative,
            "recommendation": narrative.recommendation,
        }))?
    );
    Ok(())
}

fn load_result(raw: &str) -> Result<AnalysisResult> {
    let text = if raw == "-" {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read analysis result from stdin")?;
        buf
    } else {
        fs::read_to_string(raw).with_context(|| format!("analysis result not found: {raw}"))?
    };
    serde_json::from_str(&text).context("invalid analysis result JSON")
}

/* ── Input model ── */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ScanKind {
    Image,
    Text,
}

impl ScanKind {
    fn as_str(self) -> &'static str {
        match self {
            ScanKind::Image => "image",
            ScanKind::Text => "text",
        }
    }

    fn badge_label(self) -> &'static str {
        match self {
            ScanKind::Image => "IMAGE SCAN",
            ScanKind::Text => "TEXT SCAN",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct AnalysisResult {
    #[serde(default = "default_verdict")]
    verdict: String,
    #[serde(default)]
    ai_score: f64,
    #[serde(default)]
    human_score: f64,
    #[serde(default)]
    confidence: f64,
    #[serde(default = "default_model")]
    model_used: String,
    #[serde(rename = "type")]
    kind: ScanKind,
    #[serde(default)]
    file_name: Option<String>,
    #[serde(default)]
    input_text: Option<String>,
}

fn default_verdict() -> String {
    "Unknown".to_string()
}

fn default_model() -> String {
    "unknown".to_string()
}

/* ── Report snapshot ── */

#[derive(Debug, Clone)]
struct ReportSnapshot {
    verdict: String,
    ai_score: f64,
    human_score: f64,
    confidence: f64,
    model_used: String,
    kind: ScanKind,
    file_name: Option<String>,
    input_text: Option<String>,
    image_path: Option<PathBuf>,
    captured_at: DateTime<Utc>,
}

impl ReportSnapshot {
    fn capture(result: AnalysisResult, image_path: Option<PathBuf>) -> Self {
        Self::capture_at(result, image_path, Utc::now())
    }

    fn capture_at(
        result: AnalysisResult,
        image_path: Option<PathBuf>,
        at: DateTime<Utc>,
    ) -> Self {
        // The evidence handle is resolved once here; render never re-reads
        // host state.
        let image_path = if result.kind == ScanKind::Image {
            image_path
        } else {
            None
        };
        ReportSnapshot {
            verdict: result.verdict,
            ai_score: result.ai_score,
            human_score: result.human_score,
            confidence: result.confidence,
            model_used: result.model_used,
            kind: result.kind,
            file_name: result.file_name,
            input_text: result.input_text,
            image_path,
            captured_at: at,
        }
    }

    fn report_id(&self) -> String {
        let millis = self.captured_at.timestamp_millis().max(0) as u64;
        format!("RPT-{}", to_base36(millis))
    }
}

fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

fn pct(score: f64) -> u32 {
    (score * 100.0).round() as u32
}

/* ── Verdict classification ── */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VerdictClass {
    Ai,
    Human,
    Uncertain,
}

impl VerdictClass {
    /// A verdict naming both AI and HUMAN resolves to Ai: suspect content
    /// takes precedence over authentic content.
    fn classify(verdict: &str) -> Self {
        let v = verdict.to_uppercase();
        if v.contains("AI") {
            VerdictClass::Ai
        } else if v.contains("HUMAN") {
            VerdictClass::Human
        } else {
            VerdictClass::Uncertain
        }
    }

    fn color(self) -> Rgba<u8> {
        match self {
            VerdictClass::Ai => palette::RED,
            VerdictClass::Human => palette::GREEN,
            VerdictClass::Uncertain => palette::AMBER,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            VerdictClass::Ai => "ai",
            VerdictClass::Human => "human",
            VerdictClass::Uncertain => "uncertain",
        }
    }
}

/* ── Palette ── */

mod palette {
    use image::Rgba;

    // Every entry is fully opaque. "Glow" and "tint" effects are pre-blended
    // colors; no primitive performs alpha compositing.
    pub const BG: Rgba<u8> = Rgba([3, 7, 18, 255]);
    pub const BG2: Rgba<u8> = Rgba([10, 15, 30, 255]);
    pub const BG3: Rgba<u8> = Rgba([15, 23, 42, 255]);
    pub const BG4: Rgba<u8> = Rgba([20, 30, 55, 255]);
    pub const CYAN: Rgba<u8> = Rgba([0, 245, 255, 255]);
    pub const CYAN_DIM: Rgba<u8> = Rgba([0, 80, 95, 255]);
    pub const CYAN_MID: Rgba<u8> = Rgba([0, 140, 160, 255]);
    pub const CYAN_DEEP: Rgba<u8> = Rgba([0, 60, 100, 255]);
    pub const CYAN_TINT: Rgba<u8> = Rgba([0, 30, 50, 255]);
    pub const VIOLET_BRIGHT: Rgba<u8> = Rgba([168, 85, 247, 255]);
    pub const VIOLET_TINT: Rgba<u8> = Rgba([30, 0, 70, 255]);
    pub const RED: Rgba<u8> = Rgba([255, 77, 109, 255]);
    pub const RED_DIM: Rgba<u8> = Rgba([80, 20, 35, 255]);
    pub const GREEN: Rgba<u8> = Rgba([16, 185, 129, 255]);
    pub const GREEN_DIM: Rgba<u8> = Rgba([5, 55, 40, 255]);
    pub const AMBER: Rgba<u8> = Rgba([245, 158, 11, 255]);
    pub const WHITE: Rgba<u8> = Rgba([226, 232, 240, 255]);
    pub const DIM: Rgba<u8> = Rgba([100, 116, 139, 255]);
    pub const DIM_DARK: Rgba<u8> = Rgba([40, 52, 70, 255]);

    pub const HEADER_BANDS: [Rgba<u8>; 6] = [
        Rgba([48, 18, 95, 255]),
        Rgba([38, 15, 80, 255]),
        Rgba([28, 12, 65, 255]),
        Rgba([18, 10, 50, 255]),
        Rgba([10, 8, 36, 255]),
        Rgba([5, 7, 24, 255]),
    ];
}

/* ── Drawing surface ── */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Align {
    Left,
    Center,
    Right,
}

struct Surface {
    img: RgbaImage,
}

impl Surface {
    fn page() -> Self {
        Surface {
            img: RgbaImage::from_pixel(PAGE_W, PAGE_H, palette::BG),
        }
    }

    #[cfg(test)]
    fn new(w: u32, h: u32) -> Self {
        Surface {
            img: RgbaImage::from_pixel(w, h, palette::BG),
        }
    }

    fn put(&mut self, x: i32, y: i32, color: Rgba<u8>) {
        if x >= 0 && y >= 0 && x < self.img.width() as i32 && y < self.img.height() as i32 {
            self.img.put_pixel(x as u32, y as u32, color);
        }
    }

    fn fill_rect(&mut self, x: f64, y: f64, w: f64, h: f64, color: Rgba<u8>) {
        if w <= 0.0 || h <= 0.0 {
            return;
        }
        let x0 = x.floor() as i32;
        let y0 = y.floor() as i32;
        let x1 = (x + w).ceil() as i32 - 1;
        let y1 = (y + h).ceil() as i32 - 1;
        for py in y0..=y1 {
            for px in x0..=x1 {
                self.put(px, py, color);
            }
        }
    }

    fn fill_rounded_rect(&mut self, x: f64, y: f64, w: f64, h: f64, r: f64, color: Rgba<u8>) {
        if w <= 0.0 || h <= 0.0 {
            return;
        }
        let x0 = x.floor() as i32;
        let y0 = y.floor() as i32;
        let x1 = (x + w).ceil() as i32;
        let y1 = (y + h).ceil() as i32;
        for py in y0..=y1 {
            for px in x0..=x1 {
                let cx = f64::from(px) + 0.5;
                let cy = f64::from(py) + 0.5;
                if point_in_rounded_rect(cx, cy, x, y, w, h, r) {
                    self.put(px, py, color);
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn stroke_rounded_rect(
        &mut self,
        x: f64,
        y: f64,
        w: f64,
        h: f64,
        r: f64,
        width: f64,
        color: Rgba<u8>,
    ) {
        if w <= 0.0 || h <= 0.0 {
            return;
        }
        let x0 = x.floor() as i32;
        let y0 = y.floor() as i32;
        let x1 = (x + w).ceil() as i32;
        let y1 = (y + h).ceil() as i32;
        let inner_x = x + width;
        let inner_y = y + width;
        let inner_w = w - 2.0 * width;
        let inner_h = h - 2.0 * width;
        for py in y0..=y1 {
            for px in x0..=x1 {
                let cx = f64::from(px) + 0.5;
                let cy = f64::from(py) + 0.5;
                if point_in_rounded_rect(cx, cy, x, y, w, h, r)
                    && !point_in_rounded_rect(
                        cx,
                        cy,
                        inner_x,
                        inner_y,
                        inner_w,
                        inner_h,
                        (r - width).max(0.0),
                    )
                {
                    self.put(px, py, color);
                }
            }
        }
    }

    /// Draws fill first when present, then stroke when present. Both show up
    /// when both are given; this is not an either/or mode.
    #[allow(clippy::too_many_arguments)]
    fn panel(
        &mut self,
        x: f64,
        y: f64,
        w: f64,
        h: f64,
        r: f64,
        fill: Option<Rgba<u8>>,
        stroke: Option<Rgba<u8>>,
    ) {
        if let Some(color) = fill {
            self.fill_rounded_rect(x, y, w, h, r, color);
        }
        if let Some(color) = stroke {
            self.stroke_rounded_rect(x, y, w, h, r, PANEL_STROKE_W, color);
        }
    }

    fn stamp_disc(&mut self, cx: f64, cy: f64, radius: f64, color: Rgba<u8>) {
        if radius <= 0.1 {
            self.put(cx.round() as i32, cy.round() as i32, color);
            return;
        }
        let min_x = (cx - radius).floor() as i32;
        let max_x = (cx + radius).ceil() as i32;
        let min_y = (cy - radius).floor() as i32;
        let max_y = (cy + radius).ceil() as i32;
        let r2 = radius * radius;
        for y in min_y..=max_y {
            for x in min_x..=max_x {
                let dx = f64::from(x) - cx;
                let dy = f64::from(y) - cy;
                if dx * dx + dy * dy <= r2 {
                    self.put(x, y, color);
                }
            }
        }
    }

    fn line(&mut self, x1: f64, y1: f64, x2: f64, y2: f64, width: f64, color: Rgba<u8>) {
        let dx = x2 - x1;
        let dy = y2 - y1;
        let distance = (dx * dx + dy * dy).sqrt();
        let steps = distance.max(1.0).ceil() as i32;
        let radius = (width.max(1.0) / 2.0).max(0.6);
        for step in 0..=steps {
            let t = f64::from(step) / f64::from(steps.max(1));
            self.stamp_disc(x1 + dx * t, y1 + dy * t, radius, color);
        }
    }

    fn hline(&mut self, x1: f64, x2: f64, y: f64, width: f64, color: Rgba<u8>) {
        self.fill_rect(x1, y - width / 2.0, x2 - x1, width.max(1.0), color);
    }

    fn dashed_hline(&mut self, x1: f64, x2: f64, y: f64, color: Rgba<u8>) {
        let mut x = x1;
        while x < x2 {
            let end = (x + 4.0).min(x2);
            self.fill_rect(x, y, end - x, 1.0, color);
            x += 12.0;
        }
    }

    fn grid(&mut self, x: f64, y: f64, w: f64, h: f64, spacing: f64, color: Rgba<u8>) {
        let mut lx = x;
        while lx <= x + w {
            self.fill_rect(lx, y, 1.0, h, color);
            lx += spacing;
        }
        let mut ly = y;
        while ly <= y + h {
            self.fill_rect(x, ly, w, 1.0, color);
            ly += spacing;
        }
    }

    fn fill_circle(&mut self, cx: f64, cy: f64, radius: f64, color: Rgba<u8>) {
        self.stamp_disc(cx, cy, radius, color);
    }

    fn stroke_circle(&mut self, cx: f64, cy: f64, radius: f64, width: f64, color: Rgba<u8>) {
        let steps = ((2.0 * PI * radius).ceil() as i32).max(8) * 2;
        for step in 0..steps {
            let a = 2.0 * PI * f64::from(step) / f64::from(steps);
            self.stamp_disc(
                cx + radius * a.cos(),
                cy + radius * a.sin(),
                (width / 2.0).max(0.6),
                color,
            );
        }
    }

    fn stroke_ellipse(&mut self, cx: f64, cy: f64, rx: f64, ry: f64, width: f64, color: Rgba<u8>) {
        let steps = ((2.0 * PI * rx.max(ry)).ceil() as i32).max(8) * 2;
        for step in 0..steps {
            let a = 2.0 * PI * f64::from(step) / f64::from(steps);
            self.stamp_disc(
                cx + rx * a.cos(),
                cy + ry * a.sin(),
                (width / 2.0).max(0.6),
                color,
            );
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn progress_bar(
        &mut self,
        x: f64,
        y: f64,
        w: f64,
        h: f64,
        percent: u32,
        fill: Rgba<u8>,
        track: Rgba<u8>,
    ) {
        debug_assert!(percent <= 100, "progress percent out of range: {percent}");
        self.fill_rounded_rect(x, y, w, h, h / 2.0, track);
        if percent > 0 {
            let filled = progress_fill_width(percent, w, h);
            self.fill_rounded_rect(x, y, filled, h, h / 2.0, fill);
        }
    }

    fn radial_gauge(&mut self, cx: f64, cy: f64, radius: f64, percent: u32, color: Rgba<u8>) {
        debug_assert!(percent <= 100, "gauge percent out of range: {percent}");
        self.stroke_circle(cx, cy, radius, GAUGE_TRACK_W, palette::DIM_DARK);
        for (a0, a1) in gauge_segments(percent) {
            self.line(
                cx + radius * a0.cos(),
                cy + radius * a0.sin(),
                cx + radius * a1.cos(),
                cy + radius * a1.sin(),
                GAUGE_ARC_W,
                color,
            );
        }
    }

    fn corner_bracket(&mut self, x: f64, y: f64, size: f64, color: Rgba<u8>, mirrored: bool) {
        let sx = if mirrored { -1.0 } else { 1.0 };
        self.line(x, y, x + sx * size, y, 2.0, color);
        self.line(x, y, x, y + size, 2.0, color);
    }

    fn draw_text(&mut self, x: f64, y: f64, text: &str, color: Rgba<u8>, scale: u32, align: Align) {
        let width = text_width(text, scale);
        let x0 = match align {
            Align::Left => x,
            Align::Center => x - width / 2.0,
            Align::Right => x - width,
        };
        let scale_i = scale.max(1) as i32;
        let mut cursor_x = x0.round() as i32;
        let base_y = y.round() as i32;
        for ch in text.chars() {
            if let Some(glyph) = BASIC_FONTS.get(ch) {
                for (row_idx, row) in glyph.iter().enumerate() {
                    let row_bits = *row;
                    for col_idx in 0..8 {
                        if (row_bits >> col_idx) & 1 == 0 {
                            continue;
                        }
                        let px = cursor_x + col_idx * scale_i;
                        let py = base_y + row_idx as i32 * scale_i;
                        for sy in 0..scale_i {
                            for sx in 0..scale_i {
                                self.put(px + sx, py + sy, color);
                            }
                        }
                    }
                }
            }
            cursor_x += 8 * scale_i;
        }
    }

    fn draw_text_rotated(
        &mut self,
        cx: f64,
        cy: f64,
        text: &str,
        color: Rgba<u8>,
        scale: u32,
        angle: f64,
    ) {
        let glyphs: Vec<Option<[u8; 8]>> = text.chars().map(|ch| BASIC_FONTS.get(ch)).collect();
        if glyphs.is_empty() {
            return;
        }
        let cell = (8 * scale.max(1)) as f64;
        let w = cell * glyphs.len() as f64;
        let h = cell;
        let (sin, cos) = angle.sin_cos();
        let half_w = (w * cos.abs() + h * sin.abs()) / 2.0;
        let half_h = (w * sin.abs() + h * cos.abs()) / 2.0;
        let min_x = (cx - half_w).floor() as i32;
        let max_x = (cx + half_w).ceil() as i32;
        let min_y = (cy - half_h).floor() as i32;
        let max_y = (cy + half_h).ceil() as i32;
        let unit = cell / 8.0;
        for py in min_y..=max_y {
            for px in min_x..=max_x {
                // Rotate the page pixel back into the unrotated text frame.
                let dx = f64::from(px) + 0.5 - cx;
                let dy = f64::from(py) + 0.5 - cy;
                let tx = dx * cos - dy * sin + w / 2.0;
                let ty = dx * sin + dy * cos + h / 2.0;
                if tx < 0.0 || tx >= w || ty < 0.0 || ty >= h {
                    continue;
                }
                let idx = (tx / cell) as usize;
                let Some(Some(glyph)) = glyphs.get(idx) else {
                    continue;
                };
                let col = ((tx % cell) / unit) as usize;
                let row = (ty / unit) as usize;
                if col < 8 && row < 8 && (glyph[row] >> col) & 1 == 1 {
                    self.put(px, py, color);
                }
            }
        }
    }

    fn embed_image(&mut self, src: &DynamicImage, x: f64, y: f64, w: f64, h: f64) {
        let resized = src
            .resize_exact(w.round() as u32, h.round() as u32, FilterType::Triangle)
            .to_rgba8();
        let x0 = x.round() as i32;
        let y0 = y.round() as i32;
        for (dx, dy, pixel) in resized.enumerate_pixels() {
            let [r, g, b, _] = pixel.0;
            self.put(x0 + dx as i32, y0 + dy as i32, Rgba([r, g, b, 255]));
        }
    }

    fn save(&self, path: &Path) -> Result<()> {
        ensure_parent_dir(path)?;
        DynamicImage::ImageRgba8(self.img.clone())
            .save(path)
            .with_context(|| format!("failed to save report page: {}", path.display()))?;
        Ok(())
    }
}

fn point_in_rounded_rect(px: f64, py: f64, x: f64, y: f64, w: f64, h: f64, r: f64) -> bool {
    if w <= 0.0 || h <= 0.0 {
        return false;
    }
    if px < x || px > x + w || py < y || py > y + h {
        return false;
    }
    let r = r.max(0.0).min(w / 2.0).min(h / 2.0);
    if r <= 0.0 {
        return true;
    }
    let corner = if px < x + r && py < y + r {
        Some((x + r, y + r))
    } else if px > x + w - r && py < y + r {
        Some((x + w - r, y + r))
    } else if px < x + r && py > y + h - r {
        Some((x + r, y + h - r))
    } else if px > x + w - r && py > y + h - r {
        Some((x + w - r, y + h - r))
    } else {
        None
    };
    match corner {
        Some((ccx, ccy)) => {
            let dx = px - ccx;
            let dy = py - ccy;
            dx * dx + dy * dy <= r * r
        }
        None => true,
    }
}

fn text_width(text: &str, scale: u32) -> f64 {
    (text.chars().count() as u32 * 8 * scale.max(1)) as f64
}

fn wrap_text(text: &str, max_width: f64, scale: u32) -> Vec<String> {
    let cell = (8 * scale.max(1)) as f64;
    let max_chars = ((max_width / cell).floor() as usize).max(1);
    let mut lines = Vec::new();
    for hard in text.split('\n') {
        let mut current = String::new();
        let mut current_len = 0usize;
        for word in hard.split_whitespace() {
            let mut word: Vec<char> = word.chars().collect();
            // Chunk words longer than a full line.
            while word.len() > max_chars {
                if current_len > 0 {
                    lines.push(std::mem::take(&mut current));
                    current_len = 0;
                }
                lines.push(word[..max_chars].iter().collect());
                word.drain(..max_chars);
            }
            let word: String = word.into_iter().collect();
            if word.is_empty() {
                continue;
            }
            let needed = if current_len == 0 {
                word.chars().count()
            } else {
                current_len + 1 + word.chars().count()
            };
            if needed > max_chars && current_len > 0 {
                lines.push(std::mem::take(&mut current));
                current_len = 0;
            }
            if current_len > 0 {
                current.push(' ');
                current_len += 1;
            }
            current_len += word.chars().count();
            current.push_str(&word);
        }
        lines.push(current);
    }
    lines
}

fn progress_fill_width(percent: u32, w: f64, h: f64) -> f64 {
    (f64::from(percent) / 100.0 * w).max(h).min(w)
}

fn gauge_segments(percent: u32) -> Vec<(f64, f64)> {
    let start = -PI / 2.0;
    let end = start + 2.0 * PI * f64::from(percent) / 100.0;
    let mut segments = Vec::new();
    let mut a = start;
    while a < end - 0.05 {
        segments.push((a, a + GAUGE_STEP));
        a += GAUGE_STEP;
    }
    segments
}

/* ── Layout engine ── */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EvidenceSlot {
    Image,
    Text,
    Empty,
}

impl EvidenceSlot {
    fn as_str(self) -> &'static str {
        match self {
            EvidenceSlot::Image => "image",
            EvidenceSlot::Text => "text",
            EvidenceSlot::Empty => "none",
        }
    }
}

#[derive(Debug, Clone)]
struct ReportMeta {
    report_id: String,
    verdict: String,
    verdict_class: VerdictClass,
    ai_pct: u32,
    human_pct: u32,
    conf_pct: u32,
    kind: ScanKind,
    evidence: EvidenceSlot,
    excerpt: Option<String>,
    narrative: String,
    recommendation: String,
    interpretation_y: f64,
    warnings: Vec<String>,
}

struct ReportDocument {
    page: Surface,
    meta: ReportMeta,
}

fn render_report(snapshot: &ReportSnapshot) -> Result<ReportDocument> {
    let mut page = Surface::page();
    let mut warnings = Vec::new();

    let report_id = snapshot.report_id();
    let class = VerdictClass::classify(&snapshot.verdict);
    let ai_pct = pct(snapshot.ai_score);
    let human_pct = pct(snapshot.human_score);
    let conf_pct = pct(snapshot.confidence);

    draw_background(&mut page);
    draw_header(&mut page, snapshot, &report_id);

    let mut cy = 120.0;
    cy = draw_verdict_card(&mut page, snapshot, class, conf_pct, cy);
    cy = draw_scan_badge(&mut page, snapshot, cy);
    cy = draw_score_panel(&mut page, ai_pct, human_pct, conf_pct, class.color(), cy);
    cy = draw_meta_grid(&mut page, snapshot, &report_id, cy);

    let (cy, evidence, excerpt) = draw_evidence(&mut page, snapshot, &mut warnings, cy);

    let narrative = interpret(snapshot);
    let interpretation_y = cy + 16.0;
    draw_interpretation(&mut page, &narrative, class.color(), interpretation_y);

    draw_footer(&mut page, &report_id);
    draw_watermark(&mut page);

    Ok(ReportDocument {
        page,
        meta: ReportMeta {
            report_id,
            verdict: snapshot.verdict.clone(),
            verdict_class: class,
            ai_pct,
            human_pct,
            conf_pct,
            kind: snapshot.kind,
            evidence,
            excerpt,
            narrative: narrative.narrative,
            recommendation: narrative.recommendation,
            interpretation_y,
            warnings,
        },
    })
}

fn draw_background(page: &mut Surface) {
    page.fill_rect(0.0, 0.0, f64::from(PAGE_W), f64::from(PAGE_H), palette::BG);
    page.grid(
        0.0,
        0.0,
        f64::from(PAGE_W),
        f64::from(PAGE_H),
        GRID_SPACING,
        palette::BG4,
    );
}

fn draw_header(page: &mut Surface, snapshot: &ReportSnapshot, report_id: &str) {
    let pw = f64::from(PAGE_W);
    page.fill_rect(0.0, 0.0, pw, 88.0, palette::BG2);
    // Pre-blended bands fading the header into the page.
    for (i, color) in palette::HEADER_BANDS.iter().enumerate() {
        page.fill_rect(0.0, 90.0 + i as f64 * 14.0, pw, 14.0, *color);
    }
    page.hline(0.0, pw, 88.0, 2.0, palette::CYAN);

    // Eye mark.
    let ex = MARGIN + 32.0;
    let ey = 44.0;
    page.stroke_ellipse(ex, ey, 24.0, 14.0, 2.0, palette::CYAN);
    page.fill_circle(ex, ey, 10.0, palette::CYAN_DEEP);
    page.stroke_circle(ex, ey, 10.0, 2.0, palette::CYAN);
    page.fill_circle(ex, ey, 5.0, palette::BG);
    page.fill_circle(ex - 2.8, ey - 2.4, 2.0, palette::WHITE);
    page.line(ex - 24.0, ey, ex + 24.0, ey, 1.0, palette::CYAN);

    let mark_x = ex + 36.0;
    page.draw_text(mark_x, ey - 10.0, "OMNI", palette::WHITE, 2, Align::Left);
    page.draw_text(
        mark_x + text_width("OMNI", 2),
        ey - 10.0,
        "DETECT",
        palette::CYAN,
        2,
        Align::Left,
    );
    page.draw_text(
        mark_x,
        ey + 10.0,
        "AI DETECTION SYSTEM",
        palette::DIM,
        1,
        Align::Left,
    );

    let right = pw - MARGIN;
    page.draw_text(
        right,
        20.0,
        "[ ANALYSIS REPORT ]",
        palette::CYAN_MID,
        1,
        Align::Right,
    );
    let generated = snapshot
        .captured_at
        .format("GENERATED: %Y-%m-%d %H:%M:%S UTC")
        .to_string();
    page.draw_text(right, 42.0, &generated, palette::DIM, 1, Align::Right);
    page.draw_text(
        right,
        62.0,
        &format!("ID: {report_id}"),
        palette::DIM,
        1,
        Align::Right,
    );
}

fn draw_verdict_card(
    page: &mut Surface,
    snapshot: &ReportSnapshot,
    class: VerdictClass,
    conf_pct: u32,
    cy: f64,
) -> f64 {
    page.panel(
        MARGIN,
        cy,
        CONTENT_W,
        128.0,
        12.0,
        Some(palette::BG3),
        Some(class.color()),
    );
    page.corner_bracket(MARGIN + 8.0, cy + 8.0, 16.0, palette::CYAN, false);
    page.corner_bracket(MARGIN + CONTENT_W - 8.0, cy + 8.0, 16.0, palette::CYAN, true);

    let center_x = MARGIN + CONTENT_W / 2.0;
    page.draw_text(
        center_x,
        cy + 24.0,
        "FINAL VERDICT",
        palette::DIM,
        1,
        Align::Center,
    );

    let verdict = snapshot.verdict.to_uppercase();
    let mut scale = 4u32;
    while scale > 2 && text_width(&verdict, scale) > CONTENT_W - 32.0 {
        scale -= 1;
    }
    let glyph_h = (8 * scale) as f64;
    page.draw_text(
        center_x,
        cy + 52.0 + (32.0 - glyph_h) / 2.0,
        &verdict,
        class.color(),
        scale,
        Align::Center,
    );
    page.draw_text(
        center_x,
        cy + 100.0,
        &format!("CONFIDENCE: {conf_pct}%"),
        palette::WHITE,
        1,
        Align::Center,
    );
    cy + 152.0
}

fn draw_scan_badge(page: &mut Surface, snapshot: &ReportSnapshot, cy: f64) -> f64 {
    page.dashed_hline(MARGIN, MARGIN + CONTENT_W, cy, palette::CYAN_DIM);
    let badge_y = cy + 24.0;
    let (fill, accent) = match snapshot.kind {
        ScanKind::Image => (palette::CYAN_TINT, palette::CYAN),
        ScanKind::Text => (palette::VIOLET_TINT, palette::VIOLET_BRIGHT),
    };
    page.panel(MARGIN, badge_y, 112.0, 28.0, 8.0, Some(fill), Some(accent));
    page.draw_text(
        MARGIN + 56.0,
        badge_y + 10.0,
        snapshot.kind.badge_label(),
        accent,
        1,
        Align::Center,
    );
    if let Some(name) = &snapshot.file_name {
        page.draw_text(
            MARGIN + 128.0,
            badge_y + 10.0,
            &format!("FILE: {name}"),
            palette::DIM,
            1,
            Align::Left,
        );
    }
    cy + 72.0
}

fn draw_score_panel(
    page: &mut Surface,
    ai_pct: u32,
    human_pct: u32,
    conf_pct: u32,
    verdict_color: Rgba<u8>,
    cy: f64,
) -> f64 {
    page.panel(
        MARGIN,
        cy,
        CONTENT_W,
        184.0,
        12.0,
        Some(palette::BG2),
        Some(palette::BG3),
    );
    page.draw_text(
        MARGIN + 24.0,
        cy + 16.0,
        "[ DETECTION SCORES ]",
        palette::CYAN,
        1,
        Align::Left,
    );
    page.hline(
        MARGIN + 24.0,
        MARGIN + CONTENT_W - 24.0,
        cy + 36.0,
        1.0,
        palette::BG4,
    );

    let bar_x = MARGIN + 24.0;
    let bar_w = CONTENT_W - 240.0;
    let bar_h = 20.0;
    let bar_y1 = cy + 64.0;
    let bar_y2 = cy + 120.0;
    let pct_x = MARGIN + CONTENT_W - 32.0;

    page.draw_text(
        bar_x,
        bar_y1 - 18.0,
        "AI GENERATED",
        palette::RED,
        1,
        Align::Left,
    );
    page.draw_text(
        pct_x,
        bar_y1,
        &format!("{ai_pct}%"),
        palette::WHITE,
        2,
        Align::Right,
    );
    page.progress_bar(
        bar_x,
        bar_y1,
        bar_w,
        bar_h,
        ai_pct,
        palette::RED,
        palette::RED_DIM,
    );

    page.draw_text(
        bar_x,
        bar_y2 - 18.0,
        "HUMAN CREATED",
        palette::GREEN,
        1,
        Align::Left,
    );
    page.draw_text(
        pct_x,
        bar_y2,
        &format!("{human_pct}%"),
        palette::WHITE,
        2,
        Align::Right,
    );
    page.progress_bar(
        bar_x,
        bar_y2,
        bar_w,
        bar_h,
        human_pct,
        palette::GREEN,
        palette::GREEN_DIM,
    );

    let gx = MARGIN + CONTENT_W - 88.0;
    let gy = cy + 112.0;
    page.radial_gauge(gx, gy, GAUGE_RADIUS, conf_pct, verdict_color);
    page.draw_text(
        gx,
        gy - 8.0,
        &format!("{conf_pct}%"),
        verdict_color,
        2,
        Align::Center,
    );
    page.draw_text(gx, gy + 12.0, "CONF.", palette::DIM, 1, Align::Center);

    cy + 208.0
}

fn draw_meta_grid(page: &mut Surface, snapshot: &ReportSnapshot, report_id: &str, cy: f64) -> f64 {
    let items = [
        ("MODEL USED", snapshot.model_used.clone()),
        ("SCAN TYPE", snapshot.kind.as_str().to_uppercase()),
        (
            "TIMESTAMP",
            snapshot.captured_at.format("%H:%M:%S").to_string(),
        ),
        ("REPORT ID", report_id.to_string()),
    ];
    let col_w = CONTENT_W / 4.0;
    for (i, (label, value)) in items.iter().enumerate() {
        let mx = MARGIN + i as f64 * col_w;
        page.panel(
            mx + 4.0,
            cy,
            col_w - 8.0,
            72.0,
            8.0,
            Some(palette::BG2),
            Some(palette::BG3),
        );
        let center = mx + col_w / 2.0;
        page.draw_text(center, cy + 16.0, label, palette::DIM, 1, Align::Center);
        // Overflow is truncated to the first wrapped line; a fixed page has
        // no scroll.
        let lines = wrap_text(value, col_w - 24.0, 1);
        if let Some(first) = lines.first() {
            page.draw_text(center, cy + 40.0, first, palette::CYAN, 1, Align::Center);
        }
    }
    cy + 96.0
}

fn draw_evidence(
    page: &mut Surface,
    snapshot: &ReportSnapshot,
    warnings: &mut Vec<String>,
    cy: f64,
) -> (f64, EvidenceSlot, Option<String>) {
    match snapshot.kind {
        ScanKind::Image => {
            let Some(path) = &snapshot.image_path else {
                return (cy, EvidenceSlot::Empty, None);
            };
            match image::open(path) {
                Ok(img) => {
                    draw_image_evidence(page, &img, cy);
                    (cy + IMAGE_PANEL_ADVANCE, EvidenceSlot::Image, None)
                }
                Err(err) => {
                    let message = format!("image embed skipped: {err}");
                    eprintln!("warning: {message}");
                    warnings.push(message);
                    (cy, EvidenceSlot::Empty, None)
                }
            }
        }
        ScanKind::Text => {
            let text = snapshot.input_text.as_deref().unwrap_or_default();
            if text.is_empty() {
                return (cy, EvidenceSlot::Empty, None);
            }
            let excerpt = excerpt_of(text);
            draw_text_evidence(page, &excerpt, cy);
            (cy + TEXT_PANEL_ADVANCE, EvidenceSlot::Text, Some(excerpt))
        }
    }
}

fn draw_image_evidence(page: &mut Surface, img: &DynamicImage, cy: f64) {
    let ix = MARGIN + CONTENT_W / 2.0 - IMAGE_EVIDENCE_W / 2.0;
    page.panel(
        ix - 8.0,
        cy,
        IMAGE_EVIDENCE_W + 16.0,
        IMAGE_EVIDENCE_H + 16.0,
        12.0,
        Some(palette::BG2),
        Some(palette::CYAN),
    );
    page.corner_bracket(ix - 8.0, cy, 20.0, palette::CYAN, false);
    page.corner_bracket(ix + IMAGE_EVIDENCE_W + 8.0, cy, 20.0, palette::CYAN, true);
    page.embed_image(img, ix, cy + 8.0, IMAGE_EVIDENCE_W, IMAGE_EVIDENCE_H);

    // Scan-line overlay in a pre-blended dim color.
    let mut sy = cy + 8.0;
    while sy < cy + 8.0 + IMAGE_EVIDENCE_H {
        page.fill_rect(ix, sy, IMAGE_EVIDENCE_W, 1.0, palette::CYAN_DIM);
        sy += 16.0;
    }

    page.draw_text(
        MARGIN + CONTENT_W / 2.0,
        cy + IMAGE_EVIDENCE_H + 28.0,
        "[ SCANNED IMAGE ]",
        palette::DIM,
        1,
        Align::Center,
    );
}

fn draw_text_evidence(page: &mut Surface, excerpt: &str, cy: f64) {
    page.panel(
        MARGIN,
        cy,
        CONTENT_W,
        TEXT_PANEL_H,
        12.0,
        Some(palette::BG2),
        Some(palette::BG3),
    );
    page.draw_text(
        MARGIN + 24.0,
        cy + 16.0,
        "[ ANALYZED TEXT EXCERPT ]",
        palette::CYAN,
        1,
        Align::Left,
    );
    page.hline(
        MARGIN + 24.0,
        MARGIN + CONTENT_W - 24.0,
        cy + 36.0,
        1.0,
        palette::BG3,
    );
    let lines = wrap_text(excerpt, CONTENT_W - 48.0, 1);
    for (i, line) in lines.iter().take(EXCERPT_MAX_LINES).enumerate() {
        page.draw_text(
            MARGIN + 24.0,
            cy + 48.0 + i as f64 * LINE_H,
            line,
            palette::DIM,
            1,
            Align::Left,
        );
    }
}

fn draw_interpretation(
    page: &mut Surface,
    narrative: &Narrative,
    verdict_color: Rgba<u8>,
    cy: f64,
) {
    page.panel(
        MARGIN,
        cy,
        CONTENT_W,
        160.0,
        12.0,
        Some(palette::BG2),
        Some(palette::BG3),
    );
    page.draw_text(
        MARGIN + 24.0,
        cy + 16.0,
        "[ ANALYSIS INTERPRETATION ]",
        palette::CYAN,
        1,
        Align::Left,
    );
    page.hline(
        MARGIN + 24.0,
        MARGIN + CONTENT_W - 24.0,
        cy + 36.0,
        1.0,
        palette::BG3,
    );
    let lines = wrap_text(&narrative.narrative, CONTENT_W - 56.0, 1);
    for (i, line) in lines.iter().take(NARRATIVE_MAX_LINES).enumerate() {
        page.draw_text(
            MARGIN + 24.0,
            cy + 48.0 + i as f64 * LINE_H,
            line,
            palette::WHITE,
            1,
            Align::Left,
        );
    }
    page.draw_text(
        MARGIN + 24.0,
        cy + 124.0,
        "> RECOMMENDATION:",
        verdict_color,
        1,
        Align::Left,
    );
    page.draw_text(
        MARGIN + 24.0,
        cy + 140.0,
        &narrative.recommendation,
        palette::WHITE,
        1,
        Align::Left,
    );
}

fn draw_footer(page: &mut Surface, report_id: &str) {
    let ph = f64::from(PAGE_H);
    let pw = f64::from(PAGE_W);
    page.hline(MARGIN, pw - MARGIN, ph - 72.0, 1.0, palette::CYAN_DIM);
    page.draw_text(
        MARGIN,
        ph - 48.0,
        "OMNIDETECT AI - POWERED BY SIGHTENGINE + HUGGINGFACE + GPT-3.5",
        palette::DIM,
        1,
        Align::Left,
    );
    page.draw_text(
        pw - MARGIN,
        ph - 48.0,
        &format!("PAGE 1 OF 1 - {report_id}"),
        palette::DIM,
        1,
        Align::Right,
    );
}

fn draw_watermark(page: &mut Surface) {
    page.draw_text_rotated(
        f64::from(PAGE_W) / 2.0,
        f64::from(PAGE_H) / 2.0 + 64.0,
        "OMNIDETECT",
        palette::BG4,
        12,
        45f64.to_radians(),
    );
}

fn excerpt_of(text: &str) -> String {
    let mut out: String = text.chars().take(EXCERPT_LIMIT).collect();
    if text.chars().count() > EXCERPT_LIMIT {
        out.push_str("...");
    }
    out
}

/* ── Narrative generator ── */

#[derive(Debug, Clone)]
struct Narrative {
    narrative: String,
    recommendation: String,
}

fn interpret(snapshot: &ReportSnapshot) -> Narrative {
    let ai = pct(snapshot.ai_score);
    let human = pct(snapshot.human_score);
    let conf = pct(snapshot.confidence);
    let is_image = snapshot.kind == ScanKind::Image;
    let noun = if is_image { "image" } else { "text" };

    match VerdictClass::classify(&snapshot.verdict) {
        VerdictClass::Ai => Narrative {
            narrative: format!(
                "OmniDetect determined with {conf}% confidence that this {noun} was \
                 AI-generated. AI score: {ai}%, Human score: {human}%. {}",
                if is_image {
                    "Irregular pixel patterns, unnatural textures and statistical artifacts \
                     were detected."
                } else {
                    "Uniform structure, low perplexity, and lack of stylistic variation are \
                     consistent with LLM output."
                }
            ),
            recommendation: "Treat as AI-generated. Verify with additional sources before \
                             publishing."
                .to_string(),
        },
        VerdictClass::Human => Narrative {
            narrative: format!(
                "OmniDetect determined with {conf}% confidence that this {noun} was \
                 human-created. Human score: {human}%, AI score: {ai}%. {}",
                if is_image {
                    "Organic noise distribution and authentic compression artifacts confirm \
                     human origin."
                } else {
                    "Idiomatic expressions, natural rhythm, and stylistic variation confirm \
                     human authorship."
                }
            ),
            recommendation: "Content appears authentic. Proceed with normal review process."
                .to_string(),
        },
        VerdictClass::Uncertain => Narrative {
            narrative: format!(
                "Inconclusive verdict (confidence: {conf}%). AI score {ai}% vs. human score \
                 {human}% are too close for a definitive call. May indicate hybrid creation \
                 or boundary-region content."
            ),
            recommendation: "Manual review recommended. Consider additional verification tools."
                .to_string(),
        },
    }
}

/* ── Export finalizer ── */

fn sanitize_file_stem(name: &str) -> String {
    // Strip one trailing extension, then map everything outside
    // [A-Za-z0-9_-] (dots included) to '_'. Mapping dots keeps the function
    // idempotent.
    let stem = match name.rfind('.') {
        Some(idx) if idx + 1 < name.len() => &name[..idx],
        _ => name,
    };
    let mut out = String::with_capacity(stem.len());
    for ch in stem.chars() {
        if ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-') {
            out.push(ch);
        } else {
            out.push('_');
        }
    }
    out
}

fn report_file_stem(snapshot: &ReportSnapshot) -> String {
    snapshot
        .file_name
        .as_deref()
        .map(sanitize_file_stem)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| format!("scan_{}", snapshot.kind.as_str()))
}

fn report_file_name(snapshot: &ReportSnapshot) -> String {
    format!(
        "OmniDetect_Report_{}_{}.png",
        report_file_stem(snapshot),
        snapshot.captured_at.format("%Y-%m-%d")
    )
}

fn export_report(
    doc: &ReportDocument,
    snapshot: &ReportSnapshot,
    out_path: &Path,
    sidecar: Option<&Path>,
) -> Result<Value> {
    // The page is written in a single save at the very end; a failed render
    // never leaves a partial file behind.
    doc.page.save(out_path)?;

    let payload = json!({
        "report_version": 1,
        "report_id": doc.meta.report_id,
        "generated_at": timestamp_iso(),
        "captured_at": snapshot.captured_at.to_rfc3339(),
        "verdict": doc.meta.verdict,
        "verdict_class": doc.meta.verdict_class.as_str(),
        "ai_pct": doc.meta.ai_pct,
        "human_pct": doc.meta.human_pct,
        "confidence_pct": doc.meta.conf_pct,
        "scan_type": doc.meta.kind.as_str(),
        "evidence": doc.meta.evidence.as_str(),
        "excerpt": doc.meta.excerpt.clone(),
        "narrative": doc.meta.narrative,
        "recommendation": doc.meta.recommendation,
        "layout": {
            "page_w": PAGE_W,
            "page_h": PAGE_H,
            "interpretation_y": doc.meta.interpretation_y,
        },
        "output_path": abs_path(out_path).display().to_string(),
        "warnings": doc.meta.warnings.clone(),
    });

    if let Some(sidecar_path) = sidecar {
        write_json_pretty(sidecar_path, &payload)?;
    }

    Ok(payload)
}

/* ── Shared helpers ── */

fn write_json_pretty(path: &Path, value: &Value) -> Result<()> {
    ensure_parent_dir(path)?;
    let raw = serde_json::to_string_pretty(value)?;
    fs::write(path, raw).with_context(|| format!("failed to write JSON: {}", path.display()))?;
    Ok(())
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create parent directory: {}", parent.display())
            })?;
        }
    }
    Ok(())
}

fn default_sidecar_for(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("report")
        .to_string();
    let parent = path.parent().unwrap_or_else(|| Path::new(""));
    parent.join(format!("{stem}.json"))
}

fn abs_path(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(path)
}

fn timestamp_iso() -> String {
    Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn fixed_instant() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 30, 45).unwrap()
    }

    fn text_result(verdict: &str, ai: f64, human: f64, conf: f64, input: &str) -> AnalysisResult {
        AnalysisResult {
            verdict: verdict.to_string(),
            ai_score: ai,
            human_score: human,
            confidence: conf,
            model_used: "gpt-3.5-detector".to_string(),
            kind: ScanKind::Text,
            file_name: None,
            input_text: Some(input.to_string()),
        }
    }

    fn image_result(verdict: &str, ai: f64, human: f64, conf: f64) -> AnalysisResult {
        AnalysisResult {
            verdict: verdict.to_string(),
            ai_score: ai,
            human_score: human,
            confidence: conf,
            model_used: "sightengine-genai".to_string(),
            kind: ScanKind::Image,
            file_name: Some("photo.png".to_string()),
            input_text: None,
        }
    }

    fn region_contains(
        surface: &Surface,
        xs: std::ops::Range<u32>,
        ys: std::ops::Range<u32>,
        color: Rgba<u8>,
    ) -> bool {
        for y in ys {
            for x in xs.clone() {
                if *surface.img.get_pixel(x, y) == color {
                    return true;
                }
            }
        }
        false
    }

    #[test]
    fn percentages_round_and_stay_in_range() {
        for score in [0.0, 0.005, 0.07, 0.49, 0.51, 0.88, 0.934, 1.0] {
            let p = pct(score);
            assert!(p <= 100);
            assert_eq!(p, (score * 100.0).round() as u32);
        }
        assert_eq!(pct(0.93), 93);
        assert_eq!(pct(0.005), 1);
    }

    #[test]
    fn progress_fill_width_bounds_and_monotonicity() {
        let w = 488.0;
        let h = 20.0;
        let mut previous = 0.0;
        for p in 1..=100 {
            let filled = progress_fill_width(p, w, h);
            assert!(filled >= h, "pill shorter than bar height at {p}%");
            assert!(filled <= w, "fill exceeds track at {p}%");
            assert!(filled >= previous, "fill not monotonic at {p}%");
            previous = filled;
        }
        assert_eq!(progress_fill_width(100, w, h), w);
    }

    #[test]
    fn gauge_segments_cover_expected_sweep() {
        assert!(gauge_segments(0).is_empty());

        let full = gauge_segments(100);
        assert!(!full.is_empty());
        assert!((full[0].0 - (-PI / 2.0)).abs() < 1e-9);
        let last_end = full.last().unwrap().1;
        assert!(last_end >= -PI / 2.0 + 2.0 * PI - GAUGE_STEP);

        let half = gauge_segments(50);
        let half_end = half.last().unwrap().1;
        assert!((half_end - PI / 2.0).abs() < 0.15);
    }

    #[test]
    fn verdict_classification_is_exclusive_and_case_insensitive() {
        assert_eq!(VerdictClass::classify("AI-Generated"), VerdictClass::Ai);
        assert_eq!(VerdictClass::classify("ai-generated"), VerdictClass::Ai);
        assert_eq!(VerdictClass::classify("Human-Created"), VerdictClass::Human);
        assert_eq!(
            VerdictClass::classify("likely human work"),
            VerdictClass::Human
        );
        assert_eq!(VerdictClass::classify("Uncertain"), VerdictClass::Uncertain);
        assert_eq!(VerdictClass::classify(""), VerdictClass::Uncertain);
        // Both substrings present: suspect content wins.
        assert_eq!(
            VerdictClass::classify("AI-assisted human draft"),
            VerdictClass::Ai
        );

        for verdict in ["AI", "Human", "Unknown", "AI vs Human", "paint"] {
            let class = VerdictClass::classify(verdict);
            let matches = [
                VerdictClass::Ai,
                VerdictClass::Human,
                VerdictClass::Uncertain,
            ]
            .iter()
            .filter(|c| **c == class)
            .count();
            assert_eq!(matches, 1);
        }
    }

    #[test]
    fn verdict_colors_follow_class() {
        assert_eq!(VerdictClass::Ai.color(), palette::RED);
        assert_eq!(VerdictClass::Human.color(), palette::GREEN);
        assert_eq!(VerdictClass::Uncertain.color(), palette::AMBER);
    }

    #[test]
    fn sanitize_file_stem_is_idempotent() {
        for name in [
            "my photo.final.png",
            "résumé.pdf",
            "already-clean",
            "weird name!.png",
            "dots.every.where",
            "trailing.",
        ] {
            let once = sanitize_file_stem(name);
            assert_eq!(sanitize_file_stem(&once), once, "not idempotent: {name}");
        }
    }

    #[test]
    fn sanitize_file_stem_strips_extension_and_bad_chars() {
        assert_eq!(sanitize_file_stem("my photo.final.png"), "my_photo_final");
        assert_eq!(sanitize_file_stem("report-1.jpeg"), "report-1");
        assert_eq!(sanitize_file_stem("clean_name"), "clean_name");
        assert_eq!(sanitize_file_stem(".png"), "");
    }

    #[test]
    fn report_file_name_uses_stem_and_capture_date() {
        let mut result = image_result("AI-Generated", 0.9, 0.1, 0.8);
        result.file_name = Some("weird name!.png".to_string());
        let snapshot = ReportSnapshot::capture_at(result, None, fixed_instant());
        assert_eq!(
            report_file_name(&snapshot),
            "OmniDetect_Report_weird_name__2024-06-01.png"
        );

        let mut result = text_result("Human-Created", 0.1, 0.9, 0.8, "hello");
        result.file_name = None;
        let snapshot = ReportSnapshot::capture_at(result, None, fixed_instant());
        assert_eq!(
            report_file_name(&snapshot),
            "OmniDetect_Report_scan_text_2024-06-01.png"
        );
    }

    #[test]
    fn base36_ids_are_deterministic() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "Z");
        assert_eq!(to_base36(36), "10");
        for value in [1u64, 1234, 1_700_000_000_000] {
            let encoded = to_base36(value);
            let decoded = u64::from_str_radix(&encoded.to_lowercase(), 36).unwrap();
            assert_eq!(decoded, value);
        }

        let a = ReportSnapshot::capture_at(
            text_result("AI", 0.9, 0.1, 0.8, "x"),
            None,
            fixed_instant(),
        );
        let b = ReportSnapshot::capture_at(
            text_result("Human", 0.1, 0.9, 0.8, "y"),
            None,
            fixed_instant(),
        );
        assert_eq!(a.report_id(), b.report_id());
        assert!(a.report_id().starts_with("RPT-"));
    }

    #[test]
    fn wrap_text_respects_width_and_hard_breaks() {
        let lines = wrap_text("the quick brown fox jumps over the lazy dog", 80.0, 1);
        let max_chars = 10;
        for line in &lines {
            assert!(line.chars().count() <= max_chars, "line too wide: {line}");
        }
        assert!(lines.len() >= 4);

        let hard = wrap_text("one\ntwo", 800.0, 1);
        assert_eq!(hard, vec!["one".to_string(), "two".to_string()]);

        let chunked = wrap_text("abcdefghijklmnop", 64.0, 1);
        assert_eq!(chunked[0], "abcdefgh");

        assert_eq!(wrap_text("", 80.0, 1), vec![String::new()]);
    }

    #[test]
    fn excerpt_truncates_at_limit() {
        let short = "a".repeat(EXCERPT_LIMIT);
        assert_eq!(excerpt_of(&short), short);

        let long = "b".repeat(EXCERPT_LIMIT + 100);
        let excerpt = excerpt_of(&long);
        assert_eq!(excerpt.chars().count(), EXCERPT_LIMIT + 3);
        assert!(excerpt.ends_with("..."));
    }

    #[test]
    fn panel_renders_both_fill_and_stroke() {
        let mut surface = Surface::new(100, 60);
        surface.panel(
            10.0,
            10.0,
            80.0,
            40.0,
            8.0,
            Some(palette::GREEN),
            Some(palette::RED),
        );
        assert_eq!(*surface.img.get_pixel(50, 30), palette::GREEN);
        assert_eq!(*surface.img.get_pixel(50, 11), palette::RED);
        assert_eq!(*surface.img.get_pixel(3, 3), palette::BG);
    }

    #[test]
    fn progress_bar_draws_minimum_pill_and_track() {
        let mut surface = Surface::new(120, 50);
        surface.progress_bar(0.0, 20.0, 100.0, 10.0, 1, palette::RED, palette::RED_DIM);
        assert_eq!(*surface.img.get_pixel(5, 25), palette::RED);
        assert_eq!(*surface.img.get_pixel(60, 25), palette::RED_DIM);

        let mut surface = Surface::new(120, 50);
        surface.progress_bar(0.0, 20.0, 100.0, 10.0, 0, palette::RED, palette::RED_DIM);
        assert!(!region_contains(&surface, 0..120, 0..50, palette::RED));
        assert_eq!(*surface.img.get_pixel(5, 25), palette::RED_DIM);
    }

    #[test]
    fn radial_gauge_track_only_at_zero_full_arc_at_hundred() {
        let mut surface = Surface::new(100, 100);
        surface.radial_gauge(50.0, 50.0, 30.0, 0, palette::RED);
        assert!(!region_contains(&surface, 0..100, 0..100, palette::RED));
        assert!(region_contains(&surface, 45..55, 15..25, palette::DIM_DARK));

        let mut surface = Surface::new(100, 100);
        surface.radial_gauge(50.0, 50.0, 30.0, 100, palette::RED);
        // Accent at the top (start), right, bottom and left of the circle.
        assert!(region_contains(&surface, 45..55, 14..26, palette::RED));
        assert!(region_contains(&surface, 74..86, 45..55, palette::RED));
        assert!(region_contains(&surface, 45..55, 74..86, palette::RED));
        assert!(region_contains(&surface, 14..26, 45..55, palette::RED));
    }

    #[test]
    fn analysis_result_applies_serde_defaults() {
        let result: AnalysisResult = serde_json::from_str(r#"{"type":"text"}"#).unwrap();
        assert_eq!(result.verdict, "Unknown");
        assert_eq!(result.ai_score, 0.0);
        assert_eq!(result.human_score, 0.0);
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.model_used, "unknown");
        assert!(result.file_name.is_none());
        assert!(result.input_text.is_none());

        assert!(serde_json::from_str::<AnalysisResult>(r#"{"verdict":"AI"}"#).is_err());
    }

    #[test]
    fn snapshot_drops_image_handle_for_text_scans() {
        let snapshot = ReportSnapshot::capture_at(
            text_result("AI", 0.9, 0.1, 0.8, "hello"),
            Some(PathBuf::from("ignored.png")),
            fixed_instant(),
        );
        assert!(snapshot.image_path.is_none());

        let snapshot = ReportSnapshot::capture_at(
            image_result("AI", 0.9, 0.1, 0.8),
            Some(PathBuf::from("kept.png")),
            fixed_instant(),
        );
        assert_eq!(snapshot.image_path, Some(PathBuf::from("kept.png")));
    }

    #[test]
    fn narrative_selects_six_distinct_templates() {
        let combos = [
            ("AI-Generated", ScanKind::Image),
            ("AI-Generated", ScanKind::Text),
            ("Human-Created", ScanKind::Image),
            ("Human-Created", ScanKind::Text),
            ("Uncertain", ScanKind::Image),
            ("Uncertain", ScanKind::Text),
        ];
        let mut narratives = Vec::new();
        for (verdict, kind) in combos {
            let mut result = text_result(verdict, 0.6, 0.4, 0.7, "sample");
            result.kind = kind;
            let snapshot = ReportSnapshot::capture_at(result, None, fixed_instant());
            let narrative = interpret(&snapshot);
            assert!(narrative.narrative.contains("70%"), "missing confidence");
            narratives.push(narrative.narrative);
        }
        // The inconclusive template ignores kind, so five distinct strings.
        let mut unique = narratives.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), 5);
        assert!(narratives[5].contains("Inconclusive"));
    }

    #[test]
    fn scenario_a_text_ai_verdict() {
        let input = "Lorem ipsum dolor sit amet consectetur adipi.";
        let snapshot = ReportSnapshot::capture_at(
            text_result("AI-Generated", 0.93, 0.07, 0.88, input),
            None,
            fixed_instant(),
        );
        let doc = render_report(&snapshot).unwrap();

        assert_eq!(doc.meta.verdict_class, VerdictClass::Ai);
        assert_eq!(doc.meta.ai_pct, 93);
        assert_eq!(doc.meta.human_pct, 7);
        assert_eq!(doc.meta.conf_pct, 88);
        assert_eq!(doc.meta.evidence, EvidenceSlot::Text);
        assert_eq!(doc.meta.excerpt.as_deref(), Some(input));
        assert!(doc.meta.narrative.contains("AI-generated"));
        assert!(doc.meta.narrative.contains("Uniform structure"));
        assert!(doc.meta.recommendation.starts_with("Treat as AI-generated"));
        assert!(doc.meta.warnings.is_empty());

        // Danger-colored verdict glyphs inside the verdict card.
        assert!(region_contains(&doc.page, 228..612, 170..206, palette::RED));
        // AI bar: red fill near the left, dim track past the 93% boundary.
        assert_eq!(*doc.page.img.get_pixel(100, 418), palette::RED);
        assert_eq!(*doc.page.img.get_pixel(550, 418), palette::RED_DIM);
        // Header bar and untouched page background.
        assert_eq!(*doc.page.img.get_pixel(2, 2), palette::BG2);
        assert_eq!(*doc.page.img.get_pixel(2, 1100), palette::BG);
    }

    #[test]
    fn scenario_b_long_text_is_truncated() {
        let input = "word ".repeat(100);
        let snapshot = ReportSnapshot::capture_at(
            text_result("AI-Generated", 0.93, 0.07, 0.88, &input),
            None,
            fixed_instant(),
        );
        let doc = render_report(&snapshot).unwrap();
        let excerpt = doc.meta.excerpt.unwrap();
        assert_eq!(excerpt.chars().count(), EXCERPT_LIMIT + 3);
        assert!(excerpt.ends_with("..."));
    }

    #[test]
    fn scenario_c_missing_image_skips_evidence_slot() {
        let snapshot = ReportSnapshot::capture_at(
            image_result("AI-Generated", 0.93, 0.07, 0.88),
            None,
            fixed_instant(),
        );
        let doc = render_report(&snapshot).unwrap();
        assert_eq!(doc.meta.evidence, EvidenceSlot::Empty);
        assert!(doc.meta.warnings.is_empty());

        let with_text = ReportSnapshot::capture_at(
            text_result("AI-Generated", 0.93, 0.07, 0.88, "short sample"),
            None,
            fixed_instant(),
        );
        let text_doc = render_report(&with_text).unwrap();
        assert_eq!(
            text_doc.meta.interpretation_y - doc.meta.interpretation_y,
            TEXT_PANEL_ADVANCE
        );
    }

    #[test]
    fn scenario_d_uncertain_verdict() {
        let snapshot = ReportSnapshot::capture_at(
            text_result("Uncertain", 0.51, 0.49, 0.40, "ambiguous sample"),
            None,
            fixed_instant(),
        );
        let doc = render_report(&snapshot).unwrap();
        assert_eq!(doc.meta.verdict_class, VerdictClass::Uncertain);
        assert!(doc.meta.narrative.contains("Inconclusive"));
        assert!(doc.meta.narrative.contains("51%"));
        assert!(doc.meta.narrative.contains("49%"));
        assert_eq!(
            doc.meta.recommendation,
            "Manual review recommended. Consider additional verification tools."
        );
    }

    #[test]
    fn unreadable_image_degrades_to_warning() {
        let snapshot = ReportSnapshot::capture_at(
            image_result("AI-Generated", 0.93, 0.07, 0.88),
            Some(PathBuf::from("/nonexistent/evidence.png")),
            fixed_instant(),
        );
        let doc = render_report(&snapshot).unwrap();
        assert_eq!(doc.meta.evidence, EvidenceSlot::Empty);
        assert_eq!(doc.meta.warnings.len(), 1);
        assert!(doc.meta.warnings[0].contains("image embed skipped"));
    }

    #[test]
    fn decodable_image_fills_evidence_slot() {
        let dir = tempdir().unwrap();
        let image_path = dir.path().join("evidence.png");
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(12, 9, Rgba([200, 40, 40, 255])))
            .save(&image_path)
            .unwrap();

        let snapshot = ReportSnapshot::capture_at(
            image_result("Human-Created", 0.07, 0.93, 0.95),
            Some(image_path),
            fixed_instant(),
        );
        let doc = render_report(&snapshot).unwrap();
        assert_eq!(doc.meta.evidence, EvidenceSlot::Image);
        assert!(doc.meta.warnings.is_empty());

        let without = ReportSnapshot::capture_at(
            image_result("Human-Created", 0.07, 0.93, 0.95),
            None,
            fixed_instant(),
        );
        let without_doc = render_report(&without).unwrap();
        assert_eq!(
            doc.meta.interpretation_y - without_doc.meta.interpretation_y,
            IMAGE_PANEL_ADVANCE
        );
    }

    #[test]
    fn export_writes_page_and_sidecar() {
        let dir = tempdir().unwrap();
        let snapshot = ReportSnapshot::capture_at(
            text_result("AI-Generated", 0.93, 0.07, 0.88, "sample"),
            None,
            fixed_instant(),
        );
        let doc = render_report(&snapshot).unwrap();

        let out_path = dir.path().join("reports").join(report_file_name(&snapshot));
        let sidecar = default_sidecar_for(&out_path);
        let payload = export_report(&doc, &snapshot, &out_path, Some(&sidecar)).unwrap();

        assert!(out_path.exists());
        assert!(sidecar.exists());
        assert_eq!(
            payload.get("report_id").and_then(Value::as_str),
            Some(doc.meta.report_id.as_str())
        );
        assert_eq!(
            payload.get("evidence").and_then(Value::as_str),
            Some("text")
        );

        let saved: Value = serde_json::from_str(&fs::read_to_string(&sidecar).unwrap()).unwrap();
        assert_eq!(saved.get("ai_pct").and_then(Value::as_u64), Some(93));
    }
}
