use std::path::Path;

use anyhow::{Context, Result, bail};
use image::{DynamicImage, Rgb, RgbImage};

use crate::cli::ProcessArgs;
use crate::model::{Cell, DetectOutput, DetectedObject, ExtractedTable, RecognizeOutput};
use crate::util::write_json_pretty;

/// Which artifacts to write for each processed image.
#[derive(Debug, Clone, Copy)]
pub struct OutputFlags {
    pub objects: bool,
    pub cells: bool,
    pub html: bool,
    pub csv: bool,
    pub crops: bool,
    pub visualize: bool,
    pub crop_padding: i64,
}

impl OutputFlags {
    pub fn from_args(args: &ProcessArgs) -> Self {
        Self {
            objects: args.objects,
            cells: args.cells,
            html: args.html,
            csv: args.csv,
            crops: args.crops,
            visualize: args.visualize,
            crop_padding: args.crop_padding,
        }
    }
}

pub fn write_detect_outputs(
    out_dir: &Path,
    stem: &str,
    image: &DynamicImage,
    output: &DetectOutput,
    flags: OutputFlags,
) -> Result<()> {
    if flags.objects {
        write_json_pretty(&out_dir.join(format!("{stem}_objects.json")), &output.objects)?;
    }

    if flags.crops {
        for (index, object) in table_objects(&output.objects).enumerate() {
            let crop = crop_region(image, object.bbox, flags.crop_padding)?;
            save_jpeg(&crop, &out_dir.join(format!("{stem}_table_{index}.jpg")))?;
        }
    }

    if flags.visualize {
        let overlay = draw_objects(image, &output.objects);
        save_rgb_jpeg(&overlay, &out_dir.join(format!("{stem}_viz.jpg")))?;
    }

    Ok(())
}

pub fn write_recognize_outputs(
    out_dir: &Path,
    stem: &str,
    image: &DynamicImage,
    output: &RecognizeOutput,
    flags: OutputFlags,
) -> Result<()> {
    if flags.objects {
        write_json_pretty(&out_dir.join(format!("{stem}_objects.json")), &output.objects)?;
    }
    if flags.cells {
        write_json_pretty(&out_dir.join(format!("{stem}_cells.json")), &output.cells)?;
    }
    if flags.csv {
        write_cells_csv(&out_dir.join(format!("{stem}.csv")), &output.cells)?;
    }
    if flags.html {
        let html = cells_to_html(&output.cells);
        std::fs::write(out_dir.join(format!("{stem}.html")), html)
            .with_context(|| format!("failed to write {stem}.html"))?;
    }
    if flags.visualize {
        let overlay = draw_objects(image, &output.objects);
        save_rgb_jpeg(&overlay, &out_dir.join(format!("{stem}_viz.jpg")))?;
    }

    Ok(())
}

/// Writes one detected table's artifact set, all named `<stem>_<index>*`.
/// Structure coordinates are relative to the padded crop, so the overlay is
/// drawn on the crop rather than the page.
pub fn write_table_outputs(
    out_dir: &Path,
    stem: &str,
    index: usize,
    page_image: &DynamicImage,
    table: &ExtractedTable,
    flags: OutputFlags,
) -> Result<()> {
    let table_stem = format!("{stem}_{index}");
    let crop = crop_region(page_image, table.bbox, flags.crop_padding)?;

    if flags.crops {
        save_jpeg(&crop, &out_dir.join(format!("{table_stem}.jpg")))?;
    }
    if flags.objects {
        write_json_pretty(
            &out_dir.join(format!("{table_stem}_objects.json")),
            &table.objects,
        )?;
    }
    if flags.cells {
        write_json_pretty(&out_dir.join(format!("{table_stem}_cells.json")), &table.cells)?;
    }
    if flags.csv {
        write_cells_csv(&out_dir.join(format!("{table_stem}.csv")), &table.cells)?;
    }
    if flags.html {
        let html = cells_to_html(&table.cells);
        std::fs::write(out_dir.join(format!("{table_stem}.html")), html)
            .with_context(|| format!("failed to write {table_stem}.html"))?;
    }
    if flags.visualize {
        let overlay = draw_objects(&crop, &table.objects);
        save_rgb_jpeg(&overlay, &out_dir.join(format!("{table_stem}_viz.jpg")))?;
    }

    Ok(())
}

fn table_objects(objects: &[DetectedObject]) -> impl Iterator<Item = &DetectedObject> {
    objects
        .iter()
        .filter(|object| matches!(object.label.as_str(), "table" | "table rotated"))
}

/// Pivots cells onto a row-major grid. Spanning cells repeat their text into
/// every covered slot.
pub fn cells_to_grid(cells: &[Cell]) -> Vec<Vec<String>> {
    let row_count = cells
        .iter()
        .flat_map(|cell| cell.row_nums.iter())
        .max()
        .map(|max| max + 1)
        .unwrap_or(0);
    let column_count = cells
        .iter()
        .flat_map(|cell| cell.column_nums.iter())
        .max()
        .map(|max| max + 1)
        .unwrap_or(0);

    let mut grid = vec![vec![String::new(); column_count]; row_count];

    for cell in cells {
        for &row in &cell.row_nums {
            for &column in &cell.column_nums {
                grid[row][column] = cell.text.clone();
            }
        }
    }

    grid
}

pub fn write_cells_csv(path: &Path, cells: &[Cell]) -> Result<()> {
    let grid = cells_to_grid(cells);

    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create csv file: {}", path.display()))?;
    for row in &grid {
        writer
            .write_record(row)
            .with_context(|| format!("failed to write csv row: {}", path.display()))?;
    }
    writer
        .flush()
        .with_context(|| format!("failed to finalize csv file: {}", path.display()))?;

    Ok(())
}

/// Renders cells as an HTML table. Cells are emitted in reading order;
/// spanning cells carry rowspan/colspan, header cells become `<th>`.
pub fn cells_to_html(cells: &[Cell]) -> String {
    let mut sorted: Vec<&Cell> = cells.iter().collect();
    sorted.sort_by_key(|cell| {
        (
            cell.row_nums.iter().min().copied().unwrap_or(0),
            cell.column_nums.iter().min().copied().unwrap_or(0),
        )
    });

    let mut html = String::from("<table>");
    let mut current_row: Option<usize> = None;

    for cell in sorted {
        let row = cell.row_nums.iter().min().copied().unwrap_or(0);

        if current_row != Some(row) {
            if current_row.is_some() {
                html.push_str("</tr>");
            }
            html.push_str("<tr>");
            current_row = Some(row);
        }

        let tag = if cell.header { "th" } else { "td" };
        html.push('<');
        html.push_str(tag);
        if cell.row_nums.len() > 1 {
            html.push_str(&format!(" rowspan=\"{}\"", cell.row_nums.len()));
        }
        if cell.column_nums.len() > 1 {
            html.push_str(&format!(" colspan=\"{}\"", cell.column_nums.len()));
        }
        html.push('>');
        html.push_str(&escape_html(&cell.text));
        html.push_str(&format!("</{tag}>"));
    }

    if current_row.is_some() {
        html.push_str("</tr>");
    }
    html.push_str("</table>");
    html
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Crops a padded region, clamped to the image bounds.
pub fn crop_region(image: &DynamicImage, bbox: [f64; 4], padding: i64) -> Result<DynamicImage> {
    let width = image.width() as i64;
    let height = image.height() as i64;

    let left = (bbox[0].floor() as i64 - padding).clamp(0, width);
    let top = (bbox[1].floor() as i64 - padding).clamp(0, height);
    let right = (bbox[2].ceil() as i64 + padding).clamp(0, width);
    let bottom = (bbox[3].ceil() as i64 + padding).clamp(0, height);

    if right <= left || bottom <= top {
        bail!(
            "region [{}, {}, {}, {}] lies outside the {width}x{height} image",
            bbox[0],
            bbox[1],
            bbox[2],
            bbox[3]
        );
    }

    Ok(image.crop_imm(
        left as u32,
        top as u32,
        (right - left) as u32,
        (bottom - top) as u32,
    ))
}

/// Draws each object's bounding box outline over the image.
pub fn draw_objects(image: &DynamicImage, objects: &[DetectedObject]) -> RgbImage {
    let mut canvas = image.to_rgb8();

    for object in objects {
        draw_box_outline(&mut canvas, object.bbox, label_color(&object.label));
    }

    canvas
}

fn label_color(label: &str) -> Rgb<u8> {
    match label {
        "table" => Rgb([220, 30, 30]),
        "table rotated" => Rgb([230, 120, 0]),
        "table row" => Rgb([30, 90, 220]),
        "table column" => Rgb([30, 170, 170]),
        "table column header" => Rgb([170, 30, 170]),
        "table projected row header" => Rgb([120, 80, 30]),
        "table spanning cell" => Rgb([30, 160, 60]),
        _ => Rgb([110, 110, 110]),
    }
}

const OUTLINE_THICKNESS: i64 = 2;

fn draw_box_outline(canvas: &mut RgbImage, bbox: [f64; 4], color: Rgb<u8>) {
    let width = canvas.width() as i64;
    let height = canvas.height() as i64;

    let left = (bbox[0].floor() as i64).clamp(0, width - 1);
    let top = (bbox[1].floor() as i64).clamp(0, height - 1);
    let right = (bbox[2].ceil() as i64).clamp(0, width - 1);
    let bottom = (bbox[3].ceil() as i64).clamp(0, height - 1);

    if right <= left || bottom <= top {
        return;
    }

    for offset in 0..OUTLINE_THICKNESS {
        for x in left..=right {
            put_pixel_clamped(canvas, x, top + offset, color);
            put_pixel_clamped(canvas, x, bottom - offset, color);
        }
        for y in top..=bottom {
            put_pixel_clamped(canvas, left + offset, y, color);
            put_pixel_clamped(canvas, right - offset, y, color);
        }
    }
}

fn put_pixel_clamped(canvas: &mut RgbImage, x: i64, y: i64, color: Rgb<u8>) {
    if x >= 0 && y >= 0 && x < canvas.width() as i64 && y < canvas.height() as i64 {
        canvas.put_pixel(x as u32, y as u32, color);
    }
}

fn save_jpeg(image: &DynamicImage, path: &Path) -> Result<()> {
    save_rgb_jpeg(&image.to_rgb8(), path)
}

fn save_rgb_jpeg(image: &RgbImage, path: &Path) -> Result<()> {
    image
        .save(path)
        .with_context(|| format!("failed to write image: {}", path.display()))
}
