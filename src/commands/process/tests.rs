use std::fs::{self, File};
use std::path::{Path, PathBuf};

use anyhow::Result;
use image::{Rgb, RgbImage};

use crate::cli::{ProcessArgs, ProcessMode, TokenSource};
use crate::model::{
    Cell, DetectOutput, DetectedObject, ExtractOutput, ExtractedTable, RecognizeOutput, Token,
};
use crate::pipeline::TablePipeline;

use super::outputs::{cells_to_grid, cells_to_html};
use super::run::process_image;

struct StubPipeline {
    objects: Vec<DetectedObject>,
    cells: Vec<Cell>,
    table_count: usize,
}

impl StubPipeline {
    fn new(table_count: usize) -> Self {
        Self {
            objects: vec![DetectedObject {
                label: "table".to_string(),
                score: 0.98,
                bbox: [8.0, 8.0, 52.0, 38.0],
            }],
            cells: sample_cells(),
            table_count,
        }
    }
}

impl TablePipeline for StubPipeline {
    fn detect(&self, _image_path: &Path, _tokens: &[Token]) -> Result<DetectOutput> {
        Ok(DetectOutput {
            objects: self.objects.clone(),
        })
    }

    fn recognize(&self, _image_path: &Path, _tokens: &[Token]) -> Result<RecognizeOutput> {
        Ok(RecognizeOutput {
            objects: self.objects.clone(),
            cells: self.cells.clone(),
        })
    }

    fn extract(
        &self,
        _image_path: &Path,
        _tokens: &[Token],
        _crop_padding: i64,
    ) -> Result<ExtractOutput> {
        let tables = (0..self.table_count)
            .map(|_| ExtractedTable {
                bbox: [8.0, 8.0, 52.0, 38.0],
                objects: self.objects.clone(),
                cells: self.cells.clone(),
            })
            .collect();
        Ok(ExtractOutput { tables })
    }
}

fn sample_cells() -> Vec<Cell> {
    vec![
        Cell {
            bbox: [0.0, 0.0, 20.0, 10.0],
            row_nums: vec![0],
            column_nums: vec![0, 1],
            header: true,
            text: "Header".to_string(),
        },
        Cell {
            bbox: [0.0, 10.0, 10.0, 20.0],
            row_nums: vec![1],
            column_nums: vec![0],
            header: false,
            text: "a < b".to_string(),
        },
        Cell {
            bbox: [10.0, 10.0, 20.0, 20.0],
            row_nums: vec![1],
            column_nums: vec![1],
            header: false,
            text: "c".to_string(),
        },
    ]
}

fn write_test_image(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    RgbImage::from_pixel(64, 48, Rgb([250, 250, 250]))
        .save(&path)
        .unwrap();
    path
}

fn test_args(image_dir: &Path, out_dir: &Path, mode: ProcessMode) -> ProcessArgs {
    ProcessArgs {
        image_dir: image_dir.to_path_buf(),
        out_dir: out_dir.to_path_buf(),
        mode,
        tokens: TokenSource::None,
        table_words_dir: None,
        ocr_words_dir: None,
        tesseract_cmd: None,
        ocr_lang: "eng".to_string(),
        pipeline_cmd: PathBuf::from("unused"),
        detection_config_path: None,
        detection_model_path: None,
        structure_config_path: None,
        structure_model_path: None,
        detection_device: "cpu".to_string(),
        structure_device: "cpu".to_string(),
        objects: true,
        cells: true,
        html: true,
        csv: true,
        crops: true,
        visualize: true,
        crop_padding: 10,
    }
}

fn archive_entries(zip_path: &Path) -> Vec<String> {
    let mut archive = zip::ZipArchive::new(File::open(zip_path).unwrap()).unwrap();
    let mut names: Vec<String> = (0..archive.len())
        .map(|index| archive.by_index(index).unwrap().name().to_string())
        .collect();
    names.sort();
    names
}

fn output_file_names(out_dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(out_dir)
        .unwrap()
        .map(|entry| entry.unwrap())
        .filter(|entry| entry.file_type().unwrap().is_file())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn archive_contains_exactly_the_stem_outputs_under_prefix() {
    let image_dir = tempfile::tempdir().unwrap();
    let out_dir = tempfile::tempdir().unwrap();
    let image_path = write_test_image(image_dir.path(), "page_one.jpg");

    fs::write(out_dir.path().join("unrelated.txt"), b"keep").unwrap();

    let args = test_args(image_dir.path(), out_dir.path(), ProcessMode::Recognize);
    let zip_path = process_image(&StubPipeline::new(0), &args, &image_path).unwrap();

    assert_eq!(
        zip_path,
        out_dir.path().join("zips").join("download_page_one.zip")
    );

    let entries = archive_entries(&zip_path);
    let expected: Vec<String> = [
        "page_one.csv",
        "page_one.html",
        "page_one_cells.json",
        "page_one_objects.json",
        "page_one_viz.jpg",
    ]
    .iter()
    .map(|name| format!("download_page_one/{name}"))
    .collect();

    assert_eq!(entries, expected);
    assert!(out_dir.path().join("unrelated.txt").exists());
}

#[test]
fn stale_outputs_are_removed_and_never_leak_into_the_archive() {
    let image_dir = tempfile::tempdir().unwrap();
    let out_dir = tempfile::tempdir().unwrap();
    let image_path = write_test_image(image_dir.path(), "report.jpg");

    fs::write(out_dir.path().join("report_leftover.json"), b"stale").unwrap();

    let args = test_args(image_dir.path(), out_dir.path(), ProcessMode::Detect);
    let zip_path = process_image(&StubPipeline::new(0), &args, &image_path).unwrap();

    assert!(!out_dir.path().join("report_leftover.json").exists());
    for entry in archive_entries(&zip_path) {
        assert!(!entry.contains("leftover"), "{entry}");
    }
}

#[test]
fn processing_twice_yields_identical_output_state() {
    let image_dir = tempfile::tempdir().unwrap();
    let out_dir = tempfile::tempdir().unwrap();
    let image_path = write_test_image(image_dir.path(), "invoice.jpg");

    let args = test_args(image_dir.path(), out_dir.path(), ProcessMode::Extract);
    let pipeline = StubPipeline::new(2);

    let first_zip = process_image(&pipeline, &args, &image_path).unwrap();
    let first_files = output_file_names(out_dir.path());
    let first_entries = archive_entries(&first_zip);

    let second_zip = process_image(&pipeline, &args, &image_path).unwrap();
    let second_files = output_file_names(out_dir.path());
    let second_entries = archive_entries(&second_zip);

    assert_eq!(first_zip, second_zip);
    assert_eq!(first_files, second_files);
    assert_eq!(first_entries, second_entries);
}

#[test]
fn extract_mode_writes_one_numbered_set_per_table() {
    let image_dir = tempfile::tempdir().unwrap();
    let out_dir = tempfile::tempdir().unwrap();
    let image_path = write_test_image(image_dir.path(), "page.jpg");

    let args = test_args(image_dir.path(), out_dir.path(), ProcessMode::Extract);
    process_image(&StubPipeline::new(2), &args, &image_path).unwrap();

    for index in 0..2 {
        for suffix in ["_objects.json", "_cells.json", ".csv", ".html", "_viz.jpg", ".jpg"] {
            let name = format!("page_{index}{suffix}");
            assert!(out_dir.path().join(&name).exists(), "missing {name}");
        }
    }
}

#[test]
fn detect_mode_writes_crops_for_table_objects() {
    let image_dir = tempfile::tempdir().unwrap();
    let out_dir = tempfile::tempdir().unwrap();
    let image_path = write_test_image(image_dir.path(), "scan.jpg");

    let args = test_args(image_dir.path(), out_dir.path(), ProcessMode::Detect);
    process_image(&StubPipeline::new(0), &args, &image_path).unwrap();

    assert!(out_dir.path().join("scan_objects.json").exists());
    assert!(out_dir.path().join("scan_table_0.jpg").exists());
    assert!(out_dir.path().join("scan_viz.jpg").exists());
}

#[test]
fn cells_pivot_onto_a_grid_with_spans_repeated() {
    let grid = cells_to_grid(&sample_cells());

    assert_eq!(
        grid,
        vec![
            vec!["Header".to_string(), "Header".to_string()],
            vec!["a < b".to_string(), "c".to_string()],
        ]
    );
}

#[test]
fn cells_render_as_html_with_spans_and_escaping() {
    let html = cells_to_html(&sample_cells());

    assert_eq!(
        html,
        "<table><tr><th colspan=\"2\">Header</th></tr>\
         <tr><td>a &lt; b</td><td>c</td></tr></table>"
    );
}

#[test]
fn empty_cell_list_renders_an_empty_table() {
    assert_eq!(cells_to_html(&[]), "<table></table>");
    assert!(cells_to_grid(&[]).is_empty());
}
