use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde_json::Value;
use tracing::{info, warn};

use crate::cli::SubsampleArgs;
use crate::util::{
    SPLITS, ensure_directory, file_name_str, file_stem_str, files_with_extension, progress_bar,
};

/// Annotation granularities present in the source dataset.
const CATEGORIES: [&str; 2] = ["cell", "table"];

/// Fixed seed so that repeated runs over identical inputs select identical
/// samples. The RNG is re-seeded for every annotation file.
const SAMPLE_SEED: u64 = 17;

pub fn run(args: SubsampleArgs) -> Result<()> {
    let annotation_files = discover_annotation_files(&args.data_dir)?;
    ensure_directory(&args.output_dir)?;

    for (&(category, split), ann_path) in &annotation_files {
        let requested = sample_count_for(&args, split);

        info!(
            path = %ann_path.display(),
            category,
            split,
            requested,
            "selecting samples"
        );

        let lines = read_jsonl_lines(ann_path)?;
        let selected = sample_lines(&lines, requested)
            .with_context(|| format!("failed to sample {}", ann_path.display()))?;

        let out_path = args.output_dir.join(file_name_str(ann_path)?);
        write_jsonl(&out_path, &selected)?;
        info!(path = %out_path.display(), samples = selected.len(), "wrote subsample");
    }

    let copied = copy_referenced_files(&args.data_dir, &args.output_dir)?;
    info!(copied, "subsample completed");

    Ok(())
}

fn sample_count_for(args: &SubsampleArgs, split: &str) -> usize {
    match split {
        "train" => args.num_train_samples,
        "val" => args.num_val_samples,
        _ => args.num_test_samples,
    }
}

/// Matches `*.jsonl` files whose stem names both a category and a split.
/// Two matches for one (category, split) pair is a configuration error.
fn discover_annotation_files(
    data_dir: &Path,
) -> Result<BTreeMap<(&'static str, &'static str), PathBuf>> {
    let candidates = files_with_extension(data_dir, "jsonl")?;
    let mut annotation_files: BTreeMap<(&'static str, &'static str), PathBuf> = BTreeMap::new();

    for category in CATEGORIES {
        for path in &candidates {
            let stem = file_stem_str(path)?;
            if !stem.contains(category) {
                continue;
            }

            for split in SPLITS {
                if !stem.contains(split) {
                    continue;
                }

                if let Some(existing) = annotation_files.get(&(category, split)) {
                    bail!(
                        "duplicate annotation file for {category}/{split}: {} and {}",
                        existing.display(),
                        path.display()
                    );
                }
                annotation_files.insert((category, split), path.clone());
            }
        }
    }

    for category in CATEGORIES {
        for split in SPLITS {
            if !annotation_files.contains_key(&(category, split)) {
                warn!(category, split, "no annotation file found");
            }
        }
    }

    for (&(category, split), path) in &annotation_files {
        info!(category, split, path = %path.display(), "discovered annotation file");
    }

    Ok(annotation_files)
}

/// Reads non-empty lines verbatim so the original record encoding survives
/// the round trip untouched.
fn read_jsonl_lines(path: &Path) -> Result<Vec<String>> {
    let raw =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;

    Ok(raw
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(ToOwned::to_owned)
        .collect())
}

/// Samples `amount` lines without replacement from a freshly seeded RNG,
/// in selection order.
fn sample_lines(lines: &[String], amount: usize) -> Result<Vec<String>> {
    if amount > lines.len() {
        bail!(
            "requested {amount} samples but only {} records available",
            lines.len()
        );
    }

    let mut rng = StdRng::seed_from_u64(SAMPLE_SEED);
    let indices = rand::seq::index::sample(&mut rng, lines.len(), amount);

    Ok(indices.iter().map(|index| lines[index].clone()).collect())
}

fn write_jsonl(path: &Path, lines: &[String]) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_directory(parent)?;
    }

    fs::write(path, lines.join("\n"))
        .with_context(|| format!("failed to write {}", path.display()))
}

/// Re-reads every subsampled annotation file and copies each referenced
/// source file into a mirrored `pdf/` tree under the output directory.
fn copy_referenced_files(data_dir: &Path, output_dir: &Path) -> Result<usize> {
    let mut copied = 0;

    for ann_path in files_with_extension(output_dir, "jsonl")? {
        info!(path = %ann_path.display(), "copying referenced source files");

        let lines = read_jsonl_lines(&ann_path)?;
        let progress = progress_bar(lines.len());

        for line in &lines {
            let sample: Value = serde_json::from_str(line)
                .with_context(|| format!("malformed sample record in {}", ann_path.display()))?;
            let filename = sample
                .get("filename")
                .and_then(Value::as_str)
                .with_context(|| {
                    format!("sample record missing filename in {}", ann_path.display())
                })?;

            let src_path = data_dir.join("pdf").join(filename);
            let dest_path = output_dir.join("pdf").join(filename);
            if let Some(parent) = dest_path.parent() {
                ensure_directory(parent)?;
            }

            fs::copy(&src_path, &dest_path).with_context(|| {
                format!(
                    "failed to copy {} to {}",
                    src_path.display(),
                    dest_path.display()
                )
            })?;
            copied += 1;
            progress.inc(1);
        }
        progress.finish_and_clear();
    }

    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_line(name: &str) -> String {
        format!(r#"{{"filename": "{name}", "split": "test"}}"#)
    }

    fn write_fixture(dir: &Path, file_name: &str, names: &[&str]) {
        let lines: Vec<String> = names.iter().map(|name| sample_line(name)).collect();
        fs::write(dir.join(file_name), lines.join("\n")).unwrap();
    }

    #[test]
    fn sampling_is_deterministic_across_runs() {
        let lines: Vec<String> = (0..50).map(|index| sample_line(&format!("{index}.pdf"))).collect();

        let first = sample_lines(&lines, 10).unwrap();
        let second = sample_lines(&lines, 10).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.len(), 10);
    }

    #[test]
    fn sampling_rejects_oversized_requests() {
        let lines = vec![sample_line("a.pdf"), sample_line("b.pdf")];

        let err = sample_lines(&lines, 3).unwrap_err().to_string();
        assert!(err.contains("only 2 records available"), "{err}");
    }

    #[test]
    fn sampling_preserves_line_encoding() {
        let lines = vec!["{\"filename\":\"z.pdf\",  \"extra\": [1,2 ,3]}".to_string()];

        let selected = sample_lines(&lines, 1).unwrap();
        assert_eq!(selected[0], lines[0]);
    }

    #[test]
    fn discovery_rejects_duplicate_category_split_pairs() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path(), "dataset_cell_train.jsonl", &["a.pdf"]);
        write_fixture(dir.path(), "other_cell_train.jsonl", &["b.pdf"]);

        let err = discover_annotation_files(dir.path())
            .unwrap_err()
            .to_string();
        assert!(err.contains("duplicate annotation file for cell/train"), "{err}");
    }

    #[test]
    fn discovery_maps_each_category_split_pair() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path(), "fin_cell_train.jsonl", &["a.pdf"]);
        write_fixture(dir.path(), "fin_cell_val.jsonl", &["b.pdf"]);
        write_fixture(dir.path(), "fin_table_test.jsonl", &["c.pdf"]);

        let files = discover_annotation_files(dir.path()).unwrap();

        assert_eq!(files.len(), 3);
        assert!(files.contains_key(&("cell", "train")));
        assert!(files.contains_key(&("cell", "val")));
        assert!(files.contains_key(&("table", "test")));
    }

    #[test]
    fn full_run_copies_exactly_the_referenced_files() {
        let data_dir = tempfile::tempdir().unwrap();
        let out_dir = tempfile::tempdir().unwrap();

        write_fixture(
            data_dir.path(),
            "fin_cell_test.jsonl",
            &["docs/a.pdf", "docs/b.pdf", "docs/c.pdf"],
        );
        let pdf_dir = data_dir.path().join("pdf").join("docs");
        fs::create_dir_all(&pdf_dir).unwrap();
        for name in ["a.pdf", "b.pdf", "c.pdf", "unreferenced.pdf"] {
            fs::write(pdf_dir.join(name), b"%PDF").unwrap();
        }

        run(SubsampleArgs {
            data_dir: data_dir.path().to_path_buf(),
            output_dir: out_dir.path().to_path_buf(),
            num_train_samples: 0,
            num_val_samples: 0,
            num_test_samples: 2,
        })
        .unwrap();

        let subsample = read_jsonl_lines(&out_dir.path().join("fin_cell_test.jsonl")).unwrap();
        assert_eq!(subsample.len(), 2);

        let copied_dir = out_dir.path().join("pdf").join("docs");
        let mut copied: Vec<String> = fs::read_dir(&copied_dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        copied.sort();

        let mut referenced: Vec<String> = subsample
            .iter()
            .map(|line| {
                let value: Value = serde_json::from_str(line).unwrap();
                Path::new(value["filename"].as_str().unwrap())
                    .file_name()
                    .unwrap()
                    .to_string_lossy()
                    .into_owned()
            })
            .collect();
        referenced.sort();
        referenced.dedup();

        assert_eq!(copied, referenced);
        assert!(!copied.contains(&"unreferenced.pdf".to_string()));
    }

    #[test]
    fn repeated_runs_write_identical_subsample_files() {
        let data_dir = tempfile::tempdir().unwrap();

        let names: Vec<String> = (0..40).map(|index| format!("docs/{index}.pdf")).collect();
        let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();
        write_fixture(data_dir.path(), "fin_table_val.jsonl", &name_refs);
        let pdf_dir = data_dir.path().join("pdf").join("docs");
        fs::create_dir_all(&pdf_dir).unwrap();
        for index in 0..40 {
            fs::write(pdf_dir.join(format!("{index}.pdf")), b"%PDF").unwrap();
        }

        let args = |out: &Path| SubsampleArgs {
            data_dir: data_dir.path().to_path_buf(),
            output_dir: out.to_path_buf(),
            num_train_samples: 0,
            num_val_samples: 5,
            num_test_samples: 0,
        };

        let out_one = tempfile::tempdir().unwrap();
        let out_two = tempfile::tempdir().unwrap();
        run(args(out_one.path())).unwrap();
        run(args(out_two.path())).unwrap();

        let first = fs::read(out_one.path().join("fin_table_val.jsonl")).unwrap();
        let second = fs::read(out_two.path().join("fin_table_val.jsonl")).unwrap();
        assert_eq!(first, second);
    }
}
