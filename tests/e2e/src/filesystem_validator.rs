use anyhow::{Context, Result};
use common::CaseRecord;
use std::fs;
use std::path::{Path, PathBuf};

/// Every file below `dir`, as `/`-separated paths relative to it
fn relative_files(dir: &Path) -> Result<Vec<String>> {
    let mut files = Vec::new();
    let mut pending: Vec<PathBuf> = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        for entry in fs::read_dir(&current).with_context(|| format!("Failed to read {:?}", current))? {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
            } else {
                let relative = path
                    .strip_prefix(dir)?
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join("/");
                files.push(relative);
            }
        }
    }
    files.sort();
    Ok(files)
}

/// Check that a case directory holds exactly the expected stored files
pub fn validate_case_layout(data_dir: &Path, record: &CaseRecord, expected: &[&str]) -> Result<()> {
    let case_dir = data_dir.join(record.id.to_string());
    if !case_dir.is_dir() {
        anyhow::bail!("Case directory does not exist: {:?}", case_dir);
    }
    println!("  ✓ Case directory exists: {:?}", case_dir);

    let files = relative_files(&case_dir)?;
    let mut expected: Vec<String> = expected.iter().map(|s| s.to_string()).collect();
    expected.sort();
    if files != expected {
        anyhow::bail!(
            "Unexpected layout for case {}: found {:?}, expected {:?}",
            record.id,
            files,
            expected
        );
    }

    for file in &files {
        let size = fs::metadata(case_dir.join(file))?.len();
        if size == 0 {
            anyhow::bail!("Stored file is empty: {}/{}", record.id, file);
        }
    }
    println!("  ✓ Stored files match: {:?}", files);
    Ok(())
}

/// Check the JSON record written for a case
pub fn validate_record_file(records_dir: &Path, record: &CaseRecord) -> Result<()> {
    let record_file = records_dir.join(format!("{}.json", record.id));
    let content = fs::read_to_string(&record_file)
        .with_context(|| format!("Failed to read case record {:?}", record_file))?;
    let stored: CaseRecord =
        serde_json::from_str(&content).context("Failed to parse case record JSON")?;

    if &stored != record {
        anyhow::bail!(
            "Case record on disk differs from the imported one:\n{:?}\n{:?}",
            stored,
            record
        );
    }
    println!("  ✓ Case record matches ({}, {})", stored.original_filename, stored.format);
    Ok(())
}

/// Check that nothing is left of a deleted case
pub fn validate_case_removed(data_dir: &Path, records_dir: Option<&Path>, case_id: &str) -> Result<()> {
    let case_dir = data_dir.join(case_id);
    if case_dir.exists() {
        anyhow::bail!("Case directory still exists after delete: {:?}", case_dir);
    }
    if let Some(records_dir) = records_dir {
        let record_file = records_dir.join(format!("{}.json", case_id));
        if record_file.exists() {
            anyhow::bail!("Case record still exists after delete: {:?}", record_file);
        }
    }
    println!("  ✓ Case {} fully removed", case_id);
    Ok(())
}

/// Number of case directories under the data root
pub fn count_cases(data_dir: &Path) -> Result<usize> {
    if !data_dir.exists() {
        return Ok(0);
    }
    let mut count = 0;
    for entry in fs::read_dir(data_dir)? {
        if entry?.file_type()?.is_dir() {
            count += 1;
        }
    }
    Ok(count)
}
