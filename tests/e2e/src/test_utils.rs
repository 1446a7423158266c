use anyhow::{Context, Result};
use common::CaseRecord;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

/// Members of the test archive, in listing order
pub const ARCHIVE_MEMBERS: [(&str, &[u8]); 3] = [
    ("a.txt", b"alpha member\n"),
    ("b.xml", b"<b/>"),
    ("nested/c.xml", b"<c/>"),
];

pub struct TestFiles {
    pub plain: PathBuf,
    pub archive: PathBuf,
    pub compressed: PathBuf,
}

/// Write a plain case, a zip case and a pre-compressed case into `dir`
pub fn create_test_files(dir: &Path) -> Result<TestFiles> {
    let plain = dir.join("report.xml");
    fs::write(&plain, b"<network id=\"e2e\"/>\n")
        .with_context(|| format!("Failed to create test file: {:?}", plain))?;

    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, content) in ARCHIVE_MEMBERS {
        writer.start_file(name, zip::write::SimpleFileOptions::default())?;
        writer.write_all(content)?;
    }
    let archive = dir.join("bundle.zip");
    fs::write(&archive, writer.finish()?.into_inner())
        .with_context(|| format!("Failed to create test file: {:?}", archive))?;

    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(b"<network id=\"compressed\"/>\n")?;
    let compressed = dir.join("data.xml.gz");
    fs::write(&compressed, encoder.finish()?)
        .with_context(|| format!("Failed to create test file: {:?}", compressed))?;

    Ok(TestFiles {
        plain,
        archive,
        compressed,
    })
}

pub fn sha256_hex(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}

/// Runs the casectl binary against one storage/metadata configuration
pub struct Casectl {
    pub binary: PathBuf,
    pub envs: Vec<(String, String)>,
}

impl Casectl {
    pub fn run(&self, args: &[&str]) -> Result<Output> {
        Command::new(&self.binary)
            .args(args)
            .envs(self.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .output()
            .with_context(|| format!("Failed to run casectl binary: {:?}", self.binary))
    }

    /// Run a command that must succeed and return its stdout
    pub fn run_ok(&self, args: &[&str]) -> Result<Vec<u8>> {
        let output = self.run(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            anyhow::bail!(
                "casectl {:?} failed:\nSTDOUT: {}\nSTDERR: {}",
                args,
                stdout,
                stderr
            );
        }
        Ok(output.stdout)
    }

    pub fn run_text(&self, args: &[&str]) -> Result<String> {
        let stdout = self.run_ok(args)?;
        Ok(String::from_utf8(stdout)?.trim().to_string())
    }

    pub fn import(&self, file: &Path, extra: &[&str]) -> Result<CaseRecord> {
        let file = file.to_str().context("Test file path is not UTF-8")?;
        let mut args = vec!["import", file];
        args.extend_from_slice(extra);
        let stdout = self.run_ok(&args)?;
        serde_json::from_slice(&stdout).context("Failed to parse imported case record")
    }

    pub fn duplicate(&self, case_id: &str) -> Result<CaseRecord> {
        let stdout = self.run_ok(&["dup", case_id])?;
        serde_json::from_slice(&stdout).context("Failed to parse duplicated case record")
    }

    pub fn list(&self, case_id: &str, filter: Option<&str>) -> Result<Vec<String>> {
        let mut args = vec!["ls", case_id];
        if let Some(filter) = filter {
            args.extend_from_slice(&["--filter", filter]);
        }
        Ok(self
            .run_text(&args)?
            .lines()
            .map(str::to_string)
            .collect())
    }

    pub fn exists(&self, case_id: &str, member: Option<&str>) -> Result<bool> {
        let mut args = vec!["exists", case_id];
        args.extend(member);
        Ok(self.run_text(&args)? == "true")
    }
}
