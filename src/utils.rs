use indicatif::{ProgressBar, ProgressStyle};
use serde::de::DeserializeOwned;
use std::fs;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

/// Read and parse a JSON file from a buffered stream instead of loading it
/// into memory first
pub fn read_json<T: DeserializeOwned>(path: &Path) -> io::Result<T> {
    let file = fs::File::open(path).map_err(|e| {
        io::Error::new(
            e.kind(),
            format!("Failed to open JSON file ({}): {}", path.display(), e),
        )
    })?;

    serde_json::from_reader(BufReader::new(file)).map_err(|e| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Failed to parse JSON ({}): {}", path.display(), e),
        )
    })
}

/// Create a progress bar with the given length and label
pub fn create_progress_bar(len: u64, label: &str) -> ProgressBar {
    let pb = ProgressBar::new(len);
    let style = ProgressStyle::with_template(&format!(
        "{{spinner:.green}} [{}] [{{elapsed_precise}}] [{{bar:40.cyan/blue}}] {{pos}}/{{len}} ({{eta}})",
        label
    ))
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("#>-");
    pb.set_style(style);
    pb
}

/// Create the output directory if needed and return its path.
///
/// Existing contents are kept; files with the same name are overwritten.
pub fn create_output_directory(path: &Path) -> io::Result<PathBuf> {
    if path.exists() {
        log::warn!(
            "Directory {:?} already exists. Files in it may be overwritten.",
            path
        );
    }
    fs::create_dir_all(path)?;
    Ok(path.to_path_buf())
}

/// Build a rayon pool with `workers` threads, 0 meaning rayon's default
pub fn create_thread_pool(workers: usize) -> Result<rayon::ThreadPool, rayon::ThreadPoolBuildError> {
    rayon::ThreadPoolBuilder::new().num_threads(workers).build()
}
