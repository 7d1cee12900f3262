use std::fs::File;
use std::io::Write;
use std::path::Path;
use walkdir::WalkDir;
use zip::{write::SimpleFileOptions, CompressionMethod, ZipWriter};
use log::info;

use crate::errors::{PackError, PackResult};

/// Zips a finished pack so `pack.mcmeta` sits at the archive root, which is
/// how the game expects a packed resource pack.
pub fn create_pack_archive(pack_dir: &Path, zip_path: &Path) -> PackResult<()> {
    let file = File::create(zip_path).map_err(|e| PackError::io(zip_path, e))?;
    let mut zip = ZipWriter::new(file);
    // OGG is already compressed; the JSON files are tiny.
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);

    let mut count = 0usize;
    for entry in WalkDir::new(pack_dir).sort_by_file_name() {
        let entry = entry.map_err(|e| PackError::io(pack_dir, e.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let Ok(relative) = path.strip_prefix(pack_dir) else {
            continue;
        };
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        zip.start_file(name, options).map_err(zip_error(zip_path))?;
        let contents = std::fs::read(path).map_err(|e| PackError::io(path, e))?;
        zip.write_all(&contents).map_err(|e| PackError::io(zip_path, e))?;
        count += 1;
    }

    zip.finish().map_err(zip_error(zip_path))?;
    info!("Archived {} file(s) from {} into {}", count, pack_dir.display(), zip_path.display());
    Ok(())
}

fn zip_error(zip_path: &Path) -> impl Fn(zip::result::ZipError) -> PackError + '_ {
    move |e| PackError::io(zip_path, std::io::Error::new(std::io::ErrorKind::Other, e))
}
