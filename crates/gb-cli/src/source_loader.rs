use std::fs;
use std::path::Path;

use gb_core::GamebookError;
use walkdir::WalkDir;

/// Finds `<name>.xml` anywhere under the book directory and returns its
/// markup. Section files may be nested in chapter subdirectories.
pub fn load_section_xml(book_dir: &Path, name: &str) -> Result<String, GamebookError> {
    let wanted = format!("{name}.xml");
    for entry in WalkDir::new(book_dir).into_iter().filter_map(Result::ok) {
        if !entry.file_type().is_file() {
            continue;
        }
        if entry.file_name().to_string_lossy() == wanted {
            return fs::read_to_string(entry.path()).map_err(|err| {
                GamebookError::new(
                    "CLI_SECTION_READ",
                    format!("cannot read {}: {}", entry.path().display(), err),
                )
            });
        }
    }
    Err(GamebookError::new(
        "CLI_SECTION_NOT_FOUND",
        format!(
            "no file named \"{}\" under {}",
            wanted,
            book_dir.display()
        ),
    ))
}
