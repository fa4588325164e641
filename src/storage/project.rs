use std::env;
use std::path::PathBuf;

const PROJECT_MARKERS: &[&str] = &[".git", ".portalsync"];

pub fn find_project_root() -> Option<PathBuf> {
    let current = env::current_dir().ok()?;
    let mut dir = current.as_path();

    loop {
        for marker in PROJECT_MARKERS {
            if dir.join(marker).exists() {
                return Some(dir.to_path_buf());
            }
        }

        match dir.parent() {
            Some(parent) => dir = parent,
            None => return None,
        }
    }
}
