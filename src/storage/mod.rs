mod io;
mod layout;
mod project;

pub use io::write_atomic;
pub use layout::{ExportLayout, PathSegmentError};
pub use project::find_project_root;
