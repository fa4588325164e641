use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unsafe path segment {0:?}")]
pub struct PathSegmentError(pub String);

/// Remote ids become file names; anything that could escape the export root
/// is refused.
fn segment(value: &str) -> Result<&str, PathSegmentError> {
    if value.is_empty()
        || value == "."
        || value == ".."
        || value.contains('/')
        || value.contains('\\')
        || value.contains('\0')
    {
        return Err(PathSegmentError(value.to_string()));
    }
    Ok(value)
}

/// File layout of one export, rooted at the export directory:
///
/// ```text
/// sites/{site}/site.json
/// sites/{site}/pages/{friendlyId}.json
/// sites/{site}/permissions/pages/{friendlyId}.json
/// sites/{site}/customcss/customcss.json
/// sites/{site}/files/files.json
/// sites/{site}/files/{filename}
/// sites/{site}/menu/{menuItemId}.json
/// sites/{site}/apidocs/{apiId}.json
/// sites/{site}/permissions/apis/{apiId}.json
/// ```
#[derive(Debug, Clone)]
pub struct ExportLayout {
    root: PathBuf,
}

impl ExportLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn site_dir(&self, site_id: &str) -> Result<PathBuf, PathSegmentError> {
        Ok(self.root.join("sites").join(segment(site_id)?))
    }

    pub fn site(&self, site_id: &str) -> Result<PathBuf, PathSegmentError> {
        Ok(self.site_dir(site_id)?.join("site.json"))
    }

    pub fn page(&self, site_id: &str, friendly_id: &str) -> Result<PathBuf, PathSegmentError> {
        Ok(self
            .site_dir(site_id)?
            .join("pages")
            .join(format!("{}.json", segment(friendly_id)?)))
    }

    pub fn page_permissions(
        &self,
        site_id: &str,
        friendly_id: &str,
    ) -> Result<PathBuf, PathSegmentError> {
        Ok(self
            .site_dir(site_id)?
            .join("permissions")
            .join("pages")
            .join(format!("{}.json", segment(friendly_id)?)))
    }

    pub fn custom_css(&self, site_id: &str) -> Result<PathBuf, PathSegmentError> {
        Ok(self.site_dir(site_id)?.join("customcss").join("customcss.json"))
    }

    pub fn file_listing(&self, site_id: &str) -> Result<PathBuf, PathSegmentError> {
        Ok(self.site_dir(site_id)?.join("files").join("files.json"))
    }

    pub fn file_asset(&self, site_id: &str, filename: &str) -> Result<PathBuf, PathSegmentError> {
        Ok(self.site_dir(site_id)?.join("files").join(segment(filename)?))
    }

    pub fn menu_item(&self, site_id: &str, menu_item_id: &str) -> Result<PathBuf, PathSegmentError> {
        Ok(self
            .site_dir(site_id)?
            .join("menu")
            .join(format!("{}.json", segment(menu_item_id)?)))
    }

    pub fn api_doc(&self, site_id: &str, api_id: &str) -> Result<PathBuf, PathSegmentError> {
        Ok(self
            .site_dir(site_id)?
            .join("apidocs")
            .join(format!("{}.json", segment(api_id)?)))
    }

    pub fn api_permissions(&self, site_id: &str, api_id: &str) -> Result<PathBuf, PathSegmentError> {
        Ok(self
            .site_dir(site_id)?
            .join("permissions")
            .join("apis")
            .join(format!("{}.json", segment(api_id)?)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_paths() {
        let layout = ExportLayout::new("/backup");
        assert_eq!(
            layout.page("abc123", "getting-started").unwrap(),
            PathBuf::from("/backup/sites/abc123/pages/getting-started.json")
        );
        assert_eq!(
            layout.page_permissions("abc123", "getting-started").unwrap(),
            PathBuf::from("/backup/sites/abc123/permissions/pages/getting-started.json")
        );
    }

    #[test]
    fn test_site_scoped_paths() {
        let layout = ExportLayout::new("out");
        assert_eq!(
            layout.site("s1").unwrap(),
            PathBuf::from("out/sites/s1/site.json")
        );
        assert_eq!(
            layout.custom_css("s1").unwrap(),
            PathBuf::from("out/sites/s1/customcss/customcss.json")
        );
        assert_eq!(
            layout.file_listing("s1").unwrap(),
            PathBuf::from("out/sites/s1/files/files.json")
        );
        assert_eq!(
            layout.file_asset("s1", "logo.png").unwrap(),
            PathBuf::from("out/sites/s1/files/logo.png")
        );
        assert_eq!(
            layout.menu_item("s1", "42").unwrap(),
            PathBuf::from("out/sites/s1/menu/42.json")
        );
        assert_eq!(
            layout.api_doc("s1", "petstore").unwrap(),
            PathBuf::from("out/sites/s1/apidocs/petstore.json")
        );
        assert_eq!(
            layout.api_permissions("s1", "petstore").unwrap(),
            PathBuf::from("out/sites/s1/permissions/apis/petstore.json")
        );
    }

    #[test]
    fn test_rejects_escaping_segments() {
        let layout = ExportLayout::new("out");
        for bad in ["", ".", "..", "../etc", "a/b", "a\\b"] {
            assert_eq!(
                layout.page("s1", bad).unwrap_err(),
                PathSegmentError(bad.to_string())
            );
        }
        assert!(layout.site("..").is_err());
        // Dots inside a name are fine
        assert!(layout.file_asset("s1", "theme.min.css").is_ok());
    }
}
