use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use once_cell::sync::Lazy;

/// Tried in order when `/` is requested.
pub const INDEX_PAGES: [&str; 6] = [
    "index.thtml",
    "index.html",
    "index.htm",
    "default.thtml",
    "default.html",
    "default.htm",
];

/// Files with this extension are rendered by the template engine.
pub const TEMPLATE_EXTENSION: &str = "thtml";

static MIME_TYPES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("txt", "text/plain"),
        ("htm", "text/html"),
        ("html", "text/html"),
        ("css", "text/css"),
        ("csv", "text/csv"),
        ("js", "application/javascript"),
        ("xml", "application/xml"),
        ("xhtml", "application/xhtml+xml"),
        ("json", "application/json"),
        ("zip", "application/zip"),
        ("pdf", "application/pdf"),
        ("jpg", "image/jpeg"),
        ("jpeg", "image/jpeg"),
        ("png", "image/png"),
        ("gif", "image/gif"),
        ("svg", "image/svg+xml"),
        ("ico", "image/x-icon"),
    ])
});

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
}

/// Content type for `path`, or `None` when the extension is not in the table.
pub fn mime_type(path: &Path) -> Option<&'static str> {
    extension(path).and_then(|ext| MIME_TYPES.get(ext.as_str()).copied())
}

pub fn is_template(path: &Path) -> bool {
    extension(path).as_deref() == Some(TEMPLATE_EXTENSION)
}

/// Maps request paths onto files below a root directory.
#[derive(Debug, Clone)]
pub struct StaticFiles {
    root: PathBuf,
}

impl StaticFiles {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    /// Joins `url_path` below the root; `..` and absolute components are
    /// refused.
    fn map_path(&self, url_path: &str) -> Option<PathBuf> {
        let mut path = self.root.clone();
        for comp in Path::new(url_path.trim_start_matches('/')).components() {
            match comp {
                Component::Normal(s) => path.push(s),
                Component::CurDir => {}
                _ => return None,
            }
        }
        Some(path)
    }

    /// The existing file a GET for `resource_path` should serve.
    pub fn resolve(&self, resource_path: &str) -> Option<PathBuf> {
        if resource_path == "/" {
            return INDEX_PAGES
                .iter()
                .map(|page| self.root.join(page))
                .find(|path| path.is_file());
        }

        self.map_path(resource_path).filter(|path| path.is_file())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_mime_lookup() {
        assert_eq!(mime_type(Path::new("www/INDEX.HTML")), Some("text/html"));
        assert_eq!(mime_type(Path::new("logo.png")), Some("image/png"));
        assert_eq!(mime_type(Path::new("firmware.bin")), None);
        assert_eq!(mime_type(Path::new("README")), None);
        assert!(is_template(Path::new("status.THTML")));
        assert!(!is_template(Path::new("status.html")));
    }

    #[test]
    fn test_index_pages_in_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("default.htm"), "d").unwrap();
        let files = StaticFiles::new(dir.path());
        assert_eq!(files.resolve("/"), Some(dir.path().join("default.htm")));

        fs::write(dir.path().join("index.html"), "i").unwrap();
        assert_eq!(files.resolve("/"), Some(dir.path().join("index.html")));

        fs::write(dir.path().join("index.thtml"), "t").unwrap();
        assert_eq!(files.resolve("/"), Some(dir.path().join("index.thtml")));
    }

    #[test]
    fn test_resolve_exact_files_only() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("css")).unwrap();
        fs::write(dir.path().join("css/site.css"), "body{}").unwrap();
        let files = StaticFiles::new(dir.path());

        assert_eq!(
            files.resolve("/css/site.css"),
            Some(dir.path().join("css/site.css"))
        );
        assert_eq!(files.resolve("/css"), None);
        assert_eq!(files.resolve("/missing.css"), None);
        assert_eq!(files.resolve("/"), None);
    }

    #[test]
    fn test_traversal_is_refused() {
        let files = StaticFiles::new("www");
        assert!(files.map_path("/../Cargo.toml").is_none());
        assert!(files.map_path("/css/../../secret").is_none());
        assert_eq!(files.map_path("/./a.txt"), Some(PathBuf::from("www/a.txt")));
    }
}
