use crate::errors::CliError;
use camino::Utf8Path;
use miette::Result;
use ovl_diff::Document;
use regex::Regex;
use std::sync::OnceLock;

#[macro_export]
macro_rules! println_pad {
    ($($arg:tt)*) => {{
        let __s = format!($($arg)*);
        for __line in __s.lines() {
            println!("    {}", __line);
        }
    }};
}

fn slug_regex() -> Option<&'static Regex> {
    static SLUG: OnceLock<Option<Regex>> = OnceLock::new();
    SLUG.get_or_init(|| Regex::new(r"^[[:word:]-]+$").ok()).as_ref()
}

pub fn is_valid_slug(name: impl AsRef<str>) -> bool {
    slug_regex().is_some_and(|slug| slug.is_match(name.as_ref()))
}

pub fn validate_bundle_name(name: impl AsRef<str>) -> Result<()> {
    let name_str = name.as_ref();
    if !is_valid_slug(name_str) {
        return Err(CliError::invalid_bundle_name(name_str.to_string(), None).into());
    }

    Ok(())
}

/// Read and parse a JSON document from disk.
pub fn read_document(path: &Utf8Path) -> Result<Document> {
    if !path.as_std_path().is_file() {
        return Err(CliError::file_not_found(path.to_path_buf()).into());
    }

    let contents = std::fs::read_to_string(path.as_std_path())
        .map_err(|_| CliError::file_not_found(path.to_path_buf()))?;
    let document = serde_json::from_str(&contents).map_err(|source| CliError::InvalidDocument {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(document)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn validate_slug_valid() {
        assert!(is_valid_slug("better-swords"));
        assert!(is_valid_slug("fixes_2"));
        assert!(!is_valid_slug("better swords"));
        assert!(!is_valid_slug("fix!"));
        assert!(!is_valid_slug(""));
    }

    #[test]
    fn read_document_reports_missing_and_invalid_files() {
        let dir = tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap();

        assert!(read_document(&root.join("missing.json")).is_err());

        std::fs::write(root.join("bad.json"), "{ nope").unwrap();
        assert!(read_document(&root.join("bad.json")).is_err());

        std::fs::write(root.join("ok.json"), r#"{"b":1,"a":2}"#).unwrap();
        let doc = read_document(&root.join("ok.json")).unwrap();
        assert_eq!(doc, json!({ "b": 1, "a": 2 }));
    }
}
