//! Language detection from file extensions

use std::path::Path;

/// Map a file extension to a language id.
///
/// Unknown extensions map to `"plaintext"`.
pub fn language_from_extension(ext: &str) -> &'static str {
    match ext.to_lowercase().as_str() {
        "js" => "javascript",
        "ts" => "typescript",
        "jsx" => "javascript",
        "tsx" => "typescript",
        "py" => "python",
        "java" => "java",
        "c" => "c",
        "cpp" => "cpp",
        "cs" => "csharp",
        "go" => "go",
        "rs" => "rust",
        "php" => "php",
        "rb" => "ruby",
        "swift" => "swift",
        "kt" => "kotlin",
        "scala" => "scala",
        "sh" => "shell",
        "html" => "html",
        "css" => "css",
        "scss" => "scss",
        "json" => "json",
        "md" => "markdown",
        "yaml" | "yml" => "yaml",
        "xml" => "xml",
        "sql" => "sql",
        _ => "plaintext",
    }
}

/// Detect the language id for a file path.
pub fn language_from_path(path: &str) -> &'static str {
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(language_from_extension)
        .unwrap_or("plaintext")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_common_extensions() {
        assert_eq!(language_from_path("src/lib.rs"), "rust");
        assert_eq!(language_from_path("app/main.ts"), "typescript");
        assert_eq!(language_from_path("component.jsx"), "javascript");
        assert_eq!(language_from_path("script.py"), "python");
        assert_eq!(language_from_path("config.yml"), "yaml");
    }

    #[test]
    fn test_case_insensitive() {
        assert_eq!(language_from_extension("RS"), "rust");
        assert_eq!(language_from_extension("Py"), "python");
    }

    #[test]
    fn test_unknown_is_plaintext() {
        assert_eq!(language_from_path("notes.org"), "plaintext");
        assert_eq!(language_from_path("Makefile"), "plaintext");
        assert_eq!(language_from_path("noext"), "plaintext");
    }
}
