//! Module resolution against the organization's package directory.
//!
//! Packages live under `<packages_root>/<name>/` with a generated
//! `manifest.json` naming the entry file; `index.js` is the fallback.

use std::path::{Component, Path, PathBuf};

use serde_json::Value;

/// Resolves and loads module sources for one organization.
#[derive(Debug, Clone)]
pub struct ModuleResolver {
  root: PathBuf,
}

impl ModuleResolver {
  /// `root` is the organization-scoped package directory.
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  /// Load the source for a module specifier.
  ///
  /// `"pkg"` resolves through the package manifest (or `index.js`);
  /// `"pkg/file.js"` loads that file directly. Specifiers may not escape
  /// the package root.
  pub fn load(&self, spec: &str) -> Result<String, String> {
    if spec.is_empty() {
      return Err("empty module specifier".to_string());
    }
    let relative = Path::new(spec);
    if relative.is_absolute()
      || relative
        .components()
        .any(|c| matches!(c, Component::ParentDir))
    {
      return Err(format!("invalid module specifier '{}'", spec));
    }

    let target = self.root.join(relative);
    if target.is_file() {
      return std::fs::read_to_string(&target)
        .map_err(|e| format!("failed to read module '{}': {}", spec, e));
    }

    if target.is_dir() {
      let entry = self.entry_file(&target);
      return std::fs::read_to_string(&entry)
        .map_err(|e| format!("failed to read module '{}': {}", spec, e));
    }

    // Bare specifier without extension.
    let with_ext = self.root.join(format!("{}.js", spec));
    if with_ext.is_file() {
      return std::fs::read_to_string(&with_ext)
        .map_err(|e| format!("failed to read module '{}': {}", spec, e));
    }

    Err(format!("cannot find module '{}'", spec))
  }

  /// Entry file for a package directory: `manifest.json`'s `main`, or
  /// `index.js`.
  fn entry_file(&self, dir: &Path) -> PathBuf {
    let manifest = dir.join("manifest.json");
    if let Ok(content) = std::fs::read_to_string(&manifest) {
      if let Ok(value) = serde_json::from_str::<Value>(&content) {
        if let Some(main) = value.get("main").and_then(|m| m.as_str()) {
          return dir.join(main);
        }
      }
    }
    dir.join("index.js")
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn setup() -> (tempfile::TempDir, ModuleResolver) {
    let dir = tempfile::tempdir().unwrap();
    let resolver = ModuleResolver::new(dir.path());
    (dir, resolver)
  }

  #[test]
  fn loads_index_js_by_default() {
    let (dir, resolver) = setup();
    std::fs::create_dir_all(dir.path().join("mylib")).unwrap();
    std::fs::write(
      dir.path().join("mylib/index.js"),
      "module.exports = { hi: () => 42 };",
    )
    .unwrap();

    let source = resolver.load("mylib").unwrap();
    assert!(source.contains("hi"));
  }

  #[test]
  fn honors_manifest_main() {
    let (dir, resolver) = setup();
    std::fs::create_dir_all(dir.path().join("mylib")).unwrap();
    std::fs::write(
      dir.path().join("mylib/manifest.json"),
      r#"{"name":"mylib","version":"1.0.0","main":"entry.js"}"#,
    )
    .unwrap();
    std::fs::write(dir.path().join("mylib/entry.js"), "module.exports = 7;").unwrap();

    assert_eq!(resolver.load("mylib").unwrap(), "module.exports = 7;");
  }

  #[test]
  fn rejects_escaping_specifiers() {
    let (_dir, resolver) = setup();
    assert!(resolver.load("../etc/passwd").is_err());
    assert!(resolver.load("/etc/passwd").is_err());
  }

  #[test]
  fn missing_module_is_an_error() {
    let (_dir, resolver) = setup();
    let err = resolver.load("ghost").unwrap_err();
    assert!(err.contains("cannot find module"));
  }
}
