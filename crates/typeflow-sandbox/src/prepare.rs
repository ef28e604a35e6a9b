//! Source preparation: import rewriting and wrapping.
//!
//! Import statements are rewritten in place into `require(...)` calls so
//! that module resolution happens at run time against the organization's
//! package directory. Rewrites never change the line count, so runtime
//! positions map back to the original source by subtracting the wrapper
//! prefix alone.

use std::sync::OnceLock;

use regex::Regex;

/// A wrapped script plus the number of prefix lines added by the wrapper.
#[derive(Debug, Clone)]
pub struct PreparedScript {
  pub source: String,
  pub line_offset: usize,
}

fn regexes() -> &'static [(Regex, ImportShape)] {
  static RULES: OnceLock<Vec<(Regex, ImportShape)>> = OnceLock::new();
  RULES.get_or_init(|| {
    vec![
      (
        Regex::new(r#"^\s*import\s+\*\s+as\s+([A-Za-z_$][\w$]*)\s+from\s+['"]([^'"]+)['"];?\s*$"#)
          .unwrap(),
        ImportShape::Namespace,
      ),
      (
        Regex::new(
          r#"^\s*import\s+([A-Za-z_$][\w$]*)\s*,\s*\{([^}]*)\}\s+from\s+['"]([^'"]+)['"];?\s*$"#,
        )
        .unwrap(),
        ImportShape::DefaultAndNamed,
      ),
      (
        Regex::new(r#"^\s*import\s+\{([^}]*)\}\s+from\s+['"]([^'"]+)['"];?\s*$"#).unwrap(),
        ImportShape::Named,
      ),
      (
        Regex::new(r#"^\s*import\s+([A-Za-z_$][\w$]*)\s+from\s+['"]([^'"]+)['"];?\s*$"#).unwrap(),
        ImportShape::Default,
      ),
      (
        Regex::new(r#"^\s*import\s+['"]([^'"]+)['"];?\s*$"#).unwrap(),
        ImportShape::SideEffect,
      ),
    ]
  })
}

#[derive(Debug, Clone, Copy)]
enum ImportShape {
  Namespace,
  DefaultAndNamed,
  Named,
  Default,
  SideEffect,
}

/// `{ a, b as c }` specifier list into a destructuring pattern.
fn named_bindings(list: &str) -> String {
  list
    .split(',')
    .map(|spec| {
      let spec = spec.trim();
      match spec.split_once(" as ") {
        Some((name, alias)) => format!("{}: {}", name.trim(), alias.trim()),
        None => spec.to_string(),
      }
    })
    .collect::<Vec<_>>()
    .join(", ")
}

/// Rewrite one line if it is an import statement.
fn rewrite_line(line: &str) -> Option<String> {
  for (regex, shape) in regexes() {
    if let Some(caps) = regex.captures(line) {
      return Some(match shape {
        ImportShape::Namespace => {
          format!("const {} = require(\"{}\");", &caps[1], &caps[2])
        }
        ImportShape::DefaultAndNamed => format!(
          "const {} = __defaultOf(require(\"{}\")); const {{ {} }} = require(\"{}\");",
          &caps[1],
          &caps[3],
          named_bindings(&caps[2]),
          &caps[3]
        ),
        ImportShape::Named => format!(
          "const {{ {} }} = require(\"{}\");",
          named_bindings(&caps[1]),
          &caps[2]
        ),
        ImportShape::Default => {
          format!("const {} = __defaultOf(require(\"{}\"));", &caps[1], &caps[2])
        }
        ImportShape::SideEffect => format!("require(\"{}\");", &caps[1]),
      });
    }
  }
  None
}

/// Rewrite all import statements in place, preserving line count.
pub fn rewrite_imports(source: &str) -> String {
  source
    .lines()
    .map(|line| rewrite_line(line).unwrap_or_else(|| line.to_string()))
    .collect::<Vec<_>>()
    .join("\n")
}

/// Wrap a code-node body for execution.
///
/// The inner async function legalizes top-level `return` and `await`; the
/// outer one serializes the result, with a NUL-prefixed sentinel for
/// `undefined` (which means pass-through for code nodes).
pub fn wrap_for_run(source: &str) -> PreparedScript {
  let rewritten = rewrite_imports(source);
  let prefix = "(async () => {\n  const __r = await (async () => {\n";
  let suffix = "\n  })();\n  const __s = JSON.stringify(__r);\n  return __s === undefined ? \"\\u0000undefined\" : __s;\n})()";
  let line_offset = prefix.matches('\n').count();
  PreparedScript {
    source: format!("{}{}{}", prefix, rewritten, suffix),
    line_offset,
  }
}

/// Wrap a code-node body for the static check: the function expression is
/// compiled but never invoked.
pub fn wrap_for_check(source: &str) -> PreparedScript {
  let rewritten = rewrite_imports(source);
  PreparedScript {
    source: format!("void (async function () {{\n{}\n}});", rewritten),
    line_offset: 1,
  }
}

/// Wrap a utilities-node body as a CommonJS-style module factory that
/// publishes its exports under the given global binding.
pub fn wrap_utility(source: &str, binding: &str) -> PreparedScript {
  let rewritten = rewrite_imports(source);
  let prefix = "(async () => {\n  const module = { exports: {} };\n  const exports = module.exports;\n  await (async () => {\n";
  let suffix = format!(
    "\n  }})();\n  globalThis[\"{}\"] = module.exports;\n  return \"ok\";\n}})()",
    binding
  );
  let line_offset = prefix.matches('\n').count();
  PreparedScript {
    source: format!("{}{}{}", prefix, rewritten, suffix),
    line_offset,
  }
}
