use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::CompileError;

/// One loaded compilation unit: a canonical path and its normalized text.
#[derive(Debug, Clone)]
pub struct Unit {
    pub path: PathBuf,
    pub text: String,
}

/// Loads an entry file and its transitive `import "..."` graph, in
/// dependency post-order, with cycle-proof-by-construction deduplication
/// (§4.1).
pub struct Resolver {
    tab_width: usize,
}

impl Resolver {
    pub fn new(tab_width: usize) -> Self {
        Resolver { tab_width }
    }

    pub fn resolve(&self, entry: &Path) -> Result<Vec<Unit>, CompileError> {
        let mut visited = HashSet::new();
        let mut order = Vec::new();
        let canonical_entry = entry.canonicalize().map_err(|e| CompileError::Io {
            path: entry.to_path_buf(),
            detail: format!("{e}"),
        })?;
        self.visit(&canonical_entry, None, &mut visited, &mut order)?;
        Ok(order)
    }

    fn visit(
        &self,
        path: &Path,
        imported_from: Option<(&Path, usize)>,
        visited: &mut HashSet<PathBuf>,
        order: &mut Vec<Unit>,
    ) -> Result<(), CompileError> {
        if visited.contains(path) {
            return Ok(());
        }
        visited.insert(path.to_path_buf());

        let text = self.load_text(path, imported_from)?;
        let imports = scan_imports(&text);

        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        for (line_no, import_path) in imports {
            let resolved = dir.join(&import_path);
            let canonical = resolved.canonicalize().map_err(|e| CompileError::Io {
                path: resolved.clone(),
                detail: format!(
                    "import not found (imported from {}:{line_no}): {e}",
                    path.display()
                ),
            })?;
            self.visit(&canonical, Some((path, line_no)), visited, order)?;
        }

        order.push(Unit { path: path.to_path_buf(), text });
        Ok(())
    }

    fn load_text(&self, path: &Path, imported_from: Option<(&Path, usize)>) -> Result<String, CompileError> {
        let bytes = std::fs::read(path).map_err(|e| CompileError::Io {
            path: path.to_path_buf(),
            detail: match imported_from {
                Some((from, line)) => format!("{e} (imported from {}:{line})", from.display()),
                None => format!("{e}"),
            },
        })?;

        let raw = match String::from_utf8(bytes) {
            Ok(s) => s,
            Err(e) => {
                eprintln!(
                    "warning: {}: not valid UTF-8, decoding as Latin-1",
                    path.display()
                );
                e.into_bytes().into_iter().map(|b| b as char).collect()
            }
        };

        Ok(normalize(&raw, self.tab_width))
    }
}

fn normalize(raw: &str, tab_width: usize) -> String {
    let unified = raw.replace("\r\n", "\n").replace('\r', "\n");
    unified
        .split('\n')
        .map(|line| expand_leading_tabs(line, tab_width))
        .collect::<Vec<_>>()
        .join("\n")
}

fn expand_leading_tabs(line: &str, tab_width: usize) -> String {
    let mut out = String::new();
    let mut rest = line;
    loop {
        match rest.chars().next() {
            Some(' ') => {
                out.push(' ');
                rest = &rest[1..];
            }
            Some('\t') => {
                out.push_str(&" ".repeat(tab_width));
                rest = &rest[1..];
            }
            _ => break,
        }
    }
    out.push_str(rest);
    out
}

/// Scans the top-of-file lines (blank/comment lines skipped, stopping at
/// the first non-import content line) for `import "<path>"` directives,
/// returning (1-based line number, path) pairs in source order.
fn scan_imports(text: &str) -> Vec<(usize, String)> {
    let mut imports = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let trimmed = line.trim_start();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("import ") {
            if let Some(path) = parse_quoted(rest.trim()) {
                imports.push((idx + 1, path));
                continue;
            }
        }
        break;
    }
    imports
}

fn parse_quoted(s: &str) -> Option<String> {
    let s = s.strip_prefix('"')?;
    let end = s.find('"')?;
    Some(s[..end].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn expand_leading_tabs_only_touches_indentation() {
        let expanded = expand_leading_tabs("\tlocal integer x = 1\t# note", 4);
        assert_eq!(expanded, "    local integer x = 1\t# note");
    }

    #[test]
    fn normalize_unifies_line_endings() {
        let normalized = normalize("a\r\nb\rc\n", 4);
        assert_eq!(normalized, "a\nb\nc\n");
    }

    #[test]
    fn scan_imports_stops_at_first_non_import_line() {
        let text = "import \"a.jp\"\nimport \"b.jp\"\nlibrary Foo:\nimport \"c.jp\"\n";
        let imports = scan_imports(text);
        assert_eq!(imports, vec![(1, "a.jp".to_string()), (2, "b.jp".to_string())]);
    }

    #[test]
    fn scan_imports_skips_blank_and_comment_lines() {
        let text = "# header comment\n\nimport \"a.jp\"\nlibrary Foo:\n";
        let imports = scan_imports(text);
        assert_eq!(imports, vec![(3, "a.jp".to_string())]);
    }

    #[test]
    fn resolve_deduplicates_diamond_imports() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.jp");
        let b = dir.path().join("b.jp");
        let c = dir.path().join("c.jp");
        std::fs::write(&c, "library C:\n    int x = 1\n").unwrap();
        std::fs::write(&b, "import \"c.jp\"\nlibrary B:\n    int y = 1\n").unwrap();
        let mut f = std::fs::File::create(&a).unwrap();
        writeln!(f, "import \"b.jp\"").unwrap();
        writeln!(f, "import \"c.jp\"").unwrap();
        writeln!(f, "library A:").unwrap();
        writeln!(f, "    int z = 1").unwrap();
        drop(f);

        let resolver = Resolver::new(4);
        let units = resolver.resolve(&a).unwrap();
        assert_eq!(units.len(), 3);
        assert!(units[0].path.ends_with("c.jp"));
        assert!(units[1].path.ends_with("b.jp"));
        assert!(units[2].path.ends_with("a.jp"));
    }

    #[test]
    fn resolve_reports_missing_entry_as_io_error() {
        let resolver = Resolver::new(4);
        let result = resolver.resolve(Path::new("/no/such/file.jp"));
        assert!(matches!(result, Err(CompileError::Io { .. })));
    }
}
