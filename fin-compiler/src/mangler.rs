//! Name mangling.
//!
//! Every symbol a `.fin` file defines gets rewritten to
//! `"<sanitized-path>__<name>"` so two modules can both define `foo`
//! without a link-time collision. `main` and declared-external symbols are
//! the two carve-outs that bypass mangling entirely.

use std::collections::HashSet;
use std::path::Path;

/// Stateless name mangler. Held by `Compiler` and consulted on every
/// declaration and every type-name lookup.
#[derive(Debug, Default)]
pub struct Mangler {
    /// Names declared via `define` (extern blocks) anywhere in the
    /// program — these keep their bare name in every module, mirroring an
    /// externally-linked C symbol.
    externals: HashSet<String>,
}

impl Mangler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_external(&mut self, name: &str) {
        self.externals.insert(name.to_string());
    }

    pub fn is_external(&self, name: &str) -> bool {
        self.externals.contains(name)
    }

    /// `main` and already-declared externals
    /// bypass mangling.
    pub fn bypasses_mangling(&self, name: &str) -> bool {
        name == "main" || self.externals.contains(name)
    }

    /// Produce the mangled name for `name`, defined in `defining_file`,
    /// relative to `project_root`.
    pub fn mangle(&self, project_root: &Path, defining_file: &Path, name: &str) -> String {
        if self.bypasses_mangling(name) {
            return name.to_string();
        }
        let sanitized = Self::sanitize_path(project_root, defining_file);
        format!("{sanitized}__{name}")
    }

    /// Rules 3-4: compute the file's path relative to the project root (or
    /// fall back to the bare filename when the two are on different
    /// volumes/prefixes), strip the extension, and replace every
    /// non-alphanumeric character with `_`, trimming trailing underscores.
    fn sanitize_path(project_root: &Path, defining_file: &Path) -> String {
        let relative = defining_file
            .strip_prefix(project_root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| {
                defining_file
                    .file_name()
                    .map(Path::new)
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| defining_file.to_path_buf())
            });

        let without_ext = relative.with_extension("");
        let raw = without_ext.to_string_lossy();

        let mut sanitized = String::with_capacity(raw.len());
        for ch in raw.chars() {
            if ch.is_ascii_alphanumeric() {
                sanitized.push(ch);
            } else {
                sanitized.push('_');
            }
        }
        while sanitized.ends_with('_') {
            sanitized.pop();
        }
        sanitized
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn root() -> PathBuf {
        PathBuf::from("/project")
    }

    #[test]
    fn main_is_never_mangled() {
        let mangler = Mangler::new();
        assert_eq!(
            mangler.mangle(&root(), &root().join("src/main.fin"), "main"),
            "main"
        );
    }

    #[test]
    fn externals_bypass_mangling() {
        let mut mangler = Mangler::new();
        mangler.register_external("malloc");
        assert_eq!(
            mangler.mangle(&root(), &root().join("std/mem.fin"), "malloc"),
            "malloc"
        );
    }

    #[test]
    fn relative_path_is_sanitized_and_joined() {
        let mangler = Mangler::new();
        let file = root().join("lib/math/vector.fin");
        assert_eq!(
            mangler.mangle(&root(), &file, "dot"),
            "lib_math_vector__dot"
        );
    }

    #[test]
    fn two_files_defining_the_same_symbol_never_collide() {
        let mangler = Mangler::new();
        let a = mangler.mangle(&root(), &root().join("a.fin"), "foo");
        let b = mangler.mangle(&root(), &root().join("b.fin"), "foo");
        assert_ne!(a, b);
    }

    #[test]
    fn files_outside_the_root_fall_back_to_the_bare_filename() {
        let mangler = Mangler::new();
        let outside = PathBuf::from("/somewhere/else/helper.fin");
        assert_eq!(mangler.mangle(&root(), &outside, "go"), "helper__go");
    }
}
