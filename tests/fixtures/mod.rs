//! Shared fixtures for integration tests
//!
//! Projects live in a temp dir laid out as `<base>/<dir>/code.cpp`. The
//! cross-compiler is replaced by small shell scripts that behave like g++ as
//! far as the pipeline can tell: they read the source, write the `-o`
//! output, print diagnostics on stderr and exit with a code.

#![allow(dead_code)]

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tempfile::TempDir;

/// A minimal valid submission
pub const VALID_SOURCE: &str = "#include <cstdio>\n\nint main() {\n    return 0;\n}\n";

/// A submission the fake compiler treats as a syntax error
pub const SYNTAX_ERROR_SOURCE: &str = "int main() {\n    return 0 // SYNTAX_ERROR\n}\n";

/// A submission pulling in a host file
pub const ESCAPING_SOURCE: &str = "#include \"../../../etc/passwd\"\nint main() {}\n";

/// Compiler stand-in: records its argv next to the output, fails on a
/// missing source or one containing SYNTAX_ERROR, otherwise writes a fake
/// binary.
pub const FAKE_GXX: &str = r#"#!/bin/sh
out=""
src=""
prev=""
for arg in "$@"; do
    if [ "$prev" = "-o" ]; then out="$arg"; fi
    case "$arg" in
        *.cpp) src="$arg" ;;
    esac
    prev="$arg"
done
dir=$(dirname "$out")
if [ ! -f "$src" ]; then
    echo "g++: error: $src: No such file or directory" >&2
    exit 1
fi
printf '%s\n' "$@" > "$dir/argv.txt"
if grep -q SYNTAX_ERROR "$src"; then
    echo "$src:2:13: error: expected ';' before '}' token" >&2
    exit 1
fi
echo "compiled ok"
printf 'ELF' > "$out"
exit 0
"#;

/// Compiler stand-in that exits at once but leaves a helper holding its pipes
pub const LINGERING_HELPER_GXX: &str = "#!/bin/sh\nsleep 8 &\nexit 0\n";

/// Compiler stand-in that never finishes
pub const HANGING_GXX: &str = "#!/bin/sh\nexec sleep 30\n";

/// Compiler stand-in that crashes
pub const CRASHING_GXX: &str = "#!/bin/sh\necho 'internal compiler error' >&2\nkill -SEGV $$\n";

/// Container runtime stand-in whose daemon is unreachable
pub const UNREACHABLE_RUNTIME: &str =
    "#!/bin/sh\necho 'Cannot connect to the Docker daemon at unix:///var/run/docker.sock' >&2\nexit 125\n";

/// A project base with one provisioned project directory
pub struct TestProject {
    pub temp: TempDir,
    pub dir: &'static str,
}

impl TestProject {
    pub fn new(source: &str) -> Self {
        let temp = TempDir::new().unwrap();
        let project = TestProject { temp, dir: "u1/p1" };
        fs::create_dir_all(project.path()).unwrap();
        fs::write(project.file("code.cpp"), source).unwrap();
        project
    }

    pub fn base(&self) -> &Path {
        self.temp.path()
    }

    pub fn path(&self) -> PathBuf {
        self.temp.path().join(self.dir)
    }

    pub fn file(&self, name: &str) -> PathBuf {
        self.path().join(name)
    }

    pub fn read(&self, name: &str) -> String {
        fs::read_to_string(self.file(name)).unwrap()
    }

    /// Install an executable script outside the project directory
    pub fn install_tool(&self, name: &str, body: &str) -> PathBuf {
        let tools = self.temp.path().join("tools");
        fs::create_dir_all(&tools).unwrap();
        let path = tools.join(name);
        install_script(&path, body);
        path
    }
}

/// Write an executable script
///
/// The file is written by a child process so no descriptor open for writing
/// is inherited by a sibling test's fork, which would make exec fail with
/// ETXTBSY.
pub fn install_script(path: &Path, body: &str) {
    let mut child = Command::new("/bin/sh")
        .arg("-c")
        .arg("cat > \"$1\" && chmod 755 \"$1\"")
        .arg("sh")
        .arg(path)
        .stdin(Stdio::piped())
        .spawn()
        .unwrap();
    child
        .stdin
        .take()
        .unwrap()
        .write_all(body.as_bytes())
        .unwrap();
    assert!(child.wait().unwrap().success());
}
