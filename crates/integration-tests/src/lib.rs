//! Shared fixtures for the end-to-end tests
//!
//! The tests drive the real `SubprocessRunner` against small shell scripts that
//! speak jpegoptim's `-b` status format, so they run without jpegoptim installed.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tempfile::TempDir;

/// Stand-in for `jpegoptim -b`
///
/// Understands `--stdin`, `--stdout`, `-d<dir>`, `-o`, `-n` and `-m<q>`.
/// A file "shrinks" to `size * q / 100` when `-m` is given and is otherwise
/// reported unchanged; image bytes are passed through untouched.
const FAKE_JPEGOPTIM: &str = r#"#!/bin/sh
stdin=0; stdout=0; overwrite=0; noaction=0; quality=""; dest=""; failed=0

for arg in "$@"; do
    case "$arg" in
        --stdin) stdin=1 ;;
        --stdout) stdout=1 ;;
        -o) overwrite=1 ;;
        -n) noaction=1 ;;
        -m*) quality="${arg#-m}" ;;
        -d*) dest="${arg#-d}" ;;
    esac
done

say() {
    if [ "$stdout" = 1 ]; then echo "$1" >&2; else echo "$1"; fi
}

shrink() {
    if [ -n "$quality" ]; then echo $(( $1 * quality / 100 )); else echo "$1"; fi
}

status_line() {
    if [ "$3" -lt "$2" ]; then word=optimized; else word=skipped; fi
    pct=$(awk -v s="$2" -v n="$3" 'BEGIN { if (s > 0) printf "%.2f", (s - n) * 100 / s; else printf "0.00" }')
    say "$1,64x48,24bit,N,$2,$3,$pct,$word"
}

if [ "$stdin" = 1 ]; then
    tmp=$(mktemp)
    if [ "$stdout" = 1 ]; then tee "$tmp"; else cat > "$tmp"; fi
    size=$(wc -c < "$tmp" | tr -d ' ')
    rm -f "$tmp"
    status_line stdin "$size" "$(shrink "$size")"
    exit 0
fi

for f in "$@"; do
    case "$f" in -*) continue ;; esac
    size=$(wc -c < "$f" | tr -d ' ')
    new=$(shrink "$size")
    if [ -n "$dest" ]; then
        target="$dest/$(basename "$f")"
        if [ -e "$target" ] && [ "$overwrite" != 1 ]; then
            say "$f,skipped"
            failed=1
            continue
        fi
    fi
    if [ "$stdout" = 1 ]; then cat "$f"; fi
    if [ "$noaction" != 1 ] && [ -n "$dest" ] && [ "$new" -lt "$size" ]; then
        cp "$f" "$target"
    fi
    status_line "$f" "$size" "$new"
done

[ "$stdout" = 1 ] || echo
exit $failed
"#;

/// Floods stderr before behaving like the stand-in
const NOISY_JPEGOPTIM: &str = r#"#!/bin/sh
head -c 300000 /dev/zero | tr '\0' '.' >&2
echo >&2
exec "$(dirname "$0")/fake-jpegoptim" "$@"
"#;

/// Never finishes on its own
const SLOW_JPEGOPTIM: &str = r#"#!/bin/sh
exec sleep 30
"#;

struct Fixtures {
    dir: TempDir,
}

// Scripts are written once, before any test spawns a process, so no forked
// child can hold a writable descriptor to them (ETXTBSY).
fn fixtures() -> &'static Fixtures {
    static FIXTURES: OnceLock<Fixtures> = OnceLock::new();
    FIXTURES.get_or_init(|| {
        let dir = tempfile::tempdir().expect("fixture dir");
        for (name, body) in [
            ("fake-jpegoptim", FAKE_JPEGOPTIM),
            ("noisy-jpegoptim", NOISY_JPEGOPTIM),
            ("slow-jpegoptim", SLOW_JPEGOPTIM),
        ] {
            let path = dir.path().join(name);
            fs::write(&path, body).expect("write fixture script");
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755))
                .expect("chmod fixture script");
        }
        Fixtures { dir }
    })
}

pub fn fake_jpegoptim() -> PathBuf {
    fixtures().dir.path().join("fake-jpegoptim")
}

pub fn noisy_jpegoptim() -> PathBuf {
    fixtures().dir.path().join("noisy-jpegoptim")
}

pub fn slow_jpegoptim() -> PathBuf {
    fixtures().dir.path().join("slow-jpegoptim")
}

/// Write `len` bytes shaped like a JPEG (SOI ... EOI) into `dir/name`
pub fn write_image(dir: &Path, name: &str, len: usize) -> PathBuf {
    let mut bytes = vec![0xFF, 0xD8];
    bytes.extend((0..len.saturating_sub(4)).map(|i| (i % 251) as u8));
    bytes.extend([0xFF, 0xD9]);
    let path = dir.join(name);
    fs::write(&path, bytes).expect("write test image");
    path
}

/// Route `tracing` output through the test harness (RUST_LOG to enable)
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
