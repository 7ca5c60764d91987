//! End-to-end flows against an offline root, with a stub `wget` that
//! serves files from a local mirror directory. Source URLs embed the
//! mirror path after the scheme, so one stub handles every test.

use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use aept::api::Ctx;
use aept::config::{Config, Source};

const URL_PREFIX: &str = "https://example.org";

static WGET_DIR: OnceLock<tempfile::TempDir> = OnceLock::new();

/// Put a `wget` stub on PATH that maps `https://example.org/<path>` to the
/// local file `/<path>`.
fn ensure_stub_wget() {
    WGET_DIR.get_or_init(|| {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("wget");
        std::fs::write(
            &script,
            format!(
                "#!/bin/sh\n# wget -q -O <dest> <url>\ndest=\"$3\"\nurl=\"$4\"\npath=\"${{url#{}}}\"\ncp \"$path\" \"$dest\"\n",
                URL_PREFIX
            ),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let path = std::env::var("PATH").unwrap_or_default();
        std::env::set_var("PATH", format!("{}:{}", dir.path().display(), path));
        dir
    });
}

/// Minimal `.ipk`: ar(debian-binary, control.tar.gz, data.tar.gz).
fn build_ipk(control: &str, data: &[(&str, &str, u32)]) -> Vec<u8> {
    fn tar_gz(entries: &[(&str, &str, u32)]) -> Vec<u8> {
        let encoder =
            flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (path, content, mode) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_mode(*mode);
            header.set_mtime(1);
            header.set_size(content.len() as u64);
            builder.append_data(&mut header, path, content.as_bytes()).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    let control_tar = tar_gz(&[("./control", control, 0o644)]);
    let data_tar = tar_gz(data);

    let mut out = Vec::new();
    {
        let mut archive = ar::Builder::new(&mut out);
        for (name, bytes) in [
            ("debian-binary", b"2.0\n".to_vec()),
            ("control.tar.gz", control_tar),
            ("data.tar.gz", data_tar),
        ] {
            let header = ar::Header::new(name.as_bytes().to_vec(), bytes.len() as u64);
            archive.append(&header, bytes.as_slice()).unwrap();
        }
    }
    out
}

fn sha256_hex(data: &[u8]) -> String {
    use sha2::Digest;
    faster_hex::hex_string(&sha2::Sha256::digest(data))
}

struct Repo {
    mirror: PathBuf,
    index: String,
}

impl Repo {
    fn new(mirror: &Path) -> Repo {
        std::fs::create_dir_all(mirror).unwrap();
        Repo { mirror: mirror.to_path_buf(), index: String::new() }
    }

    fn add(&mut self, control: &str, data: &[(&str, &str, u32)]) {
        let ipk = build_ipk(control, data);
        let mut fields = control.trim_end().to_string();

        let name = control
            .lines()
            .find_map(|l| l.strip_prefix("Package: "))
            .unwrap();
        let version = control
            .lines()
            .find_map(|l| l.strip_prefix("Version: "))
            .unwrap();
        let filename = format!("{}_{}_noarch.ipk", name, version);

        std::fs::write(self.mirror.join(&filename), &ipk).unwrap();
        fields.push_str(&format!("\nFilename: {}\n", filename));
        fields.push_str(&format!("SHA256: {}\n\n", sha256_hex(&ipk)));
        self.index.push_str(&fields);
    }

    fn publish(&self) {
        let mut encoder =
            flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(self.index.as_bytes()).unwrap();
        std::fs::write(self.mirror.join("Packages.gz"), encoder.finish().unwrap()).unwrap();
    }
}

fn offline_ctx(root: &Path, mirror: &Path) -> Ctx {
    std::fs::create_dir_all(root).unwrap();
    let mut cfg = Config::default();
    cfg.offline_root = Some(root.to_path_buf());
    cfg.apply_offline_root();
    cfg.check_signature = false;
    cfg.non_interactive = true;
    cfg.sources.push(Source {
        name: "main".to_string(),
        url: format!("{}{}", URL_PREFIX, mirror.display()),
        gzip: true,
    });
    Ctx::new(cfg)
}

#[test]
fn test_install_remove_autoremove_cycle() {
    ensure_stub_wget();

    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("root");
    let mirror = dir.path().join("mirror");

    let mut repo = Repo::new(&mirror);
    repo.add(
        "Package: hello\nVersion: 1.0\nArchitecture: noarch\nDescription: greeter\n",
        &[("./usr/bin/hello", "#!/bin/sh\necho hi\n", 0o755)],
    );
    repo.add(
        "Package: world\nVersion: 1.0\nArchitecture: noarch\nDepends: hello\nDescription: consumer\n",
        &[("./usr/bin/world", "#!/bin/sh\necho wo\n", 0o755)],
    );
    repo.publish();

    let ctx = offline_ctx(&root, &mirror);
    ctx.update().unwrap();
    assert!(root.join("var/lib/aept/lists/main").is_file());

    // Installing world pulls hello in as a dependency.
    ctx.install(&["world".to_string()], &[]).unwrap();

    let hello_bin = root.join("usr/bin/hello");
    assert!(hello_bin.is_file());
    assert_eq!(
        std::fs::metadata(&hello_bin).unwrap().permissions().mode() & 0o7777,
        0o755
    );
    assert!(root.join("usr/bin/world").is_file());

    let status = std::fs::read_to_string(root.join("var/lib/aept/status")).unwrap();
    assert!(status.contains("Package: hello"));
    assert!(status.contains("Package: world"));
    assert_eq!(status.matches("Status: install ok installed").count(), 2);

    let list =
        std::fs::read_to_string(root.join("var/lib/aept/info/hello.list")).unwrap();
    assert_eq!(list, "./usr/bin/hello\t0755\n");

    // The dependency is auto-installed, the request is not.
    let auto =
        std::fs::read_to_string(root.join("var/lib/aept/auto-installed")).unwrap();
    assert!(auto.lines().any(|l| l == "hello"));
    assert!(!auto.lines().any(|l| l == "world"));

    // Removing the leaf keeps the dependency until autoremove runs.
    ctx.remove(&["world".to_string()]).unwrap();
    assert!(!root.join("usr/bin/world").exists());
    assert!(hello_bin.is_file());

    ctx.autoremove().unwrap();
    assert!(!hello_bin.exists());
    let status = std::fs::read_to_string(root.join("var/lib/aept/status")).unwrap();
    assert!(!status.contains("Package:"));
}

#[test]
fn test_pin_holds_version() {
    ensure_stub_wget();

    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("root");
    let mirror = dir.path().join("mirror");

    let mut repo = Repo::new(&mirror);
    repo.add(
        "Package: lib\nVersion: 1.0\nArchitecture: noarch\n",
        &[("./usr/lib/lib-1", "one\n", 0o644)],
    );
    repo.add(
        "Package: lib\nVersion: 2.0\nArchitecture: noarch\n",
        &[("./usr/lib/lib-2", "two\n", 0o644)],
    );
    repo.publish();

    let ctx = offline_ctx(&root, &mirror);
    ctx.update().unwrap();

    // A pin forces the exact version on install.
    ctx.pin(&["lib=1.0".to_string()]).unwrap();
    ctx.install(&["lib".to_string()], &[]).unwrap();
    let status = std::fs::read_to_string(root.join("var/lib/aept/status")).unwrap();
    assert!(status.contains("Version: 1.0"));

    // A pinned package is held on upgrade-all.
    ctx.upgrade().unwrap();
    let status = std::fs::read_to_string(root.join("var/lib/aept/status")).unwrap();
    assert!(status.contains("Version: 1.0"));
    assert!(!status.contains("Version: 2.0"));

    // Dropping the pin lets the upgrade through.
    ctx.unpin(&["lib".to_string()]).unwrap();
    ctx.upgrade().unwrap();
    let status = std::fs::read_to_string(root.join("var/lib/aept/status")).unwrap();
    assert!(status.contains("Version: 2.0"));
    assert!(root.join("usr/lib/lib-2").is_file());
    // the old version's payload is gone
    assert!(!root.join("usr/lib/lib-1").exists());
}

#[test]
fn test_local_package_install() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("root");
    std::fs::create_dir_all(&root).unwrap();

    let ipk_path = dir.path().join("tool_1.0_noarch.ipk");
    std::fs::write(
        &ipk_path,
        build_ipk(
            "Package: tool\nVersion: 1.0\nArchitecture: noarch\n",
            &[("./usr/bin/tool", "#!/bin/sh\n", 0o755)],
        ),
    )
    .unwrap();

    let mut cfg = Config::default();
    cfg.offline_root = Some(root.clone());
    cfg.apply_offline_root();
    cfg.non_interactive = true;
    let ctx = Ctx::new(cfg);

    ctx.install(&[], &[ipk_path]).unwrap();
    assert!(root.join("usr/bin/tool").is_file());

    let status = std::fs::read_to_string(root.join("var/lib/aept/status")).unwrap();
    assert!(status.contains("Package: tool"));
    // an explicitly given local package is not auto-installed
    let auto = std::fs::read_to_string(root.join("var/lib/aept/auto-installed"))
        .unwrap_or_default();
    assert!(!auto.lines().any(|l| l == "tool"));
}
