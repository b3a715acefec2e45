mod common;

use common::{FakeRunner, FixedPorts};
use esp32_flasher::{
    cleanup, Acquirer, FirmwareSource, FlashError, Options, PendingDownload, ProcessOutput,
    ProcessRunner, Reporter, Session, DEFAULT_BAUD, DEFAULT_CHIP,
};
use httpmock::prelude::*;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const IMAGE: &[u8] = b"\xe9\x06\x02\x20firmware-image-bytes";

fn remote(url: &str) -> FirmwareSource {
    FirmwareSource::parse(url).unwrap()
}

fn options(images: &Path, firmware: String) -> Options {
    Options {
        port: None,
        bootloader: images.join("boot.bin"),
        partitions: images.join("parts.bin"),
        firmware,
        baud: DEFAULT_BAUD,
        chip: DEFAULT_CHIP.to_string(),
        esptool: None,
        erase: true,
        keep_firmware: false,
    }
}

fn images() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("boot.bin"), b"boot").unwrap();
    fs::write(dir.path().join("parts.bin"), b"parts").unwrap();
    dir
}

#[test]
fn downloads_into_file_named_after_url() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/raw/main/esp32-v218.ino.bin");
        then.status(200).body(IMAGE);
    });
    let downloads = TempDir::new().unwrap();
    let acquirer = Acquirer::new(downloads.path(), Reporter::plain()).unwrap();

    let image = acquirer
        .acquire(&remote(&server.url("/raw/main/esp32-v218.ino.bin?raw=true")))
        .unwrap();

    mock.assert();
    assert!(image.ephemeral);
    assert_eq!(image.path, downloads.path().join("esp32-v218.ino.bin"));
    assert_eq!(fs::read(&image.path).unwrap(), IMAGE);

    assert!(cleanup(&image, false));
    assert!(!image.path.exists());
}

#[test]
fn not_found_is_a_download_error() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/missing.bin");
        then.status(404);
    });
    let downloads = TempDir::new().unwrap();
    let acquirer = Acquirer::new(downloads.path(), Reporter::plain()).unwrap();
    let url = server.url("/missing.bin");

    let err = acquirer.acquire(&remote(&url)).unwrap_err();

    match &err {
        FlashError::Download { url: failed, .. } => assert_eq!(failed, &url),
        other => panic!("unexpected {other:?}"),
    }
    assert!(err.to_string().contains("404"));
    assert!(!downloads.path().join("missing.bin").exists());
}

#[test]
fn failed_download_never_touches_a_port() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/fw.bin");
        then.status(404);
    });
    let images = images();
    let downloads = TempDir::new().unwrap();
    let mut runner = FakeRunner::healthy();

    let err = Session::new(&mut runner, FixedPorts(vec!["A", "B"]), Reporter::plain())
        .with_download_dir(downloads.path())
        .run(&options(images.path(), server.url("/fw.bin")))
        .unwrap_err();

    assert!(matches!(err, FlashError::Download { .. }));
    assert!(runner.flasher_calls().is_empty());
}

#[test]
fn downloaded_firmware_is_removed_after_flashing() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/fw.bin");
        then.status(200).body(IMAGE);
    });
    let images = images();
    let downloads = TempDir::new().unwrap();
    let mut runner = FakeRunner::healthy();

    let summary = Session::new(&mut runner, FixedPorts(vec!["A"]), Reporter::plain())
        .with_download_dir(downloads.path())
        .run(&options(images.path(), server.url("/fw.bin")))
        .unwrap();

    assert!(summary.all_succeeded());
    let fw = downloads.path().join("fw.bin");
    assert!(runner.flasher_calls()[1].contains(&format!("0x10000 {}", fw.display())));
    assert!(!fw.exists());
}

#[test]
fn keep_firmware_retains_the_download() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/fw.bin");
        then.status(200).body(IMAGE);
    });
    let images = images();
    let downloads = TempDir::new().unwrap();
    let mut runner = FakeRunner::healthy();
    let mut opts = options(images.path(), server.url("/fw.bin"));
    opts.keep_firmware = true;

    Session::new(&mut runner, FixedPorts(vec!["A"]), Reporter::plain())
        .with_download_dir(downloads.path())
        .run(&opts)
        .unwrap();

    assert_eq!(fs::read(downloads.path().join("fw.bin")).unwrap(), IMAGE);
}

#[test]
fn download_is_cleaned_up_when_a_later_precondition_fails() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/fw.bin");
        then.status(200).body(IMAGE);
    });
    let images = images();
    fs::remove_file(images.path().join("boot.bin")).unwrap();
    let downloads = TempDir::new().unwrap();
    let mut runner = FakeRunner::healthy();

    let err = Session::new(&mut runner, FixedPorts(vec!["A"]), Reporter::plain())
        .with_download_dir(downloads.path())
        .run(&options(images.path(), server.url("/fw.bin")))
        .unwrap_err();

    assert!(matches!(err, FlashError::MissingFile { .. }));
    assert!(!downloads.path().join("fw.bin").exists());
    assert!(runner.flasher_calls().is_empty());
}

/// Behaves like an interrupt handler firing while the first erase runs.
struct InterruptOnErase {
    inner: FakeRunner,
    pending: PendingDownload,
    removed: Option<PathBuf>,
}

impl ProcessRunner for InterruptOnErase {
    fn run(&mut self, argv: &[String]) -> io::Result<ProcessOutput> {
        if self.removed.is_none() && argv.iter().any(|arg| arg == "erase_flash") {
            self.removed = self.pending.remove();
        }
        self.inner.run(argv)
    }
}

#[test]
fn interrupt_during_flashing_removes_the_download() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/fw.bin");
        then.status(200).body(IMAGE);
    });
    let images = images();
    let downloads = TempDir::new().unwrap();
    let pending = PendingDownload::default();
    let mut runner = InterruptOnErase {
        inner: FakeRunner::healthy(),
        pending: pending.clone(),
        removed: None,
    };

    Session::new(&mut runner, FixedPorts(vec!["A"]), Reporter::plain())
        .with_download_dir(downloads.path())
        .with_pending(pending.clone())
        .run(&options(images.path(), server.url("/fw.bin")))
        .unwrap();

    let fw = downloads.path().join("fw.bin");
    assert_eq!(runner.removed, Some(fw.clone()));
    assert!(!fw.exists());
    assert_eq!(pending.path(), None);
}

#[test]
fn interrupt_leaves_a_kept_download_alone() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/fw.bin");
        then.status(200).body(IMAGE);
    });
    let images = images();
    let downloads = TempDir::new().unwrap();
    let pending = PendingDownload::default();
    let mut runner = InterruptOnErase {
        inner: FakeRunner::healthy(),
        pending: pending.clone(),
        removed: None,
    };
    let mut opts = options(images.path(), server.url("/fw.bin"));
    opts.keep_firmware = true;

    Session::new(&mut runner, FixedPorts(vec!["A"]), Reporter::plain())
        .with_download_dir(downloads.path())
        .with_pending(pending)
        .run(&opts)
        .unwrap();

    assert_eq!(runner.removed, None);
    assert_eq!(fs::read(downloads.path().join("fw.bin")).unwrap(), IMAGE);
}
