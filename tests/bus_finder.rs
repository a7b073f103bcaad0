//! Integration tests for bus address discovery.

#![cfg_attr(test, allow(clippy::unwrap_used))]

use std::{fs, thread, time::Duration};

use tempfile::TempDir;

use omxctl::{BusFinder, PlayerError};

fn write_address_file(dir: &TempDir, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, contents).unwrap();
    path
}

mod explicit_path {
    use super::*;

    #[test]
    fn reads_and_trims_address() {
        let dir = TempDir::new().unwrap();
        let path = write_address_file(
            &dir,
            "omxplayerdbus.pi",
            "  unix:abstract=/tmp/dbus-EXAMPLE,guid=EXAMPLE \n",
        );

        let finder = BusFinder::with_path(&path);
        assert_eq!(
            finder.address().unwrap(),
            "unix:abstract=/tmp/dbus-EXAMPLE,guid=EXAMPLE"
        );
    }

    #[test]
    fn missing_file_is_not_ready() {
        let dir = TempDir::new().unwrap();
        let finder = BusFinder::with_path(dir.path().join("omxplayerdbus.pi"));

        let err = finder.address().unwrap_err();
        assert!(matches!(err, PlayerError::EndpointNotReady(_)));
        assert!(err.is_retriable());
    }

    #[test]
    fn empty_file_is_not_ready() {
        let dir = TempDir::new().unwrap();
        let path = write_address_file(&dir, "omxplayerdbus.pi", "");

        let finder = BusFinder::with_path(&path);
        assert!(matches!(
            finder.address().unwrap_err(),
            PlayerError::EndpointNotReady(_)
        ));
    }
}

mod directory_scan {
    use super::*;

    #[test]
    fn finds_single_address_file() {
        let dir = TempDir::new().unwrap();
        write_address_file(&dir, "omxplayerdbus.pi", "unix:abstract=/tmp/dbus-ONE");

        let finder = BusFinder::in_dir(dir.path());
        assert_eq!(finder.address().unwrap(), "unix:abstract=/tmp/dbus-ONE");
    }

    #[test]
    fn ignores_pid_sidecar_files() {
        let dir = TempDir::new().unwrap();
        write_address_file(&dir, "omxplayerdbus.pi", "unix:abstract=/tmp/dbus-ONE");
        // Written later, but a pid sidecar must never win.
        thread::sleep(Duration::from_millis(20));
        write_address_file(&dir, "omxplayerdbus.pi.pid", "12345");

        let finder = BusFinder::in_dir(dir.path());
        assert_eq!(finder.address().unwrap(), "unix:abstract=/tmp/dbus-ONE");
    }

    #[test]
    fn ignores_unrelated_files() {
        let dir = TempDir::new().unwrap();
        write_address_file(&dir, "something-else", "unix:abstract=/tmp/dbus-OTHER");

        let finder = BusFinder::in_dir(dir.path());
        assert!(matches!(
            finder.address().unwrap_err(),
            PlayerError::EndpointNotReady(_)
        ));
    }

    #[test]
    fn newest_address_file_wins() {
        let dir = TempDir::new().unwrap();
        write_address_file(&dir, "omxplayerdbus.pi", "unix:abstract=/tmp/dbus-OLD");
        thread::sleep(Duration::from_millis(20));
        write_address_file(
            &dir,
            "omxplayerdbus.pi.instance2",
            "unix:abstract=/tmp/dbus-NEW",
        );

        let finder = BusFinder::in_dir(dir.path());
        assert_eq!(finder.address().unwrap(), "unix:abstract=/tmp/dbus-NEW");
    }

    #[test]
    fn missing_directory_is_not_ready() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("does-not-exist");

        let finder = BusFinder::in_dir(missing);
        assert!(matches!(
            finder.address().unwrap_err(),
            PlayerError::EndpointNotReady(_)
        ));
    }
}

mod waiting {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn times_out_when_address_never_appears() {
        let dir = TempDir::new().unwrap();
        let finder = BusFinder::with_path(dir.path().join("omxplayerdbus.pi"));

        let err = finder
            .wait_for_address(Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(matches!(err, PlayerError::EndpointTimeout { waited } if waited == Duration::from_secs(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn returns_immediately_when_address_is_ready() {
        let dir = TempDir::new().unwrap();
        let path = write_address_file(&dir, "omxplayerdbus.pi", "unix:abstract=/tmp/dbus-READY");

        let finder = BusFinder::with_path(&path);
        assert_eq!(
            finder.wait_for_address(Duration::from_secs(2)).await.unwrap(),
            "unix:abstract=/tmp/dbus-READY"
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn picks_up_address_written_while_waiting() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("omxplayerdbus.pi");

        let writer_path = path.clone();
        let writer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            fs::write(&writer_path, "unix:abstract=/tmp/dbus-LATE\n").unwrap();
        });

        let finder = BusFinder::with_path(&path);
        let address = finder
            .wait_for_address(Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(address, "unix:abstract=/tmp/dbus-LATE");

        writer.await.unwrap();
    }
}
