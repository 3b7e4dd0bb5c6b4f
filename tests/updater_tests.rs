use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use asistat::system::feed::FeedReader;
use asistat::system::snapshot::{CoreType, SystemSnapshot};
use asistat::system::updater::apply_record;
use insta::assert_debug_snapshot;

const TICK1: &str = include_str!("fixtures/sample_tick1.plist");
const TICK2: &str = include_str!("fixtures/sample_tick2.plist");

fn feed_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("asistat_it_{name}_{}.plist", std::process::id()))
}

/// Append the way powermetrics does: NUL separator, then the document.
fn append(path: &Path, bytes: &[u8]) {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .expect("open feed");
    file.write_all(b"\0").expect("write separator");
    file.write_all(bytes).expect("write record");
}

fn poll(reader: &FeedReader, snapshot: &mut SystemSnapshot) -> bool {
    match reader.read_next_record() {
        Some(record) => apply_record(snapshot, &record).expect("fixture decodes"),
        None => false,
    }
}

fn core_rows(snapshot: &SystemSnapshot) -> Vec<String> {
    snapshot
        .cpu
        .cores
        .iter()
        .map(|c| {
            format!(
                "{} {} {:?} {:.1}% {:.1} MHz",
                c.id, c.name, c.core_type, c.active, c.freq
            )
        })
        .collect()
}

#[test]
fn first_tick_populates_power_clusters_and_gpu() {
    let path = feed_path("tick1");
    let reader = FeedReader::new(&path);
    reader.reset().unwrap();
    append(&path, TICK1.as_bytes());

    let mut snapshot = SystemSnapshot::default();
    assert!(poll(&reader, &mut snapshot));

    let cpu = &snapshot.cpu;
    assert_eq!(cpu.cpu_power, 1.5);
    assert_eq!(cpu.gpu_power, 0.25);
    assert_eq!(cpu.package_power, 4.25);
    assert_eq!(cpu.ane_power, 2.5);
    assert_eq!(cpu.ane_active, 50.0);
    assert_eq!(cpu.e_cluster_active, 37.5);
    assert_eq!(cpu.e_cluster_freq, 1293.25);
    assert_eq!(cpu.p_cluster_active, 62.5);
    assert_eq!(cpu.p_cluster_freq, 3200.0);
    assert_eq!(snapshot.gpu.active, 12.5);
    assert_eq!(snapshot.gpu.freq, 444.0);
    assert_eq!(snapshot.thermal_pressure, "Nominal");

    let ids: Vec<i64> = cpu.cores.iter().map(|c| c.id).collect();
    assert_eq!(ids, vec![0, 1, 2, 3, 4, 5]);
    assert_eq!(cpu.cores[1].core_type, CoreType::Efficiency);
    assert_eq!(cpu.cores[2].core_type, CoreType::Performance);

    let _ = fs::remove_file(&path);
}

#[test]
fn two_ticks_advance_timestamp_and_retain_missing_cores() {
    let path = feed_path("two_ticks");
    let reader = FeedReader::new(&path);
    reader.reset().unwrap();

    let mut snapshot = SystemSnapshot::default();
    append(&path, TICK1.as_bytes());
    assert!(poll(&reader, &mut snapshot));
    let first_stamp = snapshot.timestamp;
    let first_len = snapshot.cpu.cores.len();

    // Second record plus the torn start of a third.
    append(&path, TICK2.as_bytes());
    append(&path, &TICK1.as_bytes()[..TICK1.len() / 2]);
    assert!(poll(&reader, &mut snapshot));

    assert!(snapshot.timestamp >= first_stamp);
    assert!(snapshot.cpu.cores.len() >= first_len);
    assert_eq!(snapshot.thermal_pressure, "Moderate");
    assert_eq!(snapshot.cpu.cpu_power, 2.25);
    assert_eq!(snapshot.cpu.ane_power, 10.0);
    assert_eq!(snapshot.cpu.ane_active, 100.0);
    assert_eq!(snapshot.cpu.p_cluster_active, 75.0);
    assert_eq!(snapshot.cpu.p_cluster_freq, 3504.0);
    assert_eq!(snapshot.gpu.freq, 1398.0);

    assert_debug_snapshot!("cores_after_two_ticks", core_rows(&snapshot));

    let _ = fs::remove_file(&path);
}

#[test]
fn reapplying_the_same_record_is_idempotent() {
    let mut snapshot = SystemSnapshot::default();
    apply_record(&mut snapshot, TICK1.as_bytes()).unwrap();
    let first = snapshot.cpu.cores.clone();
    apply_record(&mut snapshot, TICK1.as_bytes()).unwrap();
    assert_eq!(snapshot.cpu.cores, first);
}

#[test]
fn feed_without_markers_leaves_snapshot_untouched() {
    let path = feed_path("no_markers");
    fs::write(&path, b"\0\0partial output without any document").unwrap();
    let reader = FeedReader::new(&path);

    let mut snapshot = SystemSnapshot::default();
    let before = snapshot.clone();
    assert!(!poll(&reader, &mut snapshot));
    assert_eq!(snapshot, before);

    let _ = fs::remove_file(&path);
}
