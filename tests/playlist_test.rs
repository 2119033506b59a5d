use mixplay::player::playlist::TrackList;
use std::fs::{self, File};
use tempfile::TempDir;

#[test]
fn test_scan_orders_directory_listing() {
    let temp_dir = TempDir::new().unwrap();

    // Names chosen so byte order and case-folded order disagree
    for name in ["Zebra.ogg", "apple.wav", "Mango.mp3", "banana.flac"] {
        File::create(temp_dir.path().join(name)).unwrap();
    }
    // Subdirectories are not tracks
    fs::create_dir(temp_dir.path().join("albums")).unwrap();

    let list = TrackList::scan(temp_dir.path());

    assert_eq!(list.len(), 4);
    let names: Vec<&str> = list.entries().iter().map(|e| e.name()).collect();
    assert_eq!(names, ["apple.wav", "banana.flac", "Mango.mp3", "Zebra.ogg"]);

    // Entries keep their full path for loading
    let first = list.get(0).unwrap();
    assert_eq!(first.path(), temp_dir.path().join("apple.wav"));
}

#[test]
fn test_scan_missing_directory_is_empty() {
    let temp_dir = TempDir::new().unwrap();
    let list = TrackList::scan(&temp_dir.path().join("no_such_dir"));
    assert!(list.is_empty());
}
