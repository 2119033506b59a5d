//! Track table scanned from the music directory, plus the scrolling
//! window the menu shows it through.
//!
//! The table is bounded: at most `MAX_TRACKS` entries, display names cut
//! at `MAX_TRACK_NAME` characters. Entries are sorted in place with a
//! recursive partition-exchange pass using the last element as pivot,
//! comparing names without regard to ASCII case.

use crate::constants::{MAX_TRACK_NAME, MAX_TRACKS, MENU_PAGE_LEN};
use log::{error, warn};
use std::cmp::Ordering;
use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct TrackEntry {
    name: String,
    path: PathBuf,
}

impl TrackEntry {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[derive(Debug, Default)]
pub struct TrackList {
    entries: Vec<TrackEntry>,
}

impl TrackList {
    /// Read the regular files of `dir` into a sorted table. Directories,
    /// symlinks and other non-files are skipped; entries past the table
    /// bound are dropped with a warning. An unreadable directory yields
    /// an empty table.
    pub fn scan(dir: &Path) -> TrackList {
        let listing = match fs::read_dir(dir) {
            Ok(listing) => listing,
            Err(e) => {
                error!("could not read {}: {e}", dir.display());
                return TrackList::default();
            }
        };

        let mut entries = Vec::new();
        let mut overflow = false;
        for entry in listing.flatten() {
            // dirent type, does not follow symlinks
            let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
            if !is_file {
                continue;
            }
            if entries.len() >= MAX_TRACKS {
                overflow = true;
                continue;
            }
            let name = entry
                .file_name()
                .to_string_lossy()
                .chars()
                .take(MAX_TRACK_NAME)
                .collect();
            entries.push(TrackEntry {
                name,
                path: entry.path(),
            });
        }
        if overflow {
            warn!(
                "{} holds more than {} files; ignoring the rest",
                dir.display(),
                MAX_TRACKS
            );
        }
        sort_entries(&mut entries);
        TrackList { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&TrackEntry> {
        self.entries.get(index)
    }

    pub fn entries(&self) -> &[TrackEntry] {
        &self.entries
    }
}

fn sort_entries(entries: &mut [TrackEntry]) {
    if entries.len() < 2 {
        return;
    }
    let pivot = entries.len() - 1;
    let mut store = 0;
    for i in 0..pivot {
        if compare_names(&entries[i].name, &entries[pivot].name) == Ordering::Less {
            entries.swap(i, store);
            store += 1;
        }
    }
    entries.swap(store, pivot);
    let (below, above) = entries.split_at_mut(store);
    sort_entries(below);
    sort_entries(&mut above[1..]);
}

fn compare_names(a: &str, b: &str) -> Ordering {
    let a = a.bytes().map(|b| b.to_ascii_lowercase());
    let b = b.bytes().map(|b| b.to_ascii_lowercase());
    a.cmp(b)
}

/// Cursor plus scroll offset over a fixed-height page of the track table.
///
/// The offset chases the cursor so it keeps a two-row margin from the
/// page edges where the table allows, and the page never runs past the
/// end of the table.
#[derive(Debug)]
pub struct MenuWindow {
    cursor: usize,
    offset: usize,
    total: usize,
    page: usize,
}

impl MenuWindow {
    pub fn new(total: usize) -> Self {
        Self {
            cursor: 0,
            offset: 0,
            total,
            page: MENU_PAGE_LEN,
        }
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Rows of the table currently on the page.
    pub fn visible(&self) -> Range<usize> {
        self.offset..(self.offset + self.page).min(self.total)
    }

    pub fn move_up(&mut self) -> bool {
        if self.cursor == 0 {
            return false;
        }
        self.cursor -= 1;
        self.follow_cursor();
        true
    }

    pub fn move_down(&mut self) -> bool {
        if self.cursor + 1 >= self.total {
            return false;
        }
        self.cursor += 1;
        self.follow_cursor();
        true
    }

    fn follow_cursor(&mut self) {
        let page = self.page as isize;
        let cursor = self.cursor as isize;
        let total = self.total as isize;
        let mut offset = self.offset as isize;
        if cursor - offset > page - 2 {
            offset = cursor - (page - 2);
        } else if cursor - offset < 2 {
            offset = cursor - 2;
        }
        if offset + page >= total {
            offset = total - page;
        }
        if offset < 0 {
            offset = 0;
        }
        self.offset = offset as usize;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::TempDir;

    fn entry(name: &str) -> TrackEntry {
        TrackEntry {
            name: name.to_string(),
            path: PathBuf::from(name),
        }
    }

    fn names(entries: &[TrackEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.name()).collect()
    }

    #[test]
    fn test_sort_is_case_insensitive() {
        let mut entries = vec![
            entry("Zebra.mod"),
            entry("apple.wav"),
            entry("Mango.ogg"),
            entry("banana.flac"),
        ];
        sort_entries(&mut entries);
        assert_eq!(
            names(&entries),
            vec!["apple.wav", "banana.flac", "Mango.ogg", "Zebra.mod"]
        );
    }

    #[test]
    fn test_sort_handles_small_and_sorted_input() {
        let mut empty: Vec<TrackEntry> = vec![];
        sort_entries(&mut empty);

        let mut single = vec![entry("only.wav")];
        sort_entries(&mut single);
        assert_eq!(names(&single), vec!["only.wav"]);

        let mut sorted = vec![entry("a.wav"), entry("b.wav"), entry("c.wav")];
        sort_entries(&mut sorted);
        assert_eq!(names(&sorted), vec!["a.wav", "b.wav", "c.wav"]);
        // Second pass leaves it untouched
        sort_entries(&mut sorted);
        assert_eq!(names(&sorted), vec!["a.wav", "b.wav", "c.wav"]);
    }

    #[test]
    fn test_scan_skips_directories() {
        let dir = TempDir::new().expect("temp dir");
        File::create(dir.path().join("track_b.ogg")).expect("create");
        File::create(dir.path().join("Track_A.wav")).expect("create");
        std::fs::create_dir(dir.path().join("subdir")).expect("mkdir");

        let list = TrackList::scan(dir.path());
        assert_eq!(list.len(), 2);
        assert_eq!(list.get(0).map(TrackEntry::name), Some("Track_A.wav"));
        assert_eq!(list.get(1).map(TrackEntry::name), Some("track_b.ogg"));
    }

    #[cfg(unix)]
    #[test]
    fn test_scan_skips_symlinks() {
        let dir = TempDir::new().expect("temp dir");
        let target = dir.path().join("real.wav");
        File::create(&target).expect("create");
        std::os::unix::fs::symlink(&target, dir.path().join("alias.wav")).expect("symlink");

        let list = TrackList::scan(dir.path());
        assert_eq!(list.len(), 1);
        assert_eq!(list.get(0).map(TrackEntry::name), Some("real.wav"));
    }

    #[test]
    fn test_scan_truncates_long_names() {
        let dir = TempDir::new().expect("temp dir");
        let long = "x".repeat(80) + ".wav";
        File::create(dir.path().join(&long)).expect("create");

        let list = TrackList::scan(dir.path());
        assert_eq!(list.get(0).map(|e| e.name().len()), Some(MAX_TRACK_NAME));
        // The full path survives for loading
        assert!(
            list.get(0)
                .map(|e| e.path().ends_with(&long))
                .unwrap_or(false)
        );
    }

    #[test]
    fn test_scan_missing_directory_yields_empty_table() {
        let dir = TempDir::new().expect("temp dir");
        let gone = dir.path().join("not-here");
        let list = TrackList::scan(&gone);
        assert!(list.is_empty());
    }

    #[test]
    fn test_scan_caps_table_size() {
        let dir = TempDir::new().expect("temp dir");
        for i in 0..MAX_TRACKS + 5 {
            File::create(dir.path().join(format!("t{i:04}.wav"))).expect("create");
        }
        let list = TrackList::scan(dir.path());
        assert_eq!(list.len(), MAX_TRACKS);
    }

    #[test]
    fn test_window_keeps_margin_while_scrolling_down() {
        let mut window = MenuWindow::new(20);
        // Cursor can reach row 5 of the page before the offset moves
        for _ in 0..5 {
            assert!(window.move_down());
        }
        assert_eq!((window.cursor(), window.offset()), (5, 0));
        assert!(window.move_down());
        assert_eq!((window.cursor(), window.offset()), (6, 1));
        assert_eq!(window.visible(), 1..8);
    }

    #[test]
    fn test_window_keeps_margin_while_scrolling_up() {
        let mut window = MenuWindow::new(20);
        for _ in 0..12 {
            window.move_down();
        }
        assert_eq!((window.cursor(), window.offset()), (12, 7));
        // Moving back up: offset holds until the two-row margin is hit
        for _ in 0..3 {
            assert!(window.move_up());
        }
        assert_eq!((window.cursor(), window.offset()), (9, 7));
        assert!(window.move_up());
        assert_eq!((window.cursor(), window.offset()), (8, 6));
    }

    #[test]
    fn test_window_stops_at_table_ends() {
        let mut window = MenuWindow::new(3);
        assert!(!window.move_up());
        assert!(window.move_down());
        assert!(window.move_down());
        assert!(!window.move_down());
        assert_eq!(window.cursor(), 2);
        // Page larger than the table: no scrolling at all
        assert_eq!(window.offset(), 0);
        assert_eq!(window.visible(), 0..3);
    }

    #[test]
    fn test_window_never_scrolls_past_the_end() {
        let mut window = MenuWindow::new(10);
        for _ in 0..9 {
            window.move_down();
        }
        assert_eq!(window.cursor(), 9);
        assert_eq!(window.offset(), 3);
        assert_eq!(window.visible(), 3..10);
    }
}
