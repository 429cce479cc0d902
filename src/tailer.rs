/// Tails the sync inbox file, emitting each complete line as it is appended.
///
/// Uses the `notify` crate to detect file modifications, then reads from the
/// last known byte offset.
///
/// Only newline-terminated lines are forwarded. A trailing partial line stays
/// unread until the writer finishes it.
///
/// Rotation handling: the paired device may truncate or recreate the inbox
/// once it has been consumed. If the file shrank below our position we
/// restart from byte 0.
use anyhow::Result;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::sync::mpsc as std_mpsc;
use std::time::Duration;
use tokio::sync::mpsc::Sender;

pub struct TailerState {
    path:     PathBuf,
    position: u64,
}

impl TailerState {
    fn new(path: PathBuf) -> Self {
        Self { path, position: 0 }
    }

    /// Forward every complete line past `position`.
    /// Returns false once the receiver has gone away.
    fn read_new_lines(&mut self, tx: &Sender<String>) -> Result<bool> {
        let file_len = match std::fs::metadata(&self.path) {
            Ok(m) => m.len(),
            Err(_) => return Ok(true), // Inbox not created yet
        };

        if file_len < self.position {
            tracing::info!("Inbox truncated, restarting from byte 0");
            self.position = 0;
        }
        if file_len == self.position {
            return Ok(true);
        }

        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(self.position))?;
        let mut buf = Vec::with_capacity((file_len - self.position) as usize);
        file.read_to_end(&mut buf)?;

        let Some(last_newline) = buf.iter().rposition(|b| *b == b'\n') else {
            return Ok(true);
        };
        let complete = &buf[..=last_newline];

        for raw in complete.split(|b| *b == b'\n') {
            let line = String::from_utf8_lossy(raw);
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                continue;
            }
            if tx.blocking_send(line.to_owned()).is_err() {
                return Ok(false);
            }
        }

        self.position += complete.len() as u64;
        Ok(true)
    }
}

/// Relative inbox paths are resolved against the working directory; the
/// watcher reports absolute paths.
fn absolute_inbox(path: PathBuf) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path)
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

/// Blocking loop. Run it on a dedicated thread.
pub fn run(inbox_path: PathBuf, tx: Sender<String>) -> Result<()> {
    let inbox_path = absolute_inbox(inbox_path)?;
    tracing::info!("Inbox tailer starting: {:?}", inbox_path);

    let watch_dir = inbox_path
        .parent()
        .unwrap_or(inbox_path.as_path())
        .to_path_buf();
    std::fs::create_dir_all(&watch_dir)?;
    let inbox_name = inbox_path.file_name().map(|n| n.to_os_string());

    let (fs_tx, fs_rx) = std_mpsc::channel::<notify::Result<Event>>();
    let config = notify::Config::default().with_poll_interval(Duration::from_millis(500));

    let mut watcher = RecommendedWatcher::new(fs_tx, config)?;
    watcher.watch(&watch_dir, RecursiveMode::NonRecursive)?;

    let mut state = TailerState::new(inbox_path.clone());

    // Pick up anything queued before we started
    if !state.read_new_lines(&tx)? {
        return Ok(());
    }

    loop {
        match fs_rx.recv() {
            Ok(Ok(Event { kind: EventKind::Modify(_) | EventKind::Create(_), paths, .. })) => {
                // Non-recursive watch: the file name alone identifies the inbox
                if paths.iter().any(|p| p.file_name() == inbox_name.as_deref()) {
                    match state.read_new_lines(&tx) {
                        Ok(true) => {}
                        Ok(false) => {
                            tracing::debug!("Inbox receiver closed, tailer exiting");
                            break;
                        }
                        Err(e) => tracing::warn!("Tailer read error: {}", e),
                    }
                }
            }
            Ok(Ok(_)) => {}
            Ok(Err(e)) => tracing::error!("Watcher error: {}", e),
            Err(_) => {
                tracing::warn!("Watcher channel closed, tailer exiting");
                break;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;
    use tokio::sync::mpsc;

    #[test]
    fn reads_initial_lines() {
        let mut f = NamedTempFile::new().unwrap();
        writeln!(f, "line one").unwrap();
        writeln!(f, "line two").unwrap();
        f.flush().unwrap();

        let (tx, mut rx) = mpsc::channel(16);
        let mut state = TailerState::new(f.path().to_path_buf());
        assert!(state.read_new_lines(&tx).unwrap());

        assert_eq!(rx.try_recv().unwrap(), "line one");
        assert_eq!(rx.try_recv().unwrap(), "line two");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn holds_back_partial_line() {
        let mut f = NamedTempFile::new().unwrap();
        write!(f, "done\nhalf").unwrap();
        f.flush().unwrap();

        let (tx, mut rx) = mpsc::channel(16);
        let mut state = TailerState::new(f.path().to_path_buf());
        state.read_new_lines(&tx).unwrap();
        assert_eq!(rx.try_recv().unwrap(), "done");
        assert!(rx.try_recv().is_err());

        writeln!(f, "-finished").unwrap();
        f.flush().unwrap();
        state.read_new_lines(&tx).unwrap();
        assert_eq!(rx.try_recv().unwrap(), "half-finished");
    }

    #[test]
    fn detects_truncation() {
        let mut f = NamedTempFile::new().unwrap();
        writeln!(f, "original content").unwrap();
        f.flush().unwrap();

        let (tx, mut rx) = mpsc::channel(16);
        let mut state = TailerState::new(f.path().to_path_buf());
        state.read_new_lines(&tx).unwrap();
        let _ = rx.try_recv();

        let mut f2 = std::fs::File::create(f.path()).unwrap();
        writeln!(f2, "new").unwrap();
        f2.flush().unwrap();

        state.read_new_lines(&tx).unwrap();
        assert_eq!(rx.try_recv().unwrap(), "new");
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, _rx) = mpsc::channel(1);
        let mut state = TailerState::new(dir.path().join("inbox.jsonl"));
        assert!(state.read_new_lines(&tx).unwrap());
    }

    fn recv_within(rx: &mut mpsc::Receiver<String>, limit: Duration) -> Option<String> {
        let deadline = std::time::Instant::now() + limit;
        while std::time::Instant::now() < deadline {
            if let Ok(line) = rx.try_recv() {
                return Some(line);
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        None
    }

    #[test]
    fn relative_inbox_is_made_absolute() {
        let resolved = absolute_inbox(PathBuf::from("inbox.jsonl")).unwrap();
        assert!(resolved.is_absolute());
        assert!(resolved.ends_with("inbox.jsonl"));

        let already = std::env::temp_dir().join("inbox.jsonl");
        assert_eq!(absolute_inbox(already.clone()).unwrap(), already);
    }

    #[test]
    fn run_follows_appends_to_relative_inbox() {
        // tempdir_in(".") yields a path relative to the working directory
        let dir = tempfile::tempdir_in(".").unwrap();
        let inbox = dir.path().join("inbox.jsonl");
        assert!(inbox.is_relative());
        std::fs::write(&inbox, "queued\n").unwrap();

        let (tx, mut rx) = mpsc::channel(16);
        let path = inbox.clone();
        let _tailer = std::thread::spawn(move || run(path, tx));

        // The backlog arrives once the watcher is registered
        assert_eq!(recv_within(&mut rx, Duration::from_secs(5)).as_deref(), Some("queued"));

        let mut f = std::fs::OpenOptions::new().append(true).open(&inbox).unwrap();
        writeln!(f, "hello").unwrap();
        f.flush().unwrap();

        assert_eq!(recv_within(&mut rx, Duration::from_secs(5)).as_deref(), Some("hello"));
    }

    #[test]
    fn reports_closed_receiver() {
        let mut f = NamedTempFile::new().unwrap();
        writeln!(f, "x").unwrap();
        f.flush().unwrap();

        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let mut state = TailerState::new(f.path().to_path_buf());
        assert!(!state.read_new_lines(&tx).unwrap());
    }
}
