//! Focus-to-session resolution — walk the process tree under a window's
//! PID to find which registered clippy session owns it.
//!
//! The focused window's PID (from `_NET_WM_PID`) is almost always a
//! terminal emulator, not the wrapped agent process directly — the
//! wrapper runs as a descendant (terminal → shell → clippyctl wrap →
//! agent). We walk `/proc` from the window PID down through its
//! children looking for a match against the broker's registered
//! session PIDs.

use std::collections::HashMap;
use std::fs;

use crate::ipc::protocol::SessionDescriptor;

/// Errors from session focus resolution.
#[derive(Debug, PartialEq, Eq)]
pub enum FocusError {
    /// No registered session was found under the focused window's PID.
    NoSession,
    /// More than one registered session was found in the descendant
    /// tree (e.g. two wrapped panes in the same terminal window).
    Ambiguous(Vec<String>),
}

/// Resolve the session ID that owns `window_pid`, by walking its
/// descendant process tree and matching against `sessions`.
pub fn resolve_session(
    window_pid: u32,
    sessions: &[SessionDescriptor],
) -> Result<String, FocusError> {
    let children = build_children_map();
    let descendants = collect_descendants(window_pid, &children);

    let matches: Vec<&str> = sessions
        .iter()
        .filter(|s| descendants.contains(&s.pid))
        .map(|s| s.session.as_str())
        .collect();

    match matches.len() {
        0 => Err(FocusError::NoSession),
        1 => Ok(matches[0].to_string()),
        _ => Err(FocusError::Ambiguous(
            matches.into_iter().map(String::from).collect(),
        )),
    }
}

/// Build a `ppid -> [pid, ...]` map by scanning `/proc/*/stat`.
///
/// Unreadable or malformed entries are skipped — processes that exit
/// mid-scan, or `/proc` entries that aren't process directories, are
/// not an error.
fn build_children_map() -> HashMap<u32, Vec<u32>> {
    let mut children: HashMap<u32, Vec<u32>> = HashMap::new();

    let Ok(entries) = fs::read_dir("/proc") else {
        return children;
    };

    for entry in entries.flatten() {
        let Some(pid) = entry.file_name().to_str().and_then(|s| s.parse::<u32>().ok()) else {
            continue;
        };
        let Some(ppid) = read_ppid(pid) else {
            continue;
        };
        children.entry(ppid).or_default().push(pid);
    }

    children
}

/// Parse the parent PID out of `/proc/<pid>/stat`.
///
/// Field 4 (1-indexed) is ppid. Field 2 is the comm name in
/// parentheses, which may itself contain spaces or parens, so we
/// split on the last `)` and then whitespace-tokenize what follows.
fn read_ppid(pid: u32) -> Option<u32> {
    let stat = fs::read_to_string(format!("/proc/{pid}/stat")).ok()?;
    let after_comm = stat.rsplit_once(')')?.1;
    let mut fields = after_comm.split_whitespace();
    fields.next(); // state
    fields.next()?.parse().ok()
}

/// Collect `root` and all its transitive descendants via BFS.
fn collect_descendants(root: u32, children: &HashMap<u32, Vec<u32>>) -> Vec<u32> {
    let mut seen = vec![root];
    let mut frontier = vec![root];

    while let Some(pid) = frontier.pop() {
        if let Some(kids) = children.get(&pid) {
            for &kid in kids {
                if !seen.contains(&kid) {
                    seen.push(kid);
                    frontier.push(kid);
                }
            }
        }
    }

    seen
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc(session: &str, pid: u32) -> SessionDescriptor {
        SessionDescriptor {
            session: session.to_string(),
            pid,
            has_turn: false,
        }
    }

    #[test]
    fn no_session_when_tree_empty() {
        let children: HashMap<u32, Vec<u32>> = HashMap::new();
        let descendants = collect_descendants(999, &children);
        assert_eq!(descendants, vec![999]);

        let sessions = vec![desc("s1", 100)];
        let matches: Vec<&str> = sessions
            .iter()
            .filter(|s| descendants.contains(&s.pid))
            .map(|s| s.session.as_str())
            .collect();
        assert!(matches.is_empty());
    }

    #[test]
    fn direct_pid_match() {
        let mut children = HashMap::new();
        children.insert(1, vec![2]);
        let descendants = collect_descendants(1, &children);
        assert!(descendants.contains(&1));
        assert!(descendants.contains(&2));
    }

    #[test]
    fn deep_descendant_match() {
        let mut children = HashMap::new();
        children.insert(1, vec![2]);
        children.insert(2, vec![3]);
        children.insert(3, vec![4]);
        let descendants = collect_descendants(1, &children);
        assert!(descendants.contains(&4));
    }

    #[test]
    fn ambiguous_when_two_sessions_in_tree() {
        let mut children = HashMap::new();
        children.insert(1, vec![2, 3]);
        let descendants = collect_descendants(1, &children);
        let sessions = vec![desc("s1", 2), desc("s2", 3)];
        let matches: Vec<&str> = sessions
            .iter()
            .filter(|s| descendants.contains(&s.pid))
            .map(|s| s.session.as_str())
            .collect();
        assert_eq!(matches.len(), 2);
    }

    #[test]
    fn cycle_does_not_infinite_loop() {
        // Malformed /proc data could in principle report a cycle;
        // `seen` dedup must prevent infinite traversal.
        let mut children = HashMap::new();
        children.insert(1, vec![2]);
        children.insert(2, vec![1]);
        let descendants = collect_descendants(1, &children);
        assert_eq!(descendants.len(), 2);
    }
}
