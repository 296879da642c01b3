//! Plain-text output for trees and log rows

use std::io::{self, Write};

use logscope_filter::LogRow;
use logscope_tree::{NodeId, ScopeMatcher, ScopeTree};
use logscope_types::PriorityMask;

/// Print a tree with one indented line per node
pub fn write_tree<W: Write>(out: &mut W, tree: &ScopeTree) -> io::Result<()> {
    write_node(out, tree, tree.root(), 0)
}

fn write_node<W: Write>(out: &mut W, tree: &ScopeTree, id: NodeId, depth: usize) -> io::Result<()> {
    writeln!(out, "{}{}", "  ".repeat(depth), describe(tree, id))?;
    for child in tree.children(id) {
        write_node(out, tree, child, depth + 1)?;
    }
    Ok(())
}

/// Print the full path of every node the matcher accepts
pub fn write_matches<W: Write>(
    out: &mut W,
    tree: &ScopeTree,
    matcher: &ScopeMatcher,
) -> io::Result<()> {
    let found = matcher.search(tree);
    if found.is_empty() {
        return Ok(());
    }

    writeln!(out, "{}", describe(tree, tree.root()))?;
    for id in found {
        let path = tree.make_path(id);
        writeln!(out, "  {} {}", path, mask_suffix(tree, id))?;
    }
    Ok(())
}

fn describe(tree: &ScopeTree, id: NodeId) -> String {
    format!("{} {}", tree.display_name(id), mask_suffix(tree, id))
}

fn mask_suffix(tree: &ScopeTree, id: NodeId) -> String {
    let node = &tree[id];
    match node.scope_id() {
        Some(scope_id) => format!("[{}] #{}", node.priority(), scope_id),
        None => format!("[{}]", node.priority()),
    }
}

/// Print one line per log row
pub fn write_rows<W: Write>(out: &mut W, rows: &[LogRow]) -> io::Result<()> {
    for row in rows {
        writeln!(
            out,
            "{} {:<3} #{:<4} {}",
            row.time_created.format("%Y-%m-%d %H:%M:%S%.3f"),
            severity(row.mask()),
            row.scope_id,
            row.message
        )?;
    }
    Ok(())
}

/// Most severe label of a message mask
fn severity(mask: PriorityMask) -> String {
    [
        PriorityMask::FATAL,
        PriorityMask::ERROR,
        PriorityMask::WARNING,
        PriorityMask::INFO,
        PriorityMask::DEBUG,
        PriorityMask::SCOPE,
    ]
    .into_iter()
    .find(|flag| mask.contains(*flag))
    .map(PriorityMask::label)
    .unwrap_or_else(|| mask.label())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    fn tree() -> ScopeTree {
        let mut tree = ScopeTree::new(3, "app");
        tree.insert_or_merge("Svc::Init", PriorityMask::DEBUG, 1).unwrap();
        tree.insert_or_merge("Svc::Work", PriorityMask::ERROR, 2).unwrap();
        tree.refresh_aggregates();
        tree
    }

    #[test]
    fn test_write_tree() {
        let mut out = Vec::new();
        write_tree(&mut out, &tree()).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "app (3) [DBG|ERR]\n  Svc [DBG|ERR]\n    Init [DBG] #1\n    Work [ERR] #2\n"
        );
    }

    #[test]
    fn test_write_matches() {
        let mut out = Vec::new();
        let matcher = ScopeMatcher::new("Work").unwrap();
        write_matches(&mut out, &tree(), &matcher).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "app (3) [DBG|ERR]\n  Svc::Work [ERR] #2\n");

        let mut out = Vec::new();
        let matcher = ScopeMatcher::new("Nothing").unwrap();
        write_matches(&mut out, &tree(), &matcher).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_write_rows() {
        let rows = vec![LogRow {
            id: 1,
            instance_id: 3,
            scope_id: 2,
            priority: PriorityMask::ERROR.bits(),
            time_created: DateTime::from_timestamp_millis(0).unwrap(),
            message: "boom".to_string(),
        }];
        let mut out = Vec::new();
        write_rows(&mut out, &rows).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "1970-01-01 00:00:00.000 ERR #2    boom\n");
    }
}
