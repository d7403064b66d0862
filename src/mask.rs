//! Propagates group visibility and expanded state down the layer tree.
//!
//! Rows are produced top to bottom. Each open group contributes one
//! [`Ancestor`] to the stack while its rows are being visited; a row is
//! skipped when something above it is collapsed and disabled when something
//! above it is hidden. A group's header row is judged by its parents only,
//! so a collapsed group still shows its own header.

use log::trace;

use crate::tree::LayerTree;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ancestor {
    pub visible: bool,
    pub opened: bool,
}

#[derive(Debug, Default)]
pub struct AncestorStack(Vec<Ancestor>);

impl AncestorStack {
    pub fn push(&mut self, ancestor: Ancestor) {
        self.0.push(ancestor);
    }

    pub fn pop(&mut self) -> Option<Ancestor> {
        self.0.pop()
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    /// Combined state of every entry except the innermost one.
    pub fn parents(&self) -> Ancestor {
        let parents = match self.0.split_last() {
            Some((_, parents)) => parents,
            None => &[],
        };

        Self::combine(parents)
    }

    /// Combined state of every entry.
    pub fn all(&self) -> Ancestor {
        Self::combine(&self.0)
    }

    fn combine(entries: &[Ancestor]) -> Ancestor {
        entries.iter().fold(
            Ancestor {
                visible: true,
                opened: true,
            },
            |acc, entry| Ancestor {
                visible: acc.visible && entry.visible,
                opened: acc.opened && entry.opened,
            },
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowKind {
    /// Header row of a group, the folder record.
    GroupStart(usize),
    /// Divider record closing a group.
    GroupEnd(usize),
    Layer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Row {
    pub index: usize,
    pub kind: RowKind,
    /// Indentation level.
    pub depth: usize,
    /// Hidden from the list because a group above is collapsed.
    pub skipped: bool,
    /// Shown, but nothing on it exports, because a group above is hidden.
    pub disabled: bool,
}

/// Walks the layers in `start..=end` from the top down.
pub fn walk(tree: &LayerTree, start: usize, end: usize) -> Vec<Row> {
    let mut stack = AncestorStack::default();
    let mut rows = vec![];

    for index in (start..=end).rev() {
        let innermost = tree
            .innermost_group(index)
            .and_then(|id| tree.group(id).map(|group| (id, group)));
        let Some((id, group)) = innermost else {
            rows.push(Row {
                index,
                kind: RowKind::Layer,
                depth: stack.depth(),
                skipped: false,
                disabled: false,
            });
            continue;
        };

        let row = if group.end == index {
            stack.push(Ancestor {
                visible: group.visible,
                opened: group.opened,
            });
            let parents = stack.parents();

            Row {
                index,
                kind: RowKind::GroupStart(id),
                depth: stack.depth() - 1,
                skipped: !parents.opened,
                disabled: !parents.visible,
            }
        } else if group.start == index {
            stack.pop();
            let parents = stack.all();

            Row {
                index,
                kind: RowKind::GroupEnd(id),
                depth: stack.depth(),
                skipped: !parents.opened,
                disabled: !parents.visible,
            }
        } else {
            let parents = stack.parents();

            Row {
                index,
                kind: RowKind::Layer,
                depth: stack.depth(),
                skipped: !group.opened || !parents.opened,
                disabled: !group.visible || !parents.visible,
            }
        };

        trace!("row {index}: {row:?}");
        rows.push(row);
    }

    rows
}

/// Walks the whole document.
pub fn walk_document(tree: &LayerTree) -> Vec<Row> {
    match tree.len() {
        0 => vec![],
        len => walk(tree, 0, len - 1),
    }
}

/// Layer panel outline, one line per displayed row.
pub fn list(tree: &LayerTree) -> Vec<String> {
    walk_document(tree)
        .into_iter()
        .filter(|row| !row.skipped)
        .filter_map(|row| {
            let record = tree.record(row.index)?;
            let name = record.name.trim_matches(char::from(0));
            let indent = "\t".repeat(row.depth);
            let hidden = if row.disabled || !tree.is_layer_visible(row.index) {
                " (hidden)"
            } else {
                ""
            };

            match row.kind {
                RowKind::GroupStart(id) => {
                    let opened = tree.group(id).map_or(true, |group| group.opened);
                    let fold = if opened { "-" } else { "+" };
                    Some(format!("{indent}[G{fold}] {name}{hidden}"))
                }
                RowKind::Layer => Some(format!("{indent}[L] #{} {name}{hidden}", row.index)),
                RowKind::GroupEnd(_) => None,
            }
        })
        .collect()
}
