//! Outline (table of contents) and link trees.
//!
//! Both are collaborator data: the core only consumes them as
//! [`JumpTarget`]s and never mutates them.

use serde::Serialize;

use crate::geometry::Rect;
use crate::navigation::{JumpTarget, PageLocation};

/// One flat table-of-contents row as reported by the engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TocEntry {
    /// 1-based nesting level.
    pub level: u32,
    pub title: String,
    pub page_index: Option<usize>,
    pub location: Option<PageLocation>,
}

impl TocEntry {
    pub fn jump_target(&self) -> Option<JumpTarget> {
        self.page_index.map(|page| JumpTarget {
            page,
            location: self.location,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutlineNode {
    pub entry: TocEntry,
    pub children: Vec<OutlineNode>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OutlineTree {
    pub roots: Vec<OutlineNode>,
}

/// Depth-annotated outline row, ready for list display.
#[derive(Debug, Clone, PartialEq)]
pub struct OutlineRow {
    pub depth: usize,
    pub title: String,
    pub target: Option<JumpTarget>,
}

impl OutlineTree {
    /// Nests entries by level with a parent stack. A level deeper than its
    /// predecessor's child level is attached to the predecessor.
    pub fn build(entries: impl IntoIterator<Item = TocEntry>) -> Self {
        let mut roots = Vec::new();
        let mut stack: Vec<OutlineNode> = Vec::new();

        for mut entry in entries {
            entry.level = entry.level.max(1);
            while stack
                .last()
                .is_some_and(|top| top.entry.level >= entry.level)
            {
                if let Some(done) = stack.pop() {
                    attach(&mut stack, &mut roots, done);
                }
            }
            stack.push(OutlineNode {
                entry,
                children: Vec::new(),
            });
        }

        while let Some(done) = stack.pop() {
            attach(&mut stack, &mut roots, done);
        }

        Self { roots }
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Pre-order rows.
    pub fn flatten(&self) -> Vec<OutlineRow> {
        fn walk(nodes: &[OutlineNode], depth: usize, out: &mut Vec<OutlineRow>) {
            for node in nodes {
                out.push(OutlineRow {
                    depth,
                    title: node.entry.title.clone(),
                    target: node.entry.jump_target(),
                });
                walk(&node.children, depth + 1, out);
            }
        }

        let mut rows = Vec::new();
        walk(&self.roots, 0, &mut rows);
        rows
    }
}

fn attach(stack: &mut [OutlineNode], roots: &mut Vec<OutlineNode>, node: OutlineNode) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => roots.push(node),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LinkTarget {
    GoTo {
        page: usize,
        location: Option<PageLocation>,
    },
    Uri {
        uri: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkEntry {
    /// Page the link sits on.
    pub page_index: usize,
    /// Clickable area in page space.
    pub hotspot: Rect,
    pub target: LinkTarget,
    /// Text under the hotspot, when the engine could extract it.
    pub text: Option<String>,
}

impl LinkEntry {
    pub fn jump_target(&self) -> Option<JumpTarget> {
        match self.target {
            LinkTarget::GoTo { page, location } => Some(JumpTarget { page, location }),
            LinkTarget::Uri { .. } => None,
        }
    }

    pub fn describe(&self) -> String {
        let text = self
            .text
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty());
        match (&self.target, text) {
            (LinkTarget::GoTo { page, .. }, Some(text)) => format!("{text} -> p{}", page + 1),
            (LinkTarget::GoTo { page, .. }, None) => format!("-> p{}", page + 1),
            (LinkTarget::Uri { uri }, Some(text)) => format!("{text} -> {uri}"),
            (LinkTarget::Uri { uri }, None) => uri.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkPage {
    pub page_index: usize,
    pub label: String,
    pub links: Vec<LinkEntry>,
}

/// Links grouped under their source page; pages without links are omitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LinkTree {
    pub pages: Vec<LinkPage>,
}

impl LinkTree {
    pub fn build(pages: impl IntoIterator<Item = (usize, String, Vec<LinkEntry>)>) -> Self {
        let mut pages: Vec<LinkPage> = pages
            .into_iter()
            .filter(|(_, _, links)| !links.is_empty())
            .map(|(page_index, label, links)| LinkPage {
                page_index,
                label,
                links,
            })
            .collect();
        pages.sort_by_key(|page| page.page_index);
        Self { pages }
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pages.iter().map(|page| page.links.len()).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LinkEntry> {
        self.pages.iter().flat_map(|page| page.links.iter())
    }
}
