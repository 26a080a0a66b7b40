//! In-memory workspace tree. Nothing here touches the disk.

use crate::error::VfsError;
use slotmap::{new_key_type, SlotMap};
use std::collections::HashSet;

new_key_type! {
    pub struct NodeId;
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    File { content: String },
    Directory { children: Vec<NodeId> },
}

#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    pub kind: NodeKind,
    parent: Option<NodeId>,
}

impl Node {
    pub fn is_dir(&self) -> bool {
        matches!(self.kind, NodeKind::Directory { .. })
    }
}

/// One row of the flattened tree as shown in the side panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeRow {
    pub id: NodeId,
    pub depth: usize,
    pub name: String,
    pub is_dir: bool,
    pub expanded: bool,
}

pub struct VirtualFs {
    nodes: SlotMap<NodeId, Node>,
    root: NodeId,
}

impl Default for VirtualFs {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualFs {
    pub fn new() -> Self {
        let mut nodes = SlotMap::with_key();
        let root = nodes.insert(Node {
            name: "workspace".to_string(),
            kind: NodeKind::Directory {
                children: Vec::new(),
            },
            parent: None,
        });
        Self { nodes, root }
    }

    /// Workspace with the starter files every new session opens with.
    pub fn seeded() -> Self {
        let mut fs = Self::new();
        let root = fs.root;
        // Fresh tree, names are distinct: the inserts cannot fail.
        if let Ok(src) = fs.add_directory(root, "src") {
            let _ = fs.add_file(
                src,
                "main.py",
                "# Python starter code\nprint(\"Hello VimAI!\")",
            );
            let _ = fs.add_file(
                src,
                "utils.py",
                "# Utility functions\ndef greet(name):\n    return f\"Hello {name}\"",
            );
            let _ = fs.add_file(
                src,
                "testing.c",
                "#include <stdio.h>\n\nint main() {\n    printf(\"Hello, C World!\\n\");\n    return 0;\n}",
            );
            let _ = fs.add_file(
                src,
                "testing.cpp",
                "#include <iostream>\n\nint main() {\n    std::cout << \"Hello, C++ World!\" << std::endl;\n    return 0;\n}",
            );
        }
        if let Ok(docs) = fs.add_directory(root, "docs") {
            let _ = fs.add_file(
                docs,
                "README.md",
                "# Project Documentation\n\nThis is a VimAI project.",
            );
        }
        fs
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn name(&self, id: NodeId) -> Option<&str> {
        self.nodes.get(id).map(|n| n.name.as_str())
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id).and_then(|n| n.parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        match self.nodes.get(id).map(|n| &n.kind) {
            Some(NodeKind::Directory { children }) => children,
            _ => &[],
        }
    }

    pub fn is_dir(&self, id: NodeId) -> bool {
        self.nodes.get(id).is_some_and(Node::is_dir)
    }

    pub fn add_file(&mut self, parent: NodeId, name: &str, content: &str) -> Result<NodeId, VfsError> {
        self.insert(
            parent,
            name,
            NodeKind::File {
                content: content.to_string(),
            },
        )
    }

    pub fn add_directory(&mut self, parent: NodeId, name: &str) -> Result<NodeId, VfsError> {
        self.insert(
            parent,
            name,
            NodeKind::Directory {
                children: Vec::new(),
            },
        )
    }

    fn insert(&mut self, parent: NodeId, name: &str, kind: NodeKind) -> Result<NodeId, VfsError> {
        let name = validate_name(name)?;
        let parent_node = self.nodes.get(parent).ok_or(VfsError::Missing)?;
        if !parent_node.is_dir() {
            return Err(VfsError::NotADirectory(parent_node.name.clone()));
        }
        if self.child_named(parent, name).is_some() {
            return Err(VfsError::NameTaken(name.to_string()));
        }
        let id = self.nodes.insert(Node {
            name: name.to_string(),
            kind,
            parent: Some(parent),
        });
        if let Some(NodeKind::Directory { children }) = self.nodes.get_mut(parent).map(|n| &mut n.kind) {
            children.push(id);
        }
        tracing::debug!(path = %self.path(id), "vfs insert");
        Ok(id)
    }

    /// Removes the node and its whole subtree.
    pub fn remove(&mut self, id: NodeId) -> Result<(), VfsError> {
        if id == self.root {
            return Err(VfsError::RootLocked);
        }
        let parent = self.nodes.get(id).ok_or(VfsError::Missing)?.parent;
        tracing::debug!(path = %self.path(id), "vfs remove");
        if let Some(NodeKind::Directory { children }) =
            parent.and_then(|p| self.nodes.get_mut(p)).map(|n| &mut n.kind)
        {
            children.retain(|c| *c != id);
        }
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            if let Some(node) = self.nodes.remove(next) {
                if let NodeKind::Directory { children } = node.kind {
                    stack.extend(children);
                }
            }
        }
        Ok(())
    }

    pub fn rename(&mut self, id: NodeId, new_name: &str) -> Result<(), VfsError> {
        if id == self.root {
            return Err(VfsError::RootLocked);
        }
        let new_name = validate_name(new_name)?;
        let node = self.nodes.get(id).ok_or(VfsError::Missing)?;
        if node.name == new_name {
            return Ok(());
        }
        if let Some(parent) = node.parent {
            if self.child_named(parent, new_name).is_some() {
                return Err(VfsError::NameTaken(new_name.to_string()));
            }
        }
        if let Some(node) = self.nodes.get_mut(id) {
            node.name = new_name.to_string();
        }
        Ok(())
    }

    pub fn content(&self, id: NodeId) -> Result<&str, VfsError> {
        let node = self.nodes.get(id).ok_or(VfsError::Missing)?;
        match &node.kind {
            NodeKind::File { content } => Ok(content),
            NodeKind::Directory { .. } => Err(VfsError::NotAFile(node.name.clone())),
        }
    }

    pub fn set_content(&mut self, id: NodeId, text: &str) -> Result<(), VfsError> {
        let node = self.nodes.get_mut(id).ok_or(VfsError::Missing)?;
        match &mut node.kind {
            NodeKind::File { content } => {
                content.clear();
                content.push_str(text);
                Ok(())
            }
            NodeKind::Directory { .. } => Err(VfsError::NotAFile(node.name.clone())),
        }
    }

    /// Depth-first search for the first file with this name.
    pub fn find_file(&self, name: &str) -> Option<NodeId> {
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            let node = self.nodes.get(id)?;
            match &node.kind {
                NodeKind::File { .. } if node.name == name => return Some(id),
                NodeKind::File { .. } => {}
                NodeKind::Directory { children } => stack.extend(children.iter().rev()),
            }
        }
        None
    }

    pub fn path(&self, id: NodeId) -> String {
        let mut parts = Vec::new();
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let Some(node) = self.nodes.get(current) else {
                break;
            };
            parts.push(node.name.as_str());
            cursor = node.parent;
        }
        parts.reverse();
        parts.join("/")
    }

    /// The directory a new sibling of `id` would land in.
    pub fn containing_dir(&self, id: NodeId) -> NodeId {
        if self.is_dir(id) {
            return id;
        }
        self.parent(id).unwrap_or(self.root)
    }

    pub fn visible_rows(&self, expanded: &HashSet<NodeId>) -> Vec<TreeRow> {
        let mut rows = Vec::new();
        self.collect_rows(self.root, 0, expanded, &mut rows);
        rows
    }

    fn collect_rows(&self, id: NodeId, depth: usize, expanded: &HashSet<NodeId>, rows: &mut Vec<TreeRow>) {
        for &child in self.children(id) {
            let Some(node) = self.nodes.get(child) else {
                continue;
            };
            let is_open = node.is_dir() && expanded.contains(&child);
            rows.push(TreeRow {
                id: child,
                depth,
                name: node.name.clone(),
                is_dir: node.is_dir(),
                expanded: is_open,
            });
            if is_open {
                self.collect_rows(child, depth + 1, expanded, rows);
            }
        }
    }

    fn child_named(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        self.children(parent)
            .iter()
            .copied()
            .find(|c| self.nodes.get(*c).is_some_and(|n| n.name == name))
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(id)
    }
}

fn validate_name(name: &str) -> Result<&str, VfsError> {
    let name = name.trim();
    if name.is_empty() || name.contains('/') || name == "." || name == ".." {
        return Err(VfsError::InvalidName(name.to_string()));
    }
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_workspace_has_starter_files() {
        let fs = VirtualFs::seeded();
        let main = fs.find_file("main.py").expect("main.py seeded");
        assert_eq!(fs.path(main), "workspace/src/main.py");
        assert!(fs.content(main).unwrap().contains("Hello VimAI!"));
        let readme = fs.find_file("README.md").expect("README seeded");
        assert_eq!(fs.path(readme), "workspace/docs/README.md");
    }

    #[test]
    fn duplicate_names_in_one_directory_are_rejected() {
        let mut fs = VirtualFs::new();
        let root = fs.root();
        fs.add_file(root, "a.py", "").unwrap();
        assert_eq!(
            fs.add_file(root, "a.py", "x"),
            Err(VfsError::NameTaken("a.py".to_string()))
        );
        assert_eq!(
            fs.add_directory(root, "a.py"),
            Err(VfsError::NameTaken("a.py".to_string()))
        );
    }

    #[test]
    fn same_name_in_different_directories_is_fine() {
        let mut fs = VirtualFs::new();
        let root = fs.root();
        let sub = fs.add_directory(root, "sub").unwrap();
        fs.add_file(root, "x.c", "").unwrap();
        assert!(fs.add_file(sub, "x.c", "").is_ok());
    }

    #[test]
    fn invalid_names_are_rejected() {
        let mut fs = VirtualFs::new();
        let root = fs.root();
        assert!(matches!(fs.add_file(root, "  ", ""), Err(VfsError::InvalidName(_))));
        assert!(matches!(fs.add_file(root, "a/b", ""), Err(VfsError::InvalidName(_))));
    }

    #[test]
    fn cannot_add_under_a_file() {
        let mut fs = VirtualFs::new();
        let root = fs.root();
        let file = fs.add_file(root, "f.txt", "").unwrap();
        assert_eq!(
            fs.add_file(file, "g.txt", ""),
            Err(VfsError::NotADirectory("f.txt".to_string()))
        );
    }

    #[test]
    fn remove_drops_whole_subtree() {
        let mut fs = VirtualFs::new();
        let root = fs.root();
        let dir = fs.add_directory(root, "d").unwrap();
        let inner = fs.add_file(dir, "inner.py", "x").unwrap();
        fs.remove(dir).unwrap();
        assert!(!fs.contains(dir));
        assert!(!fs.contains(inner));
        assert!(fs.children(root).is_empty());
        assert_eq!(fs.remove(root), Err(VfsError::RootLocked));
    }

    #[test]
    fn rename_checks_siblings() {
        let mut fs = VirtualFs::new();
        let root = fs.root();
        let a = fs.add_file(root, "a.js", "").unwrap();
        fs.add_file(root, "b.js", "").unwrap();
        assert_eq!(
            fs.rename(a, "b.js"),
            Err(VfsError::NameTaken("b.js".to_string()))
        );
        fs.rename(a, "c.js").unwrap();
        assert_eq!(fs.name(a), Some("c.js"));
        assert_eq!(fs.find_file("c.js"), Some(a));
    }

    #[test]
    fn find_file_is_depth_first_in_insertion_order() {
        let mut fs = VirtualFs::new();
        let root = fs.root();
        let first = fs.add_directory(root, "first").unwrap();
        let nested = fs.add_file(first, "dup.py", "1").unwrap();
        fs.add_file(root, "dup.py", "2").unwrap();
        assert_eq!(fs.find_file("dup.py"), Some(nested));
        assert_eq!(fs.find_file("nope.py"), None);
    }

    #[test]
    fn set_content_rejects_directories() {
        let mut fs = VirtualFs::seeded();
        let src = fs.children(fs.root())[0];
        assert!(matches!(fs.set_content(src, "x"), Err(VfsError::NotAFile(_))));
        let main = fs.find_file("main.py").unwrap();
        fs.set_content(main, "print(1)").unwrap();
        assert_eq!(fs.content(main).unwrap(), "print(1)");
    }

    #[test]
    fn visible_rows_follow_expansion() {
        let fs = VirtualFs::seeded();
        let collapsed = fs.visible_rows(&HashSet::new());
        let names: Vec<_> = collapsed.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["src", "docs"]);

        let mut expanded = HashSet::new();
        expanded.insert(collapsed[0].id);
        let rows = fs.visible_rows(&expanded);
        assert_eq!(rows.len(), 6);
        assert_eq!(rows[1].name, "main.py");
        assert_eq!(rows[1].depth, 1);
        assert!(rows[0].expanded);
    }

    #[test]
    fn containing_dir_of_file_is_parent() {
        let fs = VirtualFs::seeded();
        let main = fs.find_file("main.py").unwrap();
        let src = fs.parent(main).unwrap();
        assert_eq!(fs.containing_dir(main), src);
        assert_eq!(fs.containing_dir(src), src);
    }
}
