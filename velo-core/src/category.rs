//! Category derivation from the content tree and the aggregated category tree.

use crate::models::{CategoryNode, Post};
use std::path::{Component, Path, PathBuf};

/// Maps a file's position under the content root to a category path.
#[derive(Debug, Clone)]
pub struct CategoryClassifier {
    content_root: PathBuf,
    excluded: Vec<String>,
}

impl CategoryClassifier {
    /// `excluded` directory names are compared case-insensitively.
    pub fn new(content_root: impl Into<PathBuf>, excluded: &[String]) -> Self {
        Self {
            content_root: content_root.into(),
            excluded: excluded.iter().map(|d| d.to_lowercase()).collect(),
        }
    }

    pub fn content_root(&self) -> &Path {
        &self.content_root
    }

    fn is_excluded(&self, segment: &str) -> bool {
        let lower = segment.to_lowercase();
        self.excluded.iter().any(|d| *d == lower)
    }

    /// Directory segments between the content root and `file`, root to leaf.
    ///
    /// Files outside the content root have no directory categories.
    pub fn directory_categories(&self, file: &Path) -> Vec<String> {
        let Ok(relative) = file.strip_prefix(&self.content_root) else {
            return Vec::new();
        };
        let Some(parent) = relative.parent() else {
            return Vec::new();
        };

        parent
            .components()
            .filter_map(|c| match c {
                Component::Normal(name) => name.to_str(),
                _ => None,
            })
            .filter(|name| !self.is_excluded(name))
            .map(str::to_string)
            .collect()
    }

    /// Combine directory and YAML categories.
    ///
    /// With `merge` the result is the directory list followed by YAML entries
    /// not already present. Without it, a non-empty YAML list replaces the
    /// directory list. An empty YAML list always keeps the directory list.
    pub fn resolve(directory: &[String], declared: &[String], merge: bool) -> Vec<String> {
        if declared.is_empty() {
            return directory.to_vec();
        }
        if !merge {
            return dedup(declared.iter());
        }
        dedup(directory.iter().chain(declared.iter()))
    }
}

fn dedup<'a>(items: impl Iterator<Item = &'a String>) -> Vec<String> {
    let mut result: Vec<String> = Vec::new();
    for item in items {
        let item = item.trim();
        if !item.is_empty() && !result.iter().any(|r| r == item) {
            result.push(item.to_string());
        }
    }
    result
}

impl CategoryNode {
    /// Build the tree for `posts`.
    ///
    /// Each post adds one to the node its path ends at; totals are then
    /// summed bottom-up so every node counts its whole subtree.
    pub fn build(posts: &[Post]) -> CategoryNode {
        let mut root = CategoryNode::new("Root", "");

        for post in posts {
            let mut node = &mut root;
            let mut path = String::new();
            for name in &post.categories {
                if !path.is_empty() {
                    path.push('/');
                }
                path.push_str(name);

                let index = match node.children.iter().position(|c| c.name == *name) {
                    Some(index) => index,
                    None => {
                        node.children.push(CategoryNode::new(name.clone(), path.clone()));
                        node.children.len() - 1
                    }
                };
                node = &mut node.children[index];
            }
            node.post_count += 1;
        }

        propagate_counts(&mut root);
        root
    }
}

fn propagate_counts(node: &mut CategoryNode) -> usize {
    let mut total = node.post_count;
    for child in &mut node.children {
        total += propagate_counts(child);
    }
    node.post_count = total;
    total
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn post_in(categories: &[&str]) -> Post {
        let mut post = Post::new("t", "t");
        post.categories = strings(categories);
        post
    }

    #[test]
    fn test_directory_categories() {
        let classifier = CategoryClassifier::new(
            "/blog/posts",
            &strings(&["drafts", ".git", "TMP"]),
        );

        assert_eq!(
            classifier.directory_categories(Path::new("/blog/posts/tech/rust/a.md")),
            strings(&["tech", "rust"])
        );
        assert_eq!(
            classifier.directory_categories(Path::new("/blog/posts/tmp/Drafts/tech/a.md")),
            strings(&["tech"])
        );
        assert!(classifier
            .directory_categories(Path::new("/blog/posts/a.md"))
            .is_empty());
        assert!(classifier
            .directory_categories(Path::new("/elsewhere/a.md"))
            .is_empty());
    }

    #[test]
    fn test_merge_policy() {
        let dir = strings(&["tech"]);
        let yaml = strings(&["rust", "tech"]);

        assert_eq!(
            CategoryClassifier::resolve(&dir, &yaml, true),
            strings(&["tech", "rust"])
        );
        assert_eq!(
            CategoryClassifier::resolve(&dir, &yaml, false),
            strings(&["rust", "tech"])
        );
    }

    #[test]
    fn test_empty_yaml_keeps_directory() {
        let dir = strings(&["tech"]);
        assert_eq!(CategoryClassifier::resolve(&dir, &[], true), dir);
        assert_eq!(CategoryClassifier::resolve(&dir, &[], false), dir);
    }

    #[test]
    fn test_tree_counts() {
        let posts = vec![post_in(&["a", "b"]), post_in(&["a", "b"]), post_in(&["a"])];
        let root = CategoryNode::build(&posts);

        assert_eq!(root.name, "Root");
        assert_eq!(root.post_count, 3);
        assert_eq!(root.find("a").unwrap().post_count, 3);
        let ab = root.find("a/b").unwrap();
        assert_eq!(ab.post_count, 2);
        assert_eq!(ab.path_segment, "a/b");
    }

    #[test]
    fn test_tree_sibling_order_and_uncategorized() {
        let posts = vec![post_in(&["z"]), post_in(&[]), post_in(&["m"]), post_in(&["z"])];
        let root = CategoryNode::build(&posts);

        let names: Vec<_> = root.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["z", "m"]);
        assert_eq!(root.post_count, 4);
        assert_eq!(root.find("z").unwrap().post_count, 2);
    }
}
