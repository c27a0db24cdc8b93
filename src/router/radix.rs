//! Radix tree over path segments.
//!
//! Paths are split on `/` without dropping empty segments, so `/tasks/` and `/tasks`
//! are different routes. A segment is either static (matched exactly) or a capture
//! written `:name`, optionally preceded by a static prefix inside the same segment
//! (`p_:petId`). Static children are tried before captures and the search
//! backtracks when a branch dead-ends.

use http::Method;
use std::collections::HashMap;
use std::sync::Arc;

use super::core::{ParamVec, RouteEntry};

type MethodTable = HashMap<Method, Arc<RouteEntry>>;

#[derive(Clone, Default)]
struct RadixNode {
    /// Static segment text, or the prefix before the capture for capture nodes.
    segment: String,
    /// Capture name for capture nodes.
    param_name: Option<Arc<str>>,
    routes: MethodTable,
    children: Vec<RadixNode>,
    param_children: Vec<RadixNode>,
}

/// Split a native segment into `(prefix, capture name)` if it holds a capture.
fn split_capture(segment: &str) -> Option<(&str, &str)> {
    let (prefix, name) = segment.split_once(':')?;
    (!name.is_empty()).then_some((prefix, name))
}

impl RadixNode {
    fn insert(&mut self, segments: &[&str], route: Arc<RouteEntry>) -> Option<Arc<RouteEntry>> {
        let Some((&segment, remaining)) = segments.split_first() else {
            return self.routes.insert(route.method.clone(), route);
        };

        if let Some((prefix, name)) = split_capture(segment) {
            if let Some(child) = self
                .param_children
                .iter_mut()
                .find(|c| c.segment == prefix && c.param_name.as_deref() == Some(name))
            {
                return child.insert(remaining, route);
            }
            let mut child = RadixNode {
                segment: prefix.to_string(),
                param_name: Some(Arc::from(name)),
                ..RadixNode::default()
            };
            let replaced = child.insert(remaining, route);
            self.param_children.push(child);
            // Longer prefixes are more specific and get tried first.
            self.param_children
                .sort_by(|a, b| b.segment.len().cmp(&a.segment.len()));
            return replaced;
        }

        if let Some(child) = self.children.iter_mut().find(|c| c.segment == segment) {
            return child.insert(remaining, route);
        }
        let mut child = RadixNode {
            segment: segment.to_string(),
            ..RadixNode::default()
        };
        let replaced = child.insert(remaining, route);
        self.children.push(child);
        replaced
    }

    fn search<'a>(
        &'a self,
        segments: &[&str],
        accept: &dyn Fn(&MethodTable) -> bool,
        params: &mut ParamVec,
    ) -> Option<&'a MethodTable> {
        let Some((&segment, remaining)) = segments.split_first() else {
            return accept(&self.routes).then_some(&self.routes);
        };

        for child in &self.children {
            if child.segment == segment {
                if let Some(found) = child.search(remaining, accept, params) {
                    return Some(found);
                }
            }
        }

        for child in &self.param_children {
            let Some(name) = &child.param_name else {
                continue;
            };
            let Some(value) = segment.strip_prefix(child.segment.as_str()) else {
                continue;
            };
            if value.is_empty() {
                continue;
            }
            params.push((Arc::clone(name), value.to_string()));
            if let Some(found) = child.search(remaining, accept, params) {
                return Some(found);
            }
            // Backtrack
            params.pop();
        }

        None
    }
}

/// Segment list of a path, keeping empty segments.
fn segments_of(path: &str) -> Vec<&str> {
    path.strip_prefix('/').unwrap_or(path).split('/').collect()
}

#[derive(Clone, Default)]
pub(crate) struct RadixRouter {
    root: RadixNode,
    methods: Vec<Method>,
}

impl RadixRouter {
    /// Register a route under its native path. Returns a route it replaced, if any.
    pub(crate) fn insert(&mut self, native_path: &str, route: Arc<RouteEntry>) -> Option<Arc<RouteEntry>> {
        if !self.methods.contains(&route.method) {
            self.methods.push(route.method.clone());
        }
        self.root.insert(&segments_of(native_path), route)
    }

    /// Route for exactly this method and path, with raw captures.
    pub(crate) fn lookup(&self, method: &Method, path: &str) -> Option<(Arc<RouteEntry>, ParamVec)> {
        let mut params = ParamVec::new();
        let routes = self
            .root
            .search(&segments_of(path), &|routes: &MethodTable| routes.contains_key(method), &mut params)?;
        routes.get(method).map(|r| (Arc::clone(r), params))
    }

    /// Every method with some route matching `path`. Each method is searched on its
    /// own, so overlapping static and capture patterns all contribute.
    pub(crate) fn methods_for(&self, path: &str) -> Vec<Method> {
        let segments = segments_of(path);
        self.methods
            .iter()
            .filter(|method| {
                let mut params = ParamVec::new();
                self.root
                    .search(&segments, &|routes: &MethodTable| routes.contains_key(*method), &mut params)
                    .is_some()
            })
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segments_keep_trailing_slash() {
        assert_eq!(segments_of("/api/tasks/"), vec!["api", "tasks", ""]);
        assert_eq!(segments_of("/api/tasks"), vec!["api", "tasks"]);
        assert_eq!(segments_of("/"), vec![""]);
    }

    #[test]
    fn test_split_capture() {
        assert_eq!(split_capture(":id"), Some(("", "id")));
        assert_eq!(split_capture("p_:petId"), Some(("p_", "petId")));
        assert_eq!(split_capture("static"), None);
    }
}
