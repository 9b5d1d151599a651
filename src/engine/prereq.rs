//! Directed acyclic relation over core loops: `prereq -> dependent` edges
//! with transitive queries and cycle rejection.

use std::collections::{HashMap, HashSet, VecDeque};

#[derive(Debug, Default)]
pub struct PrereqGraph {
    /// prereq -> dependents
    forward: HashMap<String, Vec<String>>,
    /// dependent -> prereqs
    reverse: HashMap<String, Vec<String>>,
}

impl PrereqGraph {
    pub fn from_edges<I>(edges: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut graph = Self::default();
        for (prereq, dependent) in edges {
            graph.insert(prereq, dependent);
        }
        graph
    }

    fn insert(&mut self, prereq: String, dependent: String) {
        self.forward
            .entry(prereq.clone())
            .or_default()
            .push(dependent.clone());
        self.reverse.entry(dependent).or_default().push(prereq);
    }

    /// True if adding `prereq -> dependent` would close a cycle, i.e. the
    /// dependent already reaches the prereq (a self-edge is the trivial case).
    pub fn would_create_cycle(&self, prereq: &str, dependent: &str) -> bool {
        if prereq == dependent {
            return true;
        }
        self.reaches(dependent, prereq)
    }

    fn reaches(&self, from: &str, to: &str) -> bool {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::new();
        queue.push_back(from);
        while let Some(node) = queue.pop_front() {
            if node == to {
                return true;
            }
            if let Some(next) = self.forward.get(node) {
                for n in next {
                    if seen.insert(n.as_str()) {
                        queue.push_back(n);
                    }
                }
            }
        }
        false
    }

    /// Transitive prerequisites of `id`, breadth-first from the direct ones.
    pub fn prereqs_of(&self, id: &str) -> Vec<String> {
        self.walk(id, &self.reverse)
    }

    /// Transitive dependents of `id`.
    pub fn dependents_of(&self, id: &str) -> Vec<String> {
        self.walk(id, &self.forward)
    }

    fn walk(&self, start: &str, adjacency: &HashMap<String, Vec<String>>) -> Vec<String> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut order = Vec::new();
        let mut queue: VecDeque<&str> = VecDeque::new();
        queue.push_back(start);
        seen.insert(start);
        while let Some(node) = queue.pop_front() {
            if let Some(next) = adjacency.get(node) {
                for n in next {
                    if seen.insert(n.as_str()) {
                        order.push(n.clone());
                        queue.push_back(n);
                    }
                }
            }
        }
        order
    }
}
