//! Hierarchical identifiers for elaborated proc instances.

use std::fmt;

use serde::{Serialize, Serializer};

/// One ancestor on a spawn path.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProcFrame {
    pub proc_name: String,
    pub instance: u32,
}

/// Identifies one elaborated instance: the spawn ancestry, the proc's own
/// name, and an index that tells apart siblings of the same proc spawned by
/// one parent. The root instance has an empty stack.
///
/// Renders as `test_proc#0->first_level_proc#0->second_level_proc#1`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProcId {
    pub stack: Vec<ProcFrame>,
    pub proc_name: String,
    pub index: u32,
}

impl ProcId {
    pub fn root(proc_name: impl Into<String>) -> Self {
        Self {
            stack: Vec::new(),
            proc_name: proc_name.into(),
            index: 0,
        }
    }

    /// The id of the `index`-th `child_name` spawned by this instance.
    pub fn child(&self, child_name: impl Into<String>, index: u32) -> Self {
        let mut stack = self.stack.clone();
        stack.push(ProcFrame {
            proc_name: self.proc_name.clone(),
            instance: self.index,
        });
        Self {
            stack,
            proc_name: child_name.into(),
            index,
        }
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }
}

impl fmt::Display for ProcId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for frame in &self.stack {
            write!(f, "{}#{}->", frame.proc_name, frame.instance)?;
        }
        write!(f, "{}#{}", self.proc_name, self.index)
    }
}

/// Ids serialize as their rendered path so they can key JSON objects.
impl Serialize for ProcId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_ids_extend_the_stack() {
        let root = ProcId::root("test_proc");
        let first = root.child("first_level_proc", 0);
        let second = first.child("second_level_proc", 1);
        assert_eq!(root.to_string(), "test_proc#0");
        assert_eq!(
            second.to_string(),
            "test_proc#0->first_level_proc#0->second_level_proc#1"
        );
        assert_eq!(second.depth(), 2);
    }

    #[test]
    fn test_siblings_are_distinct() {
        let parent = ProcId::root("p");
        assert_ne!(parent.child("c", 0), parent.child("c", 1));
        assert_ne!(parent.child("c", 0), parent.child("d", 0));
    }
}
