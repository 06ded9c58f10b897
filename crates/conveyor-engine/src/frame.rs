use std::sync::Arc;

/// What kind of node an action is in the composition tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// A leaf doing real work.
    Action,
    /// A combinator that only orchestrates its children.
    Composite,
    /// A named, collapsible section of the platform log.
    Group,
}

/// One entry in the stack of running actions.
#[derive(Debug)]
pub struct Frame {
    name: String,
    kind: FrameKind,
    parent: Option<Arc<Frame>>,
}

impl Frame {
    pub fn new(name: impl Into<String>, kind: FrameKind, parent: Option<Arc<Frame>>) -> Self {
        Self {
            name: name.into(),
            kind,
            parent,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> FrameKind {
        self.kind
    }

    pub fn parent(&self) -> Option<&Arc<Frame>> {
        self.parent.as_ref()
    }

    pub fn depth(&self) -> usize {
        self.ancestors().count()
    }

    /// Nearest group frame strictly above this one.
    pub fn enclosing_group(&self) -> Option<&Frame> {
        self.ancestors().find(|frame| frame.kind == FrameKind::Group)
    }

    /// Names of the non-composite frames from the root down to this one.
    pub fn path(&self) -> String {
        let mut names: Vec<&str> = std::iter::once(self)
            .chain(self.ancestors())
            .filter(|frame| frame.kind != FrameKind::Composite)
            .map(|frame| frame.name.as_str())
            .collect();
        names.reverse();
        names.join(" > ")
    }

    fn ancestors(&self) -> impl Iterator<Item = &Frame> {
        std::iter::successors(self.parent.as_deref(), |frame| frame.parent.as_deref())
    }
}
