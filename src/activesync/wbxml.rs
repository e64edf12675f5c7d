//! In-process surface of the WBXML codec.
//!
//! The binary encoding itself lives in the transport. This module only
//! models the decoded element tree, a [`Writer`] for building requests, and
//! an [`EventParser`] that fires handlers on tag paths while walking a
//! response.

use std::fmt;

use crate::error::{Result, SyncError};

/// Code page in the high byte, token in the low byte.
pub type Tag = u16;

pub const fn tag(page: u8, token: u8) -> Tag {
    ((page as u16) << 8) | token as u16
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub tag: Tag,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(tag: Tag) -> Self {
        Self {
            tag,
            children: Vec::new(),
        }
    }

    pub fn with_text(tag: Tag, text: impl Into<String>) -> Self {
        Self {
            tag,
            children: vec![Node::Text(text.into())],
        }
    }

    /// Builder-style child append.
    pub fn child(mut self, child: Element) -> Self {
        self.children.push(Node::Element(child));
        self
    }

    /// Text of the first child, if it is a text node.
    pub fn text(&self) -> Option<&str> {
        match self.children.first() {
            Some(Node::Text(text)) => Some(text),
            _ => None,
        }
    }

    /// Like [`Element::text`] but a missing value is an error.
    pub fn required_text(&self) -> Result<&str> {
        self.text().ok_or_else(|| {
            SyncError::parse(format!("tag {:#06x}", self.tag), "expected a text value")
        })
    }

    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    pub fn find(&self, tag: Tag) -> Option<&Element> {
        self.elements().find(|e| e.tag == tag)
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{:#06x}>", self.tag)?;
        for child in &self.children {
            match child {
                Node::Element(e) => write!(f, "{e}")?,
                Node::Text(t) => f.write_str(t)?,
            }
        }
        write!(f, "</{:#06x}>", self.tag)
    }
}

/// Builds a request document with `stag`/`tag`/`etag` calls.
#[derive(Debug, Default)]
pub struct Writer {
    open: Vec<Element>,
    root: Option<Element>,
}

impl Writer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open an element; following calls add children until [`Writer::etag`].
    pub fn stag(&mut self, tag: Tag) -> &mut Self {
        self.open.push(Element::new(tag));
        self
    }

    /// Empty element.
    pub fn tag(&mut self, tag: Tag) -> &mut Self {
        self.append(Element::new(tag))
    }

    pub fn tag_text(&mut self, tag: Tag, text: impl Into<String>) -> &mut Self {
        self.append(Element::with_text(tag, text))
    }

    /// Close the innermost open element.
    pub fn etag(&mut self) -> &mut Self {
        if let Some(done) = self.open.pop() {
            self.append(done);
        }
        self
    }

    /// The finished document. Fails if elements are still open or nothing
    /// was written.
    pub fn finish(self) -> Result<Element> {
        if !self.open.is_empty() {
            return Err(SyncError::parse("wbxml request", "unclosed element"));
        }
        self.root
            .ok_or_else(|| SyncError::parse("wbxml request", "empty document"))
    }

    fn append(&mut self, element: Element) -> &mut Self {
        match self.open.last_mut() {
            Some(parent) => parent.children.push(Node::Element(element)),
            None => self.root = Some(element),
        }
        self
    }
}

/// One step of a listener path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathStep {
    Tag(Tag),
    /// Matches any of these tags.
    AnyOf(Vec<Tag>),
}

impl PathStep {
    fn matches(&self, tag: Tag) -> bool {
        match self {
            Self::Tag(t) => *t == tag,
            Self::AnyOf(tags) => tags.contains(&tag),
        }
    }
}

impl From<Tag> for PathStep {
    fn from(tag: Tag) -> Self {
        Self::Tag(tag)
    }
}

type Handler<'a, S> = Box<dyn FnMut(&mut S, &Element) -> Result<()> + 'a>;

/// Fires handlers for elements whose full tag path matches.
pub struct EventParser<'a, S> {
    listeners: Vec<(Vec<PathStep>, Handler<'a, S>)>,
}

impl<S> Default for EventParser<'_, S> {
    fn default() -> Self {
        Self {
            listeners: Vec::new(),
        }
    }
}

impl<'a, S> EventParser<'a, S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener<F>(&mut self, path: Vec<PathStep>, handler: F)
    where
        F: FnMut(&mut S, &Element) -> Result<()> + 'a,
    {
        self.listeners.push((path, Box::new(handler)));
    }

    /// Walk `root` depth first. Handler errors stop the walk.
    pub fn run(&mut self, root: &Element, state: &mut S) -> Result<()> {
        let mut path = Vec::new();
        self.visit(root, &mut path, state)
    }

    fn visit(&mut self, element: &Element, path: &mut Vec<Tag>, state: &mut S) -> Result<()> {
        path.push(element.tag);
        for (steps, handler) in &mut self.listeners {
            let matched = steps.len() == path.len()
                && steps.iter().zip(path.iter()).all(|(s, t)| s.matches(*t));
            if matched {
                handler(state, element)?;
            }
        }
        for child in element.elements() {
            self.visit(child, path, state)?;
        }
        path.pop();
        Ok(())
    }
}
