//! Element tree — the nested node structure behind one builder page.
//!
//! DESIGN
//! ======
//! A page owns an ordered `Vec<BuilderElement>`; each element owns its
//! children outright, so the tree is a strict hierarchy with no shared or
//! back-referenced nodes. The three public transforms take the tree by value
//! and hand it back, moving untouched siblings instead of cloning them.
//!
//! The transforms are total: an unmatched id leaves the tree as it was.
//! `try_insert` exists for callers that need to know the insert landed;
//! `insert_under_parent` keeps the silent-drop behavior on top of it.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Untyped key/value bag owned by one element.
pub type Data = serde_json::Map<String, serde_json::Value>;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    Header,
    Footer,
    Section,
    Text,
    Image,
    Video,
    Button,
    Form,
    Custom,
}

impl ElementType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Header => "header",
            Self::Footer => "footer",
            Self::Section => "section",
            Self::Text => "text",
            Self::Image => "image",
            Self::Video => "video",
            Self::Button => "button",
            Self::Form => "form",
            Self::Custom => "custom",
        }
    }
}

/// One node of a page's element tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuilderElement {
    pub id: String,
    #[serde(rename = "type")]
    pub element_type: ElementType,
    #[serde(default)]
    pub content: Data,
    #[serde(default)]
    pub styles: Data,
    #[serde(default)]
    pub props: Data,
    /// Absent and empty are distinct: a leaf that never had children
    /// serializes without the field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<BuilderElement>>,
}

impl BuilderElement {
    /// Empty element with a freshly generated id.
    #[must_use]
    pub fn new(element_type: ElementType) -> Self {
        Self::with_id(new_element_id(), element_type)
    }

    #[must_use]
    pub fn with_id(id: impl Into<String>, element_type: ElementType) -> Self {
        Self {
            id: id.into(),
            element_type,
            content: Data::new(),
            styles: Data::new(),
            props: Data::new(),
            children: None,
        }
    }

    #[must_use]
    pub fn with_children(mut self, children: Vec<BuilderElement>) -> Self {
        self.children = Some(children);
        self
    }

    fn apply(&mut self, patch: &ElementPatch) {
        if let Some(element_type) = patch.element_type {
            self.element_type = element_type;
        }
        if let Some(content) = &patch.content {
            self.content = content.clone();
        }
        if let Some(styles) = &patch.styles {
            self.styles = styles.clone();
        }
        if let Some(props) = &patch.props {
            self.props = props.clone();
        }
        if let Some(children) = &patch.children {
            self.children = Some(children.clone());
        }
    }
}

/// Partial update for one element. Present fields replace the element's
/// field wholesale; bags are not deep-merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementPatch {
    #[serde(default, rename = "type")]
    pub element_type: Option<ElementType>,
    #[serde(default)]
    pub content: Option<Data>,
    #[serde(default)]
    pub styles: Option<Data>,
    #[serde(default)]
    pub props: Option<Data>,
    #[serde(default)]
    pub children: Option<Vec<BuilderElement>>,
}

impl ElementPatch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.element_type.is_none()
            && self.content.is_none()
            && self.styles.is_none()
            && self.props.is_none()
            && self.children.is_none()
    }
}

#[must_use]
pub fn new_element_id() -> String {
    format!("element-{}", Uuid::new_v4().simple())
}

// =============================================================================
// INSERT
// =============================================================================

/// Append `node` at the root (`parent_id == None`) or as the last child of
/// the element with id `parent_id`. When no such parent exists the tree is
/// returned unchanged and `node` is dropped.
#[must_use]
pub fn insert_under_parent(
    mut tree: Vec<BuilderElement>,
    node: BuilderElement,
    parent_id: Option<&str>,
) -> Vec<BuilderElement> {
    let _ = try_insert(&mut tree, node, parent_id);
    tree
}

/// Same placement as [`insert_under_parent`], in place.
///
/// # Errors
///
/// Returns the node back when `parent_id` names no element in the tree.
pub fn try_insert(
    tree: &mut Vec<BuilderElement>,
    node: BuilderElement,
    parent_id: Option<&str>,
) -> Result<(), BuilderElement> {
    let Some(parent_id) = parent_id else {
        tree.push(node);
        return Ok(());
    };

    let mut slot = Some(node);
    place_under(tree, &mut slot, parent_id);
    match slot {
        None => Ok(()),
        Some(node) => Err(node),
    }
}

fn place_under(elements: &mut [BuilderElement], slot: &mut Option<BuilderElement>, parent_id: &str) {
    for element in elements {
        if slot.is_none() {
            return;
        }
        if element.id == parent_id {
            if let Some(node) = slot.take() {
                element.children.get_or_insert_with(Vec::new).push(node);
            }
            return;
        }
        if let Some(children) = element.children.as_mut() {
            place_under(children, slot, parent_id);
        }
    }
}

// =============================================================================
// UPDATE
// =============================================================================

/// Shallow-merge `patch` into the element with id `element_id`.
/// An unmatched id returns the tree unchanged.
#[must_use]
pub fn update_in_tree(mut tree: Vec<BuilderElement>, element_id: &str, patch: &ElementPatch) -> Vec<BuilderElement> {
    let _ = try_update(&mut tree, element_id, patch);
    tree
}

/// In-place variant of [`update_in_tree`]. Returns whether an element matched.
pub fn try_update(elements: &mut [BuilderElement], element_id: &str, patch: &ElementPatch) -> bool {
    for element in elements {
        if element.id == element_id {
            element.apply(patch);
            return true;
        }
        if let Some(children) = element.children.as_mut() {
            if try_update(children, element_id, patch) {
                return true;
            }
        }
    }
    false
}

// =============================================================================
// DELETE
// =============================================================================

/// Remove every element with id `element_id`, at any depth, along with its
/// subtree. Removing an id that is already gone is a no-op.
#[must_use]
pub fn delete_from_tree(mut tree: Vec<BuilderElement>, element_id: &str) -> Vec<BuilderElement> {
    remove_in_place(&mut tree, element_id);
    tree
}

/// In-place variant of [`delete_from_tree`]. Returns the number of nodes
/// removed, subtrees included.
pub fn remove_in_place(elements: &mut Vec<BuilderElement>, element_id: &str) -> usize {
    let before = count_nodes(elements);
    elements.retain(|element| element.id != element_id);
    for element in elements.iter_mut() {
        if let Some(children) = element.children.as_mut() {
            remove_in_place(children, element_id);
        }
    }
    before - count_nodes(elements)
}

// =============================================================================
// QUERIES
// =============================================================================

#[must_use]
pub fn find<'a>(elements: &'a [BuilderElement], element_id: &str) -> Option<&'a BuilderElement> {
    for element in elements {
        if element.id == element_id {
            return Some(element);
        }
        if let Some(found) = element.children.as_deref().and_then(|c| find(c, element_id)) {
            return Some(found);
        }
    }
    None
}

#[must_use]
pub fn contains(elements: &[BuilderElement], element_id: &str) -> bool {
    find(elements, element_id).is_some()
}

/// Total number of elements in the tree, at every depth.
#[must_use]
pub fn count_nodes(elements: &[BuilderElement]) -> usize {
    elements
        .iter()
        .map(|element| 1 + count_descendants(element))
        .sum()
}

#[must_use]
pub fn count_descendants(element: &BuilderElement) -> usize {
    element.children.as_deref().map_or(0, count_nodes)
}

#[cfg(test)]
#[path = "tree_test.rs"]
mod tests;
