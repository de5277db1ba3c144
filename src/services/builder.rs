//! Builder service — pages and their element trees.
//!
//! DESIGN
//! ======
//! Pages live in memory keyed by id. Element mutations go through the pure
//! transforms in `crate::tree`, applied to the page's owned tree under the
//! write lock. Unlike the bare tree utilities, the service reports a missing
//! parent or element back to the caller instead of silently ignoring it.
//!
//! Publishing stands in for a deploy: it awaits the simulator with the lock
//! released and re-checks the page afterwards.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::ErrorCode;
use crate::state::AppState;
use crate::tree::{self, BuilderElement, Data, ElementPatch, ElementType};
use crate::util::{now_ms, slugify, unique_slug};

pub const EXPORT_FORMAT: &str = "siteconsole.page";
pub const EXPORT_VERSION: u32 = 1;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum BuilderError {
    #[error("page not found: {0}")]
    PageNotFound(Uuid),
    #[error("element not found: {0}")]
    ElementNotFound(String),
    #[error("parent element not found: {0}")]
    ParentNotFound(String),
    #[error("slug already in use: {0}")]
    SlugTaken(String),
    #[error("invalid page: {0}")]
    Invalid(String),
    #[error("publish failed for page {0}")]
    PublishFailed(Uuid),
}

impl ErrorCode for BuilderError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::PageNotFound(_) => "E_PAGE_NOT_FOUND",
            Self::ElementNotFound(_) => "E_ELEMENT_NOT_FOUND",
            Self::ParentNotFound(_) => "E_PARENT_NOT_FOUND",
            Self::SlugTaken(_) => "E_SLUG_TAKEN",
            Self::Invalid(_) => "E_INVALID_PAGE",
            Self::PublishFailed(_) => "E_PUBLISH_FAILED",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::PublishFailed(_))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageSeo {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuilderPage {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub elements: Vec<BuilderElement>,
    pub published: bool,
    pub seo: PageSeo,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PagePatch {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub seo: Option<PageSeo>,
}

/// Request to add one element. Missing bags take the type's defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct ElementDraft {
    #[serde(rename = "type")]
    pub element_type: ElementType,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub content: Option<Data>,
    #[serde(default)]
    pub styles: Option<Data>,
    #[serde(default)]
    pub props: Option<Data>,
}

impl ElementDraft {
    #[must_use]
    pub fn new(element_type: ElementType) -> Self {
        Self { element_type, parent_id: None, content: None, styles: None, props: None }
    }

    #[must_use]
    pub fn under(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }
}

/// Portable page document produced by `export_page`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageExport {
    pub format: String,
    pub version: u32,
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub seo: PageSeo,
    #[serde(default)]
    pub elements: Vec<BuilderElement>,
}

// =============================================================================
// DEFAULT ELEMENTS
// =============================================================================

fn bag(value: serde_json::Value) -> Data {
    match value {
        serde_json::Value::Object(map) => map,
        _ => Data::new(),
    }
}

/// A fresh element of `element_type` with the starter content the editor
/// shows before the user customizes it.
#[must_use]
pub fn default_element(element_type: ElementType) -> BuilderElement {
    let (content, styles) = match element_type {
        ElementType::Header => (
            json!({"title": "Your Site", "links": ["Home", "About", "Contact"]}),
            json!({"padding": "16px 24px", "display": "flex", "justifyContent": "space-between"}),
        ),
        ElementType::Footer => (json!({"text": "© Your Site. All rights reserved."}), json!({"padding": "24px"})),
        ElementType::Section => (json!({}), json!({"padding": "48px 24px"})),
        ElementType::Text => (json!({"text": "Edit this text"}), json!({"fontSize": "16px"})),
        ElementType::Image => (json!({"src": "", "alt": ""}), json!({"maxWidth": "100%"})),
        ElementType::Video => (json!({"src": "", "autoplay": false, "controls": true}), json!({"width": "100%"})),
        ElementType::Button => (json!({"text": "Click me", "href": "#"}), json!({"padding": "12px 20px"})),
        ElementType::Form => (
            json!({
                "fields": [{"name": "email", "type": "email", "label": "Email", "required": true}],
                "submitText": "Submit"
            }),
            json!({"display": "grid", "gap": "12px"}),
        ),
        ElementType::Custom => (json!({"html": ""}), json!({})),
    };

    let mut element = BuilderElement::new(element_type);
    element.content = bag(content);
    element.styles = bag(styles);
    element
}

// =============================================================================
// PAGES
// =============================================================================

fn validate_name(name: &str) -> Result<String, BuilderError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(BuilderError::Invalid("page name is required".into()));
    }
    Ok(trimmed.to_owned())
}

fn normalize_slug(raw: &str) -> Result<String, BuilderError> {
    let slug = slugify(raw);
    if slug.is_empty() {
        return Err(BuilderError::Invalid(format!("slug {raw:?} has no usable characters")));
    }
    Ok(slug)
}

/// Create an empty page. The slug defaults to the slugified name.
///
/// # Errors
///
/// `Invalid` for an empty name or unusable slug, `SlugTaken` if another
/// page already uses the slug.
pub async fn create_page(state: &AppState, name: &str, slug: Option<&str>) -> Result<BuilderPage, BuilderError> {
    let name = validate_name(name)?;
    let slug = normalize_slug(slug.unwrap_or(&name))?;

    let mut pages = state.pages.write().await;
    if pages.values().any(|p| p.slug == slug) {
        return Err(BuilderError::SlugTaken(slug));
    }

    let now = now_ms();
    let page = BuilderPage {
        id: Uuid::new_v4(),
        name,
        slug,
        elements: Vec::new(),
        published: false,
        seo: PageSeo::default(),
        created_at: now,
        updated_at: now,
    };
    pages.insert(page.id, page.clone());
    info!(page_id = %page.id, slug = %page.slug, "page created");
    Ok(page)
}

/// All pages, oldest first.
pub async fn list_pages(state: &AppState) -> Vec<BuilderPage> {
    let pages = state.pages.read().await;
    let mut list: Vec<BuilderPage> = pages.values().cloned().collect();
    list.sort_by_key(|p| (p.created_at, p.id));
    list
}

/// # Errors
///
/// `PageNotFound` if no page has this id.
pub async fn get_page(state: &AppState, page_id: Uuid) -> Result<BuilderPage, BuilderError> {
    let pages = state.pages.read().await;
    pages
        .get(&page_id)
        .cloned()
        .ok_or(BuilderError::PageNotFound(page_id))
}

/// # Errors
///
/// `PageNotFound`, `Invalid`, or `SlugTaken` when the new slug collides.
pub async fn update_page(state: &AppState, page_id: Uuid, patch: PagePatch) -> Result<BuilderPage, BuilderError> {
    let name = patch.name.as_deref().map(validate_name).transpose()?;
    let slug = patch.slug.as_deref().map(normalize_slug).transpose()?;

    let mut pages = state.pages.write().await;
    if let Some(slug) = &slug {
        if pages.values().any(|p| p.id != page_id && &p.slug == slug) {
            return Err(BuilderError::SlugTaken(slug.clone()));
        }
    }

    let page = pages
        .get_mut(&page_id)
        .ok_or(BuilderError::PageNotFound(page_id))?;
    if let Some(name) = name {
        page.name = name;
    }
    if let Some(slug) = slug {
        page.slug = slug;
    }
    if let Some(seo) = patch.seo {
        page.seo = seo;
    }
    page.updated_at = now_ms();
    info!(%page_id, slug = %page.slug, "page updated");
    Ok(page.clone())
}

/// # Errors
///
/// `PageNotFound` if no page has this id.
pub async fn delete_page(state: &AppState, page_id: Uuid) -> Result<BuilderPage, BuilderError> {
    let mut pages = state.pages.write().await;
    let page = pages
        .remove(&page_id)
        .ok_or(BuilderError::PageNotFound(page_id))?;
    info!(%page_id, "page deleted");
    Ok(page)
}

/// Copy a page under a new id, name "<name> (copy)" and a free slug.
/// Element ids are kept: they only need to be unique within one page.
///
/// # Errors
///
/// `PageNotFound` if no page has this id.
pub async fn duplicate_page(state: &AppState, page_id: Uuid) -> Result<BuilderPage, BuilderError> {
    let mut pages = state.pages.write().await;
    let source = pages
        .get(&page_id)
        .cloned()
        .ok_or(BuilderError::PageNotFound(page_id))?;

    let taken: HashSet<String> = pages.values().map(|p| p.slug.clone()).collect();
    let now = now_ms();
    let copy = BuilderPage {
        id: Uuid::new_v4(),
        name: format!("{} (copy)", source.name),
        slug: unique_slug(&format!("{}-copy", source.slug), |s| taken.contains(s)),
        elements: source.elements,
        published: false,
        seo: source.seo,
        created_at: now,
        updated_at: now,
    };
    pages.insert(copy.id, copy.clone());
    info!(source_id = %page_id, page_id = %copy.id, "page duplicated");
    Ok(copy)
}

/// Publish or unpublish a page. Publishing round-trips the simulator;
/// unpublishing is immediate.
///
/// # Errors
///
/// `PageNotFound`, or `PublishFailed` when the simulated deploy fails.
pub async fn publish_page(state: &AppState, page_id: Uuid, published: bool) -> Result<BuilderPage, BuilderError> {
    if published {
        get_page(state, page_id).await?;
        let outcome = state.simulator.call().await;
        if !outcome.success {
            warn!(%page_id, latency_ms = outcome.latency_ms, "simulated publish failed");
            return Err(BuilderError::PublishFailed(page_id));
        }
    }

    let mut pages = state.pages.write().await;
    let page = pages
        .get_mut(&page_id)
        .ok_or(BuilderError::PageNotFound(page_id))?;
    page.published = published;
    page.updated_at = now_ms();
    info!(%page_id, published, "page publish state changed");
    Ok(page.clone())
}

// =============================================================================
// ELEMENTS
// =============================================================================

/// Add an element built from `draft` to a page, at the root or under
/// `draft.parent_id`.
///
/// # Errors
///
/// `PageNotFound`, or `ParentNotFound` when the parent id is not in the tree.
pub async fn add_element(state: &AppState, page_id: Uuid, draft: ElementDraft) -> Result<BuilderElement, BuilderError> {
    let mut element = default_element(draft.element_type);
    if let Some(content) = draft.content {
        element.content = content;
    }
    if let Some(styles) = draft.styles {
        element.styles = styles;
    }
    if let Some(props) = draft.props {
        element.props = props;
    }
    insert_element(state, page_id, element, draft.parent_id.as_deref()).await
}

/// Insert a fully formed element.
///
/// # Errors
///
/// `PageNotFound`, `ParentNotFound`, or `Invalid` when the element id (or
/// one in its subtree) already exists on the page.
pub async fn insert_element(
    state: &AppState,
    page_id: Uuid,
    element: BuilderElement,
    parent_id: Option<&str>,
) -> Result<BuilderElement, BuilderError> {
    let mut pages = state.pages.write().await;
    let page = pages
        .get_mut(&page_id)
        .ok_or(BuilderError::PageNotFound(page_id))?;

    if let Some(dup) = first_duplicate_id(&page.elements, &element) {
        return Err(BuilderError::Invalid(format!("element id already on page: {dup}")));
    }

    let inserted = element.clone();
    tree::try_insert(&mut page.elements, element, parent_id)
        .map_err(|_| BuilderError::ParentNotFound(parent_id.unwrap_or_default().to_owned()))?;
    page.updated_at = now_ms();

    info!(%page_id, element_id = %inserted.id, kind = inserted.element_type.as_str(), "element added");
    Ok(inserted)
}

fn first_duplicate_id(existing: &[BuilderElement], incoming: &BuilderElement) -> Option<String> {
    let mut ids = HashSet::new();
    collect_ids(existing, &mut ids);
    let mut stack = vec![incoming];
    while let Some(node) = stack.pop() {
        if !ids.insert(node.id.as_str()) {
            return Some(node.id.clone());
        }
        if let Some(children) = &node.children {
            stack.extend(children.iter());
        }
    }
    None
}

/// Ids outside `target`'s current subtree stay on the page after the patch,
/// so the new children may not reuse them.
fn first_colliding_child(
    elements: &[BuilderElement],
    target: &BuilderElement,
    children: &[BuilderElement],
) -> Option<String> {
    let mut ids = HashSet::new();
    collect_ids(elements, &mut ids);
    let mut replaced = HashSet::new();
    collect_ids(target.children.as_deref().unwrap_or_default(), &mut replaced);
    ids.retain(|id| !replaced.contains(id));

    let mut stack: Vec<&BuilderElement> = children.iter().collect();
    while let Some(node) = stack.pop() {
        if !ids.insert(node.id.as_str()) {
            return Some(node.id.clone());
        }
        if let Some(grandchildren) = &node.children {
            stack.extend(grandchildren.iter());
        }
    }
    None
}

fn collect_ids<'a>(elements: &'a [BuilderElement], ids: &mut HashSet<&'a str>) {
    for element in elements {
        ids.insert(element.id.as_str());
        if let Some(children) = &element.children {
            collect_ids(children, ids);
        }
    }
}

/// Replacement children in `patch` must not reuse an id found elsewhere on
/// the page or repeat one among themselves.
///
/// # Errors
///
/// `PageNotFound`, `ElementNotFound`, or `Invalid` on a colliding child id.
pub async fn update_element(
    state: &AppState,
    page_id: Uuid,
    element_id: &str,
    patch: &ElementPatch,
) -> Result<BuilderElement, BuilderError> {
    let mut pages = state.pages.write().await;
    let page = pages
        .get_mut(&page_id)
        .ok_or(BuilderError::PageNotFound(page_id))?;

    if let Some(children) = &patch.children {
        let target = tree::find(&page.elements, element_id)
            .ok_or_else(|| BuilderError::ElementNotFound(element_id.to_owned()))?;
        if let Some(dup) = first_colliding_child(&page.elements, target, children) {
            return Err(BuilderError::Invalid(format!("element id already on page: {dup}")));
        }
    }

    if !tree::try_update(&mut page.elements, element_id, patch) {
        return Err(BuilderError::ElementNotFound(element_id.to_owned()));
    }
    page.updated_at = now_ms();

    tree::find(&page.elements, element_id)
        .cloned()
        .ok_or_else(|| BuilderError::ElementNotFound(element_id.to_owned()))
}

/// Remove an element and its subtree. Returns how many nodes were removed.
///
/// # Errors
///
/// `PageNotFound` or `ElementNotFound`.
pub async fn delete_element(state: &AppState, page_id: Uuid, element_id: &str) -> Result<usize, BuilderError> {
    let mut pages = state.pages.write().await;
    let page = pages
        .get_mut(&page_id)
        .ok_or(BuilderError::PageNotFound(page_id))?;

    let removed = tree::remove_in_place(&mut page.elements, element_id);
    if removed == 0 {
        return Err(BuilderError::ElementNotFound(element_id.to_owned()));
    }
    page.updated_at = now_ms();
    info!(%page_id, %element_id, removed, "element deleted");
    Ok(removed)
}

// =============================================================================
// EXPORT / IMPORT
// =============================================================================

/// # Errors
///
/// `PageNotFound` if no page has this id.
pub async fn export_page(state: &AppState, page_id: Uuid) -> Result<PageExport, BuilderError> {
    let page = get_page(state, page_id).await?;
    Ok(PageExport {
        format: EXPORT_FORMAT.to_owned(),
        version: EXPORT_VERSION,
        name: page.name,
        slug: page.slug,
        seo: page.seo,
        elements: page.elements,
    })
}

/// Create a new, unpublished page from an exported document. A colliding
/// slug gets a numeric suffix rather than failing the import.
///
/// # Errors
///
/// `Invalid` for an unknown format/version, empty name, or duplicate
/// element ids inside the document.
pub async fn import_page(state: &AppState, doc: PageExport) -> Result<BuilderPage, BuilderError> {
    if doc.format != EXPORT_FORMAT || doc.version != EXPORT_VERSION {
        return Err(BuilderError::Invalid(format!("unsupported document {} v{}", doc.format, doc.version)));
    }
    let name = validate_name(&doc.name)?;
    let base_slug = normalize_slug(if doc.slug.trim().is_empty() { &name } else { &doc.slug })?;

    let mut seen = HashSet::new();
    if let Some(dup) = doc
        .elements
        .iter()
        .find_map(|root| first_duplicate_id_in(root, &mut seen))
    {
        return Err(BuilderError::Invalid(format!("duplicate element id: {dup}")));
    }

    let mut pages = state.pages.write().await;
    let taken: HashSet<String> = pages.values().map(|p| p.slug.clone()).collect();
    let now = now_ms();
    let page = BuilderPage {
        id: Uuid::new_v4(),
        name,
        slug: unique_slug(&base_slug, |s| taken.contains(s)),
        elements: doc.elements,
        published: false,
        seo: doc.seo,
        created_at: now,
        updated_at: now,
    };
    pages.insert(page.id, page.clone());
    info!(page_id = %page.id, nodes = tree::count_nodes(&page.elements), "page imported");
    Ok(page)
}

fn first_duplicate_id_in(node: &BuilderElement, seen: &mut HashSet<String>) -> Option<String> {
    if !seen.insert(node.id.clone()) {
        return Some(node.id.clone());
    }
    node.children
        .as_deref()
        .unwrap_or_default()
        .iter()
        .find_map(|child| first_duplicate_id_in(child, seen))
}

#[cfg(test)]
#[path = "builder_test.rs"]
mod tests;
