//! Page and display element abstractions.
//!
//! The refresher only needs two things from its host: the page address and
//! an element whose source it can overwrite. [`HeadlessPage`] provides both
//! in-process so the refresher can run without a browser.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// An image-capable element whose source can be reassigned.
pub trait DisplayElement: Send + Sync {
    /// Point the element at `source`. The host fetches it.
    fn set_source(&self, source: &str);

    fn source(&self) -> Option<String>;
}

/// The document hosting the refresher.
pub trait Page {
    /// Full address the page was served at.
    fn address(&self) -> &str;

    fn element_by_id(&self, id: &str) -> Option<Arc<dyn DisplayElement>>;
}

/// Headless image element recording its current source.
#[derive(Debug)]
pub struct ImageElement {
    id: String,
    source: Mutex<Option<String>>,
    assignments: AtomicU64,
}

impl ImageElement {
    pub fn new(id: impl Into<String>) -> Self {
        ImageElement {
            id: id.into(),
            source: Mutex::new(None),
            assignments: AtomicU64::new(0),
        }
    }

    /// Number of source assignments received so far.
    pub fn assignments(&self) -> u64 {
        self.assignments.load(Ordering::Relaxed)
    }
}

impl DisplayElement for ImageElement {
    fn set_source(&self, source: &str) {
        tracing::debug!("Element '{}' source set to {}", self.id, source);
        let mut current = self.source.lock().unwrap_or_else(PoisonError::into_inner);
        *current = Some(source.to_string());
        self.assignments.fetch_add(1, Ordering::Relaxed);
    }

    fn source(&self) -> Option<String> {
        self.source
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// In-process page: an address plus id-addressable image elements.
#[derive(Debug, Default)]
pub struct HeadlessPage {
    address: String,
    elements: HashMap<String, Arc<ImageElement>>,
}

impl HeadlessPage {
    pub fn new(address: impl Into<String>) -> Self {
        HeadlessPage {
            address: address.into(),
            elements: HashMap::new(),
        }
    }

    /// Add an image element, replacing any element already using `id`.
    pub fn insert_image(&mut self, id: impl Into<String>) -> Arc<ImageElement> {
        let id = id.into();
        let element = Arc::new(ImageElement::new(id.clone()));
        self.elements.insert(id, Arc::clone(&element));
        element
    }

    pub fn image(&self, id: &str) -> Option<Arc<ImageElement>> {
        self.elements.get(id).cloned()
    }
}

impl Page for HeadlessPage {
    fn address(&self) -> &str {
        &self.address
    }

    fn element_by_id(&self, id: &str) -> Option<Arc<dyn DisplayElement>> {
        self.elements
            .get(id)
            .map(|element| Arc::clone(element) as Arc<dyn DisplayElement>)
    }
}
