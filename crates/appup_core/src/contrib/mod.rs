//! Contribution registry for declarative extension documents.
//!
//! # Responsibility
//! - Parse `extension point="..."` documents contributed by modules.
//! - Index contributed element trees by extension-point identifier.
//!
//! # Invariants
//! - Contributions for one point keep registration order.
//! - A document that fails to parse leaves the registry unchanged.
//! - Elements are immutable once registered.

mod element;
mod error;

pub use element::{ContribElement, ContribOwner};
pub use error::{ContribError, ParseError};

use crate::registry::Service;
use log::{debug, info};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Registry name the runtime binds the contribution registry under.
pub const CONTRIB_REGISTRY_NAME: &str = "appup.contrib_registry";

const EXTENSION_TAG: &str = "extension";
const POINT_ATTRIBUTE: &str = "point";

/// Extension-point index shared by modules and the runtime.
#[derive(Debug, Default)]
pub struct ContribRegistry {
    points: RwLock<HashMap<String, Vec<Arc<ContribElement>>>>,
}

impl ContribRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `document` and appends its contributions.
    ///
    /// Returns the number of contributed top-level elements.
    pub fn register(&self, owner: Arc<ContribOwner>, document: &str) -> Result<usize, ParseError> {
        let parsed = roxmltree::Document::parse(document)
            .map_err(|err| ParseError::new(owner.id(), err))?;

        let mut contributed: Vec<(String, Vec<ContribElement>)> = Vec::new();
        for extension in parsed
            .descendants()
            .filter(|node| node.is_element() && node.tag_name().name() == EXTENSION_TAG)
        {
            let Some(point) = extension.attribute(POINT_ATTRIBUTE) else {
                debug!(
                    "event=contrib_register module=contrib status=skip owner={} reason=no_point",
                    owner.id()
                );
                continue;
            };
            contributed.push((point.to_string(), build_children(&owner, extension)));
        }

        let count = contributed.iter().map(|(_, elements)| elements.len()).sum();
        let mut points = self.points.write();
        for (point, elements) in contributed {
            points
                .entry(point)
                .or_default()
                .extend(elements.into_iter().map(Arc::new));
        }
        info!(
            "event=contrib_register module=contrib status=ok owner={} elements={count}",
            owner.id()
        );
        Ok(count)
    }

    /// Contributions for `point` in registration order; empty when unknown.
    pub fn contributions_for(&self, point: &str) -> Vec<Arc<ContribElement>> {
        self.points.read().get(point).cloned().unwrap_or_default()
    }

    /// Known extension-point identifiers, sorted.
    pub fn points(&self) -> Vec<String> {
        let mut points: Vec<String> = self.points.read().keys().cloned().collect();
        points.sort();
        points
    }
}

impl Service for ContribRegistry {}

fn build_children(owner: &Arc<ContribOwner>, parent: roxmltree::Node<'_, '_>) -> Vec<ContribElement> {
    parent
        .children()
        .filter(|node| node.is_element())
        .map(|node| {
            let attributes: BTreeMap<String, String> = node
                .attributes()
                .map(|attribute| (attribute.name().to_string(), attribute.value().to_string()))
                .collect();
            ContribElement::new(
                Arc::clone(owner),
                node.tag_name().name().to_string(),
                attributes,
                build_children(owner, node),
            )
        })
        .collect()
}
