use crate::checks::content::{
    ContentDepthCheck, H1Check, HeadingHierarchyCheck, MetaDescriptionCheck, TitleCheck,
};
use crate::checks::links::LinksCheck;
use crate::checks::media::ImageAltCheck;
use crate::checks::technical::{CanonicalCheck, PageWeightCheck, RobotsCheck, StructuredDataCheck};
use crate::checks::Check;
use crate::config::ChecksConfig;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("check '{0}' is already registered")]
    DuplicateId(String),
}

/// A registered check and its weight in the overall score
#[derive(Clone)]
pub struct Registration {
    pub check: Arc<dyn Check>,
    pub weight: u32,
}

impl Registration {
    pub fn id(&self) -> &str {
        self.check.id()
    }
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("id", &self.id())
            .field("weight", &self.weight)
            .finish()
    }
}

/// Ordered set of checks
///
/// Registration order is the order results are reported in. Adding a check
/// is a [`register`](Self::register) call; the engine never changes.
#[derive(Debug, Clone, Default)]
pub struct CheckRegistry {
    entries: Vec<Registration>,
}

impl CheckRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in checks, in their canonical order, with weights summing to 100
    pub fn with_defaults(config: &ChecksConfig) -> Self {
        let defaults: Vec<(Arc<dyn Check>, u32)> = vec![
            (Arc::new(TitleCheck::new(config)), 15),
            (Arc::new(MetaDescriptionCheck::new(config)), 15),
            (Arc::new(H1Check), 10),
            (Arc::new(HeadingHierarchyCheck), 5),
            (Arc::new(ImageAltCheck), 10),
            (Arc::new(LinksCheck), 10),
            (Arc::new(CanonicalCheck), 10),
            (Arc::new(RobotsCheck::new(config)), 5),
            (Arc::new(PageWeightCheck::new(config)), 5),
            (Arc::new(StructuredDataCheck), 5),
            (Arc::new(ContentDepthCheck::new(config)), 10),
        ];

        Self {
            entries: defaults
                .into_iter()
                .map(|(check, weight)| Registration { check, weight })
                .collect(),
        }
    }

    /// Appends a check; fails if its id is taken
    pub fn register<C: Check + 'static>(&mut self, check: C, weight: u32) -> Result<(), RegistryError> {
        self.register_arc(Arc::new(check), weight)
    }

    pub fn register_arc(&mut self, check: Arc<dyn Check>, weight: u32) -> Result<(), RegistryError> {
        if self.contains(check.id()) {
            return Err(RegistryError::DuplicateId(check.id().to_string()));
        }
        self.entries.push(Registration { check, weight });
        Ok(())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.iter().any(|r| r.id() == id)
    }

    pub fn weight(&self, id: &str) -> Option<u32> {
        self.entries.iter().find(|r| r.id() == id).map(|r| r.weight)
    }

    /// Check ids in registration order
    pub fn ids(&self) -> Vec<String> {
        self.entries.iter().map(|r| r.id().to_string()).collect()
    }

    /// `(id, weight)` pairs in registration order
    pub fn weights(&self) -> Vec<(String, u32)> {
        self.entries
            .iter()
            .map(|r| (r.id().to_string(), r.weight))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Registration> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
