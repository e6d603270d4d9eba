//! Ordered photo identifiers owned by a parent record (a visit).

use serde::{Deserialize, Serialize};

use crate::batch::BatchReport;
use crate::blob_store::ContentId;
use crate::error::PhotoResult;

/// Ordered list of blob identifiers held by one record.
///
/// Serializes as a plain list of identifier strings. Deleting the owning
/// record should go through
/// [`PhotoPipeline::delete_photos`](crate::PhotoPipeline::delete_photos).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhotoReference {
    ids: Vec<ContentId>,
}

impl PhotoReference {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse identifiers stored as opaque strings by the record model
    pub fn parse<S: AsRef<str>>(values: &[S]) -> PhotoResult<Self> {
        let ids = values
            .iter()
            .map(|v| v.as_ref().parse())
            .collect::<PhotoResult<Vec<ContentId>>>()?;
        Ok(Self { ids })
    }

    /// Identifiers as strings, for the record model
    pub fn to_strings(&self) -> Vec<String> {
        self.ids.iter().map(ContentId::to_string).collect()
    }

    pub fn push(&mut self, id: ContentId) {
        self.ids.push(id);
    }

    /// Append every successfully stored id of a batch, in input order
    pub fn extend_from_report(&mut self, report: &BatchReport<ContentId>) {
        self.ids.extend(report.successes().map(|(_, id)| *id));
    }

    /// Remove `id`; returns whether it was present
    pub fn remove(&mut self, id: &ContentId) -> bool {
        let before = self.ids.len();
        self.ids.retain(|existing| existing != id);
        self.ids.len() != before
    }

    pub fn ids(&self) -> &[ContentId] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl From<Vec<ContentId>> for PhotoReference {
    fn from(ids: Vec<ContentId>) -> Self {
        Self { ids }
    }
}

impl FromIterator<ContentId> for PhotoReference {
    fn from_iter<T: IntoIterator<Item = ContentId>>(iter: T) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a PhotoReference {
    type Item = &'a ContentId;
    type IntoIter = std::slice::Iter<'a, ContentId>;

    fn into_iter(self) -> Self::IntoIter {
        self.ids.iter()
    }
}
