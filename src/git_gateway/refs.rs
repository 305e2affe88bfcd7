//! Ref and blob operations.
//!
//! The metadata store keeps each payload as a blob addressed by a synthetic
//! ref, so writes here are two steps: hash the content into a blob, then
//! point the ref at it. The ref update is the atomic part.

use anyhow::Result;

use super::{ExpectedRef, GitGateway, Oid};

impl GitGateway {
    /// Read a ref's direct target, if the ref exists.
    pub fn read_ref(&self, name: &str) -> Result<Option<Oid>> {
        self.backend().find_reference(name)
    }

    /// Create or update a ref. `expected` makes the update a compare-and-swap
    /// on the current target.
    pub fn write_ref(&self, name: &str, target: &Oid, expected: &ExpectedRef) -> Result<()> {
        self.backend()
            .update_reference(name, target, expected, &format!("stackit: update {}", name))
    }

    /// Delete a ref; succeeds when the ref is already absent.
    pub fn delete_ref(&self, name: &str) -> Result<()> {
        self.backend().delete_reference(name)
    }

    /// All refs under a prefix, with their targets.
    pub fn list_refs(&self, prefix: &str) -> Result<Vec<(String, Oid)>> {
        let pattern = format!("{}*", prefix);
        self.backend().list_references(&pattern)
    }

    /// Hash content into the object database, returning the blob oid.
    pub fn hash_object(&self, content: &[u8]) -> Result<Oid> {
        self.backend().create_blob(content)
    }

    pub fn read_blob(&self, oid: &Oid) -> Result<Vec<u8>> {
        self.backend().read_blob(oid)
    }

    /// Write `content` as a blob and point `name` at it in one logical step.
    /// The previous payload stays intact if either step fails.
    pub fn write_blob_ref(&self, name: &str, content: &[u8], expected: &ExpectedRef) -> Result<Oid> {
        let blob = self.hash_object(content)?;
        self.write_ref(name, &blob, expected)?;
        Ok(blob)
    }
}
