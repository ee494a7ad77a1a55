// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Identifier indexes.
//!
//! An index is a named, deduplicated list of identifiers persisted as a
//! JSON array under `"{repoName}_{indexName}"`. Indexes never touch the
//! local cache; every operation is a direct store round trip.
//!
//! # Consistency
//!
//! Mutations are read-modify-write: fetch the array, change it in memory,
//! write the whole array back. The store offers no compare-and-swap over
//! a multiplexed connection, so two concurrent mutations of the same
//! index can interleave and the second write wins; the first caller's
//! change is silently lost. Within a single writer the protocol is
//! read-your-own-write consistent. Keep high-contention index mutation
//! behind a single writer, or derive membership some other way.
//!
//! Index names share the `"{repoName}_"` key namespace with entities, so
//! an index name that parses as an identifier would collide with an
//! entity key. Pick names that do not look like ids.

use std::fmt::Display;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use super::{RepoError, Repository};
use crate::metrics;

impl<T, I> Repository<T, I>
where
    T: Serialize + DeserializeOwned,
    I: Display + FromStr + Eq,
{
    fn index_key(&self, index: &str) -> String {
        format!("{}_{}", self.name, index)
    }

    async fn read_members(&self, key: &str) -> Result<Vec<String>, RepoError> {
        match self.store.get(key).await? {
            Some(payload) => Ok(serde_json::from_slice(&payload)?),
            None => Ok(Vec::new()),
        }
    }

    async fn write_members(&self, key: &str, members: &[String]) -> Result<(), RepoError> {
        let payload = serde_json::to_vec(members)?;
        self.store.set(key, &payload, None).await?;
        Ok(())
    }

    /// Fetch the members of an index. A missing index is an empty one,
    /// not an error.
    ///
    /// Members that no longer parse as identifiers are skipped.
    pub async fn get_index(&self, index: &str) -> Result<Vec<I>, RepoError> {
        let members = self.read_members(&self.index_key(index)).await?;

        let mut ids = Vec::with_capacity(members.len());
        for member in members {
            match member.parse::<I>() {
                Ok(id) => ids.push(id),
                Err(_) => {
                    warn!(repo = %self.name, index = %index, member = %member,
                        "skipping index member that does not parse as an identifier");
                }
            }
        }
        Ok(ids)
    }

    /// Add an identifier to an index. Adding an id that is already a
    /// member is a no-op, so repeated calls cannot duplicate it.
    ///
    /// The update is read-modify-write without compare-and-swap: two
    /// concurrent mutations of one index can interleave, and the second
    /// write wins. Keep writers of a contended index behind a single
    /// task.
    pub async fn add_to_index(&self, index: &str, id: &I) -> Result<(), RepoError> {
        let key = self.index_key(index);
        let mut members = self.read_members(&key).await?;

        let present = members
            .iter()
            .any(|member| member.parse::<I>().is_ok_and(|parsed| parsed == *id));
        if present {
            metrics::record_index_op("add", "noop");
            return Ok(());
        }

        members.push(id.to_string());
        self.write_members(&key, &members).await?;
        metrics::record_index_op("add", "applied");
        debug!(repo = %self.name, index = %index, id = %id, members = members.len(),
            "added id to index");
        Ok(())
    }

    /// Remove an identifier from an index. When the id is not a member,
    /// nothing is written back. Same read-modify-write caveat as
    /// [`add_to_index`](Repository::add_to_index).
    pub async fn remove_from_index(&self, index: &str, id: &I) -> Result<(), RepoError> {
        let key = self.index_key(index);
        let members = self.read_members(&key).await?;

        let remaining: Vec<String> = members
            .iter()
            .filter(|member| !member.parse::<I>().is_ok_and(|parsed| parsed == *id))
            .cloned()
            .collect();
        if remaining.len() == members.len() {
            metrics::record_index_op("remove", "noop");
            return Ok(());
        }

        self.write_members(&key, &remaining).await?;
        metrics::record_index_op("remove", "applied");
        debug!(repo = %self.name, index = %index, id = %id, members = remaining.len(),
            "removed id from index");
        Ok(())
    }

    /// Reset an index to empty. Clearing an index that does not exist is
    /// not an error.
    pub async fn clear_index(&self, index: &str) -> Result<(), RepoError> {
        self.store.delete(&self.index_key(index)).await?;
        metrics::record_index_op("clear", "applied");
        Ok(())
    }

    /// Retire an index outright. Same store effect as [`clear_index`];
    /// the name states the intent.
    ///
    /// [`clear_index`]: Repository::clear_index
    pub async fn delete_index(&self, index: &str) -> Result<(), RepoError> {
        self.store.delete(&self.index_key(index)).await?;
        metrics::record_index_op("delete", "applied");
        Ok(())
    }
}
