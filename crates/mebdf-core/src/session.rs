// SPDX-License-Identifier: AGPL-3.0-or-later
//! Session façade over a tree provider and a tree mutator
//!
//! Each call fetches a fresh snapshot, runs the converter and, for writes,
//! submits the resulting ops as one batch.

use crate::config::ConvertConfig;
use crate::reader::{export, ExportResult};
use crate::section::{export_section, get_hierarchy, import_section, HierarchyResult};
use crate::traits::{ConversionError, Result, TreeMutator, TreeProvider};
use crate::tree::{replay, Snapshot};
use crate::writer::{import, ImportResult, MutationBatch};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

pub struct Session<P: TreeProvider, M: TreeMutator> {
    provider: P,
    mutator: M,
    config: ConvertConfig,
}

impl<P: TreeProvider, M: TreeMutator> Session<P, M> {
    pub fn new(provider: P, mutator: M, config: ConvertConfig) -> Self {
        Self {
            provider,
            mutator,
            config,
        }
    }

    pub fn config(&self) -> &ConvertConfig {
        &self.config
    }

    pub fn hierarchy(&self, tab_id: &str) -> Result<HierarchyResult> {
        let snapshot = self.provider.snapshot(tab_id)?;
        Ok(get_hierarchy(&snapshot))
    }

    pub fn read(&self, tab_id: &str) -> Result<ExportResult> {
        let snapshot = self.provider.snapshot(tab_id)?;
        Ok(export(&snapshot, &self.config))
    }

    pub fn read_section(&self, tab_id: &str, anchor_id: &str) -> Result<ExportResult> {
        let snapshot = self.provider.snapshot(tab_id)?;
        export_section(&snapshot, anchor_id, &self.config)
    }

    /// Replace the whole tab with `text`
    pub fn write(&mut self, tab_id: &str, text: &str) -> Result<ImportResult> {
        let snapshot = self.provider.snapshot(tab_id)?;
        let result = import(&snapshot, text, &self.config)?;
        self.submit(tab_id, &result)?;
        Ok(result)
    }

    pub fn write_section(&mut self, tab_id: &str, anchor_id: &str, text: &str) -> Result<ImportResult> {
        let snapshot = self.provider.snapshot(tab_id)?;
        let result = import_section(&snapshot, anchor_id, text, &self.config)?;
        self.submit(tab_id, &result)?;
        Ok(result)
    }

    fn submit(&mut self, tab_id: &str, result: &ImportResult) -> Result<()> {
        if result.mutation_ops.is_empty() {
            tracing::debug!(tab_id, "nothing to write");
            return Ok(());
        }
        tracing::debug!(tab_id, ops = result.mutation_ops.len(), "submitting mutation batch");
        self.mutator
            .apply(MutationBatch::new(tab_id, result.mutation_ops.clone()))
    }
}

/// Tabs held in memory; clones share the same tabs, so one clone can serve
/// as provider and another as mutator. Batches go through [`replay::apply`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryTabs {
    tabs: Arc<RwLock<BTreeMap<String, Snapshot>>>,
}

impl InMemoryTabs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a tab under its own `tab_id`
    pub fn insert(&self, snapshot: Snapshot) -> Result<()> {
        let mut tabs = self.tabs.write().map_err(|_| poisoned())?;
        tabs.insert(snapshot.tab_id.clone(), snapshot);
        Ok(())
    }
}

fn poisoned() -> ConversionError {
    ConversionError::Provider("in-memory tab store poisoned".to_string())
}

impl TreeProvider for InMemoryTabs {
    fn snapshot(&self, tab_id: &str) -> Result<Snapshot> {
        let tabs = self.tabs.read().map_err(|_| poisoned())?;
        tabs.get(tab_id)
            .cloned()
            .ok_or_else(|| ConversionError::Provider(format!("unknown tab {tab_id}")))
    }
}

impl TreeMutator for InMemoryTabs {
    fn apply(&mut self, batch: MutationBatch) -> Result<()> {
        let mut tabs = self.tabs.write().map_err(|_| poisoned())?;
        let current = tabs
            .get(&batch.tab_id)
            .ok_or_else(|| ConversionError::Provider(format!("unknown tab {}", batch.tab_id)))?;
        // all or nothing: the stored tab changes only once the whole batch applied
        let next = replay::apply(current, &batch.ops)?;
        tabs.insert(batch.tab_id, next);
        Ok(())
    }
}
