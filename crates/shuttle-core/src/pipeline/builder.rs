//! PipelineBuilder - behavior の順序を起動時に確定させる
//!
//! # 順序の決め方
//! 1. stage 順（`C::Stage` の `Ord`）
//! 2. 同じ stage の中は `before` / `after` 宣言によるトポロジカルソート
//! 3. 制約のない step 同士は id のアルファベット順（登録順には依存しない）
//!
//! 未知の id の参照、循環、stage をまたいで逆向きの制約は `BuildError`。

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use super::{Behavior, Pipeline, PipelineContext, Terminator};
use crate::error::BuildError;

/// One registered behavior with its placement.
pub struct Step<C: PipelineContext> {
    id: String,
    stage: C::Stage,
    behavior: Arc<dyn Behavior<C>>,
    before: Vec<String>,
    after: Vec<String>,
}

impl<C: PipelineContext> Step<C> {
    pub fn new(id: impl Into<String>, stage: C::Stage, behavior: impl Behavior<C> + 'static) -> Self {
        Self {
            id: id.into(),
            stage,
            behavior: Arc::new(behavior),
            before: Vec::new(),
            after: Vec::new(),
        }
    }

    /// Run this step before `other`.
    pub fn before(mut self, other: impl Into<String>) -> Self {
        self.before.push(other.into());
        self
    }

    /// Run this step after `other`.
    pub fn after(mut self, other: impl Into<String>) -> Self {
        self.after.push(other.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

pub struct PipelineBuilder<C: PipelineContext> {
    steps: Vec<Step<C>>,
}

impl<C: PipelineContext> Default for PipelineBuilder<C> {
    fn default() -> Self {
        Self { steps: Vec::new() }
    }
}

impl<C: PipelineContext> PipelineBuilder<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, step: Step<C>) -> Result<(), BuildError> {
        if self.steps.iter().any(|s| s.id == step.id) {
            return Err(BuildError::DuplicateStep(step.id));
        }
        self.steps.push(step);
        Ok(())
    }

    pub fn build(self, terminator: impl Terminator<C> + 'static) -> Result<Pipeline<C>, BuildError> {
        let order = self.resolve_order()?;

        let mut slots: Vec<Option<Step<C>>> = self.steps.into_iter().map(Some).collect();
        let mut ids = Vec::with_capacity(order.len());
        let mut chain = Vec::with_capacity(order.len());
        for index in order {
            if let Some(step) = slots[index].take() {
                ids.push(step.id);
                chain.push(step.behavior);
            }
        }

        Ok(Pipeline {
            ids,
            chain,
            terminator: Arc::new(terminator),
        })
    }

    /// Indices into `self.steps` in execution order.
    fn resolve_order(&self) -> Result<Vec<usize>, BuildError> {
        let index: HashMap<&str, usize> = self.steps.iter().enumerate().map(|(i, s)| (s.id.as_str(), i)).collect();

        // edges[a] = b: a は b より前
        let mut edges: Vec<(usize, usize)> = Vec::new();
        for (i, step) in self.steps.iter().enumerate() {
            for other in &step.before {
                edges.push((i, lookup(&index, &step.id, other)?));
            }
            for other in &step.after {
                edges.push((lookup(&index, &step.id, other)?, i));
            }
        }

        let mut same_stage_edges = Vec::new();
        for (a, b) in edges {
            let (sa, sb) = (self.steps[a].stage, self.steps[b].stage);
            if sa > sb {
                return Err(BuildError::ConflictingStage {
                    before: self.steps[a].id.clone(),
                    after: self.steps[b].id.clone(),
                });
            }
            if sa == sb {
                same_stage_edges.push((a, b));
            }
        }

        let mut by_stage: BTreeMap<C::Stage, Vec<usize>> = BTreeMap::new();
        for (i, step) in self.steps.iter().enumerate() {
            by_stage.entry(step.stage).or_default().push(i);
        }

        let mut order = Vec::with_capacity(self.steps.len());
        for members in by_stage.values() {
            order.extend(self.sort_stage(members, &same_stage_edges)?);
        }
        Ok(order)
    }

    /// Kahn's algorithm; ready steps are taken in id order.
    fn sort_stage(&self, members: &[usize], edges: &[(usize, usize)]) -> Result<Vec<usize>, BuildError> {
        let mut incoming: HashMap<usize, usize> = members.iter().map(|&m| (m, 0)).collect();
        for &(_, b) in edges {
            if let Some(count) = incoming.get_mut(&b) {
                *count += 1;
            }
        }

        let mut ready: BTreeSet<(&str, usize)> = members
            .iter()
            .filter(|m| incoming[*m] == 0)
            .map(|&m| (self.steps[m].id.as_str(), m))
            .collect();

        let mut sorted = Vec::with_capacity(members.len());
        while let Some(entry) = ready.pop_first() {
            let current = entry.1;
            sorted.push(current);
            for &(a, b) in edges {
                if a != current {
                    continue;
                }
                if let Some(count) = incoming.get_mut(&b) {
                    *count -= 1;
                    if *count == 0 {
                        ready.insert((self.steps[b].id.as_str(), b));
                    }
                }
            }
        }

        if sorted.len() != members.len() {
            let mut stuck: Vec<String> = members
                .iter()
                .filter(|m| !sorted.contains(*m))
                .map(|&m| self.steps[m].id.clone())
                .collect();
            stuck.sort();
            return Err(BuildError::OrderingCycle(stuck));
        }
        Ok(sorted)
    }
}

fn lookup(index: &HashMap<&str, usize>, step: &str, reference: &str) -> Result<usize, BuildError> {
    index.get(reference).copied().ok_or_else(|| BuildError::UnknownStep {
        step: step.to_string(),
        reference: reference.to_string(),
    })
}
