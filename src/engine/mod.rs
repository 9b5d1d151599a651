//! The adaptive learning engine: SM-2 scheduling, mastery-weighted quiz
//! selection, cascading mastery updates and advisory queries, behind one
//! dependency-injected facade.

pub mod advisor;
pub mod cascade;
pub mod clock;
pub mod evaluator;
pub mod prereq;
pub mod quality;
pub mod selector;
pub mod session;
pub mod sm2;
pub mod store;
pub mod types;

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::engine::clock::Clock;
use crate::engine::evaluator::AnswerEvaluator;
use crate::engine::prereq::PrereqGraph;
use crate::engine::session::SessionLocks;
use crate::engine::store::MasteryStore;
use crate::engine::types::{
    DueItem, DueStatus, EngineError, MasteryReport, MasteryScope, ReviewState,
};

/// Mastery below this blocks a dependent loop behind its prerequisites.
pub const PREREQ_MASTERY_THRESHOLD: f64 = 0.30;

pub struct LearningEngine {
    pub(crate) store: MasteryStore,
    pub(crate) evaluator: Arc<dyn AnswerEvaluator>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) session_locks: SessionLocks,
}

impl LearningEngine {
    /// All collaborators are injected; the engine owns no process-wide state.
    pub fn new(
        store: MasteryStore,
        evaluator: Arc<dyn AnswerEvaluator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            evaluator,
            clock,
            session_locks: SessionLocks::default(),
        }
    }

    pub fn store(&self) -> &MasteryStore {
        &self.store
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    // --------------------------------------------------- scheduling reads

    /// Core loops of a course whose review date has arrived, soonest first.
    pub async fn due_items(
        &self,
        student_id: &str,
        course_id: &str,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<DueItem>, EngineError> {
        let states = self
            .store
            .review_states_for_course(student_id, course_id)
            .await?;
        let loops = self.store.core_loops_for_course(course_id).await?;
        let names: std::collections::HashMap<&str, &str> = loops
            .iter()
            .map(|l| (l.id.as_str(), l.name.as_str()))
            .collect();
        let topics: std::collections::HashMap<&str, &str> = loops
            .iter()
            .map(|l| (l.id.as_str(), l.topic_id.as_str()))
            .collect();

        let mut items: Vec<DueItem> = states
            .into_iter()
            .filter_map(|state| {
                let next_review = state.next_review?;
                if next_review > as_of {
                    return None;
                }
                let days_overdue = (as_of - next_review).num_days();
                Some(DueItem {
                    core_loop_name: names
                        .get(state.core_loop_id.as_str())
                        .unwrap_or(&state.core_loop_id.as_str())
                        .to_string(),
                    topic_id: topics
                        .get(state.core_loop_id.as_str())
                        .unwrap_or(&"")
                        .to_string(),
                    mastery_score: state.mastery_score,
                    next_review,
                    days_overdue,
                    status: if days_overdue > 0 {
                        DueStatus::Overdue
                    } else {
                        DueStatus::DueToday
                    },
                    core_loop_id: state.core_loop_id,
                })
            })
            .collect();
        items.sort_by(|a, b| a.next_review.cmp(&b.next_review));
        Ok(items)
    }

    pub async fn mastery(
        &self,
        student_id: &str,
        scope: MasteryScope,
    ) -> Result<MasteryReport, EngineError> {
        match &scope {
            MasteryScope::CoreLoop(core_loop_id) => {
                let state = self
                    .store
                    .review_state(student_id, core_loop_id)
                    .await?
                    .unwrap_or_else(|| ReviewState::new(student_id, core_loop_id.clone()));
                Ok(MasteryReport {
                    mastery_score: state.mastery_score,
                    total_attempts: state.total_attempts,
                    correct_attempts: state.correct_attempts,
                    last_updated: state.last_reviewed,
                    scope,
                })
            }
            MasteryScope::Topic(topic_id) => {
                let aggregate = self.store.topic_mastery(student_id, topic_id).await?;
                let states = self
                    .store
                    .review_states_for_topic(student_id, topic_id)
                    .await?;
                Ok(MasteryReport {
                    mastery_score: aggregate.map(|(m, _)| m).unwrap_or(0.0),
                    total_attempts: states.iter().map(|s| s.total_attempts).sum(),
                    correct_attempts: states.iter().map(|s| s.correct_attempts).sum(),
                    last_updated: aggregate.map(|(_, at)| at),
                    scope,
                })
            }
            MasteryScope::Course(course_id) => {
                let aggregate = self.store.course_mastery(student_id, course_id).await?;
                let states = self
                    .store
                    .review_states_for_course(student_id, course_id)
                    .await?;
                Ok(MasteryReport {
                    mastery_score: aggregate.map(|(m, _)| m).unwrap_or(0.0),
                    total_attempts: states.iter().map(|s| s.total_attempts).sum(),
                    correct_attempts: states.iter().map(|s| s.correct_attempts).sum(),
                    last_updated: aggregate.map(|(_, at)| at),
                    scope,
                })
            }
        }
    }

    /// Reset one loop's SM-2 record on explicit request; the record itself is
    /// never deleted.
    pub async fn reset_review_state(
        &self,
        student_id: &str,
        core_loop_id: &str,
    ) -> Result<ReviewState, EngineError> {
        let state = self
            .store
            .reset_review_state(student_id, core_loop_id, self.now())
            .await?;
        tracing::info!(
            student_id = %student_id,
            core_loop_id = %core_loop_id,
            "review state reset"
        );
        Ok(state)
    }

    // -------------------------------------------------- prerequisite graph

    pub async fn add_prerequisite(
        &self,
        prereq: &str,
        dependent: &str,
    ) -> Result<(), EngineError> {
        for id in [prereq, dependent] {
            if !self.store.core_loop_exists(id).await? {
                return Err(EngineError::InvalidFilter(format!(
                    "unknown core loop '{id}'"
                )));
            }
        }
        let graph = PrereqGraph::from_edges(self.store.prereq_edges().await?);
        if graph.would_create_cycle(prereq, dependent) {
            return Err(EngineError::WouldCreateCycle {
                prereq: prereq.to_string(),
                dependent: dependent.to_string(),
            });
        }
        self.store.insert_prereq_edge(prereq, dependent).await?;
        tracing::info!(prereq = %prereq, dependent = %dependent, "prerequisite edge added");
        Ok(())
    }

    pub async fn prereqs_of(&self, core_loop_id: &str) -> Result<Vec<String>, EngineError> {
        if !self.store.core_loop_exists(core_loop_id).await? {
            return Err(EngineError::InvalidFilter(format!(
                "unknown core loop '{core_loop_id}'"
            )));
        }
        let graph = PrereqGraph::from_edges(self.store.prereq_edges().await?);
        Ok(graph.prereqs_of(core_loop_id))
    }

    pub async fn dependents_of(&self, core_loop_id: &str) -> Result<Vec<String>, EngineError> {
        if !self.store.core_loop_exists(core_loop_id).await? {
            return Err(EngineError::InvalidFilter(format!(
                "unknown core loop '{core_loop_id}'"
            )));
        }
        let graph = PrereqGraph::from_edges(self.store.prereq_edges().await?);
        Ok(graph.dependents_of(core_loop_id))
    }

    pub(crate) async fn mastery_of_loop(
        &self,
        student_id: &str,
        core_loop_id: &str,
    ) -> Result<f64, EngineError> {
        Ok(self
            .store
            .review_state(student_id, core_loop_id)
            .await?
            .map(|s| s.mastery_score)
            .unwrap_or(0.0))
    }
}
