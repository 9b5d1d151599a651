//! Read-only advisory queries over aggregated mastery state: tutoring depth,
//! prerequisite gating, learning paths, gap detection and the per-course
//! progress views.

use std::collections::{HashMap, HashSet};

use crate::engine::prereq::PrereqGraph;
use crate::engine::types::{
    CourseSummary, EngineError, GapSeverity, KnowledgeGap, LearningPathItem, PathReason,
    TopicProgress, TopicStatus, TutoringDepth, Urgency,
};
use crate::engine::{LearningEngine, PREREQ_MASTERY_THRESHOLD};

const DEPTH_BASIC_BELOW: f64 = 0.30;
const DEPTH_ADVANCED_FROM: f64 = 0.70;

const WEAK_MASTERY: f64 = 0.5;
const MASTERED_FROM: f64 = 0.7;

/// Window and threshold for "recently struggling" (§4.5).
const RECENT_ATTEMPT_WINDOW: i64 = 5;
const RECENT_FAILURE_RATE: f64 = 0.40;

impl LearningEngine {
    /// Tutoring depth for a core loop from the student's current mastery.
    pub async fn recommended_depth(
        &self,
        student_id: &str,
        core_loop_id: &str,
    ) -> Result<TutoringDepth, EngineError> {
        let mastery = self.mastery_of_loop(student_id, core_loop_id).await?;
        Ok(if mastery < DEPTH_BASIC_BELOW {
            TutoringDepth::Basic
        } else if mastery < DEPTH_ADVANCED_FROM {
            TutoringDepth::Medium
        } else {
            TutoringDepth::Advanced
        })
    }

    /// Prerequisites are surfaced for novices, and for mid-mastery students
    /// who failed a large share of their recent attempts.
    pub async fn should_show_prerequisites(
        &self,
        student_id: &str,
        core_loop_id: &str,
    ) -> Result<bool, EngineError> {
        let mastery = self.mastery_of_loop(student_id, core_loop_id).await?;
        if mastery < DEPTH_BASIC_BELOW {
            return Ok(true);
        }
        if mastery >= DEPTH_ADVANCED_FROM {
            return Ok(false);
        }
        let recent = self
            .store
            .recent_loop_scores(student_id, core_loop_id, RECENT_ATTEMPT_WINDOW)
            .await?;
        if recent.is_empty() {
            return Ok(false);
        }
        let failures = recent.iter().filter(|score| **score < 0.7).count();
        Ok(failures as f64 / recent.len() as f64 > RECENT_FAILURE_RATE)
    }

    /// Gate for a learn action: weak prerequisites block unless overridden.
    pub async fn gate_learn(
        &self,
        student_id: &str,
        core_loop_id: &str,
        force: bool,
    ) -> Result<(), EngineError> {
        if !self.store.core_loop_exists(core_loop_id).await? {
            return Err(EngineError::InvalidFilter(format!(
                "unknown core loop '{core_loop_id}'"
            )));
        }
        if force {
            return Ok(());
        }
        let graph = PrereqGraph::from_edges(self.store.prereq_edges().await?);
        let mut weak_prereqs = Vec::new();
        for prereq in graph.prereqs_of(core_loop_id) {
            if self.mastery_of_loop(student_id, &prereq).await? < PREREQ_MASTERY_THRESHOLD {
                weak_prereqs.push(prereq);
            }
        }
        if weak_prereqs.is_empty() {
            Ok(())
        } else {
            Err(EngineError::PrerequisiteBlocked { weak_prereqs })
        }
    }

    /// Top-K study recommendations: overdue reviews, weak areas, today's
    /// reviews, then untouched content; one entry per core loop.
    pub async fn learning_path(
        &self,
        student_id: &str,
        course_id: &str,
        limit: usize,
    ) -> Result<Vec<LearningPathItem>, EngineError> {
        let now = self.now();
        let states = self
            .store
            .review_states_for_course(student_id, course_id)
            .await?;
        let loops = self.store.core_loops_for_course(course_id).await?;
        let names: HashMap<&str, &str> = loops
            .iter()
            .map(|l| (l.id.as_str(), l.name.as_str()))
            .collect();
        let name_of = |id: &str| names.get(id).unwrap_or(&id).to_string();

        let mut overdue = Vec::new();
        let mut due_today = Vec::new();
        let mut weak = Vec::new();
        for state in &states {
            if let Some(next_review) = state.next_review {
                if next_review <= now {
                    let days = (now - next_review).num_days();
                    if days > 0 {
                        overdue.push((days, state));
                    } else {
                        due_today.push(state);
                    }
                }
            }
            if state.total_attempts > 0 && state.mastery_score < WEAK_MASTERY {
                weak.push(state);
            }
        }
        overdue.sort_by(|a, b| b.0.cmp(&a.0));
        weak.sort_by(|a, b| {
            a.mastery_score
                .partial_cmp(&b.mastery_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        due_today.sort_by(|a, b| {
            a.mastery_score
                .partial_cmp(&b.mastery_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        // New content: loops never attempted, easiest declared difficulty
        // first, then richer loops (more exercises) ahead of sparse ones.
        let attempted: HashSet<&str> = states.iter().map(|s| s.core_loop_id.as_str()).collect();
        let mut fresh: Vec<_> = self
            .store
            .loop_exercise_stats(course_id)
            .await?
            .into_iter()
            .filter(|stats| !attempted.contains(stats.core_loop_id.as_str()))
            .collect();
        fresh.sort_by(|a, b| {
            a.easiest_difficulty
                .rank()
                .cmp(&b.easiest_difficulty.rank())
                .then_with(|| b.exercise_count.cmp(&a.exercise_count))
                .then_with(|| a.core_loop_id.cmp(&b.core_loop_id))
        });

        let mut seen: HashSet<String> = HashSet::new();
        let mut path = Vec::new();
        let mut push = |item: LearningPathItem, seen: &mut HashSet<String>| {
            if seen.insert(item.core_loop_id.clone()) {
                path.push(item);
            }
        };

        for (days, state) in overdue {
            push(
                LearningPathItem {
                    core_loop_id: state.core_loop_id.clone(),
                    core_loop_name: name_of(&state.core_loop_id),
                    reason: PathReason::OverdueReview,
                    urgency: Urgency::High,
                    mastery_score: state.mastery_score,
                    days_overdue: Some(days),
                },
                &mut seen,
            );
        }
        for state in weak {
            push(
                LearningPathItem {
                    core_loop_id: state.core_loop_id.clone(),
                    core_loop_name: name_of(&state.core_loop_id),
                    reason: PathReason::WeakArea,
                    urgency: Urgency::Medium,
                    mastery_score: state.mastery_score,
                    days_overdue: None,
                },
                &mut seen,
            );
        }
        for state in due_today {
            push(
                LearningPathItem {
                    core_loop_id: state.core_loop_id.clone(),
                    core_loop_name: name_of(&state.core_loop_id),
                    reason: PathReason::DueToday,
                    urgency: Urgency::Medium,
                    mastery_score: state.mastery_score,
                    days_overdue: Some(0),
                },
                &mut seen,
            );
        }
        for stats in fresh {
            push(
                LearningPathItem {
                    core_loop_name: name_of(&stats.core_loop_id),
                    core_loop_id: stats.core_loop_id,
                    reason: PathReason::NewContent,
                    urgency: Urgency::Low,
                    mastery_score: 0.0,
                    days_overdue: None,
                },
                &mut seen,
            );
        }

        path.truncate(limit);
        Ok(path)
    }

    /// Attempted loops with mastery under 0.5, graded by how far under.
    pub async fn knowledge_gaps(
        &self,
        student_id: &str,
        course_id: &str,
    ) -> Result<Vec<KnowledgeGap>, EngineError> {
        let states = self
            .store
            .review_states_for_course(student_id, course_id)
            .await?;
        let loops = self.store.core_loops_for_course(course_id).await?;
        let by_id: HashMap<&str, (&str, &str)> = loops
            .iter()
            .map(|l| (l.id.as_str(), (l.name.as_str(), l.topic_id.as_str())))
            .collect();

        let mut gaps: Vec<KnowledgeGap> = states
            .into_iter()
            .filter(|s| s.total_attempts > 0 && s.mastery_score < WEAK_MASTERY)
            .map(|state| {
                let severity = if state.mastery_score < 0.20 {
                    GapSeverity::High
                } else if state.mastery_score < 0.35 {
                    GapSeverity::Medium
                } else {
                    GapSeverity::Low
                };
                let (name, topic_id) = by_id
                    .get(state.core_loop_id.as_str())
                    .copied()
                    .unwrap_or((state.core_loop_id.as_str(), ""));
                KnowledgeGap {
                    core_loop_id: state.core_loop_id.clone(),
                    core_loop_name: name.to_string(),
                    topic_id: topic_id.to_string(),
                    mastery_score: state.mastery_score,
                    severity,
                }
            })
            .collect();
        gaps.sort_by(|a, b| {
            a.mastery_score
                .partial_cmp(&b.mastery_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(gaps)
    }

    // ------------------------------------------------------------ analytics

    pub async fn course_summary(
        &self,
        student_id: &str,
        course_id: &str,
    ) -> Result<CourseSummary, EngineError> {
        let total_exercises = self.store.count_exercises(course_id).await?;
        let core_loops_discovered = self.store.count_core_loops(course_id).await?;
        let topics_discovered = self.store.count_topics(course_id).await?;
        let exercises_attempted = self
            .store
            .count_exercises_attempted(student_id, course_id)
            .await?;
        let exercises_mastered = self
            .store
            .count_exercises_mastered(student_id, course_id, MASTERED_FROM)
            .await?;
        let overall_mastery = self
            .store
            .course_mastery(student_id, course_id)
            .await?
            .map(|(m, _)| m)
            .unwrap_or(0.0);
        let states = self
            .store
            .review_states_for_course(student_id, course_id)
            .await?;
        let core_loops_attempted = states.iter().filter(|s| s.total_attempts > 0).count() as i64;

        let sessions = self
            .store
            .completed_sessions_for_course(student_id, course_id)
            .await?;
        let mut percent_sum = 0.0;
        for session in &sessions {
            let answers = self.store.answers_for_session(session.id).await?;
            if !session.question_ids.is_empty() {
                let score_sum: f64 = answers.iter().map(|a| a.score).sum();
                percent_sum += score_sum / session.question_ids.len() as f64 * 100.0;
            }
        }
        let avg_session_percent = if sessions.is_empty() {
            0.0
        } else {
            percent_sum / sessions.len() as f64
        };
        let total_time_spent_s = self
            .store
            .total_time_spent_s(student_id, course_id)
            .await?;

        Ok(CourseSummary {
            course_id: course_id.to_string(),
            total_exercises,
            exercises_attempted,
            exercises_mastered,
            overall_mastery,
            quiz_sessions_completed: sessions.len() as i64,
            avg_session_percent,
            total_time_spent_s,
            core_loops_discovered,
            core_loops_attempted,
            topics_discovered,
        })
    }

    /// Per-topic progress, weak topics first.
    pub async fn topic_breakdown(
        &self,
        student_id: &str,
        course_id: &str,
    ) -> Result<Vec<TopicProgress>, EngineError> {
        let topics = self.store.topics_for_course(course_id).await?;
        let loops = self.store.core_loops_for_course(course_id).await?;
        let mut loops_per_topic: HashMap<&str, i64> = HashMap::new();
        for core_loop in &loops {
            *loops_per_topic.entry(core_loop.topic_id.as_str()).or_insert(0) += 1;
        }

        let mut breakdown = Vec::with_capacity(topics.len());
        for topic in &topics {
            let states = self
                .store
                .review_states_for_topic(student_id, &topic.id)
                .await?;
            let loops_attempted = states.iter().filter(|s| s.total_attempts > 0).count() as i64;
            let mastery_score = self
                .store
                .topic_mastery(student_id, &topic.id)
                .await?
                .map(|(m, _)| m)
                .unwrap_or(0.0);
            let filters = crate::engine::types::QuizFilters {
                topic_id: Some(topic.id.clone()),
                ..Default::default()
            };
            let exercises_count = self
                .store
                .exercises_for_course(course_id, &filters)
                .await?
                .len() as i64;

            let status = if loops_attempted == 0 {
                TopicStatus::NotStarted
            } else if mastery_score >= MASTERED_FROM {
                TopicStatus::Mastered
            } else if mastery_score >= WEAK_MASTERY {
                TopicStatus::InProgress
            } else {
                TopicStatus::Weak
            };

            breakdown.push(TopicProgress {
                topic_id: topic.id.clone(),
                topic_name: topic.name.clone(),
                core_loops_count: loops_per_topic
                    .get(topic.id.as_str())
                    .copied()
                    .unwrap_or(0),
                loops_attempted,
                exercises_count,
                mastery_score,
                status,
            });
        }

        breakdown.sort_by(|a, b| {
            (a.status != TopicStatus::Weak)
                .cmp(&(b.status != TopicStatus::Weak))
                .then_with(|| {
                    a.mastery_score
                        .partial_cmp(&b.mastery_score)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
        });
        Ok(breakdown)
    }

    /// Human-readable study suggestions in priority order: overdue, due
    /// today, weak areas, new content, then an encouragement line.
    pub async fn study_suggestions(
        &self,
        student_id: &str,
        course_id: &str,
    ) -> Result<Vec<String>, EngineError> {
        let now = self.now();
        let due = self.due_items(student_id, course_id, now).await?;
        let overdue: Vec<_> = due
            .iter()
            .filter(|item| item.days_overdue > 0)
            .collect();
        let due_today: Vec<_> = due
            .iter()
            .filter(|item| item.days_overdue == 0)
            .collect();

        let mut suggestions = Vec::new();
        if !overdue.is_empty() {
            let names: Vec<&str> = overdue
                .iter()
                .take(3)
                .map(|i| i.core_loop_name.as_str())
                .collect();
            suggestions.push(format!(
                "{} overdue review{}: {}",
                overdue.len(),
                if overdue.len() > 1 { "s" } else { "" },
                names.join(", ")
            ));
        }
        if !due_today.is_empty() {
            let names: Vec<&str> = due_today
                .iter()
                .take(3)
                .map(|i| i.core_loop_name.as_str())
                .collect();
            suggestions.push(format!(
                "{} review{} due today: {}",
                due_today.len(),
                if due_today.len() > 1 { "s" } else { "" },
                names.join(", ")
            ));
        }

        let gaps = self.knowledge_gaps(student_id, course_id).await?;
        if !gaps.is_empty() {
            let names: Vec<&str> = gaps
                .iter()
                .take(3)
                .map(|g| g.core_loop_name.as_str())
                .collect();
            suggestions.push(format!(
                "{} weak area{}: {}",
                gaps.len(),
                if gaps.len() > 1 { "s" } else { "" },
                names.join(", ")
            ));
        }

        let path = self.learning_path(student_id, course_id, 5).await?;
        let fresh: Vec<_> = path
            .iter()
            .filter(|item| item.reason == PathReason::NewContent)
            .collect();
        if !fresh.is_empty() {
            let names: Vec<&str> = fresh
                .iter()
                .take(3)
                .map(|i| i.core_loop_name.as_str())
                .collect();
            suggestions.push(format!(
                "{} new topic{} to explore: {}",
                fresh.len(),
                if fresh.len() > 1 { "s" } else { "" },
                names.join(", ")
            ));
        }

        let overall = self
            .store
            .course_mastery(student_id, course_id)
            .await?
            .map(|(m, _)| m)
            .unwrap_or(0.0);
        if overall >= MASTERED_FROM {
            suggestions.push(format!(
                "Great progress! Overall mastery: {:.0}%",
                overall * 100.0
            ));
        }
        if suggestions.is_empty() {
            suggestions.push("Start a quiz to begin building your mastery!".to_string());
        }
        Ok(suggestions)
    }
}
