//! Quiz question selection: filter, priority-score, adaptively bucket and
//! pick the top N, with seeded noise so two sessions over the same pool do
//! not replay the same ordering.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use uuid::Uuid;

use crate::engine::store::MasteryStore;
use crate::engine::types::{EngineError, Exercise, QuizFilters, QuizType, ReviewState};

/// Priority for exercises whose primary loop was never reviewed.
pub const PRIORITY_NEVER_REVIEWED: f64 = 1000.0;
/// Uniform noise span added to every priority, in both directions.
pub const PRIORITY_NOISE: f64 = 10.0;

const WEAK_THRESHOLD: f64 = 0.5;
const STRONG_THRESHOLD: f64 = 0.7;

#[derive(Debug)]
struct Candidate {
    exercise: Exercise,
    priority: f64,
    mastery: f64,
    next_review: Option<DateTime<Utc>>,
}

/// Deterministic selector seed derived from the session id.
pub fn session_seed(id: &Uuid) -> u64 {
    let bytes = id.as_bytes();
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[..8]);
    u64::from_le_bytes(buf)
}

/// Base priority of one candidate given its primary loop's review state.
fn base_priority(state: Option<&ReviewState>, now: DateTime<Utc>) -> f64 {
    let Some(next_review) = state.and_then(|s| s.next_review) else {
        return PRIORITY_NEVER_REVIEWED;
    };
    if next_review <= now {
        let overdue_days = (now - next_review).num_days();
        100.0 + overdue_days as f64
    } else {
        let days_until = (next_review - now).num_days();
        50.0 - days_until as f64
    }
}

/// Bucket targets for the adaptive mix: 40 % weak, 40 % learning, the rest
/// strong, always summing to `n`.
fn adaptive_targets(n: usize) -> (usize, usize, usize) {
    let weak = n * 2 / 5;
    let learning = n * 2 / 5;
    (weak, learning, n - weak - learning)
}

pub(crate) async fn select_questions(
    store: &MasteryStore,
    student_id: &str,
    course_id: &str,
    quiz_type: QuizType,
    count: usize,
    filters: &QuizFilters,
    prioritize_due: bool,
    seed: u64,
    now: DateTime<Utc>,
) -> Result<Vec<String>, EngineError> {
    if let Some(topic_id) = &filters.topic_id {
        if !store.topic_exists(topic_id).await? {
            return Err(EngineError::InvalidFilter(format!(
                "unknown topic '{topic_id}'"
            )));
        }
    }
    if let Some(core_loop_id) = &filters.core_loop_id {
        if !store.core_loop_exists(core_loop_id).await? {
            return Err(EngineError::InvalidFilter(format!(
                "unknown core loop '{core_loop_id}'"
            )));
        }
    }

    let exercises = store.exercises_for_course(course_id, filters).await?;
    if exercises.is_empty() {
        return Err(EngineError::NoCandidates);
    }

    let primary_loops: Vec<String> = exercises
        .iter()
        .map(|e| e.primary_core_loop().to_string())
        .collect();
    let states = store.review_states(student_id, &primary_loops).await?;

    let mut rng = StdRng::seed_from_u64(seed);
    let mut candidates: Vec<Candidate> = exercises
        .into_iter()
        .map(|exercise| {
            let state = states.get(exercise.primary_core_loop());
            let noise = rng.random_range(-PRIORITY_NOISE..=PRIORITY_NOISE);
            Candidate {
                priority: base_priority(state, now) + noise,
                mastery: state.map(|s| s.mastery_score).unwrap_or(0.0),
                next_review: state.and_then(|s| s.next_review),
                exercise,
            }
        })
        .collect();

    let selected = match quiz_type {
        QuizType::Review => select_review(candidates, count, now)?,
        QuizType::Adaptive => select_adaptive(candidates, count),
        _ if prioritize_due => {
            sort_by_priority(&mut candidates);
            candidates.truncate(count);
            candidates
        }
        _ => {
            candidates.shuffle(&mut rng);
            candidates.truncate(count);
            candidates
        }
    };

    if selected.is_empty() {
        return Err(EngineError::NoCandidates);
    }
    Ok(selected.into_iter().map(|c| c.exercise.id).collect())
}

/// Review mode keeps only due-or-never-reviewed exercises, soonest review
/// first (never-reviewed ahead of everything), ties broken like stage 5.
fn select_review(
    candidates: Vec<Candidate>,
    count: usize,
    now: DateTime<Utc>,
) -> Result<Vec<Candidate>, EngineError> {
    let mut due: Vec<Candidate> = candidates
        .into_iter()
        .filter(|c| match c.next_review {
            None => true,
            Some(next) => next <= now,
        })
        .collect();
    if due.is_empty() {
        return Err(EngineError::NoCandidates);
    }
    due.sort_by(|a, b| match (a.next_review, b.next_review) {
        (None, None) => tie_break(a, b),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| tie_break(a, b)),
    });
    due.truncate(count);
    Ok(due)
}

/// Adaptive mode: bucket by primary-loop mastery, aim for a 40/40/20 mix and
/// backfill from the remaining buckets when one runs short.
fn select_adaptive(candidates: Vec<Candidate>, count: usize) -> Vec<Candidate> {
    let mut weak = Vec::new();
    let mut learning = Vec::new();
    let mut strong = Vec::new();
    for candidate in candidates {
        if candidate.mastery < WEAK_THRESHOLD {
            weak.push(candidate);
        } else if candidate.mastery < STRONG_THRESHOLD {
            learning.push(candidate);
        } else {
            strong.push(candidate);
        }
    }
    sort_by_priority(&mut weak);
    sort_by_priority(&mut learning);
    sort_by_priority(&mut strong);

    let (want_weak, want_learning, want_strong) = adaptive_targets(count);
    let mut picked = Vec::with_capacity(count);
    let mut leftovers = Vec::new();

    for (bucket, want) in [
        (weak, want_weak),
        (learning, want_learning),
        (strong, want_strong),
    ] {
        let take = want.min(bucket.len());
        let mut iter = bucket.into_iter();
        picked.extend(iter.by_ref().take(take));
        leftovers.push(iter.collect::<Vec<_>>());
    }

    // Short buckets redistribute their missing share to whichever buckets
    // still have material, weak-first.
    let mut missing = count.saturating_sub(picked.len());
    for bucket in &mut leftovers {
        if missing == 0 {
            break;
        }
        let take = missing.min(bucket.len());
        picked.extend(bucket.drain(..take));
        missing -= take;
    }

    sort_by_priority(&mut picked);
    picked
}

fn sort_by_priority(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| tie_break(a, b));
}

/// Stage-5 ordering: priority descending, then lowest mastery, then stable
/// exercise id.
fn tie_break(a: &Candidate, b: &Candidate) -> Ordering {
    b.priority
        .partial_cmp(&a.priority)
        .unwrap_or(Ordering::Equal)
        .then_with(|| {
            a.mastery
                .partial_cmp(&b.mastery)
                .unwrap_or(Ordering::Equal)
        })
        .then_with(|| a.exercise.id.cmp(&b.exercise.id))
}
