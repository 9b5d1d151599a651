use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::engine::sm2::INITIAL_EASINESS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "easy" => Self::Easy,
            "hard" => Self::Hard,
            _ => Self::Medium,
        }
    }

    /// Ordering rank, easy first.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Easy => 0,
            Self::Medium => 1,
            Self::Hard => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExerciseKind {
    Procedural,
    Theory,
    Proof,
    Hybrid,
}

impl ExerciseKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Procedural => "procedural",
            Self::Theory => "theory",
            Self::Proof => "proof",
            Self::Hybrid => "hybrid",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "theory" => Self::Theory,
            "proof" => Self::Proof,
            "hybrid" => Self::Hybrid,
            _ => Self::Procedural,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopKind {
    Design,
    Transformation,
    Verification,
    Minimization,
    Analysis,
    Other,
}

impl LoopKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Design => "design",
            Self::Transformation => "transformation",
            Self::Verification => "verification",
            Self::Minimization => "minimization",
            Self::Analysis => "analysis",
            Self::Other => "other",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "design" => Self::Design,
            "transformation" => Self::Transformation,
            "verification" => Self::Verification,
            "minimization" => Self::Minimization,
            "analysis" => Self::Analysis,
            _ => Self::Other,
        }
    }
}

/// A problem item, immutable once ingested. `core_loop_ids` is never empty;
/// the first entry is the primary loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Exercise {
    pub id: String,
    pub course_id: String,
    pub topic_id: String,
    pub core_loop_ids: Vec<String>,
    pub difficulty: Difficulty,
    pub kind: ExerciseKind,
    pub tags: Vec<String>,
    pub analyzed: bool,
}

impl Exercise {
    pub fn primary_core_loop(&self) -> &str {
        &self.core_loop_ids[0]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoreLoop {
    pub id: String,
    pub name: String,
    pub kind: LoopKind,
    pub topic_id: String,
    pub language: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Topic {
    pub id: String,
    pub course_id: String,
    pub name: String,
    pub language: String,
}

/// Per (student, core loop) SM-2 record. Created lazily on the first attempt,
/// mutated only by the mastery cascade, never deleted (reset on request).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewState {
    pub student_id: String,
    pub core_loop_id: String,
    pub easiness_factor: f64,
    pub repetition_number: i64,
    pub interval_days: i64,
    pub next_review: Option<DateTime<Utc>>,
    pub last_reviewed: Option<DateTime<Utc>>,
    pub total_attempts: i64,
    pub correct_attempts: i64,
    pub mastery_score: f64,
}

impl ReviewState {
    pub fn new(student_id: impl Into<String>, core_loop_id: impl Into<String>) -> Self {
        Self {
            student_id: student_id.into(),
            core_loop_id: core_loop_id.into(),
            easiness_factor: INITIAL_EASINESS,
            repetition_number: 0,
            interval_days: 0,
            next_review: None,
            last_reviewed: None,
            total_attempts: 0,
            correct_attempts: 0,
            mastery_score: 0.0,
        }
    }

    pub fn accuracy(&self) -> f64 {
        if self.total_attempts == 0 {
            0.0
        } else {
            self.correct_attempts as f64 / self.total_attempts as f64
        }
    }

    /// A loop is due when it has never been scheduled or its review date has
    /// passed.
    pub fn is_due(&self, as_of: DateTime<Utc>) -> bool {
        match self.next_review {
            None => true,
            Some(next) => next <= as_of,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuizType {
    Random,
    Topic,
    CoreLoop,
    Review,
    Adaptive,
}

impl QuizType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Random => "random",
            Self::Topic => "topic",
            Self::CoreLoop => "core_loop",
            Self::Review => "review",
            Self::Adaptive => "adaptive",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "topic" => Self::Topic,
            "core_loop" => Self::CoreLoop,
            "review" => Self::Review,
            "adaptive" => Self::Adaptive,
            _ => Self::Random,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizFilters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub core_loop_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<Difficulty>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ExerciseKind>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Open,
    Complete,
    Abandoned,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Complete => "complete",
            Self::Abandoned => "abandoned",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "complete" => Self::Complete,
            "abandoned" => Self::Abandoned,
            _ => Self::Open,
        }
    }
}

/// An ordered, frozen list of exercises presented to a student.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizSession {
    pub id: Uuid,
    pub student_id: String,
    pub course_id: String,
    pub quiz_type: QuizType,
    pub filters: QuizFilters,
    pub question_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub state: SessionState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizAnswer {
    pub session_id: Uuid,
    pub question_index: i64,
    pub exercise_id: String,
    pub user_answer: String,
    pub score: f64,
    pub correct: bool,
    pub hint_used: bool,
    pub time_taken_s: f64,
    pub submitted_at: DateTime<Utc>,
}

/// Result of the external answer evaluator (§6.2 contract).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evaluation {
    pub score: f64,
    pub feedback: String,
    pub correct: bool,
}

#[derive(Debug, Clone, Default)]
pub struct SubmitOptions {
    /// Downgrade an evaluator failure into a score-0 attempt instead of
    /// surfacing `EvaluatorUnavailable`. Off unless the caller asks for it.
    pub evaluator_fallback: bool,
    /// Evaluate and report, but mutate no state.
    pub dry_run: bool,
    /// Expected solve time; when present, taking more than twice as long
    /// costs one quality point.
    pub expected_time_s: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitOutcome {
    pub correct: bool,
    pub score: f64,
    pub feedback: String,
    pub review_state: ReviewState,
    pub remaining: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NextQuestion {
    pub question_index: i64,
    pub exercise_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DifficultyBreakdown {
    pub difficulty: Difficulty,
    pub total: usize,
    pub answered: usize,
    pub correct: usize,
    pub avg_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub total_questions: usize,
    pub answered: usize,
    pub percent: f64,
    pub passed: bool,
    pub by_difficulty: Vec<DifficultyBreakdown>,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub session: QuizSession,
    pub answered: usize,
    pub next_question: Option<NextQuestion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<SessionSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "scope", content = "id")]
pub enum MasteryScope {
    Course(String),
    Topic(String),
    CoreLoop(String),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MasteryReport {
    pub scope: MasteryScope,
    pub mastery_score: f64,
    pub total_attempts: i64,
    pub correct_attempts: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DueStatus {
    Overdue,
    DueToday,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DueItem {
    pub core_loop_id: String,
    pub core_loop_name: String,
    pub topic_id: String,
    pub mastery_score: f64,
    pub next_review: DateTime<Utc>,
    pub days_overdue: i64,
    pub status: DueStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TutoringDepth {
    Basic,
    Medium,
    Advanced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PathReason {
    OverdueReview,
    WeakArea,
    DueToday,
    NewContent,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningPathItem {
    pub core_loop_id: String,
    pub core_loop_name: String,
    pub reason: PathReason,
    pub urgency: Urgency,
    pub mastery_score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub days_overdue: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GapSeverity {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeGap {
    pub core_loop_id: String,
    pub core_loop_name: String,
    pub topic_id: String,
    pub mastery_score: f64,
    pub severity: GapSeverity,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseSummary {
    pub course_id: String,
    pub total_exercises: i64,
    pub exercises_attempted: i64,
    pub exercises_mastered: i64,
    pub overall_mastery: f64,
    pub quiz_sessions_completed: i64,
    pub avg_session_percent: f64,
    pub total_time_spent_s: f64,
    pub core_loops_discovered: i64,
    pub core_loops_attempted: i64,
    pub topics_discovered: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TopicStatus {
    Mastered,
    InProgress,
    Weak,
    NotStarted,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicProgress {
    pub topic_id: String,
    pub topic_name: String,
    pub core_loops_count: i64,
    pub loops_attempted: i64,
    pub exercises_count: i64,
    pub mastery_score: f64,
    pub status: TopicStatus,
}

/// Error taxonomy of the engine; every variant is a distinct reportable
/// condition (§7).
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no exercises match the requested filters")]
    NoCandidates,
    #[error("invalid filter: {0}")]
    InvalidFilter(String),
    #[error("session {0} not found")]
    SessionNotFound(Uuid),
    #[error("session is being mutated by another caller")]
    SessionBusy,
    #[error("session is no longer open")]
    SessionComplete,
    #[error("question {question_index} already has an answer")]
    AlreadyAnswered { question_index: i64 },
    #[error("expected answer for question {expected_index} ({expected_exercise}), got {got}")]
    OutOfOrderSubmission {
        expected_index: i64,
        expected_exercise: String,
        got: String,
    },
    #[error("answer evaluator unavailable: {0}")]
    EvaluatorUnavailable(String),
    #[error("prerequisites below mastery threshold: {}", weak_prereqs.join(", "))]
    PrerequisiteBlocked { weak_prereqs: Vec<String> },
    #[error("edge {prereq} -> {dependent} would create a cycle")]
    WouldCreateCycle { prereq: String, dependent: String },
    #[error("internal invariant violated: {0}")]
    InternalInvariantViolated(String),
    #[error("sql error: {0}")]
    Sql(#[from] sqlx::Error),
}
