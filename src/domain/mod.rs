/// Curriculum skill model: identifiers, breadcrumb parsing, cascade classification.
pub mod skill;
/// Per-student profile and per-skill practice state.
pub mod user;
/// Question and attempt records.
pub mod question;

pub use question::{Question, QuestionAttempt};
pub use skill::{Breadcrumb, CascadeRelation, Skill, SkillKey, classify_relation, parse_skill_key};
pub use user::{PerSkillState, Strength, UserProfile};
