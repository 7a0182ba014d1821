use serde::{Deserialize, Serialize};

/// A curriculum skill. Immutable once loaded into the skill cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Skill {
    pub skill_id: String,
    pub name: String,
    pub grade_level: u8,
    pub prerequisites: Vec<String>,
    pub forgetting_rate: f64,
    pub difficulty: f64,
}

/// The parsed structure of a skill id: `<subject>_<grade>_<breadcrumb>`,
/// where the breadcrumb is a dotted path of integers (topic.concept.
/// subconcept.exercise). Skills whose breadcrumb has fewer than four
/// segments are still valid primaries; they just don't participate in
/// the topical cascade (see [`Breadcrumb::depth`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkillKey {
    pub subject: String,
    pub grade_level: u8,
    pub breadcrumb: Breadcrumb,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breadcrumb(pub Vec<u32>);

impl Breadcrumb {
    /// A breadcrumb must carry at least topic/concept/subconcept/exercise
    /// to be eligible for the topical cascade.
    pub fn cascade_eligible(&self) -> bool {
        self.0.len() >= 4
    }

    pub fn topic(&self) -> Option<u32> {
        self.0.first().copied()
    }

    pub fn concept(&self) -> Option<u32> {
        self.0.get(1).copied()
    }

    pub fn subconcept(&self) -> Option<u32> {
        self.0.get(2).copied()
    }
}

/// Parse a skill id of the form `subject_grade_b1.b2.b3.b4`.
///
/// Returns `None` if the grade segment is missing or does not parse as an
/// integer in `[0, 12]` — callers should log and skip such a skill rather
/// than defaulting its grade, since silently mis-filing it would corrupt
/// cold start and grade unlock for every student who touches it.
pub fn parse_skill_key(skill_id: &str) -> Option<SkillKey> {
    let mut parts = skill_id.splitn(3, '_');
    let subject = parts.next()?.to_string();
    let grade_str = parts.next()?;
    let breadcrumb_str = parts.next().unwrap_or("");

    let grade_level: u8 = grade_str.parse().ok()?;
    if grade_level > 12 {
        return None;
    }

    let breadcrumb = Breadcrumb(
        breadcrumb_str
            .split('.')
            .filter(|s| !s.is_empty())
            .filter_map(|s| s.parse().ok())
            .collect(),
    );

    Some(SkillKey {
        subject,
        grade_level,
        breadcrumb,
    })
}

/// Classification of how two skills under the same subject relate,
/// driving which cascade rate applies on an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CascadeRelation {
    SameConceptSibling,
    SameConcept,
    SameTopic,
    LowerGradeGap,
}

/// Classify the relation between a primary skill and a candidate cascade
/// target, both already parsed and confirmed to share a subject.
pub fn classify_relation(primary: &SkillKey, other: &SkillKey) -> Option<CascadeRelation> {
    if !primary.breadcrumb.cascade_eligible() || !other.breadcrumb.cascade_eligible() {
        return None;
    }

    let same_topic = primary.breadcrumb.topic() == other.breadcrumb.topic();
    let same_concept = same_topic && primary.breadcrumb.concept() == other.breadcrumb.concept();
    let same_subconcept =
        same_concept && primary.breadcrumb.subconcept() == other.breadcrumb.subconcept();

    if other.grade_level < primary.grade_level && same_subconcept {
        return Some(CascadeRelation::LowerGradeGap);
    }

    if other.grade_level != primary.grade_level {
        return None;
    }

    if same_subconcept {
        Some(CascadeRelation::SameConceptSibling)
    } else if same_concept {
        Some(CascadeRelation::SameConcept)
    } else if same_topic {
        Some(CascadeRelation::SameTopic)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_skill_id() {
        let key = parse_skill_key("math_3_1.2.3.4").unwrap();
        assert_eq!(key.subject, "math");
        assert_eq!(key.grade_level, 3);
        assert_eq!(key.breadcrumb.0, vec![1, 2, 3, 4]);
        assert!(key.breadcrumb.cascade_eligible());
    }

    #[test]
    fn rejects_out_of_range_grade() {
        assert!(parse_skill_key("math_17_1.2.3.4").is_none());
    }

    #[test]
    fn rejects_non_numeric_grade() {
        assert!(parse_skill_key("math_three_1.2.3.4").is_none());
    }

    #[test]
    fn short_breadcrumb_is_cascade_ineligible_but_parses() {
        let key = parse_skill_key("math_3_1.2").unwrap();
        assert!(!key.breadcrumb.cascade_eligible());
    }

    #[test]
    fn classifies_sibling_and_topic_relations() {
        let primary = parse_skill_key("math_3_1.2.3.1").unwrap();
        let sibling = parse_skill_key("math_3_1.2.3.9").unwrap();
        let same_concept = parse_skill_key("math_3_1.2.9.1").unwrap();
        let same_topic = parse_skill_key("math_3_1.9.9.1").unwrap();
        let gap = parse_skill_key("math_2_1.2.3.1").unwrap();

        assert_eq!(
            classify_relation(&primary, &sibling),
            Some(CascadeRelation::SameConceptSibling)
        );
        assert_eq!(
            classify_relation(&primary, &same_concept),
            Some(CascadeRelation::SameConcept)
        );
        assert_eq!(
            classify_relation(&primary, &same_topic),
            Some(CascadeRelation::SameTopic)
        );
        assert_eq!(
            classify_relation(&primary, &gap),
            Some(CascadeRelation::LowerGradeGap)
        );
    }
}
