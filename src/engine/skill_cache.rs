use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::Skill;
use crate::store::PersistenceAdapter;
use crate::utils::error::{EngineError, EngineResult};

/// Process-wide, read-only index of the curriculum built once at startup.
/// Unlike a general-purpose cache, there is no TTL or eviction: the
/// curriculum is immutable for the life of the process, and a change
/// requires a restart.
#[derive(Clone)]
pub struct SkillCache {
    skills: Arc<HashMap<String, Skill>>,
}

impl SkillCache {
    /// Load every skill document from the store and build the cache.
    ///
    /// Skills whose prerequisites reference a skill_id not present in the
    /// loaded set are logged and have that prerequisite dropped, rather
    /// than failing the whole load — a single malformed curriculum entry
    /// should not prevent the engine from starting.
    pub async fn load(store: &dyn PersistenceAdapter) -> EngineResult<Self> {
        let documents = store.list_skill_documents().await?;
        let known: std::collections::HashSet<String> =
            documents.iter().map(|s| s.skill_id.clone()).collect();

        let mut skills = HashMap::with_capacity(documents.len());
        for mut skill in documents {
            let before = skill.prerequisites.len();
            skill.prerequisites.retain(|p| known.contains(p));
            if skill.prerequisites.len() != before {
                tracing::warn!(
                    skill_id = %skill.skill_id,
                    dropped = before - skill.prerequisites.len(),
                    "dropped dangling prerequisite references during skill cache load"
                );
            }
            skills.insert(skill.skill_id.clone(), skill);
        }

        if let Some(skill_id) = find_cycle(&skills) {
            return Err(EngineError::PrerequisiteCycle { skill_id });
        }

        Ok(Self {
            skills: Arc::new(skills),
        })
    }

    #[cfg(test)]
    pub fn from_skills(skills: Vec<Skill>) -> Self {
        Self {
            skills: Arc::new(skills.into_iter().map(|s| (s.skill_id.clone(), s)).collect()),
        }
    }

    pub fn get(&self, skill_id: &str) -> Option<&Skill> {
        self.skills.get(skill_id)
    }

    pub fn contains(&self, skill_id: &str) -> bool {
        self.skills.contains_key(skill_id)
    }

    pub fn all(&self) -> impl Iterator<Item = &Skill> {
        self.skills.values()
    }

    pub fn skill_ids(&self) -> impl Iterator<Item = &String> {
        self.skills.keys()
    }

    pub fn len(&self) -> usize {
        self.skills.len()
    }

    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
    }

    pub fn skills_at_grade(&self, grade_level: u8) -> impl Iterator<Item = &Skill> {
        self.skills.values().filter(move |s| s.grade_level == grade_level)
    }

    /// Transitive closure of prerequisites for `skill_id`, deduplicated,
    /// not including `skill_id` itself.
    pub fn prerequisite_closure(&self, skill_id: &str) -> Vec<String> {
        let mut visited = std::collections::HashSet::new();
        let mut stack = vec![skill_id.to_string()];
        let mut result = Vec::new();

        while let Some(current) = stack.pop() {
            let Some(skill) = self.skills.get(&current) else {
                continue;
            };
            for prereq in &skill.prerequisites {
                if visited.insert(prereq.clone()) {
                    result.push(prereq.clone());
                    stack.push(prereq.clone());
                }
            }
        }

        result
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    InProgress,
    Done,
}

/// DFS over the prerequisite graph with a recursion-stack mark, returning
/// the first skill id found on a cycle. `prerequisite_closure`'s `visited`
/// set only protects traversal from infinite looping once the cache
/// exists; this catches the cycle before the cache is ever handed out.
fn find_cycle(skills: &HashMap<String, Skill>) -> Option<String> {
    let mut marks: HashMap<&str, Mark> = HashMap::with_capacity(skills.len());

    fn visit<'a>(id: &'a str, skills: &'a HashMap<String, Skill>, marks: &mut HashMap<&'a str, Mark>) -> Option<String> {
        match marks.get(id) {
            Some(Mark::Done) => return None,
            Some(Mark::InProgress) => return Some(id.to_string()),
            None => {}
        }
        marks.insert(id, Mark::InProgress);
        if let Some(skill) = skills.get(id) {
            for prereq in &skill.prerequisites {
                if let Some(found) = visit(prereq.as_str(), skills, marks) {
                    return Some(found);
                }
            }
        }
        marks.insert(id, Mark::Done);
        None
    }

    for id in skills.keys() {
        if let Some(found) = visit(id.as_str(), skills, &mut marks) {
            return Some(found);
        }
    }
    None
}
