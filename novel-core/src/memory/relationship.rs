//! Co-occurrence graph between characters.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An unordered pair of character names, stored in canonical order.
///
/// `CharacterPair::new("乙", "甲")` and `CharacterPair::new("甲", "乙")`
/// are the same key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "(String, String)")]
pub struct CharacterPair(String, String);

impl CharacterPair {
    pub fn new(a: impl Into<String>, b: impl Into<String>) -> Self {
        let (a, b) = (a.into(), b.into());
        if a <= b {
            Self(a, b)
        } else {
            Self(b, a)
        }
    }

    pub fn first(&self) -> &str {
        &self.0
    }

    pub fn second(&self) -> &str {
        &self.1
    }

    pub fn involves(&self, name: &str) -> bool {
        self.0 == name || self.1 == name
    }
}

impl From<(String, String)> for CharacterPair {
    fn from((a, b): (String, String)) -> Self {
        Self::new(a, b)
    }
}

/// Interaction history of one pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub characters: CharacterPair,
    pub interaction_count: u32,
    pub first_interaction: u32,
    pub last_interaction: u32,
    /// Sorted, unique.
    pub interaction_chapters: Vec<u32>,
}

impl Interaction {
    fn new(characters: CharacterPair, chapter: u32) -> Self {
        Self {
            characters,
            interaction_count: 1,
            first_interaction: chapter,
            last_interaction: chapter,
            interaction_chapters: vec![chapter],
        }
    }

    fn record(&mut self, chapter: u32) {
        self.interaction_count += 1;
        self.last_interaction = chapter;
        if let Err(pos) = self.interaction_chapters.binary_search(&chapter) {
            self.interaction_chapters.insert(pos, chapter);
        }
    }
}

/// All recorded interactions, one entry per unordered pair.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<Interaction>", into = "Vec<Interaction>")]
pub struct RelationshipGraph {
    edges: BTreeMap<CharacterPair, Interaction>,
}

impl RelationshipGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that two characters interacted in `chapter`.
    pub fn record(&mut self, pair: CharacterPair, chapter: u32) {
        match self.edges.get_mut(&pair) {
            Some(interaction) => interaction.record(chapter),
            None => {
                self.edges
                    .insert(pair.clone(), Interaction::new(pair, chapter));
            }
        }
    }

    /// Look up a pair in either order.
    pub fn get(&self, a: &str, b: &str) -> Option<&Interaction> {
        self.edges.get(&CharacterPair::new(a, b))
    }

    /// Interactions involving `name`.
    pub fn of(&self, name: &str) -> impl Iterator<Item = &Interaction> {
        let name = name.to_string();
        self.edges
            .values()
            .filter(move |i| i.characters.involves(&name))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Interaction> {
        self.edges.values()
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

impl From<Vec<Interaction>> for RelationshipGraph {
    fn from(interactions: Vec<Interaction>) -> Self {
        let edges = interactions
            .into_iter()
            .map(|i| (i.characters.clone(), i))
            .collect();
        Self { edges }
    }
}

impl From<RelationshipGraph> for Vec<Interaction> {
    fn from(graph: RelationshipGraph) -> Self {
        graph.edges.into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_is_canonical() {
        assert_eq!(CharacterPair::new("乙", "甲"), CharacterPair::new("甲", "乙"));
        let pair = CharacterPair::new("b", "a");
        assert_eq!(pair.first(), "a");
        assert_eq!(pair.second(), "b");
    }

    #[test]
    fn test_record_interactions() {
        let mut graph = RelationshipGraph::new();
        graph.record(CharacterPair::new("甲", "乙"), 3);
        graph.record(CharacterPair::new("乙", "甲"), 1);
        graph.record(CharacterPair::new("甲", "乙"), 3);

        assert_eq!(graph.len(), 1);
        let interaction = graph.get("乙", "甲").unwrap();
        assert_eq!(interaction.interaction_count, 3);
        assert_eq!(interaction.first_interaction, 3);
        assert_eq!(interaction.last_interaction, 3);
        assert_eq!(interaction.interaction_chapters, vec![1, 3]);
        assert_eq!(graph.of("甲").count(), 1);
        assert_eq!(graph.of("丙").count(), 0);
    }

    #[test]
    fn test_graph_serializes_as_list() {
        let mut graph = RelationshipGraph::new();
        graph.record(CharacterPair::new("乙", "甲"), 2);

        let value = serde_json::to_value(&graph).unwrap();
        assert!(value.is_array());
        assert_eq!(value[0]["characters"], serde_json::json!(["乙", "甲"]));

        let back: RelationshipGraph = serde_json::from_value(value).unwrap();
        assert_eq!(back, graph);
    }
}
