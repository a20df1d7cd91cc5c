//! Scene registry with normalized name resolution.

use std::collections::HashMap;
use std::sync::Arc;

use super::Scene;

/// Normalize a scene name for lookup: lowercase, separators stripped.
///
/// Both model-returned names and plan-step names resolve through this, so
/// `"Foo_Bar"`, `"foo bar"` and `"FooBar"` all address the same scene. No
/// edit-distance matching is performed.
pub fn normalize_scene_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Registry of scenes in insertion order, resolved by normalized exact match.
#[derive(Clone, Default)]
pub struct SceneRegistry {
    scenes: Vec<Arc<Scene>>,
    index: HashMap<String, usize>,
}

impl SceneRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a scene. A scene whose normalized name collides with an
    /// existing one replaces it in place.
    pub fn register(&mut self, scene: Scene) -> &mut Self {
        let key = normalize_scene_name(scene.name());
        match self.index.get(&key) {
            Some(&position) => self.scenes[position] = Arc::new(scene),
            None => {
                self.index.insert(key, self.scenes.len());
                self.scenes.push(Arc::new(scene));
            }
        }
        self
    }

    /// Resolve a raw name (model-returned, plan-step, or caller-supplied).
    pub fn resolve(&self, name: &str) -> Option<&Arc<Scene>> {
        self.index
            .get(&normalize_scene_name(name))
            .map(|&position| &self.scenes[position])
    }

    /// All scenes in insertion order.
    pub fn scenes(&self) -> impl Iterator<Item = &Arc<Scene>> {
        self.scenes.iter()
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }
}

impl std::fmt::Debug for SceneRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.scenes.iter().map(|s| s.name()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_strips_separators_and_case() {
        assert_eq!(normalize_scene_name("Foo_Bar"), "foobar");
        assert_eq!(normalize_scene_name("foo bar"), "foobar");
        assert_eq!(normalize_scene_name("Foo-Bar 2"), "foobar2");
    }

    #[test]
    fn resolve_matches_after_normalization() {
        let mut registry = SceneRegistry::new();
        registry.register(Scene::new("Order Lookup", "Finds orders"));
        assert!(registry.resolve("order_lookup").is_some());
        assert!(registry.resolve("OrderLookup").is_some());
        assert!(registry.resolve("order lookup").is_some());
        assert!(registry.resolve("refunds").is_none());
    }

    #[test]
    fn scenes_keep_insertion_order() {
        let mut registry = SceneRegistry::new();
        registry.register(Scene::new("b", ""));
        registry.register(Scene::new("a", ""));
        let names: Vec<_> = registry.scenes().map(|s| s.name().to_string()).collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[test]
    fn colliding_name_replaces_in_place() {
        let mut registry = SceneRegistry::new();
        registry.register(Scene::new("Foo Bar", "first"));
        registry.register(Scene::new("foo_bar", "second"));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.resolve("FooBar").unwrap().description(), "second");
    }
}
