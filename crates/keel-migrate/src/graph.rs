//! Ordering of migrations across applications.
//!
//! Each migration implicitly depends on the previous migration of its app
//! and explicitly on its declared dependencies. The graph yields a
//! topological order, stable by app name then migration name.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{MigrateError, Result};
use crate::migration::Migration;

type Key = (String, String);

fn key(app: &str, name: &str) -> Key {
    (app.to_string(), name.to_string())
}

/// A dependency graph of migrations from any number of apps.
#[derive(Debug, Clone, Default)]
pub struct MigrationGraph {
    nodes: BTreeMap<Key, Migration>,
}

impl MigrationGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a migration.
    pub fn add(&mut self, migration: Migration) {
        self.nodes
            .insert(key(&migration.app, &migration.name), migration);
    }

    /// Returns whether the graph holds `app`/`name`.
    #[must_use]
    pub fn contains(&self, app: &str, name: &str) -> bool {
        self.nodes.contains_key(&key(app, name))
    }

    /// Returns the migrations of `app`, sorted by name.
    #[must_use]
    pub fn app_migrations(&self, app: &str) -> Vec<&Migration> {
        self.nodes.values().filter(|m| m.app == app).collect()
    }

    fn dependencies(&self, migration: &Migration) -> Result<BTreeSet<Key>> {
        let mut deps = BTreeSet::new();
        let previous = self
            .nodes
            .range(..key(&migration.app, &migration.name))
            .next_back()
            .filter(|((app, _), _)| *app == migration.app);
        if let Some((k, _)) = previous {
            deps.insert(k.clone());
        }
        for (app, name) in &migration.dependencies {
            let dep = key(app, name);
            if !self.nodes.contains_key(&dep) {
                return Err(MigrateError::MissingDependency {
                    migration: format!("{}/{}", migration.app, migration.name),
                    dependency: format!("{app}/{name}"),
                });
            }
            deps.insert(dep);
        }
        Ok(deps)
    }

    /// Returns every migration in an order that satisfies all dependencies.
    pub fn order(&self) -> Result<Vec<&Migration>> {
        let mut pending: BTreeMap<&Key, BTreeSet<Key>> = BTreeMap::new();
        for (k, migration) in &self.nodes {
            pending.insert(k, self.dependencies(migration)?);
        }

        let mut done: BTreeSet<Key> = BTreeSet::new();
        let mut ordered = Vec::with_capacity(self.nodes.len());
        while !pending.is_empty() {
            let ready = pending
                .iter()
                .find(|(_, deps)| deps.iter().all(|d| done.contains(d)))
                .map(|(k, _)| *k);
            let Some(k) = ready else {
                return Err(MigrateError::CircularDependency);
            };
            pending.remove(k);
            done.insert(k.clone());
            if let Some(migration) = self.nodes.get(k) {
                ordered.push(migration);
            }
        }
        Ok(ordered)
    }

    /// Returns the migrations `app` needs, dependencies of other apps
    /// included, in dependency order.
    pub fn plan(&self, app: &str) -> Result<Vec<&Migration>> {
        let mut needed: BTreeSet<Key> = BTreeSet::new();
        let mut stack: Vec<Key> = self
            .app_migrations(app)
            .iter()
            .map(|m| key(&m.app, &m.name))
            .collect();
        while let Some(k) = stack.pop() {
            if !needed.insert(k.clone()) {
                continue;
            }
            if let Some(migration) = self.nodes.get(&k) {
                stack.extend(self.dependencies(migration)?);
            }
        }
        Ok(self
            .order()?
            .into_iter()
            .filter(|m| needed.contains(&key(&m.app, &m.name)))
            .collect())
    }
}

impl FromIterator<Migration> for MigrationGraph {
    fn from_iter<I: IntoIterator<Item = Migration>>(iter: I) -> Self {
        let mut graph = Self::new();
        for migration in iter {
            graph.add(migration);
        }
        graph
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn migration(app: &str, name: &str) -> Migration {
        Migration::new(app, name).unwrap()
    }

    fn names(ordered: &[&Migration]) -> Vec<String> {
        ordered
            .iter()
            .map(|m| format!("{}/{}", m.app, m.name))
            .collect()
    }

    #[test]
    fn test_cross_app_dependency() {
        let graph: MigrationGraph = vec![
            migration("auth", "0001_initial"),
            migration("auth", "0002_auto").depends_on("blog", "0001_initial"),
            migration("blog", "0001_initial"),
        ]
        .into_iter()
        .collect();

        assert_eq!(
            names(&graph.order().unwrap()),
            vec!["auth/0001_initial", "blog/0001_initial", "auth/0002_auto"]
        );
    }

    #[test]
    fn test_missing_dependency() {
        let graph: MigrationGraph = vec![migration("blog", "0001_initial").depends_on("auth", "0001_initial")]
            .into_iter()
            .collect();
        assert!(matches!(
            graph.order(),
            Err(MigrateError::MissingDependency { .. })
        ));
    }

    #[test]
    fn test_cycle() {
        let graph: MigrationGraph = vec![
            migration("a", "0001_initial").depends_on("b", "0001_initial"),
            migration("b", "0001_initial").depends_on("a", "0001_initial"),
        ]
        .into_iter()
        .collect();
        assert!(matches!(
            graph.order(),
            Err(MigrateError::CircularDependency)
        ));
    }

    #[test]
    fn test_plan_pulls_in_dependencies() {
        let graph: MigrationGraph = vec![
            migration("auth", "0001_initial"),
            migration("blog", "0001_initial").depends_on("auth", "0001_initial"),
            migration("shop", "0001_initial"),
        ]
        .into_iter()
        .collect();

        assert_eq!(
            names(&graph.plan("blog").unwrap()),
            vec!["auth/0001_initial", "blog/0001_initial"]
        );
    }
}
